pub mod client;
pub mod error;
pub mod types;

pub use client::AssistantClient;
pub use error::AssistantError;
pub use types::{
    extract_recommendations, AssistantConfig, AssistantReply, ChatMessage, CompletionChunk,
    MessageRole, RECOMMENDATION_MARKER,
};
