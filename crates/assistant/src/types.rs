use serde::{Deserialize, Serialize};
use shared::domain::ProductId;

use crate::error::AssistantError;

/// Trailing marker the model appends when it recommends catalog entries.
pub const RECOMMENDATION_MARKER: &str = "[RECOMMENDATIONS:";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, AssistantError> {
        let api_key =
            std::env::var("ASSISTANT_API_KEY").map_err(|_| AssistantError::MissingApiKey)?;
        let base_url = std::env::var("ASSISTANT_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var("ASSISTANT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Self {
            base_url,
            api_key,
            model,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// One SSE frame of a streamed completion.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunk {
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionChunk {
    pub fn delta_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub product_ids: Vec<ProductId>,
}

/// Splits the visible reply from the trailing recommendation marker.
///
/// A well-formed marker is stripped and its ids returned. A marker whose
/// envelope closes but whose payload does not parse is stripped with an
/// empty id list. A marker that never closes leaves the text untouched.
pub fn extract_recommendations(text: &str) -> (String, Vec<ProductId>) {
    let Some(start) = text.rfind(RECOMMENDATION_MARKER) else {
        return (text.trim_end().to_string(), Vec::new());
    };
    let inner_start = start + RECOMMENDATION_MARKER.len();

    let mut depth = 1usize;
    let mut close = None;
    for (idx, ch) in text[inner_start..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(inner_start + idx);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return (text.trim_end().to_string(), Vec::new());
    };

    let payload = text[inner_start..close].trim();
    let mut visible = String::with_capacity(text.len());
    visible.push_str(&text[..start]);
    visible.push_str(&text[close + 1..]);

    (visible.trim_end().to_string(), parse_product_ids(payload))
}

fn parse_product_ids(payload: &str) -> Vec<ProductId> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return Vec::new();
    };
    let Some(products) = value.get("products").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    products
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .map(ProductId)
        .collect()
}
