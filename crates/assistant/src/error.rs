use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("missing ASSISTANT_API_KEY environment variable")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("frame parsing failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stream failed: {0}")]
    Stream(String),
}
