use std::pin::Pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::warn;

use crate::{
    error::AssistantError,
    types::{
        extract_recommendations, AssistantConfig, AssistantReply, ChatMessage, CompletionChunk,
        CompletionRequest,
    },
};

/// Client for the hosted streaming completion endpoint.
#[derive(Clone)]
pub struct AssistantClient {
    client: Client,
    config: AssistantConfig,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, AssistantError> {
        Ok(Self::new(AssistantConfig::from_env()?))
    }

    fn request_for(&self, history: &[ChatMessage], context: &str) -> CompletionRequest {
        let system = format!(
            "Tu es l'assistant Festiloc. Tu aides à organiser des événements et à \
             choisir du matériel de location parmi le catalogue fourni.\n\
             Catalogue :\n{context}\n\
             Si des produits du catalogue correspondent à la demande, termine ta \
             réponse par [RECOMMENDATIONS: {{\"products\": [ids]}}]."
        );
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().cloned());
        CompletionRequest {
            model: self.config.model.clone(),
            messages,
            stream: true,
        }
    }

    /// Streams reply fragments as they arrive. Frames that fail to parse
    /// surface as `Parse` items and the stream continues with later frames.
    pub async fn stream_reply(
        &self,
        history: &[ChatMessage],
        context: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, AssistantError>> + Send>>, AssistantError>
    {
        let request = self.request_for(history, context);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api { status, message });
        }

        let mut byte_stream = response.bytes_stream();

        Ok(Box::pin(stream! {
            // Raw bytes, not text: a UTF-8 sequence may split across chunks,
            // so decoding waits until a line is complete.
            let mut buffer = Vec::new();
            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        yield Err(AssistantError::Stream(err.to_string()));
                        break;
                    }
                };
                buffer.extend_from_slice(&bytes);

                let (frames, done) = take_data_lines(&mut buffer);
                for frame in frames {
                    match serde_json::from_str::<CompletionChunk>(&frame) {
                        Ok(chunk) => {
                            if let Some(content) = chunk.delta_content() {
                                yield Ok(content);
                            }
                        }
                        Err(err) => yield Err(AssistantError::Parse(err)),
                    }
                }
                if done {
                    break;
                }
            }
        }))
    }

    /// Drains the stream into one reply and extracts the recommendation
    /// marker. Malformed frames are skipped; transport errors abort.
    pub async fn complete_reply(
        &self,
        history: &[ChatMessage],
        context: &str,
    ) -> Result<AssistantReply, AssistantError> {
        let mut stream = self.stream_reply(history, context).await?;
        let mut text = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => text.push_str(&fragment),
                Err(AssistantError::Parse(err)) => {
                    warn!(%err, "skipping malformed completion frame");
                }
                Err(err) => return Err(err),
            }
        }
        let (visible, product_ids) = extract_recommendations(&text);
        Ok(AssistantReply {
            text: visible,
            product_ids,
        })
    }
}

/// Pulls complete `data: ` payloads out of the line buffer. Returns the
/// payloads plus whether the `[DONE]` sentinel was seen.
fn take_data_lines(buffer: &mut Vec<u8>) -> (Vec<String>, bool) {
    let mut frames = Vec::new();
    let mut done = false;
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&buffer[..pos]).trim().to_string();
        buffer.drain(..=pos);

        if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" {
                done = true;
                break;
            }
            frames.push(data.to_string());
        }
    }
    (frames, done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_on_line_boundaries() {
        let mut buffer = b"data: {\"a\":1}\nda".to_vec();
        let (frames, done) = take_data_lines(&mut buffer);
        assert_eq!(frames, vec!["{\"a\":1}".to_string()]);
        assert!(!done);
        assert_eq!(buffer, b"da");

        buffer.extend_from_slice(b"ta: {\"b\":2}\ndata: [DONE]\n");
        let (frames, done) = take_data_lines(&mut buffer);
        assert_eq!(frames, vec!["{\"b\":2}".to_string()]);
        assert!(done);
    }

    #[test]
    fn keep_alives_and_blank_lines_are_ignored() {
        let mut buffer = b"\n: keep-alive\ndata: {\"c\":3}\n\n".to_vec();
        let (frames, done) = take_data_lines(&mut buffer);
        assert_eq!(frames, vec!["{\"c\":3}".to_string()]);
        assert!(!done);
        assert!(buffer.is_empty());
    }

    #[test]
    fn nothing_is_taken_from_a_partial_line() {
        let mut buffer = b"data: {\"incomplete\":".to_vec();
        let (frames, done) = take_data_lines(&mut buffer);
        assert!(frames.is_empty());
        assert!(!done);
        assert_eq!(buffer, b"data: {\"incomplete\":");
    }

    #[test]
    fn multibyte_chars_survive_chunk_splits() {
        let full = "data: {\"content\":\"félicitations\"}\n".as_bytes();
        let mid = full.iter().position(|&b| b == 0xC3).expect("two-byte char") + 1;
        let (head, tail) = full.split_at(mid);

        let mut buffer = head.to_vec();
        let (frames, done) = take_data_lines(&mut buffer);
        assert!(frames.is_empty());
        assert!(!done);

        buffer.extend_from_slice(tail);
        let (frames, _) = take_data_lines(&mut buffer);
        assert_eq!(frames, vec!["{\"content\":\"félicitations\"}".to_string()]);
    }

    #[test]
    fn system_prompt_carries_the_context() {
        let client = AssistantClient::new(AssistantConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
        });
        let request = client.request_for(
            &[ChatMessage::user("Une tente pour 50 personnes ?")],
            "1: Tente blanche",
        );
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.contains("1: Tente blanche"));
        assert!(request.messages[0].content.contains("RECOMMENDATIONS"));
        assert!(request.stream);
    }
}
