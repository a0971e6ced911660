//! Shopping advisor backed by the hosted completion endpoint.
//!
//! The advisor owns the conversation history and the glue between streamed
//! reply fragments and the catalog: fragments go out as [`ClientEvent`]s
//! while they arrive, and once the reply is complete the trailing
//! recommendation ids are resolved to real product payloads.

use std::{pin::Pin, sync::Arc};

use anyhow::Result;
use assistant::{extract_recommendations, AssistantClient, AssistantError, ChatMessage};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use shared::{
    error::{ApiException, ErrorCode},
    protocol::{ProductDetail, ProductSummary},
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{ClientEvent, MarketClient};

pub use assistant::RECOMMENDATION_MARKER;

pub type ReplyFragments = Pin<Box<dyn Stream<Item = Result<String, AssistantError>> + Send>>;

/// Seam over the completion endpoint so the advisor can run against a
/// scripted backend in tests and report a clean error when none is wired.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_reply(
        &self,
        history: &[ChatMessage],
        context: &str,
    ) -> Result<ReplyFragments, AssistantError>;
}

#[async_trait]
impl CompletionBackend for AssistantClient {
    async fn stream_reply(
        &self,
        history: &[ChatMessage],
        context: &str,
    ) -> Result<ReplyFragments, AssistantError> {
        AssistantClient::stream_reply(self, history, context).await
    }
}

pub struct MissingCompletionBackend;

#[async_trait]
impl CompletionBackend for MissingCompletionBackend {
    async fn stream_reply(
        &self,
        _history: &[ChatMessage],
        _context: &str,
    ) -> Result<ReplyFragments, AssistantError> {
        Err(AssistantError::Stream(
            "no completion backend configured".to_string(),
        ))
    }
}

/// Full advisor answer: the visible text plus the catalog entries the model
/// recommended, unknown ids already dropped.
#[derive(Debug, Clone)]
pub struct AdvisorReply {
    pub text: String,
    pub products: Vec<ProductDetail>,
}

pub struct AssistantAdvisor {
    client: Arc<MarketClient>,
    backend: Arc<dyn CompletionBackend>,
    history: Mutex<Vec<ChatMessage>>,
}

impl AssistantAdvisor {
    pub fn new(client: Arc<MarketClient>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            client,
            backend,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn from_env(client: Arc<MarketClient>) -> Result<Self, AssistantError> {
        let backend = AssistantClient::from_env()?;
        Ok(Self::new(client, Arc::new(backend)))
    }

    /// One catalog line per product, the shape the completion prompt expects.
    pub fn catalog_context(products: &[ProductSummary]) -> String {
        products
            .iter()
            .map(|product| {
                format!(
                    "{}: {} ({}, {} FCFA, {})",
                    product.product_id.0,
                    product.name,
                    product.category,
                    product.price_cents / 100,
                    product.city
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Asks one question. Fragments are emitted as `AssistantFragment`
    /// events while the reply streams; the return value carries the final
    /// text and the resolved recommendations. Malformed stream frames are
    /// skipped; transport failures abort the whole ask.
    pub async fn ask(&self, question: &str, context: &str) -> Result<AdvisorReply> {
        let history_snapshot = {
            let mut history = self.history.lock().await;
            history.push(ChatMessage::user(question));
            history.clone()
        };

        let mut fragments = self.backend.stream_reply(&history_snapshot, context).await?;
        let mut full = String::new();
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    self.client
                        .emit(ClientEvent::AssistantFragment { text: fragment.clone() });
                    full.push_str(&fragment);
                }
                Err(AssistantError::Parse(err)) => {
                    warn!(%err, "skipping malformed completion frame");
                }
                Err(err) => return Err(err.into()),
            }
        }

        {
            let mut history = self.history.lock().await;
            history.push(ChatMessage::assistant(full.clone()));
        }

        let (text, product_ids) = extract_recommendations(&full);
        let mut products = Vec::new();
        for product_id in product_ids {
            match self.client.product_detail(product_id).await {
                Ok(detail) => products.push(detail),
                Err(err) if is_not_found(&err) => {
                    warn!(product_id = product_id.0, "dropping unknown recommended product");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(AdvisorReply { text, products })
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ApiException>(),
        Some(exception) if exception.code == ErrorCode::NotFound
    )
}
