//! Client SDK for the rental marketplace.
//!
//! [`MarketClient`] wraps the HTTP API and the realtime feed behind explicit
//! async calls. There is no UI here; interested layers subscribe to
//! [`ClientEvent`]s and render however they like. The chat content policy
//! runs locally before anything is sent, so a rejected message never costs
//! a network round trip.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{
        MessageId, MessageKind, NotificationId, OrderId, OrderStatus, ProductId, RoomId, UserId,
        UserRole,
    },
    error::{ApiError, ApiException, ErrorCode},
    moderation::validate_message,
    protocol::{
        AttachmentPayload, LoginRequest, LoginResponse, MessagePayload, NotificationPayload,
        NotifyRequest, OpenRoomRequest, OrderDraft, OrderPayload, ProductDetail, ProductSummary,
        RoomSummary, SendMessageRequest, ServerEvent, ToggleFavoriteRequest,
        ToggleFavoriteResponse, TransitionOrderRequest, UploadObjectResponse,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::{AbortHandle, JoinHandle},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::info;
use uuid::Uuid;

pub mod advisor;
pub mod orders;

pub use advisor::{
    AdvisorReply, AssistantAdvisor, CompletionBackend, MissingCompletionBackend,
    RECOMMENDATION_MARKER,
};
pub use orders::{CancellationRequest, ControllerError, OrderStatusController};
pub use shared::voice::{parse_transcript, VoiceCommand};

/// Signed-in identity. The token is the only credential; it travels as a
/// bearer header on every authenticated request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub role: UserRole,
    pub token: String,
}

#[derive(Debug, Default)]
struct ClientState {
    session: Option<Session>,
}

/// Which side of an order listing to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Client,
    Provider,
}

impl OrderSide {
    fn as_str(self) -> &'static str {
        match self {
            OrderSide::Client => "client",
            OrderSide::Provider => "provider",
        }
    }
}

/// Catalog search parameters; all optional, empty means "latest listings".
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
}

/// A blob to attach to a chat message.
#[derive(Debug, Clone)]
pub struct ObjectUpload {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Push-style surface for UI layers, mirrored alongside the direct return
/// values so callers can stay request/response when they prefer.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    MessageReceived { message: MessagePayload },
    OrderUpdated { order: OrderPayload },
    AssistantFragment { text: String },
    Error(String),
}

pub struct MarketClient {
    http: Client,
    server_url: String,
    inner: Mutex<ClientState>,
    events: broadcast::Sender<ClientEvent>,
    subscriptions: Mutex<Vec<AbortHandle>>,
}

impl MarketClient {
    pub fn new(server_url: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            http: Client::new(),
            server_url: server_url.into(),
            inner: Mutex::new(ClientState::default()),
            events,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    /// Current session, or an `unauthorized` error when signed out.
    pub async fn session(&self) -> Result<Session> {
        let guard = self.inner.lock().await;
        guard
            .session
            .clone()
            .ok_or_else(|| ApiException::new(ErrorCode::Unauthorized, "not signed in").into())
    }

    pub async fn sign_in(&self, username: &str, role: UserRole) -> Result<Session> {
        let response: LoginResponse = self
            .execute(
                self.http
                    .post(format!("{}/login", self.server_url))
                    .json(&LoginRequest {
                        username: username.to_string(),
                        role,
                    }),
            )
            .await?;
        let session = Session {
            user_id: response.user_id,
            username: response.username,
            role: response.role,
            token: response.token,
        };
        {
            let mut guard = self.inner.lock().await;
            guard.session = Some(session.clone());
        }
        info!(user_id = session.user_id.0, role = ?session.role, "signed in");
        Ok(session)
    }

    /// Clears the session and tears down room subscriptions. In-flight
    /// requests are not aborted; their results land on a cleared session.
    pub async fn sign_out(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.session = None;
        }
        let handles = {
            let mut subscriptions = self.subscriptions.lock().await;
            std::mem::take(&mut *subscriptions)
        };
        for handle in handles {
            handle.abort();
        }
        info!("signed out");
    }

    // Catalog browsing is public; no session required.

    pub async fn search_products(&self, filter: SearchFilter) -> Result<Vec<ProductSummary>> {
        self.execute(
            self.http
                .get(format!("{}/products", self.server_url))
                .query(&filter),
        )
        .await
    }

    pub async fn product_detail(&self, product_id: ProductId) -> Result<ProductDetail> {
        self.execute(
            self.http
                .get(format!("{}/products/{}", self.server_url, product_id.0)),
        )
        .await
    }

    pub async fn toggle_favorite(&self, product_id: ProductId) -> Result<bool> {
        let request = self.authed(Method::POST, "/favorites/toggle").await?;
        let response: ToggleFavoriteResponse = self
            .execute(request.json(&ToggleFavoriteRequest { product_id }))
            .await?;
        Ok(response.favorited)
    }

    pub async fn favorites(&self) -> Result<Vec<ProductSummary>> {
        let request = self.authed(Method::GET, "/favorites").await?;
        self.execute(request).await
    }

    pub async fn place_order(&self, draft: OrderDraft) -> Result<OrderPayload> {
        let request = self.authed(Method::POST, "/orders").await?;
        let order: OrderPayload = self.execute(request.json(&draft)).await?;
        info!(order_id = order.order_id.0, "order placed");
        Ok(order)
    }

    pub async fn orders(&self, side: OrderSide) -> Result<Vec<OrderPayload>> {
        let request = self.authed(Method::GET, "/orders").await?;
        self.execute(request.query(&[("side", side.as_str())])).await
    }

    pub async fn order(&self, order_id: OrderId) -> Result<OrderPayload> {
        let request = self
            .authed(Method::GET, &format!("/orders/{}", order_id.0))
            .await?;
        self.execute(request).await
    }

    /// Raw status transition request. Most callers should go through
    /// [`status_controller`](Self::status_controller) instead, which also
    /// tracks what the server would accept.
    pub async fn advance_order(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<OrderPayload> {
        let request = self
            .authed(Method::POST, &format!("/orders/{}/status", order_id.0))
            .await?;
        self.execute(request.json(&TransitionOrderRequest { target })).await
    }

    /// Wraps one order in a controller bound to the signed-in user.
    pub async fn status_controller(
        self: &Arc<Self>,
        order: OrderPayload,
    ) -> Result<OrderStatusController> {
        let session = self.session().await?;
        Ok(OrderStatusController::new(
            Arc::clone(self),
            session.user_id,
            order,
        ))
    }

    pub async fn open_room(&self, provider_id: UserId, label: &str) -> Result<RoomSummary> {
        let request = self.authed(Method::POST, "/rooms").await?;
        self.execute(request.json(&OpenRoomRequest {
            provider_id,
            label: label.to_string(),
        }))
        .await
    }

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>> {
        let request = self.authed(Method::GET, "/rooms").await?;
        self.execute(request).await
    }

    /// One page of history, oldest first.
    pub async fn messages(
        &self,
        room_id: RoomId,
        limit: Option<u32>,
        before: Option<MessageId>,
    ) -> Result<Vec<MessagePayload>> {
        let request = self
            .authed(Method::GET, &format!("/rooms/{}/messages", room_id.0))
            .await?;
        let mut params: Vec<(&str, i64)> = Vec::new();
        if let Some(limit) = limit {
            params.push(("limit", i64::from(limit)));
        }
        if let Some(before) = before {
            params.push(("before", before.0));
        }
        self.execute(request.query(&params)).await
    }

    /// Validates the body locally first. A policy rejection returns the
    /// typed [`shared::moderation::MessagePolicyError`] without any network
    /// round trip.
    pub async fn send_message(&self, room_id: RoomId, text: &str) -> Result<MessagePayload> {
        validate_message(text)?;
        self.post_message(
            room_id,
            SendMessageRequest {
                kind: MessageKind::Text,
                body: text.to_string(),
                attachment: None,
            },
        )
        .await
    }

    /// Uploads the object, then posts a message referencing it. Non-empty
    /// captions go through the same content policy as plain text.
    pub async fn send_attachment(
        &self,
        room_id: RoomId,
        kind: MessageKind,
        body: &str,
        object: ObjectUpload,
    ) -> Result<MessagePayload> {
        if !body.trim().is_empty() {
            validate_message(body)?;
        }
        let name = object.name.clone();
        let mime = object
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let uploaded = self
            .upload_object(&object.name, object.content_type, object.bytes)
            .await?;
        self.post_message(
            room_id,
            SendMessageRequest {
                kind,
                body: body.to_string(),
                attachment: Some(AttachmentPayload {
                    path: uploaded.path,
                    name,
                    mime,
                }),
            },
        )
        .await
    }

    async fn post_message(
        &self,
        room_id: RoomId,
        message: SendMessageRequest,
    ) -> Result<MessagePayload> {
        let request = self
            .authed(Method::POST, &format!("/rooms/{}/messages", room_id.0))
            .await?;
        let event: ServerEvent = self.execute(request.json(&message)).await?;
        match event {
            ServerEvent::MessageReceived { message } => Ok(message),
            ServerEvent::Error(err) => Err(ApiException::from(err).into()),
        }
    }

    /// Marks every message from the other party as read; returns how many
    /// rows changed.
    pub async fn mark_room_read(&self, room_id: RoomId) -> Result<u64> {
        let request = self
            .authed(Method::POST, &format!("/rooms/{}/read", room_id.0))
            .await?;
        let body: serde_json::Value = self.execute(request).await?;
        Ok(body["updated"].as_u64().unwrap_or(0))
    }

    /// Opens a realtime feed for one room. Only inserts for `room_id` reach
    /// the returned subscription; everything else on the socket is dropped.
    pub async fn subscribe(self: &Arc<Self>, room_id: RoomId) -> Result<RoomSubscription> {
        let session = self.session().await?;
        let ws_url = ws_endpoint(&self.server_url, &session.token, room_id)?;
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (_, mut ws_reader) = ws_stream.split();

        let (feed, receiver) = broadcast::channel(256);
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::MessageReceived { message })
                            if message.room_id == room_id =>
                        {
                            let _ = feed.send(message.clone());
                            client.emit(ClientEvent::MessageReceived { message });
                        }
                        Ok(ServerEvent::MessageReceived { .. }) => {}
                        Ok(ServerEvent::Error(err)) => {
                            client.emit(ClientEvent::Error(err.message));
                        }
                        Err(err) => {
                            client.emit(ClientEvent::Error(format!(
                                "invalid server event: {err}"
                            )));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        client.emit(ClientEvent::Error(format!("websocket receive failed: {err}")));
                        break;
                    }
                }
            }
        });

        {
            let mut subscriptions = self.subscriptions.lock().await;
            subscriptions.push(task.abort_handle());
        }

        Ok(RoomSubscription {
            room_id,
            receiver,
            task,
        })
    }

    pub async fn notify(
        &self,
        recipient: UserId,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<NotificationPayload> {
        let request = self.authed(Method::POST, "/notifications").await?;
        self.execute(request.json(&NotifyRequest {
            user_id: recipient,
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        }))
        .await
    }

    pub async fn notifications(&self, unread_only: bool) -> Result<Vec<NotificationPayload>> {
        let request = self.authed(Method::GET, "/notifications").await?;
        self.execute(request.query(&[("unread_only", unread_only)])).await
    }

    pub async fn mark_notification_read(&self, notification_id: NotificationId) -> Result<()> {
        let request = self
            .authed(Method::POST, &format!("/notifications/{}/read", notification_id.0))
            .await?;
        self.execute_no_content(request).await
    }

    /// Uploads a blob under the signed-in user's namespace and returns the
    /// stored path plus its public URL.
    pub async fn upload_object(
        &self,
        name: &str,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<UploadObjectResponse> {
        let session = self.session().await?;
        let key = object_key(session.user_id, name);
        let request = self
            .http
            .post(format!("{}/objects/upload", self.server_url))
            .bearer_auth(&session.token)
            .query(&[
                ("path", key.as_str()),
                (
                    "content_type",
                    content_type.as_deref().unwrap_or("application/octet-stream"),
                ),
            ])
            .body(bytes);
        self.execute(request).await
    }

    async fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let session = self.session().await?;
        Ok(self
            .http
            .request(method, format!("{}{path}", self.server_url))
            .bearer_auth(session.token))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(response.json().await?)
    }

    async fn execute_no_content(&self, request: RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }

    /// The server answers failures with an `ApiError` envelope; surface it
    /// as the typed exception so callers can match on the code.
    async fn error_from(response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let envelope = match response.json::<ApiError>().await {
            Ok(envelope) => envelope,
            Err(_) => ApiError::new(ErrorCode::Internal, format!("server returned {status}")),
        };
        ApiException::from(envelope).into()
    }
}

/// Live feed of one room's inserts. Dropping the subscription aborts the
/// reader task and closes the feed.
pub struct RoomSubscription {
    room_id: RoomId,
    receiver: broadcast::Receiver<MessagePayload>,
    task: JoinHandle<()>,
}

impl RoomSubscription {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Next insert, in arrival order. `None` once the feed closes. A lagged
    /// receiver skips the overwritten frames and keeps reading.
    pub async fn next_message(&mut self) -> Option<MessagePayload> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn ws_endpoint(server_url: &str, token: &str, room_id: RoomId) -> Result<String> {
    let base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(anyhow!("server_url must start with http:// or https://"));
    };
    Ok(format!("{base}/ws?token={token}&room_id={}", room_id.0))
}

/// Object keys are namespaced per user so uploads never collide across
/// accounts: `u{user_id}/{uuid}-{sanitized name}`.
fn object_key(user_id: UserId, name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let sanitized = if sanitized.is_empty() {
        "objet".to_string()
    } else {
        sanitized
    };
    format!("u{}/{}-{}", user_id.0, Uuid::new_v4(), sanitized)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
