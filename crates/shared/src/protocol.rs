use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        AssignmentId, MessageId, MessageKind, NotificationId, OrderId, OrderStatus, ProductId,
        RoomId, UserId, UserRole,
    },
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub username: String,
    pub role: UserRole,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: ProductId,
    pub provider_id: UserId,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product_id: ProductId,
    pub provider_id: UserId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub city: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub city: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleFavoriteRequest {
    pub product_id: ProductId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleFavoriteResponse {
    pub product_id: ProductId,
    pub favorited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub provider_id: UserId,
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub event_date: NaiveDate,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order_id: OrderId,
    pub client_id: UserId,
    pub provider_id: UserId,
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub event_date: NaiveDate,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOrderRequest {
    pub target: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRoomRequest {
    pub provider_id: UserId,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub client_id: UserId,
    pub provider_id: UserId,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub path: String,
    pub name: String,
    pub mime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub kind: MessageKind,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    pub kind: MessageKind,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentPayload>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub notification_id: NotificationId,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignOrganizerRequest {
    pub organizer_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentPayload {
    pub assignment_id: AssignmentId,
    pub client_id: UserId,
    pub organizer_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadObjectResponse {
    pub path: String,
    pub size_bytes: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    Login(LoginRequest),
    PlaceOrder(OrderDraft),
    AdvanceOrder {
        order_id: OrderId,
        target: OrderStatus,
    },
    SendMessage {
        room_id: RoomId,
        request: SendMessageRequest,
    },
    ToggleFavorite(ToggleFavoriteRequest),
    Notify(NotifyRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageReceived { message: MessagePayload },
    Error(ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_events_are_tagged() {
        let event = ServerEvent::MessageReceived {
            message: MessagePayload {
                message_id: MessageId(1),
                room_id: RoomId(2),
                sender_id: UserId(3),
                sender_username: Some("awa".to_string()),
                kind: MessageKind::Text,
                body: "Bonjour".to_string(),
                attachment: None,
                read: false,
                created_at: Utc::now(),
            },
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "message_received");
        assert_eq!(json["payload"]["message"]["body"], "Bonjour");
    }

    #[test]
    fn order_draft_omits_empty_notes() {
        let draft = OrderDraft {
            provider_id: UserId(7),
            total_cents: 150_000_00,
            deposit_cents: 50_000_00,
            event_date: NaiveDate::from_ymd_opt(2025, 6, 14).expect("date"),
            location: "Abidjan, Cocody".to_string(),
            notes: None,
        };
        let json = serde_json::to_value(&draft).expect("serialize");
        assert!(json.get("notes").is_none());
        assert_eq!(json["event_date"], "2025-06-14");
    }
}
