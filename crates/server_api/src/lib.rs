use std::collections::HashMap;

use shared::{
    domain::{
        AssignmentId, MessageKind, NotificationId, OrderId, OrderStatus, ProductId, RoomId,
        UserId, UserRole,
    },
    error::{ApiError, ErrorCode},
    moderation,
    protocol::{
        AssignOrganizerRequest, AssignmentPayload, AttachmentPayload, CreateProductRequest,
        MessagePayload, NotificationPayload, NotifyRequest, OrderDraft, OrderPayload,
        ProductDetail, ProductSummary, RoomSummary, SendMessageRequest, ServerEvent,
        ToggleFavoriteResponse,
    },
};
use storage::{
    OrderParty, Storage, StoredAssignment, StoredAttachment, StoredNotification, StoredObject,
    StoredOrder, StoredProduct, StoredRoom, StoredUser,
};
use tracing::info;

pub const MAX_OBJECT_BYTES: usize = 8 * 1024 * 1024;
pub const MAX_OBJECT_PATH_CHARS: usize = 180;
pub const MAX_USERNAME_CHARS: usize = 64;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn login(
    ctx: &ApiContext,
    username: &str,
    role: UserRole,
) -> Result<(UserId, String, UserRole), ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "username is empty"));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::new(ErrorCode::Validation, "username is too long"));
    }
    let (user_id, effective_role) = ctx
        .storage
        .upsert_user(username, role)
        .await
        .map_err(internal)?;
    Ok((user_id, username.to_string(), effective_role))
}

pub async fn search_products(
    ctx: &ApiContext,
    query: Option<&str>,
    category: Option<&str>,
    limit: u32,
    before: Option<i64>,
) -> Result<Vec<ProductSummary>, ApiError> {
    let hits = ctx
        .storage
        .search_products(query, category, limit, before)
        .await
        .map_err(internal)?;
    Ok(hits
        .into_iter()
        .map(|(product, cover)| product_summary(product, cover))
        .collect())
}

pub async fn get_product_detail(
    ctx: &ApiContext,
    product_id: ProductId,
) -> Result<ProductDetail, ApiError> {
    let product = ctx
        .storage
        .get_product(product_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "product not found"))?;
    let images = ctx
        .storage
        .list_product_images(product_id)
        .await
        .map_err(internal)?;
    Ok(product_detail(product, images))
}

pub async fn create_product(
    ctx: &ApiContext,
    caller: UserId,
    request: &CreateProductRequest,
) -> Result<ProductDetail, ApiError> {
    let user = ensure_user(ctx, caller).await?;
    if user.role != UserRole::Provider && user.role != UserRole::Admin {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only providers can create listings",
        ));
    }
    if request.name.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "product name is empty"));
    }
    if request.category.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "category is empty"));
    }
    if request.price_cents < 0 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "price cannot be negative",
        ));
    }

    let product_id = ctx
        .storage
        .create_product(
            caller,
            request.name.trim(),
            &request.description,
            request.category.trim(),
            request.price_cents,
            &request.city,
        )
        .await
        .map_err(internal)?;
    for (position, path) in request.images.iter().enumerate() {
        ctx.storage
            .add_product_image(product_id, path, position as i64)
            .await
            .map_err(internal)?;
    }
    get_product_detail(ctx, product_id).await
}

pub async fn toggle_favorite(
    ctx: &ApiContext,
    caller: UserId,
    product_id: ProductId,
) -> Result<ToggleFavoriteResponse, ApiError> {
    ctx.storage
        .get_product(product_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "product not found"))?;
    let favorited = ctx
        .storage
        .toggle_favorite(caller, product_id)
        .await
        .map_err(internal)?;
    Ok(ToggleFavoriteResponse {
        product_id,
        favorited,
    })
}

pub async fn list_favorites(
    ctx: &ApiContext,
    caller: UserId,
) -> Result<Vec<ProductSummary>, ApiError> {
    let favorites = ctx.storage.list_favorites(caller).await.map_err(internal)?;
    Ok(favorites
        .into_iter()
        .map(|(product, cover)| product_summary(product, cover))
        .collect())
}

pub async fn place_order(
    ctx: &ApiContext,
    caller: UserId,
    draft: &OrderDraft,
) -> Result<OrderPayload, ApiError> {
    if caller == draft.provider_id {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "cannot order from yourself",
        ));
    }
    let provider = ensure_user(ctx, draft.provider_id).await.map_err(|err| {
        if err.code == ErrorCode::NotFound {
            ApiError::new(ErrorCode::Validation, "provider not found")
        } else {
            err
        }
    })?;
    if provider.role != UserRole::Provider {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "target user is not a provider",
        ));
    }
    if draft.total_cents < 0 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "total cannot be negative",
        ));
    }
    if draft.deposit_cents < 0 || draft.deposit_cents > draft.total_cents {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "deposit must stay within the total",
        ));
    }
    if draft.location.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "location is empty"));
    }

    let order = ctx
        .storage
        .create_order(
            caller,
            draft.provider_id,
            draft.total_cents,
            draft.deposit_cents,
            draft.event_date,
            draft.location.trim(),
            draft.notes.as_deref(),
        )
        .await
        .map_err(internal)?;

    ctx.storage
        .insert_notification(
            draft.provider_id,
            "order",
            "Nouvelle commande",
            &format!("Commande n°{} en attente de confirmation", order.order_id.0),
        )
        .await
        .map_err(internal)?;

    info!(
        order_id = order.order_id.0,
        client_id = caller.0,
        provider_id = draft.provider_id.0,
        "order placed"
    );
    Ok(order_payload(order))
}

pub async fn list_orders(
    ctx: &ApiContext,
    caller: UserId,
    party: OrderParty,
) -> Result<Vec<OrderPayload>, ApiError> {
    let orders = ctx
        .storage
        .list_orders_for(caller, party)
        .await
        .map_err(internal)?;
    Ok(orders.into_iter().map(order_payload).collect())
}

pub async fn get_order_for(
    ctx: &ApiContext,
    caller: UserId,
    order_id: OrderId,
) -> Result<OrderPayload, ApiError> {
    let order = ensure_order(ctx, order_id).await?;
    if order.client_id != caller && order.provider_id != caller {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "caller is not a party to this order",
        ));
    }
    Ok(order_payload(order))
}

/// The one write path for order statuses. Only the fulfilling provider may
/// move an order, only along the legal graph, and a concurrent move turns
/// into a conflict instead of a silent overwrite.
pub async fn transition_order(
    ctx: &ApiContext,
    caller: UserId,
    order_id: OrderId,
    target: OrderStatus,
) -> Result<OrderPayload, ApiError> {
    let order = ensure_order(ctx, order_id).await?;
    if order.provider_id != caller {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only the provider can update the order status",
        ));
    }
    if order.status.is_terminal() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("order is {:?} and cannot change anymore", order.status),
        ));
    }
    if !order.status.can_transition_to(target) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("illegal transition {:?} -> {:?}", order.status, target),
        ));
    }

    let moved = ctx
        .storage
        .transition_order(order_id, order.status, target)
        .await
        .map_err(internal)?;
    if !moved {
        return Err(ApiError::new(
            ErrorCode::Conflict,
            "order status changed concurrently",
        ));
    }

    let updated = ensure_order(ctx, order_id).await?;
    ctx.storage
        .insert_notification(
            updated.client_id,
            "order",
            &format!("Commande {}", target.label_fr().to_lowercase()),
            &format!("Commande n°{} : {}", order_id.0, target.label_fr()),
        )
        .await
        .map_err(internal)?;

    info!(
        order_id = order_id.0,
        from = ?order.status,
        to = ?target,
        "order status updated"
    );
    Ok(order_payload(updated))
}

pub async fn open_room(
    ctx: &ApiContext,
    caller: UserId,
    provider_id: UserId,
    label: &str,
) -> Result<RoomSummary, ApiError> {
    if caller == provider_id {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "cannot open a room with yourself",
        ));
    }
    let provider = ensure_user(ctx, provider_id).await.map_err(|err| {
        if err.code == ErrorCode::NotFound {
            ApiError::new(ErrorCode::Validation, "provider not found")
        } else {
            err
        }
    })?;
    if provider.role != UserRole::Provider {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "rooms are opened with providers",
        ));
    }
    let room = ctx
        .storage
        .open_room(caller, provider_id, label)
        .await
        .map_err(internal)?;
    Ok(room_summary(room))
}

pub async fn get_room_for(
    ctx: &ApiContext,
    caller: UserId,
    room_id: RoomId,
) -> Result<RoomSummary, ApiError> {
    let room = ensure_room_member(ctx, room_id, caller).await?;
    Ok(room_summary(room))
}

pub async fn list_rooms(ctx: &ApiContext, caller: UserId) -> Result<Vec<RoomSummary>, ApiError> {
    let rooms = ctx
        .storage
        .list_rooms_for(caller)
        .await
        .map_err(internal)?;
    Ok(rooms.into_iter().map(room_summary).collect())
}

pub async fn list_room_messages(
    ctx: &ApiContext,
    caller: UserId,
    room_id: RoomId,
    limit: u32,
    before: Option<i64>,
) -> Result<Vec<MessagePayload>, ApiError> {
    ensure_room_member(ctx, room_id, caller).await?;
    let messages = ctx
        .storage
        .list_messages(room_id, limit, before)
        .await
        .map_err(internal)?;

    let mut username_cache: HashMap<UserId, Option<String>> = HashMap::new();
    let mut payloads = Vec::with_capacity(messages.len());
    for message in messages {
        let sender_username = if let Some(cached) = username_cache.get(&message.sender_id) {
            cached.clone()
        } else {
            let resolved = ctx
                .storage
                .username_for_user(message.sender_id)
                .await
                .map_err(internal)?;
            username_cache.insert(message.sender_id, resolved.clone());
            resolved
        };
        payloads.push(message_payload(message, sender_username));
    }
    Ok(payloads)
}

/// Applies the chat content policy server-side before anything is stored,
/// mirroring the check clients run locally.
pub async fn post_room_message(
    ctx: &ApiContext,
    caller: UserId,
    room_id: RoomId,
    request: &SendMessageRequest,
) -> Result<ServerEvent, ApiError> {
    ensure_room_member(ctx, room_id, caller).await?;

    let attachment = match request.kind {
        MessageKind::Text => {
            moderation::validate_message(&request.body)
                .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))?;
            None
        }
        MessageKind::Image | MessageKind::Voice => {
            let attachment = request.attachment.as_ref().ok_or_else(|| {
                ApiError::new(ErrorCode::Validation, "attachment is required for this kind")
            })?;
            if !request.body.is_empty() {
                moderation::validate_message(&request.body)
                    .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))?;
            }
            Some(StoredAttachment {
                path: attachment.path.clone(),
                name: attachment.name.clone(),
                mime: attachment.mime.clone(),
            })
        }
    };

    let stored = ctx
        .storage
        .insert_message(room_id, caller, request.kind, &request.body, attachment.as_ref())
        .await
        .map_err(internal)?;
    let sender_username = ctx
        .storage
        .username_for_user(caller)
        .await
        .map_err(internal)?;

    Ok(ServerEvent::MessageReceived {
        message: message_payload(stored, sender_username),
    })
}

pub async fn mark_room_read(
    ctx: &ApiContext,
    caller: UserId,
    room_id: RoomId,
) -> Result<u64, ApiError> {
    ensure_room_member(ctx, room_id, caller).await?;
    ctx.storage
        .mark_room_read(room_id, caller)
        .await
        .map_err(internal)
}

pub async fn notify(
    ctx: &ApiContext,
    request: &NotifyRequest,
) -> Result<NotificationPayload, ApiError> {
    ensure_user(ctx, request.user_id).await.map_err(|err| {
        if err.code == ErrorCode::NotFound {
            ApiError::new(ErrorCode::Validation, "recipient not found")
        } else {
            err
        }
    })?;
    if request.title.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "title is empty"));
    }
    let stored = ctx
        .storage
        .insert_notification(request.user_id, &request.kind, &request.title, &request.body)
        .await
        .map_err(internal)?;
    Ok(notification_payload(stored))
}

pub async fn list_notifications(
    ctx: &ApiContext,
    caller: UserId,
    unread_only: bool,
) -> Result<Vec<NotificationPayload>, ApiError> {
    let notifications = ctx
        .storage
        .list_notifications(caller, unread_only)
        .await
        .map_err(internal)?;
    Ok(notifications
        .into_iter()
        .map(notification_payload)
        .collect())
}

pub async fn mark_notification_read(
    ctx: &ApiContext,
    caller: UserId,
    notification_id: NotificationId,
) -> Result<(), ApiError> {
    let marked = ctx
        .storage
        .mark_notification_read(notification_id, caller)
        .await
        .map_err(internal)?;
    if !marked {
        return Err(ApiError::new(ErrorCode::NotFound, "notification not found"));
    }
    Ok(())
}

/// Idempotent for the organizer already assigned; anything else while an
/// assignment is active is a validation error.
pub async fn assign_organizer(
    ctx: &ApiContext,
    caller: UserId,
    request: &AssignOrganizerRequest,
) -> Result<AssignmentPayload, ApiError> {
    let organizer = ensure_user(ctx, request.organizer_id).await.map_err(|err| {
        if err.code == ErrorCode::NotFound {
            ApiError::new(ErrorCode::Validation, "organizer not found")
        } else {
            err
        }
    })?;
    if organizer.role != UserRole::Organizer {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "target user is not an organizer",
        ));
    }

    if let Some(active) = ctx
        .storage
        .active_assignment(caller)
        .await
        .map_err(internal)?
    {
        if active.organizer_id == request.organizer_id {
            return Ok(assignment_payload(active));
        }
        return Err(ApiError::new(
            ErrorCode::Validation,
            "an organizer is already assigned",
        ));
    }

    let created = ctx
        .storage
        .create_assignment(caller, request.organizer_id, request.event_date)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(ErrorCode::Conflict, "assignment raced with another request")
        })?;
    Ok(assignment_payload(created))
}

pub async fn complete_assignment(
    ctx: &ApiContext,
    caller: UserId,
    assignment_id: AssignmentId,
) -> Result<(), ApiError> {
    let completed = ctx
        .storage
        .complete_assignment(assignment_id, caller)
        .await
        .map_err(internal)?;
    if !completed {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            "no active assignment to complete",
        ));
    }
    Ok(())
}

/// Validates and stores an opaque blob. Returns the path and stored size;
/// URL assembly belongs to the HTTP layer.
pub async fn store_object(
    ctx: &ApiContext,
    caller: UserId,
    path: &str,
    content_type: &str,
    body: &[u8],
) -> Result<(String, i64), ApiError> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "object path is empty"));
    }
    if path.chars().count() > MAX_OBJECT_PATH_CHARS {
        return Err(ApiError::new(ErrorCode::Validation, "object path is too long"));
    }
    if path.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(ApiError::new(ErrorCode::Validation, "object path is invalid"));
    }
    if body.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "object body is empty"));
    }
    if body.len() > MAX_OBJECT_BYTES {
        return Err(ApiError::new(ErrorCode::Validation, "object is too large"));
    }
    let content_type = if content_type.trim().is_empty() {
        "application/octet-stream"
    } else {
        content_type
    };

    let size_bytes = ctx
        .storage
        .put_object(path, content_type, body, Some(caller))
        .await
        .map_err(internal)?;
    Ok((path.to_string(), size_bytes))
}

pub async fn load_object(ctx: &ApiContext, path: &str) -> Result<StoredObject, ApiError> {
    ctx.storage
        .get_object(path)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "object not found"))
}

async fn ensure_user(ctx: &ApiContext, user_id: UserId) -> Result<StoredUser, ApiError> {
    ctx.storage
        .get_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))
}

async fn ensure_order(ctx: &ApiContext, order_id: OrderId) -> Result<StoredOrder, ApiError> {
    ctx.storage
        .get_order(order_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "order not found"))
}

async fn ensure_room_member(
    ctx: &ApiContext,
    room_id: RoomId,
    user_id: UserId,
) -> Result<StoredRoom, ApiError> {
    let room = ctx
        .storage
        .get_room(room_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "room not found"))?;
    if room.client_id != user_id && room.provider_id != user_id {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "user is not a member of this room",
        ));
    }
    Ok(room)
}

fn product_summary(product: StoredProduct, cover: Option<String>) -> ProductSummary {
    ProductSummary {
        product_id: product.product_id,
        provider_id: product.provider_id,
        name: product.name,
        category: product.category,
        price_cents: product.price_cents,
        city: product.city,
        cover_image: cover,
    }
}

fn product_detail(product: StoredProduct, images: Vec<String>) -> ProductDetail {
    ProductDetail {
        product_id: product.product_id,
        provider_id: product.provider_id,
        name: product.name,
        description: product.description,
        category: product.category,
        price_cents: product.price_cents,
        city: product.city,
        images,
        created_at: product.created_at,
    }
}

fn order_payload(order: StoredOrder) -> OrderPayload {
    OrderPayload {
        order_id: order.order_id,
        client_id: order.client_id,
        provider_id: order.provider_id,
        total_cents: order.total_cents,
        deposit_cents: order.deposit_cents,
        event_date: order.event_date,
        location: order.location,
        notes: order.notes,
        status: order.status,
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

fn room_summary(room: StoredRoom) -> RoomSummary {
    RoomSummary {
        room_id: room.room_id,
        client_id: room.client_id,
        provider_id: room.provider_id,
        label: room.label,
        created_at: room.created_at,
    }
}

fn message_payload(
    message: storage::StoredMessage,
    sender_username: Option<String>,
) -> MessagePayload {
    MessagePayload {
        message_id: message.message_id,
        room_id: message.room_id,
        sender_id: message.sender_id,
        sender_username,
        kind: message.kind,
        body: message.body,
        attachment: message.attachment.map(|a| AttachmentPayload {
            path: a.path,
            name: a.name,
            mime: a.mime,
        }),
        read: message.read,
        created_at: message.created_at,
    }
}

fn notification_payload(notification: StoredNotification) -> NotificationPayload {
    NotificationPayload {
        notification_id: notification.notification_id,
        user_id: notification.user_id,
        kind: notification.kind,
        title: notification.title,
        body: notification.body,
        read: notification.read,
        created_at: notification.created_at,
    }
}

fn assignment_payload(assignment: StoredAssignment) -> AssignmentPayload {
    AssignmentPayload {
        assignment_id: assignment.assignment_id,
        client_id: assignment.client_id,
        organizer_id: assignment.organizer_id,
        event_date: assignment.event_date,
        active: assignment.active,
        created_at: assignment.created_at,
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn setup() -> (ApiContext, UserId, UserId) {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let (client, _) = storage
            .upsert_user("awa", UserRole::Client)
            .await
            .expect("client");
        let (provider, _) = storage
            .upsert_user("kone-events", UserRole::Provider)
            .await
            .expect("provider");
        (ApiContext { storage }, client, provider)
    }

    fn draft(provider: UserId) -> OrderDraft {
        OrderDraft {
            provider_id: provider,
            total_cents: 150_000_00,
            deposit_cents: 50_000_00,
            event_date: NaiveDate::from_ymd_opt(2025, 6, 14).expect("date"),
            location: "Abidjan, Cocody".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn client_cannot_transition_their_own_order() {
        let (ctx, client, provider) = setup().await;
        let order = place_order(&ctx, client, &draft(provider)).await.expect("order");

        let err = transition_order(&ctx, client, order.order_id, OrderStatus::Confirmed)
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn provider_walks_the_legal_graph() {
        let (ctx, client, provider) = setup().await;
        let order = place_order(&ctx, client, &draft(provider)).await.expect("order");
        assert_eq!(order.status, OrderStatus::Pending);

        let confirmed = transition_order(&ctx, provider, order.order_id, OrderStatus::Confirmed)
            .await
            .expect("confirm");
        assert_eq!(confirmed.status, OrderStatus::Confirmed);

        let started = transition_order(&ctx, provider, order.order_id, OrderStatus::InProgress)
            .await
            .expect("start");
        assert_eq!(started.status, OrderStatus::InProgress);

        let done = transition_order(&ctx, provider, order.order_id, OrderStatus::Completed)
            .await
            .expect("complete");
        assert_eq!(done.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn skipping_a_step_is_rejected() {
        let (ctx, client, provider) = setup().await;
        let order = place_order(&ctx, client, &draft(provider)).await.expect("order");

        let err = transition_order(&ctx, provider, order.order_id, OrderStatus::Completed)
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn terminal_orders_refuse_every_transition() {
        let (ctx, client, provider) = setup().await;
        let order = place_order(&ctx, client, &draft(provider)).await.expect("order");
        transition_order(&ctx, provider, order.order_id, OrderStatus::Cancelled)
            .await
            .expect("cancel");

        for target in [
            OrderStatus::Confirmed,
            OrderStatus::InProgress,
            OrderStatus::Completed,
        ] {
            let err = transition_order(&ctx, provider, order.order_id, target)
                .await
                .expect_err("should fail");
            assert_eq!(err.code, ErrorCode::Validation);
        }
    }

    #[tokio::test]
    async fn each_transition_notifies_the_client() {
        let (ctx, client, provider) = setup().await;
        let order = place_order(&ctx, client, &draft(provider)).await.expect("order");
        transition_order(&ctx, provider, order.order_id, OrderStatus::Confirmed)
            .await
            .expect("confirm");

        let notifications = list_notifications(&ctx, client, true).await.expect("list");
        assert!(notifications
            .iter()
            .any(|n| n.kind == "order" && n.body.contains("Confirmée")));
    }

    #[tokio::test]
    async fn placing_an_order_validates_the_draft() {
        let (ctx, client, provider) = setup().await;

        let mut bad = draft(provider);
        bad.deposit_cents = bad.total_cents + 1;
        let err = place_order(&ctx, client, &bad).await.expect_err("deposit");
        assert_eq!(err.code, ErrorCode::Validation);

        let mut bad = draft(provider);
        bad.provider_id = client;
        let err = place_order(&ctx, client, &bad).await.expect_err("self order");
        assert_eq!(err.code, ErrorCode::Validation);

        let err = place_order(&ctx, client, &draft(UserId(9999)))
            .await
            .expect_err("unknown provider");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn contact_sharing_is_rejected_and_nothing_is_stored() {
        let (ctx, client, provider) = setup().await;
        let room = open_room(&ctx, client, provider, "Mariage juin")
            .await
            .expect("room");

        let request = SendMessageRequest {
            kind: MessageKind::Text,
            body: "Appelez-moi au +225 07 00 00 00 00".to_string(),
            attachment: None,
        };
        let err = post_room_message(&ctx, client, room.room_id, &request)
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.contains("partage de coordonnées"));

        let feed = list_room_messages(&ctx, client, room.room_id, 10, None)
            .await
            .expect("feed");
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn ordinary_chat_flows_end_to_end() {
        let (ctx, client, provider) = setup().await;
        let room = open_room(&ctx, client, provider, "Mariage juin")
            .await
            .expect("room");

        let request = SendMessageRequest {
            kind: MessageKind::Text,
            body: "Bonjour, je suis disponible demain".to_string(),
            attachment: None,
        };
        let event = post_room_message(&ctx, client, room.room_id, &request)
            .await
            .expect("post");
        let ServerEvent::MessageReceived { message } = event else {
            panic!("expected message event");
        };
        assert_eq!(message.body, "Bonjour, je suis disponible demain");
        assert_eq!(message.sender_username.as_deref(), Some("awa"));

        let feed = list_room_messages(&ctx, provider, room.room_id, 10, None)
            .await
            .expect("feed");
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_post_in_a_room() {
        let (ctx, client, provider) = setup().await;
        let (outsider, _) = ctx
            .storage
            .upsert_user("yao", UserRole::Client)
            .await
            .expect("outsider");
        let room = open_room(&ctx, client, provider, "").await.expect("room");

        let err = list_room_messages(&ctx, outsider, room.room_id, 10, None)
            .await
            .expect_err("read");
        assert_eq!(err.code, ErrorCode::Forbidden);

        let request = SendMessageRequest {
            kind: MessageKind::Text,
            body: "Bonjour".to_string(),
            attachment: None,
        };
        let err = post_room_message(&ctx, outsider, room.room_id, &request)
            .await
            .expect_err("post");
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn image_messages_require_an_attachment() {
        let (ctx, client, provider) = setup().await;
        let room = open_room(&ctx, client, provider, "").await.expect("room");

        let request = SendMessageRequest {
            kind: MessageKind::Image,
            body: String::new(),
            attachment: None,
        };
        let err = post_room_message(&ctx, client, room.room_id, &request)
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn favorites_toggle_through_the_api() {
        let (ctx, client, provider) = setup().await;
        let listing = create_product(
            &ctx,
            provider,
            &CreateProductRequest {
                name: "Tente blanche".to_string(),
                description: String::new(),
                category: "tentes".to_string(),
                price_cents: 150_000_00,
                city: "Abidjan".to_string(),
                images: vec!["catalogue/tente.jpg".to_string()],
            },
        )
        .await
        .expect("product");

        let on = toggle_favorite(&ctx, client, listing.product_id)
            .await
            .expect("toggle");
        assert!(on.favorited);
        let off = toggle_favorite(&ctx, client, listing.product_id)
            .await
            .expect("toggle");
        assert!(!off.favorited);
        assert!(list_favorites(&ctx, client).await.expect("list").is_empty());

        let err = toggle_favorite(&ctx, client, ProductId(424242))
            .await
            .expect_err("unknown product");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn only_providers_create_listings() {
        let (ctx, client, _) = setup().await;
        let err = create_product(
            &ctx,
            client,
            &CreateProductRequest {
                name: "Tente".to_string(),
                description: String::new(),
                category: "tentes".to_string(),
                price_cents: 1,
                city: String::new(),
                images: Vec::new(),
            },
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn organizer_assignment_is_idempotent_per_organizer() {
        let (ctx, client, _) = setup().await;
        let (organizer, _) = ctx
            .storage
            .upsert_user("fatou-orga", UserRole::Organizer)
            .await
            .expect("organizer");
        let (other, _) = ctx
            .storage
            .upsert_user("yao-orga", UserRole::Organizer)
            .await
            .expect("organizer");

        let request = AssignOrganizerRequest {
            organizer_id: organizer,
            event_date: None,
        };
        let first = assign_organizer(&ctx, client, &request).await.expect("assign");
        let again = assign_organizer(&ctx, client, &request).await.expect("assign");
        assert_eq!(first.assignment_id, again.assignment_id);

        let err = assign_organizer(
            &ctx,
            client,
            &AssignOrganizerRequest {
                organizer_id: other,
                event_date: None,
            },
        )
        .await
        .expect_err("second organizer");
        assert_eq!(err.code, ErrorCode::Validation);

        complete_assignment(&ctx, client, first.assignment_id)
            .await
            .expect("complete");
        let renewed = assign_organizer(
            &ctx,
            client,
            &AssignOrganizerRequest {
                organizer_id: other,
                event_date: None,
            },
        )
        .await
        .expect("assign after complete");
        assert_eq!(renewed.organizer_id, other);
    }

    #[tokio::test]
    async fn assigning_a_non_organizer_is_rejected() {
        let (ctx, client, provider) = setup().await;
        let err = assign_organizer(
            &ctx,
            client,
            &AssignOrganizerRequest {
                organizer_id: provider,
                event_date: None,
            },
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn object_paths_are_validated() {
        let (ctx, client, _) = setup().await;

        let err = store_object(&ctx, client, "../secrets", "text/plain", b"x")
            .await
            .expect_err("traversal");
        assert_eq!(err.code, ErrorCode::Validation);

        let err = store_object(&ctx, client, "", "text/plain", b"x")
            .await
            .expect_err("empty");
        assert_eq!(err.code, ErrorCode::Validation);

        let long = "a/".repeat(120);
        let err = store_object(&ctx, client, &long, "text/plain", b"x")
            .await
            .expect_err("too long");
        assert_eq!(err.code, ErrorCode::Validation);

        let (path, size) = store_object(&ctx, client, "u1/devis.pdf", "", b"contenu")
            .await
            .expect("store");
        assert_eq!(path, "u1/devis.pdf");
        assert_eq!(size, 7);
        let loaded = load_object(&ctx, "u1/devis.pdf").await.expect("load");
        assert_eq!(loaded.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn login_normalizes_and_validates_usernames() {
        let (ctx, _, _) = setup().await;
        let err = login(&ctx, "   ", UserRole::Client).await.expect_err("empty");
        assert_eq!(err.code, ErrorCode::Validation);

        let (id_a, name, _) = login(&ctx, "  mariam ", UserRole::Client)
            .await
            .expect("login");
        assert_eq!(name, "mariam");
        let (id_b, _, role) = login(&ctx, "mariam", UserRole::Provider)
            .await
            .expect("login");
        assert_eq!(id_a, id_b);
        assert_eq!(role, UserRole::Client);
    }
}
