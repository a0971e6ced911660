use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{ApiContext, MAX_OBJECT_BYTES};
use shared::{
    domain::{AssignmentId, NotificationId, OrderId, ProductId, RoomId},
    error::{ApiError, ErrorCode},
    protocol::{
        AssignOrganizerRequest, AssignmentPayload, CreateProductRequest, LoginRequest,
        LoginResponse, NotificationPayload, NotifyRequest, OpenRoomRequest, OrderDraft,
        OrderPayload, ProductDetail, ProductSummary, RoomSummary, SendMessageRequest,
        ServerEvent, ToggleFavoriteRequest, ToggleFavoriteResponse, TransitionOrderRequest,
        UploadObjectResponse,
    },
};
use storage::{OrderParty, Storage};
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod session;

use config::{load_settings, normalize_database_url};
use session::{SessionIdentity, SessionKeys};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    events: broadcast::Sender<ServerEvent>,
    sessions: SessionKeys,
    session_ttl_seconds: i64,
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: Option<String>,
    category: Option<String>,
    limit: Option<u32>,
    before: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OrdersQuery {
    side: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<u32>,
    before: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NotificationsQuery {
    unread_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    path: String,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
    room_id: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(%database_url, %error, "failed to open SQLite database");
        error
    })?;
    let api = ApiContext { storage };
    let (events, _) = broadcast::channel(256);
    let public_url = settings
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", settings.server_bind));

    let state = AppState {
        api,
        events,
        sessions: SessionKeys::new(&settings.session_secret),
        session_ttl_seconds: settings.session_ttl_seconds,
        public_url,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(http_login))
        .route("/products", get(http_search_products).post(http_create_product))
        .route("/products/:product_id", get(http_product_detail))
        .route("/favorites/toggle", post(http_toggle_favorite))
        .route("/favorites", get(http_list_favorites))
        .route("/orders", get(http_list_orders).post(http_place_order))
        .route("/orders/:order_id", get(http_get_order))
        .route("/orders/:order_id/status", post(http_transition_order))
        .route("/rooms", get(http_list_rooms).post(http_open_room))
        .route(
            "/rooms/:room_id/messages",
            get(http_list_messages).post(http_post_message),
        )
        .route("/rooms/:room_id/read", post(http_mark_room_read))
        .route(
            "/notifications",
            get(http_list_notifications).post(http_notify),
        )
        .route(
            "/notifications/:notification_id/read",
            post(http_mark_notification_read),
        )
        .route("/assignments", post(http_assign_organizer))
        .route(
            "/assignments/:assignment_id/complete",
            post(http_complete_assignment),
        )
        // store_object enforces MAX_OBJECT_BYTES; the layer only stops runaway bodies.
        .route(
            "/objects/upload",
            post(upload_object)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_OBJECT_BYTES + 1024)),
        )
        .route("/objects/*path", get(serve_object))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

fn bearer_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<SessionIdentity, (StatusCode, Json<ApiError>)> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            error_response(ApiError::new(
                ErrorCode::Unauthorized,
                "missing bearer token",
            ))
        })?;
    state.sessions.verify(token).map_err(error_response)
}

fn object_url(public_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/objects/{}",
        public_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn resolve_summary_urls(state: &AppState, mut summary: ProductSummary) -> ProductSummary {
    summary.cover_image = summary
        .cover_image
        .map(|path| object_url(&state.public_url, &path));
    summary
}

fn resolve_detail_urls(state: &AppState, mut detail: ProductDetail) -> ProductDetail {
    detail.images = detail
        .images
        .into_iter()
        .map(|path| object_url(&state.public_url, &path))
        .collect();
    detail
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<ApiError>)> {
    let (user_id, username, role) = server_api::login(&state.api, &req.username, req.role)
        .await
        .map_err(error_response)?;
    let token = state
        .sessions
        .mint(user_id, role, state.session_ttl_seconds)
        .map_err(|err| error_response(ApiError::new(ErrorCode::Internal, err.to_string())))?;
    Ok(Json(LoginResponse {
        user_id,
        username,
        role,
        token,
    }))
}

async fn http_search_products(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<ProductSummary>>, (StatusCode, Json<ApiError>)> {
    let limit = q.limit.unwrap_or(50).clamp(1, 100);
    let products = server_api::search_products(
        &state.api,
        q.query.as_deref(),
        q.category.as_deref(),
        limit,
        q.before,
    )
    .await
    .map_err(error_response)?;
    Ok(Json(
        products
            .into_iter()
            .map(|summary| resolve_summary_urls(&state, summary))
            .collect(),
    ))
}

async fn http_product_detail(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Result<Json<ProductDetail>, (StatusCode, Json<ApiError>)> {
    let detail = server_api::get_product_detail(&state.api, ProductId(product_id))
        .await
        .map_err(error_response)?;
    Ok(Json(resolve_detail_urls(&state, detail)))
}

async fn http_create_product(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateProductRequest>,
) -> Result<Json<ProductDetail>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let detail = server_api::create_product(&state.api, identity.user_id, &req)
        .await
        .map_err(error_response)?;
    Ok(Json(resolve_detail_urls(&state, detail)))
}

async fn http_toggle_favorite(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ToggleFavoriteRequest>,
) -> Result<Json<ToggleFavoriteResponse>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let response = server_api::toggle_favorite(&state.api, identity.user_id, req.product_id)
        .await
        .map_err(error_response)?;
    Ok(Json(response))
}

async fn http_list_favorites(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProductSummary>>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let favorites = server_api::list_favorites(&state.api, identity.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(
        favorites
            .into_iter()
            .map(|summary| resolve_summary_urls(&state, summary))
            .collect(),
    ))
}

async fn http_place_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<OrderDraft>,
) -> Result<Json<OrderPayload>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let order = server_api::place_order(&state.api, identity.user_id, &draft)
        .await
        .map_err(error_response)?;
    Ok(Json(order))
}

async fn http_list_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<OrdersQuery>,
) -> Result<Json<Vec<OrderPayload>>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let party = match q.side.as_deref() {
        Some("provider") => OrderParty::Provider,
        _ => OrderParty::Client,
    };
    let orders = server_api::list_orders(&state.api, identity.user_id, party)
        .await
        .map_err(error_response)?;
    Ok(Json(orders))
}

async fn http_get_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderPayload>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let order = server_api::get_order_for(&state.api, identity.user_id, OrderId(order_id))
        .await
        .map_err(error_response)?;
    Ok(Json(order))
}

async fn http_transition_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
    Json(req): Json<TransitionOrderRequest>,
) -> Result<Json<OrderPayload>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let order = server_api::transition_order(
        &state.api,
        identity.user_id,
        OrderId(order_id),
        req.target,
    )
    .await
    .map_err(error_response)?;
    Ok(Json(order))
}

async fn http_open_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OpenRoomRequest>,
) -> Result<Json<RoomSummary>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let room = server_api::open_room(&state.api, identity.user_id, req.provider_id, &req.label)
        .await
        .map_err(error_response)?;
    Ok(Json(room))
}

async fn http_list_rooms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomSummary>>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let rooms = server_api::list_rooms(&state.api, identity.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(rooms))
}

async fn http_list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<i64>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<shared::protocol::MessagePayload>>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let limit = q.limit.unwrap_or(100).clamp(1, 100);
    let messages = server_api::list_room_messages(
        &state.api,
        identity.user_id,
        RoomId(room_id),
        limit,
        q.before,
    )
    .await
    .map_err(error_response)?;
    Ok(Json(messages))
}

async fn http_post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ServerEvent>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let event = server_api::post_room_message(&state.api, identity.user_id, RoomId(room_id), &req)
        .await
        .map_err(error_response)?;
    let _ = state.events.send(event.clone());
    Ok(Json(event))
}

async fn http_mark_room_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let updated = server_api::mark_room_read(&state.api, identity.user_id, RoomId(room_id))
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn http_notify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Result<Json<NotificationPayload>, (StatusCode, Json<ApiError>)> {
    bearer_identity(&state, &headers)?;
    let notification = server_api::notify(&state.api, &req)
        .await
        .map_err(error_response)?;
    Ok(Json(notification))
}

async fn http_list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<NotificationsQuery>,
) -> Result<Json<Vec<NotificationPayload>>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let notifications = server_api::list_notifications(
        &state.api,
        identity.user_id,
        q.unread_only.unwrap_or(false),
    )
    .await
    .map_err(error_response)?;
    Ok(Json(notifications))
}

async fn http_mark_notification_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(notification_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    server_api::mark_notification_read(
        &state.api,
        identity.user_id,
        NotificationId(notification_id),
    )
    .await
    .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_assign_organizer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AssignOrganizerRequest>,
) -> Result<Json<AssignmentPayload>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let assignment = server_api::assign_organizer(&state.api, identity.user_id, &req)
        .await
        .map_err(error_response)?;
    Ok(Json(assignment))
}

async fn http_complete_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(assignment_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    server_api::complete_assignment(&state.api, identity.user_id, AssignmentId(assignment_id))
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_object(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<UploadObjectResponse>, (StatusCode, Json<ApiError>)> {
    let identity = bearer_identity(&state, &headers)?;
    let (path, size_bytes) = server_api::store_object(
        &state.api,
        identity.user_id,
        &q.path,
        q.content_type.as_deref().unwrap_or(""),
        &body,
    )
    .await
    .map_err(error_response)?;
    let url = object_url(&state.public_url, &path);
    Ok(Json(UploadObjectResponse {
        path,
        size_bytes,
        url,
    }))
}

async fn serve_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let object = server_api::load_object(&state.api, &path)
        .await
        .map_err(error_response)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok((StatusCode::OK, headers, object.body))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let identity = state.sessions.verify(&q.token).map_err(error_response)?;
    let room_id = RoomId(q.room_id);
    server_api::get_room_for(&state.api, identity.user_id, room_id)
        .await
        .map_err(error_response)?;
    Ok(ws.on_upgrade(move |socket| ws_connection(state, socket, room_id)))
}

fn event_is_for_room(event: &ServerEvent, room_id: RoomId) -> bool {
    match event {
        ServerEvent::MessageReceived { message } => message.room_id == room_id,
        ServerEvent::Error(_) => false,
    }
}

async fn ws_connection(
    state: Arc<AppState>,
    socket: axum::extract::ws::WebSocket,
    room_id: RoomId,
) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                // a lagging socket skips frames; the feed catches up over HTTP
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if !event_is_for_room(&event, room_id) {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::Response};
    use shared::domain::{MessageKind, UserId};
    use tower::ServiceExt;

    async fn test_app() -> (Router, Arc<AppState>) {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let api = ApiContext { storage };
        let (events, _) = broadcast::channel(32);
        let state = Arc::new(AppState {
            api,
            events,
            sessions: SessionKeys::new("test-secret"),
            session_ttl_seconds: 3600,
            public_url: "http://127.0.0.1:8080".to_string(),
        });
        (build_router(state.clone()), state)
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    async fn login(app: &Router, username: &str, role: &str) -> (i64, String) {
        let request = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"username":"{username}","role":"{role}"}}"#
            )))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let value = read_json(response).await;
        (
            value["user_id"].as_i64().expect("user_id"),
            value["token"].as_str().expect("token").to_string(),
        )
    }

    fn authed_post(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn requests_without_a_token_are_rejected() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(Request::get("/orders").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let value = read_json(response).await;
        assert_eq!(value["code"], "unauthorized");
    }

    #[tokio::test]
    async fn order_transitions_enforce_party_and_graph() {
        let (app, _) = test_app().await;
        let (_, client_token) = login(&app, "awa", "client").await;
        let (provider_id, provider_token) = login(&app, "kone-events", "provider").await;

        let place = authed_post(
            "/orders",
            &client_token,
            serde_json::json!({
                "provider_id": provider_id,
                "total_cents": 15_000_000,
                "deposit_cents": 5_000_000,
                "event_date": "2025-06-14",
                "location": "Abidjan, Cocody"
            }),
        );
        let response = app.clone().oneshot(place).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let order = read_json(response).await;
        assert_eq!(order["status"], "pending");
        let order_id = order["order_id"].as_i64().expect("order_id");

        // requesting party holds no transition capability
        let forbidden = authed_post(
            &format!("/orders/{order_id}/status"),
            &client_token,
            serde_json::json!({ "target": "confirmed" }),
        );
        let response = app.clone().oneshot(forbidden).await.expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let skip = authed_post(
            &format!("/orders/{order_id}/status"),
            &provider_token,
            serde_json::json!({ "target": "completed" }),
        );
        let response = app.clone().oneshot(skip).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let confirm = authed_post(
            &format!("/orders/{order_id}/status"),
            &provider_token,
            serde_json::json!({ "target": "confirmed" }),
        );
        let response = app.clone().oneshot(confirm).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let updated = read_json(response).await;
        assert_eq!(updated["status"], "confirmed");
    }

    #[tokio::test]
    async fn objects_upload_authenticated_and_serve_publicly() {
        let (app, _) = test_app().await;
        let (_, token) = login(&app, "awa", "client").await;

        let anonymous = Request::post("/objects/upload?path=u1/devis.pdf")
            .body(Body::from("contenu"))
            .expect("request");
        let response = app.clone().oneshot(anonymous).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let upload = Request::post("/objects/upload?path=u1/devis.pdf&content_type=application/pdf")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from("contenu"))
            .expect("request");
        let response = app.clone().oneshot(upload).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let value = read_json(response).await;
        assert_eq!(value["path"], "u1/devis.pdf");
        assert_eq!(
            value["url"],
            "http://127.0.0.1:8080/objects/u1/devis.pdf"
        );

        let fetch = Request::get("/objects/u1/devis.pdf")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(fetch).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/pdf")
        );
    }

    #[tokio::test]
    async fn contact_sharing_maps_to_bad_request() {
        let (app, _) = test_app().await;
        let (_, client_token) = login(&app, "awa", "client").await;
        let (provider_id, _) = login(&app, "kone-events", "provider").await;

        let open = authed_post(
            "/rooms",
            &client_token,
            serde_json::json!({ "provider_id": provider_id, "label": "Mariage juin" }),
        );
        let response = app.clone().oneshot(open).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let room = read_json(response).await;
        let room_id = room["room_id"].as_i64().expect("room_id");

        let message = authed_post(
            &format!("/rooms/{room_id}/messages"),
            &client_token,
            serde_json::json!({ "kind": "text", "body": "Mon numéro: 0700000000" }),
        );
        let response = app.oneshot(message).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = read_json(response).await;
        assert_eq!(value["code"], "validation");
        assert!(value["message"]
            .as_str()
            .expect("message")
            .contains("partage de coordonnées"));
    }

    #[tokio::test]
    async fn posted_messages_reach_the_broadcast_channel() {
        let (app, state) = test_app().await;
        let (_, client_token) = login(&app, "awa", "client").await;
        let (provider_id, _) = login(&app, "kone-events", "provider").await;

        let open = authed_post(
            "/rooms",
            &client_token,
            serde_json::json!({ "provider_id": provider_id, "label": "" }),
        );
        let response = app.clone().oneshot(open).await.expect("response");
        let room = read_json(response).await;
        let room_id = room["room_id"].as_i64().expect("room_id");

        let mut events = state.events.subscribe();
        let message = authed_post(
            &format!("/rooms/{room_id}/messages"),
            &client_token,
            serde_json::json!({ "kind": "text", "body": "Bonjour, je suis disponible demain" }),
        );
        let response = app.oneshot(message).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let event = events.recv().await.expect("event");
        match event {
            ServerEvent::MessageReceived { message } => {
                assert_eq!(message.room_id, RoomId(room_id));
                assert_eq!(message.body, "Bonjour, je suis disponible demain");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn ws_filter_only_passes_the_subscribed_room() {
        let payload = shared::protocol::MessagePayload {
            message_id: shared::domain::MessageId(1),
            room_id: RoomId(5),
            sender_id: UserId(1),
            sender_username: None,
            kind: MessageKind::Text,
            body: "Bonjour".to_string(),
            attachment: None,
            read: false,
            created_at: chrono::Utc::now(),
        };
        let event = ServerEvent::MessageReceived { message: payload };
        assert!(event_is_for_room(&event, RoomId(5)));
        assert!(!event_is_for_room(&event, RoomId(6)));
        assert!(!event_is_for_room(
            &ServerEvent::Error(ApiError::new(ErrorCode::Internal, "x")),
            RoomId(5)
        ));
    }

    #[tokio::test]
    async fn unknown_objects_return_the_not_found_envelope() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(
                Request::get("/objects/u9/absent.jpg")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let value = read_json(response).await;
        assert_eq!(value["code"], "not_found");
    }

    #[tokio::test]
    async fn product_detail_resolves_image_urls() {
        let (app, _) = test_app().await;
        let (_, provider_token) = login(&app, "kone-events", "provider").await;

        let create = authed_post(
            "/products",
            &provider_token,
            serde_json::json!({
                "name": "Tente blanche 50 places",
                "description": "Tente de réception",
                "category": "tentes",
                "price_cents": 15_000_000,
                "city": "Abidjan",
                "images": ["catalogue/tente.jpg"]
            }),
        );
        let response = app.clone().oneshot(create).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let created = read_json(response).await;
        let product_id = created["product_id"].as_i64().expect("product_id");

        let detail = Request::get(format!("/products/{product_id}"))
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(detail).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let value = read_json(response).await;
        assert_eq!(
            value["images"][0],
            "http://127.0.0.1:8080/objects/catalogue/tente.jpg"
        );
    }
}
