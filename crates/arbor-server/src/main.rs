use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use arbor_api::middleware::{decode_token, require_auth};
use arbor_api::state::{AppState, AppStateInner};
use arbor_api::{chats, messages, notifications, pods, push, rooms};
use arbor_gateway::connection::{self, GatewayContext};
use arbor_gateway::dispatcher::Dispatcher;
use arbor_notify::Notifier;
use arbor_notify::push::HttpPushTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbor=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("ARBOR_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("ARBOR_DB_PATH").unwrap_or_else(|_| "arbor.db".into());
    let host = std::env::var("ARBOR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ARBOR_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let push_timeout: u64 = std::env::var("ARBOR_PUSH_TIMEOUT_SECS")
        .unwrap_or_else(|_| "10".into())
        .parse()?;

    // Init database
    let db = Arc::new(arbor_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared services, constructed once and injected everywhere
    let dispatcher = Dispatcher::new();
    let transport = HttpPushTransport::new(Duration::from_secs(push_timeout))?;
    let notifier = Notifier::new(
        db.clone(),
        Arc::new(dispatcher.clone()),
        Arc::new(transport),
    );

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher,
        notifier,
        jwt_secret,
    });

    // Routes
    let protected_routes = Router::new()
        .route("/pods", post(pods::create_pod))
        .route(
            "/pods/{pod_id}/members",
            post(pods::join_pod).delete(pods::leave_pod),
        )
        .route(
            "/pods/{pod_id}/members/{user_id}/role",
            post(pods::set_member_role),
        )
        .route("/pods/{pod_id}/rooms", post(rooms::create_room))
        .route(
            "/rooms/{room_id}/join-requests",
            post(rooms::request_join).get(rooms::list_join_requests),
        )
        .route(
            "/rooms/{room_id}/join-requests/{user_id}/accept",
            post(rooms::accept_join_request),
        )
        .route(
            "/rooms/{room_id}/join-requests/{user_id}/reject",
            post(rooms::reject_join_request),
        )
        .route(
            "/rooms/{room_id}/messages",
            get(messages::get_room_messages).post(messages::send_room_message),
        )
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/chats", post(chats::create_chat))
        .route("/chats/{chat_id}", get(chats::get_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_chat_messages).post(messages::send_chat_message),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/{notification_id}/read",
            post(notifications::mark_read),
        )
        .route(
            "/notifications/{notification_id}",
            delete(notifications::delete_notification),
        )
        .route(
            "/push/subscriptions",
            post(push::subscribe).get(push::list_subscriptions),
        )
        .route(
            "/push/subscriptions/{subscription_id}",
            delete(push::unsubscribe),
        )
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state.clone());

    let app = Router::new()
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Arbor server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

/// The WebSocket upgrade validates the bearer token (query param) with the
/// same claims and secret as REST auth; invalid or missing tokens never
/// reach the socket layer.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let claims = match decode_token(&token, &state.jwt_secret) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let ctx = GatewayContext {
        db: state.db.clone(),
        dispatcher: state.dispatcher.clone(),
        notifier: state.notifier.clone(),
    };

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, ctx, claims.sub, claims.username)
    })
}
