use axum::{middleware, Router};
use tower_http::cors::CorsLayer;

use crate::auth::middleware::JwtSecret;
use crate::chat::handlers as chat_handlers;
use crate::friends::handlers as friend_handlers;
use crate::groups::handlers as group_handlers;
use crate::state::AppState;
use crate::users::handlers as user_handlers;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor
/// can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
/// Everything except /register, /login and /health sits behind the Claims
/// extractor; the WebSocket route authenticates via query param instead.
pub fn build_router(state: AppState) -> Router {
    // Public routes (no token required)
    let public_routes = Router::new()
        .route("/register", axum::routing::post(user_handlers::register))
        .route("/login", axum::routing::post(user_handlers::login))
        .route("/health", axum::routing::get(health_check));

    let user_routes = Router::new()
        .route("/users", axum::routing::get(user_handlers::list_users))
        .route("/users/{id}", axum::routing::put(user_handlers::update_user));

    // Note: /messages/group/{...} and /messages/pending/{...} MUST come
    // before /messages/{a}/{b} to avoid the two-segment param route
    // swallowing them.
    let message_routes = Router::new()
        .route("/messages", axum::routing::get(chat_handlers::list_messages))
        .route("/messages", axum::routing::post(chat_handlers::create_message))
        .route(
            "/messages/group/{group_id}",
            axum::routing::get(chat_handlers::group_messages),
        )
        .route(
            "/messages/pending/{user_id}",
            axum::routing::get(chat_handlers::pending_messages),
        )
        .route(
            "/messages/unread-count/{user_id}",
            axum::routing::get(chat_handlers::unread_count),
        )
        .route(
            "/messages/{id}/read",
            axum::routing::put(chat_handlers::mark_read),
        )
        .route(
            "/messages/{id}",
            axum::routing::delete(chat_handlers::delete_message),
        )
        .route(
            "/messages/{user_a}/{user_b}",
            axum::routing::get(chat_handlers::conversation),
        );

    let friend_routes = Router::new()
        .route(
            "/friend-requests",
            axum::routing::post(friend_handlers::send_request),
        )
        .route(
            "/friend-requests/{request_id}/accept",
            axum::routing::put(friend_handlers::accept_request),
        )
        .route(
            "/friend-requests/{request_id}/reject",
            axum::routing::put(friend_handlers::reject_request),
        )
        .route(
            "/notifications/{user_id}",
            axum::routing::get(friend_handlers::list_notifications),
        )
        .route(
            "/notifications/{notification_id}/read",
            axum::routing::put(friend_handlers::mark_notification_read),
        );

    let group_routes = Router::new()
        .route("/groups", axum::routing::post(group_handlers::create_group))
        .route(
            "/groups/user/{user_id}",
            axum::routing::get(group_handlers::list_user_groups),
        )
        .route(
            "/groups/{group_id}/members",
            axum::routing::post(group_handlers::add_member),
        )
        .route(
            "/groups/{group_id}/members/{member_id}",
            axum::routing::delete(group_handlers::kick_member),
        )
        .route(
            "/groups/{group_id}/leave",
            axum::routing::post(group_handlers::leave_group),
        )
        .route(
            "/groups/{group_id}",
            axum::routing::delete(group_handlers::delete_group),
        );

    // WebSocket endpoint (auth via query param, not Bearer header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(message_routes)
        .merge(friend_routes)
        .merge(group_routes)
        .merge(ws_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
