use anyhow::Result;
use axum::{
    extract::Extension,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing;

use crate::auth;
use crate::handlers;
use crate::state::ApiState;
use crate::websocket;

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some(origins) => {
            let mut cors = CorsLayer::new();
            for origin in origins.split(',').map(|s| s.trim()) {
                if let Ok(parsed) = origin.parse::<HeaderValue>() {
                    cors = cors.allow_origin(parsed);
                }
            }
            cors.allow_methods(Any).allow_headers(Any)
        }
        None => {
            tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
            CorsLayer::permissive()
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = cors_layer(state.ctx.config.server.cors_origins.as_deref());

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/signup", post(handlers::sign_up))
        .route("/api/signin", post(handlers::sign_in))
        .route("/api/signout", post(handlers::sign_out))
        .route("/api/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/api/users/id/:id",
            get(handlers::get_user_by_id)
                .put(handlers::update_user)
                .delete(handlers::delete_user_by_id),
        )
        .route(
            "/api/users/email/:email",
            get(handlers::get_user_by_email).delete(handlers::delete_user_by_email),
        )
        .route(
            "/api/tickets",
            get(handlers::list_tickets).post(handlers::create_ticket),
        )
        .route(
            "/api/tickets/:id",
            get(handlers::get_ticket)
                .put(handlers::update_ticket)
                .delete(handlers::delete_ticket),
        )
        .route("/api/tickets/:id/assign", post(handlers::assign_ticket))
        .route("/api/tickets/:id/status", post(handlers::change_status))
        .route("/api/tickets/:id/comments", post(handlers::add_comment))
        .route(
            "/api/tickets/:id/time",
            get(handlers::ticket_time).post(handlers::log_ticket_time),
        )
        .route(
            "/api/tickets/user/:field/:user_id",
            get(handlers::tickets_by_user_field),
        )
        .route("/api/notifications", get(handlers::get_notifications))
        .route("/api/notifications/count", get(handlers::get_unread_count))
        .route("/api/notifications/read-all", post(handlers::mark_all_read))
        .route(
            "/api/notifications/:id",
            axum::routing::delete(handlers::delete_notification),
        )
        .route(
            "/api/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/api/notifications/:id/unread",
            post(handlers::mark_notification_unread),
        )
        .route("/api/time/start", post(handlers::start_timer))
        .route("/api/time/stop", post(handlers::stop_timer))
        .route("/api/time/active", get(handlers::active_timer))
        .route("/api/time/entries", get(handlers::my_time_entries))
        .route("/api/reports/summary", get(handlers::report_summary))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(Extension(state))
                .layer(middleware::from_fn(auth::auth_middleware)),
        )
}

pub async fn run(state: ApiState) -> Result<()> {
    let server = &state.ctx.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.api_port).parse()?;
    let app = router(state.clone());

    tracing::info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
