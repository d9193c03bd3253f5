use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use circle_hub::Hub;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::auth::{TokenIssuer, UserStore};
use crate::config::ServerConfig;
use crate::db::Database;

pub mod rate_limit;
mod routes;

pub use routes::ErrorResponse;

/// Server application state
pub struct AppState {
    /// User database
    pub db: Arc<Database>,
    /// Registered users; also the hub's recipient directory
    pub users: Arc<UserStore>,
    /// Access token issuer
    pub tokens: TokenIssuer,
    /// Real-time connection hub
    pub hub: Arc<Hub<UserStore>>,
    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Build the application state over an already migrated database.
    pub fn new(db: Arc<Database>, config: ServerConfig) -> Self {
        let users = Arc::new(UserStore::new(Arc::clone(&db)));
        let tokens = TokenIssuer::new(config.jwt_key.as_bytes(), config.token_ttl);
        let hub = Arc::new(Hub::new(Arc::clone(&users), config.hub_config()));

        Self {
            db,
            users,
            tokens,
            hub,
            config,
        }
    }
}

/// Start the HTTP server on the configured address and run until Ctrl-C.
pub async fn start(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_addr;
    info!("Starting Axum HTTP server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_router = routes::auth::router(Arc::clone(&state));
    let websocket_router = routes::websocket::router(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .merge(auth_router)
        .merge(websocket_router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

/// Health check endpoint (for load balancers)
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let online = state.hub.registry().connection_count();

    match state.db.health_check().await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "circle-server",
                "version": env!("CARGO_PKG_VERSION"),
                "online": online
            })),
        ),
        Ok(false) => {
            warn!("Health check: database unhealthy");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "circle-server",
                    "version": env!("CARGO_PKG_VERSION"),
                    "online": online,
                    "error": "database unhealthy"
                })),
            )
        }
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "circle-server",
                    "version": env!("CARGO_PKG_VERSION"),
                    "online": online,
                    "error": format!("database error: {}", e)
                })),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::MigrationRunner;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    pub(crate) async fn create_test_state() -> Arc<AppState> {
        create_test_state_with(ServerConfig::test()).await
    }

    pub(crate) async fn create_test_state_with(config: ServerConfig) -> Arc<AppState> {
        let db = Database::in_memory("test").await.unwrap();
        MigrationRunner::default().run(&db).await.unwrap();
        Arc::new(AppState::new(Arc::new(db), config))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "circle-server");
        assert_eq!(json["online"], 0);
    }

    #[tokio::test]
    async fn test_state_wires_hub_to_user_store() {
        let state = create_test_state().await;
        let user = state.users.create("b@x.com", "password123").await.unwrap();

        let envelope = circle_hub::Envelope::new("b@x.com", "hi");
        let err = state.hub.router().route(&envelope).await.unwrap_err();

        // Known user, not connected.
        assert!(matches!(
            err,
            circle_hub::RouteError::RecipientOffline(id) if id.0 == user.id
        ));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = create_test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
