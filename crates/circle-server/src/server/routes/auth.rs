//! Account routes
//!
//! - POST /signup - Register with email and password
//! - POST /signin - Exchange email and password for an access token
//!
//! Both routes sit behind the shared rate limiter.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::ErrorResponse;
use crate::auth::AuthError;
use crate::server::rate_limit::{auth_limiter, limit_requests};
use crate::server::AppState;

/// Create the auth router
pub fn router(state: Arc<AppState>) -> Router {
    let limiter = Arc::new(auth_limiter(
        state.config.rate_limit,
        state.config.rate_refill,
    ));

    Router::new()
        .route("/signup", post(signup_handler))
        .route("/signin", post(signin_handler))
        .route_layer(middleware::from_fn_with_state(limiter, limit_requests))
        .with_state(state)
}

/// Request body for signup and signin
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Response for signup
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub id: i64,
    pub email: String,
}

/// Response for signin
#[derive(Debug, Serialize)]
pub struct SigninResponse {
    pub message: String,
    pub token: String,
}

/// Convert AuthError to HTTP response
pub(crate) fn auth_error_to_response(err: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, error_code) = match &err {
        AuthError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, "invalid_email"),
        AuthError::InvalidPassword(_) => (StatusCode::BAD_REQUEST, "invalid_password"),
        AuthError::UserAlreadyExists(_) => (StatusCode::CONFLICT, "user_exists"),
        AuthError::UserNotFound(_) => (StatusCode::NOT_FOUND, "user_not_found"),
        AuthError::WrongPassword => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
        AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing_token"),
        AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
        AuthError::JwtError(_) => (StatusCode::UNAUTHORIZED, "invalid_token"),
        AuthError::CryptoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "crypto_error"),
        AuthError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
    };

    ErrorResponse::new(error_code, &err.to_string()).with_status(status)
}

fn bad_body(rejection: JsonRejection) -> Response {
    ErrorResponse::new("invalid_request", &rejection.body_text())
        .with_status(StatusCode::BAD_REQUEST)
        .into_response()
}

/// POST /signup
#[instrument(skip_all)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    match state.users.create(&request.email, &request.password).await {
        Ok(user) => {
            info!(user_id = user.id, email = %user.email, "User signed up");
            (
                StatusCode::CREATED,
                Json(SignupResponse {
                    id: user.id,
                    email: user.email,
                }),
            )
                .into_response()
        }
        Err(err) => {
            match &err {
                AuthError::DatabaseError(_) | AuthError::CryptoError(_) => {
                    error!("Signup failed: {}", err)
                }
                _ => warn!("Signup rejected: {}", err),
            }
            auth_error_to_response(err).into_response()
        }
    }
}

/// POST /signin
#[instrument(skip_all)]
pub async fn signin_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    let user = match state.users.authenticate(&request.email, &request.password).await {
        Ok(user) => user,
        Err(err) => {
            warn!("Signin rejected: {}", err);
            return auth_error_to_response(err).into_response();
        }
    };

    match state.tokens.issue(user.id, &user.email) {
        Ok(token) => {
            info!(user_id = user.id, "User signed in");
            (
                StatusCode::OK,
                Json(SigninResponse {
                    message: "Login successful".to_string(),
                    token,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to issue token: {}", err);
            auth_error_to_response(err).into_response()
        }
    }
}
