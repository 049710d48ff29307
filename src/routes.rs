//! HTTP route table.
//!
//! ```text
//! GET    /health                          public
//! POST   /v1/api/auth/register            public
//! POST   /v1/api/auth/login               public
//! GET    /v1/api/users/{id}               session token, audited
//! POST   /v1/api/api-keys                 session token, audited
//! GET    /v1/api/api-keys                 session token, audited
//! DELETE /v1/api/api-keys/{id}            session token, audited
//! POST   /v1/api/api-keys/{id}/rotate     session token, audited
//! GET    /v1/api/whoami                   API key, audited
//! ```

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::handlers;
use crate::middleware::{audit::audit_middleware, auth};
use crate::state::AppState;

/// Build the application router.
///
/// Within each protected group the gate is the outer route layer, so the
/// audit middleware only ever sees requests that already carry an identity.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let token_routes = Router::new()
        .route("/v1/api/users/{id}", get(handlers::users::get_user))
        .route(
            "/v1/api/api-keys",
            post(handlers::api_keys::create_api_key).get(handlers::api_keys::list_api_keys),
        )
        .route(
            "/v1/api/api-keys/{id}",
            delete(handlers::api_keys::revoke_api_key),
        )
        .route(
            "/v1/api/api-keys/{id}/rotate",
            post(handlers::api_keys::rotate_api_key),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            audit_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::token_auth_middleware,
        ));

    let api_key_routes = Router::new()
        .route("/v1/api/whoami", get(handlers::whoami::whoami))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            audit_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_middleware,
        ));

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(request_timeout);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/v1/api/auth/register", post(handlers::auth::register))
        .route("/v1/api/auth/login", post(handlers::auth::login))
        .merge(token_routes)
        .merge(api_key_routes)
        .layer(timeout)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
