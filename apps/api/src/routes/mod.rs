pub mod generate;
pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::audit::recorder::{audit_middleware, AuditContext};
use crate::auth::require_api_key;
use crate::state::AppState;

/// Assembles the router: public health check, authenticated generation
/// endpoints, and the audit recorder wrapped around everything.
pub fn build_router(state: AppState, audit: AuditContext) -> Router {
    let generation = Router::new()
        .route(
            "/api/v1/generate/answer",
            post(generate::handle_generate_answer),
        )
        .route(
            "/api/v1/generate/tailor",
            post(generate::handle_generate_tailor),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        .merge(generation)
        // Outermost layer: the recorder observes every exchange end to end.
        .layer(middleware::from_fn_with_state(audit, audit_middleware))
        .with_state(state)
}
