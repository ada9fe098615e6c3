pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::auth::{login_handler, logout_handler, signup_handler};
use crate::web::rest::*;
use crate::web::state::AppState;

// Re-export the handlers the binary and the tests reach for directly.
pub use middleware::require_auth;
pub use ws_handler::ws_handler;

/// Builds the complete application router: public auth routes, the
/// cookie-protected API, the WebSocket change stream and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me/assignments", get(my_assignments_handler))
        .route("/me/acknowledgments", get(my_acknowledgments_handler))
        .route("/me/stats", get(my_stats_handler))
        .route("/me/notifications", get(my_notifications_handler))
        .route("/notifications/{id}/read", post(mark_notification_read_handler))
        .route("/assignments", post(assign_handler))
        .route("/assignments/{id}/acknowledge", post(acknowledge_handler))
        .route("/sops", get(list_sops_handler).post(create_sop_handler))
        .route("/sops/{id}", patch(update_sop_handler))
        .route("/companies/{id}/users", get(company_users_handler))
        .route("/companies/{id}/dashboard", get(dashboard_handler))
        .route("/companies/{id}/audit-logs", get(audit_logs_handler))
        .route("/reports/compliance", get(compliance_report_handler))
        .route("/reports/compliance/export", get(export_report_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
