use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config;
use crate::handlers;
use crate::hierarchy::Hierarchy;
use crate::middleware::jwt_auth_middleware;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub hierarchy: Hierarchy,
    /// Whether `/health` should ping PostgreSQL
    pub uses_database: bool,
}

impl AppState {
    pub fn new(hierarchy: Hierarchy, uses_database: bool) -> Self {
        Self { hierarchy, uses_database }
    }
}

pub fn app(state: AppState) -> Router {
    let settings = config::config();

    let mut router = Router::new()
        // Public
        .route("/health", get(handlers::health))
        // Protected API
        .merge(api_routes().route_layer(from_fn(jwt_auth_middleware)))
        .layer(DefaultBodyLimit::max(settings.api.max_request_size_bytes));

    if settings.security.enable_cors {
        router = router.layer(cors_layer(&settings.security.cors_origins));
    }
    if settings.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn api_routes() -> Router<AppState> {
    use handlers::{entity, hierarchy, user};

    Router::new()
        // Authorization and hierarchy queries
        .route("/api/authorize", post(hierarchy::authorize_post))
        .route("/api/hierarchy/chain", get(hierarchy::chain_get))
        .route("/api/entity/:id/licences", get(hierarchy::licences_get))
        .route("/api/expiry", patch(hierarchy::expiry_patch))
        // Node management
        .route(
            "/api/entity",
            post(entity::entity_post)
                .patch(entity::entity_patch)
                .delete(entity::entity_delete),
        )
        // User provisioning
        .route(
            "/api/user",
            post(user::user_post).patch(user::user_patch).delete(user::user_delete),
        )
        .route("/api/user/bulk", post(user::user_bulk_post))
        .route("/api/user/placement", put(user::placement_put))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::permissive().allow_origin(AllowOrigin::list(origins))
    }
}
