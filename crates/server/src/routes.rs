//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        // Subscription delivery (the token in the path is the credential)
        .route("/subs/{token}", get(handlers::get_subscription))
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check));

    let admin_routes = Router::new()
        // Users
        .route(
            "/v1/admin/users",
            post(handlers::create_user).get(handlers::list_users),
        )
        .route(
            "/v1/admin/users/{user_id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/v1/admin/users/{user_id}/rotate-token",
            post(handlers::rotate_token),
        )
        .route(
            "/v1/admin/users/{user_id}/preview",
            get(handlers::preview_user),
        )
        // Tags
        .route(
            "/v1/admin/tags",
            post(handlers::create_tag).get(handlers::list_tags),
        )
        .route(
            "/v1/admin/tags/{tag_id}",
            get(handlers::get_tag)
                .put(handlers::update_tag)
                .delete(handlers::delete_tag),
        )
        .route("/v1/admin/tags/{tag_id}/apply", post(handlers::apply_tag))
        .route(
            "/v1/admin/tags/{tag_id}/actions",
            post(handlers::run_tag_action),
        )
        // Sources
        .route(
            "/v1/admin/upstreams",
            post(handlers::create_upstream).get(handlers::list_upstreams),
        )
        .route(
            "/v1/admin/upstreams/{upstream_id}",
            put(handlers::update_upstream).delete(handlers::delete_upstream),
        )
        .route(
            "/v1/admin/static-nodes",
            post(handlers::create_static_node).get(handlers::list_static_nodes),
        )
        .route(
            "/v1/admin/static-nodes/{static_node_id}",
            put(handlers::update_static_node)
                .delete(handlers::delete_static_node),
        )
        // Maintenance
        .route("/v1/admin/test-fetch", post(handlers::test_fetch))
        .route("/v1/admin/cache", delete(handlers::flush_cache));

    let mut router = Router::new().merge(public_routes).merge(admin_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Order of execution: TraceLayer -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
