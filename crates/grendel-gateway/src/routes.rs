//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;

use crate::error::problem_details;
use crate::handlers::{accounts, bmc, boot, db, events, health, images, nodes, roles, users};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /v1/auth/signin`, `POST /v1/auth/signup`
/// - `GET /boot/:token/ipxe` - iPXE script for a boot token
///
/// ## Accounts
/// - `POST /v1/auth/signout`, `PATCH /v1/auth/reset`, `POST /v1/auth/token`
/// - `GET|POST|PATCH /v1/roles`, `DELETE /v1/roles/:names`
/// - `GET /v1/users`, `PATCH /v1/users/:names/role`, `DELETE /v1/users/:names`
///
/// ## Inventory (`?nodeset=` and/or `?tags=`)
/// - `GET|POST|DELETE /v1/nodes`, `GET /v1/nodes/find`
/// - `PATCH /v1/nodes/image`, `PATCH /v1/nodes/provision`,
///   `PATCH /v1/nodes/tags/:action`
/// - `GET /v1/nodes/token/:interface` - Boot tokens
/// - `GET|POST|DELETE /v1/images`, `GET /v1/images/find`
///
/// ## BMC (`?nodeset=` and/or `?tags=`)
/// - `GET /v1/bmc`, `GET|DELETE /v1/bmc/jobs`, `GET /v1/bmc/metrics`
/// - `POST /v1/bmc/power/os`, `POST /v1/bmc/power/bmc`, `DELETE /v1/bmc/sel`
/// - `POST /v1/bmc/configure/import`, `POST /v1/bmc/configure/auto`
/// - `GET /v1/bmc/upgrade/dell/repo`, `POST /v1/bmc/upgrade/dell/installfromrepo`
///
/// ## Operational
/// - `GET /v1/events`, `GET /v1/db/dump`, `POST /v1/db/restore`
pub fn create_router<C, V>(state: GatewayState<C, V>) -> Router
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        // Public
        .route("/health", get(health::health))
        .route("/boot/:token/ipxe", get(boot::ipxe::<C, V>))
        .route("/v1/auth/signin", post(accounts::signin::<C, V>))
        .route("/v1/auth/signup", post(accounts::signup::<C, V>))
        // Accounts
        .route("/v1/auth/signout", post(accounts::signout::<C, V>))
        .route("/v1/auth/reset", patch(accounts::reset_password::<C, V>))
        .route("/v1/auth/token", post(accounts::issue_token::<C, V>))
        .route(
            "/v1/roles",
            get(roles::list_roles::<C, V>)
                .post(roles::add_role::<C, V>)
                .patch(roles::edit_role::<C, V>),
        )
        .route("/v1/roles/:names", delete(roles::delete_roles::<C, V>))
        .route("/v1/users", get(users::list_users::<C, V>))
        .route("/v1/users/:names/role", patch(users::set_role::<C, V>))
        .route("/v1/users/:names", delete(users::delete_users::<C, V>))
        // Nodes
        .route(
            "/v1/nodes",
            get(nodes::list_nodes::<C, V>)
                .post(nodes::upsert_nodes::<C, V>)
                .delete(nodes::delete_nodes::<C, V>),
        )
        .route("/v1/nodes/find", get(nodes::find_nodes::<C, V>))
        .route("/v1/nodes/image", patch(nodes::set_image::<C, V>))
        .route("/v1/nodes/provision", patch(nodes::set_provision::<C, V>))
        .route("/v1/nodes/tags/:action", patch(nodes::apply_tags::<C, V>))
        .route("/v1/nodes/token/:interface", get(nodes::boot_tokens::<C, V>))
        // Images
        .route(
            "/v1/images",
            get(images::list_images::<C, V>)
                .post(images::upsert_images::<C, V>)
                .delete(images::delete_images::<C, V>),
        )
        .route("/v1/images/find", get(images::find_images::<C, V>))
        // BMC
        .route("/v1/bmc", get(bmc::system_info::<C, V>))
        .route(
            "/v1/bmc/jobs",
            get(bmc::list_jobs::<C, V>).delete(bmc::delete_jobs::<C, V>),
        )
        .route("/v1/bmc/power/os", post(bmc::power_os::<C, V>))
        .route("/v1/bmc/power/bmc", post(bmc::power_bmc::<C, V>))
        .route("/v1/bmc/sel", delete(bmc::clear_sel::<C, V>))
        .route("/v1/bmc/metrics", get(bmc::metrics::<C, V>))
        .route(
            "/v1/bmc/configure/import",
            post(bmc::import_configuration::<C, V>),
        )
        .route("/v1/bmc/configure/auto", post(bmc::auto_configure::<C, V>))
        .route("/v1/bmc/upgrade/dell/repo", get(bmc::firmware_check::<C, V>))
        .route(
            "/v1/bmc/upgrade/dell/installfromrepo",
            post(bmc::firmware_install::<C, V>),
        )
        // Operational
        .route("/v1/events", get(events::list_events::<C, V>))
        .route("/v1/db/dump", get(db::dump::<C, V>))
        .route("/v1/db/restore", post(db::restore::<C, V>))
        // Middleware, outermost first
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::middleware::from_fn(problem_details))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_any_origin() {
        let _layer = build_cors_layer(&["*".to_string()]);
    }

    #[test]
    fn cors_specific_origins() {
        let _layer = build_cors_layer(&[
            "http://localhost:3000".to_string(),
            "not a header\n".to_string(),
        ]);
    }
}
