pub mod admin;
pub mod api;
pub mod common;

pub use admin::admin_routes;
pub use api::{api_routes, datasource_routes};
pub use common::common_routes;

use crate::pool::PoolFactory;
use crate::state::AppState;
use axum::Router;

/// Common, admin and tenant-routed API routes for any pool factory.
pub fn app<F: PoolFactory>(state: AppState<F>) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(admin_routes(state.clone()))
        .merge(api_routes(state))
}
