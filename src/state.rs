//! Shared application state for all routes.

use crate::pool::PoolFactory;
use crate::registry::TenantRegistry;
use std::sync::Arc;

pub struct AppState<F: PoolFactory> {
    pub registry: Arc<TenantRegistry<F>>,
}

impl<F: PoolFactory> AppState<F> {
    pub fn new(registry: Arc<TenantRegistry<F>>) -> Self {
        AppState { registry }
    }
}

// Manual impl: deriving would require `F: Clone`.
impl<F: PoolFactory> Clone for AppState<F> {
    fn clone(&self) -> Self {
        AppState {
            registry: Arc::clone(&self.registry),
        }
    }
}
