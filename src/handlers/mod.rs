//! HTTP handlers for tenant administration and tenant-routed data access.

pub mod admin;
pub mod api;
pub use admin::*;
pub use api::*;
