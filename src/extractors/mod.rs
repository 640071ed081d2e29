pub mod tenant;

pub use tenant::{bind_tenant, tenant_header, TENANT_ID_HEADER};
