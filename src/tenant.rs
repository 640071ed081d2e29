//! Tenant identifiers. Case-sensitive, trimmed, never empty.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Reserved tenant id used when multi-tenancy is disabled.
pub const DEFAULT_TENANT_ID: &str = "default";

/// Opaque tenant key. Construct with [`TenantId::parse`] so surrounding whitespace is trimmed.
/// Deserializing goes through the same parse, so config map keys are trimmed and blanks rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Trim and validate a raw id. Returns `None` for empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(TenantId(trimmed.to_string()))
        }
    }

    /// The reserved single-tenant identity.
    pub fn default_tenant() -> Self {
        TenantId(DEFAULT_TENANT_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_TENANT_ID
    }

    /// Upper-cased form with non-alphanumerics replaced by `_`, for environment variable names.
    pub fn env_prefix(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl TryFrom<String> for TenantId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        TenantId::parse(&raw).ok_or_else(|| "tenant id must not be blank".to_string())
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TenantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_trims_and_rejects_blank() {
        assert_eq!(TenantId::parse("  acme ").unwrap().as_str(), "acme");
        assert!(TenantId::parse("").is_none());
        assert!(TenantId::parse("   ").is_none());
    }

    #[test]
    fn ids_are_case_sensitive() {
        assert_ne!(TenantId::parse("Acme"), TenantId::parse("acme"));
    }

    #[test]
    fn map_lookup_by_str() {
        let mut m = HashMap::new();
        m.insert(TenantId::parse("t1").unwrap(), 1);
        assert_eq!(m.get("t1"), Some(&1));
    }

    #[test]
    fn deserialize_trims_and_rejects_blank() {
        let id: TenantId = serde_json::from_str(r#"" t1 ""#).unwrap();
        assert_eq!(id.as_str(), "t1");
        assert!(serde_json::from_str::<TenantId>(r#""  ""#).is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""t1""#);
    }

    #[test]
    fn env_prefix_is_shell_safe() {
        assert_eq!(TenantId::parse("eu-west.1").unwrap().env_prefix(), "EU_WEST_1");
    }
}
