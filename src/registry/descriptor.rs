//! Backend descriptor.

use std::collections::BTreeSet;
use std::time::Duration;

use url::Url;

use crate::config::ServiceConfig;

/// Identity, address and declared capabilities of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub id: String,
    pub base_address: Url,
    pub capabilities: BTreeSet<String>,
    pub declared_timeout: Duration,
}

impl ServiceDescriptor {
    pub fn new(
        id: impl Into<String>,
        base_address: Url,
        capabilities: impl IntoIterator<Item = impl Into<String>>,
        declared_timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            base_address,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            declared_timeout,
        }
    }

    /// Build a descriptor from a validated seed entry.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, url::ParseError> {
        Ok(Self::new(
            config.id.clone(),
            Url::parse(&config.base_address)?,
            config.capabilities.iter().cloned(),
            Duration::from_millis(config.timeout_ms),
        ))
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    /// Absolute URI for `path` on this backend.
    ///
    /// A path prefix in the base address is kept, so
    /// `http://host/api` + `/search?q=1` → `http://host/api/search?q=1`.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_address.as_str().trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}
