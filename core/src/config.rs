//! Endpoint configuration for `ClodoClient`.
//!
//! The defaults point at the public API. Tests and staging setups override
//! them to aim the client at a local server.

use serde::Deserialize;

use crate::types::Datacenter;

pub const DEFAULT_API_ROOT: &str = "http://api.clodo.ru";
pub const DEFAULT_DATACENTER_URL: &str = "http://api.{datacenter}.clodo.ru";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Login endpoint. Authenticated calls go to the management URL the
    /// login response hands back instead.
    pub api_root: String,

    /// Base URL for server creation. `{datacenter}` is replaced with the
    /// datacenter name.
    pub datacenter_url: String,

    /// Send billing queries to `/billing/{id}` instead of `/billing`.
    ///
    /// The API historically received `/billing` even when an id was given,
    /// so this stays off unless the deployment is known to accept the
    /// qualified path.
    pub qualified_billing_path: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_root: DEFAULT_API_ROOT.to_string(),
            datacenter_url: DEFAULT_DATACENTER_URL.to_string(),
            qualified_billing_path: false,
        }
    }
}

impl ClientConfig {
    pub fn with_api_root(mut self, api_root: &str) -> Self {
        self.api_root = api_root.trim_end_matches('/').to_string();
        self
    }

    pub fn with_datacenter_url(mut self, template: &str) -> Self {
        self.datacenter_url = template.trim_end_matches('/').to_string();
        self
    }

    pub fn with_qualified_billing_path(mut self, enabled: bool) -> Self {
        self.qualified_billing_path = enabled;
        self
    }

    pub(crate) fn datacenter_base(&self, datacenter: Datacenter) -> String {
        self.datacenter_url.replace("{datacenter}", datacenter.as_str())
    }
}
