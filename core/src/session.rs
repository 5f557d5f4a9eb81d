//! Per-client session state.
//!
//! # Design
//! A `Session` is owned by exactly one `ClodoClient`. Only the login
//! handshake writes to it, and each write replaces both credentials at once.
//! There is no locking: one client is one logical session, and sharing a
//! client across threads needs external synchronization (a re-login would
//! otherwise race with in-flight requests reading the token).

use crate::types::DataFormat;

#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    management_url: String,
    format: DataFormat,
}

impl Session {
    /// An empty session. Authenticated calls are not well-formed until
    /// `set` has run.
    pub(crate) fn new(format: DataFormat) -> Self {
        Self {
            token: String::new(),
            management_url: String::new(),
            format,
        }
    }

    /// Overwrite the credentials. The values come from the login response
    /// and are stored as-is.
    pub(crate) fn set(&mut self, token: String, management_url: String) {
        self.token = token;
        self.management_url = management_url;
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn management_url(&self) -> &str {
        &self.management_url
    }

    /// Response format negotiated at construction. Never changes.
    pub fn format(&self) -> DataFormat {
        self.format
    }

    pub fn is_established(&self) -> bool {
        !self.token.is_empty() && !self.management_url.is_empty()
    }
}

/// First four characters of a secret, for log lines.
pub(crate) fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}...")
}
