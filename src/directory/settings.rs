//! Tenant-scoped directory settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::format::NamingFormat;

const DEFAULT_PORT: u16 = 389;
const DEFAULT_TLS_PORT: u16 = 636;
/// Hard limit applied to attribute searches.
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BIND_TIMEOUT_MS: u64 = 5_000;

/// Directory configuration for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Comma-separated list of directory hosts, in failover order.
    pub servers: String,
    /// Port shared by every server of the list.
    #[serde(default)]
    pub port: Option<u16>,
    /// Connect over `ldaps://`.
    #[serde(default)]
    pub use_tls: bool,
    /// Base naming container, also used as search base.
    pub domain: String,
    /// Naming-format discriminator, such as `username@LDAPDOMAIN`.
    #[serde(default)]
    pub user_dn_format: String,
    #[serde(default = "default_search_timeout")]
    pub search_timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Time a server has to answer a bind request.
    #[serde(default = "default_bind_timeout")]
    pub bind_timeout_ms: u64,
}

fn default_search_timeout() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_MS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_bind_timeout() -> u64 {
    DEFAULT_BIND_TIMEOUT_MS
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            servers: String::default(),
            port: None,
            use_tls: false,
            domain: String::default(),
            user_dn_format: String::default(),
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            bind_timeout_ms: DEFAULT_BIND_TIMEOUT_MS,
        }
    }
}

impl DirectorySettings {
    /// Create settings with default port and timeouts.
    pub fn new(
        servers: impl Into<String>,
        domain: impl Into<String>,
        user_dn_format: impl Into<String>,
    ) -> Self {
        Self {
            servers: servers.into(),
            domain: domain.into(),
            user_dn_format: user_dn_format.into(),
            ..Default::default()
        }
    }

    /// Port to connect to, falling back on the well-known LDAP ports.
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.use_tls => DEFAULT_TLS_PORT,
            None => DEFAULT_PORT,
        }
    }

    /// Parsed naming format. Unknown discriminators fall back on the default.
    pub fn naming_format(&self) -> NamingFormat {
        NamingFormat::parse(&self.user_dn_format)
    }

    /// Identity presented during bind.
    pub fn bind_identity(&self, username: &str) -> String {
        self.naming_format().identity(&self.domain, username)
    }

    /// Filter used to look the user entry up.
    pub fn user_filter(&self, username: &str) -> String {
        self.naming_format().filter(username)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn bind_timeout(&self) -> Duration {
        Duration::from_millis(self.bind_timeout_ms)
    }
}
