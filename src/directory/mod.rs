//! Directory authentication with server failover.
//!
//! A tenant lists several directory servers. Each call tries them in turn,
//! starting with the one that last gave a definitive answer for the tenant,
//! and stops at the first bind that succeeds or reports invalid credentials.

mod cache;
mod diagnostics;
mod failover;
mod format;
mod ldap;
mod servers;
mod session;
mod settings;
#[cfg(test)]
pub(crate) mod testing;
pub mod tls;

pub use cache::{MemoryStore, PreferredServerStore, PreferredServers};
pub use diagnostics::{ServerReport, ServerStatus};
pub use failover::{AuthResult, DirectoryUser, RejectReason};
pub use format::NamingFormat;
pub use ldap::Ldap3Connector;
pub use servers::ServerList;
pub use session::{
    AttemptKind, Connector, DirectoryEntry, Endpoint, Session, SessionError,
};
pub use settings::DirectorySettings;

use std::sync::Arc;
use std::time::Instant;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Errors preventing any attempt from being made.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid directory configuration: {0}")]
    Configuration(String),
}

/// Entry point for directory authentication.
#[derive(Clone)]
pub struct Directory {
    connector: Arc<dyn Connector>,
    preferred: PreferredServers,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("preferred", &self.preferred)
            .finish_non_exhaustive()
    }
}

impl Directory {
    /// Create a new [`Directory`].
    pub fn new(connector: Arc<dyn Connector>, preferred: PreferredServers) -> Self {
        Self {
            connector,
            preferred,
        }
    }

    pub fn preferred(&self) -> &PreferredServers {
        &self.preferred
    }

    /// Open a session to `server` and bind as `identity`.
    ///
    /// The session is closed before returning an error; on success the
    /// caller owns it and must close it.
    async fn bind_on(
        &self,
        settings: &DirectorySettings,
        server: &str,
        identity: &str,
        password: &str,
    ) -> std::result::Result<Box<dyn Session>, SessionError> {
        let start = Instant::now();
        let endpoint = Endpoint {
            host: server,
            port: settings.port(),
            use_tls: settings.use_tls,
            connect_timeout: settings.connect_timeout(),
            bind_timeout: settings.bind_timeout(),
        };

        let result = match self.connector.open(endpoint).await {
            Ok(mut session) => match session.bind(identity, password).await {
                Ok(()) => Ok(session),
                Err(err) => {
                    session.close().await;
                    Err(err)
                },
            },
            Err(err) => Err(err),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.label(),
        };
        let labels = [
            ("server", server.to_owned()),
            ("outcome", outcome.to_owned()),
        ];
        metrics::counter!("directory_bind_attempts_total", &labels).increment(1);
        metrics::histogram!(
            "directory_bind_duration_seconds",
            &[("server", server.to_owned())]
        )
        .record(start.elapsed().as_secs_f64());

        result
    }
}
