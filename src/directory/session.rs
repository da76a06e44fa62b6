//! Transport boundary: connect, bind and search one directory server.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// Attributes fetched for diagnostics.
pub const USER_ATTRIBUTES: [&str; 5] =
    ["cn", "mail", "givenName", "sn", "displayName"];

/// Errors raised by a directory session, already classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid Credentials")]
    InvalidCredentials,
    #[error("Connect Error: {0}")]
    Connect(String),
    #[error("Connect Error: untrusted certificate, {0}")]
    Untrusted(String),
    #[error("Time Limit Exceeded after {0:?}")]
    Timeout(Duration),
    #[error("No Such Object")]
    NoSuchEntry,
    #[error("{0}")]
    Unknown(String),
}

/// How the failover loop reacts to an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// Definitive rejection.
    InvalidCredentials,
    /// Server unreachable, try the next one.
    Connect,
    /// Anything else, also try the next one.
    Unknown,
}

impl SessionError {
    pub fn kind(&self) -> AttemptKind {
        match self {
            SessionError::InvalidCredentials => AttemptKind::InvalidCredentials,
            SessionError::Connect(_) | SessionError::Untrusted(_) => {
                AttemptKind::Connect
            },
            SessionError::Timeout(_)
            | SessionError::NoSuchEntry
            | SessionError::Unknown(_) => AttemptKind::Unknown,
        }
    }

    /// Short label used by metrics.
    pub fn label(&self) -> &'static str {
        match self.kind() {
            AttemptKind::InvalidCredentials => "invalid_credentials",
            AttemptKind::Connect => "connect_error",
            AttemptKind::Unknown => "unknown_error",
        }
    }
}

/// Where to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub use_tls: bool,
    pub connect_timeout: Duration,
    /// Bound on the bind round trip.
    pub bind_timeout: Duration,
}

impl Endpoint<'_> {
    /// LDAP URL for this endpoint.
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{scheme}://[{}]:{}", self.host, self.port)
        } else {
            format!("{scheme}://{}:{}", self.host, self.port)
        }
    }
}

/// Single directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// First value of `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Opens sessions to directory servers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        endpoint: Endpoint<'_>,
    ) -> Result<Box<dyn Session>, SessionError>;
}

/// Connection to one server, exclusively owned by the caller.
///
/// Callers finish with [`Session::close`]; dropping a session without
/// closing it still releases the transport.
#[async_trait]
pub trait Session: Send {
    /// Simple bind. `Ok` means the server accepted the credentials.
    async fn bind(
        &mut self,
        identity: &str,
        password: &str,
    ) -> Result<(), SessionError>;

    /// Subtree search returning the first entry only.
    ///
    /// Fails with [`SessionError::Timeout`] once `time_limit` elapsed.
    async fn search_one(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
        time_limit: Duration,
    ) -> Result<Option<DirectoryEntry>, SessionError>;

    async fn close(self: Box<Self>);
}
