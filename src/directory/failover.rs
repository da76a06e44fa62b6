//! Authentication loop.

use serde::Serialize;

use super::session::AttemptKind;
use super::{Directory, DirectorySettings, Result, ServerList};

/// Authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryUser {
    pub common_name: String,
}

/// Why a call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// A server refused the credentials.
    InvalidCredentials,
    /// No server gave a definitive answer.
    Unavailable,
}

/// Verdict of [`Directory::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<DirectoryUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectReason>,
}

impl AuthResult {
    fn accepted(username: &str) -> Self {
        Self {
            accepted: true,
            user: Some(DirectoryUser {
                common_name: username.to_owned(),
            }),
            rejection: None,
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            user: None,
            rejection: Some(reason),
        }
    }
}

impl Directory {
    /// Authenticate `username` against the servers of `settings`.
    ///
    /// Each server is tried at most once, starting from the tenant's
    /// preferred server. Invalid credentials end the loop immediately.
    #[tracing::instrument(skip(self, settings, password, tenant), fields(tenant = tenant.unwrap_or_default()))]
    pub async fn authenticate(
        &self,
        settings: &DirectorySettings,
        username: &str,
        password: &str,
        tenant: Option<&str>,
    ) -> Result<AuthResult> {
        let servers = ServerList::parse(&settings.servers)?;
        let identity = settings.bind_identity(username);
        let mut index = servers.start(self.preferred.get(tenant));

        for _ in 0..servers.len() {
            let server = servers.get(index);

            match self.bind_on(settings, server, &identity, password).await {
                Ok(session) => {
                    session.close().await;
                    tracing::info!(%server, %identity, "bind succeeded");
                    self.preferred.set(tenant, index);
                    return Ok(AuthResult::accepted(username));
                },
                Err(err) => match err.kind() {
                    AttemptKind::InvalidCredentials => {
                        tracing::warn!(%server, %identity, "bind failed");
                        self.preferred.set(tenant, index);
                        return Ok(AuthResult::rejected(
                            RejectReason::InvalidCredentials,
                        ));
                    },
                    AttemptKind::Connect => tracing::error!(
                        %server,
                        %identity,
                        error = %err,
                        "connect to directory server failed"
                    ),
                    AttemptKind::Unknown => tracing::error!(
                        %server,
                        %identity,
                        error = ?err,
                        "bind attempt failed"
                    ),
                },
            }

            index = servers.next(index);
        }

        tracing::error!(%identity, servers = servers.len(), "all directory servers failed");
        metrics::counter!("directory_exhausted_total").increment(1);

        Ok(AuthResult::rejected(RejectReason::Unavailable))
    }
}
