//! Connectivity check across every server of a tenant.

use serde::Serialize;

use super::session::{Session, SessionError, USER_ATTRIBUTES};
use super::{Directory, DirectorySettings, Result, ServerList};

const PASS: &str = "PASS";

/// Status of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub server: String,
    /// `PASS`, `Invalid Credentials` or the error text.
    pub status: String,
}

/// One status per configured server, in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerReport {
    pub servers: Vec<ServerStatus>,
}

impl ServerReport {
    fn push(&mut self, server: &str, status: impl Into<String>) {
        self.servers.push(ServerStatus {
            server: server.to_owned(),
            status: status.into(),
        });
    }
}

impl Directory {
    /// Bind on every server once and report each outcome.
    ///
    /// Does not read nor update the preferred servers.
    #[tracing::instrument(skip(self, settings, password))]
    pub async fn test_servers(
        &self,
        settings: &DirectorySettings,
        username: &str,
        password: &str,
    ) -> Result<ServerReport> {
        let servers = ServerList::parse(&settings.servers)?;
        let identity = settings.bind_identity(username);
        let mut report = ServerReport::default();

        for server in servers.iter() {
            let status = match self
                .bind_on(settings, server, &identity, password)
                .await
            {
                Ok(mut session) => {
                    tracing::info!(%server, %identity, "test bind succeeded");
                    let status =
                        inspect(session.as_mut(), settings, server, username)
                            .await;
                    session.close().await;
                    status
                },
                Err(err @ SessionError::InvalidCredentials) => {
                    tracing::warn!(%server, %identity, "test bind failed");
                    err.to_string()
                },
                Err(err) => {
                    tracing::error!(
                        %server,
                        %identity,
                        error = ?err,
                        "test connection to directory server failed"
                    );
                    err.to_string()
                },
            };

            report.push(server, status);
        }

        Ok(report)
    }
}

/// Fetch the user entry and log its details.
async fn inspect(
    session: &mut dyn Session,
    settings: &DirectorySettings,
    server: &str,
    username: &str,
) -> String {
    let filter = settings.user_filter(username);
    let entry = session
        .search_one(
            &settings.domain,
            &filter,
            &USER_ATTRIBUTES,
            settings.search_timeout(),
        )
        .await
        .and_then(|entry| entry.ok_or(SessionError::NoSuchEntry));

    match entry {
        Ok(entry) => {
            tracing::info!(
                %server,
                dn = %entry.dn,
                mail = entry.first("mail").unwrap_or_default(),
                given_name = entry.first("givenName").unwrap_or_default(),
                sn = entry.first("sn").unwrap_or_default(),
                display_name = entry.first("displayName").unwrap_or_default(),
                "user details query succeeded"
            );
            PASS.to_owned()
        },
        Err(err) => {
            tracing::error!(%server, %filter, error = %err, "user details query failed");
            err.to_string()
        },
    }
}
