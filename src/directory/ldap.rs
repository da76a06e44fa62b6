//! `ldap3` session adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry,
    SearchOptions,
};
use rustls::RootCertStore;
use tokio::task::JoinHandle;

use super::session::{
    Connector, DirectoryEntry, Endpoint, Session, SessionError,
};
use super::tls::{self, CertificateValidator};

// RFC 4511 result codes.
const SUCCESS: u32 = 0;
const TIME_LIMIT_EXCEEDED: u32 = 3;
const SIZE_LIMIT_EXCEEDED: u32 = 4;
const NO_SUCH_OBJECT: u32 = 32;
const INVALID_CREDENTIALS: u32 = 49;

const UNBIND_GRACE: Duration = Duration::from_secs(1);

/// Opens `ldap://` and `ldaps://` sessions.
pub struct Ldap3Connector {
    roots: RootCertStore,
    validator: Arc<dyn CertificateValidator>,
}

impl Ldap3Connector {
    /// Create a new [`Ldap3Connector`].
    pub fn new(
        roots: RootCertStore,
        validator: Arc<dyn CertificateValidator>,
    ) -> Self {
        Self { roots, validator }
    }
}

#[async_trait]
impl Connector for Ldap3Connector {
    async fn open(
        &self,
        endpoint: Endpoint<'_>,
    ) -> Result<Box<dyn Session>, SessionError> {
        let mut settings =
            LdapConnSettings::new().set_conn_timeout(endpoint.connect_timeout);

        let rejection = if endpoint.use_tls {
            let (config, rejection) = tls::client_config(
                self.roots.clone(),
                Arc::clone(&self.validator),
            );
            settings = settings.set_config(Arc::new(config));
            Some(rejection)
        } else {
            None
        };

        let url = endpoint.url();
        let (conn, ldap) = match LdapConnAsync::with_settings(settings, &url)
            .await
        {
            Ok(pair) => pair,
            Err(err) => {
                let refused = rejection.and_then(|slot| {
                    slot.lock().ok().and_then(|mut reason| reason.take())
                });
                return Err(match refused {
                    Some(reason) => SessionError::Untrusted(reason),
                    None => SessionError::Connect(err.to_string()),
                });
            },
        };

        let server = endpoint.host.to_owned();
        let driver = tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                tracing::debug!(%server, error = %err, "directory connection closed");
            }
        });

        Ok(Box::new(Ldap3Session {
            ldap,
            driver,
            bind_timeout: endpoint.bind_timeout,
        }))
    }
}

struct Ldap3Session {
    ldap: Ldap,
    driver: JoinHandle<()>,
    bind_timeout: Duration,
}

impl Drop for Ldap3Session {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl Session for Ldap3Session {
    async fn bind(
        &mut self,
        identity: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        // An empty password turns a simple bind into an unauthenticated one,
        // which servers accept.
        if password.is_empty() {
            return Err(SessionError::InvalidCredentials);
        }

        let result = match self
            .ldap
            .with_timeout(self.bind_timeout)
            .simple_bind(identity, password)
            .await
        {
            Ok(result) => result,
            Err(LdapError::Timeout { .. }) => {
                return Err(SessionError::Timeout(self.bind_timeout));
            },
            Err(err) => return Err(classify(err)),
        };

        match result.rc {
            SUCCESS => Ok(()),
            INVALID_CREDENTIALS => Err(SessionError::InvalidCredentials),
            rc => Err(SessionError::Unknown(format!(
                "bind failed with code {rc}: {}",
                result.text
            ))),
        }
    }

    async fn search_one(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
        time_limit: Duration,
    ) -> Result<Option<DirectoryEntry>, SessionError> {
        let seconds = time_limit.as_secs()
            + u64::from(time_limit.subsec_nanos() > 0);
        let options = SearchOptions::new()
            .sizelimit(1)
            .timelimit(i32::try_from(seconds).unwrap_or(i32::MAX));

        let search = self
            .ldap
            .with_search_options(options)
            .with_timeout(time_limit)
            .search(base, Scope::Subtree, filter, attributes.to_vec())
            .await;

        let ldap3::SearchResult(entries, result) = match search {
            Ok(search) => search,
            Err(LdapError::Timeout { .. }) => {
                return Err(SessionError::Timeout(time_limit));
            },
            Err(err) => return Err(classify(err)),
        };

        if let Some(entry) = entries.into_iter().next() {
            let entry = SearchEntry::construct(entry);
            return Ok(Some(DirectoryEntry {
                dn: entry.dn,
                attrs: entry.attrs,
            }));
        }

        match result.rc {
            SUCCESS | SIZE_LIMIT_EXCEEDED | NO_SUCH_OBJECT => Ok(None),
            TIME_LIMIT_EXCEEDED => Err(SessionError::Timeout(time_limit)),
            rc => Err(SessionError::Unknown(format!(
                "search failed with code {rc}: {}",
                result.text
            ))),
        }
    }

    async fn close(mut self: Box<Self>) {
        if let Err(err) = self.ldap.unbind().await {
            tracing::debug!(error = %err, "unbind failed");
        }
        // let the driver flush the unbind request before aborting it.
        let _ = tokio::time::timeout(UNBIND_GRACE, &mut self.driver).await;
    }
}

/// Map raw `ldap3` errors to session errors.
fn classify(err: LdapError) -> SessionError {
    match err {
        LdapError::LdapResult { ref result }
            if result.rc == INVALID_CREDENTIALS =>
        {
            SessionError::InvalidCredentials
        },
        LdapError::Io { .. } => SessionError::Connect(err.to_string()),
        _ => SessionError::Unknown(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::directory::tls::WebPkiValidator;
    use crate::directory::{Directory, DirectorySettings, PreferredServers};

    const BIND_REQUEST: u8 = 0x60;
    const BIND_RESPONSE: u8 = 0x61;
    const SEARCH_REQUEST: u8 = 0x63;
    const SEARCH_RESULT_DONE: u8 = 0x65;

    /// How the local server answers.
    #[derive(Debug, Clone, Copy)]
    enum Script {
        /// Accept connections, never write.
        Silent,
        /// Accept binds, never answer searches.
        SilentSearch,
        /// Accept binds, end searches with this result code.
        SearchDone(u8),
    }

    fn ldap_result(rc: u32) -> ldap3::LdapResult {
        ldap3::LdapResult {
            rc,
            matched: String::new(),
            text: "80090308: LdapErr: DSID-0C09044E".into(),
            refs: vec![],
            ctrls: vec![],
        }
    }

    fn connector() -> Ldap3Connector {
        Ldap3Connector::new(
            tls::root_store(None).unwrap(),
            Arc::new(WebPkiValidator),
        )
    }

    fn endpoint(host: &str, port: u16) -> Endpoint<'_> {
        Endpoint {
            host,
            port,
            use_tls: false,
            connect_timeout: Duration::from_secs(1),
            bind_timeout: Duration::from_millis(300),
        }
    }

    /// Read one LDAP message, returning its message id TLV and operation tag.
    async fn read_message(stream: &mut TcpStream) -> Option<(Vec<u8>, u8)> {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.ok()?;

        let len = if header[1] & 0x80 == 0 {
            usize::from(header[1])
        } else {
            let mut bytes = vec![0u8; usize::from(header[1] & 0x7f)];
            stream.read_exact(&mut bytes).await.ok()?;
            bytes.iter().fold(0, |acc, b| (acc << 8) | usize::from(*b))
        };

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.ok()?;

        let id_len = 2 + usize::from(*body.get(1)?);
        Some((body.get(..id_len)?.to_vec(), *body.get(id_len)?))
    }

    fn response(id: &[u8], op: u8, rc: u8) -> Vec<u8> {
        let mut body = id.to_vec();
        body.extend([op, 7, 0x0a, 1, rc, 0x04, 0, 0x04, 0]);

        let mut message = vec![0x30, body.len() as u8];
        message.extend(body);
        message
    }

    async fn serve(mut stream: TcpStream, script: Script) {
        while let Some((id, op)) = read_message(&mut stream).await {
            let reply = match (script, op) {
                (Script::Silent, _) => None,
                (_, BIND_REQUEST) => Some(response(&id, BIND_RESPONSE, 0)),
                (Script::SearchDone(rc), SEARCH_REQUEST) => {
                    Some(response(&id, SEARCH_RESULT_DONE, rc))
                },
                _ => None,
            };

            if let Some(reply) = reply {
                if stream.write_all(&reply).await.is_err() {
                    return;
                }
            }
        }
    }

    fn spawn_server(listener: TcpListener, script: Script) {
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, script));
            }
        });
    }

    async fn local_server(script: Script) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        spawn_server(listener, script);
        port
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(LdapError::LdapResult {
                result: ldap_result(INVALID_CREDENTIALS)
            }),
            SessionError::InvalidCredentials
        );
        assert!(matches!(
            classify(LdapError::LdapResult {
                result: ldap_result(53)
            }),
            SessionError::Unknown(_)
        ));
        assert!(matches!(
            classify(LdapError::Io {
                source: std::io::Error::from(
                    std::io::ErrorKind::ConnectionReset
                )
            }),
            SessionError::Connect(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let result = connector().open(endpoint("127.0.0.1", 1)).await;

        assert!(matches!(result, Err(SessionError::Connect(_))));
    }

    #[tokio::test]
    async fn test_bind_times_out_on_silent_server() {
        let port = local_server(Script::Silent).await;
        let mut session =
            connector().open(endpoint("127.0.0.1", port)).await.unwrap();

        let start = Instant::now();
        let err = session.bind("uid=alice,dc=example", "secret").await;

        assert_eq!(err, Err(SessionError::Timeout(Duration::from_millis(300))));
        assert!(start.elapsed() < Duration::from_secs(3));
        session.close().await;
    }

    #[tokio::test]
    async fn test_search_times_out_on_silent_server() {
        let port = local_server(Script::SilentSearch).await;
        let mut session =
            connector().open(endpoint("127.0.0.1", port)).await.unwrap();
        session.bind("uid=alice,dc=example", "secret").await.unwrap();

        let start = Instant::now();
        let result = session
            .search_one(
                "dc=example",
                "(uid=alice)",
                &["cn"],
                Duration::from_millis(300),
            )
            .await;

        assert_eq!(
            result,
            Err(SessionError::Timeout(Duration::from_millis(300)))
        );
        assert!(start.elapsed() < Duration::from_secs(3));
        session.close().await;
    }

    #[tokio::test]
    async fn test_search_result_codes() {
        let cases = [
            (
                TIME_LIMIT_EXCEEDED as u8,
                Err(SessionError::Timeout(Duration::from_secs(2))),
            ),
            (NO_SUCH_OBJECT as u8, Ok(None)),
            (SUCCESS as u8, Ok(None)),
        ];

        for (rc, expected) in cases {
            let port = local_server(Script::SearchDone(rc)).await;
            let mut session =
                connector().open(endpoint("127.0.0.1", port)).await.unwrap();
            session.bind("uid=alice,dc=example", "secret").await.unwrap();

            let result = session
                .search_one(
                    "dc=example",
                    "(uid=alice)",
                    &["cn"],
                    Duration::from_secs(2),
                )
                .await;

            assert_eq!(result, expected, "result code {rc}");
            session.close().await;
        }
    }

    #[tokio::test]
    async fn test_failover_past_silent_server() {
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();
        let answering = TcpListener::bind(("127.0.0.2", port)).await.unwrap();
        spawn_server(silent, Script::Silent);
        spawn_server(answering, Script::SilentSearch);

        let mut settings = DirectorySettings::new(
            "127.0.0.1, 127.0.0.2",
            "dc=example",
            "uid=username,LDAPDOMAIN",
        );
        settings.port = Some(port);
        settings.bind_timeout_ms = 300;
        let directory =
            Directory::new(Arc::new(connector()), PreferredServers::default());

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            directory.authenticate(&settings, "alice", "secret", None),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(result.accepted);
        assert_eq!(directory.preferred().get(None), 1);
    }
}
