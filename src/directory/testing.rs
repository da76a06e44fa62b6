//! In-memory connector for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::session::{
    Connector, DirectoryEntry, Endpoint, Session, SessionError,
};

/// How a scripted server answers.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Connection refused.
    Unreachable,
    /// Bind answered with invalid credentials.
    Reject,
    /// Bind succeeds, search returns the entry.
    Accept(Option<DirectoryEntry>),
    /// Bind succeeds, search fails.
    SearchFails(SessionError),
    /// Bind fails with this error.
    Fail(SessionError),
}

#[derive(Debug, Default)]
struct Journal {
    contacted: Mutex<Vec<String>>,
    binds: Mutex<Vec<String>>,
    searches: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

/// Servers not listed are unreachable.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    behaviours: HashMap<String, Behaviour>,
    journal: Arc<Journal>,
}

impl ScriptedConnector {
    pub fn new<'a>(
        behaviours: impl IntoIterator<Item = (&'a str, Behaviour)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            behaviours: behaviours
                .into_iter()
                .map(|(host, behaviour)| (host.to_owned(), behaviour))
                .collect(),
            journal: Arc::default(),
        })
    }

    /// Hosts passed to `open`, in order.
    pub fn contacted(&self) -> Vec<String> {
        self.journal.contacted.lock().unwrap().clone()
    }

    /// Identities passed to `bind`, in order.
    pub fn binds(&self) -> Vec<String> {
        self.journal.binds.lock().unwrap().clone()
    }

    /// Filters passed to `search_one`, in order.
    pub fn searches(&self) -> Vec<String> {
        self.journal.searches.lock().unwrap().clone()
    }

    /// Sessions closed so far.
    pub fn closed(&self) -> usize {
        self.journal.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
        endpoint: Endpoint<'_>,
    ) -> Result<Box<dyn Session>, SessionError> {
        self.journal
            .contacted
            .lock()
            .unwrap()
            .push(endpoint.host.to_owned());

        match self.behaviours.get(endpoint.host) {
            None | Some(Behaviour::Unreachable) => Err(SessionError::Connect(
                format!("{}: connection refused", endpoint.url()),
            )),
            Some(behaviour) => Ok(Box::new(ScriptedSession {
                behaviour: behaviour.clone(),
                journal: Arc::clone(&self.journal),
            })),
        }
    }
}

struct ScriptedSession {
    behaviour: Behaviour,
    journal: Arc<Journal>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn bind(
        &mut self,
        identity: &str,
        _password: &str,
    ) -> Result<(), SessionError> {
        self.journal.binds.lock().unwrap().push(identity.to_owned());

        match &self.behaviour {
            Behaviour::Reject => Err(SessionError::InvalidCredentials),
            Behaviour::Fail(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    async fn search_one(
        &mut self,
        _base: &str,
        filter: &str,
        _attributes: &[&str],
        _time_limit: Duration,
    ) -> Result<Option<DirectoryEntry>, SessionError> {
        self.journal.searches.lock().unwrap().push(filter.to_owned());

        match &self.behaviour {
            Behaviour::Accept(entry) => Ok(entry.clone()),
            Behaviour::SearchFails(err) => Err(err.clone()),
            _ => Err(SessionError::Unknown("not bound".into())),
        }
    }

    async fn close(self: Box<Self>) {
        self.journal.closed.fetch_add(1, Ordering::SeqCst);
    }
}
