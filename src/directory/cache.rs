//! Preferred-server hints, per tenant.

use std::sync::Arc;

use dashmap::DashMap;

const KEY_PREFIX: &str = "LdapActiveConnection_";

/// Key-value store holding the last server index that answered for a tenant.
///
/// Last write wins. Implementations may be shared between processes.
pub trait PreferredServerStore: Send + Sync {
    fn get(&self, key: &str) -> Option<usize>;

    fn set(&self, key: &str, index: usize);
}

/// Process-wide in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferredServerStore for MemoryStore {
    fn get(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(|entry| *entry)
    }

    fn set(&self, key: &str, index: usize) {
        self.entries.insert(key.to_owned(), index);
    }
}

/// Tenant-keyed view over a [`PreferredServerStore`].
#[derive(Clone)]
pub struct PreferredServers {
    store: Arc<dyn PreferredServerStore>,
}

impl std::fmt::Debug for PreferredServers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferredServers").finish_non_exhaustive()
    }
}

impl Default for PreferredServers {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

impl PreferredServers {
    pub fn new(store: Arc<dyn PreferredServerStore>) -> Self {
        Self { store }
    }

    /// Store key for `tenant`. Single-tenant deployments use an empty id.
    pub fn key(tenant: Option<&str>) -> String {
        format!("{KEY_PREFIX}{}", tenant.unwrap_or_default())
    }

    /// Last index recorded for `tenant`, `0` when unknown.
    pub fn get(&self, tenant: Option<&str>) -> usize {
        self.store.get(&Self::key(tenant)).unwrap_or(0)
    }

    pub fn set(&self, tenant: Option<&str>, index: usize) {
        self.store.set(&Self::key(tenant), index);
    }
}
