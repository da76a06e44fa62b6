//! Server list resolution.

use super::{DirectoryError, Result};

/// Ordered, non-empty list of directory hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerList(Vec<String>);

impl ServerList {
    /// Split a comma-separated host list. Blank entries are ignored.
    pub fn parse(servers: &str) -> Result<Self> {
        let hosts: Vec<String> = servers
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_owned)
            .collect();

        if hosts.is_empty() {
            return Err(DirectoryError::Configuration(
                "server list is empty".into(),
            ));
        }

        Ok(Self(hosts))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index to try first given a cached hint, which may be stale.
    pub fn start(&self, hint: usize) -> usize {
        hint % self.0.len()
    }

    /// Index following `index`, wrapping around.
    pub fn next(&self, index: usize) -> usize {
        (index + 1) % self.0.len()
    }

    /// Host at `index`, wrapping around.
    pub fn get(&self, index: usize) -> &str {
        &self.0[index % self.0.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
