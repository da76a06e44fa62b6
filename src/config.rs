//! Configuration manager for dirgate.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::directory::DirectorySettings;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 1111;
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors that may occur while loading `config.yaml`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("telemetry endpoint is invalid: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    version: String,
    /// Directory used when no tenant is given, or the tenant is unknown.
    #[serde(default, skip_serializing)]
    pub directory: Option<DirectorySettings>,
    /// Per-tenant directories.
    #[serde(default, skip_serializing)]
    pub tenants: HashMap<String, DirectorySettings>,
    /// Related to `ldaps://` certificate checks.
    #[serde(default, skip_serializing)]
    pub tls: Tls,
    /// Related to the server connectivity check route.
    #[serde(default, skip_serializing)]
    pub diagnostics: Diagnostics,
    /// Related to OpenTelemetry export.
    #[serde(default, skip_serializing)]
    pub telemetry: Telemetry,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_CRATE_NAME").into(),
            port: DEFAULT_PORT,
            version: VERSION.to_owned(),
            directory: None,
            tenants: HashMap::new(),
            tls: Tls::default(),
            diagnostics: Diagnostics::default(),
            telemetry: Telemetry::default(),
        }
    }
}

/// Certificate validation configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tls {
    /// Accept any server certificate. Never enable in production.
    #[serde(default)]
    pub skip_verify: bool,
    /// PEM bundle trusted in addition to the Mozilla roots.
    pub ca_file: Option<PathBuf>,
}

/// Connectivity check configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Bearer token required by `POST /directory/test`.
    /// The route is disabled when unset.
    pub token: Option<String>,
}

/// OpenTelemetry configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// OTLP gRPC endpoint, such as `http://localhost:4317`.
    pub endpoint: Option<String>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    /// Reads `config.yaml` from `path` or the default location.
    pub fn read(path: Option<&Path>) -> Result<Self, Error> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_reader(file)
    }

    /// Parse a YAML document.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, Error> {
        let mut config: Configuration = serde_yaml::from_reader(reader)?;

        // set app version.
        config.version = VERSION.to_owned();
        if config.name.is_empty() {
            config.name = env!("CARGO_CRATE_NAME").into();
        }

        config.telemetry.endpoint = config
            .telemetry
            .endpoint
            .map(|endpoint| Url::parse(&endpoint).map(|url| url.to_string()))
            .transpose()?;

        Ok(config)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Directory settings of `tenant`, falling back on the default directory.
    pub fn settings_for(&self, tenant: Option<&str>) -> Option<&DirectorySettings> {
        tenant
            .and_then(|tenant| self.tenants.get(tenant))
            .or(self.directory.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
name: corp-login
port: 8080
directory:
  servers: dc1.corp.local, dc2.corp.local
  domain: corp.local
  user_dn_format: username@LDAPDOMAIN
tenants:
  lab:
    servers: ldap.lab.local
    port: 1636
    use_tls: true
    domain: ou=people,dc=lab,dc=local
    user_dn_format: uid=username,LDAPDOMAIN
    search_timeout_ms: 2000
tls:
  ca_file: /etc/ssl/lab-ca.pem
diagnostics:
  token: s3cr3t
telemetry:
  endpoint: http://localhost:4317
"#;

    #[test]
    fn test_read_configuration() {
        let config = Configuration::from_reader(CONFIG.as_bytes()).unwrap();

        assert_eq!(config.name, "corp-login");
        assert_eq!(config.port, 8080);
        assert_eq!(config.version(), VERSION);
        assert_eq!(config.diagnostics.token.as_deref(), Some("s3cr3t"));
        assert_eq!(
            config.tls.ca_file.as_deref(),
            Some(Path::new("/etc/ssl/lab-ca.pem"))
        );
        assert!(!config.tls.skip_verify);
        assert_eq!(
            config.telemetry.endpoint.as_deref(),
            Some("http://localhost:4317/")
        );

        let lab = config.settings_for(Some("lab")).unwrap();
        assert_eq!(lab.port(), 1636);
        assert!(lab.use_tls);
        assert_eq!(lab.search_timeout_ms, 2000);
    }

    #[test]
    fn test_tenant_fallback() {
        let config = Configuration::from_reader(CONFIG.as_bytes()).unwrap();

        let default = config.directory.as_ref();
        assert_eq!(config.settings_for(None), default);
        assert_eq!(config.settings_for(Some("unknown")), default);

        let config = Configuration::default();
        assert!(config.settings_for(None).is_none());
    }

    #[test]
    fn test_minimal_configuration() {
        let config = Configuration::from_reader("{}".as_bytes()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.tenants.is_empty());
        assert!(!config.name.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err =
            Configuration::read(Some(Path::new("/nonexistent/config.yaml")))
                .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
