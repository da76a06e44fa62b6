//! Certificate validation for `ldaps://` sessions.
//!
//! The TLS handshake runs the standard WebPKI verification first and hands
//! its result to an injected [`CertificateValidator`], which has the final
//! word on whether the peer is trusted.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier};
use rustls::{
    Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName,
};

use super::{DirectoryError, Result};

/// Outcome of the standard chain verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyErrors {
    /// Why the chain did not verify, if it did not.
    pub chain: Option<String>,
}

impl PolicyErrors {
    pub fn is_empty(&self) -> bool {
        self.chain.is_none()
    }
}

/// Decides whether a directory server certificate is trusted.
pub trait CertificateValidator: Send + Sync {
    /// `certificate` and `chain` are DER encoded, leaf first.
    fn validate(
        &self,
        peer: &str,
        certificate: &[u8],
        chain: &[&[u8]],
        errors: &PolicyErrors,
    ) -> bool;
}

/// Trust a certificate only when the standard verification passed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebPkiValidator;

impl CertificateValidator for WebPkiValidator {
    fn validate(
        &self,
        peer: &str,
        _certificate: &[u8],
        _chain: &[&[u8]],
        errors: &PolicyErrors,
    ) -> bool {
        if let Some(reason) = &errors.chain {
            tracing::warn!(%peer, %reason, "directory certificate rejected");
        }
        errors.is_empty()
    }
}

/// Trust every certificate. Lab use only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAnyCertificate;

impl CertificateValidator for AcceptAnyCertificate {
    fn validate(
        &self,
        peer: &str,
        _certificate: &[u8],
        _chain: &[&[u8]],
        errors: &PolicyErrors,
    ) -> bool {
        if let Some(reason) = &errors.chain {
            tracing::debug!(%peer, %reason, "ignoring certificate errors");
        }
        true
    }
}

/// Mozilla roots, plus the certificates of `ca_file` when given.
pub fn root_store(ca_file: Option<&Path>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    if let Some(path) = ca_file {
        let file = File::open(path).map_err(|err| {
            DirectoryError::Configuration(format!(
                "cannot open `{}`: {err}",
                path.display()
            ))
        })?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(file))
            .map_err(|err| DirectoryError::Configuration(err.to_string()))?;

        let (added, ignored) = roots.add_parsable_certificates(&certs);
        if added == 0 {
            return Err(DirectoryError::Configuration(format!(
                "no usable certificate in `{}`",
                path.display()
            )));
        }
        tracing::debug!(added, ignored, path = %path.display(), "custom CA loaded");
    }

    Ok(roots)
}

/// Why the last handshake was refused, shared with the session adapter.
pub type Refusal = Arc<Mutex<Option<String>>>;

/// Build a client configuration delegating trust to `validator`.
pub fn client_config(
    roots: RootCertStore,
    validator: Arc<dyn CertificateValidator>,
) -> (ClientConfig, Refusal) {
    let rejection = Refusal::default();
    let verifier = DelegatingVerifier {
        webpki: WebPkiVerifier::new(roots, None),
        validator,
        rejection: Arc::clone(&rejection),
    };

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    (config, rejection)
}

struct DelegatingVerifier {
    webpki: WebPkiVerifier,
    validator: Arc<dyn CertificateValidator>,
    rejection: Refusal,
}

impl ServerCertVerifier for DelegatingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        ocsp_response: &[u8],
        now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let errors = match self.webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            scts,
            ocsp_response,
            now,
        ) {
            Ok(_) => PolicyErrors::default(),
            Err(err) => PolicyErrors {
                chain: Some(err.to_string()),
            },
        };

        let peer = peer_identity(server_name);
        let chain: Vec<&[u8]> =
            intermediates.iter().map(|cert| cert.0.as_slice()).collect();

        if self.validator.validate(&peer, &end_entity.0, &chain, &errors) {
            return Ok(ServerCertVerified::assertion());
        }

        let reason = errors
            .chain
            .unwrap_or_else(|| "refused by certificate validator".into());
        if let Ok(mut slot) = self.rejection.lock() {
            *slot = Some(reason.clone());
        }

        Err(rustls::Error::General(format!(
            "certificate of {peer} not trusted: {reason}"
        )))
    }
}

fn peer_identity(server_name: &ServerName) -> String {
    match server_name {
        ServerName::DnsName(name) => name.as_ref().to_owned(),
        ServerName::IpAddress(ip) => ip.to_string(),
        _ => "unknown".into(),
    }
}
