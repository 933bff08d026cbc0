//! Mutual-TLS identity for the broker connection.
//!
//! Loads the device certificate, its issuing root, the device private key
//! and the trusted server roots through a [`ResourceResolver`], and turns
//! them into a rustls `ClientConfig` pinned to a single protocol version.
//! Raw resource bytes are dropped once the config is built.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use serde::Deserialize;

use crate::config::IdentityConfig;
use crate::error::CredentialError;
use crate::resources::ResourceResolver;

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// The single TLS version the session will speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ProtocolVersion {
    #[default]
    #[serde(rename = "tls1.2")]
    Tls12,
    #[serde(rename = "tls1.3")]
    Tls13,
}

impl ProtocolVersion {
    fn rustls_version(self) -> &'static SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls12 => f.write_str("TLSv1.2"),
            Self::Tls13 => f.write_str("TLSv1.3"),
        }
    }
}

/// Trust store + key store + pinned protocol version. Immutable once built.
#[derive(Clone)]
pub struct IdentityContext {
    trust_anchors: Vec<String>,
    certificate_chain: Vec<CertificateDer<'static>>,
    protocol_version: ProtocolVersion,
    tls: Arc<ClientConfig>,
}

impl IdentityContext {
    /// Resolve and parse every credential named in `config`.
    ///
    /// Fails with a [`CredentialError`] naming the first resource that is
    /// missing or invalid.
    pub fn build(
        config: &IdentityConfig,
        resolver: &dyn ResourceResolver,
    ) -> Result<Self, CredentialError> {
        if config.trust_anchors.is_empty() {
            return Err(CredentialError::NoTrustAnchors);
        }

        let mut names = HashSet::new();
        let mut roots = RootCertStore::empty();
        for anchor in &config.trust_anchors {
            if !names.insert(anchor.name.as_str()) {
                return Err(CredentialError::DuplicateTrustAnchor(anchor.name.clone()));
            }
            let bytes = load(resolver, &anchor.name, &anchor.locator)?;
            let cert = parse_certificate(&anchor.name, &bytes)?;
            roots
                .add(cert)
                .map_err(|e| CredentialError::InvalidCertificate {
                    name: anchor.name.clone(),
                    reason: e.to_string(),
                })?;
        }

        let device_bytes = load(resolver, "device certificate", &config.device_certificate)?;
        let device = parse_certificate("device certificate", &device_bytes)?;

        let root_bytes = load(resolver, "root certificate", &config.root_certificate)?;
        let root = parse_certificate("root certificate", &root_bytes)?;

        let key_bytes = load(resolver, "device key", &config.device_key)?;
        let key = parse_private_key("device key", &key_bytes)?;

        let certificate_chain = vec![device, root];
        let tls = ClientConfig::builder_with_protocol_versions(&[config
            .protocol_version
            .rustls_version()])
        .with_root_certificates(roots)
        .with_client_auth_cert(certificate_chain.clone(), key)
        .map_err(|e| CredentialError::Tls(e.to_string()))?;

        tracing::debug!(
            trust_anchors = config.trust_anchors.len(),
            protocol = %config.protocol_version,
            "identity context built"
        );

        Ok(Self {
            trust_anchors: config.trust_anchors.iter().map(|a| a.name.clone()).collect(),
            certificate_chain,
            protocol_version: config.protocol_version,
            tls: Arc::new(tls),
        })
    }

    /// Names of the trusted server roots, in configuration order.
    pub fn trust_anchors(&self) -> &[String] {
        &self.trust_anchors
    }

    /// Device certificate followed by its issuing root.
    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.certificate_chain
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// The rustls client configuration handed to the transport.
    pub fn tls_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.tls)
    }
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("trust_anchors", &self.trust_anchors)
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("protocol_version", &self.protocol_version)
            .finish_non_exhaustive()
    }
}

fn load(
    resolver: &dyn ResourceResolver,
    name: &str,
    locator: &str,
) -> Result<Vec<u8>, CredentialError> {
    resolver.resolve(locator).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => CredentialError::NotFound {
            name: name.to_string(),
            locator: locator.to_string(),
        },
        _ => CredentialError::Unreadable {
            name: name.to_string(),
            locator: locator.to_string(),
            reason: e.to_string(),
        },
    })
}

fn is_pem(bytes: &[u8]) -> bool {
    bytes.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER)
}

/// First certificate in a PEM bundle, or the bytes as-is when DER.
fn parse_certificate(name: &str, bytes: &[u8]) -> Result<CertificateDer<'static>, CredentialError> {
    let invalid = |reason: String| CredentialError::InvalidCertificate {
        name: name.to_string(),
        reason,
    };

    if !is_pem(bytes) {
        // DER certificates are an ASN.1 SEQUENCE.
        if bytes.first() != Some(&0x30) {
            return Err(invalid("neither PEM nor DER".into()));
        }
        return Ok(CertificateDer::from(bytes.to_vec()));
    }

    match rustls_pemfile::certs(&mut &bytes[..]).next() {
        Some(Ok(cert)) => Ok(cert),
        Some(Err(e)) => Err(invalid(e.to_string())),
        None => Err(invalid("no CERTIFICATE block".into())),
    }
}

fn parse_private_key(name: &str, bytes: &[u8]) -> Result<PrivateKeyDer<'static>, CredentialError> {
    if !is_pem(bytes) {
        return Ok(PrivatePkcs8KeyDer::from(bytes.to_vec()).into());
    }

    rustls_pemfile::private_key(&mut &bytes[..])
        .map_err(|e| CredentialError::InvalidKey {
            name: name.to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| CredentialError::MissingPrivateKey {
            name: name.to_string(),
        })
}
