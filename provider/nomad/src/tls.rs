//! TLS material for the orchestrator connection.

use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore};
use std::{path::PathBuf, sync::Arc, time::SystemTime};
use thiserror::Error;

/// Optional CA / client-certificate configuration for the Nomad API.
///
/// With no fields set the connector trusts the platform store and sends no
/// client certificate.
#[derive(Clone, Debug, Default)]
pub struct TlsSettings {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub skip_verify: bool,
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read TLS material: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TLS material: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no private key found in {0}")]
    MissingKey(String),
}

// === impl TlsSettings ===

impl TlsSettings {
    pub fn connector(&self) -> Result<HttpsConnector<HttpConnector>, TlsError> {
        if self.is_default() {
            return Ok(hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .https_or_http()
                .enable_http1()
                .build());
        }

        let mut roots = RootCertStore::empty();
        if let Some(ca) = &self.ca {
            let pem = std::fs::read(ca)?;
            for der in rustls_pemfile::certs(&mut &pem[..])? {
                roots.add(&Certificate(der))?;
            }
        }

        let builder = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots);
        let mut config = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => {
                let pem = std::fs::read(cert)?;
                let certs = rustls_pemfile::certs(&mut &pem[..])?
                    .into_iter()
                    .map(Certificate)
                    .collect();
                builder.with_client_auth_cert(certs, load_key(key)?)?
            }
            _ => builder.with_no_client_auth(),
        };

        if self.skip_verify {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(AcceptAnyCert));
        }

        Ok(hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_or_http()
            .enable_http1()
            .build())
    }

    fn is_default(&self) -> bool {
        self.ca.is_none() && self.cert.is_none() && self.key.is_none() && !self.skip_verify
    }
}

fn load_key(path: &PathBuf) -> Result<PrivateKey, TlsError> {
    let pem = std::fs::read(path)?;
    if let Some(key) = rustls_pemfile::pkcs8_private_keys(&mut &pem[..])?.into_iter().next() {
        return Ok(PrivateKey(key));
    }
    rustls_pemfile::rsa_private_keys(&mut &pem[..])?
        .into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| TlsError::MissingKey(path.display().to_string()))
}

struct AcceptAnyCert;

impl rustls::client::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
