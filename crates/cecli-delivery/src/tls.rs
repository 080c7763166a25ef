//! TLS material for client and server transports.
//!
//! Both sides read the same pair of PEM files: a certificate bundle that is
//! presented as our identity and also trusted as the CA pool, and the matching
//! private key. Files are read once per construction. Any read or parse
//! failure is reported as `TlsConfig` before a socket is opened.

use std::{path::Path, sync::Arc};

use cecli_core::{EventError, Result, TransportConfig};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme,
};
use tracing::{debug, warn};

/// Certificate chain and private key loaded from a [`TransportConfig`].
#[derive(Debug)]
pub struct TlsMaterial {
    /// Certificates from the bundle, leaf first.
    pub certificates: Vec<CertificateDer<'static>>,
    /// Private key matching the leaf certificate.
    pub private_key: PrivateKeyDer<'static>,
}

impl TlsMaterial {
    /// Loads the certificate bundle and key named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `TlsConfig` if either file is missing, unreadable, or holds no
    /// usable PEM item.
    pub fn load(config: &TransportConfig) -> Result<Self> {
        let certificates = load_certificates(&config.cert)?;
        let private_key = load_private_key(&config.key)?;

        debug!(
            cert = %config.cert.display(),
            key = %config.key.display(),
            certificates = certificates.len(),
            "loaded TLS material"
        );

        Ok(Self { certificates, private_key })
    }
}

/// Builds the rustls client configuration used for sending over HTTPS.
///
/// The bundle's certificates become the trusted roots and the key pair is
/// offered for client authentication. `skip_verify` replaces peer
/// verification with a verifier that accepts any server certificate.
///
/// # Errors
///
/// Returns `TlsConfig` if the material cannot be loaded or does not form a
/// valid key pair.
pub fn build_client_tls(config: &TransportConfig) -> Result<ClientConfig> {
    let material = TlsMaterial::load(config)?;
    let provider = crypto_provider();

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| EventError::tls_config(format!("unsupported protocol versions: {e}")))?;

    let builder = if config.skip_verify {
        warn!("TLS peer verification disabled, any server certificate will be accepted");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new(provider)))
    } else {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(material.certificates.iter().cloned());
        if added == 0 {
            return Err(EventError::tls_config(format!(
                "no usable CA certificate in {}",
                config.cert.display()
            )));
        }
        debug!(added, ignored, "loaded CA pool");
        builder.with_root_certificates(roots)
    };

    builder
        .with_client_auth_cert(material.certificates, material.private_key)
        .map_err(|e| EventError::tls_config(format!("invalid client key pair: {e}")))
}

/// Builds the rustls server configuration used by the listener.
///
/// # Errors
///
/// Returns `TlsConfig` if the material cannot be loaded or the key does not
/// match the certificate.
pub fn build_server_tls(config: &TransportConfig) -> Result<Arc<ServerConfig>> {
    let material = TlsMaterial::load(config)?;

    let mut server = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| EventError::tls_config(format!("unsupported protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(material.certificates, material.private_key)
        .map_err(|e| EventError::tls_config(format!("failed to load TLS certificates: {e}")))?;

    server.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(server))
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certificates = CertificateDer::pem_file_iter(path)
        .map_err(|e| {
            EventError::tls_config(format!("failed to read certificate {}: {e}", path.display()))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            EventError::tls_config(format!("malformed certificate {}: {e}", path.display()))
        })?;

    if certificates.is_empty() {
        return Err(EventError::tls_config(format!(
            "no certificate found in {}",
            path.display()
        )));
    }

    Ok(certificates)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| {
        EventError::tls_config(format!("failed to read private key {}: {e}", path.display()))
    })
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct SkipServerVerification {
    provider: Arc<CryptoProvider>,
}

impl SkipServerVerification {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use cecli_core::ErrorCode;
    use tempfile::TempDir;

    use super::*;

    fn write_key_pair(dir: &TempDir) -> TransportConfig {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("tls-bundle.pem");
        let key_path = dir.path().join("tls-key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        TransportConfig { cert: cert_path, key: key_path, ..Default::default() }
    }

    #[test]
    fn missing_certificate_is_tls_config_error() {
        let config = TransportConfig {
            cert: PathBuf::from("/nonexistent/tls-bundle.pem"),
            key: PathBuf::from("/nonexistent/tls-key.pem"),
            ..Default::default()
        };

        let error = build_client_tls(&config).unwrap_err();

        assert_eq!(error.code(), ErrorCode::TlsConfig);
        assert!(error.message().contains("tls-bundle.pem"));
    }

    #[test]
    fn missing_key_is_tls_config_error() {
        let dir = TempDir::new().unwrap();
        let mut config = write_key_pair(&dir);
        config.key = dir.path().join("absent-key.pem");

        assert_eq!(build_server_tls(&config).unwrap_err().code(), ErrorCode::TlsConfig);
    }

    #[test]
    fn garbage_certificate_is_tls_config_error() {
        let dir = TempDir::new().unwrap();
        let config = write_key_pair(&dir);
        std::fs::write(&config.cert, "not a certificate").unwrap();

        assert_eq!(build_client_tls(&config).unwrap_err().code(), ErrorCode::TlsConfig);
    }

    #[test]
    fn mismatched_key_is_tls_config_error() {
        let dir = TempDir::new().unwrap();
        let config = write_key_pair(&dir);
        let other = rcgen::KeyPair::generate().unwrap();
        std::fs::write(&config.key, other.serialize_pem()).unwrap();

        assert_eq!(build_server_tls(&config).unwrap_err().code(), ErrorCode::TlsConfig);
    }

    #[test]
    fn generated_key_pair_builds_client_and_server_configs() {
        let dir = TempDir::new().unwrap();
        let config = write_key_pair(&dir);

        assert!(build_client_tls(&config).is_ok());
        assert!(build_server_tls(&config).is_ok());
    }

    #[test]
    fn skip_verify_builds_client_config() {
        let dir = TempDir::new().unwrap();
        let config = TransportConfig { skip_verify: true, ..write_key_pair(&dir) };

        assert!(build_client_tls(&config).is_ok());
    }
}
