//! Transport configuration shared by the client and listener sides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default host for both sending and listening.
pub const DEFAULT_ADDRESS: &str = "localhost";

/// Default port for both sending and listening.
pub const DEFAULT_PORT: u16 = 8080;

/// Default PEM bundle holding the certificate chain (also used as CA pool).
pub const DEFAULT_CERT_PATH: &str = "tls-bundle.pem";

/// Default PEM file holding the private key.
pub const DEFAULT_KEY_PATH: &str = "tls-key.pem";

/// Where to connect or listen, and with which TLS material.
///
/// When `insecure` is false, `cert` and `key` must reference a loadable key
/// pair. The URL scheme depends only on `insecure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Host name or IP address.
    pub address: String,
    /// TCP port.
    pub port: u16,
    /// PEM certificate chain, doubling as the trusted CA bundle.
    pub cert: PathBuf,
    /// PEM private key matching `cert`.
    pub key: PathBuf,
    /// Use plaintext HTTP instead of TLS.
    pub insecure: bool,
    /// Accept any server certificate when sending over TLS.
    pub skip_verify: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            cert: PathBuf::from(DEFAULT_CERT_PATH),
            key: PathBuf::from(DEFAULT_KEY_PATH),
            insecure: false,
            skip_verify: false,
        }
    }
}

impl TransportConfig {
    /// Returns `http` for insecure transports and `https` otherwise.
    pub const fn scheme(&self) -> &'static str {
        if self.insecure {
            "http"
        } else {
            "https"
        }
    }

    /// Returns `address:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Returns the canonical endpoint URL, `scheme://address:port`.
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme(), self.authority())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str, port: u16, insecure: bool) -> TransportConfig {
        TransportConfig { address: address.to_string(), port, insecure, ..Default::default() }
    }

    #[test]
    fn insecure_url_uses_http() {
        assert_eq!(config("h", 9, true).url(), "http://h:9");
    }

    #[test]
    fn secure_url_uses_https() {
        assert_eq!(config("h", 9, false).url(), "https://h:9");
    }

    #[test]
    fn url_is_deterministic() {
        let config = config("events.internal", 8443, false);
        assert_eq!(config.url(), config.url());
    }

    #[test]
    fn ipv6_literal_is_bracketed() {
        assert_eq!(config("::1", 8080, true).url(), "http://[::1]:8080");
        assert_eq!(config("[::1]", 8080, true).url(), "http://[::1]:8080");
    }

    #[test]
    fn defaults_match_cli_defaults() {
        let config = TransportConfig::default();

        assert_eq!(config.address, "localhost");
        assert_eq!(config.port, 8080);
        assert_eq!(config.cert, PathBuf::from("tls-bundle.pem"));
        assert_eq!(config.key, PathBuf::from("tls-key.pem"));
        assert!(!config.insecure);
        assert!(!config.skip_verify);
    }
}
