//! Configuration management for cecli.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use cecli_core::{
    transport::{DEFAULT_ADDRESS, DEFAULT_CERT_PATH, DEFAULT_KEY_PATH, DEFAULT_PORT},
    TransportConfig,
};
use cecli_delivery::{ClientConfig, DeliveryPolicy, DEFAULT_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// File read when no other path is given.
pub const CONFIG_FILE: &str = "cecli.toml";

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "CE_";

/// Complete cecli configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed with `CE_` (highest priority)
/// 2. Configuration file (`cecli.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Command-line flags are applied on top by the binary after loading.
///
/// # Example
///
/// ```no_run
/// use cecli_api::Config;
///
/// let config = Config::load()?;
/// println!("events go to {}", config.to_transport_config().url());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // Transport
    /// Host to connect to or bind on.
    ///
    /// Environment variable: `CE_ADDRESS`
    #[serde(default = "default_address")]
    pub address: String,
    /// Port to connect to or bind on.
    ///
    /// Environment variable: `CE_PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// PEM certificate bundle, also trusted as the CA pool.
    ///
    /// Environment variable: `CE_CERT`
    #[serde(default = "default_cert")]
    pub cert: PathBuf,
    /// PEM private key matching `cert`.
    ///
    /// Environment variable: `CE_KEY`
    #[serde(default = "default_key")]
    pub key: PathBuf,
    /// Use plaintext HTTP.
    ///
    /// Environment variable: `CE_INSECURE`
    #[serde(default)]
    pub insecure: bool,
    /// Accept any server certificate.
    ///
    /// Environment variable: `CE_SKIP_VERIFY`
    #[serde(default)]
    pub skip_verify: bool,

    // Delivery
    /// Attempts per event, including the first.
    ///
    /// Environment variable: `CE_ATTEMPTS`
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay between attempts in milliseconds.
    ///
    /// Environment variable: `CE_DELAY_MS`
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `CE_REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Webhook sink that received events are forwarded to.
    ///
    /// Environment variable: `CE_SINK`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
}

impl Config {
    /// Loads configuration from defaults, `cecli.toml`, and `CE_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source holds a value of the wrong type or the
    /// merged configuration fails validation.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Like [`Config::load`] with an explicit configuration file.
    ///
    /// A missing file is not an error; its layer is simply empty.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            anyhow::bail!("address must not be empty");
        }

        if self.attempts == 0 {
            anyhow::bail!("attempts must be greater than 0");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if !self.insecure && (self.cert.as_os_str().is_empty() || self.key.as_os_str().is_empty())
        {
            anyhow::bail!("cert and key are required unless insecure is set");
        }

        if self.sink.as_deref().is_some_and(|sink| sink.trim().is_empty()) {
            anyhow::bail!("sink must not be empty when set");
        }

        Ok(())
    }

    /// Converts to the transport settings shared by client and listener.
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            address: self.address.clone(),
            port: self.port,
            cert: self.cert.clone(),
            key: self.key.clone(),
            insecure: self.insecure,
            skip_verify: self.skip_verify,
        }
    }

    /// Converts to the retry policy for outbound events.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `attempts` is zero.
    pub fn to_delivery_policy(&self) -> cecli_core::Result<DeliveryPolicy> {
        DeliveryPolicy::from_millis(self.attempts, self.delay_ms)
    }

    /// Converts to HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig { timeout: Duration::from_secs(self.request_timeout), ..Default::default() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            cert: default_cert(),
            key: default_key(),
            insecure: false,
            skip_verify: false,
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            request_timeout: default_request_timeout(),
            sink: None,
        }
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cert() -> PathBuf {
    PathBuf::from(DEFAULT_CERT_PATH)
}

fn default_key() -> PathBuf {
    PathBuf::from(DEFAULT_KEY_PATH)
}

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.to_transport_config(), TransportConfig::default());
        assert_eq!(config.to_delivery_policy().unwrap(), DeliveryPolicy::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                    address = "events.internal"
                    port = 9443
                    cert = "certs/bundle.pem"
                    attempts = 5
                "#,
            )?;

            let config = Config::load().map_err(|e| e.to_string())?;

            assert_eq!(config.address, "events.internal");
            assert_eq!(config.port, 9443);
            assert_eq!(config.cert, PathBuf::from("certs/bundle.pem"));
            assert_eq!(config.key, PathBuf::from(DEFAULT_KEY_PATH));
            assert_eq!(config.attempts, 5);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "port = 9000\ninsecure = false")?;
            jail.set_env("CE_PORT", "9100");
            jail.set_env("CE_INSECURE", "true");
            jail.set_env("CE_SKIP_VERIFY", "true");
            jail.set_env("CE_ADDRESS", "10.1.2.3");

            let transport = Config::load().map_err(|e| e.to_string())?.to_transport_config();

            assert_eq!(transport.port, 9100);
            assert!(transport.insecure);
            assert!(transport.skip_verify);
            assert_eq!(transport.url(), "http://10.1.2.3:9100");
            Ok(())
        });
    }

    #[test]
    fn explicit_path_is_read() {
        Jail::expect_with(|jail| {
            jail.create_file("alt.toml", "sink = \"http://sink.local/hook\"")?;

            let config = Config::load_from("alt.toml").map_err(|e| e.to_string())?;

            assert_eq!(config.sink.as_deref(), Some("http://sink.local/hook"));
            Ok(())
        });
    }

    #[test]
    fn zero_attempts_fails_validation() {
        Jail::expect_with(|jail| {
            jail.set_env("CE_ATTEMPTS", "0");
            assert!(Config::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = Config::default();
        config.address = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.request_timeout = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.cert = PathBuf::new();
        assert!(config.validate().is_err());
        config.insecure = true;
        assert!(config.validate().is_ok());

        config = Config::default();
        config.sink = Some(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn client_config_uses_request_timeout() {
        let config = Config { request_timeout: 5, ..Config::default() };
        assert_eq!(config.to_client_config().timeout, Duration::from_secs(5));
    }
}
