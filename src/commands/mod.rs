//! Command implementations and the options they share.

pub mod listen;
pub mod send;
pub mod webhook;

use std::path::PathBuf;

use anyhow::Result;
use cecli_api::{config::CONFIG_FILE, Config};
use clap::Args;

/// Options accepted by every command.
///
/// Unset options leave the value from `cecli.toml` or the `CE_*`
/// environment in place.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Address to send to or listen on [default: localhost]
    #[arg(long, global = true)]
    pub address: Option<String>,

    /// Port to send to or listen on [default: 8080]
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Use plaintext HTTP instead of TLS
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Verify the peer certificate [default: true]
    #[arg(
        long,
        global = true,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        conflicts_with = "skip_verify"
    )]
    pub verify: Option<bool>,

    /// Accept any server certificate (same as --verify=false)
    #[arg(long, global = true)]
    pub skip_verify: bool,

    /// PEM certificate bundle, also trusted as CA [default: tls-bundle.pem]
    #[arg(long, global = true)]
    pub cert: Option<PathBuf>,

    /// PEM private key [default: tls-key.pem]
    #[arg(long, global = true)]
    pub key: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Loads layered configuration and applies explicit flags on top.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_from(&self.config)?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.address.clone_from(address);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(cert) = &self.cert {
            config.cert.clone_from(cert);
        }
        if let Some(key) = &self.key {
            config.key.clone_from(key);
        }
        if self.insecure {
            config.insecure = true;
        }
        if let Some(verify) = self.verify {
            config.skip_verify = !verify;
        }
        if self.skip_verify {
            config.skip_verify = true;
        }
    }
}
