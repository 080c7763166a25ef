//! cecli - send and receive CloudEvents over HTTP/S.
//!
//! Parses the command line, initializes tracing, and maps the first
//! unrecoverable error to the process exit code.

use std::process::ExitCode;

use anyhow::Result;
use cecli_api::shutdown_signal;
use cecli_core::{ErrorCode, EventError};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::error;

mod commands;

use commands::{listen, send, send::SendArgs, webhook, webhook::WebhookArgs, GlobalArgs};

const NAME: &str = "cecli";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "cecli", version)]
#[command(about = "A CloudEvents CLI tool")]
#[command(long_about = "A CloudEvents CLI tool to send and receive CloudEvents over HTTP/S.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a CloudEvent to the target
    Send(SendArgs),
    /// Listen for CloudEvents and display them
    #[command(visible_alias = "lis")]
    Listen,
    /// Handle CloudEvents via webhook, displaying or forwarding them
    #[command(visible_alias = "wh")]
    Webhook(WebhookArgs),
    /// Show the CLI version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    match run(cli, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code(&e);
            error!(code, "{e:#}");
            ExitCode::from(code)
        },
    }
}

async fn run(cli: Cli, shutdown: CancellationToken) -> Result<()> {
    match &cli.command {
        Commands::Send(args) => send::run(&cli.global, args, shutdown).await,
        Commands::Listen => listen::run(&cli.global, shutdown).await,
        Commands::Webhook(args) => webhook::run(&cli.global, args, shutdown).await,
        Commands::Version => {
            println!("{NAME} version {VERSION}");
            Ok(())
        },
    }
}

/// Numeric code of the first [`EventError`] in the chain, `Unknown` otherwise.
fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<EventError>())
        .map_or(ErrorCode::Unknown, EventError::code)
        .as_u8()
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default = if verbose {
        "info,cecli=debug,cecli_core=debug,cecli_delivery=debug,cecli_api=debug,tower_http=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let fmt_layer = fmt::layer().with_target(verbose);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cecli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn command_aliases() {
        assert!(matches!(parse(&["lis"]).command, Commands::Listen));
        assert!(matches!(parse(&["wh", "--sink", "http://x/"]).command, Commands::Webhook(_)));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["send", "--port", "9001", "--insecure", "--attempts", "5"]);

        assert_eq!(cli.global.port, Some(9001));
        assert!(cli.global.insecure);
        let Commands::Send(args) = cli.command else { panic!("expected send") };
        assert_eq!(args.attempts, Some(5));
    }

    #[test]
    fn exit_code_follows_error_code() {
        let error = anyhow::Error::new(EventError::tls_config("missing cert"));
        assert_eq!(exit_code(&error), 4);

        let wrapped = Err::<(), _>(EventError::not_accepted("410"))
            .context("forwarding failed")
            .unwrap_err();
        assert_eq!(exit_code(&wrapped), 7);
    }

    #[test]
    fn foreign_error_exits_unknown() {
        assert_eq!(exit_code(&anyhow::anyhow!("config file is not TOML")), 1);
    }
}
