#![deny(unsafe_code)]

//! Soloist CLI — single-instance demo application.
//!
//! `soloist run` either becomes the singleton (logging every forwarded
//! message until stopped or interrupted) or, when an instance is already
//! running, forwards its message as one JSON line and exits with the
//! handshake status.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use soloist_core::{
    AppHooks, BoxFuture, Connection, ConnectionOutcome, HookError, Role, SingletonApp, StopHandle,
};

/// Soloist — make an entire application a singleton.
#[derive(Parser)]
#[command(name = "soloist", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "soloist.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as the singleton, or forward MESSAGE to the running instance.
    Run {
        /// Message forwarded when another instance already holds the endpoint.
        message: Vec<String>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing subscriber with verbosity level
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Run { message } => cmd_run(&cli.config, message).await?,
        Commands::Config { show } => cmd_config(&cli.config, show).await?,
    }

    Ok(())
}

async fn cmd_run(config_path: &Path, message: Vec<String>) -> Result<()> {
    let config = load_config(config_path).await?;
    let app = SingletonApp::from_config(&config);
    let hooks = Arc::new(CliHooks {
        message: message.join(" "),
    });

    let outcome = app.run(hooks).await?;
    match outcome.role {
        Role::Singleton => info!(code = outcome.exit_code, "singleton stopped"),
        Role::Duplicate => info!(
            code = outcome.exit_code,
            "message handed to the running instance"
        ),
    }

    if outcome.exit_code != 0 {
        std::process::exit(outcome.exit_code);
    }
    Ok(())
}

async fn cmd_config(config_path: &Path, show: bool) -> Result<()> {
    let config = load_config(config_path).await?;
    if show {
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<soloist_config::AppConfig> {
    if path.exists() {
        soloist_config::AppConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(soloist_config::AppConfig::default())
    }
}

/// Demo hooks: the singleton logs every forwarded message; a duplicate
/// forwards its command line as one JSON line.
struct CliHooks {
    message: String,
}

impl AppHooks for CliHooks {
    fn run<'a>(&'a self, _stop: StopHandle) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async {
            info!("running as singleton; press Ctrl-C to stop");
            std::future::pending::<()>().await;
            Ok(())
        })
    }

    fn handle_client<'a>(
        &'a self,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<ConnectionOutcome, HookError>> {
        Box::pin(async move {
            let mut line = String::new();
            BufReader::new(conn).read_line(&mut line).await?;

            match parse_payload(&line) {
                Some(message) => {
                    info!(%message, "received message from a duplicate instance");
                    Ok(ConnectionOutcome::Success)
                }
                None => {
                    warn!(payload = line.trim(), "unparseable payload");
                    Ok(ConnectionOutcome::Failure)
                }
            }
        })
    }

    fn produce_outbound<'a>(
        &'a self,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async move {
            let payload = serde_json::json!({ "message": self.message }).to_string();
            conn.write_all(payload.as_bytes()).await?;
            conn.write_all(b"\n").await?;
            Ok(())
        })
    }
}

fn parse_payload(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_payload_round_trip() {
        let line = serde_json::json!({ "message": "open file.txt" }).to_string();
        assert_eq!(parse_payload(&line), Some("open file.txt".to_string()));
    }

    #[test]
    fn test_parse_payload_rejects_garbage() {
        assert_eq!(parse_payload("not json"), None);
        assert_eq!(parse_payload("{\"other\": 1}"), None);
        assert_eq!(parse_payload(""), None);
    }
}
