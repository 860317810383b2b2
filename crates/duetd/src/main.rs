//! # duetd
//!
//! Duet server binary — wires the user directory, the switchboard, and the
//! HTTP/WebSocket front end together.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use duet_directory::{Directory, MemoryDirectory, OpenDirectory, UserProfile};
use duet_server::{DuetServer, ServerConfig};
use duet_switchboard::Switchboard;

/// Duet matchmaking and signaling server.
#[derive(Parser, Debug)]
#[command(name = "duetd", about = "Duet matchmaking and signaling server")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides the config file, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to a JSON roster of known users. Without one the server runs an
    /// open directory where any user ID authenticates.
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_roster(path: &Path) -> Result<Vec<UserProfile>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read roster file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse roster file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging(args.log_json);

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate().context("invalid configuration")?;

    let directory: Arc<dyn Directory> = match &args.roster {
        Some(path) => {
            let roster = load_roster(path)?;
            tracing::info!(
                users = roster.len(),
                path = %path.display(),
                "roster directory loaded"
            );
            Arc::new(MemoryDirectory::new(roster))
        }
        None => {
            tracing::info!("no roster file given, running as an open directory");
            Arc::new(OpenDirectory::new())
        }
    };

    let metrics_handle = duet_server::metrics::install_recorder();
    let switchboard = Arc::new(Switchboard::new(directory));
    let server = DuetServer::new(config, switchboard, metrics_handle);

    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!("duetd listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let grace = server.config().shutdown_grace();
    server.shutdown().drain(vec![handle], grace).await;
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["duetd"]);
        assert!(cli.config.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.roster.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn cli_custom_port() {
        let cli = Cli::parse_from(["duetd", "--port", "8080"]);
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn cli_custom_host() {
        let cli = Cli::parse_from(["duetd", "--host", "0.0.0.0"]);
        assert_eq!(cli.host, Some("0.0.0.0".to_owned()));
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["duetd", "--config", "/etc/duet.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/duet.json")));
    }

    #[test]
    fn cli_log_json_flag() {
        let cli = Cli::parse_from(["duetd", "--log-json"]);
        assert!(cli.log_json);
    }

    #[test]
    fn roster_file_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "u_1", "displayName": "ada", "verified": true}},
                {{"id": "u_9", "displayName": "eve", "verified": false}}
            ]"#
        )
        .unwrap();

        let roster = load_roster(file.path()).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].id.as_str(), "u_1");
        assert_eq!(roster[0].display_name, "ada");
        assert!(roster[0].verified);
        assert!(!roster[1].verified);
    }

    #[test]
    fn missing_roster_file_is_an_error() {
        let err = load_roster(Path::new("/nonexistent/roster.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read roster file"));
    }

    #[test]
    fn malformed_roster_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = load_roster(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse roster file"));
    }
}
