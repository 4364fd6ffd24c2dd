//! sockdemo TCP server: entry point.
//!
//! Listens for clients, greets each one, logs every message it sends, and
//! closes the connection when the client sends the termination signal (an
//! empty message).
//!
//! # Usage
//!
//! ```text
//! sockdemo-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML config file (missing file = defaults)
//!   --bind <IP>                Bind address        [file default: 127.0.0.1]
//!   --port <PORT>              Listening port      [file default: 50000]
//!   --backlog <N>              Pending-connection queue depth [file default: 10]
//!   --mode <MODE>              single_exchange | framed_loop
//!   --dispatch <MODE>          sequential | concurrent
//!   --greeting <TEXT>          Greeting sent after accept
//!   --idle-timeout-secs <S>    Close connections idle this long
//!   --print-config             Print the effective config as TOML and exit
//! ```
//!
//! # Precedence
//!
//! CLI flag > environment variable > config file > built-in default.
//!
//! | Variable                | Flag                  |
//! |-------------------------|-----------------------|
//! | `SOCKDEMO_CONFIG`       | `--config`            |
//! | `SOCKDEMO_BIND`         | `--bind`              |
//! | `SOCKDEMO_PORT`         | `--port`              |
//! | `SOCKDEMO_BACKLOG`      | `--backlog`           |
//! | `SOCKDEMO_MODE`         | `--mode`              |
//! | `SOCKDEMO_DISPATCH`     | `--dispatch`          |
//! | `SOCKDEMO_GREETING`     | `--greeting`          |
//! | `SOCKDEMO_IDLE_TIMEOUT` | `--idle-timeout-secs` |

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sockdemo_core::{DispatchMode, HandlerMode};
use sockdemo_server::infrastructure::run_server;
use sockdemo_server::infrastructure::storage::config::{load_config, ServerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// sockdemo TCP server.
///
/// Every flag is optional; an absent flag leaves the config file's value (or
/// the built-in default) in place.
#[derive(Debug, Parser)]
#[command(
    name = "sockdemo-server",
    about = "Greets TCP clients and logs their messages until they terminate",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "SOCKDEMO_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind.  `0.0.0.0` accepts clients on every interface.
    #[arg(long, env = "SOCKDEMO_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.  `0` picks a free port.
    #[arg(long, env = "SOCKDEMO_PORT")]
    port: Option<u16>,

    /// Connections the OS may queue before they are accepted.
    #[arg(long, env = "SOCKDEMO_BACKLOG")]
    backlog: Option<u32>,

    /// Handler mode: `single_exchange` or `framed_loop`.
    #[arg(long, env = "SOCKDEMO_MODE")]
    mode: Option<HandlerMode>,

    /// Dispatch mode: `sequential` or `concurrent`.
    #[arg(long, env = "SOCKDEMO_DISPATCH")]
    dispatch: Option<DispatchMode>,

    /// Greeting sent to every client right after accept.
    #[arg(long, env = "SOCKDEMO_GREETING")]
    greeting: Option<String>,

    /// Close a connection after this many seconds without a message.
    #[arg(long, env = "SOCKDEMO_IDLE_TIMEOUT")]
    idle_timeout_secs: Option<u64>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Loads the config file (if any) and applies the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("could not load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            cfg.listener.bind_address = bind;
        }
        if let Some(port) = self.port {
            cfg.listener.port = port;
        }
        if let Some(backlog) = self.backlog {
            cfg.listener.backlog = backlog;
        }
        if let Some(mode) = self.mode {
            cfg.handler.mode = mode;
        }
        if let Some(dispatch) = self.dispatch {
            cfg.server.dispatch = dispatch;
        }
        if let Some(greeting) = self.greeting {
            cfg.handler.greeting = greeting;
        }
        if self.idle_timeout_secs.is_some() {
            cfg.handler.idle_timeout_secs = self.idle_timeout_secs;
        }
        Ok(cfg)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let print_config = cli.print_config;
    let config = cli.into_server_config()?;

    if print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("sockdemo server starting");

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, stopping listener"),
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
                // Without a signal handler the server runs until killed.
                std::future::pending::<()>().await;
            }
        }
    };

    run_server(&config, shutdown).await?;

    info!("sockdemo server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
