//! sockdemo client simulator: entry point.
//!
//! # Usage
//!
//! ```text
//! sockdemo-client [OPTIONS]
//!
//! Options:
//!   --host <IP>          Server IP address          [default: 127.0.0.1]
//!   --port <PORT>        Server port                [default: 50000]
//!   --count <N>          Messages to send           [default: 10]
//!   --delay-ms <MS>      Pause between messages     [default: 100]
//!   --message <TEXT>     Text of each message       [default: world]
//!   --single             Send one message and close (single-exchange demo)
//! ```
//!
//! Each flag also reads a `SOCKDEMO_CLIENT_*` environment variable; the flag
//! wins when both are present.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sockdemo_client::{single_exchange, ClientSimulator, SimulatorConfig};
use sockdemo_core::DEFAULT_PORT;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// sockdemo client simulator.
#[derive(Debug, Parser)]
#[command(
    name = "sockdemo-client",
    about = "Connects to a sockdemo server, sends messages, and terminates",
    version
)]
struct Cli {
    /// IP address of the server.
    #[arg(long, default_value = "127.0.0.1", env = "SOCKDEMO_CLIENT_HOST")]
    host: String,

    /// TCP port of the server.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "SOCKDEMO_CLIENT_PORT")]
    port: u16,

    /// Number of messages to send before terminating.
    #[arg(long, default_value_t = 10, env = "SOCKDEMO_CLIENT_COUNT")]
    count: usize,

    /// Milliseconds to wait between messages.
    ///
    /// Messages are unframed; with `0` several of them may reach the server
    /// as a single message.
    #[arg(long, default_value_t = 100, env = "SOCKDEMO_CLIENT_DELAY_MS")]
    delay_ms: u64,

    /// Text of each message.
    #[arg(long, default_value = "world", env = "SOCKDEMO_CLIENT_MESSAGE")]
    message: String,

    /// Send exactly one message, then close.
    #[arg(long)]
    single: bool,
}

impl Cli {
    fn server_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("invalid server address: '{}'", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Converts the parsed CLI arguments into a [`SimulatorConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--host` is not an IP address.
    fn into_simulator_config(self) -> anyhow::Result<SimulatorConfig> {
        let server_addr = self.server_addr()?;
        Ok(SimulatorConfig {
            message: self.message,
            message_count: self.count,
            inter_message_delay: Duration::from_millis(self.delay_ms),
            ..SimulatorConfig::new(server_addr)
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let report = if cli.single {
        let addr = cli.server_addr()?;
        single_exchange(addr, &cli.message).await
    } else {
        let config = cli.into_simulator_config()?;
        ClientSimulator::new(config).run().await
    }
    .context("client simulation failed")?;

    info!(
        "done: greeting {:?}, {} message(s) sent from {}",
        report.greeting, report.messages_sent, report.local_addr
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
