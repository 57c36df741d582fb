//! Courier Server Binary - leaderboard demo
//!
//! Setiap koneksi mendapat guest baru (skor 0) dan notify `init`.
//! Routes: `rank.top`, `rank.update`, `rank.remove`.
//!
//! Usage:
//!   cargo run --release --bin courier_server [OPTIONS]

use std::net::SocketAddr;
use std::process;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use courier::leaderboard::Lobby;
use courier::{ConnectionConfig, Role, Server};

/// Server configuration
struct ServerConfig {
    bind_addr: String,
    tick: Option<Duration>,
    idle_timeout: Option<Duration>,
    max_connections: usize,
    verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9999".to_string(),
            tick: None,
            idle_timeout: None,
            max_connections: 1024,
            verbose: false,
        }
    }
}

impl ServerConfig {
    fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::for_role(Role::Server);
        if let Some(tick) = self.tick {
            config = config.with_tick(tick);
        }
        if let Some(idle) = self.idle_timeout {
            config = config.with_idle_timeout(idle);
        }
        config
    }
}

fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.bind_addr.parse()?;
    let lobby = Lobby::new(config.connection_config())?;

    let mut server = Server::bind(addr)?.with_max_connections(config.max_connections);
    info!(addr = %server.local_addr()?, "leaderboard server ready");

    let stop = AtomicBool::new(false);
    server.serve(&stop, |stream, peer| lobby.admit(stream, peer))?;
    Ok(())
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].clone();
                    i += 1;
                }
            }
            "--tick" => {
                if i + 1 < args.len() {
                    config.tick = args[i + 1].parse().ok().map(Duration::from_millis);
                    i += 1;
                }
            }
            "--idle" => {
                if i + 1 < args.len() {
                    config.idle_timeout = args[i + 1].parse().ok().map(Duration::from_secs);
                    i += 1;
                }
            }
            "--max-connections" => {
                if i + 1 < args.len() {
                    config.max_connections = args[i + 1].parse().unwrap_or(1024);
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!("Courier Server - leaderboard over bidirectional RPC\n");
                println!("Usage: courier_server [OPTIONS]\n");
                println!("Options:");
                println!("  -b, --bind <ADDR>          Bind address (default: 0.0.0.0:9999)");
                println!("      --tick <MS>            Tick interval in ms (default: 25)");
                println!("      --idle <SEC>           Idle timeout in seconds (default: 300)");
                println!("      --max-connections <N>  Connection limit (default: 1024)");
                println!("  -v, --verbose              Debug logging");
                println!("  -h, --help                 Show this help");
                process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn main() {
    let config = parse_args();
    init_tracing(config.verbose);

    if let Err(e) = run_server(config) {
        error!("server error: {}", e);
        process::exit(1);
    }
}
