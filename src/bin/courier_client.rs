//! Courier Client Binary - leaderboard demo
//!
//! Setelah `init` dari server:
//! - setiap 3s: notify `rank.update` dengan nilai acak 0..20
//! - setiap 10s: call `rank.top {top: 5}` dengan timeout 5s
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin courier_client -- --host 127.0.0.1:9999
//! ```

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use courier::leaderboard::{client, ClientGuest};
use courier::{Connection, ConnectionConfig, Role, RpcError, State};

/// Client configuration
struct ClientConfig {
    host: String,
    update_every: Duration,
    top_every: Duration,
    top_count: usize,
    top_timeout: Duration,
    tick: Option<Duration>,
    verbose: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:9999".to_string(),
            update_every: Duration::from_secs(3),
            top_every: Duration::from_secs(10),
            top_count: 5,
            top_timeout: Duration::from_secs(5),
            tick: None,
            verbose: false,
        }
    }
}

/// Xorshift seeded from the clock; scores do not need better randomness
struct Rng(u64);

impl Rng {
    fn from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self(seed | 1)
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0 % bound
    }
}

fn run_client(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.host.parse()?;

    let mut conn_config = ConnectionConfig::for_role(Role::Client);
    if let Some(tick) = config.tick {
        conn_config = conn_config.with_tick(tick);
    }

    let router = Arc::new(client::router()?);
    let mut conn = Connection::connect(addr, conn_config, ClientGuest::new(), router)?;
    conn.on_disconnect(|guest, reason| {
        guest.server_connected = false;
        warn!(reason = %reason, "disconnected from server");
    });
    info!(%addr, "connecting");

    let mut rng = Rng::from_clock();
    let mut next_update = Instant::now() + config.update_every;
    let mut next_top = Instant::now() + config.top_every;

    loop {
        // Timer aplikasi baru berjalan setelah `init` diterima
        let wait = if ready(&conn) {
            Some(next_update.min(next_top).saturating_duration_since(Instant::now()))
        } else {
            None
        };

        match conn.poll_once(wait) {
            Ok(()) => {}
            Err(RpcError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        if !ready(&conn) {
            continue;
        }

        let now = Instant::now();
        if now >= next_update {
            let val = rng.below(20) as i64;
            client::update(&mut conn, val)?;
            info!(val, score = conn.owner().rank.score, "rank update");
            next_update = now + config.update_every;
        }

        if now >= next_top {
            client::top(
                &mut conn,
                config.top_count,
                Some(config.top_timeout),
                |result| match result {
                    Ok(items) => {
                        for (place, item) in items.iter().enumerate() {
                            info!(place = place + 1, id = item.id, score = item.score, "top");
                        }
                    }
                    Err(e) => warn!(error = %e, "rank.top failed"),
                },
            )?;
            next_top = now + config.top_every;
        }
    }
}

fn ready(conn: &Connection<ClientGuest>) -> bool {
    conn.state() == State::Active && conn.owner().server_connected
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    config.host = args[i + 1].clone();
                    i += 1;
                }
            }
            "--update-every" => {
                if i + 1 < args.len() {
                    if let Ok(ms) = args[i + 1].parse() {
                        config.update_every = Duration::from_millis(ms);
                    }
                    i += 1;
                }
            }
            "--top-every" => {
                if i + 1 < args.len() {
                    if let Ok(ms) = args[i + 1].parse() {
                        config.top_every = Duration::from_millis(ms);
                    }
                    i += 1;
                }
            }
            "--top" => {
                if i + 1 < args.len() {
                    config.top_count = args[i + 1].parse().unwrap_or(5);
                    i += 1;
                }
            }
            "--tick" => {
                if i + 1 < args.len() {
                    config.tick = args[i + 1].parse().ok().map(Duration::from_millis);
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!("Courier Client - leaderboard over bidirectional RPC\n");
                println!("Usage: courier_client [OPTIONS]\n");
                println!("Options:");
                println!("      --host <ADDR>         Server address (default: 127.0.0.1:9999)");
                println!("      --update-every <MS>   Score update interval (default: 3000)");
                println!("      --top-every <MS>      rank.top interval (default: 10000)");
                println!("      --top <N>             Entries requested (default: 5)");
                println!("      --tick <MS>           Tick interval in ms (default: 30)");
                println!("  -v, --verbose             Debug logging");
                println!("  -h, --help                Show this help");
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

    if let Err(e) = run_client(config) {
        error!("client error: {}", e);
        process::exit(1);
    }
}
