//! Courier - bidirectional RPC over TCP
//!
//! Arsitektur:
//! - Framing: 4-byte LE length prefix + JSON body
//! - Call / Notify / Reply, dikorelasikan lewat id per koneksi
//! - Sans-IO session di `core`, socket mio di `network`
//! - Handler dipilih lewat route table (`"member.method"`)
//!
//! ```no_run
//! use std::sync::Arc;
//! use courier::{Connection, ConnectionConfig, Router};
//!
//! let mut router = Router::<()>::new();
//! router.route("ping", |_: &mut (), _: serde_json::Value| Ok("pong"))?;
//!
//! let addr = "127.0.0.1:9999".parse().unwrap();
//! let mut conn = Connection::connect(addr, ConnectionConfig::default(), (), Arc::new(router))?;
//! conn.notify("rank.update", &serde_json::json!({"val": 5}))?;
//! conn.run()?;
//! # Ok::<(), courier::RpcError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod leaderboard;
pub mod network;
pub mod protocol;

pub use config::{ConnectionConfig, Role};
pub use crate::core::{Router, Session, State};
pub use error::{HandlerError, Result, RpcError};
pub use network::{Connection, Server};
pub use protocol::{CallId, Message, MessageKind};
