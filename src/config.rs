//! Connection configuration
//!
//! Tick interval di-set saat init, idle timeout tetap per role,
//! timeout per-call dipilih oleh pemanggil.

use std::fmt;
use std::time::Duration;

/// Client tick interval
pub const CLIENT_TICK: Duration = Duration::from_millis(30);
/// Server tick interval
pub const SERVER_TICK: Duration = Duration::from_millis(25);
/// Inactivity deadline for both roles
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Buffer sizes - tuned untuk typical message sizes
pub const READ_CHUNK: usize = 64 * 1024; // 64KB
pub const SOCKET_BUFFER_SIZE: usize = 256 * 1024; // 256KB
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024; // 16MB

/// Which end of the socket this connection is. Informational only; the
/// protocol is symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Per-connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Interval between flush/dispatch passes
    pub tick: Duration,
    /// Close the connection after this long without traffic
    pub idle_timeout: Duration,
    /// Bytes read from the socket per read call
    pub read_chunk: usize,
    /// Largest inbound body accepted
    pub max_frame_len: usize,
    /// SO_SNDBUF / SO_RCVBUF hint (unix only)
    pub socket_buffer_size: Option<usize>,
    /// TCP_NODELAY
    pub nodelay: bool,
}

impl ConnectionConfig {
    /// Defaults for `role`
    pub fn for_role(role: Role) -> Self {
        let tick = match role {
            Role::Client => CLIENT_TICK,
            Role::Server => SERVER_TICK,
        };
        Self {
            tick,
            idle_timeout: IDLE_TIMEOUT,
            read_chunk: READ_CHUNK,
            max_frame_len: MAX_FRAME_LEN,
            socket_buffer_size: Some(SOCKET_BUFFER_SIZE),
            nodelay: true,
        }
    }

    /// Set the tick interval (at least 1ms)
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk.max(1);
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn with_socket_buffer_size(mut self, size: Option<usize>) -> Self {
        self.socket_buffer_size = size;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::for_role(Role::Client)
    }
}
