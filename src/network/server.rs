//! Courier Server dengan event-driven accept
//!
//! Listener non-blocking di atas mio; setiap koneksi yang diterima
//! diserahkan ke thread sendiri yang menjalankan `Connection::run`.
//! State bersama (kalau ada) hidup di owner, bukan di server.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use super::Connection;
use crate::error::Result;

const SERVER_TOKEN: Token = Token(0);
const MAX_CONNECTIONS: usize = 1024;
const EVENTS_CAPACITY: usize = 1024;
/// How often `serve` re-checks the stop flag
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Courier Server
///
/// Event-driven acceptor dengan:
/// - Non-blocking listener (epoll/kqueue/IOCP)
/// - Satu thread per koneksi
/// - Batas jumlah koneksi aktif
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    active: Arc<AtomicUsize>,
    max_connections: usize,
}

impl Server {
    /// Membuat server baru
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;

        poll.registry()
            .register(&mut listener, SERVER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            listener,
            active: Arc::new(AtomicUsize::new(0)),
            max_connections: MAX_CONNECTIONS,
        })
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Connections whose threads are still running
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Accept loop. Runs until `stop` is set.
    ///
    /// `accept` turns each new stream into a live connection (usually via
    /// `Connection::accepted`, plus any greeting or disconnect hook). A
    /// failing `accept` drops that stream only.
    pub fn serve<H, F>(&mut self, stop: &AtomicBool, mut accept: F) -> io::Result<()>
    where
        H: Send + 'static,
        F: FnMut(TcpStream, SocketAddr) -> Result<Connection<H>>,
    {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        info!(addr = %self.listener.local_addr()?, "courier server listening");

        while !stop.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, Some(STOP_CHECK_INTERVAL)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            for event in events.iter() {
                if event.token() == SERVER_TOKEN {
                    self.accept_connections(&mut accept);
                }
            }
        }

        info!("courier server stopped");
        Ok(())
    }

    /// Accept new connections
    fn accept_connections<H, F>(&mut self, accept: &mut F)
    where
        H: Send + 'static,
        F: FnMut(TcpStream, SocketAddr) -> Result<Connection<H>>,
    {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.active_connections() >= self.max_connections {
                        warn!(%addr, "max connections reached, rejecting");
                        continue;
                    }

                    match accept(stream, addr) {
                        Ok(conn) => self.spawn(conn),
                        Err(e) => warn!(%addr, error = %e, "failed to set up connection"),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EMFILE dan sejenisnya: coba lagi di event berikutnya
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn spawn<H>(&self, mut conn: Connection<H>)
    where
        H: Send + 'static,
    {
        let peer = conn.peer_addr();
        let slot = ActiveSlot::acquire(&self.active);

        let spawned = thread::Builder::new()
            .name(format!("courier-{}", peer))
            .spawn(move || {
                // Slot dilepas saat thread selesai, termasuk kalau handler panic
                let _slot = slot;
                match conn.run() {
                    Ok(()) => info!(%peer, "connection closed"),
                    Err(e) => info!(%peer, reason = %e, "connection dropped"),
                }
            });

        if let Err(e) = spawned {
            // Closure (slot dan koneksinya) sudah di-drop
            warn!(%peer, error = %e, "failed to spawn connection thread");
        } else {
            debug!(%peer, active = self.active_connections(), "connection accepted");
        }
    }
}

/// One counted connection thread; released on drop
struct ActiveSlot(Arc<AtomicUsize>);

impl ActiveSlot {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
