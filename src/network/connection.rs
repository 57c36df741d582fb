//! Connection: socket + event loop di sekitar satu Session
//!
//! Satu koneksi = satu thread kendali (poll sendiri, tanpa lock internal).
//! - Bytes masuk langsung ke reassembler saat readable
//! - Flush + dispatch terjadi per tick
//! - Error / idle timeout / close → teardown penuh, sekali saja

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::{ConnectionConfig, Role};
use crate::core::{Router, Session, State};
use crate::error::{Result, RpcError};
use crate::protocol::CallId;

const STREAM_TOKEN: Token = Token(0);
const EVENTS_CAPACITY: usize = 64;

/// Socket-level view of what one poll reported
#[derive(Default)]
struct Readiness {
    readable: bool,
    writable: bool,
    error: bool,
}

/// One RPC connection over a non-blocking TCP stream
pub struct Connection<H> {
    stream: TcpStream,
    peer: SocketAddr,
    poll: Poll,
    events: Events,
    session: Session<H>,
    read_buffer: Box<[u8]>,
}

impl<H> Connection<H> {
    /// Start connecting to `addr`. The connection is `Connecting` until the
    /// socket reports writable; calls made before then are queued.
    pub fn connect(
        addr: SocketAddr,
        config: ConnectionConfig,
        owner: H,
        router: Arc<Router<H>>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let conn = Self::with_stream(Role::Client, stream, addr, config, owner, router)?;
        debug!(%addr, "connecting");
        Ok(conn)
    }

    /// Wrap a stream returned by `accept`; active immediately
    pub fn accepted(
        stream: TcpStream,
        peer: SocketAddr,
        config: ConnectionConfig,
        owner: H,
        router: Arc<Router<H>>,
    ) -> Result<Self> {
        let mut conn = Self::with_stream(Role::Server, stream, peer, config, owner, router)?;
        conn.establish(Instant::now())?;
        Ok(conn)
    }

    fn with_stream(
        role: Role,
        mut stream: TcpStream,
        peer: SocketAddr,
        config: ConnectionConfig,
        owner: H,
        router: Arc<Router<H>>,
    ) -> Result<Self> {
        let poll = Poll::new()?;
        poll.registry().register(
            &mut stream,
            STREAM_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        let read_buffer = vec![0u8; config.read_chunk].into_boxed_slice();
        let session = Session::new(role, config, owner, router, Instant::now());

        Ok(Self {
            stream,
            peer,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            session,
            read_buffer,
        })
    }

    /// Install the one-shot disconnect signal
    pub fn on_disconnect<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut H, &RpcError) + Send + 'static,
    {
        self.session.on_disconnect(hook);
    }

    /// Queue a call. `on_result` runs on this connection's thread during a
    /// later `poll_once`.
    pub fn call<A, R, F>(
        &mut self,
        route: &str,
        argument: &A,
        timeout: Option<Duration>,
        on_result: F,
    ) -> Result<CallId>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        F: FnOnce(Result<R>) + Send + 'static,
    {
        self.session
            .call(route, argument, timeout, Instant::now(), on_result)
    }

    /// Queue a notify
    pub fn notify<A>(&mut self, route: &str, argument: &A) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        self.session.notify(route, argument)
    }

    /// Run one event-loop iteration, sleeping at most `max_wait` (or until
    /// the next internal timer).
    ///
    /// Returns the close reason once the connection is torn down.
    pub fn poll_once(&mut self, max_wait: Option<Duration>) -> Result<()> {
        if self.session.is_closed() {
            return Err(self.closed_reason());
        }

        let now = Instant::now();
        let timeout = match (self.session.poll_timeout(now), max_wait) {
            (Some(t), Some(w)) => Some(t.min(w)),
            (t, w) => t.or(w),
        };

        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            let reason = RpcError::from(e);
            self.teardown(reason.clone());
            return Err(reason);
        }

        let mut readiness = Readiness::default();
        for event in self.events.iter() {
            if event.token() != STREAM_TOKEN {
                continue;
            }
            readiness.readable |= event.is_readable() || event.is_read_closed();
            readiness.writable |= event.is_writable();
            readiness.error |= event.is_error();
        }

        match self.process(readiness, Instant::now()) {
            Ok(()) => Ok(()),
            Err(reason) => {
                self.teardown(reason.clone());
                Err(reason)
            }
        }
    }

    /// Drive the connection until it closes.
    ///
    /// `Ok` for an orderly close (peer hung up or `close` was called),
    /// otherwise the fatal error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.poll_once(None) {
                Ok(()) => continue,
                Err(RpcError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Close locally; pending calls fail with `ConnectionClosed`
    pub fn close(&mut self) {
        self.teardown(RpcError::ConnectionClosed);
    }

    pub fn role(&self) -> Role {
        self.session.role()
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn owner(&self) -> &H {
        self.session.owner()
    }

    pub fn owner_mut(&mut self) -> &mut H {
        self.session.owner_mut()
    }

    pub fn session(&self) -> &Session<H> {
        &self.session
    }

    fn process(&mut self, readiness: Readiness, now: Instant) -> Result<()> {
        if readiness.error {
            return Err(self.socket_error());
        }

        if self.session.state() == State::Connecting && (readiness.writable || readiness.readable) {
            self.finish_connect(now)?;
        }

        if self.session.state() == State::Active {
            if readiness.readable {
                self.fill_from_socket(now)?;
            }
            self.session.handle_timers(now)?;
            self.flush_to_socket(now)?;
        } else {
            self.session.handle_timers(now)?;
        }

        Ok(())
    }

    fn finish_connect(&mut self, now: Instant) -> Result<()> {
        if let Some(e) = self.stream.take_error()? {
            return Err(e.into());
        }
        match self.stream.peer_addr() {
            Ok(_) => self.establish(now),
            // Belum tersambung, tunggu event berikutnya
            Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn establish(&mut self, now: Instant) -> Result<()> {
        // CRITICAL: TCP_NODELAY untuk low latency
        if let Err(e) = self.stream.set_nodelay(self.session.config().nodelay) {
            debug!(error = %e, "set_nodelay failed");
        }
        tune_socket_buffers(&self.stream, self.session.config());

        self.session.activate(now);
        info!(role = %self.session.role(), peer = %self.peer, "connection active");
        Ok(())
    }

    /// Read until WouldBlock; bytes go straight to the reassembler
    fn fill_from_socket(&mut self, now: Instant) -> Result<()> {
        loop {
            match self.stream.read(&mut self.read_buffer) {
                Ok(0) => return Err(RpcError::ConnectionClosed),
                Ok(n) => self.session.receive(&self.read_buffer[..n], now),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write as much pending output as the socket takes; the rest waits
    /// for the next writable event
    fn flush_to_socket(&mut self, now: Instant) -> Result<()> {
        while !self.session.pending_output().is_empty() {
            match self.stream.write(self.session.pending_output()) {
                Ok(0) => {
                    return Err(RpcError::Connection(
                        "failed to write to socket".to_string(),
                    ));
                }
                Ok(n) => {
                    self.session.consume_output(n);
                    self.session.record_activity(now);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn socket_error(&mut self) -> RpcError {
        match self.stream.take_error() {
            Ok(Some(e)) | Err(e) => e.into(),
            Ok(None) => RpcError::Connection("socket error".to_string()),
        }
    }

    fn teardown(&mut self, reason: RpcError) {
        if self.session.is_closed() {
            return;
        }

        if let Err(e) = self.poll.registry().deregister(&mut self.stream) {
            debug!(error = %e, "deregister failed");
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(error = %e, "shutdown failed");
        }

        if reason.is_fatal() && reason != RpcError::ConnectionClosed {
            error!(peer = %self.peer, reason = %reason, "connection failed");
        }
        self.session.close(reason);
    }

    fn closed_reason(&self) -> RpcError {
        self.session
            .close_reason()
            .cloned()
            .unwrap_or(RpcError::ConnectionClosed)
    }
}

impl<H> Drop for Connection<H> {
    // Pending calls dan disconnect hook tetap diselesaikan saat koneksi di-drop
    fn drop(&mut self) {
        self.teardown(RpcError::ConnectionClosed);
    }
}

/// Set socket buffer sizes untuk throughput.
/// Ignore errors - not all platforms support this.
fn tune_socket_buffers(stream: &TcpStream, config: &ConnectionConfig) {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;

        if let Some(size) = config.socket_buffer_size {
            let fd = stream.as_raw_fd();
            let optval = size.min(libc::c_int::MAX as usize) as libc::c_int;
            for option in [libc::SO_SNDBUF, libc::SO_RCVBUF] {
                let rc = unsafe {
                    libc::setsockopt(
                        fd,
                        libc::SOL_SOCKET,
                        option,
                        &optval as *const _ as *const libc::c_void,
                        std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                    )
                };
                if rc != 0 {
                    debug!(error = %io::Error::last_os_error(), "setsockopt failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (stream, config);
    }
}
