//! Session: sans-IO connection core
//!
//! Semua state per koneksi kecuali socket:
//! - FIFO outbox + encoder untuk bytes keluar
//! - Reassembler untuk bytes masuk
//! - Dispatcher (owner, route table, correlation table)
//! - Timer: tick, deadline per-call, idle timeout
//!
//! Waktu selalu dioper sebagai `now`, jadi seluruh lifecycle bisa dites
//! tanpa socket dan tanpa sleep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatcher, Outbox};
use super::router::Router;
use crate::config::{ConnectionConfig, Role};
use crate::error::{Result, RpcError};
use crate::protocol::{CallId, Encoder, FrameReassembler, Message};

/// Lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Active,
    Closed,
}

/// One-shot disconnect signal, handed the owner and the close reason
pub type DisconnectHook<H> = Box<dyn FnOnce(&mut H, &RpcError) + Send>;

/// Per-connection protocol engine
pub struct Session<H> {
    role: Role,
    state: State,
    config: ConnectionConfig,
    outbox: Outbox,
    encoder: Encoder,
    reassembler: FrameReassembler,
    dispatcher: Dispatcher<H>,
    on_disconnect: Option<DisconnectHook<H>>,
    close_reason: Option<RpcError>,
    /// `None` when the tick interval lies beyond what `Instant` can hold
    next_tick: Option<Instant>,
    last_activity: Instant,
}

impl<H> Session<H> {
    pub fn new(
        role: Role,
        config: ConnectionConfig,
        owner: H,
        router: Arc<Router<H>>,
        now: Instant,
    ) -> Self {
        let reassembler = FrameReassembler::with_max_frame_len(config.max_frame_len);
        Self {
            role,
            state: State::Connecting,
            next_tick: now.checked_add(config.tick),
            config,
            outbox: Outbox::new(),
            encoder: Encoder::default(),
            reassembler,
            dispatcher: Dispatcher::new(owner, router),
            on_disconnect: None,
            close_reason: None,
            last_activity: now,
        }
    }

    /// Install the disconnect signal. Fires exactly once, on close.
    pub fn on_disconnect<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut H, &RpcError) + Send + 'static,
    {
        self.on_disconnect = Some(Box::new(hook));
    }

    /// Connecting → Active; starts the tick schedule
    pub fn activate(&mut self, now: Instant) {
        if self.state == State::Connecting {
            self.state = State::Active;
            self.next_tick = now.checked_add(self.config.tick);
            self.last_activity = now;
            debug!(role = %self.role, "session active");
        }
    }

    /// Queue a call; `on_result` runs once with the decoded reply or the
    /// failure (remote error, timeout, teardown).
    pub fn call<A, R, F>(
        &mut self,
        route: &str,
        argument: &A,
        timeout: Option<Duration>,
        now: Instant,
        on_result: F,
    ) -> Result<CallId>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        F: FnOnce(Result<R>) + Send + 'static,
    {
        self.ensure_open()?;
        let argument = serde_json::to_value(argument)?;

        let callback = Box::new(move |result: Result<Value>| {
            on_result(result.and_then(|value| serde_json::from_value(value).map_err(RpcError::from)))
        });
        let id = self
            .dispatcher
            .pending_mut()
            .register(callback, timeout, now)?;

        self.outbox.push_back(Message::Call {
            id,
            route: route.to_string(),
            argument,
        });
        Ok(id)
    }

    /// Queue a fire-and-forget message
    pub fn notify<A>(&mut self, route: &str, argument: &A) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        self.ensure_open()?;
        let argument = serde_json::to_value(argument)?;
        self.outbox.push_back(Message::Notify {
            route: route.to_string(),
            argument,
        });
        Ok(())
    }

    /// Buffer bytes straight off the socket
    pub fn receive(&mut self, data: &[u8], now: Instant) {
        if self.state == State::Closed {
            return;
        }
        self.reassembler.feed(data);
        self.last_activity = now;
    }

    /// Note outbound traffic for the idle timer
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// One batch: flush the outbox, then dispatch every complete frame.
    ///
    /// Fails only with a connection-fatal error.
    pub fn tick(&mut self) -> Result<()> {
        if self.state != State::Active {
            return Ok(());
        }

        // === PHASE 1: Flush outbox (FIFO) ===
        while let Some(message) = self.outbox.pop_front() {
            if let Err(e) = self.encoder.encode(&message) {
                warn!(kind = ?message.kind(), error = %e, "dropping unencodable message");
            }
        }

        // === PHASE 2: Dispatch inbound frames ===
        // Drain sampai kosong: frame sebelum prefix oversize tetap di-dispatch
        // dulu, baru error fatalnya muncul
        loop {
            let frames = self.reassembler.drain()?;
            if frames.is_empty() {
                break;
            }
            for body in frames {
                // Per-message errors sudah di-log oleh dispatcher
                let _ = self.dispatcher.dispatch_body(&body, &mut self.outbox);
            }
        }

        Ok(())
    }

    /// Run whatever timers are due at `now`.
    ///
    /// Returns a fatal error when the connection has to be torn down.
    pub fn handle_timers(&mut self, now: Instant) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }

        self.dispatcher.pending_mut().expire(now);

        if let Some(due) = self.next_tick.filter(|due| self.state == State::Active && now >= *due) {
            self.tick()?;
            self.next_tick = match due.checked_add(self.config.tick) {
                Some(next) if next > now => Some(next),
                // Tertinggal: jangan kejar tick yang terlewat
                _ => now.checked_add(self.config.tick),
            };
        }

        if now.saturating_duration_since(self.last_activity) >= self.config.idle_timeout {
            return Err(RpcError::ConnectionTimeout);
        }

        Ok(())
    }

    /// How long the event loop may sleep before a timer is due.
    ///
    /// `None` when no timer is reachable (closed, or every interval is too
    /// far out to be represented).
    pub fn poll_timeout(&self, now: Instant) -> Option<Duration> {
        if self.state == State::Closed {
            return None;
        }

        let idle = self.last_activity.checked_add(self.config.idle_timeout);
        let tick = self.next_tick.filter(|_| self.state == State::Active);
        let deadline = self.dispatcher.pending().next_deadline();

        [idle, tick, deadline]
            .into_iter()
            .flatten()
            .min()
            .map(|due| due.saturating_duration_since(now))
    }

    /// Encoded bytes waiting for the socket
    pub fn pending_output(&self) -> &[u8] {
        self.encoder.as_bytes()
    }

    /// Drop `n` bytes the socket accepted
    pub fn consume_output(&mut self, n: usize) {
        self.encoder.consume(n);
    }

    /// Tear down: fail pending calls, drop buffers, fire the disconnect
    /// signal. Returns false if already closed.
    pub fn close(&mut self, reason: RpcError) -> bool {
        if self.state == State::Closed {
            return false;
        }
        self.state = State::Closed;

        let dropped = self.outbox.len();
        self.outbox.clear();
        self.encoder.reset();
        self.reassembler.clear();

        let cancelled = self.dispatcher.pending_mut().cancel_all(&reason);
        info!(
            role = %self.role,
            reason = %reason,
            cancelled,
            dropped,
            "session closed"
        );

        if let Some(hook) = self.on_disconnect.take() {
            hook(self.dispatcher.owner_mut(), &reason);
        }
        self.close_reason = Some(reason);
        true
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn close_reason(&self) -> Option<&RpcError> {
        self.close_reason.as_ref()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn owner(&self) -> &H {
        self.dispatcher.owner()
    }

    pub fn owner_mut(&mut self) -> &mut H {
        self.dispatcher.owner_mut()
    }

    /// Calls still waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.dispatcher.pending().len()
    }

    /// Messages queued for the next tick
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == State::Closed {
            return Err(RpcError::ConnectionClosed);
        }
        Ok(())
    }
}
