//! Core module: protocol engine per koneksi
//!
//! Prinsip desain:
//! - Sans-IO: tidak ada socket di sini, waktu dioper sebagai `now`
//! - Explicit routing: route table diisi saat setup, tanpa refleksi
//! - Single owner: satu koneksi = satu thread, tanpa lock internal

mod correlation;
mod dispatcher;
mod router;
mod session;

pub use correlation::{CorrelationTable, ReplyCallback};
pub use dispatcher::{Dispatcher, Outbox};
pub use router::{HandlerFn, Route, Router};
pub use session::{DisconnectHook, Session, State};
