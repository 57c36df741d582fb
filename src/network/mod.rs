//! Network Layer: non-blocking TCP di atas mio
//!
//! - `Connection`: satu socket + Session, event loop sendiri
//! - `Server`: accept loop, satu thread per koneksi
//!
//! Semua parsing dan routing ada di `core`; layer ini hanya memindahkan bytes.

mod connection;
mod server;

pub use connection::Connection;
pub use server::Server;
