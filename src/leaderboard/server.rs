//! Server side: satu `ServerGuest` per koneksi, skor di `RankManager` bersama
//!
//! Routes:
//! - `rank.top {top}`    → `[RankItem]`
//! - `rank.update {val}` → skor guest += val
//! - `rank.remove`       → guest keluar dari ranking

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mio::net::TcpStream;
use serde_json::Value;
use tracing::{debug, info};

use super::ranking::{RankItem, RankManager, SharedRanks};
use super::{InitData, RankState, TopArgs, UpdateArgs};
use crate::config::ConnectionConfig;
use crate::core::Router;
use crate::error::{HandlerError, Result};
use crate::network::Connection;

/// Connection owner on the server
pub struct ServerGuest {
    pub id: u64,
    pub rank: RankState,
    ranks: SharedRanks,
}

impl ServerGuest {
    pub fn new(id: u64, ranks: SharedRanks) -> Self {
        Self {
            id,
            rank: RankState::default(),
            ranks,
        }
    }

    /// Insert this guest into the shared ranking
    pub fn enter(&mut self) {
        let score = self.rank.score;
        lock(&self.ranks).insert(self.id, score);
    }

    /// Remove this guest from the shared ranking
    pub fn leave(&mut self) -> bool {
        lock(&self.ranks).remove(self.id)
    }

    pub fn init_data(&self) -> InitData {
        InitData { rank: self.rank }
    }

    pub fn top(&self, args: TopArgs) -> std::result::Result<Vec<RankItem>, HandlerError> {
        Ok(lock(&self.ranks).top(args.top))
    }

    /// Skor lokal selalu bertambah; ranking bersama hanya berubah kalau
    /// guest masih terdaftar di sana
    pub fn update(&mut self, args: UpdateArgs) -> std::result::Result<(), HandlerError> {
        self.rank.score = self.rank.score.saturating_add(args.val);
        let ranked = lock(&self.ranks).update(self.id, args.val).is_some();
        debug!(guest = self.id, val = args.val, score = self.rank.score, ranked, "rank updated");
        Ok(())
    }

    pub fn remove(&mut self) -> std::result::Result<(), HandlerError> {
        self.leave();
        Ok(())
    }
}

/// Route table for `ServerGuest`
pub fn router() -> Result<Router<ServerGuest>> {
    let mut router = Router::new();
    router
        .route("rank.top", |guest: &mut ServerGuest, args: TopArgs| guest.top(args))?
        .route("rank.update", |guest: &mut ServerGuest, args: UpdateArgs| {
            guest.update(args)
        })?
        .route("rank.remove", |guest: &mut ServerGuest, _: Value| guest.remove())?;
    Ok(router)
}

/// Admission for new connections: id assignment, greeting, cleanup
pub struct Lobby {
    config: ConnectionConfig,
    router: Arc<Router<ServerGuest>>,
    ranks: SharedRanks,
    next_id: AtomicU64,
    guests: Mutex<HashMap<u64, SocketAddr>>,
}

impl Lobby {
    pub fn new(config: ConnectionConfig) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            config,
            router: Arc::new(router()?),
            ranks: RankManager::shared(),
            next_id: AtomicU64::new(1),
            guests: Mutex::new(HashMap::new()),
        }))
    }

    /// Wrap an accepted stream: new guest, ranked at 0, greeted with `init`.
    /// The guest leaves the ranking when the connection closes.
    pub fn admit(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<Connection<ServerGuest>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guest = ServerGuest::new(id, Arc::clone(&self.ranks));

        let mut conn = Connection::accepted(
            stream,
            addr,
            self.config.clone(),
            guest,
            Arc::clone(&self.router),
        )?;

        conn.owner_mut().enter();
        let init = conn.owner().init_data();
        if let Err(e) = conn.notify("init", &init) {
            conn.owner_mut().leave();
            return Err(e);
        }

        let lobby = Arc::clone(self);
        conn.on_disconnect(move |guest, reason| {
            guest.leave();
            lobby.exit(guest.id);
            info!(guest = guest.id, reason = %reason, "guest left");
        });

        lock(&self.guests).insert(id, addr);
        info!(guest = id, %addr, "guest entered");
        Ok(conn)
    }

    fn exit(&self, id: u64) {
        lock(&self.guests).remove(&id);
    }

    pub fn ranks(&self) -> &SharedRanks {
        &self.ranks
    }

    pub fn guest_count(&self) -> usize {
        lock(&self.guests).len()
    }
}

// Ranking tetap konsisten walau thread lain panik saat memegang lock
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use serde_json::json;

    fn guests(ranks: &SharedRanks, n: u64) -> Vec<ServerGuest> {
        (1..=n)
            .map(|id| {
                let mut guest = ServerGuest::new(id, Arc::clone(ranks));
                guest.enter();
                guest
            })
            .collect()
    }

    #[test]
    fn test_update_then_top() {
        let router = router().unwrap();
        let ranks = RankManager::shared();
        let mut guests = guests(&ranks, 3);

        for (guest, val) in guests.iter_mut().zip([5, 12, 7]) {
            router
                .invoke(guest, "rank.update", json!({ "val": val }))
                .unwrap();
        }
        assert_eq!(guests[0].rank.score, 5);

        let top = router
            .invoke(&mut guests[0], "rank.top", json!({"top": 2}))
            .unwrap();
        assert_eq!(
            top,
            json!([{"id": 2, "score": 12}, {"id": 3, "score": 7}])
        );
    }

    #[test]
    fn test_remove_and_unranked_update() {
        let router = router().unwrap();
        let ranks = RankManager::shared();
        let mut guests = guests(&ranks, 2);

        router
            .invoke(&mut guests[1], "rank.remove", Value::Null)
            .unwrap();
        assert_eq!(lock(&ranks).len(), 1);

        assert_eq!(
            router.invoke(&mut guests[1], "rank.update", json!({"val": 4})),
            Ok(Value::Null)
        );
        assert_eq!(guests[1].rank.score, 4);
        assert_eq!(lock(&ranks).score_of(2), None);
        assert_eq!(lock(&ranks).len(), 1);
    }

    #[test]
    fn test_bad_arguments_fail_the_call() {
        let router = router().unwrap();
        let ranks = RankManager::shared();
        let mut guests = guests(&ranks, 1);

        assert!(matches!(
            router.invoke(&mut guests[0], "rank.top", json!({"top": -1})),
            Err(RpcError::HandlerFailure(_))
        ));
        assert!(matches!(
            router.invoke(&mut guests[0], "rank.update", Value::Null),
            Err(RpcError::HandlerFailure(_))
        ));
    }

    #[test]
    fn test_init_data_shape() {
        let ranks = RankManager::shared();
        let guest = ServerGuest::new(4, ranks);
        assert_eq!(
            serde_json::to_value(guest.init_data()).unwrap(),
            json!({"rank": {"score": 0}})
        );
    }
}
