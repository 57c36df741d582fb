//! Client side: skor lokal + helper untuk route `rank.*` di server

use std::time::Duration;

use tracing::info;

use super::ranking::RankItem;
use super::{InitData, RankState, TopArgs, UpdateArgs};
use crate::core::Router;
use crate::error::{HandlerError, Result};
use crate::network::Connection;
use crate::protocol::CallId;

/// Connection owner on the client
#[derive(Debug, Default)]
pub struct ClientGuest {
    pub rank: RankState,
    /// Set by the server's `init`, cleared on disconnect
    pub server_connected: bool,
}

impl ClientGuest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, data: InitData) -> std::result::Result<(), HandlerError> {
        self.rank = data.rank;
        self.server_connected = true;
        info!(score = self.rank.score, "initialized by server");
        Ok(())
    }
}

/// Route table for `ClientGuest`
pub fn router() -> Result<Router<ClientGuest>> {
    let mut router = Router::new();
    router.route("init", |guest: &mut ClientGuest, data: InitData| guest.init(data))?;
    Ok(router)
}

/// Add `val` to the local score and tell the server (notify)
pub fn update(conn: &mut Connection<ClientGuest>, val: i64) -> Result<()> {
    conn.notify("rank.update", &UpdateArgs { val })?;
    conn.owner_mut().rank.score += val;
    Ok(())
}

/// Ask the server for the top `n` entries
pub fn top<F>(
    conn: &mut Connection<ClientGuest>,
    n: usize,
    timeout: Option<Duration>,
    on_result: F,
) -> Result<CallId>
where
    F: FnOnce(Result<Vec<RankItem>>) + Send + 'static,
{
    conn.call("rank.top", &TopArgs { top: n }, timeout, on_result)
}

/// Leave the server's ranking
pub fn remove(conn: &mut Connection<ClientGuest>) -> Result<()> {
    conn.notify("rank.remove", &())
}
