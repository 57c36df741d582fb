//! Leaderboard demo di atas transport courier
//!
//! Server menyimpan skor semua guest di satu `RankManager` bersama;
//! client mengirim update skor (notify) dan meminta top-N (call).

pub mod client;
pub mod ranking;
pub mod server;

use serde::{Deserialize, Serialize};

pub use client::ClientGuest;
pub use ranking::{RankItem, RankManager, SharedRanks};
pub use server::{Lobby, ServerGuest};

/// `init` payload, pushed by the server when a guest enters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitData {
    pub rank: RankState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankState {
    pub score: i64,
}

/// `rank.top` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopArgs {
    pub top: usize,
}

/// `rank.update` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateArgs {
    pub val: i64,
}
