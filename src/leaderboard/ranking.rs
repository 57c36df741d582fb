//! Ranking: daftar skor in-memory, terurut menurun
//!
//! Sort stabil: skor sama mempertahankan urutan masuk.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// One entry of the ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankItem {
    pub id: u64,
    pub score: i64,
}

/// Ranking shared by every server-side connection
pub type SharedRanks = Arc<Mutex<RankManager>>;

/// Scores of every connected guest, highest first
#[derive(Debug, Default)]
pub struct RankManager {
    ranklist: Vec<RankItem>,
}

impl RankManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRanks {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Add `id` with `score`; an existing entry is replaced
    pub fn insert(&mut self, id: u64, score: i64) {
        self.ranklist.retain(|item| item.id != id);
        self.ranklist.push(RankItem { id, score });
        self.sort();
    }

    /// Add `delta` to the score of `id`. Returns the new score.
    pub fn update(&mut self, id: u64, delta: i64) -> Option<i64> {
        let item = self.ranklist.iter_mut().find(|item| item.id == id)?;
        item.score = item.score.saturating_add(delta);
        let score = item.score;
        self.sort();
        Some(score)
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.ranklist.len();
        self.ranklist.retain(|item| item.id != id);
        self.ranklist.len() != before
    }

    /// Highest `n` entries; `n` is clamped to the list length
    pub fn top(&self, n: usize) -> Vec<RankItem> {
        self.ranklist[..n.min(self.ranklist.len())].to_vec()
    }

    pub fn score_of(&self, id: u64) -> Option<i64> {
        self.ranklist
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.score)
    }

    pub fn len(&self) -> usize {
        self.ranklist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranklist.is_empty()
    }

    fn sort(&mut self) {
        self.ranklist.sort_by(|a, b| b.score.cmp(&a.score));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, score: i64) -> RankItem {
        RankItem { id, score }
    }

    #[test]
    fn test_sorted_descending_and_stable() {
        let mut ranks = RankManager::new();
        ranks.insert(1, 0);
        ranks.insert(2, 0);
        ranks.insert(3, 0);

        ranks.update(2, 7);
        ranks.update(3, 7);

        assert_eq!(ranks.top(3), vec![item(2, 7), item(3, 7), item(1, 0)]);
    }

    #[test]
    fn test_top_is_clamped() {
        let mut ranks = RankManager::new();
        assert!(ranks.top(5).is_empty());

        ranks.insert(1, 3);
        ranks.insert(2, 9);
        assert_eq!(ranks.top(5), vec![item(2, 9), item(1, 3)]);
        assert!(ranks.top(0).is_empty());
    }

    #[test]
    fn test_update_and_remove_unknown() {
        let mut ranks = RankManager::new();
        ranks.insert(1, 0);

        assert_eq!(ranks.update(1, 5), Some(5));
        assert_eq!(ranks.update(9, 5), None);
        assert!(!ranks.remove(9));
        assert!(ranks.remove(1));
        assert!(ranks.is_empty());
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut ranks = RankManager::new();
        ranks.insert(1, 4);
        ranks.insert(1, 2);

        assert_eq!(ranks.len(), 1);
        assert_eq!(ranks.score_of(1), Some(2));
    }
}
