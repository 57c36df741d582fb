//! Correlation Table: outstanding calls awaiting replies
//!
//! Setiap callback dipanggil paling banyak sekali, lewat tepat satu dari:
//! resolve, expire (deadline), atau cancel_all (teardown).
//! Entry selalu dihapus sebelum callback dipanggil.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{Result, RpcError};
use crate::protocol::CallId;

/// Invoked once with the reply value or the failure
pub type ReplyCallback = Box<dyn FnOnce(Result<Value>) + Send>;

struct PendingCall {
    callback: ReplyCallback,
    deadline: Option<Instant>,
}

/// Per-connection map from call id to its pending callback
pub struct CorrelationTable {
    pending: HashMap<CallId, PendingCall>,
    // Ordered by deadline so expiry and the next poll timeout are cheap
    deadlines: BTreeSet<(Instant, CallId)>,
    last_id: CallId,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            deadlines: BTreeSet::new(),
            last_id: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn starting_after(last_id: CallId) -> Self {
        Self {
            last_id,
            ..Self::new()
        }
    }

    /// Allocate a fresh id and store `callback` under it.
    ///
    /// A zero or absent `timeout` means the call waits until a reply or
    /// teardown. Fails with `CallIdExhausted` instead of wrapping the
    /// counter; the callback is dropped uninvoked in that case.
    pub fn register(
        &mut self,
        callback: ReplyCallback,
        timeout: Option<Duration>,
        now: Instant,
    ) -> Result<CallId> {
        let id = match self.last_id.checked_add(1) {
            Some(id) => id,
            None => {
                error!(last_id = self.last_id, "call id counter would wrap around");
                return Err(RpcError::CallIdExhausted);
            }
        };

        let deadline = timeout
            .filter(|t| !t.is_zero())
            .and_then(|t| now.checked_add(t));

        if let Some(deadline) = deadline {
            self.deadlines.insert((deadline, id));
        }
        self.pending.insert(id, PendingCall { callback, deadline });
        self.last_id = id;

        debug!(id, ?deadline, "registered pending call");
        Ok(id)
    }

    /// Complete the call `id` with `result`.
    ///
    /// Unknown ids are ignored (the deadline may already have fired).
    /// Returns whether a callback ran.
    pub fn resolve(&mut self, id: CallId, result: Result<Value>) -> bool {
        let Some(call) = self.take(id) else {
            warn!(id, "reply for unknown or expired call dropped");
            return false;
        };

        (call.callback)(result);
        true
    }

    /// Fire `Timeout` for every call whose deadline is at or before `now`
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut fired = 0;

        while let Some(&(deadline, id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.remove(&(deadline, id));

            if let Some(call) = self.pending.remove(&id) {
                debug!(id, "pending call timed out");
                (call.callback)(Err(RpcError::Timeout));
                fired += 1;
            }
        }

        fired
    }

    /// Earliest deadline still armed
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|&(deadline, _)| deadline)
    }

    /// Fail every pending call with `error` and empty the table
    pub fn cancel_all(&mut self, error: &RpcError) -> usize {
        self.deadlines.clear();

        let mut ids: Vec<CallId> = self.pending.keys().copied().collect();
        ids.sort_unstable();

        let count = ids.len();
        for id in ids {
            if let Some(call) = self.pending.remove(&id) {
                (call.callback)(Err(error.clone()));
            }
        }

        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.pending.contains_key(&id)
    }

    fn take(&mut self, id: CallId) -> Option<PendingCall> {
        let call = self.pending.remove(&id)?;
        if let Some(deadline) = call.deadline {
            self.deadlines.remove(&(deadline, id));
        }
        Some(call)
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(u32, Result<Value>)>>>;

    fn recorder(log: &Log, tag: u32) -> ReplyCallback {
        let log = Arc::clone(log);
        Box::new(move |result| log.lock().unwrap().push((tag, result)))
    }

    #[test]
    fn test_ids_are_sequential_from_one() {
        let log = Log::default();
        let mut table = CorrelationTable::new();
        let now = Instant::now();

        assert_eq!(table.register(recorder(&log, 0), None, now).unwrap(), 1);
        assert_eq!(table.register(recorder(&log, 1), None, now).unwrap(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resolve_fires_once() {
        let log = Log::default();
        let mut table = CorrelationTable::new();
        let id = table
            .register(recorder(&log, 7), None, Instant::now())
            .unwrap();

        assert!(table.resolve(id, Ok(json!("pong"))));
        assert!(!table.resolve(id, Ok(json!("again"))));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], (7, Ok(json!("pong"))));
    }

    #[test]
    fn test_late_reply_after_timeout_is_ignored() {
        let log = Log::default();
        let mut table = CorrelationTable::new();
        let start = Instant::now();
        let id = table
            .register(recorder(&log, 1), Some(Duration::from_millis(50)), start)
            .unwrap();

        assert_eq!(table.expire(start + Duration::from_millis(49)), 0);
        assert_eq!(table.expire(start + Duration::from_millis(50)), 1);
        assert!(!table.resolve(id, Ok(json!(1))));

        let log = log.lock().unwrap();
        assert_eq!(log.as_slice(), &[(1, Err(RpcError::Timeout))]);
    }

    #[test]
    fn test_reply_disarms_deadline() {
        let log = Log::default();
        let mut table = CorrelationTable::new();
        let start = Instant::now();
        let id = table
            .register(recorder(&log, 1), Some(Duration::from_millis(10)), start)
            .unwrap();
        assert_eq!(table.next_deadline(), Some(start + Duration::from_millis(10)));

        table.resolve(id, Err(RpcError::Remote("nope".into())));
        assert_eq!(table.next_deadline(), None);
        assert_eq!(table.expire(start + Duration::from_secs(1)), 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_zero_timeout_means_no_deadline() {
        let log = Log::default();
        let mut table = CorrelationTable::new();
        let start = Instant::now();
        table
            .register(recorder(&log, 1), Some(Duration::ZERO), start)
            .unwrap();

        assert_eq!(table.next_deadline(), None);
        assert_eq!(table.expire(start + Duration::from_secs(60)), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unrepresentable_timeout_means_no_deadline() {
        let log = Log::default();
        let mut table = CorrelationTable::new();
        let start = Instant::now();
        table
            .register(recorder(&log, 1), Some(Duration::MAX), start)
            .unwrap();

        assert_eq!(table.next_deadline(), None);
        assert_eq!(table.expire(start + Duration::from_secs(3600)), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_cancel_all_fires_each_once() {
        let log = Log::default();
        let mut table = CorrelationTable::new();
        let now = Instant::now();
        for tag in 0..3 {
            table.register(recorder(&log, tag), None, now).unwrap();
        }

        assert_eq!(table.cancel_all(&RpcError::ConnectionClosed), 3);
        assert!(table.is_empty());
        assert_eq!(table.cancel_all(&RpcError::ConnectionClosed), 0);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert!(log
            .iter()
            .all(|(_, r)| *r == Err(RpcError::ConnectionClosed)));
    }

    #[test]
    fn test_wraparound_is_flagged() {
        let log = Log::default();
        let mut table = CorrelationTable::starting_after(CallId::MAX - 1);
        let now = Instant::now();

        assert_eq!(
            table.register(recorder(&log, 0), None, now).unwrap(),
            CallId::MAX
        );
        assert_eq!(
            table.register(recorder(&log, 1), None, now),
            Err(RpcError::CallIdExhausted)
        );
        assert_eq!(table.len(), 1);
        assert!(log.lock().unwrap().is_empty());
    }
}
