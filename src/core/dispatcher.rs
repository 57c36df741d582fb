//! Dispatcher: klasifikasi dan routing pesan masuk
//!
//! - Reply → correlation table
//! - Call / Notify → handler milik owner lewat route table
//!
//! Call selalu dibalas tepat sekali (reply atau error); Notify tidak pernah.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use super::correlation::CorrelationTable;
use super::router::Router;
use crate::error::{Result, RpcError};
use crate::protocol::{decode_body, failed_call_id, Message, MessageKind};

/// Outbound FIFO, flushed on the next tick
pub type Outbox = VecDeque<Message>;

/// Routes decoded messages for one connection
pub struct Dispatcher<H> {
    owner: H,
    router: Arc<Router<H>>,
    pending: CorrelationTable,
}

impl<H> Dispatcher<H> {
    pub fn new(owner: H, router: Arc<Router<H>>) -> Self {
        Self {
            owner,
            router,
            pending: CorrelationTable::new(),
        }
    }

    /// Decode one frame body and dispatch it.
    ///
    /// Undecodable bodies are logged and dropped. A call that still carries
    /// a route and an id gets the decode error as its reply. The error is
    /// returned for the caller's bookkeeping only.
    pub fn dispatch_body(&mut self, body: &[u8], outbox: &mut Outbox) -> Result<MessageKind> {
        let message = match decode_body(body) {
            Ok(message) => message,
            Err(e) => {
                warn!(len = body.len(), error = %e, "dropping undecodable frame");
                if let Some(id) = failed_call_id(body) {
                    outbox.push_back(Message::reply_err(id, e.to_string()));
                }
                return Err(e);
            }
        };
        self.dispatch(message, outbox)
    }

    /// Route a decoded message.
    ///
    /// A failing call still produces its error reply before the failure is
    /// returned here.
    pub fn dispatch(&mut self, message: Message, outbox: &mut Outbox) -> Result<MessageKind> {
        match message {
            Message::Reply { id, result } => {
                debug!(id, ok = result.is_ok(), "reply received");
                self.pending.resolve(id, result.map_err(RpcError::Remote));
                Ok(MessageKind::Reply)
            }
            Message::Call {
                id,
                route,
                argument,
            } => {
                let outcome = self.router.invoke(&mut self.owner, &route, argument);
                match outcome {
                    Ok(reply) => {
                        debug!(id, %route, "call handled");
                        outbox.push_back(Message::reply_ok(id, reply));
                        Ok(MessageKind::Call)
                    }
                    Err(e) => {
                        warn!(id, %route, error = %e, "dispatch call error");
                        outbox.push_back(Message::reply_err(id, e.to_string()));
                        Err(e)
                    }
                }
            }
            Message::Notify { route, argument } => {
                match self.router.invoke(&mut self.owner, &route, argument) {
                    Ok(_) => {
                        debug!(%route, "notify handled");
                        Ok(MessageKind::Notify)
                    }
                    Err(e) => {
                        warn!(%route, error = %e, "dispatch notify error");
                        Err(e)
                    }
                }
            }
        }
    }

    pub fn pending(&self) -> &CorrelationTable {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut CorrelationTable {
        &mut self.pending
    }

    pub fn owner(&self) -> &H {
        &self.owner
    }

    pub fn owner_mut(&mut self) -> &mut H {
        &mut self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::protocol::encode;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Board {
        score: i64,
        hits: u32,
    }

    #[derive(Deserialize)]
    struct Val {
        val: i64,
    }

    fn dispatcher() -> Dispatcher<Board> {
        let mut router = Router::new();
        router
            .route("ping", |b: &mut Board, _: Value| {
                b.hits += 1;
                Ok("pong")
            })
            .unwrap()
            .route("rank.update", |b: &mut Board, arg: Val| {
                b.score += arg.val;
                Ok(())
            })
            .unwrap()
            .route("rank.explode", |_: &mut Board, _: Value| -> std::result::Result<(), HandlerError> {
                Err("exploded".into())
            })
            .unwrap();
        Dispatcher::new(Board::default(), Arc::new(router))
    }

    fn body(message: &Message) -> Vec<u8> {
        encode(message).unwrap()[4..].to_vec()
    }

    #[test]
    fn test_call_produces_exactly_one_reply() {
        let mut d = dispatcher();
        let mut outbox = Outbox::new();

        let kind = d
            .dispatch(
                Message::Call {
                    id: 4,
                    route: "ping".into(),
                    argument: Value::Null,
                },
                &mut outbox,
            )
            .unwrap();

        assert_eq!(kind, MessageKind::Call);
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0], Message::reply_ok(4, json!("pong")));
        assert_eq!(d.owner().hits, 1);
    }

    #[test]
    fn test_failing_call_replies_with_error() {
        let mut d = dispatcher();
        let mut outbox = Outbox::new();

        for (id, route) in [(1, "rank.explode"), (2, "a.b.c"), (3, ""), (4, "rank.nothing")] {
            let result = d.dispatch(
                Message::Call {
                    id,
                    route: route.into(),
                    argument: Value::Null,
                },
                &mut outbox,
            );
            assert!(result.is_err());
        }

        assert_eq!(outbox.len(), 4);
        assert_eq!(outbox[0], Message::reply_err(1, "exploded"));
        for message in outbox.iter().skip(1) {
            match message {
                Message::Reply { result: Err(e), .. } => assert!(e.starts_with("invalid route")),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_notify_never_replies() {
        let mut d = dispatcher();
        let mut outbox = Outbox::new();

        let ok = d.dispatch(
            Message::Notify {
                route: "rank.update".into(),
                argument: json!({"val": 5}),
            },
            &mut outbox,
        );
        let failed = d.dispatch(
            Message::Notify {
                route: "rank.explode".into(),
                argument: Value::Null,
            },
            &mut outbox,
        );
        let bad_route = d.dispatch(
            Message::Notify {
                route: "a.b.c".into(),
                argument: Value::Null,
            },
            &mut outbox,
        );

        assert_eq!(ok, Ok(MessageKind::Notify));
        assert!(failed.is_err());
        assert!(bad_route.is_err());
        assert!(outbox.is_empty());
        assert_eq!(d.owner().score, 5);
    }

    #[test]
    fn test_reply_resolves_pending_call() {
        let mut d = dispatcher();
        let mut outbox = Outbox::new();
        let seen: Arc<Mutex<Vec<Result<Value>>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = d
            .pending_mut()
            .register(
                Box::new(move |r: Result<Value>| sink.lock().unwrap().push(r)),
                None,
                Instant::now(),
            )
            .unwrap();

        let reply = body(&Message::reply_err(id, "route is wrong"));
        assert_eq!(d.dispatch_body(&reply, &mut outbox), Ok(MessageKind::Reply));
        assert!(d.pending().is_empty());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[Err(RpcError::Remote("route is wrong".into()))]
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_bad_bodies_are_dropped() {
        let mut d = dispatcher();
        let mut outbox = Outbox::new();

        assert!(matches!(
            d.dispatch_body(b"", &mut outbox),
            Err(RpcError::MalformedMessage(_))
        ));
        assert!(matches!(
            d.dispatch_body(br#"{"id": 3}"#, &mut outbox),
            Err(RpcError::Protocol(_))
        ));
        assert!(matches!(
            d.dispatch_body(br#"{"route": 12}"#, &mut outbox),
            Err(RpcError::MalformedMessage(_))
        ));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_call_with_non_string_route_gets_error_reply() {
        let mut d = dispatcher();
        let mut outbox = Outbox::new();

        let result = d.dispatch_body(br#"{"id": 6, "route": 12, "argument": null}"#, &mut outbox);
        assert!(matches!(result, Err(RpcError::MalformedMessage(_))));

        assert_eq!(outbox.len(), 1);
        match &outbox[0] {
            Message::Reply { id: 6, result: Err(e) } => assert!(e.starts_with("malformed message")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(d.owner().hits, 0);
    }

    #[test]
    fn test_zero_id_call_runs_as_notify() {
        let mut d = dispatcher();
        let mut outbox = Outbox::new();

        let kind = d.dispatch_body(br#"{"id": 0, "route": "ping"}"#, &mut outbox);
        assert_eq!(kind, Ok(MessageKind::Notify));
        assert_eq!(d.owner().hits, 1);
        assert!(outbox.is_empty());
    }
}
