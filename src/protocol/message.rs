//! Message Format (length-prefixed JSON)
//!
//! Layout:
//! ┌─────────────────────────────────────────────────────┐
//! │ Length prefix (4 bytes, u32 little-endian)          │
//! ├─────────────────────────────────────────────────────┤
//! │ Body (JSON object, `length` bytes)                  │
//! └─────────────────────────────────────────────────────┘
//!
//! Tidak ada discriminant eksplisit: jenis pesan ditentukan dari bentuknya.
//! - Call:   `{"id": 7, "route": "rank.top", "argument": {...}}`
//! - Notify: `{"route": "rank.update", "argument": {...}}`
//! - Reply:  `{"id": 7, "result": {"error": "..."}}` atau `{"id": 7, "result": {"reply": ...}}`

use serde::de::IgnoredAny;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// Size of the length prefix in front of every body.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest body the prefix can describe.
pub const MAX_BODY_LEN: usize = u32::MAX as usize;

/// Correlation id of a call. Positive, unique per connection while pending.
pub type CallId = u64;

/// Shape of a decoded message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Request expecting exactly one reply
    Call,
    /// Fire-and-forget request
    Notify,
    /// Response to an earlier call
    Reply,
}

/// One logical message on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call {
        id: CallId,
        route: String,
        argument: Value,
    },
    Notify {
        route: String,
        argument: Value,
    },
    /// `Err` carries the remote error string, `Ok` the handler's return value.
    Reply {
        id: CallId,
        result: std::result::Result<Value, String>,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Call { .. } => MessageKind::Call,
            Message::Notify { .. } => MessageKind::Notify,
            Message::Reply { .. } => MessageKind::Reply,
        }
    }

    /// Reply carrying a handler's return value
    pub fn reply_ok(id: CallId, reply: Value) -> Self {
        Message::Reply {
            id,
            result: Ok(reply),
        }
    }

    /// Reply carrying a failure message
    pub fn reply_err(id: CallId, error: impl Into<String>) -> Self {
        Message::Reply {
            id,
            result: Err(error.into()),
        }
    }

    /// Route of a call or notify
    pub fn route(&self) -> Option<&str> {
        match self {
            Message::Call { route, .. } | Message::Notify { route, .. } => Some(route),
            Message::Reply { .. } => None,
        }
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Message::Call {
                id,
                route,
                argument,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("id", id)?;
                map.serialize_entry("route", route)?;
                map.serialize_entry("argument", argument)?;
                map.end()
            }
            Message::Notify { route, argument } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("route", route)?;
                map.serialize_entry("argument", argument)?;
                map.end()
            }
            Message::Reply { id, result } => {
                let body = match result {
                    Ok(reply) => ReplyRef {
                        error: None,
                        reply: Some(reply),
                    },
                    Err(error) => ReplyRef {
                        error: Some(error),
                        reply: None,
                    },
                };
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("id", id)?;
                map.serialize_entry("result", &body)?;
                map.end()
            }
        }
    }
}

#[derive(Serialize)]
struct ReplyRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<&'a Value>,
}

/// Every field a body may carry. Shape is classified afterwards.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    id: Option<CallId>,
    #[serde(default)]
    route: Option<String>,
    #[serde(default, deserialize_with = "present")]
    argument: Option<Value>,
    #[serde(default)]
    result: Option<ReplyBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, deserialize_with = "present")]
    reply: Option<Value>,
}

/// The parts of a body needed to answer a call whose other fields are unusable
#[derive(Deserialize)]
struct CallHeader {
    #[serde(default)]
    id: Option<CallId>,
    #[serde(default)]
    route: Option<IgnoredAny>,
}

/// Id of the call inside a body that failed to decode, if the body still
/// has a route and a usable id. Such a call is owed an error reply.
pub(crate) fn failed_call_id(body: &[u8]) -> Option<CallId> {
    let header: CallHeader = serde_json::from_slice(body).ok()?;
    match (header.id, header.route) {
        (Some(id), Some(_)) if id != 0 => Some(id),
        _ => None,
    }
}

/// Keeps an explicit `null` apart from a missing field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<Envelope> for Message {
    type Error = RpcError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        if let Some(route) = envelope.route {
            let argument = envelope.argument.unwrap_or(Value::Null);
            // id 0 bukan id call yang valid: diperlakukan sebagai notify
            return match envelope.id {
                Some(id) if id != 0 => Ok(Message::Call {
                    id,
                    route,
                    argument,
                }),
                _ => Ok(Message::Notify { route, argument }),
            };
        }

        if let Some(body) = envelope.result {
            let id = envelope
                .id
                .ok_or_else(|| RpcError::Protocol("reply without id".to_string()))?;
            let result = match body.error {
                Some(error) => Err(error),
                None => Ok(body.reply.unwrap_or(Value::Null)),
            };
            return Ok(Message::Reply { id, result });
        }

        Err(RpcError::Protocol(
            "message has neither route nor result".to_string(),
        ))
    }
}
