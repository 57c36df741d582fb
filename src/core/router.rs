//! Route table: dot-path → typed handler
//!
//! Route valid: `"method"` atau `"member.method"` (1–2 segmen, tidak kosong).
//! Lookup eksplisit lewat tabel yang diisi saat setup, bukan refleksi runtime.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{HandlerError, Result, RpcError};

/// Boxed handler stored in the table
pub type HandlerFn<H> =
    Box<dyn Fn(&mut H, Value) -> std::result::Result<Value, HandlerError> + Send + Sync>;

/// A validated route path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    /// Owning member for two-segment routes
    pub member: Option<&'a str>,
    pub method: &'a str,
}

impl<'a> Route<'a> {
    /// Split `path` on `.`; exactly one or two non-empty segments are valid
    pub fn parse(path: &'a str) -> Result<Self> {
        let invalid = || RpcError::InvalidRoute(format!("'{}'", path));

        if path.is_empty() {
            return Err(invalid());
        }

        let mut segments = path.split('.');
        let first = segments.next().ok_or_else(invalid)?;
        let second = segments.next();
        if segments.next().is_some() {
            return Err(invalid());
        }

        let route = match second {
            None => Route {
                member: None,
                method: first,
            },
            Some(method) => Route {
                member: Some(first),
                method,
            },
        };

        if route.method.is_empty() || route.member.is_some_and(str::is_empty) {
            return Err(invalid());
        }
        Ok(route)
    }
}

impl fmt::Display for Route<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.member {
            Some(member) => write!(f, "{}.{}", member, self.method),
            None => f.write_str(self.method),
        }
    }
}

/// Dispatch table for one owner type
///
/// Built once per role and shared read-only by every connection.
pub struct Router<H> {
    handlers: HashMap<String, HandlerFn<H>>,
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler under `path`.
    ///
    /// The argument is decoded from the message's `argument` field; a
    /// decode failure is reported like a failing handler.
    pub fn route<A, R, F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        H: 'static,
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(&mut H, A) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
    {
        let route = Route::parse(path)?;
        let name = route.to_string();

        let wrapped = move |owner: &mut H,
                            argument: Value|
              -> std::result::Result<Value, HandlerError> {
            let argument: A = serde_json::from_value(argument).map_err(|e| {
                HandlerError(format!("invalid argument for '{}': {}", name, e))
            })?;
            let reply = handler(owner, argument)?;
            serde_json::to_value(reply)
                .map_err(|e| HandlerError(format!("unserializable reply: {}", e)))
        };

        self.handlers.insert(path.to_string(), Box::new(wrapped));
        Ok(self)
    }

    /// Register a handler working on raw JSON values
    pub fn route_raw<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut H, Value) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
    {
        Route::parse(path)?;
        self.handlers.insert(path.to_string(), Box::new(handler));
        Ok(self)
    }

    /// Resolve `path` and run its handler against `owner`
    pub fn invoke(&self, owner: &mut H, path: &str, argument: Value) -> Result<Value> {
        let route = Route::parse(path)?;
        let handler = self.handlers.get(path).ok_or_else(|| {
            RpcError::InvalidRoute(format!("no handler for '{}'", route))
        })?;

        handler(owner, argument).map_err(|e| RpcError::HandlerFailure(e.0))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.handlers.contains_key(path)
    }

    /// Registered route paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        pings: u32,
        total: i64,
    }

    #[derive(Deserialize)]
    struct Add {
        val: i64,
    }

    fn router() -> Router<Counter> {
        let mut router = Router::new();
        router
            .route("ping", |c: &mut Counter, _: Value| {
                c.pings += 1;
                Ok("pong")
            })
            .unwrap()
            .route("total.add", |c: &mut Counter, arg: Add| {
                c.total += arg.val;
                Ok(c.total)
            })
            .unwrap()
            .route("total.fail", |_: &mut Counter, _: ()| -> std::result::Result<(), HandlerError> {
                Err("refused".into())
            })
            .unwrap();
        router
    }

    #[test]
    fn test_parse_segments() {
        assert_eq!(
            Route::parse("ping").unwrap(),
            Route {
                member: None,
                method: "ping"
            }
        );
        assert_eq!(
            Route::parse("rank.top").unwrap(),
            Route {
                member: Some("rank"),
                method: "top"
            }
        );
        for bad in ["", "a.b.c", ".top", "rank.", "."] {
            assert!(
                matches!(Route::parse(bad), Err(RpcError::InvalidRoute(_))),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn test_flat_and_member_dispatch() {
        let router = router();
        let mut counter = Counter::default();

        assert_eq!(
            router.invoke(&mut counter, "ping", Value::Null).unwrap(),
            json!("pong")
        );
        assert_eq!(
            router
                .invoke(&mut counter, "total.add", json!({"val": 5}))
                .unwrap(),
            json!(5)
        );
        assert_eq!(counter.pings, 1);
        assert_eq!(counter.total, 5);
    }

    #[test]
    fn test_unknown_and_malformed_routes() {
        let router = router();
        let mut counter = Counter::default();

        for path in ["", "a.b.c", "missing", "total.missing"] {
            assert!(matches!(
                router.invoke(&mut counter, path, Value::Null),
                Err(RpcError::InvalidRoute(_))
            ));
        }
    }

    #[test]
    fn test_handler_and_argument_failures() {
        let router = router();
        let mut counter = Counter::default();

        assert_eq!(
            router.invoke(&mut counter, "total.fail", Value::Null),
            Err(RpcError::HandlerFailure("refused".into()))
        );
        assert!(matches!(
            router.invoke(&mut counter, "total.add", json!({"val": "five"})),
            Err(RpcError::HandlerFailure(msg)) if msg.starts_with("invalid argument for 'total.add'")
        ));
    }

    #[test]
    fn test_registering_invalid_path_fails() {
        let mut router: Router<Counter> = Router::new();
        assert!(router
            .route("a.b.c", |_: &mut Counter, _: Value| Ok(()))
            .is_err());
        assert!(router.paths().is_empty());
    }
}
