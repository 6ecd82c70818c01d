// src/server/handler.rs

//! Closure-backed services.
//!
//! [`FnService`] turns a set of async closures into a [`Service`]: each
//! closure takes its arguments as one deserializable value (a tuple for
//! positional arguments) and returns a serializable result.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;

use crate::contract::unknown_method;
use crate::{
    // ---
    log_warn,
    BoxFuture,
    Channel,
    Failure,
    Service,
    Value,
};

type Outcome = std::result::Result<Value, Failure>;

// Type-erased async handler.
trait HandlerFn: Send + Sync {
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Outcome>;
}

struct Handler<F, Fut, TArgs, TResp>
where
    F: Fn(TArgs) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<TResp, Failure>> + Send,
    TArgs: DeserializeOwned,
    TResp: Serialize,
{
    func: F,
    _phantom: PhantomData<fn(TArgs, TResp, Fut)>,
}

impl<F, Fut, TArgs, TResp> HandlerFn for Handler<F, Fut, TArgs, TResp>
where
    F: Fn(TArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<TResp, Failure>> + Send + 'static,
    TArgs: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Outcome> {
        // ---
        let args: TArgs = match decode_args(args) {
            Ok(a) => a,
            Err(failure) => return Box::pin(async move { Err(failure) }),
        };

        let fut = (self.func)(args);

        Box::pin(async move {
            let resp = fut.await?;
            Ok(Value::encode(&resp)?)
        })
    }
}

/// Decode positional arguments into one value.
///
/// The argument list is read as a JSON array, so tuples, `Vec`s and
/// tuple structs all work. An empty list also decodes as `()`.
pub fn decode_args<T>(args: Vec<Value>) -> std::result::Result<T, Failure>
where
    T: DeserializeOwned,
{
    // ---
    let empty = args.is_empty();
    let array = Json::Array(args.into_iter().map(Json::from).collect());

    let decoded = match serde_json::from_value::<T>(array) {
        Err(_) if empty => serde_json::from_value::<T>(Json::Null),
        other => other,
    };

    decoded.map_err(|e| {
        log_warn!("rejecting call with invalid arguments: {e}");
        Failure::new(format!("invalid arguments: {e}"))
    })
}

/// A [`Service`] assembled from closures.
///
/// # Example
///
/// ```
/// use ctxrpc::{Failure, FnService};
///
/// let math = FnService::new("math")
///     .method("add", |(a, b): (i64, i64)| async move { Ok(a + b) })
///     .method("fail", |_: ()| async move { Err::<(), _>(Failure::new("boom")) });
///
/// assert!(math.has_method("add"));
/// ```
pub struct FnService {
    // ---
    channel: Channel,
    handlers: HashMap<String, Arc<dyn HandlerFn>>,
}

impl FnService {
    pub fn new(channel: impl Into<Channel>) -> Self {
        // ---
        Self {
            channel: channel.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under `name`, replacing any earlier registration.
    pub fn method<TArgs, TResp, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        TArgs: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TResp, Failure>> + Send + 'static,
    {
        // ---
        let handler_obj = Handler {
            func: handler,
            _phantom: PhantomData,
        };
        self.handlers.insert(name.to_string(), Arc::new(handler_obj));
        self
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl Service for FnService {
    // ---
    fn channel(&self) -> Channel {
        self.channel.clone()
    }

    fn dispatch<'a>(&'a self, method: &'a str, args: Vec<Value>) -> BoxFuture<'a, Outcome> {
        // ---
        match self.handlers.get(method) {
            Some(handler) => handler.call(args),
            None => {
                let failure = unknown_method(&self.channel, method);
                Box::pin(async move { Err(failure) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn positional_args_decode_as_tuple() {
        // ---
        let (a, b): (i64, String) =
            decode_args(vec![Value::Int(4), Value::from("x")]).unwrap();
        assert_eq!((a, b), (4, "x".to_string()));
    }

    #[test]
    fn empty_args_decode_as_unit() {
        // ---
        decode_args::<()>(vec![]).unwrap();
    }

    #[test]
    fn wrong_arity_is_a_failure() {
        // ---
        let failure = decode_args::<(i64, i64)>(vec![Value::Int(1)]).unwrap_err();
        assert!(failure.message.starts_with("invalid arguments"));
    }

    #[tokio::test]
    async fn dispatch_routes_by_method() {
        // ---
        let service = FnService::new("math")
            .method("add", |(a, b): (i64, i64)| async move { Ok(a + b) })
            .method("fail", |_: ()| async move {
                Err::<(), _>(Failure::new("boom"))
            });

        let sum = service
            .dispatch("add", vec![Value::Int(2), Value::Int(3)])
            .await
            .unwrap();
        assert_eq!(sum, Value::Int(5));

        let failure = service.dispatch("fail", vec![]).await.unwrap_err();
        assert_eq!(failure.message, "boom");

        let missing = service.dispatch("mul", vec![]).await.unwrap_err();
        assert_eq!(missing.message, "no such method: mul");
    }
}
