// src/client/mod.rs
//! RPC client implementation.
//!
//! [`RpcClient`] is the untyped client proxy for one channel on one
//! transport. The typed stubs generated by [`contract!`](crate::contract!)
//! wrap it.
//!
//! # Architecture
//!
//! The client subscribes to its transport and runs a background receive loop
//! that hands every envelope to its [`CorrelationEngine`]. The engine owns
//! the pending-call map; the client never inspects it.
//!
//! When the transport is disposed the subscription inbox ends, the loop
//! exits and every outstanding call is rejected with
//! `RpcError::TransportClosed`.
//!
//! # Concurrency
//!
//! Any number of calls can be in flight on one client; clones share the
//! same engine. Responses settle in whatever order they arrive.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time;

use crate::{
    // ---
    log_debug,
    Channel,
    CorrelationEngine,
    Result,
    RpcConfig,
    RpcError,
    TransportPtr,
    Value,
};

/// Client proxy for one channel.
///
/// Cheap to clone (internally `Arc`-backed).
///
/// # Example
///
/// ```no_run
/// # use ctxrpc::{Bus, RpcClient, RpcConfig, Value};
/// # async fn example() -> ctxrpc::Result<()> {
/// let bus = Bus::new();
/// let transport = ctxrpc::create_push_transport(&bus, &RpcConfig::new("panel")).await?;
///
/// let math = RpcClient::new(transport, "math").await?;
/// let sum: i64 = math.request("add", &(2, 3)).await?;
/// assert_eq!(sum, 5);
///
/// let raw = math.call("add", vec![Value::Int(2), Value::Int(3)]).await?;
/// assert_eq!(raw, Value::Int(5));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    channel: Channel,
    engine: Arc<CorrelationEngine>,
    call_timeout: Option<Duration>,
    rx_task: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.rx_task.abort();
    }
}

impl RpcClient {
    // ---
    /// Create a client for `channel` over `transport`.
    ///
    /// Calls wait until a response arrives or the transport is disposed.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::TransportClosed` if the transport is already
    /// disposed.
    pub async fn new(transport: TransportPtr, channel: impl Into<Channel>) -> Result<Self> {
        Self::build(transport, channel.into(), None).await
    }

    /// Create a client honouring `config` (currently its `call_timeout`).
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub async fn with_config(
        transport: TransportPtr,
        channel: impl Into<Channel>,
        config: &RpcConfig,
    ) -> Result<Self> {
        Self::build(transport, channel.into(), config.call_timeout).await
    }

    async fn build(
        transport: TransportPtr,
        channel: Channel,
        call_timeout: Option<Duration>,
    ) -> Result<Self> {
        // ---
        let mut handle = transport.subscribe().await?;
        log_debug!("{}: client for {channel}", transport.transport_id());

        let engine = Arc::new(CorrelationEngine::new(transport));

        let loop_engine = Arc::clone(&engine);
        let rx_task = tokio::spawn(async move {
            // ---
            while let Some(env) = handle.inbox.recv().await {
                if env.is_response() {
                    loop_engine.on_response(env);
                }
            }

            // Transport closed or subscription dropped.
            log_debug!("client receive loop ended");
            loop_engine.on_dispose();
        });

        Ok(Self {
            inner: Arc::new(Inner {
                channel,
                engine,
                call_timeout,
                rx_task,
            }),
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub fn transport(&self) -> &TransportPtr {
        self.inner.engine.transport()
    }

    /// Invoke `method` with positional `args`.
    ///
    /// # Errors
    ///
    /// - `RpcError::Remote` if the handler failed (or the method is unknown)
    /// - `RpcError::TransportClosed` if the transport is disposed first
    /// - `RpcError::Timeout` if a configured call timeout elapsed
    /// - any error from the transport's `send`
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        // ---
        match self.inner.call_timeout {
            Some(timeout) => self.call_with_timeout(method, args, timeout).await,
            None => {
                self.inner
                    .engine
                    .call(&self.inner.channel, method, args)
                    .await
            }
        }
    }

    /// [`call`](Self::call) bounded by `timeout`.
    ///
    /// On expiry the pending entry is discarded; a response arriving later
    /// is dropped like any other unmatched response.
    ///
    /// # Errors
    ///
    /// `RpcError::Timeout` on expiry, otherwise as [`call`](Self::call).
    pub async fn call_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        // ---
        let call = self.inner.engine.call(&self.inner.channel, method, args);
        match time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                log_debug!("{}.{method} timed out after {timeout:?}", self.inner.channel);
                Err(RpcError::Timeout)
            }
        }
    }

    /// Typed call.
    ///
    /// `args` is encoded once: a tuple (or any sequence) is spread into
    /// positional arguments, `()` sends none, anything else is sent as the
    /// single argument. Wrap a sequence in a 1-tuple to pass it whole.
    ///
    /// # Errors
    ///
    /// `RpcError::Serialization` if `args` cannot be encoded or the result
    /// does not decode as `TResp`, otherwise as [`call`](Self::call).
    pub async fn request<TArgs, TResp>(&self, method: &str, args: &TArgs) -> Result<TResp>
    where
        TArgs: Serialize + ?Sized,
        TResp: DeserializeOwned,
    {
        // ---
        let args = match Value::encode(args)? {
            Value::Seq(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        };
        self.call(method, args).await?.decode()
    }

    /// Calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.engine.pending_count()
    }

    /// Dispose of the transport and reject every pending call with
    /// `RpcError::TransportClosed`. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates any error from the transport's `close`; pending calls are
    /// rejected regardless.
    pub async fn dispose(&self) -> Result<()> {
        // ---
        let closed = self.inner.engine.transport().close().await;
        self.inner.engine.on_dispose();
        closed
    }
}
