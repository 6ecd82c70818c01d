// src/server/mod.rs
//! Server dispatcher.
//!
//! [`start_server`] binds a [`Service`] to a transport: it claims the
//! service's channel on that transport, subscribes, and answers every
//! request envelope on the channel with exactly one response envelope.
//!
//! # Error containment
//!
//! Nothing a handler does escapes as a raw error. A returned [`Failure`],
//! a panic, undecodable arguments and unknown methods all become an
//! `ok = false` response the caller observes as `RpcError::Remote`.
//!
//! # Concurrency
//!
//! Each request runs in its own task, so a slow handler never holds up the
//! receive loop and responses may go out in any order.

mod handler;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    Body,
    Channel,
    Envelope,
    Failure,
    Reply,
    Result,
    TransportPtr,
    Value,
};

pub use handler::{decode_args, FnService};

/// Boxed, sendable future used at type-erased seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A service implementation the dispatcher can drive.
///
/// Implemented by [`FnService`] and by the wrapper types the
/// [`contract!`](crate::contract!) macro generates. Implement it directly for
/// fully dynamic services.
pub trait Service: Send + Sync + 'static {
    /// Channel this service answers on.
    fn channel(&self) -> Channel;

    /// Invoke `method` with positional `args`.
    ///
    /// Unknown methods must resolve to [`Failure::no_such_method`].
    fn dispatch<'a>(
        &'a self,
        method: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, std::result::Result<Value, Failure>>;
}

/// Run one dispatch, converting a panic into a `Failure`.
pub(crate) async fn invoke(
    service: &dyn Service,
    method: &str,
    args: Vec<Value>,
) -> std::result::Result<Value, Failure> {
    // ---
    // `dispatch` itself may run user code before returning its future.
    match AssertUnwindSafe(async move { service.dispatch(method, args).await })
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(&*panic);
            log_error!("handler {method} panicked: {message}");
            Err(Failure::new(format!("handler panicked: {message}")))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    // ---
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Handle to a running server dispatcher.
///
/// Dropping the handle does not stop the server; call [`stop`](Self::stop).
pub struct ServerHandle {
    // ---
    channel: Channel,
    transport: TransportPtr,
    rx_task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Stop dispatching and dispose of the transport.
    ///
    /// Idempotent. Requests already being handled still send their response
    /// if the transport accepts it; after disposal those sends are no-ops.
    ///
    /// # Errors
    ///
    /// Propagates any error from the transport's `close`.
    pub async fn stop(&self) -> Result<()> {
        // ---
        let task = lock_ignore_poison(&self.rx_task).take();
        if let Some(task) = task {
            task.abort();
            self.transport.base().release_channel(&self.channel);
            log_debug!("server for {} stopped", self.channel);
        }
        self.transport.close().await
    }
}

/// Start answering requests for `service` on `transport`.
///
/// # Errors
///
/// - `RpcError::DuplicateServer` if a dispatcher already serves this
///   service's channel on this transport
/// - `RpcError::TransportClosed` if the transport is already disposed
///
/// # Example
///
/// ```no_run
/// # use ctxrpc::{Bus, FnService, RpcConfig};
/// # async fn example() -> ctxrpc::Result<()> {
/// let bus = Bus::new();
/// let transport = ctxrpc::create_push_transport(&bus, &RpcConfig::new("tab-1")).await?;
///
/// let math = FnService::new("math")
///     .method("add", |(a, b): (i64, i64)| async move { Ok(a + b) });
///
/// let server = ctxrpc::start_server(transport, math).await?;
/// // ...
/// server.stop().await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_server<S>(transport: TransportPtr, service: S) -> Result<ServerHandle>
where
    S: Service,
{
    // ---
    start_shared_server(transport, Arc::new(service)).await
}

/// [`start_server`] for a service that is already shared.
///
/// # Errors
///
/// Same as [`start_server`].
pub async fn start_shared_server(
    transport: TransportPtr,
    service: Arc<dyn Service>,
) -> Result<ServerHandle> {
    // ---
    let channel = service.channel();
    transport.base().claim_channel(&channel)?;

    let mut handle = match transport.subscribe().await {
        Ok(handle) => handle,
        Err(err) => {
            transport.base().release_channel(&channel);
            return Err(err);
        }
    };

    log_debug!("{}: serving channel {channel}", transport.transport_id());

    let loop_transport = transport.clone();
    let loop_channel = channel.clone();
    let rx_task = tokio::spawn(async move {
        // ---
        while let Some(env) = handle.inbox.recv().await {
            if env.channel != loop_channel {
                continue;
            }

            let (method, args) = match env.body {
                Body::Request { method, args } => (method, args),
                Body::MalformedRequest { method, reason } => {
                    let method = method.as_deref().unwrap_or("<unknown>");
                    log_warn!("{loop_channel}.{method}: malformed request: {reason}");

                    let failure = Failure::new(format!("malformed request: {reason}"));
                    let response = Envelope::response(
                        loop_channel.clone(),
                        env.request_id,
                        Reply::failure(failure),
                    );
                    if let Err(_err) = loop_transport.send(response).await {
                        log_error!("failed to send response: {_err}");
                    }
                    continue;
                }
                _ => continue,
            };

            let service = service.clone();
            let transport = loop_transport.clone();
            let channel = loop_channel.clone();
            let request_id = env.request_id;

            tokio::spawn(async move {
                // ---
                let outcome = invoke(service.as_ref(), &method, args).await;
                if let Err(_failure) = &outcome {
                    log_debug!("{channel}.{method} failed: {_failure}");
                }

                let response = Envelope::response(channel, request_id, Reply::from(outcome));
                if let Err(_err) = transport.send(response).await {
                    log_error!("failed to send response: {_err}");
                }
            });
        }

        log_debug!("server loop for {loop_channel} ended");
    });

    Ok(ServerHandle {
        channel,
        transport,
        rx_task: Mutex::new(Some(rx_task)),
    })
}
