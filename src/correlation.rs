//! Request/response correlation.
//!
//! The [`CorrelationEngine`] is the only place where responses are matched
//! to calls. Matching relies on the request id (and channel) alone, never on
//! delivery order, so responses may settle in any order relative to the
//! order their requests went out.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_trace,
    log_warn,
    Body,
    Channel,
    Envelope,
    Result,
    RpcError,
    TransportPtr,
    Value,
};

/// Unique identifier used to match RPC requests and responses.
///
/// Request ids are carried *in-band* inside envelopes and are opaque to the
/// transport. Generated ids are UUID v4 strings, unique for the lifetime of
/// any adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new unique request id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the request id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Settle = oneshot::Sender<Result<Value>>;

struct PendingCall {
    channel: Channel,
    settle: Settle,
}

#[derive(Default)]
struct PendingState {
    calls: HashMap<RequestId, PendingCall>,
    disposed: bool,
}


/// Tracks outstanding calls for one transport.
///
/// Lifecycle of a pending call: created by [`call`](Self::call), destroyed
/// exactly once by a matching response, by [`on_dispose`](Self::on_dispose),
/// or by the caller dropping the call future.
pub struct CorrelationEngine {
    // ---
    transport: TransportPtr,
    pending: Mutex<PendingState>,
}

impl CorrelationEngine {
    // ---
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            pending: Mutex::new(PendingState::default()),
        }
    }

    pub fn transport(&self) -> &TransportPtr {
        &self.transport
    }

    /// Issue a request and wait for its response.
    ///
    /// # Errors
    ///
    /// - `RpcError::Remote` if the server answered with `ok = false`
    /// - `RpcError::TransportClosed` if the engine is (or becomes) disposed
    ///   before a response arrives
    /// - any error returned by the transport's `send`
    pub async fn call(&self, channel: &Channel, method: &str, args: Vec<Value>) -> Result<Value> {
        // ---
        let request_id = RequestId::generate();
        let rx = self.register(channel, request_id.clone())?;

        // Forget the entry if this future is dropped or `send` fails.
        let _guard = PendingGuard {
            engine: self,
            request_id: &request_id,
        };

        let env = Envelope::request(channel.clone(), request_id.clone(), method, args);
        self.transport.send(env).await?;

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::TransportClosed),
        }
    }

    fn register(
        &self,
        channel: &Channel,
        request_id: RequestId,
    ) -> Result<oneshot::Receiver<Result<Value>>> {
        // ---
        let (settle, rx) = oneshot::channel();
        let mut state = lock_ignore_poison(&self.pending);

        if state.disposed {
            return Err(RpcError::TransportClosed);
        }

        state.calls.insert(
            request_id,
            PendingCall {
                channel: channel.clone(),
                settle,
            },
        );
        Ok(rx)
    }

    /// Settle the pending call matching a response envelope.
    ///
    /// Returns `true` if a call was settled. Requests, unknown ids and ids
    /// registered under a different channel are dropped without touching
    /// any pending state.
    pub fn on_response(&self, env: Envelope) -> bool {
        // ---
        let outcome = match env.body {
            Body::Response(reply) => reply.into_outcome().map_err(RpcError::Remote),
            Body::MalformedResponse { reason } => {
                log_warn!("malformed response {} on {}: {reason}", env.request_id, env.channel);
                Err(RpcError::Protocol(format!("malformed response: {reason}")))
            }
            _ => return false,
        };

        let call = {
            let mut state = lock_ignore_poison(&self.pending);
            let ours = state
                .calls
                .get(&env.request_id)
                .is_some_and(|call| call.channel == env.channel);

            if ours {
                state.calls.remove(&env.request_id)
            } else {
                None
            }
        };

        let Some(call) = call else {
            log_trace!(
                "dropping unmatched response {} on {}",
                env.request_id,
                env.channel
            );
            return false;
        };

        if call.settle.send(outcome).is_err() {
            log_debug!(
                "response arrived after call was abandoned (request_id: {})",
                env.request_id
            );
        }
        true
    }

    /// Reject every pending call with `TransportClosed` and refuse new ones.
    ///
    /// Idempotent. Returns the number of calls rejected by this invocation.
    pub fn on_dispose(&self) -> usize {
        // ---
        let calls = {
            let mut state = lock_ignore_poison(&self.pending);
            state.disposed = true;
            std::mem::take(&mut state.calls)
        };

        let rejected = calls.len();
        for (_, call) in calls {
            let _ = call.settle.send(Err(RpcError::TransportClosed));
        }

        if rejected > 0 {
            log_debug!("rejected {rejected} pending call(s) on dispose");
        }
        rejected
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock_ignore_poison(&self.pending).calls.len()
    }

    pub fn is_disposed(&self) -> bool {
        lock_ignore_poison(&self.pending).disposed
    }

    fn forget(&self, request_id: &RequestId) {
        lock_ignore_poison(&self.pending).calls.remove(request_id);
    }
}

struct PendingGuard<'a> {
    engine: &'a CorrelationEngine,
    request_id: &'a RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.engine.forget(self.request_id);
    }
}
