// src/transport/eval/bridge.rs

//! Client-side adapter for the evaluation bridge.
//!
//! There is no message channel into the inspected context, only the ability
//! to evaluate an expression there and get back its result. Each request is
//! turned into one evaluation; when the evaluation settles, its result is fed
//! back to subscribers as a response envelope with the request's id.
//!
//! Evaluations run concurrently. Nothing here assumes one call per channel
//! is in flight at a time; matching is by request id in the correlation
//! engine, as for every other adapter.

use std::sync::{Arc, Mutex};

use serde_json::Value as Json;
use tokio::task::JoinHandle;

use super::expression::{decode_reply, encode_call, CallFrame};
use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_trace,
    Body,
    Envelope,
    Failure,
    Reply,
    Result,
    RpcConfig,
    Transport,
    TransportBase,
    TransportPtr,
};

/// Something that can evaluate an expression in another context.
///
/// Typically backed by a host runtime's "evaluate in page" facility. In
/// process, [`BridgeHost`](crate::BridgeHost) implements it.
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync + 'static {
    /// Evaluate `expression` and return its result as JSON.
    ///
    /// # Errors
    ///
    /// Any error (syntax, missing registry, exceptions raised by the
    /// expression) becomes a failed outcome for the one call it carried.
    async fn evaluate(&self, expression: &str) -> Result<Json>;
}


/// Evaluation bridge adapter.
///
/// Only requests can be sent through it. Responses handed to `send` are
/// dropped, so no server dispatcher can be meaningfully bound to it.
pub struct EvalBridgeTransport {
    // ---
    base: Arc<TransportBase>,
    evaluator: Arc<dyn Evaluator>,
    global: String,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl EvalBridgeTransport {
    pub fn new(evaluator: Arc<dyn Evaluator>, config: &RpcConfig) -> Self {
        // ---
        Self {
            base: Arc::new(TransportBase::new(format!("eval:{}", config.endpoint_id))),
            evaluator,
            global: config.bridge_global.clone(),
            inflight: Mutex::new(Vec::new()),
        }
    }

    /// Wrap `evaluator` into a shared transport pointer.
    pub fn create(evaluator: Arc<dyn Evaluator>, config: &RpcConfig) -> TransportPtr {
        Arc::new(Self::new(evaluator, config))
    }

    /// Evaluations started and not yet settled.
    pub fn inflight(&self) -> usize {
        // ---
        let mut inflight = lock_ignore_poison(&self.inflight);
        inflight.retain(|task| !task.is_finished());
        inflight.len()
    }
}

async fn evaluate_call(
    base: Arc<TransportBase>,
    evaluator: Arc<dyn Evaluator>,
    expression: String,
    frame: CallFrame,
) {
    // ---
    let reply = match evaluator.evaluate(&expression).await {
        Ok(result) => decode_reply(result),
        Err(err) => {
            log_debug!(
                "{}: evaluation for {} failed: {err}",
                base.transport_id,
                frame.request_id
            );
            Reply::failure(Failure::from(err))
        }
    };

    let delivered = base.deliver(Envelope::response(frame.channel, frame.request_id, reply));
    if delivered == 0 {
        log_trace!("{}: reply settled with no subscriber", base.transport_id);
    }
}

#[async_trait::async_trait]
impl Transport for EvalBridgeTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn send(&self, env: Envelope) -> Result<()> {
        // ---
        if self.base.is_closed() {
            return Ok(());
        }

        let Body::Request { method, args } = env.body else {
            log_trace!(
                "{}: dropping response {}; the bridge is client-only",
                self.base.transport_id,
                env.request_id
            );
            return Ok(());
        };

        let frame = CallFrame {
            channel: env.channel,
            method,
            request_id: env.request_id,
            args,
        };
        let expression = encode_call(&self.global, &frame)?;

        let task = tokio::spawn(evaluate_call(
            Arc::clone(&self.base),
            Arc::clone(&self.evaluator),
            expression,
            frame,
        ));

        let mut inflight = lock_ignore_poison(&self.inflight);
        inflight.retain(|task| !task.is_finished());
        inflight.push(task);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        if !self.base.shutdown() {
            return Ok(());
        }

        let tasks = std::mem::take(&mut *lock_ignore_poison(&self.inflight));
        if !tasks.is_empty() {
            log_debug!(
                "{}: abandoning {} evaluation(s)",
                self.base.transport_id,
                tasks.len()
            );
        }
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for EvalBridgeTransport {
    fn drop(&mut self) {
        // ---
        for task in lock_ignore_poison(&self.inflight).drain(..) {
            task.abort();
        }
    }
}
