// src/transport/push.rs

//! Push-bus transport adapter.
//!
//! Wraps one [`BusPort`]. Outgoing envelopes are JSON-encoded and broadcast;
//! a pump task decodes inbound bus messages and delivers the ones that are
//! envelopes. Anything else on the bus belongs to some other consumer and is
//! dropped without complaint.
//!
//! Ordering: the bus keeps per-port order, so envelopes from one sender
//! arrive in the order they were sent. Nothing above this adapter relies on
//! that.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::sync::lock_ignore_poison;
use crate::transport::bus::{Bus, BusInbox, BusPort};
use crate::{
    // ---
    log_debug,
    log_trace,
    Envelope,
    Result,
    RpcConfig,
    Transport,
    TransportBase,
    TransportPtr,
};

struct PushTransport {
    // ---
    base: Arc<TransportBase>,
    port: Mutex<Option<BusPort>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl PushTransport {
    fn start(bus: &Arc<Bus>, config: &RpcConfig) -> Self {
        // ---
        let base = Arc::new(TransportBase::new(format!("push:{}", config.endpoint_id)));
        let (port, inbox) = bus.connect(config.endpoint_id.as_str());
        let pump = tokio::spawn(pump(Arc::clone(&base), inbox));

        Self {
            base,
            port: Mutex::new(Some(port)),
            pump: Mutex::new(Some(pump)),
        }
    }
}

async fn pump(base: Arc<TransportBase>, mut inbox: BusInbox) {
    // ---
    while let Some(message) = inbox.recv().await {
        match Envelope::from_wire(&message.payload) {
            Ok(env) => {
                base.deliver(env);
            }
            Err(_err) => {
                log_trace!(
                    "{}: ignoring non-envelope message from {}: {_err}",
                    base.transport_id,
                    message.origin
                );
            }
        }
    }
    log_debug!("{}: bus inbox closed", base.transport_id);
}

#[async_trait::async_trait]
impl Transport for PushTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn send(&self, env: Envelope) -> Result<()> {
        // ---
        let payload = Bytes::from(serde_json::to_vec(&env)?);

        let port = lock_ignore_poison(&self.port);
        if let Some(port) = port.as_ref() {
            let _reached = port.post(payload);
            log_trace!(
                "{}: sent {} {} to {_reached} port(s)",
                self.base.transport_id,
                env.kind(),
                env.request_id
            );
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        if !self.base.shutdown() {
            return Ok(());
        }

        let port = lock_ignore_poison(&self.port).take();
        drop(port);

        let pump = lock_ignore_poison(&self.pump).take();
        if let Some(pump) = pump {
            pump.abort();
        }
        Ok(())
    }
}

impl Drop for PushTransport {
    fn drop(&mut self) {
        // ---
        if let Some(pump) = lock_ignore_poison(&self.pump).take() {
            pump.abort();
        }
    }
}

/// Create a push adapter attached to `bus` as `config.endpoint_id`.
///
/// The endpoint id is the context id other bus members (and the relay)
/// observe as the origin of everything this adapter sends.
///
/// Must be called from within a tokio runtime; the adapter spawns its
/// receive pump immediately.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_push_transport(bus: &Arc<Bus>, config: &RpcConfig) -> Result<TransportPtr> {
    // ---
    log_debug!("{}: create push transport", config.endpoint_id);
    Ok(Arc::new(PushTransport::start(bus, config)))
}
