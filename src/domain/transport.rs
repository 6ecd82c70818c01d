// src/domain/transport.rs

//! Transport adapter abstraction.
//!
//! A transport adapter wraps exactly one underlying channel (a push bus port,
//! an evaluation bridge, a test loopback) and exposes the same three
//! capabilities regardless of what is underneath:
//!
//! - `send` an envelope,
//! - `subscribe` to envelopes it receives (dropping the handle unsubscribes),
//! - `close` the adapter.
//!
//! Correlation, dispatch and relaying live above this layer. Concrete
//! adapters live under `src/transport/`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_warn,
    Channel,
    Envelope,
    Result,
    RpcError,
};


/// Shared base state for all transport adapters.
///
/// Holds what every adapter needs regardless of its channel: an id for logs,
/// the closed flag, the subscriber list and the set of channels claimed by
/// server dispatchers. Default [`Transport`] methods delegate here.
///
/// # Usage
///
/// ```ignore
/// struct LoopbackTransport {
///     base: TransportBase,
///     // ... adapter specific fields
/// }
///
/// impl Transport for LoopbackTransport {
///     fn base(&self) -> &TransportBase { &self.base }
///     // send / close
/// }
/// ```
pub struct TransportBase {
    // ---
    /// Identifier of this adapter instance, used for logging.
    pub transport_id: String,
    closed: AtomicBool,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Envelope>>>,
    served: Mutex<HashSet<Channel>>,
}

impl TransportBase {
    pub fn new(transport_id: impl Into<String>) -> Self {
        // ---
        Self {
            transport_id: transport_id.into(),
            closed: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            served: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Register a new subscriber.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::TransportClosed` once the adapter is closed.
    pub fn subscribe(&self) -> Result<SubscriptionHandle> {
        // ---
        let mut subscribers = lock_ignore_poison(&self.subscribers);
        if self.is_closed() {
            return Err(RpcError::TransportClosed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        subscribers.push(tx);
        Ok(SubscriptionHandle { inbox: rx })
    }

    /// Hand a received envelope to every live subscriber.
    ///
    /// Returns the number of subscribers reached. Subscribers whose handle
    /// was dropped are pruned here. A closed adapter delivers nothing.
    pub fn deliver(&self, env: Envelope) -> usize {
        // ---
        let mut subscribers = lock_ignore_poison(&self.subscribers);
        if self.is_closed() {
            return 0;
        }

        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            let _ = tx.send(env.clone());
        }
        subscribers.len()
    }

    /// Mark the adapter closed and end every subscription inbox.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn shutdown(&self) -> bool {
        // ---
        let mut subscribers = lock_ignore_poison(&self.subscribers);
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        subscribers.clear();
        lock_ignore_poison(&self.served).clear();
        log_debug!("{}: transport closed", self.transport_id);
        true
    }

    /// Claim `channel` for a server dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::DuplicateServer` if another dispatcher already owns
    /// this (channel, adapter) pair, and `RpcError::TransportClosed` if the
    /// adapter is closed.
    pub fn claim_channel(&self, channel: &Channel) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(RpcError::TransportClosed);
        }

        let mut served = lock_ignore_poison(&self.served);
        if !served.insert(channel.clone()) {
            log_warn!(
                "{}: second server registration for channel {channel}",
                self.transport_id
            );
            return Err(RpcError::DuplicateServer(channel.to_string()));
        }
        Ok(())
    }

    /// Give up a channel claimed with [`claim_channel`](Self::claim_channel).
    pub fn release_channel(&self, channel: &Channel) -> bool {
        lock_ignore_poison(&self.served).remove(channel)
    }
}

/// Handle returned from a successful subscription.
///
/// The subscription stays active until the handle is dropped or the
/// transport is closed; in the latter case `inbox.recv()` yields `None`.
///
/// # Example
///
/// ```no_run
/// # use ctxrpc::{Bus, RpcConfig, Transport};
/// # async fn example() -> ctxrpc::Result<()> {
/// let bus = Bus::new();
/// let transport = ctxrpc::create_push_transport(&bus, &RpcConfig::new("tab-1")).await?;
///
/// let mut handle = transport.subscribe().await?;
/// while let Some(envelope) = handle.inbox.recv().await {
///     println!("received {} on {}", envelope.kind(), envelope.channel);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SubscriptionHandle {
    // ---
    /// Receiver for envelopes delivered to this subscription.
    pub inbox: mpsc::UnboundedReceiver<Envelope>,
}

impl SubscriptionHandle {
    /// Stop receiving. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

/// Transport adapter.
///
/// Implementations must ensure that:
/// - Envelopes received *after* `subscribe()` returns are delivered to the
///   returned inbox.
/// - `send()` never waits for a response to arrive.
/// - `close()` is idempotent, ends every subscription inbox, and turns any
///   later `send()` into a silent no-op. Calls already in flight are the
///   correlation engine's concern.
///
/// Delivery is best-effort. No ordering is promised across adapters.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Identifier of this adapter, for logs.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    fn is_closed(&self) -> bool {
        self.base().is_closed()
    }

    /// Send an envelope through the underlying channel.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Serialization` if the envelope cannot be encoded
    /// for the underlying channel, or `RpcError::Transport` if the channel
    /// rejects it. Sending on a closed adapter succeeds without effect.
    async fn send(&self, env: Envelope) -> Result<()>;

    /// Register a subscriber for received envelopes.
    async fn subscribe(&self) -> Result<SubscriptionHandle> {
        self.base().subscribe()
    }

    /// Dispose of the adapter and release the underlying channel.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `Arc<dyn Transport>`: cloning shares the same adapter.
pub type TransportPtr = Arc<dyn Transport>;
