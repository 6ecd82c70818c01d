// src/transport/bus.rs

//! In-process message bus.
//!
//! A [`Bus`] models a host runtime messaging facility: many execution
//! contexts connect to it, every message carries the id of the context that
//! posted it, and payloads are opaque bytes. The bus does not know about
//! envelopes, channels or sessions, and other consumers may share it with
//! traffic of their own.
//!
//! ## Semantics
//!
//! - [`BusPort::post`] broadcasts to every *other* connected port.
//! - [`BusPort::post_to`] delivers only to ports connected under one context.
//! - Delivery is in order per sending port; there is no ordering across
//!   different senders.
//! - Dropping a [`BusPort`] disconnects it and ends its inbox.
//!
//! ## Non-Goals
//!
//! Persistence, back-pressure, and failure simulation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::log_debug;
use crate::sync::{read_ignore_poison, write_ignore_poison};

/// Identifier of an execution context attached to a bus.
///
/// The relay uses the origin context of a message as its session id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub Arc<str>);

impl ContextId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContextId {
    fn from(value: &str) -> Self {
        ContextId(Arc::from(value))
    }
}

impl From<String> for ContextId {
    fn from(value: String) -> Self {
        ContextId(Arc::from(value))
    }
}

impl From<&String> for ContextId {
    fn from(value: &String) -> Self {
        ContextId(Arc::from(value.as_str()))
    }
}

impl From<Arc<str>> for ContextId {
    fn from(value: Arc<str>) -> Self {
        ContextId(value)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as observed by a receiving port.
#[derive(Clone, Debug)]
pub struct BusMessage {
    // ---
    /// Context that posted the message, attached by the bus.
    pub origin: ContextId,

    /// Opaque payload bytes.
    pub payload: Bytes,
}

/// Receiving half of a bus connection.
pub type BusInbox = mpsc::UnboundedReceiver<BusMessage>;

struct PortEntry {
    port_id: u64,
    context: ContextId,
    tx: mpsc::UnboundedSender<BusMessage>,
}

/// Shared message bus.
pub struct Bus {
    // ---
    ports: RwLock<Vec<PortEntry>>,
    next_port_id: AtomicU64,
}

impl Bus {
    /// Create a new, empty bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a port for `context`.
    ///
    /// Several ports may share a context id; targeted posts reach all of
    /// them.
    pub fn connect(self: &Arc<Self>, context: impl Into<ContextId>) -> (BusPort, BusInbox) {
        // ---
        let context = context.into();
        let port_id = self.next_port_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.write_ports().push(PortEntry {
            port_id,
            context: context.clone(),
            tx,
        });
        log_debug!("bus: port {port_id} connected as {context}");

        let port = BusPort {
            bus: Arc::clone(self),
            port_id,
            context,
        };
        (port, rx)
    }

    /// Number of connected ports.
    pub fn port_count(&self) -> usize {
        self.read_ports().len()
    }

    fn dispatch(&self, from: &BusPort, target: Option<&ContextId>, payload: Bytes) -> usize {
        // ---
        let ports = self.read_ports();
        let mut delivered = 0;

        for entry in ports.iter() {
            if entry.port_id == from.port_id {
                continue;
            }
            if target.is_some_and(|t| *t != entry.context) {
                continue;
            }

            let message = BusMessage {
                origin: from.context.clone(),
                payload: payload.clone(),
            };
            // A closed receiver means the port is about to disconnect.
            if entry.tx.send(message).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn disconnect(&self, port_id: u64) {
        self.write_ports().retain(|entry| entry.port_id != port_id);
    }

    fn read_ports(&self) -> RwLockReadGuard<'_, Vec<PortEntry>> {
        // ---
        read_ignore_poison(&self.ports)
    }

    fn write_ports(&self) -> RwLockWriteGuard<'_, Vec<PortEntry>> {
        // ---
        write_ignore_poison(&self.ports)
    }
}

impl Default for Bus {
    fn default() -> Self {
        // ---
        Self {
            ports: RwLock::new(Vec::new()),
            next_port_id: AtomicU64::new(1),
        }
    }
}

/// Sending half of a bus connection.
///
/// Disconnects from the bus when dropped.
pub struct BusPort {
    // ---
    bus: Arc<Bus>,
    port_id: u64,
    context: ContextId,
}

impl BusPort {
    // ---
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// Broadcast to every other port. Returns the number of ports reached.
    pub fn post(&self, payload: impl Into<Bytes>) -> usize {
        self.bus.dispatch(self, None, payload.into())
    }

    /// Deliver to the ports connected as `target`. Returns the number of
    /// ports reached.
    pub fn post_to(&self, target: &ContextId, payload: impl Into<Bytes>) -> usize {
        self.bus.dispatch(self, Some(target), payload.into())
    }
}

impl Drop for BusPort {
    fn drop(&mut self) {
        // ---
        self.bus.disconnect(self.port_id);
        log_debug!("bus: port {} ({}) disconnected", self.port_id, self.context);
    }
}
