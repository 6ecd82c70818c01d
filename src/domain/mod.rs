//! Domain layer public interface.
//!
//! This module defines the data model and the transport abstraction,
//! independent of any concrete bus, bridge or host environment.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod envelope;
mod transport;
mod value;

// --- Envelope and value model ---

pub use envelope::{
    //
    Body,
    Channel,
    Envelope,
    Reply,
};
pub use value::{Failure, Value};

// --- Transport domain ---

pub use transport::{
    //
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};
