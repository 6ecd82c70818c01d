//! Transport implementations.
//!
//! Concrete adapters for the domain-level `Transport` trait:
//!
//! - `push`: one port on a shared [`Bus`], full duplex.
//! - `eval`: requests become expressions evaluated in another context;
//!   client side only.
//!
//! Adapters are exposed through constructor functions; callers hold them as
//! `TransportPtr`.

mod bus;
mod eval;
mod push;

pub use bus::{Bus, BusInbox, BusMessage, BusPort, ContextId};
pub use eval::{BridgeHost, CallFrame, EvalBridgeTransport, Evaluator};
pub use push::create_push_transport;
