//! Evaluation bridge.
//!
//! [`EvalBridgeTransport`] is the caller's side and turns requests into
//! expressions; [`BridgeHost`] is the evaluated side and answers them from
//! registered services.

mod bridge;
mod expression;
mod host;

pub use bridge::{EvalBridgeTransport, Evaluator};
pub use expression::CallFrame;
pub use host::BridgeHost;
