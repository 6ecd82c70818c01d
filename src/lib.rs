//! Cross-context RPC with request/response correlation, session relaying and
//! an evaluation bridge.
//!
//! Code in one isolated execution context calls operations implemented in
//! another. Contexts share nothing but a message facility, and some can only
//! be reached by evaluating an expression in them. This crate provides:
//!
//! - a wire [`Envelope`] carrying tagged [`Value`]s,
//! - the [`Transport`] abstraction with a push-bus adapter
//!   ([`create_push_transport`]) and an evaluation-bridge adapter
//!   ([`EvalBridgeTransport`]),
//! - a [`CorrelationEngine`] matching responses to calls by request id only,
//! - the client proxy ([`RpcClient`], typed stubs via [`contract!`]) and the
//!   server dispatcher ([`start_server`]),
//! - a [`Relay`] multiplexing sessions over one bus by rewriting channel
//!   names.
//!
//! Delivery is best-effort. A response that never arrives leaves its call
//! pending until the transport is disposed or a caller-side timeout fires.
//!

// Import all sub modules once...
mod macros;

mod client;
pub mod contract;
mod correlation;
mod domain;
mod error;
mod relay;
mod rpc_config;
mod server;
mod sync;
mod transport;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

// Re-export main types
pub use client::RpcClient;
pub use server::{
    //
    decode_args,
    start_server,
    start_shared_server,
    BoxFuture,
    FnService,
    Service,
    ServerHandle,
};

pub use relay::{session_channel, split_session_channel, Relay};
pub use rpc_config::{RpcConfig, DEFAULT_BRIDGE_GLOBAL, DEFAULT_SESSION_SEPARATOR};

pub use correlation::{CorrelationEngine, RequestId};
pub use error::{Result, RpcError};

pub use transport::{
    //
    create_push_transport,
    BridgeHost,
    Bus,
    BusInbox,
    BusMessage,
    BusPort,
    CallFrame,
    ContextId,
    EvalBridgeTransport,
    Evaluator,
};

// --- public re-exports
pub use domain::{
    //
    Body,
    Channel,
    Envelope,
    Failure,
    Reply,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
    Value,
};
