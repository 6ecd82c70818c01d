//! Public, transport-agnostic RPC configuration.
//!
//! An `RpcConfig` is an explicit context object handed to every adapter,
//! client, relay and bridge host at construction time. Nothing in the crate
//! reads process-global settings; whoever builds the adapter owns the
//! configuration's lifetime.

use std::time::Duration;

/// Default separator placed between a base channel and a session id.
pub const DEFAULT_SESSION_SEPARATOR: &str = "#";

/// Default global name the evaluation bridge invokes in the remote context.
pub const DEFAULT_BRIDGE_GLOBAL: &str = "__ctxrpc";

/// Endpoint configuration.
///
/// # Example
///
/// ```
/// use ctxrpc::RpcConfig;
/// use std::time::Duration;
///
/// let config = RpcConfig::new("devtools-panel")
///     .with_session_separator("@")
///     .with_call_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.session_separator, "@");
/// ```
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Identity of this endpoint.
    ///
    /// Push adapters and the relay connect to a bus under this id, so for a
    /// per-session context it doubles as the session identifier the relay
    /// observes. Also used as the log label.
    pub endpoint_id: String,

    /// Separator between a base channel and a session id (`"math#42"`).
    pub session_separator: String,

    /// Name of the registry object the evaluation bridge calls into.
    pub bridge_global: String,

    /// Optional caller-side bound on every client call.
    ///
    /// `None` (the default) waits until a response arrives or the transport
    /// is disposed.
    pub call_timeout: Option<Duration>,
}

impl RpcConfig {
    /// Create a configuration with default separator, bridge name and no
    /// call timeout.
    pub fn new(endpoint_id: impl Into<String>) -> Self {
        // ---
        Self {
            endpoint_id: endpoint_id.into(),
            session_separator: DEFAULT_SESSION_SEPARATOR.to_owned(),
            bridge_global: DEFAULT_BRIDGE_GLOBAL.to_owned(),
            call_timeout: None,
        }
    }

    /// Set the separator the relay uses for session channels.
    pub fn with_session_separator(mut self, separator: impl Into<String>) -> Self {
        self.session_separator = separator.into();
        self
    }

    /// Set the registry name used by evaluation bridge expressions.
    pub fn with_bridge_global(mut self, global: impl Into<String>) -> Self {
        self.bridge_global = global.into();
        self
    }

    /// Bound every client call by `timeout`.
    ///
    /// A call that exceeds it fails with [`RpcError::Timeout`](crate::RpcError::Timeout)
    /// and its pending entry is discarded; a late response is then dropped.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::new("ctxrpc")
    }
}
