// src/transport/eval/host.rs

//! Service registry living in the evaluated context.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value as Json;

use super::bridge::Evaluator;
use super::expression::{decode_call, CallFrame};
use crate::sync::{read_ignore_poison, write_ignore_poison};
use crate::{
    // ---
    log_debug,
    log_warn,
    Channel,
    Failure,
    Reply,
    Result,
    RpcConfig,
    RpcError,
    Service,
};

/// Registry object the bridge expressions call into.
///
/// Services registered here answer calls arriving as
/// `<global>.invoke(<frame>)`. One service per channel.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ctxrpc::{BridgeHost, EvalBridgeTransport, FnService, RpcClient, RpcConfig, Value};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ctxrpc::Result<()> {
/// let config = RpcConfig::new("devtools");
/// let host = BridgeHost::new(&config);
/// let math = FnService::new("math").method("add", |(a, b): (i64, i64)| async move { Ok(a + b) });
/// host.register(math)?;
///
/// let client = RpcClient::new(EvalBridgeTransport::create(host, &config), "math").await?;
/// let sum = client.call("add", vec![Value::Int(2), Value::Int(3)]).await?;
/// assert_eq!(sum, Value::Int(5));
/// # Ok(())
/// # }
/// ```
pub struct BridgeHost {
    // ---
    global: String,
    services: RwLock<HashMap<Channel, Arc<dyn Service>>>,
}

impl BridgeHost {
    pub fn new(config: &RpcConfig) -> Arc<Self> {
        // ---
        Arc::new(Self {
            global: config.bridge_global.clone(),
            services: RwLock::new(HashMap::new()),
        })
    }

    /// Register `service` under its channel.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::DuplicateServer` if the channel is already taken.
    pub fn register<S>(&self, service: S) -> Result<()>
    where
        S: Service,
    {
        self.register_shared(Arc::new(service))
    }

    /// [`register`](Self::register) for a service that is already shared.
    pub fn register_shared(&self, service: Arc<dyn Service>) -> Result<()> {
        // ---
        let channel = service.channel();
        let mut services = write_ignore_poison(&self.services);

        if services.contains_key(&channel) {
            log_warn!("{}: second registration for channel {channel}", self.global);
            return Err(RpcError::DuplicateServer(channel.to_string()));
        }

        log_debug!("{}: registered channel {channel}", self.global);
        services.insert(channel, service);
        Ok(())
    }

    /// Remove the service for `channel`. Returns whether one was registered.
    pub fn unregister(&self, channel: &Channel) -> bool {
        // ---
        let mut services = write_ignore_poison(&self.services);
        services.remove(channel).is_some()
    }

    fn lookup(&self, channel: &Channel) -> Option<Arc<dyn Service>> {
        // ---
        let services = read_ignore_poison(&self.services);
        services.get(channel).cloned()
    }

    /// Run one call frame to completion.
    ///
    /// Always produces a reply; an unknown channel is a failed one.
    pub async fn invoke(&self, frame: CallFrame) -> Reply {
        // ---
        let Some(service) = self.lookup(&frame.channel) else {
            log_warn!("{}: no service for channel {}", self.global, frame.channel);
            return Reply::failure(Failure::new(format!(
                "no service registered for channel {}",
                frame.channel
            )));
        };

        Reply::from(crate::server::invoke(service.as_ref(), &frame.method, frame.args).await)
    }
}

#[async_trait::async_trait]
impl Evaluator for BridgeHost {
    async fn evaluate(&self, expression: &str) -> Result<Json> {
        // ---
        let frame = decode_call(&self.global, expression)?;
        let reply = self.invoke(frame).await;
        Ok(serde_json::to_value(reply)?)
    }
}
