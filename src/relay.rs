// src/relay.rs

//! Session relay.
//!
//! The relay joins two buses: a *session bus*, where each inspected context
//! is connected under its own context id, and an *inspector bus*, where the
//! consumers of those sessions live. It lets N independent client/server
//! pairs share one physical link by rewriting channel names:
//!
//! ```text
//! session "tab-7" sends   {"channel":"math", ...}
//! inspector side sees     {"channel":"math#tab-7", ...}
//!
//! inspector side sends    {"channel":"math#tab-7", ...}
//! only "tab-7" receives   {"channel":"math", ...}
//! ```
//!
//! The session id is always the origin the bus attaches to a message, never
//! something the payload claims, so a message from session A can only ever
//! surface under `…#A`.
//!
//! Session ids must not contain the separator. Downward routing splits at
//! the last separator, so such an id could never be addressed and its
//! traffic would be answered in some other session's name. The relay drops
//! everything such a context sends.
//!
//! Payloads without a string `channel` field are forwarded untouched. The
//! relay does no correlation, buffering or retry; a message lost here is a
//! response that never arrives.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::Value as Json;
use tokio::task::JoinHandle;

use crate::sync::lock_ignore_poison;
use crate::transport::{Bus, BusInbox, BusMessage, BusPort, ContextId};
use crate::{
    // ---
    log_debug,
    log_info,
    log_trace,
    log_warn,
    Channel,
    RpcConfig,
};

/// Channel name a session's traffic carries on the inspector side.
///
/// `session` must not contain `separator`; [`split_session_channel`] would
/// route the result to a different session.
pub fn session_channel(channel: &str, separator: &str, session: &ContextId) -> Channel {
    Channel::from(format!("{channel}{separator}{session}"))
}

/// Split `"math#tab-7"` into `("math", "tab-7")`.
///
/// Splits at the last separator, so base channels may themselves contain it.
/// Returns `None` when there is no separator or either side is empty.
pub fn split_session_channel<'a>(channel: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    // ---
    if separator.is_empty() {
        return None;
    }
    channel
        .rsplit_once(separator)
        .filter(|(base, session)| !base.is_empty() && !session.is_empty())
}

/// Rewrite the `channel` field of a JSON object payload.
///
/// Returns `None` (forward untouched) for anything that is not a JSON object
/// with a string `channel`, or when `rewrite` declines.
fn rewrite_channel<T>(
    payload: &[u8],
    rewrite: impl FnOnce(&str) -> Option<(String, T)>,
) -> Option<(Bytes, T)> {
    // ---
    let mut json: Json = serde_json::from_slice(payload).ok()?;
    let channel = json.as_object_mut()?.get_mut("channel")?;
    let (rewritten, extra) = rewrite(channel.as_str()?)?;
    *channel = Json::String(rewritten);

    let bytes = serde_json::to_vec(&json).ok()?;
    Some((Bytes::from(bytes), extra))
}

fn forward_up(inspector: &BusPort, separator: &str, message: BusMessage) {
    // ---
    let origin = message.origin;
    if !separator.is_empty() && origin.as_str().contains(separator) {
        log_warn!("relay: dropping message from {origin}: session id contains {separator:?}");
        return;
    }

    let rewritten = rewrite_channel(&message.payload, |channel| {
        Some((session_channel(channel, separator, &origin).to_string(), ()))
    });

    let payload = match rewritten {
        Some((payload, ())) => payload,
        None => {
            log_trace!("relay: forwarding opaque message from {origin}");
            message.payload
        }
    };
    inspector.post(payload);
}

fn forward_down(sessions: &BusPort, separator: &str, message: BusMessage) {
    // ---
    let rewritten = rewrite_channel(&message.payload, |channel| {
        let (base, session) = split_session_channel(channel, separator)?;
        Some((base.to_owned(), ContextId::from(session)))
    });

    match rewritten {
        Some((payload, session)) => {
            if sessions.post_to(&session, payload) == 0 {
                log_debug!("relay: session {session} is not connected");
            }
        }
        None => {
            log_trace!("relay: broadcasting unscoped message from {}", message.origin);
            sessions.post(message.payload);
        }
    }
}

async fn run(
    session_port: BusPort,
    mut session_inbox: BusInbox,
    inspector_port: BusPort,
    mut inspector_inbox: BusInbox,
    separator: String,
) {
    // ---
    loop {
        tokio::select! {
            message = session_inbox.recv() => match message {
                Some(message) => forward_up(&inspector_port, &separator, message),
                None => break,
            },
            message = inspector_inbox.recv() => match message {
                Some(message) => forward_down(&session_port, &separator, message),
                None => break,
            },
        }
    }
    log_debug!("relay: bus closed, stopping");
}

/// Running relay between a session bus and an inspector bus.
pub struct Relay {
    // ---
    endpoint_id: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Relay {
    /// Connect to both buses as `config.endpoint_id` and start forwarding.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(session_bus: &Arc<Bus>, inspector_bus: &Arc<Bus>, config: &RpcConfig) -> Self {
        // ---
        let (session_port, session_inbox) = session_bus.connect(config.endpoint_id.as_str());
        let (inspector_port, inspector_inbox) = inspector_bus.connect(config.endpoint_id.as_str());

        let task = tokio::spawn(run(
            session_port,
            session_inbox,
            inspector_port,
            inspector_inbox,
            config.session_separator.clone(),
        ));
        log_info!(
            "relay {} started (separator {:?})",
            config.endpoint_id,
            config.session_separator
        );

        Self {
            endpoint_id: config.endpoint_id.clone(),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn is_running(&self) -> bool {
        // ---
        let task = lock_ignore_poison(&self.task);
        task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop forwarding and disconnect from both buses. Idempotent.
    pub fn stop(&self) {
        // ---
        let task = lock_ignore_poison(&self.task).take();
        if let Some(task) = task {
            task.abort();
            log_info!("relay {} stopped", self.endpoint_id);
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.stop();
    }
}
