// src/domain/envelope.rs

//! Wire envelope.
//!
//! The envelope is the only thing placed on a transport. A request names a
//! channel, a method and positional arguments; a response echoes the
//! request's id and carries either a result or a [`Failure`].
//!
//! ```text
//! {"channel":"math","requestId":"…","kind":"request","method":"add","args":[…]}
//! {"channel":"math","requestId":"…","kind":"response","ok":true,"result":{…}}
//! {"channel":"math","requestId":"…","kind":"response","ok":false,"error":{"message":"boom"}}
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{Failure, RequestId, Value};

/// Name of a service contract.
///
/// Both sides know the channel at configuration time; it must match exactly
/// between a client and the server answering it. Cheap to clone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Channel(pub Arc<str>);

impl Channel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Channel {
    fn from(value: &str) -> Self {
        Channel(Arc::from(value))
    }
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        Channel(Arc::from(value))
    }
}

impl From<&String> for Channel {
    fn from(value: &String) -> Self {
        Channel(Arc::from(value.as_str()))
    }
}

impl From<Arc<str>> for Channel {
    fn from(value: Arc<str>) -> Self {
        Channel(value)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request/response message unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    // ---
    /// Channel the envelope belongs to.
    pub channel: Channel,

    /// Client-generated id, round-tripped unchanged by the server.
    pub request_id: RequestId,

    /// Request or response payload, tagged by `kind` on the wire.
    #[serde(flatten)]
    pub body: Body,
}

/// Envelope payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Body {
    // ---
    Request {
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Response(Reply),

    /// A request whose header decoded but whose payload did not. Produced
    /// by [`Envelope::from_wire`]; never written to the wire.
    #[serde(skip)]
    MalformedRequest {
        method: Option<String>,
        reason: String,
    },

    /// A response whose header decoded but whose payload did not.
    #[serde(skip)]
    MalformedResponse { reason: String },
}

/// The part of an envelope needed to answer or settle it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    channel: Channel,
    request_id: RequestId,
    kind: String,
    #[serde(default)]
    method: Option<Json>,
}

/// Outcome half of a response envelope.
///
/// `ok` decides which of `result` / `error` is meaningful. A missing result
/// on success reads as [`Value::Null`]; a missing error on failure is
/// reported as a malformed response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    // ---
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl Reply {
    // ---
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: Failure) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error),
        }
    }

    /// Collapse into the outcome the caller observes.
    pub fn into_outcome(self) -> std::result::Result<Value, Failure> {
        // ---
        if self.ok {
            Ok(self.result.unwrap_or_default())
        } else {
            Err(self
                .error
                .unwrap_or_else(|| Failure::new("malformed response: missing error description")))
        }
    }
}

impl From<std::result::Result<Value, Failure>> for Reply {
    fn from(outcome: std::result::Result<Value, Failure>) -> Self {
        // ---
        match outcome {
            Ok(value) => Reply::success(value),
            Err(failure) => Reply::failure(failure),
        }
    }
}

impl Envelope {
    // ---
    /// Create a request envelope.
    pub fn request(
        channel: Channel,
        request_id: RequestId,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        // ---
        Self {
            channel,
            request_id,
            body: Body::Request {
                method: method.into(),
                args,
            },
        }
    }

    /// Create a response envelope answering `request_id`.
    pub fn response(channel: Channel, request_id: RequestId, reply: Reply) -> Self {
        // ---
        Self {
            channel,
            request_id,
            body: Body::Response(reply),
        }
    }

    /// Decode an envelope from wire bytes.
    ///
    /// A payload with a readable `channel`, `requestId` and `kind` whose
    /// remainder does not decode becomes a `Malformed*` envelope, so the
    /// peer waiting on that id still gets an answer.
    ///
    /// # Errors
    ///
    /// Anything without a usable envelope header is not an envelope.
    pub fn from_wire(payload: &[u8]) -> serde_json::Result<Self> {
        // ---
        let err = match serde_json::from_slice::<Envelope>(payload) {
            Ok(env) => return Ok(env),
            Err(err) => err,
        };
        let Ok(header) = serde_json::from_slice::<Header>(payload) else {
            return Err(err);
        };

        let reason = err.to_string();
        let body = match header.kind.as_str() {
            "request" => Body::MalformedRequest {
                method: header.method.and_then(|m| m.as_str().map(str::to_owned)),
                reason,
            },
            "response" => Body::MalformedResponse { reason },
            _ => return Err(err),
        };

        Ok(Self {
            channel: header.channel,
            request_id: header.request_id,
            body,
        })
    }

    pub fn is_request(&self) -> bool {
        matches!(self.body, Body::Request { .. })
    }

    pub fn is_response(&self) -> bool {
        matches!(self.body, Body::Response(_))
    }

    /// Wire kind, as written in the `kind` field.
    pub fn kind(&self) -> &'static str {
        // ---
        match self.body {
            Body::Request { .. } | Body::MalformedRequest { .. } => "request",
            Body::Response(_) | Body::MalformedResponse { .. } => "response",
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        // ---
        let env = Envelope::request(
            Channel::from("math"),
            RequestId::from("r-1"),
            "add",
            vec![Value::Int(2), Value::Int(3)],
        );

        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(
            wire,
            json!({
                "channel": "math",
                "requestId": "r-1",
                "kind": "request",
                "method": "add",
                "args": [{"type": "int", "value": 2}, {"type": "int", "value": 3}],
            })
        );

        let back: Envelope = serde_json::from_value(wire).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn failure_response_omits_result() {
        // ---
        let env = Envelope::response(
            Channel::from("math"),
            RequestId::from("r-2"),
            Reply::failure(Failure::new("boom")),
        );

        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["kind"], "response");
        assert_eq!(wire["ok"], false);
        assert_eq!(wire["error"]["message"], "boom");
        assert!(wire.get("result").is_none());
    }

    #[test]
    fn request_without_args_defaults_to_empty() {
        // ---
        let env: Envelope = serde_json::from_value(json!({
            "channel": "math",
            "requestId": "r-3",
            "kind": "request",
            "method": "fail",
        }))
        .unwrap();

        assert_eq!(
            env.body,
            Body::Request {
                method: "fail".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn foreign_payloads_do_not_parse() {
        // ---
        let foreign = json!({"type": "STATE_UPDATE", "payload": {"count": 1}});
        assert!(serde_json::from_value::<Envelope>(foreign).is_err());

        let unknown_kind = json!({"channel": "x", "requestId": "1", "kind": "event"});
        assert!(serde_json::from_value::<Envelope>(unknown_kind).is_err());
    }

    #[test]
    fn untagged_args_keep_the_request_header() {
        // ---
        let wire =
            br#"{"channel":"math","requestId":"r-1","kind":"request","method":"add","args":[2,3]}"#;
        let env = Envelope::from_wire(wire).unwrap();

        assert_eq!(env.channel, Channel::from("math"));
        assert_eq!(env.request_id, RequestId::from("r-1"));
        assert!(!env.is_request());
        match env.body {
            Body::MalformedRequest { method, .. } => assert_eq!(method.as_deref(), Some("add")),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn from_wire_rejects_headerless_payloads() {
        // ---
        assert!(Envelope::from_wire(br#"{"type":"STATE_UPDATE"}"#).is_err());
        assert!(Envelope::from_wire(b"not json").is_err());
        assert!(Envelope::from_wire(br#"{"channel":"x","requestId":"1","kind":"event"}"#).is_err());

        let ok = br#"{"channel":"x","requestId":"1","kind":"response","ok":true}"#;
        assert!(Envelope::from_wire(ok).unwrap().is_response());

        let bad = br#"{"channel":"x","requestId":"1","kind":"response","ok":"yes"}"#;
        assert!(matches!(
            Envelope::from_wire(bad).unwrap().body,
            Body::MalformedResponse { .. }
        ));
    }

    #[test]
    fn reply_without_error_is_malformed() {
        // ---
        let reply = Reply {
            ok: false,
            result: None,
            error: None,
        };
        let failure = reply.into_outcome().unwrap_err();
        assert!(failure.message.starts_with("malformed response"));
    }

    #[test]
    fn success_without_result_is_null() {
        // ---
        let reply = Reply {
            ok: true,
            result: None,
            error: None,
        };
        assert_eq!(reply.into_outcome().unwrap(), Value::Null);
    }
}
