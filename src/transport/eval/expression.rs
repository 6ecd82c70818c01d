// src/transport/eval/expression.rs

//! Expression codec for the evaluation bridge.
//!
//! A call is written as `<global>.invoke(<frame>)` where `<frame>` is the
//! JSON encoding of a [`CallFrame`]. JSON is a subset of the expression
//! grammar of the evaluating side, so the frame can be embedded verbatim.
//! The evaluation result is the JSON form of a `Reply`.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{
    // ---
    Channel,
    Failure,
    Reply,
    RequestId,
    Result,
    RpcError,
    Value,
};

/// One call as seen by the evaluating context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    // ---
    pub channel: Channel,
    pub method: String,
    pub request_id: RequestId,
    #[serde(default)]
    pub args: Vec<Value>,
}

const INVOKE: &str = ".invoke(";

/// Render `frame` as an expression calling into `global`.
pub(crate) fn encode_call(global: &str, frame: &CallFrame) -> Result<String> {
    // ---
    let json = serde_json::to_string(frame)?;
    Ok(format!("{global}{INVOKE}{json})"))
}

/// Parse an expression produced by [`encode_call`].
///
/// # Errors
///
/// Returns `RpcError::Protocol` if the expression does not call `global`,
/// or `RpcError::Serialization` if the embedded frame is not valid.
pub(crate) fn decode_call(global: &str, expression: &str) -> Result<CallFrame> {
    // ---
    let body = expression
        .trim()
        .strip_prefix(global)
        .and_then(|rest| rest.strip_prefix(INVOKE))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| RpcError::Protocol(format!("not a {global}.invoke expression")))?;

    Ok(serde_json::from_str(body)?)
}

/// Interpret an evaluation result as a reply.
///
/// A result that does not have the reply shape becomes a failure; the caller
/// still gets exactly one outcome.
pub(crate) fn decode_reply(result: Json) -> Reply {
    // ---
    match serde_json::from_value::<Reply>(result) {
        Ok(reply) => reply,
        Err(e) => Reply::failure(Failure::new(format!("malformed bridge reply: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn frame() -> CallFrame {
        // ---
        CallFrame {
            channel: Channel::from("math"),
            method: "add".into(),
            request_id: RequestId::from("r-9"),
            args: vec![Value::Int(2), Value::Int(3)],
        }
    }

    #[test]
    fn expression_embeds_frame_as_json() {
        // ---
        let expression = encode_call("__ctxrpc", &frame()).unwrap();
        assert!(expression.starts_with("__ctxrpc.invoke({"));
        assert!(expression.ends_with("})"));
        assert!(expression.contains(r#""requestId":"r-9""#));

        assert_eq!(decode_call("__ctxrpc", &expression).unwrap(), frame());
    }

    #[test]
    fn foreign_expression_is_rejected() {
        // ---
        let err = decode_call("__ctxrpc", "window.location.reload()").unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));

        let err = decode_call("__ctxrpc", "__ctxrpc.invoke(42)").unwrap_err();
        assert!(matches!(err, RpcError::Serialization(_)));
    }

    #[test]
    fn reply_shapes() {
        // ---
        let ok = decode_reply(json!({"ok": true, "result": {"type": "int", "value": 5}}));
        assert_eq!(ok.into_outcome().unwrap(), Value::Int(5));

        let failed = decode_reply(json!({"ok": false, "error": {"message": "boom"}}));
        assert_eq!(failed.into_outcome().unwrap_err().message, "boom");

        let junk = decode_reply(json!("undefined"));
        assert!(junk
            .into_outcome()
            .unwrap_err()
            .message
            .starts_with("malformed bridge reply"));
    }
}
