use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JsonRpcErrorObject;
use crate::types::{JsonRpcVersion, RequestId, some_if_present};

/// A JSON-RPC response.
///
/// The constructors only ever build the valid shapes (exactly one of
/// `result`/`error` present), but the struct deliberately keeps both fields
/// optional so that untrusted input carrying both or neither can still be
/// *parsed* and then classified as [`ResponseOutcome::Malformed`] instead of
/// failing the receive path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Classify the response for settlement.
    pub fn into_outcome(self) -> ResponseOutcome {
        match (self.result, self.error) {
            (Some(result), None) => ResponseOutcome::Success(result),
            (None, Some(error)) => ResponseOutcome::Failure(error),
            _ => ResponseOutcome::Malformed,
        }
    }
}

/// What a response settles its caller with.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(Value),
    Failure(JsonRpcErrorObject),
    /// Both or neither of `result`/`error` were present.
    Malformed,
}

/// One or many responses, mirroring the wire shape (a lone object vs a
/// top-level array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

impl ResponsePayload {
    /// Collapse a batch of dispatch results: zero responses mean no message
    /// at all, exactly one is sent unwrapped, two or more stay an array.
    pub fn from_responses(mut responses: Vec<JsonRpcResponse>) -> Option<Self> {
        match responses.len() {
            0 => None,
            1 => Some(ResponsePayload::Single(responses.remove(0))),
            _ => Some(ResponsePayload::Batch(responses)),
        }
    }

    pub fn into_vec(self) -> Vec<JsonRpcResponse> {
        match self {
            ResponsePayload::Single(response) => vec![response],
            ResponsePayload::Batch(responses) => responses,
        }
    }
}

/// Structural response predicate over an untrusted payload: version tag
/// matches, `id` is present, and exactly one of `result`/`error` is present.
pub fn is_response(payload: &Value) -> bool {
    let Some(object) = payload.as_object() else {
        return false;
    };
    object.get("jsonrpc").and_then(Value::as_str) == Some(crate::JSONRPC_VERSION)
        && object.contains_key("id")
        && (object.contains_key("result") != object.contains_key("error"))
}
