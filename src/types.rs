use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Protocol version tag. Only "2.0" exists; deserialization of any other
/// tag fails, which is how structural validation rejects wrong versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[serde(rename = "2.0")]
    V2_0,
}

impl Default for JsonRpcVersion {
    fn default() -> Self {
        JsonRpcVersion::V2_0
    }
}

impl fmt::Display for JsonRpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("2.0")
    }
}

/// Correlation id for a request/response pair.
///
/// JSON-RPC 2.0 allows string, number, or null ids. A *null* id is still an
/// id (the protocol uses it for responses to unparseable requests); a request
/// with no id at all is a notification and is modeled as `Option<RequestId>`
/// being `None` on [`crate::JsonRpcRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl RequestId {
    /// Recover an id from an untrusted payload field. Anything that is not
    /// a string, integer, or null is not a valid id.
    pub fn from_value(value: &serde_json::Value) -> Option<RequestId> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => f.write_str(s),
            RequestId::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// Deserialize helper distinguishing an absent field from an explicit null.
///
/// Used together with `#[serde(default)]`: when the field is present its
/// value is deserialized as `T` (so JSON `null` becomes `RequestId::Null`
/// rather than `None`); when it is absent the default `None` applies.
pub(crate) fn some_if_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
