use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::RequestId;

/// JSON-RPC error codes: the five reserved codes plus the open
/// application-defined space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Any non-reserved code; applications default to 0 when they do not
    /// pick one.
    Application(i64),
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => -32700,
            JsonRpcErrorCode::InvalidRequest => -32600,
            JsonRpcErrorCode::MethodNotFound => -32601,
            JsonRpcErrorCode::InvalidParams => -32602,
            JsonRpcErrorCode::InternalError => -32603,
            JsonRpcErrorCode::Application(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
            JsonRpcErrorCode::Application(_) => "Application error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// JSON-RPC error object as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    /// Application-level error with an explicit code (0 by convention when
    /// the caller has nothing more specific).
    pub fn application(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn parse_error(data: Option<Value>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, None, data)
    }

    pub fn invalid_request(data: Option<Value>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, None, data)
    }

    pub fn method_not_found() -> Self {
        Self::new(JsonRpcErrorCode::MethodNotFound, None, None)
    }

    pub fn invalid_params(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidParams, message, None)
    }

    pub fn internal_error(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message, None)
    }
}

impl fmt::Display for JsonRpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// Failure carried out of a method handler or middleware.
///
/// Dispatch converts this to an error response via the server's error
/// mapper; the default mapper keeps `code` and `data` as-is and falls back
/// to a generic message when `message` is empty.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn into_error_object(self) -> JsonRpcErrorObject {
        JsonRpcErrorObject {
            code: self.code,
            message: self.message,
            data: self.data,
        }
    }
}

impl From<JsonRpcErrorObject> for HandlerError {
    fn from(error: JsonRpcErrorObject) -> Self {
        Self {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// Handlers that decode their params with serde can use `?` directly;
/// malformed params map to the reserved InvalidParams code.
impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self {
            code: JsonRpcErrorCode::InvalidParams.code(),
            message: error.to_string(),
            data: None,
        }
    }
}

/// Failure of the injected send collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the client correlation engine.
///
/// Protocol failures arrive as *resolved error responses* and are mapped to
/// `Response`; the engine itself only fails a call outright when it cannot
/// even encode the outgoing message or when a pending record is dropped
/// without ever being settled.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server (or a locally synthesized response, e.g. transport
    /// failure, timeout, bulk rejection) answered with an error object.
    #[error("server error (code {code}): {message}")]
    Response {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The response carried both or neither of `result`/`error`.
    #[error("unexpected response shape for request {id}")]
    UnexpectedShape { id: RequestId },

    /// The pending record was dropped without a settlement. Happens only if
    /// a second outstanding request reuses the same id.
    #[error("request {id} was dropped before a response arrived")]
    Dropped { id: RequestId },

    #[error("failed to encode outgoing message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) fn from_error_object(error: JsonRpcErrorObject) -> Self {
        ClientError::Response {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }

    /// The error code, when this is an error-response failure.
    pub fn code(&self) -> Option<i64> {
        match self {
            ClientError::Response { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors surfaced by the duplex bridge entry point.
#[derive(Debug, Error)]
pub enum DuplexError {
    /// The payload is structurally neither a request nor a response.
    #[error("message is neither a JSON-RPC request nor a response")]
    InvalidMessage,

    /// Pushing a server-produced response back out failed.
    #[error("failed to send response: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
