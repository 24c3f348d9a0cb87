//! # JSON-RPC 2.0 Correlation & Dispatch Engine
//!
//! A pure, transport-agnostic implementation of the JSON-RPC 2.0
//! request/notification machinery: a client correlation engine, a server
//! dispatch engine, and a duplex bridge composing the two over one
//! full-duplex channel.
//!
//! The engine depends only on an injected send operation
//! ([`TransportSink`]) and inbound entry points the host transport calls
//! when messages arrive. Sockets, HTTP, queues, and byte-level framing all
//! live outside.
//!
//! ## Features
//! - Full JSON-RPC 2.0 message model: requests, notifications, success and
//!   error responses, batches
//! - O(1) id correlation with exactly-once settlement, bulk rejection, and
//!   per-call timeouts
//! - Method registry with simple `(params, ctx)` handlers and an advanced
//!   full-request escape hatch
//! - Ordered middleware chain with explicit continuation passing
//! - Uniform error mapping: protocol failures come back as error responses,
//!   never as engine panics

pub mod client;
pub mod duplex;
pub mod error;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod types;

// Re-export main types
pub use client::{
    JsonRpcClient, REQUEST_TIMEOUT_MESSAGE, SEND_FAILURE_MESSAGE, TimeoutClient,
    TimeoutErrorFactory, TransportSink,
};
pub use duplex::JsonRpcDuplex;
pub use error::{
    ClientError, DuplexError, HandlerError, JsonRpcErrorCode, JsonRpcErrorObject, TransportError,
};
pub use middleware::{DispatchResult, Middleware, Next};
pub use request::{JsonRpcRequest, RequestParams, is_request};
pub use response::{JsonRpcResponse, ResponseOutcome, ResponsePayload, is_response};
pub use server::{
    ErrorMapper, FnMethod, FnRawMethod, JsonRpcServer, MethodHandler, NotificationErrorHook,
    RawMethodHandler, UNEXPECTED_ERROR_MESSAGE,
};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}
