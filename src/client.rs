use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ClientError, JsonRpcErrorObject, TransportError};
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::{JsonRpcResponse, ResponseOutcome};
use crate::types::RequestId;

/// Message used for locally synthesized responses when the send collaborator
/// fails without a message of its own.
pub const SEND_FAILURE_MESSAGE: &str = "Failed to send a request";

/// Message used for locally synthesized timeout responses.
pub const REQUEST_TIMEOUT_MESSAGE: &str = "Request timeout";

/// The injected send collaborator: delivers one wire-shaped message to the
/// remote side. The engine never retries. A failure here is surfaced as a
/// synthesized error response for every id the message carried.
#[async_trait]
pub trait TransportSink<C>: Send + Sync {
    async fn send(&self, message: Value, ctx: Option<C>) -> Result<(), TransportError>;
}

#[async_trait]
impl<C, F> TransportSink<C> for F
where
    C: Send + 'static,
    F: Fn(Value, Option<C>) -> BoxFuture<'static, Result<(), TransportError>> + Send + Sync,
{
    async fn send(&self, message: Value, ctx: Option<C>) -> Result<(), TransportError> {
        (self)(message, ctx).await
    }
}

/// Client correlation engine: allocates ids, tracks one outstanding resolver
/// per id, and turns raw responses back into settled calls.
///
/// All state is per-instance; share one engine across tasks behind an `Arc`.
pub struct JsonRpcClient<C = ()> {
    sink: Arc<dyn TransportSink<C>>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    next_id: Box<dyn Fn() -> RequestId + Send + Sync>,
}

impl<C> JsonRpcClient<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(sink: impl TransportSink<C> + 'static) -> Self {
        let counter = AtomicI64::new(1);
        Self {
            sink: Arc::new(sink),
            pending: Mutex::new(HashMap::new()),
            next_id: Box::new(move || RequestId::Number(counter.fetch_add(1, Ordering::Relaxed))),
        }
    }

    /// Replace the monotonic id counter, e.g. to interoperate with
    /// externally visible ids. Two requests outstanding at the same time
    /// must never receive the same id.
    pub fn with_id_generator(
        mut self,
        generator: impl Fn() -> RequestId + Send + Sync + 'static,
    ) -> Self {
        self.next_id = Box::new(generator);
        self
    }

    pub fn next_request_id(&self) -> RequestId {
        (self.next_id)()
    }

    /// Call a method and wait for its result.
    ///
    /// Error responses, transport failures, and bulk rejections all settle
    /// the call through the same channel and surface as
    /// [`ClientError::Response`].
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
        ctx: Option<C>,
    ) -> Result<Value, ClientError> {
        let id = self.next_request_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let wire = serde_json::to_value(&request)?;
        let mut responses = self.send_and_collect(wire, vec![id.clone()], ctx).await?;
        let response = responses.pop().ok_or(ClientError::Dropped { id })?;
        Self::settle(response)
    }

    /// Raw-message variant of [`request`](Self::request): the caller builds
    /// the request (and picks its id) and receives the full response.
    /// Returns `None` when the request was a notification.
    pub async fn request_raw(
        &self,
        request: JsonRpcRequest,
        ctx: Option<C>,
    ) -> Result<Option<JsonRpcResponse>, ClientError> {
        let wire = serde_json::to_value(&request)?;
        let ids: Vec<RequestId> = request.id.into_iter().collect();
        let mut responses = self.send_and_collect(wire, ids, ctx).await?;
        Ok(responses.pop())
    }

    /// Send a batch in one transport delivery. Notifications mixed into the
    /// batch are not registered for correlation; the call resolves once
    /// every id-bearing entry has a matching response, in input order.
    pub async fn request_raw_batch(
        &self,
        requests: Vec<JsonRpcRequest>,
        ctx: Option<C>,
    ) -> Result<Vec<JsonRpcResponse>, ClientError> {
        let wire = serde_json::to_value(&requests)?;
        let ids: Vec<RequestId> = requests.into_iter().filter_map(|r| r.id).collect();
        self.send_and_collect(wire, ids, ctx).await
    }

    /// Fire-and-forget notification. Send failures are swallowed: there is
    /// no pending record to fail.
    pub async fn notify(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
        ctx: Option<C>,
    ) {
        let notification = JsonRpcRequest::notification(method, params);
        let Ok(wire) = serde_json::to_value(&notification) else {
            return;
        };
        if let Err(error) = self.sink.send(wire, ctx).await {
            debug!(method = %notification.method, %error, "notification send failed");
        }
    }

    /// Inbound entry point: settle the pending call matching this
    /// response's id. Late, duplicate, or unknown responses are a no-op.
    pub fn receive(&self, response: JsonRpcResponse) {
        let resolver = self.pending.lock().remove(&response.id);
        match resolver {
            Some(resolver) => {
                // The record is already removed, so a racing settlement for
                // the same id finds nothing: exactly-once.
                let _ = resolver.send(response);
            }
            None => debug!(id = %response.id, "no pending request for response"),
        }
    }

    pub fn receive_batch(&self, responses: Vec<JsonRpcResponse>) {
        for response in responses {
            self.receive(response);
        }
    }

    /// Settle every pending call with a synthesized error response carrying
    /// `message`. Used when the underlying channel is permanently gone.
    pub fn reject_all_pending_requests(&self, message: &str) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        for (id, resolver) in drained {
            let response =
                JsonRpcResponse::failure(id, JsonRpcErrorObject::application(0, message, None));
            let _ = resolver.send(response);
        }
    }

    /// Push a message straight through the send collaborator without any
    /// correlation bookkeeping. The duplex bridge uses this to return
    /// server-produced responses.
    pub async fn send_raw(&self, message: Value, ctx: Option<C>) -> Result<(), TransportError> {
        self.sink.send(message, ctx).await
    }

    /// Decorate the engine with a per-call deadline. The decorator shares
    /// this engine's pending map, so its calls and undecorated calls can be
    /// mixed freely.
    pub fn with_timeout(&self, delay: Duration) -> TimeoutClient<'_, C> {
        TimeoutClient {
            client: self,
            delay,
            error_factory: None,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn settle(response: JsonRpcResponse) -> Result<Value, ClientError> {
        let id = response.id.clone();
        match response.into_outcome() {
            ResponseOutcome::Success(result) => Ok(result),
            ResponseOutcome::Failure(error) => Err(ClientError::from_error_object(error)),
            ResponseOutcome::Malformed => Err(ClientError::UnexpectedShape { id }),
        }
    }

    /// Register resolvers for `ids`, deliver `wire`, then wait for every id
    /// to be settled. A send failure synthesizes a local error response per
    /// id and feeds it back through the normal receive path, unifying
    /// transport failures and protocol failures into one channel.
    async fn send_and_collect(
        &self,
        wire: Value,
        ids: Vec<RequestId>,
        ctx: Option<C>,
    ) -> Result<Vec<JsonRpcResponse>, ClientError> {
        let mut receivers = Vec::with_capacity(ids.len());
        {
            let mut pending = self.pending.lock();
            for id in &ids {
                let (resolver, receiver) = oneshot::channel();
                // Last registration wins; a displaced record's caller
                // observes `ClientError::Dropped`.
                pending.insert(id.clone(), resolver);
                receivers.push((id.clone(), receiver));
            }
        }

        if let Err(error) = self.sink.send(wire, ctx).await {
            let message = match error.to_string() {
                message if message.is_empty() => SEND_FAILURE_MESSAGE.to_string(),
                message => message,
            };
            debug!(%error, "send failed, synthesizing error responses");
            for id in &ids {
                self.receive(JsonRpcResponse::failure(
                    id.clone(),
                    JsonRpcErrorObject::application(0, message.clone(), None),
                ));
            }
        }

        let mut responses = Vec::with_capacity(receivers.len());
        for (id, receiver) in receivers {
            match receiver.await {
                Ok(response) => responses.push(response),
                Err(_) => return Err(ClientError::Dropped { id }),
            }
        }
        Ok(responses)
    }
}

/// Factory for the error object used to settle a timed-out call.
pub type TimeoutErrorFactory = Arc<dyn Fn(&RequestId) -> JsonRpcErrorObject + Send + Sync>;

/// A [`JsonRpcClient`] decorated with a per-call deadline.
///
/// Each call races the real settlement against a timer scoped to the call's
/// own ids; unrelated in-flight calls are unaffected. A real response
/// arriving first removes the pending record, so the elapsing timer finds
/// nothing to settle.
pub struct TimeoutClient<'a, C> {
    client: &'a JsonRpcClient<C>,
    delay: Duration,
    error_factory: Option<TimeoutErrorFactory>,
}

impl<'a, C> TimeoutClient<'a, C>
where
    C: Send + Sync + 'static,
{
    pub fn with_error_factory(
        mut self,
        factory: impl Fn(&RequestId) -> JsonRpcErrorObject + Send + Sync + 'static,
    ) -> Self {
        self.error_factory = Some(Arc::new(factory));
        self
    }

    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
        ctx: Option<C>,
    ) -> Result<Value, ClientError> {
        let id = self.client.next_request_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let wire = serde_json::to_value(&request)?;
        let mut responses = self.send_with_deadline(wire, vec![id.clone()], ctx).await?;
        let response = responses.pop().ok_or(ClientError::Dropped { id })?;
        JsonRpcClient::<C>::settle(response)
    }

    pub async fn request_raw(
        &self,
        request: JsonRpcRequest,
        ctx: Option<C>,
    ) -> Result<Option<JsonRpcResponse>, ClientError> {
        let wire = serde_json::to_value(&request)?;
        let ids: Vec<RequestId> = request.id.into_iter().collect();
        let mut responses = self.send_with_deadline(wire, ids, ctx).await?;
        Ok(responses.pop())
    }

    pub async fn request_raw_batch(
        &self,
        requests: Vec<JsonRpcRequest>,
        ctx: Option<C>,
    ) -> Result<Vec<JsonRpcResponse>, ClientError> {
        let wire = serde_json::to_value(&requests)?;
        let ids: Vec<RequestId> = requests.into_iter().filter_map(|r| r.id).collect();
        self.send_with_deadline(wire, ids, ctx).await
    }

    fn timeout_response(&self, id: &RequestId) -> JsonRpcResponse {
        let error = match &self.error_factory {
            Some(factory) => factory(id),
            None => JsonRpcErrorObject::application(0, REQUEST_TIMEOUT_MESSAGE, None),
        };
        JsonRpcResponse::failure(id.clone(), error)
    }

    async fn send_with_deadline(
        &self,
        wire: Value,
        ids: Vec<RequestId>,
        ctx: Option<C>,
    ) -> Result<Vec<JsonRpcResponse>, ClientError> {
        let call = self.client.send_and_collect(wire, ids.clone(), ctx);
        tokio::pin!(call);
        tokio::select! {
            result = &mut call => result,
            _ = tokio::time::sleep(self.delay) => {
                // Settle only what is still pending; ids that already got a
                // real response were removed from the map and are untouched.
                for id in &ids {
                    self.client.receive(self.timeout_response(id));
                }
                call.await
            }
        }
    }
}
