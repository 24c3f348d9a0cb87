use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HandlerError, JsonRpcErrorObject};
use crate::middleware::{DispatchResult, Middleware, Next};
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::{JsonRpcResponse, ResponsePayload};
use crate::types::RequestId;

/// Fallback message for handler failures that carry no message of their own.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// A method handler: receives the request's params and the opaque context,
/// returns a result value. The engine wraps the result into a response (or
/// discards it for notifications) and maps failures to error responses.
#[async_trait]
pub trait MethodHandler<C>: Send + Sync {
    async fn handle(
        &self,
        params: Option<RequestParams>,
        ctx: Option<C>,
    ) -> Result<Value, HandlerError>;
}

/// Lower-level handler variant: receives the full request and produces the
/// full response itself, or `None` to deliberately suppress one. An escape
/// hatch for methods that need to control their own response shape, not the
/// default.
#[async_trait]
pub trait RawMethodHandler<C>: Send + Sync {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: Option<C>,
    ) -> Result<Option<JsonRpcResponse>, HandlerError>;
}

/// Function adapter for [`MethodHandler`].
pub struct FnMethod<F>(pub F);

#[async_trait]
impl<C, F> MethodHandler<C> for FnMethod<F>
where
    C: Send + 'static,
    F: Fn(Option<RequestParams>, Option<C>) -> BoxFuture<'static, Result<Value, HandlerError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        params: Option<RequestParams>,
        ctx: Option<C>,
    ) -> Result<Value, HandlerError> {
        (self.0)(params, ctx).await
    }
}

/// Function adapter for [`RawMethodHandler`].
pub struct FnRawMethod<F>(pub F);

#[async_trait]
impl<C, F> RawMethodHandler<C> for FnRawMethod<F>
where
    C: Send + 'static,
    F: Fn(
            JsonRpcRequest,
            Option<C>,
        ) -> BoxFuture<'static, Result<Option<JsonRpcResponse>, HandlerError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: Option<C>,
    ) -> Result<Option<JsonRpcResponse>, HandlerError> {
        (self.0)(request, ctx).await
    }
}

/// Registry entry: the two handler shapes are an explicit tagged choice,
/// never inferred at call time.
enum RegisteredMethod<C> {
    Simple(Arc<dyn MethodHandler<C>>),
    Advanced(Arc<dyn RawMethodHandler<C>>),
}

impl<C> Clone for RegisteredMethod<C> {
    fn clone(&self) -> Self {
        match self {
            RegisteredMethod::Simple(handler) => RegisteredMethod::Simple(handler.clone()),
            RegisteredMethod::Advanced(handler) => RegisteredMethod::Advanced(handler.clone()),
        }
    }
}

/// Maps a handler/middleware failure for an id-bearing request to the error
/// response sent back. Replaceable via
/// [`JsonRpcServer::set_error_mapper`].
pub type ErrorMapper = Arc<dyn Fn(RequestId, HandlerError) -> JsonRpcResponse + Send + Sync>;

/// Observer for failures of notification handlers, which never produce a
/// visible response.
pub type NotificationErrorHook = Arc<dyn Fn(&str, &HandlerError) + Send + Sync>;

/// Server dispatch engine: a name→handler registry, an ordered middleware
/// chain, batch fan-out, and uniform mapping of handler results, failures,
/// and absence to responses.
pub struct JsonRpcServer<C = ()> {
    methods: RwLock<HashMap<String, RegisteredMethod<C>>>,
    middleware: Vec<Arc<dyn Middleware<C>>>,
    error_mapper: ErrorMapper,
    notification_error_hook: Option<NotificationErrorHook>,
}

impl<C> JsonRpcServer<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
            middleware: Vec::new(),
            error_mapper: Arc::new(default_error_mapper),
            notification_error_hook: None,
        }
    }

    /// Register a handler. The last registration for a name wins.
    pub fn add_method(&self, name: impl Into<String>, handler: impl MethodHandler<C> + 'static) {
        self.methods
            .write()
            .insert(name.into(), RegisteredMethod::Simple(Arc::new(handler)));
    }

    /// Register a raw handler (full request in, full response out).
    pub fn add_method_advanced(
        &self,
        name: impl Into<String>,
        handler: impl RawMethodHandler<C> + 'static,
    ) {
        self.methods
            .write()
            .insert(name.into(), RegisteredMethod::Advanced(Arc::new(handler)));
    }

    pub fn remove_method(&self, name: &str) {
        self.methods.write().remove(name);
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    pub fn registered_methods(&self) -> Vec<String> {
        self.methods.read().keys().cloned().collect()
    }

    /// Append an interceptor to the chain. Interceptors execute in the
    /// order they were applied.
    pub fn apply_middleware(&mut self, middleware: impl Middleware<C> + 'static) {
        self.middleware.push(Arc::new(middleware));
    }

    /// Replace the failure→error-response mapping.
    pub fn set_error_mapper(
        &mut self,
        mapper: impl Fn(RequestId, HandlerError) -> JsonRpcResponse + Send + Sync + 'static,
    ) {
        self.error_mapper = Arc::new(mapper);
    }

    /// Observe failures of notification handlers (default: a `tracing`
    /// warning).
    pub fn set_notification_error_hook(
        &mut self,
        hook: impl Fn(&str, &HandlerError) + Send + Sync + 'static,
    ) {
        self.notification_error_hook = Some(Arc::new(hook));
    }

    /// Inbound entry point. `payload` is a single request object or a batch
    /// array; the return mirrors what must go back on the wire: `None` when
    /// nothing is owed (all notifications), an unwrapped response for a
    /// single one, an array for two or more.
    pub async fn receive(&self, payload: Value, ctx: Option<C>) -> Option<ResponsePayload> {
        match payload {
            Value::Array(items) => {
                // Concurrent fan-out; join_all keeps input order, so batch
                // responses come back in request order.
                let results = join_all(
                    items
                        .into_iter()
                        .map(|item| self.receive_single(item, ctx.clone())),
                )
                .await;
                ResponsePayload::from_responses(results.into_iter().flatten().collect())
            }
            value => self
                .receive_single(value, ctx)
                .await
                .map(ResponsePayload::Single),
        }
    }

    /// Parse untrusted text, then [`receive`](Self::receive). Unparseable
    /// input yields a ParseError response with a null id; this entry point
    /// never panics on bad bytes.
    pub async fn receive_json(&self, text: &str, ctx: Option<C>) -> Option<ResponsePayload> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.receive(value, ctx).await,
            Err(error) => {
                debug!(%error, "unparseable inbound text");
                Some(ResponsePayload::Single(JsonRpcResponse::failure(
                    RequestId::Null,
                    JsonRpcErrorObject::parse_error(None),
                )))
            }
        }
    }

    async fn receive_single(&self, payload: Value, ctx: Option<C>) -> Option<JsonRpcResponse> {
        let request = match serde_json::from_value::<JsonRpcRequest>(payload.clone()) {
            Ok(request) => request,
            Err(error) => {
                debug!(%error, "structurally invalid request");
                // Recover the id when the payload carries a valid one, so
                // the caller can still correlate the rejection.
                let id = payload
                    .get("id")
                    .and_then(RequestId::from_value)
                    .unwrap_or(RequestId::Null);
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcErrorObject::invalid_request(None),
                ));
            }
        };

        let method = request.method.clone();
        match request.id.clone() {
            Some(id) => {
                debug!(%id, %method, "dispatching request");
                match self.run_chain(request, ctx).await {
                    Ok(Some(response)) => Some(response),
                    // A method that was looked up must answer a request
                    // that expects an answer.
                    Ok(None) => Some(JsonRpcResponse::failure(
                        id,
                        JsonRpcErrorObject::internal_error(None),
                    )),
                    Err(error) => Some((self.error_mapper)(id, error)),
                }
            }
            None => {
                debug!(%method, "dispatching notification");
                if let Err(error) = self.run_chain(request, ctx).await {
                    match &self.notification_error_hook {
                        Some(hook) => hook(&method, &error),
                        None => warn!(%method, %error, "notification handler failed"),
                    }
                }
                None
            }
        }
    }

    async fn run_chain(&self, request: JsonRpcRequest, ctx: Option<C>) -> DispatchResult {
        let next = Next {
            chain: self.middleware.as_slice(),
            server: self,
        };
        next.run(request, ctx).await
    }

    /// Terminal step of the middleware chain: registry lookup and handler
    /// invocation.
    pub(crate) async fn invoke_method(
        &self,
        request: JsonRpcRequest,
        ctx: Option<C>,
    ) -> DispatchResult {
        let entry = self.methods.read().get(&request.method).cloned();
        match entry {
            None => match request.id {
                Some(id) => Ok(Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcErrorObject::method_not_found(),
                ))),
                None => {
                    // Unknown notifications are ignored by design.
                    debug!(method = %request.method, "no handler for notification");
                    Ok(None)
                }
            },
            Some(RegisteredMethod::Simple(handler)) => {
                let id = request.id;
                let result = handler.handle(request.params, ctx).await?;
                Ok(id.map(|id| JsonRpcResponse::success(id, result)))
            }
            Some(RegisteredMethod::Advanced(handler)) => handler.handle(request, ctx).await,
        }
    }
}

impl<C> Default for JsonRpcServer<C>
where
    C: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn default_error_mapper(id: RequestId, error: HandlerError) -> JsonRpcResponse {
    let HandlerError {
        code,
        message,
        data,
    } = error;
    let message = if message.is_empty() {
        UNEXPECTED_ERROR_MESSAGE.to_string()
    } else {
        message
    };
    JsonRpcResponse::failure(id, JsonRpcErrorObject { code, message, data })
}
