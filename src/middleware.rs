use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::HandlerError;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;
use crate::server::JsonRpcServer;

/// Outcome of one dispatch step: a response, no response (notification or
/// deliberate suppression), or a failure to be mapped to an error response.
pub type DispatchResult = Result<Option<JsonRpcResponse>, HandlerError>;

/// An interceptor in the server's dispatch chain.
///
/// Interceptors run in the order they were applied. Each one receives the
/// request, the opaque context, and a [`Next`] continuation; calling
/// `next.run(...)` (possibly with a modified request or context) continues
/// the chain, and not calling it short-circuits with the interceptor's own
/// result. A failure returned here is mapped to an error response exactly
/// like an unguarded handler failure; an earlier interceptor can override
/// that by catching the failure before it propagates.
#[async_trait]
pub trait Middleware<C>: Send + Sync {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: Option<C>,
        next: Next<'_, C>,
    ) -> DispatchResult;
}

/// Continuation handed to a [`Middleware`]: the rest of the chain followed
/// by the terminal registry lookup and handler invocation.
pub struct Next<'a, C> {
    pub(crate) chain: &'a [Arc<dyn Middleware<C>>],
    pub(crate) server: &'a JsonRpcServer<C>,
}

impl<'a, C> Next<'a, C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn run(self, request: JsonRpcRequest, ctx: Option<C>) -> BoxFuture<'a, DispatchResult> {
        async move {
            match self.chain.split_first() {
                Some((head, rest)) => {
                    head.handle(
                        request,
                        ctx,
                        Next {
                            chain: rest,
                            server: self.server,
                        },
                    )
                    .await
                }
                None => self.server.invoke_method(request, ctx).await,
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JsonRpcErrorObject;
    use crate::request::RequestParams;
    use crate::server::MethodHandler;
    use crate::types::RequestId;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    struct RecordingMiddleware {
        id: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware<()> for RecordingMiddleware {
        async fn handle(
            &self,
            request: JsonRpcRequest,
            ctx: Option<()>,
            next: Next<'_, ()>,
        ) -> DispatchResult {
            self.log.lock().push(format!("enter_{}", self.id));
            let result = next.run(request, ctx).await;
            self.log.lock().push(format!("leave_{}", self.id));
            result
        }
    }

    struct ShortCircuitMiddleware;

    #[async_trait]
    impl Middleware<()> for ShortCircuitMiddleware {
        async fn handle(
            &self,
            request: JsonRpcRequest,
            _ctx: Option<()>,
            _next: Next<'_, ()>,
        ) -> DispatchResult {
            let id = request.id.unwrap_or(RequestId::Null);
            Ok(Some(JsonRpcResponse::success(id, json!("intercepted"))))
        }
    }

    struct RewritingMiddleware;

    #[async_trait]
    impl Middleware<()> for RewritingMiddleware {
        async fn handle(
            &self,
            mut request: JsonRpcRequest,
            ctx: Option<()>,
            next: Next<'_, ()>,
        ) -> DispatchResult {
            request.method = "actual".to_string();
            next.run(request, ctx).await
        }
    }

    struct CatchingMiddleware;

    #[async_trait]
    impl Middleware<()> for CatchingMiddleware {
        async fn handle(
            &self,
            request: JsonRpcRequest,
            ctx: Option<()>,
            next: Next<'_, ()>,
        ) -> DispatchResult {
            let id = request.id.clone().unwrap_or(RequestId::Null);
            match next.run(request, ctx).await {
                Err(error) => Ok(Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcErrorObject::application(-9, format!("caught: {error}"), None),
                ))),
                other => other,
            }
        }
    }

    struct ConstHandler(Value);

    #[async_trait]
    impl MethodHandler<()> for ConstHandler {
        async fn handle(
            &self,
            _params: Option<RequestParams>,
            _ctx: Option<()>,
        ) -> Result<Value, HandlerError> {
            Ok(self.0.clone())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl MethodHandler<()> for FailingHandler {
        async fn handle(
            &self,
            _params: Option<RequestParams>,
            _ctx: Option<()>,
        ) -> Result<Value, HandlerError> {
            Err(HandlerError::new("handler blew up"))
        }
    }

    fn request(method: &str) -> serde_json::Value {
        json!({"jsonrpc": "2.0", "id": 1, "method": method})
    }

    #[tokio::test]
    async fn test_middleware_runs_in_application_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut server = JsonRpcServer::new();
        server.add_method("m", ConstHandler(json!(1)));
        server.apply_middleware(RecordingMiddleware {
            id: "first",
            log: log.clone(),
        });
        server.apply_middleware(RecordingMiddleware {
            id: "second",
            log: log.clone(),
        });

        server.receive(request("m"), None).await.unwrap();

        let log = log.lock();
        assert_eq!(
            *log,
            vec!["enter_first", "enter_second", "leave_second", "leave_first"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler_and_later_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut server = JsonRpcServer::new();
        server.add_method("m", ConstHandler(json!("from handler")));
        server.apply_middleware(ShortCircuitMiddleware);
        server.apply_middleware(RecordingMiddleware {
            id: "after",
            log: log.clone(),
        });

        let reply = server.receive(request("m"), None).await.unwrap();
        let response = reply.into_vec().remove(0);
        assert_eq!(response.result, Some(json!("intercepted")));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_middleware_can_rewrite_the_request() {
        let mut server = JsonRpcServer::new();
        server.add_method("actual", ConstHandler(json!("routed")));
        server.apply_middleware(RewritingMiddleware);

        let reply = server.receive(request("alias"), None).await.unwrap();
        let response = reply.into_vec().remove(0);
        assert_eq!(response.result, Some(json!("routed")));
    }

    #[tokio::test]
    async fn test_earlier_middleware_catches_handler_failure() {
        let mut server = JsonRpcServer::new();
        server.add_method("m", FailingHandler);
        server.apply_middleware(CatchingMiddleware);

        let reply = server.receive(request("m"), None).await.unwrap();
        let response = reply.into_vec().remove(0);
        let error = response.error.unwrap();
        assert_eq!(error.code, -9);
        assert_eq!(error.message, "caught: handler blew up");
    }

    #[tokio::test]
    async fn test_uncaught_middleware_failure_maps_to_error_response() {
        struct BrokenMiddleware;

        #[async_trait]
        impl Middleware<()> for BrokenMiddleware {
            async fn handle(
                &self,
                _request: JsonRpcRequest,
                _ctx: Option<()>,
                _next: Next<'_, ()>,
            ) -> DispatchResult {
                Err(HandlerError::new("middleware blew up").with_code(-8))
            }
        }

        let mut server = JsonRpcServer::new();
        server.add_method("m", ConstHandler(json!(1)));
        server.apply_middleware(BrokenMiddleware);

        let reply = server.receive(request("m"), None).await.unwrap();
        let response = reply.into_vec().remove(0);
        let error = response.error.unwrap();
        assert_eq!(error.code, -8);
        assert_eq!(error.message, "middleware blew up");
    }
}
