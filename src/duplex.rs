use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::client::{JsonRpcClient, TimeoutClient};
use crate::error::{ClientError, DuplexError, TransportError};
use crate::request::{JsonRpcRequest, RequestParams, is_request};
use crate::response::{JsonRpcResponse, ResponsePayload, is_response};
use crate::server::{JsonRpcServer, MethodHandler, RawMethodHandler};

/// Duplex bridge: one client correlation engine and one server dispatch
/// engine sharing a full-duplex channel, so the channel can act as caller
/// and callee concurrently. The bridge classifies inbound messages and
/// routes them to whichever side they belong to; it holds no state of its
/// own.
///
/// `SC` is the context type threaded to server handlers, `CC` the context
/// handed to the client's send collaborator.
pub struct JsonRpcDuplex<SC = (), CC = ()> {
    server: JsonRpcServer<SC>,
    client: JsonRpcClient<CC>,
}

impl<SC, CC> JsonRpcDuplex<SC, CC>
where
    SC: Clone + Send + Sync + 'static,
    CC: Send + Sync + 'static,
{
    pub fn new(server: JsonRpcServer<SC>, client: JsonRpcClient<CC>) -> Self {
        Self { server, client }
    }

    pub fn server(&self) -> &JsonRpcServer<SC> {
        &self.server
    }

    pub fn client(&self) -> &JsonRpcClient<CC> {
        &self.client
    }

    /// Inbound entry point for the shared channel.
    ///
    /// Response-shaped payloads settle the client side. Request-shaped
    /// payloads are dispatched by the server side and any resulting
    /// response is pushed back out through the client's raw send path.
    /// A payload matching neither shape fails the operation instead of
    /// being silently discarded.
    pub async fn receive_and_send(
        &self,
        payload: Value,
        server_ctx: Option<SC>,
        client_ctx: Option<CC>,
    ) -> Result<(), DuplexError> {
        if Self::is_response_payload(&payload) {
            match serde_json::from_value::<ResponsePayload>(payload) {
                Ok(responses) => self.client.receive_batch(responses.into_vec()),
                // Shape matched but the content didn't parse (e.g. a bogus
                // error object): tolerated, nothing to settle.
                Err(error) => debug!(%error, "dropping undecodable response payload"),
            }
            Ok(())
        } else if Self::is_request_payload(&payload) {
            if let Some(reply) = self.server.receive(payload, server_ctx).await {
                let wire = serde_json::to_value(&reply)?;
                self.client.send_raw(wire, client_ctx).await?;
            }
            Ok(())
        } else {
            Err(DuplexError::InvalidMessage)
        }
    }

    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
        ctx: Option<CC>,
    ) -> Result<Value, ClientError> {
        self.client.request(method, params, ctx).await
    }

    pub async fn request_raw(
        &self,
        request: JsonRpcRequest,
        ctx: Option<CC>,
    ) -> Result<Option<JsonRpcResponse>, ClientError> {
        self.client.request_raw(request, ctx).await
    }

    pub async fn request_raw_batch(
        &self,
        requests: Vec<JsonRpcRequest>,
        ctx: Option<CC>,
    ) -> Result<Vec<JsonRpcResponse>, ClientError> {
        self.client.request_raw_batch(requests, ctx).await
    }

    pub async fn notify(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
        ctx: Option<CC>,
    ) {
        self.client.notify(method, params, ctx).await
    }

    pub fn with_timeout(&self, delay: Duration) -> TimeoutClient<'_, CC> {
        self.client.with_timeout(delay)
    }

    pub fn reject_all_pending_requests(&self, message: &str) {
        self.client.reject_all_pending_requests(message)
    }

    pub fn add_method(&self, name: impl Into<String>, handler: impl MethodHandler<SC> + 'static) {
        self.server.add_method(name, handler)
    }

    pub fn add_method_advanced(
        &self,
        name: impl Into<String>,
        handler: impl RawMethodHandler<SC> + 'static,
    ) {
        self.server.add_method_advanced(name, handler)
    }

    pub fn remove_method(&self, name: &str) {
        self.server.remove_method(name)
    }

    pub async fn send_raw(&self, message: Value, ctx: Option<CC>) -> Result<(), TransportError> {
        self.client.send_raw(message, ctx).await
    }

    fn is_response_payload(payload: &Value) -> bool {
        match payload {
            // Batch elements only need to be response-like (version tag,
            // an id, no method). An element carrying both or neither of
            // result/error settles its caller as malformed instead of
            // blocking the well-formed responses around it.
            Value::Array(items) => !items.is_empty() && items.iter().all(Self::is_response_like),
            value => is_response(value),
        }
    }

    fn is_response_like(value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        object.get("jsonrpc").and_then(Value::as_str) == Some(crate::JSONRPC_VERSION)
            && object.contains_key("id")
            && !object.contains_key("method")
    }

    fn is_request_payload(payload: &Value) -> bool {
        match payload {
            Value::Array(items) => !items.is_empty() && items.iter().all(is_request),
            value => is_request(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::server::FnMethod;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn capture_duplex() -> (Arc<Mutex<Vec<Value>>>, JsonRpcDuplex) {
        let sent: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let sent = sent.clone();
            move |message: Value, _ctx: Option<()>| {
                sent.lock().push(message);
                futures::future::ready(Ok::<(), TransportError>(())).boxed()
            }
        };
        (
            sent,
            JsonRpcDuplex::new(JsonRpcServer::new(), JsonRpcClient::new(sink)),
        )
    }

    fn echo_method() -> impl MethodHandler<()> {
        FnMethod(|params: Option<RequestParams>, _ctx: Option<()>| {
            async move {
                Ok::<Value, HandlerError>(
                    params
                        .and_then(|p| p.get_index(0).cloned())
                        .unwrap_or(Value::Null),
                )
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_inbound_request_is_answered_through_the_send_path() {
        let (sent, duplex) = capture_duplex();
        duplex.add_method("echo", echo_method());

        duplex
            .receive_and_send(
                json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": ["hi"]}),
                None,
                None,
            )
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            json!({"jsonrpc": "2.0", "id": 1, "result": "hi"})
        );
    }

    #[tokio::test]
    async fn test_inbound_notification_sends_nothing_back() {
        let (sent, duplex) = capture_duplex();
        duplex.add_method("echo", echo_method());

        duplex
            .receive_and_send(
                json!({"jsonrpc": "2.0", "method": "echo", "params": ["hi"]}),
                None,
                None,
            )
            .await
            .unwrap();
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_response_settles_the_client_side() {
        let (sent, duplex) = capture_duplex();

        let call = duplex.request("remote", None, None);
        let respond = async {
            let wire = loop {
                if let Some(wire) = sent.lock().first().cloned() {
                    break wire;
                }
                tokio::task::yield_now().await;
            };
            let id = wire["id"].clone();
            let response = json!({"jsonrpc": "2.0", "id": id, "result": 42});
            duplex.receive_and_send(response, None, None).await.unwrap();
        };

        let (result, ()) = tokio::join!(call, respond);
        assert_eq!(result.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_unclassifiable_payload_is_an_error() {
        let (_sent, duplex) = capture_duplex();

        for payload in [
            json!({"hello": "world"}),
            json!(17),
            json!([]),
            // Mixed batch: neither all requests nor all responses.
            json!([
                {"jsonrpc": "2.0", "id": 1, "method": "m"},
                {"jsonrpc": "2.0", "id": 2, "result": 1}
            ]),
        ] {
            let result = duplex.receive_and_send(payload, None, None).await;
            assert!(matches!(result, Err(DuplexError::InvalidMessage)));
        }
    }

    #[tokio::test]
    async fn test_batch_of_requests_yields_batch_reply() {
        let (sent, duplex) = capture_duplex();
        duplex.add_method("echo", echo_method());

        duplex
            .receive_and_send(
                json!([
                    {"jsonrpc": "2.0", "id": 1, "method": "echo", "params": ["a"]},
                    {"jsonrpc": "2.0", "id": 2, "method": "echo", "params": ["b"]}
                ]),
                None,
                None,
            )
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            json!([
                {"jsonrpc": "2.0", "id": 1, "result": "a"},
                {"jsonrpc": "2.0", "id": 2, "result": "b"}
            ])
        );
    }

    #[tokio::test]
    async fn test_remove_method_delegation() {
        let (sent, duplex) = capture_duplex();
        duplex.add_method("echo", echo_method());
        duplex.remove_method("echo");

        duplex
            .receive_and_send(
                json!({"jsonrpc": "2.0", "id": 1, "method": "echo"}),
                None,
                None,
            )
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_response_batch_with_malformed_element_settles_the_rest() {
        let (sent, duplex) = capture_duplex();

        let good = duplex.request("good", None, None);
        let bad = duplex.request("bad", None, None);
        let respond = async {
            let (good_id, bad_id) = loop {
                {
                    let sent = sent.lock();
                    if sent.len() == 2 {
                        break (sent[0]["id"].clone(), sent[1]["id"].clone());
                    }
                }
                tokio::task::yield_now().await;
            };
            duplex
                .receive_and_send(
                    json!([
                        {"jsonrpc": "2.0", "id": good_id, "result": "ok"},
                        // Neither result nor error.
                        {"jsonrpc": "2.0", "id": bad_id}
                    ]),
                    None,
                    None,
                )
                .await
                .unwrap();
        };

        let (good, bad, ()) = tokio::join!(good, bad, respond);
        assert_eq!(good.unwrap(), json!("ok"));
        assert!(matches!(bad.unwrap_err(), ClientError::UnexpectedShape { .. }));
        assert_eq!(duplex.client().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_late_response_for_unknown_id_is_ignored() {
        let (_sent, duplex) = capture_duplex();
        let outcome = duplex
            .receive_and_send(json!({"jsonrpc": "2.0", "id": 999, "result": 1}), None, None)
            .await;
        assert!(outcome.is_ok());
        assert_eq!(duplex.client().pending_count(), 0);
    }
}
