//! Poll-HTTP transport: every request is one POST whose body carries the answer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::http::HttpPoster;
use super::rpc::RpcChannel;
use crate::error::TransportError;

pub(crate) struct PollHttpChannel {
    url: String,
    poster: HttpPoster,
    next_id: AtomicI64,
    closed: AtomicBool,
}

impl PollHttpChannel {
    pub(crate) fn new(
        client: reqwest::Client,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            url: url.to_string(),
            poster: HttpPoster::new(client, headers)?,
            next_id: AtomicI64::new(1),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RpcChannel for PollHttpChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::closed());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        match self.poster.post_request(&self.url, id, method, params).await? {
            Some(result) => result,
            None => Err(TransportError::Protocol(format!(
                "Missing response for request id {}",
                id
            ))),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::closed());
        }
        self.poster.post_notification(&self.url, method, params).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::rpc::RpcSession;
    use crate::transport::{ClientInfo, Session};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_rpc(server: &MockServer, rpc_method: &str, id: i64, result: Value) {
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(body_partial_json(json!({"method": rpc_method})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            })))
            .mount(server)
            .await;
    }

    fn channel(server: &MockServer) -> PollHttpChannel {
        let headers = BTreeMap::from([("Authorization".to_string(), "Bearer t0k".to_string())]);
        PollHttpChannel::new(
            reqwest::Client::new(),
            &format!("{}/rpc", server.uri()),
            &headers,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn handshake_and_list_over_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(header("Authorization", "Bearer t0k"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}},
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        mount_rpc(
            &server,
            "tools/list",
            2,
            json!({"tools": [{"name": "search", "inputSchema": {"type": "object"}}]}),
        )
        .await;

        let session = RpcSession::new("remote", channel(&server));
        let caps = session
            .initialize("2025-03-26", &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(caps.protocol_version, "2024-11-05");

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "search");
    }

    #[tokio::test]
    async fn tool_error_flag_is_preserved() {
        let server = MockServer::start().await;
        mount_rpc(
            &server,
            "tools/call",
            1,
            json!({"content": [{"type": "text", "text": "no such file"}], "isError": true}),
        )
        .await;

        let session = RpcSession::new("remote", channel(&server));
        let output = session.call("read", json!({"path": "x"})).await.unwrap();
        assert!(output.is_error);
    }

    #[tokio::test]
    async fn mismatched_id_is_a_protocol_error() {
        let server = MockServer::start().await;
        mount_rpc(&server, "tools/call", 99, json!({"content": []})).await;

        let err = channel(&server)
            .request("tools/call", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let err = channel(&server)
            .request("tools/list", json!({}))
            .await
            .unwrap_err();
        match err {
            TransportError::Http(message) => assert!(message.contains("upstream exploded")),
            other => panic!("Expected HTTP error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn closed_channel_refuses_requests() {
        let server = MockServer::start().await;
        let channel = channel(&server);
        channel.close().await;
        assert!(channel.request("tools/list", json!({})).await.is_err());
    }
}
