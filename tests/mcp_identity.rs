use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{Value, json};
use slack_mcp_gateway::{Gateway, GatewayConfig, UpstreamEndpoints, create_gateway};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCEPT: &str = "application/json, text/event-stream";
const SESSION_HEADER: &str = "mcp-session-id";

async fn mount_user(upstream: &MockServer, token: &str, user_id: &str, channel: (&str, &str)) {
    let bearer = format!("Bearer {}", token);
    Mock::given(method("POST"))
        .and(path("/api/auth.test"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "user_id": user_id,
            "team_id": "T1"
        })))
        .mount(upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversations.list"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channels": [ { "id": channel.0, "name": channel.1, "num_members": 3 } ]
        })))
        .expect(1)
        .mount(upstream)
        .await;
}

async fn start_gateway(upstream: &MockServer) -> (Gateway, SocketAddr) {
    let config = GatewayConfig::from_settings(
        "127.0.0.1".to_string(),
        0,
        true,
        Some("111.222".to_string()),
        Some("client-secret".to_string()),
        Some("https://gw.example.com/oauth/callback".to_string()),
        None,
    )
    .unwrap()
    .with_upstream(UpstreamEndpoints::with_base(&upstream.uri()).unwrap());

    let gateway = create_gateway(&config).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = gateway.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (gateway, addr)
}

async fn post(
    client: &reqwest::Client,
    addr: SocketAddr,
    token: &str,
    session: Option<&str>,
    body: Value,
) -> reqwest::Response {
    let mut request = client
        .post(format!("http://{}/mcp", addr))
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, ACCEPT)
        .json(&body);
    if let Some(session) = session {
        request = request.header(SESSION_HEADER, session);
    }
    request.send().await.unwrap()
}

/// Read a JSON-RPC response with `id`, from either an SSE stream or a plain
/// JSON body.
async fn rpc_response(mut response: reqwest::Response, id: u64) -> Value {
    let read = async {
        let mut buffer = String::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            for line in buffer.lines() {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                if let Ok(value) = serde_json::from_str::<Value>(data.trim()) {
                    if value["id"] == id {
                        return value;
                    }
                }
            }
        }
        serde_json::from_str(&buffer).unwrap()
    };
    tokio::time::timeout(Duration::from_secs(10), read)
        .await
        .expect("timed out waiting for JSON-RPC response")
}

fn channel_names(result: &Value) -> Vec<String> {
    let text = result["result"]["content"][0]["text"].as_str().unwrap();
    let page: Value = serde_json::from_str(text).unwrap();
    page["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect()
}

fn list_call(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": "channels_list",
            "arguments": { "channel_types": "public_channel" }
        }
    })
}

#[tokio::test]
async fn test_tool_call_acts_as_bearer_of_each_request() {
    let upstream = MockServer::start().await;
    mount_user(&upstream, "xoxp-alice", "UA", ("CA", "alice-only")).await;
    mount_user(&upstream, "xoxp-bob", "UB", ("CB", "bob-only")).await;

    let (gateway, addr) = start_gateway(&upstream).await;
    let client = reqwest::Client::new();

    // Alice opens the session.
    let response = post(
        &client,
        addr,
        "xoxp-alice",
        None,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "gateway-test", "version": "0.0.1" }
            }
        }),
    )
    .await;
    assert!(response.status().is_success());
    let session = response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("session id header");
    let init = rpc_response(response, 1).await;
    assert!(init["result"]["capabilities"]["tools"].is_object());

    let response = post(
        &client,
        addr,
        "xoxp-alice",
        Some(&session),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
    )
    .await;
    assert!(response.status().is_success());

    // Bob reuses Alice's session id with his own token.
    let response = post(&client, addr, "xoxp-bob", Some(&session), list_call(2)).await;
    assert!(response.status().is_success());
    let bob = rpc_response(response, 2).await;
    assert_eq!(channel_names(&bob), vec!["#bob-only"]);

    let response = post(&client, addr, "xoxp-alice", Some(&session), list_call(3)).await;
    let alice = rpc_response(response, 3).await;
    assert_eq!(channel_names(&alice), vec!["#alice-only"]);

    // Each listing went upstream with the caller's own token.
    let listings: Vec<String> = upstream
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/conversations.list")
        .filter_map(|r| {
            r.headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .collect();
    assert_eq!(listings, vec!["Bearer xoxp-bob", "Bearer xoxp-alice"]);

    gateway.shutdown();
}
