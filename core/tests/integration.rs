//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `Request` over real
//! HTTP through `ReqwestTransport`. Covers every classification branch that a
//! real server can produce, plus defaults layering and redirect policies.

use std::net::SocketAddr;
use std::time::Duration;

use gh_request::{Parameters, RedirectPolicy, Request, RequestBody};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn start_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    addr
}

async fn client() -> Request {
    let addr = start_server().await;
    Request::reqwest()
        .unwrap()
        .defaults(Parameters::new().base_url(format!("http://{addr}")))
}

#[tokio::test(flavor = "multi_thread")]
async fn json_response_is_parsed() {
    let request = client().await;
    let res = request
        .send(
            "GET /repos/{owner}/{repo}",
            Parameters::new().param("owner", "octocat").param("repo", "hello"),
        )
        .await
        .unwrap();

    assert_eq!(res.status, 200);
    assert!(res.url.ends_with("/repos/octocat/hello"));
    assert_eq!(res.headers.get("etag"), Some("\"octocat-hello\""));
    assert_eq!(res.data.as_json().unwrap()["full_name"], "octocat/hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn not_modified_surfaces_as_error() {
    let request = client().await;
    let err = request
        .send(
            "GET /repos/{owner}/{repo}",
            Parameters::new()
                .param("owner", "octocat")
                .param("repo", "hello")
                .header("if-none-match", "\"octocat-hello\""),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status, 304);
    assert_eq!(err.message, "Not modified");
}

#[tokio::test(flavor = "multi_thread")]
async fn head_requests() {
    let request = client().await;

    let res = request
        .send("HEAD /repos/octocat/hello", Parameters::new())
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert!(res.data.is_empty());

    let err = request
        .send("HEAD /repos/ghost/hello", Parameters::new())
        .await
        .unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.message, "Not Found");
}

#[tokio::test(flavor = "multi_thread")]
async fn not_found_keeps_raw_body_and_merges_fields() {
    let request = client().await;
    let err = request
        .send("GET /repos/ghost/hello", Parameters::new())
        .await
        .unwrap_err();

    assert_eq!(err.status, 404);
    let raw: Value = serde_json::from_str(&err.message).unwrap();
    assert_eq!(raw["message"], "Not Found");
    assert_eq!(err.field("message"), Some(&json!("Not Found")));
    assert!(err.documentation_url().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn issue_lifecycle() {
    let request = client().await.defaults(
        Parameters::new()
            .param("owner", "octocat")
            .param("repo", "hello")
            .header("authorization", "token s3cret"),
    );

    // validation failure
    let err = request
        .send("POST /repos/{owner}/{repo}/issues", Parameters::new().param("body", "no title"))
        .await
        .unwrap_err();
    assert_eq!(err.status, 422);
    assert_eq!(
        err.message,
        r#"Validation Failed: {"resource":"Issue","code":"missing_field","field":"title"}"#
    );
    assert_eq!(err.errors().len(), 1);
    assert_eq!(
        err.request.headers.get("authorization"),
        Some("token [REDACTED]")
    );

    // create
    let res = request
        .send("POST /repos/{owner}/{repo}/issues", Parameters::new().param("title", "Found a bug"))
        .await
        .unwrap();
    assert_eq!(res.status, 201);
    assert_eq!(res.data.as_json().unwrap()["number"], 1);

    // close with an explicit body
    let res = request
        .send(
            "PATCH /repos/{owner}/{repo}/issues/{issue_number}",
            Parameters::new()
                .param("issue_number", 1)
                .body(RequestBody::Json(json!({"state": "closed"}))),
        )
        .await
        .unwrap();
    assert_eq!(res.data.as_json().unwrap()["state"], "closed");

    // list with a query param
    let res = request
        .send("GET /repos/{owner}/{repo}/issues", Parameters::new().param("state", "closed"))
        .await
        .unwrap();
    assert_eq!(res.data.as_json().unwrap().as_array().unwrap().len(), 1);

    // lock: PUT without a body, 204
    let res = request
        .send("PUT /repos/{owner}/{repo}/issues/{issue_number}/lock", Parameters::new().param("issue_number", 1))
        .await
        .unwrap();
    assert_eq!(res.status, 204);
    assert!(res.data.is_empty());

    // missing issue
    let err = request
        .send("GET /repos/{owner}/{repo}/issues/{issue_number}", Parameters::new().param("issue_number", 42))
        .await
        .unwrap_err();
    assert_eq!(err.status, 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn text_and_binary_bodies() {
    let request = client().await;

    let res = request.send("GET /repos/o/hello/readme", Parameters::new()).await.unwrap();
    assert_eq!(res.data.as_text(), Some("# hello\n"));

    let res = request.send("GET /repos/o/r/tarball", Parameters::new()).await.unwrap();
    let bytes = res.data.as_bytes().unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_content_has_no_data() {
    let request = client().await;
    let res = request.send("POST /reset", Parameters::new()).await.unwrap();
    assert_eq!(res.status, 205);
    assert!(res.data.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn defaults_reach_the_wire() {
    let request = client()
        .await
        .defaults(Parameters::new().header("x-layer", "a").header("x-a", "1"))
        .defaults(Parameters::new().header("x-layer", "b"));

    let res = request
        .send("GET /echo", Parameters::new().param("per_page", 5))
        .await
        .unwrap();
    let echo = res.data.as_json().unwrap();
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["query"], "per_page=5");
    assert_eq!(echo["headers"]["x-layer"], "b");
    assert_eq!(echo["headers"]["x-a"], "1");
    assert_eq!(echo["headers"]["accept"], "application/vnd.github.v3+json");
    assert!(echo["headers"]["user-agent"]
        .as_str()
        .unwrap()
        .starts_with("gh-request/"));
}

#[tokio::test(flavor = "multi_thread")]
async fn json_body_is_serialized_on_the_wire() {
    let request = client().await;
    let res = request
        .send("POST /echo", Parameters::new().param("title", "x").param("labels", json!(["a"])))
        .await
        .unwrap();
    let echo = res.data.as_json().unwrap();
    assert_eq!(echo["body"], r#"{"title":"x","labels":["a"]}"#);
    assert_eq!(echo["headers"]["content-type"], "application/json; charset=utf-8");
}

#[tokio::test(flavor = "multi_thread")]
async fn redirect_policies() {
    let request = client().await;

    let res = request.send("GET /redirect/o/r", Parameters::new()).await.unwrap();
    assert_eq!(res.status, 200);
    assert!(res.url.ends_with("/repos/o/r"));

    let res = request
        .send("GET /redirect/o/r", Parameters::new().redirect(RedirectPolicy::Manual))
        .await
        .unwrap();
    assert_eq!(res.status, 302);
    assert_eq!(res.headers.get("location"), Some("/repos/o/r"));

    let err = request
        .send("GET /redirect/o/r", Parameters::new().redirect(RedirectPolicy::Error))
        .await
        .unwrap_err();
    assert_eq!(err.status, 500);
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_surfaces_as_500() {
    let request = client().await;
    let err = request
        .send("GET /slow", Parameters::new().timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert_eq!(err.status, 500);
    assert_eq!(err.message, "request timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_refused_surfaces_as_500() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let request = Request::reqwest()
        .unwrap()
        .defaults(Parameters::new().base_url(format!("http://{addr}")));
    let err = request.send("GET /zen", Parameters::new()).await.unwrap_err();
    assert_eq!(err.status, 500);
    assert!(err.headers.is_empty());
    assert!(!err.message.is_empty());
}

/// Serves one connection with a fixed raw HTTP/1.1 response.
async fn raw_server(response: &'static str) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn head_failure_uses_reason_phrase_from_the_wire() {
    let addr = raw_server("HTTP/1.1 418 Short And Stout\r\ncontent-length: 0\r\n\r\n").await;
    let request = Request::reqwest()
        .unwrap()
        .defaults(Parameters::new().base_url(format!("http://{addr}")));

    let err = request.send("HEAD /teapot", Parameters::new()).await.unwrap_err();
    assert_eq!(err.status, 418);
    assert_eq!(err.message, "Short And Stout");
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_headers_are_joined_on_the_wire() {
    let addr = raw_server(
        "HTTP/1.1 200 OK\r\nvary: Accept\r\nvary: Accept-Encoding\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nok",
    )
    .await;
    let request = Request::reqwest()
        .unwrap()
        .defaults(Parameters::new().base_url(format!("http://{addr}")));

    let res = request.send("GET /vary", Parameters::new()).await.unwrap();
    assert_eq!(res.headers.get("vary"), Some("Accept, Accept-Encoding"));
    assert_eq!(res.data.as_text(), Some("ok"));
}
