// tests/http_client.rs
//! The HTTP client against a scripted local server.

use course_crawler::api::client::ClientSettings;
use course_crawler::error::FetchErrorKind;
use course_crawler::{ApiBaseUrl, ApiToken, CatalogApi, Endpoint, HttpCatalogClient, RetryPolicy};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// What the stub saw for one request.
#[derive(Debug, Clone)]
struct SeenRequest {
    url: String,
    authorization: Option<String>,
    origin: Option<String>,
}

/// Answers requests with a fixed script of `(status, body)` pairs; the last
/// entry repeats once the script runs out.
struct CatalogStub {
    base_url: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CatalogStub {
    fn spawn(script: Vec<(u16, &'static str)>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start catalog stub server");
        let base_url = format!("http://{}", server.server_addr());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut script: VecDeque<(u16, &'static str)> = script.into();

        let handle = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(20)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let header = |name: &'static str| {
                request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv(name))
                    .map(|h| h.value.as_str().to_string())
            };
            recorded.lock().push(SeenRequest {
                url: request.url().to_string(),
                authorization: header("Authorization"),
                origin: header("Origin"),
            });

            let (status, body) = if script.len() > 1 {
                script.pop_front().unwrap_or((500, "script exhausted"))
            } else {
                script.front().copied().unwrap_or((500, "script exhausted"))
            };
            let _ = request.respond(tiny_http::Response::from_string(body).with_status_code(status));
        });

        Self {
            base_url,
            seen,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }
}

impl Drop for CatalogStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn client_for(stub: &CatalogStub, max_attempts: u32) -> HttpCatalogClient {
    HttpCatalogClient::new(
        &ApiToken::new("secret-token").unwrap(),
        ClientSettings {
            base_url: ApiBaseUrl::parse(&stub.base_url).unwrap(),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
            },
            requests_per_second: 0,
            timeout: Duration::from_secs(5),
        },
    )
    .unwrap()
}

fn listing() -> Endpoint {
    Endpoint::CourseListing { limit: 50 }
}

#[tokio::test]
async fn transient_errors_are_retried_until_success() {
    let stub = CatalogStub::spawn(vec![
        (503, "busy"),
        (502, "bad gateway"),
        (200, r#"{"data": []}"#),
    ]);
    let client = client_for(&stub, 4);

    let payload = client.fetch(&listing()).await.unwrap();

    assert_eq!(payload, json!({"data": []}));
    assert_eq!(stub.requests().len(), 3);
}

#[tokio::test]
async fn requests_carry_token_origin_and_endpoint_path() {
    let stub = CatalogStub::spawn(vec![(200, r#"{"chapters": []}"#)]);
    let client = client_for(&stub, 1);

    client
        .fetch(&Endpoint::CourseContent {
            course_slug: "python".into(),
        })
        .await
        .unwrap();

    let requests = stub.requests();
    assert_eq!(requests[0].url, "/courses/python/content/");
    assert_eq!(requests[0].authorization.as_deref(), Some("Token secret-token"));
    assert_eq!(requests[0].origin.as_deref(), Some("https://gradient.academy"));
}

#[tokio::test]
async fn client_errors_are_rejected_without_retry() {
    let stub = CatalogStub::spawn(vec![(404, "no such course")]);
    let client = client_for(&stub, 4);

    let err = client.fetch(&listing()).await.unwrap_err();

    assert_eq!(err.kind, FetchErrorKind::Rejected);
    assert_eq!(err.status, Some(404));
    assert_eq!(err.attempts, 1);
    assert_eq!(stub.requests().len(), 1);
}

#[tokio::test]
async fn persistent_throttling_exhausts_the_retry_budget() {
    let stub = CatalogStub::spawn(vec![(429, "slow down")]);
    let client = client_for(&stub, 3);

    let err = client.fetch(&listing()).await.unwrap_err();

    assert_eq!(err.kind, FetchErrorKind::Exhausted);
    assert_eq!(err.status, Some(429));
    assert_eq!(err.attempts, 3);
    assert_eq!(stub.requests().len(), 3);
}

#[tokio::test]
async fn non_json_success_body_is_rejected() {
    let stub = CatalogStub::spawn(vec![(200, "<html>maintenance</html>")]);
    let client = client_for(&stub, 4);

    let err = client.fetch(&listing()).await.unwrap_err();

    assert!(err.is_rejected());
    assert!(err.message.contains("not JSON"), "{}", err.message);
    assert_eq!(stub.requests().len(), 1);
}
