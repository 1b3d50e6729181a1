//! End-to-end loader scenarios over a scripted transport.
//!
//! The transport delivers its callbacks from a spawned task, matching the
//! deferral contract real transports follow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use url::Url;

use brook_fetch::data::{RedirectMode, RequestMode, ResponseHead, ResponseTainting};
use brook_fetch::effects::{
    DispatchOptions, PermissivePolicy, Policy, Transport, TransportClient, TransportError,
};
use brook_fetch::error::FetchError;
use brook_fetch::{FetchLoader, FetchRequest, FetchResponse, LoaderState};
use brook_stream::ByteStream;

#[derive(Clone)]
enum Event {
    Response { head: ResponseHead, body: Bytes },
    Finished,
    Failed(TransportError),
    AccessControl(String),
}

#[derive(Debug, Clone)]
struct Dispatch {
    method: String,
    url: String,
    options: DispatchOptions,
}

/// Replays one scripted event sequence per `start` call, deferred to a
/// spawned task.
struct ScriptedTransport {
    hops: VecDeque<Vec<Event>>,
    log: Arc<Mutex<Vec<Dispatch>>>,
    cancelled: Arc<AtomicBool>,
}

impl ScriptedTransport {
    fn new(hops: Vec<Vec<Event>>) -> (Self, Arc<Mutex<Vec<Dispatch>>>, Arc<AtomicBool>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                hops: hops.into(),
                log: log.clone(),
                cancelled: cancelled.clone(),
            },
            log,
            cancelled,
        )
    }
}

impl Transport for ScriptedTransport {
    fn start(
        &mut self,
        request: &FetchRequest,
        options: DispatchOptions,
        client: Arc<dyn TransportClient>,
    ) {
        self.log.lock().unwrap().push(Dispatch {
            method: request.method.clone(),
            url: request.url.to_string(),
            options,
        });
        let events = self.hops.pop_front().unwrap_or_default();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            for event in events {
                match event {
                    Event::Response { head, body } => {
                        client.on_response_received(head, ByteStream::from_bytes(body));
                    }
                    Event::Finished => client.on_finished_loading(),
                    Event::Failed(error) => client.on_failed(error),
                    Event::AccessControl(message) => {
                        client.on_failed_access_control_check(message);
                    }
                }
            }
        });
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn ok_response(at: &str, body: &[u8]) -> Event {
    Event::Response {
        head: ResponseHead::new(url(at), 200).header("content-type", "text/plain"),
        body: Bytes::copy_from_slice(body),
    }
}

fn redirect(at: &str, status: u16, location: &str) -> Event {
    Event::Response {
        head: ResponseHead::new(url(at), status).header("Location", location),
        body: Bytes::new(),
    }
}

fn sha256_token(data: &[u8]) -> String {
    format!("sha256-{}", STANDARD.encode(Sha256::digest(data)))
}

fn spawn_loader(
    request: FetchRequest,
    hops: Vec<Vec<Event>>,
) -> (
    FetchLoader,
    tokio::sync::oneshot::Receiver<brook_fetch::Result<FetchResponse>>,
    Arc<Mutex<Vec<Dispatch>>>,
    Arc<AtomicBool>,
) {
    let (transport, log, cancelled) = ScriptedTransport::new(hops);
    let (loader, rx) = FetchLoader::new(request, Box::new(transport), Arc::new(PermissivePolicy));
    loader.start();
    (loader, rx, log, cancelled)
}

async fn read_body(response: FetchResponse) -> Vec<u8> {
    let mut body = response.body.expect("response should carry a body");
    let mut reader = body.attach_reader().unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = reader.next_chunk().await.unwrap() {
        out.extend_from_slice(&chunk);
    }
    out
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_same_origin_fetch_delivers_body() {
    let request = FetchRequest::new(url("https://example.com/file.txt"));
    let (loader, rx, log, _) = spawn_loader(
        request,
        vec![vec![
            ok_response("https://example.com/file.txt", b"hello, world"),
            Event::Finished,
        ]],
    );

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.tainting, ResponseTainting::Basic);
    assert_eq!(response.status, 200);
    assert_eq!(read_body(response).await, b"hello, world");

    settle().await;
    assert_eq!(loader.state(), LoaderState::Succeeded);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(!log[0].options.cors_flag);
}

#[tokio::test]
async fn test_cross_origin_cors_sets_dispatch_flags() {
    let request = FetchRequest::new(url("https://other.example/api"))
        .origin(url("https://example.com/").origin())
        .mode(RequestMode::Cors)
        .method("DELETE");
    let (_loader, rx, log, _) = spawn_loader(
        request,
        vec![vec![
            ok_response("https://other.example/api", b"{}"),
            Event::Finished,
        ]],
    );

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.tainting, ResponseTainting::Cors);

    let log = log.lock().unwrap();
    assert!(log[0].options.cors_flag);
    assert!(log[0].options.preflight_flag);
}

#[tokio::test]
async fn test_multiple_location_headers_fail_without_body() {
    let head = ResponseHead::new(url("https://example.com/a"), 302)
        .header("Location", "/b")
        .header("Location", "/c");
    let request = FetchRequest::new(url("https://example.com/a"));
    let (loader, rx, _, cancelled) = spawn_loader(
        request,
        vec![vec![Event::Response {
            head,
            body: Bytes::new(),
        }]],
    );

    let error = rx.await.unwrap().unwrap_err();
    assert_eq!(
        error,
        FetchError::Network("Multiple Location header.".to_string())
    );
    assert_eq!(loader.state(), LoaderState::Failed);
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_integrity_match_delivers_verified_body() {
    let payload = b"signed payload".as_slice();
    let request =
        FetchRequest::new(url("https://example.com/lib.js")).integrity(sha256_token(payload));
    let (loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![
            ok_response("https://example.com/lib.js", payload),
            Event::Finished,
        ]],
    );

    let response = rx.await.unwrap().unwrap();
    assert_eq!(read_body(response).await, payload);

    settle().await;
    assert_eq!(loader.state(), LoaderState::Succeeded);
}

#[tokio::test]
async fn test_integrity_mismatch_fails_after_transport_finishes() {
    let request = FetchRequest::new(url("https://example.com/lib.js"))
        .integrity(sha256_token(b"expected bytes"));
    let (loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![
            ok_response("https://example.com/lib.js", b"tampered bytes"),
            Event::Finished,
        ]],
    );

    // The transport's completion does not resolve the fetch; only the
    // verifier's verdict does.
    let error = rx.await.unwrap().unwrap_err();
    assert_eq!(error, FetchError::Integrity);
    assert_eq!(loader.state(), LoaderState::Failed);
}

#[tokio::test]
async fn test_redirect_followed_rewrites_post_to_get() {
    let request = FetchRequest::new(url("https://example.com/submit")).method("POST");
    let (_loader, rx, log, _) = spawn_loader(
        request,
        vec![
            vec![redirect("https://example.com/submit", 302, "/done")],
            vec![
                ok_response("https://example.com/done", b"ok"),
                Event::Finished,
            ],
        ],
    );

    let response = rx.await.unwrap().unwrap();
    assert_eq!(read_body(response).await, b"ok");

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].method, "POST");
    assert_eq!(log[1].method, "GET");
    assert_eq!(log[1].url, "https://example.com/done");
}

#[tokio::test]
async fn test_redirect_to_data_url_rejected_outside_no_cors() {
    let request = FetchRequest::new(url("https://other.example/r"))
        .origin(url("https://example.com/").origin())
        .mode(RequestMode::Cors);
    let (_loader, rx, log, _) = spawn_loader(
        request,
        vec![vec![redirect(
            "https://other.example/r",
            302,
            "data:text/plain,hi",
        )]],
    );

    let error = rx.await.unwrap().unwrap_err();
    assert!(matches!(
        error,
        FetchError::Network(m) if m.contains("no-cors")
    ));
    // The data: URL was never fetched.
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_redirect_to_data_url_opaque_under_no_cors() {
    let request = FetchRequest::new(url("https://other.example/r"))
        .origin(url("https://example.com/").origin())
        .mode(RequestMode::NoCors);
    let (_loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![redirect(
            "https://other.example/r",
            302,
            "data:text/plain,hello",
        )]],
    );

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.tainting, ResponseTainting::Opaque);
    assert_eq!(response.status, 0);
    assert_eq!(read_body(response).await, b"hello");
}

#[tokio::test]
async fn test_redirect_mode_error_rejects() {
    let request =
        FetchRequest::new(url("https://example.com/a")).redirect(RedirectMode::Error);
    let (_loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![redirect("https://example.com/a", 307, "/b")]],
    );

    assert_eq!(rx.await.unwrap().unwrap_err(), FetchError::RedirectCheck);
}

#[tokio::test]
async fn test_redirect_mode_manual_surfaces_opaque_redirect() {
    let request =
        FetchRequest::new(url("https://example.com/a")).redirect(RedirectMode::Manual);
    let (_loader, rx, log, _) = spawn_loader(
        request,
        vec![vec![
            redirect("https://example.com/a", 302, "/b"),
            Event::Finished,
        ]],
    );

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.tainting, ResponseTainting::OpaqueRedirect);
    assert_eq!(response.status, 0);
    assert!(response.headers.is_empty());
    assert!(response.body.is_none());
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_redirect_hop_limit() {
    let hops: Vec<Vec<Event>> = (0..21)
        .map(|i| {
            vec![redirect(
                &format!("https://example.com/r{i}"),
                302,
                &format!("/r{}", i + 1),
            )]
        })
        .collect();
    let request = FetchRequest::new(url("https://example.com/r0"));
    let (_loader, rx, log, _) = spawn_loader(request, hops);

    assert_eq!(rx.await.unwrap().unwrap_err(), FetchError::RedirectCheck);
    assert_eq!(log.lock().unwrap().len(), 21);
}

#[tokio::test]
async fn test_transport_failure_messages_redacted() {
    let request = FetchRequest::new(url("https://example.com/a"));
    let (_loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![Event::Failed(TransportError::timeout())]],
    );
    assert_eq!(
        rx.await.unwrap().unwrap_err(),
        FetchError::Transport(String::new())
    );

    let request = FetchRequest::new(url("https://example.com/a"));
    let (_loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![Event::Failed(TransportError::internal("dns failure"))]],
    );
    assert_eq!(
        rx.await.unwrap().unwrap_err(),
        FetchError::Transport("dns failure".to_string())
    );
}

#[tokio::test]
async fn test_access_control_failure_surfaces_message() {
    let request = FetchRequest::new(url("https://other.example/api"))
        .origin(url("https://example.com/").origin())
        .mode(RequestMode::Cors);
    let (_loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![Event::AccessControl(
            "missing Access-Control-Allow-Origin".to_string(),
        )]],
    );

    let error = rx.await.unwrap().unwrap_err();
    assert_eq!(
        error,
        FetchError::AccessControl("missing Access-Control-Allow-Origin".to_string())
    );
}

#[tokio::test]
async fn test_csp_block_never_dispatches() {
    struct BlockingPolicy;
    impl Policy for BlockingPolicy {
        fn allow_connect_to_source(&self, _url: &Url) -> bool {
            false
        }
    }

    let (transport, log, _) = ScriptedTransport::new(vec![]);
    let (loader, rx) = FetchLoader::new(
        FetchRequest::new(url("https://example.com/a")),
        Box::new(transport),
        Arc::new(BlockingPolicy),
    );
    loader.start();

    let error = rx.await.unwrap().unwrap_err();
    assert!(matches!(
        error,
        FetchError::Network(m) if m.contains("connect-src")
    ));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_direct_data_url_fetch_is_basic() {
    let request = FetchRequest::new(url("data:text/plain;base64,aGVsbG8="));
    let (transport, log, _) = ScriptedTransport::new(vec![]);
    let (loader, rx) = FetchLoader::new(request, Box::new(transport), Arc::new(PermissivePolicy));
    loader.start();

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.tainting, ResponseTainting::Basic);
    assert_eq!(response.status, 200);
    assert_eq!(read_body(response).await, b"hello");
    assert!(log.lock().unwrap().is_empty());

    settle().await;
    assert_eq!(loader.state(), LoaderState::Succeeded);
}

#[tokio::test]
async fn test_dispose_cancels_and_closes_channel() {
    let request = FetchRequest::new(url("https://example.com/slow"));
    // No scripted events: the request hangs until disposed.
    let (loader, rx, _, cancelled) = spawn_loader(request, vec![vec![]]);

    let detached = Arc::new(AtomicBool::new(false));
    let flag = detached.clone();
    loader.set_detach_hook(Box::new(move || flag.store(true, Ordering::SeqCst)));

    loader.dispose();
    assert!(rx.await.is_err());
    assert_eq!(loader.state(), LoaderState::Failed);
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(detached.load(Ordering::SeqCst));

    // A second dispose is a no-op.
    loader.dispose();
}

#[tokio::test]
async fn test_detach_hook_runs_on_success() {
    let request = FetchRequest::new(url("https://example.com/file"));
    let (loader, rx, _, _) = spawn_loader(
        request,
        vec![vec![
            ok_response("https://example.com/file", b"x"),
            Event::Finished,
        ]],
    );

    let detached = Arc::new(AtomicBool::new(false));
    let flag = detached.clone();
    loader.set_detach_hook(Box::new(move || flag.store(true, Ordering::SeqCst)));

    rx.await.unwrap().unwrap();
    settle().await;
    assert!(detached.load(Ordering::SeqCst));
}
