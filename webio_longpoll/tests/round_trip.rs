//! End-to-end tests against a real HTTP server.
//!
//! An axum server stands in for the peer: `/send` records what the client
//! posts, `/recv` holds each poll until a message is queued for the client
//! or the hold time runs out.

#![cfg(feature = "reqwest")]
#![allow(
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::unwrap_used,
    missing_docs,
    unreachable_pub
)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::{Value, json};
use testresult::TestResult;
use tokio::net::TcpListener;
use webio_longpoll::{
    CLIENT_ID_HEADER, ChannelConfig, IdentityCodec, JsonCodec, PollingChannel, RetryPolicy,
    client_id::ClientId,
    error::ChannelFailure,
    http_client::ReqwestHttpClient,
};

const HOLD: Duration = Duration::from_millis(500);
const PATIENCE: Duration = Duration::from_secs(10);
const PREFIX: &str = "/sparked.web.io";

type JsonChannel = PollingChannel<ReqwestHttpClient, JsonCodec<Value>>;

fn init_tracing() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

// ─── Test Server Harness ─────────────────────────────────────────────────────

/// A request the server received on `/send`.
#[derive(Debug)]
struct Delivered {
    client_id: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// A poll the server received on `/recv`.
#[derive(Debug)]
struct PollSeen {
    client_id: Option<String>,
    at: Instant,
}

#[derive(Clone)]
struct Peer {
    outbox: async_channel::Receiver<Vec<u8>>,
    inbox: async_channel::Sender<Delivered>,
    polls: async_channel::Sender<PollSeen>,
    failing_polls: Arc<AtomicUsize>,
}

struct TestServer {
    address: SocketAddr,
    /// Messages queued for the client.
    push: async_channel::Sender<Vec<u8>>,
    inbox: async_channel::Receiver<Delivered>,
    polls: async_channel::Receiver<PollSeen>,
    failing_polls: Arc<AtomicUsize>,
    /// Dropping the sender stops the server.
    _cancel: async_channel::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        init_tracing();

        let (push, outbox) = async_channel::unbounded();
        let (inbox_tx, inbox) = async_channel::unbounded();
        let (polls_tx, polls) = async_channel::unbounded();
        let failing_polls = Arc::new(AtomicUsize::new(0));

        let peer = Peer {
            outbox,
            inbox: inbox_tx,
            polls: polls_tx,
            failing_polls: failing_polls.clone(),
        };

        let app = Router::new()
            .route(&format!("{PREFIX}/send"), post(handle_send))
            .route(&format!("{PREFIX}/recv"), post(handle_recv))
            .with_state(peer);

        let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = tcp.local_addr().expect("local_addr");

        let (cancel_tx, cancel_rx) = async_channel::bounded::<()>(1);
        tokio::spawn(async move {
            let shutdown = async move {
                drop(cancel_rx.recv().await);
            };
            if let Err(e) = axum::serve(tcp, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("test server error: {e}");
            }
        });

        Self {
            address,
            push,
            inbox,
            polls,
            failing_polls,
            _cancel: cancel_tx,
        }
    }

    fn config(&self) -> ChannelConfig {
        ChannelConfig::new(&format!("http://{}{PREFIX}", self.address))
            .expect("valid")
            .with_startup_delay(Duration::from_millis(10))
    }

    async fn push(&self, body: impl Into<Vec<u8>>) {
        self.push.send(body.into()).await.expect("server alive");
    }

    async fn next_delivered(&self) -> Delivered {
        tokio::time::timeout(PATIENCE, self.inbox.recv())
            .await
            .expect("a send should arrive")
            .expect("server alive")
    }

    async fn next_poll(&self) -> PollSeen {
        tokio::time::timeout(PATIENCE, self.polls.recv())
            .await
            .expect("a poll should arrive")
            .expect("server alive")
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn handle_send(State(peer): State<Peer>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let delivered = Delivered {
        client_id: header(&headers, CLIENT_ID_HEADER),
        content_type: header(&headers, "content-type"),
        body: body.to_vec(),
    };
    drop(peer.inbox.send(delivered).await);
    StatusCode::OK
}

async fn handle_recv(State(peer): State<Peer>, headers: HeaderMap) -> (StatusCode, Vec<u8>) {
    drop(
        peer.polls
            .send(PollSeen {
                client_id: header(&headers, CLIENT_ID_HEADER),
                at: Instant::now(),
            })
            .await,
    );

    let fail = peer
        .failing_polls
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok();
    if fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, b"try later".to_vec());
    }

    tokio::select! {
        msg = peer.outbox.recv() => match msg {
            Ok(body) => (StatusCode::OK, body),
            Err(_) => (StatusCode::OK, Vec::new()),
        },
        () = tokio::time::sleep(HOLD) => (StatusCode::OK, Vec::new()),
    }
}

async fn next<T>(rx: &async_channel::Receiver<T>) -> T {
    tokio::time::timeout(PATIENCE, rx.recv())
        .await
        .expect("should arrive in time")
        .expect("sender alive")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn json_messages_flow_both_ways() -> TestResult {
    let server = TestServer::start().await;
    let channel = JsonChannel::json(server.config())?;

    let (tx, received) = async_channel::unbounded();
    channel.recv(move |msg| {
        drop(tx.try_send(msg));
    });
    assert!(channel.start());

    channel.send(&json!({"a": 1}));
    let delivered = server.next_delivered().await;
    assert_eq!(delivered.body, br#"{"a":1}"#);
    assert_eq!(delivered.content_type.as_deref(), Some("application/json"));

    let id = delivered.client_id.expect("identity header present");
    assert_eq!(id.len(), 32);
    assert!(id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    assert_eq!(id.parse::<ClientId>()?, *channel.client_id());

    let first = server.next_poll().await;
    assert_eq!(first.client_id.as_deref(), Some(id.as_str()));

    server.push(r#"{"b":2}"#).await;
    assert_eq!(next(&received).await, json!({"b": 2}));

    // The loop carries on after dispatching.
    let after = server.next_poll().await;
    assert!(after.at > first.at);
    assert_eq!(after.client_id.as_deref(), Some(id.as_str()));
    assert!(received.is_empty(), "dispatched exactly once");

    channel.shutdown();
    Ok(())
}

#[tokio::test]
async fn identity_codec_passes_bytes_through() -> TestResult {
    let server = TestServer::start().await;
    let channel = PollingChannel::new(server.config(), ReqwestHttpClient::new(), IdentityCodec)?;

    let (tx, received) = async_channel::unbounded();
    channel.recv(move |msg: Vec<u8>| {
        drop(tx.try_send(msg));
    });
    channel.start();

    channel.send(&b"plain text, not json".to_vec());
    let delivered = server.next_delivered().await;
    assert_eq!(delivered.body, b"plain text, not json");
    assert_eq!(
        delivered.content_type.as_deref(),
        Some("application/octet-stream")
    );

    server.push(b"\x00\x01\xff".to_vec()).await;

    // Every expired hold reaches the handler as an empty message.
    let msg = loop {
        let msg = next(&received).await;
        if !msg.is_empty() {
            break msg;
        }
    };
    assert_eq!(msg, b"\x00\x01\xff");

    channel.shutdown();
    Ok(())
}

#[tokio::test]
async fn server_error_is_retried_after_delay() -> TestResult {
    const RETRY: Duration = Duration::from_millis(300);

    let server = TestServer::start().await;
    server.failing_polls.store(1, Ordering::Release);

    let channel = JsonChannel::json(
        server.config().with_retry(RetryPolicy::Fixed(RETRY)),
    )?;

    let (fail_tx, failures) = async_channel::unbounded();
    channel.on_failure(move |failure: &ChannelFailure| {
        drop(fail_tx.try_send(failure.clone()));
    });
    let (tx, received) = async_channel::unbounded();
    channel.recv(move |msg| {
        drop(tx.try_send(msg));
    });
    channel.start();

    let failed = server.next_poll().await;
    let failure = next(&failures).await;
    assert!(
        failure.to_string().contains("500"),
        "unexpected failure: {failure}"
    );

    let retry = server.next_poll().await;
    assert!(retry.at.duration_since(failed.at) >= RETRY);

    server.push(r#""recovered""#).await;
    assert_eq!(next(&received).await, json!("recovered"));
    assert_eq!(channel.consecutive_failures(), 0);

    channel.shutdown();
    Ok(())
}

#[tokio::test]
async fn unreachable_server_reports_failed_send() -> TestResult {
    init_tracing();

    // Bind then drop to get a port nothing listens on.
    let address = {
        let tcp = TcpListener::bind("127.0.0.1:0").await?;
        tcp.local_addr()?
    };
    let config = ChannelConfig::new(&format!("http://{address}{PREFIX}"))?;
    let channel = JsonChannel::json(config)?;

    let (fail_tx, failures) = async_channel::unbounded();
    channel.on_failure(move |failure: &ChannelFailure| {
        drop(fail_tx.try_send(failure.clone()));
    });

    channel.send(&json!("hello"));
    assert!(matches!(next(&failures).await, ChannelFailure::Send(_)));

    Ok(())
}

#[tokio::test]
async fn shutdown_stops_polling() -> TestResult {
    let server = TestServer::start().await;
    let channel = JsonChannel::json(server.config())?;
    channel.start();

    let _first = server.next_poll().await;
    channel.shutdown();
    assert!(channel.is_shut_down());

    // Drain anything that raced with the shutdown, then expect silence.
    tokio::time::sleep(HOLD).await;
    while server.polls.try_recv().is_ok() {}
    let quiet = tokio::time::timeout(HOLD * 3, server.polls.recv()).await;
    assert!(quiet.is_err(), "no polls after shutdown");

    Ok(())
}
