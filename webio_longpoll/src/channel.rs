//! The polling channel: fire-and-forget `send`, and a self-rescheduling
//! long-poll loop feeding a single receive handler.
//!
//! # Poll cycle
//!
//! ```text
//!            begin_cycle(delay)
//!   IDLE ──────────────────────► SCHEDULED ──(delay)──► IN_FLIGHT
//!     ▲    (aborts previous)                               │
//!     │                                  ┌─────────────────┴────────────┐
//!     │                                  ▼                              ▼
//!     │                            COMPLETED_OK                  COMPLETED_ERROR
//!     │                       dispatch to handler,          count failure, notify,
//!     └──────────────────────── begin_cycle(0) ──────────── begin_cycle(retry delay)
//! ```
//!
//! Every cycle owns a generation number and a cancellation token stored in
//! the one pending slot. Starting a cycle cancels the token of the cycle it
//! replaces, which drops that cycle's request. A cycle that completes only
//! dispatches and reschedules if it still owns the slot, so a superseded
//! cycle never reaches the handler and never forks the loop.

mod pending;


pub use pending::PollState;

use core::{
    fmt,
    future::Future,
    sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    time::Duration,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    CLIENT_ID_HEADER,
    client_id::ClientId,
    codec::Codec,
    config::ChannelConfig,
    error::{ChannelFailure, ConfigError, PollError, SendFailure},
    http_client::{HttpClient, HttpResponse},
};

use pending::PendingPoll;

/// Callback invoked with every decoded inbound message.
pub type ReceiveHandler<M> = Arc<dyn Fn(M) + Send + Sync + 'static>;

/// Callback invoked with every poll or send failure.
pub type FailureHandler = Arc<dyn Fn(&ChannelFailure) + Send + Sync + 'static>;

/// A bidirectional message channel over HTTP long-polling.
///
/// One channel is one session: it generates its [`ClientId`] on
/// construction and attaches it to every request. Clones share the same
/// session, handler and receive loop.
pub struct PollingChannel<H, C: Codec> {
    inner: Arc<Inner<H, C>>,
}

impl<H, C: Codec> Clone for PollingChannel<H, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H, C: Codec> fmt::Debug for PollingChannel<H, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingChannel")
            .field("client_id", &self.inner.client_id)
            .field("base_url", &self.inner.config.base_url().as_str())
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

struct Inner<H, C: Codec> {
    client_id: ClientId,
    config: ChannelConfig,
    send_url: String,
    recv_url: String,
    http: H,
    codec: C,
    runtime: Handle,

    handler: Mutex<ReceiveHandler<C::Message>>,
    failure_handler: Mutex<Option<FailureHandler>>,

    pending: Mutex<Option<PendingPoll>>,
    next_generation: AtomicU64,
    consecutive_failures: AtomicU32,
    started: AtomicBool,
    shutdown: CancellationToken,
}

/// Lock a mutex, recovering the data if a handler panicked while holding it.
///
/// Only ever taken from synchronous code; no guard lives across an `.await`.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<H, C> PollingChannel<H, C>
where
    H: HttpClient,
    C: Codec,
    C::Message: fmt::Debug,
{
    /// Create a channel on the current Tokio runtime.
    ///
    /// The loop is not running yet; call [`start`](Self::start) or
    /// [`start_when`](Self::start_when).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRuntime`] when called outside a Tokio
    /// runtime: the channel refuses to exist without a way to schedule
    /// its requests.
    pub fn new(config: ChannelConfig, http: H, codec: C) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(config, http, codec, runtime))
    }

    /// Create a channel that schedules its requests on `runtime`.
    #[must_use]
    pub fn with_runtime(config: ChannelConfig, http: H, codec: C, runtime: Handle) -> Self {
        let client_id = ClientId::generate();
        debug!(%client_id, base_url = %config.base_url(), "created polling channel");

        let default_handler: ReceiveHandler<C::Message> = Arc::new(|msg: C::Message| {
            info!(?msg, "message received");
        });

        Self {
            inner: Arc::new(Inner {
                client_id,
                send_url: config.send_url().to_string(),
                recv_url: config.recv_url().to_string(),
                config,
                http,
                codec,
                runtime,
                handler: Mutex::new(default_handler),
                failure_handler: Mutex::new(None),
                pending: Mutex::new(None),
                next_generation: AtomicU64::new(0),
                consecutive_failures: AtomicU32::new(0),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// This session's identity.
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.inner.client_id
    }

    /// The configuration the channel was built with.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Where the receive loop currently is.
    #[must_use]
    pub fn state(&self) -> PollState {
        self.inner.state()
    }

    /// Number of poll cycles that have failed in a row.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::Acquire)
    }

    /// Encode `message` and `POST` it to `<base>/send` without waiting.
    ///
    /// Failures (encoding, transport, non-2xx status) are logged and
    /// passed to the failure handler; the message is not retried. After
    /// [`shutdown`](Self::shutdown) messages are dropped.
    pub fn send(&self, message: &C::Message) {
        if self.inner.shutdown.is_cancelled() {
            debug!("channel shut down, dropping outbound message");
            return;
        }

        let body = match self.inner.codec.encode(message) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to encode outbound message");
                self.inner.notify(&SendFailure::Encode(e.to_string()).into());
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        drop(self.inner.runtime.spawn(async move {
            inner.deliver(body).await;
        }));
    }

    /// Replace the receive handler.
    ///
    /// Takes effect for the next message decoded, including one whose
    /// request is already in flight. The previous handler is dropped.
    pub fn recv<F>(&self, handler: F)
    where
        F: Fn(C::Message) + Send + Sync + 'static,
    {
        *lock(&self.inner.handler) = Arc::new(handler);
    }

    /// Register a callback for poll and send failures.
    ///
    /// Without one, failures are only logged.
    pub fn on_failure<F>(&self, handler: F)
    where
        F: Fn(&ChannelFailure) + Send + Sync + 'static,
    {
        *lock(&self.inner.failure_handler) = Some(Arc::new(handler));
    }

    /// Arm the receive loop: the first poll is issued after the configured
    /// startup delay.
    ///
    /// The loop is armed at most once; returns `false` if it already was
    /// or the channel has been shut down.
    pub fn start(&self) -> bool {
        self.start_when(core::future::ready(()))
    }

    /// Arm the receive loop once `ready` resolves (the host's "page loaded"
    /// signal), then wait the startup delay before the first poll.
    ///
    /// Returns `false` if the loop was already armed or the channel has
    /// been shut down.
    pub fn start_when<F>(&self, ready: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() || self.inner.started.swap(true, Ordering::AcqRel) {
            debug!("poll loop already armed");
            return false;
        }

        let inner = Arc::clone(&self.inner);
        drop(self.inner.runtime.spawn(async move {
            tokio::select! {
                () = inner.shutdown.cancelled() => return,
                () = ready => {}
            }

            info!(client_id = %inner.client_id, url = %inner.recv_url, "starting poll loop");
            inner.begin_cycle(inner.config.startup_delay());
        }));

        true
    }

    /// Start a fresh poll cycle now, aborting the outstanding one.
    ///
    /// Returns `false` (and does nothing) before [`start`](Self::start)
    /// or after [`shutdown`](Self::shutdown).
    pub fn repoll(&self) -> bool {
        if !self.inner.started.load(Ordering::Acquire) || self.inner.shutdown.is_cancelled() {
            return false;
        }

        self.inner.begin_cycle(Duration::ZERO);
        true
    }

    /// Tear down the receive loop.
    ///
    /// The outstanding poll (or pending retry) is aborted and no further
    /// cycles are scheduled. Sends already issued complete on their own.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }

        info!(client_id = %self.inner.client_id, "shutting down poll loop");
        self.inner.shutdown.cancel();
        lock(&self.inner.pending).take();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

#[cfg(feature = "reqwest")]
impl<M> PollingChannel<crate::http_client::ReqwestHttpClient, crate::codec::JsonCodec<M>>
where
    M: serde::Serialize + serde::de::DeserializeOwned + fmt::Debug + Send + 'static,
{
    /// A JSON channel over [`reqwest`], on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRuntime`] outside a Tokio runtime.
    pub fn json(config: ChannelConfig) -> Result<Self, ConfigError> {
        Self::new(
            config,
            crate::http_client::ReqwestHttpClient::new(),
            crate::codec::JsonCodec::new(),
        )
    }
}

/// How a poll cycle ended.
enum Completion<M> {
    /// 200 with a decoded message.
    Message(M),

    /// 200 whose body the codec reads as "no message" (the server's hold
    /// time ran out).
    Empty,
}

impl<H, C: Codec> Inner<H, C> {
    fn state(&self) -> PollState {
        if self.shutdown.is_cancelled() || !self.started.load(Ordering::Acquire) {
            return PollState::Stopped;
        }

        lock(&self.pending)
            .as_ref()
            .map_or(PollState::Idle, |p| p.state)
    }
}

impl<H, C> Inner<H, C>
where
    H: HttpClient,
    C: Codec,
    C::Message: fmt::Debug,
{
    /// Replace the pending slot with a new cycle and spawn it.
    fn begin_cycle(self: &Arc<Self>, delay: Duration) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();

        let superseded = lock(&self.pending).replace(PendingPoll::new(
            generation,
            cancel.clone(),
            !delay.is_zero(),
        ));

        if let Some(prev) = superseded {
            debug!(
                superseded = prev.generation,
                generation, "aborting outstanding poll cycle"
            );
            prev.cancel.cancel();
        }

        let inner = Arc::clone(self);
        drop(self.runtime.spawn(async move {
            inner.run_cycle(generation, cancel, delay).await;
        }));
    }

    async fn run_cycle(self: Arc<Self>, generation: u64, cancel: CancellationToken, delay: Duration) {
        if !delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(generation, "scheduled poll cycle cancelled");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            match lock(&self.pending).as_mut() {
                Some(p) if p.is_owned_by(generation) => p.state = PollState::InFlight,
                _ => return,
            }
        }

        debug!(generation, "poll cycle in flight");

        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                debug!(generation, "poll cycle aborted");
                return;
            }
            outcome = self.poll_once() => outcome,
        };

        {
            let mut slot = lock(&self.pending);
            if !slot.as_ref().is_some_and(|p| p.is_owned_by(generation)) {
                debug!(generation, "poll cycle superseded before dispatch");
                return;
            }
            *slot = None;
        }

        match outcome {
            Ok(completion) => {
                self.consecutive_failures.store(0, Ordering::Release);
                if let Completion::Message(msg) = completion {
                    self.dispatch(msg);
                } else {
                    debug!(generation, "poll returned no message");
                }
                self.begin_cycle(Duration::ZERO);
            }
            Err(e) => {
                let failures = self
                    .consecutive_failures
                    .fetch_add(1, Ordering::AcqRel)
                    .saturating_add(1);
                let retry_in = self.config.retry().delay(failures);

                warn!(
                    error = %e,
                    consecutive_failures = failures,
                    ?retry_in,
                    "communication error, retrying"
                );

                self.notify(&ChannelFailure::Poll(e));
                self.begin_cycle(retry_in);
            }
        }
    }

    async fn poll_once(&self) -> Result<Completion<C::Message>, PollError> {
        let resp = self
            .request(&self.recv_url, None, Vec::new())
            .await
            .map_err(PollError::Request)?;

        if resp.status != 200 {
            return Err(PollError::UnexpectedStatus {
                status: resp.status,
                body: resp.body_lossy(),
            });
        }

        match self.codec.decode_poll(&resp.body) {
            Ok(Some(msg)) => Ok(Completion::Message(msg)),
            Ok(None) => Ok(Completion::Empty),
            Err(e) => Err(PollError::Decode {
                reason: e.to_string(),
                content_type: resp.header("content-type").map(str::to_string),
            }),
        }
    }

    async fn deliver(&self, body: Vec<u8>) {
        let content_type = self.codec.content_type();

        let failure = match self.request(&self.send_url, Some(content_type), body).await {
            Ok(resp) if resp.is_success() => {
                debug!(status = resp.status, "message sent");
                return;
            }
            Ok(resp) => SendFailure::UnexpectedStatus {
                status: resp.status,
                body: resp.body_lossy(),
            },
            Err(e) => SendFailure::Request(e),
        };

        error!(error = %failure, "send failed, message dropped");
        self.notify(&failure.into());
    }

    /// Issue one `POST` with the identity header, honoring the configured
    /// request timeout.
    async fn request(
        &self,
        url: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        let client_id = self.client_id.as_str();
        let mut headers = vec![(CLIENT_ID_HEADER, client_id)];
        if let Some(ct) = content_type {
            headers.push(("Content-Type", ct));
        }

        let fut = self.http.post(url, &headers, body);

        match self.config.request_timeout() {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_elapsed) => Err(format!("request timed out after {limit:?}")),
            },
            None => fut.await.map_err(|e| e.to_string()),
        }
    }

    fn dispatch(&self, msg: C::Message) {
        let handler = Arc::clone(&*lock(&self.handler));
        handler(msg);
    }

    fn notify(&self, failure: &ChannelFailure) {
        let handler = lock(&self.failure_handler).clone();
        if let Some(handler) = handler {
            handler(failure);
        }
    }
}
