//! Channel configuration.

use core::time::Duration;

use url::Url;

use crate::{RECV_PATH, SEND_PATH, error::ConfigError, retry::RetryPolicy};

/// Delay between the host's ready signal and the first poll.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(100);

/// Where and how a [`PollingChannel`](crate::PollingChannel) talks to its
/// server.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    base_url: Url,
    retry: RetryPolicy,
    startup_delay: Duration,
    request_timeout: Option<Duration>,
}

impl ChannelConfig {
    /// Configuration for a server whose endpoints live under `base_url`,
    /// e.g. `http://localhost:8880/sparked.web.io`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `base_url` does not parse, is not
    /// `http`/`https`, or cannot have paths appended.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::from_url(Url::parse(base_url)?)
    }

    /// Like [`ChannelConfig::new`], from an already parsed URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL is not `http`/`https` or cannot
    /// have paths appended.
    pub fn from_url(mut base_url: Url) -> Result<Self, ConfigError> {
        match base_url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        if base_url.cannot_be_a_base() {
            return Err(ConfigError::CannotBeABase(base_url.to_string()));
        }

        // Joining relative paths replaces the last segment unless the base
        // ends in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        base_url.set_query(None);
        base_url.set_fragment(None);

        Ok(Self {
            base_url,
            retry: RetryPolicy::default(),
            startup_delay: DEFAULT_STARTUP_DELAY,
            request_timeout: None,
        })
    }

    /// Set the retry policy for failed poll cycles.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the delay between the ready signal and the first poll.
    #[must_use]
    pub const fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Abandon any request that takes longer than `timeout`.
    ///
    /// Unset by default: a long poll is held as long as the server likes.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The base URL, always ending in `/`.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Delay between the ready signal and the first poll.
    #[must_use]
    pub const fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    /// Per-request timeout, if any.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// `<base>/send`
    #[must_use]
    pub fn send_url(&self) -> Url {
        self.endpoint(SEND_PATH)
    }

    /// `<base>/recv`
    #[must_use]
    pub fn recv_url(&self) -> Url {
        self.endpoint(RECV_PATH)
    }

    fn endpoint(&self, path: &str) -> Url {
        // Joining a plain relative segment onto an http(s) base cannot fail.
        self.base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone())
    }
}
