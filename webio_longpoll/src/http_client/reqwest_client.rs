//! [`reqwest`]-backed implementation of [`HttpClient`].

use core::time::Duration;

use futures::{FutureExt, future::BoxFuture};

use super::{HttpClient, HttpResponse};

/// Error type for the reqwest-based HTTP client.
#[derive(Debug, thiserror::Error)]
#[error("HTTP request failed: {0}")]
pub struct ReqwestHttpError(#[from] reqwest::Error);

/// A [`reqwest`]-backed implementation of [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client with no request timeout.
    ///
    /// Long-poll requests are held open by the server, so by default the
    /// client never gives up on its own.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    /// Create a client that abandons any request after `timeout`.
    ///
    /// Must be longer than the server's long-poll hold time, or every
    /// idle poll will be reported as a failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built (e.g. the
    /// TLS backend fails to initialize).
    pub fn with_timeout(timeout: Duration) -> Result<Self, ReqwestHttpError> {
        Ok(Self {
            inner: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Wrap an already-configured [`reqwest::Client`].
    #[must_use]
    pub const fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    type Error = ReqwestHttpError;

    fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> BoxFuture<'static, Result<HttpResponse, Self::Error>> {
        let mut builder = self.inner.post(url);
        for &(name, value) in headers {
            builder = builder.header(name, value);
        }
        builder = builder.body(body);

        async move {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();

            let headers = resp
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_lowercase(), v.to_string()))
                })
                .collect();

            let body = resp.bytes().await?.to_vec();

            Ok(HttpResponse {
                status,
                body,
                headers,
            })
        }
        .boxed()
    }
}
