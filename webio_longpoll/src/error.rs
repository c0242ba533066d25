//! Error types for the HTTP long-poll channel.
//!
//! None of these cross the public `send` / `recv` boundary. Poll and send
//! failures are logged, and handed to the failure handler if the host
//! registered one with [`PollingChannel::on_failure`].
//!
//! [`PollingChannel::on_failure`]: crate::PollingChannel::on_failure

use thiserror::Error;

/// A string that is not a well-formed client identity.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvalidClientId {
    /// Wrong number of characters.
    #[error("client id must be 32 characters, got {0}")]
    Length(usize),

    /// A character outside `[a-z0-9]`.
    #[error("invalid client id character {0:?}")]
    Character(char),
}

/// Problem with the channel configuration.
///
/// The channel refuses to be constructed from a bad configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL did not parse.
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Only `http` and `https` are supported.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// The URL cannot have endpoint paths appended (e.g. `data:` URLs).
    #[error("URL cannot be used as a base: {0}")]
    CannotBeABase(String),

    /// The channel was constructed outside a Tokio runtime.
    #[error("no async runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// A failed inbound poll cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    /// The HTTP request did not complete (connection refused, dropped, ...).
    #[error("HTTP request error: {0}")]
    Request(String),

    /// The server answered with something other than 200.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body, lossily decoded.
        body: String,
    },

    /// The server answered 200 but the body did not decode.
    #[error(
        "message decode error ({}): {reason}",
        .content_type.as_deref().unwrap_or("no content type")
    )]
    Decode {
        /// Why the codec rejected the body.
        reason: String,
        /// The response's `Content-Type`, if it sent one.
        content_type: Option<String>,
    },
}

/// A failed outbound send. Sends are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendFailure {
    /// The message could not be encoded; nothing was sent.
    #[error("message encode error: {0}")]
    Encode(String),

    /// The HTTP request did not complete.
    #[error("HTTP request error: {0}")]
    Request(String),

    /// The server rejected the message.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body, lossily decoded.
        body: String,
    },
}

/// What a registered failure handler is told about.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelFailure {
    /// An inbound poll cycle failed.
    #[error("poll failed: {0}")]
    Poll(#[from] PollError),

    /// An outbound send failed.
    #[error("send failed: {0}")]
    Send(#[from] SendFailure),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_body() {
        let err = PollError::UnexpectedStatus {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "unexpected status 502: bad gateway");
    }

    #[test]
    fn decode_error_names_content_type() {
        let typed = PollError::Decode {
            reason: "expected value".into(),
            content_type: Some("text/html".into()),
        };
        assert_eq!(
            typed.to_string(),
            "message decode error (text/html): expected value"
        );

        let untyped = PollError::Decode {
            reason: "expected value".into(),
            content_type: None,
        };
        assert_eq!(
            untyped.to_string(),
            "message decode error (no content type): expected value"
        );
    }

    #[test]
    fn failure_wraps_direction() {
        let poll: ChannelFailure = PollError::Request("refused".into()).into();
        assert_eq!(poll.to_string(), "poll failed: HTTP request error: refused");

        let send: ChannelFailure = SendFailure::Encode("nan".into()).into();
        assert_eq!(send.to_string(), "send failed: message encode error: nan");
    }
}
