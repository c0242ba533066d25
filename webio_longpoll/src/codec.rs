//! Message codecs.
//!
//! Application messages are opaque to the channel; a [`Codec`] turns them
//! into wire payloads and back. [`JsonCodec`] is the default.
//! [`IdentityCodec`] passes bytes through untouched, for payloads that are
//! already encoded.

use core::{convert::Infallible, fmt, marker::PhantomData};

use serde::{Serialize, de::DeserializeOwned};

/// An encode/decode pair between application messages and wire bytes.
pub trait Codec: Send + Sync + 'static {
    /// The application-level message type.
    type Message: Send + 'static;

    /// Encode or decode failure.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Encode a message into a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be represented on the wire.
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>, Self::Error>;

    /// Decode a response body into a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoding.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Message, Self::Error>;

    /// Decode the body of a `200` answer to a poll, or `None` if it
    /// carries no message.
    ///
    /// By default an empty body means the server's hold time ran out.
    /// Codecs for which empty bytes are a valid message override this.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-empty body is not a valid encoding.
    fn decode_poll(&self, bytes: &[u8]) -> Result<Option<Self::Message>, Self::Error> {
        if bytes.is_empty() {
            return Ok(None);
        }
        self.decode(bytes).map(Some)
    }

    /// The `Content-Type` sent with encoded messages.
    fn content_type(&self) -> &'static str;
}

/// Structured-text codec backed by [`serde_json`].
///
/// `M` defaults to [`serde_json::Value`] for untyped use.
pub struct JsonCodec<M = serde_json::Value> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> JsonCodec<M> {
    /// Create a JSON codec for `M`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for JsonCodec<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for JsonCodec<M> {}

impl<M> fmt::Debug for JsonCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("message", &core::any::type_name::<M>())
            .finish()
    }
}

impl<M> Codec for JsonCodec<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    type Message = M;
    type Error = serde_json::Error;

    fn encode(&self, message: &M) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(message)
    }

    fn decode(&self, bytes: &[u8]) -> Result<M, Self::Error> {
        serde_json::from_slice(bytes)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Pass-through codec: the message is the wire payload.
///
/// Every poll answer is a message, including an empty body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    type Message = Vec<u8>;
    type Error = Infallible;

    fn encode(&self, message: &Vec<u8>) -> Result<Vec<u8>, Self::Error> {
        Ok(message.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, Self::Error> {
        Ok(bytes.to_vec())
    }

    fn decode_poll(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        self.decode(bytes).map(Some)
    }

    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }
}
