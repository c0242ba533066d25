//! # Webio Long-Poll
//!
//! A client-side bidirectional message channel over HTTP long-polling,
//! for hosts that cannot hold a socket open but can issue ordinary
//! HTTP requests.
//!
//! # Protocol
//!
//! Two fixed endpoints under a base URL. Every request carries the
//! session's client identity:
//!
//! ```text
//! ┌──────────┐                          ┌──────────┐
//! │  Client   │                          │  Server   │
//! └────┬─────┘                          └────┬─────┘
//!      │                                     │
//!      │  POST <base>/send                   │
//!      │  X-IO-ClientID: <client_id>         │
//!      │  Body: encoded message              │
//!      │ ──────────────────────────────────►  │
//!      │  (response ignored)                 │
//!      │ ◄──────────────────────────────────  │
//!      │                                     │
//!      │  POST <base>/recv                   │
//!      │  X-IO-ClientID: <client_id>         │
//!      │ ──────────────────────────────────►  │
//!      │           ... (blocks) ...          │
//!      │  200 + encoded message              │
//!      │ ◄──────────────────────────────────  │
//!      │                                     │
//!      │  POST <base>/recv   (immediately)   │
//!      │ ──────────────────────────────────►  │
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  PollingChannel                         │
//! │                                                        │
//! │  send(msg) ──► codec.encode ──► spawn POST /send       │
//! │                                                        │
//! │  handler(msg) ◄── codec.decode ◄── poll cycle          │
//! │                        POST /recv ◄── (schedules next) │
//! │                                                        │
//! │  pending poll slot: at most one live cycle or retry    │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod channel;
pub mod client_id;
pub mod codec;
pub mod config;
pub mod error;
pub mod http_client;
pub mod retry;

pub use channel::PollingChannel;
pub use client_id::ClientId;
pub use codec::{Codec, IdentityCodec, JsonCodec};
pub use config::ChannelConfig;
pub use retry::RetryPolicy;

/// Client identity header name, attached to every request.
pub const CLIENT_ID_HEADER: &str = "X-IO-ClientID";

/// Conventional path under which servers mount the two endpoints.
pub const DEFAULT_PREFIX: &str = "sparked.web.io";

/// Path of the outbound endpoint, relative to the base URL.
pub const SEND_PATH: &str = "send";

/// Path of the inbound long-poll endpoint, relative to the base URL.
pub const RECV_PATH: &str = "recv";
