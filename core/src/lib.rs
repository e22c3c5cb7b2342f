//! Outbound HTTP request executor for calling external APIs.
//!
//! # Overview
//! A caller describes one call as a [`RequestDescriptor`] and hands it to
//! [`execute`] (live response) or [`parse_into`] (drained, classified and
//! decoded response). The executor retries in place on exactly two
//! conditions: a 307 with a `Location`, and a 401 when the descriptor
//! carries a [`TokenRenewer`]. Everything else, including transport
//! failures, goes straight back to the caller.
//!
//! # Design
//! - Calls block the calling thread; a [`Context`] carries cancellation and
//!   a deadline through the whole retry loop.
//! - [`Client`] wraps a pooled `ureq` agent and a [`BufferPool`]. Build one
//!   at startup and share it; descriptors without a client fall back to
//!   [`Client::fallback`].
//! - Redirect hops and renewals are bounded by [`ClientConfig`].
//! - Logging goes through `tracing` at debug level; the crate never installs
//!   a subscriber.

pub mod buffer;
pub mod client;
pub mod context;
pub mod error;
pub mod executor;
pub mod http;
pub mod parser;
pub mod request;

pub use buffer::{BufferPool, PooledBuffer};
pub use client::{new_http_client, Client, ClientConfig};
pub use context::Context;
pub use error::{ApiError, RenewError, RetryKind, StatusBand, TransportError};
pub use executor::execute;
pub use http::{HttpMethod, HttpResponse, Response};
pub use parser::{classify, parse_into, Parsed};
pub use request::{RequestDescriptor, TokenRenewer};
