//! Pooled HTTP client handle and its configuration.
//!
//! # Design
//! `Client` wraps a `ureq::Agent` (which owns the connection pool) together
//! with the buffer pool used for request bodies and the retry limits the
//! executor enforces. Cloning is cheap and clones share both pools, so one
//! client is meant to be built at startup and handed to every descriptor.
//!
//! The agent never follows redirects and never turns status codes into
//! errors: the executor needs to see 307 and 401 responses itself.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::buffer::BufferPool;
use crate::context::Context;
use crate::error::{ApiError, TransportError};
use crate::http::Response;
use crate::parser::Parsed;
use crate::request::RequestDescriptor;

/// Request timeout used when none is configured.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport settings for [`Client::with_config`].
///
/// Durations are written as whole seconds when (de)serialised. Missing
/// fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "seconds")]
    pub dial_timeout: Duration,
    pub max_idle_connections: usize,
    #[serde(with = "seconds")]
    pub idle_connection_timeout: Duration,
    #[serde(with = "seconds")]
    pub tls_handshake_timeout: Duration,
    #[serde(with = "seconds")]
    pub expect_continue_timeout: Duration,
    /// Upper bound on one request, from connect to the last body byte.
    /// Zero means [`FALLBACK_TIMEOUT`].
    #[serde(with = "seconds")]
    pub request_timeout: Duration,
    /// 307 hops followed per execute call.
    pub max_redirects: u32,
    /// Token renewals attempted per execute call.
    pub max_renewals: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
            max_idle_connections: 100,
            idle_connection_timeout: Duration::from_secs(90),
            tls_handshake_timeout: Duration::from_secs(10),
            expect_continue_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(300),
            max_redirects: 10,
            max_renewals: 3,
        }
    }
}

impl ClientConfig {
    pub(crate) fn effective_request_timeout(&self) -> Duration {
        if self.request_timeout.is_zero() {
            FALLBACK_TIMEOUT
        } else {
            self.request_timeout
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Shared by every descriptor that does not bring its own client, so those
/// calls still reuse pooled connections.
static FALLBACK_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::with_config(ClientConfig {
        request_timeout: FALLBACK_TIMEOUT,
        ..ClientConfig::default()
    })
});

#[derive(Clone)]
pub struct Client {
    agent: ureq::Agent,
    buffers: BufferPool,
    config: Arc<ClientConfig>,
}

/// Build a client with the default production settings.
pub fn new_http_client() -> Client {
    Client::with_config(ClientConfig::default())
}

impl Client {
    pub fn new() -> Self {
        new_http_client()
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_idle_connections(config.max_idle_connections)
            .max_idle_age(config.idle_connection_timeout)
            // ureq's connect phase includes the TLS handshake.
            .timeout_connect(Some(config.dial_timeout + config.tls_handshake_timeout))
            .timeout_await_100(Some(config.expect_continue_timeout))
            .timeout_global(Some(config.effective_request_timeout()))
            .build()
            .new_agent();
        Self {
            agent,
            buffers: BufferPool::new(),
            config: Arc::new(config),
        }
    }

    /// The client used for descriptors that do not carry one.
    pub fn fallback() -> Self {
        FALLBACK_CLIENT.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn agent(&self) -> &ureq::Agent {
        &self.agent
    }

    pub(crate) fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Execute `descriptor` with this client, see [`crate::execute`].
    pub fn execute(
        &self,
        ctx: &Context,
        mut descriptor: RequestDescriptor,
    ) -> Result<Response, TransportError> {
        descriptor.client = Some(self.clone());
        crate::executor::execute(ctx, descriptor)
    }

    /// Execute and classify `descriptor` with this client, see
    /// [`crate::parse_into`].
    pub fn parse_into<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        mut descriptor: RequestDescriptor,
    ) -> Result<Parsed<T>, ApiError> {
        descriptor.client = Some(self.clone());
        crate::parser::parse_into(ctx, descriptor)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
