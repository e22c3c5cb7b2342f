//! The request loop: send, then follow 307s and renew expired tokens in
//! place until the server gives a final answer.
//!
//! # Design
//! One call walks a small state machine:
//!
//! ```text
//! Sending ──307 + Location──▶ RedirectRetry ──▶ Sending
//!    │    ──401 + renewer───▶ RenewRetry    ──▶ Sending
//!    │    ──anything else───▶ Done
//!    └────transport error───▶ Failed
//! ```
//!
//! The descriptor's URL changes only on the redirect transition and its
//! `Authorization` header only on the renewal transition. The send buffer is
//! refilled from the untouched original body before every attempt.
//! Transport errors are never retried here.
//!
//! Each send runs on its own thread while the caller waits for the answer
//! and polls the context's cancel flag. A cancelled caller returns at once
//! and the abandoned send finishes, or times out, in the background.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::buffer::PooledBuffer;
use crate::client::Client;
use crate::context::Context;
use crate::error::{RetryKind, TransportError};
use crate::http::Response;
use crate::parser::loggable_body;
use crate::request::{redacted_headers, RequestDescriptor, TokenRenewer};

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const TEMPORARY_REDIRECT: u16 = 307;
const UNAUTHORIZED: u16 = 401;

/// How often a caller waiting on the wire looks at its cancel flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

enum Attempt {
    Sending,
    RedirectRetry { location: String },
    RenewRetry { renewer: Arc<dyn TokenRenewer> },
    Done(Response),
    Failed(TransportError),
}

/// Send `descriptor`, following temporary redirects and renewing the bearer
/// token on 401 when a renewer is registered.
///
/// A 401 without a renewer, like every status other than 307, is returned
/// as an ordinary response.
pub fn execute(
    ctx: &Context,
    mut descriptor: RequestDescriptor,
) -> Result<Response, TransportError> {
    let client = descriptor.client.clone().unwrap_or_else(Client::fallback);
    let request_id = resolve_request_id(&descriptor);
    let span = tracing::debug_span!(
        "http_request",
        request_id = %request_id,
        method = %descriptor.method,
    );
    let _entered = span.enter();

    let mut buf = Some(client.buffers().acquire());
    let mut redirects = 0u32;
    let mut renewals = 0u32;
    let mut state = Attempt::Sending;

    loop {
        state = match state {
            Attempt::Sending => {
                match send_once(ctx, &client, &descriptor, &request_id, &mut buf) {
                    Ok(response) => next_attempt(&descriptor, response),
                    Err(err) => Attempt::Failed(err),
                }
            }
            Attempt::RedirectRetry { location } => {
                redirects += 1;
                if redirects > client.config().max_redirects {
                    Attempt::Failed(TransportError::RetryLimitExceeded {
                        kind: RetryKind::Redirect,
                        limit: client.config().max_redirects,
                        url: descriptor.url.clone(),
                    })
                } else {
                    debug!(from = %descriptor.url, to = %location, "following temporary redirect");
                    descriptor.url = location;
                    Attempt::Sending
                }
            }
            Attempt::RenewRetry { renewer } => {
                renewals += 1;
                if renewals > client.config().max_renewals {
                    Attempt::Failed(TransportError::RetryLimitExceeded {
                        kind: RetryKind::Renewal,
                        limit: client.config().max_renewals,
                        url: descriptor.url.clone(),
                    })
                } else {
                    renew_bearer(ctx, &mut descriptor, renewer.as_ref())
                }
            }
            Attempt::Done(response) => return Ok(response),
            Attempt::Failed(err) => return Err(err),
        };
    }
}

fn resolve_request_id(descriptor: &RequestDescriptor) -> String {
    descriptor
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(REQUEST_ID_HEADER))
        .map(|(_, value)| value.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn send_once(
    ctx: &Context,
    client: &Client,
    descriptor: &RequestDescriptor,
    request_id: &str,
    buf: &mut Option<PooledBuffer>,
) -> Result<Response, TransportError> {
    ctx.check()?;
    let mut body = buf.take().unwrap_or_else(|| client.buffers().acquire());
    body.refill(&descriptor.body);

    let url = descriptor.resolved_url()?;
    let mut builder = ureq::http::Request::builder()
        .method(descriptor.method.as_str())
        .uri(url.as_str());
    for (name, value) in &descriptor.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !descriptor
        .headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case(REQUEST_ID_HEADER))
    {
        builder = builder.header(REQUEST_ID_HEADER, request_id);
    }
    let request = builder.body(()).map_err(|source| TransportError::Build {
        url: url.to_string(),
        source,
    })?;

    debug!(
        url = %url,
        headers = ?redacted_headers(&descriptor.headers),
        "making HTTP request"
    );
    debug!(url = %url, body = %loggable_body(&body), "request body");

    let with_body = !body.is_empty() || descriptor.method.sends_empty_body();
    let timeout = request_timeout(ctx, client);
    let agent = client.agent().clone();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("http-request".to_string())
        .spawn(move || {
            let sent = if with_body {
                dispatch(&agent, request.map(|()| &body[..]), timeout)
            } else {
                dispatch(&agent, request, timeout)
            };
            // Nobody is listening any more if the caller was cancelled.
            let _ = tx.send((sent, body));
        })
        .map_err(|err| TransportError::from_ureq(url.as_str(), ureq::Error::Io(err)))?;

    let sent = loop {
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok((sent, body)) => {
                *buf = Some(body);
                break sent;
            }
            Err(RecvTimeoutError::Timeout) => {
                if ctx.is_cancelled() {
                    debug!(url = %url, "request cancelled while in flight");
                    return Err(TransportError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                let err = io::Error::other("request thread exited without a response");
                return Err(TransportError::from_ureq(url.as_str(), ureq::Error::Io(err)));
            }
        }
    };
    let response = sent.map_err(|err| TransportError::from_ureq(url.as_str(), err))?;

    Ok(Response::new(descriptor.url.clone(), response))
}

fn dispatch<S: ureq::AsSendBody>(
    agent: &ureq::Agent,
    request: ureq::http::Request<S>,
    timeout: Duration,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    let request = agent
        .configure_request(request)
        .timeout_global(Some(timeout))
        .build();
    agent.run(request)
}

/// The client's request timeout, shortened to what is left of the deadline.
fn request_timeout(ctx: &Context, client: &Client) -> Duration {
    let configured = client.config().effective_request_timeout();
    match ctx.remaining() {
        Some(remaining) => configured.min(remaining),
        None => configured,
    }
}

fn next_attempt(descriptor: &RequestDescriptor, response: Response) -> Attempt {
    let status = response.status();
    if status == TEMPORARY_REDIRECT {
        let location = response
            .header("Location")
            .filter(|location| !location.is_empty())
            .map(str::to_owned);
        return match location {
            Some(location) => match redirect_target(&descriptor.url, &location) {
                Ok(location) => Attempt::RedirectRetry { location },
                Err(err) => Attempt::Failed(err),
            },
            None => Attempt::Failed(TransportError::MissingLocation {
                url: descriptor.url.clone(),
                response: Box::new(response),
            }),
        };
    }
    match (status, descriptor.renewer()) {
        (UNAUTHORIZED, Some(renewer)) => {
            debug!("got 401 response, token renewer function is provided, renewing a token");
            Attempt::RenewRetry { renewer }
        }
        _ => {
            debug!(url = %descriptor.url, status, "HTTP response status");
            Attempt::Done(response)
        }
    }
}

/// Resolve a `Location` value against the URL that produced it, so relative
/// redirects work too.
fn redirect_target(current: &str, location: &str) -> Result<String, TransportError> {
    let base = url::Url::parse(current).map_err(|source| TransportError::InvalidUrl {
        url: current.to_string(),
        source,
    })?;
    base.join(location)
        .map(String::from)
        .map_err(|source| TransportError::InvalidUrl {
            url: location.to_string(),
            source,
        })
}

fn renew_bearer(
    ctx: &Context,
    descriptor: &mut RequestDescriptor,
    renewer: &dyn TokenRenewer,
) -> Attempt {
    if let Err(err) = ctx.check() {
        return Attempt::Failed(err);
    }
    match renewer.renew(ctx) {
        Ok(token) => {
            descriptor.set_bearer(&token);
            Attempt::Sending
        }
        Err(source) => Attempt::Failed(TransportError::Renewal { source }),
    }
}
