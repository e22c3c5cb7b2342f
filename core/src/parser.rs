//! Drain, log and classify a response.
//!
//! # Design
//! `parse_into` executes the descriptor, reads the whole body, logs it
//! (elided when large) and hands the drained response to `classify`.
//! `classify` is pure so the status policy can be tested without a server:
//!
//! - 500 and above is a server error and the body is not decoded;
//! - anything below 500 is decoded as JSON into the caller's type, so 4xx
//!   error payloads are decoded too and the caller tells them apart by
//!   status.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::context::Context;
use crate::error::{ApiError, StatusBand};
use crate::executor::execute;
use crate::http::HttpResponse;
use crate::request::RequestDescriptor;

/// Bodies longer than this are not written to the log.
pub const MAX_LOGGED_BODY_BYTES: usize = 10_000;

pub const ELIDED_BODY: &str = "...(too large to print)";

/// A decoded response together with the response it came from.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub response: HttpResponse,
    pub value: T,
}

impl<T> Parsed<T> {
    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Execute `descriptor` and decode the response body into `T`.
///
/// On [`ApiError::ServerError`] and [`ApiError::Decode`] the drained
/// response is still available through [`ApiError::response`].
pub fn parse_into<T: DeserializeOwned>(
    ctx: &Context,
    descriptor: RequestDescriptor,
) -> Result<Parsed<T>, ApiError> {
    let response = execute(ctx, descriptor)?;
    let url = response.url().to_string();
    let response = response
        .into_http_response()
        .map_err(|source| ApiError::ReadBody { url, source })?;

    debug!(
        url = %response.url,
        status_code = response.status,
        body = %loggable_body(&response.body),
        "response body"
    );

    classify(response)
}

/// Apply the status policy to a drained response.
pub fn classify<T: DeserializeOwned>(response: HttpResponse) -> Result<Parsed<T>, ApiError> {
    if response.status >= 500 {
        return Err(ApiError::ServerError { response });
    }
    match serde_json::from_slice(&response.body) {
        Ok(value) => Ok(Parsed { response, value }),
        Err(source) => Err(ApiError::Decode {
            band: StatusBand::of(response.status),
            response,
            source,
        }),
    }
}

/// The body as it should appear in a log line.
pub fn loggable_body(body: &[u8]) -> Cow<'_, str> {
    if body.len() > MAX_LOGGED_BODY_BYTES {
        Cow::Borrowed(ELIDED_BODY)
    } else {
        String::from_utf8_lossy(body)
    }
}
