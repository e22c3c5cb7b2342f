//! HTTP types shared by the executor and the response parser.
//!
//! # Design
//! `Response` is the live wire response handed back by the executor: the
//! status line and headers are available immediately, the body is still a
//! stream owned by the connection. `HttpResponse` is the same response after
//! the body has been drained, described as plain data so it can be attached
//! to errors and inspected by the caller after classification.

use std::borrow::Cow;
use std::fmt;
use std::io::Read;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Whether the method carries a request body even when it is empty.
    ///
    /// `POST`, `PUT` and `PATCH` always send a (possibly zero-length) body;
    /// the other methods omit it entirely when there is nothing to send.
    pub(crate) fn sends_empty_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response whose body has not been read yet.
///
/// Returned by [`crate::execute`]. Dropping it closes the body stream.
pub struct Response {
    url: String,
    inner: ureq::http::Response<ureq::Body>,
}

impl Response {
    pub(crate) fn new(url: String, inner: ureq::http::Response<ureq::Body>) -> Self {
        Self { url, inner }
    }

    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// The URL the final request was sent to, before query parameters and
    /// path substitution were applied. After a redirect chain this is the
    /// last `Location` followed.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// First value of the named header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.inner
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }

    /// Drain the body into memory and release the stream.
    pub fn into_http_response(mut self) -> std::io::Result<HttpResponse> {
        let mut body = Vec::new();
        self.inner.body_mut().as_reader().read_to_end(&mut body)?;
        Ok(HttpResponse {
            status: self.status(),
            headers: self.headers(),
            url: self.url,
            body,
        })
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status())
            .field("url", &self.url)
            .field("headers", &self.headers())
            .finish_non_exhaustive()
    }
}

/// A response with its body fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// The body as text, with invalid UTF-8 replaced.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
