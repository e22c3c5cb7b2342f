//! Description of one outbound HTTP call.
//!
//! # Design
//! A `RequestDescriptor` is built by the caller and moved into a single
//! execute call. The executor rewrites `url` when it follows a 307 and the
//! `Authorization` header after a token renewal; nothing else changes, and
//! `body` is only ever read.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use url::Url;

use crate::client::Client;
use crate::context::Context;
use crate::error::{RenewError, TransportError};
use crate::http::HttpMethod;

pub const AUTHORIZATION: &str = "Authorization";

/// Characters escaped when the substituted path is written back: everything
/// but unreserved characters and the sub-delimiters a path may carry.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Issues a fresh bearer token after the server answered 401.
pub trait TokenRenewer: Send + Sync {
    fn renew(&self, ctx: &Context) -> Result<String, RenewError>;
}

impl<F> TokenRenewer for F
where
    F: Fn(&Context) -> Result<String, RenewError> + Send + Sync,
{
    fn renew(&self, ctx: &Context) -> Result<String, RenewError> {
        self(ctx)
    }
}

#[derive(Clone)]
pub struct RequestDescriptor {
    /// Shared client handle; `None` uses [`Client::fallback`].
    pub client: Option<Client>,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub query: BTreeMap<String, String>,
    /// `:<key>` placeholders in the URL path and their replacement.
    pub params: BTreeMap<String, String>,
    renewer: Option<Arc<dyn TokenRenewer>>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            client: None,
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: Vec::new(),
            query: BTreeMap::new(),
            params: BTreeMap::new(),
            renewer: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the body and mark it as JSON.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// Set `Authorization: Bearer <token>`.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.set_bearer(token);
        self
    }

    /// Set the bearer token and register `renewer`, which is called for a
    /// new token whenever the server answers 401.
    pub fn with_bearer_renewer(
        mut self,
        token: &str,
        renewer: impl TokenRenewer + 'static,
    ) -> Self {
        self.set_bearer(token);
        self.renewer = Some(Arc::new(renewer));
        self
    }

    /// Replace any `Authorization` header, whatever its case.
    pub(crate) fn set_bearer(&mut self, token: &str) {
        self.headers
            .retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION));
        self.headers
            .insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
    }

    pub(crate) fn renewer(&self) -> Option<Arc<dyn TokenRenewer>> {
        self.renewer.clone()
    }

    pub fn has_renewer(&self) -> bool {
        self.renewer.is_some()
    }

    /// The URL that goes on the wire: `url` with every query entry appended
    /// and every `:<key>` in the path replaced by its value.
    ///
    /// Substitution is a plain replace-all on the decoded path text, so a key
    /// that is a prefix of another key (`id`, `idx`) can clobber it. Values
    /// are taken literally and escaped when the path is written back.
    pub fn resolved_url(&self) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.url).map_err(|source| TransportError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        if !self.params.is_empty() {
            let mut path = percent_decode_str(url.path())
                .decode_utf8_lossy()
                .into_owned();
            for (key, value) in &self.params {
                path = path.replace(&format!(":{key}"), value);
            }
            let encoded = utf8_percent_encode(&path, PATH_ENCODE_SET).to_string();
            url.set_path(&encoded);
        }
        Ok(url)
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &redacted_headers(&self.headers))
            .field("query", &self.query)
            .field("params", &self.params)
            .field("body_len", &self.body.len())
            .field("renewer", &self.renewer.is_some())
            .finish()
    }
}

/// Headers safe to log: the credential is replaced by its scheme.
pub(crate) fn redacted_headers(headers: &BTreeMap<String, String>) -> BTreeMap<&str, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name.eq_ignore_ascii_case(AUTHORIZATION) {
                match value.split_once(' ') {
                    Some((scheme, _)) => format!("{scheme} <redacted>"),
                    None => "<redacted>".to_string(),
                }
            } else {
                value.clone()
            };
            (name.as_str(), shown)
        })
        .collect()
}
