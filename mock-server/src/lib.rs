use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

pub const DEFAULT_VALID_TOKEN: &str = "T2";

/// One request as the server saw it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub request_id: Option<String>,
    pub body: Vec<u8>,
}

/// Body returned by the echo and protected routes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub ok: bool,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Clone, Debug)]
pub struct ServerState {
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    valid_token: Arc<str>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::with_token(DEFAULT_VALID_TOKEN)
    }
}

impl ServerState {
    /// State whose `/protected` route accepts `Bearer <token>`.
    pub fn with_token(token: &str) -> Self {
        Self {
            requests: Arc::default(),
            valid_token: Arc::from(token),
        }
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// Recorded requests, for callers outside the runtime.
    pub fn requests_blocking(&self) -> Vec<RecordedRequest> {
        self.requests.blocking_read().clone()
    }

    async fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) {
        let header_text = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let request = RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            authorization: header_text(header::AUTHORIZATION.as_str()),
            request_id: header_text("x-request-id"),
            body: body.to_vec(),
        };
        tracing::debug!(method = %request.method, path = %request.path, "recorded request");
        self.requests.write().await.push(request);
    }
}

pub fn app(state: ServerState) -> Router {
    Router::new()
        .route("/echo/{*rest}", any(echo))
        .route("/protected", any(protected))
        .route("/redirect/{*target}", any(redirect))
        .route("/redirect-relative/{*target}", any(redirect_relative))
        .route("/redirect-missing", any(redirect_missing))
        .route("/redirect-loop", any(redirect_loop))
        .route("/status/{code}", any(status))
        .route("/bytes/{len}", any(bytes))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: ServerState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

fn echo_of(method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Echo {
    Echo {
        ok: true,
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

async fn echo(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Echo> {
    state.record(&method, &uri, &headers, &body).await;
    Json(echo_of(&method, &uri, &headers, &body))
}

async fn protected(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body).await;
    let expected = format!("Bearer {}", state.valid_token);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str());
    if authorized {
        Json(echo_of(&method, &uri, &headers, &body)).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "token expired" })),
        )
            .into_response()
    }
}

fn temporary_redirect(location: &str) -> Response {
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location.to_string())]).into_response()
}

/// 307 to `http://<host>/<target>`.
async fn redirect(
    State(state): State<ServerState>,
    Path(target): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body).await;
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    temporary_redirect(&format!("http://{host}/{target}"))
}

async fn redirect_relative(
    State(state): State<ServerState>,
    Path(target): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body).await;
    temporary_redirect(&format!("/{target}"))
}

async fn redirect_missing(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.record(&method, &uri, &headers, &body).await;
    StatusCode::TEMPORARY_REDIRECT
}

async fn redirect_loop(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body).await;
    temporary_redirect("/redirect-loop")
}

/// Respond with `code` and a small JSON body. `?body=` overrides the body
/// with raw text.
async fn status(
    State(state): State<ServerState>,
    Path(code): Path<u16>,
    Query(params): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &uri, &headers, &body).await;
    let Ok(code) = StatusCode::from_u16(code) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match params.get("body") {
        Some(text) => (code, text.clone()).into_response(),
        None => (code, Json(serde_json::json!({ "status": code.as_u16() }))).into_response(),
    }
}

async fn bytes(Path(len): Path<usize>) -> Vec<u8> {
    vec![b'a'; len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_to_json() {
        let echo = Echo {
            ok: true,
            method: "GET".to_string(),
            path: "/echo/a".to_string(),
            query: None,
            authorization: None,
            body: String::new(),
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["path"], "/echo/a");
        assert!(json["query"].is_null());
    }

    #[test]
    fn default_state_accepts_default_token() {
        let state = ServerState::default();
        assert_eq!(&*state.valid_token, DEFAULT_VALID_TOKEN);
        assert!(state.requests_blocking().is_empty());
    }

    #[tokio::test]
    async fn record_captures_request_details() {
        let state = ServerState::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer T1".parse().unwrap());
        headers.insert("x-request-id", "abc".parse().unwrap());
        let uri: Uri = "/echo/a?x=1".parse().unwrap();
        state
            .record(&Method::POST, &uri, &headers, &Bytes::from_static(b"hi"))
            .await;

        let recorded = state.requests().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].path, "/echo/a");
        assert_eq!(recorded[0].query.as_deref(), Some("x=1"));
        assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer T1"));
        assert_eq!(recorded[0].request_id.as_deref(), Some("abc"));
        assert_eq!(recorded[0].body, b"hi");
    }
}
