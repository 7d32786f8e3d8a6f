//! Request primitive: build one request from the session, execute it, and
//! thread the response's cookies and tokens back into the session.

use serde::Serialize;
use tracing::trace;

use crate::config::WIDGET_KEY;
use crate::error::Result;
use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::response::RawResponse;
use crate::session::Session;

/// Produces headers from the current session.
pub type HeaderFn = fn(&Session) -> Vec<(String, String)>;

/// JSON content negotiation headers.
pub fn json_headers(_: &Session) -> Vec<(String, String)> {
    vec![
        ("Accept".to_string(), "application/json".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ]
}

/// `Cookie` header from the session jar.
pub fn cookie_headers(session: &Session) -> Vec<(String, String)> {
    session
        .cookie_header()
        .map(|value| vec![("Cookie".to_string(), value)])
        .unwrap_or_default()
}

/// Identity-service widget headers plus the echoed protocol tokens.
pub fn auth_headers(session: &Session) -> Vec<(String, String)> {
    let mut headers = vec![
        ("X-Apple-OAuth-Client-Id".to_string(), WIDGET_KEY.to_string()),
        ("X-Apple-OAuth-Client-Type".to_string(), "firstPartyAuth".to_string()),
        ("X-Apple-OAuth-Redirect-URI".to_string(), "https://www.icloud.com".to_string()),
        ("X-Apple-OAuth-Require-Grant-Code".to_string(), "true".to_string()),
        ("X-Apple-OAuth-Response-Mode".to_string(), "web_message".to_string()),
        ("X-Apple-OAuth-Response-Type".to_string(), "code".to_string()),
        ("X-Apple-Widget-Key".to_string(), WIDGET_KEY.to_string()),
    ];
    headers.extend(session.auth_headers());
    headers
}

/// Request descriptor whose headers are resolved against the session at send
/// time.
#[derive(Clone)]
pub struct ApiRequest {
    method: HttpMethod,
    url: String,
    header_fns: Vec<HeaderFn>,
    headers: Vec<(String, String)>,
    body: Option<bytes::Bytes>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            header_fns: vec![json_headers as HeaderFn, cookie_headers],
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header_fn(mut self, header_fn: HeaderFn) -> Self {
        self.header_fns.push(header_fn);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?.into());
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve into a transport request for this session.
    pub fn build(&self, session: &Session) -> HttpRequest {
        let mut request = HttpRequest::new(self.method, self.url.clone());
        for header_fn in &self.header_fns {
            for (key, value) in header_fn(session) {
                request = request.header(key, value);
            }
        }
        for (key, value) in &self.headers {
            request = request.header(key.clone(), value.clone());
        }
        request.body = self.body.clone();
        request
    }
}

/// Execute `request` and return the session updated from the response.
pub async fn send(
    transport: &dyn HttpTransport,
    session: Session,
    request: &ApiRequest,
) -> Result<(Session, RawResponse)> {
    let http = request.build(&session);
    trace!(url = %http.url, "executing");
    let response = transport.execute(http).await?;
    let session = session.apply_response(&response);
    Ok((session, RawResponse::new(response)))
}
