//! Session state: credentials, cookies and the single-use protocol tokens.
//!
//! A [`Session`] is never mutated in place by the engine. Every response is
//! folded into it with [`Session::apply_response`], which consumes the old
//! value and returns the new one.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::HttpResponse;

pub const HEADER_SCNT: &str = "scnt";
pub const HEADER_SESSION_ID: &str = "X-Apple-ID-Session-Id";
pub const HEADER_SESSION_TOKEN: &str = "X-Apple-Session-Token";
pub const HEADER_ACCOUNT_COUNTRY: &str = "X-Apple-ID-Account-Country";
pub const HEADER_AUTH_ATTRIBUTES: &str = "X-Apple-Auth-Attributes";
pub const HEADER_TRUST_TOKEN: &str = "X-Apple-TwoSV-Trust-Token";

/// One cookie as received in a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Expiry as Unix seconds.
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub max_age: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    /// Parse a single `Set-Cookie` header value.
    ///
    /// The value is kept verbatim, surrounding quotes included. Returns `None`
    /// when the header has no `name=value` pair.
    pub fn parse(header: &str) -> Option<Cookie> {
        let raw = cookie::Cookie::parse(header).ok()?;
        Some(Cookie {
            name: raw.name().to_string(),
            value: raw.value().to_string(),
            domain: raw.domain().map(str::to_string),
            path: raw.path().map(str::to_string),
            expires: raw.expires_datetime().map(|at| at.unix_timestamp()),
            max_age: raw.max_age().map(|age| age.whole_seconds()),
            secure: raw.secure().unwrap_or(false),
            http_only: raw.http_only().unwrap_or(false),
        })
    }

    /// A cookie sent with `Max-Age=0` is a deletion.
    pub fn is_removal(&self) -> bool {
        self.max_age == Some(0)
    }
}

/// Authentication session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub cookies: BTreeMap<String, Cookie>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub trust_token: Option<String>,
    #[serde(default)]
    pub auth_attributes: Option<String>,
    #[serde(default)]
    pub scnt: Option<String>,
    #[serde(default)]
    pub account_country: Option<String>,
}

impl Session {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Restore a persisted session.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the session as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// A trusted device can skip the two-factor challenge on the next login.
    pub fn is_trusted(&self) -> bool {
        self.session_token.is_some() && self.trust_token.is_some()
    }

    /// Merge cookies into the jar: `Max-Age=0` deletes, anything else replaces.
    pub fn with_cookies<I>(mut self, cookies: I) -> Session
    where
        I: IntoIterator<Item = Cookie>,
    {
        for cookie in cookies {
            if cookie.is_removal() {
                self.cookies.remove(&cookie.name);
            } else {
                self.cookies.insert(cookie.name.clone(), cookie);
            }
        }
        self
    }

    /// Fold a response into the session: cookies first, then protocol headers.
    ///
    /// Headers absent from the response keep their previous value.
    pub fn apply_response(self, response: &HttpResponse) -> Session {
        let cookies: Vec<Cookie> = response
            .header_all("Set-Cookie")
            .filter_map(Cookie::parse)
            .collect();
        let mut session = self.with_cookies(cookies);

        let header = |name: &str| response.header(name).map(str::to_string);
        session.scnt = header(HEADER_SCNT).or(session.scnt);
        session.session_id = header(HEADER_SESSION_ID).or(session.session_id);
        session.session_token = header(HEADER_SESSION_TOKEN).or(session.session_token);
        session.account_country = header(HEADER_ACCOUNT_COUNTRY).or(session.account_country);
        session.auth_attributes = header(HEADER_AUTH_ATTRIBUTES).or(session.auth_attributes);
        session
    }

    pub fn with_trust_token(mut self, token: impl Into<String>) -> Session {
        self.trust_token = Some(token.into());
        self
    }

    /// `Cookie` request header value, or `None` for an empty jar.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .values()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Protocol headers the auth endpoints expect to be echoed back.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        [
            (HEADER_SCNT, &self.scnt),
            (HEADER_SESSION_ID, &self.session_id),
            (HEADER_AUTH_ATTRIBUTES, &self.auth_attributes),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
        .collect()
    }
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
