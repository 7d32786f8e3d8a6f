//! Client configuration: endpoints, retry budgets and snapshot locations.

use std::path::PathBuf;
use std::time::Duration;

/// Identity service base URL (sign-in, two-factor, trust).
pub const AUTH_BASE: &str = "https://idmsa.apple.com/appleauth/auth";

/// Setup service base URL (account login, session validation).
pub const SETUP_BASE: &str = "https://setup.icloud.com/setup/ws/1";

/// Web origin expected by every endpoint.
pub const WEB_ORIGIN: &str = "https://www.icloud.com";

/// Client id sent in the OAuth widget headers.
pub const WIDGET_KEY: &str = "d39ba9916b7251055b22c7f910e2ea796ee65e98b2ddecea8f5dde8d9d1a815d";

/// Base URLs of the authentication services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_base: String,
    pub setup_base: String,
    pub origin: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_base: AUTH_BASE.to_string(),
            setup_base: SETUP_BASE.to_string(),
            origin: WEB_ORIGIN.to_string(),
        }
    }
}

impl Endpoints {
    /// Point both services at one host, e.g. a mock server.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_base: format!("{}/appleauth/auth", base),
            setup_base: format!("{}/setup/ws/1", base),
            origin: WEB_ORIGIN.to_string(),
        }
    }
}

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Sleep between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Retry budget for transport failures.
    pub const fn transport() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }

    /// Retry budget for document update write conflicts.
    pub const fn conflict() -> Self {
        Self::new(5, Duration::from_millis(100))
    }

    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Settings for a drive client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub transport_retry: RetryPolicy,
    pub conflict_retry: RetryPolicy,
    pub session_file: PathBuf,
    pub account_file: PathBuf,
    pub cache_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            transport_retry: RetryPolicy::transport(),
            conflict_retry: RetryPolicy::conflict(),
            session_file: PathBuf::from("data/last-session.json"),
            account_file: PathBuf::from("data/account-data.json"),
            cache_file: PathBuf::from("data/drive-cache.json"),
        }
    }
}
