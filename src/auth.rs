//! Authentication state machine.
//!
//! `Unauthenticated -> SignedIn -> [TrustEstablished] -> AccountLoggedIn`.
//! Each step depends on cookies and tokens set by the previous one, so the
//! steps always run strictly in order against the session returned by the
//! step before.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument};

use crate::config::{Endpoints, RetryPolicy};
use crate::error::{DriveError, Result};
use crate::http::HttpTransport;
use crate::middleware::{operation, retry_on};
use crate::models::AccountData;
use crate::request::{auth_headers, send, ApiRequest};
use crate::response::validate;
use crate::session::{Session, HEADER_TRUST_TOKEN};

/// Two-factor challenge type that requires a security code.
pub const HSA2: &str = "hsa2";

/// Progress of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    SignedIn { hsa2: bool },
    TrustEstablished,
    AccountLoggedIn,
}

/// Source of the one-time security code.
#[async_trait]
pub trait CodePrompt: Send + Sync {
    async fn get_code(&self) -> Result<String>;
}

/// Reads the security code from standard input.
pub struct StdinCodePrompt;

#[async_trait]
impl CodePrompt for StdinCodePrompt {
    async fn get_code(&self) -> Result<String> {
        eprint!("Enter the two-factor code: ");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| DriveError::CodePrompt(e.to_string()))?;
        let code = line.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(DriveError::CodePrompt(format!("not a numeric code: {:?}", code)));
        }
        Ok(code.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    account_name: &'a str,
    password: &'a str,
    trust_tokens: Vec<&'a str>,
    remember_me: bool,
}

/// Body of a 409 sign-in response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInChallenge {
    #[serde(default)]
    auth_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SecurityCode<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SecurityCodeRequest<'a> {
    security_code: SecurityCode<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountLoginRequest<'a> {
    ds_web_auth_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    trust_token: Option<&'a str>,
    account_country_code: Option<&'a str>,
    #[serde(rename = "extended_login")]
    extended_login: bool,
}

/// Runs the login sequence against the identity and setup services.
pub struct Authenticator {
    transport: Arc<dyn HttpTransport>,
    prompt: Arc<dyn CodePrompt>,
    endpoints: Endpoints,
    retry: RetryPolicy,
}

impl Authenticator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        prompt: Arc<dyn CodePrompt>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            transport,
            prompt,
            endpoints,
            retry: RetryPolicy::transport(),
        }
    }

    /// Retry budget for transport failures anywhere in the sequence.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Log in from `session` and return the authorized session with account
    /// data. A transport failure re-runs the whole sequence.
    pub async fn authenticate(&self, session: Session) -> Result<(Session, AccountData)> {
        let login = operation(move |session: Session| self.authenticate_once(session));
        retry_on(self.retry, DriveError::is_transport, login)(session).await
    }

    #[instrument(skip_all, fields(user = %session.username))]
    async fn authenticate_once(&self, session: Session) -> Result<(Session, AccountData)> {
        let mut state = AuthState::Unauthenticated;

        let (session, hsa2) = self.sign_in(session).await?;
        state = transition(state, AuthState::SignedIn { hsa2 });

        let session = if hsa2 {
            let session = self.complete_two_factor(session).await?;
            state = transition(state, AuthState::TrustEstablished);
            session
        } else {
            session
        };

        let (session, account) = self.account_login(session).await?;
        transition(state, AuthState::AccountLoggedIn);
        info!("account logged in");
        Ok((session, account))
    }

    /// Post credentials; returns whether an hsa2 challenge was raised.
    pub async fn sign_in(&self, session: Session) -> Result<(Session, bool)> {
        let body = SignInRequest {
            account_name: &session.username,
            password: &session.password,
            trust_tokens: session.trust_token.as_deref().into_iter().collect(),
            remember_me: true,
        };
        let request = self
            .auth_request(format!("{}/signin?isRememberMeEnabled=true", self.endpoints.auth_base))
            .json(&body)?;

        let (session, raw) = send(self.transport.as_ref(), session, &request).await?;
        let validated = validate(raw, &[200, 409])?;
        if validated.status() == 200 {
            debug!("signed in without challenge");
            return Ok((session, false));
        }

        let challenge = validated
            .decode_json_permissive::<SignInChallenge>()?
            .into_inner();
        let hsa2 = challenge
            .and_then(|c| c.auth_type)
            .is_some_and(|auth_type| auth_type == HSA2);
        debug!(hsa2, "sign-in answered with challenge");
        Ok((session, hsa2))
    }

    /// Ask for the code, verify it, and establish device trust.
    pub async fn complete_two_factor(&self, session: Session) -> Result<Session> {
        let code = self.prompt.get_code().await?;
        let session = self.verify_security_code(session, &code).await?;
        self.trust_device(session).await
    }

    pub async fn verify_security_code(&self, session: Session, code: &str) -> Result<Session> {
        let request = self
            .auth_request(format!(
                "{}/verify/trusteddevice/securitycode",
                self.endpoints.auth_base
            ))
            .json(&SecurityCodeRequest {
                security_code: SecurityCode { code },
            })?;

        let (session, raw) = send(self.transport.as_ref(), session, &request).await?;
        validate(raw, &[204])?;
        debug!("security code accepted");
        Ok(session)
    }

    pub async fn trust_device(&self, session: Session) -> Result<Session> {
        let request = ApiRequest::get(format!("{}/2sv/trust", self.endpoints.auth_base))
            .with_header_fn(auth_headers)
            .header("Origin", self.endpoints.origin.as_str());

        let (session, raw) = send(self.transport.as_ref(), session, &request).await?;
        let validated = validate(raw, &[200, 204])?;
        let token = validated
            .http()
            .header(HEADER_TRUST_TOKEN)
            .ok_or(DriveError::MissingTrustToken)?;
        debug!("device trusted");
        Ok(session.with_trust_token(token))
    }

    /// Exchange the session token for account data.
    pub async fn account_login(&self, session: Session) -> Result<(Session, AccountData)> {
        let token = session
            .session_token
            .as_deref()
            .ok_or(DriveError::MissingSessionToken)?;
        let body = AccountLoginRequest {
            ds_web_auth_token: token,
            trust_token: session.trust_token.as_deref(),
            account_country_code: session.account_country.as_deref(),
            extended_login: false,
        };
        let request = self
            .setup_request(format!("{}/accountLogin", self.endpoints.setup_base))
            .json(&body)?;

        let (session, raw) = send(self.transport.as_ref(), session, &request).await?;
        let account = validate(raw, &[200])?
            .decode_json::<AccountData>()?
            .into_inner();
        Ok((session, account))
    }

    /// Check a restored session and fetch fresh account data without a full
    /// login. A 421 means the session has to be re-established.
    pub async fn validate_session(&self, session: Session) -> Result<(Session, AccountData)> {
        let request =
            self.setup_request(format!("{}/validate", self.endpoints.setup_base));
        let (session, raw) = send(self.transport.as_ref(), session, &request).await?;
        let account = validate(raw, &[200])?
            .decode_json::<AccountData>()?
            .into_inner();
        Ok((session, account))
    }

    fn auth_request(&self, url: String) -> ApiRequest {
        ApiRequest::post(url)
            .with_header_fn(auth_headers)
            .header("Origin", self.endpoints.origin.as_str())
            .header("Referer", format!("{}/", self.endpoints.origin))
    }

    fn setup_request(&self, url: String) -> ApiRequest {
        ApiRequest::post(url).header("Origin", self.endpoints.origin.as_str())
    }
}

fn transition(from: AuthState, to: AuthState) -> AuthState {
    debug!(?from, ?to, "auth state");
    to
}
