//! Resilient execution: retry and reauthorization decorators.
//!
//! An [`Operation`] is a whole remote operation over some state `S`: it takes
//! the state by value and hands back the updated state with its result. The
//! decorators here take an operation and return one of the same shape, so a
//! [`MiddlewareStack`] is just a fold over an ordered list of them.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::config::RetryPolicy;
use crate::drive::DriveState;
use crate::error::{DriveError, Result};

/// A remote operation threading state `S` and producing `T`.
pub type Operation<'a, S, T> = Arc<dyn Fn(S) -> BoxFuture<'a, Result<(S, T)>> + Send + Sync + 'a>;

/// Classifies an error as worth another attempt.
pub type ErrorPredicate = fn(&DriveError) -> bool;

/// Lift an async closure into an [`Operation`].
pub fn operation<'a, S, T, F, Fut>(f: F) -> Operation<'a, S, T>
where
    F: Fn(S) -> Fut + Send + Sync + 'a,
    Fut: Future<Output = Result<(S, T)>> + Send + 'a,
{
    Arc::new(move |state| -> BoxFuture<'a, Result<(S, T)>> { Box::pin(f(state)) })
}

/// Re-issue the entire operation while `predicate` accepts the error and the
/// budget lasts. The last error is returned unchanged.
pub fn retry_on<'a, S, T>(
    policy: RetryPolicy,
    predicate: ErrorPredicate,
    op: Operation<'a, S, T>,
) -> Operation<'a, S, T>
where
    S: Clone + Send + 'a,
    T: Send + 'a,
{
    Arc::new(move |state: S| -> BoxFuture<'a, Result<(S, T)>> {
        let op = Arc::clone(&op);
        Box::pin(async move {
            let mut remaining = policy.retries;
            loop {
                match op(state.clone()).await {
                    Ok(result) => return Ok(result),
                    Err(err) if remaining > 0 && predicate(&err) => {
                        warn!(error = %err, attempts_left = remaining, "request failed, retrying");
                        remaining -= 1;
                        if !policy.delay.is_zero() {
                            tokio::time::sleep(policy.delay).await;
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
        })
    })
}

/// On [`DriveError::SessionInvalid`], log in again from the current session
/// and re-issue the operation once with the fresh session and account data.
///
/// Errors from the new login propagate as they are.
pub fn reauthorize_on_invalid_session<'a, T>(
    authenticator: Arc<Authenticator>,
    op: Operation<'a, DriveState, T>,
) -> Operation<'a, DriveState, T>
where
    T: Send + 'a,
{
    Arc::new(move |state: DriveState| -> BoxFuture<'a, Result<(DriveState, T)>> {
        let op = Arc::clone(&op);
        let authenticator = Arc::clone(&authenticator);
        Box::pin(async move {
            match op(state.clone()).await {
                Err(DriveError::SessionInvalid) => {
                    info!("session invalidated by server, reauthorizing");
                    let (session, account) = authenticator.authenticate(state.session).await?;
                    op(DriveState { session, account }).await
                }
                other => other,
            }
        })
    })
}

/// One decorator of a drive API method.
#[derive(Clone)]
pub enum Middleware {
    /// Retry transport-level failures.
    RetryTransport(RetryPolicy),
    /// Log in again on 421.
    Reauthorize(Arc<Authenticator>),
    /// Retry 409 write conflicts; only meaningful on document updates.
    RetryConflict(RetryPolicy),
}

impl Middleware {
    pub fn wrap<'a, T: Send + 'a>(
        &self,
        op: Operation<'a, DriveState, T>,
    ) -> Operation<'a, DriveState, T> {
        match self {
            Middleware::RetryTransport(policy) => retry_on(*policy, DriveError::is_transport, op),
            Middleware::Reauthorize(authenticator) => {
                reauthorize_on_invalid_session(Arc::clone(authenticator), op)
            }
            Middleware::RetryConflict(policy) => retry_on(*policy, DriveError::is_conflict, op),
        }
    }
}

/// Ordered decorator list; the first entry wraps the operation innermost.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<Middleware>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport retry inside, reauthorization outside.
    pub fn standard(authenticator: Arc<Authenticator>, transport_retry: RetryPolicy) -> Self {
        Self::new()
            .with(Middleware::RetryTransport(transport_retry))
            .with(Middleware::Reauthorize(authenticator))
    }

    pub fn with(mut self, layer: Middleware) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn apply<'a, T: Send + 'a>(
        &self,
        op: Operation<'a, DriveState, T>,
    ) -> Operation<'a, DriveState, T> {
        self.layers.iter().fold(op, |op, layer| layer.wrap(op))
    }
}
