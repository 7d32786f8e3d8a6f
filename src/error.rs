//! Error types for the icloud_drive crate.

use thiserror::Error;

use crate::resolve::ResolveError;

/// Errors that can occur when talking to the drive web services.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Invalid response status {status}: {body}")]
    InvalidStatus { status: u16, body: String },

    #[error("Session is invalid (421), reauthorization required")]
    SessionInvalid,

    #[error("Bad request (400): {body}")]
    BadRequest { body: String },

    #[error("Failed to decode response: {description}")]
    Decode { description: String },

    #[error("Response is missing the expected JSON body")]
    MissingBody,

    #[error("Session missing sessionToken")]
    MissingSessionToken,

    #[error("Missing trust token in trust response")]
    MissingTrustToken,

    #[error("Failed to read security code: {0}")]
    CodePrompt(String),

    #[error("Account data has no {0} webservice")]
    MissingWebservice(String),

    #[error("Invalid drivewsid: {0}")]
    InvalidDrivewsid(String),

    #[error("Invalid cache entity {drivewsid}: {reason}")]
    InvalidCacheEntity { drivewsid: String, reason: String },

    #[error("{0}")]
    Path(#[from] ResolveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriveError {
    /// True for connection-level failures that are worth re-issuing.
    pub fn is_transport(&self) -> bool {
        matches!(self, DriveError::Transport(_))
    }

    /// True for a 409 write conflict from the document update endpoint.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DriveError::InvalidStatus { status: 409, .. })
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(err: reqwest::Error) -> Self {
        DriveError::Transport(err.to_string())
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
