//! Response validation and decoding stages.
//!
//! Each stage has its own type and can only be built by the function that
//! performs its check: a [`ValidatedResponse`] comes from [`validate`], a
//! [`Decoded`] from one of the `decode_*` methods.

use serde::de::DeserializeOwned;

use crate::error::{DriveError, Result};
use crate::http::HttpResponse;

/// Longest body excerpt carried in decode errors.
const EXCERPT_LEN: usize = 200;

/// Response straight from the transport.
#[derive(Debug, Clone)]
pub struct RawResponse(HttpResponse);

impl RawResponse {
    pub fn new(response: HttpResponse) -> Self {
        Self(response)
    }

    pub fn status(&self) -> u16 {
        self.0.status
    }

    pub fn http(&self) -> &HttpResponse {
        &self.0
    }
}

/// Response whose status is in the operation's accepted set.
#[derive(Debug, Clone)]
pub struct ValidatedResponse(HttpResponse);

/// Response body decoded into `T`.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    value: T,
    response: HttpResponse,
}

impl<T> Decoded<T> {
    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }
}

/// Run the status filter pipeline: 421, then 400, then the accepted set.
pub fn validate(raw: RawResponse, accepted: &[u16]) -> Result<ValidatedResponse> {
    let response = raw.0;
    match response.status {
        421 => Err(DriveError::SessionInvalid),
        400 => Err(DriveError::BadRequest {
            body: response.text(),
        }),
        status if !accepted.contains(&status) => Err(DriveError::InvalidStatus {
            status,
            body: response.text(),
        }),
        _ => Ok(ValidatedResponse(response)),
    }
}

impl ValidatedResponse {
    pub fn status(&self) -> u16 {
        self.0.status
    }

    pub fn http(&self) -> &HttpResponse {
        &self.0
    }

    pub fn into_http(self) -> HttpResponse {
        self.0
    }

    /// Decode the body; an empty body is [`DriveError::MissingBody`].
    pub fn decode_json<T: DeserializeOwned>(self) -> Result<Decoded<T>> {
        if self.0.body.iter().all(u8::is_ascii_whitespace) {
            return Err(DriveError::MissingBody);
        }
        match serde_json::from_slice(&self.0.body) {
            Ok(value) => Ok(Decoded {
                value,
                response: self.0,
            }),
            Err(e) => Err(decode_error(&self.0, &e)),
        }
    }

    /// Decode a body that may legitimately be absent or not JSON at all.
    ///
    /// Only a JSON object whose fields contradict `T` is an error. Any other
    /// body, including JSON scalars and arrays, decodes to `None`.
    pub fn decode_json_permissive<T: DeserializeOwned>(self) -> Result<Decoded<Option<T>>> {
        let value = match serde_json::from_slice::<serde_json::Value>(&self.0.body) {
            Ok(json @ serde_json::Value::Object(_)) => match serde_json::from_value::<T>(json) {
                Ok(v) => Some(v),
                Err(e) => return Err(decode_error(&self.0, &e)),
            },
            _ => None,
        };
        Ok(Decoded {
            value,
            response: self.0,
        })
    }
}

fn decode_error(response: &HttpResponse, err: &serde_json::Error) -> DriveError {
    let text = response.text();
    let excerpt: String = text.chars().take(EXCERPT_LEN).collect();
    DriveError::Decode {
        description: format!("{} (body: {})", err, excerpt),
    }
}
