use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Parses `raw` as a base for relative paths, so `https://host/api` joined
/// with `ai-search` gives `https://host/api/ai-search`.
pub fn base_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        })
    }
}

/// One HTTP exchange, fully described so it can be sent again on retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RemoteRequest {
    pub fn get(url: impl Into<String>) -> Self {
        RemoteRequest {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        RemoteRequest {
            method: Method::Delete,
            ..RemoteRequest::get(url)
        }
    }

    pub fn post_json<T: Serialize>(url: impl Into<String>, body: &T) -> Result<Self, CallError> {
        let body = serde_json::to_value(body)
            .map_err(|e| CallError::DecodeError(format!("could not encode request body: {}", e)))?;
        Ok(RemoteRequest {
            method: Method::Post,
            body: Some(body),
            ..RemoteRequest::get(url)
        })
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        serde_json::from_slice(&self.body).map_err(|e| CallError::DecodeError(e.to_string()))
    }
}

/// Failure of a remote call after the retry policy has been applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("HTTP {status}: {reason}")]
    HttpError { status: u16, reason: String },
    #[error("malformed response: {0}")]
    DecodeError(String),
    #[error("request cancelled")]
    Cancelled,
}

impl CallError {
    pub fn http(status: u16) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unknown status")
            .to_string();
        CallError::HttpError { status, reason }
    }

    /// Only timeouts and connection failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Timeout(_) | CallError::NetworkFailure(_))
    }

    /// Text fit for the results or summary panel. Raw details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            CallError::Timeout(_) => {
                "The search service took too long to respond. It may be starting up after a period of inactivity."
            }
            CallError::NetworkFailure(_) => {
                "The search service could not be reached. It may be starting up or temporarily offline."
            }
            CallError::HttpError { status, .. } if *status >= 500 => {
                "The search service ran into a problem while handling the request."
            }
            CallError::HttpError { .. } => "The search service rejected the request.",
            CallError::DecodeError(_) => "The search service sent a response that could not be read.",
            CallError::Cancelled => "The request was cancelled.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_and_network_failures_are_transient() {
        assert!(CallError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(CallError::NetworkFailure("refused".into()).is_transient());
        assert!(!CallError::http(404).is_transient());
        assert!(!CallError::http(503).is_transient());
        assert!(!CallError::DecodeError("eof".into()).is_transient());
        assert!(!CallError::Cancelled.is_transient());
    }

    #[test]
    fn http_errors_carry_canonical_reason() {
        assert_eq!(
            CallError::http(404),
            CallError::HttpError {
                status: 404,
                reason: "Not Found".into()
            }
        );
    }

    #[test]
    fn user_messages_hide_details() {
        let err = CallError::NetworkFailure("tcp connect error: 10.0.0.1".into());
        assert!(!err.user_message().contains("10.0.0.1"));
    }
}
