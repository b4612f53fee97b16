use reqwest::StatusCode;
use serde_json::Value;

/// Edge-level result used by the CLI and the status server.
pub type Result<T> = anyhow::Result<T>;

/// Fallback message used when a detection backend fails without saying why.
pub const DETECTION_FAILED: &str = "detection failed";

/// Failures surfaced by the transport client, the fetch adapter and the dispatchers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Network unreachable, DNS failure, timeout. No server message is available.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{message}")]
    Http {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },

    /// The caller tried to dispatch a request that does not satisfy its kind's contract.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backend answered successfully but the document breaks the result contract.
    #[error("result contract violated: {0}")]
    Contract(String),

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("reading media file: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// HTTP status carried by a server-reported failure.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DispatchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds a server-reported failure using the detection policy: the body's `error`
    /// field when present, otherwise `fallback`.
    pub fn detection_failure(status: StatusCode, body: Option<Value>, fallback: &str) -> Self {
        let message = error_field(body.as_ref()).unwrap_or_else(|| fallback.to_owned());
        DispatchError::Http {
            status,
            message,
            body,
        }
    }

    /// Re-words an HTTP failure from the transport client with the detection policy.
    /// Other variants pass through untouched.
    pub fn into_detection_failure(self) -> Self {
        match self {
            DispatchError::Http { status, body, .. } => {
                Self::detection_failure(status, body, DETECTION_FAILED)
            }
            other => other,
        }
    }
}

/// Non-empty `error` string of a JSON error body.
pub fn error_field(body: Option<&Value>) -> Option<String> {
    body.and_then(|value| value.get("error"))
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_owned)
}
