use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Errors returned while talking to a generation service
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Submission rejected ({status}): {body}")]
    Submission { status: StatusCode, body: String },

    #[error("Response is missing `{field}`:\n{body}")]
    MalformedResponse { field: &'static str, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportFault),

    #[error("Task {task_id} did not finish within {attempts} attempts")]
    Timeout { task_id: String, attempts: u32 },

    #[error("Task {task_id} reported unknown status `{status}`")]
    UnknownStatus { task_id: String, status: String },

    #[error("Polling task {task_id} was cancelled after {attempts} attempts")]
    Cancelled { task_id: String, attempts: u32 },

    #[error("Missing credential: set {var} or pass it explicitly")]
    Configuration { var: String },

    #[error("Vendor rejected the request ({code}): {message}")]
    VendorRejected { code: i64, message: String },

    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },
}

/// Network or decoding fault, never retried
#[derive(Debug, Error)]
pub enum TransportFault {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid utf-8 in response: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<std::string::FromUtf8Error> for ApiError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::Transport(err.into())
    }
}

impl ApiError {
    pub(crate) fn missing(field: &'static str, body: impl ToString) -> Self {
        Self::MalformedResponse {
            field,
            body: body.to_string(),
        }
    }

    /// The HTTP status carried by a rejected submission, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Submission { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reads the body once and turns a non-success status into
/// [`ApiError::Submission`]
pub(crate) async fn read_success_body(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ApiError::Submission { status, body });
    }
    Ok(body)
}
