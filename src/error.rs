use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

pub type ApiResult<T> = Result<T, ApiError>;

/// Broad classes of API failure that calling code branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The server never answered: DNS, refused connection, dropped socket.
    Network,
    /// The server answered with a non-success status.
    Server,
    /// The server rejected our credentials.
    Unauthorized,
    /// The input was rejected before any request was made.
    Validation,
}

/// Normalized failure for every operation that crosses the API boundary.
///
/// Callers never see transport types. They get a kind to branch on, the
/// HTTP status when one exists, a message fit for direct display, and the
/// payload the server sent along (field errors, details), when any.
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: ApiErrorKind,
    status: Option<u16>,
    message: String,
    data: Option<Value>,
}

pub(crate) const NETWORK_FAILURE_MESSAGE: &str =
    "Unable to reach the server. Please check your connection.";
pub(crate) const SESSION_EXPIRED_MESSAGE: &str =
    "Your session has expired. Please sign in again.";
const VALIDATION_MESSAGE: &str = "Please correct the highlighted fields.";

impl ApiError {
    pub(crate) fn network() -> Self {
        Self {
            kind: ApiErrorKind::Network,
            status: None,
            message: NETWORK_FAILURE_MESSAGE.to_string(),
            data: None,
        }
    }

    pub(crate) fn server(status: u16, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: ApiErrorKind::Server,
            status: Some(status),
            message: message.into(),
            data,
        }
    }

    pub(crate) fn unauthorized(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized,
            status: Some(401),
            message: message.into(),
            data,
        }
    }

    /// Failure local to this client (bad path, disk write), reported in the
    /// same shape as everything else.
    pub(crate) fn local(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Server,
            status: None,
            message: message.into(),
            data: None,
        }
    }

    pub(crate) fn validation(fields: HashMap<String, String>) -> Self {
        let data = serde_json::to_value(&fields).ok();
        Self {
            kind: ApiErrorKind::Validation,
            status: None,
            message: VALIDATION_MESSAGE.to_string(),
            data,
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }

    /// Per-field messages when this is a validation failure.
    pub fn field_errors(&self) -> Option<HashMap<String, String>> {
        if self.kind != ApiErrorKind::Validation {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}
