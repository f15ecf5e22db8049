use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Status codes treated as "try again later" rather than a rejection.
const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Failure taxonomy for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connectivity loss, timeout or a retryable server status.
    Transient(String),
    /// Missing, invalid or expired credential.
    Unauthorized,
    /// The remote store declined the request for a non-auth reason.
    Rejected { status: u16, message: String },
}

impl RemoteError {
    /// Maps a non-success HTTP status to the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized,
            code if RETRYABLE_STATUS_CODES.contains(&code) => {
                Self::Transient(format!("server returned {code}: {message}"))
            }
            code => Self::Rejected {
                status: code,
                message,
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// A rejection meaning the target record no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status: 404, .. })
    }

    /// Short stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Unauthorized => "unauthorized",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(message) => write!(f, "remote unreachable: {message}"),
            Self::Unauthorized => write!(f, "credential rejected by remote store"),
            Self::Rejected { status, message } => {
                write!(f, "remote store rejected request ({status}): {message}")
            }
        }
    }
}

impl Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            return Self::from_status(status.as_u16(), value.to_string());
        }
        if value.is_decode() {
            return Self::Rejected {
                status: 200,
                message: format!("undecodable response body: {value}"),
            };
        }
        Self::Transient(value.to_string())
    }
}
