use thiserror::Error;

/// Coarse classification of a failure, independent of the backend that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Conflict,
    NotFound,
    Unavailable,
    Inconsistent,
    Config,
    Internal,
}

#[derive(Error, Debug)]
pub enum GalleriaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A multi-step operation stopped part way and the two stores now disagree.
    #[error("inconsistent: {message} (orphans: {})", orphans.join(", "))]
    Inconsistent {
        message: String,
        orphans: Vec<String>,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GalleriaError>;

impl GalleriaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Inconsistent { .. } => ErrorKind::Inconsistent,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn inconsistent(message: impl Into<String>, orphans: Vec<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
            orphans,
        }
    }
}

impl From<rusqlite::Error> for GalleriaError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Unavailable(format!("metadata store: {}", error))
    }
}

impl From<std::io::Error> for GalleriaError {
    fn from(error: std::io::Error) -> Self {
        Self::Unavailable(format!("io: {}", error))
    }
}

impl From<reqwest::Error> for GalleriaError {
    fn from(error: reqwest::Error) -> Self {
        Self::Unavailable(format!("http: {}", error))
    }
}

impl From<serde_json::Error> for GalleriaError {
    fn from(error: serde_json::Error) -> Self {
        Self::Internal(format!("json: {}", error))
    }
}

impl From<object_store::Error> for GalleriaError {
    fn from(error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            object_store::Error::AlreadyExists { path, .. } => {
                Self::Conflict(format!("{} already exists", path))
            }
            object_store::Error::Precondition { path, .. } => {
                Self::Conflict(format!("precondition failed for {}", path))
            }
            other => Self::Unavailable(format!("object store: {}", other)),
        }
    }
}
