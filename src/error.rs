use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backup error: {message}")]
    Backup {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    #[error("Conflict resolution error: {message}")]
    ConflictResolution {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    #[error("Export error: {message}")]
    Export {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    #[error("Sync error: {message}")]
    Sync {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    #[error("Version conflict - expected: {expected}, actual: {actual}")]
    VersionConflict { expected: String, actual: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON serialization error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Flat discriminant of [`Error`], for callers that render by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Backup,
    ConflictResolution,
    Export,
    Sync,
    VersionConflict,
    NotFound,
    Database,
    Json,
    Io,
}

impl Error {
    pub fn backup(message: impl Into<String>, cause: impl Into<Option<Error>>) -> Self {
        Error::Backup {
            message: message.into(),
            cause: cause.into().map(Box::new),
        }
    }

    pub fn conflict_resolution(message: impl Into<String>, cause: impl Into<Option<Error>>) -> Self {
        Error::ConflictResolution {
            message: message.into(),
            cause: cause.into().map(Box::new),
        }
    }

    pub fn export(message: impl Into<String>, cause: impl Into<Option<Error>>) -> Self {
        Error::Export {
            message: message.into(),
            cause: cause.into().map(Box::new),
        }
    }

    pub fn sync(message: impl Into<String>, cause: impl Into<Option<Error>>) -> Self {
        Error::Sync {
            message: message.into(),
            cause: cause.into().map(Box::new),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Backup { .. } => ErrorKind::Backup,
            Error::ConflictResolution { .. } => ErrorKind::ConflictResolution,
            Error::Export { .. } => ErrorKind::Export,
            Error::Sync { .. } => ErrorKind::Sync,
            Error::VersionConflict { .. } => ErrorKind::VersionConflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Database(_) => ErrorKind::Database,
            Error::Json(_) => ErrorKind::Json,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Wrapped cause, if this error was re-classified from a lower layer
    pub fn cause(&self) -> Option<&Error> {
        match self {
            Error::Backup { cause, .. }
            | Error::ConflictResolution { cause, .. }
            | Error::Export { cause, .. }
            | Error::Sync { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err.to_string())
    }
}
