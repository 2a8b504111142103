//! Error types for the ledger.
//!
//! Internally everything is an `anyhow::Error` (`Res<T>`). At the public boundary errors are
//! tagged with an `ErrorType` so that callers can tell a user-visible rejection (a full session,
//! a duplicate fragment) from a failure of the grid store or the local database.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Internal result type.
pub(crate) type Res<T> = anyhow::Result<T>;

/// Public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The category of an error that crossed the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A fragment could not be classified even with the narrower pass.
    ClassificationAmbiguous,
    /// The fragment was already absorbed into the session.
    DuplicateFragment,
    /// A session row limit was hit.
    CapacityExceeded,
    /// Session contents failed validation (missing wallet number, non-positive amount, ...).
    Validation,
    /// No column binding exists for a subject.
    UnroutedSubject,
    /// No free row or cell exists in the bounded range.
    SlotExhausted,
    /// The grid store failed in a way that may succeed on retry.
    TransientStore,
    /// The grid store failed in a way that will not succeed on retry.
    FatalStore,
    /// The session does not exist or is in a phase that does not allow the operation.
    SessionState,
    /// The configuration is missing or invalid.
    Config,
    /// The local binding database failed.
    Database,
    /// Reading or writing local files failed.
    Io,
}

serde_plain::derive_display_from_serialize!(ErrorType);

/// A public error: an `ErrorType` plus the underlying cause chain.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub(crate) fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    /// Create an error from a message.
    pub(crate) fn msg(error_type: ErrorType, message: impl Display) -> Self {
        Self::new(error_type, anyhow::anyhow!("{message}"))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {:?}", self.error_type, self.inner)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // `{:#}` prints the whole context chain on one line
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Converts an internal result into a public one, tagging the error with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}

/// Whether a grid store failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// Rate limiting, 5xx, unavailability or a timeout.
    Transient,
    /// Permission problems, malformed ranges and anything else.
    Fatal,
}

impl StoreErrorKind {
    pub fn error_type(self) -> ErrorType {
        match self {
            StoreErrorKind::Transient => ErrorType::TransientStore,
            StoreErrorKind::Fatal => ErrorType::FatalStore,
        }
    }
}

/// A failure reported by a `GridStore` implementation. It travels inside `anyhow::Error` and is
/// recovered with `StoreError::find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Fatal,
            message: message.into(),
        }
    }

    /// Classifies an HTTP status code returned by the grid store.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if matches!(status, 408 | 429 | 500 | 502 | 503 | 504) {
            Self::transient(message)
        } else {
            Self::fatal(message)
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Transient
    }

    pub fn error_type(&self) -> ErrorType {
        self.kind.error_type()
    }

    /// Searches the cause chain of `e` for a `StoreError`.
    pub fn find(e: &anyhow::Error) -> Option<&StoreError> {
        e.downcast_ref::<StoreError>()
            .or_else(|| e.chain().find_map(|cause| cause.downcast_ref::<StoreError>()))
    }

    /// The default transience predicate: only a `StoreError` marked transient is retried.
    pub fn is_transient_error(e: &anyhow::Error) -> bool {
        Self::find(e).map(StoreError::is_transient).unwrap_or(false)
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            StoreErrorKind::Transient => write!(f, "transient grid store error: {}", self.message),
            StoreErrorKind::Fatal => write!(f, "grid store error: {}", self.message),
        }
    }
}

impl std::error::Error for StoreError {}
