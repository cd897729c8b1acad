//! Error types for the harness.
//!
//! Every failure a wrapped test can produce surfaces as an [`Error`] so the
//! runner can report it as an ordinary test failure. Errors are classified by
//! [`ErrorKind`]:
//!
//! - **Timeout**: a guarded operation exceeded its duration. The originating
//!   [`HubError`] is kept so callers can tell which timer fired.
//! - **ResourceGrowth**: the leak-check loop never observed a zero delta.
//! - **DiagnosticMismatch**: captured diagnostic text did not match.
//! - **NotImplemented**: a contract template was run against a fixture that
//!   never supplied the abstract operation.
//!
//! The remaining kinds cover registration, configuration, plain assertions,
//! other hub interrupts and panics caught by the runner.

use core::fmt;

use crate::hub::{HubError, Timeout};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A timer fired while the operation was still running.
    Timeout,
    /// Live resource handles kept growing across leak-check iterations.
    ResourceGrowth,
    /// Captured diagnostic output did not match the expected pattern.
    DiagnosticMismatch,
    /// A template operation was invoked without an implementation.
    NotImplemented,
    /// A test assertion failed.
    Assertion,
    /// A test method could not be registered.
    Registration,
    /// Invalid harness configuration.
    Config,
    /// The hub interrupted the operation with something other than a timeout.
    Hub,
    /// The test body panicked.
    Panicked,
}

impl ErrorKind {
    /// Returns a short stable name for reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ResourceGrowth => "resource_growth",
            Self::DiagnosticMismatch => "diagnostic_mismatch",
            Self::NotImplemented => "not_implemented",
            Self::Assertion => "assertion",
            Self::Registration => "registration",
            Self::Config => "config",
            Self::Hub => "hub",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expected/actual pair attached to a diagnostic mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// The pattern or message that was expected.
    pub expected: String,
    /// The buffer contents at the time of the failure.
    pub actual: String,
}

/// Structured payload carried by an [`Error`].
#[derive(Debug, Clone, Default)]
enum Detail {
    #[default]
    None,
    Hub(HubError),
    Deltas(Vec<i64>),
    Mismatch(Mismatch),
}

/// The main error type for harness operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    detail: Detail,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            detail: Detail::None,
        }
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Creates an assertion failure.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion).with_message(msg)
    }

    /// Creates a contract-violation error for an operation nobody supplied.
    #[must_use]
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented).with_message(msg)
    }

    /// Creates a registration error.
    #[must_use]
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Registration).with_message(msg)
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config).with_message(msg)
    }

    /// Creates a resource-growth error reporting every observed delta.
    #[must_use]
    pub fn resource_growth(deltas: Vec<i64>) -> Self {
        Self {
            kind: ErrorKind::ResourceGrowth,
            message: Some(format!("live resource handles increased by {deltas:?}")),
            detail: Detail::Deltas(deltas),
        }
    }

    /// Creates a diagnostic mismatch error.
    #[must_use]
    pub fn diagnostic_mismatch(
        msg: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            kind: ErrorKind::DiagnosticMismatch,
            message: Some(msg.into()),
            detail: Detail::Mismatch(Mismatch {
                expected: expected.into(),
                actual: actual.into(),
            }),
        }
    }

    /// Creates an error from a panic payload caught by the runner.
    #[must_use]
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(ErrorKind::Panicked).with_message(msg)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if a timer interrupted the operation.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns the hub interrupt this error was built from, if any.
    #[must_use]
    pub const fn hub_error(&self) -> Option<&HubError> {
        match &self.detail {
            Detail::Hub(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if `timeout` is the timer whose firing produced this error.
    #[must_use]
    pub fn raised_by(&self, timeout: &Timeout) -> bool {
        self.hub_error().is_some_and(|err| timeout.raised_by(err))
    }

    /// Returns the leak-check deltas for a resource-growth error.
    #[must_use]
    pub fn deltas(&self) -> Option<&[i64]> {
        match &self.detail {
            Detail::Deltas(deltas) => Some(deltas),
            _ => None,
        }
    }

    /// Returns the expected/actual pair for a diagnostic mismatch.
    #[must_use]
    pub const fn mismatch(&self) -> Option<&Mismatch> {
        match &self.detail {
            Detail::Mismatch(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Detail::Mismatch(m) = &self.detail {
            write!(
                f,
                "\nexpected:\n{}\nactual:\n__________\n{}\n^^^^^^^^^^",
                m.expected, m.actual
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.detail {
            Detail::Hub(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HubError> for Error {
    fn from(err: HubError) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Hub
        };
        Self {
            kind,
            message: Some(err.to_string()),
            detail: Detail::Hub(err),
        }
    }
}

/// An error whose traceback is expected and should be ignored.
///
/// Tests raise it on purpose, typically as the substitute error of a
/// [`Timeout`] or from a hub callback, and then match its diagnostic output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExpectedError {
    message: String,
}

impl ExpectedError {
    /// Creates an expected error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A specialized Result type for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The return type of every test body.
pub type TestResult = Result<()>;
