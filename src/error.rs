use std::fmt;
use std::sync::Arc;

use rusqlite::ffi;
use thiserror::Error;

use crate::types::ConnectionId;

pub(crate) const MSG_CONNECTION_CLOSED: &str = "Connection already closed";
pub(crate) const MSG_STATEMENT_FINALIZED: &str = "Statement already finalized";
pub(crate) const MSG_QUERY_ON_EXECUTE: &str = "Queries can be performed using query methods only.";
pub(crate) const MSG_NO_ROW: &str = "SQL command did not yield a result row";
pub(crate) const MSG_RESULT_SET: &str = "Unable to build result set";
pub(crate) const MSG_CLOSE_FAILED: &str = "Unable to close db.";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Operation canceled: {0}")]
    Cancelled(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Allocation failure: {0}")]
    Allocation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Engine error kind, if this error came from `SQLite` itself.
    #[must_use]
    pub fn engine_kind(&self) -> Option<EngineErrorKind> {
        match self {
            BridgeError::Engine(err) => Some(err.kind),
            _ => None,
        }
    }

    pub(crate) fn connection_closed(id: ConnectionId) -> Self {
        BridgeError::InvalidHandle(format!("{MSG_CONNECTION_CLOSED} (connection {id})"))
    }

    pub(crate) fn statement_finalized(id: crate::types::StatementId) -> Self {
        BridgeError::InvalidHandle(format!("{MSG_STATEMENT_FINALIZED} (statement {id})"))
    }
}

/// Classification of engine failures by primary result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum EngineErrorKind {
    DiskIo,
    Corrupt,
    Constraint,
    Abort,
    Done,
    Full,
    Misuse,
    Permission,
    DatabaseLocked,
    TableLocked,
    ReadOnly,
    CannotOpen,
    TooBig,
    IndexOutOfRange,
    OutOfMemory,
    DatatypeMismatch,
    Interrupted,
    Generic,
}

impl EngineErrorKind {
    /// Map an (extended) `SQLite` result code onto the error taxonomy.
    #[must_use]
    pub fn from_code(extended_code: i32) -> Self {
        match extended_code & 0xff {
            ffi::SQLITE_IOERR => Self::DiskIo,
            ffi::SQLITE_CORRUPT | ffi::SQLITE_NOTADB => Self::Corrupt,
            ffi::SQLITE_CONSTRAINT => Self::Constraint,
            ffi::SQLITE_ABORT => Self::Abort,
            ffi::SQLITE_DONE => Self::Done,
            ffi::SQLITE_FULL => Self::Full,
            ffi::SQLITE_MISUSE => Self::Misuse,
            ffi::SQLITE_PERM => Self::Permission,
            ffi::SQLITE_BUSY => Self::DatabaseLocked,
            ffi::SQLITE_LOCKED => Self::TableLocked,
            ffi::SQLITE_READONLY => Self::ReadOnly,
            ffi::SQLITE_CANTOPEN => Self::CannotOpen,
            ffi::SQLITE_TOOBIG => Self::TooBig,
            ffi::SQLITE_RANGE => Self::IndexOutOfRange,
            ffi::SQLITE_NOMEM => Self::OutOfMemory,
            ffi::SQLITE_MISMATCH => Self::DatatypeMismatch,
            ffi::SQLITE_INTERRUPT => Self::Interrupted,
            _ => Self::Generic,
        }
    }
}

/// Where an engine error happened: which connection, and on which thread.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub connection_id: Option<ConnectionId>,
    pub label: Arc<str>,
    pub thread: String,
}

impl ErrorContext {
    pub(crate) fn new(connection_id: Option<ConnectionId>, label: Arc<str>) -> Self {
        Self {
            connection_id,
            label,
            thread: format!("{:?}", std::thread::current().id()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub extended_code: i32,
    pub message: String,
    pub context: ErrorContext,
    pub detail: Option<String>,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tid {} connection ID '{}' {} (extendedErrCode {})",
            self.context.thread, self.context.label, self.message, self.extended_code
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Build an engine error from a rusqlite failure, keeping the extended code when one exists.
    pub(crate) fn from_rusqlite(
        err: &rusqlite::Error,
        context: ErrorContext,
        detail: Option<String>,
    ) -> Self {
        let (extended_code, message) = match err {
            rusqlite::Error::SqliteFailure(code, msg) => (
                code.extended_code,
                msg.clone().unwrap_or_else(|| code.to_string()),
            ),
            rusqlite::Error::QueryReturnedNoRows => (ffi::SQLITE_DONE, MSG_NO_ROW.to_string()),
            rusqlite::Error::InvalidColumnIndex(_)
            | rusqlite::Error::InvalidParameterCount(_, _)
            | rusqlite::Error::InvalidParameterName(_) => (ffi::SQLITE_RANGE, err.to_string()),
            rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::Utf8Error(_)
            | rusqlite::Error::NulError(_) => (ffi::SQLITE_MISMATCH, err.to_string()),
            other => (ffi::SQLITE_ERROR, other.to_string()),
        };
        Self {
            kind: EngineErrorKind::from_code(extended_code),
            extended_code,
            message,
            context,
            detail,
        }
    }

    pub(crate) fn with_code(
        extended_code: i32,
        message: impl Into<String>,
        context: ErrorContext,
        detail: Option<String>,
    ) -> Self {
        Self {
            kind: EngineErrorKind::from_code(extended_code),
            extended_code,
            message: message.into(),
            context,
            detail,
        }
    }
}
