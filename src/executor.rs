use rusqlite::types::ValueRef;
use rusqlite::{Connection, ffi};

use crate::error::{BridgeError, EngineError, MSG_NO_ROW};
use crate::registry::{ConnectionSlot, HandleRegistry};
use crate::statement::PreparedStatement;
use crate::types::{ConnectionId, StatementId};

/// Step `stmt` once and require that it completes without producing a row.
fn run_non_query(
    slot: &ConnectionSlot,
    conn: &Connection,
    stmt: &PreparedStatement,
) -> Result<(), BridgeError> {
    let mut cached = stmt.bound(conn).map_err(|e| slot.engine_error(&e, None))?;
    let mut rows = cached.raw_query();
    match rows.next() {
        Ok(None) => Ok(()),
        Ok(Some(_)) => Err(slot.engine_error(&rusqlite::Error::ExecuteReturnedResults, None)),
        Err(e) => Err(slot.engine_error(&e, None)),
    }
}

/// Step `stmt` once and hand column 0 of the first row to `read`.
fn run_scalar<R>(
    slot: &ConnectionSlot,
    conn: &Connection,
    stmt: &PreparedStatement,
    read: impl FnOnce(ValueRef<'_>) -> R,
) -> Result<R, BridgeError> {
    let mut cached = stmt.bound(conn).map_err(|e| slot.engine_error(&e, None))?;
    let mut rows = cached.raw_query();
    let row = rows
        .next()
        .map_err(|e| slot.engine_error(&e, None))?
        .ok_or_else(|| {
            BridgeError::from(EngineError::with_code(
                ffi::SQLITE_DONE,
                MSG_NO_ROW,
                slot.error_context(),
                None,
            ))
        })?;
    let value = row.get_ref(0).map_err(|e| slot.engine_error(&e, None))?;
    Ok(read(value))
}

fn changes(conn: &Connection) -> i64 {
    i64::try_from(conn.changes()).unwrap_or(i64::MAX)
}

impl HandleRegistry {
    /// Execute a statement that must not return rows.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Usage` if the statement produced a row, `BridgeError::Cancelled`
    /// if it was canceled, `BridgeError::Engine` for other engine failures, and
    /// `BridgeError::InvalidHandle` if either handle is gone. The other `execute_*` calls
    /// report errors the same way.
    pub fn execute(&self, id: ConnectionId, stmt_id: StatementId) -> Result<(), BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| run_non_query(slot, conn, stmt))
    }

    /// Execute and return column 0 of the single result row as an integer.
    ///
    /// NULL reads as 0, REAL is truncated and TEXT is parsed the way the engine does.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Engine` (`Done`) if no row was produced; see [`HandleRegistry::execute`].
    pub fn execute_for_long(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<i64, BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            run_scalar(slot, conn, stmt, coerce_long)
        })
    }

    /// Execute and return column 0 of the single result row as text; NULL is `None`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Engine` (`Done`) if no row was produced; see [`HandleRegistry::execute`].
    pub fn execute_for_string(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<Option<String>, BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            run_scalar(slot, conn, stmt, coerce_string)
        })
    }

    /// Execute and return the number of rows the statement changed.
    ///
    /// # Errors
    ///
    /// See [`HandleRegistry::execute`].
    pub fn execute_for_changed_row_count(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<i64, BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            run_non_query(slot, conn, stmt)?;
            Ok(changes(conn))
        })
    }

    /// Execute and return the last inserted rowid, or -1 if no row changed.
    ///
    /// # Errors
    ///
    /// See [`HandleRegistry::execute`].
    pub fn execute_for_last_inserted_row_id(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<i64, BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            run_non_query(slot, conn, stmt)?;
            if changes(conn) > 0 {
                Ok(conn.last_insert_rowid())
            } else {
                Ok(-1)
            }
        })
    }
}

fn coerce_long(value: ValueRef<'_>) -> i64 {
    match value {
        ValueRef::Null => 0,
        ValueRef::Integer(i) => i,
        #[allow(clippy::cast_possible_truncation)]
        ValueRef::Real(f) => f as i64,
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => parse_leading_integer(bytes),
    }
}

/// Integer prefix of `bytes`, following the engine's text-to-integer rules: leading
/// whitespace is skipped, a fractional or exponent part truncates, no digits means 0.
fn parse_leading_integer(bytes: &[u8]) -> i64 {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start();
    let end = text
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit() || ((*c == '-' || *c == '+') && *i == 0) || matches!(c, '.' | 'e' | 'E')
        })
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    let numeric = &text[..end];
    if let Ok(value) = numeric.parse::<i64>() {
        return value;
    }
    if let Ok(value) = numeric.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        return value as i64;
    }
    let digits_end = numeric
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || ((*c == '-' || *c == '+') && *i == 0)))
        .map_or(numeric.len(), |(i, _)| i);
    numeric[..digits_end].parse::<i64>().unwrap_or(0)
}

fn coerce_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(format_real(f)),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Render a REAL the way the engine's text conversion does: whole values keep a `.0`.
fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
