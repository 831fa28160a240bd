use std::sync::atomic::Ordering;

use rusqlite::types::Value;
use tracing::{debug, trace};

use crate::error::BridgeError;
use crate::statement::PreparedStatement;
use crate::types::{ConnectionId, StatementId};

use super::HandleRegistry;

impl HandleRegistry {
    /// Compile `sql` on a connection and register the statement.
    ///
    /// Only the first statement in `sql` is compiled; any text after it is ignored.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Engine` with the offending SQL in its detail if compilation
    /// fails, and `BridgeError::InvalidHandle` if the connection is gone.
    pub fn prepare(&self, id: ConnectionId, sql: &str) -> Result<StatementId, BridgeError> {
        self.with_connection(id, |slot, core| {
            let conn = core.connection(id)?;
            let stmt = PreparedStatement::compile(conn, id, sql)
                .map_err(|e| slot.engine_error(&e, Some(format!(", while compiling: {sql}"))))?;
            let stmt_id = self.next_statement_id();
            debug!(statement = %stmt_id, params = stmt.parameter_count(), "prepared statement");
            core.statements.insert(stmt_id, stmt);
            self.live_statements.fetch_add(1, Ordering::SeqCst);
            Ok(stmt_id)
        })
    }

    /// Release a prepared statement.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if the connection is gone or the statement was
    /// already finalized.
    pub fn finalize(&self, id: ConnectionId, stmt_id: StatementId) -> Result<(), BridgeError> {
        self.with_connection(id, |_, core| {
            let stmt = core
                .statements
                .remove(&stmt_id)
                .ok_or_else(|| BridgeError::statement_finalized(stmt_id))?;
            self.live_statements.fetch_sub(1, Ordering::SeqCst);
            trace!(statement = %stmt_id, connection = %stmt.connection_id, sql = stmt.sql(), "finalized statement");
            Ok(())
        })
    }

    fn bind_value(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        index: usize,
        value: Value,
    ) -> Result<(), BridgeError> {
        self.with_statement(id, stmt_id, |slot, _, stmt| {
            stmt.bind(index, value).map_err(|e| slot.engine_error(&e, None))
        })
    }

    /// # Errors
    ///
    /// Returns `BridgeError::Engine` (`IndexOutOfRange`) for a bad 1-based index, or
    /// `BridgeError::InvalidHandle` if either handle is gone. Same for the other binders.
    pub fn bind_null(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        index: usize,
    ) -> Result<(), BridgeError> {
        self.bind_value(id, stmt_id, index, Value::Null)
    }

    /// # Errors
    ///
    /// See [`HandleRegistry::bind_null`].
    pub fn bind_long(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        index: usize,
        value: i64,
    ) -> Result<(), BridgeError> {
        self.bind_value(id, stmt_id, index, Value::Integer(value))
    }

    /// # Errors
    ///
    /// See [`HandleRegistry::bind_null`].
    pub fn bind_double(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        index: usize,
        value: f64,
    ) -> Result<(), BridgeError> {
        self.bind_value(id, stmt_id, index, Value::Real(value))
    }

    /// # Errors
    ///
    /// See [`HandleRegistry::bind_null`].
    pub fn bind_string(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        index: usize,
        value: &str,
    ) -> Result<(), BridgeError> {
        self.bind_value(id, stmt_id, index, Value::Text(value.to_string()))
    }

    /// # Errors
    ///
    /// See [`HandleRegistry::bind_null`].
    pub fn bind_blob(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        index: usize,
        value: &[u8],
    ) -> Result<(), BridgeError> {
        self.bind_value(id, stmt_id, index, Value::Blob(value.to_vec()))
    }

    /// Reset the statement and set every parameter back to NULL. Calling it twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if either handle is gone.
    pub fn reset_and_clear_bindings(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<(), BridgeError> {
        self.reset_statement(id, stmt_id, true)
    }

    /// Reset the statement, optionally clearing its bindings.
    ///
    /// Executions always leave the compiled statement reset, so only the bindings change.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if either handle is gone.
    pub fn reset_statement(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        clear_bindings: bool,
    ) -> Result<(), BridgeError> {
        self.with_statement(id, stmt_id, |_, _, stmt| {
            if clear_bindings {
                stmt.clear_bindings();
            }
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if either handle is gone.
    pub fn parameter_count(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<usize, BridgeError> {
        self.with_statement(id, stmt_id, |_, _, stmt| Ok(stmt.parameter_count()))
    }

    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if either handle is gone.
    pub fn is_read_only(&self, id: ConnectionId, stmt_id: StatementId) -> Result<bool, BridgeError> {
        self.with_statement(id, stmt_id, |_, _, stmt| Ok(stmt.is_read_only()))
    }

    /// Result columns of the compiled statement, as of its last compilation.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if either handle is gone.
    pub fn column_count(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<usize, BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            let compiled = stmt.compiled(conn).map_err(|e| slot.engine_error(&e, None))?;
            Ok(compiled.column_count())
        })
    }

    /// Name of the column at 0-based `index`, or `None` past the last column.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if either handle is gone.
    pub fn column_name(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        index: usize,
    ) -> Result<Option<String>, BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            let compiled = stmt.compiled(conn).map_err(|e| slot.engine_error(&e, None))?;
            Ok(compiled.column_names().get(index).map(|name| (*name).to_string()))
        })
    }
}
