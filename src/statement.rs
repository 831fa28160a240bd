use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{CachedStatement, Connection, ffi};

use crate::types::ConnectionId;

/// A compiled statement, as tracked by its owning connection.
///
/// The compiled form lives in the connection's statement cache; this keeps the SQL and the
/// current bindings. Column shape is always read from the compiled form, since the engine
/// recompiles it after a schema change.
#[derive(Debug, Clone)]
pub(crate) struct PreparedStatement {
    pub(crate) connection_id: ConnectionId,
    sql: Arc<str>,
    bindings: Vec<Value>,
    readonly: bool,
}

impl PreparedStatement {
    /// Compile `sql` on `conn` and capture its parameter count.
    pub(crate) fn compile(
        conn: &Connection,
        connection_id: ConnectionId,
        sql: &str,
    ) -> rusqlite::Result<Self> {
        let stmt = conn.prepare_cached(sql)?;
        Ok(Self {
            connection_id,
            sql: Arc::from(sql),
            bindings: vec![Value::Null; stmt.parameter_count()],
            readonly: stmt.readonly(),
        })
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn parameter_count(&self) -> usize {
        self.bindings.len()
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.readonly
    }

    /// Bind `value` at 1-based `index`.
    pub(crate) fn bind(&mut self, index: usize, value: Value) -> rusqlite::Result<()> {
        let count = self.bindings.len();
        match index.checked_sub(1).and_then(|i| self.bindings.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_RANGE),
                Some(format!("bind index {index} out of range (statement has {count} parameters)")),
            )),
        }
    }

    pub(crate) fn clear_bindings(&mut self) {
        self.bindings.fill(Value::Null);
    }

    /// Fetch the compiled statement from the cache, bindings untouched.
    pub(crate) fn compiled<'c>(&self, conn: &'c Connection) -> rusqlite::Result<CachedStatement<'c>> {
        conn.prepare_cached(&self.sql)
    }

    /// Fetch the compiled statement from the cache with the current bindings applied.
    pub(crate) fn bound<'c>(&self, conn: &'c Connection) -> rusqlite::Result<CachedStatement<'c>> {
        let mut stmt = self.compiled(conn)?;
        for (i, value) in self.bindings.iter().enumerate() {
            stmt.raw_bind_parameter(i + 1, value)?;
        }
        Ok(stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(sql: &str) -> PreparedStatement {
        crate::engine::init(&crate::config::RegistryOptions::default()).unwrap();
        let conn = Connection::open_in_memory().unwrap();
        PreparedStatement::compile(&conn, ConnectionId::from(1), sql).unwrap()
    }

    #[test]
    fn compile_captures_parameters() {
        let stmt = compile("SELECT ?1 AS a, ?2 AS b, 3 AS c");
        assert_eq!(stmt.parameter_count(), 2);
        assert!(stmt.is_read_only());
    }

    #[test]
    fn compiled_form_reports_columns() {
        crate::engine::init(&crate::config::RegistryOptions::default()).unwrap();
        let conn = Connection::open_in_memory().unwrap();
        let stmt = PreparedStatement::compile(&conn, ConnectionId::from(1), "SELECT 1 AS a, 2 AS b")
            .unwrap();
        let compiled = stmt.compiled(&conn).unwrap();
        assert_eq!(compiled.column_names(), ["a", "b"]);
    }

    #[test]
    fn bind_rejects_out_of_range_index() {
        let mut stmt = compile("SELECT ?1");
        assert!(stmt.bind(1, Value::Integer(5)).is_ok());
        let err = stmt.bind(2, Value::Integer(5)).unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(rusqlite::ErrorCode::ParameterOutOfRange));
        assert!(stmt.bind(0, Value::Null).is_err());
    }

    #[test]
    fn clear_bindings_is_repeatable() {
        let mut stmt = compile("SELECT ?1, ?2");
        stmt.bind(2, Value::Text("x".into())).unwrap();
        stmt.clear_bindings();
        stmt.clear_bindings();
        assert!(stmt.bindings.iter().all(|v| *v == Value::Null));
    }
}
