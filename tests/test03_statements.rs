use sqlite_bridge::prelude::*;

fn open() -> Result<(HandleRegistry, ConnectionId), BridgeError> {
    let registry = HandleRegistry::new(RegistryOptions::default())?;
    let conn = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "stmts", false, false)?;
    Ok((registry, conn))
}

#[test]
fn bad_sql_error_names_the_sql() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    let sql = "SELEC oops FROM nowhere";
    let err = registry
        .prepare(conn, sql)
        .expect_err("malformed SQL must not yield a statement id");
    assert!(err.to_string().contains(sql), "message was: {err}");
    assert!(err.to_string().contains("while compiling"));
    assert_eq!(registry.statement_count(), 0);

    let err = registry
        .prepare(conn, "SELECT * FROM missing_table")
        .expect_err("unknown table");
    assert!(err.to_string().contains("missing_table"));
    registry.close(conn)?;
    Ok(())
}

#[test]
fn only_the_first_statement_is_prepared() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    let stmt = registry.prepare(conn, "SELECT 1 AS first; SELECT 2 AS second")?;
    assert_eq!(registry.column_name(conn, stmt, 0)?.as_deref(), Some("first"));
    assert_eq!(registry.execute_for_long(conn, stmt)?, 1);
    assert_eq!(registry.statement_count(), 1);
    registry.finalize(conn, stmt)?;
    registry.close(conn)?;
    Ok(())
}

#[test]
fn statement_shape_is_reported() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    let select = registry.prepare(conn, "SELECT ?1 AS first, ?2 AS second")?;
    assert_eq!(registry.parameter_count(conn, select)?, 2);
    assert_eq!(registry.column_count(conn, select)?, 2);
    assert_eq!(registry.column_name(conn, select, 1)?.as_deref(), Some("second"));
    assert_eq!(registry.column_name(conn, select, 2)?, None);
    assert!(registry.is_read_only(conn, select)?);

    let ddl = registry.prepare(conn, "CREATE TABLE t (a INTEGER)")?;
    assert!(!registry.is_read_only(conn, ddl)?);
    assert_eq!(registry.column_count(conn, ddl)?, 0);
    assert_eq!(registry.statement_count(), 2);

    registry.finalize(conn, select)?;
    registry.finalize(conn, ddl)?;
    assert_eq!(registry.statement_count(), 0);
    registry.close(conn)?;
    Ok(())
}

#[test]
fn finalize_twice_reports_invalid_handle() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    let stmt = registry.prepare(conn, "SELECT 1")?;
    registry.finalize(conn, stmt)?;
    assert!(matches!(
        registry.finalize(conn, stmt),
        Err(BridgeError::InvalidHandle(_))
    ));
    assert!(matches!(
        registry.execute_for_long(conn, stmt),
        Err(BridgeError::InvalidHandle(_))
    ));
    registry.close(conn)?;
    Ok(())
}

#[test]
fn statement_ids_are_numbered_apart_from_connections() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    let other = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "other", false, false)?;
    let first = registry.prepare(conn, "SELECT 1")?;
    let second = registry.prepare(other, "SELECT 2")?;
    assert_ne!(first, second);
    // A statement id is only visible through its own connection.
    assert!(matches!(
        registry.execute_for_long(conn, second),
        Err(BridgeError::InvalidHandle(_))
    ));
    assert_eq!(registry.execute_for_long(other, second)?, 2);
    registry.finalize(conn, first)?;
    registry.finalize(other, second)?;
    registry.close(other)?;
    registry.close(conn)?;
    Ok(())
}

#[test]
fn bind_out_of_range_is_an_index_error() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    let stmt = registry.prepare(conn, "SELECT ?1")?;
    let err = registry
        .bind_long(conn, stmt, 2, 1)
        .expect_err("index 2 on a one-parameter statement");
    assert_eq!(err.engine_kind(), Some(EngineErrorKind::IndexOutOfRange));
    assert!(registry.bind_null(conn, stmt, 0).is_err());
    registry.finalize(conn, stmt)?;
    registry.close(conn)?;
    Ok(())
}

#[test]
fn reset_and_clear_bindings_twice_is_harmless() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    let stmt = registry.prepare(conn, "SELECT ?1")?;
    registry.bind_string(conn, stmt, 1, "bound")?;
    assert_eq!(registry.execute_for_string(conn, stmt)?.as_deref(), Some("bound"));

    registry.reset_and_clear_bindings(conn, stmt)?;
    registry.reset_and_clear_bindings(conn, stmt)?;
    assert_eq!(registry.execute_for_string(conn, stmt)?, None);

    registry.bind_long(conn, stmt, 1, 9)?;
    registry.reset_statement(conn, stmt, false)?;
    assert_eq!(registry.execute_for_long(conn, stmt)?, 9);
    registry.finalize(conn, stmt)?;
    registry.close(conn)?;
    Ok(())
}

#[test]
fn close_discards_unfinalized_statements() -> Result<(), BridgeError> {
    let (registry, conn) = open()?;
    registry.prepare(conn, "SELECT 1")?;
    registry.prepare(conn, "SELECT 2")?;
    assert_eq!(registry.statement_count(), 2);
    registry.close(conn)?;
    assert_eq!(registry.statement_count(), 0);
    assert_eq!(registry.connection_count(), 0);
    Ok(())
}
