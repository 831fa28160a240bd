use sqlite_bridge::prelude::*;

fn open_with(options: RegistryOptions) -> Result<(HandleRegistry, ConnectionId), BridgeError> {
    let registry = HandleRegistry::new(options)?;
    let conn = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "array", false, false)?;
    Ok((registry, conn))
}

fn run(registry: &HandleRegistry, conn: ConnectionId, sql: &str) -> Result<(), BridgeError> {
    let stmt = registry.prepare(conn, sql)?;
    registry.execute(conn, stmt)?;
    registry.finalize(conn, stmt)
}

fn materialize(
    registry: &HandleRegistry,
    conn: ConnectionId,
    sql: &str,
) -> Result<ObjectArray, BridgeError> {
    let stmt = registry.prepare(conn, sql)?;
    let array = registry.execute_for_object_array(conn, stmt);
    registry.finalize(conn, stmt)?;
    array
}

#[test]
fn small_table_materializes_with_types() -> Result<(), BridgeError> {
    let (registry, conn) = open_with(RegistryOptions::default())?;
    run(&registry, conn, "CREATE TABLE t (a INTEGER, b TEXT)")?;
    run(&registry, conn, "INSERT INTO t VALUES (1, 'x'), (2, 'y'), (3, 'z')")?;

    let array = materialize(&registry, conn, "SELECT * FROM t ORDER BY a")?;
    assert_eq!(array.columns, vec!["a", "b"]);
    assert_eq!(array.column_types, vec![ColumnType::Long, ColumnType::String]);
    assert_eq!(
        array.rows,
        vec![
            vec![SqlValue::Integer(1), SqlValue::Text("x".into())],
            vec![SqlValue::Integer(2), SqlValue::Text("y".into())],
            vec![SqlValue::Integer(3), SqlValue::Text("z".into())],
        ]
    );

    let sequence = array.into_sequence();
    assert_eq!(sequence.len(), 5);
    assert_eq!(sequence[1], vec![SqlValue::Text("l".into()), SqlValue::Text("s".into())]);
    registry.close(conn)?;
    Ok(())
}

#[test]
fn mixed_and_null_columns_get_fallback_codes() -> Result<(), BridgeError> {
    let (registry, conn) = open_with(RegistryOptions::default())?;
    let array = materialize(
        &registry,
        conn,
        "SELECT 1 AS mixed, NULL AS empty, 2.5 AS real, x'00ff' AS bytes \
         UNION ALL SELECT 'text', NULL, NULL, NULL",
    )?;
    assert_eq!(
        array.column_types,
        vec![
            ColumnType::Object,
            ColumnType::Null,
            ColumnType::Double,
            ColumnType::ByteArray
        ]
    );
    assert_eq!(array.rows[0][3], SqlValue::Blob(vec![0x00, 0xff]));
    assert!(array.rows[1][2].is_null());
    let codes: String = array.column_types.iter().map(|ty| ty.code()).collect();
    assert_eq!(codes, "ondb");
    registry.close(conn)?;
    Ok(())
}

#[test]
fn small_chunks_keep_every_row_in_order() -> Result<(), BridgeError> {
    let options = RegistryOptions::builder().object_array_chunk_rows(3).finish();
    let (registry, conn) = open_with(options)?;
    let array = materialize(
        &registry,
        conn,
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1001) SELECT x FROM c",
    )?;
    assert_eq!(array.rows.len(), 1001);
    let ids: Vec<i64> = array.rows.iter().filter_map(|row| row[0].as_int()).collect();
    assert_eq!(ids, (1..=1001).collect::<Vec<_>>());
    registry.close(conn)?;
    Ok(())
}

#[test]
fn empty_result_has_header_and_null_types_only() -> Result<(), BridgeError> {
    let (registry, conn) = open_with(RegistryOptions::default())?;
    run(&registry, conn, "CREATE TABLE e (a INTEGER, b BLOB)")?;
    let array = materialize(&registry, conn, "SELECT a, b FROM e")?;
    assert_eq!(array.columns, vec!["a", "b"]);
    assert_eq!(array.column_types, vec![ColumnType::Null, ColumnType::Null]);
    assert!(array.rows.is_empty());
    registry.close(conn)?;
    Ok(())
}

#[test]
fn engine_error_mid_stream_yields_no_result() -> Result<(), BridgeError> {
    let (registry, conn) = open_with(RegistryOptions::default())?;
    // abs() of the smallest integer overflows once the second row is reached.
    let stmt = registry.prepare(
        conn,
        "SELECT abs(v) FROM (SELECT 1 AS v UNION ALL SELECT -9223372036854775808)",
    )?;
    let err = registry
        .execute_for_object_array(conn, stmt)
        .expect_err("integer overflow");
    assert!(matches!(err, BridgeError::Engine(_)));
    registry.finalize(conn, stmt)?;
    registry.close(conn)?;
    Ok(())
}

#[test]
fn prepared_select_follows_added_column() -> Result<(), BridgeError> {
    let (registry, conn) = open_with(RegistryOptions::default())?;
    run(&registry, conn, "CREATE TABLE t (a INTEGER)")?;
    run(&registry, conn, "INSERT INTO t VALUES (1)")?;
    let select = registry.prepare(conn, "SELECT * FROM t")?;
    assert_eq!(registry.execute_for_object_array(conn, select)?.columns, vec!["a"]);

    run(&registry, conn, "ALTER TABLE t ADD COLUMN b TEXT DEFAULT 'x'")?;
    let array = registry.execute_for_object_array(conn, select)?;
    assert_eq!(array.columns, vec!["a", "b"]);
    assert_eq!(
        array.rows,
        vec![vec![SqlValue::Integer(1), SqlValue::Text("x".into())]]
    );
    assert_eq!(registry.column_count(conn, select)?, 2);
    assert_eq!(registry.column_name(conn, select, 1)?.as_deref(), Some("b"));

    let mut window = RowWindow::new(usize::MAX);
    let fill = registry.execute_for_cursor_window(conn, select, &mut window, 0, 0, false)?;
    assert_eq!(fill, WindowFill { start_pos: 0, row_count: 1 });
    assert_eq!(window.num_columns(), 2);
    assert_eq!(window.get(0, 1), Some(&SqlValue::Text("x".into())));

    registry.finalize(conn, select)?;
    registry.close(conn)?;
    Ok(())
}
