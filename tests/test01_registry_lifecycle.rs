use sqlite_bridge::prelude::*;
use tempfile::tempdir;

fn registry() -> Result<HandleRegistry, BridgeError> {
    HandleRegistry::new(RegistryOptions::default())
}

#[test]
fn open_then_close_leaves_registry_empty() -> Result<(), BridgeError> {
    let registry = registry()?;
    let dir = tempdir().expect("tempdir");
    let on_disk = dir.path().join("lifecycle.db");
    let on_disk = on_disk.to_string_lossy().into_owned();

    let cases = [
        (":memory:", OpenFlags::READ_WRITE),
        (":memory:", OpenFlags::CREATE_IF_NECESSARY),
        ("file::memory:?cache=shared", OpenFlags::CREATE_IF_NECESSARY),
        (on_disk.as_str(), OpenFlags::CREATE_IF_NECESSARY),
        (on_disk.as_str(), OpenFlags::READ_WRITE),
    ];
    for (path, flags) in cases {
        let id = registry.open(path, flags, "lifecycle", false, false)?;
        assert_eq!(registry.connection_count(), 1, "open of {path} not registered");
        registry.close(id)?;
        assert_eq!(registry.connection_count(), 0, "close of {path} left an entry");
        assert_eq!(registry.statement_count(), 0);
    }
    Ok(())
}

#[test]
fn missing_file_without_create_flag_fails_cleanly() -> Result<(), BridgeError> {
    let registry = registry()?;
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("absent.db");

    let err = registry
        .open(&path.to_string_lossy(), OpenFlags::READ_WRITE, "absent", false, false)
        .expect_err("opening a missing file without CREATE should fail");
    assert_eq!(err.engine_kind(), Some(EngineErrorKind::CannotOpen));
    assert!(err.to_string().contains("connection ID 'absent'"));
    assert_eq!(registry.connection_count(), 0);
    assert!(!path.exists());
    Ok(())
}

#[test]
fn closed_ids_stay_invalid() -> Result<(), BridgeError> {
    let registry = registry()?;
    let id = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "stale", false, false)?;
    registry.close(id)?;

    assert!(matches!(registry.close(id), Err(BridgeError::InvalidHandle(_))));
    assert!(matches!(
        registry.prepare(id, "SELECT 1"),
        Err(BridgeError::InvalidHandle(_))
    ));
    assert!(matches!(
        registry.reset_cancel(id, true),
        Err(BridgeError::InvalidHandle(_))
    ));
    // Cancelling a stale id is a silent no-op.
    registry.cancel(id);
    registry.cancel(ConnectionId::from(987_654));
    Ok(())
}

#[test]
fn registries_are_independent() -> Result<(), BridgeError> {
    let first = registry()?;
    let second = registry()?;
    let a = first.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "first", false, false)?;
    let b = second.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "second", false, false)?;

    assert_eq!(first.connection_count(), 1);
    assert_eq!(second.connection_count(), 1);
    first.close(a)?;
    assert_eq!(second.connection_count(), 1);
    second.close(b)?;
    Ok(())
}

#[test]
fn connections_share_an_on_disk_database() -> Result<(), BridgeError> {
    let registry = registry()?;
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("shared.db").to_string_lossy().into_owned();

    let writer = registry.open(&path, OpenFlags::CREATE_IF_NECESSARY, "writer", true, true)?;
    let reader = registry.open(&path, OpenFlags::READ_WRITE, "reader", false, false)?;

    let ddl = registry.prepare(writer, "CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")?;
    registry.execute(writer, ddl)?;
    registry.finalize(writer, ddl)?;
    let insert = registry.prepare(writer, "INSERT INTO kv VALUES ('a', 1), ('b', 2)")?;
    assert_eq!(registry.execute_for_changed_row_count(writer, insert)?, 2);
    registry.finalize(writer, insert)?;

    let count = registry.prepare(reader, "SELECT sum(v) FROM kv")?;
    assert_eq!(registry.execute_for_long(reader, count)?, 3);
    registry.finalize(reader, count)?;

    assert!(registry.lookaside_memory_used(reader)? >= 0);
    registry.close(reader)?;
    registry.close(writer)?;
    Ok(())
}
