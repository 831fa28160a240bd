use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sqlite_bridge::prelude::*;

// Long enough that it is still running when the cancel arrives.
const ENDLESS_COUNT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 500000000) \
     SELECT count(*) FROM c";
const SHORT_COUNT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 20000) \
     SELECT count(*) FROM c";

fn open(registry: &HandleRegistry, label: &str) -> Result<ConnectionId, BridgeError> {
    let conn = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, label, false, false)?;
    registry.reset_cancel(conn, true)?;
    Ok(conn)
}

#[test]
fn cancel_stops_one_connection_and_spares_another() -> Result<(), BridgeError> {
    let registry = Arc::new(HandleRegistry::new(RegistryOptions::default())?);
    let a = open(&registry, "cancel-a")?;
    let b = open(&registry, "cancel-b")?;
    let slow = registry.prepare(a, ENDLESS_COUNT)?;
    let quick = registry.prepare(b, SHORT_COUNT)?;

    let victim = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.execute_for_long(a, slow))
    };
    let bystander = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let mut last = 0;
            for _ in 0..5 {
                last = registry.execute_for_long(b, quick)?;
            }
            Ok::<i64, BridgeError>(last)
        })
    };

    thread::sleep(Duration::from_millis(50));
    registry.cancel(a);

    let victim_result = victim.join().expect("victim thread panicked");
    assert!(
        matches!(victim_result, Err(BridgeError::Cancelled(_))),
        "expected cancellation, got {victim_result:?}"
    );
    assert_eq!(bystander.join().expect("bystander panicked")?, 20_000);

    registry.finalize(a, slow)?;
    registry.finalize(b, quick)?;
    registry.close(a)?;
    registry.close(b)?;
    Ok(())
}

#[test]
fn cancel_flag_is_level_triggered_until_reset() -> Result<(), BridgeError> {
    let registry = HandleRegistry::new(RegistryOptions::default())?;
    let conn = open(&registry, "level")?;
    let stmt = registry.prepare(conn, SHORT_COUNT)?;

    registry.cancel(conn);
    for _ in 0..3 {
        assert!(matches!(
            registry.execute_for_long(conn, stmt),
            Err(BridgeError::Cancelled(_))
        ));
    }

    registry.reset_cancel(conn, true)?;
    assert_eq!(registry.execute_for_long(conn, stmt)?, 20_000);

    registry.finalize(conn, stmt)?;
    registry.close(conn)?;
    Ok(())
}

#[test]
fn disabled_polling_ignores_the_flag() -> Result<(), BridgeError> {
    let registry = HandleRegistry::new(RegistryOptions::default())?;
    let conn = open(&registry, "uncancelable")?;
    let stmt = registry.prepare(conn, SHORT_COUNT)?;

    registry.reset_cancel(conn, false)?;
    registry.cancel(conn);
    assert_eq!(registry.execute_for_long(conn, stmt)?, 20_000);

    registry.finalize(conn, stmt)?;
    registry.close(conn)?;
    Ok(())
}

#[test]
fn cancelled_materialization_returns_nothing_partial() -> Result<(), BridgeError> {
    let registry = HandleRegistry::new(RegistryOptions::default())?;
    let conn = open(&registry, "materialize")?;
    let stmt = registry.prepare(
        conn,
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000) SELECT x FROM c",
    )?;

    registry.cancel(conn);
    assert!(matches!(
        registry.execute_for_object_array(conn, stmt),
        Err(BridgeError::Cancelled(_))
    ));
    let mut window = RowWindow::new(usize::MAX);
    assert!(matches!(
        registry.execute_for_cursor_window(conn, stmt, &mut window, 0, 0, true),
        Err(BridgeError::Cancelled(_))
    ));

    registry.reset_cancel(conn, true)?;
    assert_eq!(registry.execute_for_object_array(conn, stmt)?.rows.len(), 1000);
    registry.finalize(conn, stmt)?;
    registry.close(conn)?;
    Ok(())
}
