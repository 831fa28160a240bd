use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use sqlite_bridge::prelude::*;

const SLOW_COUNT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 300000) \
     SELECT count(*) FROM c";

/// A close issued while another thread is executing waits for that execution; the
/// execution either completes or, if it had not reached the engine yet, sees a closed handle.
#[test]
fn close_waits_for_in_flight_execute() -> Result<(), BridgeError> {
    let registry = Arc::new(HandleRegistry::new(RegistryOptions::default())?);
    let conn = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "race", false, false)?;
    let stmt = registry.prepare(conn, SLOW_COUNT)?;

    let worker = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.execute_for_long(conn, stmt))
    };

    // Wait until the worker holds a lease on the connection.
    for _ in 0..500 {
        if registry.connection_info(conn).map(|info| info.in_use).unwrap_or(0) > 0 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    registry.close(conn)?;
    assert_eq!(registry.connection_count(), 0);
    assert_eq!(registry.statement_count(), 0);

    match worker.join().expect("worker panicked") {
        Ok(count) => assert_eq!(count, 300_000),
        Err(BridgeError::InvalidHandle(_)) => {}
        Err(other) => panic!("unexpected error from in-flight execute: {other}"),
    }

    assert!(matches!(
        registry.execute_for_long(conn, stmt),
        Err(BridgeError::InvalidHandle(_))
    ));
    Ok(())
}

/// Hammer one connection from several threads while another closes it. Every call must
/// either succeed or report a stale handle.
#[test]
fn concurrent_execute_and_close_never_use_a_closed_handle() -> Result<(), BridgeError> {
    for round in 0..20 {
        let registry = Arc::new(HandleRegistry::new(RegistryOptions::default())?);
        let conn = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "hammer", false, false)?;
        let stmt = registry.prepare(conn, "SELECT 7")?;
        let barrier = Arc::new(Barrier::new(5));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..50 {
                        match registry.execute_for_long(conn, stmt) {
                            Ok(value) => assert_eq!(value, 7),
                            Err(BridgeError::InvalidHandle(_)) => return,
                            Err(other) => panic!("round {round}: unexpected error {other}"),
                        }
                    }
                })
            })
            .collect();

        barrier.wait();
        registry.close(conn)?;
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert_eq!(registry.connection_count(), 0);
    }
    Ok(())
}

#[test]
fn only_one_of_two_racing_closes_succeeds() -> Result<(), BridgeError> {
    let registry = Arc::new(HandleRegistry::new(RegistryOptions::default())?);
    let conn = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "double", false, false)?;
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.close(conn)
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("close thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(BridgeError::InvalidHandle(_)))));
    Ok(())
}
