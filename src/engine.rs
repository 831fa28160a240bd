//! Process-wide engine setup and status counters.
//!
//! These are the only calls that go below rusqlite's safe API: global configuration has to
//! happen before the library initializes, and the status counters are not wrapped.
#![allow(unsafe_code)]

use std::os::raw::c_int;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{Connection, ffi};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::RegistryOptions;
use crate::error::BridgeError;

static INIT: Once = Once::new();
static INIT_RESULT: std::sync::OnceLock<Result<(), String>> = std::sync::OnceLock::new();
static VERBOSE_ENGINE_LOG: AtomicBool = AtomicBool::new(false);

/// Process memory counters reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugStatus {
    pub memory_used: i32,
    pub largest_mem_alloc: i32,
    pub page_cache_overflow: i32,
}

/// One-time engine configuration: multi-thread mode, log sink, soft heap limit.
///
/// Safe to call repeatedly; only the first call configures anything. Later calls may still
/// flip verbose engine logging.
///
/// # Errors
///
/// Returns `BridgeError::Config` if the engine refused to initialize.
pub fn init(options: &RegistryOptions) -> Result<(), BridgeError> {
    VERBOSE_ENGINE_LOG.store(options.verbose_engine_log, Ordering::Relaxed);
    let soft_heap_limit = options.soft_heap_limit;
    INIT.call_once(|| {
        let outcome = configure_engine(soft_heap_limit);
        if let Err(ref msg) = outcome {
            error!(msg = %msg, "sqlite initialization failed");
        }
        let _ = INIT_RESULT.set(outcome);
    });
    match INIT_RESULT.get() {
        Some(Err(msg)) => Err(BridgeError::Config(msg.clone())),
        _ => Ok(()),
    }
}

fn configure_engine(soft_heap_limit: i64) -> Result<(), String> {
    // SAFETY: runs once, before this crate opens any connection. Each connection is only
    // touched under its own mutex, which is what multi-thread mode requires.
    unsafe {
        let rc = ffi::sqlite3_config(ffi::SQLITE_CONFIG_MULTITHREAD);
        if rc == ffi::SQLITE_MISUSE {
            // Someone initialized the library first; their threading mode stays in effect.
            warn!("sqlite already initialized, threading mode left unchanged");
        } else if rc != ffi::SQLITE_OK {
            return Err(format!("sqlite3_config(MULTITHREAD) failed with code {rc}"));
        }

        if let Err(err) = rusqlite::trace::config_log(Some(log_engine_message)) {
            warn!(error = %err, "could not install sqlite log sink");
        }

        let rc = ffi::sqlite3_initialize();
        if rc != ffi::SQLITE_OK {
            return Err(format!("sqlite3_initialize failed with code {rc}"));
        }

        ffi::sqlite3_soft_heap_limit64(soft_heap_limit);
    }
    debug!(soft_heap_limit, "sqlite initialized");
    Ok(())
}

fn log_engine_message(code: c_int, msg: &str) {
    let primary = code & 0xff;
    let routine =
        primary == ffi::SQLITE_OK || primary == ffi::SQLITE_CONSTRAINT || primary == ffi::SQLITE_SCHEMA;
    if routine {
        if VERBOSE_ENGINE_LOG.load(Ordering::Relaxed) {
            debug!(target: "sqlite_bridge::engine", code, "{msg}");
        }
    } else {
        error!(target: "sqlite_bridge::engine", code, "{msg}");
    }
}

/// Ask the engine to free up to `bytes` of heap. Returns the number of bytes released.
#[must_use]
pub fn release_memory(bytes: i64) -> i32 {
    let bytes = c_int::try_from(bytes).unwrap_or(c_int::MAX);
    // SAFETY: no preconditions beyond an initialized library, which `init` guarantees.
    unsafe { ffi::sqlite3_release_memory(bytes) }
}

/// Snapshot of the process-wide memory counters.
#[must_use]
pub fn debug_status() -> DebugStatus {
    DebugStatus {
        memory_used: status_value(ffi::SQLITE_STATUS_MEMORY_USED, false),
        largest_mem_alloc: status_value(ffi::SQLITE_STATUS_MALLOC_SIZE, true),
        page_cache_overflow: status_value(ffi::SQLITE_STATUS_PAGECACHE_OVERFLOW, false),
    }
}

fn status_value(op: c_int, highwater: bool) -> i32 {
    let mut current: c_int = 0;
    let mut high: c_int = 0;
    // SAFETY: both out-pointers refer to live locals.
    let rc = unsafe { ffi::sqlite3_status(op, &mut current, &mut high, 0) };
    if rc != ffi::SQLITE_OK {
        warn!(op, rc, "sqlite3_status failed");
        return 0;
    }
    if highwater { high } else { current }
}

/// Lookaside slots currently in use by one connection.
#[must_use]
pub(crate) fn lookaside_used(conn: &Connection) -> i32 {
    let mut current: c_int = 0;
    let mut high: c_int = 0;
    // SAFETY: the handle belongs to `conn`, which the caller holds exclusively for the
    // duration of this call.
    let rc = unsafe {
        ffi::sqlite3_db_status(
            conn.handle(),
            ffi::SQLITE_DBSTATUS_LOOKASIDE_USED,
            &mut current,
            &mut high,
            0,
        )
    };
    if rc != ffi::SQLITE_OK {
        warn!(rc, "sqlite3_db_status failed");
        return 0;
    }
    current
}

/// Whether this build links an encrypting engine.
#[must_use]
pub fn has_codec() -> bool {
    cfg!(feature = "sqlcipher")
}
