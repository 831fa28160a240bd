//! Process-wide entry points over a single shared registry.
//!
//! Handles are plain `i64`s here, the way a foreign caller holds them. Code that can own a
//! [`HandleRegistry`] directly should do that instead.

use std::sync::OnceLock;

use crate::config::RegistryOptions;
use crate::engine::{self, DebugStatus};
use crate::error::BridgeError;
use crate::materialize::CursorWindow;
use crate::registry::HandleRegistry;
use crate::types::{ConnectionId, OpenFlags, SqlValue, StatementId};

static GLOBAL: OnceLock<HandleRegistry> = OnceLock::new();

/// Initialize the shared registry with default options. Idempotent.
///
/// # Errors
///
/// Returns `BridgeError::Config` if the engine could not be initialized.
pub fn init() -> Result<&'static HandleRegistry, BridgeError> {
    if let Some(registry) = GLOBAL.get() {
        return Ok(registry);
    }
    init_with_options(RegistryOptions::default())
}

/// Initialize the shared registry with `options`.
///
/// # Errors
///
/// Returns `BridgeError::Config` if the options are invalid, or if the registry was already
/// initialized with different options.
pub fn init_with_options(options: RegistryOptions) -> Result<&'static HandleRegistry, BridgeError> {
    if let Some(registry) = GLOBAL.get() {
        return if *registry.options() == options {
            Ok(registry)
        } else {
            Err(BridgeError::Config(
                "bridge already initialized with different options".into(),
            ))
        };
    }
    let registry = HandleRegistry::new(options)?;
    Ok(GLOBAL.get_or_init(|| registry))
}

fn registry() -> Result<&'static HandleRegistry, BridgeError> {
    init()
}

/// # Errors
///
/// See [`HandleRegistry::open`].
pub fn open(
    path: &str,
    flags: u32,
    label: &str,
    enable_trace: bool,
    enable_profile: bool,
) -> Result<i64, BridgeError> {
    registry()?
        .open(path, OpenFlags::from_bits(flags), label, enable_trace, enable_profile)
        .map(i64::from)
}

/// # Errors
///
/// See [`HandleRegistry::close`].
pub fn close(connection: i64) -> Result<(), BridgeError> {
    registry()?.close(ConnectionId::from(connection))
}

/// # Errors
///
/// See [`HandleRegistry::prepare`].
pub fn prepare(connection: i64, sql: &str) -> Result<i64, BridgeError> {
    registry()?
        .prepare(ConnectionId::from(connection), sql)
        .map(i64::from)
}

/// # Errors
///
/// See [`HandleRegistry::finalize`].
pub fn finalize(connection: i64, statement: i64) -> Result<(), BridgeError> {
    registry()?.finalize(ConnectionId::from(connection), StatementId::from(statement))
}

fn handles(connection: i64, statement: i64) -> (ConnectionId, StatementId) {
    (ConnectionId::from(connection), StatementId::from(statement))
}

fn param_index(index: i32) -> Result<usize, BridgeError> {
    usize::try_from(index).map_err(|_| BridgeError::Usage(format!("negative bind index {index}")))
}

/// # Errors
///
/// See [`HandleRegistry::bind_null`].
pub fn bind_null(connection: i64, statement: i64, index: i32) -> Result<(), BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.bind_null(c, s, param_index(index)?)
}

/// # Errors
///
/// See [`HandleRegistry::bind_long`].
pub fn bind_long(connection: i64, statement: i64, index: i32, value: i64) -> Result<(), BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.bind_long(c, s, param_index(index)?, value)
}

/// # Errors
///
/// See [`HandleRegistry::bind_double`].
pub fn bind_double(connection: i64, statement: i64, index: i32, value: f64) -> Result<(), BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.bind_double(c, s, param_index(index)?, value)
}

/// # Errors
///
/// See [`HandleRegistry::bind_string`].
pub fn bind_string(connection: i64, statement: i64, index: i32, value: &str) -> Result<(), BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.bind_string(c, s, param_index(index)?, value)
}

/// # Errors
///
/// See [`HandleRegistry::bind_blob`].
pub fn bind_blob(connection: i64, statement: i64, index: i32, value: &[u8]) -> Result<(), BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.bind_blob(c, s, param_index(index)?, value)
}

/// # Errors
///
/// See [`HandleRegistry::reset_and_clear_bindings`].
pub fn reset_and_clear_bindings(connection: i64, statement: i64) -> Result<(), BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.reset_and_clear_bindings(c, s)
}

/// # Errors
///
/// See [`HandleRegistry::execute`].
pub fn execute(connection: i64, statement: i64) -> Result<(), BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.execute(c, s)
}

/// # Errors
///
/// See [`HandleRegistry::execute_for_long`].
pub fn execute_for_long(connection: i64, statement: i64) -> Result<i64, BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.execute_for_long(c, s)
}

/// # Errors
///
/// See [`HandleRegistry::execute_for_string`].
pub fn execute_for_string(connection: i64, statement: i64) -> Result<Option<String>, BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.execute_for_string(c, s)
}

/// # Errors
///
/// See [`HandleRegistry::execute_for_changed_row_count`].
pub fn execute_for_changed_row_count(connection: i64, statement: i64) -> Result<i64, BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.execute_for_changed_row_count(c, s)
}

/// # Errors
///
/// See [`HandleRegistry::execute_for_last_inserted_row_id`].
pub fn execute_for_last_inserted_row_id(
    connection: i64,
    statement: i64,
) -> Result<i64, BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?.execute_for_last_inserted_row_id(c, s)
}

/// Fill `window` and return `(first_row << 32) | row_count`.
///
/// A negative `start_pos` starts at row 0; a negative `required_row` requires nothing.
///
/// # Errors
///
/// See [`HandleRegistry::execute_for_cursor_window`].
pub fn execute_for_cursor_window(
    connection: i64,
    statement: i64,
    window: &mut dyn CursorWindow,
    start_pos: i32,
    required_row: i32,
    count_all_rows: bool,
) -> Result<i64, BridgeError> {
    let (c, s) = handles(connection, statement);
    let start = usize::try_from(start_pos).unwrap_or(0);
    let required = usize::try_from(required_row).unwrap_or(0);
    registry()?
        .execute_for_cursor_window(c, s, window, start, required, count_all_rows)
        .map(crate::materialize::WindowFill::pack)
}

/// Header row, type-code row, then one row per result row.
///
/// # Errors
///
/// See [`HandleRegistry::execute_for_object_array`].
pub fn execute_for_object_array(
    connection: i64,
    statement: i64,
) -> Result<Vec<Vec<SqlValue>>, BridgeError> {
    let (c, s) = handles(connection, statement);
    registry()?
        .execute_for_object_array(c, s)
        .map(crate::materialize::ObjectArray::into_sequence)
}

/// Never fails; an unknown connection is ignored.
pub fn cancel(connection: i64) {
    if let Some(registry) = GLOBAL.get() {
        registry.cancel(ConnectionId::from(connection));
    }
}

/// # Errors
///
/// See [`HandleRegistry::reset_cancel`].
pub fn reset_cancel(connection: i64, cancelable: bool) -> Result<(), BridgeError> {
    registry()?.reset_cancel(ConnectionId::from(connection), cancelable)
}

/// # Errors
///
/// See [`HandleRegistry::lookaside_memory_used`].
pub fn lookaside_memory_used(connection: i64) -> Result<i32, BridgeError> {
    registry()?.lookaside_memory_used(ConnectionId::from(connection))
}

/// # Errors
///
/// Returns `BridgeError::Config` if the shared registry could not be initialized.
pub fn release_memory() -> Result<i32, BridgeError> {
    Ok(registry()?.release_memory())
}

#[must_use]
pub fn debug_status() -> DebugStatus {
    engine::debug_status()
}

#[must_use]
pub fn has_codec() -> bool {
    engine::has_codec()
}
