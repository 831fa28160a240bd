//! Connection and statement handle registry.
//!
//! Every operation resolves an opaque id through the registry, takes a counted lease on the
//! connection slot under a short global lock, then serializes on that connection's own mutex
//! for the engine work. Closing removes the slot from the table first, so later lookups fail
//! fast while in-flight work on the connection drains.

mod cancel;
mod guard;
mod slot;
mod statements;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, DatabaseName, ffi};
use serde::Serialize;
use tracing::{debug, debug_span, info, warn};

use crate::config::RegistryOptions;
use crate::engine;
use crate::error::{BridgeError, EngineError, ErrorContext, MSG_CLOSE_FAILED};
use crate::statement::PreparedStatement;
use crate::types::{ConnectionId, OpenFlags, StatementId};

pub(crate) use slot::{ConnectionCore, ConnectionSlot};

/// Name of the byte-wise collation registered on every connection.
pub const LOCALIZED_COLLATION: &str = "localized";

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) connections: HashMap<ConnectionId, Arc<ConnectionSlot>>,
}

/// Owned store of open connections and their prepared statements.
///
/// Several registries can coexist in one process; they share only the engine's global setup.
pub struct HandleRegistry {
    options: RegistryOptions,
    state: Mutex<RegistryState>,
    next_connection_id: AtomicI64,
    next_statement_id: AtomicI64,
    live_statements: AtomicUsize,
}

/// Diagnostic snapshot of one open connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub label: String,
    pub path: String,
    pub flags: OpenFlags,
    pub trace_enabled: bool,
    pub profile_enabled: bool,
    pub in_use: usize,
}

impl HandleRegistry {
    /// Create an empty registry, initializing the engine on first use.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if the options are invalid or the engine cannot start.
    pub fn new(options: RegistryOptions) -> Result<Self, BridgeError> {
        options.validate()?;
        engine::init(&options)?;
        Ok(Self {
            options,
            state: Mutex::new(RegistryState::default()),
            next_connection_id: AtomicI64::new(1),
            next_statement_id: AtomicI64::new(1),
            live_statements: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `func` with exclusive access to a live connection.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if the connection is unknown, being closed, or was
    /// closed while this call waited for the connection; otherwise whatever `func` returns.
    pub(crate) fn with_connection<F, R>(&self, id: ConnectionId, func: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&ConnectionSlot, &mut ConnectionCore) -> Result<R, BridgeError>,
    {
        let lease = self.acquire(id)?;
        let span = debug_span!("connection", id = id.get(), label = %lease.slot.label);
        let _entered = span.enter();
        let mut core = lease.slot.lock_core();
        if core.conn.is_none() {
            return Err(BridgeError::connection_closed(id));
        }
        func(&lease.slot, &mut core)
    }

    /// Run `func` against one prepared statement of a live connection.
    pub(crate) fn with_statement<F, R>(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        func: F,
    ) -> Result<R, BridgeError>
    where
        F: FnOnce(&ConnectionSlot, &Connection, &mut PreparedStatement) -> Result<R, BridgeError>,
    {
        self.with_connection(id, |slot, core| {
            let (conn, stmt) = core.statement_mut(id, stmt_id)?;
            func(slot, conn, stmt)
        })
    }

    /// Open a database and register it.
    ///
    /// The connection gets the `localized` collation and the configured busy timeout; trace
    /// and profile output go to `tracing` at debug level.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Engine` if the engine cannot open the file, or if it opened
    /// read-only although read-write was requested. The handle is closed before returning.
    pub fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        label: &str,
        enable_trace: bool,
        enable_profile: bool,
    ) -> Result<ConnectionId, BridgeError> {
        let id = ConnectionId::from(self.next_connection_id.fetch_add(1, Ordering::SeqCst));
        let context = || ErrorContext::new(Some(id), Arc::from(label));

        let mut engine_flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if flags.contains(OpenFlags::CREATE_IF_NECESSARY) {
            engine_flags |= rusqlite::OpenFlags::SQLITE_OPEN_CREATE;
        }

        let mut conn = Connection::open_with_flags(path, engine_flags).map_err(|e| {
            EngineError::from_rusqlite(&e, context(), Some(format!("Could not open database '{path}'")))
        })?;

        if let Err(err) = self.configure(&mut conn, enable_trace, enable_profile) {
            let err = match err {
                ConfigureError::Engine(e) => EngineError::from_rusqlite(&e, context(), None),
                ConfigureError::ReadOnly => EngineError::with_code(
                    ffi::SQLITE_READONLY,
                    "Could not open the database in read/write mode.",
                    context(),
                    None,
                ),
            };
            if let Err((_, close_err)) = conn.close() {
                warn!(connection = %id, error = %close_err, "failed to close partially opened database");
            }
            return Err(err.into());
        }

        let slot = Arc::new(ConnectionSlot::new(
            id,
            label,
            path,
            flags,
            conn,
            enable_trace,
            enable_profile,
        ));
        self.lock_state().connections.insert(id, slot);
        info!(connection = %id, label, path, "opened connection");
        Ok(id)
    }

    fn configure(
        &self,
        conn: &mut Connection,
        enable_trace: bool,
        enable_profile: bool,
    ) -> Result<(), ConfigureError> {
        conn.create_collation(LOCALIZED_COLLATION, localized_compare)?;
        if conn.is_readonly(DatabaseName::Main)? {
            return Err(ConfigureError::ReadOnly);
        }
        conn.busy_timeout(self.options.busy_timeout())?;
        conn.set_prepared_statement_cache_capacity(self.options.statement_cache_capacity);
        if enable_trace {
            conn.trace(Some(trace_sql));
        }
        if enable_profile {
            conn.profile(Some(profile_sql));
        }
        Ok(())
    }

    /// Close a connection.
    ///
    /// The id stops resolving immediately; the engine handle is closed once any operation
    /// already running on it has finished. Statements still open are discarded.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if the id is unknown or already closed, and
    /// `BridgeError::Engine` if the engine refuses to close.
    pub fn close(&self, id: ConnectionId) -> Result<(), BridgeError> {
        let lease = self.acquire_for_delete(id)?;
        let span = debug_span!("connection", id = id.get(), label = %lease.slot.label);
        let _entered = span.enter();
        let mut core = lease.slot.lock_core();

        let pending = core.statements.len();
        if pending > 0 {
            warn!(statements = pending, "closing connection with unfinalized statements");
            core.statements.clear();
            self.live_statements.fetch_sub(pending, Ordering::SeqCst);
        }

        let conn = core
            .conn
            .take()
            .ok_or_else(|| BridgeError::connection_closed(id))?;
        conn.close().map_err(|(_, err)| {
            lease
                .slot
                .engine_error(&err, Some(MSG_CLOSE_FAILED.to_string()))
        })?;
        info!("closed connection");
        Ok(())
    }

    /// Number of connections that can still be acquired.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock_state().connections.len()
    }

    /// Number of statements prepared and not yet finalized, across all connections.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.live_statements.load(Ordering::SeqCst)
    }

    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if the connection is unknown or closing.
    pub fn connection_info(&self, id: ConnectionId) -> Result<ConnectionInfo, BridgeError> {
        let slot = self
            .peek(id)
            .ok_or_else(|| BridgeError::connection_closed(id))?;
        Ok(ConnectionInfo {
            id: slot.id,
            label: slot.label.to_string(),
            path: slot.path.clone(),
            flags: slot.flags,
            trace_enabled: slot.trace_enabled,
            profile_enabled: slot.profile_enabled,
            in_use: slot.ref_count(),
        })
    }

    /// Lookaside slots in use by one connection.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if the connection is unknown or closed.
    pub fn lookaside_memory_used(&self, id: ConnectionId) -> Result<i32, BridgeError> {
        self.with_connection(id, |_, core| Ok(engine::lookaside_used(core.connection(id)?)))
    }

    /// Free engine heap, up to the configured soft heap limit.
    #[must_use]
    pub fn release_memory(&self) -> i32 {
        engine::release_memory(self.options.soft_heap_limit)
    }

    fn next_statement_id(&self) -> StatementId {
        StatementId::from(self.next_statement_id.fetch_add(1, Ordering::SeqCst))
    }
}

enum ConfigureError {
    Engine(rusqlite::Error),
    ReadOnly,
}

impl From<rusqlite::Error> for ConfigureError {
    fn from(err: rusqlite::Error) -> Self {
        ConfigureError::Engine(err)
    }
}

/// Byte-wise comparison with length as the tie-breaker, same ordering as BINARY.
fn localized_compare(lhs: &str, rhs: &str) -> std::cmp::Ordering {
    lhs.as_bytes().cmp(rhs.as_bytes())
}

fn trace_sql(sql: &str) {
    debug!(target: "sqlite_bridge::trace", "{sql}");
}

fn profile_sql(sql: &str, elapsed: Duration) {
    debug!(
        target: "sqlite_bridge::profile",
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "{sql}"
    );
}
