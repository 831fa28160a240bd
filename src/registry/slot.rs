use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{BridgeError, EngineError, ErrorContext};
use crate::statement::PreparedStatement;
use crate::types::{ConnectionId, OpenFlags, StatementId};

use super::cancel::CancelFlag;

const STATUS_ACTIVE: u8 = 1;
const STATUS_DELETE_PENDING: u8 = 2;

/// Engine state guarded by the per-connection mutex.
pub(crate) struct ConnectionCore {
    /// `None` once the connection has been closed.
    pub(crate) conn: Option<Connection>,
    pub(crate) statements: HashMap<StatementId, PreparedStatement>,
}

impl ConnectionCore {
    pub(crate) fn connection(&self, id: ConnectionId) -> Result<&Connection, BridgeError> {
        self.conn
            .as_ref()
            .ok_or_else(|| BridgeError::connection_closed(id))
    }

    /// Borrow the connection together with one of its statements.
    pub(crate) fn statement_mut(
        &mut self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<(&Connection, &mut PreparedStatement), BridgeError> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| BridgeError::connection_closed(id))?;
        let stmt = self
            .statements
            .get_mut(&stmt_id)
            .ok_or_else(|| BridgeError::statement_finalized(stmt_id))?;
        Ok((conn, stmt))
    }
}

/// Registry entry for one connection.
///
/// `ref_count` and `status` are only changed while the registry lock is held; they are
/// atomics so the slot can be shared through an `Arc` without a second lock.
pub(crate) struct ConnectionSlot {
    pub(crate) id: ConnectionId,
    pub(crate) label: Arc<str>,
    pub(crate) path: String,
    pub(crate) flags: OpenFlags,
    pub(crate) trace_enabled: bool,
    pub(crate) profile_enabled: bool,
    ref_count: AtomicUsize,
    status: AtomicU8,
    pub(crate) cancel: CancelFlag,
    core: Mutex<ConnectionCore>,
}

impl ConnectionSlot {
    pub(crate) fn new(
        id: ConnectionId,
        label: &str,
        path: &str,
        flags: OpenFlags,
        conn: Connection,
        trace_enabled: bool,
        profile_enabled: bool,
    ) -> Self {
        Self {
            id,
            label: Arc::from(label),
            path: path.to_string(),
            flags,
            trace_enabled,
            profile_enabled,
            ref_count: AtomicUsize::new(0),
            status: AtomicU8::new(0),
            cancel: CancelFlag::default(),
            core: Mutex::new(ConnectionCore {
                conn: Some(conn),
                statements: HashMap::new(),
            }),
        }
    }

    /// Lock the engine state, recovering from a poisoned mutex.
    pub(crate) fn lock_core(&self) -> MutexGuard<'_, ConnectionCore> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn retain(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
        self.status.fetch_or(STATUS_ACTIVE, Ordering::SeqCst);
    }

    pub(crate) fn mark_delete_pending(&self) {
        self.status
            .fetch_or(STATUS_ACTIVE | STATUS_DELETE_PENDING, Ordering::SeqCst);
    }

    /// Drop one reference. Returns true when the slot is now retired: unreferenced with a
    /// close requested.
    pub(crate) fn release(&self) -> bool {
        let previous = self.ref_count.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            self.status.fetch_and(!STATUS_ACTIVE, Ordering::SeqCst);
        }
        self.status.load(Ordering::SeqCst) == STATUS_DELETE_PENDING
    }

    pub(crate) fn is_delete_pending(&self) -> bool {
        self.status.load(Ordering::SeqCst) & STATUS_DELETE_PENDING != 0
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    pub(crate) fn error_context(&self) -> ErrorContext {
        ErrorContext::new(Some(self.id), Arc::clone(&self.label))
    }

    /// Wrap an engine failure with this connection's context.
    ///
    /// An interrupt observed while the cancel flag is raised is reported as a cancellation.
    pub(crate) fn engine_error(&self, err: &rusqlite::Error, detail: Option<String>) -> BridgeError {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted)
            && self.cancel.is_raised()
        {
            return BridgeError::Cancelled(format!(
                "connection {} ('{}') was canceled",
                self.id, self.label
            ));
        }
        match err {
            rusqlite::Error::ExecuteReturnedResults => {
                BridgeError::Usage(crate::error::MSG_QUERY_ON_EXECUTE.to_string())
            }
            other => EngineError::from_rusqlite(other, self.error_context(), detail).into(),
        }
    }
}
