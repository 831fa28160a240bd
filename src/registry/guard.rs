use std::sync::Arc;

use tracing::trace;

use crate::error::BridgeError;
use crate::types::ConnectionId;

use super::HandleRegistry;
use super::slot::ConnectionSlot;

/// A counted reference to a live connection slot.
///
/// Holding a lease keeps the slot's bookkeeping consistent; it does not lock the engine.
/// Dropping it releases the reference under the registry lock.
pub(crate) struct ConnectionLease<'r> {
    registry: &'r HandleRegistry,
    pub(crate) slot: Arc<ConnectionSlot>,
}

impl HandleRegistry {
    /// Resolve `id` to a live connection. Fails fast if it is unknown or being closed.
    pub(crate) fn acquire(&self, id: ConnectionId) -> Result<ConnectionLease<'_>, BridgeError> {
        let state = self.lock_state();
        let slot = state
            .connections
            .get(&id)
            .filter(|slot| !slot.is_delete_pending())
            .cloned()
            .ok_or_else(|| BridgeError::connection_closed(id))?;
        slot.retain();
        drop(state);
        Ok(ConnectionLease {
            registry: self,
            slot,
        })
    }

    /// Acquire `id` for deletion: mark it delete-pending and remove it from the table in the
    /// same critical section, so no later `acquire` can see it.
    pub(crate) fn acquire_for_delete(
        &self,
        id: ConnectionId,
    ) -> Result<ConnectionLease<'_>, BridgeError> {
        let mut state = self.lock_state();
        let slot = state
            .connections
            .remove(&id)
            .ok_or_else(|| BridgeError::connection_closed(id))?;
        slot.retain();
        slot.mark_delete_pending();
        drop(state);
        Ok(ConnectionLease {
            registry: self,
            slot,
        })
    }

    /// Look up `id` without taking a reference; used by `cancel`.
    pub(crate) fn peek(&self, id: ConnectionId) -> Option<Arc<ConnectionSlot>> {
        self.lock_state().connections.get(&id).cloned()
    }
}

impl Drop for ConnectionLease<'_> {
    fn drop(&mut self) {
        let _state = self.registry.lock_state();
        if self.slot.release() {
            trace!(connection = %self.slot.id, "connection slot retired");
        }
    }
}
