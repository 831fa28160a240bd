use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::Connection;
use tracing::{debug, trace};

use crate::error::BridgeError;
use crate::types::ConnectionId;

use super::HandleRegistry;

/// Level-triggered cancellation flag shared between a connection slot and its progress handler.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Install (or remove) the progress handler that polls this flag.
    pub(crate) fn install(&self, conn: &Connection, interval: i32, enabled: bool) {
        if enabled {
            let flag = Arc::clone(&self.0);
            conn.progress_handler(interval, Some(move || flag.load(Ordering::Relaxed)));
        } else {
            conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}

impl HandleRegistry {
    /// Request cancellation of whatever runs on `id`, now or later, until `reset_cancel`.
    ///
    /// Does not wait for the connection. An unknown or closed id is ignored.
    pub fn cancel(&self, id: ConnectionId) {
        match self.peek(id) {
            Some(slot) => {
                slot.cancel.raise();
                debug!(connection = %id, "cancel requested");
            }
            None => trace!(connection = %id, "cancel ignored for unknown connection"),
        }
    }

    /// Clear the cancel flag and turn cancellation polling on or off.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidHandle` if the connection is unknown or closed.
    pub fn reset_cancel(&self, id: ConnectionId, cancelable: bool) -> Result<(), BridgeError> {
        let interval = self.options().progress_interval;
        self.with_connection(id, |slot, core| {
            slot.cancel.clear();
            slot.cancel.install(core.connection(id)?, interval, cancelable);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_stays_raised_until_cleared() {
        let flag = CancelFlag::default();
        let shared = flag.clone();
        shared.raise();
        assert!(flag.is_raised());
        assert!(flag.is_raised());
        flag.clear();
        assert!(!shared.is_raised());
    }
}
