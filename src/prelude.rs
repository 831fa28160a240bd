//! Convenient imports for common functionality.

pub use crate::config::{RegistryOptions, RegistryOptionsBuilder};
pub use crate::error::{BridgeError, EngineErrorKind};
pub use crate::materialize::{CursorWindow, ObjectArray, RowWindow, WindowFill};
pub use crate::registry::HandleRegistry;
pub use crate::types::{ColumnType, ConnectionId, OpenFlags, SqlValue, StatementId};
