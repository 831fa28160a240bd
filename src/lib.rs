//! Handle registry and result materialization over an embedded `SQLite` engine.
//!
//! Connections and prepared statements are addressed by opaque ids. Each operation takes a
//! counted lease on the connection, serializes on that connection's mutex, and releases
//! both on every exit path. Closing a connection removes it from lookup at once and waits
//! for in-flight work; a running query can be canceled from another thread.
//!
//! ```rust
//! use sqlite_bridge::prelude::*;
//!
//! # fn main() -> Result<(), BridgeError> {
//! let registry = HandleRegistry::new(RegistryOptions::default())?;
//! let conn = registry.open(":memory:", OpenFlags::CREATE_IF_NECESSARY, "doc", false, false)?;
//! let stmt = registry.prepare(conn, "SELECT 40 + ?1")?;
//! registry.bind_long(conn, stmt, 1, 2)?;
//! assert_eq!(registry.execute_for_long(conn, stmt)?, 42);
//! registry.finalize(conn, stmt)?;
//! registry.close(conn)?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
mod executor;
pub mod materialize;
pub mod prelude;
pub mod registry;
mod statement;
pub mod types;

pub use config::{RegistryOptions, RegistryOptionsBuilder};
pub use engine::DebugStatus;
pub use error::{BridgeError, EngineError, EngineErrorKind, ErrorContext};
pub use materialize::{CursorWindow, ObjectArray, RowWindow, WindowFill};
pub use registry::{ConnectionInfo, HandleRegistry};
pub use types::{ColumnType, ConnectionId, OpenFlags, SqlValue, StatementId};
