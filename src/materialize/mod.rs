//! Result materialization: into a bounded cursor window, or fully into memory.

mod object_array;
mod window;

pub use object_array::{ObjectArray, infer_column_types};
pub use window::{CursorWindow, RowWindow, WindowFill};

use tracing::trace;

use crate::error::BridgeError;
use crate::registry::HandleRegistry;
use crate::types::{ConnectionId, SqlValue, StatementId};

use object_array::ChunkedRows;
use window::copy_row;

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn size_window(window: &mut dyn CursorWindow, columns: usize) -> Result<(), BridgeError> {
    if window.set_num_columns(columns) {
        Ok(())
    } else {
        Err(BridgeError::Usage(format!(
            "cursor window rejected {columns} columns"
        )))
    }
}

impl HandleRegistry {
    /// Run a query and copy a contiguous run of its rows into `window`.
    ///
    /// Copying starts at row `start_pos`. If the window fills up before row `required_pos`
    /// has been copied, the window is cleared and filling restarts at the row that did not
    /// fit, so `required_pos` is always in the window when it exists. With `count_all` the
    /// query is stepped to the end and `row_count` is the total number of rows; otherwise
    /// stepping stops once the window is full.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Usage` if the window rejects the column count, and reports
    /// engine, cancellation and handle errors like [`HandleRegistry::execute`].
    pub fn execute_for_cursor_window(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
        window: &mut dyn CursorWindow,
        start_pos: usize,
        required_pos: usize,
        count_all: bool,
    ) -> Result<WindowFill, BridgeError> {
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            window.clear();
            let mut cached = stmt.bound(conn).map_err(|e| slot.engine_error(&e, None))?;
            let mut rows = cached.raw_query();
            let mut shape = None;
            let mut n_row = 0_usize;
            let mut i_start = start_pos;
            let mut window_open = true;

            while let Some(row) = rows.next().map_err(|e| slot.engine_error(&e, None))? {
                // The first step recompiles a statement invalidated by a schema change.
                let columns = match shape {
                    Some(columns) => columns,
                    None => {
                        let count = row.as_ref().column_count();
                        size_window(window, count)?;
                        *shape.insert(count)
                    }
                };
                if window_open && n_row >= i_start {
                    let mut copied = copy_row(window, row, n_row - i_start, columns)
                        .map_err(|e| slot.engine_error(&e, None))?;
                    if !copied && n_row <= required_pos {
                        trace!(row = n_row, required_pos, "window full before required row, restarting");
                        window.clear();
                        size_window(window, columns)?;
                        i_start = n_row;
                        copied = copy_row(window, row, 0, columns)
                            .map_err(|e| slot.engine_error(&e, None))?;
                    }
                    if !copied {
                        window_open = false;
                        if !count_all {
                            break;
                        }
                    }
                }
                n_row += 1;
            }
            drop(rows);
            if shape.is_none() {
                size_window(window, cached.column_count())?;
            }

            window.set_start_position(i_start);
            let fill = WindowFill {
                start_pos: saturating_i32(i_start),
                row_count: saturating_i32(n_row),
            };
            trace!(start = fill.start_pos, rows = fill.row_count, count_all, "filled window");
            Ok(fill)
        })
    }

    /// Run a query and drain every row into memory.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Allocation` if the result could not be held in memory, and
    /// reports engine, cancellation and handle errors like [`HandleRegistry::execute`].
    /// Nothing partial is returned.
    pub fn execute_for_object_array(
        &self,
        id: ConnectionId,
        stmt_id: StatementId,
    ) -> Result<ObjectArray, BridgeError> {
        let chunk_rows = self.options().object_array_chunk_rows;
        self.with_statement(id, stmt_id, |slot, conn, stmt| {
            let mut collected = ChunkedRows::new(chunk_rows)?;

            let mut cached = stmt.bound(conn).map_err(|e| slot.engine_error(&e, None))?;
            let mut rows = cached.raw_query();
            while let Some(row) = rows.next().map_err(|e| slot.engine_error(&e, None))? {
                let columns = row.as_ref().column_count();
                let mut values = ChunkedRows::new_row(columns)?;
                for column in 0..columns {
                    let value = row
                        .get_ref(column)
                        .map_err(|e| slot.engine_error(&e, None))?;
                    values.push(SqlValue::from(value));
                }
                collected.push(values)?;
            }
            drop(rows);

            // Read after stepping, so a recompiled statement reports its current columns.
            let columns = cached
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            Ok(ObjectArray::new(columns, collected.finish()?))
        })
    }
}
