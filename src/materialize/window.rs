use rusqlite::Row;
use rusqlite::types::ValueRef;

use crate::types::SqlValue;

/// Destination of a paginated result fill.
///
/// Every `alloc_row` and `put_*` returns `false` when the buffer is full; the caller then
/// frees the partial row and decides whether to start over. Rows are indexed from the start
/// of the window, not of the result set.
pub trait CursorWindow {
    fn clear(&mut self);
    fn set_num_columns(&mut self, columns: usize) -> bool;
    fn alloc_row(&mut self) -> bool;
    fn free_last_row(&mut self);
    fn put_null(&mut self, row: usize, column: usize) -> bool;
    fn put_long(&mut self, row: usize, column: usize, value: i64) -> bool;
    fn put_double(&mut self, row: usize, column: usize, value: f64) -> bool;
    fn put_string(&mut self, row: usize, column: usize, value: &str) -> bool;
    fn put_blob(&mut self, row: usize, column: usize, value: &[u8]) -> bool;

    /// Result-set position of the window's first row.
    fn set_start_position(&mut self, _position: usize) {}
}

/// First copied row and row count of a window fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFill {
    pub start_pos: i32,
    /// Exclusive end of the copied rows, or the full row count when counting all rows.
    pub row_count: i32,
}

impl WindowFill {
    /// `start_pos` in the high 32 bits, `row_count` in the low 32 bits.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn pack(self) -> i64 {
        (i64::from(self.start_pos) << 32) | i64::from(self.row_count as u32)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn unpack(packed: i64) -> Self {
        Self {
            start_pos: (packed >> 32) as i32,
            row_count: packed as i32,
        }
    }
}

/// Copy one result row into `window` at window row `row`.
///
/// Returns `false` and leaves the window without that row if it did not fit.
pub(crate) fn copy_row(
    window: &mut dyn CursorWindow,
    row: &Row<'_>,
    window_row: usize,
    columns: usize,
) -> rusqlite::Result<bool> {
    if !window.alloc_row() {
        return Ok(false);
    }
    for column in 0..columns {
        let stored = match row.get_ref(column)? {
            ValueRef::Null => window.put_null(window_row, column),
            ValueRef::Integer(i) => window.put_long(window_row, column, i),
            ValueRef::Real(f) => window.put_double(window_row, column, f),
            ValueRef::Text(bytes) => {
                window.put_string(window_row, column, &String::from_utf8_lossy(bytes))
            }
            ValueRef::Blob(bytes) => window.put_blob(window_row, column, bytes),
        };
        if !stored {
            window.free_last_row();
            return Ok(false);
        }
    }
    Ok(true)
}

/// Bytes charged per field slot, on top of any string or blob payload.
const FIELD_SLOT_BYTES: usize = 16;

/// In-memory cursor window bounded by a byte budget and optionally a row count.
#[derive(Debug, Clone)]
pub struct RowWindow {
    capacity_bytes: usize,
    max_rows: Option<usize>,
    used_bytes: usize,
    columns: usize,
    start_position: usize,
    rows: Vec<Vec<SqlValue>>,
    row_bytes: Vec<usize>,
}

impl RowWindow {
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            max_rows: None,
            used_bytes: 0,
            columns: 0,
            start_position: 0,
            rows: Vec::new(),
            row_bytes: Vec::new(),
        }
    }

    /// Also stop accepting rows once `max_rows` are held.
    #[must_use]
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns
    }

    #[must_use]
    pub fn start_position(&self) -> usize {
        self.start_position
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Value at window row `row`, column `column`.
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<&SqlValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Value by result-set position, if that row is inside the window.
    #[must_use]
    pub fn get_at_position(&self, position: usize, column: usize) -> Option<&SqlValue> {
        position
            .checked_sub(self.start_position)
            .and_then(|row| self.get(row, column))
    }

    fn charge(&mut self, bytes: usize) -> bool {
        match self.used_bytes.checked_add(bytes) {
            Some(total) if total <= self.capacity_bytes => {
                self.used_bytes = total;
                if let Some(last) = self.row_bytes.last_mut() {
                    *last += bytes;
                }
                true
            }
            _ => false,
        }
    }

    fn put(&mut self, row: usize, column: usize, value: SqlValue, payload: usize) -> bool {
        if column >= self.columns || row + 1 != self.rows.len() || !self.charge(payload) {
            return false;
        }
        match self.rows.last_mut() {
            Some(cells) => {
                cells[column] = value;
                true
            }
            None => false,
        }
    }
}

impl CursorWindow for RowWindow {
    fn clear(&mut self) {
        self.rows.clear();
        self.row_bytes.clear();
        self.used_bytes = 0;
        self.columns = 0;
        self.start_position = 0;
    }

    fn set_num_columns(&mut self, columns: usize) -> bool {
        if !self.rows.is_empty() && columns != self.columns {
            return false;
        }
        self.columns = columns;
        true
    }

    fn alloc_row(&mut self) -> bool {
        if self.max_rows.is_some_and(|max| self.rows.len() >= max) {
            return false;
        }
        let slots = self.columns * FIELD_SLOT_BYTES;
        if self.used_bytes + slots > self.capacity_bytes {
            return false;
        }
        self.used_bytes += slots;
        self.rows.push(vec![SqlValue::Null; self.columns]);
        self.row_bytes.push(slots);
        true
    }

    fn free_last_row(&mut self) {
        if self.rows.pop().is_some() {
            let bytes = self.row_bytes.pop().unwrap_or(0);
            self.used_bytes -= bytes;
        }
    }

    fn put_null(&mut self, row: usize, column: usize) -> bool {
        self.put(row, column, SqlValue::Null, 0)
    }

    fn put_long(&mut self, row: usize, column: usize, value: i64) -> bool {
        self.put(row, column, SqlValue::Integer(value), 0)
    }

    fn put_double(&mut self, row: usize, column: usize, value: f64) -> bool {
        self.put(row, column, SqlValue::Real(value), 0)
    }

    fn put_string(&mut self, row: usize, column: usize, value: &str) -> bool {
        self.put(row, column, SqlValue::Text(value.to_string()), value.len() + 1)
    }

    fn put_blob(&mut self, row: usize, column: usize, value: &[u8]) -> bool {
        self.put(row, column, SqlValue::Blob(value.to_vec()), value.len())
    }

    fn set_start_position(&mut self, position: usize) {
        self.start_position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_places_start_in_high_bits() {
        let fill = WindowFill {
            start_pos: 3,
            row_count: 10,
        };
        assert_eq!(fill.pack(), (3_i64 << 32) | 10);
        assert_eq!(WindowFill::unpack(fill.pack()), fill);
    }

    #[test]
    fn failed_put_leaves_no_partial_row() {
        let mut window = RowWindow::new(2 * FIELD_SLOT_BYTES + 4);
        assert!(window.set_num_columns(2));
        assert!(window.alloc_row());
        assert!(window.put_long(0, 0, 1));
        assert!(!window.put_string(0, 1, "too long for the budget"));
        window.free_last_row();
        assert_eq!(window.num_rows(), 0);
        assert_eq!(window.used_bytes(), 0);
    }

    #[test]
    fn max_rows_limits_allocation() {
        let mut window = RowWindow::new(usize::MAX).with_max_rows(1);
        window.set_num_columns(1);
        assert!(window.alloc_row());
        assert!(!window.alloc_row());
    }
}
