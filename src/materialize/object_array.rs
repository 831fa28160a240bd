use std::collections::TryReserveError;

use serde::Serialize;

use crate::error::{BridgeError, MSG_RESULT_SET};
use crate::types::{ColumnType, SqlValue};

/// A fully drained result: column names, inferred column types and every row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectArray {
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ObjectArray {
    pub(crate) fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let column_types = infer_column_types(columns.len(), &rows);
        Self {
            columns,
            column_types,
            rows,
        }
    }

    /// Flatten into one sequence: the header row, the type-code row, then the data rows.
    #[must_use]
    pub fn into_sequence(self) -> Vec<Vec<SqlValue>> {
        let mut sequence = Vec::with_capacity(self.rows.len() + 2);
        sequence.push(self.columns.into_iter().map(SqlValue::Text).collect());
        sequence.push(
            self.column_types
                .iter()
                .map(|ty| SqlValue::Text(ty.code().to_string()))
                .collect(),
        );
        sequence.extend(self.rows);
        sequence
    }
}

/// OR together the storage classes seen in each column. NULL cells do not count.
#[must_use]
pub fn infer_column_types(column_count: usize, rows: &[Vec<SqlValue>]) -> Vec<ColumnType> {
    let mut masks = vec![0_u8; column_count];
    for row in rows {
        for (mask, value) in masks.iter_mut().zip(row) {
            *mask |= value.type_bit();
        }
    }
    masks.into_iter().map(ColumnType::from_mask).collect()
}

/// Row accumulator that moves rows into the archive one chunk at a time, with fallible growth.
pub(crate) struct ChunkedRows {
    chunk_rows: usize,
    archive: Vec<Vec<SqlValue>>,
    chunk: Vec<Vec<SqlValue>>,
}

impl ChunkedRows {
    pub(crate) fn new(chunk_rows: usize) -> Result<Self, BridgeError> {
        let mut chunk = Vec::new();
        chunk.try_reserve_exact(chunk_rows).map_err(allocation_error)?;
        Ok(Self {
            chunk_rows,
            archive: Vec::new(),
            chunk,
        })
    }

    pub(crate) fn new_row(columns: usize) -> Result<Vec<SqlValue>, BridgeError> {
        let mut row = Vec::new();
        row.try_reserve_exact(columns).map_err(allocation_error)?;
        Ok(row)
    }

    pub(crate) fn push(&mut self, row: Vec<SqlValue>) -> Result<(), BridgeError> {
        self.chunk.push(row);
        if self.chunk.len() >= self.chunk_rows {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BridgeError> {
        self.archive
            .try_reserve(self.chunk.len())
            .map_err(allocation_error)?;
        self.archive.append(&mut self.chunk);
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<Vec<Vec<SqlValue>>, BridgeError> {
        self.flush()?;
        Ok(self.archive)
    }
}

fn allocation_error(err: TryReserveError) -> BridgeError {
    BridgeError::Allocation(format!("{MSG_RESULT_SET}: {err}"))
}
