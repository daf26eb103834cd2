//! # Population Table
//!
//! A population is an identity that nodes and migrations reference; its only
//! per-row payload is metadata.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::tables::column::MetadataColumn;
use crate::tables::PopulationId;

/// Columnar store of population rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationTable {
    metadata: MetadataColumn,
}

/// Borrowed view of one population row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PopulationRow<'a> {
    pub metadata: &'a [u8],
}

impl PopulationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    pub fn add_row(&mut self, metadata: &[u8]) -> PopulationId {
        self.metadata.push(metadata);
        PopulationId::new(self.metadata.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<PopulationRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        Ok(PopulationRow {
            metadata: self.metadata.get(index),
        })
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.metadata.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    pub fn set_columns(&mut self, metadata: Vec<u8>, metadata_offsets: Vec<u64>) -> Result<()> {
        let rows = metadata_offsets.len().saturating_sub(1);
        let mut arena = MetadataColumn::new();
        arena.set_schema(self.metadata.schema().clone());
        arena.replace(metadata, metadata_offsets, rows)?;
        self.metadata = arena;
        Ok(())
    }

    /// Decoded metadata for row `index`, via the bound schema
    pub fn metadata(&self, index: usize) -> Result<MetadataValue> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        self.metadata.decode(index)
    }

    pub fn metadata_schema(&self) -> &MetadataSchema {
        self.metadata.schema()
    }

    pub fn set_metadata_schema(&mut self, schema: MetadataSchema) {
        self.metadata.set_schema(schema);
    }

    pub(crate) fn metadata_column(&self) -> &MetadataColumn {
        &self.metadata
    }
}
