//! # Site Table
//!
//! A site is a genomic position at which variation is tracked, carrying the
//! ancestral allelic state for that position.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::tables::column::{MetadataColumn, RaggedColumn};
use crate::tables::SiteId;

/// Columnar store of site rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SiteTable {
    position: Vec<f64>,
    ancestral_state: RaggedColumn<u8>,
    metadata: MetadataColumn,
}

/// Borrowed view of one site row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SiteRow<'a> {
    pub position: f64,
    pub ancestral_state: &'a [u8],
    pub metadata: &'a [u8],
}

impl SiteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    pub fn add_row(&mut self, position: f64, ancestral_state: &str, metadata: &[u8]) -> SiteId {
        self.position.push(position);
        self.ancestral_state.push(ancestral_state.as_bytes());
        self.metadata.push(metadata);
        SiteId::new(self.position.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<SiteRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        Ok(SiteRow {
            position: self.position[index],
            ancestral_state: self.ancestral_state.get(index),
            metadata: self.metadata.get(index),
        })
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.position.truncate(len);
        self.ancestral_state.truncate(len);
        self.metadata.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    pub fn set_columns(
        &mut self,
        position: Vec<f64>,
        ancestral_state: Vec<u8>,
        ancestral_state_offsets: Vec<u64>,
        metadata: Vec<u8>,
        metadata_offsets: Vec<u64>,
    ) -> Result<()> {
        let n = position.len();
        let states = RaggedColumn::from_parts(ancestral_state, ancestral_state_offsets, n)?;
        let mut arena = MetadataColumn::new();
        arena.set_schema(self.metadata.schema().clone());
        arena.replace(metadata, metadata_offsets, n)?;

        self.position = position;
        self.ancestral_state = states;
        self.metadata = arena;
        Ok(())
    }

    pub fn positions(&self) -> &[f64] {
        &self.position
    }

    pub fn ancestral_states(&self) -> &RaggedColumn<u8> {
        &self.ancestral_state
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

    pub(crate) fn apply_permutation(&mut self, order: &[usize]) {
        let mut position = Vec::with_capacity(self.len());
        let mut states = RaggedColumn::new();
        let mut metadata_bytes = Vec::new();
        let mut metadata_offsets = vec![0u64];
        for &old in order {
            position.push(self.position[old]);
            states.push(self.ancestral_state.get(old));
            metadata_bytes.extend_from_slice(self.metadata.get(old));
            metadata_offsets.push(metadata_bytes.len() as u64);
        }
        self.position = position;
        self.ancestral_state = states;
        // offsets rebuilt from the same rows; cannot fail
        let _ = self
            .metadata
            .replace(metadata_bytes, metadata_offsets, order.len());
    }
}
