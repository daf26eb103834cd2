//! # Individual Table
//!
//! An individual groups nodes (genome copies) into an organism, with an
//! optional spatial location and references to parent individuals. Parent
//! references form a DAG that must stay acyclic; that invariant is checked
//! when a tree sequence is built.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::tables::column::{MetadataColumn, RaggedColumn};
use crate::tables::IndividualId;

/// Columnar store of individual rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndividualTable {
    flags: Vec<u64>,
    location: RaggedColumn<f64>,
    parents: RaggedColumn<IndividualId>,
    metadata: MetadataColumn,
}

/// Borrowed view of one individual row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndividualRow<'a> {
    pub flags: u64,
    pub location: &'a [f64],
    pub parents: &'a [IndividualId],
    pub metadata: &'a [u8],
}

impl IndividualTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    pub fn add_row(
        &mut self,
        flags: u64,
        location: &[f64],
        parents: &[IndividualId],
        metadata: &[u8],
    ) -> IndividualId {
        self.flags.push(flags);
        self.location.push(location);
        self.parents.push(parents);
        self.metadata.push(metadata);
        IndividualId::new(self.flags.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<IndividualRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        Ok(IndividualRow {
            flags: self.flags[index],
            location: self.location.get(index),
            parents: self.parents.get(index),
            metadata: self.metadata.get(index),
        })
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.flags.truncate(len);
        self.location.truncate(len);
        self.parents.truncate(len);
        self.metadata.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    #[allow(clippy::too_many_arguments)]
    pub fn set_columns(
        &mut self,
        flags: Vec<u64>,
        location: Vec<f64>,
        location_offsets: Vec<u64>,
        parents: Vec<IndividualId>,
        parents_offsets: Vec<u64>,
        metadata: Vec<u8>,
        metadata_offsets: Vec<u64>,
    ) -> Result<()> {
        let n = flags.len();
        let location = RaggedColumn::from_parts(location, location_offsets, n)?;
        let parents = RaggedColumn::from_parts(parents, parents_offsets, n)?;
        let mut arena = MetadataColumn::new();
        arena.set_schema(self.metadata.schema().clone());
        arena.replace(metadata, metadata_offsets, n)?;

        self.flags = flags;
        self.location = location;
        self.parents = parents;
        self.metadata = arena;
        Ok(())
    }

    pub fn flags(&self) -> &[u64] {
        &self.flags
    }

    pub fn locations(&self) -> &RaggedColumn<f64> {
        &self.location
    }

    pub fn parents(&self) -> &RaggedColumn<IndividualId> {
        &self.parents
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
