//! # Migration Table
//!
//! A migration records that a node moved from a source population to a
//! destination population at a given time, over a genomic interval.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::tables::column::{expect_len, MetadataColumn};
use crate::tables::{MigrationId, NodeId, PopulationId};

/// Columnar store of migration rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MigrationTable {
    left: Vec<f64>,
    right: Vec<f64>,
    node: Vec<NodeId>,
    source: Vec<PopulationId>,
    dest: Vec<PopulationId>,
    time: Vec<f64>,
    metadata: MetadataColumn,
}

/// Borrowed view of one migration row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MigrationRow<'a> {
    pub left: f64,
    pub right: f64,
    pub node: NodeId,
    pub source: PopulationId,
    pub dest: PopulationId,
    pub time: f64,
    pub metadata: &'a [u8],
}

impl MigrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    #[allow(clippy::too_many_arguments)]
    pub fn add_row(
        &mut self,
        left: f64,
        right: f64,
        node: NodeId,
        source: PopulationId,
        dest: PopulationId,
        time: f64,
        metadata: &[u8],
    ) -> MigrationId {
        self.left.push(left);
        self.right.push(right);
        self.node.push(node);
        self.source.push(source);
        self.dest.push(dest);
        self.time.push(time);
        self.metadata.push(metadata);
        MigrationId::new(self.left.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<MigrationRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        Ok(MigrationRow {
            left: self.left[index],
            right: self.right[index],
            node: self.node[index],
            source: self.source[index],
            dest: self.dest[index],
            time: self.time[index],
            metadata: self.metadata.get(index),
        })
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.left.truncate(len);
        self.right.truncate(len);
        self.node.truncate(len);
        self.source.truncate(len);
        self.dest.truncate(len);
        self.time.truncate(len);
        self.metadata.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    #[allow(clippy::too_many_arguments)]
    pub fn set_columns(
        &mut self,
        left: Vec<f64>,
        right: Vec<f64>,
        node: Vec<NodeId>,
        source: Vec<PopulationId>,
        dest: Vec<PopulationId>,
        time: Vec<f64>,
        metadata: Vec<u8>,
        metadata_offsets: Vec<u64>,
    ) -> Result<()> {
        let n = left.len();
        expect_len(n, right.len())?;
        expect_len(n, node.len())?;
        expect_len(n, source.len())?;
        expect_len(n, dest.len())?;
        expect_len(n, time.len())?;
        let mut arena = MetadataColumn::new();
        arena.set_schema(self.metadata.schema().clone());
        arena.replace(metadata, metadata_offsets, n)?;

        self.left = left;
        self.right = right;
        self.node = node;
        self.source = source;
        self.dest = dest;
        self.time = time;
        self.metadata = arena;
        Ok(())
    }

    pub fn lefts(&self) -> &[f64] {
        &self.left
    }

    pub fn rights(&self) -> &[f64] {
        &self.right
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.node
    }

    pub fn sources(&self) -> &[PopulationId] {
        &self.source
    }

    pub fn dests(&self) -> &[PopulationId] {
        &self.dest
    }

    pub fn times(&self) -> &[f64] {
        &self.time
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
