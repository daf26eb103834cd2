//! # Edge Table
//!
//! An edge records that `parent` is the parent of `child` over the genomic
//! interval `[left, right)`.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::tables::column::{expect_len, MetadataColumn};
use crate::tables::{EdgeId, NodeId};

/// Columnar store of edge rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeTable {
    left: Vec<f64>,
    right: Vec<f64>,
    parent: Vec<NodeId>,
    child: Vec<NodeId>,
    metadata: MetadataColumn,
}

/// Borrowed view of one edge row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeRow<'a> {
    pub left: f64,
    pub right: f64,
    pub parent: NodeId,
    pub child: NodeId,
    pub metadata: &'a [u8],
}

impl EdgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    pub fn add_row(
        &mut self,
        left: f64,
        right: f64,
        parent: NodeId,
        child: NodeId,
        metadata: &[u8],
    ) -> EdgeId {
        self.left.push(left);
        self.right.push(right);
        self.parent.push(parent);
        self.child.push(child);
        self.metadata.push(metadata);
        EdgeId::new(self.left.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<EdgeRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        Ok(EdgeRow {
            left: self.left[index],
            right: self.right[index],
            parent: self.parent[index],
            child: self.child[index],
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
        self.parent.truncate(len);
        self.child.truncate(len);
        self.metadata.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    pub fn set_columns(
        &mut self,
        left: Vec<f64>,
        right: Vec<f64>,
        parent: Vec<NodeId>,
        child: Vec<NodeId>,
        metadata: Vec<u8>,
        metadata_offsets: Vec<u64>,
    ) -> Result<()> {
        let n = left.len();
        expect_len(n, right.len())?;
        expect_len(n, parent.len())?;
        expect_len(n, child.len())?;
        let mut arena = MetadataColumn::new();
        arena.set_schema(self.metadata.schema().clone());
        arena.replace(metadata, metadata_offsets, n)?;

        self.left = left;
        self.right = right;
        self.parent = parent;
        self.child = child;
        self.metadata = arena;
        Ok(())
    }

    pub fn lefts(&self) -> &[f64] {
        &self.left
    }

    pub fn rights(&self) -> &[f64] {
        &self.right
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.child
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
        let mut left = Vec::with_capacity(self.len());
        let mut right = Vec::with_capacity(self.len());
        let mut parent = Vec::with_capacity(self.len());
        let mut child = Vec::with_capacity(self.len());
        let mut metadata_bytes = Vec::new();
        let mut metadata_offsets = vec![0u64];
        for &old in order {
            left.push(self.left[old]);
            right.push(self.right[old]);
            parent.push(self.parent[old]);
            child.push(self.child[old]);
            metadata_bytes.extend_from_slice(self.metadata.get(old));
            metadata_offsets.push(metadata_bytes.len() as u64);
        }
        self.left = left;
        self.right = right;
        self.parent = parent;
        self.child = child;
        // offsets rebuilt from the same rows; cannot fail
        let _ = self
            .metadata
            .replace(metadata_bytes, metadata_offsets, order.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut table = EdgeTable::new();
        let id = table.add_row(0.0, 10.0, NodeId::new(2), NodeId::new(0), b"");
        assert_eq!(id, EdgeId::new(0));

        let row = table.get_row(0).unwrap();
        assert_eq!(row.left, 0.0);
        assert_eq!(row.right, 10.0);
        assert_eq!(row.parent, NodeId::new(2));
        assert_eq!(row.child, NodeId::new(0));
    }

    #[test]
    fn test_set_columns() {
        let mut table = EdgeTable::new();
        table
            .set_columns(
                vec![0.0, 0.0],
                vec![5.0, 10.0],
                vec![NodeId::new(2), NodeId::new(2)],
                vec![NodeId::new(0), NodeId::new(1)],
                b"ab".to_vec(),
                vec![0, 1, 2],
            )
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_row(0).unwrap().metadata, b"a");
        assert_eq!(table.get_row(1).unwrap().metadata, b"b");
    }

    #[test]
    fn test_set_columns_mismatch() {
        let mut table = EdgeTable::new();
        let err = table
            .set_columns(
                vec![0.0],
                vec![5.0, 10.0],
                vec![NodeId::new(0)],
                vec![NodeId::new(1)],
                Vec::new(),
                vec![0, 0],
            )
            .unwrap_err();
        assert!(matches!(err, TreeSeqError::LengthMismatch { .. }));
    }
}
