//! # Columnar Storage Primitives
//!
//! Variable-length per-row data (metadata, allelic states, individual
//! locations) is stored as one contiguous value buffer plus an offsets array
//! delimiting each row's slice, rather than per-row heap allocations. This
//! keeps tables cache-friendly and cheap to serialize.
//!
//! The offsets array always has `len + 1` entries with `offsets[0] == 0` and
//! `offsets[len] == values.len()`.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{self, MetadataSchema, MetadataValue};

/// Check that two parallel columns agree in length
pub(crate) fn expect_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(TreeSeqError::LengthMismatch { expected, actual });
    }
    Ok(())
}

/// A ragged column: per-row variable-length slices of `T` backed by a single
/// value buffer and an offsets index.
#[derive(Clone, Debug, PartialEq)]
pub struct RaggedColumn<T> {
    values: Vec<T>,
    offsets: Vec<u64>,
}

impl<T> Default for RaggedColumn<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            offsets: vec![0],
        }
    }
}

impl<T: Clone> RaggedColumn<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a value buffer and offsets array, validating consistency
    /// against an expected row count.
    pub fn from_parts(values: Vec<T>, offsets: Vec<u64>, rows: usize) -> Result<Self> {
        expect_len(rows + 1, offsets.len())?;
        if offsets.first() != Some(&0) {
            return Err(TreeSeqError::invalid_bound("offsets must start at 0"));
        }
        if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(TreeSeqError::invalid_bound(
                "offsets must be non-decreasing",
            ));
        }
        expect_len(
            values.len(),
            *offsets.last().unwrap_or(&0) as usize,
        )?;
        Ok(Self { values, offsets })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one row's slice
    pub fn push(&mut self, row: &[T]) {
        self.values.extend_from_slice(row);
        self.offsets.push(self.values.len() as u64);
    }

    /// The slice for row `index`. Callers check bounds at the table layer.
    pub fn get(&self, index: usize) -> &[T] {
        debug_assert!(index < self.len());
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.values[start..end]
    }

    /// Drop all rows past `len`
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.values.truncate(self.offsets[len] as usize);
            self.offsets.truncate(len + 1);
        }
    }

    /// The contiguous value buffer
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// The offsets index (`len + 1` entries)
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

/// A table's metadata arena: a ragged byte column plus the bound schema that
/// governs how each row's slice is interpreted on read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataColumn {
    data: RaggedColumn<u8>,
    schema: MetadataSchema,
}

impl MetadataColumn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, metadata: &[u8]) {
        self.data.push(metadata);
    }

    pub fn get(&self, index: usize) -> &[u8] {
        self.data.get(index)
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Replace the whole arena, validating before any mutation
    pub fn replace(&mut self, bytes: Vec<u8>, offsets: Vec<u64>, rows: usize) -> Result<()> {
        self.data = RaggedColumn::from_parts(bytes, offsets, rows)?;
        Ok(())
    }

    /// Decode row `index` under the bound schema
    pub fn decode(&self, index: usize) -> Result<MetadataValue> {
        metadata::decode(self.data.get(index), &self.schema)
    }

    pub fn schema(&self) -> &MetadataSchema {
        &self.schema
    }

    pub fn set_schema(&mut self, schema: MetadataSchema) {
        self.schema = schema;
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.values()
    }

    pub fn offsets(&self) -> &[u64] {
        self.data.offsets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut col = RaggedColumn::<u8>::new();
        col.push(b"abc");
        col.push(b"");
        col.push(b"xy");

        assert_eq!(col.len(), 3);
        assert_eq!(col.get(0), b"abc");
        assert_eq!(col.get(1), b"");
        assert_eq!(col.get(2), b"xy");
    }

    #[test]
    fn test_truncate() {
        let mut col = RaggedColumn::<u8>::new();
        col.push(b"abc");
        col.push(b"de");
        col.truncate(1);

        assert_eq!(col.len(), 1);
        assert_eq!(col.get(0), b"abc");
        assert_eq!(col.values(), b"abc");
    }

    #[test]
    fn test_from_parts_validates() {
        let ok = RaggedColumn::from_parts(b"abcde".to_vec(), vec![0, 3, 5], 2);
        assert!(ok.is_ok());

        let wrong_rows = RaggedColumn::from_parts(b"abcde".to_vec(), vec![0, 3, 5], 3);
        assert!(matches!(
            wrong_rows.unwrap_err(),
            TreeSeqError::LengthMismatch { .. }
        ));

        let decreasing = RaggedColumn::from_parts(b"abcde".to_vec(), vec![0, 4, 3], 2);
        assert!(decreasing.is_err());

        let short_buffer = RaggedColumn::from_parts(b"abc".to_vec(), vec![0, 3, 5], 2);
        assert!(short_buffer.is_err());
    }

    #[test]
    fn test_metadata_column_schema() {
        let mut col = MetadataColumn::new();
        col.push(br#"{"name":"n"}"#);
        col.set_schema(MetadataSchema::json());

        let decoded = col.decode(0).unwrap();
        assert_eq!(
            decoded.as_structured().unwrap()["name"],
            serde_json::json!("n")
        );
    }
}
