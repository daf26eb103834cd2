//! # Provenance Table
//!
//! An append-only log of operations applied to a collection: free-text or
//! structured records plus their timestamps. Entries are never reordered and
//! carry no metadata column of their own.

use crate::error::{Result, TreeSeqError};
use crate::tables::column::RaggedColumn;
use crate::tables::ProvenanceId;

/// Columnar store of provenance rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProvenanceTable {
    timestamp: RaggedColumn<u8>,
    record: RaggedColumn<u8>,
}

/// Borrowed view of one provenance row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProvenanceRow<'a> {
    pub timestamp: &'a str,
    pub record: &'a str,
}

impl ProvenanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    pub fn add_row(&mut self, timestamp: &str, record: &str) -> ProvenanceId {
        self.timestamp.push(timestamp.as_bytes());
        self.record.push(record.as_bytes());
        ProvenanceId::new(self.timestamp.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<ProvenanceRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        let timestamp = std::str::from_utf8(self.timestamp.get(index))
            .map_err(|_| TreeSeqError::invalid_file("provenance timestamp is not valid UTF-8"))?;
        let record = std::str::from_utf8(self.record.get(index))
            .map_err(|_| TreeSeqError::invalid_file("provenance record is not valid UTF-8"))?;
        Ok(ProvenanceRow { timestamp, record })
    }

    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.timestamp.truncate(len);
        self.record.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    pub fn set_columns(
        &mut self,
        timestamp: Vec<u8>,
        timestamp_offsets: Vec<u64>,
        record: Vec<u8>,
        record_offsets: Vec<u64>,
    ) -> Result<()> {
        let rows = timestamp_offsets.len().saturating_sub(1);
        let timestamp = RaggedColumn::from_parts(timestamp, timestamp_offsets, rows)?;
        let record = RaggedColumn::from_parts(record, record_offsets, rows)?;
        for index in 0..rows {
            std::str::from_utf8(timestamp.get(index)).map_err(|_| {
                TreeSeqError::invalid_file("provenance timestamp is not valid UTF-8")
            })?;
            std::str::from_utf8(record.get(index))
                .map_err(|_| TreeSeqError::invalid_file("provenance record is not valid UTF-8"))?;
        }

        self.timestamp = timestamp;
        self.record = record;
        Ok(())
    }

    pub fn timestamps(&self) -> &RaggedColumn<u8> {
        &self.timestamp
    }

    pub fn records(&self) -> &RaggedColumn<u8> {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_ordering() {
        let mut table = ProvenanceTable::new();
        table.add_row("2026-01-01T00:00:00", r#"{"op":"create"}"#);
        table.add_row("2026-01-02T00:00:00", r#"{"op":"sort"}"#);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get_row(0).unwrap().record, r#"{"op":"create"}"#);
        assert_eq!(table.get_row(1).unwrap().timestamp, "2026-01-02T00:00:00");
    }

    #[test]
    fn test_set_columns_rejects_invalid_utf8() {
        let mut table = ProvenanceTable::new();
        let err = table
            .set_columns(vec![0xFF], vec![0, 1], b"r".to_vec(), vec![0, 1])
            .unwrap_err();
        assert!(matches!(err, TreeSeqError::InvalidFile { .. }));
    }
}
