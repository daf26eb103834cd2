//! # Mutation Table
//!
//! A mutation is a state change at a site, attached to a node, optionally
//! chained to a parent mutation at the same site. Mutation times may be
//! unknown, encoded as NaN; comparisons and equality treat the sentinel by
//! bit pattern so collections round-trip exactly.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::tables::column::{expect_len, MetadataColumn, RaggedColumn};
use crate::tables::{MutationId, NodeId, SiteId};

/// Sentinel for an unknown mutation time
pub const UNKNOWN_TIME: f64 = f64::NAN;

/// Whether a mutation time is the unknown sentinel
pub fn is_unknown_time(time: f64) -> bool {
    time.is_nan()
}

/// Columnar store of mutation rows
#[derive(Clone, Debug, Default)]
pub struct MutationTable {
    site: Vec<SiteId>,
    node: Vec<NodeId>,
    parent: Vec<MutationId>,
    time: Vec<f64>,
    derived_state: RaggedColumn<u8>,
    metadata: MetadataColumn,
}

/// Borrowed view of one mutation row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MutationRow<'a> {
    pub site: SiteId,
    pub node: NodeId,
    pub parent: MutationId,
    pub time: f64,
    pub derived_state: &'a [u8],
    pub metadata: &'a [u8],
}

impl MutationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    pub fn add_row(
        &mut self,
        site: SiteId,
        node: NodeId,
        parent: MutationId,
        time: f64,
        derived_state: &str,
        metadata: &[u8],
    ) -> MutationId {
        self.site.push(site);
        self.node.push(node);
        self.parent.push(parent);
        self.time.push(time);
        self.derived_state.push(derived_state.as_bytes());
        self.metadata.push(metadata);
        MutationId::new(self.site.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<MutationRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        Ok(MutationRow {
            site: self.site[index],
            node: self.node[index],
            parent: self.parent[index],
            time: self.time[index],
            derived_state: self.derived_state.get(index),
            metadata: self.metadata.get(index),
        })
    }

    pub fn len(&self) -> usize {
        self.site.len()
    }

    pub fn is_empty(&self) -> bool {
        self.site.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.site.truncate(len);
        self.node.truncate(len);
        self.parent.truncate(len);
        self.time.truncate(len);
        self.derived_state.truncate(len);
        self.metadata.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    #[allow(clippy::too_many_arguments)]
    pub fn set_columns(
        &mut self,
        site: Vec<SiteId>,
        node: Vec<NodeId>,
        parent: Vec<MutationId>,
        time: Vec<f64>,
        derived_state: Vec<u8>,
        derived_state_offsets: Vec<u64>,
        metadata: Vec<u8>,
        metadata_offsets: Vec<u64>,
    ) -> Result<()> {
        let n = site.len();
        expect_len(n, node.len())?;
        expect_len(n, parent.len())?;
        expect_len(n, time.len())?;
        let states = RaggedColumn::from_parts(derived_state, derived_state_offsets, n)?;
        let mut arena = MetadataColumn::new();
        arena.set_schema(self.metadata.schema().clone());
        arena.replace(metadata, metadata_offsets, n)?;

        self.site = site;
        self.node = node;
        self.parent = parent;
        self.time = time;
        self.derived_state = states;
        self.metadata = arena;
        Ok(())
    }

    pub fn sites(&self) -> &[SiteId] {
        &self.site
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.node
    }

    pub fn parents(&self) -> &[MutationId] {
        &self.parent
    }

    pub fn times(&self) -> &[f64] {
        &self.time
    }

    pub fn derived_states(&self) -> &RaggedColumn<u8> {
        &self.derived_state
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

    pub(crate) fn remap_sites(&mut self, site_map: &[SiteId]) {
        for site in &mut self.site {
            if !site.is_null() {
                *site = site_map[site.as_usize()];
            }
        }
    }

    pub(crate) fn apply_permutation(&mut self, order: &[usize]) {
        // old id -> new id, for remapping the parent chain
        let mut new_id = vec![MutationId::NULL; order.len()];
        for (new, &old) in order.iter().enumerate() {
            new_id[old] = MutationId::new(new);
        }

        let mut site = Vec::with_capacity(self.len());
        let mut node = Vec::with_capacity(self.len());
        let mut parent = Vec::with_capacity(self.len());
        let mut time = Vec::with_capacity(self.len());
        let mut states = RaggedColumn::new();
        let mut metadata_bytes = Vec::new();
        let mut metadata_offsets = vec![0u64];
        for &old in order {
            site.push(self.site[old]);
            node.push(self.node[old]);
            let p = self.parent[old];
            parent.push(if p.is_null() { p } else { new_id[p.as_usize()] });
            time.push(self.time[old]);
            states.push(self.derived_state.get(old));
            metadata_bytes.extend_from_slice(self.metadata.get(old));
            metadata_offsets.push(metadata_bytes.len() as u64);
        }
        self.site = site;
        self.node = node;
        self.parent = parent;
        self.time = time;
        self.derived_state = states;
        // offsets rebuilt from the same rows; cannot fail
        let _ = self
            .metadata
            .replace(metadata_bytes, metadata_offsets, order.len());
    }
}

// Manual equality so the unknown-time NaN sentinel compares by bit pattern
// instead of poisoning the whole comparison.
impl PartialEq for MutationTable {
    fn eq(&self, other: &Self) -> bool {
        self.site == other.site
            && self.node == other.node
            && self.parent == other.parent
            && self.time.len() == other.time.len()
            && self
                .time
                .iter()
                .zip(&other.time)
                .all(|(a, b)| a.to_bits() == b.to_bits())
            && self.derived_state == other.derived_state
            && self.metadata == other.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut table = MutationTable::new();
        let id = table.add_row(
            SiteId::new(0),
            NodeId::new(3),
            MutationId::NULL,
            1.25,
            "T",
            b"",
        );
        assert_eq!(id, MutationId::new(0));

        let row = table.get_row(0).unwrap();
        assert_eq!(row.site, SiteId::new(0));
        assert_eq!(row.node, NodeId::new(3));
        assert!(row.parent.is_null());
        assert_eq!(row.derived_state, b"T");
    }

    #[test]
    fn test_unknown_time_equality() {
        let mut a = MutationTable::new();
        a.add_row(SiteId::new(0), NodeId::new(0), MutationId::NULL, UNKNOWN_TIME, "T", b"");
        let b = a.clone();
        assert_eq!(a, b);
        assert!(is_unknown_time(a.times()[0]));
    }

    #[test]
    fn test_apply_permutation_remaps_parents() {
        let mut table = MutationTable::new();
        // chain: row 1 is the parent of row 0
        table.add_row(SiteId::new(0), NodeId::new(0), MutationId::new(1), 0.5, "G", b"");
        table.add_row(SiteId::new(0), NodeId::new(2), MutationId::NULL, 1.5, "T", b"");
        table.apply_permutation(&[1, 0]);

        // parent now precedes child and the reference follows the move
        assert!(table.get_row(0).unwrap().parent.is_null());
        assert_eq!(table.get_row(1).unwrap().parent, MutationId::new(0));
        assert_eq!(table.get_row(1).unwrap().derived_state, b"G");
    }
}
