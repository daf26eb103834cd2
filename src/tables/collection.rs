//! # Table Collection
//!
//! The mutable aggregate of all tables plus collection-level state: the
//! sequence-length bound, the time-units label, top-level metadata with its
//! schema, the optional reference sequence, and the provenance log. A
//! collection is a value-like object owned by its caller; freezing it into a
//! queryable view goes through [`TableCollection::tree_sequence`].

use std::path::Path;

use uuid::Uuid;

use crate::error::{Result, TreeSeqError};
use crate::io::container;
use crate::metadata::{self, MetadataSchema, MetadataValue};
use crate::sort;
use crate::tables::{
    EdgeTable, IndividualTable, MigrationTable, MutationTable, NodeTable, PopulationTable,
    ProvenanceTable, SiteTable,
};
use crate::trees::TreeSequence;

/// Optional byte sequence attached to the collection as a whole, with its
/// own metadata and schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceSequence {
    data: Vec<u8>,
    metadata: Vec<u8>,
    metadata_schema: MetadataSchema,
}

impl ReferenceSequence {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
    }

    /// Whether any sequence data is present
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn metadata_bytes(&self) -> &[u8] {
        &self.metadata
    }

    /// Decoded metadata, via the bound schema
    pub fn metadata(&self) -> Result<MetadataValue> {
        metadata::decode(&self.metadata, &self.metadata_schema)
    }

    /// Encode and store metadata, validating against the bound schema
    pub fn set_metadata(&mut self, value: &MetadataValue) -> Result<()> {
        self.metadata = metadata::encode(value, &self.metadata_schema)?;
        Ok(())
    }

    pub fn metadata_schema(&self) -> &MetadataSchema {
        &self.metadata_schema
    }

    pub fn set_metadata_schema(&mut self, schema: MetadataSchema) {
        self.metadata_schema = schema;
    }

    pub(crate) fn from_parts(
        data: Vec<u8>,
        metadata: Vec<u8>,
        metadata_schema: MetadataSchema,
    ) -> Self {
        Self {
            data,
            metadata,
            metadata_schema,
        }
    }
}

/// The aggregate of one columnar table per entity kind
#[derive(Clone, Debug)]
pub struct TableCollection {
    pub nodes: NodeTable,
    pub edges: EdgeTable,
    pub sites: SiteTable,
    pub mutations: MutationTable,
    pub individuals: IndividualTable,
    pub populations: PopulationTable,
    pub migrations: MigrationTable,
    pub provenances: ProvenanceTable,
    sequence_length: f64,
    time_units: String,
    metadata: Vec<u8>,
    metadata_schema: MetadataSchema,
    reference_sequence: ReferenceSequence,
    file_uuid: Option<Uuid>,
}

impl TableCollection {
    /// Create an empty collection over `[0, sequence_length)`.
    ///
    /// The bound must be positive; `f64::INFINITY` is accepted as the
    /// explicitly unbounded case.
    pub fn new(sequence_length: f64) -> Result<Self> {
        check_sequence_length(sequence_length)?;
        Ok(Self {
            nodes: NodeTable::new(),
            edges: EdgeTable::new(),
            sites: SiteTable::new(),
            mutations: MutationTable::new(),
            individuals: IndividualTable::new(),
            populations: PopulationTable::new(),
            migrations: MigrationTable::new(),
            provenances: ProvenanceTable::new(),
            sequence_length,
            time_units: "unknown".to_string(),
            metadata: Vec::new(),
            metadata_schema: MetadataSchema::Null,
            reference_sequence: ReferenceSequence::default(),
            file_uuid: None,
        })
    }

    pub fn sequence_length(&self) -> f64 {
        self.sequence_length
    }

    pub fn set_sequence_length(&mut self, sequence_length: f64) -> Result<()> {
        check_sequence_length(sequence_length)?;
        self.sequence_length = sequence_length;
        Ok(())
    }

    pub fn time_units(&self) -> &str {
        &self.time_units
    }

    pub fn set_time_units(&mut self, time_units: impl Into<String>) {
        self.time_units = time_units.into();
    }

    /// Raw top-level metadata bytes
    pub fn metadata_bytes(&self) -> &[u8] {
        &self.metadata
    }

    /// Decoded top-level metadata, via the bound schema
    pub fn metadata(&self) -> Result<MetadataValue> {
        metadata::decode(&self.metadata, &self.metadata_schema)
    }

    /// Encode and store top-level metadata, validating against the bound
    /// schema. Raw bytes are accepted when they are valid under the codec.
    pub fn set_metadata(&mut self, value: &MetadataValue) -> Result<()> {
        self.metadata = metadata::encode(value, &self.metadata_schema)?;
        Ok(())
    }

    pub fn metadata_schema(&self) -> &MetadataSchema {
        &self.metadata_schema
    }

    /// Rebind the top-level schema. Existing bytes are left untouched; they
    /// are reinterpreted under the new schema on the next read.
    pub fn set_metadata_schema(&mut self, schema: MetadataSchema) {
        self.metadata_schema = schema;
    }

    pub fn reference_sequence(&self) -> &ReferenceSequence {
        &self.reference_sequence
    }

    pub fn reference_sequence_mut(&mut self) -> &mut ReferenceSequence {
        &mut self.reference_sequence
    }

    /// Convenience setter for the reference data bytes
    pub fn set_reference_sequence(&mut self, data: impl Into<Vec<u8>>) {
        self.reference_sequence.set_data(data);
    }

    pub fn has_reference_sequence(&self) -> bool {
        !self.reference_sequence.is_empty()
    }

    /// Append a provenance record to the log
    pub fn add_provenance(&mut self, timestamp: &str, record: &str) {
        self.provenances.add_row(timestamp, record);
    }

    /// The content identifier recorded when this collection was loaded from
    /// a file; `None` for collections never persisted.
    pub fn file_uuid(&self) -> Option<Uuid> {
        self.file_uuid
    }

    pub(crate) fn set_file_uuid(&mut self, uuid: Uuid) {
        self.file_uuid = Some(uuid);
    }

    /// True when the sequence length and every coordinate in edges, sites
    /// and migrations is an exact integer.
    pub fn discrete_genome(&self) -> bool {
        let integral = |value: f64| value.fract() == 0.0;
        self.sequence_length.is_finite()
            && integral(self.sequence_length)
            && self.edges.lefts().iter().copied().all(integral)
            && self.edges.rights().iter().copied().all(integral)
            && self.sites.positions().iter().copied().all(integral)
            && self.migrations.lefts().iter().copied().all(integral)
            && self.migrations.rights().iter().copied().all(integral)
    }

    /// Sort edges, sites and mutations into canonical order, remapping
    /// cross-table ids as rows move. See the sorter for the exact order.
    pub fn sort(&mut self) -> Result<()> {
        sort::sort_tables(self)
    }

    /// Validate the collection and build its immutable, indexed view.
    ///
    /// The build step validates but never reorders: unsorted input fails
    /// with `NotSorted` rather than being silently fixed up.
    pub fn tree_sequence(&self) -> Result<TreeSequence> {
        TreeSequence::new(self.clone())
    }

    /// Serialize to a self-describing container file, returning the derived
    /// content identifier written to the trailer.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<Uuid> {
        container::dump(self, path.as_ref())
    }

    /// Reconstruct a collection from a container file, verifying its stored
    /// content identifier.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        container::load(path.as_ref())
    }
}

// Equality covers every observable field; the file uuid describes a file,
// not the logical contents, and is excluded.
impl PartialEq for TableCollection {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.edges == other.edges
            && self.sites == other.sites
            && self.mutations == other.mutations
            && self.individuals == other.individuals
            && self.populations == other.populations
            && self.migrations == other.migrations
            && self.provenances == other.provenances
            && self.sequence_length == other.sequence_length
            && self.time_units == other.time_units
            && self.metadata == other.metadata
            && self.metadata_schema == other.metadata_schema
            && self.reference_sequence == other.reference_sequence
    }
}

fn check_sequence_length(sequence_length: f64) -> Result<()> {
    if !(sequence_length > 0.0) {
        return Err(TreeSeqError::invalid_bound(format!(
            "sequence length must be positive, got {sequence_length}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{IndividualId, NodeId, PopulationId, NODE_IS_SAMPLE};
    use serde_json::json;

    #[test]
    fn test_new_rejects_bad_bounds() {
        assert!(TableCollection::new(0.0).is_err());
        assert!(TableCollection::new(-1.0).is_err());
        assert!(TableCollection::new(f64::NAN).is_err());
        assert!(TableCollection::new(f64::INFINITY).is_ok());
        assert!(TableCollection::new(10.0).is_ok());
    }

    #[test]
    fn test_defaults() {
        let tables = TableCollection::new(10.0).unwrap();
        assert_eq!(tables.time_units(), "unknown");
        assert!(tables.metadata_bytes().is_empty());
        assert!(tables.metadata_schema().is_null());
        assert!(!tables.has_reference_sequence());
        assert!(tables.file_uuid().is_none());
    }

    #[test]
    fn test_top_level_metadata_schema_enforced() {
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.set_metadata_schema(MetadataSchema::json());
        tables
            .set_metadata(&MetadataValue::Structured(json!({"mean_coverage": 200.5})))
            .unwrap();
        assert_eq!(tables.metadata_bytes(), br#"{"mean_coverage":200.5}"#);

        // rebinding null exposes the same bytes raw
        tables.set_metadata_schema(MetadataSchema::null());
        let raw = tables.metadata().unwrap();
        assert_eq!(raw.as_bytes().unwrap(), br#"{"mean_coverage":200.5}"#);
    }

    #[test]
    fn test_structured_metadata_rejected_without_schema() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let err = tables
            .set_metadata(&MetadataValue::Structured(json!({"a": 1})))
            .unwrap_err();
        assert!(matches!(err, TreeSeqError::SchemaViolation { .. }));
    }

    #[test]
    fn test_reference_sequence_flag() {
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.set_reference_sequence("ATCGAATTCG");
        assert!(tables.has_reference_sequence());
        assert_eq!(tables.reference_sequence().data(), b"ATCGAATTCG");
    }

    #[test]
    fn test_discrete_genome() {
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.nodes.add_row(
            NODE_IS_SAMPLE,
            0.0,
            PopulationId::NULL,
            IndividualId::NULL,
            b"",
        );
        tables.nodes.add_row(0, 1.0, PopulationId::NULL, IndividualId::NULL, b"");
        tables
            .edges
            .add_row(0.0, 10.0, NodeId::new(1), NodeId::new(0), b"");
        assert!(tables.discrete_genome());

        tables
            .edges
            .add_row(0.5, 10.0, NodeId::new(1), NodeId::new(0), b"");
        assert!(!tables.discrete_genome());
    }

    #[test]
    fn test_equality_ignores_file_uuid() {
        let a = TableCollection::new(10.0).unwrap();
        let mut b = a.clone();
        b.set_file_uuid(Uuid::from_bytes([7; 16]));
        assert_eq!(a, b);
    }
}
