//! Integration tests driving the public API end to end: building
//! collections, sorting, querying tree sequences, and round-tripping
//! through the container format.

use serde_json::json;
use tempfile::TempDir;

use treeseq::{
    IndividualId, MetadataSchema, MetadataValue, MutationId, NodeId, PopulationId, SiteId,
    TableCollection, TreeSeqError, TreeSequence, NODE_IS_SAMPLE,
};

/// Two samples at time 0 under a root at time 1, spanning [0, 10)
fn cherry() -> TableCollection {
    let mut tables = TableCollection::new(10.0).unwrap();
    for _ in 0..2 {
        tables.nodes.add_row(
            NODE_IS_SAMPLE,
            0.0,
            PopulationId::NULL,
            IndividualId::NULL,
            b"",
        );
    }
    tables
        .nodes
        .add_row(0, 1.0, PopulationId::NULL, IndividualId::NULL, b"");
    tables
        .edges
        .add_row(0.0, 10.0, NodeId::new(2), NodeId::new(0), b"");
    tables
        .edges
        .add_row(0.0, 10.0, NodeId::new(2), NodeId::new(1), b"");
    tables
}

#[test]
fn end_to_end_single_tree() {
    let mut tables = cherry();
    tables.sort().unwrap();
    let ts = tables.tree_sequence().unwrap();

    assert_eq!(ts.num_trees(), 1);
    assert_eq!(ts.num_nodes(), 3);
    assert_eq!(ts.num_edges(), 2);
    assert_eq!(ts.num_samples(), 2);

    let tree = ts.at(5.0).unwrap();
    assert_eq!(tree.roots(), vec![NodeId::new(2)]);
    assert_eq!(tree.parent(NodeId::new(0)), NodeId::new(2));
    assert_eq!(tree.parent(NodeId::new(1)), NodeId::new(2));
    assert_eq!(
        tree.children(NodeId::new(2)),
        vec![NodeId::new(0), NodeId::new(1)]
    );
}

#[test]
fn roundtrip_preserves_every_field() {
    let mut tables = cherry();
    tables.set_time_units("generations");
    tables.set_metadata_schema(MetadataSchema::json());
    tables
        .set_metadata(&MetadataValue::Structured(json!({"mean_coverage": 200.5})))
        .unwrap();
    tables
        .populations
        .set_metadata_schema(MetadataSchema::from_text(concat!(
            r#"{"additionalProperties":true,"codec":"json","#,
            r#""properties":{"description":{"type":["string","null"]},"name":{"type":"string"}},"#,
            r#""required":["name","description"],"type":"object"}"#
        )).unwrap());
    tables
        .populations
        .add_row(br#"{"name":"pop0","description":null}"#);
    let individual = tables.individuals.add_row(0, &[0.5, 1.5], &[], b"");
    tables
        .individuals
        .add_row(0, &[], &[individual], b"SOME CUSTOM BYTES #!@");
    tables.sites.add_row(3.0, "A", b"");
    tables.mutations.add_row(
        SiteId::new(0),
        NodeId::new(0),
        MutationId::NULL,
        treeseq::UNKNOWN_TIME,
        "G",
        b"",
    );
    tables.migrations.add_row(
        0.0,
        10.0,
        NodeId::new(0),
        PopulationId::new(0),
        PopulationId::new(0),
        0.5,
        b"",
    );
    tables.set_reference_sequence("ATCGAATTCG");
    tables.add_provenance("2026-08-06T00:00:00", r#"{"op":"setup"}"#);
    tables.sort().unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("everything.trees");
    let uuid = tables.dump(&path).unwrap();
    let loaded = TableCollection::load(&path).unwrap();

    assert_eq!(loaded, tables);
    assert_eq!(loaded.file_uuid(), Some(uuid));
    assert_eq!(loaded.time_units(), "generations");
    assert!(loaded.has_reference_sequence());
    assert_eq!(loaded.provenances.get_row(0).unwrap().record, r#"{"op":"setup"}"#);
}

#[test]
fn roundtrip_metadata_schema_scenarios() {
    let mut tables = cherry();
    tables.set_metadata_schema(MetadataSchema::json());
    tables
        .set_metadata(&MetadataValue::Structured(json!({"mean_coverage": 200.5})))
        .unwrap();
    tables.sort().unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metadata.trees");
    tables.dump(&path).unwrap();

    let mut loaded = TableCollection::load(&path).unwrap();
    let decoded = loaded.metadata().unwrap();
    assert_eq!(
        decoded.as_structured().unwrap(),
        &json!({"mean_coverage": 200.5})
    );

    // rebinding the schema to null exposes the raw encoded bytes exactly
    loaded.set_metadata_schema(MetadataSchema::null());
    let raw = loaded.metadata().unwrap();
    assert_eq!(raw.as_bytes().unwrap(), br#"{"mean_coverage":200.5}"#);
}

#[test]
fn schema_enforcement_on_write() {
    let mut tables = cherry();
    tables.set_metadata_schema(
        MetadataSchema::from_text(
            r#"{"codec":"json","properties":{"seed":{"type":"integer"}},"required":["seed"]}"#,
        )
        .unwrap(),
    );

    let err = tables
        .set_metadata(&MetadataValue::Structured(json!({"note": "missing seed"})))
        .unwrap_err();
    assert!(matches!(err, TreeSeqError::SchemaViolation { .. }));

    tables
        .set_metadata(&MetadataValue::Structured(json!({"seed": 42})))
        .unwrap();

    // with the schema removed, arbitrary bytes become acceptable again
    tables.set_metadata_schema(MetadataSchema::null());
    tables
        .set_metadata(&MetadataValue::Bytes(b"raw \xFF bytes".to_vec()))
        .unwrap();
    assert_eq!(tables.metadata_bytes(), b"raw \xFF bytes");
}

#[test]
fn individual_cycle_is_rejected_at_build() {
    let mut tables = cherry();
    // cycle of length 2
    let a = tables.individuals.add_row(0, &[], &[IndividualId(1)], b"");
    tables.individuals.add_row(0, &[], &[a], b"");
    tables.sort().unwrap();

    let err = tables.tree_sequence().unwrap_err();
    assert!(matches!(err, TreeSeqError::IndividualCycle { .. }));
}

#[test]
fn sort_is_idempotent_end_to_end() {
    let mut tables = cherry();
    tables.sites.add_row(7.0, "T", b"");
    tables.sites.add_row(3.0, "A", b"");
    tables.mutations.add_row(
        SiteId::new(1),
        NodeId::new(1),
        MutationId::NULL,
        0.5,
        "C",
        b"",
    );

    tables.sort().unwrap();
    let once = tables.clone();
    tables.sort().unwrap();
    assert_eq!(tables, once);

    // ordering invariant: adjacent edges are non-decreasing in parent time
    let times = once.nodes.times();
    for pair in 0..once.edges.len().saturating_sub(1) {
        let first = once.edges.parents()[pair];
        let second = once.edges.parents()[pair + 1];
        assert!(times[first.as_usize()] <= times[second.as_usize()]);
    }
}

#[test]
fn reference_sequence_alignments() {
    let mut tables = cherry();
    tables.set_reference_sequence("ATCGAATTCG");
    tables.sort().unwrap();
    let ts = tables.tree_sequence().unwrap();

    assert!(ts.has_reference_sequence());
    let alignments: Vec<String> = ts.alignments().unwrap().collect();
    assert_eq!(alignments.len(), ts.num_samples());
    for alignment in &alignments {
        assert_eq!(alignment.len(), ts.sequence_length() as usize);
        assert_eq!(alignment, "ATCGAATTCG");
    }
}

#[test]
fn tree_sequence_file_roundtrip() {
    let mut tables = cherry();
    tables.set_reference_sequence("ATCGAATTCG");
    tables.sort().unwrap();
    let ts = tables.tree_sequence().unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ts.trees");
    let uuid = ts.dump(&path).unwrap();

    let loaded = TreeSequence::load(&path).unwrap();
    assert_eq!(loaded.file_uuid(), Some(uuid));
    assert_eq!(loaded.num_trees(), ts.num_trees());
    assert_eq!(loaded.num_samples(), ts.num_samples());
    assert_eq!(loaded.tables(), ts.tables());
}

#[test]
fn rebuild_after_extraction() {
    let mut tables = cherry();
    tables.sort().unwrap();
    let ts = tables.tree_sequence().unwrap();

    // extract, extend, rebuild; the original is untouched
    let mut extended = ts.dump_tables();
    extended
        .nodes
        .add_row(0, 2.0, PopulationId::NULL, IndividualId::NULL, b"");
    extended
        .edges
        .add_row(0.0, 10.0, NodeId::new(3), NodeId::new(2), b"");
    extended.sort().unwrap();
    let rebuilt = extended.tree_sequence().unwrap();

    assert_eq!(ts.num_nodes(), 3);
    assert_eq!(rebuilt.num_nodes(), 4);
    assert_eq!(rebuilt.at(0.0).unwrap().roots(), vec![NodeId::new(3)]);
}

#[test]
fn unsorted_input_is_reported_not_repaired() {
    let mut tables = TableCollection::new(10.0).unwrap();
    for _ in 0..2 {
        tables.nodes.add_row(
            NODE_IS_SAMPLE,
            0.0,
            PopulationId::NULL,
            IndividualId::NULL,
            b"",
        );
    }
    tables
        .nodes
        .add_row(0, 1.0, PopulationId::NULL, IndividualId::NULL, b"");
    tables
        .nodes
        .add_row(0, 2.0, PopulationId::NULL, IndividualId::NULL, b"");
    // the root's edge first: canonically it must come last
    tables
        .edges
        .add_row(0.0, 10.0, NodeId::new(3), NodeId::new(2), b"");
    tables
        .edges
        .add_row(0.0, 10.0, NodeId::new(2), NodeId::new(0), b"");
    tables
        .edges
        .add_row(0.0, 10.0, NodeId::new(2), NodeId::new(1), b"");

    let err = tables.tree_sequence().unwrap_err();
    assert!(matches!(err, TreeSeqError::NotSorted { .. }));

    // after sorting the same collection builds cleanly
    tables.sort().unwrap();
    let ts = tables.tree_sequence().unwrap();
    assert_eq!(ts.num_trees(), 1);
}
