//! # Tree Sequence
//!
//! An immutable, indexed view over a validated table collection. Construction
//! validates every invariant, precomputes the tree-interval breakpoints and
//! the edge insertion/removal replay order, and freezes a private copy of the
//! tables. Queries never mutate; a built sequence is safe to share read-only
//! across threads. Any change goes through [`TreeSequence::dump_tables`],
//! mutation of the extracted collection, and a rebuild.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::sort;
use crate::tables::{NodeId, ReferenceSequence, TableCollection};

/// The indexed sequence of trees across the genome
#[derive(Clone, Debug)]
pub struct TreeSequence {
    tables: TableCollection,
    breakpoints: Vec<f64>,
    insertion: Vec<usize>,
    removal: Vec<usize>,
    samples: Vec<NodeId>,
    min_time: f64,
    max_time: f64,
}

impl TreeSequence {
    /// Validate the collection and build the indexes. Fails with the first
    /// violated invariant; never reorders the input.
    pub(crate) fn new(tables: TableCollection) -> Result<Self> {
        sort::validate(&tables)?;

        let mut breakpoints = vec![0.0, tables.sequence_length()];
        breakpoints.extend_from_slice(tables.edges.lefts());
        breakpoints.extend_from_slice(tables.edges.rights());
        breakpoints.sort_by(f64::total_cmp);
        breakpoints.dedup();

        let times = tables.nodes.times();
        let parents = tables.edges.parents();
        let lefts = tables.edges.lefts();
        let rights = tables.edges.rights();

        let mut insertion: Vec<usize> = (0..tables.edges.len()).collect();
        insertion.sort_by(|&a, &b| {
            lefts[a]
                .total_cmp(&lefts[b])
                .then_with(|| times[parents[a].as_usize()].total_cmp(&times[parents[b].as_usize()]))
                .then_with(|| parents[a].cmp(&parents[b]))
        });
        let mut removal: Vec<usize> = (0..tables.edges.len()).collect();
        removal.sort_by(|&a, &b| {
            rights[a]
                .total_cmp(&rights[b])
                .then_with(|| times[parents[a].as_usize()].total_cmp(&times[parents[b].as_usize()]))
                .then_with(|| parents[a].cmp(&parents[b]))
        });

        let samples: Vec<NodeId> = (0..tables.nodes.len())
            .filter(|&index| tables.nodes.is_sample(index))
            .map(NodeId::new)
            .collect();

        let (mut min_time, mut max_time) = (0.0, 0.0);
        if !tables.nodes.is_empty() {
            min_time = f64::INFINITY;
            max_time = f64::NEG_INFINITY;
            for &time in tables.nodes.times() {
                min_time = min_time.min(time);
                max_time = max_time.max(time);
            }
        }

        debug!(
            num_trees = breakpoints.len() - 1,
            num_edges = tables.edges.len(),
            num_samples = samples.len(),
            "built tree sequence"
        );
        Ok(Self {
            tables,
            breakpoints,
            insertion,
            removal,
            samples,
            min_time,
            max_time,
        })
    }

    /// Load a tree sequence directly from a container file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let tables = TableCollection::load(path)?;
        Self::new(tables)
    }

    /// Write the underlying tables to a container file
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<Uuid> {
        self.tables.dump(path)
    }

    /// The frozen tables backing this sequence
    pub fn tables(&self) -> &TableCollection {
        &self.tables
    }

    /// A fresh, independently-owned copy of the tables. Mutating it never
    /// affects this sequence; rebuild with `tree_sequence()` to see changes.
    pub fn dump_tables(&self) -> TableCollection {
        self.tables.clone()
    }

    pub fn num_trees(&self) -> usize {
        self.breakpoints.len() - 1
    }

    pub fn num_nodes(&self) -> usize {
        self.tables.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.tables.edges.len()
    }

    pub fn num_sites(&self) -> usize {
        self.tables.sites.len()
    }

    pub fn num_mutations(&self) -> usize {
        self.tables.mutations.len()
    }

    pub fn num_individuals(&self) -> usize {
        self.tables.individuals.len()
    }

    pub fn num_populations(&self) -> usize {
        self.tables.populations.len()
    }

    pub fn num_migrations(&self) -> usize {
        self.tables.migrations.len()
    }

    pub fn num_provenances(&self) -> usize {
        self.tables.provenances.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Sample node ids, in node id order
    pub fn samples(&self) -> &[NodeId] {
        &self.samples
    }

    pub fn sequence_length(&self) -> f64 {
        self.tables.sequence_length()
    }

    pub fn time_units(&self) -> &str {
        self.tables.time_units()
    }

    /// Minimum node time; 0 for an empty node table
    pub fn min_time(&self) -> f64 {
        self.min_time
    }

    /// Maximum node time; 0 for an empty node table
    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    /// The tree-interval breakpoints partitioning `[0, sequence_length)`
    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    /// Decoded top-level metadata, via the bound schema
    pub fn metadata(&self) -> Result<MetadataValue> {
        self.tables.metadata()
    }

    pub fn metadata_schema(&self) -> &MetadataSchema {
        self.tables.metadata_schema()
    }

    pub fn has_reference_sequence(&self) -> bool {
        self.tables.has_reference_sequence()
    }

    pub fn reference_sequence(&self) -> &ReferenceSequence {
        self.tables.reference_sequence()
    }

    pub fn file_uuid(&self) -> Option<Uuid> {
        self.tables.file_uuid()
    }

    /// The tree covering `position`, reconstructed by replaying the edge
    /// insertion/removal indexes up to the containing interval.
    pub fn at(&self, position: f64) -> Result<Tree<'_>> {
        let length = self.tables.sequence_length();
        if !(position >= 0.0) || !(position < length) {
            return Err(TreeSeqError::bad_interval(format!(
                "position {position} is not within [0, {length})"
            )));
        }
        let index = self.breakpoints.partition_point(|b| *b <= position) - 1;
        Ok(self.seek_tree(index))
    }

    /// Iterate the trees left to right, updating state incrementally
    pub fn trees(&self) -> Trees<'_> {
        Trees {
            seq: self,
            parent: vec![NodeId::NULL; self.tables.nodes.len()],
            next_index: 0,
            inserted: 0,
            removed: 0,
        }
    }

    fn seek_tree(&self, target: usize) -> Tree<'_> {
        let mut parent = vec![NodeId::NULL; self.tables.nodes.len()];
        let (mut inserted, mut removed) = (0, 0);
        for index in 0..=target {
            self.advance(&mut parent, &mut inserted, &mut removed, index);
        }
        Tree {
            seq: self,
            parent,
            index: target,
        }
    }

    /// Apply the edge removals and insertions taking effect at the left
    /// boundary of tree `index`.
    fn advance(
        &self,
        parent: &mut [NodeId],
        inserted: &mut usize,
        removed: &mut usize,
        index: usize,
    ) {
        let left = self.breakpoints[index];
        let edges = &self.tables.edges;
        while *removed < self.removal.len() && edges.rights()[self.removal[*removed]] <= left {
            let edge = self.removal[*removed];
            parent[edges.children()[edge].as_usize()] = NodeId::NULL;
            *removed += 1;
        }
        while *inserted < self.insertion.len() && edges.lefts()[self.insertion[*inserted]] <= left {
            let edge = self.insertion[*inserted];
            parent[edges.children()[edge].as_usize()] = edges.parents()[edge];
            *inserted += 1;
        }
    }

    /// Per-sample sequences derived by applying each sample's site states
    /// onto the reference bytes. Restartable: every call builds a fresh
    /// iterator from the frozen state.
    pub fn alignments(&self) -> Result<Alignments<'_>> {
        if !self.has_reference_sequence() {
            return Err(TreeSeqError::unsupported(
                "alignments require a reference sequence",
            ));
        }
        if !self.tables.discrete_genome() {
            return Err(TreeSeqError::unsupported(
                "alignments require a discrete genome",
            ));
        }
        let length = self.tables.sequence_length() as usize;
        let reference = self.tables.reference_sequence().data();
        if reference.len() < length {
            return Err(TreeSeqError::unsupported(format!(
                "reference sequence has {} bytes but the sequence length is {length}",
                reference.len()
            )));
        }
        if !reference[..length].is_ascii() {
            return Err(TreeSeqError::unsupported(
                "reference sequence must be ASCII",
            ));
        }

        let state = self.site_states()?;
        Ok(Alignments {
            seq: self,
            state,
            length,
            next_sample: 0,
        })
    }

    /// Resolve the allelic state of every (site, sample) pair: the ancestral
    /// state unless a mutation above the sample in the local tree overrides
    /// it. The mutation nearest to the sample wins; among mutations on the
    /// same node, later chain entries win.
    fn site_states(&self) -> Result<Vec<u8>> {
        let n_samples = self.samples.len();
        let n_sites = self.tables.sites.len();
        let positions = self.tables.sites.positions();
        let mut state = vec![0u8; n_sites * n_samples];

        let single_byte = |bytes: &[u8], what: &str| -> Result<u8> {
            match bytes {
                [byte] if byte.is_ascii() => Ok(*byte),
                _ => Err(TreeSeqError::unsupported(format!(
                    "{what} must be a single ASCII character for alignments"
                ))),
            }
        };

        let mutations = &self.tables.mutations;
        let mut site_cursor = 0;
        let mut mutation_cursor = 0;
        for tree in self.trees() {
            let (_, right) = tree.interval();
            while site_cursor < n_sites && positions[site_cursor] < right {
                let ancestral = single_byte(
                    self.tables.sites.ancestral_states().get(site_cursor),
                    "ancestral state",
                )?;

                // all mutations at this site, in sorted (parent-first) order
                let mut overrides: HashMap<NodeId, u8> = HashMap::new();
                while mutation_cursor < mutations.len()
                    && mutations.sites()[mutation_cursor].as_usize() == site_cursor
                {
                    let derived = single_byte(
                        mutations.derived_states().get(mutation_cursor),
                        "derived state",
                    )?;
                    overrides.insert(mutations.nodes()[mutation_cursor], derived);
                    mutation_cursor += 1;
                }

                for (sample_index, &sample) in self.samples.iter().enumerate() {
                    let mut resolved = ancestral;
                    let mut node = sample;
                    loop {
                        if let Some(&derived) = overrides.get(&node) {
                            resolved = derived;
                            break;
                        }
                        let up = tree.parent(node);
                        if up.is_null() {
                            break;
                        }
                        node = up;
                    }
                    state[site_cursor * n_samples + sample_index] = resolved;
                }
                site_cursor += 1;
            }
        }
        Ok(state)
    }
}

/// The parent/child structure implied by the edges active at one genomic
/// interval.
#[derive(Clone, Debug)]
pub struct Tree<'a> {
    seq: &'a TreeSequence,
    parent: Vec<NodeId>,
    index: usize,
}

impl Tree<'_> {
    /// Position of this tree within the sequence
    pub fn index(&self) -> usize {
        self.index
    }

    /// The genomic interval `[left, right)` this tree covers
    pub fn interval(&self) -> (f64, f64) {
        (
            self.seq.breakpoints[self.index],
            self.seq.breakpoints[self.index + 1],
        )
    }

    /// Parent of `node` in this tree, or the null id at a root
    pub fn parent(&self, node: NodeId) -> NodeId {
        self.parent
            .get(node.as_usize())
            .copied()
            .unwrap_or(NodeId::NULL)
    }

    /// Children of `node` in this tree, in node id order
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.parent
            .iter()
            .enumerate()
            .filter(|(_, &parent)| parent == node)
            .map(|(child, _)| NodeId::new(child))
            .collect()
    }

    /// Roots reached by walking up from each sample, deduplicated in
    /// discovery order
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots = Vec::new();
        for &sample in self.seq.samples() {
            let mut node = sample;
            while !self.parent(node).is_null() {
                node = self.parent(node);
            }
            if !roots.contains(&node) {
                roots.push(node);
            }
        }
        roots
    }

    pub fn num_roots(&self) -> usize {
        self.roots().len()
    }
}

/// Left-to-right iterator over the trees of a sequence
pub struct Trees<'a> {
    seq: &'a TreeSequence,
    parent: Vec<NodeId>,
    next_index: usize,
    inserted: usize,
    removed: usize,
}

impl<'a> Iterator for Trees<'a> {
    type Item = Tree<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.seq.num_trees() {
            return None;
        }
        self.seq.advance(
            &mut self.parent,
            &mut self.inserted,
            &mut self.removed,
            self.next_index,
        );
        let tree = Tree {
            seq: self.seq,
            parent: self.parent.clone(),
            index: self.next_index,
        };
        self.next_index += 1;
        Some(tree)
    }
}

/// Lazy, restartable iterator of per-sample aligned sequences
#[derive(Debug)]
pub struct Alignments<'a> {
    seq: &'a TreeSequence,
    /// site-major matrix of resolved (site, sample) states
    state: Vec<u8>,
    length: usize,
    next_sample: usize,
}

impl Iterator for Alignments<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let n_samples = self.seq.num_samples();
        if self.next_sample >= n_samples {
            return None;
        }
        let reference = self.seq.tables().reference_sequence().data();
        let mut bytes = reference[..self.length].to_vec();
        for (site, &position) in self.seq.tables().sites.positions().iter().enumerate() {
            bytes[position as usize] = self.state[site * n_samples + self.next_sample];
        }
        self.next_sample += 1;
        // all-ASCII by construction
        Some(bytes.iter().map(|&b| b as char).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{
        IndividualId, MutationId, PopulationId, SiteId, NODE_IS_SAMPLE,
    };

    /// Two samples at time 0 joined by node 2 at time 1 over [0, 10)
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
    fn test_single_tree_queries() {
        let mut tables = cherry();
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();

        assert_eq!(ts.num_trees(), 1);
        assert_eq!(ts.num_nodes(), 3);
        assert_eq!(ts.num_edges(), 2);
        assert_eq!(ts.num_samples(), 2);
        assert_eq!(ts.sequence_length(), 10.0);
        assert_eq!(ts.min_time(), 0.0);
        assert_eq!(ts.max_time(), 1.0);

        let tree = ts.at(5.0).unwrap();
        assert_eq!(tree.interval(), (0.0, 10.0));
        assert_eq!(tree.parent(NodeId::new(0)), NodeId::new(2));
        assert_eq!(tree.parent(NodeId::new(1)), NodeId::new(2));
        assert!(tree.parent(NodeId::new(2)).is_null());
        assert_eq!(tree.roots(), vec![NodeId::new(2)]);
        assert_eq!(
            tree.children(NodeId::new(2)),
            vec![NodeId::new(0), NodeId::new(1)]
        );
    }

    #[test]
    fn test_at_rejects_out_of_bounds() {
        let mut tables = cherry();
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();
        assert!(ts.at(10.0).is_err());
        assert!(ts.at(-1.0).is_err());
    }

    #[test]
    fn test_unsorted_tables_rejected() {
        let mut tables = cherry();
        tables
            .nodes
            .add_row(0, 2.0, PopulationId::NULL, IndividualId::NULL, b"");
        // out of order: the new root's edge sorts after the existing ones
        let mut unsorted = TableCollection::new(10.0).unwrap();
        unsorted.nodes = tables.nodes.clone();
        unsorted
            .edges
            .add_row(0.0, 10.0, NodeId::new(3), NodeId::new(2), b"");
        unsorted
            .edges
            .add_row(0.0, 10.0, NodeId::new(2), NodeId::new(0), b"");
        unsorted
            .edges
            .add_row(0.0, 10.0, NodeId::new(2), NodeId::new(1), b"");
        let err = unsorted.tree_sequence().unwrap_err();
        assert!(matches!(err, TreeSeqError::NotSorted { .. }));
    }

    #[test]
    fn test_multiple_trees() {
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
        // node 2 is the parent on [0, 4), node 3 on [4, 10)
        tables
            .edges
            .add_row(0.0, 4.0, NodeId::new(2), NodeId::new(0), b"");
        tables
            .edges
            .add_row(0.0, 4.0, NodeId::new(2), NodeId::new(1), b"");
        tables
            .edges
            .add_row(4.0, 10.0, NodeId::new(3), NodeId::new(0), b"");
        tables
            .edges
            .add_row(4.0, 10.0, NodeId::new(3), NodeId::new(1), b"");
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();

        assert_eq!(ts.num_trees(), 2);
        assert_eq!(ts.breakpoints(), &[0.0, 4.0, 10.0]);

        let first = ts.at(3.9).unwrap();
        assert_eq!(first.parent(NodeId::new(0)), NodeId::new(2));
        let second = ts.at(4.0).unwrap();
        assert_eq!(second.parent(NodeId::new(0)), NodeId::new(3));
        assert!(second.parent(NodeId::new(2)).is_null());

        let intervals: Vec<(f64, f64)> = ts.trees().map(|tree| tree.interval()).collect();
        assert_eq!(intervals, vec![(0.0, 4.0), (4.0, 10.0)]);
        for (index, tree) in ts.trees().enumerate() {
            assert_eq!(tree.index(), index);
        }
    }

    #[test]
    fn test_empty_collection_has_one_tree() {
        let tables = TableCollection::new(5.0).unwrap();
        let ts = tables.tree_sequence().unwrap();
        assert_eq!(ts.num_trees(), 1);
        assert_eq!(ts.num_samples(), 0);
        assert_eq!(ts.min_time(), 0.0);
        assert_eq!(ts.max_time(), 0.0);
    }

    #[test]
    fn test_immutability_via_extraction() {
        let mut tables = cherry();
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();

        let mut extracted = ts.dump_tables();
        extracted
            .nodes
            .add_row(0, 3.0, PopulationId::NULL, IndividualId::NULL, b"");
        // the built sequence is unaffected
        assert_eq!(ts.num_nodes(), 3);
        assert_eq!(extracted.nodes.len(), 4);
    }

    #[test]
    fn test_alignments_reference_only() {
        let mut tables = cherry();
        tables.set_reference_sequence("ATCGAATTCG");
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();

        assert!(ts.has_reference_sequence());
        let sequences: Vec<String> = ts.alignments().unwrap().collect();
        assert_eq!(sequences, vec!["ATCGAATTCG".to_string(); 2]);

        // restartable: a second call yields the same sequences
        let again: Vec<String> = ts.alignments().unwrap().collect();
        assert_eq!(again, sequences);
    }

    #[test]
    fn test_alignments_apply_mutations() {
        let mut tables = cherry();
        tables.set_reference_sequence("ATCGAATTCG");
        tables.sites.add_row(2.0, "C", b"");
        tables.sites.add_row(6.0, "T", b"");
        // sample 0 carries a derived state at position 2; both samples
        // inherit the root mutation at position 6
        tables
            .mutations
            .add_row(SiteId::new(0), NodeId::new(0), MutationId::NULL, 0.0, "G", b"");
        tables
            .mutations
            .add_row(SiteId::new(1), NodeId::new(2), MutationId::NULL, 1.0, "A", b"");
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();

        let sequences: Vec<String> = ts.alignments().unwrap().collect();
        assert_eq!(sequences[0], "ATGGAAATCG");
        assert_eq!(sequences[1], "ATCGAAATCG");
    }

    #[test]
    fn test_alignments_require_reference() {
        let mut tables = cherry();
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();
        let err = ts.alignments().unwrap_err();
        assert!(matches!(err, TreeSeqError::Unsupported { .. }));
    }

    #[test]
    fn test_mutation_chain_override() {
        let mut tables = cherry();
        tables.set_reference_sequence("ATCGAATTCG");
        tables.sites.add_row(2.0, "C", b"");
        // root mutation to G, overridden back to C on sample 1's branch
        tables
            .mutations
            .add_row(SiteId::new(0), NodeId::new(2), MutationId::NULL, 1.0, "G", b"");
        tables
            .mutations
            .add_row(SiteId::new(0), NodeId::new(1), MutationId::new(0), 0.5, "C", b"");
        tables.sort().unwrap();
        let ts = tables.tree_sequence().unwrap();

        let sequences: Vec<String> = ts.alignments().unwrap().collect();
        assert_eq!(sequences[0], "ATGGAATTCG");
        assert_eq!(sequences[1], "ATCGAATTCG");
    }
}
