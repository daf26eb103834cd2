//! # Node Table
//!
//! A node is one genome copy at a point in time, either a sample or an
//! ancestor. Sample status is carried in the flags column.

use crate::error::{Result, TreeSeqError};
use crate::metadata::{MetadataSchema, MetadataValue};
use crate::tables::column::{expect_len, MetadataColumn};
use crate::tables::{IndividualId, NodeId, PopulationId};

/// Flag bit marking a node as a sample
pub const NODE_IS_SAMPLE: u64 = 1;

/// Columnar store of node rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeTable {
    flags: Vec<u64>,
    time: Vec<f64>,
    population: Vec<PopulationId>,
    individual: Vec<IndividualId>,
    metadata: MetadataColumn,
}

/// Borrowed view of one node row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRow<'a> {
    pub flags: u64,
    pub time: f64,
    pub population: PopulationId,
    pub individual: IndividualId,
    pub metadata: &'a [u8],
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its zero-based id
    pub fn add_row(
        &mut self,
        flags: u64,
        time: f64,
        population: PopulationId,
        individual: IndividualId,
        metadata: &[u8],
    ) -> NodeId {
        self.flags.push(flags);
        self.time.push(time);
        self.population.push(population);
        self.individual.push(individual);
        self.metadata.push(metadata);
        NodeId::new(self.flags.len() - 1)
    }

    pub fn get_row(&self, index: usize) -> Result<NodeRow<'_>> {
        if index >= self.len() {
            return Err(TreeSeqError::IndexOutOfRange {
                index,
                length: self.len(),
            });
        }
        Ok(NodeRow {
            flags: self.flags[index],
            time: self.time[index],
            population: self.population[index],
            individual: self.individual[index],
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
        self.time.truncate(len);
        self.population.truncate(len);
        self.individual.truncate(len);
        self.metadata.truncate(len);
    }

    /// Replace all rows atomically from parallel column arrays
    pub fn set_columns(
        &mut self,
        flags: Vec<u64>,
        time: Vec<f64>,
        population: Vec<PopulationId>,
        individual: Vec<IndividualId>,
        metadata: Vec<u8>,
        metadata_offsets: Vec<u64>,
    ) -> Result<()> {
        let n = flags.len();
        expect_len(n, time.len())?;
        expect_len(n, population.len())?;
        expect_len(n, individual.len())?;
        let mut arena = MetadataColumn::new();
        arena.set_schema(self.metadata.schema().clone());
        arena.replace(metadata, metadata_offsets, n)?;

        self.flags = flags;
        self.time = time;
        self.population = population;
        self.individual = individual;
        self.metadata = arena;
        Ok(())
    }

    /// Whether the node at `index` carries the sample flag
    pub fn is_sample(&self, index: usize) -> bool {
        self.flags
            .get(index)
            .map(|flags| flags & NODE_IS_SAMPLE != 0)
            .unwrap_or(false)
    }

    pub fn times(&self) -> &[f64] {
        &self.time
    }

    pub fn flags(&self) -> &[u64] {
        &self.flags
    }

    pub fn populations(&self) -> &[PopulationId] {
        &self.population
    }

    pub fn individuals(&self) -> &[IndividualId] {
        &self.individual
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
