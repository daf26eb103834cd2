//! # Treeseq Library Root
//!
//! ## Role
//! The crate root that declares all public modules and re-exports common
//! types.
//!
//! ## Overview
//! A genealogical table collection and its derived, queryable tree-sequence
//! view. Mutable columnar tables (nodes, edges, sites, mutations,
//! individuals, populations, migrations, provenance) aggregate into a
//! [`TableCollection`]; after canonical sorting and validation it freezes
//! into an immutable, indexed [`TreeSequence`] that answers structural
//! queries. Collections persist to a self-describing binary container with a
//! content-derived identifier.
//!
//! ## Module Structure
//! ```text
//! treeseq
//! ├── tables     # Columnar tables and the collection aggregate
//! ├── metadata   # Schemas and the metadata codec
//! ├── sort       # Canonical ordering and validation
//! ├── trees      # The immutable, indexed tree-sequence view
//! └── io         # Container file persistence
//! ```

pub mod error;
pub mod io;
pub mod metadata;
pub mod sort;
pub mod tables;
pub mod trees;

// Re-export commonly used types
pub use error::{Result, TreeSeqError};
pub use metadata::{MetadataSchema, MetadataValue};
pub use tables::{
    is_unknown_time, EdgeId, IndividualId, MigrationId, MutationId, NodeId, PopulationId,
    ProvenanceId, ReferenceSequence, SiteId, TableCollection, NODE_IS_SAMPLE, UNKNOWN_TIME,
};
pub use trees::{Alignments, Tree, TreeSequence, Trees};
