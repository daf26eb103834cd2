//! # Table Module
//!
//! Columnar tables for each genealogical entity kind, and the collection
//! that aggregates them. This is the core "Model" layer.
//!
//! ## Design
//! - **Structure of Arrays (SoA):** each table stores one `Vec` per fixed
//!   column plus a shared metadata arena, for cache-friendly iteration and
//!   cheap serialization.
//! - **Zero-cost newtypes:** `NodeId`, `SiteId`, etc. prevent cross-table
//!   index bugs at compile time with no runtime overhead.
//! - **Integer references:** cross-table links (edges→nodes,
//!   mutations→sites/nodes) are row ids into sibling tables, checked at
//!   build time rather than enforced structurally.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod collection;
pub mod column;
pub mod edges;
pub mod individuals;
pub mod migrations;
pub mod mutations;
pub mod nodes;
pub mod populations;
pub mod provenance;
pub mod sites;

pub use collection::{ReferenceSequence, TableCollection};
pub use column::{MetadataColumn, RaggedColumn};
pub use edges::{EdgeRow, EdgeTable};
pub use individuals::{IndividualRow, IndividualTable};
pub use migrations::{MigrationRow, MigrationTable};
pub use mutations::{is_unknown_time, MutationRow, MutationTable, UNKNOWN_TIME};
pub use nodes::{NodeRow, NodeTable, NODE_IS_SAMPLE};
pub use populations::{PopulationRow, PopulationTable};
pub use provenance::{ProvenanceRow, ProvenanceTable};
pub use sites::{SiteRow, SiteTable};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub i32);

        impl $name {
            /// The null sentinel (-1), meaning "no reference"
            pub const NULL: $name = $name(-1);

            pub fn new(idx: usize) -> Self {
                Self(idx as i32)
            }

            pub fn is_null(self) -> bool {
                self.0 < 0
            }

            /// The row index. Only meaningful for non-null ids.
            pub fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }

        impl From<i32> for $name {
            fn from(idx: i32) -> Self {
                Self(idx)
            }
        }

        impl From<$name> for i32 {
            fn from(idx: $name) -> i32 {
                idx.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Zero-cost newtype for node row ids
    NodeId
);
id_newtype!(
    /// Zero-cost newtype for edge row ids
    EdgeId
);
id_newtype!(
    /// Zero-cost newtype for site row ids
    SiteId
);
id_newtype!(
    /// Zero-cost newtype for mutation row ids
    MutationId
);
id_newtype!(
    /// Zero-cost newtype for individual row ids
    IndividualId
);
id_newtype!(
    /// Zero-cost newtype for population row ids
    PopulationId
);
id_newtype!(
    /// Zero-cost newtype for migration row ids
    MigrationId
);
id_newtype!(
    /// Zero-cost newtype for provenance row ids
    ProvenanceId
);
