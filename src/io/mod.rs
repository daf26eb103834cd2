//! # I/O Module
//!
//! File persistence boundaries. Converts between the on-disk container
//! format and the in-memory `TableCollection` representation.

pub mod container;
