//! # Container Persistence
//!
//! Serializes a table collection to a single self-describing binary file.
//!
//! Format:
//! - [Magic 8 bytes] "TREESQ01"
//! - [Header] (Version, flags, sequence length, time units)
//! - [Table sections] nodes, edges, sites, mutations, individuals,
//!   populations, migrations, provenances: row count, fixed columns as
//!   little-endian arrays, ragged columns as offsets + values, metadata
//!   arena + bound schema (or absence marker)
//! - [Top-level metadata + schema]
//! - [Reference sequence] (present flag; data + metadata + schema)
//! - [Trailer 16 bytes] content identifier: first half of the SHA-256
//!   digest over everything before the trailer
//!
//! The trailer makes files content-addressable: `load` recomputes the
//! digest and compares it to the stored identifier before parsing, so
//! offset corruption is detected up front. Writes go to a temp file in the
//! destination directory and are renamed into place, so a failed dump never
//! truncates an existing file.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, TreeSeqError};
use crate::metadata::MetadataSchema;
use crate::tables::collection::ReferenceSequence;
use crate::tables::column::{MetadataColumn, RaggedColumn};
use crate::tables::{IndividualId, MutationId, NodeId, PopulationId, SiteId, TableCollection};

const MAGIC: &[u8; 8] = b"TREESQ01";
const VERSION: u32 = 1;
const FLAG_DISCRETE_GENOME: u32 = 1;
const TRAILER_LEN: usize = 16;

/// Serialize `tables` to `path`, returning the derived content identifier
pub(crate) fn dump(tables: &TableCollection, path: &Path) -> Result<Uuid> {
    let payload = encode(tables)?;
    let uuid = derive_uuid(&payload);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| TreeSeqError::invalid_file("destination has no file name"))?;
    let tmp_path = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let written = (|| -> Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.write_all(uuid.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written?;

    debug!(
        bytes = payload.len() + TRAILER_LEN,
        uuid = %uuid,
        path = %path.display(),
        "dumped table collection"
    );
    Ok(uuid)
}

/// Reconstruct a collection from `path`, verifying the stored identifier
pub(crate) fn load(path: &Path) -> Result<TableCollection> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    if mmap.len() < MAGIC.len() + TRAILER_LEN {
        return Err(TreeSeqError::invalid_file("file is too short"));
    }

    let (payload, trailer) = mmap.split_at(mmap.len() - TRAILER_LEN);
    let trailer: [u8; TRAILER_LEN] = trailer
        .try_into()
        .map_err(|_| TreeSeqError::invalid_file("trailer is malformed"))?;
    let stored = Uuid::from_bytes(trailer);
    let computed = derive_uuid(payload);
    if stored != computed {
        return Err(TreeSeqError::IntegrityMismatch {
            stored: stored.to_string(),
            computed: computed.to_string(),
        });
    }

    let mut reader = Reader::new(payload);
    let mut tables = decode(&mut reader)?;
    reader.finish()?;
    tables.set_file_uuid(stored);

    debug!(uuid = %stored, path = %path.display(), "loaded table collection");
    Ok(tables)
}

/// First 16 bytes of the SHA-256 digest over the payload
fn derive_uuid(payload: &[u8]) -> Uuid {
    let digest = Sha256::digest(payload);
    let mut bytes = [0u8; TRAILER_LEN];
    bytes.copy_from_slice(&digest[..TRAILER_LEN]);
    Uuid::from_bytes(bytes)
}

// === Encoding ===

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Length-prefixed byte string
    fn blob(&mut self, bytes: &[u8]) {
        self.u64(bytes.len() as u64);
        self.bytes(bytes);
    }

    fn u64_slice(&mut self, values: &[u64]) {
        for &value in values {
            self.u64(value);
        }
    }

    fn f64_slice(&mut self, values: &[f64]) {
        for &value in values {
            self.f64(value);
        }
    }

    fn ids<I: Into<i32> + Copy>(&mut self, ids: &[I]) {
        for &id in ids {
            self.i32(id.into());
        }
    }

    /// Ragged bytes: offsets then the value buffer (its length is the last
    /// offset, so no separate count is written)
    fn ragged_bytes(&mut self, column: &RaggedColumn<u8>) {
        self.u64_slice(column.offsets());
        self.bytes(column.values());
    }

    fn ragged_f64(&mut self, column: &RaggedColumn<f64>) {
        self.u64_slice(column.offsets());
        self.f64_slice(column.values());
    }

    fn ragged_ids<I: Into<i32> + Copy>(&mut self, column: &RaggedColumn<I>) {
        self.u64_slice(column.offsets());
        self.ids(column.values());
    }

    fn schema(&mut self, schema: &MetadataSchema) {
        match schema.as_text() {
            Some(text) => {
                self.u8(1);
                self.blob(text.as_bytes());
            }
            None => self.u8(0),
        }
    }

    fn metadata(&mut self, column: &MetadataColumn) {
        self.u64_slice(column.offsets());
        self.bytes(column.bytes());
        self.schema(column.schema());
    }
}

fn encode(tables: &TableCollection) -> Result<Vec<u8>> {
    let mut w = Writer::default();
    w.bytes(MAGIC);
    w.u32(VERSION);
    w.u32(if tables.discrete_genome() {
        FLAG_DISCRETE_GENOME
    } else {
        0
    });
    w.f64(tables.sequence_length());
    w.blob(tables.time_units().as_bytes());

    let nodes = &tables.nodes;
    w.u64(nodes.len() as u64);
    w.u64_slice(nodes.flags());
    w.f64_slice(nodes.times());
    w.ids(nodes.populations());
    w.ids(nodes.individuals());
    w.metadata(nodes.metadata_column());

    let edges = &tables.edges;
    w.u64(edges.len() as u64);
    w.f64_slice(edges.lefts());
    w.f64_slice(edges.rights());
    w.ids(edges.parents());
    w.ids(edges.children());
    w.metadata(edges.metadata_column());

    let sites = &tables.sites;
    w.u64(sites.len() as u64);
    w.f64_slice(sites.positions());
    w.ragged_bytes(sites.ancestral_states());
    w.metadata(sites.metadata_column());

    let mutations = &tables.mutations;
    w.u64(mutations.len() as u64);
    w.ids(mutations.sites());
    w.ids(mutations.nodes());
    w.ids(mutations.parents());
    w.f64_slice(mutations.times());
    w.ragged_bytes(mutations.derived_states());
    w.metadata(mutations.metadata_column());

    let individuals = &tables.individuals;
    w.u64(individuals.len() as u64);
    w.u64_slice(individuals.flags());
    w.ragged_f64(individuals.locations());
    w.ragged_ids(individuals.parents());
    w.metadata(individuals.metadata_column());

    let populations = &tables.populations;
    w.u64(populations.len() as u64);
    w.metadata(populations.metadata_column());

    let migrations = &tables.migrations;
    w.u64(migrations.len() as u64);
    w.f64_slice(migrations.lefts());
    w.f64_slice(migrations.rights());
    w.ids(migrations.nodes());
    w.ids(migrations.sources());
    w.ids(migrations.dests());
    w.f64_slice(migrations.times());
    w.metadata(migrations.metadata_column());

    let provenances = &tables.provenances;
    w.u64(provenances.len() as u64);
    w.ragged_bytes(provenances.timestamps());
    w.ragged_bytes(provenances.records());

    w.blob(tables.metadata_bytes());
    w.schema(tables.metadata_schema());

    let reference = tables.reference_sequence();
    if reference.is_empty()
        && reference.metadata_bytes().is_empty()
        && reference.metadata_schema().is_null()
    {
        w.u8(0);
    } else {
        w.u8(1);
        w.blob(reference.data());
        w.blob(reference.metadata_bytes());
        w.schema(reference.metadata_schema());
    }

    Ok(w.buf)
}

// === Decoding ===

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.data.len() - self.pos {
            return Err(TreeSeqError::invalid_file("unexpected end of file"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(
            bytes
                .try_into()
                .map_err(|_| TreeSeqError::invalid_file("truncated integer"))?,
        ))
    }

    fn u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(
            bytes
                .try_into()
                .map_err(|_| TreeSeqError::invalid_file("truncated integer"))?,
        ))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.u64()?))
    }

    fn i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes(
            bytes
                .try_into()
                .map_err(|_| TreeSeqError::invalid_file("truncated integer"))?,
        ))
    }

    fn count(&mut self) -> Result<usize> {
        let count = self.u64()?;
        usize::try_from(count).map_err(|_| TreeSeqError::invalid_file("count overflows usize"))
    }

    fn blob(&mut self) -> Result<Vec<u8>> {
        let len = self.count()?;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String> {
        String::from_utf8(self.blob()?)
            .map_err(|_| TreeSeqError::invalid_file("string is not valid UTF-8"))
    }

    fn u64_slice(&mut self, count: usize) -> Result<Vec<u64>> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.u64()?);
        }
        Ok(values)
    }

    fn f64_slice(&mut self, count: usize) -> Result<Vec<f64>> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.f64()?);
        }
        Ok(values)
    }

    fn ids<I: From<i32>>(&mut self, count: usize) -> Result<Vec<I>> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(I::from(self.i32()?));
        }
        Ok(ids)
    }

    /// Offsets for `rows` rows, then the raw values they delimit
    fn ragged_bytes(&mut self, rows: usize) -> Result<(Vec<u8>, Vec<u64>)> {
        let offsets = self.u64_slice(rows + 1)?;
        let len = usize::try_from(*offsets.last().unwrap_or(&0))
            .map_err(|_| TreeSeqError::invalid_file("offset overflows usize"))?;
        let values = self.take(len)?.to_vec();
        Ok((values, offsets))
    }

    fn ragged_f64(&mut self, rows: usize) -> Result<(Vec<f64>, Vec<u64>)> {
        let offsets = self.u64_slice(rows + 1)?;
        let len = usize::try_from(*offsets.last().unwrap_or(&0))
            .map_err(|_| TreeSeqError::invalid_file("offset overflows usize"))?;
        let values = self.f64_slice(len)?;
        Ok((values, offsets))
    }

    fn ragged_ids<I: From<i32>>(&mut self, rows: usize) -> Result<(Vec<I>, Vec<u64>)> {
        let offsets = self.u64_slice(rows + 1)?;
        let len = usize::try_from(*offsets.last().unwrap_or(&0))
            .map_err(|_| TreeSeqError::invalid_file("offset overflows usize"))?;
        let values = self.ids(len)?;
        Ok((values, offsets))
    }

    fn schema(&mut self) -> Result<MetadataSchema> {
        match self.u8()? {
            0 => Ok(MetadataSchema::Null),
            1 => {
                let text = self.string()?;
                MetadataSchema::from_text(&text)
                    .map_err(|e| TreeSeqError::invalid_file(format!("bad schema document: {e}")))
            }
            marker => Err(TreeSeqError::invalid_file(format!(
                "unknown schema marker {marker}"
            ))),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(TreeSeqError::invalid_file("trailing bytes after payload"));
        }
        Ok(())
    }
}

fn decode(r: &mut Reader<'_>) -> Result<TableCollection> {
    let magic = r.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(TreeSeqError::invalid_file("bad magic"));
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(TreeSeqError::invalid_file(format!(
            "unsupported container version {version}"
        )));
    }
    let _flags = r.u32()?;
    let sequence_length = r.f64()?;
    let time_units = r.string()?;

    let mut tables = TableCollection::new(sequence_length)?;
    tables.set_time_units(time_units);

    let n = r.count()?;
    let flags = r.u64_slice(n)?;
    let times = r.f64_slice(n)?;
    let populations = r.ids::<PopulationId>(n)?;
    let individuals = r.ids::<IndividualId>(n)?;
    let (metadata, metadata_offsets) = r.ragged_bytes(n)?;
    tables
        .nodes
        .set_columns(flags, times, populations, individuals, metadata, metadata_offsets)?;
    tables.nodes.set_metadata_schema(r.schema()?);

    let n = r.count()?;
    let left = r.f64_slice(n)?;
    let right = r.f64_slice(n)?;
    let parent = r.ids::<NodeId>(n)?;
    let child = r.ids::<NodeId>(n)?;
    let (metadata, metadata_offsets) = r.ragged_bytes(n)?;
    tables
        .edges
        .set_columns(left, right, parent, child, metadata, metadata_offsets)?;
    tables.edges.set_metadata_schema(r.schema()?);

    let n = r.count()?;
    let position = r.f64_slice(n)?;
    let (states, state_offsets) = r.ragged_bytes(n)?;
    let (metadata, metadata_offsets) = r.ragged_bytes(n)?;
    tables
        .sites
        .set_columns(position, states, state_offsets, metadata, metadata_offsets)?;
    tables.sites.set_metadata_schema(r.schema()?);

    let n = r.count()?;
    let site = r.ids::<SiteId>(n)?;
    let node = r.ids::<NodeId>(n)?;
    let parent = r.ids::<MutationId>(n)?;
    let time = r.f64_slice(n)?;
    let (states, state_offsets) = r.ragged_bytes(n)?;
    let (metadata, metadata_offsets) = r.ragged_bytes(n)?;
    tables.mutations.set_columns(
        site,
        node,
        parent,
        time,
        states,
        state_offsets,
        metadata,
        metadata_offsets,
    )?;
    tables.mutations.set_metadata_schema(r.schema()?);

    let n = r.count()?;
    let flags = r.u64_slice(n)?;
    let (location, location_offsets) = r.ragged_f64(n)?;
    let (parents, parents_offsets) = r.ragged_ids::<IndividualId>(n)?;
    let (metadata, metadata_offsets) = r.ragged_bytes(n)?;
    tables.individuals.set_columns(
        flags,
        location,
        location_offsets,
        parents,
        parents_offsets,
        metadata,
        metadata_offsets,
    )?;
    tables.individuals.set_metadata_schema(r.schema()?);

    let n = r.count()?;
    let (metadata, metadata_offsets) = r.ragged_bytes(n)?;
    tables.populations.set_columns(metadata, metadata_offsets)?;
    tables.populations.set_metadata_schema(r.schema()?);

    let n = r.count()?;
    let left = r.f64_slice(n)?;
    let right = r.f64_slice(n)?;
    let node = r.ids::<NodeId>(n)?;
    let source = r.ids::<PopulationId>(n)?;
    let dest = r.ids::<PopulationId>(n)?;
    let time = r.f64_slice(n)?;
    let (metadata, metadata_offsets) = r.ragged_bytes(n)?;
    tables.migrations.set_columns(
        left,
        right,
        node,
        source,
        dest,
        time,
        metadata,
        metadata_offsets,
    )?;
    tables.migrations.set_metadata_schema(r.schema()?);

    let n = r.count()?;
    let (timestamps, timestamp_offsets) = r.ragged_bytes(n)?;
    let (records, record_offsets) = r.ragged_bytes(n)?;
    tables
        .provenances
        .set_columns(timestamps, timestamp_offsets, records, record_offsets)?;

    // bytes land while the schema is still null, then the schema is bound;
    // loaded bytes are not re-validated here
    let metadata = r.blob()?;
    tables.set_metadata(&crate::metadata::MetadataValue::Bytes(metadata))?;
    tables.set_metadata_schema(r.schema()?);

    if r.u8()? == 1 {
        let data = r.blob()?;
        let metadata = r.blob()?;
        let schema = r.schema()?;
        *tables.reference_sequence_mut() = ReferenceSequence::from_parts(data, metadata, schema);
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{IndividualId, PopulationId, NODE_IS_SAMPLE};
    use tempfile::TempDir;

    fn small_tables() -> TableCollection {
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
        tables.add_provenance("2026-01-01T00:00:00", r#"{"op":"build"}"#);
        tables
    }

    #[test]
    fn test_derive_uuid_is_stable() {
        let a = derive_uuid(b"payload");
        let b = derive_uuid(b"payload");
        let c = derive_uuid(b"other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_dump_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.trees");
        let tables = small_tables();

        let uuid = dump(&tables, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, tables);
        assert_eq!(loaded.file_uuid(), Some(uuid));
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.trees");
        let mut payload = b"NOTMAGIC".to_vec();
        payload.extend_from_slice(&[0u8; 32]);
        let uuid = derive_uuid(&payload);
        let mut bytes = payload;
        bytes.extend_from_slice(uuid.as_bytes());
        fs::write(&path, bytes).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, TreeSeqError::InvalidFile { .. }));
    }

    #[test]
    fn test_load_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.trees");
        dump(&small_tables(), &path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        // flip a payload byte; the stored trailer no longer matches
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, TreeSeqError::IntegrityMismatch { .. }));
    }

    #[test]
    fn test_load_rejects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.trees");
        fs::write(&path, b"TREESQ01").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, TreeSeqError::InvalidFile { .. }));
    }

    #[test]
    fn test_dump_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.trees");
        dump(&small_tables(), &path).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["clean.trees".to_string()]);
    }

    #[test]
    fn test_dump_overwrites_atomically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replace.trees");
        let first = small_tables();
        dump(&first, &path).unwrap();

        let mut second = small_tables();
        second.set_time_units("generations");
        dump(&second, &path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.time_units(), "generations");
    }
}
