//! Binary snapshot persistence for the registry state.
//!
//! Layout: a fixed header (magic, version, body checksum, cooked flag,
//! data source name, schema version table) followed by a bincode body of
//! all records. Development snapshots tag payload blobs with their schema
//! name for portability; cooked snapshots use the compact wire id.
//!
//! Loading validates in a fixed order — magic, version, data source,
//! cooked flag, body checksum, schema resolution — and resets the state
//! to empty on any failure. No partial state is ever retained.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::error;

use crate::error::{LoadError, SaveError};
use crate::payload::{Payload, PayloadKind};
use crate::record::{RecordData, SharedData};
use crate::state::RegistryState;

/// Snapshot file magic, 16 bytes.
const SNAPSHOT_MAGIC: [u8; 16] = *b"Stockpile Items!";

/// Snapshot format versions. New versions go above `LATEST`.
const SNAPSHOT_VERSION_INITIAL: u32 = 0;
const SNAPSHOT_VERSION_LATEST: u32 = SNAPSHOT_VERSION_INITIAL;

/// Upper bound on the data source name length in the header. Keeps a
/// corrupt length field from sizing a multi-gigabyte allocation.
const MAX_DATA_SOURCE_NAME_LEN: usize = 4096;

/// Snapshot header, serialized field by field in declaration order.
#[derive(Debug)]
struct SnapshotHeader {
    version: u32,

    /// CRC32 over the raw body bytes, header excluded.
    checksum: u32,

    is_cooked: bool,

    /// Data source identity the snapshot was produced with.
    data_source: String,

    /// (schema wire id, schema version) for every schema in the build.
    schema_versions: Vec<(u16, u16)>,
}

impl SnapshotHeader {
    fn write(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&SNAPSHOT_MAGIC)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.checksum.to_le_bytes())?;
        writer.write_all(&[self.is_cooked as u8])?;

        let name = self.data_source.as_bytes();
        writer.write_all(&(name.len() as u32).to_le_bytes())?;
        writer.write_all(name)?;

        writer.write_all(&(self.schema_versions.len() as u16).to_le_bytes())?;
        for (wire_id, version) in &self.schema_versions {
            writer.write_all(&wire_id.to_le_bytes())?;
            writer.write_all(&version.to_le_bytes())?;
        }

        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, LoadError> {
        let mut magic = [0u8; 16];
        reader.read_exact(&mut magic)?;

        if magic != SNAPSHOT_MAGIC {
            return Err(LoadError::BadMagic);
        }

        let version = read_u32(reader)?;
        let checksum = read_u32(reader)?;
        let is_cooked = read_u8(reader)? != 0;

        let name_len = read_u32(reader)? as usize;
        if name_len > MAX_DATA_SOURCE_NAME_LEN {
            return Err(LoadError::Malformed);
        }

        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let data_source = String::from_utf8(name).map_err(|_| LoadError::Malformed)?;

        let schema_count = read_u16(reader)? as usize;
        let mut schema_versions = Vec::with_capacity(schema_count);
        for _ in 0..schema_count {
            schema_versions.push((read_u16(reader)?, read_u16(reader)?));
        }

        Ok(Self {
            version,
            checksum,
            is_cooked,
            data_source,
            schema_versions,
        })
    }
}

fn read_u8(reader: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(reader: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// One payload blob in the snapshot body.
#[derive(Debug, Serialize, Deserialize)]
enum PayloadEncoded {
    /// Development encoding: schema addressed by name.
    Named { schema: String, bytes: Vec<u8> },

    /// Cooked encoding: schema addressed by wire id.
    Compact { schema: u16, bytes: Vec<u8> },
}

impl PayloadEncoded {
    fn encode(payload: &Payload, cooked: bool) -> Self {
        let bytes = payload.to_field_bytes();

        if cooked {
            Self::Compact {
                schema: payload.kind().wire_id(),
                bytes,
            }
        } else {
            Self::Named {
                schema: payload.kind().schema_name().to_owned(),
                bytes,
            }
        }
    }

    fn decode(&self) -> Result<Payload, LoadError> {
        let (kind, bytes) = match self {
            Self::Named { schema, bytes } => {
                let kind =
                    PayloadKind::from_schema_name(schema).ok_or_else(|| LoadError::UnknownSchema {
                        schema: schema.clone(),
                    })?;
                (kind, bytes)
            }
            Self::Compact { schema, bytes } => {
                let kind = PayloadKind::from_wire_id(*schema).ok_or_else(|| {
                    LoadError::UnknownSchema {
                        schema: format!("#{schema}"),
                    }
                })?;
                (kind, bytes)
            }
        };

        Payload::from_field_bytes(kind, bytes).ok_or(LoadError::Malformed)
    }
}

/// One record row in the snapshot body.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    shared: SharedData,
    asset_path: String,
    default_payload: Option<PayloadEncoded>,
    custom_data: Option<PayloadEncoded>,
}

impl RegistryState {
    /// Writes the state into a writer.
    pub fn save_state(
        &self,
        writer: &mut impl Write,
        is_cooking: bool,
        data_source: &str,
    ) -> Result<(), SaveError> {
        let rows: Vec<SnapshotRecord> = self
            .records()
            .iter()
            .map(|record| SnapshotRecord {
                shared: record.shared.clone(),
                asset_path: record.asset_path.clone(),
                default_payload: self
                    .default_payload_of(record)
                    .map(|payload| PayloadEncoded::encode(payload, is_cooking)),
                custom_data: self
                    .custom_data_of(record)
                    .map(|payload| PayloadEncoded::encode(payload, is_cooking)),
            })
            .collect();

        let body = bincode::serialize(&rows)?;

        let header = SnapshotHeader {
            version: SNAPSHOT_VERSION_LATEST,
            checksum: crc32fast::hash(&body),
            is_cooked: is_cooking,
            data_source: data_source.to_owned(),
            schema_versions: PayloadKind::iter()
                .map(|kind| (kind.wire_id(), kind.schema_version()))
                .collect(),
        };

        header.write(writer)?;
        writer.write_all(&body)?;

        Ok(())
    }

    /// Reads the state from a reader.
    ///
    /// On any failure the state is reset to empty and the error returned;
    /// callers rebuild from the live data source.
    pub fn load_state(
        &mut self,
        reader: &mut impl Read,
        is_cooked: bool,
        data_source: &str,
    ) -> Result<(), LoadError> {
        match self.load_state_inner(reader, is_cooked, data_source) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.reset(Vec::new());
                Err(err)
            }
        }
    }

    fn load_state_inner(
        &mut self,
        reader: &mut impl Read,
        is_cooked: bool,
        data_source: &str,
    ) -> Result<(), LoadError> {
        let header = SnapshotHeader::read(reader)?;

        if header.version > SNAPSHOT_VERSION_LATEST {
            return Err(LoadError::NewerVersion {
                found: header.version,
                latest: SNAPSHOT_VERSION_LATEST,
            });
        }

        if header.data_source != data_source {
            return Err(LoadError::DataSourceMismatch {
                expected: data_source.to_owned(),
                found: header.data_source,
            });
        }

        if header.is_cooked != is_cooked {
            return Err(LoadError::CookedMismatch {
                expected: is_cooked,
                found: header.is_cooked,
            });
        }

        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;

        let found = crc32fast::hash(&body);
        if found != header.checksum {
            return Err(LoadError::ChecksumMismatch {
                expected: header.checksum,
                found,
            });
        }

        let mut cursor = &body[..];
        let rows: Vec<SnapshotRecord> =
            bincode::deserialize_from(&mut cursor).map_err(|_| LoadError::Malformed)?;

        if !cursor.is_empty() {
            return Err(LoadError::Malformed);
        }

        // Every blob must resolve to a known schema before anything is
        // committed to the state.
        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push(RecordData {
                shared: row.shared,
                asset_path: row.asset_path,
                default_payload: row.default_payload.as_ref().map(PayloadEncoded::decode).transpose()?,
                custom_data: row.custom_data.as_ref().map(PayloadEncoded::decode).transpose()?,
            });
        }

        self.reset(data);

        Ok(())
    }

    /// Writes the state directly into a file.
    pub fn save_to_file(
        &self,
        path: &Path,
        is_cooking: bool,
        data_source: &str,
    ) -> Result<(), SaveError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_state(&mut writer, is_cooking, data_source)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads the state directly from a file.
    pub fn load_from_file(
        &mut self,
        path: &Path,
        is_cooked: bool,
        data_source: &str,
    ) -> Result<(), LoadError> {
        let file = File::open(path).inspect_err(|err| {
            error!(path = %path.display(), %err, "failed to open registry snapshot");
        })?;

        let mut reader = BufReader::new(file);
        self.load_state(&mut reader, is_cooked, data_source)
            .inspect_err(|err| {
                error!(path = %path.display(), %err, "failed to load registry snapshot");
            })
    }
}
