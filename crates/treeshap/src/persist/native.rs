//! Native binary format.
//!
//! A 32-byte header followed by a postcard-encoded [`EnsembleSchema`] payload.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("TSHP")
//! 4       1     Version major
//! 5       1     Version minor
//! 6       6     Reserved
//! 12      4     Payload size (bytes)
//! 16      4     CRC32 checksum of payload
//! 20      4     Number of features
//! 24      4     Number of trees
//! 28      4     Reserved
//! ```
//!
//! All integers are little-endian.

use std::io::{ErrorKind, Read, Write};

use super::error::{ReadError, WriteError};
use super::schema::EnsembleSchema;

/// Magic bytes identifying a treeshap ensemble file.
pub const MAGIC: &[u8; 4] = b"TSHP";

/// Current format version (major).
pub const CURRENT_VERSION_MAJOR: u8 = 1;

/// Current format version (minor).
pub const CURRENT_VERSION_MINOR: u8 = 0;

/// Size of the format header in bytes.
pub const HEADER_SIZE: usize = 32;

// ============================================================================
// Format Header
// ============================================================================

/// 32-byte header for the native format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub version_major: u8,
    pub version_minor: u8,
    /// Size of the payload in bytes.
    pub payload_size: u32,
    /// CRC32 checksum of the payload.
    pub checksum: u32,
    pub n_features: u32,
    pub n_trees: u32,
}

impl FormatHeader {
    /// Create a header with the current version and an empty payload.
    pub fn new(n_features: u32, n_trees: u32) -> Self {
        Self {
            version_major: CURRENT_VERSION_MAJOR,
            version_minor: CURRENT_VERSION_MINOR,
            payload_size: 0,
            checksum: 0,
            n_features,
            n_trees,
        }
    }

    /// Serialize header to 32 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[12..16].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf[20..24].copy_from_slice(&self.n_features.to_le_bytes());
        buf[24..28].copy_from_slice(&self.n_trees.to_le_bytes());
        buf
    }

    /// Parse header from 32 bytes.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, ReadError> {
        if &buf[0..4] != MAGIC {
            return Err(ReadError::NotAnEnsemble);
        }

        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major > CURRENT_VERSION_MAJOR {
            return Err(ReadError::UnsupportedVersion {
                major: version_major.into(),
                minor: version_minor.into(),
            });
        }

        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Ok(Self {
            version_major,
            version_minor,
            payload_size: word(12),
            checksum: word(16),
            n_features: word(20),
            n_trees: word(24),
        })
    }
}

/// Compute CRC32 checksum of data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

fn to_u32(field: &'static str, value: usize) -> Result<u32, WriteError> {
    u32::try_from(value).map_err(|_| WriteError::TooLarge { field, value })
}

// ============================================================================
// Reading and Writing
// ============================================================================

/// Encode `schema` and write header plus payload.
pub fn write_to<W: Write>(writer: &mut W, schema: &EnsembleSchema) -> Result<(), WriteError> {
    let payload = postcard::to_allocvec(schema)?;

    let mut header = FormatHeader::new(
        to_u32("n_features", schema.n_features)?,
        to_u32("n_trees", schema.trees.len())?,
    );
    header.payload_size = to_u32("payload size", payload.len())?;
    header.checksum = compute_checksum(&payload);

    writer.write_all(&header.to_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read header and payload, verify them and decode the schema.
pub fn read_from<R: Read>(reader: &mut R) -> Result<EnsembleSchema, ReadError> {
    let mut header_buf = [0u8; HEADER_SIZE];
    let read = read_up_to(reader, &mut header_buf)?;
    if read < HEADER_SIZE {
        return Err(ReadError::Truncated {
            expected: HEADER_SIZE,
            actual: read,
        });
    }
    let header = FormatHeader::from_bytes(&header_buf)?;

    let expected = header.payload_size as usize;
    let mut payload = Vec::with_capacity(expected.min(1 << 24));
    reader.take(expected as u64).read_to_end(&mut payload)?;
    if payload.len() < expected {
        return Err(ReadError::Truncated {
            expected,
            actual: payload.len(),
        });
    }

    let actual_checksum = compute_checksum(&payload);
    if actual_checksum != header.checksum {
        return Err(ReadError::ChecksumMismatch {
            expected: header.checksum,
            actual: actual_checksum,
        });
    }

    let schema: EnsembleSchema = postcard::from_bytes(&payload)?;
    if schema.n_features != header.n_features as usize
        || schema.trees.len() != header.n_trees as usize
    {
        return Err(ReadError::CorruptPayload(format!(
            "header declares {} features and {} trees, payload has {} and {}",
            header.n_features,
            header.n_trees,
            schema.n_features,
            schema.trees.len()
        )));
    }

    Ok(schema)
}

/// Fill `buf` as far as the reader allows, returning the bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ReadError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
