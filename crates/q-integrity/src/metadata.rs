// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Firmware integrity metadata
//!
//! Metadata summarises the monitored image: its size and chunking, the
//! global hash and signature, and the verification method. The record is
//! sealed by a checksum over every other field.
//!
//! # Wire Format
//!
//! ```text
//! +--------+---------+---------+-------------+------------+
//! | magic  | version | fw_size | chunk_count | chunk_size |   5 x u32 LE
//! +--------+---------+---------+-------------+------------+
//! | global_hash (32) | global_signature (64)              |
//! +------------------+------------------------------------+
//! | method | timestamp | build_id | checksum |                4 x u32 LE
//! +--------+-----------+----------+----------+
//! ```
//!
//! The checksum is the first four bytes (little-endian) of SHA3-256 over
//! the 128 bytes that precede it.

use sha3::{Digest as _, Sha3_256};

use q_common::constants::{HASH_SIZE, INTEGRITY_MAGIC, INTEGRITY_METADATA_VERSION, SIGNATURE_SIZE};
use q_common::{Digest, Error, Result, Signature, VerificationMethod};

use crate::error::IntegrityError;

/// Serialized metadata size in bytes
pub const METADATA_SIZE: usize = 132;

/// Offset of the checksum field
const CHECKSUM_OFFSET: usize = METADATA_SIZE - 4;

/// Firmware integrity metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareMetadata {
    /// Magic constant (`INTEGRITY_MAGIC`)
    pub magic: u32,
    /// Format version
    pub version: u32,
    /// Total firmware size in bytes
    pub firmware_size: u32,
    /// Number of chunks in the table
    pub chunk_count: u32,
    /// Nominal chunk size in bytes
    pub chunk_size: u32,
    /// Digest over the ordered chunk reference hashes
    pub global_hash: Digest,
    /// Signature over `global_hash`
    pub global_signature: Signature,
    /// Verification method
    pub method: VerificationMethod,
    /// Creation time (seconds)
    pub timestamp: u32,
    /// Build identifier
    pub build_id: u32,
    /// Seal over every preceding field
    pub checksum: u32,
}

impl FirmwareMetadata {
    /// Serialize to the fixed wire layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; METADATA_SIZE] {
        let mut out = [0u8; METADATA_SIZE];
        let mut offset = 0;

        for word in [
            self.magic,
            self.version,
            self.firmware_size,
            self.chunk_count,
            self.chunk_size,
        ] {
            out[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
            offset += 4;
        }

        out[offset..offset + HASH_SIZE].copy_from_slice(&self.global_hash);
        offset += HASH_SIZE;
        out[offset..offset + SIGNATURE_SIZE].copy_from_slice(&self.global_signature);
        offset += SIGNATURE_SIZE;

        for word in [
            self.method as u32,
            self.timestamp,
            self.build_id,
            self.checksum,
        ] {
            out[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
            offset += 4;
        }

        out
    }

    /// Parse from the fixed wire layout
    ///
    /// Parsing does not validate the record; use [`validate_metadata`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMetadata` for a short buffer or an unknown
    /// verification method.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < METADATA_SIZE {
            return Err(Error::InvalidMetadata);
        }

        let word = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };

        let mut global_hash = [0u8; HASH_SIZE];
        global_hash.copy_from_slice(&bytes[20..20 + HASH_SIZE]);
        let mut global_signature = [0u8; SIGNATURE_SIZE];
        global_signature.copy_from_slice(&bytes[52..52 + SIGNATURE_SIZE]);

        let method = u8::try_from(word(116))
            .map_err(|_| Error::InvalidMetadata)
            .and_then(|m| VerificationMethod::try_from(m).map_err(|_| Error::InvalidMetadata))?;

        Ok(Self {
            magic: word(0),
            version: word(4),
            firmware_size: word(8),
            chunk_count: word(12),
            chunk_size: word(16),
            global_hash,
            global_signature,
            method,
            timestamp: word(120),
            build_id: word(124),
            checksum: word(CHECKSUM_OFFSET),
        })
    }

    /// Checksum over every field except `checksum`
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let bytes = self.to_bytes();
        let digest = Sha3_256::digest(&bytes[..CHECKSUM_OFFSET]);
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Recompute and store the checksum after a field change
    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }
}

/// Check magic, version and checksum
///
/// Pure predicate: any change to a non-checksum field without resealing
/// makes this return `false`.
#[must_use]
pub fn validate_metadata(metadata: &FirmwareMetadata) -> bool {
    metadata.magic == INTEGRITY_MAGIC
        && metadata.version == INTEGRITY_METADATA_VERSION
        && metadata.compute_checksum() == metadata.checksum
}

/// Build fresh, sealed metadata for a firmware region
///
/// `chunk_count` starts at 0; the chunk table is generated separately.
///
/// # Errors
///
/// Returns `IntegrityError::InvalidArgument` for a zero chunk size or a
/// region that wraps the address space.
pub fn init_metadata(
    firmware_start: u32,
    firmware_size: u32,
    chunk_size: u32,
    method: VerificationMethod,
    timestamp: u32,
) -> core::result::Result<FirmwareMetadata, IntegrityError> {
    if chunk_size == 0 || firmware_start.checked_add(firmware_size).is_none() {
        return Err(IntegrityError::InvalidArgument);
    }

    let mut metadata = FirmwareMetadata {
        magic: INTEGRITY_MAGIC,
        version: INTEGRITY_METADATA_VERSION,
        firmware_size,
        chunk_count: 0,
        chunk_size,
        global_hash: [0u8; HASH_SIZE],
        global_signature: [0u8; SIGNATURE_SIZE],
        method,
        timestamp,
        build_id: 0,
        checksum: 0,
    };
    metadata.seal();

    log::info!(
        "Metadata initialized: firmware={} bytes, chunk_size={}",
        firmware_size,
        chunk_size
    );

    Ok(metadata)
}
