// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Firmware chunk model
//!
//! The monitored region is partitioned into fixed-size chunks (the last
//! one takes the remainder). Each chunk carries a reference hash measured
//! at generation time and, for signature-based methods, a reference
//! signature over that hash.

use heapless::Vec;
use zeroize::Zeroize;

use q_common::constants::{CRITICAL_CHUNK_COUNT, HASH_SIZE, MAX_CHUNKS, SIGNATURE_SIZE};
use q_common::{Digest, HashAlgorithm, KeyRef, Priority, SectionType, Signature};

use crate::error::IntegrityError;
use crate::traits::{CryptoService, FlashReader};

/// One verifiable firmware chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Chunk identifier (index in the table)
    pub id: u32,
    /// Absolute start address
    pub start_address: u32,
    /// Size in bytes
    pub size: u32,
    /// Reference hash
    pub hash: Digest,
    /// Reference signature over `hash`
    pub signature: Signature,
    /// Firmware section
    pub section: SectionType,
    /// Verification priority
    pub priority: Priority,
    /// Included in critical-only checks
    pub is_critical: bool,
    /// Passed its most recent check
    pub is_verified: bool,
    /// Time of the last successful check (seconds)
    pub last_check_time: u32,
    /// Number of successful checks
    pub check_count: u32,
}

impl ChunkInfo {
    /// Create an unmeasured chunk
    #[must_use]
    pub const fn new(id: u32, start_address: u32, size: u32) -> Self {
        Self {
            id,
            start_address,
            size,
            hash: [0u8; HASH_SIZE],
            signature: [0u8; SIGNATURE_SIZE],
            section: SectionType::App,
            priority: Priority::Medium,
            is_critical: (id as usize) < CRITICAL_CHUNK_COUNT,
            is_verified: false,
            last_check_time: 0,
            check_count: 0,
        }
    }
}

/// Capacity-bounded chunk table
#[derive(Debug, Clone, Default)]
pub struct ChunkTable {
    chunks: Vec<ChunkInfo, MAX_CHUNKS>,
    truncated: bool,
}

impl ChunkTable {
    /// Partition `[start, start + size)` into chunks without measuring them
    ///
    /// The table holds `min(ceil(size / chunk_size), MAX_CHUNKS)` chunks.
    /// When the cap applies, the bytes past the last chunk are outside the
    /// verified range and [`is_truncated`](Self::is_truncated) reports it.
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::InvalidArgument` for a zero chunk size or a
    /// region that wraps the address space.
    pub fn partition(start: u32, size: u32, chunk_size: u32) -> Result<Self, IntegrityError> {
        if chunk_size == 0 || start.checked_add(size).is_none() {
            return Err(IntegrityError::InvalidArgument);
        }

        let needed = size.div_ceil(chunk_size) as usize;
        let count = needed.min(MAX_CHUNKS);
        let mut table = Self {
            chunks: Vec::new(),
            truncated: needed > MAX_CHUNKS,
        };

        let mut offset = 0u32;
        for id in 0..count as u32 {
            let len = chunk_size.min(size - offset);
            table
                .chunks
                .push(ChunkInfo::new(id, start + offset, len))
                .map_err(|_| IntegrityError::MemoryError)?;
            offset += len;
        }

        if table.truncated {
            log::warn!(
                "Firmware exceeds {} chunks; {} bytes outside verified range",
                MAX_CHUNKS,
                size - offset
            );
        }

        Ok(table)
    }

    /// Number of chunks
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether the firmware exceeded the chunk capacity
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Bytes covered by the table
    #[must_use]
    pub fn covered_size(&self) -> u64 {
        self.chunks.iter().map(|c| u64::from(c.size)).sum()
    }

    /// Get a chunk by id
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&ChunkInfo> {
        self.chunks.get(id as usize)
    }

    /// Get a mutable chunk by id
    pub fn get_mut(&mut self, id: u32) -> Option<&mut ChunkInfo> {
        self.chunks.get_mut(id as usize)
    }

    /// Iterate over chunks in id order
    pub fn iter(&self) -> impl Iterator<Item = &ChunkInfo> {
        self.chunks.iter()
    }

    /// Measure every chunk's reference hash
    ///
    /// # Errors
    ///
    /// Propagates the first measurement failure.
    pub fn measure_all(
        &mut self,
        crypto: &dyn CryptoService,
        flash: &dyn FlashReader,
        algorithm: HashAlgorithm,
    ) -> Result<(), IntegrityError> {
        for chunk in &mut self.chunks {
            chunk.hash = measure_chunk(crypto, flash, algorithm, chunk)?;
        }
        Ok(())
    }

    /// Sign every chunk's reference hash
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::SignatureInvalid` if the backend cannot sign.
    pub fn sign_all(&mut self, crypto: &dyn CryptoService, key: KeyRef) -> Result<(), IntegrityError> {
        for chunk in &mut self.chunks {
            chunk.signature = crypto.sign(key, &chunk.hash).map_err(|e| {
                log::error!("Signing chunk {} failed: {}", chunk.id, e);
                IntegrityError::SignatureInvalid
            })?;
        }
        Ok(())
    }

    /// Digest over the ordered list of chunk reference hashes
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::MemoryError` on allocation or backend failure.
    pub fn global_hash(
        &self,
        crypto: &dyn CryptoService,
        algorithm: HashAlgorithm,
    ) -> Result<Digest, IntegrityError> {
        let mut joined = std::vec::Vec::new();
        joined
            .try_reserve_exact(self.chunks.len() * HASH_SIZE)
            .map_err(|_| IntegrityError::MemoryError)?;
        for chunk in &self.chunks {
            joined.extend_from_slice(&chunk.hash);
        }

        crypto
            .hash(algorithm, &joined)
            .map_err(|_| IntegrityError::MemoryError)
    }
}

/// Partition a region and measure every chunk through the backends
///
/// # Errors
///
/// Returns `IntegrityError::InvalidArgument` for bad geometry, or the first
/// measurement failure.
pub fn generate_chunks(
    crypto: &dyn CryptoService,
    flash: &dyn FlashReader,
    algorithm: HashAlgorithm,
    start: u32,
    size: u32,
    chunk_size: u32,
) -> Result<ChunkTable, IntegrityError> {
    let mut table = ChunkTable::partition(start, size, chunk_size)?;
    table.measure_all(crypto, flash, algorithm)?;

    log::info!("Generated {} chunks of {} bytes", table.len(), chunk_size);
    Ok(table)
}

/// Read a chunk's backing bytes and hash them
///
/// The transient buffer is zeroized before it is released.
///
/// # Errors
///
/// `MemoryError` if the buffer cannot be allocated or the backend hash
/// fails, `FlashReadError` if the read fails.
pub(crate) fn measure_chunk(
    crypto: &dyn CryptoService,
    flash: &dyn FlashReader,
    algorithm: HashAlgorithm,
    chunk: &ChunkInfo,
) -> Result<Digest, IntegrityError> {
    let mut buffer = std::vec::Vec::new();
    if buffer.try_reserve_exact(chunk.size as usize).is_err() {
        log::error!("Buffer allocation failed for chunk {}", chunk.id);
        return Err(IntegrityError::MemoryError);
    }
    buffer.resize(chunk.size as usize, 0u8);

    let result = match flash.read(chunk.start_address, &mut buffer) {
        Ok(()) => crypto.hash(algorithm, &buffer).map_err(|e| {
            log::error!("Hashing chunk {} failed: {}", chunk.id, e);
            IntegrityError::MemoryError
        }),
        Err(_) => Err(IntegrityError::FlashReadError),
    };

    buffer.zeroize();
    result
}
