// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! In-memory collaborators for host testing
//!
//! `MockCrypto` hashes with SHA3-256 for every requested algorithm and
//! produces deterministic keyed "signatures"; it is not a real signature
//! scheme. Failure switches let tests drive every error path.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use sha3::{Digest as _, Sha3_256};

use q_common::constants::{ATTESTATION_CERT_SIZE, BACKEND_CERT_SIZE};
use q_common::time::unix_time_secs;
use q_common::{Challenge, Digest, Error, HashAlgorithm, KeyRef, Result, Signature};

use crate::error::IntegrityError;
use crate::metadata::{FirmwareMetadata, METADATA_SIZE};
use crate::traits::{CryptoService, DeviceAttestation, EventSink, FlashReader, MetadataStore};

// =============================================================================
// Crypto
// =============================================================================

/// Software crypto backend
#[derive(Debug)]
pub struct MockCrypto {
    fail_hash: AtomicBool,
    fail_sign: AtomicBool,
    fail_verify: AtomicBool,
    fail_random: AtomicBool,
    fail_attest: AtomicBool,
    attest_valid: AtomicBool,
    certificate_len: AtomicUsize,
    rng_counter: AtomicU64,
    hash_calls: AtomicUsize,
}

impl Default for MockCrypto {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCrypto {
    /// Create a backend with every operation succeeding
    #[must_use]
    pub fn new() -> Self {
        Self {
            fail_hash: AtomicBool::new(false),
            fail_sign: AtomicBool::new(false),
            fail_verify: AtomicBool::new(false),
            fail_random: AtomicBool::new(false),
            fail_attest: AtomicBool::new(false),
            attest_valid: AtomicBool::new(true),
            certificate_len: AtomicUsize::new(ATTESTATION_CERT_SIZE),
            rng_counter: AtomicU64::new(0),
            hash_calls: AtomicUsize::new(0),
        }
    }

    /// SHA3-256 of `data`
    #[must_use]
    pub fn digest(data: &[u8]) -> Digest {
        Sha3_256::digest(data).into()
    }

    fn keyed_signature(key: KeyRef, digest: &Digest) -> Signature {
        let mut hasher = Sha3_256::new();
        match key {
            KeyRef::Slot(slot) => hasher.update([0x01, slot]),
            KeyRef::PublicKey(pk) => {
                hasher.update([0x02]);
                hasher.update(pk);
            }
        }
        hasher.update(digest);
        let first: Digest = hasher.finalize().into();
        let second = Self::digest(&first);

        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&first);
        signature[32..].copy_from_slice(&second);
        signature
    }

    /// Make `hash` fail
    pub fn fail_hash(&self, fail: bool) {
        self.fail_hash.store(fail, Ordering::SeqCst);
    }

    /// Make `sign` fail
    pub fn fail_sign(&self, fail: bool) {
        self.fail_sign.store(fail, Ordering::SeqCst);
    }

    /// Make `verify` return an error
    pub fn fail_verify(&self, fail: bool) {
        self.fail_verify.store(fail, Ordering::SeqCst);
    }

    /// Make `random` fail
    pub fn fail_random(&self, fail: bool) {
        self.fail_random.store(fail, Ordering::SeqCst);
    }

    /// Make `attest` return an error
    pub fn fail_attest(&self, fail: bool) {
        self.fail_attest.store(fail, Ordering::SeqCst);
    }

    /// Set the validity flag reported by `attest`
    pub fn set_attest_valid(&self, valid: bool) {
        self.attest_valid.store(valid, Ordering::SeqCst);
    }

    /// Set the certificate length returned by `attest` (capped at the backend size)
    pub fn set_certificate_len(&self, len: usize) {
        self.certificate_len
            .store(len.min(BACKEND_CERT_SIZE), Ordering::SeqCst);
    }

    /// Number of `hash` calls so far
    #[must_use]
    pub fn hash_calls(&self) -> usize {
        self.hash_calls.load(Ordering::SeqCst)
    }
}

impl CryptoService for MockCrypto {
    fn hash(&self, _algorithm: HashAlgorithm, data: &[u8]) -> Result<Digest> {
        self.hash_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_hash.load(Ordering::SeqCst) {
            return Err(Error::HashError);
        }
        Ok(Self::digest(data))
    }

    fn sign(&self, key: KeyRef, digest: &Digest) -> Result<Signature> {
        if self.fail_sign.load(Ordering::SeqCst) {
            return Err(Error::SigningFailed);
        }
        Ok(Self::keyed_signature(key, digest))
    }

    fn verify(&self, key: KeyRef, digest: &Digest, signature: &Signature) -> Result<bool> {
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(Error::InvalidKey);
        }
        Ok(Self::keyed_signature(key, digest) == *signature)
    }

    fn random(&self, buffer: &mut [u8]) -> Result<()> {
        if self.fail_random.load(Ordering::SeqCst) {
            return Err(Error::RngFailure);
        }
        for block in buffer.chunks_mut(32) {
            let n = self.rng_counter.fetch_add(1, Ordering::SeqCst);
            let digest = Self::digest(&n.to_le_bytes());
            block.copy_from_slice(&digest[..block.len()]);
        }
        Ok(())
    }

    fn attest(&self, challenge: &Challenge) -> Result<DeviceAttestation> {
        if self.fail_attest.load(Ordering::SeqCst) {
            return Err(Error::AttestationFailed);
        }

        let signature = Self::keyed_signature(KeyRef::Slot(1), &Self::digest(challenge));
        let mut attestation = DeviceAttestation {
            timestamp: unix_time_secs(),
            valid: self.attest_valid.load(Ordering::SeqCst),
            ..DeviceAttestation::default()
        };
        attestation
            .response
            .extend_from_slice(&signature)
            .map_err(|()| Error::BufferTooSmall)?;

        let cert_len = self.certificate_len.load(Ordering::SeqCst);
        for i in 0..cert_len {
            attestation
                .certificate
                .push((i % 251) as u8)
                .map_err(|_| Error::BufferTooSmall)?;
        }

        Ok(attestation)
    }
}

// =============================================================================
// Flash
// =============================================================================

/// RAM-backed flash region
#[derive(Debug)]
pub struct MemFlash {
    base: u32,
    data: RwLock<Vec<u8>>,
    fail_reads: AtomicBool,
}

impl MemFlash {
    /// Flash holding `data` at `base`
    #[must_use]
    pub fn new(base: u32, data: Vec<u8>) -> Self {
        Self {
            base,
            data: RwLock::new(data),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Flash of `len` bytes filled with a position-dependent pattern
    #[must_use]
    pub fn with_pattern(base: u32, len: usize) -> Self {
        let data = (0..len).map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8).collect();
        Self::new(base, data)
    }

    fn offset(&self, address: u32) -> Option<usize> {
        address.checked_sub(self.base).map(|o| o as usize)
    }

    /// Copy of `len` bytes at `address`
    ///
    /// # Panics
    ///
    /// Panics if the range is outside the region.
    #[must_use]
    pub fn snapshot(&self, address: u32, len: u32) -> Vec<u8> {
        let start = self.offset(address).expect("address below flash base");
        self.data.read()[start..start + len as usize].to_vec()
    }

    /// Invert one byte
    ///
    /// # Panics
    ///
    /// Panics if the address is outside the region.
    pub fn corrupt(&self, address: u32) {
        let offset = self.offset(address).expect("address below flash base");
        self.data.write()[offset] ^= 0xFF;
    }

    /// Overwrite bytes at `address`
    ///
    /// # Panics
    ///
    /// Panics if the range is outside the region.
    pub fn write(&self, address: u32, bytes: &[u8]) {
        let offset = self.offset(address).expect("address below flash base");
        self.data.write()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Make every read fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl FlashReader for MemFlash {
    fn read(&self, address: u32, buffer: &mut [u8]) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::FlashError);
        }
        let data = self.data.read();
        let start = self.offset(address).ok_or(Error::FlashOutOfBounds)?;
        let end = start
            .checked_add(buffer.len())
            .filter(|&end| end <= data.len())
            .ok_or(Error::FlashOutOfBounds)?;
        buffer.copy_from_slice(&data[start..end]);
        Ok(())
    }
}

// =============================================================================
// Metadata Store
// =============================================================================

/// Metadata store holding the serialized record in memory
#[derive(Debug, Default)]
pub struct MemMetadataStore {
    blob: Option<[u8; METADATA_SIZE]>,
    fail_reads: bool,
    fail_writes: bool,
    writes: usize,
}

impl MemMetadataStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a record
    #[must_use]
    pub fn with_metadata(metadata: &FirmwareMetadata) -> Self {
        Self {
            blob: Some(metadata.to_bytes()),
            ..Self::default()
        }
    }

    /// Currently stored record, if it parses
    #[must_use]
    pub fn stored(&self) -> Option<FirmwareMetadata> {
        self.blob.and_then(|b| FirmwareMetadata::from_bytes(&b).ok())
    }

    /// Raw stored bytes
    pub fn raw_mut(&mut self) -> Option<&mut [u8; METADATA_SIZE]> {
        self.blob.as_mut()
    }

    /// Number of successful writes
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }

    /// Make reads fail with a storage error
    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make writes fail
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl MetadataStore for MemMetadataStore {
    fn read(&self) -> Result<FirmwareMetadata> {
        if self.fail_reads {
            return Err(Error::StorageReadFailed);
        }
        let blob = self.blob.ok_or(Error::StorageNotFound)?;
        FirmwareMetadata::from_bytes(&blob)
    }

    fn write(&mut self, metadata: &FirmwareMetadata) -> Result<()> {
        if self.fail_writes {
            return Err(Error::StorageWriteFailed);
        }
        self.blob = Some(metadata.to_bytes());
        self.writes += 1;
        Ok(())
    }
}

// =============================================================================
// Event Sink
// =============================================================================

/// Sink recording every notification
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(IntegrityError, u32)>>,
}

impl RecordingSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(error, chunk_id)` pairs in arrival order
    #[must_use]
    pub fn events(&self) -> Vec<(IntegrityError, u32)> {
        self.events.lock().clone()
    }

    /// Number of recorded notifications
    #[must_use]
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, error: IntegrityError, chunk_id: u32) {
        self.events.lock().push((error, chunk_id));
    }
}
