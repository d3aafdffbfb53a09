// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Collaborator trait definitions
//!
//! The integrity engine never implements cryptography, flash access or
//! metadata persistence itself. Platforms provide these through the traits
//! below, whether backed by a discrete secure element or an on-chip
//! accelerator.

use heapless::Vec;
use q_common::constants::{BACKEND_CERT_SIZE, BACKEND_RESPONSE_SIZE};
use q_common::{Challenge, Digest, HashAlgorithm, KeyRef, Result, Signature};

use crate::error::IntegrityError;
use crate::metadata::FirmwareMetadata;

/// Signed attestation record produced by the crypto backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAttestation {
    /// Signed response over the challenge
    pub response: Vec<u8, BACKEND_RESPONSE_SIZE>,
    /// Device certificate blob
    pub certificate: Vec<u8, BACKEND_CERT_SIZE>,
    /// Backend timestamp (seconds)
    pub timestamp: u32,
    /// Backend validity flag
    pub valid: bool,
}

/// Cryptographic backend
///
/// All calls are synchronous and must be safe to invoke from several
/// threads at once.
pub trait CryptoService: Send + Sync {
    /// Compute a digest over `data`
    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Digest>;

    /// Sign a digest with the referenced key
    fn sign(&self, key: KeyRef, digest: &Digest) -> Result<Signature>;

    /// Verify a signature over a digest
    ///
    /// Returns `Ok(false)` for a well-formed but non-matching signature.
    fn verify(&self, key: KeyRef, digest: &Digest, signature: &Signature) -> Result<bool>;

    /// Fill `buffer` with random bytes
    fn random(&self, buffer: &mut [u8]) -> Result<()>;

    /// Produce a signed attestation over a challenge
    fn attest(&self, challenge: &Challenge) -> Result<DeviceAttestation>;
}

/// Read access to the monitored firmware
pub trait FlashReader: Send + Sync {
    /// Read data from flash
    ///
    /// # Arguments
    /// * `address` - Absolute flash address
    /// * `buffer` - Buffer to fill completely
    fn read(&self, address: u32, buffer: &mut [u8]) -> Result<()>;
}

/// Persistent storage for firmware metadata
///
/// Treated as an all-or-nothing blob store.
pub trait MetadataStore {
    /// Read stored metadata
    ///
    /// Returns `Error::StorageNotFound` when nothing has been stored yet.
    fn read(&self) -> Result<FirmwareMetadata>;

    /// Replace stored metadata
    fn write(&mut self, metadata: &FirmwareMetadata) -> Result<()>;
}

/// Receiver of integrity failure events
///
/// Invoked while the engine lock is held; implementations must return
/// quickly and must not call back into the engine.
pub trait EventSink: Send + Sync {
    /// A chunk failed verification
    fn notify(&self, error: IntegrityError, chunk_id: u32);
}
