// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Signature verification through the crypto backend
//!
//! Stateless: both functions depend only on their arguments and the
//! backend, so they may be called concurrently.

use q_common::time::{Micros, Stopwatch};
use q_common::{Digest, KeyRef, Signature};

use crate::chunk::ChunkInfo;
use crate::metadata::FirmwareMetadata;
use crate::traits::CryptoService;

/// Outcome of a signature verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureVerification {
    /// Signature verified
    pub valid: bool,
    /// The signature that was checked
    pub signature: Signature,
    /// Time spent in the backend
    pub elapsed: Micros,
}

/// Verify the global firmware signature over the global hash
///
/// A backend error is reported as an invalid signature.
#[must_use]
pub fn verify_firmware(
    crypto: &dyn CryptoService,
    key: KeyRef,
    metadata: &FirmwareMetadata,
) -> SignatureVerification {
    verify(crypto, key, &metadata.global_hash, metadata.global_signature)
}

/// Verify a chunk's reference signature over its reference hash
///
/// A backend error is reported as an invalid signature.
#[must_use]
pub fn verify_chunk(crypto: &dyn CryptoService, key: KeyRef, chunk: &ChunkInfo) -> SignatureVerification {
    verify(crypto, key, &chunk.hash, chunk.signature)
}

fn verify(
    crypto: &dyn CryptoService,
    key: KeyRef,
    digest: &Digest,
    signature: Signature,
) -> SignatureVerification {
    let stopwatch = Stopwatch::start();
    let valid = match crypto.verify(key, digest, &signature) {
        Ok(valid) => valid,
        Err(e) => {
            log::warn!("Signature backend error: {}", e);
            false
        }
    };

    SignatureVerification {
        valid,
        signature,
        elapsed: stopwatch.elapsed(),
    }
}
