// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Challenge-response attestation service
//!
//! The service answers challenges by asking the crypto backend for a signed
//! attestation and copying it into an [`AttestationResult`]. Continuous
//! attestation additionally runs a full firmware integrity check: a result
//! only succeeds when the device proved its identity AND the firmware is
//! intact.
//!
//! # Flow
//!
//! ```text
//! perform_continuous
//!    |
//!    |-- random(32) ---------------------> CryptoService
//!    |-- respond_to_challenge
//!    |      |-- attest(challenge) -------> CryptoService
//!    |      '-- bounded copy into result
//!    |-- check_firmware_full ------------> IntegrityEngine
//!    '-- sequence += 1 (success only)
//! ```

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use heapless::Vec;

use q_common::constants::{ATTESTATION_CERT_SIZE, ATTESTATION_RESPONSE_SIZE, CHALLENGE_SIZE};
use q_common::time::unix_time_secs;
use q_common::Challenge;
use q_integrity::{CryptoService, IntegrityEngine};

use crate::error::{AttestationError, AttestationStatus};

/// Offset of the freshness timestamp inside a self-attestation challenge
const SELF_TIMESTAMP_OFFSET: usize = CHALLENGE_SIZE - 4;

// ============================================================================
// Attestation Result
// ============================================================================

/// Result of one attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationResult {
    /// Outcome
    pub status: AttestationStatus,
    /// Challenge that was answered
    pub challenge: Challenge,
    /// Signed response from the backend
    pub response: Vec<u8, ATTESTATION_RESPONSE_SIZE>,
    /// Device certificate blob
    pub device_certificate: Vec<u8, ATTESTATION_CERT_SIZE>,
    /// Backend timestamp (seconds)
    pub timestamp: u32,
    /// Attestation is valid
    pub is_valid: bool,
    /// Continuous attestation sequence number (0 unless successful)
    pub sequence_number: u32,
}

impl AttestationResult {
    /// Empty result
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: AttestationStatus::Success,
            challenge: [0u8; CHALLENGE_SIZE],
            response: Vec::new(),
            device_certificate: Vec::new(),
            timestamp: 0,
            is_valid: false,
            sequence_number: 0,
        }
    }

    fn failed(mut self, status: AttestationStatus) -> Self {
        self.status = status;
        self.is_valid = false;
        self
    }
}

impl Default for AttestationResult {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Attestation Service
// ============================================================================

/// Attestation service bound to an integrity engine and crypto backend
pub struct AttestationService {
    engine: Arc<IntegrityEngine>,
    crypto: Arc<dyn CryptoService>,
    sequence: AtomicU32,
}

impl AttestationService {
    /// Create a service with its sequence counter at 0
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the engine is not initialized.
    pub fn new(
        engine: Arc<IntegrityEngine>,
        crypto: Arc<dyn CryptoService>,
    ) -> Result<Self, AttestationError> {
        if !engine.is_initialized() {
            return Err(AttestationError::NotInitialized);
        }
        log::info!("Attestation service initialized");

        Ok(Self {
            engine,
            crypto,
            sequence: AtomicU32::new(0),
        })
    }

    /// Number of successful continuous attestations so far
    #[must_use]
    pub fn sequence_number(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Run one continuous attestation cycle
    ///
    /// Answers a fresh random challenge, then runs a full integrity check.
    /// Any failure leaves the sequence counter unchanged:
    ///
    /// - engine deinitialized or RNG failure: `Communication`
    /// - backend attestation failed or reported invalid: `SignatureFailed`
    /// - integrity check not OK: `SignatureFailed`
    pub fn perform_continuous(&self) -> AttestationResult {
        let mut result = AttestationResult::new();

        if !self.engine.is_initialized() {
            log::warn!("Continuous attestation requested without integrity engine");
            return result.failed(AttestationStatus::Communication);
        }

        let mut challenge: Challenge = [0u8; CHALLENGE_SIZE];
        if let Err(e) = self.crypto.random(&mut challenge) {
            log::warn!("Challenge generation failed: {}", e);
            return result.failed(AttestationStatus::Communication);
        }

        if let Err(e) = self.respond_to_challenge(&challenge, &mut result) {
            log::error!("Continuous attestation response failed: {}", e);
            return result.failed(AttestationStatus::SignatureFailed);
        }

        // The integrity check runs whatever the backend reported
        let status = match self.engine.check_firmware_full() {
            Ok(integrity) => integrity.status,
            Err(e) => e.into(),
        };
        if !result.is_valid {
            log::error!("Backend reported an invalid attestation");
            return result.failed(AttestationStatus::SignatureFailed);
        }
        if !status.is_ok() {
            log::warn!("Integrity compromised during attestation: {}", status);
            return result.failed(AttestationStatus::SignatureFailed);
        }

        result.sequence_number = self.sequence.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        result.status = AttestationStatus::Success;
        log::debug!("Continuous attestation #{} succeeded", result.sequence_number);
        result
    }

    /// Answer a challenge
    ///
    /// Copies the challenge into `result`, asks the backend for a signed
    /// attestation and copies its response and certificate, each truncated
    /// to the smaller of the two capacities. `result.is_valid` mirrors the
    /// backend; `result.status` is `SignatureFailed` when it is invalid.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: `challenge` is not exactly 32 bytes; `result` is
    ///   left untouched and the backend is not called
    /// - `Crypto`: the backend failed to attest
    pub fn respond_to_challenge(
        &self,
        challenge: &[u8],
        result: &mut AttestationResult,
    ) -> Result<(), AttestationError> {
        let challenge: &Challenge = challenge
            .try_into()
            .map_err(|_| AttestationError::InvalidArgument)?;

        result.challenge = *challenge;

        let attestation = self.crypto.attest(challenge).map_err(|e| {
            log::error!("Backend attestation failed: {}", e);
            AttestationError::Crypto(e)
        })?;

        bounded_copy(&mut result.response, &attestation.response);
        bounded_copy(&mut result.device_certificate, &attestation.certificate);
        result.timestamp = attestation.timestamp;
        result.is_valid = attestation.valid;
        result.status = if attestation.valid {
            AttestationStatus::Success
        } else {
            AttestationStatus::SignatureFailed
        };

        log::debug!(
            "Challenge answered: {}",
            if result.is_valid { "valid" } else { "invalid" }
        );
        Ok(())
    }

    /// Answer a locally generated challenge
    ///
    /// The challenge is 28 random bytes followed by the current time in
    /// seconds (native byte order).
    ///
    /// # Errors
    ///
    /// `Crypto` if the RNG or the backend attestation fails.
    pub fn generate_self_attestation(
        &self,
        result: &mut AttestationResult,
    ) -> Result<(), AttestationError> {
        let mut challenge: Challenge = [0u8; CHALLENGE_SIZE];
        self.crypto
            .random(&mut challenge)
            .map_err(AttestationError::Crypto)?;
        challenge[SELF_TIMESTAMP_OFFSET..].copy_from_slice(&unix_time_secs().to_ne_bytes());

        self.respond_to_challenge(&challenge, result)
    }
}

/// Replace `dest` with the first `min(N, src.len())` bytes of `src`
fn bounded_copy<const N: usize>(dest: &mut Vec<u8, N>, src: &[u8]) {
    let len = N.min(src.len());
    dest.clear();
    // Cannot fail: len <= N
    let _ = dest.extend_from_slice(&src[..len]);
}
