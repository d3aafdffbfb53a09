// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! System-wide constants for Qbitel EdgeOS
//!
//! This module defines compile-time constants used by the integrity and
//! attestation subsystems. All sizes and limits are chosen for embedded
//! constraints.

// =============================================================================
// Cryptographic Constants
// =============================================================================

/// SHA-256 / SHA3-256 digest size in bytes
pub const HASH_SIZE: usize = 32;

/// ECDSA P-256 signature size in bytes (r || s)
pub const SIGNATURE_SIZE: usize = 64;

/// ECDSA P-256 uncompressed public key size in bytes (x || y)
pub const PUBLIC_KEY_SIZE: usize = 64;

// =============================================================================
// Integrity Constants
// =============================================================================

/// Metadata magic: "SECI" (Secure Integrity)
pub const INTEGRITY_MAGIC: u32 = 0x5345_4349;

/// Current metadata format version
pub const INTEGRITY_METADATA_VERSION: u32 = 1;

/// Default nominal chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: u32 = 4096;

/// Maximum number of chunks in the chunk table
pub const MAX_CHUNKS: usize = 256;

/// Upper bound on the transient read buffer for a single chunk
pub const MAX_CHUNK_BUFFER: u32 = 64 * 1024;

/// Number of leading chunks flagged critical
pub const CRITICAL_CHUNK_COUNT: usize = 4;

/// Maximum failing chunk ids recorded per integrity result
pub const MAX_FAILED_IDS: usize = 16;

/// Default incremental window (chunks per incremental check)
pub const DEFAULT_MAX_CONCURRENT_CHECKS: u8 = 2;

/// Lock wait for full/critical checks (ms)
pub const FULL_CHECK_LOCK_TIMEOUT_MS: u32 = 5000;

/// Lock wait for statistics access (ms)
pub const STATS_LOCK_TIMEOUT_MS: u32 = 1000;

// =============================================================================
// Runtime Scheduler Constants
// =============================================================================

/// Default interval between scheduler cycles (ms)
pub const DEFAULT_CHECK_INTERVAL_MS: u32 = 5000;

/// Lock wait for one scheduler cycle (ms)
pub const SCHEDULER_LOCK_TIMEOUT_MS: u32 = 100;

/// A full check runs every this many scheduler cycles
pub const FULL_CHECK_EVERY_CYCLES: u32 = 100;

// =============================================================================
// Attestation Constants
// =============================================================================

/// Attestation challenge size in bytes
pub const CHALLENGE_SIZE: usize = 32;

/// Attestation response field capacity in bytes
pub const ATTESTATION_RESPONSE_SIZE: usize = 128;

/// Device certificate field capacity in bytes
pub const ATTESTATION_CERT_SIZE: usize = 512;

/// Maximum signed response a crypto backend may return
pub const BACKEND_RESPONSE_SIZE: usize = SIGNATURE_SIZE;

/// Maximum certificate blob a crypto backend may return
pub const BACKEND_CERT_SIZE: usize = 1024;

// =============================================================================
// Key Slots
// =============================================================================

/// Device private key slot
pub const SLOT_DEVICE_PRIVATE_KEY: u8 = 0;

/// Attestation / firmware signing key slot
pub const SLOT_ATTESTATION_KEY: u8 = 1;

/// Encryption / MAC key slot
pub const SLOT_ENCRYPTION_KEY: u8 = 2;

/// Root CA public key slot
pub const SLOT_ROOT_CA_PUBLIC_KEY: u8 = 3;
