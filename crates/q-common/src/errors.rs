// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for Qbitel EdgeOS
//!
//! This module defines the unified error type used at every collaborator
//! boundary (crypto backend, flash, metadata store). Component crates keep
//! their own narrower error enums and convert into this one.

use core::fmt;

/// Result type alias for Qbitel EdgeOS operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for Qbitel EdgeOS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Cryptographic Errors (0x01xx)
    // =========================================================================
    /// Invalid cryptographic key or key slot
    InvalidKey,
    /// Signature verification failed
    InvalidSignature,
    /// Signing operation failed
    SigningFailed,
    /// Random number generator failure
    RngFailure,
    /// Cryptographic algorithm not supported
    UnsupportedAlgorithm,
    /// Hash computation failed
    HashError,

    // =========================================================================
    // Storage Errors (0x03xx)
    // =========================================================================
    /// Storage read operation failed
    StorageReadFailed,
    /// Storage write operation failed
    StorageWriteFailed,
    /// Requested item not found in storage
    StorageNotFound,
    /// Storage data is corrupted
    StorageCorrupted,

    // =========================================================================
    // Attestation Errors (0x07xx)
    // =========================================================================
    /// Attestation evidence could not be produced
    AttestationFailed,
    /// Challenge has the wrong length or format
    InvalidChallenge,

    // =========================================================================
    // HAL Errors (0x08xx)
    // =========================================================================
    /// Flash operation failed
    FlashError,
    /// Flash address out of bounds
    FlashOutOfBounds,

    // =========================================================================
    // Integrity Errors (0x0Bxx)
    // =========================================================================
    /// Firmware chunk content does not match its reference
    FirmwareCorrupted,
    /// Integrity metadata is missing fields or fails its checksum
    InvalidMetadata,
    /// Integrity subsystem not initialized
    NotInitialized,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Buffer is too small for operation
    BufferTooSmall,
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation timed out
    Timeout,
    /// Resource is busy
    Busy,
    /// Operation not permitted
    NotPermitted,
    /// Memory allocation failed
    MemoryAllocationFailed,
    /// Internal error (should not occur)
    InternalError,
    /// Invalid state for the operation
    InvalidState,
    /// Integrity check failed (checksum, hash, etc.)
    IntegrityCheckFailed,
}

impl Error {
    /// Get the error code for this error
    ///
    /// Error codes are organized by category:
    /// - 0x01xx: Cryptographic errors
    /// - 0x03xx: Storage errors
    /// - 0x07xx: Attestation errors
    /// - 0x08xx: HAL errors
    /// - 0x0Bxx: Integrity errors
    /// - 0xFFxx: General errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            // Crypto errors (0x01xx)
            Self::InvalidKey => 0x0101,
            Self::InvalidSignature => 0x0102,
            Self::SigningFailed => 0x0103,
            Self::RngFailure => 0x0105,
            Self::UnsupportedAlgorithm => 0x0106,
            Self::HashError => 0x0108,

            // Storage errors (0x03xx)
            Self::StorageReadFailed => 0x0301,
            Self::StorageWriteFailed => 0x0302,
            Self::StorageNotFound => 0x0304,
            Self::StorageCorrupted => 0x0305,

            // Attestation errors (0x07xx)
            Self::AttestationFailed => 0x0702,
            Self::InvalidChallenge => 0x0705,

            // HAL errors (0x08xx)
            Self::FlashError => 0x0802,
            Self::FlashOutOfBounds => 0x080B,

            // Integrity errors (0x0Bxx)
            Self::FirmwareCorrupted => 0x0B01,
            Self::InvalidMetadata => 0x0B02,
            Self::NotInitialized => 0x0B03,

            // General errors (0xFFxx)
            Self::BufferTooSmall => 0xFF01,
            Self::InvalidParameter => 0xFF02,
            Self::Timeout => 0xFF03,
            Self::Busy => 0xFF04,
            Self::NotPermitted => 0xFF05,
            Self::MemoryAllocationFailed => 0xFF06,
            Self::InternalError => 0xFFFF,
            Self::InvalidState => 0xFF07,
            Self::IntegrityCheckFailed => 0xFF0A,
        }
    }

    /// Check if this is a security-critical error
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey
                | Self::InvalidSignature
                | Self::StorageCorrupted
                | Self::FirmwareCorrupted
                | Self::InvalidMetadata
                | Self::IntegrityCheckFailed
        )
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidKey => "invalid cryptographic key",
            Self::InvalidSignature => "signature verification failed",
            Self::SigningFailed => "signing failed",
            Self::RngFailure => "RNG failure",
            Self::UnsupportedAlgorithm => "unsupported algorithm",
            Self::HashError => "hash computation failed",
            Self::StorageReadFailed => "storage read failed",
            Self::StorageWriteFailed => "storage write failed",
            Self::StorageNotFound => "storage item not found",
            Self::StorageCorrupted => "storage corrupted",
            Self::AttestationFailed => "attestation failed",
            Self::InvalidChallenge => "invalid attestation challenge",
            Self::FlashError => "flash error",
            Self::FlashOutOfBounds => "flash address out of bounds",
            Self::FirmwareCorrupted => "firmware corrupted",
            Self::InvalidMetadata => "invalid integrity metadata",
            Self::NotInitialized => "not initialized",
            Self::BufferTooSmall => "buffer too small",
            Self::InvalidParameter => "invalid parameter",
            Self::Timeout => "timeout",
            Self::Busy => "busy",
            Self::NotPermitted => "not permitted",
            Self::MemoryAllocationFailed => "memory allocation failed",
            Self::InternalError => "internal error",
            Self::InvalidState => "invalid state",
            Self::IntegrityCheckFailed => "integrity check failed",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[0x{:04X}] {}", self.code(), self.description());
    }
}
