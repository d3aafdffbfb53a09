// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integrity error types
//!
//! `IntegrityError` is the failure taxonomy of the engine. `IntegrityStatus`
//! is the reported outcome of a check, success included, as carried in
//! `IntegrityResult` and passed to the event sink.

use core::fmt;

use q_common::Error;

/// Integrity engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrityError {
    /// Chunk content does not match its reference hash
    Corrupted,
    /// Chunk or firmware signature did not verify
    SignatureInvalid,
    /// Digest comparison failed outside a chunk check
    HashMismatch,
    /// Metadata failed magic, version, checksum or geometry checks
    MetadataInvalid,
    /// Engine not initialized
    NotInitialized,
    /// Transient buffer allocation or backend hash failure
    MemoryError,
    /// Flash read failed
    FlashReadError,
    /// Engine lock not acquired within the bounded wait
    Timeout,
    /// Argument out of range
    InvalidArgument,
    /// Unclassified failure
    Unknown,
}

impl IntegrityError {
    /// Numeric status code (negative, 0 is reserved for success)
    #[must_use]
    pub const fn status_code(&self) -> i32 {
        match self {
            Self::Corrupted => -1,
            Self::SignatureInvalid => -2,
            Self::HashMismatch => -3,
            Self::MetadataInvalid => -4,
            Self::NotInitialized => -5,
            Self::MemoryError => -6,
            Self::FlashReadError => -7,
            Self::Timeout => -8,
            Self::Unknown => -9,
            Self::InvalidArgument => -10,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Corrupted => "corrupted",
            Self::SignatureInvalid => "invalid signature",
            Self::HashMismatch => "hash mismatch",
            Self::MetadataInvalid => "corrupted metadata",
            Self::NotInitialized => "not initialized",
            Self::MemoryError => "memory error",
            Self::FlashReadError => "flash read error",
            Self::Timeout => "timeout",
            Self::InvalidArgument => "invalid argument",
            Self::Unknown => "unknown error",
        }
    }

    /// Whether the failure indicates tampering rather than an operational fault
    #[must_use]
    pub const fn is_tamper(&self) -> bool {
        matches!(self, Self::Corrupted | Self::SignatureInvalid | Self::HashMismatch)
    }
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status_code(), self.description())
    }
}

impl std::error::Error for IntegrityError {}

impl From<IntegrityError> for Error {
    fn from(e: IntegrityError) -> Self {
        match e {
            IntegrityError::Corrupted => Error::FirmwareCorrupted,
            IntegrityError::SignatureInvalid => Error::InvalidSignature,
            IntegrityError::HashMismatch => Error::IntegrityCheckFailed,
            IntegrityError::MetadataInvalid => Error::InvalidMetadata,
            IntegrityError::NotInitialized => Error::NotInitialized,
            IntegrityError::MemoryError => Error::MemoryAllocationFailed,
            IntegrityError::FlashReadError => Error::FlashError,
            IntegrityError::Timeout => Error::Timeout,
            IntegrityError::InvalidArgument => Error::InvalidParameter,
            IntegrityError::Unknown => Error::InternalError,
        }
    }
}

impl From<Error> for IntegrityError {
    fn from(e: Error) -> Self {
        match e {
            Error::FirmwareCorrupted => Self::Corrupted,
            Error::InvalidSignature => Self::SignatureInvalid,
            Error::IntegrityCheckFailed => Self::HashMismatch,
            Error::InvalidMetadata | Error::StorageCorrupted => Self::MetadataInvalid,
            Error::NotInitialized => Self::NotInitialized,
            Error::MemoryAllocationFailed | Error::BufferTooSmall => Self::MemoryError,
            Error::FlashError | Error::FlashOutOfBounds | Error::StorageReadFailed => {
                Self::FlashReadError
            }
            Error::Timeout => Self::Timeout,
            Error::InvalidParameter => Self::InvalidArgument,
            _ => Self::Unknown,
        }
    }
}

/// Reported outcome of an integrity operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IntegrityStatus {
    /// Verification succeeded
    #[default]
    Ok,
    /// Verification failed
    Failed(IntegrityError),
}

impl IntegrityStatus {
    /// Whether the status is success
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// The failure, if any
    #[must_use]
    pub const fn error(&self) -> Option<IntegrityError> {
        match self {
            Self::Ok => None,
            Self::Failed(e) => Some(*e),
        }
    }

    /// Numeric status code (0 for success)
    #[must_use]
    pub const fn status_code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Failed(e) => e.status_code(),
        }
    }

    /// Convert back into a `Result`
    ///
    /// # Errors
    ///
    /// Returns the recorded failure.
    pub const fn into_result(self) -> Result<(), IntegrityError> {
        match self {
            Self::Ok => Ok(()),
            Self::Failed(e) => Err(e),
        }
    }
}

impl From<IntegrityError> for IntegrityStatus {
    fn from(e: IntegrityError) -> Self {
        Self::Failed(e)
    }
}

impl From<Result<(), IntegrityError>> for IntegrityStatus {
    fn from(r: Result<(), IntegrityError>) -> Self {
        match r {
            Ok(()) => Self::Ok,
            Err(e) => Self::Failed(e),
        }
    }
}

impl fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "[0] OK"),
            Self::Failed(e) => e.fmt(f),
        }
    }
}
