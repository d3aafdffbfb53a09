// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Attestation errors and status codes

use core::fmt;

use q_common::Error;

/// Outcome recorded in an attestation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttestationStatus {
    /// Attestation produced and, for continuous attestation, integrity intact
    #[default]
    Success,
    /// Challenge rejected
    InvalidChallenge,
    /// Signing failed, the backend reported an invalid attestation, or
    /// firmware integrity did not hold
    SignatureFailed,
    /// Device certificate rejected
    CertificateInvalid,
    /// Operation timed out
    Timeout,
    /// Backend unreachable (including RNG failure)
    Communication,
}

impl AttestationStatus {
    /// Numeric status code (0 success, negative failure)
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InvalidChallenge => -1,
            Self::SignatureFailed => -2,
            Self::CertificateInvalid => -3,
            Self::Timeout => -4,
            Self::Communication => -5,
        }
    }

    /// Whether the status is success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InvalidChallenge => "invalid challenge",
            Self::SignatureFailed => "signature failed",
            Self::CertificateInvalid => "certificate invalid",
            Self::Timeout => "timeout",
            Self::Communication => "communication error",
        }
    }
}

impl fmt::Display for AttestationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.description())
    }
}

/// Errors returned by attestation operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationError {
    /// Challenge has the wrong length
    InvalidArgument,
    /// Integrity engine not initialized
    NotInitialized,
    /// Crypto backend failure
    Crypto(Error),
}

impl fmt::Display for AttestationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotInitialized => write!(f, "not initialized"),
            Self::Crypto(e) => write!(f, "crypto backend: {}", e),
        }
    }
}

impl std::error::Error for AttestationError {}

impl From<AttestationError> for Error {
    fn from(e: AttestationError) -> Self {
        match e {
            AttestationError::InvalidArgument => Error::InvalidChallenge,
            AttestationError::NotInitialized => Error::NotInitialized,
            AttestationError::Crypto(e) => e,
        }
    }
}
