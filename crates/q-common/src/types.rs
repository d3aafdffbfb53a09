// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Common types for Qbitel EdgeOS
//!
//! This module defines the small value types shared by the integrity and
//! attestation crates: digests, signatures, key references and the
//! firmware verification vocabulary.

use core::fmt;

use crate::constants::{CHALLENGE_SIZE, HASH_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use crate::errors::Error;

/// Fixed-width digest
pub type Digest = [u8; HASH_SIZE];

/// Fixed-width signature
pub type Signature = [u8; SIGNATURE_SIZE];

/// Attestation challenge
pub type Challenge = [u8; CHALLENGE_SIZE];

/// Hash algorithm selector passed to the crypto backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HashAlgorithm {
    /// SHA-256
    Sha256 = 0x30,
    /// SHA3-256
    Sha3_256 = 0x31,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

/// Reference to a verification or signing key
///
/// Secure elements address keys by slot; software backends may be handed a
/// raw public key instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRef {
    /// Key stored in a backend slot
    Slot(u8),
    /// Raw public key (x || y)
    PublicKey([u8; PUBLIC_KEY_SIZE]),
}

impl fmt::Debug for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot(slot) => write!(f, "KeyRef::Slot({slot})"),
            Self::PublicKey(pk) => write!(
                f,
                "KeyRef::PublicKey({:02x}{:02x}{:02x}{:02x}...)",
                pk[0], pk[1], pk[2], pk[3]
            ),
        }
    }
}

/// Firmware verification method recorded in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VerificationMethod {
    /// Hash comparison only
    Hash = 0,
    /// Hash plus signature
    Signature = 1,
    /// Message authentication code (declared, not used by check paths)
    Mac = 2,
    /// Hash plus signature (combined methods)
    Hybrid = 3,
}

impl VerificationMethod {
    /// Whether check paths additionally verify signatures
    #[must_use]
    pub const fn uses_signature(&self) -> bool {
        matches!(self, Self::Signature | Self::Hybrid)
    }
}

impl Default for VerificationMethod {
    fn default() -> Self {
        Self::Hybrid
    }
}

impl TryFrom<u8> for VerificationMethod {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Hash),
            1 => Ok(Self::Signature),
            2 => Ok(Self::Mac),
            3 => Ok(Self::Hybrid),
            _ => Err(Error::InvalidParameter),
        }
    }
}

/// Firmware section a chunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SectionType {
    /// Bootloader
    Bootloader = 0,
    /// Application image
    App = 1,
    /// Partition table
    PartitionTable = 2,
    /// Configuration
    Config = 3,
    /// Data
    Data = 4,
    /// Custom section
    Custom = 5,
}

impl Default for SectionType {
    fn default() -> Self {
        Self::App
    }
}

impl From<u8> for SectionType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Bootloader,
            1 => Self::App,
            2 => Self::PartitionTable,
            3 => Self::Config,
            4 => Self::Data,
            _ => Self::Custom,
        }
    }
}

/// Verification priority of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    /// Critical
    Critical = 1,
    /// High
    High = 2,
    /// Medium
    Medium = 3,
    /// Low
    Low = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}
