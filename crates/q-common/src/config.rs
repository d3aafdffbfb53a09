// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! System configuration for Qbitel EdgeOS
//!
//! This module defines the configuration structures that control the
//! integrity engine and its runtime scheduler. All configuration is
//! compile-time or provisioned at factory - no runtime configuration changes
//! are allowed for security.

use crate::constants::{
    DEFAULT_CHECK_INTERVAL_MS, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_CHECKS,
    FULL_CHECK_EVERY_CYCLES, FULL_CHECK_LOCK_TIMEOUT_MS, MAX_CHUNK_BUFFER,
    SCHEDULER_LOCK_TIMEOUT_MS, SLOT_ATTESTATION_KEY, SLOT_ENCRYPTION_KEY, STATS_LOCK_TIMEOUT_MS,
};
use crate::errors::{Error, Result};
use crate::types::{HashAlgorithm, KeyRef, VerificationMethod};

/// System-wide configuration
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    /// Integrity engine configuration
    pub integrity: IntegrityConfig,
    /// Runtime scheduler configuration
    pub runtime: RuntimeConfig,
}

impl SystemConfig {
    /// Default configuration
    pub const DEFAULT: Self = Self {
        integrity: IntegrityConfig::DEFAULT,
        runtime: RuntimeConfig::DEFAULT,
    };

    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if any section is inconsistent.
    pub fn validate(&self) -> Result<()> {
        self.integrity.validate()?;
        self.runtime.validate()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Integrity engine configuration
#[derive(Debug, Clone, Copy)]
pub struct IntegrityConfig {
    /// Start address of the monitored firmware region
    pub firmware_start: u32,
    /// Size of the monitored firmware region in bytes
    pub firmware_size: u32,
    /// Nominal chunk size in bytes
    pub chunk_size: u32,
    /// Chunks verified per incremental check
    pub max_concurrent_checks: u8,
    /// Verification method for new metadata and check paths
    pub method: VerificationMethod,
    /// Digest algorithm requested from the crypto backend
    pub hash_algorithm: HashAlgorithm,
    /// Key used to sign and verify chunk and firmware digests
    pub signature_key: KeyRef,
    /// MAC key (reserved; no check path uses it)
    pub mac_key: KeyRef,
    /// Lock wait for full and critical checks
    pub check_lock_timeout_ms: u32,
    /// Lock wait for statistics, callbacks and introspection
    pub stats_lock_timeout_ms: u32,
    /// Allow the background runtime scheduler
    pub enable_runtime_check: bool,
    /// Incremental checking flag (reserved; every scheduler cycle runs one)
    pub enable_incremental_check: bool,
    /// Critical-only flag (reserved; periodic checks always cover every chunk)
    pub enable_critical_only: bool,
}

impl IntegrityConfig {
    /// Default integrity configuration (empty firmware region)
    pub const DEFAULT: Self = Self {
        firmware_start: 0,
        firmware_size: 0,
        chunk_size: DEFAULT_CHUNK_SIZE,
        max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
        method: VerificationMethod::Hybrid,
        hash_algorithm: HashAlgorithm::Sha256,
        signature_key: KeyRef::Slot(SLOT_ATTESTATION_KEY),
        mac_key: KeyRef::Slot(SLOT_ENCRYPTION_KEY),
        check_lock_timeout_ms: FULL_CHECK_LOCK_TIMEOUT_MS,
        stats_lock_timeout_ms: STATS_LOCK_TIMEOUT_MS,
        enable_runtime_check: true,
        enable_incremental_check: true,
        enable_critical_only: false,
    };

    /// Default configuration for a firmware region
    #[must_use]
    pub const fn for_region(firmware_start: u32, firmware_size: u32) -> Self {
        let mut config = Self::DEFAULT;
        config.firmware_start = firmware_start;
        config.firmware_size = firmware_size;
        config
    }

    /// Check the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` for a zero chunk size, a chunk size
    /// above `MAX_CHUNK_BUFFER`, a zero incremental window, or a region that
    /// wraps the address space.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_BUFFER {
            return Err(Error::InvalidParameter);
        }
        if self.max_concurrent_checks == 0 {
            return Err(Error::InvalidParameter);
        }
        if self.firmware_start.checked_add(self.firmware_size).is_none() {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runtime scheduler configuration
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Interval between scheduler cycles in milliseconds
    pub check_interval_ms: u32,
    /// Lock wait for one incremental cycle in milliseconds
    pub lock_timeout_ms: u32,
    /// A full check runs every this many cycles (0 disables)
    pub full_check_every: u32,
}

impl RuntimeConfig {
    /// Default runtime configuration
    pub const DEFAULT: Self = Self {
        check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        lock_timeout_ms: SCHEDULER_LOCK_TIMEOUT_MS,
        full_check_every: FULL_CHECK_EVERY_CYCLES,
    };

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` for a zero interval.
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
