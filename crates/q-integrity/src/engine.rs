// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integrity Engine
//!
//! The engine owns the firmware metadata, the chunk table and the check
//! statistics. A single mutex guards all of it; every check, statistics
//! access and callback change acquires that mutex with a bounded wait and
//! reports `IntegrityError::Timeout` instead of blocking indefinitely.
//!
//! # Check Family
//!
//! - [`check_chunk`](IntegrityEngine::check_chunk): one chunk, hash then
//!   signature for signature-based methods
//! - [`check_firmware_full`](IntegrityEngine::check_firmware_full): every
//!   chunk plus the global firmware signature
//! - [`check_critical_sections`](IntegrityEngine::check_critical_sections):
//!   chunks flagged critical
//! - [`incremental_check`](IntegrityEngine::incremental_check): a window of
//!   chunks at a persistent cursor
//!
//! Corruption and signature failures are reported through both the return
//! value and the registered [`EventSink`]. They are never fatal to the
//! engine.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use heapless::Vec;
use parking_lot::{Mutex, MutexGuard};

use q_common::constants::{MAX_CHUNKS, MAX_FAILED_IDS};
use q_common::time::{unix_time_secs, Micros, Millis, Stopwatch};
use q_common::{Error, IntegrityConfig};

use crate::chunk::{measure_chunk, ChunkInfo, ChunkTable};
use crate::error::{IntegrityError, IntegrityStatus};
use crate::metadata::{init_metadata, validate_metadata, FirmwareMetadata};
use crate::traits::{CryptoService, EventSink, FlashReader, MetadataStore};
use crate::verifier::{verify_chunk, verify_firmware};

/// Input hashed by [`IntegrityEngine::self_test`]
const SELF_TEST_VECTOR: &[u8] = b"Test data for integrity check";

// ============================================================================
// Results and Statistics
// ============================================================================

/// Outcome of a full or critical-only check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityResult {
    /// Aggregated status
    pub status: IntegrityStatus,
    /// Chunks checked
    pub total_chunks: u32,
    /// Chunks that verified
    pub verified_chunks: u32,
    /// Chunks whose content did not match
    pub corrupted_chunks: u32,
    /// Chunks that failed for any other reason
    pub failed_chunks: u32,
    /// First failing chunk ids, corrupted or failed, in check order
    pub failed_chunk_ids: Vec<u32, MAX_FAILED_IDS>,
    /// Time spent checking
    pub elapsed: Micros,
    /// Global signature verified (true when the method has no signature)
    pub signature_valid: bool,
    /// At least one chunk was corrupted
    pub has_corruption: bool,
}

impl IntegrityResult {
    fn new() -> Self {
        Self {
            signature_valid: true,
            ..Self::default()
        }
    }

    /// Whether the check succeeded
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    fn record(&mut self, id: u32, outcome: Result<(), IntegrityError>) {
        self.total_chunks += 1;
        match outcome {
            Ok(()) => self.verified_chunks += 1,
            Err(IntegrityError::Corrupted) => {
                self.corrupted_chunks += 1;
                self.has_corruption = true;
                self.status = IntegrityStatus::Failed(IntegrityError::Corrupted);
                self.push_failed(id);
            }
            Err(e) => {
                self.failed_chunks += 1;
                if self.status.is_ok() {
                    self.status = IntegrityStatus::Failed(e);
                }
                self.push_failed(id);
            }
        }
    }

    fn push_failed(&mut self, id: u32) {
        // Capacity reached: further ids are counted but not listed
        let _ = self.failed_chunk_ids.push(id);
    }
}

/// Check statistics, collected by the runtime scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrityStats {
    /// Scheduled checks run
    pub total_checks: u32,
    /// Scheduled checks that passed
    pub successful_checks: u32,
    /// Scheduled checks that failed
    pub failed_checks: u32,
    /// Scheduled checks that found corruption
    pub corruption_detections: u32,
    /// Cumulative check time
    pub total_check_time_us: u64,
    /// Time of the last successful periodic full check (seconds, 0 if none)
    pub last_full_check_time: u32,
    /// Mean check time
    pub avg_check_time_us: u64,
    /// Longest check time
    pub max_check_time_us: u64,
    /// Shortest check time (0 until the first sample)
    pub min_check_time_us: u64,
}

impl IntegrityStats {
    fn record(&mut self, elapsed: Micros, outcome: Result<(), IntegrityError>) {
        let us = elapsed.as_micros();

        self.total_checks = self.total_checks.saturating_add(1);
        self.total_check_time_us = self.total_check_time_us.saturating_add(us);
        self.avg_check_time_us = self.total_check_time_us / u64::from(self.total_checks);
        self.max_check_time_us = self.max_check_time_us.max(us);
        if self.total_checks == 1 || us < self.min_check_time_us {
            self.min_check_time_us = us;
        }

        match outcome {
            Ok(()) => self.successful_checks = self.successful_checks.saturating_add(1),
            Err(e) => {
                self.failed_checks = self.failed_checks.saturating_add(1);
                if e == IntegrityError::Corrupted {
                    self.corruption_detections = self.corruption_detections.saturating_add(1);
                }
            }
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Engine state guarded by the engine mutex
struct EngineState {
    metadata: FirmwareMetadata,
    chunks: ChunkTable,
    stats: IntegrityStats,
    next_chunk: u32,
    sink: Option<Arc<dyn EventSink>>,
}

impl EngineState {
    fn notify(&self, error: IntegrityError, chunk_id: u32) {
        match error {
            IntegrityError::Corrupted => log::error!("Corruption detected in chunk {}", chunk_id),
            IntegrityError::SignatureInvalid => {
                log::error!("Invalid signature for chunk {}", chunk_id);
            }
            _ => log::warn!("Integrity event {} for chunk {}", error, chunk_id),
        }
        if let Some(sink) = &self.sink {
            sink.notify(error, chunk_id);
        }
    }
}

/// Runtime firmware integrity engine
///
/// Share it as `Arc<IntegrityEngine>` between the runtime scheduler and
/// other callers; all methods take `&self`.
pub struct IntegrityEngine {
    config: IntegrityConfig,
    crypto: Arc<dyn CryptoService>,
    flash: Arc<dyn FlashReader>,
    initialized: AtomicBool,
    scheduler_active: AtomicBool,
    truncated: bool,
    state: Mutex<EngineState>,
}

impl IntegrityEngine {
    /// Initialize the engine
    ///
    /// Reads metadata from `store`. When none exists, fresh metadata is
    /// built for the configured region, the chunk table is generated and
    /// signed, and the sealed record is written back. When stored metadata
    /// exists, the chunk table is regenerated from its geometry and must
    /// reproduce the recorded chunk count and global hash.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: configuration rejected
    /// - `MetadataInvalid`: stored metadata fails validation or its geometry
    /// - `HashMismatch`: firmware no longer matches the stored global hash
    /// - `SignatureInvalid`: signing failed or the stored global signature
    ///   does not verify
    /// - measurement failures from chunk generation
    pub fn init(
        config: IntegrityConfig,
        crypto: Arc<dyn CryptoService>,
        flash: Arc<dyn FlashReader>,
        store: &mut dyn MetadataStore,
    ) -> Result<Self, IntegrityError> {
        log::info!("Initializing integrity engine");

        config.validate().map_err(|e| {
            log::error!("Integrity configuration rejected: {}", e);
            IntegrityError::InvalidArgument
        })?;

        let (metadata, chunks) = match store.read() {
            Ok(stored) => Self::load_stored(&config, &*crypto, &*flash, stored)?,
            Err(Error::StorageNotFound) => {
                log::warn!("Integrity metadata not found, initializing");
                let (metadata, chunks) = Self::build_fresh(&config, &*crypto, &*flash)?;
                if let Err(e) = store.write(&metadata) {
                    log::warn!("Persisting integrity metadata failed: {}", e);
                }
                (metadata, chunks)
            }
            Err(e) => {
                log::error!("Reading integrity metadata failed: {}", e);
                return Err(e.into());
            }
        };

        log::info!(
            "Integrity engine initialized: firmware={} bytes, {} chunks, method={:?}",
            metadata.firmware_size,
            metadata.chunk_count,
            config.method
        );

        Ok(Self {
            config,
            crypto,
            flash,
            initialized: AtomicBool::new(true),
            scheduler_active: AtomicBool::new(false),
            truncated: chunks.is_truncated(),
            state: Mutex::new(EngineState {
                metadata,
                chunks,
                stats: IntegrityStats::default(),
                next_chunk: 0,
                sink: None,
            }),
        })
    }

    fn build_fresh(
        config: &IntegrityConfig,
        crypto: &dyn CryptoService,
        flash: &dyn FlashReader,
    ) -> Result<(FirmwareMetadata, ChunkTable), IntegrityError> {
        let mut metadata = init_metadata(
            config.firmware_start,
            config.firmware_size,
            config.chunk_size,
            config.method,
            unix_time_secs(),
        )?;

        let mut chunks = ChunkTable::partition(
            config.firmware_start,
            metadata.firmware_size,
            metadata.chunk_size,
        )?;
        chunks.measure_all(crypto, flash, config.hash_algorithm)?;
        metadata.chunk_count = chunks.len() as u32;
        metadata.global_hash = chunks.global_hash(crypto, config.hash_algorithm)?;

        if config.method.uses_signature() {
            chunks.sign_all(crypto, config.signature_key)?;
            metadata.global_signature = crypto
                .sign(config.signature_key, &metadata.global_hash)
                .map_err(|e| {
                    log::error!("Signing firmware hash failed: {}", e);
                    IntegrityError::SignatureInvalid
                })?;
        }

        metadata.seal();
        Ok((metadata, chunks))
    }

    fn load_stored(
        config: &IntegrityConfig,
        crypto: &dyn CryptoService,
        flash: &dyn FlashReader,
        metadata: FirmwareMetadata,
    ) -> Result<(FirmwareMetadata, ChunkTable), IntegrityError> {
        if !validate_metadata(&metadata) {
            log::error!("Stored integrity metadata is invalid");
            return Err(IntegrityError::MetadataInvalid);
        }

        let mut chunks = ChunkTable::partition(
            config.firmware_start,
            metadata.firmware_size,
            metadata.chunk_size,
        )
        .map_err(|_| IntegrityError::MetadataInvalid)?;

        if chunks.len() as u32 != metadata.chunk_count {
            log::error!(
                "Stored chunk count {} does not match regenerated {}",
                metadata.chunk_count,
                chunks.len()
            );
            return Err(IntegrityError::MetadataInvalid);
        }

        chunks.measure_all(crypto, flash, config.hash_algorithm)?;
        let global_hash = chunks.global_hash(crypto, config.hash_algorithm)?;
        if !ct_eq(&global_hash, &metadata.global_hash) {
            log::error!("Firmware does not match stored global hash");
            return Err(IntegrityError::HashMismatch);
        }

        if config.method.uses_signature() {
            if !verify_firmware(crypto, config.signature_key, &metadata).valid {
                log::error!("Stored firmware signature is invalid");
                return Err(IntegrityError::SignatureInvalid);
            }
            chunks.sign_all(crypto, config.signature_key)?;
        }

        Ok((metadata, chunks))
    }

    /// Shut the engine down
    ///
    /// Clears the chunk table, statistics and event sink. Later calls report
    /// `NotInitialized`. Stop any runtime scheduler first.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the engine lock is not acquired.
    pub fn deinit(&self) -> Result<(), IntegrityError> {
        let mut state = self.lock(self.config.check_lock_timeout_ms)?;
        if !self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        log::info!("Deinitializing integrity engine");
        state.chunks = ChunkTable::default();
        state.stats = IntegrityStats::default();
        state.next_chunk = 0;
        state.sink = None;
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }

    fn lock(&self, timeout_ms: u32) -> Result<MutexGuard<'_, EngineState>, IntegrityError> {
        self.state
            .try_lock_for(Millis::new(timeout_ms).as_duration())
            .ok_or_else(|| {
                log::warn!("Integrity engine lock not acquired within {} ms", timeout_ms);
                IntegrityError::Timeout
            })
    }

    fn lock_initialized(
        &self,
        timeout_ms: u32,
    ) -> Result<MutexGuard<'_, EngineState>, IntegrityError> {
        let state = self.lock(timeout_ms)?;
        if !self.initialized.load(Ordering::Acquire) {
            return Err(IntegrityError::NotInitialized);
        }
        Ok(state)
    }

    // ------------------------------------------------------------------------
    // Check family
    // ------------------------------------------------------------------------

    /// Verify one chunk
    ///
    /// On success the chunk is marked verified, its check time updated and
    /// its check counter incremented by one. No failure path touches the
    /// counter.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: `id` out of range
    /// - `MemoryError` / `FlashReadError`: the chunk could not be measured
    /// - `Corrupted`: content does not match the reference hash
    /// - `SignatureInvalid`: reference signature does not verify
    /// - `Timeout` / `NotInitialized`
    pub fn check_chunk(&self, id: u32) -> Result<(), IntegrityError> {
        let mut state = self.lock_initialized(self.config.check_lock_timeout_ms)?;
        self.check_chunk_locked(&mut state, id)
    }

    fn check_chunk_locked(&self, state: &mut EngineState, id: u32) -> Result<(), IntegrityError> {
        let chunk = *state.chunks.get(id).ok_or(IntegrityError::InvalidArgument)?;

        let digest = measure_chunk(&*self.crypto, &*self.flash, self.config.hash_algorithm, &chunk)?;

        if !ct_eq(&digest, &chunk.hash) {
            Self::mark_unverified(state, id);
            state.notify(IntegrityError::Corrupted, id);
            return Err(IntegrityError::Corrupted);
        }

        if self.config.method.uses_signature()
            && !verify_chunk(&*self.crypto, self.config.signature_key, &chunk).valid
        {
            Self::mark_unverified(state, id);
            state.notify(IntegrityError::SignatureInvalid, id);
            return Err(IntegrityError::SignatureInvalid);
        }

        if let Some(entry) = state.chunks.get_mut(id) {
            entry.is_verified = true;
            entry.last_check_time = unix_time_secs();
            entry.check_count = entry.check_count.wrapping_add(1);
        }

        log::debug!("Chunk {} verified", id);
        Ok(())
    }

    fn mark_unverified(state: &mut EngineState, id: u32) {
        if let Some(entry) = state.chunks.get_mut(id) {
            entry.is_verified = false;
        }
    }

    /// Verify every chunk and the global firmware signature
    ///
    /// A corrupted chunk fixes the status at `Corrupted`; otherwise the first
    /// failure wins. A failing global signature downgrades the status to
    /// `SignatureInvalid` unless it is already `Corrupted`.
    ///
    /// # Errors
    ///
    /// Only `Timeout` and `NotInitialized`; verification failures are
    /// reported in the result.
    pub fn check_firmware_full(&self) -> Result<IntegrityResult, IntegrityError> {
        let mut state = self.lock_initialized(self.config.check_lock_timeout_ms)?;
        Ok(self.full_check_locked(&mut state))
    }

    fn full_check_locked(&self, state: &mut EngineState) -> IntegrityResult {
        log::info!("Starting full firmware check");
        let stopwatch = Stopwatch::start();
        let mut result = IntegrityResult::new();

        let count = (state.metadata.chunk_count as usize)
            .min(state.chunks.len())
            .min(MAX_CHUNKS) as u32;
        for id in 0..count {
            let outcome = self.check_chunk_locked(state, id);
            result.record(id, outcome);
        }

        if self.config.method.uses_signature() {
            result.signature_valid =
                verify_firmware(&*self.crypto, self.config.signature_key, &state.metadata).valid;
            if !result.signature_valid
                && result.status != IntegrityStatus::Failed(IntegrityError::Corrupted)
            {
                result.status = IntegrityStatus::Failed(IntegrityError::SignatureInvalid);
            }
        }

        result.elapsed = stopwatch.elapsed();
        log::info!(
            "Full check finished: {} ({} us); chunks: {} total, {} verified, {} corrupted, {} failed",
            result.status,
            result.elapsed.as_micros(),
            result.total_chunks,
            result.verified_chunks,
            result.corrupted_chunks,
            result.failed_chunks
        );
        result
    }

    /// Verify only chunks flagged critical
    ///
    /// Same aggregation as [`check_firmware_full`](Self::check_firmware_full)
    /// without the global signature pass.
    ///
    /// # Errors
    ///
    /// Only `Timeout` and `NotInitialized`.
    pub fn check_critical_sections(&self) -> Result<IntegrityResult, IntegrityError> {
        let mut state = self.lock_initialized(self.config.check_lock_timeout_ms)?;
        Ok(self.critical_check_locked(&mut state))
    }

    fn critical_check_locked(&self, state: &mut EngineState) -> IntegrityResult {
        let stopwatch = Stopwatch::start();
        let mut result = IntegrityResult::new();

        let critical: std::vec::Vec<u32> = state
            .chunks
            .iter()
            .filter(|c| c.is_critical)
            .map(|c| c.id)
            .collect();
        for id in critical {
            let outcome = self.check_chunk_locked(state, id);
            result.record(id, outcome);
        }

        result.elapsed = stopwatch.elapsed();
        log::info!(
            "Critical check finished: {} ({} critical chunks)",
            result.status,
            result.total_chunks
        );
        result
    }

    /// Verify the next window of chunks at the persistent cursor
    ///
    /// The window is `max_concurrent_checks` chunks (fewer if the table is
    /// smaller), wrapping around the table. On success the cursor advances
    /// by the window; on the first failure the check stops and the cursor
    /// stays, so the next call retries the same position.
    ///
    /// # Errors
    ///
    /// The failing chunk's error, or `Timeout` / `NotInitialized`.
    pub fn incremental_check(&self) -> Result<(), IntegrityError> {
        let mut state = self.lock_initialized(self.config.check_lock_timeout_ms)?;
        self.incremental_locked(&mut state).map_err(|(e, _)| e)
    }

    fn incremental_locked(&self, state: &mut EngineState) -> Result<(), (IntegrityError, u32)> {
        let count = state.chunks.len() as u32;
        if count == 0 {
            return Ok(());
        }

        let window = u32::from(self.config.max_concurrent_checks).min(count);
        let cursor = state.next_chunk % count;

        for offset in 0..window {
            let id = (cursor + offset) % count;
            if let Err(e) = self.check_chunk_locked(state, id) {
                log::warn!("Incremental check failed at chunk {}: {}", id, e);
                return Err((e, id));
            }
        }

        state.next_chunk = (cursor + window) % count;
        log::debug!("Incremental check OK ({} chunks)", window);
        Ok(())
    }

    /// Current incremental cursor
    ///
    /// # Errors
    ///
    /// `Timeout` / `NotInitialized`.
    pub fn next_chunk_to_check(&self) -> Result<u32, IntegrityError> {
        Ok(self.lock_initialized(self.config.stats_lock_timeout_ms)?.next_chunk)
    }

    /// Full check reduced to its status
    #[must_use]
    pub fn emergency_check(&self) -> IntegrityStatus {
        log::warn!("Emergency integrity check requested");
        match self.check_firmware_full() {
            Ok(result) => result.status,
            Err(e) => IntegrityStatus::Failed(e),
        }
    }

    /// Check chunk 0 and exercise the hash backend
    ///
    /// # Errors
    ///
    /// The chunk check failure, or `MemoryError` if the backend cannot hash.
    pub fn self_test(&self) -> Result<(), IntegrityError> {
        log::info!("Starting integrity engine self-test");
        let mut state = self.lock_initialized(self.config.check_lock_timeout_ms)?;

        if !state.chunks.is_empty() {
            self.check_chunk_locked(&mut state, 0).map_err(|e| {
                log::error!("Self-test chunk check failed: {}", e);
                e
            })?;
        }

        self.crypto
            .hash(self.config.hash_algorithm, SELF_TEST_VECTOR)
            .map_err(|e| {
                log::error!("Self-test hash failed: {}", e);
                IntegrityError::MemoryError
            })?;

        log::info!("Integrity engine self-test passed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Scheduler entry points
    // ------------------------------------------------------------------------

    /// One scheduler cycle: an incremental check timed into the statistics
    ///
    /// Returns `Timeout` without touching any state when the lock is not
    /// acquired within `lock_timeout`. Failures that the chunk check did not
    /// already report (read, memory) are sent to the event sink with the
    /// failing chunk id.
    pub(crate) fn scheduled_incremental(&self, lock_timeout: Millis) -> Result<(), IntegrityError> {
        let mut state = self.lock_initialized(lock_timeout.as_millis())?;

        let stopwatch = Stopwatch::start();
        let outcome = self.incremental_locked(&mut state);
        let elapsed = stopwatch.elapsed();

        let outcome = outcome.map_err(|(e, id)| {
            if !e.is_tamper() {
                state.notify(e, id);
            }
            e
        });
        state.stats.record(elapsed, outcome);
        outcome
    }

    /// Periodic full check
    ///
    /// Records the completion time when it passes.
    pub(crate) fn scheduled_full_check(&self) -> IntegrityStatus {
        let mut state = match self.lock_initialized(self.config.check_lock_timeout_ms) {
            Ok(state) => state,
            Err(e) => return IntegrityStatus::Failed(e),
        };

        let result = self.full_check_locked(&mut state);

        if result.is_ok() {
            state.stats.last_full_check_time = unix_time_secs();
        } else if result.has_corruption {
            state.stats.corruption_detections = state.stats.corruption_detections.saturating_add(1);
        }
        result.status
    }

    /// Claim the engine for a runtime scheduler; `false` if one already runs
    pub(crate) fn claim_scheduler(&self) -> bool {
        self.scheduler_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_scheduler(&self) {
        self.scheduler_active.store(false, Ordering::Release);
    }

    /// Whether a runtime scheduler is attached
    #[must_use]
    pub fn has_scheduler(&self) -> bool {
        self.scheduler_active.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Statistics and callbacks
    // ------------------------------------------------------------------------

    /// Snapshot of the statistics
    ///
    /// # Errors
    ///
    /// `Timeout` / `NotInitialized`.
    pub fn get_statistics(&self) -> Result<IntegrityStats, IntegrityError> {
        Ok(self.lock_initialized(self.config.stats_lock_timeout_ms)?.stats)
    }

    /// Zero the statistics
    ///
    /// # Errors
    ///
    /// `Timeout` / `NotInitialized`.
    pub fn reset_statistics(&self) -> Result<(), IntegrityError> {
        self.lock_initialized(self.config.stats_lock_timeout_ms)?.stats = IntegrityStats::default();
        Ok(())
    }

    /// Register the event sink, replacing any previous one
    ///
    /// # Errors
    ///
    /// `Timeout` / `NotInitialized`.
    pub fn register_callback(&self, sink: Arc<dyn EventSink>) -> Result<(), IntegrityError> {
        let mut state = self.lock_initialized(self.config.stats_lock_timeout_ms)?;
        if state.sink.replace(sink).is_some() {
            log::debug!("Replaced previously registered integrity event sink");
        }
        Ok(())
    }

    /// Remove the event sink
    ///
    /// # Errors
    ///
    /// `Timeout` / `NotInitialized`.
    pub fn unregister_callback(&self) -> Result<(), IntegrityError> {
        self.lock_initialized(self.config.stats_lock_timeout_ms)?.sink = None;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Engine configuration
    #[must_use]
    pub const fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    /// Whether the engine is initialized
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether the firmware exceeded the chunk capacity
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of chunks
    ///
    /// # Errors
    ///
    /// `Timeout` / `NotInitialized`.
    pub fn chunk_count(&self) -> Result<u32, IntegrityError> {
        Ok(self.lock_initialized(self.config.stats_lock_timeout_ms)?.chunks.len() as u32)
    }

    /// Copy of one chunk's record
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range id, or `Timeout` /
    /// `NotInitialized`.
    pub fn chunk_info(&self, id: u32) -> Result<ChunkInfo, IntegrityError> {
        self.lock_initialized(self.config.stats_lock_timeout_ms)?
            .chunks
            .get(id)
            .copied()
            .ok_or(IntegrityError::InvalidArgument)
    }

    /// Copy of the metadata
    ///
    /// # Errors
    ///
    /// `Timeout` / `NotInitialized`.
    pub fn metadata(&self) -> Result<FirmwareMetadata, IntegrityError> {
        Ok(self.lock_initialized(self.config.stats_lock_timeout_ms)?.metadata)
    }

    /// Override a chunk's verified flag
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range id, or `Timeout` /
    /// `NotInitialized`.
    pub fn update_chunk_status(&self, id: u32, verified: bool) -> Result<(), IntegrityError> {
        let mut state = self.lock_initialized(self.config.stats_lock_timeout_ms)?;
        let chunk = state.chunks.get_mut(id).ok_or(IntegrityError::InvalidArgument)?;
        chunk.is_verified = verified;
        Ok(())
    }

    /// Log engine information and statistics
    pub fn log_summary(&self) {
        let state = match self.lock_initialized(self.config.stats_lock_timeout_ms) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Integrity summary unavailable: {}", e);
                return;
            }
        };

        let verified = state.chunks.iter().filter(|c| c.is_verified).count();
        let stats = state.stats;
        log::info!("=== Integrity engine ===");
        log::info!(
            "Firmware: {} bytes, {} chunks of {} bytes{}",
            state.metadata.firmware_size,
            state.chunks.len(),
            state.metadata.chunk_size,
            if self.truncated { " (truncated)" } else { "" }
        );
        log::info!("Method: {:?}, verified chunks: {}", self.config.method, verified);
        log::info!(
            "Checks: {} total, {} ok, {} failed, {} corruptions",
            stats.total_checks,
            stats.successful_checks,
            stats.failed_checks,
            stats.corruption_detections
        );
        log::info!(
            "Check time: avg {} us, min {} us, max {} us",
            stats.avg_check_time_us,
            stats.min_check_time_us,
            stats.max_check_time_us
        );
    }
}

/// Constant-time digest comparison
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemFlash, MemMetadataStore, MockCrypto, RecordingSink};
    use q_common::VerificationMethod;

    const BASE: u32 = 0x1_0000;

    struct Fixture {
        crypto: Arc<MockCrypto>,
        flash: Arc<MemFlash>,
        store: MemMetadataStore,
        engine: IntegrityEngine,
    }

    fn config(size: u32, method: VerificationMethod) -> IntegrityConfig {
        let mut config = IntegrityConfig::for_region(BASE, size);
        config.method = method;
        config
    }

    fn fixture_with(config: IntegrityConfig) -> Fixture {
        let crypto = Arc::new(MockCrypto::new());
        let flash = Arc::new(MemFlash::with_pattern(BASE, config.firmware_size as usize));
        let mut store = MemMetadataStore::new();
        let engine = IntegrityEngine::init(config, crypto.clone(), flash.clone(), &mut store).unwrap();
        Fixture {
            crypto,
            flash,
            store,
            engine,
        }
    }

    fn fixture(size: u32) -> Fixture {
        fixture_with(config(size, VerificationMethod::Hybrid))
    }

    #[test]
    fn test_init_builds_and_persists_metadata() {
        let f = fixture(10_000);
        let metadata = f.engine.metadata().unwrap();

        assert!(validate_metadata(&metadata));
        assert_eq!(metadata.chunk_count, 3);
        assert_eq!(f.engine.chunk_count().unwrap(), 3);
        assert_eq!(f.store.writes(), 1);
        assert_eq!(f.store.stored(), Some(metadata));
        assert!(!f.engine.is_truncated());
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let crypto = Arc::new(MockCrypto::new());
        let flash = Arc::new(MemFlash::with_pattern(BASE, 100));
        let mut cfg = config(100, VerificationMethod::Hash);
        cfg.max_concurrent_checks = 0;

        let result = IntegrityEngine::init(cfg, crypto, flash, &mut MemMetadataStore::new());
        assert_eq!(result.err(), Some(IntegrityError::InvalidArgument));
    }

    #[test]
    fn test_check_chunk_increments_counter() {
        let f = fixture(10_000);

        f.engine.check_chunk(1).unwrap();
        f.engine.check_chunk(1).unwrap();

        let chunk = f.engine.chunk_info(1).unwrap();
        assert_eq!(chunk.check_count, 2);
        assert!(chunk.is_verified);
        assert_eq!(f.engine.chunk_info(0).unwrap().check_count, 0);
    }

    #[test]
    fn test_check_chunk_out_of_range() {
        let f = fixture(10_000);
        assert_eq!(f.engine.check_chunk(3), Err(IntegrityError::InvalidArgument));
    }

    #[test]
    fn test_check_chunk_corruption_notifies_once() {
        let f = fixture(10_000);
        let sink = Arc::new(RecordingSink::new());
        f.engine.register_callback(sink.clone()).unwrap();

        f.flash.corrupt(BASE + 4096 + 7);
        assert_eq!(f.engine.check_chunk(1), Err(IntegrityError::Corrupted));

        let chunk = f.engine.chunk_info(1).unwrap();
        assert_eq!(chunk.check_count, 0);
        assert!(!chunk.is_verified);
        assert_eq!(sink.events(), [(IntegrityError::Corrupted, 1)]);
    }

    #[test]
    fn test_check_chunk_bad_signature() {
        let f = fixture(10_000);
        let sink = Arc::new(RecordingSink::new());
        f.engine.register_callback(sink.clone()).unwrap();

        f.crypto.fail_verify(true);
        assert_eq!(f.engine.check_chunk(0), Err(IntegrityError::SignatureInvalid));
        assert_eq!(f.engine.chunk_info(0).unwrap().check_count, 0);
        assert_eq!(sink.events(), [(IntegrityError::SignatureInvalid, 0)]);
    }

    #[test]
    fn test_hash_method_skips_signature() {
        let f = fixture_with(config(10_000, VerificationMethod::Hash));
        f.crypto.fail_verify(true);

        assert_eq!(f.engine.check_chunk(0), Ok(()));
        let result = f.engine.check_firmware_full().unwrap();
        assert!(result.is_ok());
        assert!(result.signature_valid);
    }

    #[test]
    fn test_mac_method_checks_hash_only() {
        let f = fixture_with(config(10_000, VerificationMethod::Mac));
        f.crypto.fail_verify(true);

        assert_eq!(f.engine.check_chunk(2), Ok(()));
        f.flash.corrupt(BASE);
        assert_eq!(f.engine.check_chunk(0), Err(IntegrityError::Corrupted));
    }

    #[test]
    fn test_check_chunk_flash_failure() {
        let f = fixture(10_000);
        let sink = Arc::new(RecordingSink::new());
        f.engine.register_callback(sink.clone()).unwrap();

        f.flash.fail_reads(true);
        assert_eq!(f.engine.check_chunk(0), Err(IntegrityError::FlashReadError));
        assert_eq!(sink.count(), 0);
        assert_eq!(f.engine.chunk_info(0).unwrap().check_count, 0);
    }

    #[test]
    fn test_check_chunk_hash_backend_failure() {
        let f = fixture(10_000);
        f.crypto.fail_hash(true);
        assert_eq!(f.engine.check_chunk(0), Err(IntegrityError::MemoryError));
    }

    #[test]
    fn test_full_check_clean() {
        let f = fixture(10_000);
        let result = f.engine.check_firmware_full().unwrap();

        assert!(result.is_ok());
        assert_eq!(result.total_chunks, 3);
        assert_eq!(result.verified_chunks, 3);
        assert!(result.signature_valid);
        assert!(result.failed_chunk_ids.is_empty());
    }

    #[test]
    fn test_full_check_corruption_wins_over_later_failures() {
        let f = fixture(5 * 4096);
        f.flash.corrupt(BASE + 10);
        f.crypto.fail_verify(true);

        // Chunk 0 is corrupted, chunks 1..5 then fail their signatures
        let result = f.engine.check_firmware_full().unwrap();
        assert_eq!(result.status, IntegrityStatus::Failed(IntegrityError::Corrupted));
        assert_eq!(result.corrupted_chunks, 1);
        assert_eq!(result.failed_chunks, 4);
        assert!(result.has_corruption);
    }

    #[test]
    fn test_full_check_signature_downgrade() {
        let f = fixture(10_000);
        f.crypto.fail_verify(true);

        let result = f.engine.check_firmware_full().unwrap();
        assert_eq!(result.status, IntegrityStatus::Failed(IntegrityError::SignatureInvalid));
        assert!(!result.signature_valid);
        assert_eq!(result.failed_chunks, 3);
    }

    #[test]
    fn test_full_check_signature_keeps_corruption() {
        let f = fixture(10_000);
        f.flash.corrupt(BASE + 9000);
        f.crypto.fail_verify(true);

        let result = f.engine.check_firmware_full().unwrap();
        assert_eq!(result.status, IntegrityStatus::Failed(IntegrityError::Corrupted));
        assert_eq!(result.corrupted_chunks, 1);
        assert_eq!(result.failed_chunks, 2);
        assert_eq!(result.failed_chunk_ids.as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn test_full_check_failed_ids_capped() {
        let mut cfg = config(40 * 64, VerificationMethod::Hash);
        cfg.chunk_size = 64;
        let f = fixture_with(cfg);
        f.flash.fail_reads(true);

        let result = f.engine.check_firmware_full().unwrap();
        assert_eq!(result.failed_chunks, 40);
        assert_eq!(result.failed_chunk_ids.len(), MAX_FAILED_IDS);
        assert_eq!(result.status, IntegrityStatus::Failed(IntegrityError::FlashReadError));
    }

    #[test]
    fn test_critical_sections_only_first_four() {
        let mut cfg = config(10 * 512, VerificationMethod::Hybrid);
        cfg.chunk_size = 512;
        let f = fixture_with(cfg);
        f.flash.corrupt(BASE + 6 * 512);

        let result = f.engine.check_critical_sections().unwrap();
        assert!(result.is_ok());
        assert_eq!(result.total_chunks, 4);
        assert_eq!(f.engine.chunk_info(6).unwrap().check_count, 0);
    }

    #[test]
    fn test_incremental_advances_cursor() {
        let f = fixture(5 * 4096);

        f.engine.incremental_check().unwrap();
        assert_eq!(f.engine.next_chunk_to_check().unwrap(), 2);
        f.engine.incremental_check().unwrap();
        assert_eq!(f.engine.next_chunk_to_check().unwrap(), 4);
        f.engine.incremental_check().unwrap();
        assert_eq!(f.engine.next_chunk_to_check().unwrap(), 1);
    }

    #[test]
    fn test_incremental_failure_keeps_cursor() {
        let f = fixture(5 * 4096);
        f.engine.incremental_check().unwrap();

        // Window [2, 3]: chunk 2 fails, chunk 3 is not checked
        f.flash.corrupt(BASE + 2 * 4096);
        assert_eq!(f.engine.incremental_check(), Err(IntegrityError::Corrupted));
        assert_eq!(f.engine.next_chunk_to_check().unwrap(), 2);
        assert_eq!(f.engine.chunk_info(3).unwrap().check_count, 0);

        assert_eq!(f.engine.incremental_check(), Err(IntegrityError::Corrupted));
        assert_eq!(f.engine.next_chunk_to_check().unwrap(), 2);
    }

    #[test]
    fn test_incremental_window_larger_than_table() {
        let mut cfg = config(1000, VerificationMethod::Hash);
        cfg.max_concurrent_checks = 8;
        let f = fixture_with(cfg);

        f.engine.incremental_check().unwrap();
        assert_eq!(f.engine.chunk_info(0).unwrap().check_count, 1);
        assert_eq!(f.engine.next_chunk_to_check().unwrap(), 0);
    }

    #[test]
    fn test_empty_firmware() {
        let f = fixture_with(config(0, VerificationMethod::Hash));

        assert_eq!(f.engine.chunk_count().unwrap(), 0);
        assert_eq!(f.engine.incremental_check(), Ok(()));
        assert!(f.engine.check_firmware_full().unwrap().is_ok());
        assert_eq!(f.engine.self_test(), Ok(()));
    }

    #[test]
    fn test_lock_timeout_leaves_state() {
        let mut cfg = config(10_000, VerificationMethod::Hybrid);
        cfg.check_lock_timeout_ms = 10;
        cfg.stats_lock_timeout_ms = 10;
        let f = fixture_with(cfg);

        f.engine.scheduled_incremental(Millis::new(100)).unwrap();
        f.engine.check_chunk(0).unwrap();
        let chunks_before: std::vec::Vec<ChunkInfo> =
            (0..3).map(|id| f.engine.chunk_info(id).unwrap()).collect();
        let cursor_before = f.engine.next_chunk_to_check().unwrap();
        let stats_before = f.engine.get_statistics().unwrap();

        let guard = f.engine.state.lock();
        assert_eq!(f.engine.lock(10).err(), Some(IntegrityError::Timeout));
        assert_eq!(
            f.engine.check_firmware_full().err(),
            Some(IntegrityError::Timeout)
        );
        assert_eq!(
            f.engine.check_critical_sections().err(),
            Some(IntegrityError::Timeout)
        );
        assert_eq!(f.engine.check_chunk(0), Err(IntegrityError::Timeout));
        assert_eq!(f.engine.incremental_check(), Err(IntegrityError::Timeout));
        assert_eq!(
            f.engine.scheduled_incremental(Millis::new(5)),
            Err(IntegrityError::Timeout)
        );
        assert_eq!(f.engine.get_statistics().err(), Some(IntegrityError::Timeout));
        assert_eq!(f.engine.reset_statistics(), Err(IntegrityError::Timeout));
        drop(guard);

        let chunks_after: std::vec::Vec<ChunkInfo> =
            (0..3).map(|id| f.engine.chunk_info(id).unwrap()).collect();
        assert_eq!(chunks_after, chunks_before);
        assert_eq!(f.engine.next_chunk_to_check().unwrap(), cursor_before);
        assert_eq!(f.engine.get_statistics().unwrap(), stats_before);
    }

    #[test]
    fn test_scheduled_incremental_records_stats() {
        let f = fixture(10_000);
        let sink = Arc::new(RecordingSink::new());
        f.engine.register_callback(sink.clone()).unwrap();

        f.engine.scheduled_incremental(Millis::new(100)).unwrap();
        f.flash.fail_reads(true);
        let _ = f.engine.scheduled_incremental(Millis::new(100));

        let stats = f.engine.get_statistics().unwrap();
        assert_eq!(stats.total_checks, 2);
        assert_eq!(stats.successful_checks, 1);
        assert_eq!(stats.failed_checks, 1);
        assert!(stats.max_check_time_us >= stats.min_check_time_us);
        assert_eq!(sink.events(), [(IntegrityError::FlashReadError, 2)]);

        f.engine.reset_statistics().unwrap();
        assert_eq!(f.engine.get_statistics().unwrap(), IntegrityStats::default());
    }

    #[test]
    fn test_scheduled_corruption_counts_once() {
        let f = fixture(10_000);
        let sink = Arc::new(RecordingSink::new());
        f.engine.register_callback(sink.clone()).unwrap();
        f.flash.corrupt(BASE);

        assert_eq!(
            f.engine.scheduled_incremental(Millis::new(100)),
            Err(IntegrityError::Corrupted)
        );
        assert_eq!(f.engine.get_statistics().unwrap().corruption_detections, 1);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_scheduled_full_check_records_time() {
        let f = fixture(10_000);
        assert!(f.engine.scheduled_full_check().is_ok());
        assert!(f.engine.get_statistics().unwrap().last_full_check_time > 0);
    }

    #[test]
    fn test_callback_last_registration_wins() {
        let f = fixture(10_000);
        let first = Arc::new(RecordingSink::new());
        let second = Arc::new(RecordingSink::new());
        f.engine.register_callback(first.clone()).unwrap();
        f.engine.register_callback(second.clone()).unwrap();

        f.flash.corrupt(BASE);
        let _ = f.engine.check_chunk(0);
        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 1);

        f.engine.unregister_callback().unwrap();
        let _ = f.engine.check_chunk(0);
        assert_eq!(second.count(), 1);
    }

    #[test]
    fn test_update_chunk_status() {
        let f = fixture(10_000);
        f.engine.update_chunk_status(2, true).unwrap();
        assert!(f.engine.chunk_info(2).unwrap().is_verified);
        assert_eq!(
            f.engine.update_chunk_status(9, true),
            Err(IntegrityError::InvalidArgument)
        );
    }

    #[test]
    fn test_self_test_and_emergency() {
        let f = fixture(10_000);
        assert_eq!(f.engine.self_test(), Ok(()));
        assert!(f.engine.emergency_check().is_ok());

        f.crypto.fail_hash(true);
        assert_eq!(f.engine.self_test(), Err(IntegrityError::MemoryError));
    }

    #[test]
    fn test_deinit() {
        let f = fixture(10_000);
        f.engine.deinit().unwrap();

        assert!(!f.engine.is_initialized());
        assert_eq!(f.engine.check_chunk(0), Err(IntegrityError::NotInitialized));
        assert_eq!(
            f.engine.check_firmware_full().err(),
            Some(IntegrityError::NotInitialized)
        );
        assert_eq!(f.engine.get_statistics().err(), Some(IntegrityError::NotInitialized));
        assert_eq!(f.engine.deinit(), Ok(()));
    }

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!ct_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!ct_eq(&[1, 2], &[1, 2, 3]));
    }
}
