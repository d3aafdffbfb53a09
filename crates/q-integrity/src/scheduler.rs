// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Runtime verification scheduler
//!
//! A background thread drives the engine: each cycle it tries to take the
//! engine lock for a short bounded wait and, if it gets it, runs one
//! incremental check timed into the engine statistics. A busy engine skips
//! the cycle. Every `full_check_every` cycles a full check runs as well.
//! An engine accepts one scheduler at a time.
//!
//! The thread waits on its stop channel for the cycle interval, so one
//! periodic trigger both paces the cycles and wakes the thread for
//! shutdown. [`RuntimeScheduler::stop`] (or dropping the scheduler) joins
//! the thread before returning.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use q_common::time::Millis;
use q_common::{Error, RuntimeConfig};

use crate::engine::IntegrityEngine;
use crate::error::IntegrityError;

/// Name of the background thread
const THREAD_NAME: &str = "integrity-check";

/// Handle to a running background scheduler
pub struct RuntimeScheduler {
    engine: Arc<IntegrityEngine>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    cycles: Arc<AtomicU32>,
}

impl RuntimeScheduler {
    /// Start the background thread
    ///
    /// # Errors
    ///
    /// - `InvalidParameter`: runtime configuration rejected
    /// - `NotPermitted`: runtime checks disabled in the engine configuration
    /// - `NotInitialized`: engine not initialized
    /// - `Busy`: another scheduler is already running on the engine
    /// - `MemoryAllocationFailed`: the thread could not be spawned
    pub fn start(engine: Arc<IntegrityEngine>, config: RuntimeConfig) -> Result<Self, Error> {
        config.validate()?;
        if !engine.config().enable_runtime_check {
            log::warn!("Runtime integrity checking disabled by configuration");
            return Err(Error::NotPermitted);
        }
        if !engine.is_initialized() {
            return Err(Error::NotInitialized);
        }
        if !engine.claim_scheduler() {
            log::warn!("Runtime integrity checking already active");
            return Err(Error::Busy);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let cycles = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&cycles);
        let worker = Arc::clone(&engine);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                let interval = Duration::from_millis(u64::from(config.check_interval_ms));
                let lock_timeout = Millis::new(config.lock_timeout_ms);

                log::info!(
                    "Runtime integrity checking started (interval {} ms)",
                    config.check_interval_ms
                );

                loop {
                    if !run_cycle(&worker, &config, lock_timeout, &counter) {
                        break;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                log::info!("Runtime integrity checking stopped");
            })
            .map_err(|e| {
                log::error!("Spawning integrity thread failed: {}", e);
                engine.release_scheduler();
                Error::MemoryAllocationFailed
            })?;

        Ok(Self {
            engine,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            cycles,
        })
    }

    /// Whether the background thread is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Number of completed cycles
    #[must_use]
    pub fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Stop the background thread and wait for it to exit
    ///
    /// An in-flight check runs to completion first. The engine then accepts
    /// a new scheduler. Calling `stop` again is a no-op.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already have exited on its own
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Integrity thread panicked");
            }
            self.engine.release_scheduler();
        }
    }
}

impl Drop for RuntimeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One scheduler cycle; returns `false` when the thread should exit
fn run_cycle(
    engine: &IntegrityEngine,
    config: &RuntimeConfig,
    lock_timeout: Millis,
    counter: &AtomicU32,
) -> bool {
    match engine.scheduled_incremental(lock_timeout) {
        Ok(()) => {}
        Err(IntegrityError::Timeout) => log::debug!("Integrity cycle skipped: engine busy"),
        Err(IntegrityError::NotInitialized) => {
            log::warn!("Integrity engine deinitialized, stopping runtime checks");
            return false;
        }
        Err(e) => log::warn!("Incremental integrity check failed: {}", e),
    }

    let cycle = counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1);

    if config.full_check_every != 0 && cycle % config.full_check_every == 0 {
        log::info!("Periodic full integrity check (cycle {})", cycle);
        let status = engine.scheduled_full_check();
        if !status.is_ok() {
            log::warn!("Periodic full integrity check failed: {}", status);
        }
    }

    true
}
