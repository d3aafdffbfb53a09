// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-integrity
//!
//! Exercise the engine end to end with in-memory collaborators: chunk
//! layout, corruption reporting, restart from stored metadata, the
//! incremental cursor and the runtime scheduler under contention.

use std::sync::Arc;

use q_common::{IntegrityConfig, VerificationMethod};
use q_integrity::mock::{MemFlash, MemMetadataStore, MockCrypto, RecordingSink};
use q_integrity::{IntegrityEngine, IntegrityError, IntegrityStatus};

const BASE: u32 = 0x0800_0000;

struct Device {
    crypto: Arc<MockCrypto>,
    flash: Arc<MemFlash>,
    store: MemMetadataStore,
}

impl Device {
    fn new(size: u32) -> Self {
        Self {
            crypto: Arc::new(MockCrypto::new()),
            flash: Arc::new(MemFlash::with_pattern(BASE, size as usize)),
            store: MemMetadataStore::new(),
        }
    }

    fn boot(&mut self, config: IntegrityConfig) -> Result<IntegrityEngine, IntegrityError> {
        IntegrityEngine::init(
            config,
            self.crypto.clone(),
            self.flash.clone(),
            &mut self.store,
        )
    }
}

fn region(size: u32) -> IntegrityConfig {
    IntegrityConfig::for_region(BASE, size)
}

mod scenario_tests {
    use super::*;

    #[test]
    fn test_scenario_a_chunk_layout() {
        let mut device = Device::new(10_000);
        let engine = device.boot(region(10_000)).unwrap();

        assert_eq!(engine.chunk_count().unwrap(), 3);
        let sizes: Vec<u32> = (0..3).map(|id| engine.chunk_info(id).unwrap().size).collect();
        assert_eq!(sizes, [4096, 4096, 1808]);
        assert!((0..3).all(|id| engine.chunk_info(id).unwrap().is_critical));
    }

    #[test]
    fn test_scenario_b_single_corrupted_chunk() {
        let mut device = Device::new(10_000);
        let engine = device.boot(region(10_000)).unwrap();

        device.flash.corrupt(BASE + 4096 + 100);
        let result = engine.check_firmware_full().unwrap();

        assert_eq!(result.status, IntegrityStatus::Failed(IntegrityError::Corrupted));
        assert_eq!(result.corrupted_chunks, 1);
        assert_eq!(result.failed_chunk_ids.as_slice(), &[1]);
        assert!(result.has_corruption);
        assert_eq!(result.verified_chunks, 2);
    }

    #[test]
    fn test_full_check_counts_are_consistent() {
        let mut config = region(20 * 256);
        config.chunk_size = 256;
        let mut device = Device::new(20 * 256);
        let engine = device.boot(config).unwrap();

        for id in [2u32, 5, 11, 17] {
            device.flash.corrupt(BASE + id * 256 + 3);
        }
        let result = engine.check_firmware_full().unwrap();

        assert_eq!(
            result.verified_chunks + result.corrupted_chunks + result.failed_chunks,
            result.total_chunks
        );
        assert_eq!(
            result.failed_chunk_ids.len() as u32,
            (result.corrupted_chunks + result.failed_chunks).min(16)
        );
        assert_eq!(result.failed_chunk_ids.as_slice(), &[2, 5, 11, 17]);
    }

    #[test]
    fn test_truncated_firmware_is_observable() {
        let mut config = region(300 * 64);
        config.chunk_size = 64;
        let mut device = Device::new(300 * 64);
        let engine = device.boot(config).unwrap();

        assert!(engine.is_truncated());
        assert_eq!(engine.chunk_count().unwrap(), 256);

        // Bytes past the last chunk are not verified
        device.flash.corrupt(BASE + 280 * 64);
        assert!(engine.check_firmware_full().unwrap().is_ok());
    }
}

mod chunk_check_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_any_flipped_byte_is_corruption(offset in 0u32..10_000) {
            let mut device = Device::new(10_000);
            let engine = device.boot(region(10_000)).unwrap();
            let sink = Arc::new(RecordingSink::new());
            engine.register_callback(sink.clone()).unwrap();

            let id = offset / 4096;
            let before = engine.chunk_info(id).unwrap().check_count;
            device.flash.corrupt(BASE + offset);

            prop_assert_eq!(engine.check_chunk(id), Err(IntegrityError::Corrupted));
            prop_assert_eq!(sink.count(), 1);
            prop_assert_eq!(engine.chunk_info(id).unwrap().check_count, before);
        }

        #[test]
        fn prop_clean_check_increments_once(id in 0u32..3, repeats in 1u32..5) {
            let mut device = Device::new(10_000);
            let engine = device.boot(region(10_000)).unwrap();

            for _ in 0..repeats {
                prop_assert_eq!(engine.check_chunk(id), Ok(()));
            }
            prop_assert_eq!(engine.chunk_info(id).unwrap().check_count, repeats);
        }
    }

    #[test]
    fn test_restored_byte_verifies_again() {
        let mut device = Device::new(10_000);
        let engine = device.boot(region(10_000)).unwrap();

        device.flash.corrupt(BASE + 5);
        assert_eq!(engine.check_chunk(0), Err(IntegrityError::Corrupted));
        device.flash.corrupt(BASE + 5);
        assert_eq!(engine.check_chunk(0), Ok(()));
        assert!(engine.chunk_info(0).unwrap().is_verified);
    }
}

mod incremental_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_cursor_advances_or_stays(
            chunks in 1u32..12,
            window in 1u8..6,
            steps in 0u32..6,
            fail_offset in 0u32..6,
        ) {
            let mut config = region(chunks * 128);
            config.chunk_size = 128;
            config.max_concurrent_checks = window;
            config.method = VerificationMethod::Hash;
            let mut device = Device::new(chunks * 128);
            let engine = device.boot(config).unwrap();

            let w = u32::from(window).min(chunks);
            for _ in 0..steps {
                let k = engine.next_chunk_to_check().unwrap();
                prop_assert_eq!(engine.incremental_check(), Ok(()));
                prop_assert_eq!(engine.next_chunk_to_check().unwrap(), (k + w) % chunks);
            }

            let k = engine.next_chunk_to_check().unwrap();
            let j = fail_offset % w;
            let failing = (k + j) % chunks;
            device.flash.corrupt(BASE + failing * 128);

            prop_assert_eq!(engine.incremental_check(), Err(IntegrityError::Corrupted));
            prop_assert_eq!(engine.next_chunk_to_check().unwrap(), k);
        }
    }
}

mod restart_tests {
    use super::*;

    #[test]
    fn test_restart_reuses_stored_metadata() {
        let mut device = Device::new(10_000);
        let first = device.boot(region(10_000)).unwrap().metadata().unwrap();

        let engine = device.boot(region(10_000)).unwrap();
        assert_eq!(engine.metadata().unwrap(), first);
        assert_eq!(device.store.writes(), 1);
        assert!(engine.check_firmware_full().unwrap().is_ok());
    }

    #[test]
    fn test_restart_detects_modified_firmware() {
        let mut device = Device::new(10_000);
        device.boot(region(10_000)).unwrap();

        device.flash.corrupt(BASE + 9_999);
        assert_eq!(
            device.boot(region(10_000)).err(),
            Some(IntegrityError::HashMismatch)
        );
    }

    #[test]
    fn test_restart_rejects_tampered_metadata() {
        let mut device = Device::new(10_000);
        device.boot(region(10_000)).unwrap();

        if let Some(raw) = device.store.raw_mut() {
            raw[8] ^= 0x01;
        }
        assert_eq!(
            device.boot(region(10_000)).err(),
            Some(IntegrityError::MetadataInvalid)
        );
    }

    #[test]
    fn test_restart_rejects_changed_geometry() {
        let mut device = Device::new(10_000);
        device.boot(region(10_000)).unwrap();

        let mut metadata = device.store.stored().unwrap();
        metadata.chunk_count = 4;
        metadata.seal();
        device.store = MemMetadataStore::with_metadata(&metadata);

        assert_eq!(
            device.boot(region(10_000)).err(),
            Some(IntegrityError::MetadataInvalid)
        );
    }

    #[test]
    fn test_restart_rejects_unsigned_metadata_for_signature_method() {
        let mut device = Device::new(10_000);
        let mut config = region(10_000);
        config.method = VerificationMethod::Hash;
        device.boot(config).unwrap();

        assert_eq!(
            device.boot(region(10_000)).err(),
            Some(IntegrityError::SignatureInvalid)
        );
    }

    #[test]
    fn test_store_read_failure_is_fatal() {
        let mut device = Device::new(10_000);
        device.store.fail_reads(true);

        assert_eq!(
            device.boot(region(10_000)).err(),
            Some(IntegrityError::FlashReadError)
        );
    }

    #[test]
    fn test_store_write_failure_is_tolerated() {
        let mut device = Device::new(10_000);
        device.store.fail_writes(true);

        let engine = device.boot(region(10_000)).unwrap();
        assert!(engine.check_firmware_full().unwrap().is_ok());
        assert_eq!(device.store.writes(), 0);
    }

    #[test]
    fn test_signing_failure_is_fatal() {
        let mut device = Device::new(10_000);
        device.crypto.fail_sign(true);

        assert_eq!(
            device.boot(region(10_000)).err(),
            Some(IntegrityError::SignatureInvalid)
        );
    }
}

mod concurrency_tests {
    use super::*;
    use q_common::RuntimeConfig;
    use q_integrity::RuntimeScheduler;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_scheduler_and_callers_share_engine() {
        let mut config = region(16 * 1024);
        config.chunk_size = 1024;
        let mut device = Device::new(16 * 1024);
        let engine = Arc::new(device.boot(config).unwrap());

        let runtime = RuntimeConfig {
            check_interval_ms: 1,
            lock_timeout_ms: 100,
            full_check_every: 5,
        };
        let mut scheduler = RuntimeScheduler::start(engine.clone(), runtime).unwrap();

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    (0..10)
                        .map(|_| engine.check_firmware_full().unwrap().is_ok())
                        .all(|ok| ok)
                })
            })
            .collect();
        for caller in callers {
            assert!(caller.join().unwrap());
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        let settled = || {
            scheduler.cycles() >= 10
                && engine.get_statistics().is_ok_and(|s| s.successful_checks > 0)
        };
        while !settled() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        scheduler.stop();

        let stats = engine.get_statistics().unwrap();
        assert_eq!(stats.failed_checks, 0);
        assert!(stats.successful_checks > 0);
        assert!(stats.min_check_time_us <= stats.avg_check_time_us);
        assert!(stats.avg_check_time_us <= stats.max_check_time_us);
    }

    #[test]
    fn test_scheduler_reports_corruption_to_sink() {
        let mut config = region(4 * 1024);
        config.chunk_size = 1024;
        let mut device = Device::new(4 * 1024);
        let engine = Arc::new(device.boot(config).unwrap());
        let sink = Arc::new(RecordingSink::new());
        engine.register_callback(sink.clone()).unwrap();

        device.flash.corrupt(BASE + 3 * 1024);
        let runtime = RuntimeConfig {
            check_interval_ms: 1,
            lock_timeout_ms: 100,
            full_check_every: 0,
        };
        let scheduler = RuntimeScheduler::start(engine.clone(), runtime).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.count() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        drop(scheduler);

        // The cursor stays on the failing window, so chunk 3 is retried
        assert!(sink.events().iter().all(|&(e, id)| e == IntegrityError::Corrupted && id == 3));
        assert!(engine.get_statistics().unwrap().corruption_detections >= 2);
        assert_eq!(engine.next_chunk_to_check().unwrap(), 2);
    }
}
