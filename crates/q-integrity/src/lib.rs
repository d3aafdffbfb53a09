// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-INTEGRITY for Qbitel EdgeOS
//!
//! Runtime firmware integrity verification:
//!
//! - **Metadata**: Sealed description of the firmware image
//! - **Chunk**: Partitioning of the image into verifiable chunks
//! - **Verifier**: Signature checks through the crypto backend
//! - **Engine**: Full, critical-only, per-chunk and incremental checks
//! - **Scheduler**: Background incremental verification with latency stats
//!
//! The crypto backend, flash, metadata storage and event delivery are
//! collaborators injected through the traits in [`traits`].
//!
//! # Features
//!
//! - `mock`: In-memory collaborators for host testing

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod traits;
pub mod metadata;
pub mod chunk;
pub mod verifier;
pub mod engine;
pub mod scheduler;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{IntegrityError, IntegrityStatus};
pub use traits::{CryptoService, DeviceAttestation, EventSink, FlashReader, MetadataStore};
pub use metadata::{validate_metadata, init_metadata, FirmwareMetadata};
pub use chunk::{generate_chunks, ChunkInfo, ChunkTable};
pub use verifier::{verify_chunk, verify_firmware, SignatureVerification};
pub use engine::{IntegrityEngine, IntegrityResult, IntegrityStats};
pub use scheduler::RuntimeScheduler;
