// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-ATTEST for Qbitel EdgeOS
//!
//! Challenge-response device attestation:
//!
//! - **Respond**: sign a verifier's challenge through the crypto backend
//! - **Self-attestation**: answer a local challenge carrying a timestamp
//! - **Continuous**: identity proof bound to a live firmware integrity check

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod service;

pub use error::{AttestationError, AttestationStatus};
pub use service::{AttestationResult, AttestationService};
