// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel EdgeOS Common Library
//!
//! This crate provides the error definitions, shared types, constants and
//! configuration structures used by the runtime integrity and attestation
//! crates.
//!
//! # Features
//!
//! - `std`: Enable standard library support (wall-clock helpers)
//! - `defmt`: Enable defmt formatting of errors for embedded debugging

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "std")]
extern crate std;

pub mod types;
pub mod errors;
pub mod config;
pub mod constants;
pub mod time;

// Re-export commonly used items
pub use errors::{Error, Result};
pub use types::*;
pub use config::{IntegrityConfig, RuntimeConfig, SystemConfig};
