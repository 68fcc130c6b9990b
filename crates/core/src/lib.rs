//! Pomelo Core - Shared types library.
//!
//! This crate provides common types used across all Pomelo components:
//! - `checkout` - the resumable checkout workflow engine
//! - the presentation layer embedding it
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! persistence. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, lenient money parsing,
//!   and the ordered checkout step enum

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
