//! camstore core - shared types library.
//!
//! This crate provides the domain types used across the camstore components:
//! - `storefront` - session, authorization, cart and checkout client library
//! - `cli` - command-line front end over the storefront library
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps it
//! lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
