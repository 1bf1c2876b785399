//! camstore storefront client library.
//!
//! Session ownership, role-gated access to admin views, the server-backed
//! cart cache, and checkout for the camstore CCTV storefront.
//!
//! # Architecture
//!
//! - [`services::SessionManager`] is the single owner of the signed-in
//!   identity and publishes every change to subscribers
//! - [`services::AuthorizationGate`] resolves the privileged role for the
//!   current identity and never grants access on failure
//! - [`services::CartStore`] mirrors the remote cart; every write is
//!   followed by a full refetch
//! - [`services::OrderSubmission`] turns the cached cart into an order
//! - Remote collaborators sit behind the traits in [`backend`]; enable the
//!   `testing` feature for in-memory fakes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
