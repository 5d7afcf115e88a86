//! Custody Core Library
//!
//! Shared types, the custody service client, the signing seam and the polling
//! primitive used by the delegated-signer wallet orchestrators.

pub mod api;
pub mod config;
pub mod error;
pub mod poll;
pub mod signing;
pub mod types;

pub use error::{Error, Result};
