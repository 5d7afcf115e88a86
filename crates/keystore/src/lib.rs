//! Agent Keystore
//!
//! One ed25519 delegated-signer identity per agent, persisted to an
//! owner-only wallet file (or kept in memory), with optional at-rest sealing.

pub mod keystore;
pub mod seal;
mod store;
pub mod wallet;

pub use keystore::{Keystore, KeystoreProvider};
pub use seal::SealedSeed;
pub use wallet::{verify, LocalSigner};
