//! Signing seam between the orchestrators and the local keystore.
//!
//! The custody service never sees the delegated key. It hands out base-58
//! approval challenges, the local signer answers them, and only the base-58
//! signature travels back.
//!
//! ```text
//! Keystore (keystore crate)
//!       │
//!       ▼
//! LocalSigner ── implements ──► ApprovalSigner
//!                                     │
//!                 challenge (b58) ───►│──► signature (b58)
//!                                     ▼
//!                          Transfer / Purchase orchestrators
//! ```

pub mod signer;

pub use signer::{decode_base58, signer_locator, ApprovalSigner, EXTERNAL_SIGNER_PREFIX};
