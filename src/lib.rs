//! Agent Wallet: delegated-signer custody wallets for autonomous agents
//!
//! This is the root crate that re-exports the workspace for integration tests
//! and embedding. For finer-grained use, depend on the individual crates:
//!
//! - `custody-core`: Types, errors, configuration, custody API client, polling
//! - `keystore`: Per-agent ed25519 identities and the local signer
//! - `wallet-engine`: Transfer and purchase orchestration, `AgentWallet` facade

pub use custody_core as core;
pub use keystore;
pub use wallet_engine as engine;

pub use custody_core::{Error, Result};
pub use wallet_engine::AgentWallet;
