//! Wallet Engine
//!
//! Delegated-signer orchestration: token transfers, purchases paid from the
//! custody wallet, and the `AgentWallet` facade that ties them to the keystore.

pub mod purchase;
pub mod service;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use purchase::{BroadcastReceipt, PurchaseOrchestrator, PurchaseResult, PurchaseState};
pub use service::AgentWallet;
pub use transfer::TransferOrchestrator;

use custody_core::Error;

/// Turn a remote rejection carrying the insufficient-funds code into the typed error.
pub(crate) fn translate_remote_error(error: Error) -> Error {
    match error {
        Error::Remote { body, .. } if custody_core::error::mentions_insufficient_funds(&body) => {
            Error::InsufficientFunds { message: body }
        }
        other => other,
    }
}
