//! Token transfers out of the custody wallet.

use crate::translate_remote_error;
use custody_core::api::WalletApi;
use custody_core::config::PollingConfig;
use custody_core::poll::{poll, PollOptions};
use custody_core::signing::ApprovalSigner;
use custody_core::types::{ApiSession, PendingApproval, RemoteTransaction, TransferRequest};
use custody_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Drives a transfer through create, approve and (optionally) settle.
pub struct TransferOrchestrator {
    api: Arc<dyn WalletApi>,
    polling: PollingConfig,
}

impl TransferOrchestrator {
    pub fn new(api: Arc<dyn WalletApi>, polling: PollingConfig) -> Self {
        Self { api, polling }
    }

    /// Create the transfer and, if the service asks for it, approve it.
    ///
    /// Returns the transaction as reported after approval, or as created when
    /// no approval was requested. Does not wait for settlement.
    pub async fn transfer(
        &self,
        session: &ApiSession,
        signer: &dyn ApprovalSigner,
        custody_address: &str,
        request: &TransferRequest,
    ) -> Result<RemoteTransaction> {
        request.validate()?;
        require_wallet(custody_address)?;

        let locator = signer.locator();
        let created = self
            .api
            .create_transfer(session, custody_address, &locator, request)
            .await
            .map_err(translate_remote_error)?;

        info!(
            transaction_id = %created.id,
            status = %created.status,
            token = %request.token,
            amount = %request.amount,
            "Transfer created"
        );

        if !created.needs_approval() {
            return Ok(created);
        }

        let challenge = challenge_for(&created, &locator).ok_or_else(|| Error::ApprovalMissing {
            transaction_id: created.id.clone(),
        })?;
        let signature = signer.sign_challenge(&challenge.message)?;

        let approved = self
            .api
            .submit_approval(session, custody_address, &created.id, &locator, &signature)
            .await
            .map_err(translate_remote_error)?;

        info!(
            transaction_id = %approved.id,
            status = %approved.status,
            "Transfer approved"
        );
        Ok(approved)
    }

    /// Poll until the transaction is terminal or `timeout_ms` (default from
    /// config) elapses. A timeout returns the last observed state.
    pub async fn wait_for_terminal(
        &self,
        session: &ApiSession,
        custody_address: &str,
        transaction_id: &str,
        timeout_ms: Option<u64>,
    ) -> Result<RemoteTransaction> {
        require_wallet(custody_address)?;
        require_transaction(transaction_id)?;

        let options = PollOptions::from_millis(
            timeout_ms.unwrap_or(self.polling.transfer_timeout_ms),
            self.polling.interval_ms,
        );

        let settled = poll(
            options,
            || self.api.get_transaction(session, custody_address, transaction_id),
            |tx: &RemoteTransaction| tx.status.is_terminal(),
        )
        .await?;

        info!(
            transaction_id = %settled.id,
            status = %settled.status,
            terminal = settled.status.is_terminal(),
            on_chain_reference = settled.on_chain_reference.as_deref().unwrap_or(""),
            "Transfer wait finished"
        );
        Ok(settled)
    }

    /// `transfer` followed by `wait_for_terminal` when the transfer is not
    /// already terminal.
    pub async fn transfer_and_wait(
        &self,
        session: &ApiSession,
        signer: &dyn ApprovalSigner,
        custody_address: &str,
        request: &TransferRequest,
    ) -> Result<RemoteTransaction> {
        let submitted = self
            .transfer(session, signer, custody_address, request)
            .await?;
        if submitted.status.is_terminal() {
            return Ok(submitted);
        }
        self.wait_for_terminal(session, custody_address, &submitted.id, None)
            .await
    }

    /// Single status read.
    pub async fn transaction_status(
        &self,
        session: &ApiSession,
        custody_address: &str,
        transaction_id: &str,
    ) -> Result<RemoteTransaction> {
        require_wallet(custody_address)?;
        require_transaction(transaction_id)?;
        debug!(transaction_id, "Reading transaction status");
        self.api
            .get_transaction(session, custody_address, transaction_id)
            .await
    }
}

/// The challenge addressed to `locator`, else an unaddressed one, else the
/// only one outstanding.
fn challenge_for<'a>(tx: &'a RemoteTransaction, locator: &str) -> Option<&'a PendingApproval> {
    tx.pending_approvals
        .iter()
        .find(|p| p.signer.as_deref() == Some(locator))
        .or_else(|| tx.pending_approvals.iter().find(|p| p.signer.is_none()))
        .or_else(|| tx.sole_pending_approval())
}

#[allow(clippy::result_large_err)]
fn require_wallet(custody_address: &str) -> Result<()> {
    if custody_address.trim().is_empty() {
        return Err(Error::validation("custodyAddress", "is required"));
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn require_transaction(transaction_id: &str) -> Result<()> {
    if transaction_id.trim().is_empty() {
        return Err(Error::validation("transactionId", "is required"));
    }
    Ok(())
}
