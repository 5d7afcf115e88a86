//! Remote wallet transactions and their approval challenges.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Lifecycle status of a remote transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    Created,
    AwaitingApproval,
    Pending,
    Success,
    Completed,
    Failed,
    Rejected,
    Cancelled,
    /// A status string this client does not recognise. Never terminal.
    #[serde(other)]
    Unknown,
}

impl TransactionStatus {
    /// Parse a wire status; unrecognised strings become `Unknown`.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "awaiting-approval" | "awaiting_approval" => Self::AwaitingApproval,
            "pending" => Self::Pending,
            "success" => Self::Success,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "rejected" => Self::Rejected,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Terminal once the remote side will no longer change the status.
    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Completed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Rejected | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingApproval => "awaiting-approval",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A challenge the delegated signer must sign once before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Signer locator the challenge is addressed to, when the service names one.
    pub signer: Option<String>,
    /// Base-58 encoded challenge bytes.
    pub message: String,
}

/// A transaction held by the custody service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTransaction {
    pub id: String,
    pub status: TransactionStatus,
    pub on_chain_reference: Option<String>,
    pub explorer_link: Option<String>,
    #[serde(default)]
    pub pending_approvals: Vec<PendingApproval>,
    /// The raw status string, kept for `Unknown` diagnostics.
    pub raw_status: String,
}

impl RemoteTransaction {
    /// Normalize a raw transaction (or transfer) response.
    #[allow(clippy::result_large_err)]
    pub fn from_value(value: &Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::protocol("transaction response has no id"))?
            .to_string();

        let raw_status = value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let status = TransactionStatus::from_wire(&raw_status);

        let explorer_link = value
            .pointer("/onChain/explorerLink")
            .or_else(|| value.get("explorerLink"))
            .and_then(non_empty_str)
            .map(str::to_string);

        Ok(Self {
            id,
            status,
            on_chain_reference: resolve_on_chain_reference(value, status),
            explorer_link,
            pending_approvals: pending_approvals(value),
            raw_status,
        })
    }

    /// The single pending challenge, if exactly one is outstanding.
    pub fn sole_pending_approval(&self) -> Option<&PendingApproval> {
        match self.pending_approvals.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Waiting on the local signer with a challenge available.
    pub fn needs_approval(&self) -> bool {
        self.status == TransactionStatus::AwaitingApproval && !self.pending_approvals.is_empty()
    }
}

/// A token transfer out of the custody wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Recipient address or locator.
    pub recipient: String,
    /// Token locator, e.g. `solana:usdc`.
    pub token: String,
    /// Decimal amount in whole token units, e.g. `"1.5"`.
    pub amount: String,
}

impl TransferRequest {
    pub fn new(
        recipient: impl Into<String>,
        token: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            token: token.into(),
            amount: amount.into(),
        }
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.recipient.trim().is_empty() {
            return Err(Error::validation("recipient", "is required"));
        }
        if self.token.trim().is_empty() {
            return Err(Error::validation("token", "is required"));
        }
        if self.amount.trim().is_empty() {
            return Err(Error::validation("amount", "is required"));
        }
        let amount = Decimal::from_str(self.amount.trim()).map_err(|_| {
            Error::validation("amount", format!("'{}' is not a decimal number", self.amount))
        })?;
        if amount <= Decimal::ZERO {
            return Err(Error::validation("amount", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Fields scanned, in order, once a transaction reports success but carries
/// neither `onChain.txId` nor a top-level `txId`.
const FALLBACK_REFERENCE_POINTERS: [&str; 5] = [
    "/onChain/txHash",
    "/onChain/signature",
    "/txHash",
    "/hash",
    "/signature",
];

/// Locate the on-chain reference of a transaction response.
///
/// Lookup order:
/// 1. `onChain.txId`
/// 2. top-level `txId`
/// 3. only when `status` is success/completed: `FALLBACK_REFERENCE_POINTERS`
///
/// Empty strings count as absent.
pub fn resolve_on_chain_reference(value: &Value, status: TransactionStatus) -> Option<String> {
    let primary = value
        .pointer("/onChain/txId")
        .and_then(non_empty_str)
        .or_else(|| value.get("txId").and_then(non_empty_str));

    if let Some(reference) = primary {
        return Some(reference.to_string());
    }

    if !status.is_success() {
        return None;
    }

    FALLBACK_REFERENCE_POINTERS
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(non_empty_str))
        .map(str::to_string)
}

fn pending_approvals(value: &Value) -> Vec<PendingApproval> {
    let Some(pending) = value.pointer("/approvals/pending").and_then(Value::as_array) else {
        return Vec::new();
    };

    pending
        .iter()
        .filter_map(|entry| {
            let message = entry.get("message").and_then(non_empty_str)?;
            // The signer is sent either as a bare locator or as `{ "locator": ... }`.
            let signer = entry.get("signer").and_then(|s| {
                s.as_str()
                    .or_else(|| s.get("locator").and_then(Value::as_str))
                    .map(str::to_string)
            });
            Some(PendingApproval {
                signer,
                message: message.to_string(),
            })
        })
        .collect()
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}
