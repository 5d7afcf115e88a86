//! Purchases paid from the custody wallet.
//!
//! One attempt walks a fixed state machine:
//!
//! ```text
//! QuoteRequested -> TxCreated -> Signed -> AwaitingBroadcast -> Broadcast -> Confirmed
//!        \______________\___________\______________\_______________\______-> Failed
//! ```
//!
//! A purchase is only reported as successful once the order side has accepted
//! the payment confirmation; an on-chain broadcast alone is not enough.
//! `await_on_chain_reference` and `confirm_payment` are public so a caller
//! that crashed between them can finish the attempt with `resume`.

use crate::translate_remote_error;
use custody_core::api::WalletApi;
use custody_core::config::PollingConfig;
use custody_core::poll::{poll, PollOptions};
use custody_core::signing::ApprovalSigner;
use custody_core::types::{ApiSession, Order, OrderRequest, RemoteTransaction};
use custody_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress of a single purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseState {
    QuoteRequested,
    TxCreated,
    Signed,
    AwaitingBroadcast,
    Broadcast,
    Confirmed,
    Failed,
}

impl PurchaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(&self, next: PurchaseState) -> bool {
        use PurchaseState::*;

        match (self, next) {
            (current, Failed) => !current.is_terminal(),
            (QuoteRequested, TxCreated)
            | (TxCreated, Signed)
            | (Signed, AwaitingBroadcast)
            | (AwaitingBroadcast, Broadcast)
            | (Broadcast, Confirmed) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting transitions outside the table.
    #[allow(clippy::result_large_err)]
    pub fn advance(&mut self, next: PurchaseState) -> Result<()> {
        if !self.can_advance_to(next) {
            return Err(Error::protocol(format!(
                "purchase cannot move from {:?} to {:?}",
                self, next
            )));
        }
        debug!(from = ?self, to = ?next, "Purchase state transition");
        *self = next;
        Ok(())
    }
}

/// The payment transaction once its on-chain reference is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReceipt {
    pub transaction_id: String,
    pub on_chain_reference: String,
    pub explorer_link: Option<String>,
}

/// Outcome of a confirmed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResult {
    /// Order as returned by the payment confirmation.
    pub order: Order,
    pub transaction_id: String,
    pub on_chain_reference: String,
    pub explorer_link: Option<String>,
}

impl PurchaseResult {
    fn new(order: Order, receipt: BroadcastReceipt) -> Self {
        Self {
            order,
            transaction_id: receipt.transaction_id,
            on_chain_reference: receipt.on_chain_reference,
            explorer_link: receipt.explorer_link,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order.order_id
    }
}

/// Drives order creation, payment approval, broadcast and confirmation.
pub struct PurchaseOrchestrator {
    api: Arc<dyn WalletApi>,
    polling: PollingConfig,
}

impl PurchaseOrchestrator {
    pub fn new(api: Arc<dyn WalletApi>, polling: PollingConfig) -> Self {
        Self { api, polling }
    }

    /// Buy `request`, paying from `payer_address` with approval by `signer`.
    pub async fn purchase(
        &self,
        session: &ApiSession,
        signer: &dyn ApprovalSigner,
        payer_address: &str,
        request: &OrderRequest,
    ) -> Result<PurchaseResult> {
        request.validate()?;
        require(payer_address, "payerAddress")?;

        let mut state = PurchaseState::QuoteRequested;
        let outcome = self
            .run(&mut state, session, signer, payer_address, request)
            .await;

        if let Err(e) = &outcome {
            warn!(last_state = ?state, error = %e, "Purchase failed");
            state.advance(PurchaseState::Failed)?;
        }
        outcome
    }

    async fn run(
        &self,
        state: &mut PurchaseState,
        session: &ApiSession,
        signer: &dyn ApprovalSigner,
        payer_address: &str,
        request: &OrderRequest,
    ) -> Result<PurchaseResult> {
        let order = self
            .api
            .create_order(session, request, payer_address)
            .await
            .map_err(translate_remote_error)?;

        info!(
            order_id = %order.order_id,
            phase = %order.phase,
            payment_status = order.payment_status.as_deref().unwrap_or(""),
            "Order created"
        );

        let Some(serialized) = order.serialized_transaction.as_deref() else {
            return Err(unpayable(&order));
        };

        let locator = signer.locator();
        let created = self
            .api
            .create_wallet_transaction(session, payer_address, serialized, &locator)
            .await
            .map_err(translate_remote_error)?;
        state.advance(PurchaseState::TxCreated)?;

        info!(
            order_id = %order.order_id,
            transaction_id = %created.id,
            "Payment transaction created"
        );

        let challenge = match created.pending_approvals.as_slice() {
            [only] => only,
            [] => {
                return Err(Error::ApprovalMissing {
                    transaction_id: created.id.clone(),
                })
            }
            many => {
                return Err(Error::protocol(format!(
                    "transaction {} has {} pending approvals, expected exactly one",
                    created.id,
                    many.len()
                )))
            }
        };

        let signature = signer.sign_challenge(&challenge.message)?;
        state.advance(PurchaseState::Signed)?;

        self.api
            .submit_approval(session, payer_address, &created.id, &locator, &signature)
            .await
            .map_err(translate_remote_error)?;
        state.advance(PurchaseState::AwaitingBroadcast)?;

        info!(transaction_id = %created.id, "Payment approved, awaiting broadcast");

        let receipt = self
            .await_on_chain_reference(session, payer_address, &created.id)
            .await?;
        state.advance(PurchaseState::Broadcast)?;

        let confirmed = self
            .confirm_payment(session, &order.order_id, &receipt.on_chain_reference)
            .await?;
        order.check_successor(&confirmed)?;
        state.advance(PurchaseState::Confirmed)?;

        Ok(PurchaseResult::new(confirmed, receipt))
    }

    /// Poll the payment transaction until an on-chain reference appears.
    ///
    /// Fails with `BroadcastTimeout` if none appears within the broadcast
    /// deadline, and with a protocol error if the transaction fails first.
    pub async fn await_on_chain_reference(
        &self,
        session: &ApiSession,
        wallet: &str,
        transaction_id: &str,
    ) -> Result<BroadcastReceipt> {
        require(wallet, "wallet")?;
        require(transaction_id, "transactionId")?;

        let timeout_ms = self.polling.broadcast_timeout_ms;
        let options = PollOptions::from_millis(timeout_ms, self.polling.interval_ms);
        let broadcast_timeout = || Error::BroadcastTimeout {
            transaction_id: transaction_id.to_string(),
            waited_ms: timeout_ms,
        };

        let observed = poll(
            options,
            || self.api.get_transaction(session, wallet, transaction_id),
            |tx: &RemoteTransaction| tx.on_chain_reference.is_some() || tx.status.is_failure(),
        )
        .await
        .map_err(|e| if e.is_transient() { broadcast_timeout() } else { e })?;

        if let Some(reference) = observed.on_chain_reference {
            info!(
                transaction_id = %observed.id,
                on_chain_reference = %reference,
                "Payment broadcast"
            );
            return Ok(BroadcastReceipt {
                transaction_id: observed.id,
                on_chain_reference: reference,
                explorer_link: observed.explorer_link,
            });
        }

        if observed.status.is_failure() {
            return Err(Error::protocol(format!(
                "payment transaction {} ended {} before broadcast",
                observed.id, observed.status
            )));
        }

        Err(broadcast_timeout())
    }

    /// Report the on-chain reference to the order's payment confirmation.
    pub async fn confirm_payment(
        &self,
        session: &ApiSession,
        order_id: &str,
        on_chain_reference: &str,
    ) -> Result<Order> {
        require(order_id, "orderId")?;
        require(on_chain_reference, "onChainReference")?;

        let order = self
            .api
            .confirm_payment(session, order_id, on_chain_reference)
            .await
            .map_err(translate_remote_error)?;

        info!(
            order_id = %order.order_id,
            phase = %order.phase,
            on_chain_reference,
            "Payment confirmed"
        );
        Ok(order)
    }

    /// Finish an attempt whose approval was already submitted.
    pub async fn resume(
        &self,
        session: &ApiSession,
        payer_address: &str,
        order_id: &str,
        transaction_id: &str,
    ) -> Result<PurchaseResult> {
        require(order_id, "orderId")?;
        info!(order_id, transaction_id, "Resuming purchase");

        let receipt = self
            .await_on_chain_reference(session, payer_address, transaction_id)
            .await?;
        let confirmed = self
            .confirm_payment(session, order_id, &receipt.on_chain_reference)
            .await?;
        Ok(PurchaseResult::new(confirmed, receipt))
    }

    /// Single order read.
    pub async fn order_status(&self, session: &ApiSession, order_id: &str) -> Result<Order> {
        require(order_id, "orderId")?;
        self.api.get_order(session, order_id).await
    }
}

/// Why an order came back without a signable payment transaction.
fn unpayable(order: &Order) -> Error {
    if order.is_insufficient_funds() {
        let message = order
            .payment_failure
            .as_ref()
            .map(|f| f.describe())
            .unwrap_or_else(|| "payer cannot cover the order total".to_string());
        return Error::InsufficientFunds { message };
    }

    let detail = order
        .payment_failure
        .as_ref()
        .map(|f| f.describe())
        .or_else(|| order.payment_status.clone())
        .unwrap_or_else(|| "unknown".to_string());
    Error::protocol(format!(
        "order {} has no payable transaction (payment status: {})",
        order.order_id, detail
    ))
}

#[allow(clippy::result_large_err)]
fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{order, session, tx, CountingSigner, MockApi, CUSTODY, MSGB58_SIGNATURE};
    use custody_core::types::{OrderPhase, Recipient};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, Instant};

    fn request() -> OrderRequest {
        OrderRequest::single(
            "amazon:B0TEST",
            Recipient {
                email: Some("ada@example.com".to_string()),
                physical_address: None,
            },
        )
    }

    fn orchestrator(api: MockApi) -> PurchaseOrchestrator {
        PurchaseOrchestrator::new(Arc::new(api), PollingConfig::default())
    }

    /// Order and transaction creation as in the reference purchase flow.
    fn expect_order_and_transaction(api: &mut MockApi) {
        api.expect_create_order()
            .withf(|_, _, payer| payer == CUSTODY)
            .times(1)
            .returning(|_, _, _| {
                Ok(order(json!({
                    "orderId": "o1",
                    "payment": { "preparation": { "serializedTransaction": "abc" } }
                })))
            });
        api.expect_create_wallet_transaction()
            .withf(|_, wallet, serialized, _| wallet == CUSTODY && serialized == "abc")
            .times(1)
            .returning(|_, _, _, _| {
                Ok(tx(json!({ "id": "t1", "approvals": { "pending": [{ "message": "MSGB58" }] } })))
            });
        api.expect_submit_approval()
            .withf(|_, _, tx_id, _, signature| tx_id == "t1" && signature == MSGB58_SIGNATURE)
            .times(1)
            .returning(|_, _, _, _, _| Ok(tx(json!({ "id": "t1", "status": "pending" }))));
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut state = PurchaseState::QuoteRequested;
        for next in [
            PurchaseState::TxCreated,
            PurchaseState::Signed,
            PurchaseState::AwaitingBroadcast,
            PurchaseState::Broadcast,
            PurchaseState::Confirmed,
        ] {
            state.advance(next).unwrap();
        }
        assert!(state.is_terminal());
        assert!(state.advance(PurchaseState::Failed).is_err());

        let mut early = PurchaseState::QuoteRequested;
        assert!(early.advance(PurchaseState::Broadcast).is_err());
        assert_eq!(early, PurchaseState::QuoteRequested);
        early.advance(PurchaseState::Failed).unwrap();
        assert!(!PurchaseState::AwaitingBroadcast.can_advance_to(PurchaseState::Confirmed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purchase_happy_path() {
        let mut api = MockApi::new();
        expect_order_and_transaction(&mut api);

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        api.expect_get_transaction().returning(move |_, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(tx(json!({ "id": "t1", "status": "pending" })))
            } else {
                Ok(tx(json!({ "id": "t1", "status": "success", "onChain": { "txId": "chain123" } })))
            }
        });
        api.expect_confirm_payment()
            .withf(|_, order_id, reference| order_id == "o1" && reference == "chain123")
            .times(1)
            .returning(|_, _, _| Ok(order(json!({ "orderId": "o1", "phase": "completed" }))));

        let signer = CountingSigner::new();
        let result = orchestrator(api)
            .purchase(&session(), &signer, CUSTODY, &request())
            .await
            .unwrap();

        assert_eq!(result.order_id(), "o1");
        assert_eq!(result.transaction_id, "t1");
        assert_eq!(result.on_chain_reference, "chain123");
        assert_eq!(result.order.phase, OrderPhase::Completed);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(signer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_moving_order_backwards_is_protocol_error() {
        let mut api = MockApi::new();
        api.expect_create_order().times(1).returning(|_, _, _| {
            Ok(order(json!({
                "orderId": "o1",
                "phase": "payment",
                "payment": { "preparation": { "serializedTransaction": "abc" } }
            })))
        });
        api.expect_create_wallet_transaction()
            .times(1)
            .returning(|_, _, _, _| {
                Ok(tx(json!({ "id": "t1", "approvals": { "pending": [{ "message": "MSGB58" }] } })))
            });
        api.expect_submit_approval()
            .times(1)
            .returning(|_, _, _, _, _| Ok(tx(json!({ "id": "t1", "status": "pending" }))));
        api.expect_get_transaction().returning(|_, _, _| {
            Ok(tx(json!({ "id": "t1", "status": "success", "onChain": { "txId": "chain123" } })))
        });
        api.expect_confirm_payment()
            .times(1)
            .returning(|_, _, _| Ok(order(json!({ "orderId": "o1", "phase": "quote" }))));

        let err = orchestrator(api)
            .purchase(&session(), &CountingSigner::new(), CUSTODY, &request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_insufficient_funds_never_creates_transaction() {
        let mut api = MockApi::new();
        api.expect_create_order().returning(|_, _, _| {
            Ok(order(json!({
                "order": {
                    "orderId": "o1",
                    "phase": "payment",
                    "payment": {
                        "status": "crypto-payer-insufficient-funds",
                        "failureReason": { "code": "insufficient-funds", "message": "Not enough USDC" }
                    }
                }
            })))
        });
        api.expect_create_wallet_transaction().never();
        api.expect_confirm_payment().never();

        let signer = CountingSigner::new();
        let err = orchestrator(api)
            .purchase(&session(), &signer, CUSTODY, &request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientFunds { ref message } if message.contains("Not enough USDC")));
        assert_eq!(signer.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_payment_transaction_is_protocol_error() {
        let mut api = MockApi::new();
        api.expect_create_order().returning(|_, _, _| {
            Ok(order(json!({ "orderId": "o1", "phase": "quote", "payment": { "status": "requires-quote" } })))
        });
        api.expect_create_wallet_transaction().never();

        let err = orchestrator(api)
            .purchase(&session(), &CountingSigner::new(), CUSTODY, &request())
            .await
            .unwrap_err();

        match err {
            Error::Protocol { message } => assert!(message.contains("requires-quote")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_timeout_never_confirms() {
        let mut api = MockApi::new();
        expect_order_and_transaction(&mut api);

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        api.expect_get_transaction().returning(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(tx(json!({ "id": "t1", "status": "pending" })))
        });
        api.expect_confirm_payment().never();

        let started = Instant::now();
        let err = orchestrator(api)
            .purchase(&session(), &CountingSigner::new(), CUSTODY, &request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::BroadcastTimeout { ref transaction_id, waited_ms: 30_000 } if transaction_id == "t1"
        ));
        assert!(started.elapsed() <= Duration::from_millis(30_000 + 2_000));
        assert_eq!(polls.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn test_missing_challenge_is_approval_missing() {
        let mut api = MockApi::new();
        api.expect_create_order().returning(|_, _, _| {
            Ok(order(json!({ "orderId": "o1", "payment": { "preparation": { "serializedTransaction": "abc" } } })))
        });
        api.expect_create_wallet_transaction()
            .returning(|_, _, _, _| Ok(tx(json!({ "id": "t1", "status": "pending" }))));
        api.expect_submit_approval().never();

        let err = orchestrator(api)
            .purchase(&session(), &CountingSigner::new(), CUSTODY, &request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ApprovalMissing { ref transaction_id } if transaction_id == "t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_transaction_before_broadcast_is_protocol_error() {
        let mut api = MockApi::new();
        api.expect_get_transaction()
            .returning(|_, _, _| Ok(tx(json!({ "id": "t1", "status": "failed" }))));
        api.expect_confirm_payment().never();

        let err = orchestrator(api)
            .resume(&session(), CUSTODY, "o1", "t1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_confirms_late_broadcast() {
        let mut api = MockApi::new();
        api.expect_get_transaction().returning(|_, _, _| {
            Ok(tx(json!({
                "id": "t1",
                "status": "success",
                "onChain": { "txHash": "hash-late", "explorerLink": "https://explorer/tx/hash-late" }
            })))
        });
        api.expect_confirm_payment()
            .withf(|_, order_id, reference| order_id == "o1" && reference == "hash-late")
            .times(1)
            .returning(|_, _, _| Ok(order(json!({ "orderId": "o1", "phase": "delivery" }))));

        let result = orchestrator(api)
            .resume(&session(), CUSTODY, "o1", "t1")
            .await
            .unwrap();

        assert_eq!(result.on_chain_reference, "hash-late");
        assert_eq!(result.explorer_link.as_deref(), Some("https://explorer/tx/hash-late"));
        assert_eq!(result.order.phase, OrderPhase::Delivery);
    }
}
