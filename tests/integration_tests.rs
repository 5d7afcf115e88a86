//! Integration tests for component interactions.
//!
//! These tests drive the `AgentWallet` facade over a real file keystore and a
//! scripted custody API, checking that identities, signatures and the
//! orchestrators fit together.

use agent_wallet::core::api::WalletApi;
use agent_wallet::core::config::PollingConfig;
use agent_wallet::core::types::{
    ApiSession, Order, OrderPhase, OrderRequest, Recipient, RemoteTransaction, TokenBalance,
    TransactionStatus, TransferRequest,
};
use agent_wallet::keystore::{verify, Keystore, KeystoreProvider};
use agent_wallet::{AgentWallet, Error, Result};
use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

mock! {
    Api {}

    #[async_trait]
    impl WalletApi for Api {
        async fn create_transfer(
            &self,
            session: &ApiSession,
            wallet: &str,
            signer: &str,
            request: &TransferRequest,
        ) -> Result<RemoteTransaction>;

        async fn get_transaction(
            &self,
            session: &ApiSession,
            wallet: &str,
            transaction_id: &str,
        ) -> Result<RemoteTransaction>;

        async fn submit_approval(
            &self,
            session: &ApiSession,
            wallet: &str,
            transaction_id: &str,
            signer: &str,
            signature: &str,
        ) -> Result<RemoteTransaction>;

        async fn create_order(
            &self,
            session: &ApiSession,
            request: &OrderRequest,
            payer_address: &str,
        ) -> Result<Order>;

        async fn create_wallet_transaction(
            &self,
            session: &ApiSession,
            wallet: &str,
            serialized_transaction: &str,
            signer: &str,
        ) -> Result<RemoteTransaction>;

        async fn confirm_payment(
            &self,
            session: &ApiSession,
            order_id: &str,
            on_chain_reference: &str,
        ) -> Result<Order>;

        async fn get_order(&self, session: &ApiSession, order_id: &str) -> Result<Order>;

        async fn get_balances(
            &self,
            session: &ApiSession,
            wallet: &str,
            tokens: &[String],
        ) -> Result<Vec<TokenBalance>>;
    }
}

const AGENT: &str = "shopper-7";
const CUSTODY: &str = "Custody1111111111111111111111111111111111111";
const API_KEY: &str = "sk_staging_integration";

fn tx(value: serde_json::Value) -> RemoteTransaction {
    RemoteTransaction::from_value(&value).unwrap()
}

fn order(value: serde_json::Value) -> Order {
    Order::from_value(&value).unwrap()
}

fn file_keystore(dir: &tempfile::TempDir) -> Arc<Keystore> {
    Arc::new(Keystore::new(
        KeystoreProvider::File {
            path: dir.path().join("wallets.json"),
        },
        None,
    ))
}

fn wallet(keystore: Arc<Keystore>, api: MockApi) -> AgentWallet {
    AgentWallet::new(
        keystore,
        Arc::new(api),
        "https://staging.custody.test/",
        PollingConfig::default(),
    )
}

/// Set up and configure the test agent, returning its signer address.
async fn onboard(wallet: &AgentWallet) -> String {
    let identity = wallet.setup(AGENT).await.unwrap();
    assert!(!identity.is_usable());

    let configured = wallet.configure(AGENT, CUSTODY, API_KEY).await.unwrap();
    assert!(configured.is_usable());
    assert_eq!(configured.public_address, identity.public_address);
    identity.public_address
}

#[tokio::test(start_paused = true)]
async fn test_purchase_end_to_end_signs_with_stored_identity() {
    let dir = tempfile::tempdir().unwrap();
    let challenge = bs58::encode(b"pay order o1").into_string();
    let submitted_signature = Arc::new(Mutex::new(String::new()));

    let mut api = MockApi::new();
    api.expect_create_order()
        .withf(|session, _, payer| session.api_key() == API_KEY && payer == CUSTODY)
        .times(1)
        .returning(|_, _, _| {
            Ok(order(json!({
                "order": {
                    "orderId": "o1",
                    "phase": "payment",
                    "payment": { "status": "awaiting-payment", "preparation": { "serializedTransaction": "abc" } }
                }
            })))
        });
    let challenge_reply = challenge.clone();
    api.expect_create_wallet_transaction()
        .withf(|_, wallet, serialized, signer| {
            wallet == CUSTODY && serialized == "abc" && signer.starts_with("external-wallet:")
        })
        .times(1)
        .returning(move |_, _, _, _| {
            Ok(tx(json!({
                "id": "t1",
                "status": "awaiting-approval",
                "approvals": { "pending": [{ "message": challenge_reply }] }
            })))
        });
    let seen = submitted_signature.clone();
    api.expect_submit_approval()
        .times(1)
        .returning(move |_, _, _, _, signature| {
            *seen.lock().unwrap() = signature.to_string();
            Ok(tx(json!({ "id": "t1", "status": "pending" })))
        });
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();
    api.expect_get_transaction().returning(move |_, _, _| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Ok(tx(json!({ "id": "t1", "status": "pending" })))
        } else {
            Ok(tx(json!({ "id": "t1", "status": "success", "onChain": { "txId": "chain123" } })))
        }
    });
    api.expect_confirm_payment()
        .withf(|_, order_id, reference| order_id == "o1" && reference == "chain123")
        .times(1)
        .returning(|_, _, _| Ok(order(json!({ "orderId": "o1", "phase": "completed" }))));

    let wallet = wallet(file_keystore(&dir), api);
    let address = onboard(&wallet).await;

    let request = OrderRequest::single(
        "amazon:B0TEST",
        Recipient {
            email: Some("agent@example.com".to_string()),
            physical_address: None,
        },
    );
    let result = wallet.purchase(AGENT, &request).await.unwrap();

    assert_eq!(result.order_id(), "o1");
    assert_eq!(result.transaction_id, "t1");
    assert_eq!(result.on_chain_reference, "chain123");
    assert_eq!(result.order.phase, OrderPhase::Completed);

    let signature = bs58::decode(submitted_signature.lock().unwrap().as_str())
        .into_vec()
        .unwrap();
    assert!(verify(&address, b"pay order o1", &signature).unwrap());
}

#[tokio::test]
async fn test_identity_survives_reopening_the_wallet_file() {
    let dir = tempfile::tempdir().unwrap();

    let first = wallet(file_keystore(&dir), MockApi::new());
    let address = onboard(&first).await;
    let signature = first.keystore().sign(AGENT, b"same message").await.unwrap();
    drop(first);

    let reopened = wallet(file_keystore(&dir), MockApi::new());
    let identity = reopened.identity(AGENT).await.unwrap();
    assert_eq!(identity.public_address, address);
    assert_eq!(identity.custody_address().unwrap(), CUSTODY);
    assert_eq!(
        reopened.keystore().sign(AGENT, b"same message").await.unwrap(),
        signature
    );
    assert_eq!(reopened.setup(AGENT).await.unwrap().public_address, address);
}

#[tokio::test]
async fn test_configure_unknown_agent_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let wallet = wallet(file_keystore(&dir), MockApi::new());
    onboard(&wallet).await;
    let before = std::fs::read(dir.path().join("wallets.json")).unwrap();

    let err = wallet.configure("ghost", CUSTODY, API_KEY).await.unwrap_err();

    assert!(matches!(err, Error::NotFound { ref agent_id } if agent_id == "ghost"));
    assert_eq!(std::fs::read(dir.path().join("wallets.json")).unwrap(), before);
    assert_eq!(wallet.keystore().list().await.unwrap(), vec![AGENT.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_then_wait_until_settled() {
    let dir = tempfile::tempdir().unwrap();

    let mut api = MockApi::new();
    api.expect_create_transfer()
        .withf(|_, wallet, _, request| wallet == CUSTODY && request.token == "solana:usdc")
        .times(1)
        .returning(|_, _, _, _| {
            Ok(tx(json!({
                "id": "t9",
                "status": "awaiting-approval",
                "approvals": { "pending": [{ "message": "MSGB58" }] }
            })))
        });
    api.expect_submit_approval()
        .withf(|_, _, tx_id, _, _| tx_id == "t9")
        .times(1)
        .returning(|_, _, _, _, _| Ok(tx(json!({ "id": "t9", "status": "pending" }))));
    api.expect_get_transaction().returning(|_, _, _| {
        Ok(tx(json!({
            "id": "t9",
            "status": "completed",
            "onChain": { "txId": "chain9", "explorerLink": "https://explorer.test/tx/chain9" }
        })))
    });

    let wallet = wallet(file_keystore(&dir), api);
    onboard(&wallet).await;

    let submitted = wallet
        .transfer(AGENT, &TransferRequest::new("Recipient111", "solana:usdc", "0.25"))
        .await
        .unwrap();
    assert_eq!(submitted.status, TransactionStatus::Pending);

    let settled = wallet.wait_for_transaction(AGENT, &submitted.id).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
    assert_eq!(settled.on_chain_reference.as_deref(), Some("chain9"));
    assert_eq!(
        settled.explorer_link.as_deref(),
        Some("https://explorer.test/tx/chain9")
    );
}

#[tokio::test]
async fn test_balance_reports_custody_wallet_holdings() {
    let dir = tempfile::tempdir().unwrap();

    let mut api = MockApi::new();
    api.expect_get_balances()
        .withf(|_, wallet, tokens| wallet == CUSTODY && tokens.len() == 1 && tokens[0] == "usdc")
        .times(1)
        .returning(|_, _, _| {
            TokenBalance::list_from_value(&json!([
                { "token": "usdc", "decimals": 6, "balances": { "total": "42.5" } }
            ]))
        });

    let wallet = wallet(file_keystore(&dir), api);
    onboard(&wallet).await;

    let balances = wallet.balance(AGENT, &["usdc".to_string()]).await.unwrap();
    assert_eq!(balances[0].token, "usdc");
    assert_eq!(balances[0].amount, Decimal::from_str("42.5").unwrap());
}

#[tokio::test]
async fn test_removed_agent_must_set_up_again() {
    let wallet = wallet(Arc::new(Keystore::in_memory()), MockApi::new());
    let address = onboard(&wallet).await;

    assert!(wallet.remove(AGENT).await.unwrap());
    assert!(matches!(
        wallet.transaction_status(AGENT, "t1").await,
        Err(Error::NotFound { .. })
    ));

    let fresh = wallet.setup(AGENT).await.unwrap();
    assert_ne!(fresh.public_address, address);
    assert!(fresh.credential.is_none());
}
