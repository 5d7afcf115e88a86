//! Test doubles shared by the orchestrator tests.

use async_trait::async_trait;
use custody_core::api::WalletApi;
use custody_core::signing::ApprovalSigner;
use custody_core::types::{
    ApiSession, Order, OrderRequest, RemoteTransaction, TokenBalance, TransferRequest,
};
use custody_core::Result;
use keystore::LocalSigner;
use mockall::mock;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

mock! {
    pub Api {}

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

/// RFC 8032 test 1 seed; its signature over `MSGB58` is a fixed value.
pub const TEST_SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
pub const TEST_ADDRESS: &str = "FVen3X669xLzsi6N2V91DoiyzHzg1uAgqiT8jZ9nS96Z";
pub const MSGB58_SIGNATURE: &str =
    "ZXbdphMz9jVQc8Rc6kJ2vQMSVtsr1vK98qxr29eBd8hCqavtTHVSXeBpRKrn5XuC2tg2nG7WDWtZbfLnPA2Taab";

pub const CUSTODY: &str = "custody123";

pub fn session() -> ApiSession {
    ApiSession::new("https://custody.test", "sk_test")
}

pub fn tx(value: Value) -> RemoteTransaction {
    RemoteTransaction::from_value(&value).unwrap()
}

pub fn order(value: Value) -> Order {
    Order::from_value(&value).unwrap()
}

/// `LocalSigner` over the test seed that counts signing calls.
pub struct CountingSigner {
    inner: LocalSigner,
    calls: AtomicUsize,
}

impl CountingSigner {
    pub fn new() -> Self {
        Self {
            inner: LocalSigner::from_seed(&hex::decode(TEST_SEED_HEX).unwrap()).unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ApprovalSigner for CountingSigner {
    fn address(&self) -> &str {
        self.inner.address()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(message)
    }
}
