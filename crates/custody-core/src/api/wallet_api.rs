//! Typed endpoints of the custody service.
//!
//! `WalletApi` is the seam the orchestrators depend on. `HttpWalletApi` is the
//! production implementation; it sends requests through [`RemoteClient`] and
//! normalizes every reply into the domain types exactly once, here.

use super::client::RemoteClient;
use crate::types::{ApiSession, Order, OrderRequest, RemoteTransaction, TokenBalance, TransferRequest};
use crate::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

/// API version prefix for wallet, transfer and transaction endpoints.
pub const WALLETS_API: &str = "/api/2025-06-09/wallets";
/// API version prefix for order endpoints.
pub const ORDERS_API: &str = "/api/2022-06-09/orders";

/// Payment-confirmation body type for an on-chain transaction id.
pub const CRYPTO_TX_ID: &str = "crypto-tx-id";

#[async_trait]
pub trait WalletApi: Send + Sync {
    /// Create a token transfer out of `wallet`, naming `signer` as approver.
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

    /// Submit the signer's signature over a pending approval challenge.
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

    /// Create a wallet transaction from an opaque serialized payload.
    async fn create_wallet_transaction(
        &self,
        session: &ApiSession,
        wallet: &str,
        serialized_transaction: &str,
        signer: &str,
    ) -> Result<RemoteTransaction>;

    /// Tell the order side which on-chain transaction paid for `order_id`.
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

/// `WalletApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpWalletApi {
    client: RemoteClient,
}

impl HttpWalletApi {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }
}

/// Percent-encode one path segment with the URL path-segment set, so spaces
/// become `%20` and `/` cannot split the segment.
fn segment(raw: &str) -> String {
    let Ok(mut url) = Url::parse("http://segment.invalid/") else {
        return raw.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(raw);
    }
    url.path().trim_start_matches('/').to_string()
}

/// Encode a query-string value; here `+` does mean space.
fn query_value(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn wallet_path(wallet: &str, rest: &str) -> String {
    format!("{}/{}{}", WALLETS_API, segment(wallet), rest)
}

#[async_trait]
impl WalletApi for HttpWalletApi {
    async fn create_transfer(
        &self,
        session: &ApiSession,
        wallet: &str,
        signer: &str,
        request: &TransferRequest,
    ) -> Result<RemoteTransaction> {
        let path = wallet_path(
            wallet,
            &format!("/tokens/{}/transfers", segment(&request.token)),
        );
        let body = json!({
            "recipient": request.recipient,
            "amount": request.amount,
            "signer": signer,
        });

        let raw = self
            .client
            .call(session, Method::POST, &path, Some(&body))
            .await?;
        RemoteTransaction::from_value(&raw)
    }

    async fn get_transaction(
        &self,
        session: &ApiSession,
        wallet: &str,
        transaction_id: &str,
    ) -> Result<RemoteTransaction> {
        let path = wallet_path(wallet, &format!("/transactions/{}", segment(transaction_id)));
        let raw = self.client.call(session, Method::GET, &path, None).await?;
        RemoteTransaction::from_value(&raw)
    }

    async fn submit_approval(
        &self,
        session: &ApiSession,
        wallet: &str,
        transaction_id: &str,
        signer: &str,
        signature: &str,
    ) -> Result<RemoteTransaction> {
        let path = wallet_path(
            wallet,
            &format!("/transactions/{}/approvals", segment(transaction_id)),
        );
        let body = json!({
            "approvals": [{ "signer": signer, "signature": signature }]
        });

        let raw = self
            .client
            .call(session, Method::POST, &path, Some(&body))
            .await?;
        RemoteTransaction::from_value(&raw)
    }

    async fn create_order(
        &self,
        session: &ApiSession,
        request: &OrderRequest,
        payer_address: &str,
    ) -> Result<Order> {
        let body = request.to_body(payer_address);
        let raw = self
            .client
            .call(session, Method::POST, ORDERS_API, Some(&body))
            .await?;
        Order::from_value(&raw)
    }

    async fn create_wallet_transaction(
        &self,
        session: &ApiSession,
        wallet: &str,
        serialized_transaction: &str,
        signer: &str,
    ) -> Result<RemoteTransaction> {
        let path = wallet_path(wallet, "/transactions");
        let body = json!({
            "params": {
                "transaction": serialized_transaction,
                "signer": signer,
            }
        });

        let raw = self
            .client
            .call(session, Method::POST, &path, Some(&body))
            .await?;
        RemoteTransaction::from_value(&raw)
    }

    async fn confirm_payment(
        &self,
        session: &ApiSession,
        order_id: &str,
        on_chain_reference: &str,
    ) -> Result<Order> {
        let path = format!("{}/{}/payment", ORDERS_API, segment(order_id));
        let body = json!({ "type": CRYPTO_TX_ID, "txId": on_chain_reference });

        let raw = self
            .client
            .call(session, Method::POST, &path, Some(&body))
            .await?;

        // Some deployments acknowledge with an empty or partial body.
        match Order::from_value(&raw) {
            Ok(order) => Ok(order),
            Err(e) => {
                debug!(order_id, error = %e, "Confirmation reply has no order, re-reading it");
                self.get_order(session, order_id).await
            }
        }
    }

    async fn get_order(&self, session: &ApiSession, order_id: &str) -> Result<Order> {
        let path = format!("{}/{}", ORDERS_API, segment(order_id));
        let raw = self.client.call(session, Method::GET, &path, None).await?;
        Order::from_value(&raw)
    }

    async fn get_balances(
        &self,
        session: &ApiSession,
        wallet: &str,
        tokens: &[String],
    ) -> Result<Vec<TokenBalance>> {
        if tokens.is_empty() {
            warn!(wallet, "Balance query without tokens; the service may return nothing");
        }
        let query: Vec<String> = tokens.iter().map(|t| query_value(t)).collect();
        let path = wallet_path(wallet, &format!("/balances?tokens={}", query.join(",")));
        let raw = self.client.call(session, Method::GET, &path, None).await?;
        TokenBalance::list_from_value(&raw)
    }
}
