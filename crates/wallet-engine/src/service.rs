//! Caller-facing wallet operations keyed by agent id.

use crate::purchase::{PurchaseOrchestrator, PurchaseResult};
use crate::transfer::TransferOrchestrator;
use custody_core::api::{HttpWalletApi, RemoteClient, WalletApi};
use custody_core::config::{Config, PollingConfig};
use custody_core::types::{
    ApiSession, Order, OrderRequest, RemoteTransaction, TokenBalance, TransferRequest,
    WalletIdentity,
};
use custody_core::{Error, Result};
use keystore::Keystore;
use std::sync::Arc;
use tracing::info;

/// Tokens reported by `balance` when the caller names none.
pub const DEFAULT_BALANCE_TOKENS: [&str; 2] = ["sol", "usdc"];

/// Resolves an agent's identity and session, then delegates to the
/// orchestrators.
pub struct AgentWallet {
    keystore: Arc<Keystore>,
    api: Arc<dyn WalletApi>,
    endpoint_base: String,
    transfers: TransferOrchestrator,
    purchases: PurchaseOrchestrator,
}

impl AgentWallet {
    pub fn new(
        keystore: Arc<Keystore>,
        api: Arc<dyn WalletApi>,
        endpoint_base: impl Into<String>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            transfers: TransferOrchestrator::new(api.clone(), polling),
            purchases: PurchaseOrchestrator::new(api.clone(), polling),
            keystore,
            api,
            endpoint_base: endpoint_base.into(),
        }
    }

    /// File keystore and HTTP client as configured.
    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = RemoteClient::new(config.remote.timeout())?;
        Ok(Self::new(
            Arc::new(Keystore::from_config(&config.store)),
            Arc::new(HttpWalletApi::new(client)),
            config.remote.base_url.clone(),
            config.polling,
        ))
    }

    pub fn keystore(&self) -> &Keystore {
        &self.keystore
    }

    /// Create (or return) the agent's signer identity.
    pub async fn setup(&self, agent_id: &str) -> Result<WalletIdentity> {
        self.keystore.get_or_create(agent_id).await
    }

    /// Attach the custody address and API key obtained after delegation.
    pub async fn configure(
        &self,
        agent_id: &str,
        custody_address: &str,
        api_key: &str,
    ) -> Result<WalletIdentity> {
        self.keystore
            .attach_credential(agent_id, custody_address, api_key)
            .await
    }

    pub async fn identity(&self, agent_id: &str) -> Result<WalletIdentity> {
        self.keystore
            .get(agent_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                agent_id: agent_id.to_string(),
            })
    }

    pub async fn remove(&self, agent_id: &str) -> Result<bool> {
        self.keystore.delete(agent_id).await
    }

    /// Balances of `tokens` (or `DEFAULT_BALANCE_TOKENS`) in the custody wallet.
    pub async fn balance(&self, agent_id: &str, tokens: &[String]) -> Result<Vec<TokenBalance>> {
        let (identity, session) = self.context(agent_id).await?;
        let tokens: Vec<String> = if tokens.is_empty() {
            DEFAULT_BALANCE_TOKENS.iter().map(|t| t.to_string()).collect()
        } else {
            tokens.to_vec()
        };

        self.api
            .get_balances(&session, identity.custody_address()?, &tokens)
            .await
    }

    pub async fn transfer(
        &self,
        agent_id: &str,
        request: &TransferRequest,
    ) -> Result<RemoteTransaction> {
        request.validate()?;
        let (identity, session) = self.context(agent_id).await?;
        let signer = self.keystore.signer(agent_id).await?;

        self.transfers
            .transfer(&session, &signer, identity.custody_address()?, request)
            .await
    }

    /// Poll a transaction until terminal or the transfer wait deadline.
    pub async fn wait_for_transaction(
        &self,
        agent_id: &str,
        transaction_id: &str,
    ) -> Result<RemoteTransaction> {
        let (identity, session) = self.context(agent_id).await?;
        self.transfers
            .wait_for_terminal(&session, identity.custody_address()?, transaction_id, None)
            .await
    }

    pub async fn transaction_status(
        &self,
        agent_id: &str,
        transaction_id: &str,
    ) -> Result<RemoteTransaction> {
        let (identity, session) = self.context(agent_id).await?;
        self.transfers
            .transaction_status(&session, identity.custody_address()?, transaction_id)
            .await
    }

    pub async fn purchase(&self, agent_id: &str, request: &OrderRequest) -> Result<PurchaseResult> {
        request.validate()?;
        let (identity, session) = self.context(agent_id).await?;
        let signer = self.keystore.signer(agent_id).await?;

        let result = self
            .purchases
            .purchase(&session, &signer, identity.custody_address()?, request)
            .await?;

        info!(
            agent_id,
            order_id = %result.order_id(),
            on_chain_reference = %result.on_chain_reference,
            "Purchase confirmed"
        );
        Ok(result)
    }

    /// Finish a purchase interrupted after its approval was submitted.
    pub async fn resume_purchase(
        &self,
        agent_id: &str,
        order_id: &str,
        transaction_id: &str,
    ) -> Result<PurchaseResult> {
        let (identity, session) = self.context(agent_id).await?;
        self.purchases
            .resume(&session, identity.custody_address()?, order_id, transaction_id)
            .await
    }

    pub async fn order_status(&self, agent_id: &str, order_id: &str) -> Result<Order> {
        let (_, session) = self.context(agent_id).await?;
        self.purchases.order_status(&session, order_id).await
    }

    async fn context(&self, agent_id: &str) -> Result<(WalletIdentity, ApiSession)> {
        let identity = self.identity(agent_id).await?;
        let session = identity.session(&self.endpoint_base)?;
        Ok((identity, session))
    }
}
