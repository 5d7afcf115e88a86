//! Agent wallet identity and session types.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public half of an agent's delegated-signer identity.
///
/// The secret seed never leaves the keystore; this value only carries what the
/// orchestrators need to address the custody service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub agent_id: String,
    /// Base-58 ed25519 public key of the local signer.
    pub public_address: String,
    /// Present once the out-of-band delegation step has completed.
    pub credential: Option<DelegationCredential>,
    pub created_at: DateTime<Utc>,
}

impl WalletIdentity {
    /// Usable for remote operations iff an address and a credential are present.
    pub fn is_usable(&self) -> bool {
        !self.public_address.is_empty() && self.credential.is_some()
    }

    /// The custody (smart wallet) address funds are held at.
    #[allow(clippy::result_large_err)]
    pub fn custody_address(&self) -> Result<&str> {
        self.credential
            .as_ref()
            .map(|c| c.custody_address.as_str())
            .ok_or_else(|| self.unconfigured())
    }

    /// Build the session for remote calls against `endpoint_base`.
    #[allow(clippy::result_large_err)]
    pub fn session(&self, endpoint_base: &str) -> Result<ApiSession> {
        if self.public_address.is_empty() {
            return Err(Error::configuration(format!(
                "agent '{}' has no signer address",
                self.agent_id
            )));
        }
        let credential = self.credential.as_ref().ok_or_else(|| self.unconfigured())?;
        Ok(ApiSession::new(endpoint_base, credential.api_key.clone()))
    }

    fn unconfigured(&self) -> Error {
        Error::configuration(format!(
            "agent '{}' has no delegation credential; configure a custody address and API key first",
            self.agent_id
        ))
    }
}

/// Custody address and API key attached after delegation is authorized.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationCredential {
    pub custody_address: String,
    pub api_key: String,
}

impl std::fmt::Debug for DelegationCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationCredential")
            .field("custody_address", &self.custody_address)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Endpoint and API key threaded through every remote call.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSession {
    endpoint_base: String,
    api_key: String,
}

impl ApiSession {
    pub fn new(endpoint_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let endpoint_base: String = endpoint_base.into();
        Self {
            endpoint_base: endpoint_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint_base(&self) -> &str {
        &self.endpoint_base
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Absolute URL for an API path such as `/api/2022-06-09/orders`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint_base, path.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSession")
            .field("endpoint_base", &self.endpoint_base)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
