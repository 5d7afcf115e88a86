//! Keystore for agent wallet identities.

use crate::seal::SealedSeed;
use crate::store::{self, StoredIdentity, StoredSecret, WalletMap};
use crate::wallet::LocalSigner;
use base64::Engine;
use chrono::Utc;
use custody_core::config::StoreConfig;
use custody_core::signing::ApprovalSigner;
use custody_core::types::{DelegationCredential, WalletIdentity};
use custody_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Storage backend for identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum KeystoreProvider {
    /// JSON wallet file with owner-only permissions.
    File { path: PathBuf },
    /// Process memory (testing and ephemeral agents).
    Memory,
}

impl Default for KeystoreProvider {
    fn default() -> Self {
        Self::Memory
    }
}

/// Owns one delegated-signer keypair per agent id.
///
/// Every mutation is a read-modify-write of the whole mapping, serialized by
/// an in-process lock and, for the file backend, an advisory lock shared with
/// other processes. Reads take no lock.
pub struct Keystore {
    provider: KeystoreProvider,
    /// Seals seeds at rest when set.
    master_key: Option<Vec<u8>>,
    write_lock: Mutex<()>,
    memory: RwLock<WalletMap>,
}

impl Keystore {
    pub fn new(provider: KeystoreProvider, master_key: Option<Vec<u8>>) -> Self {
        Self {
            provider,
            master_key,
            write_lock: Mutex::new(()),
            memory: RwLock::new(WalletMap::new()),
        }
    }

    /// In-memory keystore without sealing.
    pub fn in_memory() -> Self {
        Self::new(KeystoreProvider::Memory, None)
    }

    /// File keystore at the configured path.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            KeystoreProvider::File {
                path: config.path.clone(),
            },
            config.master_key.as_ref().map(|k| k.as_bytes().to_vec()),
        )
    }

    pub fn provider(&self) -> &KeystoreProvider {
        &self.provider
    }

    /// Return the agent's identity, creating a fresh keypair on first use.
    ///
    /// Idempotent: once created, the stored address and secret are returned
    /// unchanged on every later call.
    pub async fn get_or_create(&self, agent_id: &str) -> Result<WalletIdentity> {
        validate_agent_id(agent_id)?;

        if let Some(identity) = self.get(agent_id).await? {
            return Ok(identity);
        }

        let seed = LocalSigner::random_seed();
        let signer = LocalSigner::from_seed(&seed)?;
        let secret = self.encode_secret(&seed)?;
        let candidate = StoredIdentity {
            public_address: signer.address().to_string(),
            secret,
            credential: None,
            created_at: Utc::now(),
        };

        let id = agent_id.to_string();
        let (record, created) = self
            .mutate(move |map| {
                // Another writer may have won the race since the read above.
                if let Some(existing) = map.get(&id) {
                    return Ok(((existing.clone(), false), false));
                }
                map.insert(id, candidate.clone());
                Ok(((candidate, true), true))
            })
            .await?;

        if created {
            info!(
                agent_id = %agent_id,
                address = %record.public_address,
                sealed = self.master_key.is_some(),
                "Created wallet identity"
            );
        }

        Ok(to_identity(agent_id, &record))
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<WalletIdentity>> {
        Ok(self
            .load(agent_id)
            .await?
            .map(|record| to_identity(agent_id, &record)))
    }

    /// Attach the delegation credential obtained out of band.
    ///
    /// Fails with `NotFound`, leaving the store untouched, when the agent has
    /// no identity yet.
    pub async fn attach_credential(
        &self,
        agent_id: &str,
        custody_address: &str,
        api_key: &str,
    ) -> Result<WalletIdentity> {
        validate_agent_id(agent_id)?;
        if custody_address.trim().is_empty() {
            return Err(Error::validation("custodyAddress", "is required"));
        }
        if api_key.trim().is_empty() {
            return Err(Error::validation("apiKey", "is required"));
        }

        let credential = DelegationCredential {
            custody_address: custody_address.trim().to_string(),
            api_key: api_key.trim().to_string(),
        };
        let id = agent_id.to_string();
        let record = self
            .mutate(move |map| {
                let Some(record) = map.get_mut(&id) else {
                    return Err(Error::NotFound { agent_id: id });
                };
                record.credential = Some(credential);
                Ok((record.clone(), true))
            })
            .await?;

        info!(
            agent_id = %agent_id,
            custody_address = %custody_address.trim(),
            "Attached delegation credential"
        );
        Ok(to_identity(agent_id, &record))
    }

    /// Remove the identity. Returns whether one existed.
    pub async fn delete(&self, agent_id: &str) -> Result<bool> {
        let id = agent_id.to_string();
        let removed = self
            .mutate(move |map| {
                let removed = map.remove(&id).is_some();
                Ok((removed, removed))
            })
            .await?;

        if removed {
            info!(agent_id = %agent_id, "Wallet identity deleted");
        }
        Ok(removed)
    }

    /// All agent ids with an identity, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self.snapshot().await?.into_keys().collect())
    }

    /// Load the agent's signing key.
    pub async fn signer(&self, agent_id: &str) -> Result<LocalSigner> {
        let record = self
            .load(agent_id)
            .await?
            .ok_or_else(|| Error::KeyNotFound {
                agent_id: agent_id.to_string(),
            })?;

        let seed = self.decode_secret(agent_id, &record.secret)?;
        let signer = LocalSigner::from_seed(&seed)?;
        if signer.address() != record.public_address {
            return Err(Error::storage(format!(
                "stored address for agent '{}' does not match its key",
                agent_id
            )));
        }

        debug!(agent_id = %agent_id, "Loaded signer");
        Ok(signer)
    }

    /// Detached ed25519 signature over `message` with the agent's key.
    pub async fn sign(&self, agent_id: &str, message: &[u8]) -> Result<Vec<u8>> {
        self.signer(agent_id).await?.sign(message)
    }

    // Private methods

    async fn load(&self, agent_id: &str) -> Result<Option<StoredIdentity>> {
        match &self.provider {
            KeystoreProvider::Memory => Ok(self.memory.read().await.get(agent_id).cloned()),
            KeystoreProvider::File { .. } => Ok(self.snapshot().await?.remove(agent_id)),
        }
    }

    async fn snapshot(&self) -> Result<WalletMap> {
        match &self.provider {
            KeystoreProvider::Memory => Ok(self.memory.read().await.clone()),
            KeystoreProvider::File { path } => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || store::read(&path))
                    .await
                    .map_err(|e| Error::storage(format!("wallet store read task failed: {}", e)))?
            }
        }
    }

    /// Serialized read-modify-write. `apply` returns `(result, changed)`.
    async fn mutate<R, F>(&self, apply: F) -> Result<R>
    where
        F: FnOnce(&mut WalletMap) -> Result<(R, bool)> + Send + 'static,
        R: Send + 'static,
    {
        let _guard = self.write_lock.lock().await;

        match &self.provider {
            KeystoreProvider::Memory => {
                let mut map = self.memory.write().await;
                let mut next = map.clone();
                let (value, changed) = apply(&mut next)?;
                if changed {
                    *map = next;
                }
                Ok(value)
            }
            KeystoreProvider::File { path } => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || store::mutate(&path, apply))
                    .await
                    .map_err(|e| Error::storage(format!("wallet store write task failed: {}", e)))?
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn encode_secret(&self, seed: &[u8]) -> Result<StoredSecret> {
        let engine = base64::engine::general_purpose::STANDARD;
        match &self.master_key {
            Some(master_key) => {
                let sealed = SealedSeed::seal(seed, master_key)?;
                Ok(StoredSecret::Sealed {
                    ciphertext: engine.encode(&sealed.ciphertext),
                    salt: engine.encode(&sealed.salt),
                })
            }
            None => Ok(StoredSecret::Plain {
                seed: bs58::encode(seed).into_string(),
            }),
        }
    }

    #[allow(clippy::result_large_err)]
    fn decode_secret(&self, agent_id: &str, secret: &StoredSecret) -> Result<Vec<u8>> {
        let corrupt = |what: &str| {
            Error::storage(format!("stored {} for agent '{}' is corrupt", what, agent_id))
        };

        match secret {
            StoredSecret::Plain { seed } => bs58::decode(seed)
                .into_vec()
                .map_err(|_| corrupt("seed")),
            StoredSecret::Sealed { ciphertext, salt } => {
                let master_key = self.master_key.as_ref().ok_or_else(|| {
                    Error::configuration(format!(
                        "wallet for agent '{}' is sealed; set WALLET_MASTER_KEY",
                        agent_id
                    ))
                })?;
                let engine = base64::engine::general_purpose::STANDARD;
                let sealed = SealedSeed {
                    ciphertext: engine.decode(ciphertext).map_err(|_| corrupt("ciphertext"))?,
                    salt: engine.decode(salt).map_err(|_| corrupt("salt"))?,
                };
                sealed.open(master_key)
            }
        }
    }
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("provider", &self.provider)
            .field("sealed", &self.master_key.is_some())
            .finish()
    }
}

#[allow(clippy::result_large_err)]
fn validate_agent_id(agent_id: &str) -> Result<()> {
    if agent_id.trim().is_empty() {
        return Err(Error::validation("agentId", "is required"));
    }
    Ok(())
}

fn to_identity(agent_id: &str, record: &StoredIdentity) -> WalletIdentity {
    WalletIdentity {
        agent_id: agent_id.to_string(),
        public_address: record.public_address.clone(),
        credential: record.credential.clone(),
        created_at: record.created_at,
    }
}
