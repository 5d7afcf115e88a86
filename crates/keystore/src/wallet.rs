//! Local ed25519 signer for delegated approvals.
//!
//! The custody service never sees this key; it only receives detached
//! signatures over the challenges it issues.

use custody_core::signing::ApprovalSigner;
use custody_core::{Error, Result};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::Rng;

/// Secret seed length of an ed25519 key.
pub const SEED_LEN: usize = 32;

/// An agent's signing key and its base-58 public address.
#[derive(Clone)]
pub struct LocalSigner {
    signing_key: SigningKey,
    address: String,
}

impl LocalSigner {
    /// Build the signer for a 32-byte secret seed.
    #[allow(clippy::result_large_err)]
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: [u8; SEED_LEN] = seed.try_into().map_err(|_| {
            Error::signing(format!(
                "signer seed must be {} bytes, got {}",
                SEED_LEN,
                seed.len()
            ))
        })?;

        let signing_key = SigningKey::from_bytes(&seed);
        let address = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Fresh random seed from the thread RNG.
    pub fn random_seed() -> [u8; SEED_LEN] {
        let mut seed = [0u8; SEED_LEN];
        rand::thread_rng().fill(&mut seed);
        seed
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl ApprovalSigner for LocalSigner {
    fn address(&self) -> &str {
        &self.address
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the seed in debug output
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish()
    }
}

/// Check a detached signature against a base-58 public address.
///
/// A malformed address is an error; a malformed or mismatching signature is
/// simply `false`.
#[allow(clippy::result_large_err)]
pub fn verify(address: &str, message: &[u8], signature: &[u8]) -> Result<bool> {
    let key_bytes: [u8; 32] = bs58::decode(address.trim())
        .into_vec()
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::signing(format!("'{}' is not an ed25519 address", address)))?;

    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| Error::signing(format!("invalid ed25519 public key: {}", e)))?;

    let Ok(signature) = Signature::from_slice(signature) else {
        return Ok(false);
    };

    Ok(verifying_key.verify(message, &signature).is_ok())
}
