//! The delegated signer seen from the orchestrators.

use crate::{Error, Result};

/// Prefix the custody service uses for signers it does not hold keys for.
pub const EXTERNAL_SIGNER_PREFIX: &str = "external-wallet";

/// A locally held key able to answer approval challenges.
///
/// Implementations must be deterministic for a given key and message and must
/// never expose the secret through `Debug`.
pub trait ApprovalSigner: Send + Sync {
    /// Base-58 public address of the signer.
    fn address(&self) -> &str;

    /// Detached signature over `message`.
    #[allow(clippy::result_large_err)]
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// `external-wallet:<address>`, the locator naming this signer remotely.
    fn locator(&self) -> String {
        signer_locator(self.address())
    }

    /// Sign a base-58 challenge and return the base-58 signature.
    ///
    /// A challenge that does not decode is a fatal `Signing` error; the
    /// service will not accept a signature over anything else.
    #[allow(clippy::result_large_err)]
    fn sign_challenge(&self, challenge: &str) -> Result<String> {
        let message = decode_base58(challenge)?;
        let signature = self.sign(&message)?;
        Ok(bs58::encode(signature).into_string())
    }
}

pub fn signer_locator(address: &str) -> String {
    format!("{}:{}", EXTERNAL_SIGNER_PREFIX, address)
}

#[allow(clippy::result_large_err)]
pub fn decode_base58(encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(Error::signing("approval challenge is empty"));
    }
    bs58::decode(trimmed)
        .into_vec()
        .map_err(|e| Error::signing(format!("approval challenge is not valid base-58: {}", e)))
}
