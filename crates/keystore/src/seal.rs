//! At-rest sealing of signer seeds with AES-256-GCM.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use custody_core::{Error, Result};
use rand::Rng;
use sha2::{Digest, Sha256};

/// AES-GCM nonce size (96 bits / 12 bytes as recommended).
const NONCE_SIZE: usize = 12;

/// Salt length for key derivation.
const SALT_SIZE: usize = 32;

/// A seed encrypted under the store's master key.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedSeed {
    /// Nonce followed by ciphertext and tag.
    pub ciphertext: Vec<u8>,
    pub salt: Vec<u8>,
}

impl SealedSeed {
    /// Encrypt `seed` with a fresh salt and nonce.
    #[allow(clippy::result_large_err)]
    pub fn seal(seed: &[u8], master_key: &[u8]) -> Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill(&mut salt);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill(&mut nonce_bytes);

        let cipher = cipher(master_key, &salt)?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), seed)
            .map_err(|e| Error::signing(format!("failed to seal signer seed: {}", e)))?;

        let mut ciphertext = Vec::with_capacity(NONCE_SIZE + sealed.len());
        ciphertext.extend_from_slice(&nonce_bytes);
        ciphertext.extend_from_slice(&sealed);

        Ok(Self {
            ciphertext,
            salt: salt.to_vec(),
        })
    }

    /// Decrypt the seed. A wrong master key or tampered record fails.
    #[allow(clippy::result_large_err)]
    pub fn open(&self, master_key: &[u8]) -> Result<Vec<u8>> {
        if self.ciphertext.len() < NONCE_SIZE {
            return Err(Error::signing("sealed seed is truncated"));
        }

        let (nonce, sealed) = self.ciphertext.split_at(NONCE_SIZE);
        cipher(master_key, &self.salt)?
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                Error::signing("cannot unseal signer seed (wrong master key or corrupted store)")
            })
    }
}

impl std::fmt::Debug for SealedSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedSeed")
            .field("len", &self.ciphertext.len())
            .finish()
    }
}

/// Key = SHA-256(master ‖ salt).
#[allow(clippy::result_large_err)]
fn cipher(master_key: &[u8], salt: &[u8]) -> Result<Aes256Gcm> {
    let mut hasher = Sha256::new();
    hasher.update(master_key);
    hasher.update(salt);
    let derived = hasher.finalize();

    Aes256Gcm::new_from_slice(&derived)
        .map_err(|e| Error::signing(format!("failed to create AES-GCM cipher: {}", e)))
}
