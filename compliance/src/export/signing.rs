//! Ed25519-signed, time-limited retrieval links for export manifests.
//!
//! A link authorizes `GET` of exactly one manifest key until its expiry. The
//! signed message is `"{manifestKey}\n{expires}"`, hashed with SHA-256.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{ComplianceError, ComplianceResult};

/// Signs and checks manifest links.
#[derive(Clone)]
pub struct LinkSigner {
    signing_key: SigningKey,
}

impl LinkSigner {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Build from a 32-byte seed given as 64 hex characters.
    pub fn from_hex_seed(seed_hex: &str) -> ComplianceResult<Self> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| ComplianceError::config(format!("signing key is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ComplianceError::config(format!(
                "signing key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(SigningKey::from_bytes(&seed)))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded signature over `key` and `expires`.
    pub fn sign_link(&self, key: &str, expires: i64) -> String {
        let digest = link_digest(key, expires);
        hex::encode(self.signing_key.sign(&digest).to_bytes())
    }

    /// Check a link's signature, then its expiry against `now` (unix seconds).
    pub fn verify_link(
        &self,
        key: &str,
        expires: i64,
        signature_hex: &str,
        now: i64,
    ) -> ComplianceResult<()> {
        let bytes = hex::decode(signature_hex)
            .map_err(|_| ComplianceError::signature("link signature is not hex"))?;
        if bytes.len() != 64 {
            return Err(ComplianceError::signature(format!(
                "Invalid signature length: {} (expected 64)",
                bytes.len()
            )));
        }
        let mut sig_array = [0u8; 64];
        sig_array.copy_from_slice(&bytes);
        let signature = Signature::from_bytes(&sig_array);

        let digest = link_digest(key, expires);
        self.verifying_key()
            .verify_strict(&digest, &signature)
            .map_err(|_| ComplianceError::signature("link signature does not match"))?;

        if now >= expires {
            return Err(ComplianceError::signature("link has expired"));
        }
        Ok(())
    }
}

fn link_digest(key: &str, expires: i64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b"\n");
    hasher.update(expires.to_string().as_bytes());
    hasher.finalize().into()
}
