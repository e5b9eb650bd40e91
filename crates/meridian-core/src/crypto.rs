// crates/meridian-core/src/crypto.rs

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::MeridianError;

/// An ed25519 keypair held by a validator for signing its own events.
pub struct Keypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Keypair {
    /// Generate a new random ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_secret(&signing_key.to_bytes())
    }

    /// Rebuild a keypair from the 32-byte secret.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Keypair {
            signing_key,
            verifying_key,
        }
    }

    /// Get the public key bytes (32 bytes).
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the secret key bytes (32 bytes).
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a message and return the signature bytes.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature = self.signing_key.sign(message);
        signature.to_bytes().to_vec()
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_secret(&self.secret_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Verify an ed25519 signature.
///
/// Returns `Ok(false)` for a well-formed but wrong signature and `Err` when
/// the key or signature bytes cannot be parsed at all.
pub fn verify_signature(
    public_key_bytes: &[u8; 32],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<bool, MeridianError> {
    let verifying_key = VerifyingKey::from_bytes(public_key_bytes)
        .map_err(|e| MeridianError::Crypto(format!("Invalid public key: {}", e)))?;

    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| MeridianError::Crypto("Signature must be exactly 64 bytes".to_string()))?;

    let signature = ed25519_dalek::Signature::from_bytes(&signature_array);

    match verifying_key.verify(message, &signature) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Decode a hex-encoded 32-byte key (public or secret).
pub fn decode_key_hex(hex_str: &str) -> Result<[u8; 32], MeridianError> {
    let bytes = hex::decode(hex_str.trim().trim_start_matches("0x"))?;
    bytes
        .try_into()
        .map_err(|_| MeridianError::Crypto("Key must be exactly 32 bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"meridian event id";

        let signature = keypair.sign(message);
        let pubkey = keypair.public_key_bytes();

        assert!(verify_signature(&pubkey, message, &signature).unwrap());

        // Verify wrong message fails
        assert!(!verify_signature(&pubkey, b"wrong message", &signature).unwrap());
    }

    #[test]
    fn test_short_signature_is_an_error() {
        let keypair = Keypair::generate();
        let result = verify_signature(&keypair.public_key_bytes(), b"msg", &[0u8; 10]);
        assert!(matches!(result, Err(MeridianError::Crypto(_))));
    }

    #[test]
    fn test_keypair_from_secret_roundtrip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_secret(&keypair.secret_bytes());
        assert_eq!(keypair.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn test_decode_key_hex() {
        let keypair = Keypair::generate();
        let encoded = format!("0x{}\n", hex::encode(keypair.public_key_bytes()));
        assert_eq!(decode_key_hex(&encoded).unwrap(), keypair.public_key_bytes());
        assert!(decode_key_hex("abcd").is_err());
    }
}
