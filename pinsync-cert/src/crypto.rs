use crate::error::{CertError, Result};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// Length of a raw P-256 private scalar
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// Length of a fixed-size `r || s` signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Load a signing key from a raw 32-byte scalar
pub fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey> {
    if bytes.len() != PRIVATE_KEY_LENGTH {
        return Err(CertError::InvalidCredential(format!(
            "private key must be {} bytes, got {}",
            PRIVATE_KEY_LENGTH,
            bytes.len()
        )));
    }
    SigningKey::from_slice(bytes).map_err(|_| CertError::InvalidKey)
}

/// Load a signing key from a 64-character hex scalar
pub fn signing_key_from_hex(hex_key: &str) -> Result<SigningKey> {
    let bytes = hex::decode(hex_key.trim())?;
    signing_key_from_bytes(&bytes)
}

/// Derive a signing key from arbitrary seed bytes (`SHA-256(seed)` is the scalar)
pub fn signing_key_from_seed(seed: &[u8]) -> Result<SigningKey> {
    if seed.is_empty() {
        return Err(CertError::InvalidCredential("empty key seed".into()));
    }
    let digest = Sha256::digest(seed);
    signing_key_from_bytes(&digest)
}

/// Sign data with ECDSA P-256 / SHA-256 (RFC 6979 deterministic nonce)
///
/// Returns the fixed-size `r || s` encoding.
pub fn sign(key: &SigningKey, data: &[u8]) -> Vec<u8> {
    let signature: Signature = key.sign(data);
    signature.to_bytes().to_vec()
}

/// Uncompressed SEC1 encoding of the public key belonging to `key`
pub fn public_key_sec1(key: &SigningKey) -> Vec<u8> {
    key.verifying_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec()
}

/// Verify a `r || s` signature against a SEC1-encoded public key
pub fn verify(public_key: &[u8], data: &[u8], sig: &[u8]) -> Result<()> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| CertError::VerificationFailed(format!("Invalid public key: {}", e)))?;
    let signature = Signature::from_slice(sig)
        .map_err(|e| CertError::VerificationFailed(format!("Malformed signature: {}", e)))?;

    verifying_key
        .verify(data, &signature)
        .map_err(|_| CertError::VerificationFailed("Signature verification failed".into()))
}
