use crate::crypto;
use crate::error::{CertError, Result};
use crate::nonce;
use async_trait::async_trait;
use p256::ecdsa::SigningKey;
use uuid::Uuid;

/// Where the private key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Software,
    Tpm,
    SecureElement,
}

/// Signing capability over device credentials
///
/// Callers never see the private key, they can only ask for a signature.
/// A controller with a secure element implements this trait and hands it
/// to the session manager instead of raw key bytes.
#[async_trait]
pub trait SecureSigner: Send + Sync {
    /// Uncompressed SEC1 public key
    fn public_key(&self) -> Result<Vec<u8>>;

    /// Sign `data`, returning the 64-byte `r || s` signature
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn provider_type(&self) -> ProviderType;
}

/// In-memory P-256 signer
pub struct SoftwareSigner {
    key: SigningKey,
    pub_key: Vec<u8>,
}

impl SoftwareSigner {
    pub fn from_key(key: SigningKey) -> Self {
        let pub_key = crypto::public_key_sec1(&key);
        Self { key, pub_key }
    }

    /// Raw 32-byte private scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        crypto::signing_key_from_bytes(bytes).map(Self::from_key)
    }

    /// Hex-encoded private scalar
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        crypto::signing_key_from_hex(hex_key).map(Self::from_key)
    }

    /// Arbitrary seed, hashed with SHA-256 into the scalar
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        crypto::signing_key_from_seed(seed).map(Self::from_key)
    }

    /// Accepts whatever a device was provisioned with: 32 raw bytes,
    /// 64 hex characters, or a free-form seed.
    pub fn from_key_material(material: &[u8]) -> Result<Self> {
        if material.len() == crypto::PRIVATE_KEY_LENGTH {
            return Self::from_bytes(material);
        }
        if material.len() == crypto::PRIVATE_KEY_LENGTH * 2
            && let Ok(text) = std::str::from_utf8(material)
            && text.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Self::from_hex(text);
        }
        Self::from_seed(material)
    }

    /// Synchronous signing, used by tests and non-async callers
    pub fn sign_blocking(&self, data: &[u8]) -> Vec<u8> {
        crypto::sign(&self.key, data)
    }
}

impl std::fmt::Debug for SoftwareSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareSigner")
            .field("public_key", &hex::encode(&self.pub_key))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecureSigner for SoftwareSigner {
    fn public_key(&self) -> Result<Vec<u8>> {
        Ok(self.pub_key.clone())
    }

    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(crypto::sign(&self.key, data))
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Software
    }
}

/// Checks signatures produced by a device
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    public_key: Vec<u8>,
}

impl CredentialVerifier {
    pub fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }

    pub fn verify(&self, signature: &[u8], nonce: &[u8]) -> bool {
        crypto::verify(&self.public_key, nonce, signature).is_ok()
    }
}

/// Signature over the identity nonce, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedNonce {
    pub timestamp: u64,
    /// Lowercase hex of the `r || s` signature
    pub signature: String,
}

/// Sign `uuid ++ timestamp` with the given signer
///
/// The timestamp is always taken at call time so a replayed request is
/// rejected server-side.
pub async fn sign_identity(signer: &dyn SecureSigner, uuid: &Uuid) -> Result<SignedNonce> {
    let timestamp = nonce::unix_timestamp();
    sign_identity_at(signer, uuid, timestamp).await
}

pub async fn sign_identity_at(
    signer: &dyn SecureSigner,
    uuid: &Uuid,
    timestamp: u64,
) -> Result<SignedNonce> {
    let data = nonce::build_nonce(uuid, timestamp);
    let signature = signer.sign(&data).await?;
    if signature.len() != crypto::SIGNATURE_LENGTH {
        return Err(CertError::SigningFailed(format!(
            "signer returned {} bytes",
            signature.len()
        )));
    }
    tracing::debug!(
        provider = ?signer.provider_type(),
        timestamp,
        "Signed identity nonce"
    );
    Ok(SignedNonce {
        timestamp,
        signature: hex::encode(signature),
    })
}
