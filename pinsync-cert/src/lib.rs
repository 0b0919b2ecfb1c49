//! Device credential signing for pinsync
//!
//! ECDSA P-256 / SHA-256 over the identity nonce `uuid ++ timestamp`.

mod crypto;
mod error;
mod nonce;
pub mod signer;

pub use crypto::{
    PRIVATE_KEY_LENGTH, SIGNATURE_LENGTH, public_key_sec1, sign, signing_key_from_bytes,
    signing_key_from_hex, signing_key_from_seed, verify,
};
pub use error::{CertError, Result};
pub use nonce::{build_nonce, derive_machine_uuid, parse_machine_uuid, unix_timestamp};
pub use signer::{
    CredentialVerifier, ProviderType, SecureSigner, SignedNonce, SoftwareSigner, sign_identity,
    sign_identity_at,
};
