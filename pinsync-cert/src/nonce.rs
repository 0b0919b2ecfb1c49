use crate::error::{CertError, Result};
use uuid::Uuid;

/// Parse a machine UUID, with or without hyphens
pub fn parse_machine_uuid(value: &str) -> Result<Uuid> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CertError::InvalidCredential("empty machine uuid".into()));
    }
    Uuid::try_parse(trimmed)
        .map_err(|e| CertError::InvalidCredential(format!("malformed uuid '{}': {}", trimmed, e)))
}

/// Derive a stable machine UUID (v5, DNS namespace) from a source string
///
/// Controllers without a provisioned UUID feed a stable hardware value
/// (e.g. a MAC address) so the same machine always gets the same identity.
pub fn derive_machine_uuid(source: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, source.as_bytes())
}

/// Current unix time in whole seconds
pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build the signed nonce: raw uuid bytes followed by the decimal timestamp
pub fn build_nonce(uuid: &Uuid, timestamp: u64) -> Vec<u8> {
    let ts = timestamp.to_string();
    let mut nonce = Vec::with_capacity(16 + ts.len());
    nonce.extend_from_slice(uuid.as_bytes());
    nonce.extend_from_slice(ts.as_bytes());
    nonce
}
