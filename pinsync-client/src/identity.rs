//! Device identity

use crate::error::{ClientError, ClientResult};
use pinsync_cert::{SecureSigner, SoftwareSigner};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Who this machine is, as registered with the cloud
///
/// Immutable once handed to the session manager. The private key never
/// appears in `Debug` output.
#[derive(Clone)]
pub struct DeviceIdentity {
    /// Signing provider name, sent verbatim
    pub provider: String,
    pub uuid: Uuid,
    pub machine_serial: u64,
    pub machine_id: u64,
    pub software_version: String,
    signer: Arc<dyn SecureSigner>,
}

impl DeviceIdentity {
    /// Build from raw key material: 32 bytes, 64 hex chars, or a seed.
    /// The UUID may be given with or without hyphens.
    pub fn new(
        provider: impl Into<String>,
        uuid: &str,
        machine_serial: u64,
        machine_id: u64,
        software_version: impl Into<String>,
        private_key: &[u8],
    ) -> ClientResult<Self> {
        let signer = SoftwareSigner::from_key_material(private_key)?;
        Self::with_signer(
            provider,
            uuid,
            machine_serial,
            machine_id,
            software_version,
            Arc::new(signer),
        )
    }

    /// Build around an external signer (secure element, TPM)
    pub fn with_signer(
        provider: impl Into<String>,
        uuid: &str,
        machine_serial: u64,
        machine_id: u64,
        software_version: impl Into<String>,
        signer: Arc<dyn SecureSigner>,
    ) -> ClientResult<Self> {
        let provider = provider.into();
        if provider.is_empty() {
            return Err(ClientError::InvalidCredential("empty provider".into()));
        }
        Ok(Self {
            provider,
            uuid: pinsync_cert::parse_machine_uuid(uuid)?,
            machine_serial,
            machine_id,
            software_version: software_version.into(),
            signer,
        })
    }

    pub fn signer(&self) -> &dyn SecureSigner {
        self.signer.as_ref()
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("provider", &self.provider)
            .field("uuid", &self.uuid)
            .field("machine_serial", &self.machine_serial)
            .field("machine_id", &self.machine_id)
            .field("software_version", &self.software_version)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
