//! REST request/response bodies for the cloud API

use serde::{Deserialize, Serialize};

// ==================== Endpoints ====================

pub const STOKEN_PATH: &str = "/api/stoken/";
pub const INSTALLED_PATH: &str = "/api/installed/";
pub const WS_TOKEN_PATH: &str = "/api/auth/ws/";
pub const HEARTBEAT_PATH: &str = "/api/heartbeat/";
pub const CONFIG_PATH: &str = "/api/config/";
pub const SESSION_LOG_PATH: &str = "/api/session_log/";
pub const ACHIEVEMENTS_PATH: &str = "/api/achievements/";
pub const CHALLENGES_PATH: &str = "/api/challenges/";
pub const PAIRED_PATH: &str = "/api/scorbitron_paired/";
pub const PAIR_CODE_PATH: &str = "/api/scorbitron_pair_code/";
pub const VENUE_MACHINES_PATH: &str = "/api/venuemachines/";

/// WebSocket endpoint, token passed as `?token=`
pub const WS_PATH: &str = "/ws/";

/// Scheme prefix of the `Authorization` header value
pub const AUTH_SCHEME: &str = "SToken";

/// Pairing resource of one machine; GET checks, DELETE unpairs
pub fn paired_path(uuid: &str) -> String {
    format!("{PAIRED_PATH}{uuid}/")
}

pub fn pair_code_path(uuid: &str) -> String {
    format!("{PAIR_CODE_PATH}{uuid}/")
}

pub fn top_scores_path(venuemachine_id: i64) -> String {
    format!("{VENUE_MACHINES_PATH}{venuemachine_id}/top_scores/")
}

// ==================== Session token ====================

/// Signed identity exchanged for a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StokenRequest {
    pub provider: String,
    /// Machine UUID, hyphenated
    pub uuid: String,
    pub serial_number: u64,
    pub machine_id: u64,
    /// Unix seconds used in the signed nonce
    pub timestamp: u64,
    /// Hex-encoded `r||s` signature
    pub sign: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StokenResponse {
    pub stoken: String,
}

// ==================== Installed ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRequest {
    #[serde(rename = "type")]
    pub client_type: String,
    pub version: String,
    pub installed: bool,
}

impl InstalledRequest {
    pub fn new(client_type: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_type: client_type.into(),
            version: version.into(),
            installed: true,
        }
    }
}

// ==================== WebSocket token ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsTokenResponse {
    pub token: String,
}

// ==================== Pairing ====================

/// Reply of the pairing check; no venue machine means unpaired
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PairedResponse {
    #[serde(default)]
    pub venuemachine_id: Option<i64>,
    #[serde(default)]
    pub opdb_id: Option<String>,
}

/// Six-character code shown on machines that cannot display a QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCodeResponse {
    pub shortcode: String,
}
