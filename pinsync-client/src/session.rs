//! Session manager
//!
//! Owns the device identity and the session token.
//!
//! ```text
//! Uninitialized -> Authenticating -> Authenticated <-> Reauthenticating
//!                        |                                  |
//!                        +------------> Failed <------------+
//! ```
//!
//! Only an explicit `initialize` leaves `Failed`. A call that times out
//! leaves the state alone; only an auth failure triggers re-signing.
//!
//! Pairing with a venue is tracked next to the session state; operations
//! tied to a venue machine fail with `NotPaired` until a check reports one.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::http::{Method, MultipartBody, RequestBody, RestClient, TokenCell};
use crate::identity::DeviceIdentity;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::SessionLog;
use shared::api::{
    ACHIEVEMENTS_PATH, CHALLENGES_PATH, CONFIG_PATH, HEARTBEAT_PATH, INSTALLED_PATH,
    InstalledRequest, PairCodeResponse, PairedResponse, SESSION_LOG_PATH, STOKEN_PATH,
    StokenRequest, StokenResponse, WS_TOKEN_PATH, WsTokenResponse, pair_code_path, paired_path,
    top_scores_path,
};
use shared::game::{Player, Score, is_valid_player};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Authenticated,
    Reauthenticating,
    Failed,
}

impl SessionState {
    /// Whether token-bearing calls may be issued
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticated | SessionState::Reauthenticating
        )
    }
}

/// Venue machine this cabinet is paired with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueMachine {
    pub venuemachine_id: i64,
    pub opdb_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingStatus {
    Unknown,
    Checking,
    Unpaired,
    Paired(VenueMachine),
}

impl PairingStatus {
    pub fn venue_machine(&self) -> Option<&VenueMachine> {
        match self {
            PairingStatus::Paired(vm) => Some(vm),
            _ => None,
        }
    }

    fn from_response(response: PairedResponse) -> Self {
        match response.venuemachine_id {
            Some(id) if id > 0 => PairingStatus::Paired(VenueMachine {
                venuemachine_id: id,
                opdb_id: response.opdb_id.unwrap_or_default(),
            }),
            _ => PairingStatus::Unpaired,
        }
    }
}

/// Combined view of session and pairing, for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    NotAuthenticated,
    Authenticating,
    AuthenticatedCheckingPairing,
    AuthenticatedUnpaired,
    AuthenticatedPaired,
    AuthenticationFailed,
}

/// Source of short-lived WebSocket tokens
#[async_trait]
pub trait WsTokenSource: Send + Sync {
    async fn ws_token(&self) -> ClientResult<String>;
}

pub struct SessionManager {
    config: ClientConfig,
    rest: RestClient,
    token: TokenCell,
    identity: RwLock<Option<DeviceIdentity>>,
    state: watch::Sender<SessionState>,
    init_lock: tokio::sync::Mutex<()>,
    reauth_lock: tokio::sync::Mutex<()>,
    installed: AtomicBool,
    pairing: watch::Sender<PairingStatus>,
    pair_code: RwLock<Option<String>>,
}

impl SessionManager {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let token = TokenCell::new();
        let rest = RestClient::new(&config, token.clone())?;
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let (pairing, _) = watch::channel(PairingStatus::Unknown);
        Ok(Self {
            config,
            rest,
            token,
            identity: RwLock::new(None),
            state,
            init_lock: tokio::sync::Mutex::new(()),
            reauth_lock: tokio::sync::Mutex::new(()),
            installed: AtomicBool::new(false),
            pairing,
            pair_code: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.identity.read().clone()
    }

    /// Current session token (or the developer token)
    pub fn token(&self) -> Option<String> {
        self.config
            .developer_token
            .clone()
            .or_else(|| self.token.get())
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn pairing(&self) -> PairingStatus {
        self.pairing.borrow().clone()
    }

    pub fn subscribe_pairing(&self) -> watch::Receiver<PairingStatus> {
        self.pairing.subscribe()
    }

    pub fn auth_status(&self) -> AuthStatus {
        match self.state() {
            SessionState::Uninitialized => AuthStatus::NotAuthenticated,
            SessionState::Authenticating | SessionState::Reauthenticating => {
                AuthStatus::Authenticating
            }
            SessionState::Failed => AuthStatus::AuthenticationFailed,
            SessionState::Authenticated => match &*self.pairing.borrow() {
                PairingStatus::Paired(_) => AuthStatus::AuthenticatedPaired,
                PairingStatus::Unpaired => AuthStatus::AuthenticatedUnpaired,
                PairingStatus::Unknown | PairingStatus::Checking => {
                    AuthStatus::AuthenticatedCheckingPairing
                }
            },
        }
    }

    fn set_pairing(&self, next: PairingStatus) {
        let prev = self.pairing.send_replace(next.clone());
        if prev != next {
            tracing::info!(from = ?prev, to = ?next, "Pairing status changed");
        }
    }

    fn require_identity(&self) -> ClientResult<DeviceIdentity> {
        self.identity()
            .ok_or_else(|| ClientError::InvalidState("session not initialized".into()))
    }

    fn require_paired(&self) -> ClientResult<VenueMachine> {
        self.pairing
            .borrow()
            .venue_machine()
            .cloned()
            .ok_or(ClientError::NotPaired)
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::info!(from = ?prev, to = ?next, "Session state changed");
        }
    }

    // ========== Authentication ==========

    /// Authenticate the device and announce the installation
    ///
    /// Errors during authentication leave the manager in `Failed`; they
    /// are not retried.
    pub async fn initialize(&self, identity: DeviceIdentity) -> ClientResult<()> {
        // Held for the whole bootstrap; a second caller is turned away
        let Ok(_init) = self.init_lock.try_lock() else {
            return Err(ClientError::InvalidState(
                "authentication already in progress".into(),
            ));
        };
        if self.state() == SessionState::Reauthenticating {
            return Err(ClientError::InvalidState(
                "authentication already in progress".into(),
            ));
        }

        tracing::info!(
            uuid = %identity.uuid,
            machine_id = identity.machine_id,
            provider = %identity.provider,
            "Initializing session"
        );
        *self.identity.write() = Some(identity.clone());
        *self.pair_code.write() = None;
        self.token.clear();
        self.set_pairing(PairingStatus::Unknown);
        self.set_state(SessionState::Authenticating);

        if self.config.developer_token.is_some() {
            tracing::info!("Developer token configured, skipping signed authentication");
        } else if let Err(e) = self.fetch_session_token(&identity).await {
            tracing::error!(error = %e, "Authentication failed");
            self.set_state(SessionState::Failed);
            return Err(e);
        }
        self.set_state(SessionState::Authenticated);

        if !self.is_installed() {
            let body = InstalledRequest::new(
                self.config.client_type.clone(),
                identity.software_version.clone(),
            );
            match self
                .call(Method::POST, INSTALLED_PATH, RequestBody::json(&body)?, true)
                .await
            {
                Ok(_) => {
                    self.installed.store(true, Ordering::Release);
                    tracing::info!(version = %body.version, "Installation announced");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Installed announcement failed, will retry on next initialize");
                }
            }
        }

        if let Err(e) = self.check_pairing().await {
            tracing::warn!(error = %e, "Pairing check failed");
        }
        Ok(())
    }

    async fn fetch_session_token(&self, identity: &DeviceIdentity) -> ClientResult<()> {
        let signed = pinsync_cert::sign_identity(identity.signer(), &identity.uuid).await?;
        let request = StokenRequest {
            provider: identity.provider.clone(),
            uuid: identity.uuid.hyphenated().to_string(),
            serial_number: identity.machine_serial,
            machine_id: identity.machine_id,
            timestamp: signed.timestamp,
            sign: signed.signature,
        };

        let response: StokenResponse = self
            .rest
            .call_json(
                Method::POST,
                STOKEN_PATH,
                RequestBody::json(&request)?,
                false,
            )
            .await?;
        if response.stoken.is_empty() {
            return Err(ClientError::InvalidResponse("empty session token".into()));
        }
        self.token.set(response.stoken);
        tracing::info!("Session token acquired");
        Ok(())
    }

    /// Re-sign and fetch a new token after `stale` was rejected
    ///
    /// Concurrent callers that saw the same stale token share one refresh.
    pub async fn reauthenticate(&self, stale: Option<String>) -> ClientResult<()> {
        let _guard = self.reauth_lock.lock().await;

        if self.state() == SessionState::Authenticated
            && self.token.is_set()
            && self.token.get() != stale
        {
            tracing::debug!("Token already refreshed by another caller");
            return Ok(());
        }

        let identity = self.require_identity()?;

        self.set_state(SessionState::Reauthenticating);
        self.token.clear();
        match self.fetch_session_token(&identity).await {
            Ok(()) => {
                self.set_state(SessionState::Authenticated);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Re-authentication failed");
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    // ========== Calls ==========

    /// REST call through the session
    ///
    /// A token-bearing call rejected with 401/403 triggers one
    /// re-authentication and is then retried once.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
        requires_auth: bool,
    ) -> ClientResult<Value> {
        if requires_auth && !self.state().is_usable() {
            return Err(ClientError::InvalidState(format!(
                "session is {:?}",
                self.state()
            )));
        }

        let used = self.token.get();
        match self
            .rest
            .call(method.clone(), endpoint, body.clone(), requires_auth)
            .await
        {
            Err(ClientError::AuthFailed(reason))
                if requires_auth && self.config.developer_token.is_none() =>
            {
                tracing::warn!(endpoint, reason = %reason, "Token rejected, re-authenticating");
                self.reauthenticate(used).await?;
                self.rest.call(method, endpoint, body, requires_auth).await
            }
            other => other,
        }
    }

    pub async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
        requires_auth: bool,
    ) -> ClientResult<T> {
        let value = self.call(method, endpoint, body, requires_auth).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }

    /// Mint a short-lived WebSocket token
    pub async fn mint_ws_token(&self) -> ClientResult<String> {
        let response: WsTokenResponse = self
            .call_json(Method::GET, WS_TOKEN_PATH, RequestBody::Empty, true)
            .await?;
        Ok(response.token)
    }

    pub async fn heartbeat(&self) -> ClientResult<()> {
        self.call(Method::POST, HEARTBEAT_PATH, RequestBody::Empty, true)
            .await
            .map(|_| ())
    }

    /// Machine configuration as stored in the cloud
    pub async fn fetch_config(&self) -> ClientResult<Value> {
        self.call(Method::GET, CONFIG_PATH, RequestBody::Empty, true)
            .await
    }

    /// Upload a finished game's log as CSV
    pub async fn upload_session_log(&self, log: &SessionLog) -> ClientResult<Value> {
        let identity = self.require_identity()?;
        let form = MultipartBody::new()
            .text("uuid", identity.uuid.hyphenated().to_string())
            .file(
                "log_file",
                "session_log.csv",
                "text/csv",
                log.to_csv().into_bytes(),
            );
        tracing::info!(entries = log.len(), "Uploading session log");
        self.call(
            Method::POST,
            SESSION_LOG_PATH,
            RequestBody::Multipart(form),
            true,
        )
        .await
    }

    /// Call under `/api/achievements/`
    pub async fn achievements(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> ClientResult<Value> {
        let endpoint = format!("{}{}", ACHIEVEMENTS_PATH, path.trim_start_matches('/'));
        self.call(method, &endpoint, body, true).await
    }

    /// Call under `/api/challenges/`
    pub async fn challenges(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> ClientResult<Value> {
        let endpoint = format!("{}{}", CHALLENGES_PATH, path.trim_start_matches('/'));
        self.call(method, &endpoint, body, true).await
    }

    // ========== Pairing ==========

    /// Ask the cloud whether this machine is paired with a venue
    ///
    /// A 404 counts as unpaired. Any other failure leaves the status
    /// `Unknown` and is returned.
    pub async fn check_pairing(&self) -> ClientResult<PairingStatus> {
        let identity = self.require_identity()?;
        let endpoint = paired_path(&identity.uuid.hyphenated().to_string());

        self.set_pairing(PairingStatus::Checking);
        let next = match self
            .call_json::<PairedResponse>(Method::GET, &endpoint, RequestBody::Empty, true)
            .await
        {
            Ok(response) => PairingStatus::from_response(response),
            Err(ClientError::Api { status: 404, .. }) => PairingStatus::Unpaired,
            Err(e) => {
                self.set_pairing(PairingStatus::Unknown);
                return Err(e);
            }
        };
        self.set_pairing(next.clone());
        Ok(next)
    }

    /// Short code for pairing from the player app
    ///
    /// The code never changes for a machine, so it is fetched once per
    /// session.
    pub async fn request_pair_code(&self) -> ClientResult<String> {
        if let Some(code) = self.pair_code.read().clone() {
            return Ok(code);
        }
        let identity = self.require_identity()?;
        let endpoint = pair_code_path(&identity.uuid.hyphenated().to_string());
        let response: PairCodeResponse = self
            .call_json(Method::GET, &endpoint, RequestBody::Empty, true)
            .await?;
        if response.shortcode.is_empty() {
            return Err(ClientError::InvalidResponse("empty pair code".into()));
        }
        *self.pair_code.write() = Some(response.shortcode.clone());
        Ok(response.shortcode)
    }

    /// Venue top scores; a positive `score_filter` narrows the list
    /// to the scores around it
    pub async fn request_top_scores(&self, score_filter: Score) -> ClientResult<Value> {
        let venue = self.require_paired()?;
        let mut endpoint = top_scores_path(venue.venuemachine_id);
        if score_filter > 0 {
            endpoint.push_str(&format!("?score={}", score_filter));
        }
        self.call(Method::GET, &endpoint, RequestBody::Empty, true)
            .await
    }

    /// Detach the machine from its venue
    pub async fn request_unpair(&self) -> ClientResult<Value> {
        self.require_paired()?;
        let identity = self.require_identity()?;
        let endpoint = paired_path(&identity.uuid.hyphenated().to_string());
        let reply = self
            .call(Method::DELETE, &endpoint, RequestBody::Empty, true)
            .await?;
        *self.pair_code.write() = None;
        self.set_pairing(PairingStatus::Unpaired);
        tracing::info!("Machine unpaired");
        Ok(reply)
    }

    // ========== Deeplinks ==========

    /// Link a player app opens to pair with this machine
    pub fn pair_deeplink(&self, manufacturer_prefix: &str) -> ClientResult<String> {
        let identity = self.require_identity()?;
        Ok(format!(
            "{}?$deeplink_path={}&machineid={}&uuid={}",
            self.config.deeplink_base,
            manufacturer_prefix,
            identity.machine_id,
            identity.uuid.hyphenated()
        ))
    }

    /// Link for claiming a venue machine
    pub fn claim_deeplink(&self, venue_machine_id: u64, opdb_id: &str) -> String {
        format!(
            "{}?$deeplink_path={}&opdb={}",
            self.config.deeplink_base, venue_machine_id, opdb_id
        )
    }

    /// Claim link for one player of the paired venue machine
    pub fn claim_deeplink_for(&self, player: Player) -> ClientResult<String> {
        if !is_valid_player(player) {
            return Err(ClientError::InvalidState(format!(
                "player {} out of range",
                player
            )));
        }
        let venue = self.require_paired()?;
        Ok(format!(
            "{}&player={}",
            self.claim_deeplink(venue.venuemachine_id as u64, &venue.opdb_id),
            player
        ))
    }
}

#[async_trait]
impl WsTokenSource for SessionManager {
    async fn ws_token(&self) -> ClientResult<String> {
        self.mint_ws_token().await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.config.base_url)
            .field("state", &self.state())
            .field("installed", &self.is_installed())
            .field("pairing", &self.pairing())
            .finish_non_exhaustive()
    }
}
