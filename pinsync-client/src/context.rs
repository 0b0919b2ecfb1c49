//! Caller-owned SDK context
//!
//! Bundles one session, one WebSocket transport and one heartbeat
//! scheduler. Nothing is global: a process may hold several contexts.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::game::GameState;
use crate::heartbeat::HeartbeatScheduler;
use crate::identity::DeviceIdentity;
use crate::session::SessionManager;
use crate::ws::{Backoff, WsTransport};
use serde_json::Value;
use shared::SessionLog;
use std::sync::Arc;

#[derive(Debug)]
pub struct SdkContext {
    session: Arc<SessionManager>,
    transport: Arc<WsTransport>,
    heartbeat: HeartbeatScheduler,
}

impl SdkContext {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let session = Arc::new(SessionManager::new(config.clone())?);
        let transport = Arc::new(WsTransport::new(config, session.clone()));
        Ok(Self::assemble(session, transport))
    }

    /// Same as `new` with a custom reconnect policy
    pub fn with_backoff(config: ClientConfig, backoff: Arc<dyn Backoff>) -> ClientResult<Self> {
        let session = Arc::new(SessionManager::new(config.clone())?);
        let transport = Arc::new(WsTransport::with_backoff(config, session.clone(), backoff));
        Ok(Self::assemble(session, transport))
    }

    fn assemble(session: Arc<SessionManager>, transport: Arc<WsTransport>) -> Self {
        let heartbeat = HeartbeatScheduler::new(session.clone());
        Self {
            session,
            transport,
            heartbeat,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn transport(&self) -> &Arc<WsTransport> {
        &self.transport
    }

    pub fn heartbeat(&self) -> &HeartbeatScheduler {
        &self.heartbeat
    }

    /// Authenticate the device
    pub async fn initialize(&self, identity: DeviceIdentity) -> ClientResult<()> {
        self.session.initialize(identity).await
    }

    /// Start the transport and the heartbeat schedule
    pub async fn start(&self) {
        self.transport.start();
        self.heartbeat
            .start(self.session.config().heartbeat_interval)
            .await;
    }

    /// Stop both background loops
    pub async fn shutdown(&self) {
        self.heartbeat.stop().await;
        self.transport.stop().await;
    }

    /// New synchronizer committing through this context's transport
    pub fn game_state(&self) -> GameState {
        GameState::new(self.transport.clone())
    }

    pub async fn upload_session_log(&self, log: &SessionLog) -> ClientResult<Value> {
        self.session.upload_session_log(log).await
    }
}
