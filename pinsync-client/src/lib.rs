//! pinsync client - cloud sync for pinball machine controllers
//!
//! Authenticates the machine with a signed identity, keeps a WebSocket
//! open to the cloud, sends heartbeats and commits game snapshots when
//! they change.

pub mod config;
pub mod context;
pub mod error;
pub mod game;
pub mod heartbeat;
pub mod http;
pub mod identity;
pub mod logging;
pub mod session;
pub mod ws;

pub use config::ClientConfig;
pub use context::SdkContext;
pub use error::{ClientError, ClientResult};
pub use game::{GameState, GameUpdate, SnapshotSink};
pub use heartbeat::{HeartbeatScheduler, HeartbeatTarget};
pub use http::{Method, MultipartBody, RequestBody, RestClient, TokenCell};
pub use identity::DeviceIdentity;
pub use session::{
    AuthStatus, PairingStatus, SessionManager, SessionState, VenueMachine, WsTokenSource,
};
pub use ws::{Backoff, ConnectionState, ExponentialBackoff, FixedBackoff, WsTransport};

// Re-export shared types for convenience
pub use shared::game::{
    GameMode, GameSnapshot, ModeCategory, ModeColor, ModeError, Modes, SessionLog,
};
pub use shared::message::{InboundKind, InboundMessage, WsCommand};
