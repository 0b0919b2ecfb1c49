//! Shared types for pinsync
//!
//! Wire and data model used by the client: game snapshots, mode tokens,
//! WebSocket frames and REST bodies.

pub mod api;
pub mod game;
pub mod message;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use game::{GameMode, GameSnapshot, ModeCategory, ModeColor, ModeError, Modes, SessionLog};
pub use message::{InboundKind, InboundMessage, OutboundFrame, WsCommand};
