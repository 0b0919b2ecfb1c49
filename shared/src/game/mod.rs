//! Game data model shared between the synchronizer and the wire

pub mod mode;
pub mod session_log;
pub mod snapshot;

pub use mode::{GameMode, ModeCategory, ModeColor, ModeError, Modes};
pub use session_log::{SessionLog, SessionLogEntry};
pub use snapshot::{
    Ball, GameSnapshot, MAX_BALL, MAX_PLAYER, MIN_BALL, MIN_PLAYER, Player, Score, is_valid_ball,
    is_valid_player,
};
