//! Game snapshot - complete point-in-time state of one game
//!
//! Equality is structural over every field. The synchronizer only bumps
//! `sequence_number` and `elapsed_millis` on mutations that change the
//! game, so two snapshots compare equal exactly when nothing was played
//! in between.

use super::mode::Modes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Player number (1..=9)
pub type Player = u8;
/// Ball number (1..=9)
pub type Ball = u8;
/// Player score
pub type Score = i64;

pub const MIN_PLAYER: Player = 1;
pub const MAX_PLAYER: Player = 9;
pub const MIN_BALL: Ball = 1;
pub const MAX_BALL: Ball = 9;

pub fn is_valid_player(player: Player) -> bool {
    (MIN_PLAYER..=MAX_PLAYER).contains(&player)
}

pub fn is_valid_ball(ball: Ball) -> bool {
    (MIN_BALL..=MAX_BALL).contains(&ball)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Whether a game is in progress
    pub started: bool,
    /// Player currently shooting
    pub active_player: Player,
    /// Ball in play
    pub current_ball: Ball,
    /// Scores by player number
    pub players: BTreeMap<Player, Score>,
    /// Active modes
    pub modes: Modes,
    /// Bumped on every change, reset when a game starts
    pub sequence_number: u64,
    /// Milliseconds since the game started
    pub elapsed_millis: u64,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            started: false,
            active_player: MIN_PLAYER,
            current_ball: MIN_BALL,
            players: BTreeMap::new(),
            modes: Modes::new(),
            sequence_number: 0,
            elapsed_millis: 0,
        }
    }
}

impl GameSnapshot {
    /// Snapshot of a game that just started: ball 1, player 1 at zero points
    pub fn new_game() -> Self {
        let mut snapshot = Self {
            started: true,
            ..Self::default()
        };
        snapshot.players.insert(MIN_PLAYER, 0);
        snapshot
    }

    pub fn score(&self, player: Player) -> Option<Score> {
        self.players.get(&player).copied()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::mode::{GameMode, ModeCategory};

    #[test]
    fn test_new_game_defaults() {
        let s = GameSnapshot::new_game();
        assert!(s.started);
        assert_eq!(s.current_ball, 1);
        assert_eq!(s.active_player, 1);
        assert_eq!(s.score(1), Some(0));
        assert_eq!(s.sequence_number, 0);
        assert_eq!(s.elapsed_millis, 0);
    }

    #[test]
    fn test_structural_equality() {
        let a = GameSnapshot::new_game();
        let mut b = a.clone();
        assert_eq!(a, b);

        b.modes.add(&GameMode::new(ModeCategory::Multiball, "MB").unwrap());
        assert_ne!(a, b);

        let mut c = a.clone();
        c.sequence_number += 1;
        assert_ne!(a, c);
    }

    #[test]
    fn test_json_shape() {
        let mut s = GameSnapshot::new_game();
        s.players.insert(1, 1000);
        s.players.insert(2, 50);
        s.modes.add(&GameMode::new(ModeCategory::ExtraBall, "EB").unwrap());

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["started"], true);
        assert_eq!(json["current_ball"], 1);
        assert_eq!(json["players"]["1"], 1000);
        assert_eq!(json["players"]["2"], 50);
        assert_eq!(json["modes"], "EB:EB");

        let back: GameSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_bounds() {
        assert!(!is_valid_player(0));
        assert!(is_valid_player(1));
        assert!(is_valid_player(9));
        assert!(!is_valid_player(10));
        assert!(!is_valid_ball(0));
        assert!(!is_valid_ball(10));
    }
}
