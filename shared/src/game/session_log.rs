//! Session log - committed snapshots of one game
//!
//! Rendered as CSV (`time,p1..p6,player,ball,game_modes`) for upload once
//! the game is over.

use super::snapshot::{GameSnapshot, Player};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

/// Score columns in the CSV
pub const LOGGED_PLAYERS: Player = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub snapshot: GameSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLog {
    entries: Vec<SessionLogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, snapshot: &GameSnapshot) {
        self.record_at(Utc::now(), snapshot);
    }

    pub fn record_at(&mut self, timestamp: DateTime<Utc>, snapshot: &GameSnapshot) {
        self.entries.push(SessionLogEntry {
            timestamp,
            snapshot: snapshot.clone(),
        });
    }

    pub fn entries(&self) -> &[SessionLogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(64 + self.entries.len() * 48);
        out.push_str("time");
        for player in 1..=LOGGED_PLAYERS {
            let _ = write!(out, ",p{}", player);
        }
        out.push_str(",player,ball,game_modes\n");

        for entry in &self.entries {
            let s = &entry.snapshot;
            let _ = write!(out, "{}", entry.timestamp.timestamp());
            for player in 1..=LOGGED_PLAYERS {
                out.push(',');
                if let Some(score) = s.score(player) {
                    let _ = write!(out, "{}", score);
                }
            }
            let _ = write!(out, ",{},{},", s.active_player, s.current_ball);

            let modes: Vec<&str> = s.modes.loggable().collect();
            if !modes.is_empty() {
                let _ = write!(out, "\"{}\"", modes.join(";").replace('"', "\"\""));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::mode::{GameMode, ModeCategory};
    use chrono::TimeZone;

    #[test]
    fn test_csv_layout() {
        let mut log = SessionLog::new();
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut s = GameSnapshot::new_game();
        log.record_at(ts, &s);

        s.players.insert(1, 1500);
        s.players.insert(3, 20);
        s.active_player = 3;
        s.current_ball = 2;
        s.modes.add(&GameMode::new(ModeCategory::Multiball, "Multiball").unwrap());
        s.modes.add(&GameMode::new(ModeCategory::HideFromSessionLog, "hidden").unwrap());
        log.record_at(ts, &s);

        let csv = log.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,p1,p2,p3,p4,p5,p6,player,ball,game_modes");
        assert_eq!(lines[1], "1700000000,0,,,,,,1,1,");
        assert_eq!(lines[2], "1700000000,1500,,20,,,,3,2,\"MB:Multiball\"");
        assert_eq!(log.len(), 2);
    }
}
