//! Game state synchronizer
//!
//! Holds the current and the last transmitted snapshot. Mutators change
//! `current`; `commit` sends it as an `ENTRY` frame only when it differs
//! from `previous`.
//!
//! A mutation that leaves the game as it was (same score, same ball,
//! duplicate mode) is not accepted: no sequence bump, so repeated
//! identical input never produces a commit.

use crate::error::{ClientError, ClientResult};
use crate::ws::WsTransport;
use shared::game::{
    Ball, GameMode, GameSnapshot, Modes, Player, Score, SessionLog, is_valid_ball,
    is_valid_player,
};
use shared::message::WsCommand;
use std::sync::Arc;
use tokio::time::Instant;

/// Where committed snapshots go
pub trait SnapshotSink: Send + Sync {
    fn send_snapshot(&self, snapshot: &GameSnapshot) -> ClientResult<()>;
}

impl SnapshotSink for WsTransport {
    fn send_snapshot(&self, snapshot: &GameSnapshot) -> ClientResult<()> {
        self.send(WsCommand::Entry, serde_json::to_value(snapshot)?);
        Ok(())
    }
}

/// Several changes applied together, then committed
#[derive(Debug, Clone)]
pub struct GameUpdate {
    /// `false` finishes the running game; `true` starts one if needed
    pub active: bool,
    pub active_player: Option<Player>,
    pub current_ball: Option<Ball>,
    pub scores: Vec<(Player, Score)>,
    /// Replaces the whole mode set when present
    pub modes: Option<Vec<GameMode>>,
}

impl Default for GameUpdate {
    fn default() -> Self {
        Self {
            active: true,
            active_player: None,
            current_ball: None,
            scores: Vec::new(),
            modes: None,
        }
    }
}

pub struct GameState {
    sink: Arc<dyn SnapshotSink>,
    current: GameSnapshot,
    previous: GameSnapshot,
    started_at: Option<Instant>,
    log: SessionLog,
    finished_log: Option<SessionLog>,
}

impl GameState {
    pub fn new(sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            sink,
            current: GameSnapshot::default(),
            previous: GameSnapshot::default(),
            started_at: None,
            log: SessionLog::new(),
            finished_log: None,
        }
    }

    pub fn current(&self) -> &GameSnapshot {
        &self.current
    }

    /// Last snapshot that was transmitted
    pub fn previous(&self) -> &GameSnapshot {
        &self.previous
    }

    pub fn is_started(&self) -> bool {
        self.current.started
    }

    /// Snapshots committed during the running game
    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    /// Log of the last game finished through `update`
    pub fn take_finished_log(&mut self) -> Option<SessionLog> {
        self.finished_log.take()
    }

    // ========== Lifecycle ==========

    pub fn start_game(&mut self) {
        if self.current.started {
            tracing::info!("Game already started");
            return;
        }
        self.current = GameSnapshot::new_game();
        self.started_at = Some(Instant::now());
        self.log = SessionLog::new();
        tracing::info!("Game started");
    }

    /// End the game, transmit the final snapshot and reset
    ///
    /// Returns the session log of the finished game.
    pub fn finish_game(&mut self) -> ClientResult<SessionLog> {
        self.ensure_started()?;
        self.current.started = false;
        self.accept();

        let committed = self.commit();
        let log = std::mem::take(&mut self.log);
        self.current = GameSnapshot::default();
        self.previous = GameSnapshot::default();
        self.started_at = None;
        committed?;

        tracing::info!(entries = log.len(), "Game finished");
        Ok(log)
    }

    // ========== Mutators ==========

    pub fn set_ball(&mut self, ball: Ball) -> ClientResult<()> {
        self.ensure_started()?;
        if !is_valid_ball(ball) {
            tracing::warn!(ball, "Ignoring out-of-range ball");
            return Ok(());
        }
        if self.current.current_ball != ball {
            self.current.current_ball = ball;
            self.accept();
        }
        Ok(())
    }

    /// Also creates a zero score for a player seen for the first time
    pub fn set_active_player(&mut self, player: Player) -> ClientResult<()> {
        self.ensure_started()?;
        if !is_valid_player(player) {
            tracing::warn!(player, "Ignoring out-of-range player");
            return Ok(());
        }
        let mut changed = false;
        if self.current.active_player != player {
            self.current.active_player = player;
            changed = true;
        }
        if !self.current.players.contains_key(&player) {
            self.current.players.insert(player, 0);
            changed = true;
        }
        if changed {
            self.accept();
        }
        Ok(())
    }

    pub fn set_score(&mut self, player: Player, score: Score) -> ClientResult<()> {
        self.ensure_started()?;
        if !is_valid_player(player) {
            tracing::warn!(player, score, "Ignoring score for out-of-range player");
            return Ok(());
        }
        if self.current.players.insert(player, score) != Some(score) {
            self.accept();
        }
        Ok(())
    }

    pub fn add_mode(&mut self, mode: &GameMode) -> ClientResult<()> {
        self.ensure_started()?;
        if self.current.modes.add(mode) {
            self.accept();
        }
        Ok(())
    }

    pub fn remove_mode(&mut self, mode: &GameMode) -> ClientResult<()> {
        self.ensure_started()?;
        if self.current.modes.remove(mode) {
            self.accept();
        }
        Ok(())
    }

    pub fn clear_modes(&mut self) -> ClientResult<()> {
        self.ensure_started()?;
        if !self.current.modes.is_empty() {
            self.current.modes.clear();
            self.accept();
        }
        Ok(())
    }

    /// Apply every field of `update`, then commit
    ///
    /// An inactive update finishes the running game (and is a no-op when
    /// none runs); its log is kept for `take_finished_log`. An active
    /// update on an idle machine starts a game first.
    pub fn update(&mut self, update: GameUpdate) -> ClientResult<bool> {
        if !update.active {
            if !self.is_started() {
                return Ok(false);
            }
            self.finished_log = Some(self.finish_game()?);
            return Ok(true);
        }
        if !self.is_started() {
            self.start_game();
        }
        if let Some(player) = update.active_player {
            self.set_active_player(player)?;
        }
        if let Some(ball) = update.current_ball {
            self.set_ball(ball)?;
        }
        for (player, score) in update.scores {
            self.set_score(player, score)?;
        }
        if let Some(modes) = update.modes {
            let mut next = Modes::new();
            for mode in &modes {
                next.add(mode);
            }
            if next != self.current.modes {
                self.current.modes = next;
                self.accept();
            }
        }
        self.commit()
    }

    // ========== Commit ==========

    /// Send `current` if it differs from the last transmitted snapshot
    ///
    /// Returns whether anything was sent.
    pub fn commit(&mut self) -> ClientResult<bool> {
        if self.current == self.previous {
            return Ok(false);
        }
        self.sink.send_snapshot(&self.current)?;
        self.previous = self.current.clone();
        self.log.record(&self.current);
        tracing::debug!(
            sequence = self.current.sequence_number,
            started = self.current.started,
            "Snapshot committed"
        );
        Ok(true)
    }

    fn ensure_started(&self) -> ClientResult<()> {
        if self.current.started {
            Ok(())
        } else {
            Err(ClientError::InvalidState("no game in progress".into()))
        }
    }

    fn accept(&mut self) {
        self.current.sequence_number += 1;
        if let Some(started_at) = self.started_at {
            self.current.elapsed_millis = started_at.elapsed().as_millis() as u64;
        }
    }
}

impl std::fmt::Debug for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameState")
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("logged", &self.log.len())
            .finish_non_exhaustive()
    }
}
