// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Prediction Service
//
// Glues the store, the simulation clock, the engine and the view model. Every
// tick recomputes from the stored snapshot and the current wall time; nothing
// is carried over from the previous tick except the last good view.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{SimulationClock, SystemClock, TickTicket, WallClock, DEFAULT_TICK_INTERVAL_MS};
use crate::conservation::{self, ConservationLaw};
use crate::flow::{self, FlowError, Prediction};
use crate::leave::{self, LeaveError, LeaveEstimate};
use crate::store::{LoadState, SnapshotStore};
use crate::types::GameId;
use crate::view::{self, GameView};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Cumulative drift (token units beyond truncation) before the
    /// conservation tracker trips.
    pub conservation_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            conservation_threshold: 0,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("game {0} is not loaded")]
    NotLoaded(GameId),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Leave(#[from] LeaveError),
}

// ─── PredictionService ───────────────────────────────────────────────────────

pub type TickListener = Box<dyn FnMut(&GameView)>;

pub struct PredictionService {
    config: EngineConfig,
    store: Arc<SnapshotStore>,
    clock: SimulationClock,
    wall_clock: Box<dyn WallClock>,
    conservation: ConservationLaw,
    latest: Option<GameView>,
    listeners: Vec<TickListener>,
}

impl PredictionService {
    pub fn new(config: EngineConfig, store: Arc<SnapshotStore>, wall_clock: Box<dyn WallClock>) -> Self {
        Self {
            clock: SimulationClock::new(config.tick_interval_ms),
            conservation: ConservationLaw::new(config.conservation_threshold as u128),
            config,
            store,
            wall_clock,
            latest: None,
            listeners: Vec::new(),
        }
    }

    pub fn with_system_clock(config: EngineConfig, store: Arc<SnapshotStore>) -> Self {
        Self::new(config, store, Box::new(SystemClock))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn conservation(&self) -> &ConservationLaw {
        &self.conservation
    }

    pub fn now(&self) -> f64 {
        self.wall_clock.now_seconds()
    }

    /// Make `game_id` the active game. The previous game's view is dropped
    /// so nothing drawn for it can leak into the new selection.
    pub fn select_game(&mut self, game_id: GameId) -> u64 {
        if self.latest.as_ref().is_some_and(|v| v.game_id != game_id) {
            self.latest = None;
        }
        self.clock.start(game_id)
    }

    pub fn stop(&mut self) {
        self.clock.stop();
        self.latest = None;
    }

    pub fn active_game(&self) -> Option<&GameId> {
        self.clock.active_game()
    }

    /// Register a callback run with every new view.
    pub fn on_prediction_tick<F>(&mut self, listener: F)
    where
        F: FnMut(&GameView) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Poll the clock and run a tick if one is due.
    pub fn tick(&mut self) -> Option<&GameView> {
        let now = self.now();
        let ticket = self.clock.poll(now)?;
        self.run_tick(ticket, now)
    }

    /// Run one scheduled tick. Returns the new view, or `None` when the ticket
    /// is stale, the game is not loaded, or the snapshot could not be read.
    pub fn run_tick(&mut self, ticket: TickTicket, now: f64) -> Option<&GameView> {
        if !self.clock.is_current(&ticket) {
            debug!(game = %ticket.game_id, epoch = ticket.epoch, seq = ticket.seq, "discarding stale tick");
            return None;
        }
        let entry = match self.store.get(&ticket.game_id) {
            LoadState::Loaded(entry) => entry,
            LoadState::Unloaded => {
                debug!(game = %ticket.game_id, "tick before first snapshot");
                return None;
            }
        };
        let prediction = match flow::predict(&entry.config, &entry.snapshot, now) {
            Ok(p) => p,
            Err(err) => {
                warn!(game = %ticket.game_id, revision = entry.revision, %err, "skipping tick on unreadable snapshot");
                return None;
            }
        };

        let check = conservation::check_prediction(&entry.snapshot, &prediction, entry.config.bucket_count);
        let was_tripped = self.conservation.is_tripped();
        if self.conservation.verify(&check).circuit_breaker_tripped && !was_tripped {
            warn!(game = %ticket.game_id, drift = %check.drift, "conservation tracker tripped");
        }

        let view = view::build_view(&ticket.game_id, &entry, &prediction);
        for listener in self.listeners.iter_mut() {
            listener(&view);
        }
        self.latest = Some(view);
        self.latest.as_ref()
    }

    /// Most recent view produced by a tick for the active game.
    pub fn last_view(&self) -> Option<&GameView> {
        self.latest.as_ref()
    }

    /// Pull-style prediction for any loaded game, independent of the clock.
    pub fn current_prediction(&self, game_id: &GameId, now: f64) -> Result<Option<Prediction>, FlowError> {
        match self.store.get(game_id) {
            LoadState::Loaded(entry) => flow::predict(&entry.config, &entry.snapshot, now).map(Some),
            LoadState::Unloaded => Ok(None),
        }
    }

    pub fn current_view(&self, game_id: &GameId, now: f64) -> Result<Option<GameView>, FlowError> {
        match self.store.get(game_id) {
            LoadState::Loaded(entry) => {
                let prediction = flow::predict(&entry.config, &entry.snapshot, now)?;
                Ok(Some(view::build_view(game_id, &entry, &prediction)))
            }
            LoadState::Unloaded => Ok(None),
        }
    }

    pub fn estimate_leave(
        &self,
        game_id: &GameId,
        bucket: usize,
        burn_penalty: u64,
        now: f64,
    ) -> Result<LeaveEstimate, ServiceError> {
        let entry = match self.store.get(game_id) {
            LoadState::Loaded(entry) => entry,
            LoadState::Unloaded => return Err(ServiceError::NotLoaded(game_id.clone())),
        };
        let prediction = flow::predict(&entry.config, &entry.snapshot, now)?;
        Ok(leave::estimate_leave(&entry.config, &prediction, bucket, burn_penalty)?)
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("conservation", &self.conservation)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
