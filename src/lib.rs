// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine: client-side prediction of bucket balances between
// on-chain confirmations.

pub mod types;
pub mod flow;
pub mod conservation;
pub mod store;
pub mod clock;
pub mod view;
pub mod leave;
pub mod service;

pub use types::*;
pub use flow::{predict, BucketFlow, FlowError, Prediction, SnapshotDefect};
pub use conservation::{ConservationCheck, ConservationLaw};
pub use store::{GameEntry, LoadState, SnapshotSource, SnapshotStore, SourceError, StoreError};
pub use clock::{ManualClock, SimulationClock, SystemClock, TickTicket, WallClock};
pub use view::{BucketView, GalaxyTotals, GameView, TokenUnits};
pub use leave::{estimate_leave, LeaveError, LeaveEstimate};
pub use service::{EngineConfig, PredictionService, ServiceError};

use std::sync::Arc;

use serde::Serialize;
use wasm_bindgen::prelude::*;

fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

fn err_to_js<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

/// Browser-facing handle: one store, one clock, one active game.
#[wasm_bindgen]
pub struct FlowClient {
    service: PredictionService,
}

#[wasm_bindgen]
impl FlowClient {
    /// `config` is an optional `EngineConfig` object; missing fields take defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<FlowClient, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(err_to_js)?
        };
        let store = Arc::new(SnapshotStore::new());
        Ok(Self {
            service: PredictionService::with_system_clock(config, store),
        })
    }

    /// Store a freshly confirmed snapshot. Returns the new revision.
    pub fn publish_snapshot(&self, game_id: String, config: JsValue, snapshot: JsValue) -> Result<f64, JsValue> {
        let config: GameConfig = serde_wasm_bindgen::from_value(config).map_err(err_to_js)?;
        let snapshot: GameSnapshot = serde_wasm_bindgen::from_value(snapshot).map_err(err_to_js)?;
        self.publish(game_id, config, snapshot)
    }

    pub fn publish_snapshot_json(&self, game_id: String, config_json: &str, snapshot_json: &str) -> Result<f64, JsValue> {
        let config: GameConfig = serde_json::from_str(config_json).map_err(err_to_js)?;
        let snapshot = GameSnapshot::from_json(snapshot_json).map_err(err_to_js)?;
        self.publish(game_id, config, snapshot)
    }

    pub fn remove_game(&self, game_id: String) -> bool {
        self.service.store().remove(&GameId::from(game_id)).is_some()
    }

    pub fn is_loaded(&self, game_id: String) -> bool {
        self.service.store().get(&GameId::from(game_id)).is_loaded()
    }

    pub fn select_game(&mut self, game_id: String) {
        self.service.select_game(GameId::from(game_id));
    }

    pub fn stop(&mut self) {
        self.service.stop();
    }

    /// Call from the host timer. Returns the new `GameView`, or `null` when
    /// no tick was due or the active game has nothing to show.
    pub fn tick(&mut self) -> JsValue {
        match self.service.tick() {
            Some(view) => to_js(view),
            None => JsValue::NULL,
        }
    }

    pub fn last_view(&self) -> JsValue {
        self.service.last_view().map(to_js).unwrap_or(JsValue::NULL)
    }

    /// Prediction at `now` (Unix seconds, defaults to the wall clock), or
    /// `null` when the game is not loaded.
    pub fn current_prediction(&self, game_id: String, now: Option<f64>) -> Result<JsValue, JsValue> {
        let now = now.unwrap_or_else(|| self.service.now());
        let prediction = self
            .service
            .current_prediction(&GameId::from(game_id), now)
            .map_err(err_to_js)?;
        Ok(prediction.as_ref().map(to_js).unwrap_or(JsValue::NULL))
    }

    pub fn current_view(&self, game_id: String, now: Option<f64>) -> Result<JsValue, JsValue> {
        let now = now.unwrap_or_else(|| self.service.now());
        let view = self
            .service
            .current_view(&GameId::from(game_id), now)
            .map_err(err_to_js)?;
        Ok(view.as_ref().map(to_js).unwrap_or(JsValue::NULL))
    }

    pub fn estimate_leave(
        &self,
        game_id: String,
        bucket: usize,
        burn_penalty: f64,
        now: Option<f64>,
    ) -> Result<JsValue, JsValue> {
        let now = now.unwrap_or_else(|| self.service.now());
        let burn_penalty = burn_penalty.max(0.0) as u64;
        let estimate = self
            .service
            .estimate_leave(&GameId::from(game_id), bucket, burn_penalty, now)
            .map_err(err_to_js)?;
        Ok(to_js(&estimate))
    }

    pub fn conservation_tripped(&self) -> bool {
        self.service.conservation().is_tripped()
    }

    pub fn format_tokens(amount: f64, decimals: Option<u32>) -> String {
        TokenUnits::new(decimals).format(amount.max(0.0) as u64)
    }
}

impl FlowClient {
    fn publish(&self, game_id: String, config: GameConfig, snapshot: GameSnapshot) -> Result<f64, JsValue> {
        let entry = self
            .service
            .store()
            .publish(GameId::from(game_id), config, snapshot)
            .map_err(err_to_js)?;
        Ok(entry.revision as f64)
    }

    /// Native access to the underlying service.
    pub fn service(&self) -> &PredictionService {
        &self.service
    }
}
