// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Simulation Clock
//
// The clock does not own a timer. The host (a browser `setInterval`, or a
// loop in native code) polls it as often as it likes; the clock decides when
// a tick is due and hands out a ticket tagged with the game it was scheduled
// for. Tickets from before a stop or a game switch are rejected.

use std::cell::Cell;

use serde::{Deserialize, Serialize};
use tracing::warn;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use crate::types::GameId;

/// Default tick cadence (about 10 Hz).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

// ─── Wall Clock ──────────────────────────────────────────────────────────────

/// Source of the current time, in fractional Unix seconds.
pub trait WallClock {
    fn now_seconds(&self) -> f64;
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = Date, js_name = now)]
    fn date_now() -> f64;
}

/// The platform clock: `Date.now()` in the browser, `SystemTime` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_seconds(&self) -> f64 {
        date_now() / 1000.0
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_seconds(&self) -> f64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Hand-driven clock for deterministic replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: Cell::new(start) }
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl WallClock for ManualClock {
    fn now_seconds(&self) -> f64 {
        self.now.get()
    }
}

impl<C: WallClock + ?Sized> WallClock for std::rc::Rc<C> {
    fn now_seconds(&self) -> f64 {
        (**self).now_seconds()
    }
}

// ─── Tick Tickets ────────────────────────────────────────────────────────────

/// Permission to run one tick for `game_id`. Only valid while the clock is
/// still on the same selection (`epoch`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickTicket {
    pub game_id: GameId,
    pub epoch: u64,
    /// Sequence number within the epoch.
    pub seq: u64,
}

#[derive(Debug, Clone)]
struct Selection {
    game_id: GameId,
    epoch: u64,
    last_tick_at: Option<f64>,
    seq: u64,
}

// ─── SimulationClock ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimulationClock {
    interval_seconds: f64,
    active: Option<Selection>,
    next_epoch: u64,
}

impl SimulationClock {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_seconds: interval_ms.max(1) as f64 / 1000.0,
            active: None,
            next_epoch: 0,
        }
    }

    /// Begin ticking for `game_id`. Selecting the game that is already
    /// active keeps its schedule; any other selection starts a new epoch and
    /// makes the first poll due immediately.
    pub fn start(&mut self, game_id: GameId) -> u64 {
        if let Some(sel) = &self.active {
            if sel.game_id == game_id {
                return sel.epoch;
            }
        }
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.active = Some(Selection {
            game_id,
            epoch,
            last_tick_at: None,
            seq: 0,
        });
        epoch
    }

    /// Stop ticking. Outstanding tickets become stale.
    pub fn stop(&mut self) {
        if self.active.take().is_some() {
            self.next_epoch += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_game(&self) -> Option<&GameId> {
        self.active.as_ref().map(|s| &s.game_id)
    }

    /// Hand out a ticket if a tick is due at `now`.
    ///
    /// At most one ticket per poll: a host that fell behind by several
    /// intervals gets a single tick, never a catch-up burst. A non-finite
    /// `now` is ignored and leaves the schedule untouched.
    pub fn poll(&mut self, now: f64) -> Option<TickTicket> {
        let interval = self.interval_seconds;
        let sel = self.active.as_mut()?;
        if !now.is_finite() {
            warn!(game = %sel.game_id, now, "ignoring non-finite clock reading");
            return None;
        }
        let due = match sel.last_tick_at {
            None => true,
            // a clock that jumped backwards restarts the cadence
            Some(last) => now - last >= interval || now < last,
        };
        if !due {
            return None;
        }
        sel.last_tick_at = Some(now);
        sel.seq += 1;
        Some(TickTicket {
            game_id: sel.game_id.clone(),
            epoch: sel.epoch,
            seq: sel.seq,
        })
    }

    /// Whether a ticket still belongs to the current selection.
    pub fn is_current(&self, ticket: &TickTicket) -> bool {
        match &self.active {
            Some(sel) => sel.epoch == ticket.epoch && sel.game_id == ticket.game_id,
            None => false,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        (self.interval_seconds * 1000.0).round() as u64
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL_MS)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_clock_never_ticks() {
        let mut clock = SimulationClock::default();
        assert!(clock.poll(0.0).is_none());
        assert!(!clock.is_running());
    }

    #[test]
    fn first_poll_after_start_is_immediate() {
        let mut clock = SimulationClock::default();
        clock.start(GameId::from("g1"));
        let ticket = clock.poll(5.0).expect("test: due immediately");
        assert_eq!(ticket.game_id, GameId::from("g1"));
        assert_eq!(ticket.seq, 1);
    }

    #[test]
    fn ticks_follow_interval() {
        let mut clock = SimulationClock::new(100);
        clock.start(GameId::from("g1"));
        assert!(clock.poll(1.0).is_some());
        assert!(clock.poll(1.05).is_none());
        assert!(clock.poll(1.2).is_some());
    }

    #[test]
    fn missed_intervals_do_not_burst() {
        let mut clock = SimulationClock::new(100);
        clock.start(GameId::from("g1"));
        assert!(clock.poll(0.0).is_some());
        // host slept for 5 seconds
        assert!(clock.poll(5.0).is_some());
        assert!(clock.poll(5.0).is_none());
        assert!(clock.poll(5.01).is_none());
    }

    #[test]
    fn stop_invalidates_outstanding_tickets() {
        let mut clock = SimulationClock::default();
        clock.start(GameId::from("g1"));
        let ticket = clock.poll(0.0).expect("test: due");
        clock.stop();
        assert!(!clock.is_current(&ticket));
        assert!(clock.poll(1.0).is_none());
    }

    #[test]
    fn switching_games_invalidates_old_tickets() {
        let mut clock = SimulationClock::default();
        clock.start(GameId::from("g1"));
        let old = clock.poll(0.0).expect("test: due");
        clock.start(GameId::from("g2"));
        assert!(!clock.is_current(&old));
        let new = clock.poll(0.01).expect("test: new game ticks immediately");
        assert_eq!(new.game_id, GameId::from("g2"));
        assert!(clock.is_current(&new));
    }

    #[test]
    fn reselecting_same_game_after_stop_is_new_epoch() {
        let mut clock = SimulationClock::default();
        let first = clock.start(GameId::from("g1"));
        let ticket = clock.poll(0.0).expect("test: due");
        clock.stop();
        let second = clock.start(GameId::from("g1"));
        assert_ne!(first, second);
        assert!(!clock.is_current(&ticket));
        assert!(clock.poll(0.01).is_some(), "resumes without waiting");
    }

    #[test]
    fn restarting_active_game_keeps_schedule() {
        let mut clock = SimulationClock::new(100);
        let epoch = clock.start(GameId::from("g1"));
        assert!(clock.poll(0.0).is_some());
        assert_eq!(clock.start(GameId::from("g1")), epoch);
        assert!(clock.poll(0.05).is_none());
    }

    #[test]
    fn backwards_clock_restarts_cadence() {
        let mut clock = SimulationClock::new(100);
        clock.start(GameId::from("g1"));
        assert!(clock.poll(10.0).is_some());
        assert!(clock.poll(9.0).is_some());
    }

    #[test]
    fn non_finite_reading_does_not_stall_cadence() {
        let mut clock = SimulationClock::new(100);
        clock.start(GameId::from("g1"));
        assert!(clock.poll(f64::NAN).is_none());
        assert!(clock.poll(f64::INFINITY).is_none());
        assert!(clock.poll(1000.0).is_some());
        assert!(clock.poll(f64::NAN).is_none());
        assert!(clock.poll(2000.0).is_some());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100.0);
        clock.advance(0.5);
        assert_eq!(clock.now_seconds(), 100.5);
        clock.set(3.0);
        assert_eq!(clock.now_seconds(), 3.0);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now_seconds() > 1_600_000_000.0);
    }
}
