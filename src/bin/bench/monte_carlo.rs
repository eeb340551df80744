// Monte Carlo infrastructure: N seeded runs per scenario, aggregated
// Each run replays two games against a ledger while the client ticks at its
// configured cadence on a manual clock.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use bucket_flow_engine::*;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::ledger::Ledger;
use crate::report::*;
use crate::scenarios::Scenario;

const CREATED_AT: i64 = 1_700_000_000;

/// Seconds until the next transaction, exponentially distributed, at least 1.
fn next_gap<R: Rng>(rng: &mut R, mean: f64) -> i64 {
    let u: f64 = 1.0 - rng.gen::<f64>();
    (-mean * u.ln()).ceil().max(1.0) as i64
}

struct Game {
    id: GameId,
    ledger: Ledger,
    next_action: i64,
    ended: bool,
}

/// Run a single scenario iteration with a specific seed.
pub fn run_single(scenario: &Scenario, seed: u64) -> RunResult {
    let start = Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut result = RunResult { seed, ..RunResult::default() };

    let config = GameConfig {
        entry_fee: scenario.entry_fee,
        spill_rate: scenario.spill_rate,
        bucket_count: scenario.bucket_count,
        max_players: scenario.max_players,
        mint_decimals: Some(6),
    };
    let weights = match WeightedIndex::new(scenario.action_weights) {
        Ok(w) => w,
        Err(e) => {
            warn!(scenario = scenario.name, %e, "bad action weights");
            return result;
        }
    };

    let store = Arc::new(SnapshotStore::new());
    let clock = Rc::new(ManualClock::new(CREATED_AT as f64));
    let mut service = PredictionService::new(
        EngineConfig::default(),
        Arc::clone(&store),
        Box::new(Rc::clone(&clock)),
    );

    let ceiling_breaches = Rc::new(RefCell::new(0u32));
    {
        let breaches = Rc::clone(&ceiling_breaches);
        service.on_prediction_tick(move |view| {
            if view.buckets.iter().any(|b| b.balance > view.max_fuel) {
                *breaches.borrow_mut() += 1;
            }
        });
    }

    let mut games: Vec<Game> = ["a", "b"]
        .iter()
        .map(|suffix| {
            let mut ledger = Ledger::new(config.clone(), CREATED_AT);
            for _ in 0..scenario.initial_players.min(scenario.max_players) {
                ledger.enter(&mut rng, CREATED_AT);
            }
            Game {
                id: GameId::from(format!("{}-{}", scenario.name.to_lowercase(), suffix)),
                ledger,
                next_action: CREATED_AT + next_gap(&mut rng, scenario.mean_action_gap_secs),
                ended: false,
            }
        })
        .collect();
    for g in &games {
        if let Err(e) = store.publish(g.id.clone(), g.ledger.config.clone(), g.ledger.snapshot.clone()) {
            warn!(game = %g.id, %e, "initial publish failed");
        }
    }

    let mut selected = 0;
    service.select_game(games[selected].id.clone());

    let tick_dt = service.config().tick_interval_ms as f64 / 1000.0;
    let total_ticks = (scenario.duration_secs as f64 / tick_dt) as u64;
    let mut tick_time = 0.0f64;
    let mut last_switch = CREATED_AT;

    for k in 1..=total_ticks {
        let now = CREATED_AT as f64 + k as f64 * tick_dt;
        let second = now.floor() as i64;
        clock.set(now);

        for g in games.iter_mut().filter(|g| !g.ended) {
            while g.next_action <= second && !g.ended {
                let at = g.next_action;
                step(&mut rng, &weights, &store, &service, g, at, &mut result);
                g.next_action = at + next_gap(&mut rng, scenario.mean_action_gap_secs);
            }
        }

        if scenario.switch_every_secs > 0 && second - last_switch >= scenario.switch_every_secs {
            last_switch = second;
            selected = 1 - selected;
            service.select_game(games[selected].id.clone());
        }

        let t0 = Instant::now();
        let view_game = service.tick().map(|v| v.game_id.clone());
        tick_time += t0.elapsed().as_secs_f64();
        result.ticks += 1;

        if let Some(id) = view_game {
            result.views += 1;
            if Some(&id) != service.active_game() {
                result.stale_views += 1;
            }
        }
    }

    let law = service.conservation();
    result.conservation_excess = u64::try_from(law.cumulative_excess).unwrap_or(u64::MAX);
    result.breaker_tripped = law.is_tripped();
    result.ceiling_breaches = *ceiling_breaches.borrow();
    result.entries = games.iter().map(|g| g.ledger.entries).sum();
    result.moves = games.iter().map(|g| g.ledger.moves).sum();
    result.leaves = games.iter().map(|g| g.ledger.leaves).sum();
    result.games_ended = games.iter().filter(|g| g.ended).count() as u32;
    result.mean_tick_us = if result.ticks > 0 {
        tick_time * 1e6 / result.ticks as f64
    } else {
        0.0
    };
    result.elapsed_ms = start.elapsed().as_millis();

    let criteria = &scenario.criteria;
    result.pass = result.conservation_excess <= criteria.max_conservation_excess
        && result.leave_mismatches <= criteria.max_leave_mismatches
        && result.stale_views <= criteria.max_stale_views
        && result.engine_errors == 0;
    result
}

/// One player transaction on one game, then publish the confirmed state.
fn step<R: Rng>(
    rng: &mut R,
    weights: &WeightedIndex<u32>,
    store: &SnapshotStore,
    service: &PredictionService,
    game: &mut Game,
    at: i64,
    result: &mut RunResult,
) {
    let choice = weights.sample(rng);
    match (choice, game.ledger.pick_player(rng)) {
        (0, _) | (_, None) if !game.ledger.is_full() => game.ledger.enter(rng, at),
        (2, Some((who, bucket))) => {
            let estimate = service.estimate_leave(&game.id, bucket, 0, at as f64);
            let paid = game.ledger.leave(who, at);
            result.leave_checks += 1;
            match estimate {
                Ok(e) if e.winnings == paid => {}
                Ok(e) => {
                    warn!(game = %game.id, estimated = e.winnings, paid, "leave estimate mismatch");
                    result.leave_mismatches += 1;
                }
                Err(err) => {
                    warn!(game = %game.id, %err, "leave estimate failed");
                    result.leave_mismatches += 1;
                }
            }
        }
        (_, Some((who, _))) => game.ledger.move_player(rng, who, at),
        // full game with nobody in it cannot happen
        (_, None) => {}
    }

    if game.ledger.is_over() {
        debug!(game = %game.id, at, "last player left");
        store.remove(&game.id);
        game.ended = true;
        return;
    }
    if let Err(e) = store.publish(game.id.clone(), game.ledger.config.clone(), game.ledger.snapshot.clone()) {
        warn!(game = %game.id, %e, "publish rejected");
        result.engine_errors += 1;
    }
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(scenario: &Scenario, n_runs: usize, base_seed: u64) -> MonteCarloReport {
    let results: Vec<RunResult> = (0..n_runs)
        .map(|i| run_single(scenario, base_seed + i as u64))
        .collect();
    aggregate(scenario, results)
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<RunResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate: if n > 0 { passed as f64 / n as f64 } else { 0.0 },
        views: Stats::of(&results, |r| r.views as f64),
        ceiling_breaches: Stats::of(&results, |r| r.ceiling_breaches as f64),
        leave_checks: Stats::of(&results, |r| r.leave_checks as f64),
        transactions: Stats::of(&results, |r| (r.entries + r.moves + r.leaves) as f64),
        mean_tick_us: Stats::of(&results, |r| r.mean_tick_us),
        elapsed_ms: Stats::of(&results, |r| r.elapsed_ms as f64),
        individual_runs: results,
    }
}
