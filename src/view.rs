// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Derived View Model
//
// Turns engine output into what the HUD and the galaxy renderer draw. Flow
// direction is copied from the prediction as-is; this layer never recomputes
// it from the numbers it displays.

use num_traits::ToPrimitive;
use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::flow::Prediction;
use crate::store::GameEntry;
use crate::types::{BucketRole, FlowSign, GameId};

/// Amounts below this many display units render as "~0".
const DISPLAY_EPSILON: Decimal = dec!(0.001);
const THOUSAND: Decimal = dec!(1000);
const COMPACT_SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];
/// Largest scale `Decimal` can represent.
const MAX_SCALE: u32 = 28;

// ---------------------------------------------------------------------------
// Unit conversion
// ---------------------------------------------------------------------------

/// Converts smallest token units into display units for one mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUnits {
    /// Mint decimals. `None` shows raw smallest units.
    pub decimals: Option<u32>,
}

impl TokenUnits {
    pub fn new(decimals: Option<u32>) -> Self {
        Self { decimals }
    }

    pub fn to_decimal(&self, amount: u64) -> Decimal {
        match self.decimals {
            Some(d) => Decimal::try_from_i128_with_scale(amount as i128, d.min(MAX_SCALE))
                .unwrap_or_else(|_| Decimal::from(amount)),
            None => Decimal::from(amount),
        }
    }

    /// Compact human form, three significant digits: `1.23K`, `45.6M`, `~0`.
    pub fn format(&self, amount: u64) -> String {
        format_compact(self.to_decimal(amount))
    }
}

pub fn format_compact(value: Decimal) -> String {
    if value < DISPLAY_EPSILON {
        return "~0".to_string();
    }
    let mut tier = 0;
    let mut v = value;
    while v >= THOUSAND && tier < COMPACT_SUFFIXES.len() - 1 {
        v /= THOUSAND;
        tier += 1;
    }
    let mut rounded = round_significant(v);
    if rounded >= THOUSAND && tier < COMPACT_SUFFIXES.len() - 1 {
        tier += 1;
        rounded = round_significant(v / THOUSAND);
    }
    format!("{}{}", rounded.normalize(), COMPACT_SUFFIXES[tier])
}

fn round_significant(v: Decimal) -> Decimal {
    let dp = if v >= dec!(100) {
        0
    } else if v >= dec!(10) {
        1
    } else if v >= Decimal::ONE {
        2
    } else {
        3
    };
    v.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (Decimal::from(numerator) / Decimal::from(denominator))
        .to_f64()
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketView {
    pub index: usize,
    pub role: BucketRole,
    pub is_holding: bool,
    /// Predicted balance as the engine produced it.
    pub balance: u64,
    /// Balance clamped to `[0, max_fuel]` for drawing.
    pub fuel: u64,
    /// `fuel / max_fuel`, in `[0, 1]`.
    pub fuel_fraction: f64,
    pub fuel_display: String,
    pub occupancy: u64,
    /// Share of the game's players in this bucket. Zero for holding.
    pub occupancy_fraction: f64,
    /// What one occupant would take out; `None` for an empty bucket.
    pub player_share: Option<u64>,
    pub player_share_display: Option<String>,
    pub sign: FlowSign,
    pub flow_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxyTotals {
    pub total_balance: u64,
    pub total_balance_display: String,
    /// Players across playable buckets.
    pub total_occupancy: u64,
    /// Players as recorded on the holding bucket.
    pub player_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: GameId,
    pub revision: u64,
    pub as_of: i64,
    pub predicted_at: f64,
    pub elapsed_seconds: i64,
    pub entry_fee: u64,
    pub max_players: u64,
    pub max_fuel: u64,
    pub buckets: Vec<BucketView>,
    pub totals: GalaxyTotals,
}

impl GameView {
    pub fn bucket(&self, index: usize) -> Option<&BucketView> {
        self.buckets.get(index)
    }

    pub fn playable(&self) -> impl Iterator<Item = &BucketView> {
        self.buckets.iter().filter(|b| !b.is_holding)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the consumer view of one prediction.
pub fn build_view(game_id: &GameId, entry: &GameEntry, prediction: &Prediction) -> GameView {
    let config = &entry.config;
    let units = TokenUnits::new(config.mint_decimals);
    let max_fuel = config.max_fuel();
    let player_count = entry.snapshot.player_count().max(0) as u64;

    let buckets: Vec<BucketView> = prediction
        .buckets
        .iter()
        .map(|flow| {
            let fuel = flow.balance.min(max_fuel);
            let player_share = (flow.occupancy > 0).then(|| flow.balance / flow.occupancy);
            let occupancy_fraction = if flow.role.is_holding() {
                0.0
            } else {
                ratio(flow.occupancy, player_count)
            };
            BucketView {
                index: flow.index,
                role: flow.role,
                is_holding: flow.role.is_holding(),
                balance: flow.balance,
                fuel,
                fuel_fraction: ratio(fuel, max_fuel),
                fuel_display: units.format(fuel),
                occupancy: flow.occupancy,
                occupancy_fraction,
                player_share,
                player_share_display: player_share.map(|s| units.format(s)),
                sign: flow.sign,
                flow_rate: flow.flow_rate,
            }
        })
        .collect();

    let total_balance = u64::try_from(prediction.total_balance()).unwrap_or(u64::MAX);
    let total_occupancy = buckets
        .iter()
        .filter(|b| !b.is_holding)
        .map(|b| b.occupancy)
        .sum();

    GameView {
        game_id: game_id.clone(),
        revision: entry.revision,
        as_of: prediction.as_of,
        predicted_at: prediction.predicted_at,
        elapsed_seconds: prediction.elapsed_seconds,
        entry_fee: config.entry_fee,
        max_players: config.max_players,
        max_fuel,
        buckets,
        totals: GalaxyTotals {
            total_balance,
            total_balance_display: units.format(total_balance),
            total_occupancy,
            player_count,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
