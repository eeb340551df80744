// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Spillover Prediction
//
// Replicates the settlement program's bucket update in integer arithmetic so
// that a predicted balance lands exactly where the next on-chain update will.
// Truncation order matters: each bucket's spillover is split into equal
// floor shares per peer, and only the realized (share * peers) amount leaves
// the bucket. The remainder stays behind until the program changes its rule.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::conservation::{self, ConservationCheck};
use crate::types::{BucketRole, BucketSnapshot, ConfigError, FlowSign, GameConfig, GameSnapshot};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// What is wrong with a snapshot the engine refused to read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotDefect {
    #[error("expected {expected} buckets (holding + playable), got {actual}")]
    BucketCountMismatch { expected: usize, actual: usize },

    #[error("bucket {index} has negative occupancy {occupancy}")]
    NegativeOccupancy { index: usize, occupancy: i64 },

    #[error("total balance does not fit in a u64")]
    BalanceOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotDefect),

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Predicted state of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketFlow {
    pub index: usize,
    pub role: BucketRole,
    /// Predicted balance. Never clamped here; see `out_of_range`.
    pub balance: u64,
    pub occupancy: u64,
    /// Tokens received from peers since the snapshot.
    pub inflow: u64,
    /// Tokens actually sent to peers since the snapshot (after truncation).
    pub outflow: u64,
    pub sign: FlowSign,
    /// Net change per second since the snapshot. Zero when pinned.
    pub flow_rate: f64,
    /// Balance fell outside `[0, entry_fee * max_players]`.
    pub out_of_range: bool,
}

/// Engine output for one query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub as_of: i64,
    pub predicted_at: f64,
    pub elapsed_seconds: i64,
    pub buckets: Vec<BucketFlow>,
}

impl Prediction {
    pub fn balances(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.balance).collect()
    }

    pub fn signs(&self) -> Vec<FlowSign> {
        self.buckets.iter().map(|b| b.sign).collect()
    }

    pub fn total_balance(&self) -> u128 {
        self.buckets.iter().map(|b| b.balance as u128).sum()
    }

    pub fn bucket(&self, index: usize) -> Option<&BucketFlow> {
        self.buckets.get(index)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Whole seconds between a snapshot and `now`, truncating `now` down.
pub fn elapsed_seconds(as_of: i64, now: f64) -> i64 {
    (now.floor() as i64).saturating_sub(as_of)
}

/// Tokens a bucket would leak over `elapsed` seconds: occupancy-scaled and
/// bounded by what the bucket holds.
pub fn expected_spillover(bucket: &BucketSnapshot, spill_rate: u64, elapsed: u64) -> u128 {
    let occupancy = bucket.occupancy.max(0) as u128;
    let leak = occupancy
        .saturating_mul(spill_rate as u128)
        .saturating_mul(elapsed as u128);
    leak.min(bucket.balance as u128)
}

/// Reject snapshots the settlement model cannot describe.
pub fn validate_snapshot(config: &GameConfig, snapshot: &GameSnapshot) -> Result<(), SnapshotDefect> {
    let expected = config.total_buckets();
    if snapshot.buckets.len() != expected {
        return Err(SnapshotDefect::BucketCountMismatch {
            expected,
            actual: snapshot.buckets.len(),
        });
    }
    if let Some((index, b)) = snapshot.buckets.iter().enumerate().find(|(_, b)| b.occupancy < 0) {
        return Err(SnapshotDefect::NegativeOccupancy { index, occupancy: b.occupancy });
    }
    if snapshot.total_balance() > u64::MAX as u128 {
        return Err(SnapshotDefect::BalanceOverflow);
    }
    Ok(())
}

/// Predict every bucket's balance at `now` from the last snapshot.
///
/// Pure and deterministic: two calls with the same inputs agree, and calls at
/// different `now` values are computed independently, so skipped ticks never
/// accumulate drift. A `now` earlier than the snapshot (clock skew) returns
/// the snapshot balances unchanged. Skew between the local clock and the
/// chain is routine, so this is logged at debug level rather than asserted.
pub fn predict(config: &GameConfig, snapshot: &GameSnapshot, now: f64) -> Result<Prediction, FlowError> {
    config.validate()?;
    validate_snapshot(config, snapshot)?;

    let elapsed = elapsed_seconds(snapshot.as_of, now);
    if elapsed < 0 {
        debug!(as_of = snapshot.as_of, now, "query precedes snapshot; holding balances");
    }
    if elapsed <= 0 {
        return Ok(unchanged(snapshot, now, elapsed));
    }

    let n = config.bucket_count as usize;
    let ceiling = config.max_fuel();
    let mut inflow = vec![0u128; snapshot.buckets.len()];
    let mut outflow = vec![0u128; snapshot.buckets.len()];

    for (i, bucket) in snapshot.buckets.iter().enumerate() {
        let role = BucketRole::from_index(i);
        let peers = role.peer_count(n) as u128;
        if peers == 0 {
            continue;
        }
        let spill = expected_spillover(bucket, config.spill_rate, elapsed as u64);
        let share = spill / peers;
        outflow[i] = share * peers;
        for j in role.peers(n) {
            inflow[j] += share;
        }
    }

    let buckets = snapshot
        .buckets
        .iter()
        .enumerate()
        .map(|(i, bucket)| {
            let role = BucketRole::from_index(i);
            // outflow <= spill <= balance, so this never underflows
            let raw = bucket.balance as u128 + inflow[i] - outflow[i];
            let balance = u64::try_from(raw).unwrap_or(u64::MAX);
            let out_of_range = balance > ceiling;
            if out_of_range {
                warn!(bucket = i, balance, ceiling, "predicted balance above ceiling");
            }
            let sign = flow_sign(inflow[i], outflow[i], balance, ceiling);
            let flow_rate = match sign {
                FlowSign::Steady => 0.0,
                _ => (inflow[i] as f64 - outflow[i] as f64) / elapsed as f64,
            };
            BucketFlow {
                index: i,
                role,
                balance,
                occupancy: bucket.occupancy as u64,
                inflow: u64::try_from(inflow[i]).unwrap_or(u64::MAX),
                outflow: u64::try_from(outflow[i]).unwrap_or(u64::MAX),
                sign,
                flow_rate,
                out_of_range,
            }
        })
        .collect();

    let prediction = Prediction {
        as_of: snapshot.as_of,
        predicted_at: now,
        elapsed_seconds: elapsed,
        buckets,
    };

    let check = conservation::check_prediction(snapshot, &prediction, config.bucket_count);
    report_conservation(&check);

    Ok(prediction)
}

/// Direction indicator. A bucket pinned at empty or at the ceiling reports
/// `Steady` regardless of its raw flows.
fn flow_sign(inflow: u128, outflow: u128, balance: u64, ceiling: u64) -> FlowSign {
    if balance == 0 || balance >= ceiling {
        return FlowSign::Steady;
    }
    match inflow.cmp(&outflow) {
        std::cmp::Ordering::Greater => FlowSign::Filling,
        std::cmp::Ordering::Less => FlowSign::Draining,
        std::cmp::Ordering::Equal => FlowSign::Steady,
    }
}

fn unchanged(snapshot: &GameSnapshot, now: f64, elapsed: i64) -> Prediction {
    let buckets = snapshot
        .buckets
        .iter()
        .enumerate()
        .map(|(i, b)| BucketFlow {
            index: i,
            role: BucketRole::from_index(i),
            balance: b.balance,
            occupancy: b.occupancy as u64,
            inflow: 0,
            outflow: 0,
            sign: FlowSign::Steady,
            flow_rate: 0.0,
            out_of_range: false,
        })
        .collect();
    Prediction {
        as_of: snapshot.as_of,
        predicted_at: now,
        elapsed_seconds: elapsed,
        buckets,
    }
}

fn report_conservation(check: &ConservationCheck) {
    if check.balanced {
        return;
    }
    error!(
        drift = %check.drift,
        allowance = check.allowance,
        "predicted balances drifted from snapshot total"
    );
    debug_assert!(
        check.balanced,
        "conservation violated: drift {} exceeds allowance {}",
        check.drift,
        check.allowance
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
