// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Conservation Logic

use serde::{Deserialize, Serialize};

use crate::flow::Prediction;
use crate::types::GameSnapshot;

// ---------------------------------------------------------------------------
// Free functions (called from flow.rs)
// ---------------------------------------------------------------------------

/// Signed change in total tokens: `predicted - snapshot`.
///
/// A correct peer distribution never gains tokens and only loses what floor
/// truncation strands, so the result lies in `[-bucket_count, 0]`.
pub fn compute_drift(snapshot_total: u128, predicted_total: u128) -> i128 {
    predicted_total as i128 - snapshot_total as i128
}

/// Outcome of checking one prediction against its snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConservationCheck {
    /// `predicted - snapshot` in smallest token units.
    pub drift: i128,
    /// Largest loss attributable to truncation.
    pub allowance: u64,
    pub balanced: bool,
}

/// Check that a prediction neither invented tokens nor lost more than
/// truncation allows.
pub fn check_prediction(
    snapshot: &GameSnapshot,
    prediction: &Prediction,
    bucket_count: u64,
) -> ConservationCheck {
    let drift = compute_drift(snapshot.total_balance(), prediction.total_balance());
    let balanced = drift <= 0 && drift >= -(bucket_count as i128);
    ConservationCheck {
        drift,
        allowance: bucket_count,
        balanced,
    }
}

// ---------------------------------------------------------------------------
// Conservation result
// ---------------------------------------------------------------------------

/// Outcome of recording a check on a [`ConservationLaw`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConservationResult {
    pub balanced: bool,
    pub drift: i128,
    /// Whether the circuit breaker is currently tripped.
    pub circuit_breaker_tripped: bool,
}

// ---------------------------------------------------------------------------
// Conservation law (circuit breaker over many ticks)
// ---------------------------------------------------------------------------

/// Tracks conservation violations across ticks and trips a breaker once the
/// cumulative excess drift passes a threshold.
///
/// The tick driver never halts on a trip; it keeps rendering and surfaces the
/// flag so a diagnostic panel can show that predictions are suspect.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConservationLaw {
    /// Sum of drift beyond the truncation allowance, over violating checks.
    pub cumulative_excess: u128,
    pub circuit_breaker_threshold: u128,
    pub circuit_breaker_tripped: bool,
    pub consecutive_violations: u32,
    pub total_checks: u64,
}

impl ConservationLaw {
    pub fn new(threshold: u128) -> Self {
        Self {
            cumulative_excess: 0,
            circuit_breaker_threshold: threshold,
            circuit_breaker_tripped: false,
            consecutive_violations: 0,
            total_checks: 0,
        }
    }

    /// Record one prediction check.
    pub fn verify(&mut self, check: &ConservationCheck) -> ConservationResult {
        self.total_checks += 1;

        if check.balanced {
            self.consecutive_violations = 0;
        } else {
            self.cumulative_excess += excess(check);
            self.consecutive_violations += 1;
        }

        if self.cumulative_excess > self.circuit_breaker_threshold {
            self.circuit_breaker_tripped = true;
        }

        ConservationResult {
            balanced: check.balanced,
            drift: check.drift,
            circuit_breaker_tripped: self.circuit_breaker_tripped,
        }
    }

    pub fn reset_circuit_breaker(&mut self) {
        self.cumulative_excess = 0;
        self.circuit_breaker_tripped = false;
        self.consecutive_violations = 0;
    }

    pub fn is_tripped(&self) -> bool {
        self.circuit_breaker_tripped
    }
}

impl Default for ConservationLaw {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Drift outside `[-allowance, 0]`, as a magnitude.
fn excess(check: &ConservationCheck) -> u128 {
    if check.drift > 0 {
        check.drift as u128
    } else {
        (check.drift.unsigned_abs()).saturating_sub(check.allowance as u128)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
