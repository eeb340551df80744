// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Leave Estimate

use serde::{Deserialize, Serialize};

use crate::flow::Prediction;
use crate::types::{BucketRole, GameConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeaveError {
    #[error("players cannot leave from the holding bucket")]
    HoldingBucket,
    #[error("bucket {0} does not exist")]
    BucketDoesNotExist(usize),
    #[error("bucket {0} has no players")]
    EmptyBucket(usize),
}

/// What leaving right now would pay out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveEstimate {
    pub bucket: usize,
    /// Payout before the burn penalty.
    pub gross: u64,
    pub burned: u64,
    pub winnings: u64,
    /// The leaver is the only player left and takes every bucket.
    pub is_last_player: bool,
    /// A leave sent with cancel-on-loss would be rejected.
    pub would_abort_on_loss: bool,
}

/// Estimate the payout for a player in `bucket` leaving at the prediction's time.
pub fn estimate_leave(
    config: &GameConfig,
    prediction: &Prediction,
    bucket: usize,
    burn_penalty: u64,
) -> Result<LeaveEstimate, LeaveError> {
    if BucketRole::from_index(bucket).is_holding() {
        return Err(LeaveError::HoldingBucket);
    }
    let flow = prediction
        .bucket(bucket)
        .ok_or(LeaveError::BucketDoesNotExist(bucket))?;
    if flow.occupancy == 0 {
        return Err(LeaveError::EmptyBucket(bucket));
    }

    let player_count = prediction.bucket(0).map(|h| h.occupancy).unwrap_or(0);
    let is_last_player = player_count == 1;
    let gross = if is_last_player {
        u64::try_from(prediction.total_balance()).unwrap_or(u64::MAX)
    } else {
        flow.balance / flow.occupancy
    };

    let burned = burn_penalty.min(gross);
    let winnings = gross - burned;

    Ok(LeaveEstimate {
        bucket,
        gross,
        burned,
        winnings,
        is_last_player,
        would_abort_on_loss: winnings < config.entry_fee,
    })
}
