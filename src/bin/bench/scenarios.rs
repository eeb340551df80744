// Bench scenarios: game shapes and player behaviour to replay

/// Pass/fail thresholds for one scenario.
#[derive(Debug, Clone)]
pub struct Criteria {
    /// Drift beyond the truncation allowance, summed over a run.
    pub max_conservation_excess: u64,
    /// Leave estimates that disagreed with the ledger's payout.
    pub max_leave_mismatches: u32,
    /// Views delivered for a game that was no longer selected.
    pub max_stale_views: u32,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            max_conservation_excess: 0,
            max_leave_mismatches: 0,
            max_stale_views: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub bucket_count: u64,
    pub max_players: u64,
    pub entry_fee: u64,
    pub spill_rate: u64,
    pub initial_players: u64,
    /// Simulated seconds per run.
    pub duration_secs: i64,
    /// Mean seconds between player transactions.
    pub mean_action_gap_secs: f64,
    /// Relative weights of enter / move / leave.
    pub action_weights: [u32; 3],
    /// Switch the selected game this often (seconds); 0 disables.
    pub switch_every_secs: i64,
    pub criteria: Criteria,
}

impl Scenario {
    fn base(name: &'static str, label: &'static str, category: &'static str) -> Self {
        Self {
            name,
            label,
            category,
            bucket_count: 4,
            max_players: 50,
            entry_fee: 1_000_000,
            spill_rate: 1_000,
            initial_players: 10,
            duration_secs: 600,
            mean_action_gap_secs: 15.0,
            action_weights: [3, 5, 2],
            switch_every_secs: 0,
            criteria: Criteria::default(),
        }
    }
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::base("FRESH_GAME", "Fresh game, holding bucket drains", "engine"),
        Scenario {
            initial_players: 40,
            mean_action_gap_secs: 5.0,
            ..Scenario::base("BUSY_GAME", "Busy game, frequent moves", "engine")
        },
        Scenario {
            bucket_count: 1,
            ..Scenario::base("SINGLE_BUCKET", "Single playable bucket", "edge")
        },
        Scenario {
            bucket_count: 64,
            max_players: 10_000,
            initial_players: 500,
            mean_action_gap_secs: 2.0,
            ..Scenario::base("WIDE_GALAXY", "64 buckets, 10k player cap", "scale")
        },
        Scenario {
            entry_fee: 7,
            spill_rate: 3,
            bucket_count: 9,
            ..Scenario::base("DUST_FEES", "Tiny fees, heavy truncation", "edge")
        },
        Scenario {
            action_weights: [1, 1, 6],
            initial_players: 30,
            ..Scenario::base("EXODUS", "Players leaving until the game ends", "lifecycle")
        },
        Scenario {
            switch_every_secs: 7,
            ..Scenario::base("GAME_SWITCHING", "UI switches games every few seconds", "clock")
        },
        Scenario {
            spill_rate: 1_000_000_000,
            duration_secs: 3_600,
            mean_action_gap_secs: 600.0,
            ..Scenario::base("LONG_SILENCE", "Rare confirmations, saturating spill", "engine")
        },
    ]
}
