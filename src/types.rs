// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Constitutional Limits ───────────────────────────────────────────────────

/// Most playable buckets the settlement program will create.
pub const MAX_BUCKETS: u64 = 64;
/// Fewest players a game may be configured for.
pub const MIN_MAX_PLAYERS: u64 = 2;
/// Most players a game may be configured for.
pub const MAX_MAX_PLAYERS: u64 = 10_000;

// ─── GameId ──────────────────────────────────────────────────────────────────

/// Identity of a game account (its on-chain address, base58).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GameId {
    fn from(s: String) -> Self { GameId(s) }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self { GameId(s.to_string()) }
}

// ─── GameConfig ──────────────────────────────────────────────────────────────

/// Immutable parameters of a game, fixed when the game account is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Smallest token units deposited per player on entry.
    pub entry_fee: u64,
    /// Smallest token units leaked per player per second.
    pub spill_rate: u64,
    /// Playable buckets, excluding the holding bucket.
    pub bucket_count: u64,
    pub max_players: u64,
    /// Decimals of the game's mint, when known. Only used for display.
    #[serde(default)]
    pub mint_decimals: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("entry fee must be positive")]
    InvalidEntryFee,
    #[error("spill rate must be positive")]
    InvalidSpillRate,
    #[error("game must have at least one playable bucket")]
    TooFewBuckets,
    #[error("game cannot have more than 64 buckets (got {0})")]
    TooManyBuckets(u64),
    #[error("game must allow at least 2 players (got {0})")]
    MaxPlayersTooSmall(u64),
    #[error("game cannot allow more than 10,000 players (got {0})")]
    MaxPlayersTooLarge(u64),
}

impl GameConfig {
    /// Check the config against the limits the settlement program enforces
    /// at game creation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_fee == 0 {
            return Err(ConfigError::InvalidEntryFee);
        }
        if self.spill_rate == 0 {
            return Err(ConfigError::InvalidSpillRate);
        }
        if self.bucket_count == 0 {
            return Err(ConfigError::TooFewBuckets);
        }
        if self.bucket_count > MAX_BUCKETS {
            return Err(ConfigError::TooManyBuckets(self.bucket_count));
        }
        if self.max_players < MIN_MAX_PLAYERS {
            return Err(ConfigError::MaxPlayersTooSmall(self.max_players));
        }
        if self.max_players > MAX_MAX_PLAYERS {
            return Err(ConfigError::MaxPlayersTooLarge(self.max_players));
        }
        Ok(())
    }

    /// Upper bound on any single bucket's balance: every possible player's
    /// entry fee sitting in one bucket.
    pub fn max_fuel(&self) -> u64 {
        self.entry_fee.saturating_mul(self.max_players)
    }

    /// Total bucket count including the holding bucket.
    pub fn total_buckets(&self) -> usize {
        self.bucket_count as usize + 1
    }
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// Last known on-chain state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub balance: u64,
    /// Players in the bucket. Signed because it arrives from an untyped
    /// upstream decoder; the engine rejects negative values.
    pub occupancy: i64,
}

impl BucketSnapshot {
    pub fn new(balance: u64, occupancy: i64) -> Self {
        Self { balance, occupancy }
    }
}

/// Authoritative state of every bucket at `as_of`. Index 0 is the holding
/// bucket; 1..=bucket_count are playable.
///
/// Snapshots are replaced wholesale on every confirmation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub buckets: Vec<BucketSnapshot>,
    /// Unix seconds of the settlement that produced this state.
    pub as_of: i64,
}

impl GameSnapshot {
    pub fn new(buckets: Vec<BucketSnapshot>, as_of: i64) -> Self {
        Self { buckets, as_of }
    }

    /// Sum of all bucket balances, widened so it cannot overflow.
    pub fn total_balance(&self) -> u128 {
        self.buckets.iter().map(|b| b.balance as u128).sum()
    }

    /// Total players in the game, as recorded on the holding bucket.
    pub fn player_count(&self) -> i64 {
        self.buckets.first().map(|b| b.occupancy).unwrap_or(0)
    }

    /// Parse a snapshot pushed by a JSON subscription feed.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

// ─── BucketRole ──────────────────────────────────────────────────────────────

/// Tagged position of a bucket within a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketRole {
    Holding,
    /// Playable bucket, 1-based like its snapshot index.
    Playable(usize),
}

impl BucketRole {
    pub fn from_index(index: usize) -> Self {
        if index == 0 { Self::Holding } else { Self::Playable(index) }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Holding => 0,
            Self::Playable(i) => *i,
        }
    }

    pub fn is_holding(&self) -> bool {
        matches!(self, Self::Holding)
    }

    /// Buckets this bucket distributes its spillover to.
    ///
    /// The holding bucket feeds every playable bucket; a playable bucket feeds
    /// every other playable bucket. Nothing ever flows back into holding. A
    /// game with a single playable bucket has no flow at all.
    pub fn peers(&self, bucket_count: usize) -> impl Iterator<Item = usize> {
        let own = self.index();
        let active = bucket_count > 1;
        (1..=bucket_count).filter(move |&j| active && j != own)
    }

    pub fn peer_count(&self, bucket_count: usize) -> usize {
        match self {
            _ if bucket_count <= 1 => 0,
            Self::Holding => bucket_count,
            Self::Playable(_) => bucket_count - 1,
        }
    }
}

// ─── FlowSign ────────────────────────────────────────────────────────────────

/// Direction indicator for a bucket's predicted balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowSign {
    Filling,
    Draining,
    Steady,
}

impl FlowSign {
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Filling => 1,
            Self::Draining => -1,
            Self::Steady => 0,
        }
    }
}

impl Default for FlowSign {
    fn default() -> Self { FlowSign::Steady }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameConfig {
        GameConfig {
            entry_fee: 100,
            spill_rate: 1,
            bucket_count: 3,
            max_players: 10,
            mint_decimals: None,
        }
    }

    #[test]
    fn holding_peers_are_all_playable() {
        let peers: Vec<usize> = BucketRole::Holding.peers(3).collect();
        assert_eq!(peers, vec![1, 2, 3]);
        assert_eq!(BucketRole::Holding.peer_count(3), 3);
    }

    #[test]
    fn playable_peers_exclude_self_and_holding() {
        let peers: Vec<usize> = BucketRole::Playable(2).peers(3).collect();
        assert_eq!(peers, vec![1, 3]);
        assert_eq!(BucketRole::Playable(2).peer_count(3), 2);
    }

    #[test]
    fn single_bucket_game_has_no_peers() {
        assert_eq!(BucketRole::Holding.peers(1).count(), 0);
        assert_eq!(BucketRole::Playable(1).peers(1).count(), 0);
        assert_eq!(BucketRole::Holding.peer_count(1), 0);
        assert_eq!(BucketRole::Playable(1).peer_count(1), 0);
    }

    #[test]
    fn peer_count_matches_peer_iterator() {
        for n in 1..=8usize {
            for i in 0..=n {
                let role = BucketRole::from_index(i);
                assert_eq!(role.peers(n).count(), role.peer_count(n), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn role_round_trips_index() {
        assert_eq!(BucketRole::from_index(0), BucketRole::Holding);
        assert_eq!(BucketRole::from_index(4).index(), 4);
        assert!(BucketRole::from_index(0).is_holding());
    }

    #[test]
    fn validate_accepts_sane_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_limits() {
        let mut c = config();
        c.entry_fee = 0;
        assert_eq!(c.validate(), Err(ConfigError::InvalidEntryFee));

        let mut c = config();
        c.spill_rate = 0;
        assert_eq!(c.validate(), Err(ConfigError::InvalidSpillRate));

        let mut c = config();
        c.bucket_count = 0;
        assert_eq!(c.validate(), Err(ConfigError::TooFewBuckets));

        let mut c = config();
        c.bucket_count = 65;
        assert_eq!(c.validate(), Err(ConfigError::TooManyBuckets(65)));

        let mut c = config();
        c.max_players = 1;
        assert_eq!(c.validate(), Err(ConfigError::MaxPlayersTooSmall(1)));

        let mut c = config();
        c.max_players = 10_001;
        assert_eq!(c.validate(), Err(ConfigError::MaxPlayersTooLarge(10_001)));
    }

    #[test]
    fn max_fuel_saturates() {
        let mut c = config();
        assert_eq!(c.max_fuel(), 1000);
        c.entry_fee = u64::MAX;
        assert_eq!(c.max_fuel(), u64::MAX);
    }

    #[test]
    fn snapshot_parses_from_json() {
        let snapshot = GameSnapshot::from_json(
            r#"{"buckets":[{"balance":300,"occupancy":3},{"balance":0,"occupancy":1}],"as_of":42}"#,
        )
        .expect("test: valid payload");
        assert_eq!(snapshot.buckets.len(), 2);
        assert_eq!(snapshot.total_balance(), 300);
        assert_eq!(snapshot.player_count(), 3);
        assert_eq!(snapshot.as_of, 42);
    }
}
