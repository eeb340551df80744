// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Bucket Flow Engine - Snapshot Store
//
// Holds the latest authoritative state per game. Entries are immutable values
// behind an `Arc` and are swapped wholesale, so a reader either sees the old
// entry or the new one, never a mix. Readers clone the `Arc` and release the
// lock before doing any work with it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::types::{GameConfig, GameId, GameSnapshot};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("game {0} already loaded with a different config")]
    ConfigChanged(GameId),
    #[error("game {game}: snapshot as of {offered} is older than the stored one ({stored})")]
    Stale { game: GameId, stored: i64, offered: i64 },
}

/// Failure reported by an external snapshot source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("game {0} not found")]
    NotFound(GameId),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One game's config and its latest snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEntry {
    pub config: GameConfig,
    pub snapshot: GameSnapshot,
    /// Bumped on every replacement; lets consumers cheaply detect a new snapshot.
    pub revision: u64,
}

/// What a reader sees for a game.
#[derive(Debug, Clone)]
pub enum LoadState {
    /// Nothing published yet. Distinct from a loaded game with zero balances.
    Unloaded,
    Loaded(Arc<GameEntry>),
}

impl LoadState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn entry(&self) -> Option<&Arc<GameEntry>> {
        match self {
            Self::Loaded(entry) => Some(entry),
            Self::Unloaded => None,
        }
    }
}

// ---------------------------------------------------------------------------
// External source
// ---------------------------------------------------------------------------

/// Read-only access to the on-chain game account, already decoded.
pub trait SnapshotSource {
    fn fetch_snapshot(&self, game_id: &GameId) -> Result<(GameConfig, GameSnapshot), SourceError>;
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Single-writer, many-reader holder of the current state of each game.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    games: RwLock<HashMap<GameId, Arc<GameEntry>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a game.
    pub fn get(&self, game_id: &GameId) -> LoadState {
        match self.read().get(game_id) {
            Some(entry) => LoadState::Loaded(Arc::clone(entry)),
            None => LoadState::Unloaded,
        }
    }

    /// Replace a game's snapshot with a newly confirmed one.
    ///
    /// The config is fixed once a game exists; a publish carrying a different
    /// config is rejected and the current entry is kept. So is a snapshot
    /// older than the stored one: confirmations never move backwards, even
    /// when a late pull races the subscription. Equal `as_of` is accepted,
    /// since several transactions can land in the same second.
    pub fn publish(
        &self,
        game_id: GameId,
        config: GameConfig,
        snapshot: GameSnapshot,
    ) -> Result<Arc<GameEntry>, StoreError> {
        let mut games = self.write();
        let revision = match games.get(&game_id) {
            Some(existing) if existing.config != config => {
                warn!(game = %game_id, "rejecting snapshot with changed config");
                return Err(StoreError::ConfigChanged(game_id));
            }
            Some(existing) if snapshot.as_of < existing.snapshot.as_of => {
                debug!(
                    game = %game_id,
                    stored = existing.snapshot.as_of,
                    offered = snapshot.as_of,
                    "ignoring out-of-order snapshot"
                );
                return Err(StoreError::Stale {
                    stored: existing.snapshot.as_of,
                    offered: snapshot.as_of,
                    game: game_id,
                });
            }
            Some(existing) => existing.revision + 1,
            None => 0,
        };
        let entry = Arc::new(GameEntry { config, snapshot, revision });
        debug!(game = %game_id, revision, as_of = entry.snapshot.as_of, "snapshot published");
        games.insert(game_id, Arc::clone(&entry));
        Ok(entry)
    }

    /// Drop a game (it ended or the client stopped watching it).
    pub fn remove(&self, game_id: &GameId) -> Option<Arc<GameEntry>> {
        self.write().remove(game_id)
    }

    /// Pull an authoritative snapshot from `source` into the store.
    pub fn refresh_from<S: SnapshotSource + ?Sized>(
        &self,
        source: &S,
        game_id: &GameId,
    ) -> Result<Arc<GameEntry>, RefreshError> {
        let (config, snapshot) = source.fetch_snapshot(game_id)?;
        Ok(self.publish(game_id.clone(), config, snapshot)?)
    }

    pub fn game_ids(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<GameId, Arc<GameEntry>>> {
        match self.games.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("snapshot store lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<GameId, Arc<GameEntry>>> {
        match self.games.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("snapshot store lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BucketSnapshot;
    use std::thread;

    fn config() -> GameConfig {
        GameConfig {
            entry_fee: 100,
            spill_rate: 1,
            bucket_count: 2,
            max_players: 10,
            mint_decimals: Some(6),
        }
    }

    fn snapshot(as_of: i64) -> GameSnapshot {
        GameSnapshot::new(
            vec![
                BucketSnapshot::new(300, 3),
                BucketSnapshot::new(0, 1),
                BucketSnapshot::new(0, 2),
            ],
            as_of,
        )
    }

    struct FixedSource(Option<(GameConfig, GameSnapshot)>);

    impl SnapshotSource for FixedSource {
        fn fetch_snapshot(&self, game_id: &GameId) -> Result<(GameConfig, GameSnapshot), SourceError> {
            self.0.clone().ok_or_else(|| SourceError::NotFound(game_id.clone()))
        }
    }

    #[test]
    fn unloaded_before_first_publish() {
        let store = SnapshotStore::new();
        assert!(!store.get(&GameId::from("g1")).is_loaded());
        assert!(store.is_empty());
    }

    #[test]
    fn zero_balances_are_still_loaded() {
        let store = SnapshotStore::new();
        let empty = GameSnapshot::new(vec![BucketSnapshot::new(0, 0); 3], 0);
        store.publish(GameId::from("g1"), config(), empty).expect("test: publish");
        assert!(store.get(&GameId::from("g1")).is_loaded());
    }

    #[test]
    fn publish_replaces_wholesale_and_bumps_revision() {
        let store = SnapshotStore::new();
        let id = GameId::from("g1");
        store.publish(id.clone(), config(), snapshot(10)).expect("test: first");
        let old = store.get(&id);
        store.publish(id.clone(), config(), snapshot(20)).expect("test: second");

        let old = old.entry().expect("test: loaded");
        assert_eq!(old.snapshot.as_of, 10, "held readers keep their snapshot");

        let current = store.get(&id);
        let current = current.entry().expect("test: loaded");
        assert_eq!(current.snapshot.as_of, 20);
        assert_eq!(current.revision, 1);
    }

    #[test]
    fn config_change_is_rejected() {
        let store = SnapshotStore::new();
        let id = GameId::from("g1");
        store.publish(id.clone(), config(), snapshot(10)).expect("test: first");
        let mut changed = config();
        changed.spill_rate = 2;
        let err = store.publish(id.clone(), changed, snapshot(20)).expect_err("test: reject");
        assert_eq!(err, StoreError::ConfigChanged(id.clone()));
        assert_eq!(store.get(&id).entry().map(|e| e.snapshot.as_of), Some(10));
    }

    #[test]
    fn older_snapshot_does_not_replace_newer() {
        let store = SnapshotStore::new();
        let id = GameId::from("g1");
        store.publish(id.clone(), config(), snapshot(20)).expect("test: newer");
        let err = store.publish(id.clone(), config(), snapshot(10)).expect_err("test: older");
        assert_eq!(
            err,
            StoreError::Stale { game: id.clone(), stored: 20, offered: 10 }
        );

        let current = store.get(&id);
        let current = current.entry().expect("test: loaded");
        assert_eq!(current.snapshot.as_of, 20);
        assert_eq!(current.revision, 0);
    }

    #[test]
    fn same_second_snapshot_is_accepted() {
        let store = SnapshotStore::new();
        let id = GameId::from("g1");
        store.publish(id.clone(), config(), snapshot(20)).expect("test: first");
        let entry = store.publish(id, config(), snapshot(20)).expect("test: same second");
        assert_eq!(entry.revision, 1);
    }

    #[test]
    fn late_refresh_keeps_pushed_snapshot() {
        let store = SnapshotStore::new();
        let id = GameId::from("g1");
        store.publish(id.clone(), config(), snapshot(30)).expect("test: push");
        let late = FixedSource(Some((config(), snapshot(25))));
        let err = store.refresh_from(&late, &id).expect_err("test: stale pull");
        assert!(matches!(err, RefreshError::Store(StoreError::Stale { .. })), "got {err}");
        assert_eq!(store.get(&id).entry().map(|e| e.snapshot.as_of), Some(30));
    }

    #[test]
    fn remove_returns_to_unloaded() {
        let store = SnapshotStore::new();
        let id = GameId::from("g1");
        store.publish(id.clone(), config(), snapshot(10)).expect("test: publish");
        assert!(store.remove(&id).is_some());
        assert!(!store.get(&id).is_loaded());
    }

    #[test]
    fn refresh_pulls_from_source() {
        let store = SnapshotStore::new();
        let id = GameId::from("g1");
        let source = FixedSource(Some((config(), snapshot(7))));
        let entry = store.refresh_from(&source, &id).expect("test: refresh");
        assert_eq!(entry.snapshot.as_of, 7);
        assert_eq!(store.game_ids(), vec![id]);
    }

    #[test]
    fn refresh_surfaces_source_errors() {
        let store = SnapshotStore::new();
        let id = GameId::from("missing");
        let err = store.refresh_from(&FixedSource(None), &id).expect_err("test: not found");
        assert!(matches!(err, RefreshError::Source(SourceError::NotFound(_))), "got {err}");
        assert!(store.is_empty());
    }

    #[test]
    fn readers_never_observe_torn_snapshots() {
        let store = Arc::new(SnapshotStore::new());
        let id = GameId::from("g1");
        store.publish(id.clone(), config(), snapshot(0)).expect("test: seed");

        let writer = {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                for t in 1..200 {
                    store.publish(id.clone(), config(), snapshot(t)).expect("test: publish");
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        if let LoadState::Loaded(entry) = store.get(&id) {
                            assert_eq!(entry.snapshot.buckets.len(), 3);
                            assert_eq!(entry.revision as i64, entry.snapshot.as_of);
                        }
                    }
                })
            })
            .collect();

        writer.join().expect("test: writer");
        for r in readers {
            r.join().expect("test: reader");
        }
    }
}
