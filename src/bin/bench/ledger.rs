// Reference ledger: plays the settlement program's role in the bench.
//
// Every player transaction first settles the game up to the transaction time,
// then applies the player's change to occupancy and balances the way the
// on-chain instructions do. Settlement is written out here independently of
// the engine's `predict`, so a divergence in the engine's spillover rule shows
// up as leave mismatches and conservation excess in the bench.

use bucket_flow_engine::*;
use rand::Rng;

pub struct Ledger {
    pub config: GameConfig,
    pub snapshot: GameSnapshot,
    /// Bucket of each live player.
    players: Vec<usize>,
    pub entries: u64,
    pub moves: u64,
    pub leaves: u64,
}

impl Ledger {
    pub fn new(config: GameConfig, created_at: i64) -> Self {
        let buckets = vec![BucketSnapshot::new(0, 0); config.total_buckets()];
        Self {
            config,
            snapshot: GameSnapshot::new(buckets, created_at),
            players: Vec::new(),
            entries: 0,
            moves: 0,
            leaves: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() as u64 >= self.config.max_players
    }

    /// The last player left; the program closes the game account.
    pub fn is_over(&self) -> bool {
        self.entries > 0 && self.players.is_empty()
    }

    /// A random live player: (player slot, bucket).
    pub fn pick_player<R: Rng>(&self, rng: &mut R) -> Option<(usize, usize)> {
        if self.players.is_empty() {
            return None;
        }
        let who = rng.gen_range(0..self.players.len());
        Some((who, self.players[who]))
    }

    pub fn enter<R: Rng>(&mut self, rng: &mut R, now: i64) {
        self.settle(now);
        let bucket = rng.gen_range(1..=self.config.bucket_count as usize);
        self.players.push(bucket);
        self.adjust(0, self.config.entry_fee as i128, 1);
        self.adjust(bucket, 0, 1);
        self.entries += 1;
    }

    pub fn move_player<R: Rng>(&mut self, rng: &mut R, who: usize, now: i64) {
        self.settle(now);
        let from = self.players[who];
        let to = rng.gen_range(1..=self.config.bucket_count as usize);
        self.players[who] = to;
        self.adjust(from, 0, -1);
        self.adjust(to, 0, 1);
        self.moves += 1;
    }

    /// Remove a player and return what they were paid.
    pub fn leave(&mut self, who: usize, now: i64) -> u64 {
        let bucket = self.players.swap_remove(who);
        self.leaves += 1;
        if self.players.is_empty() {
            // the program pays the last player from the unsettled balances
            let winnings = u64::try_from(self.snapshot.total_balance()).unwrap_or(u64::MAX);
            let buckets = vec![BucketSnapshot::new(0, 0); self.config.total_buckets()];
            self.snapshot = GameSnapshot::new(buckets, now);
            return winnings;
        }
        self.settle(now);
        let b = self.snapshot.buckets[bucket];
        let winnings = b.balance / b.occupancy.max(1) as u64;
        self.adjust(bucket, -(winnings as i128), -1);
        self.adjust(0, 0, -1);
        winnings
    }

    /// Bring balances forward to `now`.
    ///
    /// Each bucket leaks `occupancy * spill_rate * elapsed` (at most its
    /// balance), split in equal floor shares. The holding bucket feeds every
    /// playable bucket, a playable bucket feeds the other playable ones, and
    /// with a single playable bucket nothing moves. All leaks are computed
    /// from the balances at the start of the interval.
    fn settle(&mut self, now: i64) {
        let elapsed = now.saturating_sub(self.snapshot.as_of);
        let n = self.config.bucket_count as usize;
        if elapsed <= 0 || n <= 1 {
            self.snapshot.as_of = now.max(self.snapshot.as_of);
            return;
        }

        let start: Vec<BucketSnapshot> = self.snapshot.buckets.clone();
        let mut balances: Vec<u128> = start.iter().map(|b| b.balance as u128).collect();
        for (i, b) in start.iter().enumerate() {
            let targets: Vec<usize> = if i == 0 {
                (1..=n).collect()
            } else {
                (1..=n).filter(|&j| j != i).collect()
            };
            let leak = (b.occupancy.max(0) as u128)
                .saturating_mul(self.config.spill_rate as u128)
                .saturating_mul(elapsed as u128)
                .min(b.balance as u128);
            let share = leak / targets.len() as u128;
            balances[i] -= share * targets.len() as u128;
            for j in targets {
                balances[j] += share;
            }
        }

        let buckets = start
            .iter()
            .zip(balances)
            .map(|(b, balance)| BucketSnapshot::new(u64::try_from(balance).unwrap_or(u64::MAX), b.occupancy))
            .collect();
        self.snapshot = GameSnapshot::new(buckets, now);
    }

    fn adjust(&mut self, bucket: usize, tokens: i128, players: i64) {
        let b = &mut self.snapshot.buckets[bucket];
        let balance = (b.balance as i128 + tokens).clamp(0, u64::MAX as i128) as u64;
        *b = BucketSnapshot::new(balance, b.occupancy + players);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config(bucket_count: u64) -> GameConfig {
        GameConfig {
            entry_fee: 1_000,
            spill_rate: 7,
            bucket_count,
            max_players: 40,
            mint_decimals: None,
        }
    }

    #[test]
    fn settlement_matches_engine_prediction() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for bucket_count in [1, 2, 3, 9] {
            let mut ledger = Ledger::new(config(bucket_count), 0);
            for _ in 0..25 {
                ledger.enter(&mut rng, 0);
            }
            let mut now = 0;
            for gap in [1, 3, 13, 60, 600] {
                now += gap;
                let expected = predict(&ledger.config, &ledger.snapshot, now as f64)
                    .expect("test: valid game");
                ledger.settle(now);
                assert_eq!(ledger.snapshot.as_of, now);
                let settled: Vec<u64> = ledger.snapshot.buckets.iter().map(|b| b.balance).collect();
                assert_eq!(settled, expected.balances(), "n={bucket_count} now={now}");
            }
        }
    }

    #[test]
    fn last_player_takes_everything() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut ledger = Ledger::new(config(3), 0);
        ledger.enter(&mut rng, 0);
        assert_eq!(ledger.leave(0, 30), 1_000);
        assert!(ledger.is_over());
    }
}
