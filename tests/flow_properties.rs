//! Property tests for the spillover predictor.
//!
//! 1. **Conservation**: a prediction never creates tokens and loses at most
//!    one unit of truncation per playable bucket.
//! 2. **Boundedness**: no predicted balance exceeds the game's fuel ceiling
//!    when the snapshot total fits under it.
//! 3. **Determinism**: the same inputs always give the same prediction, and a
//!    query's result does not depend on queries made before it.
//! 4. **Degenerate games**: a single playable bucket never moves, and a query
//!    at or before the snapshot returns the snapshot.

#[cfg(test)]
mod tests {
    use bucket_flow_engine::*;
    use proptest::prelude::*;

    // ─────────────────────────────────────────────────────────────────────────
    // Generators
    // ─────────────────────────────────────────────────────────────────────────

    /// A valid config and a snapshot whose total fits under the fuel ceiling.
    fn arb_game(buckets: std::ops::RangeInclusive<u64>) -> impl Strategy<Value = (GameConfig, GameSnapshot)> {
        (buckets, 1u64..=1_000_000, 1u64..=1_000, 2u64..=200, 0i64..=1_000_000)
            .prop_flat_map(|(bucket_count, entry_fee, spill_rate, max_players, as_of)| {
                let config = GameConfig {
                    entry_fee,
                    spill_rate,
                    bucket_count,
                    max_players,
                    mint_decimals: None,
                };
                let per_bucket = config.max_fuel() / (bucket_count + 1);
                let n = bucket_count as usize + 1;
                (
                    Just(config),
                    prop::collection::vec(0..=per_bucket, n),
                    prop::collection::vec(0i64..=20, n - 1),
                    Just(as_of),
                )
            })
            .prop_map(|(config, balances, occupancy, as_of)| {
                let players: i64 = occupancy.iter().sum();
                let buckets = balances
                    .iter()
                    .enumerate()
                    .map(|(i, &b)| {
                        let occ = if i == 0 { players } else { occupancy[i - 1] };
                        BucketSnapshot::new(b, occ)
                    })
                    .collect();
                (config, GameSnapshot::new(buckets, as_of))
            })
    }

    proptest! {
        #[test]
        fn prop_total_is_conserved(
            (config, snapshot) in arb_game(1..=16),
            offset in 0.0f64..2_000_000.0,
        ) {
            let now = snapshot.as_of as f64 + offset;
            let p = predict(&config, &snapshot, now).unwrap();
            let drift = p.total_balance() as i128 - snapshot.total_balance() as i128;
            prop_assert!(drift <= 0, "gained {} tokens", drift);
            prop_assert!(drift >= -(config.bucket_count as i128), "lost {} tokens", -drift);
        }

        #[test]
        fn prop_balances_stay_under_ceiling(
            (config, snapshot) in arb_game(1..=16),
            offset in 0.0f64..2_000_000.0,
        ) {
            let now = snapshot.as_of as f64 + offset;
            let p = predict(&config, &snapshot, now).unwrap();
            for b in &p.buckets {
                prop_assert!(b.balance <= config.max_fuel());
                prop_assert!(!b.out_of_range);
            }
        }

        #[test]
        fn prop_prediction_is_deterministic(
            (config, snapshot) in arb_game(1..=16),
            earlier in prop::collection::vec(0.0f64..10_000.0, 0..8),
            offset in 0.0f64..10_000.0,
        ) {
            let now = snapshot.as_of as f64 + offset;
            let first = predict(&config, &snapshot, now).unwrap();
            for e in earlier {
                predict(&config, &snapshot, snapshot.as_of as f64 + e).unwrap();
            }
            let second = predict(&config, &snapshot, now).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_fractional_seconds_are_ignored(
            (config, snapshot) in arb_game(1..=16),
            whole in 0i64..10_000,
            frac in 0.0f64..0.999,
        ) {
            let at = (snapshot.as_of + whole) as f64;
            let a = predict(&config, &snapshot, at).unwrap();
            let b = predict(&config, &snapshot, at + frac).unwrap();
            prop_assert_eq!(a.balances(), b.balances());
        }

        #[test]
        fn prop_single_bucket_never_moves(
            (config, snapshot) in arb_game(1..=1),
            offset in 0.0f64..2_000_000.0,
        ) {
            let p = predict(&config, &snapshot, snapshot.as_of as f64 + offset).unwrap();
            let expected: Vec<u64> = snapshot.buckets.iter().map(|b| b.balance).collect();
            prop_assert_eq!(p.balances(), expected);
        }

        #[test]
        fn prop_query_before_snapshot_is_identity(
            (config, snapshot) in arb_game(1..=16),
            back in 0.0f64..1_000_000.0,
        ) {
            let p = predict(&config, &snapshot, snapshot.as_of as f64 - back).unwrap();
            let expected: Vec<u64> = snapshot.buckets.iter().map(|b| b.balance).collect();
            prop_assert_eq!(p.balances(), expected);
            prop_assert!(p.signs().iter().all(|s| *s == FlowSign::Steady));
        }
    }
}
