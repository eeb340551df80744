// Benchmark report types
// Structured JSON output, one file per bench invocation

use serde::Serialize;

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let stderr = std_dev / (n as f64).sqrt();
        let z = 1.96; // 95% CI
        Self {
            mean,
            std_dev,
            ci_lower: mean - z * stderr,
            ci_upper: mean + z * stderr,
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }

    pub fn of<T, F: Fn(&T) -> f64>(items: &[T], f: F) -> Self {
        let samples: Vec<f64> = items.iter().map(f).collect();
        Self::from_samples(&samples)
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    pub seed: u64,
    pub pass: bool,
    pub ticks: u64,
    pub views: u64,
    /// Views rendered for a game other than the selected one.
    pub stale_views: u32,
    /// Drift beyond the truncation allowance, summed over ticks.
    pub conservation_excess: u64,
    pub breaker_tripped: bool,
    /// Views with a bucket above the fuel ceiling.
    pub ceiling_breaches: u32,
    pub leave_checks: u32,
    pub leave_mismatches: u32,
    pub entries: u64,
    pub moves: u64,
    pub leaves: u64,
    pub games_ended: u32,
    pub engine_errors: u32,
    pub mean_tick_us: f64,
    pub elapsed_ms: u128,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub pass_rate: f64,
    pub views: Stats,
    pub ceiling_breaches: Stats,
    pub leave_checks: Stats,
    pub transactions: Stats,
    pub mean_tick_us: Stats,
    pub elapsed_ms: Stats,
    pub individual_runs: Vec<RunResult>,
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub base_seed: u64,
    pub summary: Summary,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}
