//! Search configuration.

use bon::bon;

/// Tuning knobs for [`search`](super::search).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Hard cap on search rounds.
    pub max_rounds: usize,
    /// Launches per timing; the minimum is kept.
    pub runs: usize,
    /// Weight of the "no change" option. Below 1.0 biases toward stopping.
    pub stop_weight: f64,
    /// Launches of the winning kernel before the correctness check.
    pub final_runs: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_rounds: 10, runs: 3, stop_weight: 0.9, final_runs: 3 }
    }
}

#[bon]
impl SearchConfig {
    #[builder]
    pub fn new(
        #[builder(default = 10)] max_rounds: usize,
        #[builder(default = 3)] runs: usize,
        #[builder(default = 0.9)] stop_weight: f64,
        #[builder(default = 3)] final_runs: usize,
    ) -> Self {
        Self { max_rounds, runs, stop_weight, final_runs }
    }

    /// Defaults overridden by the environment.
    ///
    /// # Environment Variables
    ///
    /// * `TESSEL_SEARCH_ROUNDS` - Round cap (default: 10)
    /// * `TESSEL_SEARCH_RUNS` - Launches per timing (default: 3)
    pub fn from_env() -> Self {
        let max_rounds = std::env::var("TESSEL_SEARCH_ROUNDS").ok().and_then(|s| s.parse().ok()).unwrap_or(10);
        let runs = std::env::var("TESSEL_SEARCH_RUNS").ok().and_then(|s| s.parse().ok()).unwrap_or(3);
        Self::builder().max_rounds(max_rounds).runs(runs).build()
    }
}
