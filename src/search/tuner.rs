//! Sampling hyperparameter tuner for the decision LLM.
//!
//! The tuner converts result relevance into exploration pressure: weak
//! results push sampling toward exploration (higher temperature, wider
//! nucleus, stronger penalties), strong results pull it back. Each parameter
//! is a linear function of `explore = 1 - relevance` plus small symmetric
//! jitter, clamped to its declared range. Per-request flags freeze individual
//! parameters.

use crate::config::TuningFlags;
use crate::search::vector::SearchResult;
use rand::Rng;

/// Clamp ranges per parameter.
const TEMPERATURE_RANGE: (f32, f32) = (0.2, 1.0);
const TOP_P_RANGE: (f32, f32) = (0.5, 1.0);
const PENALTY_RANGE: (f32, f32) = (0.0, 1.0);

/// Jitter amplitude shared by all parameters.
const JITTER: f32 = 0.1;

/// The sampling state carried across iterations of one search run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HyperParams {
    /// Sampling temperature, in `[0.2, 1.0]`.
    pub temperature: f32,
    /// Nucleus sampling parameter, in `[0.5, 1.0]`.
    pub top_p: f32,
    /// Presence penalty, in `[0.0, 1.0]`.
    pub presence_penalty: f32,
    /// Frequency penalty, in `[0.0, 1.0]`.
    pub frequency_penalty: f32,
}

impl Default for HyperParams {
    /// Mid-exploration starting point: the base formulas at `explore = 0.5`.
    fn default() -> Self {
        Self {
            temperature: 0.65,
            top_p: 0.775,
            presence_penalty: 0.5,
            frequency_penalty: 0.5,
        }
    }
}

/// Relevance-driven tuner; owns the per-request flags.
#[derive(Debug, Clone)]
pub struct HyperTuner {
    flags: TuningFlags,
}

impl HyperTuner {
    /// Creates a tuner with the given per-request flags.
    pub fn new(flags: TuningFlags) -> Self {
        Self { flags }
    }

    /// Adjusts `params` from the normalized average relevance of the latest
    /// results. Disabled parameters are left untouched.
    pub fn retune(&self, params: &mut HyperParams, avg_relevance: f64) {
        let explore = (1.0 - avg_relevance.clamp(0.0, 1.0)) as f32;
        let mut rng = rand::thread_rng();

        if self.flags.temperature {
            let base = 0.3 + 0.7 * explore;
            params.temperature = jittered(base, &mut rng).clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        }
        if self.flags.top_p {
            let base = 0.6 + 0.35 * explore;
            params.top_p = jittered(base, &mut rng).clamp(TOP_P_RANGE.0, TOP_P_RANGE.1);
        }
        if self.flags.frequency_penalty {
            let base = 0.1 + 0.8 * explore;
            params.frequency_penalty = jittered(base, &mut rng).clamp(PENALTY_RANGE.0, PENALTY_RANGE.1);
        }
        if self.flags.presence_penalty {
            let base = 0.2 + 0.6 * explore;
            params.presence_penalty = jittered(base, &mut rng).clamp(PENALTY_RANGE.0, PENALTY_RANGE.1);
        }
    }
}

fn jittered(base: f32, rng: &mut impl Rng) -> f32 {
    base + rng.gen_range(-JITTER..=JITTER)
}

/// Average relevance of the top 10 results relative to the best score seen
/// so far, in `[0, 1]`. Empty input or a non-positive best score read as
/// fully irrelevant.
pub fn average_relevance(results: &[SearchResult], best_score: f64) -> f64 {
    if results.is_empty() || best_score <= 0.0 {
        return 0.0;
    }
    let top: Vec<f64> = results.iter().take(10).map(|r| r.score).collect();
    let mean = top.iter().sum::<f64>() / top.len() as f64;
    (mean / best_score).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn result(score: f64) -> SearchResult {
        SearchResult {
            file_id: "f1".to_string(),
            filename: "f1.pdf".to_string(),
            score,
            content: format!("chunk-{score}"),
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn test_low_relevance_pushes_exploration() {
        let tuner = HyperTuner::new(TuningFlags::default());
        let mut params = HyperParams::default();
        tuner.retune(&mut params, 0.0);

        // Base values at explore = 1.0, within jitter of the formulas.
        assert!((params.temperature - 1.0).abs() <= JITTER + 1e-6);
        assert!((params.top_p - 0.95).abs() <= JITTER + 1e-6);
        assert!((params.frequency_penalty - 0.9).abs() <= JITTER + 1e-6);
        assert!((params.presence_penalty - 0.8).abs() <= JITTER + 1e-6);
    }

    #[test]
    fn test_high_relevance_pulls_back() {
        let tuner = HyperTuner::new(TuningFlags::default());
        let mut params = HyperParams::default();
        tuner.retune(&mut params, 1.0);

        assert!((params.temperature - 0.3).abs() <= JITTER + 1e-6);
        assert!((params.top_p - 0.6).abs() <= JITTER + 1e-6);
        assert!((params.frequency_penalty - 0.1).abs() <= JITTER + 1e-6);
        assert!((params.presence_penalty - 0.2).abs() <= JITTER + 1e-6);
    }

    #[test]
    fn test_values_stay_clamped() {
        let tuner = HyperTuner::new(TuningFlags::default());
        for relevance in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let mut params = HyperParams::default();
            tuner.retune(&mut params, relevance);
            assert!((0.2..=1.0).contains(&params.temperature));
            assert!((0.5..=1.0).contains(&params.top_p));
            assert!((0.0..=1.0).contains(&params.presence_penalty));
            assert!((0.0..=1.0).contains(&params.frequency_penalty));
        }
    }

    #[test]
    fn test_disabled_flags_freeze_parameters() {
        let tuner = HyperTuner::new(TuningFlags {
            temperature: false,
            top_p: false,
            presence_penalty: true,
            frequency_penalty: true,
        });
        let mut params = HyperParams::default();
        let before = params;
        tuner.retune(&mut params, 0.0);

        assert_eq!(params.temperature, before.temperature);
        assert_eq!(params.top_p, before.top_p);
        assert_ne!(
            (params.presence_penalty, params.frequency_penalty),
            (before.presence_penalty, before.frequency_penalty)
        );
    }

    #[test]
    fn test_average_relevance() {
        let results: Vec<SearchResult> = [0.8, 0.6, 0.4].iter().map(|&s| result(s)).collect();
        let avg = average_relevance(&results, 0.8);
        assert!((avg - 0.75).abs() < 1e-9);

        assert_eq!(average_relevance(&[], 0.8), 0.0);
        assert_eq!(average_relevance(&results, 0.0), 0.0);
    }

    #[test]
    fn test_average_relevance_uses_top_ten_only() {
        let mut results: Vec<SearchResult> = (0..10).map(|_| result(1.0)).collect();
        results.extend((0..10).map(|_| result(0.0)));
        assert_eq!(average_relevance(&results, 1.0), 1.0);
    }
}
