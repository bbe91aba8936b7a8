use serde::{Deserialize, Serialize};

use crate::analytics::{Band, Comparison, ScoreResult, Strategy};
use crate::config::CompareParams;

const SCORE_DECIMALS: f64 = 1e6;

/// Structured record written next to the images of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub timestamp: String,
    pub camera: String,
    pub score: f64,
    pub band: Band,
    pub baseline_count: Option<usize>,
    pub current_count: Option<usize>,
    pub changed_pixels: i64,
    pub percent_changed: f64,
    pub added_count: usize,
    pub removed_count: usize,
    pub aligned: bool,
    pub strategy: Strategy,
    pub parameters: CompareParams,
    pub diagnostic: String,
}

impl MetadataRecord {
    pub fn new(timestamp: String, camera: &str, comparison: &Comparison, parameters: CompareParams) -> Self {
        let score = &comparison.score;
        Self {
            timestamp,
            camera: camera.to_string(),
            score: round_score(score.severity),
            band: score.band,
            baseline_count: score.baseline_count,
            current_count: score.current_count,
            changed_pixels: comparison.changed_pixels,
            percent_changed: comparison.percent_changed,
            added_count: score.added_count,
            removed_count: score.removed_count,
            aligned: comparison.aligned,
            strategy: comparison.strategy,
            parameters,
            diagnostic: score.diagnostic_text.clone(),
        }
    }

    /// Rebuilds the score as it was persisted. The stored band is kept even
    /// when rounding moved the score onto a band edge.
    pub fn score_result(&self) -> ScoreResult {
        ScoreResult {
            severity: self.score,
            band: self.band,
            added_count: self.added_count,
            removed_count: self.removed_count,
            baseline_count: self.baseline_count,
            current_count: self.current_count,
            diagnostic_text: self.diagnostic.clone(),
        }
    }
}

pub fn round_score(score: f64) -> f64 {
    (score * SCORE_DECIMALS).round() / SCORE_DECIMALS
}
