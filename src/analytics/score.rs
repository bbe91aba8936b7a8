use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    Ok,
    Warning,
    Alert,
    Critical,
}

impl Band {
    /// Upper bounds are inclusive: 15 is still OK, 15.01 is WARNING.
    pub fn from_score(score: f64) -> Self {
        if score <= 15.0 {
            Band::Ok
        } else if score <= 35.0 {
            Band::Warning
        } else if score <= 60.0 {
            Band::Alert
        } else {
            Band::Critical
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Ok => "OK",
            Band::Warning => "WARNING",
            Band::Alert => "ALERT",
            Band::Critical => "CRITICAL",
        }
    }

    pub fn color_hex(self) -> &'static str {
        match self {
            Band::Ok => "#2ecc71",
            Band::Warning => "#f1c40f",
            Band::Alert => "#e67e22",
            Band::Critical => "#e74c3c",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub severity: f64,
    pub band: Band,
    pub added_count: usize,
    pub removed_count: usize,
    pub baseline_count: Option<usize>,
    pub current_count: Option<usize>,
    pub diagnostic_text: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FusionInput {
    pub baseline: Option<usize>,
    pub current_count: usize,
    pub region_area: f64,
    pub total_pixels: usize,
    pub removed_count: usize,
}

/// Combines the missing-object ratio with the changed-area fraction.
pub struct ScoreFusion {
    config: ScoringConfig,
}

impl ScoreFusion {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn fuse(&self, input: &FusionInput) -> f64 {
        let by_area = self.area_score(input.region_area, input.total_pixels);

        match input.baseline {
            Some(baseline) if baseline > 0 => {
                let missing = baseline.saturating_sub(input.current_count) as f64;
                let by_count = missing / baseline as f64 * 100.0;
                let weighted = self.config.count_weight * by_count + self.config.area_weight * by_area;
                let score = weighted.clamp(0.0, 100.0);
                if input.removed_count > 0 {
                    score.max(self.config.min_removed_score)
                } else {
                    score
                }
            }
            _ => by_area.clamp(0.0, 100.0),
        }
    }

    /// Score of the plain changed-pixel mode, without region analysis.
    pub fn area_only(&self, changed_pixels: i64, total_pixels: usize) -> f64 {
        self.area_score(changed_pixels.max(0) as f64, total_pixels)
            .clamp(0.0, 100.0)
    }

    fn area_score(&self, area: f64, total_pixels: usize) -> f64 {
        if total_pixels == 0 {
            return 0.0;
        }
        area / total_pixels as f64 * 100.0 * self.config.area_gain
    }

    pub fn result(
        &self,
        severity: f64,
        added_count: usize,
        removed_count: usize,
        baseline_count: Option<usize>,
        current_count: Option<usize>,
    ) -> ScoreResult {
        let band = Band::from_score(severity);
        ScoreResult {
            severity,
            band,
            added_count,
            removed_count,
            baseline_count,
            current_count,
            diagnostic_text: diagnostic(band, added_count, removed_count, baseline_count, current_count),
        }
    }
}

fn diagnostic(
    band: Band,
    added: usize,
    removed: usize,
    baseline: Option<usize>,
    current: Option<usize>,
) -> String {
    let mut text = match band {
        Band::Ok => "No significant change".to_string(),
        Band::Warning => "Minor change detected".to_string(),
        Band::Alert => "Significant change detected".to_string(),
        Band::Critical => "Critical change: tools likely missing".to_string(),
    };
    if added + removed > 0 {
        text.push_str(&format!(" ({added} added, {removed} removed)"));
    }
    if let (Some(baseline), Some(current)) = (baseline, current) {
        text.push_str(&format!("; tools {current}/{baseline}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fusion() -> ScoreFusion {
        ScoreFusion::new(ScoringConfig::default())
    }

    #[test]
    fn band_edges_have_no_gaps() {
        assert_eq!(Band::from_score(0.0), Band::Ok);
        assert_eq!(Band::from_score(15.0), Band::Ok);
        assert_eq!(Band::from_score(15.01), Band::Warning);
        assert_eq!(Band::from_score(35.0), Band::Warning);
        assert_eq!(Band::from_score(35.01), Band::Alert);
        assert_eq!(Band::from_score(60.0), Band::Alert);
        assert_eq!(Band::from_score(60.01), Band::Critical);
        assert_eq!(Band::from_score(100.0), Band::Critical);
    }

    #[test]
    fn removed_region_enforces_floor() {
        let score = fusion().fuse(&FusionInput {
            baseline: Some(10),
            current_count: 10,
            region_area: 10.0,
            total_pixels: 100_000,
            removed_count: 1,
        });
        assert_eq!(score, 20.0);
    }

    #[test]
    fn floor_never_lowers_a_higher_score() {
        let score = fusion().fuse(&FusionInput {
            baseline: Some(4),
            current_count: 1,
            region_area: 0.0,
            total_pixels: 10_000,
            removed_count: 2,
        });
        assert!((score - 52.5).abs() < 1e-9);
    }

    #[test]
    fn missing_baseline_falls_back_to_area() {
        for baseline in [None, Some(0)] {
            let score = fusion().fuse(&FusionInput {
                baseline,
                current_count: 3,
                region_area: 500.0,
                total_pixels: 100_000,
                removed_count: 1,
            });
            assert!((score - 6.0).abs() < 1e-9, "{baseline:?}: {score}");
        }
    }

    #[test]
    fn scores_are_clamped() {
        let score = fusion().fuse(&FusionInput {
            baseline: None,
            region_area: 90_000.0,
            total_pixels: 100_000,
            ..FusionInput::default()
        });
        assert_eq!(score, 100.0);
        assert_eq!(fusion().area_only(0, 0), 0.0);
        assert!((fusion().area_only(400, 10_000) - 48.0).abs() < 1e-9);
    }

    #[test]
    fn extra_objects_do_not_raise_count_score() {
        let score = fusion().fuse(&FusionInput {
            baseline: Some(3),
            current_count: 5,
            region_area: 0.0,
            total_pixels: 10_000,
            removed_count: 0,
        });
        assert_eq!(score, 0.0);
    }

    #[test]
    fn result_carries_band_and_diagnostic() {
        let result = fusion().result(72.0, 0, 2, Some(5), Some(2));
        assert_eq!(result.band, Band::Critical);
        assert_eq!(result.band.color_hex(), "#e74c3c");
        assert!(result.diagnostic_text.contains("2 removed"));
        assert!(result.diagnostic_text.contains("2/5"));
    }

    #[test]
    fn band_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Band::Warning).unwrap(), "\"WARNING\"");
    }
}
