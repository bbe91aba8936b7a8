use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analytics::{AnalyticsError, Strategy};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_camera_source() -> String {
    "0".to_string()
}

fn default_frame_width() -> u32 {
    1280
}

fn default_frame_height() -> u32 {
    720
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_id")]
    pub id: String,
    /// Device index ("0", "1", ...) or a stream URL / file path.
    #[serde(default = "default_camera_source")]
    pub source: String,
    #[serde(default = "default_frame_width")]
    pub width: u32,
    #[serde(default = "default_frame_height")]
    pub height: u32,
}

fn default_camera_id() -> String {
    "tray".to_string()
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: default_camera_id(),
            source: default_camera_source(),
            width: default_frame_width(),
            height: default_frame_height(),
        }
    }
}

fn default_blur_kernel() -> i32 {
    5
}

fn default_threshold() -> i32 {
    35
}

fn default_morph_kernel() -> i32 {
    5
}

fn default_min_region_area() -> i32 {
    1500
}

fn default_true() -> bool {
    true
}

/// Per-comparison parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CompareParams {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_blur_kernel")]
    pub blur_kernel: i32,
    #[serde(default = "default_threshold")]
    pub threshold: i32,
    #[serde(default = "default_morph_kernel")]
    pub morph_kernel: i32,
    #[serde(default = "default_min_region_area")]
    pub min_region_area: i32,
    #[serde(default = "default_true")]
    pub align: bool,
    #[serde(default = "default_true")]
    pub use_region_detection: bool,
}

impl Default for CompareParams {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            blur_kernel: default_blur_kernel(),
            threshold: default_threshold(),
            morph_kernel: default_morph_kernel(),
            min_region_area: default_min_region_area(),
            align: true,
            use_region_detection: true,
        }
    }
}

impl CompareParams {
    /// Rejects out-of-range values. Even kernels pass: `raster::smooth`
    /// bumps an even blur kernel to the next odd size when applying it.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.blur_kernel < 0 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "blur_kernel must be >= 0, got {}",
                self.blur_kernel
            )));
        }
        if !(0..=255).contains(&self.threshold) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "threshold must be within 0..=255, got {}",
                self.threshold
            )));
        }
        if self.morph_kernel < 0 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "morph_kernel must be >= 0, got {}",
                self.morph_kernel
            )));
        }
        if self.min_region_area < 0 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "min_region_area must be >= 0, got {}",
                self.min_region_area
            )));
        }
        Ok(())
    }
}

fn default_max_iterations() -> i32 {
    50
}

fn default_epsilon() -> f64 {
    1e-5
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: i32,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_blur_kernel")]
    pub blur_kernel: i32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            epsilon: default_epsilon(),
            blur_kernel: default_blur_kernel(),
        }
    }
}

fn default_max_aspect_ratio() -> f64 {
    8.0
}

fn default_min_compactness() -> f64 {
    0.10
}

fn default_border_margin() -> i32 {
    15
}

/// Shape gates shared by region extraction and object counting.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ShapeFilter {
    #[serde(default = "default_max_aspect_ratio")]
    pub max_aspect_ratio: f64,
    #[serde(default = "default_min_compactness")]
    pub min_compactness: f64,
    #[serde(default = "default_border_margin")]
    pub border_margin: i32,
}

impl Default for ShapeFilter {
    fn default() -> Self {
        Self {
            max_aspect_ratio: default_max_aspect_ratio(),
            min_compactness: default_min_compactness(),
            border_margin: default_border_margin(),
        }
    }
}

fn default_clip_limit() -> f64 {
    3.0
}

fn default_tile_grid() -> i32 {
    8
}

fn default_threshold_floor() -> i32 {
    30
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RegionConfig {
    #[serde(default = "default_true")]
    pub equalize: bool,
    #[serde(default = "default_clip_limit")]
    pub clip_limit: f64,
    #[serde(default = "default_tile_grid")]
    pub tile_grid: i32,
    /// Lower bound applied to the caller's threshold for the signed masks.
    #[serde(default = "default_threshold_floor")]
    pub threshold_floor: i32,
    #[serde(default)]
    pub shape: ShapeFilter,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            equalize: true,
            clip_limit: default_clip_limit(),
            tile_grid: default_tile_grid(),
            threshold_floor: default_threshold_floor(),
            shape: ShapeFilter::default(),
        }
    }
}

fn default_block_size() -> i32 {
    15
}

fn default_offset_c() -> f64 {
    5.0
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CounterConfig {
    #[serde(default = "default_clip_limit")]
    pub clip_limit: f64,
    #[serde(default = "default_tile_grid")]
    pub tile_grid: i32,
    /// Neighbourhood of the adaptive threshold, forced odd and >= 3.
    #[serde(default = "default_block_size")]
    pub block_size: i32,
    #[serde(default = "default_offset_c")]
    pub offset_c: f64,
    #[serde(default)]
    pub shape: ShapeFilter,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            clip_limit: default_clip_limit(),
            tile_grid: default_tile_grid(),
            block_size: default_block_size(),
            offset_c: default_offset_c(),
            shape: ShapeFilter::default(),
        }
    }
}

fn default_count_weight() -> f64 {
    0.70
}

fn default_area_weight() -> f64 {
    0.30
}

fn default_area_gain() -> f64 {
    12.0
}

fn default_min_removed_score() -> f64 {
    20.0
}

/// Site calibration of the severity score.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_count_weight")]
    pub count_weight: f64,
    #[serde(default = "default_area_weight")]
    pub area_weight: f64,
    #[serde(default = "default_area_gain")]
    pub area_gain: f64,
    #[serde(default = "default_min_removed_score")]
    pub min_removed_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            count_weight: default_count_weight(),
            area_weight: default_area_weight(),
            area_gain: default_area_gain(),
            min_removed_score: default_min_removed_score(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_output_dir(),
        }
    }
}

/// Crop rectangle applied to every captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Everything the comparison pipeline needs besides the two images.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSettings {
    pub params: CompareParams,
    pub alignment: AlignmentConfig,
    pub regions: RegionConfig,
    pub counter: CounterConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub compare: CompareParams,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub regions: RegionConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub roi: Option<Roi>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compare
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.alignment.max_iterations <= 0 || self.alignment.epsilon <= 0.0 {
            return Err(ConfigError::Invalid(
                "alignment needs a positive iteration budget and epsilon".into(),
            ));
        }
        if self.counter.block_size < 0 || self.counter.tile_grid <= 0 || self.regions.tile_grid <= 0
        {
            return Err(ConfigError::Invalid(
                "counter/regions kernel sizes must be positive".into(),
            ));
        }
        let s = &self.scoring;
        if s.count_weight < 0.0 || s.area_weight < 0.0 || s.area_gain < 0.0 {
            return Err(ConfigError::Invalid(
                "scoring weights and gain must be non-negative".into(),
            ));
        }
        if let Some(roi) = self.roi {
            if roi.width <= 0 || roi.height <= 0 || roi.x < 0 || roi.y < 0 {
                return Err(ConfigError::Invalid(format!("empty or negative roi: {roi:?}")));
            }
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            params: self.compare,
            alignment: self.alignment,
            regions: self.regions,
            counter: self.counter,
            scoring: self.scoring,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.compare, CompareParams::default());
        assert_eq!(config.camera.source, "0");
        assert!(config.roi.is_none());
        assert!((config.scoring.area_gain - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [compare]
            strategy = "edges"
            threshold = 25
            align = false

            [scoring]
            min_removed_score = 30.0

            [roi]
            x = 10
            y = 20
            width = 300
            height = 200
            "#,
        )
        .unwrap();

        assert_eq!(config.compare.strategy, Strategy::Edges);
        assert_eq!(config.compare.threshold, 25);
        assert!(!config.compare.align);
        assert_eq!(config.compare.blur_kernel, 5);
        assert!((config.scoring.min_removed_score - 30.0).abs() < f64::EPSILON);
        assert_eq!(
            config.roi,
            Some(Roi {
                x: 10,
                y: 20,
                width: 300,
                height: 200
            })
        );
    }

    #[test]
    fn negative_area_is_rejected() {
        let err = Config::parse("[compare]\nmin_region_area = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn negative_kernels_are_rejected() {
        for params in [
            CompareParams {
                blur_kernel: -1,
                ..CompareParams::default()
            },
            CompareParams {
                morph_kernel: -3,
                ..CompareParams::default()
            },
        ] {
            assert!(matches!(
                params.validate(),
                Err(AnalyticsError::InvalidParameter(_))
            ));
        }
        let err = Config::parse("[compare]\nblur_kernel = -5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn small_and_even_kernels_are_accepted() {
        for (blur_kernel, morph_kernel) in [(0, 0), (1, 1), (4, 6)] {
            let params = CompareParams {
                blur_kernel,
                morph_kernel,
                ..CompareParams::default()
            };
            assert!(params.validate().is_ok(), "{blur_kernel}/{morph_kernel}");
        }
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let params = CompareParams {
            threshold: 300,
            ..CompareParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(AnalyticsError::InvalidParameter(_))
        ));
    }
}
