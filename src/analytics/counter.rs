use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::{CompareParams, CounterConfig};

use super::error::AnalyticsError;
use super::raster;
use super::regions::find_blobs;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectCount {
    pub count: usize,
    pub areas: Vec<f64>,
}

/// Counts tool-like blobs in a single image. This is what seeds the
/// reference baseline.
pub struct ToolCounter {
    config: CounterConfig,
}

impl ToolCounter {
    pub fn new(config: CounterConfig) -> Self {
        Self { config }
    }

    pub fn count_objects(&self, image: &Mat, params: &CompareParams) -> Result<ObjectCount, AnalyticsError> {
        if image.empty() {
            return Err(AnalyticsError::NoFrame("cannot count objects in an empty image".into()));
        }
        let gray = raster::gray_smoothed(image, params.blur_kernel)?;
        let gray = raster::equalize(&gray, self.config.clip_limit, self.config.tile_grid)?;

        let mut binary = Mat::default();
        imgproc::adaptive_threshold(
            &gray,
            &mut binary,
            255.0,
            imgproc::ADAPTIVE_THRESH_GAUSSIAN_C,
            imgproc::THRESH_BINARY_INV,
            self.block_size(),
            self.config.offset_c,
        )?;

        let mut binary = raster::open_close(binary, params.morph_kernel)?;
        raster::zero_border(&mut binary, self.config.shape.border_margin)?;

        let areas: Vec<f64> = find_blobs(&binary, params.min_region_area as f64, &self.config.shape)?
            .into_iter()
            .map(|blob| blob.area)
            .collect();
        tracing::debug!(count = areas.len(), "objects counted");

        Ok(ObjectCount {
            count: areas.len(),
            areas,
        })
    }

    fn block_size(&self) -> i32 {
        raster::ensure_odd(self.config.block_size.max(3))
    }
}
