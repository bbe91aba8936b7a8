use opencv::core::Mat;
use opencv::prelude::*;

use crate::config::{CompareParams, PipelineSettings};

use super::align::FrameAligner;
use super::counter::{ObjectCount, ToolCounter};
use super::difference::Strategy;
use super::error::AnalyticsError;
use super::raster;
use super::regions::RegionExtractor;
use super::score::{FusionInput, ScoreFusion, ScoreResult};

/// Images produced by one comparison, ready to be persisted.
pub struct Artifacts {
    pub mask: Mat,
    pub visualization: Mat,
    /// Annotated regions; only present when region detection ran.
    pub overlay: Option<Mat>,
    /// The current image after motion compensation (a copy when alignment was off or failed).
    pub aligned: Mat,
}

pub struct Comparison {
    pub score: ScoreResult,
    pub artifacts: Artifacts,
    pub changed_pixels: i64,
    pub percent_changed: f64,
    pub aligned: bool,
    pub strategy: Strategy,
}

/// All stages of a comparison, configured once and reused across calls.
pub struct Pipeline {
    settings: PipelineSettings,
    aligner: FrameAligner,
    extractor: RegionExtractor,
    counter: ToolCounter,
    fusion: ScoreFusion,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            aligner: FrameAligner::new(settings.alignment),
            extractor: RegionExtractor::new(settings.regions),
            counter: ToolCounter::new(settings.counter),
            fusion: ScoreFusion::new(settings.scoring),
            settings,
        }
    }

    pub fn params(&self) -> &CompareParams {
        &self.settings.params
    }

    pub fn count_objects(&self, image: &Mat) -> Result<ObjectCount, AnalyticsError> {
        self.counter.count_objects(image, &self.settings.params)
    }

    pub fn compare(
        &self,
        reference: &Mat,
        current: &Mat,
        baseline: Option<usize>,
    ) -> Result<Comparison, AnalyticsError> {
        let params = &self.settings.params;
        params.validate()?;
        raster::ensure_same_shape(reference, current)?;

        let (aligned_image, aligned) = if params.align {
            let alignment = self.aligner.align(reference, current)?;
            (alignment.image, alignment.converged)
        } else {
            (current.try_clone()?, false)
        };

        let difference = params
            .strategy
            .engine()
            .compute(reference, &aligned_image, params)?;

        let total_pixels = (reference.rows() as usize) * (reference.cols() as usize);

        let (score, overlay) = if params.use_region_detection {
            let report = self.extractor.extract(reference, &aligned_image, params)?;
            let current_count = self.counter.count_objects(&aligned_image, params)?.count;
            let severity = self.fusion.fuse(&FusionInput {
                baseline,
                current_count,
                region_area: report.total_area,
                total_pixels,
                removed_count: report.removed_count,
            });
            let score = self.fusion.result(
                severity,
                report.added_count,
                report.removed_count,
                baseline,
                Some(current_count),
            );
            (score, Some(report.overlay))
        } else {
            let severity = self.fusion.area_only(difference.changed_pixels, total_pixels);
            (self.fusion.result(severity, 0, 0, baseline, None), None)
        };

        tracing::info!(
            strategy = %params.strategy,
            aligned,
            changed = difference.changed_pixels,
            percent = format!("{:.2}", difference.percent_changed),
            score = format!("{:.3}", score.severity),
            band = %score.band,
            "comparison finished"
        );

        Ok(Comparison {
            score,
            artifacts: Artifacts {
                mask: difference.mask,
                visualization: difference.visualization,
                overlay,
                aligned: aligned_image,
            },
            changed_pixels: difference.changed_pixels,
            percent_changed: difference.percent_changed,
            aligned,
            strategy: params.strategy,
        })
    }
}

/// One-shot comparison with explicit settings.
pub fn compare(
    reference: &Mat,
    current: &Mat,
    baseline: Option<usize>,
    settings: &PipelineSettings,
) -> Result<Comparison, AnalyticsError> {
    Pipeline::new(*settings).compare(reference, current, baseline)
}
