use opencv::core::{Mat, Rect};
use opencv::prelude::*;

use crate::analytics::{AnalyticsError, Comparison, Pipeline};
use crate::config::{Config, PipelineSettings, Roi};

/// The stored reference snapshot and how many tools it showed.
pub struct Reference {
    pub image: Mat,
    pub baseline: usize,
}

/// Owns the reference state of one monitored scene. Callers serialise access
/// so a comparison never sees a half-updated reference.
pub struct Session {
    pipeline: Pipeline,
    roi: Option<Roi>,
    reference: Option<Reference>,
}

impl Session {
    pub fn new(settings: PipelineSettings, roi: Option<Roi>) -> Self {
        Self {
            pipeline: Pipeline::new(settings),
            roi,
            reference: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.pipeline(), config.roi)
    }

    /// Stores `image` (cropped to the ROI) as the new reference and returns its
    /// object count. On error the previous reference is kept.
    pub fn set_reference(&mut self, image: &Mat) -> Result<usize, AnalyticsError> {
        let image = self.prepare(image)?;
        let baseline = self.pipeline.count_objects(&image)?.count;
        tracing::info!(baseline, "reference captured");
        self.reference = Some(Reference { image, baseline });
        Ok(baseline)
    }

    pub fn take_reference(&mut self, image: &Mat) -> Result<usize, AnalyticsError> {
        self.set_reference(image)
    }

    pub fn compare(&self, current: &Mat) -> Result<Comparison, AnalyticsError> {
        let reference = self.reference.as_ref().ok_or(AnalyticsError::NoReference)?;
        let current = self.prepare(current)?;
        self.pipeline
            .compare(&reference.image, &current, Some(reference.baseline))
    }

    pub fn reset(&mut self) {
        if self.reference.take().is_some() {
            tracing::info!("reference cleared");
        }
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn baseline(&self) -> Option<usize> {
        self.reference.as_ref().map(|r| r.baseline)
    }

    /// Applies the ROI to a raw frame, as done for every frame entering the session.
    pub fn prepare(&self, image: &Mat) -> Result<Mat, AnalyticsError> {
        if image.empty() {
            return Err(AnalyticsError::NoFrame("frame is empty".into()));
        }
        match self.roi {
            Some(roi) => crop(image, roi),
            None => Ok(image.try_clone()?),
        }
    }
}

fn crop(image: &Mat, roi: Roi) -> Result<Mat, AnalyticsError> {
    let rect = Rect::new(roi.x, roi.y, roi.width, roi.height);
    let inside = rect.x >= 0
        && rect.y >= 0
        && rect.width > 0
        && rect.height > 0
        && rect.x + rect.width <= image.cols()
        && rect.y + rect.height <= image.rows();
    if !inside {
        return Err(AnalyticsError::InvalidParameter(format!(
            "roi {rect:?} outside {}x{} frame",
            image.cols(),
            image.rows()
        )));
    }
    Ok(Mat::roi(image, rect)?.try_clone()?)
}
