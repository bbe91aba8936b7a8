use std::f64::consts::PI;

use opencv::core::{self, Mat, Point, Rect, Scalar, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::{CompareParams, RegionConfig, ShapeFilter};

use super::error::AnalyticsError;
use super::raster::{self, Bgr};

const BOX_THICKNESS: i32 = 3;
const TINT_KEEP: f64 = 0.7;
const LABEL_SCALE: f64 = 0.7;
const LABEL_THICKNESS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Added,
    Removed,
}

impl RegionKind {
    pub fn label(self) -> &'static str {
        match self {
            RegionKind::Added => "Added",
            RegionKind::Removed => "Removed",
        }
    }

    fn color(self) -> Bgr {
        match self {
            RegionKind::Added => raster::GREEN,
            RegionKind::Removed => raster::BLUE,
        }
    }
}

/// Shape descriptors of one connected component.
#[derive(Debug, Clone, Copy)]
pub struct Blob {
    pub bbox: Rect,
    pub area: f64,
    pub perimeter: f64,
    pub aspect_ratio: f64,
    pub compactness: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub bbox: Rect,
    pub area: f64,
    pub perimeter: f64,
    pub aspect_ratio: f64,
    pub compactness: f64,
    pub kind: RegionKind,
}

impl Region {
    fn new(blob: Blob, kind: RegionKind) -> Self {
        Self {
            bbox: blob.bbox,
            area: blob.area,
            perimeter: blob.perimeter,
            aspect_ratio: blob.aspect_ratio,
            compactness: blob.compactness,
            kind,
        }
    }
}

pub struct RegionReport {
    /// Copy of the current image with the surviving regions drawn on it.
    pub overlay: Mat,
    pub regions: Vec<Region>,
    pub added_count: usize,
    pub removed_count: usize,
    pub total_area: f64,
}

/// Finds external contours of `mask` and keeps the ones passing the size and
/// shape gates. Area is the filled pixel count of the contour.
pub fn find_blobs(mask: &Mat, min_area: f64, filter: &ShapeFilter) -> Result<Vec<Blob>, AnalyticsError> {
    let mut work = mask.try_clone()?;
    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &mut work,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let mut blobs = Vec::new();
    for (idx, contour) in contours.iter().enumerate() {
        let bbox = imgproc::bounding_rect(&contour)?;
        let area = filled_area(&contours, idx as i32, bbox)?;
        if area < min_area {
            continue;
        }

        let (w, h) = (bbox.width as f64, bbox.height as f64);
        let aspect_ratio = w.max(h) / w.min(h).max(1.0);
        if aspect_ratio > filter.max_aspect_ratio {
            continue;
        }

        let perimeter = imgproc::arc_length(&contour, true)?;
        let compactness = if perimeter > 0.0 {
            4.0 * PI * area / (perimeter * perimeter)
        } else {
            0.0
        };
        if perimeter > 0.0 && compactness < filter.min_compactness {
            continue;
        }

        blobs.push(Blob {
            bbox,
            area,
            perimeter,
            aspect_ratio,
            compactness,
        });
    }
    Ok(blobs)
}

fn filled_area(contours: &Vector<Vector<Point>>, idx: i32, bbox: Rect) -> Result<f64, AnalyticsError> {
    let mut canvas = Mat::new_rows_cols_with_default(
        bbox.height.max(1),
        bbox.width.max(1),
        core::CV_8UC1,
        Scalar::all(0.0),
    )?;
    imgproc::draw_contours(
        &mut canvas,
        contours,
        idx,
        Scalar::all(255.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        &Mat::default(),
        i32::MAX,
        Point::new(-bbox.x, -bbox.y),
    )?;
    Ok(core::count_non_zero(&canvas)? as f64)
}

/// Separates appeared from disappeared content using the two signed
/// differences of the grey images.
pub struct RegionExtractor {
    config: RegionConfig,
}

impl RegionExtractor {
    pub fn new(config: RegionConfig) -> Self {
        Self { config }
    }

    pub fn extract(
        &self,
        reference: &Mat,
        current: &Mat,
        params: &CompareParams,
    ) -> Result<RegionReport, AnalyticsError> {
        raster::ensure_same_shape(reference, current)?;
        let g1 = self.prepare(reference, params.blur_kernel)?;
        let g2 = self.prepare(current, params.blur_kernel)?;

        let mut brighter = Mat::default();
        let mut darker = Mat::default();
        core::subtract_def(&g2, &g1, &mut brighter)?;
        core::subtract_def(&g1, &g2, &mut darker)?;

        let cut = params.threshold.max(self.config.threshold_floor) as f64;
        let min_area = params.min_region_area as f64;

        let mut overlay = raster::to_bgr(current)?;
        let mut regions = Vec::new();
        for (diff, kind) in [(brighter, RegionKind::Added), (darker, RegionKind::Removed)] {
            let mask = raster::binarize(&diff, cut)?;
            let mut mask = raster::open_close(mask, params.morph_kernel)?;
            raster::zero_border(&mut mask, self.config.shape.border_margin)?;

            for blob in find_blobs(&mask, min_area, &self.config.shape)? {
                let region = Region::new(blob, kind);
                draw_region(&mut overlay, &region)?;
                regions.push(region);
            }
        }

        let added_count = regions.iter().filter(|r| r.kind == RegionKind::Added).count();
        let removed_count = regions.len() - added_count;
        let total_area: f64 = regions.iter().map(|r| r.area).sum();
        tracing::debug!(added_count, removed_count, total_area, "regions extracted");

        Ok(RegionReport {
            overlay,
            regions,
            added_count,
            removed_count,
            total_area,
        })
    }

    fn prepare(&self, image: &Mat, blur: i32) -> Result<Mat, AnalyticsError> {
        let gray = raster::gray_smoothed(image, blur)?;
        if self.config.equalize {
            raster::equalize(&gray, self.config.clip_limit, self.config.tile_grid)
        } else {
            Ok(gray)
        }
    }
}

fn draw_region(overlay: &mut Mat, region: &Region) -> Result<(), AnalyticsError> {
    let color = region.kind.color();
    let bbox = region.bbox;

    imgproc::rectangle(
        overlay,
        bbox,
        raster::scalar(color),
        BOX_THICKNESS,
        imgproc::LINE_8,
        0,
    )?;
    raster::tint_rect(overlay, bbox, color, TINT_KEEP)?;

    let label = region.kind.label();
    let mut baseline = 0;
    let text = imgproc::get_text_size(
        label,
        imgproc::FONT_HERSHEY_SIMPLEX,
        LABEL_SCALE,
        LABEL_THICKNESS,
        &mut baseline,
    )?;
    let plate = Rect::new(bbox.x, bbox.y - text.height - 10, text.width + 4, text.height + 10);
    imgproc::rectangle(
        overlay,
        plate,
        raster::scalar(color),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        overlay,
        label,
        Point::new(bbox.x + 2, bbox.y - 6),
        imgproc::FONT_HERSHEY_SIMPLEX,
        LABEL_SCALE,
        Scalar::all(255.0),
        LABEL_THICKNESS,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}
