use opencv::core::{self, Mat, Scalar};
use opencv::imgproc;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::CompareParams;

use super::error::AnalyticsError;
use super::raster;

const SSIM_WINDOW: i32 = 11;
const SSIM_SIGMA: f64 = 1.5;
const SSIM_DYNAMIC_RANGE: f64 = 255.0;
const SSIM_HEAT_KEEP: f64 = 0.6;

const CANNY_LOW: f64 = 50.0;
const CANNY_HIGH: f64 = 150.0;

/// Output of one differencing pass.
pub struct Difference {
    /// `CV_8UC1`, 0 = unchanged, 255 = changed.
    pub mask: Mat,
    /// `CV_8UC3` rendering of the change.
    pub visualization: Mat,
    /// Per-pixel dissimilarity in [0, 1]; only the SSIM strategy produces one.
    pub severity_map: Option<Mat>,
    pub changed_pixels: i64,
    pub percent_changed: f64,
}

pub trait DifferenceStrategy {
    fn name(&self) -> &'static str;

    fn compute(
        &self,
        reference: &Mat,
        current: &Mat,
        params: &CompareParams,
    ) -> Result<Difference, AnalyticsError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    AbsDiff,
    #[default]
    Ssim,
    Edges,
}

impl Strategy {
    pub fn engine(self) -> &'static dyn DifferenceStrategy {
        match self {
            Strategy::AbsDiff => &AbsDiffStrategy,
            Strategy::Ssim => &SsimStrategy,
            Strategy::Edges => &EdgeStrategy,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.engine().name())
    }
}

impl std::str::FromStr for Strategy {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "absdiff" => Ok(Strategy::AbsDiff),
            "ssim" => Ok(Strategy::Ssim),
            "edges" | "canny" => Ok(Strategy::Edges),
            other => Err(AnalyticsError::InvalidParameter(format!(
                "unknown strategy {other:?}"
            ))),
        }
    }
}

/// Thresholded absolute grey-level difference.
pub struct AbsDiffStrategy;

impl DifferenceStrategy for AbsDiffStrategy {
    fn name(&self) -> &'static str {
        "absdiff"
    }

    fn compute(
        &self,
        reference: &Mat,
        current: &Mat,
        params: &CompareParams,
    ) -> Result<Difference, AnalyticsError> {
        raster::ensure_same_shape(reference, current)?;
        let g1 = raster::gray_smoothed(reference, params.blur_kernel)?;
        let g2 = raster::gray_smoothed(current, params.blur_kernel)?;

        let mut diff = Mat::default();
        core::absdiff(&g1, &g2, &mut diff)?;

        let mask = raster::binarize(&diff, params.threshold as f64)?;
        let mask = raster::open_close(mask, params.morph_kernel)?;

        let mut visualization = raster::to_bgr(&diff)?;
        raster::paint_where(&mut visualization, &mask, raster::RED)?;

        let changed_pixels = raster::changed_pixels(&mask)?;
        Ok(Difference {
            percent_changed: raster::percent_of(changed_pixels, &mask),
            mask,
            visualization,
            severity_map: None,
            changed_pixels,
        })
    }
}

/// Local structural dissimilarity, `1 - SSIM`, over a Gaussian window.
pub struct SsimStrategy;

impl DifferenceStrategy for SsimStrategy {
    fn name(&self) -> &'static str {
        "ssim"
    }

    fn compute(
        &self,
        reference: &Mat,
        current: &Mat,
        params: &CompareParams,
    ) -> Result<Difference, AnalyticsError> {
        raster::ensure_same_shape(reference, current)?;
        let g1 = raster::gray_smoothed(reference, params.blur_kernel)?;
        let g2 = raster::gray_smoothed(current, params.blur_kernel)?;

        let change = change_map(&g1, &g2, SSIM_WINDOW, SSIM_SIGMA)?;
        let cut = (params.threshold as f64 / 255.0).clamp(0.0, 1.0);
        let mut flagged = Mat::default();
        imgproc::threshold(&change, &mut flagged, cut, 255.0, imgproc::THRESH_BINARY)?;
        let mut mask = Mat::default();
        flagged.convert_to(&mut mask, core::CV_8U, 1.0, 0.0)?;

        let mut heat = Mat::default();
        change.convert_to(&mut heat, core::CV_8U, 255.0, 0.0)?;
        let mean_change = core::mean(&change, &core::no_array())?[0];

        let mask = raster::open_close(mask, params.morph_kernel)?;

        let mut visualization = Mat::default();
        imgproc::apply_color_map(&heat, &mut visualization, imgproc::COLORMAP_JET)?;
        raster::blend_where(&mut visualization, &mask, raster::RED, SSIM_HEAT_KEEP)?;

        let changed_pixels = raster::changed_pixels(&mask)?;
        Ok(Difference {
            mask,
            visualization,
            severity_map: Some(change),
            changed_pixels,
            percent_changed: mean_change * 100.0,
        })
    }
}

/// Per-pixel `clip(1 - SSIM, 0, 1)` as `CV_32FC1`.
pub fn change_map(gray1: &Mat, gray2: &Mat, window: i32, sigma: f64) -> Result<Mat, AnalyticsError> {
    let c1 = (0.01 * SSIM_DYNAMIC_RANGE).powi(2);
    let c2 = (0.03 * SSIM_DYNAMIC_RANGE).powi(2);

    let mut x = Mat::default();
    let mut y = Mat::default();
    gray1.convert_to(&mut x, core::CV_32F, 1.0, 0.0)?;
    gray2.convert_to(&mut y, core::CV_32F, 1.0, 0.0)?;

    let kernel = imgproc::get_gaussian_kernel(window, sigma, core::CV_32F)?;
    let local_mean = |src: &Mat| -> Result<Mat, AnalyticsError> {
        let mut dst = Mat::default();
        imgproc::sep_filter_2d_def(src, &mut dst, core::CV_32F, &kernel, &kernel)?;
        Ok(dst)
    };
    let product = |a: &Mat, b: &Mat| -> Result<Mat, AnalyticsError> {
        let mut dst = Mat::default();
        core::multiply_def(a, b, &mut dst)?;
        Ok(dst)
    };

    let mu1 = local_mean(&x)?;
    let mu2 = local_mean(&y)?;
    let xx = local_mean(&product(&x, &x)?)?;
    let yy = local_mean(&product(&y, &y)?)?;
    let xy = local_mean(&product(&x, &y)?)?;

    let (mu1, mu2) = (mu1.data_typed::<f32>()?, mu2.data_typed::<f32>()?);
    let (xx, yy, xy) = (
        xx.data_typed::<f32>()?,
        yy.data_typed::<f32>()?,
        xy.data_typed::<f32>()?,
    );

    let mut change =
        Mat::new_rows_cols_with_default(gray1.rows(), gray1.cols(), core::CV_32F, Scalar::all(0.0))?;
    let out = change.data_typed_mut::<f32>()?;
    for i in 0..out.len() {
        let (m1, m2) = (mu1[i] as f64, mu2[i] as f64);
        let var1 = xx[i] as f64 - m1 * m1;
        let var2 = yy[i] as f64 - m2 * m2;
        let cov = xy[i] as f64 - m1 * m2;
        let num = (2.0 * m1 * m2 + c1) * (2.0 * cov + c2);
        // the constants keep `den` strictly positive; identical inputs give exactly 1
        let den = (m1 * m1 + m2 * m2 + c1) * (var1 + var2 + c2);
        let ssim = (num / den).clamp(0.0, 1.0);
        out[i] = (1.0 - ssim).clamp(0.0, 1.0) as f32;
    }
    Ok(change)
}

/// Symmetric difference of the two Canny edge maps.
pub struct EdgeStrategy;

impl DifferenceStrategy for EdgeStrategy {
    fn name(&self) -> &'static str {
        "edges"
    }

    fn compute(
        &self,
        reference: &Mat,
        current: &Mat,
        params: &CompareParams,
    ) -> Result<Difference, AnalyticsError> {
        raster::ensure_same_shape(reference, current)?;
        let g1 = raster::gray_smoothed(reference, params.blur_kernel)?;
        let g2 = raster::gray_smoothed(current, params.blur_kernel)?;

        let mut e1 = Mat::default();
        let mut e2 = Mat::default();
        imgproc::canny_def(&g1, &mut e1, CANNY_LOW, CANNY_HIGH)?;
        imgproc::canny_def(&g2, &mut e2, CANNY_LOW, CANNY_HIGH)?;

        let mut edges = Mat::default();
        core::bitwise_xor_def(&e1, &e2, &mut edges)?;
        let edges = raster::close(edges, params.morph_kernel)?;
        let mask = raster::binarize(&edges, 0.0)?;

        let mut visualization = raster::to_bgr(&g2)?;
        raster::paint_where(&mut visualization, &mask, raster::RED)?;

        let changed_pixels = raster::changed_pixels(&mask)?;
        Ok(Difference {
            percent_changed: raster::percent_of(changed_pixels, &mask),
            mask,
            visualization,
            severity_map: None,
            changed_pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{blank, checkerboard, fill_rect, textured};
    use opencv::core::Rect;

    const ALL: [Strategy; 3] = [Strategy::AbsDiff, Strategy::Ssim, Strategy::Edges];

    fn params(strategy: Strategy) -> CompareParams {
        CompareParams {
            strategy,
            ..CompareParams::default()
        }
    }

    #[test]
    fn identical_images_have_no_change() {
        let image = textured(100, 120).unwrap();
        for strategy in ALL {
            let diff = strategy
                .engine()
                .compute(&image, &image, &params(strategy))
                .unwrap();
            assert_eq!(diff.changed_pixels, 0, "{strategy}");
            assert_eq!(diff.percent_changed, 0.0, "{strategy}");
        }
    }

    #[test]
    fn mismatched_shapes_fail_for_every_strategy() {
        let a = blank(100, 100, 0).unwrap();
        let b = blank(100, 90, 0).unwrap();
        for strategy in ALL {
            let result = strategy.engine().compute(&a, &b, &params(strategy));
            assert!(
                matches!(result, Err(AnalyticsError::DimensionMismatch { .. })),
                "{strategy}"
            );
        }
    }

    #[test]
    fn absdiff_counts_inserted_square_exactly() {
        let reference = blank(100, 100, 0).unwrap();
        let mut current = blank(100, 100, 0).unwrap();
        fill_rect(&mut current, Rect::new(40, 40, 20, 20), 255).unwrap();

        let p = CompareParams {
            strategy: Strategy::AbsDiff,
            blur_kernel: 0,
            threshold: 25,
            morph_kernel: 0,
            min_region_area: 150,
            ..CompareParams::default()
        };
        let diff = AbsDiffStrategy.compute(&reference, &current, &p).unwrap();
        assert_eq!(diff.changed_pixels, 400);
        assert_eq!(diff.percent_changed, 4.0);

        let px = diff.visualization.at_2d::<core::Vec3b>(50, 50).unwrap();
        assert_eq!((px[0], px[1], px[2]), (0, 0, 255));
    }

    fn square_with_speck() -> (Mat, Mat) {
        let reference = blank(100, 100, 0).unwrap();
        let mut current = blank(100, 100, 0).unwrap();
        fill_rect(&mut current, Rect::new(40, 40, 20, 20), 255).unwrap();
        fill_rect(&mut current, Rect::new(10, 80, 2, 2), 255).unwrap();
        (reference, current)
    }

    fn same_mask(a: &Mat, b: &Mat) -> bool {
        let mut diff = Mat::default();
        core::absdiff(a, b, &mut diff).unwrap();
        core::count_non_zero(&diff).unwrap() == 0
    }

    #[test]
    fn kernel_of_one_behaves_like_zero() {
        let (reference, current) = square_with_speck();
        let exact = CompareParams {
            blur_kernel: 0,
            threshold: 25,
            morph_kernel: 0,
            ..CompareParams::default()
        };
        let ones = CompareParams {
            blur_kernel: 1,
            morph_kernel: 1,
            ..exact
        };
        for strategy in ALL {
            let engine = strategy.engine();
            let a = engine
                .compute(&reference, &current, &CompareParams { strategy, ..exact })
                .unwrap();
            let b = engine
                .compute(&reference, &current, &CompareParams { strategy, ..ones })
                .unwrap();
            assert_eq!(a.changed_pixels, b.changed_pixels, "{strategy}");
            assert!(same_mask(&a.mask, &b.mask), "{strategy}");
        }
    }

    #[test]
    fn opening_drops_specks_smaller_than_the_kernel() {
        let (reference, current) = square_with_speck();
        let raw = CompareParams {
            strategy: Strategy::AbsDiff,
            blur_kernel: 0,
            threshold: 25,
            morph_kernel: 0,
            ..CompareParams::default()
        };
        let cleaned = CompareParams {
            morph_kernel: 5,
            ..raw
        };

        let before = AbsDiffStrategy.compute(&reference, &current, &raw).unwrap();
        assert_eq!(before.changed_pixels, 404);
        assert_eq!(*before.mask.at_2d::<u8>(80, 10).unwrap(), 255);

        let after = AbsDiffStrategy.compute(&reference, &current, &cleaned).unwrap();
        assert_eq!(*after.mask.at_2d::<u8>(80, 10).unwrap(), 0);
        assert_eq!(*after.mask.at_2d::<u8>(50, 50).unwrap(), 255);
        assert!(after.changed_pixels > 350 && after.changed_pixels <= 400);
    }

    #[test]
    fn ssim_severity_grows_with_contrast() {
        let reference = blank(64, 64, 128).unwrap();
        let p = CompareParams {
            strategy: Strategy::Ssim,
            blur_kernel: 0,
            morph_kernel: 0,
            ..CompareParams::default()
        };
        let mut previous = -1.0;
        for amplitude in [0u8, 5, 10, 20, 40, 80, 120] {
            let current = checkerboard(64, 64, 4, amplitude).unwrap();
            let diff = SsimStrategy.compute(&reference, &current, &p).unwrap();
            assert!(
                diff.percent_changed >= previous,
                "amplitude {amplitude}: {} < {previous}",
                diff.percent_changed
            );
            previous = diff.percent_changed;
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn ssim_exposes_severity_map_in_unit_range() {
        let reference = blank(48, 48, 128).unwrap();
        let current = checkerboard(48, 48, 3, 60).unwrap();
        let diff = SsimStrategy
            .compute(&reference, &current, &params(Strategy::Ssim))
            .unwrap();
        let map = diff.severity_map.expect("ssim produces a severity map");
        assert_eq!(map.typ(), core::CV_32F);
        assert!(map
            .data_typed::<f32>()
            .unwrap()
            .iter()
            .all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(diff.visualization.channels(), 3);
    }

    #[test]
    fn edges_flag_a_new_outline() {
        let reference = blank(80, 80, 20).unwrap();
        let mut current = blank(80, 80, 20).unwrap();
        fill_rect(&mut current, Rect::new(25, 25, 30, 30), 230).unwrap();
        let diff = EdgeStrategy
            .compute(&reference, &current, &params(Strategy::Edges))
            .unwrap();
        assert!(diff.changed_pixels > 0);
        assert!(diff.severity_map.is_none());
    }

    #[test]
    fn strategy_names_parse_back() {
        for strategy in ALL {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("sobel".parse::<Strategy>().is_err());
    }
}
