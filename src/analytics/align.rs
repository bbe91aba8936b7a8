use opencv::core::{self, Mat, Scalar, TermCriteria};
use opencv::imgproc;
use opencv::prelude::*;
use opencv::video;

use crate::config::AlignmentConfig;

use super::error::AnalyticsError;
use super::raster;

/// Below this grey-level standard deviation the scene has nothing to lock on to.
const MIN_TEXTURE_STDDEV: f64 = 1.0;
const ECC_GAUSS_FILTER: i32 = 5;

pub struct Alignment {
    pub image: Mat,
    pub converged: bool,
}

/// Rigid (rotation + translation) motion compensation using ECC maximisation.
pub struct FrameAligner {
    config: AlignmentConfig,
}

impl FrameAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    /// Warps `moving` into the frame of `reference`. Failure to converge is not
    /// an error: the original image comes back with `converged == false`.
    pub fn align(&self, reference: &Mat, moving: &Mat) -> Result<Alignment, AnalyticsError> {
        raster::ensure_same_shape(reference, moving)?;

        match self.estimate(reference, moving) {
            Ok(Some(warp)) => {
                let mut aligned = Mat::default();
                imgproc::warp_affine(
                    moving,
                    &mut aligned,
                    &warp,
                    moving.size()?,
                    imgproc::INTER_LINEAR | imgproc::WARP_INVERSE_MAP,
                    core::BORDER_REPLICATE,
                    Scalar::default(),
                )?;
                Ok(Alignment {
                    image: aligned,
                    converged: true,
                })
            }
            Ok(None) => {
                tracing::warn!("alignment skipped: textureless scene");
                self.unaligned(moving)
            }
            Err(e) => {
                tracing::warn!(error = %e, "alignment did not converge, comparing unaligned");
                self.unaligned(moving)
            }
        }
    }

    fn unaligned(&self, moving: &Mat) -> Result<Alignment, AnalyticsError> {
        Ok(Alignment {
            image: moving.try_clone()?,
            converged: false,
        })
    }

    fn estimate(&self, reference: &Mat, moving: &Mat) -> Result<Option<Mat>, AnalyticsError> {
        let template = raster::gray_smoothed(reference, self.config.blur_kernel)?;
        let input = raster::gray_smoothed(moving, self.config.blur_kernel)?;

        if stddev(&template)? < MIN_TEXTURE_STDDEV || stddev(&input)? < MIN_TEXTURE_STDDEV {
            return Ok(None);
        }

        let criteria = TermCriteria {
            typ: core::TermCriteria_COUNT + core::TermCriteria_EPS,
            max_count: self.config.max_iterations,
            epsilon: self.config.epsilon,
        };

        let mut warp = Mat::eye(2, 3, core::CV_32F)?.to_mat()?;
        let rho = video::find_transform_ecc(
            &template,
            &input,
            &mut warp,
            video::MOTION_EUCLIDEAN,
            criteria,
            &Mat::default(),
            ECC_GAUSS_FILTER,
        )?;

        if !rho.is_finite() {
            return Ok(None);
        }

        tracing::debug!(
            rho = format!("{:.4}", rho),
            dx = format!("{:.2}", *warp.at_2d::<f32>(0, 2)?),
            dy = format!("{:.2}", *warp.at_2d::<f32>(1, 2)?),
            "alignment converged"
        );
        Ok(Some(warp))
    }
}

fn stddev(gray: &Mat) -> Result<f64, AnalyticsError> {
    if gray.empty() {
        return Ok(0.0);
    }
    let mut mean = Mat::default();
    let mut sigma = Mat::default();
    core::mean_std_dev(gray, &mut mean, &mut sigma, &core::no_array())?;
    Ok(*sigma.at_2d::<f64>(0, 0)?)
}
