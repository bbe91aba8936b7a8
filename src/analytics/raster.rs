use opencv::core::{self, Mat, Point, Rect, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;

use super::error::{AnalyticsError, Shape};

pub type Bgr = [u8; 3];

pub const RED: Bgr = [0, 0, 255];
pub const GREEN: Bgr = [0, 255, 0];
pub const BLUE: Bgr = [255, 0, 0];

pub fn shape_of(image: &Mat) -> Shape {
    (image.rows(), image.cols(), image.channels())
}

pub fn ensure_same_shape(reference: &Mat, current: &Mat) -> Result<(), AnalyticsError> {
    let (a, b) = (shape_of(reference), shape_of(current));
    if a != b {
        return Err(AnalyticsError::DimensionMismatch {
            reference: a,
            current: b,
        });
    }
    if reference.empty() {
        return Err(AnalyticsError::NoFrame("empty image".into()));
    }
    Ok(())
}

pub fn ensure_odd(kernel: i32) -> i32 {
    if kernel % 2 == 1 {
        kernel
    } else {
        kernel + 1
    }
}

pub fn to_gray(image: &Mat) -> Result<Mat, AnalyticsError> {
    let code = match image.channels() {
        1 => return Ok(image.try_clone()?),
        3 => imgproc::COLOR_BGR2GRAY,
        4 => imgproc::COLOR_BGRA2GRAY,
        n => {
            return Err(AnalyticsError::InvalidParameter(format!(
                "unsupported channel count {n}"
            )))
        }
    };
    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, code)?;
    Ok(gray)
}

pub fn to_bgr(image: &Mat) -> Result<Mat, AnalyticsError> {
    let code = match image.channels() {
        3 => return Ok(image.try_clone()?),
        1 => imgproc::COLOR_GRAY2BGR,
        4 => imgproc::COLOR_BGRA2BGR,
        n => {
            return Err(AnalyticsError::InvalidParameter(format!(
                "unsupported channel count {n}"
            )))
        }
    };
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(image, &mut bgr, code)?;
    Ok(bgr)
}

/// Gaussian smoothing; a kernel of 0 or 1 leaves the image untouched.
pub fn smooth(gray: &Mat, kernel: i32) -> Result<Mat, AnalyticsError> {
    if kernel <= 1 {
        return Ok(gray.try_clone()?);
    }
    let k = ensure_odd(kernel);
    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(gray, &mut blurred, Size::new(k, k), 0.0)?;
    Ok(blurred)
}

pub fn gray_smoothed(image: &Mat, kernel: i32) -> Result<Mat, AnalyticsError> {
    smooth(&to_gray(image)?, kernel)
}

pub fn equalize(gray: &Mat, clip_limit: f64, tile_grid: i32) -> Result<Mat, AnalyticsError> {
    let mut clahe = imgproc::create_clahe(clip_limit, Size::new(tile_grid, tile_grid))?;
    let mut out = Mat::default();
    clahe.apply(gray, &mut out)?;
    Ok(out)
}

pub fn binarize(gray: &Mat, threshold: f64) -> Result<Mat, AnalyticsError> {
    let mut mask = Mat::default();
    imgproc::threshold(gray, &mut mask, threshold, 255.0, imgproc::THRESH_BINARY)?;
    Ok(mask)
}

fn morph(mask: &Mat, op: i32, element: &Mat) -> Result<Mat, AnalyticsError> {
    let mut out = Mat::default();
    imgproc::morphology_ex(
        mask,
        &mut out,
        op,
        element,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    Ok(out)
}

fn ellipse(kernel: i32) -> Result<Mat, AnalyticsError> {
    Ok(imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        Size::new(kernel, kernel),
        Point::new(-1, -1),
    )?)
}

/// Opening followed by closing. A kernel of 0 or 1 disables the cleanup.
pub fn open_close(mask: Mat, kernel: i32) -> Result<Mat, AnalyticsError> {
    if kernel <= 1 {
        return Ok(mask);
    }
    let element = ellipse(kernel)?;
    let opened = morph(&mask, imgproc::MORPH_OPEN, &element)?;
    morph(&opened, imgproc::MORPH_CLOSE, &element)
}

pub fn close(mask: Mat, kernel: i32) -> Result<Mat, AnalyticsError> {
    if kernel <= 1 {
        return Ok(mask);
    }
    morph(&mask, imgproc::MORPH_CLOSE, &ellipse(kernel)?)
}

/// Clears a `margin` wide frame around the mask.
pub fn zero_border(mask: &mut Mat, margin: i32) -> Result<(), AnalyticsError> {
    if margin <= 0 || mask.empty() {
        return Ok(());
    }
    let (rows, cols) = (mask.rows(), mask.cols());
    let (my, mx) = (margin.min(rows), margin.min(cols));
    let strips = [
        Rect::new(0, 0, cols, my),
        Rect::new(0, rows - my, cols, my),
        Rect::new(0, 0, mx, rows),
        Rect::new(cols - mx, 0, mx, rows),
    ];
    for strip in strips {
        Mat::roi_mut(mask, strip)?.set_to(&Scalar::all(0.0), &core::no_array())?;
    }
    Ok(())
}

pub fn changed_pixels(mask: &Mat) -> Result<i64, AnalyticsError> {
    Ok(core::count_non_zero(mask)? as i64)
}

pub fn percent_of(changed: i64, mask: &Mat) -> f64 {
    let total = (mask.rows() as f64 * mask.cols() as f64).max(1.0);
    changed as f64 * 100.0 / total
}

/// Replaces every pixel of `image` under a set mask pixel with `color`.
pub fn paint_where(image: &mut Mat, mask: &Mat, color: Bgr) -> Result<(), AnalyticsError> {
    image.set_to(&scalar(color), mask)?;
    Ok(())
}

/// `pixel = keep * pixel + (1 - keep) * color` under set mask pixels.
pub fn blend_where(image: &mut Mat, mask: &Mat, color: Bgr, keep: f64) -> Result<(), AnalyticsError> {
    let blended = mix(image, color, keep)?;
    blended.copy_to_masked(image, mask)?;
    Ok(())
}

/// Semi-transparent fill of `rect`, clipped to the image.
pub fn tint_rect(image: &mut Mat, rect: Rect, color: Bgr, keep: f64) -> Result<(), AnalyticsError> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width).min(image.cols());
    let y1 = (rect.y + rect.height).min(image.rows());
    if x1 <= x0 || y1 <= y0 {
        return Ok(());
    }
    let clipped = Rect::new(x0, y0, x1 - x0, y1 - y0);
    let patch = Mat::roi(image, clipped)?.try_clone()?;
    let tinted = mix(&patch, color, keep)?;
    tinted.copy_to(&mut Mat::roi_mut(image, clipped)?)?;
    Ok(())
}

fn mix(image: &Mat, color: Bgr, keep: f64) -> Result<Mat, AnalyticsError> {
    let solid = Mat::new_rows_cols_with_default(image.rows(), image.cols(), image.typ(), scalar(color))?;
    let mut out = Mat::default();
    core::add_weighted(image, keep, &solid, 1.0 - keep, 0.0, &mut out, -1)?;
    Ok(out)
}

pub fn scalar(color: Bgr) -> Scalar {
    Scalar::new(color[0] as f64, color[1] as f64, color[2] as f64, 0.0)
}
