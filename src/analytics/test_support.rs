use opencv::core::{self, Mat, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

pub fn blank(rows: i32, cols: i32, value: u8) -> opencv::Result<Mat> {
    Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC3, Scalar::all(value as f64))
}

pub fn gray_blank(rows: i32, cols: i32, value: u8) -> opencv::Result<Mat> {
    Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC1, Scalar::all(value as f64))
}

pub fn fill_rect(image: &mut Mat, rect: Rect, value: u8) -> opencv::Result<()> {
    imgproc::rectangle(
        image,
        rect,
        Scalar::all(value as f64),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )
}

/// Flat 128 grey with square tiles alternating `128 ± amplitude`.
pub fn checkerboard(rows: i32, cols: i32, tile: i32, amplitude: u8) -> opencv::Result<Mat> {
    let mut image = blank(rows, cols, 128)?;
    for row in 0..rows {
        for col in 0..cols {
            let bright = ((row / tile) + (col / tile)) % 2 == 0;
            let v = if bright {
                128u16.saturating_add(amplitude as u16).min(255) as u8
            } else {
                128u8.saturating_sub(amplitude)
            };
            let px = image.at_2d_mut::<core::Vec3b>(row, col)?;
            px[0] = v;
            px[1] = v;
            px[2] = v;
        }
    }
    Ok(image)
}

/// Tray-like scene: light background with dark, well separated blocks.
pub fn tray(rows: i32, cols: i32, blocks: &[Rect]) -> opencv::Result<Mat> {
    let mut image = blank(rows, cols, 220)?;
    for &rect in blocks {
        fill_rect(&mut image, rect, 30)?;
    }
    Ok(image)
}

/// Smooth gradient with a few discs, enough texture for ECC to lock on.
pub fn textured(rows: i32, cols: i32) -> opencv::Result<Mat> {
    let mut image = blank(rows, cols, 0)?;
    for row in 0..rows {
        for col in 0..cols {
            let v = ((row * 2 + col) % 256) as u8;
            let px = image.at_2d_mut::<core::Vec3b>(row, col)?;
            px[0] = v;
            px[1] = v / 2;
            px[2] = 255 - v;
        }
    }
    for (i, r) in [(0, 12), (1, 18), (2, 9)] {
        imgproc::circle(
            &mut image,
            core::Point::new(30 + i * 40, 40 + i * 25),
            r,
            Scalar::new(255.0, 255.0, 255.0, 0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
    }
    Ok(image)
}
