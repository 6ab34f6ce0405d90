// src/classifier.rs
//
// Per-frame foreground extraction: crop, grey, blur, diff against the
// background model, then pull out the contours big enough to be a cat
// rather than sensor noise or a moth.

use crate::types::CaptureConfig;
use anyhow::Result;
use opencv::{
    core::{self, Mat, Point, Rect, Size, Vector},
    imgproc,
    prelude::*,
};
use tracing::debug;

/// Gaussian kernel applied before any comparison, to suppress sensor noise.
const BLUR_KERNEL: i32 = 21;
/// Intensity cutoff (out of 255) for the binary foreground mask.
const DIFF_THRESHOLD: f64 = 20.0;
/// Dilation passes that merge nearby blobs and close small gaps.
const DILATE_ITERATIONS: i32 = 10;

#[derive(Debug)]
pub struct Classification {
    /// Contours whose area met the minimum, in detection order.
    pub contours: Vector<Vector<Point>>,
    /// Centroid x-coordinate of each qualifying contour, parallel to `contours`.
    pub centroids: Vec<f64>,
}

pub struct FrameClassifier {
    crop: Rect,
    min_area: f64,
}

impl FrameClassifier {
    /// Crop bounds are derived once from the configured capture resolution;
    /// the fractions are always relative to the full original frame.
    pub fn new(capture: &CaptureConfig, min_area: f64) -> Self {
        let top = (capture.height as f64 * capture.crop_top) as i32;
        let bottom = (capture.height as f64 * (1.0 - capture.crop_bottom)) as i32;
        let left = (capture.width as f64 * capture.crop_left) as i32;
        let right = (capture.width as f64 * (1.0 - capture.crop_right)) as i32;
        Self {
            crop: Rect::new(left, top, right - left, bottom - top),
            min_area,
        }
    }

    /// Crop the raw frame to the region of interest, convert to grey and
    /// blur. The result is what both the background model and the diff see.
    pub fn prepare(&self, frame: &Mat) -> Result<Mat> {
        let roi = Mat::roi(frame, self.crop)?.try_clone()?;
        let mut grey = Mat::default();
        imgproc::cvt_color(&roi, &mut grey, imgproc::COLOR_BGR2GRAY, 0)?;
        let mut blurred = Mat::default();
        imgproc::gaussian_blur(
            &grey,
            &mut blurred,
            Size::new(BLUR_KERNEL, BLUR_KERNEL),
            0.0,
            0.0,
            core::BORDER_DEFAULT,
        )?;
        Ok(blurred)
    }

    /// Diff a prepared frame against the rendered background and return the
    /// qualifying contours with their centroid x-values.
    pub fn classify(&self, prepared: &Mat, background: &Mat) -> Result<Classification> {
        let mut delta = Mat::default();
        core::absdiff(prepared, background, &mut delta)?;

        let mut mask = Mat::default();
        imgproc::threshold(&delta, &mut mask, DIFF_THRESHOLD, 255.0, imgproc::THRESH_BINARY)?;

        let mut dilated = Mat::default();
        imgproc::dilate(
            &mask,
            &mut dilated,
            &Mat::default(),
            Point::new(-1, -1),
            DILATE_ITERATIONS,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;

        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours(
            &dilated,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut qualifying: Vector<Vector<Point>> = Vector::new();
        let mut centroids = Vec::new();
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area < self.min_area {
                continue;
            }
            let moments = imgproc::moments(&contour, false)?;
            if moments.m00 == 0.0 {
                // degenerate contour, no mass to take a centroid from
                debug!("skipping zero-mass contour");
                continue;
            }
            centroids.push(moments.m10 / moments.m00);
            qualifying.push(contour);
        }

        Ok(Classification {
            contours: qualifying,
            centroids,
        })
    }
}
