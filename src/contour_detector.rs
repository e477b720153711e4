// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Ellipse detection by binarization and contour fitting.
//!
//! Each image (normally one grid tile) is smoothed, binarized at the Otsu
//! level, and morphologically closed. Every external contour of the
//! resulting mask whose enclosed area is plausible for a target gets a
//! least-squares ellipse. Objects are assumed brighter than the background.

use std::time::Instant;

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, convex_hull};
use imageproc::morphology::{grayscale_close, Mask};
use imageproc::point::Point;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::dedup::{self, within_square, DedupPolicy};
use crate::detector::EllipseDetector;
use crate::ellipse::DetectedEllipse;
use crate::ellipse_fit::{fit_ellipse, MIN_FIT_POINTS};
use crate::error::{BenchError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourDetectorParams {
    /// Pre-binarization smoothing. 0 disables it.
    pub blur_sigma: f32,

    /// Radius of the disk used to close the binary mask. 0 disables it.
    pub close_radius: u8,

    /// Accepted range of contour-enclosed area, in px².
    pub min_area: f64,
    pub max_area: f64,

    /// Two detections are duplicates when their centers are closer than
    /// this on both axes.
    pub dedup_distance: f64,
    pub dedup_policy: DedupPolicy,

    /// Keep a simplified outline with each detection, for drawing.
    pub retain_boundary: bool,

    /// Polygon simplification tolerance as a fraction of the contour
    /// perimeter.
    pub simplify_fraction: f64,
}

impl Default for ContourDetectorParams {
    fn default() -> Self {
        ContourDetectorParams {
            blur_sigma: 1.5,
            close_radius: 2,
            min_area: 100.0,
            max_area: 20000.0,
            dedup_distance: 20.0,
            dedup_policy: DedupPolicy::FirstWins,
            retain_boundary: false,
            simplify_fraction: 0.01,
        }
    }
}

impl ContourDetectorParams {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(BenchError::InvalidParams(msg.to_string()));
        if !(self.blur_sigma >= 0.0) {
            return fail("blur_sigma must be non-negative");
        }
        if !(self.min_area >= 0.0) || !(self.min_area <= self.max_area) {
            return fail("min_area must be non-negative and at most max_area");
        }
        if !(self.dedup_distance >= 0.0) {
            return fail("dedup_distance must be non-negative");
        }
        if !(self.simplify_fraction >= 0.0) {
            return fail("simplify_fraction must be non-negative");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContourEllipseDetector {
    params: ContourDetectorParams,
}

impl ContourEllipseDetector {
    pub fn new(params: ContourDetectorParams) -> Result<Self> {
        params.validate()?;
        Ok(ContourEllipseDetector { params })
    }

    pub fn params(&self) -> &ContourDetectorParams {
        &self.params
    }
}

impl EllipseDetector for ContourEllipseDetector {
    fn detect(&self, image: &GrayImage) -> Vec<DetectedEllipse> {
        let start = Instant::now();
        let params = &self.params;
        let blurred = if params.blur_sigma > 0.0 {
            gaussian_blur_f32(image, params.blur_sigma)
        } else {
            image.clone()
        };

        // Otsu has nothing to separate in a flat image; any "object" it
        // produced would be the image frame itself.
        let first = blurred.as_raw().first().copied();
        if first.map_or(true, |v| blurred.as_raw().iter().all(|&p| p == v)) {
            trace!("Uniform image, no contours");
            return Vec::new();
        }

        // Pixels strictly brighter than the Otsu level are foreground.
        let level = otsu_level(&blurred);
        let binary = threshold(&blurred, level, ThresholdType::Binary);
        let mask = if params.close_radius > 0 {
            grayscale_close(&binary, &Mask::disk(params.close_radius))
        } else {
            binary
        };

        let mut candidates = Vec::new();
        for contour in find_contours::<i32>(&mask) {
            // External boundaries only.
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            if contour.points.len() < MIN_FIT_POINTS {
                trace!("Skipping contour with {} points", contour.points.len());
                continue;
            }
            let area = contour_area(&contour.points);
            if area < params.min_area || area > params.max_area {
                trace!("Skipping contour with area {}", area);
                continue;
            }
            let points: Vec<[f64; 2]> = contour.points.iter()
                .map(|p| [p.x as f64, p.y as f64])
                .collect();
            let Some(ellipse) = fit_ellipse(&points) else {
                trace!("Ellipse fit failed for contour with area {}", area);
                continue;
            };
            let mut detection = DetectedEllipse::new(ellipse, area);
            if params.retain_boundary {
                detection.boundary =
                    Some(simplify_boundary(&contour.points, params.simplify_fraction));
            }
            candidates.push(detection);
        }
        let candidate_count = candidates.len();
        let detections = self.suppress_duplicates(candidates);
        debug!("Otsu level {}: {} contour ellipses ({} duplicates) in {:?}",
               level, detections.len(), candidate_count - detections.len(),
               start.elapsed());
        detections
    }

    fn suppress_duplicates(&self, detections: Vec<DetectedEllipse>)
                           -> Vec<DetectedEllipse> {
        let distance = self.params.dedup_distance;
        dedup::suppress_duplicates(detections, self.params.dedup_policy, distance,
                                   |a, b| within_square(a, b, distance))
    }
}

// Douglas-Peucker with tolerance `fraction` of the perimeter, then the convex
// hull if more than four vertices remain.
fn simplify_boundary(points: &[Point<i32>], fraction: f64) -> Vec<[f64; 2]> {
    let epsilon = fraction * arc_length(points, /*closed=*/true);
    let simplified = approximate_polygon_dp(points, epsilon, /*closed=*/true);
    let outline: Vec<Point<i32>> = if simplified.len() > 4 {
        convex_hull(&simplified[..])
    } else {
        simplified
    };
    outline.iter().map(|p| [p.x as f64, p.y as f64]).collect()
}

#[cfg(test)]
mod tests {
    extern crate approx;
    use approx::assert_abs_diff_eq;
    use super::*;
    use crate::ellipse::Ellipse;
    use crate::scene::draw_filled_ellipse;

    fn image_with(ellipses: &[Ellipse], size: u32) -> GrayImage {
        let mut image = GrayImage::new(size, size);
        for e in ellipses {
            draw_filled_ellipse(&mut image, e, 255);
        }
        image
    }

    #[test]
    fn test_uniform_images_are_empty() {
        let detector = ContourEllipseDetector::default();
        assert!(detector.detect(&GrayImage::new(256, 256)).is_empty());
        let gray = GrayImage::from_pixel(120, 120, image::Luma([128]));
        assert!(detector.detect(&gray).is_empty());
    }

    #[test]
    fn test_single_rotated_ellipse() {
        let truth = Ellipse::new(128.0, 120.0, 80.0, 40.0, 30.0);
        let detections = ContourEllipseDetector::default()
            .detect(&image_with(&[truth], 256));
        assert_eq!(detections.len(), 1);
        let found = detections[0].ellipse;
        assert_abs_diff_eq!(found.center_x, 128.0, epsilon = 1.0);
        assert_abs_diff_eq!(found.center_y, 120.0, epsilon = 1.0);
        assert_abs_diff_eq!(found.width, 80.0, epsilon = 3.0);
        assert_abs_diff_eq!(found.height, 40.0, epsilon = 3.0);
        assert_abs_diff_eq!(found.angle, 30.0, epsilon = 3.0);
        assert!(detections[0].boundary.is_none());
        // Strength is the contour area, close to pi*40*20.
        assert!(detections[0].strength > 2000.0 && detections[0].strength < 2700.0);
    }

    #[test]
    fn test_area_limits() {
        let speck = Ellipse::circle(40.0, 40.0, 6.0);
        let huge = Ellipse::circle(300.0, 300.0, 200.0);
        let image = image_with(&[speck, huge], 512);
        assert!(ContourEllipseDetector::default().detect(&image).is_empty());

        let mut params = ContourDetectorParams::default();
        params.max_area = 40000.0;
        let detections = ContourEllipseDetector::new(params).unwrap().detect(&image);
        assert_eq!(detections.len(), 1);
        assert_abs_diff_eq!(detections[0].ellipse.center_x, 300.0, epsilon = 1.0);
    }

    #[test]
    fn test_nested_contours_ignored() {
        // A bright ring with a bright disk inside its hole.
        let mut image = image_with(&[Ellipse::circle(128.0, 128.0, 120.0)], 256);
        let hole = Ellipse::circle(128.0, 128.0, 90.0);
        draw_filled_ellipse(&mut image, &hole, 0);
        draw_filled_ellipse(&mut image, &Ellipse::circle(128.0, 128.0, 30.0), 255);
        let mut params = ContourDetectorParams::default();
        params.dedup_distance = 1.0;
        let detections = ContourEllipseDetector::new(params).unwrap().detect(&image);
        assert_eq!(detections.len(), 1);
        assert_abs_diff_eq!(detections[0].ellipse.width, 120.0, epsilon = 3.0);
    }

    #[test]
    fn test_square_dedup_first_wins() {
        let a = Ellipse::circle(100.0, 100.0, 16.0);
        let b = Ellipse::circle(115.0, 115.0, 16.0);
        let image = image_with(&[a, b], 256);

        let detections = ContourEllipseDetector::default().detect(&image);
        assert_eq!(detections.len(), 1);
        // Contours are traced in raster order; the upper blob comes first.
        assert_abs_diff_eq!(detections[0].ellipse.center_y, 100.0, epsilon = 1.0);

        let mut params = ContourDetectorParams::default();
        params.dedup_distance = 10.0;
        assert_eq!(ContourEllipseDetector::new(params).unwrap().detect(&image).len(), 2);
    }

    #[test]
    fn test_retain_boundary() {
        let truth = Ellipse::new(128.0, 128.0, 90.0, 50.0, 0.0);
        let mut params = ContourDetectorParams::default();
        params.retain_boundary = true;
        let detections = ContourEllipseDetector::new(params).unwrap()
            .detect(&image_with(&[truth], 256));
        assert_eq!(detections.len(), 1);
        let boundary = detections[0].boundary.as_ref().unwrap();
        assert!(boundary.len() >= 3);
        for &[x, y] in boundary {
            // Outline vertices lie on (or just inside) the true ellipse.
            let r = ((x - 128.0) / 45.0).powi(2) + ((y - 128.0) / 25.0).powi(2);
            assert!(r > 0.75 && r < 1.15, "vertex ({}, {}) off outline: {}", x, y, r);
        }
    }

    #[test]
    fn test_validate() {
        assert!(ContourDetectorParams::default().validate().is_ok());
        let bad: ContourDetectorParams =
            serde_json::from_str(r#"{"blur_sigma": -1.0}"#).unwrap();
        assert!(matches!(ContourEllipseDetector::new(bad),
                         Err(BenchError::InvalidParams(_))));
        let bad = ContourDetectorParams { min_area: 500.0, max_area: 400.0,
                                          ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = ContourDetectorParams { simplify_fraction: -0.1, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_zero_blur_and_close_are_skipped() {
        let params: ContourDetectorParams =
            serde_json::from_str(r#"{"blur_sigma": 0, "close_radius": 0}"#).unwrap();
        let truth = Ellipse::new(128.0, 128.0, 70.0, 40.0, 0.0);
        let detections = ContourEllipseDetector::new(params).unwrap()
            .detect(&image_with(&[truth], 256));
        assert_eq!(detections.len(), 1);
        assert_abs_diff_eq!(detections[0].ellipse.center_x, 128.0, epsilon = 1.0);
    }

    #[test]
    fn test_closing_bridges_thin_cut() {
        // An ellipse cut in half by a one pixel dark line.
        let mut image = image_with(&[Ellipse::new(128.0, 128.0, 100.0, 60.0, 0.0)], 256);
        for y in 0..256 {
            image.put_pixel(128, y, image::Luma([0]));
        }
        let params = ContourDetectorParams { blur_sigma: 0.0, dedup_distance: 1.0,
                                             ..Default::default() };
        let detections = ContourEllipseDetector::new(params.clone()).unwrap()
            .detect(&image);
        assert_eq!(detections.len(), 1);
        assert_abs_diff_eq!(detections[0].ellipse.width, 100.0, epsilon = 3.0);

        // Without closing each half is traced on its own, and no fit sits
        // on the cut.
        let unclosed = ContourDetectorParams { close_radius: 0, ..params };
        let halves = ContourEllipseDetector::new(unclosed).unwrap().detect(&image);
        assert!(halves.iter().all(|d| (d.ellipse.center_x - 128.0).abs() > 5.0));
    }
}  // mod tests.
