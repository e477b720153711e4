// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Multi-scale blob detection with an explicit Difference-of-Gaussians scale
//! space.
//!
//! The image is smoothed, stretched to the full 0..255 range and opened to
//! remove specks. It is then examined at `num_levels` pyramid levels. At each
//! level it is blurred at `num_scales` increasing widths
//! sigma_i = sigma0 * k^i, and |blur(sigma_i) - blur(sigma_(i-1))| is scanned
//! for 3x3 local maxima. A maximum at scale i on level L is a blob with
//! diameter sigma_i * scale_factor^L * sqrt(2), centered at the maximum's
//! position scaled back to full resolution.
//!
//! Overlapping candidates from different scales and levels are reduced to
//! one, and only clearly strong responses are kept. Blobs are assumed
//! circular: emitted ellipses have equal axes and zero angle.

use std::time::Instant;

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::dedup::{self, DedupPolicy, Spot};
use crate::detector::EllipseDetector;
use crate::ellipse::{DetectedEllipse, Ellipse};
use crate::error::{BenchError, Result};
use crate::image_funcs::{abs_difference, downsample, gaussian_blur_replicate,
                         local_maxima_3x3, normalize_to_full_range, open,
                         to_float_image, FloatImage, StructuringElement};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobDetectorParams {
    /// Smoothing applied before normalization.
    pub preprocess_sigma: f32,

    /// Radius of the elliptical element for the speck-removing opening. 0
    /// skips the opening.
    pub open_radius: u32,

    /// Pyramid levels; level 0 is full resolution.
    pub num_levels: u32,

    /// Downsampling factor between successive pyramid levels.
    pub scale_factor: f32,

    /// Blur widths per level. The first only serves as the base of the
    /// first difference.
    pub num_scales: u32,
    pub sigma0: f32,
    pub k: f32,

    /// DoG local maxima must exceed this. Survivors of duplicate
    /// suppression must exceed twice this.
    pub min_response: f32,

    /// Full-resolution blob diameter below which maxima are ignored.
    pub min_diameter: f32,

    /// Two candidates are duplicates when their centers are closer than
    /// this fraction of the smaller diameter.
    pub overlap_threshold: f32,
    pub dedup_policy: DedupPolicy,

    /// Emitted ellipse axis length as a multiple of the blob diameter.
    pub diameter_scale: f64,

    /// Accepted range of emitted ellipse area (pi*w*h/4), in px².
    pub min_area: f64,
    pub max_area: f64,
}

impl Default for BlobDetectorParams {
    fn default() -> Self {
        BlobDetectorParams {
            preprocess_sigma: 1.7,
            open_radius: 2,
            num_levels: 3,
            scale_factor: 2.0,
            num_scales: 3,
            sigma0: 5.0,
            k: 1.414,
            min_response: 0.04 * 255.0,
            min_diameter: 50.0,
            overlap_threshold: 0.7,
            dedup_policy: DedupPolicy::StrongestWins,
            diameter_scale: 2.0,
            min_area: 500.0,
            max_area: 100000.0,
        }
    }
}

impl BlobDetectorParams {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(BenchError::InvalidParams(msg.to_string()));
        if self.num_levels < 1 {
            return fail("num_levels must be at least 1");
        }
        if self.num_scales < 2 {
            return fail("num_scales must be at least 2");
        }
        if !(self.sigma0 > 0.0) {
            return fail("sigma0 must be positive");
        }
        if !(self.k > 1.0) {
            return fail("k must exceed 1");
        }
        if !(self.scale_factor > 1.0) {
            return fail("scale_factor must exceed 1");
        }
        if !(self.preprocess_sigma >= 0.0) {
            return fail("preprocess_sigma must be non-negative");
        }
        if !(self.overlap_threshold >= 0.0) {
            return fail("overlap_threshold must be non-negative");
        }
        if !(self.diameter_scale > 0.0) {
            return fail("diameter_scale must be positive");
        }
        Ok(())
    }
}

/// A DoG local maximum, in full-resolution coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlobCandidate {
    pub x: f32,
    pub y: f32,
    pub diameter: f32,
    pub response: f32,
}

impl Spot for BlobCandidate {
    fn position(&self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }
    fn strength(&self) -> f64 {
        self.response as f64
    }
}

#[derive(Clone, Debug)]
pub struct BlobEllipseDetector {
    params: BlobDetectorParams,
}

impl Default for BlobEllipseDetector {
    fn default() -> Self {
        BlobEllipseDetector { params: BlobDetectorParams::default() }
    }
}

impl BlobEllipseDetector {
    pub fn new(params: BlobDetectorParams) -> Result<Self> {
        params.validate()?;
        Ok(BlobEllipseDetector { params })
    }

    pub fn params(&self) -> &BlobDetectorParams {
        &self.params
    }

    /// Runs the scale-space search on `image` and returns the candidates
    /// that survive duplicate suppression and the final response filter, in
    /// the order they were found: level 0 first, then increasing scale
    /// within each level, raster order within each scale.
    pub fn find_candidates(&self, image: &GrayImage) -> Vec<BlobCandidate> {
        let params = &self.params;
        let start = Instant::now();
        let mut level_image = self.preprocess(image);

        let mut candidates = Vec::new();
        let mut level_scale = 1.0f32;
        for level in 0..params.num_levels {
            if level > 0 {
                level_image = downsample(&level_image, params.scale_factor);
                level_scale *= params.scale_factor;
            }
            if level_image.width() < 3 || level_image.height() < 3 {
                trace!("Pyramid level {} too small, stopping", level);
                break;
            }
            let level_start = Instant::now();
            let before = candidates.len();
            self.scan_level(&level_image, level_scale, &mut candidates);
            debug!("Pyramid level {} ({}x{}): {} DoG maxima in {:?}",
                   level, level_image.width(), level_image.height(),
                   candidates.len() - before, level_start.elapsed());
        }

        let found = candidates.len();
        let candidates = suppress_overlapping(candidates, params.dedup_policy,
                                              params.overlap_threshold);
        let deduped = candidates.len();
        let strong: Vec<BlobCandidate> = candidates.into_iter()
            .filter(|c| c.response > 2.0 * params.min_response)
            .collect();
        debug!("{} blob candidates, {} after overlap suppression, {} strong, in {:?}",
               found, deduped, strong.len(), start.elapsed());
        strong
    }

    /// The ellipse emitted for `candidate`, or None if its area is out of
    /// range.
    pub fn candidate_to_detection(&self, candidate: &BlobCandidate)
                                  -> Option<DetectedEllipse> {
        let axis = self.params.diameter_scale * candidate.diameter as f64;
        let ellipse = Ellipse::circle(candidate.x as f64, candidate.y as f64, axis);
        let area = ellipse.area();
        if area < self.params.min_area || area > self.params.max_area {
            trace!("Dropping blob at ({}, {}) with area {}",
                   candidate.x, candidate.y, area);
            return None;
        }
        Some(DetectedEllipse::new(ellipse, candidate.response as f64))
    }

    // Smooth, stretch to 0..255, and open.
    fn preprocess(&self, image: &GrayImage) -> FloatImage {
        let params = &self.params;
        let smoothed = if params.preprocess_sigma > 0.0 {
            gaussian_blur_f32(image, params.preprocess_sigma)
        } else {
            image.clone()
        };
        let normalized = normalize_to_full_range(&to_float_image(&smoothed));
        if params.open_radius == 0 {
            return normalized;
        }
        open(&normalized, &StructuringElement::ellipse(params.open_radius))
    }

    // Appends the qualifying DoG maxima of one pyramid level.
    fn scan_level(&self, level_image: &FloatImage, level_scale: f32,
                  candidates: &mut Vec<BlobCandidate>) {
        let params = &self.params;
        let mut sigma = params.sigma0;
        let mut previous = gaussian_blur_replicate(level_image, sigma);
        for scale in 1..params.num_scales {
            sigma *= params.k;
            let blurred = gaussian_blur_replicate(level_image, sigma);
            let dog = abs_difference(&blurred, &previous);
            let diameter = sigma * level_scale * std::f32::consts::SQRT_2;
            if diameter < params.min_diameter {
                trace!("Scale {} diameter {} below minimum", scale, diameter);
            } else {
                for (x, y, response) in local_maxima_3x3(&dog, params.min_response) {
                    candidates.push(BlobCandidate {
                        x: x as f32 * level_scale,
                        y: y as f32 * level_scale,
                        diameter,
                        response,
                    });
                }
            }
            previous = blurred;
        }
    }
}

/// Drops candidates whose center is closer than `overlap` times the smaller
/// diameter to an already accepted candidate.
pub fn suppress_overlapping(candidates: Vec<BlobCandidate>, policy: DedupPolicy,
                            overlap: f32) -> Vec<BlobCandidate> {
    let max_diameter = candidates.iter().map(|c| c.diameter).fold(0.0f32, f32::max);
    let reach = (overlap * max_diameter) as f64;
    dedup::suppress_duplicates(candidates, policy, reach, |a, b| {
        let distance = (a.x - b.x).hypot(a.y - b.y);
        distance < overlap * a.diameter.min(b.diameter)
    })
}

impl EllipseDetector for BlobEllipseDetector {
    fn detect(&self, image: &GrayImage) -> Vec<DetectedEllipse> {
        self.find_candidates(image).iter()
            .filter_map(|c| self.candidate_to_detection(c))
            .collect()
    }

    // Applies the candidate overlap rule to emitted ellipses, recovering
    // each blob's diameter from the ellipse width.
    fn suppress_duplicates(&self, detections: Vec<DetectedEllipse>)
                           -> Vec<DetectedEllipse> {
        let overlap = self.params.overlap_threshold as f64;
        let scale = self.params.diameter_scale;
        let max_width = detections.iter().map(|d| d.ellipse.width).fold(0.0, f64::max);
        dedup::suppress_duplicates(detections, self.params.dedup_policy,
                                   overlap * max_width / scale, |a, b| {
            let diameter = a.ellipse.width.min(b.ellipse.width) / scale;
            a.ellipse.center_distance(&b.ellipse) < overlap * diameter
        })
    }
}

#[cfg(test)]
mod tests {
    extern crate approx;
    use approx::assert_abs_diff_eq;
    use super::*;
    use crate::scene::draw_filled_ellipse;

    // Single-level configuration with a fine scale step. sigma_i runs
    // 16.69, 18.37, 20.22, ... so the DoG of a disk of radius r peaks at
    // the pair straddling r / sqrt(2).
    fn fine_params() -> BlobDetectorParams {
        BlobDetectorParams {
            num_levels: 1,
            num_scales: 10,
            sigma0: 16.69,
            k: 1.1006,
            min_response: 5.0,
            min_diameter: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate() {
        assert!(BlobDetectorParams::default().validate().is_ok());
        for params in [
            BlobDetectorParams { num_levels: 0, ..Default::default() },
            BlobDetectorParams { num_scales: 1, ..Default::default() },
            BlobDetectorParams { sigma0: 0.0, ..Default::default() },
            BlobDetectorParams { k: 1.0, ..Default::default() },
            BlobDetectorParams { scale_factor: 0.5, ..Default::default() },
        ] {
            assert!(matches!(BlobEllipseDetector::new(params),
                             Err(BenchError::InvalidParams(_))));
        }
    }

    #[test]
    fn test_uniform_images_are_empty() {
        let detector = BlobEllipseDetector::default();
        assert!(detector.detect(&GrayImage::new(128, 128)).is_empty());
        let gray = GrayImage::from_pixel(100, 60, image::Luma([77]));
        assert!(detector.detect(&gray).is_empty());
        let fine = BlobEllipseDetector::new(fine_params()).unwrap();
        assert!(fine.find_candidates(&gray).is_empty());
    }

    #[test]
    fn test_single_disk() {
        let mut image = GrayImage::new(200, 200);
        draw_filled_ellipse(&mut image, &Ellipse::circle(100.0, 100.0, 60.0), 255);
        let detector = BlobEllipseDetector::new(fine_params()).unwrap();
        let candidates = detector.find_candidates(&image);
        assert_eq!(candidates.len(), 1);
        let c = candidates[0];
        assert_abs_diff_eq!(c.x, 100.0, epsilon = 1.0);
        assert_abs_diff_eq!(c.y, 100.0, epsilon = 1.0);
        // Reported diameter is the DoG peak radius, sigma*sqrt(2) ~ 30.
        assert_abs_diff_eq!(c.diameter, 31.5, epsilon = 3.0);

        let detections = detector.detect(&image);
        assert_eq!(detections.len(), 1);
        let e = detections[0].ellipse;
        assert_abs_diff_eq!(e.width, 60.0, epsilon = 6.0);
        assert_eq!(e.width, e.height);
        assert_eq!(e.angle, 0.0);
        assert_eq!(detections[0].strength, c.response as f64);
    }

    #[test]
    fn test_min_diameter_and_area_filters() {
        let mut image = GrayImage::new(200, 200);
        draw_filled_ellipse(&mut image, &Ellipse::circle(100.0, 100.0, 60.0), 255);

        let params = BlobDetectorParams { min_diameter: 60.0, ..fine_params() };
        let detector = BlobEllipseDetector::new(params).unwrap();
        assert!(detector.find_candidates(&image).is_empty());

        let params = BlobDetectorParams { max_area: 1000.0, ..fine_params() };
        let detector = BlobEllipseDetector::new(params).unwrap();
        assert_eq!(detector.find_candidates(&image).len(), 1);
        assert!(detector.detect(&image).is_empty());
    }

    #[test]
    fn test_pyramid_levels_scale_coordinates() {
        // A small disk is seen on level 1 only, since level 0 scales are
        // below the minimum diameter.
        let mut image = GrayImage::new(256, 256);
        draw_filled_ellipse(&mut image, &Ellipse::circle(128.0, 96.0, 40.0), 255);
        let params = BlobDetectorParams {
            num_levels: 2,
            num_scales: 4,
            sigma0: 5.0,
            k: 1.2,
            min_response: 5.0,
            min_diameter: 18.0,
            ..Default::default()
        };
        let detector = BlobEllipseDetector::new(params).unwrap();
        let candidates = detector.find_candidates(&image);
        assert_eq!(candidates.len(), 1);
        assert_abs_diff_eq!(candidates[0].x, 128.0, epsilon = 2.5);
        assert_abs_diff_eq!(candidates[0].y, 96.0, epsilon = 2.5);
        // Level 1 diameters are 2*sqrt(2)*sigma_i.
        assert!(candidates[0].diameter > 18.0);
    }

    #[test]
    fn test_suppress_overlapping() {
        let c = |x: f32, diameter: f32, response: f32| {
            BlobCandidate { x, y: 0.0, diameter, response }
        };
        let candidates = vec![c(0.0, 10.0, 1.0), c(6.0, 20.0, 5.0), c(30.0, 10.0, 2.0)];
        // 6 < 0.7 * 10: first two overlap.
        let first = suppress_overlapping(candidates.clone(), DedupPolicy::FirstWins, 0.7);
        assert_eq!(first, vec![c(0.0, 10.0, 1.0), c(30.0, 10.0, 2.0)]);
        let strongest = suppress_overlapping(candidates, DedupPolicy::StrongestWins, 0.7);
        assert_eq!(strongest, vec![c(6.0, 20.0, 5.0), c(30.0, 10.0, 2.0)]);
    }

    #[test]
    fn test_cross_tile_suppression_uses_diameter() {
        let detector = BlobEllipseDetector::default();
        // Widths 100 -> diameters 50; threshold 0.7 * 50 = 35.
        let d = |x: f64, s: f64| DetectedEllipse::new(Ellipse::circle(x, 0.0, 100.0), s);
        let kept = detector.suppress_duplicates(vec![d(0.0, 1.0), d(30.0, 2.0), d(70.0, 1.0)]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].ellipse.center_x, 30.0);
        assert_eq!(kept[1].ellipse.center_x, 70.0);
    }
}  // mod tests.
