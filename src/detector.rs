// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::GrayImage;

use crate::ellipse::DetectedEllipse;

/// A single-image ellipse detector. Implementations are pure functions of
/// their parameters and the input image.
pub trait EllipseDetector {
    /// Detections in the frame of `image`. An image with nothing in it
    /// yields an empty vector, never an error.
    fn detect(&self, image: &GrayImage) -> Vec<DetectedEllipse>;

    /// Applies this detector's duplicate rule and winner policy to a merged
    /// detection list (e.g. detections gathered from several tiles).
    fn suppress_duplicates(&self, detections: Vec<DetectedEllipse>)
                           -> Vec<DetectedEllipse>;
}
