// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::f64::consts::PI;

/// A rotated ellipse in image pixel coordinates.
///
/// `width` and `height` are full axis lengths (twice the semi-axes). `angle`
/// is in degrees, measured from the +x axis toward +y (image rows grow
/// downward), and gives the orientation of the `width` axis. Different
/// producers use different raw conventions; use [Ellipse::canonical()] before
/// comparing orientations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl Ellipse {
    pub fn new(center_x: f64, center_y: f64, width: f64, height: f64, angle: f64)
               -> Self {
        Ellipse { center_x, center_y, width, height, angle }
    }

    pub fn circle(center_x: f64, center_y: f64, diameter: f64) -> Self {
        Ellipse::new(center_x, center_y, diameter, diameter, 0.0)
    }

    /// Returns the same ellipse with `width` as the major axis and `angle`
    /// (the major axis orientation) reduced to [0, 180).
    pub fn canonical(&self) -> Ellipse {
        let (width, height, angle) = if self.height > self.width {
            (self.height, self.width, self.angle + 90.0)
        } else {
            (self.width, self.height, self.angle)
        };
        let mut angle = angle.rem_euclid(180.0);
        // rem_euclid() can round up to exactly 180.0 for tiny negative angles.
        if angle >= 180.0 {
            angle = 0.0;
        }
        Ellipse { width, height, angle, ..*self }
    }

    /// Projected area, pi*w*h/4.
    pub fn area(&self) -> f64 {
        PI * self.width * self.height / 4.0
    }

    /// Positive, finite axes and finite center/angle.
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 &&
            self.width.is_finite() && self.height.is_finite() &&
            self.center_x.is_finite() && self.center_y.is_finite() &&
            self.angle.is_finite()
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Ellipse {
        Ellipse { center_x: self.center_x + dx, center_y: self.center_y + dy, ..*self }
    }

    pub fn center_distance(&self, other: &Ellipse) -> f64 {
        (self.center_x - other.center_x).hypot(self.center_y - other.center_y)
    }

    /// Whether (x, y) lies inside or on the ellipse.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let semi_w = self.width / 2.0;
        let semi_h = self.height / 2.0;
        if semi_w <= 0.0 || semi_h <= 0.0 {
            return false;
        }
        let (sin_a, cos_a) = self.angle.to_radians().sin_cos();
        let dx = x - self.center_x;
        let dy = y - self.center_y;
        // Rotate into the ellipse's own frame.
        let u = dx * cos_a + dy * sin_a;
        let v = -dx * sin_a + dy * cos_a;
        (u / semi_w).powi(2) + (v / semi_h).powi(2) <= 1.0
    }

    /// `n` points evenly spaced in parameter along the outline.
    pub fn outline(&self, n: usize) -> Vec<[f64; 2]> {
        let (sin_a, cos_a) = self.angle.to_radians().sin_cos();
        (0..n).map(|i| {
            let t = 2.0 * PI * i as f64 / n as f64;
            let u = self.width / 2.0 * t.cos();
            let v = self.height / 2.0 * t.sin();
            [self.center_x + u * cos_a - v * sin_a,
             self.center_y + u * sin_a + v * cos_a]
        }).collect()
    }
}

/// Unsigned difference between two axis orientations, in degrees, in
/// [0, 90]. Orientations are axial: 10 and 190 degrees are the same axis.
pub fn axial_angle_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(180.0);
    d.min(180.0 - d)
}

/// An ellipse drawn by the scene generator, tagged with the grid tile it was
/// placed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruthEllipse {
    pub ellipse: Ellipse,
    pub grid_row: u32,
    pub grid_col: u32,
}

/// An ellipse reported by a detector, in whatever frame the detector ran in
/// (tile-local until remapped by the grid segmenter).
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEllipse {
    pub ellipse: Ellipse,

    // Detector-specific ranking: enclosed contour area for the contour
    // detector, DoG response for the blob detector. Used only when picking
    // a winner among duplicates.
    pub strength: f64,

    // Simplified outline, present only when the detector was asked to
    // retain it.
    pub boundary: Option<Vec<[f64; 2]>>,
}

impl DetectedEllipse {
    pub fn new(ellipse: Ellipse, strength: f64) -> Self {
        DetectedEllipse { ellipse, strength, boundary: None }
    }

    /// Shifts the ellipse and its boundary (if any) by (dx, dy).
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        DetectedEllipse {
            ellipse: self.ellipse.translated(dx, dy),
            strength: self.strength,
            boundary: self.boundary.map(|points| {
                points.into_iter().map(|[x, y]| [x + dx, y + dy]).collect()
            }),
        }
    }
}

// mod tests.
