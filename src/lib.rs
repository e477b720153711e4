//! EllipseBench detects elliptical blobs in synthetic composite images and
//! scores the detections against known ground truth.
//!
//! A benchmark scene is an n x n grid of 256 pixel tiles, each holding one
//! filled ellipse on a flat background, usually blurred and noisy (see
//! [scene]). Detection runs per tile (or on the whole image), detections are
//! moved into global image coordinates, and duplicates are removed across
//! tile borders (see [grid]). The [evaluator] then pairs detections with
//! ground truth one-to-one and reports precision and recall.
//!
//! Two detectors are provided, both implementing
//! [detector::EllipseDetector]:
//!
//! * [contour_detector::ContourEllipseDetector] binarizes the image at the
//!   Otsu level, traces the external contours of the resulting mask and fits
//!   an ellipse to each plausible one by direct least squares
//!   ([ellipse_fit]). It recovers full ellipse geometry including
//!   orientation.
//! * [blob_detector::BlobEllipseDetector] searches a Difference-of-Gaussians
//!   scale space over an image pyramid for blob-like maxima. It tolerates
//!   a wide range of blob sizes but reports circles only.
//!
//! # Conventions
//!
//! Coordinates are pixels, x to the right and y down. An [ellipse::Ellipse]
//! carries full axis lengths and an angle in degrees; producers differ in
//! which axis they report first, so comparisons go through
//! [ellipse::Ellipse::canonical()], which puts the major axis first with its
//! orientation in [0, 180).
//!
//! Nothing found is not an error: a tile or image without qualifying objects
//! yields an empty detection list. Errors ([error::BenchError]) are reserved
//! for bad inputs such as unreadable files, malformed JSON or images that do
//! not tile.
//!
//! The `detect-ellipses`, `evaluate-detections` and `generate-scene`
//! binaries wrap these pieces with the JSON formats of [records].

pub mod blob_detector;
pub mod contour_detector;
pub mod dedup;
pub mod detector;
pub mod ellipse;
pub mod ellipse_fit;
pub mod error;
pub mod evaluator;
pub mod grid;
pub mod image_funcs;
pub mod records;
pub mod scene;
