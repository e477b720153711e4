// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::PathBuf;

/// Errors surfaced to callers. Algorithmic no-result outcomes (a tile with
/// nothing in it, a contour too short to fit) are not errors; those produce
/// empty detection sets.
#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<BenchError>,
    },

    #[error("image {width}x{height} is not a {grid_size}x{grid_size} grid of {tile_size}px tiles")]
    InvalidTiling {
        width: u32,
        height: u32,
        grid_size: u32,
        tile_size: u32,
    },

    #[error("image is empty")]
    EmptyImage,

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("list length mismatch: {ground_truth} ground truth files vs {detections} detection files")]
    ListLengthMismatch {
        ground_truth: usize,
        detections: usize,
    },
}

impl BenchError {
    /// Attaches the offending file path to an error.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        BenchError::File { path: path.into(), source: Box::new(self) }
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
