// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Instant;

use image::GrayImage;
use image::imageops::crop_imm;
use log::{debug, info};

use crate::detector::EllipseDetector;
use crate::ellipse::DetectedEllipse;
use crate::error::{BenchError, Result};

/// Side length of one composite tile in the generated scenes.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// A square composite of `grid_size` x `grid_size` tiles, each `tile_size`
/// pixels on a side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub grid_size: u32,
    pub tile_size: u32,
}

/// One tile cut out of a composite, with its position in the grid.
#[derive(Clone, Debug)]
pub struct Tile {
    pub row: u32,
    pub col: u32,
    pub image: GrayImage,
}

impl TileGrid {
    pub fn new(grid_size: u32, tile_size: u32) -> Self {
        TileGrid { grid_size, tile_size }
    }

    /// Derives the grid size from a square image whose side is a whole
    /// multiple of `tile_size`.
    pub fn infer(image: &GrayImage, tile_size: u32) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BenchError::EmptyImage);
        }
        let grid_size = if tile_size == 0 { 0 } else { width / tile_size };
        let grid = TileGrid::new(grid_size, tile_size);
        grid.check(image)?;
        Ok(grid)
    }

    /// Fails unless `image` is exactly grid_size*tile_size on each side.
    pub fn check(&self, image: &GrayImage) -> Result<()> {
        let (width, height) = image.dimensions();
        let side = self.grid_size.checked_mul(self.tile_size);
        if self.grid_size == 0 || side != Some(width) || side != Some(height) {
            return Err(BenchError::InvalidTiling {
                width, height, grid_size: self.grid_size, tile_size: self.tile_size,
            });
        }
        Ok(())
    }

    /// Global pixel coordinates of the tile's top-left corner.
    pub fn tile_origin(&self, row: u32, col: u32) -> (u32, u32) {
        (col * self.tile_size, row * self.tile_size)
    }

    /// The tiles in row-major order.
    pub fn tiles(&self, image: &GrayImage) -> Result<Vec<Tile>> {
        self.check(image)?;
        let mut tiles = Vec::with_capacity((self.grid_size * self.grid_size) as usize);
        for row in 0..self.grid_size {
            for col in 0..self.grid_size {
                let (x, y) = self.tile_origin(row, col);
                let image = crop_imm(image, x, y, self.tile_size, self.tile_size).to_image();
                tiles.push(Tile { row, col, image });
            }
        }
        Ok(tiles)
    }

    /// Moves tile-local detections into the global frame.
    pub fn to_global(&self, row: u32, col: u32, detections: Vec<DetectedEllipse>)
                     -> Vec<DetectedEllipse> {
        let (x, y) = self.tile_origin(row, col);
        detections.into_iter()
            .map(|d| d.translated(x as f64, y as f64))
            .collect()
    }
}

/// Runs `detector` on every tile of `image`, remaps the detections into
/// global coordinates, then removes duplicates that straddle tile borders
/// using the detector's own duplicate rule.
///
/// Ellipses crossing a tile border are seen as two partial objects (or not
/// at all); that limitation is inherent to tiling and is not corrected here.
pub fn detect_tiled(image: &GrayImage, grid: &TileGrid, detector: &dyn EllipseDetector)
                    -> Result<Vec<DetectedEllipse>> {
    let start = Instant::now();
    let mut merged = Vec::new();
    for tile in grid.tiles(image)? {
        let local = detector.detect(&tile.image);
        debug!("Tile ({}, {}): {} detections", tile.row, tile.col, local.len());
        merged.extend(grid.to_global(tile.row, tile.col, local));
    }
    let merged_count = merged.len();
    let detections = detector.suppress_duplicates(merged);
    info!("Detected {} ellipses in {}x{} grid ({} merged across tiles) in {:?}",
          detections.len(), grid.grid_size, grid.grid_size,
          merged_count - detections.len(), start.elapsed());
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{suppress_duplicates, within_square, DedupPolicy};
    use crate::ellipse::Ellipse;
    use image::Luma;

    // Reports one ellipse at the brightest pixel of each image, if any pixel
    // is non-zero.
    struct BrightestPixel;

    impl EllipseDetector for BrightestPixel {
        fn detect(&self, image: &GrayImage) -> Vec<DetectedEllipse> {
            let mut best: Option<(u32, u32, u8)> = None;
            for (x, y, p) in image.enumerate_pixels() {
                if p.0[0] > 0 && best.map_or(true, |(_, _, v)| p.0[0] > v) {
                    best = Some((x, y, p.0[0]));
                }
            }
            best.map(|(x, y, v)| {
                DetectedEllipse::new(Ellipse::circle(x as f64, y as f64, 10.0), v as f64)
            }).into_iter().collect()
        }

        fn suppress_duplicates(&self, detections: Vec<DetectedEllipse>)
                               -> Vec<DetectedEllipse> {
            suppress_duplicates(detections, DedupPolicy::FirstWins, 20.0,
                                |a, b| within_square(a, b, 20.0))
        }
    }

    #[test]
    fn test_infer_and_check() {
        let image = GrayImage::new(64, 64);
        assert_eq!(TileGrid::infer(&image, 16).unwrap(), TileGrid::new(4, 16));
        assert!(matches!(TileGrid::infer(&GrayImage::new(64, 48), 16),
                         Err(BenchError::InvalidTiling { .. })));
        assert!(matches!(TileGrid::infer(&GrayImage::new(60, 60), 16),
                         Err(BenchError::InvalidTiling { .. })));
        assert!(matches!(TileGrid::infer(&GrayImage::new(0, 0), 16),
                         Err(BenchError::EmptyImage)));
        assert!(TileGrid::new(2, 16).check(&image).is_err());
    }

    #[test]
    fn test_tiles_row_major_with_content() {
        let mut image = GrayImage::new(8, 8);
        image.put_pixel(5, 1, Luma([9]));  // Row 0, col 1.
        let tiles = TileGrid::new(2, 4).tiles(&image).unwrap();
        assert_eq!(tiles.len(), 4);
        assert_eq!((tiles[1].row, tiles[1].col), (0, 1));
        assert_eq!((tiles[2].row, tiles[2].col), (1, 0));
        assert_eq!(tiles[1].image.dimensions(), (4, 4));
        assert_eq!(tiles[1].image.get_pixel(1, 1).0[0], 9);
    }

    #[test]
    fn test_to_global_offsets() {
        let grid = TileGrid::new(5, 256);
        let local = vec![DetectedEllipse::new(Ellipse::circle(10.0, 20.0, 5.0), 1.0)];
        let global = grid.to_global(3, 2, local);
        assert_eq!(global[0].ellipse.center_x, 10.0 + 2.0 * 256.0);
        assert_eq!(global[0].ellipse.center_y, 20.0 + 3.0 * 256.0);
    }

    #[test]
    fn test_detect_tiled_merges_across_border() {
        let mut image = GrayImage::new(128, 128);
        // Two spots 4 pixels apart straddling the vertical tile border, and
        // one well inside tile (1, 1).
        image.put_pixel(62, 10, Luma([200]));
        image.put_pixel(66, 10, Luma([100]));
        image.put_pixel(100, 100, Luma([50]));
        let grid = TileGrid::new(2, 64);
        let detections = detect_tiled(&image, &grid, &BrightestPixel).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!((detections[0].ellipse.center_x, detections[0].ellipse.center_y),
                   (62.0, 10.0));
        assert_eq!((detections[1].ellipse.center_x, detections[1].ellipse.center_y),
                   (100.0, 100.0));
    }
}  // mod tests.
