// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Synthetic benchmark scenes: an n x n collage of 256 pixel tiles, each
//! holding one filled ellipse on a flat background, blurred and with
//! additive Gaussian noise. The ellipse parameters are returned as ground
//! truth in global image coordinates.

use std::time::Instant;

use image::GrayImage;
use image::imageops::replace;
use imageproc::filter::gaussian_blur_f32;
use imageproc::noise::gaussian_noise;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ellipse::{Ellipse, GroundTruthEllipse};
use crate::error::{BenchError, Result};
use crate::grid::DEFAULT_TILE_SIZE;
use crate::records::SceneMetadata;

/// Distance kept clear between each ellipse's bounding half-axes and its
/// tile's edges.
pub const TILE_MARGIN: u32 = 32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Output files are `<output_path>.png` and `<output_path>_gt.json`
    /// unless given explicitly.
    pub output_path: String,

    /// Tiles per side.
    pub n: u32,

    pub bg_color: u8,
    pub elps_color: u8,
    pub noise_std: f64,

    /// Odd Gaussian kernel size; 0 or 1 disables blurring.
    pub blur_size: u32,

    pub min_elps_width: u32,
    pub max_elps_width: u32,
    pub min_elps_height: u32,
    pub max_elps_height: u32,

    #[serde(default)]
    pub seed: u64,
}

impl SceneConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(BenchError::InvalidParams("n must be at least 1".to_string()));
        }
        if self.min_elps_width == 0 || self.min_elps_height == 0 {
            return Err(BenchError::InvalidParams(
                "ellipse axes must be positive".to_string()));
        }
        if self.min_elps_width > self.max_elps_width ||
            self.min_elps_height > self.max_elps_height
        {
            return Err(BenchError::InvalidParams(
                "min ellipse size exceeds max".to_string()));
        }
        let room = DEFAULT_TILE_SIZE - 2 * TILE_MARGIN;
        if self.max_elps_width > room || self.max_elps_height > room {
            return Err(BenchError::InvalidParams(
                format!("ellipse axes must fit in {} pixels", room)));
        }
        if !(self.noise_std >= 0.0) {
            return Err(BenchError::InvalidParams(
                "noise_std must be non-negative".to_string()));
        }
        Ok(())
    }

    pub fn image_path(&self) -> String {
        format!("{}.png", self.output_path)
    }

    pub fn ground_truth_path(&self) -> String {
        format!("{}_gt.json", self.output_path)
    }

    pub fn metadata(&self) -> SceneMetadata {
        SceneMetadata::new(self.blur_size, self.bg_color, self.elps_color,
                           self.noise_std, self.n)
    }
}

/// Standard deviation matching a `size` x `size` Gaussian kernel, using the
/// usual 0.3*((size-1)*0.5 - 1) + 0.8 rule. None for sizes that do not blur.
pub fn blur_sigma_for_kernel(size: u32) -> Option<f32> {
    if size <= 1 {
        return None;
    }
    Some(0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8)
}

/// Sets every pixel whose center lies inside `ellipse` to `value`.
pub fn draw_filled_ellipse(image: &mut GrayImage, ellipse: &Ellipse, value: u8) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let reach = ellipse.width.max(ellipse.height) / 2.0 + 1.0;
    let clamp_x = |v: f64| v.clamp(0.0, (width - 1) as f64) as u32;
    let clamp_y = |v: f64| v.clamp(0.0, (height - 1) as f64) as u32;
    let (x0, x1) = (clamp_x((ellipse.center_x - reach).floor()),
                    clamp_x((ellipse.center_x + reach).ceil()));
    let (y0, y1) = (clamp_y((ellipse.center_y - reach).floor()),
                    clamp_y((ellipse.center_y + reach).ceil()));
    for y in y0..=y1 {
        for x in x0..=x1 {
            if ellipse.contains(x as f64, y as f64) {
                image.put_pixel(x, y, image::Luma([value]));
            }
        }
    }
}

/// Generates the collage described by `config`. Identical configs
/// (including seed) give identical scenes.
pub fn generate_scene(config: &SceneConfig)
                      -> Result<(GrayImage, Vec<GroundTruthEllipse>)> {
    config.validate()?;
    let start = Instant::now();
    let tile_size = DEFAULT_TILE_SIZE;
    let side = config.n * tile_size;
    let mut collage = GrayImage::from_pixel(side, side, image::Luma([config.bg_color]));
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut truth = Vec::with_capacity((config.n * config.n) as usize);

    for row in 0..config.n {
        for col in 0..config.n {
            let width = rng.gen_range(config.min_elps_width..=config.max_elps_width);
            let height = rng.gen_range(config.min_elps_height..=config.max_elps_height);
            let x = rng.gen_range(TILE_MARGIN + width / 2
                                  ..=tile_size - TILE_MARGIN - width / 2);
            let y = rng.gen_range(TILE_MARGIN + height / 2
                                  ..=tile_size - TILE_MARGIN - height / 2);
            let angle = rng.gen_range(0.0..360.0);
            let ellipse = Ellipse::new(x as f64, y as f64, width as f64, height as f64,
                                       angle);

            let mut tile = GrayImage::from_pixel(tile_size, tile_size,
                                                 image::Luma([config.bg_color]));
            draw_filled_ellipse(&mut tile, &ellipse, config.elps_color);
            if let Some(sigma) = blur_sigma_for_kernel(config.blur_size) {
                tile = gaussian_blur_f32(&tile, sigma);
            }
            let noise_seed: u64 = rng.gen();
            if config.noise_std > 0.0 {
                tile = gaussian_noise(&tile, /*mean=*/0.0, config.noise_std, noise_seed);
            }
            replace(&mut collage, &tile, (col * tile_size) as i64,
                    (row * tile_size) as i64);

            truth.push(GroundTruthEllipse {
                ellipse: ellipse.translated((col * tile_size) as f64,
                                            (row * tile_size) as f64),
                grid_row: row,
                grid_col: col,
            });
        }
    }
    debug!("Generated {}x{} scene with seed {} in {:?}",
           config.n, config.n, config.seed, start.elapsed());
    Ok((collage, truth))
}

// mod tests.
