// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::{GrayImage, ImageBuffer, Luma, Primitive};

/// Single channel f32 image, used for the scale-space stages where u8
/// quantization would swamp small DoG responses.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Pixel offsets covered by a structuring element, relative to its center.
/// The center (0, 0) is always included.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuringElement {
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    /// Elliptical (here circular) element inscribed in a
    /// (2*radius+1)x(2*radius+1) box. Radius 2 gives the familiar 5x5
    /// shape:
    ///   . . X . .
    ///   X X X X X
    ///   X X X X X
    ///   X X X X X
    ///   . . X . .
    pub fn ellipse(radius: u32) -> Self {
        let r = radius as i32;
        let mut offsets = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            let half_width = if r == 0 {
                0
            } else {
                ((r * r - dy * dy) as f64).sqrt().round() as i32
            };
            for dx in -half_width..=half_width {
                offsets.push((dx, dy));
            }
        }
        StructuringElement { offsets }
    }

    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }
}

// Replaces each pixel with the min (erode) or max (dilate) over the
// structuring element. Offsets falling outside the image are ignored, so
// the border neither grows nor shrinks objects.
fn rank_filter<T>(image: &ImageBuffer<Luma<T>, Vec<T>>,
                  element: &StructuringElement,
                  take_max: bool) -> ImageBuffer<Luma<T>, Vec<T>>
where T: Primitive + 'static
{
    let (width, height) = image.dimensions();
    let mut out = ImageBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut extreme = image.get_pixel(x, y).0[0];
            for &(dx, dy) in element.offsets() {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let v = image.get_pixel(nx as u32, ny as u32).0[0];
                if (take_max && v > extreme) || (!take_max && v < extreme) {
                    extreme = v;
                }
            }
            out.put_pixel(x, y, Luma([extreme]));
        }
    }
    out
}

pub fn erode<T: Primitive + 'static>(image: &ImageBuffer<Luma<T>, Vec<T>>,
                                     element: &StructuringElement)
                                     -> ImageBuffer<Luma<T>, Vec<T>> {
    rank_filter(image, element, /*take_max=*/false)
}

pub fn dilate<T: Primitive + 'static>(image: &ImageBuffer<Luma<T>, Vec<T>>,
                                      element: &StructuringElement)
                                      -> ImageBuffer<Luma<T>, Vec<T>> {
    rank_filter(image, element, /*take_max=*/true)
}

/// Erosion followed by dilation: removes bright specks smaller than the
/// element.
pub fn open<T: Primitive + 'static>(image: &ImageBuffer<Luma<T>, Vec<T>>,
                                    element: &StructuringElement)
                                    -> ImageBuffer<Luma<T>, Vec<T>> {
    dilate(&erode(image, element), element)
}

pub fn to_float_image(image: &GrayImage) -> FloatImage {
    let (width, height) = image.dimensions();
    let pixels = image.as_raw().iter().map(|&p| p as f32).collect();
    FloatImage::from_raw(width, height, pixels)
        .unwrap_or_else(|| FloatImage::new(width, height))
}

/// Linearly stretches pixel values so the darkest maps to 0 and the
/// brightest to 255. A uniform image maps to all zeros.
pub fn normalize_to_full_range(image: &FloatImage) -> FloatImage {
    let (width, height) = image.dimensions();
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for &p in image.as_raw() {
        min = min.min(p);
        max = max.max(p);
    }
    if image.as_raw().is_empty() || max <= min {
        return FloatImage::new(width, height);
    }
    let scale = 255.0 / (max - min);
    let pixels = image.as_raw().iter().map(|&p| (p - min) * scale).collect();
    FloatImage::from_raw(width, height, pixels)
        .unwrap_or_else(|| FloatImage::new(width, height))
}

/// Returns pixels whose value is >= every in-bounds 8-neighbor and strictly
/// greater than `min_value`. Plateaus therefore yield several adjacent
/// maxima; callers dedup them.
/// The maxima are returned in raster scan order.
pub fn local_maxima_3x3(image: &FloatImage, min_value: f32) -> Vec<(u32, u32, f32)> {
    let (width, height) = image.dimensions();
    let mut maxima = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let value = image.get_pixel(x, y).0[0];
            if value <= min_value {
                continue;
            }
            let mut is_max = true;
            'neighbors: for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    if image.get_pixel(nx, ny).0[0] > value {
                        is_max = false;
                        break 'neighbors;
                    }
                }
            }
            if is_max {
                maxima.push((x, y, value));
            }
        }
    }
    maxima
}

/// Separable Gaussian blur of a float image. The kernel extends to 3 sigma
/// and out-of-bounds samples replicate the nearest edge pixel.
// imageproc's gaussian_blur_f32() also replicates borders, but cuts its
// kernel off at 2 sigma. The scale-space stages need the wider tail.
pub fn gaussian_blur_replicate(image: &FloatImage, sigma: f32) -> FloatImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || sigma <= 0.0 {
        return image.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;
    let clamp = |v: i64, limit: u32| v.clamp(0, limit as i64 - 1) as usize;

    // Horizontal pass.
    let source_pixels = image.as_raw();
    let mut horizontal = vec![0.0f32; source_pixels.len()];
    for y in 0..height as usize {
        let row = &source_pixels[y * width as usize..(y + 1) * width as usize];
        for x in 0..width as usize {
            let mut sum = 0.0;
            for (k, &weight) in kernel.iter().enumerate() {
                sum += weight * row[clamp(x as i64 + k as i64 - radius, width)];
            }
            horizontal[y * width as usize + x] = sum;
        }
    }
    // Vertical pass.
    let mut pixels = vec![0.0f32; source_pixels.len()];
    for y in 0..height as usize {
        for x in 0..width as usize {
            let mut sum = 0.0;
            for (k, &weight) in kernel.iter().enumerate() {
                let sy = clamp(y as i64 + k as i64 - radius, height);
                sum += weight * horizontal[sy * width as usize + x];
            }
            pixels[y * width as usize + x] = sum;
        }
    }
    FloatImage::from_raw(width, height, pixels)
        .unwrap_or_else(|| FloatImage::new(width, height))
}

// Normalized samples of a Gaussian over [-ceil(3 sigma), ceil(3 sigma)].
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    for weight in kernel.iter_mut() {
        *weight /= total;
    }
    kernel
}

/// Pixelwise |a - b|. The images must have equal dimensions.
pub fn abs_difference(a: &FloatImage, b: &FloatImage) -> FloatImage {
    let (width, height) = a.dimensions();
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let pixels = a.as_raw().iter().zip(b.as_raw().iter())
        .map(|(&p, &q)| (p - q).abs())
        .collect();
    FloatImage::from_raw(width, height, pixels)
        .unwrap_or_else(|| FloatImage::new(width, height))
}

/// Shrinks the image by `factor` (> 1), bilinearly sampling the source at
/// each destination pixel center. The result is at least 1x1.
// image::imageops::resize() clamps f32 samples to [0, 1], which would
// destroy our 0..255 working range, so we resample here.
pub fn downsample(image: &FloatImage, factor: f32) -> FloatImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let new_width = ((width as f32 / factor).round() as u32).max(1);
    let new_height = ((height as f32 / factor).round() as u32).max(1);
    let source_pixels = image.as_raw();
    let sample = |x: u32, y: u32| source_pixels[(y * width + x) as usize];

    let mut pixels = Vec::with_capacity((new_width * new_height) as usize);
    for y in 0..new_height {
        let sy = ((y as f32 + 0.5) * factor - 0.5).clamp(0.0, (height - 1) as f32);
        let y0 = sy.floor() as u32;
        let y1 = (y0 + 1).min(height - 1);
        let fy = sy - y0 as f32;
        for x in 0..new_width {
            let sx = ((x as f32 + 0.5) * factor - 0.5).clamp(0.0, (width - 1) as f32);
            let x0 = sx.floor() as u32;
            let x1 = (x0 + 1).min(width - 1);
            let fx = sx - x0 as f32;
            let top = sample(x0, y0) * (1.0 - fx) + sample(x1, y0) * fx;
            let bottom = sample(x0, y1) * (1.0 - fx) + sample(x1, y1) * fx;
            pixels.push(top * (1.0 - fy) + bottom * fy);
        }
    }
    FloatImage::from_raw(new_width, new_height, pixels)
        .unwrap_or_else(|| FloatImage::new(new_width, new_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::gray_image;

    #[test]
    fn test_ellipse_element_shape() {
        let element = StructuringElement::ellipse(2);
        assert_eq!(element.offsets().len(), 1 + 5 + 5 + 5 + 1);
        assert!(element.offsets().contains(&(0, -2)));
        assert!(!element.offsets().contains(&(1, -2)));
        assert!(element.offsets().contains(&(-2, 1)));
        assert_eq!(StructuringElement::ellipse(0).offsets(), &[(0, 0)]);
    }

    #[test]
    fn test_open_removes_speck() {
        let image = gray_image!(
            0, 0, 0, 0, 0;
            0, 0, 0, 0, 0;
            0, 0, 255, 0, 0;
            0, 0, 0, 0, 0;
            0, 0, 0, 0, 0);
        let opened = open(&image, &StructuringElement::ellipse(1));
        assert!(opened.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_erode_dilate_float() {
        let image = gray_image!(type: f32,
            1.0, 2.0, 3.0;
            4.0, 5.0, 6.0;
            7.0, 8.0, 9.0);
        let element = StructuringElement::ellipse(1);
        // Cross-shaped element: center plus 4-neighbors.
        assert_eq!(dilate(&image, &element).get_pixel(1, 1).0[0], 8.0);
        assert_eq!(erode(&image, &element).get_pixel(1, 1).0[0], 2.0);
        assert_eq!(dilate(&image, &element).get_pixel(0, 0).0[0], 4.0);
    }

    #[test]
    fn test_normalize_to_full_range() {
        let image = gray_image!(type: f32, 10.0, 20.0; 30.0, 61.0);
        let normalized = normalize_to_full_range(&image);
        assert_eq!(normalized.as_raw(), &vec![0.0, 50.0, 100.0, 255.0]);

        let flat = gray_image!(type: f32, 7.0, 7.0; 7.0, 7.0);
        assert!(normalize_to_full_range(&flat).as_raw().iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_local_maxima_3x3() {
        let image = gray_image!(type: f32,
            0.0, 0.0, 0.0, 0.0, 0.0;
            0.0, 5.0, 1.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0, 3.0;
            0.0, 0.0, 0.0, 0.0, 3.0);
        let maxima = local_maxima_3x3(&image, 2.0);
        // The plateau at the right edge yields two maxima.
        assert_eq!(maxima, vec![(1, 1, 5.0), (4, 2, 3.0), (4, 3, 3.0)]);
        assert!(local_maxima_3x3(&image, 5.0).is_empty());
    }

    #[test]
    fn test_gaussian_blur_replicate() {
        // Flat images stay flat, right up to the border.
        let flat = FloatImage::from_pixel(20, 10, Luma([42.0]));
        let blurred = gaussian_blur_replicate(&flat, 3.0);
        assert!(blurred.pixels().all(|p| (p.0[0] - 42.0).abs() < 1e-3));

        // An impulse spreads symmetrically and keeps its mass.
        let mut impulse = FloatImage::new(41, 41);
        impulse.put_pixel(20, 20, Luma([1000.0]));
        let blurred = gaussian_blur_replicate(&impulse, 2.0);
        let total: f32 = blurred.as_raw().iter().sum();
        assert!((total - 1000.0).abs() < 0.1);
        assert_eq!(blurred.get_pixel(17, 20), blurred.get_pixel(23, 20));
        assert_eq!(blurred.get_pixel(20, 17), blurred.get_pixel(20, 23));
        assert!(blurred.get_pixel(20, 20).0[0] > blurred.get_pixel(21, 20).0[0]);

        let kernel = gaussian_kernel(2.0);
        assert_eq!(kernel.len(), 13);
    }

    #[test]
    fn test_downsample() {
        let image = FloatImage::from_pixel(101, 64, Luma([300.0]));
        let half = downsample(&image, 2.0);
        assert_eq!(half.dimensions(), (51, 32));
        assert!(half.pixels().all(|p| (p.0[0] - 300.0).abs() < 1e-3));

        // Factor 2 samples midway between source pixel pairs.
        let ramp = gray_image!(type: f32, 0.0, 10.0, 20.0, 30.0);
        assert_eq!(downsample(&ramp, 2.0).as_raw(), &vec![5.0, 25.0]);
    }
}  // mod tests.
