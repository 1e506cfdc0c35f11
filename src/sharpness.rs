//! Blur detection.
//!
//! Frames are scored by the variance of their Laplacian: a 3×3 kernel
//!
//! ```text
//! [ 0  1  0 ]
//! [ 1 -4  1 ]
//! [ 0  1  0 ]
//! ```
//!
//! responds to edges, and a sharp frame has more high-frequency content than a
//! blurred one. Scores are not normalised; typical handheld footage lands
//! between 20 (motion blur) and several thousand.

use image::{DynamicImage, GrayImage};

/// Sharpness score of an image. Higher is sharper.
pub fn sharpness_score(image: &DynamicImage) -> f64 {
    laplacian_variance(&image.to_luma8())
}

/// Variance of the Laplacian of a grayscale image.
///
/// Images smaller than 3×3 have no interior pixels and score `0.0`.
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let pixels = image.as_raw();
    let stride = width as usize;

    // Welford's running mean/variance avoids a second pass and a buffer the
    // size of the frame.
    let mut count = 0_u64;
    let mut mean = 0.0_f64;
    let mut m2 = 0.0_f64;

    for y in 1..(height as usize - 1) {
        let row = y * stride;
        for x in 1..(width as usize - 1) {
            let center = i32::from(pixels[row + x]);
            let top = i32::from(pixels[row - stride + x]);
            let bottom = i32::from(pixels[row + stride + x]);
            let left = i32::from(pixels[row + x - 1]);
            let right = i32::from(pixels[row + x + 1]);

            let value = f64::from(top + bottom + left + right - 4 * center);
            count += 1;
            let delta = value - mean;
            mean += delta / count as f64;
            m2 += delta * (value - mean);
        }
    }

    m2 / count as f64
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn flat_image_scores_zero() {
        let image = GrayImage::from_pixel(16, 16, Luma([128]));
        assert_eq!(laplacian_variance(&image), 0.0);
    }

    #[test]
    fn tiny_image_scores_zero() {
        let image = GrayImage::from_pixel(2, 2, Luma([255]));
        assert_eq!(laplacian_variance(&image), 0.0);
    }

    #[test]
    fn checkerboard_is_sharper_than_gradient() {
        let checker = GrayImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 { Luma([0]) } else { Luma([255]) }
        });
        let gradient = GrayImage::from_fn(32, 32, |x, _| Luma([(x * 8) as u8]));

        assert!(laplacian_variance(&checker) > laplacian_variance(&gradient));
    }

    #[test]
    fn matches_two_pass_variance() {
        let image = GrayImage::from_fn(9, 7, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));

        let mut values = Vec::new();
        for y in 1..6 {
            for x in 1..8 {
                let p = |x: u32, y: u32| i32::from(image.get_pixel(x, y)[0]);
                values.push(f64::from(
                    p(x, y - 1) + p(x, y + 1) + p(x - 1, y) + p(x + 1, y) - 4 * p(x, y),
                ));
            }
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let expected =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        assert!((laplacian_variance(&image) - expected).abs() < 1e-6);
    }
}
