use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};

use crate::error::TaggerError;

/// Letterboxes `image` onto a black `canvas_size` square and stretches each
/// colour channel to the full `0..=255` range.
pub fn normalize(image: &DynamicImage, canvas_size: u32) -> Result<RgbImage, TaggerError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || canvas_size == 0 {
        return Err(TaggerError::EmptyImage { width, height });
    }

    // Grayscale and alpha-bearing sources all collapse to RGB here.
    let rgb = image.to_rgb8();
    let (fit_w, fit_h) = fit_within(width, height, canvas_size);
    let resized = if (fit_w, fit_h) == (width, height) {
        rgb
    } else {
        imageops::resize(&rgb, fit_w, fit_h, FilterType::Triangle)
    };

    let mut canvas = RgbImage::new(canvas_size, canvas_size);
    let x = i64::from((canvas_size - fit_w) / 2);
    let y = i64::from((canvas_size - fit_h) / 2);
    imageops::replace(&mut canvas, &resized, x, y);

    stretch_contrast(&mut canvas);
    Ok(canvas)
}

/// Size with the longer side at `target`, aspect kept, short side floored.
fn fit_within(width: u32, height: u32, target: u32) -> (u32, u32) {
    let scaled = |short: u32, long: u32| -> u32 {
        let value = u64::from(short) * u64::from(target) / u64::from(long);
        (value as u32).clamp(1, target)
    };

    if width > height {
        (target, scaled(height, width))
    } else {
        (scaled(width, height), target)
    }
}

fn stretch_contrast(canvas: &mut RgbImage) {
    for channel in 0..3 {
        let (mut min, mut max) = (u8::MAX, u8::MIN);
        for pixel in canvas.pixels() {
            min = min.min(pixel.0[channel]);
            max = max.max(pixel.0[channel]);
        }
        if min >= max {
            continue;
        }

        let span = u32::from(max - min);
        for pixel in canvas.pixels_mut() {
            let value = u32::from(pixel.0[channel] - min);
            pixel.0[channel] = (value * 255 / span) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, Rgba, RgbaImage};

    #[test]
    fn output_is_canvas_sized_for_any_aspect() {
        for (w, h) in [(300, 100), (100, 300), (300, 300), (7, 1000), (40, 20)] {
            let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 100, 50])));
            let out = normalize(&source, 512).unwrap();
            assert_eq!(out.dimensions(), (512, 512), "source {w}x{h}");
        }
    }

    #[test]
    fn wide_source_is_centred_on_black() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 100, Rgb([200, 100, 50])));
        let out = normalize(&source, 512).unwrap();

        // 512x170 strip starting at row 171.
        assert_eq!(out.get_pixel(256, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(256, 511), &Rgb([0, 0, 0]));
        let centre = out.get_pixel(256, 256);
        assert!(centre.0.iter().all(|&v| v >= 250), "centre {centre:?}");
    }

    #[test]
    fn fit_keeps_aspect_with_floored_short_side() {
        assert_eq!(fit_within(300, 100, 512), (512, 170));
        assert_eq!(fit_within(100, 300, 512), (170, 512));
        assert_eq!(fit_within(300, 300, 512), (512, 512));
        assert_eq!(fit_within(5000, 1, 512), (512, 1));
    }

    #[test]
    fn canvas_sized_input_is_only_contrast_adjusted() {
        let mut source = RgbImage::new(512, 512);
        for (x, _y, pixel) in source.enumerate_pixels_mut() {
            *pixel = Rgb([50 + (x % 101) as u8, 80, 80]);
        }
        let out = normalize(&DynamicImage::ImageRgb8(source.clone()), 512).unwrap();

        assert_eq!(out.dimensions(), source.dimensions());
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(100, 0).0[0], 255);
        assert_eq!(out.get_pixel(50, 3).0[0], 127);
        // Constant channels have no range to stretch.
        assert_eq!(out.get_pixel(10, 10).0[1], 80);
        assert_eq!(out.get_pixel(10, 10).0[2], 80);
    }

    #[test]
    fn zero_variance_image_passes_through() {
        let source = RgbImage::from_pixel(512, 512, Rgb([12, 34, 56]));
        let out = normalize(&DynamicImage::ImageRgb8(source.clone()), 512).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn grayscale_and_alpha_sources_become_rgb() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 32, Luma([90])));
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 64, Rgba([10, 20, 30, 0])));

        assert_eq!(normalize(&gray, 128).unwrap().dimensions(), (128, 128));
        assert_eq!(normalize(&rgba, 128).unwrap().dimensions(), (128, 128));
    }

    #[test]
    fn empty_source_is_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(
            normalize(&empty, 512),
            Err(TaggerError::EmptyImage { width: 0, height: 10 })
        ));
    }
}
