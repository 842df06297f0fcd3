use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};

use super::Region;

// Mask anchors are u8.
const MAX_KERNEL: u32 = 255;

/// Grayscale conversion that composites transparent pixels onto white.
pub(super) fn to_luma(image: &DynamicImage) -> GrayImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = (r as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let g = (g as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let b = (b as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        luma.put_pixel(x, y, Luma([value]));
    }
    luma
}

/// Crops `region`, upscales it and binarizes it so dark glyphs end up black
/// on white, which is what the recognition engine reads best.
pub(super) fn prepare_region(
    image: &DynamicImage,
    region: &Region,
    scale: u32,
    threshold_radius: u32,
) -> DynamicImage {
    let crop = image.crop_imm(region.x, region.y, region.w, region.h);
    let luma = to_luma(&crop);
    let (width, height) = luma.dimensions();
    let scale = scale.max(1);
    let enlarged = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::CatmullRom,
        )
    } else {
        luma
    };
    DynamicImage::ImageLuma8(adaptive_threshold(&enlarged, threshold_radius.max(1)))
}

/// Foreground (non-zero) where the pixel is darker than its neighbourhood.
pub(super) fn dark_foreground(luma: &GrayImage, radius: u32) -> GrayImage {
    let mut mask = adaptive_threshold(luma, radius.max(1));
    for pixel in mask.pixels_mut() {
        pixel[0] = 255 - pixel[0];
    }
    mask
}

/// Morphological closing with a `width` x `height` rectangle. Erosion uses
/// the reflected rectangle so even-sized kernels never shrink a stroke.
pub(super) fn close_rect(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let width = width.clamp(1, MAX_KERNEL);
    let height = height.clamp(1, MAX_KERNEL);
    let rect = GrayImage::from_pixel(width, height, Luma([255]));
    let (cx, cy) = (width / 2, height / 2);
    let forward = Mask::from_image(&rect, cx as u8, cy as u8);
    let reflected = Mask::from_image(&rect, (width - 1 - cx) as u8, (height - 1 - cy) as u8);
    grayscale_erode(&grayscale_dilate(image, &forward), &reflected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with(width: u32, height: u32, on: &[(u32, u32)]) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for &(x, y) in on {
            mask.put_pixel(x, y, Luma([255]));
        }
        mask
    }

    #[test]
    fn closing_bridges_short_horizontal_gap() {
        let mask = mask_with(20, 5, &[(5, 2), (6, 2), (11, 2), (12, 2)]);
        let closed = close_rect(&mask, 10, 2);
        for x in 5..=12 {
            assert_eq!(closed.get_pixel(x, 2)[0], 255, "gap not bridged at x={x}");
        }
    }

    #[test]
    fn closing_does_not_bridge_vertical_gap() {
        let mask = mask_with(5, 20, &[(2, 2), (2, 10)]);
        let closed = close_rect(&mask, 10, 2);
        for y in 4..9 {
            assert_eq!(closed.get_pixel(2, y)[0], 0, "lines merged at y={y}");
        }
    }

    #[test]
    fn closing_keeps_single_row_strokes() {
        let mask = mask_with(30, 6, &[(10, 3), (11, 3), (12, 3)]);
        let closed = close_rect(&mask, 10, 2);
        for x in 10..=12 {
            assert_eq!(closed.get_pixel(x, 3)[0], 255, "stroke lost at x={x}");
        }
        assert_eq!(closed.get_pixel(11, 1)[0], 0);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([0, 0, 0, 0]),
        ));
        let luma = to_luma(&image);
        assert!(luma.pixels().all(|pixel| pixel[0] == 255));
    }

    #[test]
    fn prepared_region_is_scaled() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 20, Luma([255])));
        let prepared = prepare_region(&image, &Region::new(5, 5, 10, 6), 2, 5);
        assert_eq!((prepared.width(), prepared.height()), (20, 12));
    }
}
