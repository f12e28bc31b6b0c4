//! Raster decoding and Otsu binarization with polarity normalization.

use crate::{Result, XenoglyphError};
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;

/// Decode an encoded raster (PNG, JPEG, ...) and binarize it.
///
/// The result holds only `0` and `255`, and the majority class is always
/// bright, so a drawing and its negative binarize to the same image.
pub fn binarize(bytes: &[u8]) -> Result<GrayImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| XenoglyphError::Decode(e.to_string()))?;
    let gray = image.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(XenoglyphError::Decode("image has no pixels".into()));
    }
    Ok(binarize_gray(&gray))
}

/// Otsu threshold followed by polarity normalization.
pub fn binarize_gray(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    let mut binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    if is_minority_bright(&binary) {
        image::imageops::invert(&mut binary);
    }
    binary
}

/// Invert a grayscale template in place if its Otsu foreground is the
/// minority, so templates share the polarity the binarizer produces.
pub fn normalize_template_polarity(template: &mut GrayImage) -> bool {
    if template.width() == 0 || template.height() == 0 {
        return false;
    }
    let level = otsu_level(template);
    let bright = template.pixels().filter(|p| p.0[0] > level).count();
    let total = template.width() as usize * template.height() as usize;
    if 2 * bright < total {
        image::imageops::invert(template);
        true
    } else {
        false
    }
}

fn is_minority_bright(binary: &GrayImage) -> bool {
    let total = binary.width() as usize * binary.height() as usize;
    2 * bright_count(binary) < total
}

fn bright_count(binary: &GrayImage) -> usize {
    binary.pixels().filter(|p| p.0[0] > 0).count()
}
