//! Image reconciliation
//!
//! Makes the pixel-diff primitive robust to expected/actual images of
//! different pixel dimensions. A baseline captured at a different
//! resolution than the current output is a real occurrence and must
//! contribute a proportionate difference, not a hard failure and not a
//! silent pass.

use std::borrow::Cow;

use image::RgbaImage;

use crate::error::Result;
use crate::pixel;
use crate::DiffOptions;

/// Outcome of comparing one page pair
pub struct Comparison {
    /// Number of mismatched pixels, including the uncovered area penalty
    pub diff: u64,
    /// Total compared pixel area: the larger bounding box of the two
    pub dimension: u64,
    /// Rendered diff image over the overlapping region
    pub image: RgbaImage,
}

/// Compare two RGBA images, reconciling differing dimensions.
///
/// Equal dimensions compare directly. Otherwise both images are clipped
/// to `min(width) x min(height)` from the origin, the primitive runs on
/// the overlap, and every pixel of the non-overlapping bounding-box area
/// counts as mismatched. The ratio denominator is always
/// `max(width) * max(height)`, so ratios stay comparable across
/// differently sized pairs.
pub fn compare_images(
    expected: &RgbaImage,
    actual: &RgbaImage,
    options: &DiffOptions,
) -> Result<Comparison> {
    let (wa, ha) = expected.dimensions();
    let (wb, hb) = actual.dimensions();

    let mut width = wb;
    let mut height = hb;
    let mut dimension = u64::from(width) * u64::from(height);
    let mut diff = 0u64;

    let (data_a, data_b): (Cow<'_, [u8]>, Cow<'_, [u8]>) = if (wa, ha) != (wb, hb) {
        width = wa.min(wb);
        height = ha.min(hb);
        dimension = u64::from(wa.max(wb)) * u64::from(ha.max(hb));
        diff += dimension - u64::from(width) * u64::from(height);
        (
            Cow::Owned(clip(expected, width, height)),
            Cow::Owned(clip(actual, width, height)),
        )
    } else {
        (
            Cow::Borrowed(expected.as_raw().as_slice()),
            Cow::Borrowed(actual.as_raw().as_slice()),
        )
    };

    let mut out = vec![0u8; data_a.len()];
    diff += pixel::diff(&data_a, &data_b, Some(&mut out), width, height, options)?;

    let image = RgbaImage::from_raw(width, height, out)
        .unwrap_or_else(|| RgbaImage::new(width, height));

    Ok(Comparison {
        diff,
        dimension,
        image,
    })
}

/// Clip an image to `width x height` from the origin.
///
/// Source and destination strides differ, so each row copies only its
/// leading `width` pixels; a flat memory slice would shear the image.
fn clip(img: &RgbaImage, width: u32, height: u32) -> Vec<u8> {
    let src = img.as_raw();
    let src_stride = img.width() as usize * 4;
    let dst_stride = width as usize * 4;

    let mut data = vec![0u8; dst_stride * height as usize];
    let mut s = 0;
    let mut d = 0;
    for _ in 0..height {
        data[d..d + dst_stride].copy_from_slice(&src[s..s + dst_stride]);
        s += src_stride;
        d += dst_stride;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    #[test]
    fn equal_images_compare_clean() {
        let a = solid(10, 10, [0, 0, 0, 255]);
        let res = compare_images(&a, &a, &DiffOptions::default()).unwrap();
        assert_eq!(res.diff, 0);
        assert_eq!(res.dimension, 100);
        assert_eq!(res.image.dimensions(), (10, 10));
    }

    #[test]
    fn dimension_mismatch_pays_the_uncovered_area() {
        // identical overlapping pixels, but a 20-pixel strip is uncovered
        let expected = solid(10, 10, [0, 0, 0, 255]);
        let actual = solid(10, 8, [0, 0, 0, 255]);
        let res = compare_images(&expected, &actual, &DiffOptions::default()).unwrap();
        assert_eq!(res.dimension, 100);
        assert_eq!(res.diff, 20);
        assert_eq!(res.image.dimensions(), (10, 8));
    }

    #[test]
    fn mismatch_in_the_overlap_adds_to_the_penalty() {
        let expected = solid(4, 4, [0, 0, 0, 255]);
        let actual = solid(4, 3, [255, 255, 255, 255]);
        let res = compare_images(&expected, &actual, &DiffOptions::default()).unwrap();
        assert_eq!(res.dimension, 16);
        // 4 uncovered + 12 differing overlap pixels
        assert_eq!(res.diff, 16);
    }

    #[test]
    fn clip_copies_scanlines_not_a_flat_slice() {
        // left column red, rest blue; clipping must keep rows aligned
        let mut img = solid(4, 3, [0, 0, 255, 255]);
        for y in 0..3 {
            img.put_pixel(0, y, Rgba([255, 0, 0, 255]));
        }
        let data = clip(&img, 2, 3);
        assert_eq!(data.len(), 2 * 3 * 4);
        for y in 0..3 {
            let row = &data[y * 8..y * 8 + 8];
            assert_eq!(&row[0..4], &[255, 0, 0, 255]);
            assert_eq!(&row[4..8], &[0, 0, 255, 255]);
        }
    }
}
