//! Pixel-level diff primitive
//!
//! Perceptual comparison of two equal-sized RGBA buffers in the YIQ
//! color space, with optional anti-alias detection. Semi-transparent
//! pixels are blended onto white before comparison. The optional output
//! buffer receives the rendered diff image: unchanged pixels as a faded
//! grayscale of the first image (or fully transparent in mask mode),
//! anti-aliased pixels in `aa_color`, and differing pixels in
//! `diff_color` / `diff_color_alt`.

use crate::error::{Error, Result};
use crate::DiffOptions;

// Largest possible YIQ delta between pure black and pure white.
const MAX_YIQ_DELTA: f64 = 35215.0;

// Byte offset of pixel (x, y); computed in usize so huge images cannot
// overflow 32-bit arithmetic.
fn pixel_pos(x: u32, y: u32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

/// Compare two RGBA buffers of `width * height` pixels.
///
/// Returns the number of mismatching pixels. `output`, when provided,
/// must be the same size as the inputs and is overwritten with the diff
/// image.
pub fn diff(
    img1: &[u8],
    img2: &[u8],
    mut output: Option<&mut [u8]>,
    width: u32,
    height: u32,
    options: &DiffOptions,
) -> Result<u64> {
    let len = width as usize * height as usize * 4;
    if img1.len() != len || img2.len() != len {
        return Err(Error::Image(format!(
            "buffer sizes do not match {width}x{height} RGBA"
        )));
    }
    if let Some(out) = output.as_deref() {
        if out.len() != len {
            return Err(Error::Image(
                "output buffer size does not match the inputs".into(),
            ));
        }
    }

    let max_delta = MAX_YIQ_DELTA * options.sensitivity * options.sensitivity;
    let mut mismatched = 0u64;

    for y in 0..height {
        for x in 0..width {
            let pos = pixel_pos(x, y, width);
            let delta = color_delta(img1, img2, pos, pos, false);

            if delta.abs() > max_delta {
                let aa = !options.include_aa
                    && (antialiased(img1, x, y, width, height, img2)
                        || antialiased(img2, x, y, width, height, img1));
                if aa {
                    if let Some(out) = output.as_deref_mut() {
                        if !options.diff_mask {
                            draw_pixel(out, pos, options.aa_color);
                        }
                    }
                } else {
                    if let Some(out) = output.as_deref_mut() {
                        let color = match options.diff_color_alt {
                            Some(alt) if delta < 0.0 => alt,
                            _ => options.diff_color,
                        };
                        draw_pixel(out, pos, color);
                    }
                    mismatched += 1;
                }
            } else if let Some(out) = output.as_deref_mut() {
                if !options.diff_mask {
                    draw_gray_pixel(img1, pos, options.alpha, out);
                }
            }
        }
    }

    Ok(mismatched)
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

// Blend a channel onto a white background by the pixel's alpha.
fn blend(channel: f64, alpha: f64) -> f64 {
    255.0 + (channel - 255.0) * alpha
}

/// Perceptual distance between the pixels at `pos1`/`pos2`. The sign
/// encodes brightness direction: negative when the first pixel is the
/// brighter one. `y_only` returns the plain brightness delta instead.
fn color_delta(img1: &[u8], img2: &[u8], pos1: usize, pos2: usize, y_only: bool) -> f64 {
    let (mut r1, mut g1, mut b1, a1) = (
        img1[pos1] as f64,
        img1[pos1 + 1] as f64,
        img1[pos1 + 2] as f64,
        img1[pos1 + 3] as f64,
    );
    let (mut r2, mut g2, mut b2, a2) = (
        img2[pos2] as f64,
        img2[pos2 + 1] as f64,
        img2[pos2 + 2] as f64,
        img2[pos2 + 3] as f64,
    );

    if a1 == a2 && r1 == r2 && g1 == g2 && b1 == b2 {
        return 0.0;
    }

    if a1 < 255.0 {
        let a = a1 / 255.0;
        r1 = blend(r1, a);
        g1 = blend(g1, a);
        b1 = blend(b1, a);
    }
    if a2 < 255.0 {
        let a = a2 / 255.0;
        r2 = blend(r2, a);
        g2 = blend(g2, a);
        b2 = blend(b2, a);
    }

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

/// Anti-aliasing heuristic: a pixel counts as anti-aliased when it has
/// both a darker and a brighter neighbor, at most two identical
/// neighbors, and either extreme neighbor sits in a flat region of both
/// images.
fn antialiased(img: &[u8], x1: u32, y1: u32, width: u32, height: u32, img2: &[u8]) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = pixel_pos(x1, y1, width);

    let mut zeroes = usize::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.0f64;
    let mut max = 0.0f64;
    let mut min_at = (0u32, 0u32);
    let mut max_at = (0u32, 0u32);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let delta = color_delta(img, img, pos, pixel_pos(x, y, width), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (x, y);
            } else if delta > max {
                max = delta;
                max_at = (x, y);
            }
        }
    }

    // No darker or no brighter neighbor: not anti-aliasing.
    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_at.0, min_at.1, width, height)
        && has_many_siblings(img2, min_at.0, min_at.1, width, height))
        || (has_many_siblings(img, max_at.0, max_at.1, width, height)
            && has_many_siblings(img2, max_at.0, max_at.1, width, height))
}

// More than two neighbors identical to the pixel itself.
fn has_many_siblings(img: &[u8], x1: u32, y1: u32, width: u32, height: u32) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = pixel_pos(x1, y1, width);

    let mut zeroes = usize::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let pos2 = pixel_pos(x, y, width);
            if img[pos] == img[pos2]
                && img[pos + 1] == img[pos2 + 1]
                && img[pos + 2] == img[pos2 + 2]
                && img[pos + 3] == img[pos2 + 3]
            {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}

fn draw_pixel(output: &mut [u8], pos: usize, [r, g, b]: [u8; 3]) {
    output[pos] = r;
    output[pos + 1] = g;
    output[pos + 2] = b;
    output[pos + 3] = 255;
}

fn draw_gray_pixel(img: &[u8], pos: usize, alpha: f64, output: &mut [u8]) {
    let y = rgb2y(img[pos] as f64, img[pos + 1] as f64, img[pos + 2] as f64);
    let val = blend(y, alpha * img[pos + 3] as f64 / 255.0);
    let val = val.clamp(0.0, 255.0) as u8;
    draw_pixel(output, pos, [val, val, val]);
}
