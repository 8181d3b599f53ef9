use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::MaskSurface;

/// Overlay colour for painted mask pixels.
pub const PREVIEW_TINT: [u8; 3] = [255, 0, 0];

/// Composite the mask over `image` as a red tint.
///
/// Each image pixel is blended toward [`PREVIEW_TINT`] by `mask alpha * opacity`;
/// the image's own alpha is kept.  A mask with other dimensions is sampled
/// nearest-neighbour, an empty one leaves the image untouched.
pub fn compose_preview(image: &RgbaImage, mask: &MaskSurface, opacity: f32) -> RgbaImage {
    let mut out = image.clone();
    let (iw, ih) = image.dimensions();
    let (mw, mh) = mask.dimensions();
    if iw == 0 || ih == 0 || mw == 0 || mh == 0 {
        return out;
    }
    let opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 1.0 };
    let mask_raw = mask.raw();
    let same_size = (iw, ih) == (mw, mh);

    let row_bytes = iw as usize * 4;
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_mut(row_bytes).enumerate().for_each(|(y, row)| {
        let my = if same_size { y } else { (y as u64 * mh as u64 / ih as u64) as usize };
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let mx = if same_size { x } else { (x as u64 * mw as u64 / iw as u64) as usize };
            let ma = mask_raw[(my * mw as usize + mx) * 4 + 3];
            if ma == 0 {
                continue;
            }
            let a = ma as f32 / 255.0 * opacity;
            for c in 0..3 {
                let blended = px[c] as f32 * (1.0 - a) + PREVIEW_TINT[c] as f32 * a;
                px[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Point;
    use image::Rgba;

    #[test]
    fn painted_pixels_are_tinted_by_opacity() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255]));
        let mut mask = MaskSurface::new(10, 10);
        mask.stroke_segment(None, Point::new(2.0, 2.0), 2.0, false);

        let out = compose_preview(&image, &mask, 0.5);
        let tinted = out.get_pixel(2, 2);
        assert_eq!(tinted.0, [128, 0, 128, 255]);
        assert_eq!(out.get_pixel(9, 9), image.get_pixel(9, 9));
    }

    #[test]
    fn empty_or_zero_size_mask_is_a_passthrough() {
        let image = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 200]));
        assert_eq!(compose_preview(&image, &MaskSurface::new(4, 3), 1.0), image);
        assert_eq!(compose_preview(&image, &MaskSurface::default(), 1.0), image);
    }

    #[test]
    fn mismatched_mask_is_scaled_to_the_image() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let mut mask = MaskSurface::new(4, 4);
        crate::ops::fill::flood_fill(&mut mask, 0, 0);
        let out = compose_preview(&image, &mask, 1.0);
        assert!(out.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    }
}
