// ============================================================================
// MASK EXPORT: source image + stored mask -> image/mask pair for inpainting
// ============================================================================
//
// The mask comes from, in order of preference:
//   1. the stored mask PNG (its alpha, or luma when opaque), scaled to the image
//   2. the source image's own transparency, inverted (transparent = masked)
//   3. nothing: an all-zero mask
//
// Image and mask are then resized together so they stay pixel aligned.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, RgbaImage};

use crate::io::EditorError;

/// Resampling filter used when the export size differs from the source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeFilter {
    NearestExact,
    Bilinear,
    /// Box average.  Only meaningful when shrinking; enlarging falls back to bilinear.
    Area,
    #[default]
    Bicubic,
    Lanczos,
}

impl ResizeFilter {
    pub const ALL: [ResizeFilter; 5] = [
        ResizeFilter::NearestExact,
        ResizeFilter::Bilinear,
        ResizeFilter::Area,
        ResizeFilter::Bicubic,
        ResizeFilter::Lanczos,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResizeFilter::NearestExact => "nearest-exact",
            ResizeFilter::Bilinear => "bilinear",
            ResizeFilter::Area => "area",
            ResizeFilter::Bicubic => "bicubic",
            ResizeFilter::Lanczos => "lanczos",
        }
    }

    /// Unknown names resolve to bicubic.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name.trim()))
            .unwrap_or_default()
    }

    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::NearestExact => FilterType::Nearest,
            ResizeFilter::Bilinear | ResizeFilter::Area => FilterType::Triangle,
            ResizeFilter::Bicubic => FilterType::CatmullRom,
            ResizeFilter::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// How the source aspect ratio is reconciled with the target size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeepProportion {
    /// Scale each axis independently.
    #[default]
    Stretch,
    /// Scale to cover the target, then cut the overhang.
    Crop,
    /// Scale to fit inside the target, then centre on black.
    Pad,
}

impl KeepProportion {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stretch" => Some(KeepProportion::Stretch),
            "crop" => Some(KeepProportion::Crop),
            "pad" => Some(KeepProportion::Pad),
            _ => None,
        }
    }
}

/// Which part of a cover-scaled image survives a [`KeepProportion::Crop`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CropPosition {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

impl CropPosition {
    /// Unknown names resolve to centre.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "top" => CropPosition::Top,
            "bottom" => CropPosition::Bottom,
            "left" => CropPosition::Left,
            "right" => CropPosition::Right,
            _ => CropPosition::Center,
        }
    }

    /// Top-left corner of a `tw x th` window inside a `w x h` image.
    fn offset(self, w: u32, h: u32, tw: u32, th: u32) -> (u32, u32) {
        let (free_x, free_y) = (w - tw, h - th);
        match self {
            CropPosition::Center => (free_x / 2, free_y / 2),
            CropPosition::Top => (free_x / 2, 0),
            CropPosition::Bottom => (free_x / 2, free_y),
            CropPosition::Left => (0, free_y / 2),
            CropPosition::Right => (free_x, free_y / 2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub width: u32,
    pub height: u32,
    pub filter: ResizeFilter,
    pub keep_proportion: KeepProportion,
    pub crop_position: CropPosition,
    /// Output dimensions are rounded down to a multiple of this.
    pub divisible_by: u32,
}

impl ExportOptions {
    /// Export at the source resolution, untouched.
    pub fn native(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: ResizeFilter::default(),
            keep_proportion: KeepProportion::Stretch,
            crop_position: CropPosition::Center,
            divisible_by: 1,
        }
    }

    /// Requested size after `divisible_by` rounding, never below one step.
    pub fn target_size(&self) -> (u32, u32) {
        let d = self.divisible_by.max(1);
        ((self.width / d).max(1) * d, (self.height / d).max(1) * d)
    }
}

/// Reduce a stored mask to one channel.  Masks with alpha use it directly;
/// opaque greyscale masks (hand-made or from other tools) use their luma.
pub fn mask_channel(mask: &DynamicImage) -> GrayImage {
    if mask.color().has_alpha() {
        let rgba = mask.to_rgba8();
        GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| Luma([rgba.get_pixel(x, y)[3]]))
    } else {
        mask.to_luma8()
    }
}

/// Scale to `width x height` with bilinear filtering.  A no-op when the size
/// already matches.
pub fn fit_mask(mask: GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) || width == 0 || height == 0 {
        return mask;
    }
    imageops::resize(&mask, width, height, FilterType::Triangle)
}

/// The mask belonging to `image` at its resolution.  `stored` is the PNG
/// behind the mask handle, if there is one.
pub fn source_mask(image: &RgbaImage, stored: Option<&[u8]>) -> Result<GrayImage, EditorError> {
    let (w, h) = image.dimensions();
    if let Some(bytes) = stored {
        let decoded = image::load_from_memory(bytes)?;
        return Ok(fit_mask(mask_channel(&decoded), w, h));
    }
    // Opaque sources have alpha 255 everywhere and so yield an empty mask.
    Ok(GrayImage::from_fn(w, h, |x, y| Luma([255 - image.get_pixel(x, y)[3]])))
}

fn scale_pair(image: &RgbImage, mask: &GrayImage, w: u32, h: u32, filter: ResizeFilter) -> (RgbImage, GrayImage) {
    if image.dimensions() == (w, h) {
        return (image.clone(), mask.clone());
    }
    let shrinking = w <= image.width() && h <= image.height();
    if filter == ResizeFilter::Area && shrinking {
        return (imageops::thumbnail(image, w, h), imageops::thumbnail(mask, w, h));
    }
    let ft = filter.filter_type();
    (imageops::resize(image, w, h, ft), imageops::resize(mask, w, h, ft))
}

/// Bring an aligned image/mask pair to the size `opts` asks for.
pub fn apply_resize(image: RgbImage, mask: GrayImage, opts: &ExportOptions) -> (RgbImage, GrayImage) {
    let (tw, th) = opts.target_size();
    let (ow, oh) = image.dimensions();
    if ow == 0 || oh == 0 {
        return (image, mask);
    }
    let (rx, ry) = (tw as f64 / ow as f64, th as f64 / oh as f64);

    match opts.keep_proportion {
        KeepProportion::Stretch => scale_pair(&image, &mask, tw, th, opts.filter),
        KeepProportion::Crop => {
            let ratio = rx.max(ry);
            let nw = ((ow as f64 * ratio) as u32).max(tw);
            let nh = ((oh as f64 * ratio) as u32).max(th);
            let (image, mask) = scale_pair(&image, &mask, nw, nh, opts.filter);
            let (left, top) = opts.crop_position.offset(nw, nh, tw, th);
            (
                imageops::crop_imm(&image, left, top, tw, th).to_image(),
                imageops::crop_imm(&mask, left, top, tw, th).to_image(),
            )
        }
        KeepProportion::Pad => {
            let ratio = rx.min(ry);
            let nw = ((ow as f64 * ratio) as u32).clamp(1, tw);
            let nh = ((oh as f64 * ratio) as u32).clamp(1, th);
            let (image, mask) = scale_pair(&image, &mask, nw, nh, opts.filter);
            let (left, top) = (((tw - nw) / 2) as i64, ((th - nh) / 2) as i64);
            let mut canvas = RgbImage::new(tw, th);
            let mut mask_canvas = GrayImage::new(tw, th);
            imageops::replace(&mut canvas, &image, left, top);
            imageops::replace(&mut mask_canvas, &mask, left, top);
            (canvas, mask_canvas)
        }
    }
}

/// Produce the RGB image and single-channel mask an inpainting consumer
/// expects, both at the size `opts` asks for.
pub fn export(
    image: &RgbaImage,
    stored: Option<&[u8]>,
    opts: &ExportOptions,
) -> Result<(RgbImage, GrayImage), EditorError> {
    let mask = source_mask(image, stored)?;
    let rgb = RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        Rgb([p[0], p[1], p[2]])
    });
    Ok(apply_resize(rgb, mask, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{MaskSurface, Point};
    use image::Rgba;

    fn opaque(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 100, 50, 255]))
    }

    #[test]
    fn stored_alpha_masks_export_their_alpha() {
        let mut surface = MaskSurface::new(20, 20);
        surface.stroke_segment(None, Point::new(10.0, 10.0), 4.0, false);
        let png = surface.serialize().expect("encode");
        let mask = source_mask(&opaque(20, 20), Some(&png)).expect("export");
        assert_eq!(mask.get_pixel(10, 10)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn opaque_masks_fall_back_to_luma() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(1, 0, Rgb([255, 255, 255]));
        let mask = mask_channel(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(mask.as_raw(), &vec![0, 255]);
    }

    #[test]
    fn stored_masks_are_scaled_to_the_image() {
        let small = GrayImage::from_pixel(4, 4, Luma([255]));
        let big = fit_mask(small, 16, 8);
        assert_eq!(big.dimensions(), (16, 8));
        assert!(big.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn without_a_stored_mask_transparency_becomes_the_mask() {
        let mut image = opaque(2, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let mask = source_mask(&image, None).expect("mask");
        assert_eq!(mask.as_raw(), &vec![255, 0]);
        let mask = source_mask(&opaque(3, 3), None).expect("mask");
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn names_resolve_with_bicubic_and_center_defaults() {
        assert_eq!(ResizeFilter::from_name("lanczos"), ResizeFilter::Lanczos);
        assert_eq!(ResizeFilter::from_name("Nearest-Exact"), ResizeFilter::NearestExact);
        assert_eq!(ResizeFilter::from_name("sinc"), ResizeFilter::Bicubic);
        assert_eq!(CropPosition::from_name("bottom"), CropPosition::Bottom);
        assert_eq!(CropPosition::from_name("middle"), CropPosition::Center);
        assert_eq!(KeepProportion::from_name("pad"), Some(KeepProportion::Pad));
        assert_eq!(KeepProportion::from_name("fit"), None);
    }

    #[test]
    fn divisible_by_rounds_down() {
        let mut opts = ExportOptions::native(723, 1281);
        opts.divisible_by = 8;
        assert_eq!(opts.target_size(), (720, 1280));
        opts.width = 3;
        assert_eq!(opts.target_size(), (8, 1280));
        opts.divisible_by = 0;
        assert_eq!(opts.target_size(), (3, 1281));
    }

    #[test]
    fn native_export_is_untouched() {
        let image = opaque(5, 3);
        let (rgb, mask) = export(&image, None, &ExportOptions::native(5, 3)).expect("export");
        assert_eq!(rgb.dimensions(), (5, 3));
        assert_eq!(rgb.get_pixel(4, 2), &Rgb([200, 100, 50]));
        assert_eq!(mask.dimensions(), (5, 3));
    }

    #[test]
    fn stretch_ignores_aspect() {
        let opts = ExportOptions {
            filter: ResizeFilter::NearestExact,
            ..ExportOptions::native(8, 2)
        };
        let (rgb, mask) = apply_resize(RgbImage::new(4, 4), GrayImage::new(4, 4), &opts);
        assert_eq!(rgb.dimensions(), (8, 2));
        assert_eq!(mask.dimensions(), (8, 2));
    }

    /// 4x2 mask with the left half set.
    fn left_half() -> (RgbImage, GrayImage) {
        let mask = GrayImage::from_fn(4, 2, |x, _| Luma([if x < 2 { 255 } else { 0 }]));
        (RgbImage::new(4, 2), mask)
    }

    #[test]
    fn crop_keeps_the_requested_side() {
        let mut opts = ExportOptions {
            filter: ResizeFilter::NearestExact,
            keep_proportion: KeepProportion::Crop,
            ..ExportOptions::native(2, 2)
        };
        let (image, mask) = left_half();
        opts.crop_position = CropPosition::Left;
        let (rgb, left) = apply_resize(image.clone(), mask.clone(), &opts);
        assert_eq!(rgb.dimensions(), (2, 2));
        assert!(left.pixels().all(|p| p[0] == 255));

        opts.crop_position = CropPosition::Right;
        let (_, right) = apply_resize(image, mask, &opts);
        assert!(right.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn pad_centres_on_black() {
        let opts = ExportOptions {
            filter: ResizeFilter::NearestExact,
            keep_proportion: KeepProportion::Pad,
            ..ExportOptions::native(4, 4)
        };
        let image = RgbImage::from_pixel(4, 2, Rgb([255, 255, 255]));
        let mask = GrayImage::from_pixel(4, 2, Luma([255]));
        let (rgb, mask) = apply_resize(image, mask, &opts);
        assert_eq!(rgb.dimensions(), (4, 4));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(0, 1), &Rgb([255, 255, 255]));
        assert_eq!(mask.get_pixel(3, 2)[0], 255);
        assert_eq!(mask.get_pixel(3, 3)[0], 0);
    }

    #[test]
    fn area_shrinks_by_averaging() {
        let opts = ExportOptions {
            filter: ResizeFilter::Area,
            ..ExportOptions::native(1, 1)
        };
        let mask = GrayImage::from_fn(2, 2, |x, _| Luma([if x == 0 { 200 } else { 0 }]));
        let (_, mask) = apply_resize(RgbImage::new(2, 2), mask, &opts);
        assert_eq!(mask.dimensions(), (1, 1));
        assert!((90..=110).contains(&mask.get_pixel(0, 0)[0]));
    }
}
