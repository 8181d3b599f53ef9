use image::RgbaImage;
use rayon::prelude::*;

use crate::io::{EditorError, decode_png, encode_png};

/// Alpha at or below this counts as "nothing painted" (PNG/rounding residue).
pub const EMPTY_ALPHA_THRESHOLD: u8 = 2;

/// Painted mask pixels are opaque white; display recolours them.
pub const MASK_WHITE: [u8; 4] = [255, 255, 255, 255];

// ============================================================================
// COORDINATE MAPPING
// ============================================================================

/// A position in mask pixel space (sub-pixel precision).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Where the source image is currently rendered on screen.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct DisplayRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl DisplayRect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// A rectangle can only be mapped through when it has positive, finite extent.
    pub fn is_valid(&self) -> bool {
        self.w.is_finite() && self.h.is_finite() && self.w > 0.0 && self.h > 0.0
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, sx: f32, sy: f32) -> bool {
        sx >= self.x && sx <= self.x + self.w && sy >= self.y && sy <= self.y + self.h
    }

    /// Linear map from screen space into mask pixel space.
    ///
    /// No clamping: callers check [`is_valid`](Self::is_valid) and
    /// [`contains`](Self::contains) first.
    pub fn to_mask(&self, sx: f32, sy: f32, mask_w: u32, mask_h: u32) -> Point {
        Point {
            x: (sx - self.x) * mask_w as f32 / self.w,
            y: (sy - self.y) * mask_h as f32 / self.h,
        }
    }

    /// Fit an image into `area` preserving its aspect ratio: full width when
    /// it fits, otherwise height-constrained.  Centred horizontally, top aligned.
    pub fn fit(area: DisplayRect, image_w: u32, image_h: u32) -> Option<DisplayRect> {
        if !area.is_valid() || image_w == 0 || image_h == 0 {
            return None;
        }
        let aspect = image_w as f32 / image_h as f32;
        let mut w = area.w;
        let mut h = area.w / aspect;
        if h > area.h {
            h = area.h;
            w = h * aspect;
        }
        Some(DisplayRect {
            x: area.x + (area.w - w) / 2.0,
            y: area.y,
            w,
            h,
        })
    }
}

// ============================================================================
// MASK SURFACE
// ============================================================================

/// The mask itself: an RGBA8 buffer with the source image's native dimensions.
/// Painted pixels are white, the alpha channel carries the mask intensity.
#[derive(Clone)]
pub struct MaskSurface {
    pixels: RgbaImage,
}

impl Default for MaskSurface {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl MaskSurface {
    /// Create a fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// False for the 0×0 surface that exists before any image has loaded.
    pub fn has_area(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub(crate) fn raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        (x < self.width() && y < self.height()).then(|| self.pixels.get_pixel(x, y)[3])
    }

    /// Reallocate to `width × height`, fully transparent.  All prior content is lost.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pixels = RgbaImage::new(width, height);
    }

    /// Reset every pixel to fully transparent.
    pub fn clear(&mut self) {
        let buf: &mut [u8] = &mut self.pixels;
        buf.fill(0);
    }

    /// True iff every pixel's alpha is at or below [`EMPTY_ALPHA_THRESHOLD`].
    pub fn is_empty(&self) -> bool {
        self.is_empty_within(EMPTY_ALPHA_THRESHOLD)
    }

    pub fn is_empty_within(&self, threshold: u8) -> bool {
        self.raw().par_chunks_exact(4).all(|px| px[3] <= threshold)
    }

    /// Draw one round-capped segment of a stroke.
    ///
    /// `from == None` (or equal to `to`) stamps a single dot.  Painting is
    /// source-over opaque white; erasing is destination-out, scaling existing
    /// alpha down by the brush coverage.  Coverage is anti-aliased over one
    /// pixel at the edge.
    pub fn stroke_segment(&mut self, from: Option<Point>, to: Point, radius: f32, erase: bool) {
        if !self.has_area() || !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let start = from.unwrap_or(to);
        let reach = radius + 1.0;

        // Bounding box of the capsule, clipped to the surface.
        let min_x = (start.x.min(to.x) - reach).floor().max(0.0);
        let min_y = (start.y.min(to.y) - reach).floor().max(0.0);
        let max_x = (start.x.max(to.x) + reach).ceil().min(self.width() as f32);
        let max_y = (start.y.max(to.y) + reach).ceil().min(self.height() as f32);
        if min_x >= max_x || min_y >= max_y {
            return;
        }
        let (min_x, min_y, max_x, max_y) = (min_x as u32, min_y as u32, max_x as u32, max_y as u32);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let centre = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let dist = distance_to_segment(centre, start, to);
                let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                let px = self.pixels.get_pixel_mut(x, y);
                if erase {
                    erase_pixel(&mut px.0, coverage);
                } else {
                    paint_pixel(&mut px.0, coverage);
                }
            }
        }
    }

    /// Force every pixel whose `region` byte is non-zero to opaque white.
    /// `region` is a row-major `width × height` mask.
    pub fn fill_region(&mut self, region: &[u8]) {
        let expected = self.width() as usize * self.height() as usize;
        if region.len() != expected {
            log_warn!(
                "fill_region: region of {} bytes does not match {}x{} surface",
                region.len(),
                self.width(),
                self.height()
            );
            return;
        }
        let buf: &mut [u8] = &mut self.pixels;
        buf.par_chunks_exact_mut(4)
            .zip(region.par_iter())
            .for_each(|(px, &m)| {
                if m != 0 {
                    px.copy_from_slice(&MASK_WHITE);
                }
            });
    }

    /// Lossless PNG of the surface at native resolution.
    pub fn serialize(&self) -> Result<Vec<u8>, EditorError> {
        encode_png(&self.pixels)
    }

    /// Replace the surface content with a decoded PNG.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), EditorError> {
        let image = decode_png(bytes)?;
        self.load_image(&image);
        Ok(())
    }

    /// Clear, then copy `image` in at the origin.  Parts outside the surface
    /// are clipped; parts of the surface the image does not cover stay clear.
    pub fn load_image(&mut self, image: &RgbaImage) {
        self.clear();
        let w = self.width().min(image.width()) as usize;
        let h = self.height().min(image.height()) as usize;
        if w == 0 || h == 0 {
            return;
        }
        let dst_stride = self.width() as usize * 4;
        let src_stride = image.width() as usize * 4;
        let src = image.as_raw();
        let dst: &mut [u8] = &mut self.pixels;
        for row in 0..h {
            let d = row * dst_stride;
            let s = row * src_stride;
            dst[d..d + w * 4].copy_from_slice(&src[s..s + w * 4]);
        }
    }
}

/// Shortest distance from `p` to the segment `a`-`b`.
fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len_sq = abx * abx + aby * aby;
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + abx * t, a.y + aby * t))
}

/// Source-over of white at `coverage` onto a straight-alpha pixel.
#[inline]
fn paint_pixel(px: &mut [u8; 4], coverage: f32) {
    let src_a = coverage;
    let dst_a = px[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for c in px.iter_mut().take(3) {
        let v = (255.0 * src_a + *c as f32 * dst_a * (1.0 - src_a)) / out_a;
        *c = v.round().clamp(0.0, 255.0) as u8;
    }
    px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Destination-out: existing alpha is reduced by the brush coverage.
#[inline]
fn erase_pixel(px: &mut [u8; 4], coverage: f32) {
    let a = (px[3] as f32 * (1.0 - coverage)).round() as u8;
    if a == 0 {
        *px = [0, 0, 0, 0];
    } else {
        px[3] = a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painted(surface: &MaskSurface, x: u32, y: u32) -> bool {
        surface.alpha_at(x, y).is_some_and(|a| a > EMPTY_ALPHA_THRESHOLD)
    }

    #[test]
    fn mapping_scales_into_mask_space() {
        let rect = DisplayRect::new(10.0, 20.0, 50.0, 25.0);
        let p = rect.to_mask(35.0, 32.5, 100, 50);
        assert_eq!(p, Point::new(50.0, 25.0));
        assert!(rect.contains(10.0, 20.0));
        assert!(rect.contains(60.0, 45.0));
        assert!(!rect.contains(60.5, 30.0));
        assert!(!DisplayRect::new(0.0, 0.0, 0.0, 10.0).is_valid());
    }

    #[test]
    fn fit_prefers_width_then_height() {
        let area = DisplayRect::new(10.0, 0.0, 200.0, 100.0);
        // Wide image: constrained by width.
        let wide = DisplayRect::fit(area, 400, 100).expect("fits");
        assert_eq!(wide, DisplayRect::new(10.0, 0.0, 200.0, 50.0));
        // Tall image: constrained by height, centred horizontally.
        let tall = DisplayRect::fit(area, 100, 200).expect("fits");
        assert_eq!(tall, DisplayRect::new(85.0, 0.0, 50.0, 100.0));
        assert!(DisplayRect::fit(area, 0, 10).is_none());
    }

    #[test]
    fn dot_is_round_and_opaque_at_centre() {
        let mut s = MaskSurface::new(40, 40);
        s.stroke_segment(None, Point::new(20.0, 20.0), 5.0, false);
        assert_eq!(s.pixels().get_pixel(20, 20).0, MASK_WHITE);
        assert!(painted(&s, 20, 16));
        assert!(!painted(&s, 20, 27));
        // Corner of the bounding square is outside the circle.
        assert!(!painted(&s, 24, 24));
        assert!(!s.is_empty());
    }

    #[test]
    fn drag_path_leaves_no_gaps() {
        let mut s = MaskSurface::new(120, 60);
        let samples = [
            Point::new(5.0, 30.0),
            Point::new(12.0, 26.0),
            Point::new(19.0, 33.0),
            Point::new(31.0, 30.0),
            Point::new(47.0, 10.0),
            Point::new(70.0, 50.0),
            Point::new(110.0, 30.0),
        ];
        let mut last = None;
        for p in samples {
            s.stroke_segment(last, p, 2.0, false);
            last = Some(p);
        }
        for pair in samples.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let steps = (a.distance(b) * 4.0).ceil() as usize;
            for i in 0..=steps {
                let t = i as f32 / steps as f32;
                let x = a.x + (b.x - a.x) * t;
                let y = a.y + (b.y - a.y) * t;
                assert!(painted(&s, x as u32, y as u32), "gap at ({x}, {y})");
            }
        }
    }

    #[test]
    fn erase_subtracts_instead_of_overwriting() {
        let mut s = MaskSurface::new(30, 30);
        s.stroke_segment(None, Point::new(15.0, 15.0), 10.0, false);
        s.stroke_segment(Some(Point::new(5.0, 15.0)), Point::new(25.0, 15.0), 3.0, true);
        assert_eq!(s.alpha_at(15, 15), Some(0));
        assert_eq!(s.pixels().get_pixel(15, 15).0, [0, 0, 0, 0]);
        assert!(painted(&s, 15, 8));

        // Erasing on a blank surface never creates content.
        let mut blank = MaskSurface::new(10, 10);
        blank.stroke_segment(None, Point::new(5.0, 5.0), 4.0, true);
        assert!(blank.is_empty());
    }

    #[test]
    fn emptiness_ignores_residue_up_to_threshold() {
        let mut s = MaskSurface::new(4, 4);
        let mut img = RgbaImage::new(4, 4);
        img.put_pixel(2, 2, image::Rgba([255, 255, 255, EMPTY_ALPHA_THRESHOLD]));
        s.load_image(&img);
        assert!(s.is_empty());
        img.put_pixel(3, 3, image::Rgba([255, 255, 255, EMPTY_ALPHA_THRESHOLD + 1]));
        s.load_image(&img);
        assert!(!s.is_empty());
        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn load_replaces_rather_than_blends() {
        let mut s = MaskSurface::new(8, 8);
        s.stroke_segment(None, Point::new(1.0, 1.0), 3.0, false);
        let mut other = MaskSurface::new(8, 8);
        other.stroke_segment(None, Point::new(6.0, 6.0), 1.0, false);
        let bytes = other.serialize().expect("serialize");
        s.load(&bytes).expect("load");
        assert_eq!(s.pixels().as_raw(), other.pixels().as_raw());
    }

    #[test]
    fn load_clips_larger_images_and_clears_the_rest() {
        let mut s = MaskSurface::new(4, 4);
        s.fill_region(&[1; 16]);
        let mut big = RgbaImage::new(6, 2);
        big.put_pixel(3, 1, image::Rgba(MASK_WHITE));
        big.put_pixel(5, 1, image::Rgba(MASK_WHITE));
        s.load_image(&big);
        assert_eq!(s.alpha_at(3, 1), Some(255));
        assert_eq!(s.alpha_at(0, 0), Some(0));
        assert_eq!(s.alpha_at(3, 3), Some(0));
    }

    #[test]
    fn resize_clears_and_zero_size_is_inert() {
        let mut s = MaskSurface::new(10, 10);
        s.stroke_segment(None, Point::new(5.0, 5.0), 3.0, false);
        s.resize(12, 7);
        assert_eq!(s.dimensions(), (12, 7));
        assert!(s.is_empty());

        let mut zero = MaskSurface::default();
        zero.stroke_segment(None, Point::new(0.0, 0.0), 5.0, false);
        assert!(!zero.has_area());
        assert!(zero.is_empty());
        assert!(zero.serialize().is_err());
    }

    #[test]
    fn fill_region_rejects_mismatched_masks() {
        let mut s = MaskSurface::new(3, 3);
        s.fill_region(&[1; 4]);
        assert!(s.is_empty());
        s.fill_region(&[0, 0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(s.alpha_at(1, 1), Some(255));
        assert_eq!(s.alpha_at(0, 0), Some(0));
    }
}
