// ============================================================================
// FLOOD FILL: seed fill bounded by near-white pixels, plus 1px dilation
// ============================================================================

use rayon::prelude::*;

use crate::canvas::MaskSurface;

/// R, G and B all at or above this make a pixel a fill boundary.
pub const BOUNDARY_THRESHOLD: u8 = 250;

#[inline(always)]
fn is_boundary_px(raw: &[u8], idx: usize) -> bool {
    let o = idx * 4;
    raw[o] >= BOUNDARY_THRESHOLD
        && raw[o + 1] >= BOUNDARY_THRESHOLD
        && raw[o + 2] >= BOUNDARY_THRESHOLD
}

/// True when `(x, y)` lies outside the surface or is already a boundary pixel,
/// i.e. a fill seeded there would change nothing.
pub fn seed_is_boundary(surface: &MaskSurface, x: u32, y: u32) -> bool {
    let (w, h) = surface.dimensions();
    if x >= w || y >= h {
        return true;
    }
    is_boundary_px(surface.raw(), y as usize * w as usize + x as usize)
}

/// Pixels a fill seeded at `(x, y)` would reach, as a `width × height` byte
/// mask (255 = reached).  Boundary pixels adjacent to the region are included
/// but never expanded from.  Returns `None` for a boundary or out-of-range seed.
pub fn fill_region_from(surface: &MaskSurface, x: u32, y: u32) -> Option<Vec<u8>> {
    if seed_is_boundary(surface, x, y) {
        return None;
    }
    let (w, h) = surface.dimensions();
    let wu = w as usize;
    let raw = surface.raw();

    // mask doubles as the visited array and the output
    let mut mask = vec![0u8; wu * h as usize];

    // DFS stack of packed flat indices.
    let mut stack: Vec<u32> = Vec::with_capacity(4096);
    let seed = y as usize * wu + x as usize;
    mask[seed] = 255;
    stack.push(seed as u32);

    while let Some(idx) = stack.pop() {
        let idx = idx as usize;
        // Boundary pixels get painted but stop the spread.
        if is_boundary_px(raw, idx) {
            continue;
        }
        let px = (idx % wu) as u32;
        let py = (idx / wu) as u32;

        if px > 0 && mask[idx - 1] == 0 {
            mask[idx - 1] = 255;
            stack.push((idx - 1) as u32);
        }
        if px + 1 < w && mask[idx + 1] == 0 {
            mask[idx + 1] = 255;
            stack.push((idx + 1) as u32);
        }
        if py > 0 && mask[idx - wu] == 0 {
            mask[idx - wu] = 255;
            stack.push((idx - wu) as u32);
        }
        if py + 1 < h && mask[idx + wu] == 0 {
            mask[idx + wu] = 255;
            stack.push((idx + wu) as u32);
        }
    }

    Some(mask)
}

/// Grow a fill mask by one pixel in the four axis directions.
/// Closes the seams anti-aliased edges leave between the fill and a boundary.
pub fn dilate4(mask: &[u8], width: u32, height: u32) -> Vec<u8> {
    let wu = width as usize;
    let hu = height as usize;
    let mut out = vec![0u8; mask.len()];
    out.par_chunks_mut(wu).enumerate().for_each(|(y, row)| {
        for (x, cell) in row.iter_mut().enumerate() {
            let i = y * wu + x;
            let hit = mask[i] != 0
                || (x > 0 && mask[i - 1] != 0)
                || (x + 1 < wu && mask[i + 1] != 0)
                || (y > 0 && mask[i - wu] != 0)
                || (y + 1 < hu && mask[i + wu] != 0);
            if hit {
                *cell = 255;
            }
        }
    });
    out
}

/// Flood fill the surface from `(x, y)` with opaque white.
///
/// Returns `false` (and leaves the surface untouched) when the seed is a
/// boundary pixel or outside the surface.
pub fn flood_fill(surface: &mut MaskSurface, x: u32, y: u32) -> bool {
    let Some(region) = fill_region_from(surface, x, y) else {
        return false;
    };
    let (w, h) = surface.dimensions();
    let grown = dilate4(&region, w, h);
    surface.fill_region(&grown);
    true
}
