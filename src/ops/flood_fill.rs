// ============================================================================
// FLOOD FILL - boundary-aware scanline fill against the processing surface
// ============================================================================

use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::canvas::{PixelRect, Surface};
use crate::components::colors::Rgb;

/// Pixels with every RGB channel below this block propagation.
pub const BOUNDARY_THRESHOLD: u8 = 80;

/// Minimum spacing between two accepted fill requests.
pub const FILL_DEBOUNCE: Duration = Duration::from_millis(500);

/// An immutable filled area: colour, unordered point list and bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct FillRegion {
    color: Rgb,
    points: Vec<(u32, u32)>,
    bounds: PixelRect,
}

impl FillRegion {
    pub fn new(color: Rgb, points: Vec<(u32, u32)>, bounds: PixelRect) -> Self {
        Self { color, points, bounds }
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn points(&self) -> &[(u32, u32)] {
        &self.points
    }

    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Write the region's colour at `alpha` over every point, replacing
    /// whatever the surface held there.
    pub fn paint_onto(&self, surface: &mut Surface, alpha: u8) {
        let px = self.color.to_rgba(alpha);
        for &(x, y) in &self.points {
            if x < surface.width() && y < surface.height() {
                surface.put_pixel(x, y, px);
            }
        }
    }

    /// How many points would change if painted opaque onto `surface`.
    pub fn changed_pixels(&self, surface: &Surface) -> usize {
        let px = self.color.to_rgba(255);
        self.points
            .iter()
            .filter(|&&(x, y)| {
                x < surface.width() && y < surface.height() && surface.get_pixel(x, y) != px
            })
            .count()
    }

    pub fn memory_bytes(&self) -> usize {
        self.points.len() * std::mem::size_of::<(u32, u32)>()
    }
}

#[inline(always)]
pub fn is_boundary(px: [u8; 4], threshold: u8) -> bool {
    px[0] < threshold && px[1] < threshold && px[2] < threshold
}

// ============================================================================
// BOUNDARY MAP - cached view of the processing surface
// ============================================================================

/// Per-pixel "blocks the fill" flags derived from the processing surface,
/// tagged with the surface generation they were derived from.
#[derive(Clone, Debug)]
pub struct BoundaryMap {
    width: u32,
    height: u32,
    threshold: u8,
    blocked: Vec<bool>,
    generation: u64,
}

impl BoundaryMap {
    pub fn build(processing: &Surface, threshold: u8) -> Self {
        let blocked = processing
            .as_raw()
            .par_chunks_exact(4)
            .map(|px| is_boundary([px[0], px[1], px[2], px[3]], threshold))
            .collect();
        Self {
            width: processing.width(),
            height: processing.height(),
            threshold,
            blocked,
            generation: processing.generation(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when the map still reflects `processing` exactly.
    pub fn is_current(&self, processing: &Surface) -> bool {
        self.width == processing.width()
            && self.height == processing.height()
            && self.generation == processing.generation()
    }

    pub fn refresh(&mut self, processing: &Surface) {
        *self = Self::build(processing, self.threshold);
    }

    /// Re-derive only `rect`. Falls back to a full rebuild if dimensions changed.
    pub fn refresh_rect(&mut self, processing: &Surface, rect: PixelRect) {
        if self.width != processing.width() || self.height != processing.height() {
            self.refresh(processing);
            return;
        }
        let rect = rect.clamp_to(self.width, self.height);
        for y in rect.min_y..rect.max_y {
            for x in rect.min_x..rect.max_x {
                let idx = processing.index(x, y);
                self.blocked[idx] = is_boundary(processing.pixel_at(idx), self.threshold);
            }
        }
        self.generation = processing.generation();
    }

    #[inline]
    pub fn is_blocked(&self, x: u32, y: u32) -> bool {
        self.blocked[y as usize * self.width as usize + x as usize]
    }
}

/// Scanline flood fill from `(seed_x, seed_y)` over every non-boundary pixel
/// 4-connected to the seed. Returns `None` for an out-of-bounds or boundary
/// seed.
pub fn scanline_fill(map: &BoundaryMap, seed_x: i64, seed_y: i64, color: Rgb) -> Option<FillRegion> {
    if seed_x < 0 || seed_y < 0 || seed_x >= map.width as i64 || seed_y >= map.height as i64 {
        return None;
    }
    let (sx, sy) = (seed_x as u32, seed_y as u32);
    if map.is_blocked(sx, sy) {
        return None;
    }

    let w = map.width as usize;
    let mut visited = vec![false; w * map.height as usize];
    let open = |visited: &[bool], x: u32, y: u32| {
        let i = y as usize * w + x as usize;
        !visited[i] && !map.blocked[i]
    };

    let mut points = Vec::new();
    let mut bounds = PixelRect::default();
    let mut stack: Vec<(u32, u32)> = Vec::with_capacity(256);
    stack.push((sx, sy));

    while let Some((x, y)) = stack.pop() {
        if !open(&visited, x, y) {
            continue;
        }

        // Widen to the full horizontal run
        let mut x0 = x;
        while x0 > 0 && open(&visited, x0 - 1, y) {
            x0 -= 1;
        }
        let mut x1 = x;
        while x1 + 1 < map.width && open(&visited, x1 + 1, y) {
            x1 += 1;
        }

        let row = y as usize * w;
        for cx in x0..=x1 {
            visited[row + cx as usize] = true;
            points.push((cx, y));
        }
        bounds = bounds.union(PixelRect::new(x0, y, x1 + 1, y + 1));

        // One seed per open span in the neighbouring rows
        let neighbours = [y.checked_sub(1), (y + 1 < map.height).then_some(y + 1)];
        for ny in neighbours.into_iter().flatten() {
            let mut in_span = false;
            for cx in x0..=x1 {
                if open(&visited, cx, ny) {
                    if !in_span {
                        stack.push((cx, ny));
                        in_span = true;
                    }
                } else {
                    in_span = false;
                }
            }
        }
    }

    if points.is_empty() {
        return None;
    }
    Some(FillRegion::new(color, points, bounds))
}

// ============================================================================
// FILL ENGINE - boundary cache + request debounce
// ============================================================================

/// Why a fill request produced nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillSkip {
    /// Too soon after the previous fill.
    Debounced,
    /// Seed outside the canvas.
    OutOfBounds,
    /// Seed sits on a line.
    BoundarySeed,
    /// The processing surface could not be brought back in sync.
    StaleSurface,
    /// No image loaded.
    NoImage,
}

/// Rejects requests arriving within the debounce window of the last
/// accepted one.
#[derive(Clone, Debug)]
pub struct FillGate {
    debounce: Duration,
    last_accepted: Option<Instant>,
}

impl FillGate {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_accepted: None,
        }
    }

    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_accepted {
            Some(prev) => now.saturating_duration_since(prev) >= self.debounce,
            None => true,
        }
    }

    pub fn stamp(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// Owns the cached boundary map the fill algorithm samples from.
#[derive(Clone, Debug)]
pub struct FloodFill {
    threshold: u8,
    cache: Option<BoundaryMap>,
    gate: FillGate,
}

impl FloodFill {
    pub fn new(threshold: u8, debounce: Duration) -> Self {
        Self {
            threshold,
            cache: None,
            gate: FillGate::new(debounce),
        }
    }

    pub fn gate(&self) -> &FillGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut FillGate {
        &mut self.gate
    }

    /// Drop the cache, e.g. when the image changes.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_current(&self, processing: &Surface) -> bool {
        self.cache.as_ref().is_some_and(|c| c.is_current(processing))
    }

    /// Re-read the whole processing surface.
    pub fn refresh(&mut self, processing: &Surface) {
        match self.cache {
            Some(ref mut cache) => cache.refresh(processing),
            None => self.cache = Some(BoundaryMap::build(processing, self.threshold)),
        }
    }

    /// Re-read only `rect` of the processing surface.
    pub fn refresh_rect(&mut self, processing: &Surface, rect: PixelRect) {
        match self.cache {
            Some(ref mut cache) => cache.refresh_rect(processing, rect),
            None => self.cache = Some(BoundaryMap::build(processing, self.threshold)),
        }
    }

    /// Run the fill against the cached map. The caller is responsible for
    /// making sure the cache is current first.
    pub fn fill(&self, seed_x: i64, seed_y: i64, color: Rgb) -> Result<FillRegion, FillSkip> {
        let Some(map) = self.cache.as_ref() else {
            return Err(FillSkip::StaleSurface);
        };
        if seed_x < 0 || seed_y < 0 || seed_x >= map.width() as i64 || seed_y >= map.height() as i64 {
            return Err(FillSkip::OutOfBounds);
        }
        if map.is_blocked(seed_x as u32, seed_y as u32) {
            return Err(FillSkip::BoundarySeed);
        }
        scanline_fill(map, seed_x, seed_y, color).ok_or(FillSkip::BoundarySeed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{OPAQUE_BLACK, OPAQUE_WHITE};

    /// White canvas with a closed 1px square ring from (2,2) to (7,7).
    fn ring_surface() -> Surface {
        let mut s = Surface::new_filled(10, 10, OPAQUE_WHITE);
        for i in 2..=7 {
            s.put_pixel(i, 2, OPAQUE_BLACK);
            s.put_pixel(i, 7, OPAQUE_BLACK);
            s.put_pixel(2, i, OPAQUE_BLACK);
            s.put_pixel(7, i, OPAQUE_BLACK);
        }
        s
    }

    #[test]
    fn fills_inside_ring_only() {
        let surface = ring_surface();
        let map = BoundaryMap::build(&surface, BOUNDARY_THRESHOLD);
        let region = scanline_fill(&map, 4, 4, Rgb::new(255, 0, 0)).unwrap();
        assert_eq!(region.len(), 16);
        assert_eq!(region.bounds(), PixelRect::new(3, 3, 7, 7));
        assert!(region.points().iter().all(|&(x, y)| (3..7).contains(&x) && (3..7).contains(&y)));
    }

    #[test]
    fn fills_outside_ring_around_it() {
        let surface = ring_surface();
        let map = BoundaryMap::build(&surface, BOUNDARY_THRESHOLD);
        let region = scanline_fill(&map, 0, 0, Rgb::new(0, 0, 255)).unwrap();
        assert_eq!(region.len(), 100 - 36);
        assert_eq!(region.bounds(), PixelRect::full(10, 10));
    }

    #[test]
    fn never_includes_boundary_pixels() {
        let surface = ring_surface();
        let map = BoundaryMap::build(&surface, BOUNDARY_THRESHOLD);
        let region = scanline_fill(&map, 0, 0, Rgb::new(0, 0, 255)).unwrap();
        for &(x, y) in region.points() {
            assert!(!is_boundary(surface.get_pixel(x, y), BOUNDARY_THRESHOLD));
        }
    }

    #[test]
    fn concave_shapes_are_filled_completely() {
        // A "U" shaped wall: the fill has to go down one side and up the other
        let mut s = Surface::new_filled(7, 6, OPAQUE_WHITE);
        for y in 0..5 {
            s.put_pixel(3, y, OPAQUE_BLACK);
        }
        let map = BoundaryMap::build(&s, BOUNDARY_THRESHOLD);
        let region = scanline_fill(&map, 0, 0, Rgb::BLACK).unwrap();
        assert_eq!(region.len(), 7 * 6 - 5);
    }

    #[test]
    fn seed_on_line_or_outside_is_rejected() {
        let surface = ring_surface();
        let map = BoundaryMap::build(&surface, BOUNDARY_THRESHOLD);
        assert!(scanline_fill(&map, 2, 4, Rgb::WHITE).is_none());
        assert!(scanline_fill(&map, -1, 4, Rgb::WHITE).is_none());
        assert!(scanline_fill(&map, 4, 10, Rgb::WHITE).is_none());

        let mut engine = FloodFill::new(BOUNDARY_THRESHOLD, FILL_DEBOUNCE);
        engine.refresh(&surface);
        assert_eq!(engine.fill(2, 4, Rgb::WHITE), Err(FillSkip::BoundarySeed));
        assert_eq!(engine.fill(40, 4, Rgb::WHITE), Err(FillSkip::OutOfBounds));
    }

    #[test]
    fn dark_but_not_black_pixels_block() {
        let mut s = Surface::new_filled(3, 1, OPAQUE_WHITE);
        s.put_pixel(1, 0, [79, 79, 79, 255]);
        let map = BoundaryMap::build(&s, BOUNDARY_THRESHOLD);
        assert_eq!(scanline_fill(&map, 0, 0, Rgb::WHITE).unwrap().len(), 1);

        s.put_pixel(1, 0, [79, 80, 79, 255]);
        let map = BoundaryMap::build(&s, BOUNDARY_THRESHOLD);
        assert_eq!(scanline_fill(&map, 0, 0, Rgb::WHITE).unwrap().len(), 3);
    }

    #[test]
    fn cache_tracks_surface_generation() {
        let mut surface = ring_surface();
        let mut engine = FloodFill::new(BOUNDARY_THRESHOLD, FILL_DEBOUNCE);
        assert!(!engine.is_current(&surface));
        engine.refresh(&surface);
        assert!(engine.is_current(&surface));

        surface.put_pixel(4, 4, OPAQUE_BLACK);
        assert!(!engine.is_current(&surface));
        engine.refresh_rect(&surface, PixelRect::from_point(4, 4));
        assert!(engine.is_current(&surface));
        assert_eq!(engine.fill(4, 4, Rgb::WHITE), Err(FillSkip::BoundarySeed));
    }

    #[test]
    fn gate_debounces_within_window() {
        let t0 = Instant::now();
        let mut gate = FillGate::new(FILL_DEBOUNCE);
        assert!(gate.is_open(t0));
        gate.stamp(t0);
        assert!(!gate.is_open(t0 + Duration::from_millis(499)));
        assert!(gate.is_open(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn changed_pixels_counts_only_differences() {
        let surface = ring_surface();
        let map = BoundaryMap::build(&surface, BOUNDARY_THRESHOLD);
        let region = scanline_fill(&map, 4, 4, Rgb::new(255, 0, 0)).unwrap();
        let mut fill = Surface::new(10, 10);
        assert_eq!(region.changed_pixels(&fill), 16);
        region.paint_onto(&mut fill, 255);
        assert_eq!(region.changed_pixels(&fill), 0);
    }
}
