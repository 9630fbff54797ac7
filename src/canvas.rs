// ============================================================================
// LAYER COMPOSITOR - five pixel-aligned raster surfaces per loaded image
// ============================================================================

use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::flood_fill::FillRegion;

/// Source pixels with every RGB channel below this are kept as outline.
pub const OUTLINE_THRESHOLD: u8 = 50;

pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];
pub const OPAQUE_WHITE: [u8; 4] = [255, 255, 255, 255];
pub const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

// ============================================================================
// PIXEL RECT
// ============================================================================

/// Axis-aligned pixel rectangle, `min` inclusive and `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PixelRect {
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Rectangle covering exactly one pixel.
    pub fn from_point(x: u32, y: u32) -> Self {
        Self::new(x, y, x + 1, y + 1)
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    pub fn union(&self, other: PixelRect) -> PixelRect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return *self;
        }
        PixelRect::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> PixelRect {
        PixelRect::new(
            self.min_x.min(width),
            self.min_y.min(height),
            self.max_x.min(width),
            self.max_y.min(height),
        )
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasError {
    /// Zero-area or oversized source image.
    InvalidDimensions { width: u32, height: u32 },
    /// A surface (or a buffer being restored into it) is not aligned with
    /// the rest of the stack.
    DimensionMismatch {
        surface: SurfaceKind,
        expected: usize,
        found: usize,
    },
}

impl std::fmt::Display for CanvasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanvasError::InvalidDimensions { width, height } => {
                write!(f, "invalid image dimensions {}x{}", width, height)
            }
            CanvasError::DimensionMismatch { surface, expected, found } => write!(
                f,
                "{} surface misaligned: expected {} bytes, found {}",
                surface.name(),
                expected,
                found
            ),
        }
    }
}

impl std::error::Error for CanvasError {}

// ============================================================================
// SURFACE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Static source image flattened over white.
    Background,
    /// Flood-fill colour, transparent elsewhere.
    Fill,
    /// Pencil / eraser ink, transparent elsewhere.
    Interaction,
    /// Merge of background + fill + interaction, sampled by the fill tool.
    Processing,
    /// Pure line art re-extracted from the source, drawn above everything.
    Overlay,
}

impl SurfaceKind {
    pub fn all() -> &'static [SurfaceKind] {
        &[
            SurfaceKind::Background,
            SurfaceKind::Fill,
            SurfaceKind::Interaction,
            SurfaceKind::Processing,
            SurfaceKind::Overlay,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SurfaceKind::Background => "background",
            SurfaceKind::Fill => "fill",
            SurfaceKind::Interaction => "interaction",
            SurfaceKind::Processing => "processing",
            SurfaceKind::Overlay => "overlay",
        }
    }
}

/// A flat RGBA pixel buffer. The generation counter advances on every
/// mutation so caches derived from a surface can detect staleness.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    generation: u64,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self::new_filled(width, height, TRANSPARENT)
    }

    pub fn new_filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            pixels,
            generation: 0,
        }
    }

    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        Self {
            width: src.width(),
            height: src.height(),
            pixels: src.as_raw().clone(),
            generation: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.pixels
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn memory_bytes(&self) -> usize {
        self.pixels.len()
    }

    pub fn same_size(&self, other: &Surface) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn pixel_at(&self, idx: usize) -> [u8; 4] {
        let o = idx * 4;
        [
            self.pixels[o],
            self.pixels[o + 1],
            self.pixels[o + 2],
            self.pixels[o + 3],
        ]
    }

    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixel_at(self.index(x, y))
    }

    #[inline]
    pub fn put_index(&mut self, idx: usize, px: [u8; 4]) {
        let o = idx * 4;
        self.pixels[o..o + 4].copy_from_slice(&px);
        self.generation += 1;
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let idx = self.index(x, y);
        self.put_index(idx, px);
    }

    pub fn fill(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.generation += 1;
    }

    /// Replace every pixel from a raw RGBA buffer of identical length.
    pub fn restore_from_raw(&mut self, kind: SurfaceKind, raw: &[u8]) -> Result<(), CanvasError> {
        if raw.len() != self.pixels.len() {
            return Err(CanvasError::DimensionMismatch {
                surface: kind,
                expected: self.pixels.len(),
                found: raw.len(),
            });
        }
        self.pixels.copy_from_slice(raw);
        self.generation += 1;
        Ok(())
    }

    /// Copy of the pixels inside `rect`, row-major.
    pub fn extract_rect(&self, rect: PixelRect) -> Vec<[u8; 4]> {
        let rect = rect.clamp_to(self.width, self.height);
        let mut out = Vec::with_capacity(rect.area() as usize);
        for y in rect.min_y..rect.max_y {
            for x in rect.min_x..rect.max_x {
                out.push(self.get_pixel(x, y));
            }
        }
        out
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Straight-alpha source-over.
pub fn blend_over(base: [u8; 4], top: [u8; 4]) -> [u8; 4] {
    if top[3] == 0 {
        return base;
    }
    if top[3] == 255 {
        return top;
    }
    let ta = top[3] as f32 / 255.0;
    let ba = base[3] as f32 / 255.0;
    let out_a = ta + ba * (1.0 - ta);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }
    let channel = |t: u8, b: u8| {
        ((t as f32 * ta + b as f32 * ba * (1.0 - ta)) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    [
        channel(top[0], base[0]),
        channel(top[1], base[1]),
        channel(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Threshold the source into an outline layer: dark pixels become opaque
/// black, everything else transparent.
pub fn extract_outline(source: &RgbaImage, threshold: u8) -> Surface {
    let mut overlay = Surface::new(source.width(), source.height());
    overlay
        .pixels
        .par_chunks_exact_mut(4)
        .zip(source.as_raw().par_chunks_exact(4))
        .for_each(|(dst, src)| {
            if src[3] > 0 && src[0] < threshold && src[1] < threshold && src[2] < threshold {
                dst.copy_from_slice(&OPAQUE_BLACK);
            }
        });
    overlay
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// How the background was produced; selects the eraser strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackgroundKind {
    /// Image-based line art: erasing reveals the original lines.
    #[default]
    LineArt,
    /// Flat colour: erasing paints white.
    Solid,
}

/// The five surfaces of one loaded image, plus the list of fill regions that
/// produced the current fill surface.
pub struct LayerStack {
    width: u32,
    height: u32,
    background: Surface,
    fill: Surface,
    interaction: Surface,
    processing: Surface,
    overlay: Surface,
    background_kind: BackgroundKind,
    fill_regions: Vec<Arc<FillRegion>>,
    /// False once something other than a fill has touched the fill surface,
    /// i.e. replaying `fill_regions` would no longer reproduce it.
    fill_exact: bool,
}

impl LayerStack {
    /// Build all surfaces for a freshly loaded source image.
    pub fn initialize(
        image: &RgbaImage,
        kind: BackgroundKind,
        outline_threshold: u8,
        max_edge: u32,
    ) -> Result<Self, CanvasError> {
        let (width, height) = image.dimensions();
        validate_dimensions(width, height, max_edge)?;

        let mut background = Surface::from_rgba_image(image);
        background
            .pixels
            .par_chunks_exact_mut(4)
            .for_each(|px| {
                let flat = blend_over(OPAQUE_WHITE, [px[0], px[1], px[2], px[3]]);
                px.copy_from_slice(&flat);
            });

        let overlay = match kind {
            BackgroundKind::LineArt => extract_outline(image, outline_threshold),
            BackgroundKind::Solid => Surface::new(width, height),
        };

        let mut stack = Self {
            width,
            height,
            background,
            fill: Surface::new(width, height),
            interaction: Surface::new(width, height),
            processing: Surface::new(width, height),
            overlay,
            background_kind: kind,
            fill_regions: Vec::new(),
            fill_exact: true,
        };
        stack.resync_processing()?;
        Ok(stack)
    }

    /// A plain white canvas.
    pub fn blank(width: u32, height: u32, max_edge: u32) -> Result<Self, CanvasError> {
        validate_dimensions(width, height, max_edge)?;
        let white = RgbaImage::from_pixel(width, height, image::Rgba(OPAQUE_WHITE));
        Self::initialize(&white, BackgroundKind::Solid, 0, max_edge)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn background_kind(&self) -> BackgroundKind {
        self.background_kind
    }

    pub fn surface(&self, kind: SurfaceKind) -> &Surface {
        match kind {
            SurfaceKind::Background => &self.background,
            SurfaceKind::Fill => &self.fill,
            SurfaceKind::Interaction => &self.interaction,
            SurfaceKind::Processing => &self.processing,
            SurfaceKind::Overlay => &self.overlay,
        }
    }

    pub fn surface_mut(&mut self, kind: SurfaceKind) -> &mut Surface {
        match kind {
            SurfaceKind::Background => &mut self.background,
            SurfaceKind::Fill => &mut self.fill,
            SurfaceKind::Interaction => &mut self.interaction,
            SurfaceKind::Processing => &mut self.processing,
            SurfaceKind::Overlay => &mut self.overlay,
        }
    }

    /// Both paint surfaces at once, for tools that write to each.
    pub fn paint_surfaces_mut(&mut self) -> (&mut Surface, &mut Surface) {
        (&mut self.interaction, &mut self.fill)
    }

    pub fn fill_regions(&self) -> &[Arc<FillRegion>] {
        &self.fill_regions
    }

    pub fn fill_is_exact(&self) -> bool {
        self.fill_exact
    }

    pub fn record_fill(&mut self, region: Arc<FillRegion>) {
        self.fill_regions.push(region);
    }

    pub fn mark_fill_inexact(&mut self) {
        self.fill_exact = false;
    }

    pub fn set_fill_ledger(&mut self, regions: Vec<Arc<FillRegion>>, exact: bool) {
        self.fill_regions = regions;
        self.fill_exact = exact;
    }

    /// Replace one surface's pixels, e.g. from a history snapshot.
    pub fn restore_surface(&mut self, kind: SurfaceKind, raw: &[u8]) -> Result<(), CanvasError> {
        self.surface_mut(kind).restore_from_raw(kind, raw)
    }

    /// Rebuild the fill surface by replaying a region list.
    pub fn replay_fill_regions(&mut self, regions: &[Arc<FillRegion>]) {
        self.fill.clear();
        for region in regions {
            region.paint_onto(&mut self.fill, 255);
        }
    }

    /// Clear all paint back to the pristine image.
    pub fn clear_paint(&mut self) -> Result<(), CanvasError> {
        self.fill.clear();
        self.interaction.clear();
        self.fill_regions.clear();
        self.fill_exact = true;
        self.resync_processing()
    }

    pub fn check_alignment(&self) -> Result<(), CanvasError> {
        let expected = self.width as usize * self.height as usize * 4;
        for &kind in SurfaceKind::all() {
            let surface = self.surface(kind);
            if surface.width != self.width
                || surface.height != self.height
                || surface.pixels.len() != expected
            {
                return Err(CanvasError::DimensionMismatch {
                    surface: kind,
                    expected,
                    found: surface.pixels.len(),
                });
            }
        }
        Ok(())
    }

    /// Rebuild the whole processing surface from background + fill + interaction.
    pub fn resync_processing(&mut self) -> Result<(), CanvasError> {
        self.resync_processing_rect(PixelRect::full(self.width, self.height))
    }

    /// Rebuild only the rows/columns inside `rect` (dirty-rectangle update).
    pub fn resync_processing_rect(&mut self, rect: PixelRect) -> Result<(), CanvasError> {
        self.check_alignment()?;
        let rect = rect.clamp_to(self.width, self.height);
        if rect.is_empty() {
            return Ok(());
        }

        let row_bytes = self.width as usize * 4;
        let x0 = rect.min_x as usize * 4;
        let x1 = rect.max_x as usize * 4;
        let background = &self.background.pixels;
        let interaction = &self.interaction.pixels;
        let fill = &self.fill.pixels;

        self.processing
            .pixels
            .par_chunks_mut(row_bytes)
            .enumerate()
            .skip(rect.min_y as usize)
            .take(rect.height() as usize)
            .for_each(|(y, row)| {
                let base = y * row_bytes;
                for o in (x0..x1).step_by(4) {
                    let at = |buf: &[u8]| {
                        [buf[base + o], buf[base + o + 1], buf[base + o + 2], buf[base + o + 3]]
                    };
                    let px = blend_over(blend_over(at(background), at(fill)), at(interaction));
                    row[o..o + 4].copy_from_slice(&px);
                }
            });
        self.processing.generation += 1;
        Ok(())
    }

    /// Flatten everything the user sees: background, fill, interaction and
    /// the outline overlay on top.
    pub fn export_composite(&self) -> RgbaImage {
        let row_bytes = self.width as usize * 4;
        let mut out = vec![0u8; row_bytes * self.height as usize];
        let background = &self.background.pixels;
        let interaction = &self.interaction.pixels;
        let fill = &self.fill.pixels;
        let overlay = &self.overlay.pixels;

        out.par_chunks_mut(4).enumerate().for_each(|(i, dst)| {
            let o = i * 4;
            let at = |buf: &[u8]| [buf[o], buf[o + 1], buf[o + 2], buf[o + 3]];
            let mut px = blend_over(at(background), at(fill));
            px = blend_over(px, at(interaction));
            px = blend_over(px, at(overlay));
            dst.copy_from_slice(&px);
        });

        RgbaImage::from_raw(self.width, self.height, out)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Bytes held by all five surfaces.
    pub fn memory_bytes(&self) -> usize {
        SurfaceKind::all()
            .iter()
            .map(|&k| self.surface(k).memory_bytes())
            .sum()
    }
}

fn validate_dimensions(width: u32, height: u32, max_edge: u32) -> Result<(), CanvasError> {
    if width == 0 || height == 0 || width > max_edge || height > max_edge {
        return Err(CanvasError::InvalidDimensions { width, height });
    }
    Ok(())
}
