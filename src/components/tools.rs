use std::time::{Duration, Instant};

use egui::Pos2;

use crate::canvas::{
    BackgroundKind, CanvasError, LayerStack, OPAQUE_WHITE, PixelRect, Surface, SurfaceKind,
    TRANSPARENT,
};
use crate::components::colors::{Rgb, pack_rgba};
use crate::log_warn;

/// Pointer moves closer together than this are coalesced (~60 fps).
pub const STROKE_INTERVAL: Duration = Duration::from_millis(16);

pub const MIN_BRUSH_SIZE: f32 = 1.0;
pub const MAX_BRUSH_SIZE: f32 = 200.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolKind {
    #[default]
    Fill,
    Pencil,
    Eraser,
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Fill => "Fill",
            ToolKind::Pencil => "Pencil",
            ToolKind::Eraser => "Eraser",
        }
    }

    pub fn all() -> &'static [ToolKind] {
        &[ToolKind::Fill, ToolKind::Pencil, ToolKind::Eraser]
    }

    /// Pencil and eraser draw strokes; fill acts on a single click.
    pub fn is_freehand(&self) -> bool {
        matches!(self, ToolKind::Pencil | ToolKind::Eraser)
    }
}

/// Active tool plus its parameters. Exactly one tool is active.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolState {
    pub active: ToolKind,
    pub color: Rgb,
    pub pencil_size: f32,
    pub eraser_size: f32,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            active: ToolKind::Fill,
            color: Rgb::new(229, 57, 53),
            pencil_size: 4.0,
            eraser_size: 16.0,
        }
    }
}

impl ToolState {
    pub fn select(&mut self, kind: ToolKind) {
        self.active = kind;
    }

    pub fn set_pencil_size(&mut self, size: f32) {
        self.pencil_size = clamp_size(size);
    }

    pub fn set_eraser_size(&mut self, size: f32) {
        self.eraser_size = clamp_size(size);
    }

    /// Diameter for the given freehand tool.
    pub fn size_for(&self, kind: ToolKind) -> f32 {
        match kind {
            ToolKind::Eraser => self.eraser_size,
            _ => self.pencil_size,
        }
    }
}

fn clamp_size(size: f32) -> f32 {
    if size.is_finite() {
        size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE)
    } else {
        MIN_BRUSH_SIZE
    }
}

// ============================================================================
// ERASER STRATEGY
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraserStrategy {
    /// Clear paint to transparent so the line-art background shows through.
    PreserveLines,
    /// Paint opaque white over a flat background.
    PaintWhite,
}

impl EraserStrategy {
    pub fn for_background(kind: BackgroundKind) -> Self {
        match kind {
            BackgroundKind::LineArt => EraserStrategy::PreserveLines,
            BackgroundKind::Solid => EraserStrategy::PaintWhite,
        }
    }

    fn ink(&self) -> Ink {
        match self {
            EraserStrategy::PreserveLines => Ink::Clear,
            EraserStrategy::PaintWhite => Ink::Color(OPAQUE_WHITE),
        }
    }
}

/// What a stroke writes into the pixels it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ink {
    Color([u8; 4]),
    Clear,
}

impl Ink {
    fn pixel(self) -> [u8; 4] {
        match self {
            Ink::Color(px) => px,
            Ink::Clear => TRANSPARENT,
        }
    }
}

// ============================================================================
// PIXEL DIFF
// ============================================================================

/// One changed pixel of a surface, colours packed as `0xRRGGBBAA`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelChange {
    pub index: usize,
    pub old_color: u32,
    pub new_color: u32,
}

/// Sparse diff of two same-sized surfaces restricted to `bounds`.
pub fn diff_surfaces(
    before: &Surface,
    after: &Surface,
    bounds: PixelRect,
) -> Result<Vec<PixelChange>, CanvasError> {
    if !before.same_size(after) {
        return Err(CanvasError::DimensionMismatch {
            surface: SurfaceKind::Interaction,
            expected: before.memory_bytes(),
            found: after.memory_bytes(),
        });
    }
    let bounds = bounds.clamp_to(before.width(), before.height());
    let mut changes = Vec::new();
    for y in bounds.min_y..bounds.max_y {
        for x in bounds.min_x..bounds.max_x {
            let index = before.index(x, y);
            let old = before.pixel_at(index);
            let new = after.pixel_at(index);
            if old != new {
                changes.push(PixelChange {
                    index,
                    old_color: pack_rgba(old),
                    new_color: pack_rgba(new),
                });
            }
        }
    }
    Ok(changes)
}

// ============================================================================
// SEGMENT RASTERISER
// ============================================================================

fn distance_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    };
    (p - (a + ab * t)).length()
}

/// Draw a round-capped segment of the given diameter. Pixels whose centre
/// lies within the capsule are overwritten with `ink`. Returns the touched
/// rectangle, or `None` when the segment misses the surface.
pub fn draw_segment(
    surface: &mut Surface,
    from: Pos2,
    to: Pos2,
    diameter: f32,
    ink: Ink,
) -> Option<PixelRect> {
    // Never thinner than the pixel under the pointer
    let radius = (diameter * 0.5).max(0.75);
    let min_x = (from.x.min(to.x) - radius).floor().max(0.0);
    let min_y = (from.y.min(to.y) - radius).floor().max(0.0);
    let max_x = (from.x.max(to.x) + radius).ceil().min(surface.width() as f32);
    let max_y = (from.y.max(to.y) + radius).ceil().min(surface.height() as f32);
    if min_x >= max_x || min_y >= max_y {
        return None;
    }
    let rect = PixelRect::new(min_x as u32, min_y as u32, max_x as u32, max_y as u32);

    let px = ink.pixel();
    for y in rect.min_y..rect.max_y {
        for x in rect.min_x..rect.max_x {
            let centre = Pos2::new(x as f32 + 0.5, y as f32 + 0.5);
            if distance_to_segment(centre, from, to) <= radius {
                surface.put_pixel(x, y, px);
            }
        }
    }
    Some(rect)
}

// ============================================================================
// FREEHAND STROKES (pencil / eraser)
// ============================================================================

/// Tracks one stroke in progress.
struct StrokeTracker {
    kind: ToolKind,
    diameter: f32,
    pencil_ink: Ink,
    eraser: EraserStrategy,
    before_interaction: Surface,
    before_fill: Option<Surface>,
    last_point: Pos2,
    pending: Option<Pos2>,
    last_draw_at: Instant,
    bounds: PixelRect,
}

impl StrokeTracker {
    fn draw(&mut self, stack: &mut LayerStack, from: Pos2, to: Pos2) -> Option<PixelRect> {
        let touched = match self.kind {
            ToolKind::Eraser => {
                let ink = self.eraser.ink();
                let (interaction, fill) = stack.paint_surfaces_mut();
                let a = draw_segment(interaction, from, to, self.diameter, ink);
                let b = draw_segment(fill, from, to, self.diameter, ink);
                a.or(b)
            }
            _ => draw_segment(
                stack.surface_mut(SurfaceKind::Interaction),
                from,
                to,
                self.diameter,
                self.pencil_ink,
            ),
        };
        if let Some(rect) = touched {
            self.bounds = self.bounds.union(rect);
        }
        touched
    }
}

/// Emitted when a stroke completes.
#[derive(Clone, Debug)]
pub struct StrokeEvent {
    pub kind: ToolKind,
    pub bounds: PixelRect,
    /// Interaction-surface diff. Informational only.
    pub changes: Vec<PixelChange>,
    /// Fill-surface diff (eraser strokes only).
    pub fill_changes: Vec<PixelChange>,
}

/// Pencil / eraser stroke renderer with move throttling.
pub struct FreehandTool {
    interval: Duration,
    active: Option<StrokeTracker>,
}

impl Default for FreehandTool {
    fn default() -> Self {
        Self::new(STROKE_INTERVAL)
    }
}

impl FreehandTool {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_kind(&self) -> Option<ToolKind> {
        self.active.as_ref().map(|t| t.kind)
    }

    /// Start a stroke at `pos`, snapshotting the surfaces it may change and
    /// stamping the first dab. Returns the touched rectangle.
    pub fn begin(
        &mut self,
        kind: ToolKind,
        tools: &ToolState,
        stack: &mut LayerStack,
        pos: Pos2,
        now: Instant,
    ) -> Option<PixelRect> {
        if !kind.is_freehand() {
            return None;
        }
        let before_fill = match kind {
            ToolKind::Eraser => Some(stack.surface(SurfaceKind::Fill).clone()),
            _ => None,
        };
        let mut tracker = StrokeTracker {
            kind,
            diameter: tools.size_for(kind),
            pencil_ink: Ink::Color(tools.color.to_rgba(255)),
            eraser: EraserStrategy::for_background(stack.background_kind()),
            before_interaction: stack.surface(SurfaceKind::Interaction).clone(),
            before_fill,
            last_point: pos,
            pending: None,
            last_draw_at: now,
            bounds: PixelRect::default(),
        };
        let touched = tracker.draw(stack, pos, pos);
        self.active = Some(tracker);
        touched
    }

    /// Continue the stroke. Moves inside the throttle interval are held back
    /// and drawn with the next accepted move (or at stroke end).
    pub fn extend(&mut self, stack: &mut LayerStack, pos: Pos2, now: Instant) -> Option<PixelRect> {
        let interval = self.interval;
        let tracker = self.active.as_mut()?;
        if now.saturating_duration_since(tracker.last_draw_at) < interval {
            tracker.pending = Some(pos);
            return None;
        }
        let from = tracker.last_point;
        tracker.last_point = pos;
        tracker.pending = None;
        tracker.last_draw_at = now;
        tracker.draw(stack, from, pos)
    }

    /// Finish the stroke: flush any held-back point and diff before/after.
    pub fn finish(&mut self, stack: &mut LayerStack) -> Option<StrokeEvent> {
        let mut tracker = self.active.take()?;
        if let Some(pos) = tracker.pending.take() {
            let from = tracker.last_point;
            tracker.draw(stack, from, pos);
        }

        let changes = diff_surfaces(
            &tracker.before_interaction,
            stack.surface(SurfaceKind::Interaction),
            tracker.bounds,
        )
        .unwrap_or_else(|e| {
            log_warn!("{} stroke diff failed: {}", tracker.kind.label(), e);
            Vec::new()
        });

        let fill_changes = match tracker.before_fill.as_ref() {
            Some(before) => match diff_surfaces(before, stack.surface(SurfaceKind::Fill), tracker.bounds) {
                Ok(changes) => changes,
                Err(e) => {
                    log_warn!("Eraser fill diff failed: {}", e);
                    // Unknown outcome: assume the fill surface changed
                    stack.mark_fill_inexact();
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        if !fill_changes.is_empty() {
            stack.mark_fill_inexact();
        }

        Some(StrokeEvent {
            kind: tracker.kind,
            bounds: tracker.bounds,
            changes,
            fill_changes,
        })
    }

    /// Abort the stroke and put the surfaces back as they were. Returns the
    /// rectangle that was restored.
    pub fn cancel(&mut self, stack: &mut LayerStack) -> Option<PixelRect> {
        let tracker = self.active.take()?;
        let restored = stack
            .restore_surface(SurfaceKind::Interaction, tracker.before_interaction.as_raw())
            .and_then(|_| match tracker.before_fill.as_ref() {
                Some(before) => stack.restore_surface(SurfaceKind::Fill, before.as_raw()),
                None => Ok(()),
            });
        if let Err(e) = restored {
            log_warn!("Could not restore surfaces after cancelled stroke: {}", e);
        }
        Some(tracker.bounds)
    }
}
