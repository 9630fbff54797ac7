// ============================================================================
// COLORING ENGINE - owns one session and routes tool / viewport actions
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use egui::{Pos2, Vec2};
use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{BackgroundKind, CanvasError, LayerStack, PixelRect, SurfaceKind};
use crate::components::colors::{ColorParseError, Rgb, resolve_palette};
use crate::components::history::{HistoryKind, HistoryManager};
use crate::components::tools::{FreehandTool, StrokeEvent, ToolKind, ToolState};
use crate::input::{GestureAction, GestureTracker, InputEvent};
use crate::io::{self, Artwork, ImageSource, LoadError};
use crate::ops::fade::FillFade;
use crate::ops::flood_fill::{FillSkip, FloodFill};
use crate::settings::EngineSettings;
use crate::viewport::{ViewMode, ViewportState};
use crate::{log_err, log_info, log_warn};

#[derive(Debug)]
pub enum EngineError {
    NoImage,
    Canvas(CanvasError),
    Load(LoadError),
    Color(ColorParseError),
    Encode(image::ImageError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NoImage => write!(f, "no image loaded"),
            EngineError::Canvas(e) => write!(f, "canvas error: {}", e),
            EngineError::Load(e) => write!(f, "{}", e),
            EngineError::Color(e) => write!(f, "invalid colour: {}", e),
            EngineError::Encode(e) => write!(f, "export failed: {}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<CanvasError> for EngineError {
    fn from(e: CanvasError) -> Self {
        EngineError::Canvas(e)
    }
}

impl From<LoadError> for EngineError {
    fn from(e: LoadError) -> Self {
        EngineError::Load(e)
    }
}

impl From<ColorParseError> for EngineError {
    fn from(e: ColorParseError) -> Self {
        EngineError::Color(e)
    }
}

impl From<image::ImageError> for EngineError {
    fn from(e: image::ImageError) -> Self {
        EngineError::Encode(e)
    }
}

/// Result of a fill request that did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillOutcome {
    /// A region was found and its reveal has started.
    Started { pixels: usize, bounds: PixelRect },
    /// The region is already painted in this colour. Nothing is drawn or
    /// recorded.
    Unchanged { pixels: usize, bounds: PixelRect },
    Skipped(FillSkip),
}

impl FillOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, FillOutcome::Started { .. })
    }
}

/// One loaded artwork and everything painted on it.
pub struct ColoringSession {
    pub id: Uuid,
    pub title: String,
    pub artwork_id: Option<String>,
    pub stack: LayerStack,
    pub palette: Vec<(String, Rgb)>,
}

/// The whole interactive engine. Everything is driven explicitly by the
/// host: input events, `tick` once per frame, and the tool/history calls.
pub struct ColoringEngine {
    settings: EngineSettings,
    session: Option<ColoringSession>,
    tools: ToolState,
    viewport: ViewportState,
    gestures: GestureTracker,
    flood: FloodFill,
    fade: Option<FillFade>,
    freehand: FreehandTool,
    history: HistoryManager,
    /// Canvas position of a fill-tool press waiting for its release.
    pending_press: Option<Pos2>,
    dirty: bool,
}

impl Default for ColoringEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl ColoringEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let mut tools = ToolState::default();
        tools.set_pencil_size(settings.pencil_size);
        tools.set_eraser_size(settings.eraser_size);
        Self {
            tools,
            viewport: ViewportState::new(settings.min_scale, settings.max_scale),
            gestures: GestureTracker::new(settings.wheel_zoom_step),
            flood: FloodFill::new(settings.boundary_threshold, settings.fill_debounce()),
            fade: None,
            freehand: FreehandTool::new(settings.stroke_interval()),
            history: HistoryManager::new(settings.history_limit)
                .with_memory_limit(settings.history_memory_bytes()),
            session: None,
            pending_press: None,
            dirty: true,
            settings,
        }
    }

    // ========================================================================
    // SESSION LIFECYCLE
    // ========================================================================

    /// Replace the current session with `image`. On failure the previous
    /// session is left untouched.
    pub fn load_image(&mut self, image: &RgbaImage, title: &str) -> Result<(), EngineError> {
        let stack = LayerStack::initialize(
            image,
            BackgroundKind::LineArt,
            self.settings.outline_threshold,
            self.settings.max_canvas_edge,
        )?;
        self.install(stack, title, None, resolve_palette(None));
        Ok(())
    }

    /// Start a plain white canvas.
    pub fn load_blank(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        let stack = LayerStack::blank(width, height, self.settings.max_canvas_edge)?;
        self.install(stack, "Blank", None, resolve_palette(None));
        Ok(())
    }

    pub fn load_source(&mut self, source: &ImageSource) -> Result<(), EngineError> {
        let image = io::load_source(source).inspect_err(|e| {
            log_err!("Failed to load {}: {}", source.display_name(), e);
        })?;
        self.load_image(&image, &source.display_name())
    }

    pub fn load_artwork(&mut self, artwork: &Artwork) -> Result<(), EngineError> {
        let image = io::load_source(&artwork.source()).inspect_err(|e| {
            log_err!("Failed to load artwork '{}': {}", artwork.id, e);
        })?;
        let stack = LayerStack::initialize(
            &image,
            BackgroundKind::LineArt,
            self.settings.outline_threshold,
            self.settings.max_canvas_edge,
        )?;
        let palette = resolve_palette(artwork.suggested_colors.as_deref());
        self.install(stack, &artwork.title, Some(artwork.id.clone()), palette);
        Ok(())
    }

    fn install(
        &mut self,
        stack: LayerStack,
        title: &str,
        artwork_id: Option<String>,
        palette: Vec<(String, Rgb)>,
    ) {
        log_info!(
            "Loaded '{}' ({}x{}, {} swatches)",
            title,
            stack.width(),
            stack.height(),
            palette.len()
        );
        self.abandon_transients();
        self.flood.invalidate();
        self.flood.refresh(stack.surface(SurfaceKind::Processing));
        self.flood.gate_mut().reset();
        self.history.reset(&stack);
        if let Some((_, first)) = palette.first()
            && !palette.iter().any(|(_, c)| *c == self.tools.color)
        {
            self.tools.color = *first;
        }
        self.session = Some(ColoringSession {
            id: Uuid::new_v4(),
            title: title.to_string(),
            artwork_id,
            stack,
            palette,
        });
        self.dirty = true;
    }

    /// Drop the current session and all of its surfaces.
    pub fn unload(&mut self) {
        self.abandon_transients();
        self.session = None;
        self.flood.invalidate();
        self.history.clear();
        self.dirty = true;
    }

    /// Forget in-flight work that belongs to the outgoing stack.
    fn abandon_transients(&mut self) {
        self.fade = None;
        self.freehand = FreehandTool::new(self.settings.stroke_interval());
        self.pending_press = None;
        self.gestures.reset();
    }

    pub fn session(&self) -> Option<&ColoringSession> {
        self.session.as_ref()
    }

    pub fn stack(&self) -> Option<&LayerStack> {
        self.session.as_ref().map(|s| &s.stack)
    }

    pub fn has_image(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    // ========================================================================
    // TOOLS
    // ========================================================================

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn select_tool(&mut self, kind: ToolKind) {
        if self.tools.active == kind {
            return;
        }
        if self.freehand.is_active() {
            self.end_stroke();
        }
        self.pending_press = None;
        self.tools.select(kind);
    }

    pub fn set_color(&mut self, hex: &str) -> Result<Rgb, EngineError> {
        let rgb = Rgb::from_hex(hex)?;
        self.tools.color = rgb;
        Ok(rgb)
    }

    pub fn set_color_rgb(&mut self, color: Rgb) {
        self.tools.color = color;
    }

    pub fn set_pencil_size(&mut self, size: f32) {
        self.tools.set_pencil_size(size);
    }

    pub fn set_eraser_size(&mut self, size: f32) {
        self.tools.set_eraser_size(size);
    }

    /// True while a fade or a stroke is the commit in flight.
    pub fn is_busy(&self) -> bool {
        self.fade.is_some() || self.freehand.is_active()
    }

    // ========================================================================
    // FLOOD FILL
    // ========================================================================

    /// Fill the region containing canvas pixel `(x, y)` with the current
    /// colour. The history entry is written once the fade finishes.
    pub fn fill_at(&mut self, x: i64, y: i64, now: Instant) -> FillOutcome {
        if self.session.is_none() {
            return FillOutcome::Skipped(FillSkip::NoImage);
        }
        if !self.flood.gate().is_open(now) {
            return FillOutcome::Skipped(FillSkip::Debounced);
        }
        if self.freehand.is_active() {
            self.end_stroke();
        }
        self.finish_pending();

        let Some(session) = self.session.as_mut() else {
            return FillOutcome::Skipped(FillSkip::NoImage);
        };
        let stack = &mut session.stack;
        if !self.flood.is_current(stack.surface(SurfaceKind::Processing)) {
            if let Err(e) = stack.resync_processing() {
                log_warn!("Fill abandoned, processing surface could not be resynced: {}", e);
                return FillOutcome::Skipped(FillSkip::StaleSurface);
            }
            self.flood.refresh(stack.surface(SurfaceKind::Processing));
        }

        let region = match self.flood.fill(x, y, self.tools.color) {
            Ok(region) => region,
            Err(skip) => return FillOutcome::Skipped(skip),
        };
        if region.changed_pixels(stack.surface(SurfaceKind::Fill)) == 0 {
            return FillOutcome::Unchanged {
                pixels: region.len(),
                bounds: region.bounds(),
            };
        }

        self.flood.gate_mut().stamp(now);
        let outcome = FillOutcome::Started {
            pixels: region.len(),
            bounds: region.bounds(),
        };
        let region = Arc::new(region);
        stack.record_fill(Arc::clone(&region));
        let fade = FillFade::start(
            region,
            stack.surface(SurfaceKind::Fill),
            now,
            self.settings.fill_fade(),
        );
        self.fade = Some(fade);
        self.dirty = true;

        // Zero-length fades finish on the spot
        self.tick(now);
        outcome
    }

    /// Advance time-based work. Returns true if the canvas changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let (Some(fade), Some(session)) = (self.fade.as_ref(), self.session.as_mut()) else {
            return false;
        };
        let stack = &mut session.stack;
        let bounds = fade.region().bounds();
        let done = fade.apply(stack.surface_mut(SurfaceKind::Fill), now);
        if let Err(e) = stack.resync_processing_rect(bounds) {
            log_warn!("Processing resync after fill frame failed: {}", e);
        }
        if done {
            self.fade = None;
            self.commit_fill(bounds);
        }
        self.dirty = true;
        true
    }

    /// Complete any in-flight fade immediately and record it.
    pub fn finish_pending(&mut self) {
        let (Some(fade), Some(session)) = (self.fade.take(), self.session.as_mut()) else {
            return;
        };
        let stack = &mut session.stack;
        let bounds = fade.region().bounds();
        fade.complete(stack.surface_mut(SurfaceKind::Fill));
        if let Err(e) = stack.resync_processing_rect(bounds) {
            log_warn!("Processing resync after fill failed: {}", e);
        }
        self.commit_fill(bounds);
        self.dirty = true;
    }

    fn commit_fill(&mut self, bounds: PixelRect) {
        let Some(session) = self.session.as_ref() else { return };
        let stack = &session.stack;
        self.history.commit(HistoryKind::Fill, stack);
        self.flood
            .refresh_rect(stack.surface(SurfaceKind::Processing), bounds);
    }

    pub fn fade_in_progress(&self) -> bool {
        self.fade.is_some()
    }

    // ========================================================================
    // FREEHAND STROKES
    // ========================================================================

    /// Start a pencil/eraser stroke at a canvas position. Returns false when
    /// the active tool is not freehand or nothing is loaded.
    pub fn begin_stroke(&mut self, pos: Pos2, now: Instant) -> bool {
        let kind = self.tools.active;
        if !kind.is_freehand() || self.session.is_none() {
            return false;
        }
        self.finish_pending();
        if self.freehand.is_active() {
            self.end_stroke();
        }
        let Some(session) = self.session.as_mut() else { return false };
        let stack = &mut session.stack;
        if !self.flood.is_current(stack.surface(SurfaceKind::Processing)) {
            self.flood.refresh(stack.surface(SurfaceKind::Processing));
        }
        if let Some(rect) = self.freehand.begin(kind, &self.tools, stack, pos, now) {
            resync_rect(stack, rect);
        }
        self.dirty = true;
        true
    }

    /// Returns false when the move was held back by the throttle.
    pub fn extend_stroke(&mut self, pos: Pos2, now: Instant) -> bool {
        let Some(session) = self.session.as_mut() else { return false };
        match self.freehand.extend(&mut session.stack, pos, now) {
            Some(rect) => {
                resync_rect(&mut session.stack, rect);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Finish the stroke and record it in history.
    pub fn end_stroke(&mut self) -> Option<StrokeEvent> {
        let session = self.session.as_mut()?;
        let stack = &mut session.stack;
        let event = self.freehand.finish(stack)?;
        let kind = match event.kind {
            ToolKind::Eraser => {
                if let Err(e) = stack.resync_processing() {
                    log_warn!("Processing resync after eraser stroke failed: {}", e);
                }
                self.flood.refresh(stack.surface(SurfaceKind::Processing));
                HistoryKind::Eraser
            }
            _ => {
                resync_rect(stack, event.bounds);
                self.flood
                    .refresh_rect(stack.surface(SurfaceKind::Processing), event.bounds);
                HistoryKind::Pencil
            }
        };
        self.history.commit(kind, stack);
        self.dirty = true;
        Some(event)
    }

    /// Abort the stroke, restoring the surfaces it touched.
    pub fn cancel_stroke(&mut self) {
        let Some(session) = self.session.as_mut() else { return };
        let stack = &mut session.stack;
        if let Some(rect) = self.freehand.cancel(stack) {
            resync_rect(stack, rect);
            self.flood
                .refresh_rect(stack.surface(SurfaceKind::Processing), rect);
            self.dirty = true;
        }
    }

    pub fn stroke_active(&self) -> bool {
        self.freehand.is_active()
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub fn undo(&mut self) -> Result<bool, EngineError> {
        self.settle_for_history();
        let session = self.session.as_mut().ok_or(EngineError::NoImage)?;
        let undone = self.history.undo(&mut session.stack)?;
        self.after_restore(undone.is_some());
        Ok(undone.is_some())
    }

    pub fn redo(&mut self) -> Result<bool, EngineError> {
        self.settle_for_history();
        let session = self.session.as_mut().ok_or(EngineError::NoImage)?;
        let redone = self.history.redo(&mut session.stack)?;
        self.after_restore(redone.is_some());
        Ok(redone.is_some())
    }

    /// Wipe all paint and start the history over.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.settle_for_history();
        let session = self.session.as_mut().ok_or(EngineError::NoImage)?;
        session.stack.clear_paint()?;
        self.history.reset(&session.stack);
        self.flood.gate_mut().reset();
        self.after_restore(true);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn settle_for_history(&mut self) {
        self.finish_pending();
        self.cancel_stroke();
        self.pending_press = None;
    }

    fn after_restore(&mut self, changed: bool) {
        if !changed {
            return;
        }
        if let Some(session) = self.session.as_ref() {
            self.flood
                .refresh(session.stack.surface(SurfaceKind::Processing));
        }
        self.dirty = true;
    }

    // ========================================================================
    // EXPORT
    // ========================================================================

    /// Flattened image including the outline overlay. Completes any fade
    /// first so the export matches history.
    pub fn export_composite(&mut self) -> Result<RgbaImage, EngineError> {
        self.finish_pending();
        let session = self.session.as_ref().ok_or(EngineError::NoImage)?;
        Ok(session.stack.export_composite())
    }

    pub fn export_png(&mut self) -> Result<Vec<u8>, EngineError> {
        let image = self.export_composite()?;
        Ok(io::encode_png(&image)?)
    }

    // ========================================================================
    // VIEWPORT + INPUT
    // ========================================================================

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportState {
        self.dirty = true;
        &mut self.viewport
    }

    pub fn toggle_mode(&mut self) -> ViewMode {
        self.pending_press = None;
        if self.freehand.is_active() {
            self.end_stroke();
        }
        self.dirty = true;
        self.viewport.toggle_mode()
    }

    /// Fit the canvas into a view of the given size.
    pub fn fit_to_view(&mut self, view_size: Vec2) {
        if let Some(stack) = self.stack() {
            let size = Vec2::new(stack.width() as f32, stack.height() as f32);
            self.viewport.fit(size, view_size);
            self.dirty = true;
        }
    }

    /// Route one unified input event. Returns true if anything visible
    /// changed.
    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> bool {
        let actions = self.gestures.handle(event, self.viewport.mode());
        let mut changed = false;
        for action in actions {
            changed |= self.apply_action(action, now);
        }
        changed
    }

    fn apply_action(&mut self, action: GestureAction, now: Instant) -> bool {
        match action {
            GestureAction::ToolPress(screen) => {
                let pos = self.viewport.screen_to_canvas(screen);
                if self.tools.active.is_freehand() {
                    self.begin_stroke(pos, now)
                } else {
                    self.pending_press = Some(pos);
                    false
                }
            }
            GestureAction::ToolDrag(screen) => {
                if self.freehand.is_active() {
                    let pos = self.viewport.screen_to_canvas(screen);
                    self.extend_stroke(pos, now)
                } else {
                    false
                }
            }
            GestureAction::ToolRelease(screen) => {
                let pos = self.viewport.screen_to_canvas(screen);
                if self.freehand.is_active() {
                    self.extend_stroke(pos, now);
                    self.end_stroke().is_some()
                } else if self.pending_press.take().is_some() {
                    let (x, y) = (pos.x.floor() as i64, pos.y.floor() as i64);
                    self.fill_at(x, y, now).is_started()
                } else {
                    false
                }
            }
            GestureAction::ToolCancel => {
                self.pending_press = None;
                let active = self.freehand.is_active();
                self.cancel_stroke();
                active
            }
            GestureAction::Pan(delta) => {
                self.viewport.pan_by(delta);
                self.dirty = true;
                true
            }
            GestureAction::Zoom { factor, focal } => {
                self.viewport.zoom_about(factor, focal);
                self.dirty = true;
                true
            }
        }
    }

    // ========================================================================
    // PRESENTATION
    // ========================================================================

    /// Returns and clears the "needs redraw" flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

fn resync_rect(stack: &mut LayerStack, rect: PixelRect) {
    if let Err(e) = stack.resync_processing_rect(rect) {
        log_warn!("Processing resync failed: {}", e);
    }
}
