// ============================================================================
// VIEWPORT - scale / pan / mode, screen = canvas * scale + pan
// ============================================================================

use egui::{Pos2, Vec2};

pub const DEFAULT_MIN_SCALE: f32 = 0.1;
pub const DEFAULT_MAX_SCALE: f32 = 32.0;

/// What a lone contact does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Single contact drives the active tool.
    #[default]
    Draw,
    /// Single contact pans; wheel zooms.
    Zoom,
}

impl ViewMode {
    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Draw => "Draw",
            ViewMode::Zoom => "Pan / Zoom",
        }
    }
}

/// Canvas-to-screen transform. Screen coordinates are relative to the
/// top-left of the canvas view; it never touches pixel data.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportState {
    scale: f32,
    pan: Vec2,
    mode: ViewMode,
    min_scale: f32,
    max_scale: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SCALE, DEFAULT_MAX_SCALE)
    }
}

impl ViewportState {
    pub fn new(min_scale: f32, max_scale: f32) -> Self {
        let min_scale = if min_scale.is_finite() && min_scale > 0.0 {
            min_scale
        } else {
            DEFAULT_MIN_SCALE
        };
        let max_scale = if max_scale.is_finite() && max_scale >= min_scale {
            max_scale
        } else {
            DEFAULT_MAX_SCALE.max(min_scale)
        };
        Self {
            scale: 1.0_f32.clamp(min_scale, max_scale),
            pan: Vec2::ZERO,
            mode: ViewMode::Draw,
            min_scale,
            max_scale,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pan(&self) -> Vec2 {
        self.pan
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn scale_limits(&self) -> (f32, f32) {
        (self.min_scale, self.max_scale)
    }

    pub fn canvas_to_screen(&self, canvas: Pos2) -> Pos2 {
        Pos2::new(canvas.x * self.scale + self.pan.x, canvas.y * self.scale + self.pan.y)
    }

    pub fn screen_to_canvas(&self, screen: Pos2) -> Pos2 {
        Pos2::new(
            (screen.x - self.pan.x) / self.scale,
            (screen.y - self.pan.y) / self.scale,
        )
    }

    /// Zoom by `factor` keeping the canvas point under `focal` fixed on
    /// screen. The scale is clamped; the pan uses the factor actually
    /// applied. Returns that factor.
    pub fn zoom_about(&mut self, factor: f32, focal: Pos2) -> f32 {
        if !factor.is_finite() || factor <= 0.0 {
            return 1.0;
        }
        let old_scale = self.scale;
        self.scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        let actual = self.scale / old_scale;
        let focal = focal.to_vec2();
        self.pan = focal - (focal - self.pan) * actual;
        actual
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.pan += delta;
        }
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> ViewMode {
        self.mode = match self.mode {
            ViewMode::Draw => ViewMode::Zoom,
            ViewMode::Zoom => ViewMode::Draw,
        };
        self.mode
    }

    /// Back to 1:1 at the origin. The mode is left alone.
    pub fn reset(&mut self) {
        self.scale = 1.0_f32.clamp(self.min_scale, self.max_scale);
        self.pan = Vec2::ZERO;
    }

    /// Largest scale (up to 1:1) showing the whole canvas, centred in the view.
    pub fn fit(&mut self, canvas_size: Vec2, view_size: Vec2) {
        if canvas_size.x <= 0.0 || canvas_size.y <= 0.0 || view_size.x <= 0.0 || view_size.y <= 0.0 {
            return;
        }
        let fit = (view_size.x / canvas_size.x).min(view_size.y / canvas_size.y);
        self.scale = fit.min(1.0).clamp(self.min_scale, self.max_scale);
        self.pan = (view_size - canvas_size * self.scale) * 0.5;
    }
}
