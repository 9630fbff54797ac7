use std::path::Path;
use std::time::Instant;

use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, TextureOptions, Vec2};

use linefill::canvas::SurfaceKind;
use linefill::components::tools::ToolKind;
use linefill::engine::ColoringEngine;
use linefill::input::{EguiInputAdapter, InputEvent};
use linefill::io::{self, Artwork, ImageSource};
use linefill::settings::EngineSettings;
use linefill::viewport::ViewMode;
use linefill::{log_err, log_info};

const CANVAS_BACKDROP: Color32 = Color32::from_rgb(0x3A, 0x3D, 0x44);
const SWATCH_SIZE: f32 = 22.0;

/// Identifies what the uploaded texture shows.
type ContentRevision = (uuid::Uuid, u64, u64);

pub struct LineFillApp {
    engine: ColoringEngine,
    adapter: EguiInputAdapter,
    texture: Option<egui::TextureHandle>,
    texture_revision: Option<ContentRevision>,
    /// Fit the canvas into the view on the next frame (after a load).
    needs_fit: bool,
    hex_input: String,
    status: String,
}

impl LineFillApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: EngineSettings, initial: Option<String>) -> Self {
        let mut app = Self {
            engine: ColoringEngine::new(settings),
            adapter: EguiInputAdapter::new(),
            texture: None,
            texture_revision: None,
            needs_fit: false,
            hex_input: String::new(),
            status: "Open a line-art image to start coloring.".to_string(),
        };
        app.hex_input = app.engine.tools().color.to_hex();
        if let Some(location) = initial {
            app.open_location(&location);
        }
        app
    }

    // ========================================================================
    // FILE ACTIONS
    // ========================================================================

    fn open_dialog(&mut self) {
        if let Some(path) = io::pick_image_path() {
            self.open_location(&path.to_string_lossy());
        }
    }

    /// Open an image path/URL or an artwork manifest (`.json`).
    fn open_location(&mut self, location: &str) {
        let is_manifest = Path::new(location)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let result = if is_manifest {
            Artwork::from_file(Path::new(location))
                .map_err(Into::into)
                .and_then(|art| self.engine.load_artwork(&art))
        } else {
            self.engine.load_source(&ImageSource::parse(location))
        };
        match result {
            Ok(()) => {
                self.needs_fit = true;
                self.hex_input = self.engine.tools().color.to_hex();
                if let Some(session) = self.engine.session() {
                    self.status = format!(
                        "{} ({}x{})",
                        session.title,
                        session.stack.width(),
                        session.stack.height()
                    );
                }
            }
            Err(e) => {
                log_err!("Open failed for {}: {}", location, e);
                self.status = format!("Could not open {}: {}", location, e);
            }
        }
    }

    fn export_dialog(&mut self) {
        let name = self
            .engine
            .session()
            .map(|s| s.title.clone())
            .unwrap_or_else(|| "coloring".to_string());
        let Some(path) = io::pick_export_path(&name) else { return };
        let result = self
            .engine
            .export_composite()
            .map_err(|e| e.to_string())
            .and_then(|img| io::write_png(&img, &path).map_err(|e| e.to_string()));
        match result {
            Ok(()) => {
                log_info!("Exported {}", path.display());
                self.status = format!("Exported {}", path.display());
            }
            Err(e) => {
                log_err!("Export to {} failed: {}", path.display(), e);
                self.status = format!("Export failed: {}", e);
            }
        }
    }

    fn report(&mut self, result: Result<bool, linefill::engine::EngineError>, what: &str) {
        if let Err(e) = result {
            log_err!("{} failed: {}", what, e);
            self.status = format!("{} failed: {}", what, e);
        }
    }

    // ========================================================================
    // TOOLBAR
    // ========================================================================

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            if ui.button("Open…").clicked() {
                self.open_dialog();
            }
            let has_image = self.engine.has_image();
            if ui.add_enabled(has_image, egui::Button::new("Export PNG…")).clicked() {
                self.export_dialog();
            }
            ui.separator();

            if ui.add_enabled(self.engine.can_undo(), egui::Button::new("Undo")).clicked() {
                let r = self.engine.undo();
                self.report(r, "Undo");
            }
            if ui.add_enabled(self.engine.can_redo(), egui::Button::new("Redo")).clicked() {
                let r = self.engine.redo();
                self.report(r, "Redo");
            }
            if ui.add_enabled(has_image, egui::Button::new("Reset")).clicked() {
                let r = self.engine.reset().map(|_| true);
                self.report(r, "Reset");
            }
            ui.separator();

            let active = self.engine.tools().active;
            for &kind in ToolKind::all() {
                if ui.selectable_label(active == kind, kind.label()).clicked() {
                    self.engine.select_tool(kind);
                }
            }
            ui.separator();

            let mode = self.engine.viewport().mode();
            if ui
                .selectable_label(mode == ViewMode::Zoom, ViewMode::Zoom.label())
                .on_hover_text("Space toggles between drawing and pan/zoom")
                .clicked()
            {
                self.engine.toggle_mode();
            }
            if ui.button("Fit").clicked() {
                self.needs_fit = true;
            }
            ui.label(format!("{:.0}%", self.engine.viewport().scale() * 100.0));
        });

        ui.horizontal_wrapped(|ui| {
            let mut pencil = self.engine.tools().pencil_size;
            if ui
                .add(egui::Slider::new(&mut pencil, 1.0..=64.0).text("Pencil"))
                .changed()
            {
                self.engine.set_pencil_size(pencil);
            }
            let mut eraser = self.engine.tools().eraser_size;
            if ui
                .add(egui::Slider::new(&mut eraser, 1.0..=128.0).text("Eraser"))
                .changed()
            {
                self.engine.set_eraser_size(eraser);
            }
            ui.separator();

            let current = self.engine.tools().color;
            let palette: Vec<_> = self
                .engine
                .session()
                .map(|s| s.palette.clone())
                .unwrap_or_else(|| linefill::components::colors::resolve_palette(None));
            for (name, color) in palette {
                let mut button = egui::Button::new("")
                    .fill(color.to_color32())
                    .min_size(Vec2::splat(SWATCH_SIZE));
                if color == current {
                    button = button.stroke(egui::Stroke::new(2.0, ui.visuals().strong_text_color()));
                }
                if ui.add(button).on_hover_text(name.as_str()).clicked() {
                    self.engine.set_color_rgb(color);
                    self.hex_input = color.to_hex();
                }
            }

            let edit = ui.add(egui::TextEdit::singleline(&mut self.hex_input).desired_width(70.0));
            if edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                match self.engine.set_color(&self.hex_input) {
                    Ok(rgb) => self.hex_input = rgb.to_hex(),
                    Err(e) => self.status = e.to_string(),
                }
            }
        });
    }

    // ========================================================================
    // CANVAS VIEW
    // ========================================================================

    fn canvas_view(&mut self, ui: &mut egui::Ui, now: Instant) {
        let (rect, _response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        self.adapter.set_origin(rect.min);

        if self.needs_fit && self.engine.has_image() {
            self.engine.fit_to_view(rect.size());
            self.needs_fit = false;
        }

        // Route raw events through the adapter. Presses, wheel and magnify
        // only count when they land on the canvas view.
        let events = ui.ctx().input(|i| i.events.clone());
        let view = Rect::from_min_size(Pos2::ZERO, rect.size());
        for event in &events {
            let Some(input) = self.adapter.translate(event) else { continue };
            let inside = match input {
                InputEvent::Down { pos, .. }
                | InputEvent::Wheel { pos, .. }
                | InputEvent::Magnify { pos, .. } => view.contains(pos),
                _ => true,
            };
            if inside {
                self.engine.handle_input(input, now);
            }
        }

        self.upload_texture(ui.ctx());

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, CANVAS_BACKDROP);
        if let (Some(texture), Some(stack)) = (self.texture.as_ref(), self.engine.stack()) {
            let viewport = self.engine.viewport();
            let min = rect.min + viewport.pan();
            let size = Vec2::new(stack.width() as f32, stack.height() as f32) * viewport.scale();
            painter.image(
                texture.id(),
                Rect::from_min_size(min, size),
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        } else {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Open an image (Ctrl+O)",
                egui::FontId::proportional(18.0),
                Color32::from_gray(200),
            );
        }
    }

    /// Re-upload the composite when the painted content changed.
    fn upload_texture(&mut self, ctx: &egui::Context) {
        let Some(session) = self.engine.session() else {
            self.texture = None;
            self.texture_revision = None;
            return;
        };
        let stack = &session.stack;
        let revision = (
            session.id,
            stack.surface(SurfaceKind::Fill).generation(),
            stack.surface(SurfaceKind::Interaction).generation(),
        );
        if self.texture_revision == Some(revision) && self.texture.is_some() {
            return;
        }
        let composite = stack.export_composite();
        let image = ColorImage::from_rgba_unmultiplied(
            [composite.width() as usize, composite.height() as usize],
            composite.as_raw(),
        );
        match self.texture.as_mut() {
            Some(tex) => tex.set(image, TextureOptions::NEAREST),
            None => self.texture = Some(ctx.load_texture("linefill_canvas", image, TextureOptions::NEAREST)),
        }
        self.texture_revision = Some(revision);
    }

    fn shortcuts(&mut self, ctx: &egui::Context) {
        // Keyboard shortcuts only when no text field has focus
        if ctx.memory(|m| m.focus().is_some()) {
            return;
        }
        let (command, shift) = ctx.input(|i| (i.modifiers.command, i.modifiers.shift));
        if command && ctx.input(|i| i.key_pressed(egui::Key::O)) {
            self.open_dialog();
        }
        if command && ctx.input(|i| i.key_pressed(egui::Key::S)) && self.engine.has_image() {
            self.export_dialog();
        }
        if command && ctx.input(|i| i.key_pressed(egui::Key::Z)) {
            if shift {
                let r = self.engine.redo();
                self.report(r, "Redo");
            } else {
                let r = self.engine.undo();
                self.report(r, "Undo");
            }
        }
        if command && ctx.input(|i| i.key_pressed(egui::Key::Y)) {
            let r = self.engine.redo();
            self.report(r, "Redo");
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.engine.toggle_mode();
        }
        if !command {
            if ctx.input(|i| i.key_pressed(egui::Key::F)) {
                self.engine.select_tool(ToolKind::Fill);
            }
            if ctx.input(|i| i.key_pressed(egui::Key::P)) {
                self.engine.select_tool(ToolKind::Pencil);
            }
            if ctx.input(|i| i.key_pressed(egui::Key::E)) {
                self.engine.select_tool(ToolKind::Eraser);
            }
        }
    }
}

impl eframe::App for LineFillApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        let title = match self.engine.session() {
            Some(session) => format!("LineFill - {}", session.title),
            None => "LineFill".to_string(),
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));

        self.shortcuts(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui);
        });
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(self.status.as_str());
        });
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                self.canvas_view(ui, now);
            });

        // Fades are frame-driven
        if self.engine.tick(now) {
            self.upload_texture(ctx);
        }
        if self.engine.take_dirty() || self.engine.fade_in_progress() {
            ctx.request_repaint();
        }
    }
}
