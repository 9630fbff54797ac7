use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logger::{self, APP_DIR_NAME};

pub const SETTINGS_FILE_NAME: &str = "settings.cfg";

/// History capacity bounds, including the initial entry.
pub const MIN_HISTORY_LIMIT: usize = 2;
pub const MAX_HISTORY_LIMIT: usize = 50;

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    /// The data directory could not be determined or created.
    NoDataDir,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "I/O error: {}", e),
            SettingsError::NoDataDir => write!(f, "no writable data directory"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

/// Tunables for the coloring engine, persisted as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub history_limit: usize,
    pub history_memory_mb: usize,
    pub fill_debounce_ms: u64,
    pub fill_fade_ms: u64,
    pub stroke_interval_ms: u64,
    pub boundary_threshold: u8,
    pub outline_threshold: u8,
    pub pencil_size: f32,
    pub eraser_size: f32,
    pub max_canvas_edge: u32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub wheel_zoom_step: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            history_memory_mb: 512,
            fill_debounce_ms: 500,
            fill_fade_ms: 300,
            stroke_interval_ms: 16,
            boundary_threshold: 80,
            outline_threshold: 50,
            pencil_size: 4.0,
            eraser_size: 16.0,
            max_canvas_edge: 8192,
            min_scale: 0.1,
            max_scale: 32.0,
            wheel_zoom_step: 1.1,
        }
    }
}

impl EngineSettings {
    /// `<data dir>/LineFill/settings.cfg`
    pub fn settings_path() -> PathBuf {
        logger::data_dir().join(APP_DIR_NAME).join(SETTINGS_FILE_NAME)
    }

    /// Load from the default location; defaults if the file is missing.
    pub fn load() -> Self {
        Self::load_from(&Self::settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines. Unknown keys, comments and bad values are
    /// skipped; every field falls back to its default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "history_limit" => {
                    if let Some(v) = val.parse().ok().filter(|&v: &usize| v >= MIN_HISTORY_LIMIT) {
                        s.history_limit = v.min(MAX_HISTORY_LIMIT);
                    }
                }
                "history_memory_mb" => {
                    if let Ok(v) = val.parse() {
                        s.history_memory_mb = v;
                    }
                }
                "fill_debounce_ms" => {
                    if let Ok(v) = val.parse() {
                        s.fill_debounce_ms = v;
                    }
                }
                "fill_fade_ms" => {
                    if let Ok(v) = val.parse() {
                        s.fill_fade_ms = v;
                    }
                }
                "stroke_interval_ms" => {
                    if let Ok(v) = val.parse() {
                        s.stroke_interval_ms = v;
                    }
                }
                "boundary_threshold" => {
                    if let Ok(v) = val.parse() {
                        s.boundary_threshold = v;
                    }
                }
                "outline_threshold" => {
                    if let Ok(v) = val.parse() {
                        s.outline_threshold = v;
                    }
                }
                "pencil_size" => {
                    if let Some(v) = parse_positive(val) {
                        s.pencil_size = v;
                    }
                }
                "eraser_size" => {
                    if let Some(v) = parse_positive(val) {
                        s.eraser_size = v;
                    }
                }
                "max_canvas_edge" => {
                    if let Some(v) = val.parse().ok().filter(|&v: &u32| v > 0) {
                        s.max_canvas_edge = v;
                    }
                }
                "min_scale" => {
                    if let Some(v) = parse_positive(val) {
                        s.min_scale = v;
                    }
                }
                "max_scale" => {
                    if let Some(v) = parse_positive(val) {
                        s.max_scale = v;
                    }
                }
                "wheel_zoom_step" => {
                    if let Some(v) = parse_positive(val).filter(|&v| v > 1.0) {
                        s.wheel_zoom_step = v;
                    }
                }
                _ => {}
            }
        }
        if s.max_scale < s.min_scale {
            s.max_scale = s.min_scale;
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "history_limit={}\n\
             history_memory_mb={}\n\
             fill_debounce_ms={}\n\
             fill_fade_ms={}\n\
             stroke_interval_ms={}\n\
             boundary_threshold={}\n\
             outline_threshold={}\n\
             pencil_size={}\n\
             eraser_size={}\n\
             max_canvas_edge={}\n\
             min_scale={}\n\
             max_scale={}\n\
             wheel_zoom_step={}\n",
            self.history_limit,
            self.history_memory_mb,
            self.fill_debounce_ms,
            self.fill_fade_ms,
            self.stroke_interval_ms,
            self.boundary_threshold,
            self.outline_threshold,
            self.pencil_size,
            self.eraser_size,
            self.max_canvas_edge,
            self.min_scale,
            self.max_scale,
            self.wheel_zoom_step,
        )
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let dir = path.parent().ok_or(SettingsError::NoDataDir)?;
        std::fs::create_dir_all(dir)?;
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    pub fn fill_debounce(&self) -> Duration {
        Duration::from_millis(self.fill_debounce_ms)
    }

    pub fn fill_fade(&self) -> Duration {
        Duration::from_millis(self.fill_fade_ms)
    }

    pub fn stroke_interval(&self) -> Duration {
        Duration::from_millis(self.stroke_interval_ms)
    }

    /// `None` disables the byte budget.
    pub fn history_memory_bytes(&self) -> Option<usize> {
        (self.history_memory_mb > 0).then(|| self.history_memory_mb.saturating_mul(1024 * 1024))
    }
}

fn parse_positive(val: &str) -> Option<f32> {
    val.parse::<f32>().ok().filter(|v| v.is_finite() && *v > 0.0)
}
