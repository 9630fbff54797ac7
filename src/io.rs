use image::codecs::png::PngEncoder;
use image::{ImageError, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::canvas::CanvasError;
use crate::components::colors::SuggestedColor;

/// Upper bound on a downloaded artwork body.
pub const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Raster formats the decoder is built with.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

// ============================================================================
// ERRORS
// ============================================================================

/// Why an image could not be loaded. The engine stays usable after any of
/// these.
#[derive(Debug)]
pub enum LoadError {
    /// The server or filesystem refused access (HTTP 401/403, permission denied).
    AccessDenied(String),
    /// HTTP 404/410 or a missing file.
    NotFound(String),
    /// Any other transport failure.
    Network(String),
    /// Bytes arrived but are not a usable image (or manifest).
    Decode(String),
    Io(std::io::Error),
    /// The decoded image cannot back a layer stack.
    Canvas(CanvasError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::AccessDenied(what) => write!(f, "Access denied: {}", what),
            LoadError::NotFound(what) => write!(f, "Not found: {}", what),
            LoadError::Network(e) => write!(f, "Network error: {}", e),
            LoadError::Decode(e) => write!(f, "Could not decode image: {}", e),
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Canvas(e) => write!(f, "Unusable image: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::NotFound => LoadError::NotFound(e.to_string()),
            ErrorKind::PermissionDenied => LoadError::AccessDenied(e.to_string()),
            _ => LoadError::Io(e),
        }
    }
}

impl From<CanvasError> for LoadError {
    fn from(e: CanvasError) -> Self {
        LoadError::Canvas(e)
    }
}

impl From<ImageError> for LoadError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => io.into(),
            other => LoadError::Decode(other.to_string()),
        }
    }
}

impl From<ureq::Error> for LoadError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(code @ (401 | 403)) => {
                LoadError::AccessDenied(format!("HTTP {}", code))
            }
            ureq::Error::StatusCode(code @ (404 | 410)) => {
                LoadError::NotFound(format!("HTTP {}", code))
            }
            ureq::Error::StatusCode(code) => LoadError::Network(format!("HTTP {}", code)),
            other => LoadError::Network(other.to_string()),
        }
    }
}

// ============================================================================
// SOURCES
// ============================================================================

/// Where an artwork's raster lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    Remote(String),
    File(PathBuf),
}

impl ImageSource {
    /// `http(s)://` is remote; `file://` and anything else is a local path.
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ImageSource::Remote(trimmed.to_string())
        } else if lower.starts_with("file://") {
            ImageSource::File(PathBuf::from(&trimmed["file://".len()..]))
        } else {
            ImageSource::File(PathBuf::from(trimmed))
        }
    }

    /// A short human name: the file stem or the last URL segment.
    pub fn display_name(&self) -> String {
        match self {
            ImageSource::Remote(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
                .filter(|s| !s.is_empty())
                .unwrap_or("Artwork")
                .to_string(),
            ImageSource::File(path) => title_from_path(path),
        }
    }
}

pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string()
}

/// Fetch the raw bytes behind a source.
pub fn fetch_bytes(source: &ImageSource) -> Result<Vec<u8>, LoadError> {
    match source {
        ImageSource::Remote(url) => {
            let mut response = ureq::get(url.as_str()).call()?;
            let bytes = response
                .body_mut()
                .with_config()
                .limit(MAX_DOWNLOAD_BYTES)
                .read_to_vec()?;
            Ok(bytes)
        }
        ImageSource::File(path) => Ok(std::fs::read(path)?),
    }
}

/// Decode any supported raster format to RGBA8.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::Decode("empty image data".to_string()));
    }
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

pub fn load_source(source: &ImageSource) -> Result<RgbaImage, LoadError> {
    decode_bytes(&fetch_bytes(source)?)
}

// ============================================================================
// ARTWORK MANIFEST
// ============================================================================

/// An entry from the content catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artwork {
    pub id: String,
    pub title: String,
    pub raster_image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_colors: Option<Vec<SuggestedColor>>,
}

impl Artwork {
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        serde_json::from_str(json).map_err(|e| LoadError::Decode(format!("artwork manifest: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        let mut artwork = Self::from_json(&text)?;
        // Relative raster paths are resolved against the manifest's folder
        if let ImageSource::File(raster) = ImageSource::parse(&artwork.raster_image_url)
            && raster.is_relative()
            && let Some(dir) = path.parent()
        {
            artwork.raster_image_url = dir.join(raster).to_string_lossy().into_owned();
        }
        Ok(artwork)
    }

    pub fn source(&self) -> ImageSource {
        ImageSource::parse(&self.raster_image_url)
    }
}

// ============================================================================
// EXPORT
// ============================================================================

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new(&mut out);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(out)
}

pub fn write_png(image: &RgbaImage, path: &Path) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = PngEncoder::new(&mut writer);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

// ============================================================================
// NATIVE DIALOGS
// ============================================================================

pub fn pick_image_path() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("Artwork Manifest", &["json"])
        .add_filter("All Files", &["*"])
        .pick_file()
}

pub fn pick_export_path(suggested_name: &str) -> Option<PathBuf> {
    let path = FileDialog::new()
        .add_filter("PNG", &["png"])
        .set_file_name(format!("{}.png", suggested_name))
        .save_file()?;
    if path.extension().is_none() {
        return Some(path.with_extension("png"));
    }
    Some(path)
}
