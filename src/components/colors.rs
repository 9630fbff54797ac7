use serde::{Deserialize, Serialize};

// ============================================================================
// RGB COLOUR - plain sRGB values, no colour management
// ============================================================================

/// An opaque sRGB colour as picked by the user or supplied by a palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB`, `RRGGBB`, `#RGB` or `RGB` (case-insensitive).
    pub fn from_hex(hex: &str) -> Result<Self, ColorParseError> {
        let trimmed = hex.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError::InvalidDigit(hex.to_string()));
        }
        match digits.len() {
            6 => {
                let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
                match (channel(0), channel(2), channel(4)) {
                    (Ok(r), Ok(g), Ok(b)) => Ok(Rgb::new(r, g, b)),
                    _ => Err(ColorParseError::InvalidDigit(hex.to_string())),
                }
            }
            3 => {
                let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).map(|v| v * 17);
                match (nibble(0), nibble(1), nibble(2)) {
                    (Ok(r), Ok(g), Ok(b)) => Ok(Rgb::new(r, g, b)),
                    _ => Err(ColorParseError::InvalidDigit(hex.to_string())),
                }
            }
            n => Err(ColorParseError::InvalidLength(n)),
        }
    }

    /// Uppercase `#RRGGBB`.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self, alpha: u8) -> [u8; 4] {
        [self.r, self.g, self.b, alpha]
    }

    pub fn to_color32(self) -> egui::Color32 {
        egui::Color32::from_rgb(self.r, self.g, self.b)
    }
}

/// Pack an RGBA pixel as `0xRRGGBBAA`.
#[inline]
pub fn pack_rgba(px: [u8; 4]) -> u32 {
    u32::from_be_bytes(px)
}

#[inline]
pub fn unpack_rgba(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    InvalidLength(usize),
    InvalidDigit(String),
}

impl std::fmt::Display for ColorParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorParseError::InvalidLength(n) => {
                write!(f, "expected 3 or 6 hex digits, found {}", n)
            }
            ColorParseError::InvalidDigit(s) => write!(f, "not a hex colour: {:?}", s),
        }
    }
}

impl std::error::Error for ColorParseError {}

// ============================================================================
// PALETTE
// ============================================================================

/// A named swatch as delivered by the content layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedColor {
    pub name: String,
    pub hex: String,
}

impl SuggestedColor {
    pub fn new(name: &str, hex: &str) -> Self {
        Self {
            name: name.to_string(),
            hex: hex.to_string(),
        }
    }

    pub fn rgb(&self) -> Result<Rgb, ColorParseError> {
        Rgb::from_hex(&self.hex)
    }
}

/// Swatches offered when an artwork ships without a suggested palette.
pub fn default_palette() -> Vec<SuggestedColor> {
    [
        ("Red", "#E53935"),
        ("Orange", "#FB8C00"),
        ("Yellow", "#FDD835"),
        ("Green", "#43A047"),
        ("Teal", "#00897B"),
        ("Sky", "#29B6F6"),
        ("Blue", "#1E88E5"),
        ("Purple", "#8E24AA"),
        ("Pink", "#EC407A"),
        ("Brown", "#6D4C41"),
        ("Grey", "#9E9E9E"),
        ("Black", "#000000"),
    ]
    .iter()
    .map(|(name, hex)| SuggestedColor::new(name, hex))
    .collect()
}

/// Resolve a suggested palette into usable swatches, skipping unparsable
/// entries. Falls back to [`default_palette`] when nothing usable remains.
pub fn resolve_palette(suggested: Option<&[SuggestedColor]>) -> Vec<(String, Rgb)> {
    let parsed: Vec<(String, Rgb)> = suggested
        .unwrap_or(&[])
        .iter()
        .filter_map(|c| c.rgb().ok().map(|rgb| (c.name.clone(), rgb)))
        .collect();
    if !parsed.is_empty() {
        return parsed;
    }
    default_palette()
        .iter()
        .filter_map(|c| c.rgb().ok().map(|rgb| (c.name.clone(), rgb)))
        .collect()
}
