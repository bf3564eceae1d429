//! Color computations shared by every painter.
//!
//! All functions are pure. Invalid or missing hex input never fails: it falls
//! back to white so a bad stored value degrades to a pale tint instead of a
//! crash or a black wash over the calendar.

/// Text color used on light backgrounds.
pub const DARK_TEXT: &str = "#111";

/// Text color used on dark backgrounds.
pub const LIGHT_TEXT: &str = "#fff";

/// Luminance above which dark text is chosen.
///
/// Empirical, not derived from WCAG contrast-ratio math against both text
/// candidates. Good enough for tinted chips; not an accessibility guarantee.
pub const CONTRAST_LUMINANCE_THRESHOLD: f64 = 0.6;

/// Alpha tolerance when comparing two colors read back from the page.
const ALPHA_EPSILON: f64 = 0.01;

/// An sRGB color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Lowercase `#rrggbb` form.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Parse a hex color string. Returns None if invalid.
///
/// Accepts `#rgb`, `#rrggbb`, with or without the leading `#`.
pub fn parse_hex_color(color: &str) -> Option<Rgb> {
    let color = color.trim().trim_start_matches('#');

    // Expand shorthand (e.g., "fff" -> "ffffff")
    let color = if color.len() == 3 {
        color.chars().flat_map(|c| [c, c]).collect::<String>()
    } else {
        color.to_string()
    };

    if color.len() != 6 || !color.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&color[0..2], 16).ok()?;
    let g = u8::from_str_radix(&color[2..4], 16).ok()?;
    let b = u8::from_str_radix(&color[4..6], 16).ok()?;

    Some(Rgb { r, g, b })
}

/// Return true if the string is a `#rgb` or `#rrggbb` color.
pub fn is_valid_hex(color: &str) -> bool {
    color.trim().starts_with('#') && parse_hex_color(color).is_some()
}

/// Convert hex to RGB, defaulting to white for invalid or absent input.
pub fn hex_to_rgb(hex: Option<&str>) -> Rgb {
    hex.and_then(parse_hex_color).unwrap_or(Rgb::WHITE)
}

/// Calculate relative luminance per WCAG formula (0.0 = black, 1.0 = white).
pub fn relative_luminance(rgb: Rgb) -> f64 {
    fn channel(c: u8) -> f64 {
        let c_srgb = f64::from(c) / 255.0;
        if c_srgb <= 0.03928 {
            c_srgb / 12.92
        } else {
            ((c_srgb + 0.055) / 1.055).powf(2.4)
        }
    }

    0.2126 * channel(rgb.r) + 0.7152 * channel(rgb.g) + 0.0722 * channel(rgb.b)
}

/// Pick a readable text color for the given background.
pub fn contrasting_text_color(hex: &str) -> &'static str {
    if relative_luminance(hex_to_rgb(Some(hex))) > CONTRAST_LUMINANCE_THRESHOLD {
        DARK_TEXT
    } else {
        LIGHT_TEXT
    }
}

/// Format an alpha value the way browsers serialize it (`0.3`, `1`, `0.05`).
fn format_alpha(alpha: f64) -> String {
    let rounded = (alpha * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

/// Convert a hex color plus an opacity percentage (0-100) into `rgba(...)`.
///
/// The range is the caller's responsibility; no clamping happens here.
pub fn hex_to_rgba(hex: &str, alpha_percent: u8) -> String {
    let Rgb { r, g, b } = hex_to_rgb(Some(hex));
    let alpha = f64::from(alpha_percent) / 100.0;
    format!("rgba({r}, {g}, {b}, {})", format_alpha(alpha))
}

/// A color read back from the page, normalized for comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CssColor {
    pub rgb: Rgb,
    pub alpha: f64,
}

impl CssColor {
    /// Compare two colors, tolerating float noise in the alpha channel.
    pub fn same_as(&self, other: &CssColor) -> bool {
        self.rgb == other.rgb && (self.alpha - other.alpha).abs() < ALPHA_EPSILON
    }
}

/// Normalize a CSS color value into a comparable form.
///
/// Understands hex, `rgb()`, `rgba()` (with or without spaces, with an
/// optional `!important` suffix) and the handful of keywords browsers hand
/// back for backgrounds. Anything else returns None, which callers treat as
/// "needs repaint".
pub fn parse_css_color(value: &str) -> Option<CssColor> {
    let value = value.trim().trim_end_matches("!important").trim();
    let lower = value.to_ascii_lowercase();

    match lower.as_str() {
        "white" => {
            return Some(CssColor {
                rgb: Rgb::WHITE,
                alpha: 1.0,
            });
        }
        "black" => {
            return Some(CssColor {
                rgb: Rgb::BLACK,
                alpha: 1.0,
            });
        }
        "transparent" => {
            return Some(CssColor {
                rgb: Rgb::BLACK,
                alpha: 0.0,
            });
        }
        _ => {}
    }

    if lower.starts_with('#') {
        return parse_hex_color(&lower).map(|rgb| CssColor { rgb, alpha: 1.0 });
    }

    let inner = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |s: &str| s.parse::<f64>().ok().map(|v| v.round().clamp(0.0, 255.0) as u8);
    let rgb = Rgb {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
    };
    let alpha = match parts.get(3) {
        Some(a) => a.parse::<f64>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };

    Some(CssColor { rgb, alpha })
}

/// Return true if two CSS color strings describe the same color.
pub fn colors_match(current: &str, target: &str) -> bool {
    match (parse_css_color(current), parse_css_color(target)) {
        (Some(a), Some(b)) => a.same_as(&b),
        _ => false,
    }
}

/// Convert an `rgb()`/`rgba()` value to `#rrggbb`, ignoring alpha.
pub fn css_color_to_hex(value: &str) -> Option<String> {
    parse_css_color(value).map(|c| c.rgb.to_hex())
}
