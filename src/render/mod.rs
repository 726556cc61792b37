mod compositor;
mod font;
mod layout;

use anyhow::{Result, anyhow};
use std::str::FromStr;

use crate::settings::Settings;

pub use compositor::Compositor;
pub use font::{
    FontMetrics, MIN_FIT_FONT_SIZE, ResolvedOverlayFont, fit_font_size, load_font_metrics,
    measure_text_width, resolve_overlay_font,
};
pub use layout::{
    LINE_HEIGHT_RATIO, MIN_RENDER_FONT_SIZE, WrappedText, fit_single_line, fit_wrapped, wrap_words,
};

/// Families tried in order when no overlay font is configured.
pub const FALLBACK_FONT_FAMILIES: [&str; 5] = [
    "Arial",
    "Helvetica",
    "DejaVu Sans",
    "Liberation Sans",
    "sans-serif",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Fill the detected box and center one clipped line inside it.
    #[default]
    InPlace,
    /// Draw a background sized to the text at the box's top-left.
    Overwrite,
    /// Fill the box and word-wrap the translation inside it.
    Wrap,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::InPlace => "in_place",
            RenderMode::Overwrite => "overwrite",
            RenderMode::Wrap => "wrap",
        }
    }
}

impl FromStr for RenderMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_place" | "in-place" | "inplace" => Ok(RenderMode::InPlace),
            "overwrite" => Ok(RenderMode::Overwrite),
            "wrap" => Ok(RenderMode::Wrap),
            other => Err(anyhow!(
                "unknown overlay mode '{}' (expected in_place, overwrite or wrap)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub mode: RenderMode,
    pub text_color: String,
    pub fill_color: String,
    pub padding: f32,
    pub font_family: Option<String>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            mode: RenderMode::InPlace,
            text_color: "#ffffff".to_string(),
            fill_color: "#000000".to_string(),
            padding: 8.0,
            font_family: None,
        }
    }
}

impl OverlayStyle {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.overlay_mode,
            text_color: settings.overlay_text_color.clone(),
            fill_color: settings.overlay_fill_color.clone(),
            padding: settings.overlay_padding,
            font_family: settings.overlay_font_family.clone(),
        }
    }
}
