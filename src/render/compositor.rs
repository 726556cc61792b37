use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{Pixmap, Transform};
use tracing::{debug, warn};
use usvg::{Options, Tree, fontdb};

use super::font::{FontMetrics, ResolvedOverlayFont, fit_font_size, measure_text_width, resolve_overlay_font};
use super::layout::{fit_single_line, fit_wrapped};
use super::{FALLBACK_FONT_FAMILIES, OverlayStyle, RenderMode};
use crate::geometry::{BoundingBox, PixelRect, to_pixel_rect};
use crate::ocr::TranslatedRegion;
use crate::settings::Settings;

// Distance from the vertical center to the baseline, in ems.
const CENTER_BASELINE_RATIO: f32 = 0.35;

/// Paints translated regions over an image.
#[derive(Clone)]
pub struct Compositor {
    style: OverlayStyle,
    font: Option<ResolvedOverlayFont>,
    fontdb: Arc<fontdb::Database>,
}

impl Compositor {
    pub fn new(style: OverlayStyle, font: Option<ResolvedOverlayFont>) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        match font.as_ref() {
            Some(font) => db.load_font_data(font.metrics.data().to_vec()),
            None => match installed_family(&db) {
                Some(family) => {
                    debug!(family = family.as_str(), "generic sans-serif mapped to installed face");
                    db.set_sans_serif_family(family);
                }
                None => warn!("no system fonts installed, overlay text will not be drawn"),
            },
        }
        Self {
            style,
            font,
            fontdb: Arc::new(db),
        }
    }

    /// An explicit `font_path` must load; a missing family only downgrades
    /// text measurement to the estimate.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let style = OverlayStyle::from_settings(settings);
        let font = match settings.overlay_font_path.as_deref() {
            Some(path) => Some(
                resolve_overlay_font(Some(Path::new(path)), None, &[])
                    .with_context(|| format!("failed to load overlay font: {}", path))?,
            ),
            None => match resolve_overlay_font(
                None,
                settings.overlay_font_family.as_deref(),
                &FALLBACK_FONT_FAMILIES,
            ) {
                Ok(font) => Some(font),
                Err(err) => {
                    warn!("overlay font unavailable, estimating text widths: {}", err);
                    None
                }
            },
        };
        Ok(Self::new(style, font))
    }

    /// Returns a new image; `base` is never modified and pixels outside the
    /// painted areas keep their exact values.
    pub fn compose(&self, base: &RgbaImage, regions: &[TranslatedRegion]) -> Result<RgbaImage> {
        let (width, height) = base.dimensions();
        let svg = self.overlay_svg(width, height, regions);
        let Some(svg) = svg else {
            return Ok(base.clone());
        };
        let overlay = self.rasterize(&svg, width, height)?;
        let mut output = base.clone();
        for (pixel, source) in output.pixels_mut().zip(overlay.pixels()) {
            let alpha = source.alpha();
            if alpha == 0 {
                continue;
            }
            pixel.0 = blend_over(
                [source.red(), source.green(), source.blue(), alpha],
                pixel.0,
            );
        }
        Ok(output)
    }

    /// SVG overlay for the regions that need painting, or `None` when no
    /// region changes the image.
    pub fn overlay_svg(&self, width: u32, height: u32, regions: &[TranslatedRegion]) -> Option<String> {
        let mut body = String::new();
        let mut painted = 0usize;
        for (idx, region) in regions.iter().enumerate() {
            if region.is_unchanged() {
                continue;
            }
            let drawn = match self.style.mode {
                RenderMode::InPlace => self.push_in_place(&mut body, idx, region, width, height),
                RenderMode::Overwrite => self.push_overwrite(&mut body, region, width, height),
                RenderMode::Wrap => self.push_wrapped(&mut body, idx, region, width, height),
            };
            if drawn {
                painted += 1;
            }
        }
        if painted == 0 {
            return None;
        }
        debug!(regions = painted, mode = self.style.mode.as_str(), "built overlay");
        Some(format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">{body}</svg>"#,
            w = width,
            h = height,
            body = body
        ))
    }

    fn metrics(&self) -> Option<&FontMetrics> {
        self.font.as_ref().map(|font| &font.metrics)
    }

    fn font_family(&self) -> String {
        self.style
            .font_family
            .clone()
            .or_else(|| self.font.as_ref().map(|font| font.family.clone()))
            .unwrap_or_else(|| "sans-serif".to_string())
    }

    fn push_in_place(
        &self,
        svg: &mut String,
        idx: usize,
        region: &TranslatedRegion,
        width: u32,
        height: u32,
    ) -> bool {
        let Some(rect) = to_pixel_rect(&region.region.bbox, width, height) else {
            return false;
        };
        let box_w = rect.width() as f32;
        let box_h = rect.height() as f32;
        self.push_fill(svg, &rect);

        let text = region.translated.trim();
        if text.is_empty() {
            return true;
        }
        let available = (box_w - self.style.padding * 2.0).max(1.0);
        let start = fit_font_size(text, box_w, box_h);
        let font_size = fit_single_line(text, start, available, self.metrics());
        let clip_id = format!("clip-{}", idx);
        self.push_clip(svg, &clip_id, &rect);
        let baseline = rect.y0 as f32 + box_h / 2.0 + font_size * CENTER_BASELINE_RATIO;
        self.push_text(
            svg,
            rect.x0 as f32 + box_w / 2.0,
            baseline,
            font_size,
            text,
            Some(&clip_id),
        );
        true
    }

    fn push_overwrite(&self, svg: &mut String, region: &TranslatedRegion, width: u32, height: u32) -> bool {
        let bbox = &region.region.bbox;
        let text = region.translated.trim();
        if to_pixel_rect(bbox, width, height).is_none() {
            return false;
        }
        let font_size = fit_font_size(text, bbox.width, bbox.height);
        let text_width = measure_text_width(text, font_size, self.metrics());
        let padding = self.style.padding;
        let background = BoundingBox {
            x: bbox.x - padding,
            y: bbox.y - padding,
            width: text_width + padding * 2.0,
            height: font_size + padding * 2.0,
        };
        let Some(rect) = to_pixel_rect(&background, width, height) else {
            return false;
        };
        self.push_fill(svg, &rect);
        if !text.is_empty() {
            let _ = write!(
                svg,
                r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}">{text}</text>"#,
                x = bbox.x,
                y = bbox.y + font_size,
                size = font_size,
                color = escape_xml(&self.style.text_color),
                family = escape_xml(&self.font_family()),
                text = escape_xml(text)
            );
        }
        true
    }

    fn push_wrapped(
        &self,
        svg: &mut String,
        idx: usize,
        region: &TranslatedRegion,
        width: u32,
        height: u32,
    ) -> bool {
        let Some(rect) = to_pixel_rect(&region.region.bbox, width, height) else {
            return false;
        };
        let box_w = rect.width() as f32;
        let box_h = rect.height() as f32;
        self.push_fill(svg, &rect);

        let text = region.translated.trim();
        if text.is_empty() {
            return true;
        }
        let start = fit_font_size(text, box_w, box_h);
        let wrapped = fit_wrapped(text, start, box_w, box_h, self.metrics());
        let clip_id = format!("clip-{}", idx);
        self.push_clip(svg, &clip_id, &rect);
        let top = rect.y0 as f32 + (box_h - wrapped.block_height()) / 2.0;
        let center_x = rect.x0 as f32 + box_w / 2.0;
        for (line_idx, line) in wrapped.lines.iter().enumerate() {
            let line_top = top + line_idx as f32 * wrapped.line_height;
            let baseline =
                line_top + wrapped.line_height / 2.0 + wrapped.font_size * CENTER_BASELINE_RATIO;
            self.push_text(svg, center_x, baseline, wrapped.font_size, line, Some(&clip_id));
        }
        true
    }

    fn push_fill(&self, svg: &mut String, rect: &PixelRect) {
        let _ = write!(
            svg,
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}" shape-rendering="crispEdges"/>"#,
            x = rect.x0,
            y = rect.y0,
            w = rect.width(),
            h = rect.height(),
            fill = escape_xml(&self.style.fill_color)
        );
    }

    fn push_clip(&self, svg: &mut String, id: &str, rect: &PixelRect) {
        let _ = write!(
            svg,
            r#"<clipPath id="{id}"><rect x="{x}" y="{y}" width="{w}" height="{h}"/></clipPath>"#,
            id = id,
            x = rect.x0,
            y = rect.y0,
            w = rect.width(),
            h = rect.height()
        );
    }

    fn push_text(
        &self,
        svg: &mut String,
        center_x: f32,
        baseline: f32,
        font_size: f32,
        text: &str,
        clip: Option<&str>,
    ) {
        let clip_attr = clip
            .map(|id| format!(r#" clip-path="url(#{})""#, id))
            .unwrap_or_default();
        let _ = write!(
            svg,
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}" text-anchor="middle"{clip}>{text}</text>"#,
            x = center_x,
            y = baseline,
            size = font_size,
            color = escape_xml(&self.style.text_color),
            family = escape_xml(&self.font_family()),
            clip = clip_attr,
            text = escape_xml(text)
        );
    }

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<Pixmap> {
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse overlay SVG")?;
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("canvas unavailable ({}x{})", width, height))?;
        let mut pixmap_mut = pixmap.as_mut();
        resvg::render(&tree, Transform::identity(), &mut pixmap_mut);
        Ok(pixmap)
    }
}

/// First fallback family present in `db`, else the first installed family.
fn installed_family(db: &fontdb::Database) -> Option<String> {
    let installed = |name: &str| {
        db.faces()
            .any(|face| face.families.iter().any(|(family, _)| family.eq_ignore_ascii_case(name)))
    };
    FALLBACK_FONT_FAMILIES
        .iter()
        .filter(|name| **name != "sans-serif")
        .find(|name| installed(**name))
        .map(|name| name.to_string())
        .or_else(|| {
            db.faces()
                .find_map(|face| face.families.first().map(|(family, _)| family.clone()))
        })
}

/// Source-over of a premultiplied overlay pixel onto a straight-alpha pixel.
fn blend_over(source: [u8; 4], dest: [u8; 4]) -> [u8; 4] {
    let src_alpha = source[3] as f32 / 255.0;
    if source[3] == 255 {
        return source;
    }
    let dest_alpha = dest[3] as f32 / 255.0;
    let out_alpha = src_alpha + dest_alpha * (1.0 - src_alpha);
    if out_alpha <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for channel in 0..3 {
        let src = source[channel] as f32 / 255.0;
        let dst = dest[channel] as f32 / 255.0 * dest_alpha;
        let premultiplied = src + dst * (1.0 - src_alpha);
        out[channel] = ((premultiplied / out_alpha) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
