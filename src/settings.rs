use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ocr::Granularity;
use crate::render::RenderMode;
use crate::translate::{BackendKind, BatchMode};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub translation_backend: BackendKind,
    pub translation_endpoint: String,
    pub source_lang: String,
    pub target_lang: String,
    pub batch_mode: BatchMode,
    pub batch_delay: Duration,
    pub request_timeout: Duration,
    pub concurrent_batches: bool,
    pub untranslated_marker: String,
    pub ocr_languages: String,
    pub ocr_granularity: Granularity,
    pub ocr_psm: u32,
    pub ocr_binary: Option<String>,
    pub line_threshold: f32,
    pub word_threshold: f32,
    pub max_width: u32,
    pub max_height: u32,
    pub max_file_size: usize,
    pub overlay_mode: RenderMode,
    pub overlay_text_color: String,
    pub overlay_fill_color: String,
    pub overlay_padding: f32,
    pub overlay_font_family: Option<String>,
    pub overlay_font_path: Option<String>,
    pub settle_delay: Duration,
    pub server_addr: String,
    pub phrases: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            translation_backend: BackendKind::Baidu,
            translation_endpoint: crate::translate::baidu::DEFAULT_ENDPOINT.to_string(),
            source_lang: "zh".to_string(),
            target_lang: "en".to_string(),
            batch_mode: BatchMode::Fixed(5),
            batch_delay: Duration::from_millis(300),
            request_timeout: Duration::from_secs(10),
            concurrent_batches: false,
            untranslated_marker: crate::translate::DEFAULT_UNTRANSLATED_MARKER.to_string(),
            ocr_languages: "chi_sim+eng".to_string(),
            ocr_granularity: Granularity::Line,
            ocr_psm: 6,
            ocr_binary: None,
            line_threshold: 70.0,
            word_threshold: 60.0,
            max_width: 1200,
            max_height: 800,
            max_file_size: 10 * 1024 * 1024,
            overlay_mode: RenderMode::InPlace,
            overlay_text_color: "#ffffff".to_string(),
            overlay_fill_color: "#000000".to_string(),
            overlay_padding: 8.0,
            overlay_font_family: None,
            overlay_font_path: None,
            settle_delay: Duration::from_millis(500),
            server_addr: "127.0.0.1:8787".to_string(),
            phrases: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSection>,
    ocr: Option<OcrSection>,
    image: Option<ImageSection>,
    overlay: Option<OverlaySection>,
    pipeline: Option<PipelineSection>,
    server: Option<ServerSection>,
    phrases: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSection {
    backend: Option<String>,
    endpoint: Option<String>,
    from: Option<String>,
    to: Option<String>,
    batch_size: Option<BatchSizeValue>,
    batch_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
    concurrent: Option<bool>,
    untranslated_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchSizeValue {
    Count(usize),
    Named(String),
}

#[derive(Debug, Default, Deserialize)]
struct OcrSection {
    languages: Option<String>,
    granularity: Option<String>,
    psm: Option<u32>,
    binary: Option<String>,
    line_threshold: Option<f32>,
    word_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageSection {
    max_width: Option<u32>,
    max_height: Option<u32>,
    max_file_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySection {
    mode: Option<String>,
    text_color: Option<String>,
    fill_color: Option<String>,
    padding: Option<f32>,
    font_family: Option<String>,
    font_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSection {
    settle_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    addr: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed)
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(translation) = incoming.translation {
            if let Some(backend) = non_empty(translation.backend) {
                self.translation_backend = backend.parse()?;
            }
            if let Some(endpoint) = non_empty(translation.endpoint) {
                self.translation_endpoint = endpoint;
            }
            if let Some(from) = non_empty(translation.from) {
                self.source_lang = from;
            }
            if let Some(to) = non_empty(translation.to) {
                self.target_lang = to;
            }
            match translation.batch_size {
                Some(BatchSizeValue::Count(size)) if size > 0 => {
                    self.batch_mode = BatchMode::Fixed(size);
                }
                Some(BatchSizeValue::Count(_)) => {
                    return Err(anyhow!("translation.batch_size must be positive"));
                }
                Some(BatchSizeValue::Named(name)) => {
                    if !name.trim().eq_ignore_ascii_case("whole") {
                        return Err(anyhow!(
                            "translation.batch_size must be a number or \"whole\" (got '{}')",
                            name
                        ));
                    }
                    self.batch_mode = BatchMode::Whole;
                }
                None => {}
            }
            if let Some(delay) = translation.batch_delay_ms {
                self.batch_delay = Duration::from_millis(delay);
            }
            if let Some(timeout) = translation.timeout_secs {
                if timeout > 0 {
                    self.request_timeout = Duration::from_secs(timeout);
                }
            }
            if let Some(concurrent) = translation.concurrent {
                self.concurrent_batches = concurrent;
            }
            if let Some(marker) = translation.untranslated_marker {
                self.untranslated_marker = marker;
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr_languages = languages;
            }
            if let Some(granularity) = non_empty(ocr.granularity) {
                self.ocr_granularity = granularity.parse()?;
            }
            if let Some(psm) = ocr.psm {
                self.ocr_psm = psm;
            }
            if let Some(binary) = non_empty(ocr.binary) {
                self.ocr_binary = Some(binary);
            }
            if let Some(threshold) = ocr.line_threshold {
                self.line_threshold = threshold.clamp(0.0, 100.0);
            }
            if let Some(threshold) = ocr.word_threshold {
                self.word_threshold = threshold.clamp(0.0, 100.0);
            }
        }
        if let Some(image) = incoming.image {
            if let Some(width) = image.max_width.filter(|value| *value > 0) {
                self.max_width = width;
            }
            if let Some(height) = image.max_height.filter(|value| *value > 0) {
                self.max_height = height;
            }
            if let Some(size) = image.max_file_size.filter(|value| *value > 0) {
                self.max_file_size = size;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(mode) = non_empty(overlay.mode) {
                self.overlay_mode = mode.parse()?;
            }
            if let Some(color) = non_empty(overlay.text_color) {
                self.overlay_text_color = color;
            }
            if let Some(color) = non_empty(overlay.fill_color) {
                self.overlay_fill_color = color;
            }
            if let Some(padding) = overlay.padding {
                if padding >= 0.0 {
                    self.overlay_padding = padding;
                }
            }
            if let Some(family) = non_empty(overlay.font_family) {
                self.overlay_font_family = Some(family);
            }
            if let Some(path) = non_empty(overlay.font_path) {
                self.overlay_font_path = Some(path);
            }
        }
        if let Some(pipeline) = incoming.pipeline {
            if let Some(delay) = pipeline.settle_delay_ms {
                self.settle_delay = Duration::from_millis(delay);
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server_addr = addr;
            }
        }
        if let Some(map) = incoming.phrases {
            for (key, value) in map {
                self.phrases.insert(key, value);
            }
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".img-translator-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn bundled_settings_match_defaults() {
        let mut settings = Settings::default();
        settings.merge_str(DEFAULT_SETTINGS_TOML).expect("merge");
        assert_eq!(settings.batch_mode, BatchMode::Fixed(5));
        assert_eq!(settings.batch_delay, Duration::from_millis(300));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.ocr_granularity, Granularity::Line);
        assert_eq!(settings.ocr_psm, 6);
        assert_eq!(settings.line_threshold, 70.0);
        assert_eq!(settings.word_threshold, 60.0);
        assert_eq!(settings.overlay_mode, RenderMode::InPlace);
        assert_eq!(settings.untranslated_marker, "[T] ");
        assert!(settings.phrases.is_empty());
    }

    #[test]
    fn later_sections_override_earlier_ones() {
        let mut settings = Settings::default();
        settings
            .merge_str(
                r#"
                [translation]
                backend = "proxy"
                batch_size = "whole"

                [ocr]
                granularity = "word"
                word_threshold = 150

                [phrases]
                "注意" = "Caution"
                "#,
            )
            .expect("merge");
        assert_eq!(settings.translation_backend, BackendKind::Proxy);
        assert_eq!(settings.batch_mode, BatchMode::Whole);
        assert_eq!(settings.ocr_granularity, Granularity::Word);
        assert_eq!(settings.word_threshold, 100.0);
        assert_eq!(settings.phrases.get("注意").map(String::as_str), Some("Caution"));
    }

    #[test]
    fn rejects_unknown_batch_size_name() {
        let mut settings = Settings::default();
        let err = settings
            .merge_str("[translation]\nbatch_size = \"all\"\n")
            .expect_err("invalid batch size");
        assert!(err.to_string().contains("whole"));
    }

    #[test]
    fn load_settings_writes_home_defaults() {
        with_temp_home(|home| {
            let settings = load_settings(None).expect("settings");
            assert_eq!(settings.max_width, 1200);
            assert!(
                home.join(".img-translator-rust")
                    .join("settings.toml")
                    .exists()
            );
        });
    }

    #[test]
    fn load_settings_reads_extra_path() {
        with_temp_home(|home| {
            let extra = home.join("extra.toml");
            fs::write(&extra, "[image]\nmax_width = 640\n").expect("write extra");
            let settings = load_settings(Some(&extra)).expect("settings");
            assert_eq!(settings.max_width, 640);
            assert_eq!(settings.max_height, 800);

            let missing = home.join("missing.toml");
            assert!(load_settings(Some(&missing)).is_err());
        });
    }
}
