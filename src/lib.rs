use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod geometry;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod render;
pub mod script;
pub mod server;
pub mod settings;
pub mod translate;

#[cfg(test)]
mod test_util;

pub use pipeline::{Pipeline, PipelineError, PipelineOptions, PipelineOutput, PipelineState, Stage};
pub use render::Compositor;
pub use translate::{BaiduCredentials, Batcher};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings_path: Option<String>,
    pub granularity: Option<String>,
    pub app_id: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Command {
    /// Translate one image file and write the PNG result.
    Image {
        input: PathBuf,
        output: Option<PathBuf>,
    },
    /// Translate strings through the batcher.
    Texts(Vec<String>),
    /// Serve the proxy API; `None` uses the configured address.
    Serve(Option<String>),
}

pub async fn run(config: Config, command: Command) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(granularity) = config.granularity.as_deref() {
        settings.ocr_granularity = granularity.parse()?;
    }
    let credentials =
        BaiduCredentials::resolve(config.app_id.as_deref(), config.secret_key.as_deref());
    let backend = translate::build_backend(&settings, credentials)?;

    match command {
        Command::Image { input, output } => {
            let bytes = std::fs::read(&input)
                .with_context(|| format!("failed to read image: {}", input.display()))?;
            let pipeline = Pipeline::new(
                Arc::new(tesseract_detector(&settings)),
                Batcher::from_settings(backend, &settings),
                Compositor::from_settings(&settings)?,
                PipelineOptions::from_settings(&settings),
            );
            let result = pipeline.run(&bytes).await?;
            let dest = output.unwrap_or_else(|| default_output_path(&input, &result.file_name));
            std::fs::write(&dest, &result.png)
                .with_context(|| format!("failed to write image: {}", dest.display()))?;
            Ok(format_image_summary(&result, &dest))
        }
        Command::Texts(texts) => {
            let batcher = Batcher::from_settings(backend, &settings);
            let translated = batcher
                .translate_batch(&texts, &settings.source_lang, &settings.target_lang)
                .await;
            Ok(translated.join("\n"))
        }
        Command::Serve(addr) => {
            let addr = addr
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| settings.server_addr.clone());
            let state = server::ServerState::new(
                settings.clone(),
                backend,
                Arc::new(tesseract_detector(&settings)),
                Compositor::from_settings(&settings)?,
            );
            server::run_server(state, addr).await?;
            Ok(String::new())
        }
    }
}

fn tesseract_detector(settings: &settings::Settings) -> ocr::TesseractDetector {
    let detector = ocr::TesseractDetector::new().with_psm(settings.ocr_psm);
    match settings.ocr_binary.as_deref() {
        Some(binary) => detector.with_binary(binary),
        None => detector,
    }
}

fn default_output_path(input: &Path, file_name: &str) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

fn format_image_summary(output: &PipelineOutput, dest: &Path) -> String {
    let mut lines: Vec<String> = output
        .regions
        .iter()
        .map(|region| format!("{}\t{}", region.region.text, region.translated))
        .collect();
    lines.push(format!(
        "wrote {} ({}x{}, {} regions)",
        dest.display(),
        output.width,
        output.height,
        output.regions.len()
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::ocr::{TextRegion, TranslatedRegion};

    #[test]
    fn output_defaults_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/tmp/in/photo.jpg"), "translated_image.png"),
            PathBuf::from("/tmp/in/translated_image.png")
        );
    }

    #[test]
    fn summary_lists_regions_then_destination() {
        let output = PipelineOutput {
            png: Vec::new(),
            file_name: "translated_image.png".to_string(),
            width: 10,
            height: 5,
            regions: vec![TranslatedRegion {
                region: TextRegion {
                    id: 3,
                    text: "警告".to_string(),
                    bbox: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: 4.0,
                        height: 2.0,
                    },
                    confidence: 91.0,
                },
                translated: "Warning".to_string(),
            }],
        };
        let summary = format_image_summary(&output, Path::new("out.png"));
        assert_eq!(summary, "警告\tWarning\nwrote out.png (10x5, 1 regions)");
    }

    #[test]
    fn offline_text_translation_uses_phrase_table() {
        let output = crate::test_util::with_temp_home(|home| {
            let path = home.join("offline.toml");
            std::fs::write(&path, "[translation]\nbackend = \"offline\"\n").expect("write");
            let config = Config {
                settings_path: Some(path.to_string_lossy().to_string()),
                ..Config::default()
            };
            let texts = vec!["产品名称".to_string(), "Model X".to_string(), "未知".to_string()];
            tokio::runtime::Runtime::new()
                .expect("runtime")
                .block_on(run(config, Command::Texts(texts)))
                .expect("run")
        });
        assert_eq!(output, "Product Name\nModel X\n[T] 未知");
    }
}
