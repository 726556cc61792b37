use image::RgbaImage;
use image::imageops::FilterType;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::geometry::{to_original, working_size};
use crate::ocr::{Granularity, ProgressFn, TextDetector, TranslatedRegion, select_regions};
use crate::render::Compositor;
use crate::settings::Settings;
use crate::translate::Batcher;

pub const OUTPUT_FILE_NAME: &str = "translated_image.png";
pub const OUTPUT_MIME: &str = "image/png";
const ALLOWED_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

const PROGRESS_DECODED: u8 = 10;
const PROGRESS_RESIZED: u8 = 20;
const PROGRESS_OCR_END: u8 = 60;
const PROGRESS_RECOGNIZED: u8 = 70;
const PROGRESS_TRANSLATED: u8 = 90;
const PROGRESS_DONE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Preparing,
    Resizing,
    Recognizing,
    Translating,
    Compositing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Decode,
    Ocr,
    Compositing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineState {
    pub stage: Stage,
    pub progress: u8,
    pub error: Option<ErrorInfo>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            progress: 0,
            error: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("a run is already in progress")]
    Busy,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("text recognition failed: {0:#}")]
    Ocr(anyhow::Error),
    #[error("compositing failed: {0:#}")]
    Compositing(anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Input(_) | PipelineError::Busy => ErrorKind::Input,
            PipelineError::Decode(_) => ErrorKind::Decode,
            PipelineError::Ocr(_) => ErrorKind::Ocr,
            PipelineError::Compositing(_) => ErrorKind::Compositing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub languages: String,
    pub granularity: Granularity,
    pub line_threshold: f32,
    pub word_threshold: f32,
    pub source_lang: String,
    pub target_lang: String,
    pub max_width: u32,
    pub max_height: u32,
    pub max_file_size: usize,
    pub settle_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            languages: settings.ocr_languages.clone(),
            granularity: settings.ocr_granularity,
            line_threshold: settings.line_threshold,
            word_threshold: settings.word_threshold,
            source_lang: settings.source_lang.clone(),
            target_lang: settings.target_lang.clone(),
            max_width: settings.max_width,
            max_height: settings.max_height,
            max_file_size: settings.max_file_size,
            settle_delay: settings.settle_delay,
        }
    }

    pub fn threshold(&self) -> f32 {
        match self.granularity {
            Granularity::Line => self.line_threshold,
            Granularity::Word => self.word_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    #[serde(skip)]
    pub png: Vec<u8>,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<TranslatedRegion>,
}

/// Runs image -> OCR -> translation -> composite, one run at a time,
/// publishing its stage and progress on a watch channel.
pub struct Pipeline {
    detector: Arc<dyn TextDetector>,
    batcher: Batcher,
    compositor: Compositor,
    options: PipelineOptions,
    state: Arc<watch::Sender<PipelineState>>,
    processing: AtomicBool,
}

struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn TextDetector>,
        batcher: Batcher,
        compositor: Compositor,
        options: PipelineOptions,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::default());
        Self {
            detector,
            batcher,
            compositor,
            options,
            state: Arc::new(state),
            processing: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// One full run. On failure the state moves to `Failed` and no image is
    /// returned.
    pub async fn run(&self, input: &[u8]) -> Result<PipelineOutput, PipelineError> {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            return Err(PipelineError::Busy);
        };
        self.state.send_replace(PipelineState {
            stage: Stage::Preparing,
            progress: 0,
            error: None,
        });
        match self.execute(input).await {
            Ok(output) => Ok(output),
            Err(err) => {
                warn!(kind = ?err.kind(), "pipeline failed: {}", err);
                self.state.send_modify(|state| {
                    state.stage = Stage::Failed;
                    state.error = Some(ErrorInfo {
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                });
                Err(err)
            }
        }
    }

    async fn execute(&self, input: &[u8]) -> Result<PipelineOutput, PipelineError> {
        let mime = self.validate(input)?;
        debug!(mime, bytes = input.len(), "decoding input image");
        let original = image::load_from_memory(input)
            .map_err(|err| PipelineError::Decode(err.to_string()))?
            .to_rgba8();
        let (width, height) = original.dimensions();
        self.advance(Stage::Resizing, PROGRESS_DECODED);

        let working = working_size(width, height, self.options.max_width, self.options.max_height);
        let working_png = if working.scale < 1.0 {
            let resized =
                image::imageops::resize(&original, working.width, working.height, FilterType::Triangle);
            encode_png(&resized)
        } else {
            encode_png(&original)
        }
        .map_err(PipelineError::Ocr)?;
        info!(
            width,
            height,
            working_width = working.width,
            working_height = working.height,
            scale = working.scale,
            "prepared working image"
        );
        self.advance(Stage::Recognizing, PROGRESS_RESIZED);

        let progress = self.ocr_progress_sink();
        let ocr = self
            .detector
            .recognize(&working_png, &self.options.languages, progress)
            .await
            .map_err(PipelineError::Ocr)?;
        let observations = ocr
            .observations(self.options.granularity)
            .map_err(PipelineError::Ocr)?;
        let mut regions = select_regions(observations, self.options.threshold());
        for region in regions.iter_mut() {
            region.bbox = to_original(&region.bbox, working.scale);
        }
        info!(
            observed = observations.len(),
            selected = regions.len(),
            granularity = self.options.granularity.as_str(),
            "recognized text regions"
        );
        self.advance(Stage::Translating, PROGRESS_RECOGNIZED);

        let texts: Vec<String> = regions.iter().map(|region| region.text.clone()).collect();
        let translations = self
            .batcher
            .translate_batch(&texts, &self.options.source_lang, &self.options.target_lang)
            .await;
        let translated: Vec<TranslatedRegion> = regions
            .into_iter()
            .zip(translations)
            .map(|(region, translated)| TranslatedRegion { region, translated })
            .collect();
        self.advance(Stage::Compositing, PROGRESS_TRANSLATED);

        let composed = self
            .compositor
            .compose(&original, &translated)
            .map_err(PipelineError::Compositing)?;
        let png = encode_png(&composed).map_err(PipelineError::Compositing)?;
        self.advance(Stage::Compositing, PROGRESS_DONE);

        if !self.options.settle_delay.is_zero() {
            sleep(self.options.settle_delay).await;
        }
        self.advance(Stage::Done, PROGRESS_DONE);
        info!(regions = translated.len(), bytes = png.len(), "pipeline finished");

        Ok(PipelineOutput {
            png,
            file_name: OUTPUT_FILE_NAME.to_string(),
            width,
            height,
            regions: translated,
        })
    }

    fn validate(&self, input: &[u8]) -> Result<&'static str, PipelineError> {
        if input.is_empty() {
            return Err(PipelineError::Input("image is empty".to_string()));
        }
        if input.len() > self.options.max_file_size {
            return Err(PipelineError::Input(format!(
                "image is {} bytes, limit is {}",
                input.len(),
                self.options.max_file_size
            )));
        }
        let mime = infer::get(input)
            .map(|kind| kind.mime_type())
            .ok_or_else(|| PipelineError::Input("unrecognized file type".to_string()))?;
        if !ALLOWED_MIME_TYPES.contains(&mime) {
            return Err(PipelineError::Input(format!(
                "unsupported image type '{}'",
                mime
            )));
        }
        Ok(mime)
    }

    fn advance(&self, stage: Stage, progress: u8) {
        debug!(?stage, progress, "pipeline stage");
        self.state.send_modify(|state| {
            state.stage = stage;
            state.progress = state.progress.max(progress);
        });
    }

    fn ocr_progress_sink(&self) -> ProgressFn {
        let state = Arc::clone(&self.state);
        Arc::new(move |fraction: f32| {
            let progress = ocr_progress(fraction);
            state.send_if_modified(|current| {
                if current.stage != Stage::Recognizing || progress <= current.progress {
                    return false;
                }
                current.progress = progress;
                true
            });
        })
    }
}

/// Maps an OCR fraction in `[0, 1]` onto overall progress 20..=60.
fn ocr_progress(fraction: f32) -> u8 {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let span = (PROGRESS_OCR_END - PROGRESS_RESIZED) as f32;
    PROGRESS_RESIZED + (fraction * span).round() as u8
}

fn encode_png(image: &RgbaImage) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|err| anyhow::anyhow!("failed to encode PNG: {}", err))?;
    Ok(bytes)
}
