pub mod baidu;
mod phrases;
mod proxy;

use anyhow::{Result, anyhow};
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::script::contains_target_script;
use crate::settings::Settings;

pub use baidu::{BaiduBackend, BaiduCredentials};
pub use phrases::PhraseTable;
pub use proxy::ProxyBackend;

pub const DEFAULT_UNTRANSLATED_MARKER: &str = "[T] ";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation backend error {code}: {message}")]
    Backend { code: String, message: String },
    #[error("translation backend returned HTTP {0}")]
    Http(reqwest::StatusCode),
    #[error("translation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed translation response: {0}")]
    Malformed(String),
}

pub type BackendFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<Vec<String>, TranslateError>> + Send + 'a>>;

/// One call translates `texts` in order; the result must have the same length.
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;
    fn translate<'a>(&'a self, texts: &'a [String], from: &'a str, to: &'a str) -> BackendFuture<'a>;
}

/// Backend that never reaches the network; every batch resolves through the phrase table.
#[derive(Debug, Clone, Default)]
pub struct OfflineBackend;

impl TranslationBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn translate<'a>(&'a self, _texts: &'a [String], _from: &'a str, _to: &'a str) -> BackendFuture<'a> {
        Box::pin(async {
            Err(TranslateError::Backend {
                code: "offline".to_string(),
                message: "no translation backend configured".to_string(),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Baidu,
    Proxy,
    Offline,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "baidu" => Ok(BackendKind::Baidu),
            "proxy" => Ok(BackendKind::Proxy),
            "offline" => Ok(BackendKind::Offline),
            other => Err(anyhow!(
                "unknown translation backend '{}' (expected baidu, proxy or offline)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// At most `n` distinct strings per request.
    Fixed(usize),
    /// All distinct strings in a single request.
    Whole,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: BatchMode,
    pub delay: Duration,
    pub concurrent: bool,
    pub marker: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            mode: BatchMode::Fixed(5),
            delay: Duration::from_millis(300),
            concurrent: false,
            marker: DEFAULT_UNTRANSLATED_MARKER.to_string(),
        }
    }
}

impl BatchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.batch_mode,
            delay: settings.batch_delay,
            concurrent: settings.concurrent_batches,
            marker: settings.untranslated_marker.clone(),
        }
    }
}

pub fn build_backend(
    settings: &Settings,
    credentials: Option<BaiduCredentials>,
) -> Result<Arc<dyn TranslationBackend>> {
    match settings.translation_backend {
        BackendKind::Baidu => {
            let credentials = credentials.ok_or_else(|| {
                anyhow!("baidu credentials not found (set BAIDU_APP_ID and BAIDU_SECRET_KEY)")
            })?;
            let backend = BaiduBackend::new(credentials, settings.request_timeout)?
                .with_endpoint(settings.translation_endpoint.clone());
            Ok(Arc::new(backend))
        }
        BackendKind::Proxy => Ok(Arc::new(ProxyBackend::new(
            settings.translation_endpoint.clone(),
            settings.request_timeout,
        )?)),
        BackendKind::Offline => Ok(Arc::new(OfflineBackend)),
    }
}

/// Groups source strings into backend requests and maps the answers back
/// onto the caller's array, duplicates and pass-through entries included.
#[derive(Clone)]
pub struct Batcher {
    backend: Arc<dyn TranslationBackend>,
    options: BatchOptions,
    phrases: PhraseTable,
}

impl Batcher {
    pub fn new(backend: Arc<dyn TranslationBackend>, options: BatchOptions, phrases: PhraseTable) -> Self {
        Self {
            backend,
            options,
            phrases,
        }
    }

    pub fn from_settings(backend: Arc<dyn TranslationBackend>, settings: &Settings) -> Self {
        let phrases = PhraseTable::builtin().with_entries(settings.phrases.clone());
        Self::new(backend, BatchOptions::from_settings(settings), phrases)
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Same length and order as `texts`. Failed batches resolve through the
    /// phrase table, misses come back as the marker-prefixed original.
    pub async fn translate_batch(&self, texts: &[String], from: &str, to: &str) -> Vec<String> {
        let sources = distinct_sources(texts);
        if sources.is_empty() {
            return texts.to_vec();
        }
        let chunks = self.chunk(&sources);
        let results = self.dispatch(&chunks, from, to).await;

        let mut translations: HashMap<&str, String> = HashMap::with_capacity(sources.len());
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(translated) => {
                    for (source, target) in chunk.iter().zip(translated) {
                        translations.insert(source.as_str(), target);
                    }
                }
                Err(err) => {
                    warn!(
                        backend = self.backend.name(),
                        count = chunk.len(),
                        "translation batch failed, using phrase table: {}",
                        err
                    );
                    for source in chunk.iter() {
                        translations.insert(source.as_str(), self.fallback(source));
                    }
                }
            }
        }
        map_back(texts, &translations)
    }

    /// Strict variant of [`Batcher::translate_batch`]: the first failing batch aborts the call.
    pub async fn try_translate_batch(
        &self,
        texts: &[String],
        from: &str,
        to: &str,
    ) -> std::result::Result<Vec<String>, TranslateError> {
        let sources = distinct_sources(texts);
        if sources.is_empty() {
            return Ok(texts.to_vec());
        }
        let chunks = self.chunk(&sources);
        let results = self.dispatch(&chunks, from, to).await;

        let mut translations: HashMap<&str, String> = HashMap::with_capacity(sources.len());
        for (chunk, result) in chunks.iter().zip(results) {
            for (source, target) in chunk.iter().zip(result?) {
                translations.insert(source.as_str(), target);
            }
        }
        Ok(map_back(texts, &translations))
    }

    /// Translates a single string regardless of script; blank input maps to "".
    pub async fn try_translate_one(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> std::result::Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let source = [text.to_string()];
        let mut translated = self.submit(&source, from, to).await?;
        Ok(translated.remove(0))
    }

    fn fallback(&self, text: &str) -> String {
        match self.phrases.lookup(text) {
            Some(hit) => hit.to_string(),
            None => format!("{}{}", self.options.marker, text),
        }
    }

    fn chunk<'s>(&self, sources: &'s [String]) -> Vec<&'s [String]> {
        match self.options.mode {
            BatchMode::Fixed(size) => sources.chunks(size.max(1)).collect(),
            BatchMode::Whole => vec![sources],
        }
    }

    async fn dispatch(
        &self,
        chunks: &[&[String]],
        from: &str,
        to: &str,
    ) -> Vec<std::result::Result<Vec<String>, TranslateError>> {
        if self.options.concurrent {
            return join_all(chunks.iter().map(|chunk| self.submit(chunk, from, to))).await;
        }
        let mut results = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            if idx > 0 && !self.options.delay.is_zero() {
                sleep(self.options.delay).await;
            }
            results.push(self.submit(chunk, from, to).await);
        }
        results
    }

    async fn submit(
        &self,
        chunk: &[String],
        from: &str,
        to: &str,
    ) -> std::result::Result<Vec<String>, TranslateError> {
        debug!(backend = self.backend.name(), count = chunk.len(), "dispatching translation batch");
        let translated = self.backend.translate(chunk, from, to).await?;
        if translated.len() != chunk.len() {
            return Err(TranslateError::Malformed(format!(
                "expected {} translations, got {}",
                chunk.len(),
                translated.len()
            )));
        }
        Ok(translated)
    }
}

/// Distinct, non-empty, target-script strings in first-seen order.
fn distinct_sources(texts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    texts
        .iter()
        .filter(|text| !text.is_empty() && contains_target_script(text))
        .filter(|text| seen.insert(text.as_str()))
        .cloned()
        .collect()
}

fn map_back(texts: &[String], translations: &HashMap<&str, String>) -> Vec<String> {
    texts
        .iter()
        .map(|text| {
            translations
                .get(text.as_str())
                .cloned()
                .unwrap_or_else(|| text.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Answers from a fixed table and records each request.
    struct RecordingBackend {
        table: HashMap<&'static str, &'static str>,
        calls: Mutex<Vec<Vec<String>>>,
        fail_when_contains: Option<&'static str>,
    }

    impl RecordingBackend {
        fn new() -> Self {
            Self {
                table: HashMap::from([
                    ("产品名称", "Product Name"),
                    ("警告", "Warning"),
                    ("规格", "Specifications"),
                    ("特点", "Features"),
                    ("颜色", "Color"),
                    ("重量", "Weight"),
                    ("尺寸", "Size"),
                ]),
                calls: Mutex::new(Vec::new()),
                fail_when_contains: None,
            }
        }

        fn failing_on(source: &'static str) -> Self {
            Self {
                fail_when_contains: Some(source),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl TranslationBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn translate<'a>(&'a self, texts: &'a [String], _from: &'a str, _to: &'a str) -> BackendFuture<'a> {
            Box::pin(async move {
                self.calls.lock().expect("calls").push(texts.to_vec());
                if let Some(poison) = self.fail_when_contains {
                    if texts.iter().any(|text| text == poison) {
                        return Err(TranslateError::Backend {
                            code: "54003".to_string(),
                            message: "Invalid Access Limit".to_string(),
                        });
                    }
                }
                Ok(texts
                    .iter()
                    .map(|text| {
                        self.table
                            .get(text.as_str())
                            .map(|value| value.to_string())
                            .unwrap_or_else(|| format!("<{}>", text))
                    })
                    .collect())
            })
        }
    }

    fn options(mode: BatchMode) -> BatchOptions {
        BatchOptions {
            mode,
            delay: Duration::ZERO,
            concurrent: false,
            marker: DEFAULT_UNTRANSLATED_MARKER.to_string(),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn duplicates_share_one_request_and_latin_passes_through() {
        let backend = Arc::new(RecordingBackend::new());
        let batcher = Batcher::new(backend.clone(), options(BatchMode::Fixed(5)), PhraseTable::builtin());
        let result = batcher
            .translate_batch(&strings(&["产品名称", "Hello", "产品名称"]), "zh", "en")
            .await;
        assert_eq!(result, vec!["Product Name", "Hello", "Product Name"]);
        assert_eq!(backend.calls(), vec![strings(&["产品名称"])]);
    }

    #[tokio::test]
    async fn empty_and_non_script_inputs_skip_the_backend() {
        let backend = Arc::new(RecordingBackend::new());
        let batcher = Batcher::new(backend.clone(), options(BatchMode::Fixed(5)), PhraseTable::builtin());
        let input = strings(&["", "123", "OK"]);
        assert_eq!(batcher.translate_batch(&input, "zh", "en").await, input);
        assert!(batcher.translate_batch(&[], "zh", "en").await.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn fixed_mode_splits_distinct_sources() {
        let backend = Arc::new(RecordingBackend::new());
        let batcher = Batcher::new(backend.clone(), options(BatchMode::Fixed(2)), PhraseTable::builtin());
        let input = strings(&["警告", "规格", "特点", "警告", "颜色", "", "重量"]);
        let result = batcher.translate_batch(&input, "zh", "en").await;
        assert_eq!(
            result,
            vec!["Warning", "Specifications", "Features", "Warning", "Color", "", "Weight"]
        );
        assert_eq!(
            backend.calls(),
            vec![
                strings(&["警告", "规格"]),
                strings(&["特点", "颜色"]),
                strings(&["重量"]),
            ]
        );
    }

    #[tokio::test]
    async fn whole_mode_sends_one_request() {
        let backend = Arc::new(RecordingBackend::new());
        let batcher = Batcher::new(backend.clone(), options(BatchMode::Whole), PhraseTable::builtin());
        let input = strings(&["警告", "规格", "特点", "颜色", "重量", "尺寸"]);
        batcher.translate_batch(&input, "zh", "en").await;
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(backend.calls()[0].len(), 6);
    }

    #[tokio::test]
    async fn failed_batch_falls_back_per_entry() {
        let backend = Arc::new(RecordingBackend::failing_on("特点"));
        let batcher = Batcher::new(backend.clone(), options(BatchMode::Fixed(2)), PhraseTable::builtin());
        let input = strings(&["警告", "规格", "特点", "未知文字"]);
        let result = batcher.translate_batch(&input, "zh", "en").await;
        assert_eq!(result, vec!["Warning", "Specifications", "Features", "[T] 未知文字"]);
    }

    #[tokio::test]
    async fn offline_backend_uses_table_and_marker() {
        let batcher = Batcher::new(
            Arc::new(OfflineBackend),
            options(BatchMode::Fixed(5)),
            PhraseTable::builtin().with_entries([("注意", "Caution")]),
        );
        let input = strings(&["产品名称", "注意", "你好", "Hi"]);
        let result = batcher.translate_batch(&input, "zh", "en").await;
        assert_eq!(result, vec!["Product Name", "Caution", "[T] 你好", "Hi"]);
    }

    #[tokio::test]
    async fn strict_variant_propagates_backend_errors() {
        let batcher = Batcher::new(
            Arc::new(RecordingBackend::failing_on("警告")),
            options(BatchMode::Fixed(5)),
            PhraseTable::builtin(),
        );
        let err = batcher
            .try_translate_batch(&strings(&["警告"]), "zh", "en")
            .await
            .expect_err("backend error");
        assert!(err.to_string().contains("54003"));

        let ok = batcher
            .try_translate_batch(&strings(&["规格", "x", "规格"]), "zh", "en")
            .await
            .expect("translated");
        assert_eq!(ok, vec!["Specifications", "x", "Specifications"]);
    }

    #[tokio::test]
    async fn single_text_ignores_script_filter() {
        let backend = Arc::new(RecordingBackend::new());
        let batcher = Batcher::new(backend.clone(), options(BatchMode::Fixed(5)), PhraseTable::builtin());
        assert_eq!(batcher.try_translate_one("hello", "zh", "en").await.unwrap(), "<hello>");
        assert_eq!(batcher.try_translate_one("  ", "zh", "en").await.unwrap(), "");
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn sequential_batches_wait_between_requests() {
        let backend = Arc::new(RecordingBackend::new());
        let mut opts = options(BatchMode::Fixed(1));
        opts.delay = Duration::from_millis(40);
        let batcher = Batcher::new(backend.clone(), opts, PhraseTable::builtin());
        let started = Instant::now();
        batcher
            .translate_batch(&strings(&["警告", "规格", "特点"]), "zh", "en")
            .await;
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn concurrent_batches_keep_order() {
        let backend = Arc::new(RecordingBackend::new());
        let mut opts = options(BatchMode::Fixed(1));
        opts.concurrent = true;
        let batcher = Batcher::new(backend.clone(), opts, PhraseTable::builtin());
        let result = batcher
            .translate_batch(&strings(&["重量", "尺寸", "重量"]), "zh", "en")
            .await;
        assert_eq!(result, vec!["Weight", "Size", "Weight"]);
        assert_eq!(backend.calls().len(), 2);
    }

    #[test]
    fn output_length_always_matches_input() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let batcher = Batcher::new(
            Arc::new(OfflineBackend),
            options(BatchMode::Fixed(3)),
            PhraseTable::builtin(),
        );
        let cases: Vec<Vec<String>> = vec![
            vec![],
            strings(&[""]),
            strings(&["", "", "警告"]),
            strings(&["警告", "警告", "警告", "警告"]),
            strings(&["a", "中", "b", "文", "中", "", "c"]),
        ];
        for input in cases {
            let output = runtime.block_on(batcher.translate_batch(&input, "zh", "en"));
            assert_eq!(output.len(), input.len());
        }
    }

    #[test]
    fn parses_backend_kinds() {
        assert_eq!("Baidu".parse::<BackendKind>().unwrap(), BackendKind::Baidu);
        assert_eq!("proxy".parse::<BackendKind>().unwrap(), BackendKind::Proxy);
        assert!("google".parse::<BackendKind>().is_err());
    }

    #[test]
    fn baidu_backend_requires_credentials() {
        let settings = Settings::default();
        assert!(build_backend(&settings, None).is_err());
        let mut offline = Settings::default();
        offline.translation_backend = BackendKind::Offline;
        assert_eq!(build_backend(&offline, None).unwrap().name(), "offline");
    }
}
