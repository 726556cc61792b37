use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::hocr::parse_hocr;
use super::{DetectorFuture, OcrOutput, ProgressFn, TextDetector};

const DEFAULT_BINARY: &str = "tesseract";
const DEFAULT_PSM: u32 = 6;

/// Runs the `tesseract` CLI and parses its hOCR output.
#[derive(Debug, Clone)]
pub struct TesseractDetector {
    binary: String,
    psm: u32,
}

impl Default for TesseractDetector {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            psm: DEFAULT_PSM,
        }
    }
}

impl TesseractDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        let binary = binary.into();
        if !binary.trim().is_empty() {
            self.binary = binary;
        }
        self
    }

    pub fn with_psm(mut self, psm: u32) -> Self {
        self.psm = psm;
        self
    }
}

impl TextDetector for TesseractDetector {
    fn recognize<'a>(
        &'a self,
        image_png: &'a [u8],
        languages: &'a str,
        progress: ProgressFn,
    ) -> DetectorFuture<'a> {
        let image = image_png.to_vec();
        let languages = languages.to_string();
        let binary = self.binary.clone();
        let psm = self.psm;
        Box::pin(async move {
            progress(0.0);
            let output = tokio::task::spawn_blocking(move || {
                recognize_blocking(&binary, &image, &languages, psm)
            })
            .await
            .with_context(|| "tesseract task failed")??;
            progress(1.0);
            Ok(output)
        })
    }
}

fn recognize_blocking(binary: &str, image_png: &[u8], languages: &str, psm: u32) -> Result<OcrOutput> {
    let languages = normalize_ocr_languages(binary, languages)?;
    let mut tmp = tempfile::Builder::new()
        .prefix("img-translator-")
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    tmp.write_all(image_png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush().ok();

    debug!(languages = %languages, psm, "running tesseract");
    let hocr = run_tesseract_hocr(binary, tmp.path(), &languages, psm)?;
    parse_hocr(&hocr)
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    list_languages(DEFAULT_BINARY)
}

fn list_languages(binary: &str) -> Result<Vec<String>> {
    let output = Command::new(binary)
        .arg("--list-langs")
        .output()
        .with_context(|| format!("failed to run {} --list-langs", binary))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_list(&stdout))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_ocr_languages(binary: &str, requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    let available = match list_languages(binary) {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };
    select_languages(trimmed, &available)
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in requested.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

fn run_tesseract_hocr(binary: &str, path: &Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new(binary)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("hocr")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn language_list_skips_header() {
        let stdout = "List of available languages in \"/usr/share/tessdata/\" (3):\nchi_sim\neng\n\nosd\n";
        assert_eq!(parse_language_list(stdout), vec!["chi_sim", "eng", "osd"]);
    }

    #[test]
    fn keeps_available_languages_only() {
        let available = vec!["eng".to_string(), "osd".to_string()];
        assert_eq!(select_languages("chi_sim+eng", &available).unwrap(), "eng");
        assert!(select_languages("chi_sim", &available).is_err());
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let detector = TesseractDetector::new().with_binary("img-translator-no-such-tesseract");
        let progress: ProgressFn = Arc::new(|_| {});
        let result = detector.recognize(&[0u8; 4], "chi_sim+eng", progress).await;
        assert!(result.is_err());
    }
}
