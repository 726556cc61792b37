mod hocr;
mod tesseract;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use crate::geometry::BoundingBox;
use crate::script::contains_target_script;

pub use hocr::parse_hocr;
pub use tesseract::{TesseractDetector, list_tesseract_languages};

/// Which OCR observation list drives region selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Line,
    Word,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Line => "line",
            Granularity::Word => "word",
        }
    }
}

impl FromStr for Granularity {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "line" | "lines" => Ok(Granularity::Line),
            "word" | "words" => Ok(Granularity::Word),
            other => Err(anyhow!("unknown OCR granularity '{}' (expected line or word)", other)),
        }
    }
}

/// Corner coordinates as reported by the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    pub bbox: RawBBox,
    pub confidence: f32,
}

/// Engine output. A missing list is malformed output, an empty list is not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub lines: Option<Vec<Observation>>,
    pub words: Option<Vec<Observation>>,
}

impl OcrOutput {
    pub fn observations(&self, granularity: Granularity) -> Result<&[Observation]> {
        let list = match granularity {
            Granularity::Line => self.lines.as_deref(),
            Granularity::Word => self.words.as_deref(),
        };
        list.ok_or_else(|| anyhow!("OCR output has no {} data", granularity.as_str()))
    }
}

pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

pub type DetectorFuture<'a> = Pin<Box<dyn Future<Output = Result<OcrOutput>> + Send + 'a>>;

/// OCR engine boundary. `image_png` is the working image; coordinates in the
/// output are relative to it. `progress` receives fractions in `[0, 1]`.
pub trait TextDetector: Send + Sync {
    fn recognize<'a>(
        &'a self,
        image_png: &'a [u8],
        languages: &'a str,
        progress: ProgressFn,
    ) -> DetectorFuture<'a>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRegion {
    pub id: usize,
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedRegion {
    #[serde(flatten)]
    pub region: TextRegion,
    pub translated: String,
}

impl TranslatedRegion {
    pub fn is_unchanged(&self) -> bool {
        self.translated == self.region.text
    }
}

/// Keeps observations above `threshold` that contain the target script.
/// Region ids are the observation's index in the engine output.
pub fn select_regions(observations: &[Observation], threshold: f32) -> Vec<TextRegion> {
    observations
        .iter()
        .enumerate()
        .filter_map(|(id, observation)| {
            let confidence = observation.confidence.clamp(0.0, 100.0);
            let text = observation.text.trim();
            if confidence <= threshold || !contains_target_script(text) {
                return None;
            }
            let RawBBox { x0, y0, x1, y1 } = observation.bbox;
            Some(TextRegion {
                id,
                text: text.to_string(),
                bbox: BoundingBox::from_corners(x0, y0, x1, y1),
                confidence,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(text: &str, confidence: f32) -> Observation {
        Observation {
            text: text.to_string(),
            bbox: RawBBox {
                x0: 10.0,
                y0: 20.0,
                x1: 110.0,
                y1: 60.0,
            },
            confidence,
        }
    }

    #[test]
    fn keeps_confident_target_script_lines() {
        let observations = vec![
            observation("产品名称", 95.0),
            observation("使用说明", 70.0),
            observation("Hello", 99.0),
            observation(" 规格 ", 71.0),
        ];
        let regions = select_regions(&observations, 70.0);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].id, 0);
        assert_eq!(regions[0].text, "产品名称");
        assert_eq!(regions[0].bbox.width, 100.0);
        assert_eq!(regions[0].bbox.height, 40.0);
        assert_eq!(regions[1].id, 3);
        assert_eq!(regions[1].text, "规格");
    }

    #[test]
    fn clips_confidence_into_percent_range() {
        let regions = select_regions(&[observation("警告", 140.0)], 60.0);
        assert_eq!(regions[0].confidence, 100.0);
        assert!(select_regions(&[observation("警告", -5.0)], 0.0).is_empty());
    }

    #[test]
    fn missing_list_is_an_error_but_empty_is_not() {
        let output = OcrOutput {
            lines: Some(Vec::new()),
            words: None,
        };
        assert!(output.observations(Granularity::Line).expect("lines").is_empty());
        let err = output.observations(Granularity::Word).expect_err("words missing");
        assert!(err.to_string().contains("word"));
    }

    #[test]
    fn parses_granularity_names() {
        assert_eq!("Line".parse::<Granularity>().unwrap(), Granularity::Line);
        assert_eq!("words".parse::<Granularity>().unwrap(), Granularity::Word);
        assert!("glyph".parse::<Granularity>().is_err());
    }
}
