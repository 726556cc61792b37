use anyhow::{Result, anyhow};

use super::{Observation, OcrOutput, RawBBox};

const LINE_CLASSES: [&str; 4] = ["ocr_line", "ocr_header", "ocr_caption", "ocr_textfloat"];

/// Parses tesseract hOCR into line and word observations.
pub fn parse_hocr(hocr: &str) -> Result<OcrOutput> {
    if !hocr.contains("ocr_page") {
        return Err(anyhow!("malformed hOCR output: no ocr_page element"));
    }

    let bytes = hocr.as_bytes();
    let mut lines = Vec::new();
    let mut words = Vec::new();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &hocr[start..tag_end];
        if !is_line_tag(tag) {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        let line_words = parse_words(&hocr[inner_start..inner_end]);
        if let Some(line) = build_line(tag, &line_words) {
            lines.push(line);
        }
        words.extend(line_words);
        i = inner_end + "</span>".len();
    }

    Ok(OcrOutput {
        lines: Some(lines),
        words: Some(words),
    })
}

fn is_line_tag(tag: &str) -> bool {
    extract_attr(tag, "class")
        .map(|class| LINE_CLASSES.iter().any(|name| class == *name))
        .unwrap_or(false)
}

fn parse_words(inner: &str) -> Vec<Observation> {
    let bytes = inner.as_bytes();
    let mut words = Vec::new();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &inner[start..tag_end];
        if !tag.contains("ocrx_word") {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        let text = decode_entities(&strip_tags(&inner[inner_start..inner_end]))
            .replace('\u{00a0}', " ");
        let text = text.trim();
        if let (Some(bbox), Some(confidence)) = (parse_bbox(tag), parse_confidence(tag)) {
            if !text.is_empty() {
                words.push(Observation {
                    text: text.to_string(),
                    bbox,
                    confidence,
                });
            }
        }
        i = inner_end + "</span>".len();
    }
    words
}

fn build_line(tag: &str, words: &[Observation]) -> Option<Observation> {
    if words.is_empty() {
        return None;
    }

    let mut text = String::new();
    for word in words {
        if needs_space(&text, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
    }

    let mut conf_sum = 0.0;
    let mut len_sum = 0.0;
    for word in words {
        let weight = word.text.chars().count().max(1) as f32;
        conf_sum += word.confidence * weight;
        len_sum += weight;
    }
    let confidence = if len_sum > 0.0 { conf_sum / len_sum } else { 0.0 };

    let bbox = parse_bbox(tag).unwrap_or_else(|| {
        words
            .iter()
            .skip(1)
            .fold(words[0].bbox, |acc, word| union_bbox(&acc, &word.bbox))
    });

    Some(Observation {
        text,
        bbox,
        confidence,
    })
}

fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => {
            (a.is_ascii_alphanumeric() || a.is_ascii_punctuation())
                && (b.is_ascii_alphanumeric() || b.is_ascii_punctuation())
        }
        _ => false,
    }
}

fn union_bbox(a: &RawBBox, b: &RawBBox) -> RawBBox {
    RawBBox {
        x0: a.x0.min(b.x0),
        y0: a.y0.min(b.y0),
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
    }
}

fn parse_bbox(tag: &str) -> Option<RawBBox> {
    let title = extract_attr(tag, "title")?;
    let idx = title.find("bbox")?;
    let rest = &title[idx + "bbox".len()..];
    let nums = rest
        .split([' ', ';'])
        .filter(|value| !value.is_empty())
        .take(4)
        .filter_map(|value| value.parse::<f32>().ok())
        .collect::<Vec<_>>();
    if nums.len() != 4 {
        return None;
    }
    Some(RawBBox {
        x0: nums[0],
        y0: nums[1],
        x1: nums[2],
        y1: nums[3],
    })
}

fn parse_confidence(tag: &str) -> Option<f32> {
    let title = extract_attr(tag, "title")?;
    let idx = title.find("x_wconf")?;
    let rest = &title[idx + "x_wconf".len()..];
    let value = rest.split([' ', ';']).find(|value| !value.is_empty())?;
    value.parse::<f32>().ok()
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|win| win == needle)
        .map(|pos| from + pos)
}

fn find_byte(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|pos| from + pos)
}

fn find_span_inner(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut depth = 1i32;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if bytes[i..].starts_with(b"<span") {
                depth += 1;
            } else if bytes[i..].starts_with(b"</span") {
                depth -= 1;
                if depth == 0 {
                    return Some((start, i));
                }
            }
        }
        i += 1;
    }
    None
}

fn extract_attr(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{}=", name);
    let idx = tag.find(&needle)?;
    let rest = &tag[idx + needle.len()..];
    let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn strip_tags(value: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
