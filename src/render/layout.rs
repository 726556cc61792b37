use super::font::{FontMetrics, measure_text_width};

/// Floor for every measured shrink step.
pub const MIN_RENDER_FONT_SIZE: f32 = 8.0;
pub const LINE_HEIGHT_RATIO: f32 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct WrappedText {
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<String>,
}

impl WrappedText {
    pub fn block_height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }
}

/// Shrinks `font_size` until `text` measures no wider than `available_width`.
pub fn fit_single_line(
    text: &str,
    font_size: f32,
    available_width: f32,
    font: Option<&FontMetrics>,
) -> f32 {
    let measured = measure_text_width(text, font_size, font);
    if measured <= available_width || measured <= 0.0 {
        return font_size;
    }
    let scaled = (font_size * available_width.max(0.0) / measured).floor();
    scaled.max(MIN_RENDER_FONT_SIZE).min(font_size)
}

/// Greedy word wrap on spaces, measured at `font_size`. A single word wider
/// than `max_width` stays on its own line.
pub fn wrap_words(
    text: &str,
    font_size: f32,
    max_width: f32,
    font: Option<&FontMetrics>,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if measure_text_width(&candidate, font_size, font) > max_width {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wraps `text` into a `max_width` x `max_height` block, shrinking the font
/// while the block is too tall and the floor allows.
pub fn fit_wrapped(
    text: &str,
    font_size: f32,
    max_width: f32,
    max_height: f32,
    font: Option<&FontMetrics>,
) -> WrappedText {
    let mut font_size = font_size.max(MIN_RENDER_FONT_SIZE);
    loop {
        let line_height = font_size * LINE_HEIGHT_RATIO;
        let lines = wrap_words(text, font_size, max_width, font);
        let wrapped = WrappedText {
            font_size,
            line_height,
            lines,
        };
        let total = wrapped.block_height();
        if total <= max_height || font_size <= MIN_RENDER_FONT_SIZE || total <= 0.0 {
            return wrapped;
        }
        let mut next = (font_size * max_height.max(0.0) / total)
            .floor()
            .max(MIN_RENDER_FONT_SIZE);
        if next >= font_size {
            next = (font_size - 1.0).max(MIN_RENDER_FONT_SIZE);
        }
        font_size = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_keeps_size_when_it_fits() {
        assert_eq!(fit_single_line("Hi", 20.0, 500.0, None), 20.0);
    }

    #[test]
    fn single_line_shrinks_to_width() {
        let text = "Specifications and features";
        let size = fit_single_line(text, 40.0, 200.0, None);
        assert!(size < 40.0);
        assert!(measure_text_width(text, size, None) <= 200.0);
    }

    #[test]
    fn single_line_respects_floor() {
        let text = "a very long translated label that cannot fit anywhere";
        assert_eq!(fit_single_line(text, 40.0, 10.0, None), MIN_RENDER_FONT_SIZE);
    }

    #[test]
    fn wraps_greedily_on_spaces() {
        let lines = wrap_words("one two three four five", 10.0, 60.0, None);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), "one two three four five");
        for line in &lines[..lines.len() - 1] {
            assert!(measure_text_width(line, 10.0, None) <= 60.0);
        }
    }

    #[test]
    fn long_word_stays_whole() {
        let lines = wrap_words("Supercalifragilistic ok", 10.0, 20.0, None);
        assert_eq!(lines, vec!["Supercalifragilistic", "ok"]);
    }

    #[test]
    fn wrapped_block_shrinks_until_it_fits() {
        let text = "Keep away from children and store in a cool dry place";
        let wrapped = fit_wrapped(text, 40.0, 200.0, 60.0, None);
        assert!(wrapped.font_size < 40.0);
        assert!(wrapped.block_height() <= 60.0 || wrapped.font_size == MIN_RENDER_FONT_SIZE);
        assert_eq!(wrapped.lines.join(" "), text);
    }

    #[test]
    fn wrapped_block_terminates_at_floor() {
        let text = "word ".repeat(200);
        let wrapped = fit_wrapped(text.trim(), 30.0, 40.0, 5.0, None);
        assert_eq!(wrapped.font_size, MIN_RENDER_FONT_SIZE);
        assert!((wrapped.line_height - MIN_RENDER_FONT_SIZE * LINE_HEIGHT_RATIO).abs() < 1e-4);
    }
}
