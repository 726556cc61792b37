//! Target-script detection used to pick OCR regions and translation inputs.

const TARGET_SCRIPT_START: u32 = 0x4E00;
const TARGET_SCRIPT_END: u32 = 0x9FA5;

/// Returns true when at least one character falls in the CJK unified ideograph
/// block U+4E00..=U+9FA5.
pub fn contains_target_script(text: &str) -> bool {
    text.chars().any(is_target_char)
}

fn is_target_char(ch: char) -> bool {
    matches!(ch as u32, TARGET_SCRIPT_START..=TARGET_SCRIPT_END)
}
