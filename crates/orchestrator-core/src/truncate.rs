//! §4.3.1 output truncation: preserves the tail of an agent's final output,
//! where conclusions typically live.

/// Default byte cap applied after line-truncation.
pub const DEFAULT_MAX_BYTES: usize = 50 * 1024;
/// Default line cap applied before byte-truncation.
pub const DEFAULT_MAX_LINES: usize = 2000;

/// The result of truncating an agent's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub output: String,
    pub truncated: bool,
}

/// Truncate `output` to at most `max_lines` lines (keeping the tail) and then
/// at most `max_bytes` bytes (keeping the tail, halving repeatedly).
///
/// Algorithm (§4.3.1):
/// 1. Split on `\n`. If there are more than `max_lines` lines, keep only the
///    last `max_lines` and mark truncated.
/// 2. Rejoin; while the UTF-8 byte length exceeds `max_bytes` and the string
///    is non-empty, replace it with its second half (`s[len/2..]`), marking
///    truncated on the first such replacement.
pub fn truncate_output(output: &str, max_bytes: usize, max_lines: usize) -> Truncated {
    let mut truncated = false;

    let lines: Vec<&str> = output.split('\n').collect();
    let mut text = if lines.len() > max_lines {
        truncated = true;
        lines[lines.len() - max_lines..].join("\n")
    } else {
        output.to_owned()
    };

    while text.len() > max_bytes && !text.is_empty() {
        truncated = true;
        let half = byte_boundary_at_or_after(&text, text.len() / 2);
        text = text[half..].to_owned();
    }

    Truncated {
        output: text,
        truncated,
    }
}

/// Truncate with the default byte and line limits (§4.3.1).
pub fn truncate_output_default(output: &str) -> Truncated {
    truncate_output(output, DEFAULT_MAX_BYTES, DEFAULT_MAX_LINES)
}

/// Find the nearest UTF-8 char boundary at or after `idx`, so slicing never
/// panics on a multi-byte codepoint.
fn byte_boundary_at_or_after(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
