//! Character-budget truncation for tool and model output.

/// How to cut text that exceeds its character budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationMode {
    /// Keep the first `max_chars` characters, nothing else.
    Head,
    /// Keep the first 40% and last 60% of the budget with a marker between.
    HeadTail,
}

/// Truncate `text` to at most `max_chars` characters (not bytes).
///
/// Cuts always land on char boundaries. `Head` output never exceeds the
/// budget; `HeadTail` adds a one-line marker on top of it.
pub fn truncate_chars(text: &str, max_chars: usize, mode: TruncationMode) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    match mode {
        TruncationMode::Head => text[..byte_offset(text, max_chars)].to_string(),
        TruncationMode::HeadTail => {
            let head_size = max_chars * 40 / 100;
            let tail_size = max_chars - head_size;
            let removed = total - head_size - tail_size;
            let head = &text[..byte_offset(text, head_size)];
            let tail = &text[byte_offset(text, total - tail_size)..];
            format!(
                "{}\n[... {} characters removed ...]\n{}",
                head, removed, tail
            )
        }
    }
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}
