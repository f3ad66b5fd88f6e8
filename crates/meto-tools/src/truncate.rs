// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Head/tail truncation of tool output.
//!
//! Lengths are counted in Unicode scalar values.  When `text` exceeds
//! `max_chars`, the first ⌈max/2⌉ and the last ⌊max/2⌋ characters are kept
//! and joined by a marker naming the number of dropped characters.  The
//! marker itself is not counted against the cap.

/// Outcome of [`truncate_head_tail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub content: String,
    /// Characters removed; 0 when the input was within the cap.
    pub omitted: usize,
}

impl Truncation {
    pub fn was_truncated(&self) -> bool {
        self.omitted > 0
    }
}

pub fn omission_marker(omitted: usize) -> String {
    format!("\n\n... [{omitted} characters omitted] ...\n\n")
}

pub fn truncate_head_tail(text: &str, max_chars: usize) -> Truncation {
    let total = text.chars().count();
    if total <= max_chars {
        return Truncation { content: text.to_string(), omitted: 0 };
    }

    let head_chars = max_chars.div_ceil(2);
    let tail_chars = max_chars / 2;
    let omitted = total - head_chars - tail_chars;

    let head_end = byte_offset(text, head_chars);
    let tail_start = byte_offset(text, total - tail_chars);

    let mut content = String::with_capacity(head_end + (text.len() - tail_start) + 48);
    content.push_str(&text[..head_end]);
    content.push_str(&omission_marker(omitted));
    content.push_str(&text[tail_start..]);
    Truncation { content, omitted }
}

/// Byte index of the `n`-th character (or `text.len()` past the end).
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
