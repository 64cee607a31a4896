//! Text utilities shared by the intent chat services.

use unicode_normalization::UnicodeNormalization;

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries, so Vietnamese and other multi-byte text is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Normalize free text into an intent identifier.
///
/// Lower-cases, decomposes (NFD) and drops combining marks, folds `đ` to `d`,
/// then joins the remaining ASCII alphanumeric runs with single underscores.
/// Everything else (whitespace, punctuation, quotes, non-Latin letters) acts
/// as a separator. The result matches `^[a-z0-9]+(_[a-z0-9]+)*$` or is empty.
pub fn normalize_intent_name(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c == 'đ' { 'd' } else { c })
        .collect();

    folded
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Combining diacritical marks (U+0300–U+036F) plus the extended and
/// supplement blocks NFD emits for Vietnamese stacked tones.
fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' | '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}')
}
