//! Transcript normalization and code extraction.

use crate::rules::CodeRules;

const NUMBER_WORDS: &[(&str, &str)] = &[
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
];

/// Lower-cases a transcript and rewrites spoken digits and separators.
///
/// `"quiz one two"` becomes `"quiz 1 2"`, and `"dash"` or `"hyphen"`
/// become `"-"`. Other words pass through unchanged.
pub fn normalize_transcript(transcript: &str) -> String {
    transcript
        .split_whitespace()
        .map(|word| {
            let word = word.to_lowercase();
            let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
            if let Some((_, digit)) = NUMBER_WORDS.iter().find(|(name, _)| *name == bare) {
                (*digit).to_string()
            } else if bare == "dash" || bare == "hyphen" {
                "-".to_string()
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upper-cases and keeps only ASCII letters and digits.
pub fn clean_transcript(transcript: &str) -> String {
    transcript
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Extracts a candidate code from a transcript.
///
/// The transcript is normalized and cleaned, then the rule set's patterns
/// are tried in order; the first match wins. Without a match, a cleaned
/// transcript of at least `min_len` characters yields its first `max_len`
/// characters. Anything shorter yields `None`.
pub fn extract_code(transcript: &str, rules: &CodeRules) -> Option<String> {
    let cleaned = clean_transcript(&normalize_transcript(transcript));
    if cleaned.is_empty() {
        return None;
    }

    for pattern in &rules.patterns {
        if let Some(found) = pattern.find(&cleaned) {
            return Some(found.as_str().to_string());
        }
    }

    if cleaned.len() >= rules.min_len {
        // `cleaned` is ASCII, so byte slicing is character slicing.
        let end = cleaned.len().min(rules.max_len);
        return Some(cleaned[..end].to_string());
    }

    None
}

/// Spells a code out for speech.
///
/// All-digit codes are read as dash-separated digits ("2-0-2-3"); anything
/// else is read character by character ("Q U I Z 1 2").
pub fn spell_code(code: &str) -> String {
    let separator = if code.chars().all(|c| c.is_ascii_digit()) {
        "-"
    } else {
        " "
    };
    code.chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(separator)
}
