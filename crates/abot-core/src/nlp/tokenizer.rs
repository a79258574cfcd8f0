//! Sentence tokenizer.

use abot_types::{Field, StructuredInput};

use super::stemmer::stem_str;

/// Split a sentence into stemmed tokens.
///
/// Lowercases, splits on anything that is not a letter or digit, drops
/// empty pieces and stems what remains. Apostrophes are removed rather
/// than split on, so `what's` becomes the single token `what`.
pub fn tokenize(sentence: &str) -> Vec<String> {
    sentence
        .split(is_separator)
        .map(|piece| piece.replace(APOSTROPHES, ""))
        .filter(|piece| !piece.is_empty())
        .map(|piece| normalize_word(&piece))
        .collect()
}

/// Trim, lowercase and stem a single word.
pub fn normalize_word(word: &str) -> String {
    stem_str(&word.trim().to_lowercase())
}

/// Stem every word of every set field so a subscription pattern lives in
/// the same vocabulary as classifier output.
///
/// A field that tokenizes to nothing becomes unset, i.e. a wildcard.
pub fn normalize_pattern(pattern: &StructuredInput) -> StructuredInput {
    let mut out = StructuredInput::new();
    for field in Field::ALL {
        if let Some(value) = pattern.get(field) {
            let tokens = tokenize(value);
            if !tokens.is_empty() {
                out = out.with(field, tokens.join(" "));
            }
        }
    }
    out
}

const APOSTROPHES: [char; 2] = ['\'', '\u{2019}'];

fn is_separator(c: char) -> bool {
    !c.is_alphanumeric() && !APOSTROPHES.contains(&c)
}
