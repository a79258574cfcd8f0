//! Text normalization: tokenizing and stemming.
//!
//! Everything that reaches the classifier or the registry passes through
//! [`tokenize`] first, so utterances and subscription patterns compare in
//! the same stemmed vocabulary.

pub mod stemmer;
pub mod tokenizer;

pub use stemmer::{stem, stem_str};
pub use tokenizer::{normalize_pattern, normalize_word, tokenize};
