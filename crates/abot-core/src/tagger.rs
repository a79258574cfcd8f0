//! Intent tagger: turns stemmed tokens into a [`StructuredInput`].
//!
//! Each token is classified into one of the five [`Field`] classes by a
//! naive-Bayes model trained on n-grams. Classification tries the trigram
//! starting at the token, then the bigram, then the unigram, and stops at
//! the first level whose best class clears [`CONFIDENCE`].
//!
//! # Corpus format
//!
//! One sentence per line. A word written `_X(word)` is tagged with the
//! field whose symbol is `X` (`C`, `A`, `O`, `T`, `N`); other words are
//! context only. Blank lines and lines starting with `/` are skipped.
//!
//! ```text
//! // comment
//! _C(show) _N(me) _N(the) _O(weather) _T(tomorrow)
//! ```

use abot_types::{AbotError, Field, StructuredInput};
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, ClassifierError};
use crate::nlp::tokenize;

/// Probability the best class must exceed before back-off stops.
pub const CONFIDENCE: f64 = 0.7;

/// Built-in training corpus used when no model or corpus is configured.
pub const SEED_CORPUS: &str = include_str!("../data/imperative.txt");

/// Characters trimmed from the end of each corpus word.
const TRAILING: &[char] = &[')', '.', ',', ';', '?', '!', ':'];

/// Output of [`Tagger::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged {
    pub input: StructuredInput,
    /// The tokens re-rendered in corpus notation, e.g. `_C(get) _O(weather)`.
    pub annotated: String,
    /// Some token stayed at or below the confidence threshold even as a
    /// unigram.
    pub needs_training: bool,
}

/// A corpus line that could not be trained on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

/// Result of [`Tagger::train_corpus`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusReport {
    /// Sentences that contributed training data.
    pub sentences: usize,
    pub rejected: Vec<RejectedLine>,
}

impl CorpusReport {
    /// The sentence count, or a bad-request naming the first rejected line.
    pub fn strict(self) -> Result<usize, AbotError> {
        match self.rejected.first() {
            Some(bad) => Err(AbotError::bad_request(format!(
                "line {}: {}",
                bad.line, bad.reason
            ))),
            None => Ok(self.sentences),
        }
    }
}

/// Field classifier over the five [`Field`] classes.
#[derive(Debug, Clone)]
pub struct Tagger {
    model: Classifier,
}

impl Tagger {
    /// An untrained tagger.
    pub fn new() -> Self {
        let labels = Field::ALL.iter().map(|f| f.label().to_string()).collect();
        Self {
            model: Classifier::empty(labels),
        }
    }

    /// A tagger trained on [`SEED_CORPUS`].
    pub fn seeded() -> Result<Self, AbotError> {
        let mut tagger = Self::new();
        tagger.train_corpus(SEED_CORPUS).strict()?;
        Ok(tagger)
    }

    /// Wrap a loaded model. Its classes must be exactly the field labels,
    /// in [`Field::ALL`] order.
    pub fn from_classifier(model: Classifier) -> Result<Self, ClassifierError> {
        let expected = Field::ALL.iter().map(Field::label);
        if !model.classes().iter().map(String::as_str).eq(expected) {
            return Err(ClassifierError::Config(format!(
                "model classes {:?} are not the field labels",
                model.classes()
            )));
        }
        Ok(Self { model })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.model
    }

    pub fn into_classifier(self) -> Classifier {
        self.model
    }

    /// Train on every line of `corpus`.
    ///
    /// A malformed line is logged and skipped; the rest still train.
    pub fn train_corpus(&mut self, corpus: &str) -> CorpusReport {
        let mut report = CorpusReport::default();
        for (lineno, line) in corpus.lines().enumerate() {
            match self.train_sentence(line) {
                Ok(0) => {}
                Ok(_) => report.sentences += 1,
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping corpus line");
                    report.rejected.push(RejectedLine {
                        line: lineno + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            sentences = report.sentences,
            rejected = report.rejected.len(),
            "trained intent tagger"
        );
        report
    }

    /// Train on one annotated sentence. Returns the number of tagged words.
    ///
    /// A malformed line is rejected before anything is learned from it.
    pub fn train_sentence(&mut self, line: &str) -> Result<usize, AbotError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('/') {
            return Ok(0);
        }
        let words = parse_annotated(line)?;
        let mut tagged = 0;
        for (i, (word, field)) in words.iter().enumerate() {
            let Some(field) = field else { continue };
            let class = field.label();
            self.model.train(class, &[word.as_str()])?;
            if let Some(bigram) = ngram(&words, i, 2) {
                self.model.train(class, &[bigram])?;
            }
            if let Some(trigram) = ngram(&words, i, 3) {
                self.model.train(class, &[trigram])?;
            }
            tagged += 1;
        }
        Ok(tagged)
    }

    /// Tag a tokenized sentence.
    ///
    /// Tokens tagged with the same field are joined with a single space
    /// in the order they appear.
    pub fn classify(&self, tokens: &[String]) -> Result<Tagged, AbotError> {
        let mut input = StructuredInput::new();
        let mut annotated = Vec::with_capacity(tokens.len());
        let mut needs_training = false;

        for (i, token) in tokens.iter().enumerate() {
            let (field, confident) = self.classify_at(tokens, i)?;
            if !confident {
                debug!(token = %token, field = field.label(), "low-confidence tag");
                needs_training = true;
            }
            input.push(field, token);
            annotated.push(format!("_{}({token})", field.symbol()));
        }

        Ok(Tagged {
            input,
            annotated: annotated.join(" "),
            needs_training,
        })
    }

    fn classify_at(&self, tokens: &[String], i: usize) -> Result<(Field, bool), AbotError> {
        for n in [3, 2] {
            let Some(gram) = token_ngram(tokens, i, n) else {
                continue;
            };
            // Unknown n-grams may underflow; that just means back off.
            if let Ok(scores) = self.model.prob_scores(&[gram]) {
                if scores.scores[scores.likely] > CONFIDENCE {
                    return Ok((field_at(scores.likely), true));
                }
            }
        }
        let scores = self.model.prob_scores(&[tokens[i].as_str()])?;
        let confident = scores.scores[scores.likely] > CONFIDENCE;
        Ok((field_at(scores.likely), confident))
    }
}

impl Default for Tagger {
    fn default() -> Self {
        Self::new()
    }
}

fn field_at(index: usize) -> Field {
    Field::ALL.get(index).copied().unwrap_or(Field::None)
}

/// Parse a corpus line into normalized words with optional tags.
fn parse_annotated(line: &str) -> Result<Vec<(String, Option<Field>)>, AbotError> {
    let mut out = Vec::new();
    for raw in line.split_whitespace() {
        let word = raw.trim_end_matches(TRAILING);
        let (text, field) = match word.strip_prefix('_') {
            Some(rest) => {
                let mut chars = rest.chars();
                let field = chars.next().and_then(Field::from_symbol);
                match (field, chars.as_str().strip_prefix('(')) {
                    (Some(field), Some(inner)) => (inner, Some(field)),
                    _ => {
                        return Err(AbotError::bad_request(format!(
                            "syntax error in entity {raw:?}"
                        )));
                    }
                }
            }
            None => (word, None),
        };
        for token in tokenize(text) {
            out.push((token, field));
        }
    }
    Ok(out)
}

fn ngram(words: &[(String, Option<Field>)], i: usize, n: usize) -> Option<String> {
    let window = words.get(i..i + n)?;
    Some(
        window
            .iter()
            .map(|(w, _)| w.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn token_ngram(tokens: &[String], i: usize, n: usize) -> Option<String> {
    tokens.get(i..i + n).map(|window| window.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        tokenize(s)
    }

    #[test]
    fn parses_tags_and_context() {
        let words = parse_annotated("_C(get) the _O(weather). _T(today)?").unwrap();
        assert_eq!(
            words,
            vec![
                ("get".to_string(), Some(Field::Command)),
                ("the".to_string(), None),
                ("weather".to_string(), Some(Field::Object)),
                ("todai".to_string(), Some(Field::Time)),
            ]
        );
    }

    #[test]
    fn bad_tag_is_rejected() {
        assert!(parse_annotated("_Z(get) weather").is_err());
        assert!(parse_annotated("_C get").is_err());
        let mut tagger = Tagger::new();
        let err = tagger
            .train_corpus("_C(get) _O(it)\n_Q(oops)")
            .strict()
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn bad_line_is_skipped_and_the_rest_trains() {
        let mut tagger = Tagger::new();
        let report = tagger.train_corpus("_C(get) _O(weather)\n_Q(oops) now\n_C(play) _O(music)");
        assert_eq!(report.sentences, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 2);

        let tagged = tagger.classify(&tokens("music")).unwrap();
        assert_eq!(tagged.input.get(Field::Object), Some("music"));
        let object = tagger.classifier().class_data("Object").unwrap();
        assert_eq!(object.freqs.get("oop"), None);
    }

    #[test]
    fn comments_and_blank_lines_skip() {
        let mut tagger = Tagger::new();
        assert_eq!(tagger.train_corpus("// note\n\n   \n"), CorpusReport::default());
        assert_eq!(tagger.classifier().learned(), 0);
    }

    #[test]
    fn learns_unigram_bigram_trigram() {
        let mut tagger = Tagger::new();
        tagger.train_sentence("_C(get) the _O(weather)").unwrap();
        let command = tagger.classifier().class_data("Command").unwrap();
        assert_eq!(command.freqs.get("get"), Some(&1));
        assert_eq!(command.freqs.get("get the"), Some(&1));
        assert_eq!(command.freqs.get("get the weather"), Some(&1));
        let object = tagger.classifier().class_data("Object").unwrap();
        assert_eq!(object.total, 1);
    }

    #[test]
    fn classifies_into_fields() {
        let mut tagger = Tagger::new();
        tagger
            .train_corpus(
                "_C(get) _N(the) _O(weather)\n_C(get) _N(the) _O(news)\n_C(show) _O(weather) _T(today)",
            )
            .strict()
            .unwrap();
        let tagged = tagger.classify(&tokens("get the weather today")).unwrap();
        assert_eq!(tagged.input.get(Field::Command), Some("get"));
        assert_eq!(tagged.input.get(Field::Object), Some("weather"));
        assert_eq!(tagged.input.get(Field::Time), Some("todai"));
        assert_eq!(tagged.input.get(Field::None), Some("the"));
        assert_eq!(tagged.annotated, "_C(get) _N(the) _O(weather) _T(todai)");
    }

    #[test]
    fn same_field_tokens_are_joined() {
        let mut tagger = Tagger::new();
        tagger
            .train_corpus("_C(call) _A(dad) _T(tomorrow) _T(morning)")
            .strict()
            .unwrap();
        let tagged = tagger.classify(&tokens("call dad tomorrow morning")).unwrap();
        assert_eq!(tagged.input.get(Field::Time), Some("tomorrow morn"));
    }

    #[test]
    fn untrained_model_underflows() {
        let tagger = Tagger::new();
        let err = tagger.classify(&tokens("hello")).unwrap_err();
        assert!(matches!(err, AbotError::Underflow));
    }

    #[test]
    fn unknown_words_need_training() {
        let mut tagger = Tagger::new();
        tagger
            .train_corpus("_C(get) _O(weather)\n_C(play) _O(music)")
            .strict()
            .unwrap();
        let tagged = tagger.classify(&tokens("zebra")).unwrap();
        assert!(tagged.needs_training);
        let tagged = tagger.classify(&tokens("weather")).unwrap();
        assert!(!tagged.needs_training);
        assert_eq!(tagged.input.get(Field::Object), Some("weather"));
    }

    #[test]
    fn seed_corpus_trains() {
        let tagger = Tagger::seeded().unwrap();
        assert!(tagger.classifier().learned() > 100);
        let tagged = tagger.classify(&tokens("weather")).unwrap();
        assert_eq!(tagged.input.get(Field::Object), Some("weather"));
        let tagged = tagger.classify(&tokens("get the weather")).unwrap();
        assert_eq!(tagged.input.get(Field::Command), Some("get"));
    }

    #[test]
    fn from_classifier_checks_labels() {
        let model = Classifier::new(&["a", "b"]).unwrap();
        assert!(Tagger::from_classifier(model).is_err());
        let model = Tagger::seeded().unwrap().into_classifier();
        assert!(Tagger::from_classifier(model).is_ok());
    }
}
