//! Multinomial naive-Bayes text classifier.
//!
//! A [`Classifier`] holds an ordered list of class labels and, for each
//! class, a word-frequency table plus the total number of tokens learned
//! for that class. Probabilities are derived on demand; scoring runs in
//! log space so long token sequences do not underflow.
//!
//! The model is mutated only through [`Classifier::train`] (which takes
//! `&mut self`) and is otherwise safe to score from many threads. The
//! `seen` counter is atomic so scoring needs only a shared borrow.

mod codec;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use abot_types::AbotError;

pub use codec::{MAGIC, VERSION};

/// Probability assigned to a word never seen for a class.
pub const DEFAULT_PROB: f64 = 1e-11;

// ── Errors ──────────────────────────────────────────────────────────────

/// Errors raised by the classifier and its codec.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClassifierError {
    /// Invalid construction: too few classes or a duplicate label.
    #[error("invalid classifier config: {0}")]
    Config(String),

    /// A class label not in this model.
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// Linear-space scores summed to zero.
    #[error("probability underflow")]
    Underflow,

    /// Persisted model bytes are malformed.
    #[error("invalid model data: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ClassifierError> for AbotError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::Config(reason) => AbotError::Config { reason },
            ClassifierError::UnknownClass(class) => {
                AbotError::bad_request(format!("unknown class: {class}"))
            }
            ClassifierError::Underflow => AbotError::Underflow,
            ClassifierError::Codec(reason) => {
                AbotError::config(format!("invalid model data: {reason}"))
            }
            ClassifierError::Io(e) => AbotError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

// ── Model ───────────────────────────────────────────────────────────────

/// Per-class training data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassData {
    /// Occurrences of each word under this class.
    pub freqs: HashMap<String, u64>,
    /// Sum of all `freqs` values.
    pub total: u64,
}

impl ClassData {
    /// P(word | class), or [`DEFAULT_PROB`] when unseen.
    pub fn word_prob(&self, word: &str) -> f64 {
        match self.freqs.get(word) {
            Some(&count) if count > 0 && self.total > 0 => count as f64 / self.total as f64,
            _ => DEFAULT_PROB,
        }
    }
}

/// Result of scoring a token sequence against every class.
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    /// One score per class, in class order.
    pub scores: Vec<f64>,
    /// Index of the highest score; ties resolve to the lowest index.
    pub likely: usize,
    /// True when `likely` is the unique maximum.
    pub strict: bool,
}

/// A trained (or trainable) naive-Bayes model.
#[derive(Debug)]
pub struct Classifier {
    classes: Vec<String>,
    data: Vec<ClassData>,
    learned: u64,
    seen: AtomicU64,
}

impl Classifier {
    /// Create an empty model over `classes`.
    ///
    /// At least two distinct labels are required.
    pub fn new<S: AsRef<str>>(classes: &[S]) -> Result<Self> {
        let classes: Vec<String> = classes.iter().map(|c| c.as_ref().to_string()).collect();
        if classes.len() < 2 {
            return Err(ClassifierError::Config(format!(
                "at least two classes required, got {}",
                classes.len()
            )));
        }
        for (i, class) in classes.iter().enumerate() {
            if classes[..i].contains(class) {
                return Err(ClassifierError::Config(format!(
                    "duplicate class: {class}"
                )));
            }
        }
        Ok(Self::empty(classes))
    }

    /// An untrained model over labels the caller has already validated.
    pub(crate) fn empty(classes: Vec<String>) -> Self {
        let data = vec![ClassData::default(); classes.len()];
        Self {
            classes,
            data,
            learned: 0,
            seen: AtomicU64::new(0),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Position of `class` in [`classes`](Self::classes).
    pub fn class_index(&self, class: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == class)
    }

    /// Training data for one class.
    pub fn class_data(&self, class: &str) -> Option<&ClassData> {
        self.class_index(class).map(|i| &self.data[i])
    }

    /// Number of [`train`](Self::train) calls.
    pub fn learned(&self) -> u64 {
        self.learned
    }

    /// Number of scoring calls.
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    /// Token total per class, in class order.
    pub fn word_count(&self) -> Vec<u64> {
        self.data.iter().map(|d| d.total).collect()
    }

    /// Record `tokens` as an example of `class`.
    ///
    /// Each token's count and the class total grow by one per occurrence,
    /// so the frequency table always sums to the total.
    pub fn train<S: AsRef<str>>(&mut self, class: &str, tokens: &[S]) -> Result<()> {
        let idx = self
            .class_index(class)
            .ok_or_else(|| ClassifierError::UnknownClass(class.to_string()))?;
        let data = &mut self.data[idx];
        for token in tokens {
            *data.freqs.entry(token.as_ref().to_string()).or_insert(0) += 1;
            data.total += 1;
        }
        self.learned += 1;
        Ok(())
    }

    /// Prior probability of each class: its share of all learned tokens.
    pub fn priors(&self) -> Vec<f64> {
        let sum: u64 = self.data.iter().map(|d| d.total).sum();
        self.data
            .iter()
            .map(|d| {
                if sum == 0 {
                    0.0
                } else {
                    d.total as f64 / sum as f64
                }
            })
            .collect()
    }

    /// `log P(c) + Σ log P(t | c)` for each class.
    pub fn log_scores<S: AsRef<str>>(&self, tokens: &[S]) -> Scores {
        self.seen.fetch_add(1, Ordering::Relaxed);
        let scores = self
            .priors()
            .into_iter()
            .zip(&self.data)
            .map(|(prior, data)| {
                tokens
                    .iter()
                    .fold(prior.ln(), |acc, t| acc + data.word_prob(t.as_ref()).ln())
            })
            .collect();
        pick(scores)
    }

    /// Normalized linear-space probabilities for each class.
    ///
    /// Fails with [`ClassifierError::Underflow`] when every class product
    /// rounds to zero.
    pub fn prob_scores<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Scores> {
        self.seen.fetch_add(1, Ordering::Relaxed);
        let raw: Vec<f64> = self
            .priors()
            .into_iter()
            .zip(&self.data)
            .map(|(prior, data)| {
                tokens
                    .iter()
                    .fold(prior, |acc, t| acc * data.word_prob(t.as_ref()))
            })
            .collect();
        let sum: f64 = raw.iter().sum();
        if !(sum > 0.0 && sum.is_finite()) {
            return Err(ClassifierError::Underflow);
        }
        Ok(pick(raw.into_iter().map(|s| s / sum).collect()))
    }

    /// `P(token | class)` as a `[class][token]` matrix.
    pub fn word_frequencies<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<Vec<f64>> {
        self.data
            .iter()
            .map(|d| tokens.iter().map(|t| d.word_prob(t.as_ref())).collect())
            .collect()
    }
}

impl Clone for Classifier {
    fn clone(&self) -> Self {
        Self {
            classes: self.classes.clone(),
            data: self.data.clone(),
            learned: self.learned,
            seen: AtomicU64::new(self.seen()),
        }
    }
}

fn pick(scores: Vec<f64>) -> Scores {
    let mut likely = 0;
    let mut strict = true;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[likely] {
            likely = i;
            strict = true;
        } else if score == scores[likely] {
            strict = false;
        }
    }
    Scores {
        scores,
        likely,
        strict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_bad() -> Classifier {
        let mut c = Classifier::new(&["good", "bad"]).unwrap();
        c.train("good", &["tall", "handsome", "rich"]).unwrap();
        c.train("bad", &["bald", "poor", "ugly"]).unwrap();
        c
    }

    #[test]
    fn needs_two_distinct_classes() {
        assert!(matches!(
            Classifier::new(&["only"]),
            Err(ClassifierError::Config(_))
        ));
        assert!(matches!(
            Classifier::new::<&str>(&[]),
            Err(ClassifierError::Config(_))
        ));
        assert!(matches!(
            Classifier::new(&["a", "b", "a"]),
            Err(ClassifierError::Config(_))
        ));
    }

    #[test]
    fn train_unknown_class() {
        let mut c = good_bad();
        let err = c.train("neutral", &["meh"]).unwrap_err();
        assert!(matches!(err, ClassifierError::UnknownClass(ref n) if n == "neutral"));
        assert_eq!(c.learned(), 2);
    }

    #[test]
    fn log_scores_prefers_trained_word() {
        let c = good_bad();
        let s = c.log_scores(&["the", "tall", "man"]);
        assert!(s.scores[0] > s.scores[1]);
        assert_eq!(s.likely, 0);
        assert!(s.strict);
    }

    #[test]
    fn log_scores_tie_is_not_strict() {
        let c = good_bad();
        let s = c.log_scores(&["the", "bad", "man"]);
        assert_eq!(s.scores[0], s.scores[1]);
        assert_eq!(s.likely, 0);
        assert!(!s.strict);
    }

    #[test]
    fn later_class_can_win() {
        let c = good_bad();
        let s = c.log_scores(&["poor", "ugly"]);
        assert_eq!(s.likely, 1);
        assert!(s.strict);
    }

    #[test]
    fn counts_sum_to_total() {
        let mut c = good_bad();
        c.train("good", &["tall", "tall"]).unwrap();
        for class in c.classes().to_vec() {
            let data = c.class_data(&class).unwrap();
            assert_eq!(data.freqs.values().sum::<u64>(), data.total);
        }
        assert_eq!(c.word_count(), vec![5, 3]);
        assert_eq!(c.class_data("good").unwrap().freqs["tall"], 3);
    }

    #[test]
    fn empty_class_is_allowed() {
        let mut c = Classifier::new(&["a", "b", "c"]).unwrap();
        c.train("a", &["x"]).unwrap();
        c.train("b", &["y"]).unwrap();
        assert_eq!(c.word_count(), vec![1, 1, 0]);
        let priors = c.priors();
        assert_eq!(priors, vec![0.5, 0.5, 0.0]);
        assert_eq!(c.log_scores(&["x"]).likely, 0);
    }

    #[test]
    fn extra_training_raises_likelihood() {
        let mut c = good_bad();
        let before = c.log_scores(&["rich"]).scores[0];
        c.train("good", &["rich"]).unwrap();
        let after = c.log_scores(&["rich"]).scores[0];
        assert!(after > before);

        let before = c.log_scores(&["smart"]).scores[0];
        c.train("good", &["smart"]).unwrap();
        let after = c.log_scores(&["smart"]).scores[0];
        assert!(after > before);
    }

    #[test]
    fn prob_scores_normalize() {
        let c = good_bad();
        let s = c.prob_scores(&["tall"]).unwrap();
        let sum: f64 = s.scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(s.likely, 0);
        assert!(s.scores[0] > 0.99);
    }

    #[test]
    fn prob_scores_underflow() {
        let c = good_bad();
        let many_unseen = vec!["zzz"; 40];
        assert!(matches!(
            c.prob_scores(&many_unseen[..]),
            Err(ClassifierError::Underflow)
        ));

        let untrained = Classifier::new(&["a", "b"]).unwrap();
        assert!(matches!(
            untrained.prob_scores(&["x"]),
            Err(ClassifierError::Underflow)
        ));
    }

    #[test]
    fn word_frequencies_matrix() {
        let c = good_bad();
        let m = c.word_frequencies(&["tall", "poor", "who"]);
        assert_eq!(m.len(), 2);
        assert!(m.iter().all(|row| row.len() == 3));
        assert!((m[0][0] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(m[0][1], DEFAULT_PROB);
        assert!((m[1][1] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(m[1][2], DEFAULT_PROB);
    }

    #[test]
    fn scoring_counts_as_seen() {
        let c = good_bad();
        assert_eq!(c.seen(), 0);
        c.log_scores(&["tall"]);
        let _ = c.prob_scores(&["tall"]);
        assert_eq!(c.seen(), 2);
        assert_eq!(c.clone().seen(), 2);
    }

    #[test]
    fn error_maps_into_taxonomy() {
        use abot_types::ErrorKind;
        let err: AbotError = ClassifierError::Underflow.into();
        assert_eq!(err.kind(), ErrorKind::Underflow);
        let err: AbotError = ClassifierError::Config("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn training_raises_multi_token_score() {
        let mut c = good_bad();
        let seq = ["the", "tall", "tall", "stranger"];
        let before = c.log_scores(&seq).scores[0];
        c.train("good", &["tall"]).unwrap();
        let after = c.log_scores(&seq).scores[0];
        assert!(after > before, "{after} <= {before}");
    }

    mod properties {
        use crate::classifier::Classifier;
        use proptest::prelude::*;

        const CLASSES: [&str; 3] = ["a", "b", "c"];

        fn docs() -> impl Strategy<Value = Vec<(usize, Vec<String>)>> {
            // At least one document for every class, so each has token mass.
            let doc = (0..3usize, proptest::collection::vec("[p-t]{1,2}", 1..4));
            proptest::collection::vec(doc, 0..12).prop_map(|mut docs| {
                for class in 0..3 {
                    docs.push((class, vec![format!("seed{class}")]));
                }
                docs
            })
        }

        proptest! {
            /// Other tokens in the sequence are ones the class has never
            /// seen, so only the prior and `t`'s own probability move.
            #[test]
            fn train_is_monotone_over_sequences(
                docs in docs(),
                class in 0..3usize,
                token in "[p-t]{1,2}",
                repeats in 1..4usize,
                unseen in proptest::collection::vec("z[a-z]{1,4}", 0..4),
            ) {
                let mut c = Classifier::new(&CLASSES).unwrap();
                for (k, words) in &docs {
                    c.train(CLASSES[*k], words).unwrap();
                }
                let mut seq = unseen.clone();
                for i in 0..repeats {
                    seq.insert(i.min(seq.len()), token.clone());
                }

                let before = c.log_scores(&seq).scores[class];
                c.train(CLASSES[class], &[token.as_str()]).unwrap();
                let after = c.log_scores(&seq).scores[class];
                prop_assert!(after > before, "{} <= {} for {:?}", after, before, seq);
            }
        }
    }
}
