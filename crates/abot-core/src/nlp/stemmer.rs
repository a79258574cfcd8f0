//! Porter suffix-stripping stemmer.
//!
//! Implements the five steps of M.F. Porter's 1980 algorithm over ASCII
//! bytes. The function is total: any byte sequence is accepted, non-letter
//! bytes are treated as consonants, and bytes outside ASCII are never split.
//!
//! Notation follows the paper. A word is `[C](VC){m}[V]`; `m` is the
//! *measure* of a stem. `y` is a vowel when it follows a consonant.

/// Stem a word. Lowercases first; words with at most two ASCII letters are
/// returned lowercased and otherwise unchanged.
pub fn stem(word: &[u8]) -> Vec<u8> {
    let mut w = word.to_ascii_lowercase();
    let letters = w.iter().filter(|b| b.is_ascii_alphabetic()).count();
    if letters <= 2 {
        return w;
    }
    step1a(&mut w);
    step1b(&mut w);
    step1c(&mut w);
    step2(&mut w);
    step3(&mut w);
    step4(&mut w);
    step5a(&mut w);
    step5b(&mut w);
    w
}

/// [`stem`] over UTF-8 text.
pub fn stem_str(word: &str) -> String {
    let out = stem(word.as_bytes());
    // Only ASCII bytes are ever cut or appended, so UTF-8 survives.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

// ── Letter classes ──────────────────────────────────────────────────────

/// Consonant flags for every byte of `w`.
fn consonants(w: &[u8]) -> Vec<bool> {
    let mut out: Vec<bool> = Vec::with_capacity(w.len());
    for (i, b) in w.iter().enumerate() {
        let c = match b {
            b'a' | b'e' | b'i' | b'o' | b'u' => false,
            b'y' => i == 0 || !out[i - 1],
            _ => true,
        };
        out.push(c);
    }
    out
}

fn measure(stem: &[u8]) -> usize {
    let cons = consonants(stem);
    let mut m = 0;
    let mut prev_vowel = false;
    for c in cons {
        if c && prev_vowel {
            m += 1;
        }
        prev_vowel = !c;
    }
    m
}

fn has_vowel(stem: &[u8]) -> bool {
    consonants(stem).iter().any(|c| !c)
}

/// `*d`: ends with a double consonant letter.
fn ends_double_consonant(w: &[u8]) -> bool {
    let n = w.len();
    if n < 2 {
        return false;
    }
    let cons = consonants(w);
    w[n - 1] == w[n - 2] && w[n - 1].is_ascii_alphabetic() && cons[n - 1]
}

/// `*o`: ends consonant-vowel-consonant, last not `w`, `x` or `y`.
fn ends_cvc(w: &[u8]) -> bool {
    let n = w.len();
    if n < 3 {
        return false;
    }
    let cons = consonants(w);
    cons[n - 3] && !cons[n - 2] && cons[n - 1] && !matches!(w[n - 1], b'w' | b'x' | b'y')
}

// ── Rule tables ─────────────────────────────────────────────────────────

/// Find the longest suffix in `rules` that `w` ends with.
fn longest_rule<'a>(w: &[u8], rules: &'a [(&'a str, &'a str)]) -> Option<&'a (&'a str, &'a str)> {
    rules
        .iter()
        .filter(|(suffix, _)| w.ends_with(suffix.as_bytes()))
        .max_by_key(|(suffix, _)| suffix.len())
}

/// Replace the longest matching suffix when the remaining stem has a
/// measure greater than `min_measure`.
fn apply_rules(w: &mut Vec<u8>, rules: &[(&str, &str)], min_measure: usize) {
    if let Some((suffix, replacement)) = longest_rule(w, rules) {
        let stem_len = w.len() - suffix.len();
        if measure(&w[..stem_len]) > min_measure {
            w.truncate(stem_len);
            w.extend_from_slice(replacement.as_bytes());
        }
    }
}

const STEP2: &[(&str, &str)] = &[
    ("ational", "ate"),
    ("tional", "tion"),
    ("enci", "ence"),
    ("anci", "ance"),
    ("izer", "ize"),
    ("abli", "able"),
    ("alli", "al"),
    ("entli", "ent"),
    ("eli", "e"),
    ("ousli", "ous"),
    ("ization", "ize"),
    ("ation", "ate"),
    ("ator", "ate"),
    ("alism", "al"),
    ("iveness", "ive"),
    ("fulness", "ful"),
    ("ousness", "ous"),
    ("aliti", "al"),
    ("iviti", "ive"),
    ("biliti", "ble"),
];

const STEP3: &[(&str, &str)] = &[
    ("icate", "ic"),
    ("ative", ""),
    ("alize", "al"),
    ("iciti", "ic"),
    ("ical", "ic"),
    ("ful", ""),
    ("ness", ""),
];

const STEP4: &[&str] = &[
    "al", "ance", "ence", "er", "ic", "able", "ible", "ant", "ement", "ment", "ent", "ion", "ou",
    "ism", "ate", "iti", "ous", "ive", "ize",
];

// ── Steps ───────────────────────────────────────────────────────────────

fn step1a(w: &mut Vec<u8>) {
    if w.ends_with(b"sses") || w.ends_with(b"ies") {
        w.truncate(w.len() - 2);
    } else if w.ends_with(b"s") && !w.ends_with(b"ss") {
        w.truncate(w.len() - 1);
    }
}

fn step1b(w: &mut Vec<u8>) {
    if w.ends_with(b"eed") {
        if measure(&w[..w.len() - 3]) > 0 {
            w.truncate(w.len() - 1);
        }
        return;
    }
    let suffix_len = if w.ends_with(b"ed") {
        2
    } else if w.ends_with(b"ing") {
        3
    } else {
        return;
    };
    if !has_vowel(&w[..w.len() - suffix_len]) {
        return;
    }
    w.truncate(w.len() - suffix_len);

    if w.ends_with(b"at") || w.ends_with(b"bl") || w.ends_with(b"iz") {
        w.push(b'e');
    } else if ends_double_consonant(w) {
        if !matches!(w[w.len() - 1], b'l' | b's' | b'z') {
            w.truncate(w.len() - 1);
        }
    } else if measure(w) == 1 && ends_cvc(w) {
        w.push(b'e');
    }
}

fn step1c(w: &mut [u8]) {
    let n = w.len();
    if n > 1 && w[n - 1] == b'y' && has_vowel(&w[..n - 1]) {
        w[n - 1] = b'i';
    }
}

fn step2(w: &mut Vec<u8>) {
    apply_rules(w, STEP2, 0);
}

fn step3(w: &mut Vec<u8>) {
    apply_rules(w, STEP3, 0);
}

fn step4(w: &mut Vec<u8>) {
    let Some(suffix) = STEP4
        .iter()
        .filter(|s| w.ends_with(s.as_bytes()))
        .max_by_key(|s| s.len())
    else {
        return;
    };
    let stem_len = w.len() - suffix.len();
    if measure(&w[..stem_len]) <= 1 {
        return;
    }
    if *suffix == "ion" && !(stem_len > 0 && matches!(w[stem_len - 1], b's' | b't')) {
        return;
    }
    w.truncate(stem_len);
}

fn step5a(w: &mut Vec<u8>) {
    if !w.ends_with(b"e") {
        return;
    }
    let stem = &w[..w.len() - 1];
    let m = measure(stem);
    if m > 1 || (m == 1 && !ends_cvc(stem)) {
        w.truncate(w.len() - 1);
    }
}

fn step5b(w: &mut Vec<u8>) {
    if w.ends_with(b"ll") && measure(w) > 1 {
        w.truncate(w.len() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(word: &str) -> String {
        stem_str(word)
    }

    #[test]
    fn reference_words() {
        assert_eq!(s("CONNECTIONS"), "connect");
        assert_eq!(s("ponies"), "poni");
        assert_eq!(s("sky"), "sky");
        assert_eq!(s("agreed"), "agre");
    }

    #[test]
    fn step1_examples() {
        let cases = [
            ("caresses", "caress"),
            ("ties", "ti"),
            ("caress", "caress"),
            ("cats", "cat"),
            ("feed", "feed"),
            ("plastered", "plaster"),
            ("bled", "bled"),
            ("motoring", "motor"),
            ("sing", "sing"),
            ("conflated", "conflat"),
            ("troubled", "troubl"),
            ("sized", "size"),
            ("hopping", "hop"),
            ("tanned", "tan"),
            ("falling", "fall"),
            ("hissing", "hiss"),
            ("fizzed", "fizz"),
            ("failing", "fail"),
            ("filing", "file"),
            ("happy", "happi"),
        ];
        for (input, expected) in cases {
            assert_eq!(s(input), expected, "stem({input})");
        }
    }

    #[test]
    fn later_step_examples() {
        let cases = [
            ("relational", "relat"),
            ("conditional", "condit"),
            ("rational", "ration"),
            ("digitizer", "digit"),
            ("hopefulness", "hope"),
            ("goodness", "good"),
            ("electrical", "electr"),
            ("adjustment", "adjust"),
            ("generalizations", "gener"),
        ];
        for (input, expected) in cases {
            assert_eq!(s(input), expected, "stem({input})");
        }
    }

    #[test]
    fn short_words_only_lowercased() {
        assert_eq!(s("Is"), "is");
        assert_eq!(s("A"), "a");
        assert_eq!(s(""), "");
        assert_eq!(s(" a"), " a");
        assert_eq!(s("  Go "), "  go ");
    }

    #[test]
    fn y_after_vowel_is_consonant() {
        let cons = consonants(b"toy");
        assert_eq!(cons, vec![true, false, true]);
        let cons = consonants(b"syzygy");
        assert_eq!(cons, vec![true, false, true, false, true, false]);
    }

    #[test]
    fn measure_examples() {
        assert_eq!(measure(b"tr"), 0);
        assert_eq!(measure(b"ee"), 0);
        assert_eq!(measure(b"tree"), 0);
        assert_eq!(measure(b"trouble"), 1);
        assert_eq!(measure(b"oats"), 1);
        assert_eq!(measure(b"troubles"), 2);
        assert_eq!(measure(b"private"), 2);
    }

    #[test]
    fn non_ascii_is_preserved() {
        assert_eq!(s("café"), "café");
        let out = stem("naïvely".as_bytes());
        assert!(String::from_utf8(out).is_ok());
    }

    proptest! {
        #[test]
        fn stem_is_total(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = stem(&bytes);
        }

        #[test]
        fn stem_str_keeps_utf8(word in "\\PC{0,24}") {
            let out = stem(word.as_bytes());
            prop_assert!(String::from_utf8(out).is_ok());
        }

        #[test]
        fn two_letter_inputs_are_lowercased(word in "[ ]{0,2}[a-zA-Z]{0,2}[0-9 ]{0,3}") {
            prop_assert_eq!(stem_str(&word), word.to_ascii_lowercase());
        }
    }
}
