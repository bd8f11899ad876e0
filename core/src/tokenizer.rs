use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Turns raw text into index terms.
///
/// The concept corpus and every query run against it must go through the
/// same configuration, otherwise term ids will not line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tokenizer {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self { lowercase: true, remove_stopwords: true, stem: true }
    }
}

impl Tokenizer {
    /// Lowercase and stopword filtering only, no stemming.
    pub fn plain() -> Self {
        Self { lowercase: true, remove_stopwords: true, stem: false }
    }

    /// Tokenize into (term, position) pairs. Positions count every matched
    /// word, including the stopwords that were dropped.
    pub fn tokenize(&self, text: &str) -> Vec<(String, usize)> {
        let mut normalized = text.nfkc().collect::<String>();
        if self.lowercase {
            normalized = normalized.to_lowercase();
        }
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(&normalized).enumerate() {
            let token = mat.as_str().trim_end_matches('\'');
            if token.is_empty() { continue; }
            // stopword list is lowercase; compare case-insensitively when case is kept
            if self.remove_stopwords && is_stopword(&token.to_lowercase()) { continue; }
            let term = if self.stem { STEMMER.stem(token).to_string() } else { token.to_string() };
            tokens.push((term, pos));
        }
        tokens
    }

    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text).into_iter().map(|(t, _)| t).collect()
    }

    /// Multiset of terms in `text`.
    pub fn term_counts(&self, text: &str) -> HashMap<String, u32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for (term, _pos) in self.tokenize(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
        counts
    }
}

/// Tokenize with the default configuration (NFKC, lowercase, stopwords, stemming).
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    Tokenizer::default().tokenize(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn counts_repeated_terms() {
        let counts = Tokenizer::plain().term_counts("malta malta phone the");
        assert_eq!(counts.get("malta"), Some(&2));
        assert_eq!(counts.get("phone"), Some(&1));
        assert!(!counts.contains_key("the"));
    }

    #[test]
    fn keeps_case_when_asked() {
        let tok = Tokenizer { lowercase: false, remove_stopwords: true, stem: false };
        assert_eq!(tok.terms("The Malta phone"), vec!["Malta".to_string(), "phone".to_string()]);
    }

    #[test]
    fn digits_are_terms() {
        assert_eq!(Tokenizer::plain().terms("gumball800 is 90"), vec!["gumball800", "90"]);
    }
}
