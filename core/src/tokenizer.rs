use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        // Contractions are already split on the apostrophe, so only bare words are listed.
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Analysis options. Persisted with the index so queries are analyzed the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Drop common English words. Dropped words still consume a position.
    pub stopwords: bool,
    /// Apply the Snowball English stemmer.
    pub stem: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub term: Cow<'a, str>,
    pub position: u32,
}

/// Normalized text ready to be split into terms.
///
/// The stream owns its buffer, so `iter` can be called any number of times and
/// yields the same sequence each time.
pub struct TokenStream {
    config: AnalyzerConfig,
    buffer: String,
}

impl TokenStream {
    pub fn iter(&self) -> impl Iterator<Item = Token<'_>> + '_ {
        let config = self.config;
        WORD.find_iter(&self.buffer).enumerate().filter_map(move |(pos, m)| {
            let word = m.as_str();
            if config.stopwords && is_stopword(word) {
                return None;
            }
            let term = if config.stem { STEMMER.stem(word) } else { Cow::Borrowed(word) };
            Some(Token { term, position: pos as u32 })
        })
    }

    pub fn terms(&self) -> Vec<String> {
        self.iter().map(|t| t.term.into_owned()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self { Self { config } }

    pub fn config(&self) -> AnalyzerConfig { self.config }

    /// NFKC-normalize and case-fold `text`. Splitting happens lazily in [`TokenStream::iter`].
    pub fn analyze(&self, text: &str) -> TokenStream {
        let buffer = text.nfkc().collect::<String>().to_lowercase();
        TokenStream { config: self.config, buffer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_non_alphanumeric_and_folds_case() {
        let terms = Analyzer::default().analyze("Hello, WORLD! it's 2024-05").terms();
        assert_eq!(terms, vec!["hello", "world", "it", "s", "2024", "05"]);
    }

    #[test]
    fn stream_is_restartable() {
        let stream = Analyzer::default().analyze("cat dog cat");
        let first: Vec<_> = stream.iter().collect();
        let second: Vec<_> = stream.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn stopwords_keep_positions() {
        let analyzer = Analyzer::new(AnalyzerConfig { stopwords: true, stem: false });
        let stream = analyzer.analyze("the cat and the dog");
        let toks: Vec<(String, u32)> = stream.iter().map(|t| (t.term.into_owned(), t.position)).collect();
        assert_eq!(toks, vec![("cat".to_string(), 1), ("dog".to_string(), 4)]);
    }

    #[test]
    fn stemming_is_opt_in() {
        let plain = Analyzer::default().analyze("running").terms();
        assert_eq!(plain, vec!["running"]);
        let stemmed = Analyzer::new(AnalyzerConfig { stopwords: false, stem: true }).analyze("running").terms();
        assert_eq!(stemmed, vec!["run"]);
    }
}
