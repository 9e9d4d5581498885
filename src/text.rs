//! Text folding and tokenization shared by the lexical index and the ranker.
//!
//! Both sides must agree on what a "token" is, otherwise a keyword that
//! matched lexically could fail to fire a boost (or vice versa).

use std::collections::BTreeSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip diacritics (NFKD, combining marks dropped) and lowercase.
pub fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split folded text on every non-alphanumeric character.
///
/// Order is preserved and repeated tokens are kept so callers can count
/// term frequencies.
pub fn tokenize(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unique tokens of `text`, sorted.
pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Tokenizer with an optional stopword list.
///
/// Stopwords are folded on construction, so `"não"` in the list also removes
/// `"nao"` from the stream.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    stopwords: BTreeSet<String>,
}

impl Tokenizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stopwords: stopwords
                .into_iter()
                .flat_map(|s| tokenize(s.as_ref()))
                .collect(),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = tokenize(text);
        if !self.stopwords.is_empty() {
            tokens.retain(|t| !self.stopwords.contains(t));
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents_and_case() {
        assert_eq!(fold("Programação Lógica"), "programacao logica");
        assert_eq!(fold("SAÚDE"), "saude");
    }

    #[test]
    fn test_tokenize_splits_on_punctuation() {
        assert_eq!(
            tokenize("Excel: planilhas, fórmulas & dados!"),
            vec!["excel", "planilhas", "formulas", "dados"]
        );
    }

    #[test]
    fn test_tokenize_keeps_repeats_and_digits() {
        assert_eq!(tokenize("python 3 python"), vec!["python", "3", "python"]);
    }

    #[test]
    fn test_tokenize_empty_and_symbols_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" -- !! ").is_empty());
    }

    #[test]
    fn test_stopwords_are_folded() {
        let tokenizer = Tokenizer::new(["de", "Não"]);
        assert_eq!(
            tokenizer.tokenize("curso de python nao avancado"),
            vec!["curso", "python", "avancado"]
        );
    }

    #[test]
    fn test_default_tokenizer_keeps_everything() {
        let tokenizer = Tokenizer::default();
        assert_eq!(tokenizer.tokenize("de a para"), vec!["de", "a", "para"]);
    }
}
