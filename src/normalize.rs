//! Name normalization for fuzzy comparisons
//!
//! Release names on the remote mount use every separator imaginable
//! (`Game.of.Thrones`, `Game_of_Thrones`, `Game of Thrones`). Everything in the
//! matching engine compares names through the helpers in this module so that
//! separators never influence the outcome.

use std::collections::HashSet;

/// Articles and conjunctions (English, Spanish, French) ignored as keywords
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "el", "la", "los", "las", "un", "una", "de", "del", "y",
    "le", "les", "des", "du", "et",
];

/// Keywords shorter than this are considered noise
const MIN_KEYWORD_LEN: usize = 3;

/// Canonical comparison form: lowercase, letters and digits only
///
/// ```ignore
/// assert_eq!(normalize("X-Men '97"), "xmen97");
/// ```
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Splits a name into lowercase alphanumeric tokens
///
/// Every run of non-alphanumeric characters acts as a single separator. The
/// returned iterator is lazy and cheap to clone, so callers can walk the token
/// stream more than once.
pub fn tokenize(name: &str) -> impl Iterator<Item = String> + Clone + '_ {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Filters tokens down to the words that carry meaning for matching
///
/// Stopwords and tokens shorter than three characters are dropped.
pub fn keywords<I>(tokens: I) -> HashSet<String>
where
    I: IntoIterator<Item = String>,
{
    tokens
        .into_iter()
        .filter(|token| token.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Game.of.Thrones"), "gameofthrones");
        assert_eq!(normalize("X-Men '97"), "xmen97");
        assert_eq!(normalize("  [RD+] TorBox "), "rdtorbox");
        assert_eq!(normalize("Rápidos y furiosos X"), "rápidosyfuriososx");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("Dexter.S01E07.2006.WEB-DL").collect();
        assert_eq!(tokens, vec!["dexter", "s01e07", "2006", "web", "dl"]);

        let tokens: Vec<String> = tokenize("__a  --  B__").collect();
        assert_eq!(tokens, vec!["a", "b"]);

        assert_eq!(tokenize("").count(), 0);
    }

    #[test]
    fn test_tokenize_is_restartable() {
        let tokens = tokenize("The Seven Dials Mystery");
        let first: Vec<String> = tokens.clone().collect();
        let second: Vec<String> = tokens.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_keywords_drop_stopwords_and_short_words() {
        let words = keywords(tokenize("El misterio de las siete esferas"));
        let expected: HashSet<String> = ["misterio", "siete", "esferas"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(words, expected);

        let words = keywords(tokenize("The Lord of the Rings"));
        assert!(words.contains("lord"));
        assert!(words.contains("rings"));
        assert!(!words.contains("the"));

        assert!(keywords(tokenize("Up")).is_empty());
    }
}
