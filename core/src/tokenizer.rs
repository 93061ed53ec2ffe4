use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}]+").expect("valid regex");
}

/// Tokens shorter than this are dropped: articles, OCR artifacts and
/// similar noise that would bloat the vocabulary without helping recall.
const MIN_TOKEN_CHARS: usize = 3;

/// Tokenize text into lowercase alphanumeric runs using NFKC normalization.
/// Duplicates and order are preserved; callers aggregate into frequency
/// counts. Any input is valid — empty or symbol-only text yields an empty vec.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}
