/// Text analysis shared by the indexes, the symptom matcher and the ranker.
///
/// Pipeline: lowercase → glue dosage strengths ("500 mg" → "500mg") →
/// split on anything that is not alphanumeric, '.', or '%' → drop English
/// stopwords → light lemmatization (plural folding).
///
/// Dosage units and dosage forms are deliberately not stopwords: "500mg" and
/// "tablet" carry meaning in a catalogue of near-identical products.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Units recognised as dosage strengths, longest first so the regex prefers "mcg" over "mg".
const DOSAGE_UNITS: &str = r"mcg|mg|gm|g|ml|iu|kg";

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his",
    "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most",
    "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our",
    "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your",
];

/// Words ending in "s" that are not plurals.
const PLURAL_EXCEPTIONS: &[&str] = &[
    "diabetes", "herpes", "rabies", "scabies", "mumps", "measles", "lotus", "virus", "tetanus",
    "gas", "plus", "sinus", "mucus", "psoriasis", "analysis", "arthritis", "bronchitis",
    "dermatitis", "sclerosis",
];

fn dosage_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(\d+(?:\.\d+)?)\s*((?:{})\b|%)", DOSAGE_UNITS))
            .unwrap_or_else(|e| unreachable!("static dosage regex: {e}"))
    })
}

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| ENGLISH_STOPWORDS.iter().copied().collect())
}

/// Lowercase and glue every dosage strength to its unit.
///
/// "Paracetamol Tablet 500 MG" → "paracetamol tablet 500mg"
pub fn glue_dosages(text: &str) -> String {
    let lower = text.to_lowercase();
    dosage_regex().replace_all(&lower, "$1$2").into_owned()
}

/// Extract normalized dosage strengths ("500mg", "0.5%") in order of appearance.
pub fn extract_dosages(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    dosage_regex()
        .captures_iter(&lower)
        .map(|c| format!("{}{}", &c[1], &c[2]))
        .collect()
}

/// Split into raw lowercase tokens without stopword removal or lemmatization.
pub fn raw_tokens(text: &str) -> Vec<String> {
    glue_dosages(text)
        .split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '%'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fold simple English plurals onto their singular form.
pub fn lemmatize(token: &str) -> String {
    if token.len() <= 3
        || token.chars().any(|c| c.is_ascii_digit())
        || PLURAL_EXCEPTIONS.contains(&token)
    {
        return token.to_string();
    }
    if let Some(stem) = token.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if token.ends_with("ss") || token.ends_with("us") || token.ends_with("is") {
        return token.to_string();
    }
    match token.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => token.to_string(),
    }
}

/// Full analysis: raw tokens minus stopwords, lemmatized.
pub fn analyze(text: &str) -> Vec<String> {
    let stop = stopwords();
    raw_tokens(text)
        .into_iter()
        .filter(|t| !stop.contains(t.as_str()))
        .map(|t| lemmatize(&t))
        .collect()
}

/// Contiguous n-grams of length 1..=max_n, joined with a single space.
pub fn ngrams(tokens: &[String], max_n: usize) -> Vec<String> {
    let mut out = Vec::new();
    for n in 1..=max_n.max(1) {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glue_dosages() {
        assert_eq!(glue_dosages("Paracetamol Tablet 500 MG"), "paracetamol tablet 500mg");
        assert_eq!(glue_dosages("Clobetasol 0.05 % cream"), "clobetasol 0.05% cream");
        // "5 mgx" is not a unit
        assert_eq!(glue_dosages("5 mgx"), "5 mgx");
    }

    #[test]
    fn test_extract_dosages() {
        assert_eq!(
            extract_dosages("Paracetamol (500mg) + Caffeine (25 mg)"),
            vec!["500mg", "25mg"]
        );
        assert!(extract_dosages("Crocin Advance").is_empty());
    }

    #[test]
    fn test_analyze_keeps_units_and_forms() {
        let tokens = analyze("Paracetamol 500 mg Tablets for the fever");
        assert_eq!(tokens, vec!["paracetamol", "500mg", "tablet", "fever"]);
    }

    #[test]
    fn test_analyze_garbage_is_empty() {
        assert!(analyze("!!! ??? ---").is_empty());
        assert!(analyze("").is_empty());
    }

    #[test]
    fn test_lemmatize() {
        assert_eq!(lemmatize("tablets"), "tablet");
        assert_eq!(lemmatize("allergies"), "allergy");
        assert_eq!(lemmatize("diabetes"), "diabetes");
        assert_eq!(lemmatize("arthritis"), "arthritis");
        assert_eq!(lemmatize("glass"), "glass");
        assert_eq!(lemmatize("10s"), "10s");
        assert_eq!(lemmatize("gas"), "gas");
    }

    #[test]
    fn test_ngrams() {
        let tokens: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let grams = ngrams(&tokens, 3);
        assert_eq!(grams, vec!["a", "b", "c", "a b", "b c", "a b c"]);
        assert_eq!(ngrams(&tokens[..1], 3), vec!["a"]);
        assert!(ngrams(&[], 3).is_empty());
    }
}
