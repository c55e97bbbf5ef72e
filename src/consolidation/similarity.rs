/// Record similarity measures used for duplicate grouping.
///
/// Names are compared after stripping strengths, dosage forms, pack words and
/// punctuation, so "Paracetamol 500mg Tablet 10 tablets" and
/// "Paracetamol Tablet 500 mg" both reduce to "paracetamol". Compositions are
/// compared as sets of "ingredient strength" keys.

use crate::text;

/// Dosage-form and packaging words that do not identify a product.
const FORM_WORDS: &[&str] = &[
    "tablet", "tablets", "tab", "tabs", "capsule", "capsules", "cap", "caps", "injection",
    "injections", "syrup", "suspension", "drop", "drops", "cream", "gel", "ointment", "lotion",
    "solution", "spray", "inhaler", "powder", "sachet", "sachets", "strip", "strips", "bottle",
    "bottles", "vial", "vials", "ampoule", "ampoules", "tube", "pack", "packs", "box", "kit",
];

const UNIT_WORDS: &[&str] = &["mg", "mcg", "g", "gm", "ml", "iu", "kg", "unit", "units"];

/// Reduce a product name to the words that identify it.
pub fn normalize_name(name: &str) -> String {
    text::glue_dosages(name)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !t.chars().any(|c| c.is_numeric()))
        .filter(|t| !FORM_WORDS.contains(t) && !UNIT_WORDS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity over Unicode scalar values:
/// `1 - distance / max(len_a, len_b)`. Two empty strings are identical.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Similarity of two normalized names; blank names never match anything.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    string_similarity(a, b)
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Sorted, de-duplicated "ingredient strength" keys of a composition.
///
/// "Ibuprofen (400mg) + Paracetamol (325 mg)" → ["ibuprofen 400mg", "paracetamol 325mg"].
/// Unspecified compositions have no keys.
pub fn ingredient_keys(composition: &str) -> Vec<String> {
    let trimmed = composition.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("not specified") {
        return Vec::new();
    }
    let mut keys: Vec<String> = trimmed
        .split('+')
        .filter_map(|part| {
            let glued = text::glue_dosages(part);
            let name: Vec<&str> = glued
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty() && t.chars().all(char::is_alphabetic))
                .filter(|t| !UNIT_WORDS.contains(t))
                .collect();
            if name.is_empty() {
                return None;
            }
            let mut key = name.join(" ");
            let strengths = text::extract_dosages(&glued);
            if !strengths.is_empty() {
                key.push(' ');
                key.push_str(&strengths.join(" "));
            }
            Some(key)
        })
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Jaccard overlap of two sorted key sets; 0 when either side is empty.
pub fn composition_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (mut i, mut j, mut shared) = (0, 0, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}
