/// Symptom-keyword expansion channel.
///
/// A query mentioning a known symptom ("headache", "acidity") is expanded into
/// a weighted sub-query over the ingredients associated with that symptom.
/// Hits are scored through the text index and boosted over their plain
/// lexical score. Queries without a known keyword produce nothing.

use std::collections::{BTreeMap, HashMap};

use super::{Channel, SearchHit, TextIndex};
use crate::text;

/// Built-in symptom → ingredient table, strongest association first.
const BUILTIN_SYMPTOMS: &[(&str, &[&str])] = &[
    ("headache", &["paracetamol", "ibuprofen", "aspirin", "diclofenac"]),
    ("fever", &["paracetamol", "ibuprofen", "aspirin", "acetaminophen"]),
    ("pain", &["paracetamol", "ibuprofen", "diclofenac", "tramadol", "ketorolac"]),
    ("cold", &["cetirizine", "phenylephrine", "pseudoephedrine", "loratadine"]),
    ("cough", &["dextromethorphan", "guaifenesin", "codeine"]),
    ("allergy", &["cetirizine", "loratadine", "fexofenadine", "diphenhydramine"]),
    ("acidity", &["pantoprazole", "omeprazole", "ranitidine", "esomeprazole"]),
    ("diabetes", &["metformin", "glimepiride", "insulin", "gliclazide"]),
    ("hypertension", &["amlodipine", "losartan", "atenolol", "ramipril"]),
    ("infection", &["amoxicillin", "azithromycin", "ceftriaxone", "ciprofloxacin"]),
    ("inflammation", &["ibuprofen", "diclofenac", "prednisolone", "dexamethasone"]),
    ("nausea", &["ondansetron", "domperidone", "metoclopramide"]),
    ("vomiting", &["ondansetron", "domperidone", "metoclopramide"]),
    ("diarrhea", &["loperamide", "ofloxacin", "norfloxacin"]),
    ("constipation", &["lactulose", "bisacodyl", "docusate"]),
    ("anxiety", &["alprazolam", "lorazepam", "diazepam"]),
    ("depression", &["sertraline", "fluoxetine", "amitriptyline"]),
    ("insomnia", &["zolpidem", "melatonin", "diphenhydramine"]),
    ("asthma", &["salbutamol", "montelukast", "budesonide"]),
    ("arthritis", &["diclofenac", "ibuprofen", "methotrexate"]),
    ("migraine", &["sumatriptan", "rizatriptan", "paracetamol"]),
    ("fungal", &["fluconazole", "clotrimazole", "terbinafine"]),
];

/// A symptom keyword with its weighted ingredient terms.
#[derive(Debug, Clone, PartialEq)]
pub struct SymptomEntry {
    pub keyword: String,
    /// Analyzed keyword tokens; all must occur in a query for the entry to fire
    pub tokens: Vec<String>,
    /// Ordered (term, weight >= 0); never empty
    pub terms: Vec<(String, f64)>,
}

impl SymptomEntry {
    /// Weights fall off by 0.1 per position, floored at 0.1.
    pub fn from_ranked_terms(keyword: &str, terms: &[&str]) -> Option<Self> {
        let terms: Vec<(String, f64)> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, t)| (t, (1.0 - 0.1 * i as f64).max(0.1)))
            .collect();
        let tokens = text::analyze(keyword);
        if terms.is_empty() || tokens.is_empty() {
            return None;
        }
        Some(SymptomEntry {
            keyword: tokens.join(" "),
            tokens,
            terms,
        })
    }
}

pub struct SymptomIndex {
    /// analyzed keyword → entry; BTreeMap keeps matching order stable
    entries: BTreeMap<String, SymptomEntry>,
    symptom_boost: f64,
}

impl SymptomIndex {
    pub fn new(entries: Vec<SymptomEntry>, symptom_boost: f64) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| (e.keyword.clone(), e))
            .collect();
        SymptomIndex {
            entries,
            symptom_boost,
        }
    }

    /// Built-in table merged with configured extras (extras win on conflicts).
    pub fn with_extras(extras: &BTreeMap<String, Vec<String>>, symptom_boost: f64) -> Self {
        let mut entries: Vec<SymptomEntry> = BUILTIN_SYMPTOMS
            .iter()
            .filter_map(|(keyword, terms)| SymptomEntry::from_ranked_terms(keyword, terms))
            .collect();
        for (keyword, terms) in extras {
            let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
            match SymptomEntry::from_ranked_terms(keyword, &terms) {
                Some(entry) => {
                    entries.retain(|e| e.keyword != entry.keyword);
                    entries.push(entry);
                }
                None => tracing::warn!(keyword = %keyword, "Ignoring symptom entry without terms"),
            }
        }
        Self::new(entries, symptom_boost)
    }

    pub fn builtin(symptom_boost: f64) -> Self {
        Self::with_extras(&BTreeMap::new(), symptom_boost)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keywords whose every token is among the analyzed query tokens, in
    /// table order. Token position in the query does not matter.
    pub fn matching_keywords(&self, query_tokens: &[String]) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| e.tokens.iter().all(|k| query_tokens.contains(k)))
            .map(|e| e.keyword.as_str())
            .collect()
    }

    /// Union of the matched keywords' terms; a term shared by several
    /// keywords keeps its highest weight.
    pub fn expand(&self, query_tokens: &[String]) -> Vec<(String, f64)> {
        let mut merged: BTreeMap<&str, f64> = BTreeMap::new();
        for keyword in self.matching_keywords(query_tokens) {
            if let Some(entry) = self.entries.get(keyword) {
                for (term, weight) in &entry.terms {
                    let slot = merged.entry(term.as_str()).or_insert(0.0);
                    *slot = slot.max(*weight);
                }
            }
        }
        merged.into_iter().map(|(t, w)| (t.to_string(), w)).collect()
    }

    /// Symptom channel lookup.
    ///
    /// Each hit's base score is `min(1, lexical_equivalent * symptom_boost)`,
    /// where the lexical equivalent is the text index score of the record
    /// against the expanded sub-query.
    pub fn symptom_search(
        &self,
        query: &str,
        index: &TextIndex,
        k: usize,
        floor: f64,
    ) -> Vec<SearchHit> {
        let tokens = text::analyze(query);
        let sub_query = self.expand(&tokens);
        if sub_query.is_empty() {
            return Vec::new();
        }
        tracing::debug!(
            keywords = ?self.matching_keywords(&tokens),
            terms = sub_query.len(),
            "Symptom expansion"
        );
        index
            .weighted_search(&sub_query, k, floor)
            .into_iter()
            .map(|(id, score)| SearchHit::new(id, (score * self.symptom_boost).min(1.0), Channel::Symptom))
            .collect()
    }

    /// Lexical-equivalent scores for the sub-query a symptom query expands to.
    /// Exposed so callers can compare symptom hits against their unboosted score.
    pub fn lexical_equivalent(
        &self,
        query: &str,
        index: &TextIndex,
        k: usize,
    ) -> HashMap<usize, f64> {
        let tokens = text::analyze(query);
        let sub_query = self.expand(&tokens);
        index.weighted_search(&sub_query, k, 0.0).into_iter().collect()
    }
}
