/// TF-IDF text index over name + composition.
///
/// Vector space:
///   - features: word n-grams (1..=ngram_max) built per field, so no n-gram
///     spans the name/composition boundary
///   - term weight: sublinear tf `1 + ln(tf)` times smoothed idf
///     `ln((1 + n) / (1 + df)) + 1`
///   - document vectors are L2-normalized, so a dot product is a cosine
///
/// Lookups go through per-feature posting lists and only touch documents that
/// share at least one feature with the query.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;

use super::{Channel, SearchHit};
use crate::catalogue::{Catalogue, MedicineId, MedicineRecord};
use crate::config::IndexConfig;
use crate::text;

type SparseVector = Vec<(usize, f64)>;

pub struct TextIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    /// feature → (doc, weight), ascending doc order
    postings: Vec<Vec<(MedicineId, f64)>>,
    doc_vectors: Vec<SparseVector>,
    ngram_max: usize,
}

/// Raw n-gram counts for one record.
fn document_terms(record: &MedicineRecord, ngram_max: usize) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for field in [&record.name, &record.composition] {
        let tokens = text::analyze(field);
        for gram in text::ngrams(&tokens, ngram_max) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

fn sublinear_tf(count: usize) -> f64 {
    1.0 + (count as f64).ln()
}

fn l2_normalize(vector: &mut SparseVector) {
    let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, w) in vector.iter_mut() {
            *w /= norm;
        }
    }
}

impl TextIndex {
    /// Build the vector space for a catalogue.
    pub fn build(catalogue: &Catalogue, config: &IndexConfig) -> Self {
        let ngram_max = config.ngram_max.max(1);
        let n_docs = catalogue.len();

        let doc_terms: Vec<HashMap<String, usize>> = catalogue
            .records()
            .par_iter()
            .map(|record| document_terms(record, ngram_max))
            .collect();

        // document frequency and corpus frequency per term
        let mut stats: HashMap<&str, (usize, usize)> = HashMap::new();
        for terms in &doc_terms {
            for (term, count) in terms {
                let entry = stats.entry(term.as_str()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += count;
            }
        }

        let prune = n_docs >= config.prune_min_docs;
        let mut candidates: Vec<(&str, usize, usize)> = stats
            .into_iter()
            .filter(|(_, (df, _))| {
                !prune
                    || (*df >= config.min_df && (*df as f64) / (n_docs as f64) <= config.max_df)
            })
            .map(|(term, (df, cf))| (term, df, cf))
            .collect();
        candidates.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));
        candidates.truncate(config.max_features);

        // feature ids in lexical term order keep the index layout reproducible
        let selected: BTreeMap<&str, usize> =
            candidates.iter().map(|(term, df, _)| (*term, *df)).collect();
        let mut vocabulary = HashMap::with_capacity(selected.len());
        let mut idf = Vec::with_capacity(selected.len());
        for (feature, (term, df)) in selected.into_iter().enumerate() {
            vocabulary.insert(term.to_string(), feature);
            idf.push(((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0);
        }

        let doc_vectors: Vec<SparseVector> = doc_terms
            .par_iter()
            .map(|terms| {
                let mut vector: SparseVector = terms
                    .iter()
                    .filter_map(|(term, count)| {
                        vocabulary
                            .get(term)
                            .map(|&f| (f, sublinear_tf(*count) * idf[f]))
                    })
                    .collect();
                vector.sort_by_key(|(f, _)| *f);
                l2_normalize(&mut vector);
                vector
            })
            .collect();

        let mut postings: Vec<Vec<(MedicineId, f64)>> = vec![Vec::new(); idf.len()];
        for (doc, vector) in doc_vectors.iter().enumerate() {
            for &(feature, weight) in vector {
                postings[feature].push((doc, weight));
            }
        }

        tracing::info!(
            documents = n_docs,
            features = idf.len(),
            pruned = prune,
            "Text index built"
        );

        TextIndex {
            vocabulary,
            idf,
            postings,
            doc_vectors,
            ngram_max,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.idf.len()
    }

    /// Project free text into the index space.
    fn vectorize(&self, query: &str) -> SparseVector {
        let tokens = text::analyze(query);
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for gram in text::ngrams(&tokens, self.ngram_max) {
            if let Some(&feature) = self.vocabulary.get(&gram) {
                *counts.entry(feature).or_insert(0) += 1;
            }
        }
        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(f, c)| (f, sublinear_tf(c) * self.idf[f]))
            .collect();
        vector.sort_by_key(|(f, _)| *f);
        l2_normalize(&mut vector);
        vector
    }

    /// Cosine similarity of a normalized query vector against every document
    /// sharing a feature with it.
    fn score(&self, query: &SparseVector) -> HashMap<MedicineId, f64> {
        let mut scores: HashMap<MedicineId, f64> = HashMap::new();
        for &(feature, q_weight) in query {
            for &(doc, d_weight) in &self.postings[feature] {
                *scores.entry(doc).or_insert(0.0) += q_weight * d_weight;
            }
        }
        scores
    }

    /// Highest-scoring documents at or above `floor`, score desc then id asc.
    fn top_k(
        scores: HashMap<MedicineId, f64>,
        k: usize,
        floor: f64,
        exclude: &HashSet<MedicineId>,
    ) -> Vec<(MedicineId, f64)> {
        let mut ranked: Vec<(MedicineId, f64)> = scores
            .into_iter()
            .filter(|(doc, score)| *score >= floor && !exclude.contains(doc))
            .map(|(doc, score)| (doc, score.min(1.0)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }

    /// Free-text lookup. Empty or unknown input yields no hits.
    pub fn lexical_search(&self, query: &str, k: usize, floor: f64) -> Vec<SearchHit> {
        let vector = self.vectorize(query);
        if vector.is_empty() || k == 0 {
            return Vec::new();
        }
        Self::top_k(self.score(&vector), k, floor, &HashSet::new())
            .into_iter()
            .map(|(id, score)| SearchHit::new(id, score, Channel::Lexical))
            .collect()
    }

    /// Score an explicit weighted unigram query. Terms are analyzed the same
    /// way as documents; unknown terms contribute nothing.
    pub fn weighted_search(&self, terms: &[(String, f64)], k: usize, floor: f64) -> Vec<(MedicineId, f64)> {
        let mut weights: HashMap<usize, f64> = HashMap::new();
        for (term, weight) in terms {
            let analyzed = text::analyze(term).join(" ");
            if let Some(&feature) = self.vocabulary.get(&analyzed) {
                let w = weight.max(0.0) * self.idf[feature];
                let slot = weights.entry(feature).or_insert(0.0);
                *slot = slot.max(w);
            }
        }
        let mut vector: SparseVector = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
        if vector.is_empty() || k == 0 {
            return Vec::new();
        }
        vector.sort_by_key(|(f, _)| *f);
        l2_normalize(&mut vector);
        Self::top_k(self.score(&vector), k, floor, &HashSet::new())
    }

    /// Nearest neighbours of an indexed record, skipping `exclude`.
    pub fn similar_to(
        &self,
        id: MedicineId,
        k: usize,
        floor: f64,
        exclude: &HashSet<MedicineId>,
    ) -> Vec<(MedicineId, f64)> {
        match self.doc_vectors.get(id) {
            Some(vector) if !vector.is_empty() && k > 0 => {
                Self::top_k(self.score(vector), k, floor, exclude)
            }
            _ => Vec::new(),
        }
    }
}
