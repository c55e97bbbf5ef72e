/// Query execution against one catalogue generation.
///
/// Stages, in order: Retrieving (lexical + symptom channels) → Scoring
/// (merge + boosts) → Deduplicating (collapse to group representatives) →
/// Filtering → Sorting → truncate. Each stage is emitted as a trace event.
/// The pipeline is pure apart from logging: the same inputs against the same
/// generation always produce the same list.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use super::ranking::{merge_hits, QueryTerms};
use super::{BoostPipeline, Channel, FinalResult, ScoreBreakdown, SymptomIndex, TextIndex};
use crate::catalogue::{Catalogue, MedicineId};
use crate::config::SearchConfig;
use crate::consolidation::DuplicateGroups;
use crate::errors::PharmaError;
use crate::query::{SortBy, ValidatedFilters};

/// Per-query lifecycle stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Normalizing,
    CacheLookup,
    Retrieving,
    Scoring,
    Deduplicating,
    Filtering,
    Sorting,
    Caching,
    Done,
}

impl QueryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStage::Normalizing => "normalizing",
            QueryStage::CacheLookup => "cache_lookup",
            QueryStage::Retrieving => "retrieving",
            QueryStage::Scoring => "scoring",
            QueryStage::Deduplicating => "deduplicating",
            QueryStage::Filtering => "filtering",
            QueryStage::Sorting => "sorting",
            QueryStage::Caching => "caching",
            QueryStage::Done => "done",
        }
    }

    /// Emit this stage as a trace event.
    pub fn trace(self, candidates: usize) {
        tracing::trace!(stage = self.as_str(), candidates, "Query stage");
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed view of everything a query needs from one generation.
pub struct SearchPipeline<'a> {
    pub catalogue: &'a Catalogue,
    pub index: &'a TextIndex,
    pub symptoms: &'a SymptomIndex,
    pub groups: &'a DuplicateGroups,
    pub boosts: &'a BoostPipeline,
    pub config: &'a SearchConfig,
}

impl<'a> SearchPipeline<'a> {
    /// Run a normalized query to completion.
    ///
    /// Fails only with `IndexUnavailable`, when a hit refers to a record the
    /// catalogue or the groups do not know.
    pub fn run(
        &self,
        normalized_query: &str,
        filters: &ValidatedFilters,
        limit: usize,
    ) -> Result<Vec<FinalResult>, PharmaError> {
        if normalized_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pool = self.config.candidate_pool.max(limit);

        // Retrieving
        let lexical = self
            .index
            .lexical_search(normalized_query, pool, self.config.lexical_min_score);
        let symptom = self.symptoms.symptom_search(
            normalized_query,
            self.index,
            pool,
            self.config.symptom_min_score,
        );
        QueryStage::Retrieving.trace(lexical.len() + symptom.len());

        // Scoring
        let terms = QueryTerms::new(normalized_query);
        let mut scored = Vec::new();
        for hit in merge_hits(lexical, symptom) {
            let record = self.catalogue.get(hit.medicine_id).ok_or_else(|| {
                PharmaError::IndexUnavailable(format!("hit for unknown record {}", hit.medicine_id))
            })?;
            let (score, breakdown) = self.boosts.apply(&terms, record, hit.base_score);
            scored.push((hit.medicine_id, score, hit.channel, breakdown));
        }
        QueryStage::Scoring.trace(scored.len());

        // Deduplicating: best-scoring member per group, lowest id on ties
        let mut best: HashMap<MedicineId, (MedicineId, f64, Channel, Option<ScoreBreakdown>)> = HashMap::new();
        for (id, score, channel, breakdown) in scored {
            let representative = self.groups.representative_of(id).ok_or_else(|| {
                PharmaError::IndexUnavailable(format!("record {} has no duplicate group", id))
            })?;
            let replace = match best.get(&representative) {
                Some(&(member, current, _, _)) => {
                    score > current || (score == current && id < member)
                }
                None => true,
            };
            if replace {
                best.insert(representative, (id, score, channel, breakdown));
            }
        }
        QueryStage::Deduplicating.trace(best.len());

        let mut results = Vec::with_capacity(best.len());
        for (representative, (_, score, channel, breakdown)) in best {
            let record = self.catalogue.get(representative).ok_or_else(|| {
                PharmaError::IndexUnavailable(format!("unknown representative {}", representative))
            })?;
            // Filtering
            if filters.matches(record) {
                results.push(FinalResult::from_record(record, score, channel, breakdown));
            }
        }
        QueryStage::Filtering.trace(results.len());

        sort_results(&mut results, filters.sort_by);
        QueryStage::Sorting.trace(results.len());

        results.truncate(limit);
        Ok(results)
    }
}

fn by_score(a: &FinalResult, b: &FinalResult) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

/// Order results in place; every ordering ends on id so output is total.
pub fn sort_results(results: &mut [FinalResult], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance | SortBy::Confidence => results.sort_by(by_score),
        SortBy::Name => results.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        }),
        SortBy::Manufacturer => results.sort_by(|a, b| {
            a.manufacturer
                .to_lowercase()
                .cmp(&b.manufacturer.to_lowercase())
                .then_with(|| by_score(a, b))
        }),
        SortBy::Packaging => results.sort_by(|a, b| {
            a.packaging_type
                .to_lowercase()
                .cmp(&b.packaging_type.to_lowercase())
                .then_with(|| by_score(a, b))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RankingConfig};
    use crate::catalogue::MedicineRecord;
    use crate::query::{normalize, SearchFilters};

    struct Fixture {
        catalogue: Catalogue,
        index: TextIndex,
        symptoms: SymptomIndex,
        groups: DuplicateGroups,
        boosts: BoostPipeline,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let config = Config::default();
            let catalogue = Catalogue::from_records(vec![
                MedicineRecord::new(0, "Paracetamol 500mg Tablet 10 tablets", "Paracetamol (500mg)", "strip", "10 tablets", "Generic"),
                MedicineRecord::new(0, "Paracetamol Tablet 500 mg", "Paracetamol (500mg)", "strip", "", "Generic"),
                MedicineRecord::new(0, "Crocin 650mg Tablet", "Paracetamol (650mg)", "strip", "15 tablets", "GSK"),
                MedicineRecord::new(0, "Brufen 400mg Tablet", "Ibuprofen (400mg)", "strip", "15 tablets", "Abbott"),
                MedicineRecord::new(0, "Calpol Syrup", "Paracetamol (120mg)", "bottle", "60 ml", "GSK"),
                MedicineRecord::new(0, "Pan 40mg Tablet", "Pantoprazole (40mg)", "strip", "15 tablets", "Alkem"),
            ])
            .unwrap();
            let index = TextIndex::build(&catalogue, &config.index);
            let symptoms = SymptomIndex::with_extras(&config.symptoms, config.ranking.symptom_boost);
            let groups = DuplicateGroups::build(&catalogue, &config.dedup);
            let boosts = BoostPipeline::from_config(&config.ranking);
            Fixture { catalogue, index, symptoms, groups, boosts, config }
        }

        fn pipeline(&self) -> SearchPipeline<'_> {
            SearchPipeline {
                catalogue: &self.catalogue,
                index: &self.index,
                symptoms: &self.symptoms,
                groups: &self.groups,
                boosts: &self.boosts,
                config: &self.config.search,
            }
        }

        fn run(&self, query: &str, filters: SearchFilters) -> Vec<FinalResult> {
            self.pipeline()
                .run(&normalize(query), &filters.validate().unwrap(), 20)
                .unwrap()
        }
    }

    #[test]
    fn test_duplicates_collapse_to_representative() {
        let fx = Fixture::new();
        let results = fx.run("paracetamol", SearchFilters::default());
        let ids: Vec<MedicineId> = results.iter().map(|r| r.id).collect();
        assert!(ids.contains(&0));
        assert!(!ids.contains(&1));
        assert_eq!(ids[0], 0);
    }

    #[test]
    fn test_results_sorted_by_score() {
        let fx = Fixture::new();
        let results = fx.run("paracetamol", SearchFilters::default());
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.confidence <= 100));
    }

    #[test]
    fn test_symptom_query_uses_symptom_channel() {
        let fx = Fixture::new();
        let results = fx.run("headache", SearchFilters::default());
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.search_type == Channel::Symptom));
        assert!(results.iter().any(|r| r.composition.contains("Ibuprofen")));
        assert!(!results.iter().any(|r| r.composition.contains("Pantoprazole")));
    }

    #[test]
    fn test_packaging_filter_after_scoring() {
        let fx = Fixture::new();
        let results = fx.run("paracetamol", SearchFilters::default().packaging_type("Bottle"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Calpol Syrup");
    }

    #[test]
    fn test_sort_by_name() {
        let fx = Fixture::new();
        let results = fx.run("paracetamol", SearchFilters::default().sort_by("name"));
        let names: Vec<String> = results.iter().map(|r| r.name.to_lowercase()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_sort_by_manufacturer_then_score() {
        let fx = Fixture::new();
        let results = fx.run("paracetamol", SearchFilters::default().sort_by("manufacturer"));
        for w in results.windows(2) {
            let (a, b) = (w[0].manufacturer.to_lowercase(), w[1].manufacturer.to_lowercase());
            assert!(a < b || (a == b && w[0].score >= w[1].score));
        }
    }

    #[test]
    fn test_limit_truncates() {
        let fx = Fixture::new();
        let results = fx
            .pipeline()
            .run(&normalize("paracetamol"), &ValidatedFilters::default(), 1)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_query_yields_nothing() {
        let fx = Fixture::new();
        assert!(fx.run("", SearchFilters::default()).is_empty());
        assert!(fx.run("zzzz", SearchFilters::default()).is_empty());
    }

    #[test]
    fn test_breakdown_only_with_debug_scoring() {
        let fx = Fixture::new();
        assert!(fx.run("crocin", SearchFilters::default()).iter().all(|r| r.breakdown.is_none()));

        let debug = BoostPipeline::from_config(&RankingConfig {
            debug_scoring: true,
            ..RankingConfig::default()
        });
        let pipeline = SearchPipeline { boosts: &debug, ..fx.pipeline() };
        let results = pipeline
            .run(&normalize("crocin"), &ValidatedFilters::default(), 20)
            .unwrap();
        assert_eq!(results[0].name, "Crocin 650mg Tablet");
        let breakdown = results[0].breakdown.as_ref().unwrap();
        assert!(breakdown.boosts.iter().any(|b| b.stage == "brand_match"));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(QueryStage::CacheLookup.to_string(), "cache_lookup");
        assert_eq!(QueryStage::Done.as_str(), "done");
    }
}
