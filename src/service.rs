/// Catalogue search service.
///
/// Owns the current catalogue generation (a `Snapshot`: records, text index,
/// symptom index, duplicate groups and a result cache) behind an
/// `RwLock<Arc<_>>`. Queries clone the `Arc` and run lock-free against it.
/// A reload builds a complete replacement off to the side and swaps it in;
/// queries already running finish against the generation they started with,
/// and a failed reload leaves the current generation serving.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalogue::{Catalogue, CatalogueStats, MedicineId};
use crate::config::Config;
use crate::consolidation::DuplicateGroups;
use crate::errors::PharmaError;
use crate::query::{normalize, CacheKey, ResultCache, SearchFilters};
use crate::search::{
    BoostPipeline, FinalResult, QueryStage, Recommendation, SearchPipeline, SymptomIndex, TextIndex,
};

/// One immutable catalogue generation.
pub struct Snapshot {
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    /// File the catalogue was read from, when it came from disk
    pub source: Option<PathBuf>,
    pub catalogue: Catalogue,
    pub index: TextIndex,
    pub symptoms: SymptomIndex,
    pub groups: DuplicateGroups,
    pub cache: ResultCache,
}

impl Snapshot {
    /// Build every derived structure for a catalogue. Index and grouping are
    /// independent and built in parallel.
    pub fn build(catalogue: Catalogue, config: &Config, generation: u64, source: Option<PathBuf>) -> Self {
        let start = Instant::now();
        let (index, groups) = rayon::join(
            || TextIndex::build(&catalogue, &config.index),
            || DuplicateGroups::build(&catalogue, &config.dedup),
        );
        let symptoms = SymptomIndex::with_extras(&config.symptoms, config.ranking.symptom_boost);
        tracing::info!(
            records = catalogue.len(),
            features = index.feature_count(),
            groups = groups.len(),
            symptom_keywords = symptoms.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Catalogue snapshot built"
        );
        Snapshot {
            generation,
            loaded_at: Utc::now(),
            source,
            catalogue,
            index,
            symptoms,
            groups,
            cache: ResultCache::new(&config.cache),
        }
    }
}

/// Outcome class of a search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Ok,
    NoMatches,
    EmptyQuery,
    InvalidFilter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<FinalResult>,
    pub status: SearchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Field that failed validation, for `invalid_filter`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub normalized_query: String,
    pub cache_hit: bool,
    pub generation: u64,
}

impl SearchResponse {
    fn empty(status: SearchStatus, normalized_query: String, generation: u64) -> Self {
        SearchResponse {
            results: Vec::new(),
            status,
            message: None,
            field: None,
            normalized_query,
            cache_hit: false,
            generation,
        }
    }

    fn with_results(results: Vec<FinalResult>, normalized_query: String, cache_hit: bool, generation: u64) -> Self {
        let status = if results.is_empty() {
            SearchStatus::NoMatches
        } else {
            SearchStatus::Ok
        };
        let message = results
            .is_empty()
            .then(|| "No medicines found matching the query".to_string());
        SearchResponse {
            results,
            status,
            message,
            field: None,
            normalized_query,
            cache_hit,
            generation,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SearchStatus::Ok
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub ok: bool,
    pub records_loaded: usize,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_medicines: usize,
    pub duplicate_groups: usize,
    /// Records hidden behind another record's representative
    pub suppressed_duplicates: usize,
    pub cached_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub symptom_mappings: usize,
    pub feature_count: usize,
    pub generation: u64,
    pub catalogue: CatalogueStats,
}

pub struct CatalogueService {
    config: Config,
    boosts: BoostPipeline,
    current: RwLock<Arc<Snapshot>>,
    started_at: Instant,
}

impl CatalogueService {
    /// Serve an already-loaded catalogue as generation 1.
    pub fn new(catalogue: Catalogue, config: Config) -> Self {
        let snapshot = Snapshot::build(catalogue, &config, 1, None);
        Self::from_snapshot(snapshot, config)
    }

    /// Load the snapshot file and serve it. Load failures are fatal.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self, PharmaError> {
        let path = path.as_ref();
        let catalogue = Catalogue::load(path)?;
        let snapshot = Snapshot::build(catalogue, &config, 1, Some(path.to_path_buf()));
        Ok(Self::from_snapshot(snapshot, config))
    }

    /// Load from `config.catalogue_path`.
    pub fn from_config(config: Config) -> Result<Self, PharmaError> {
        let path = PathBuf::from(&config.catalogue_path);
        Self::open(path, config)
    }

    fn from_snapshot(snapshot: Snapshot, config: Config) -> Self {
        CatalogueService {
            boosts: BoostPipeline::from_config(&config.ranking),
            config,
            current: RwLock::new(Arc::new(snapshot)),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The generation currently serving. Holding the `Arc` pins it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reload from a snapshot file. On failure the current generation keeps serving.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<u64, PharmaError> {
        let path = path.as_ref();
        let catalogue = Catalogue::load(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Reload failed; keeping current catalogue");
            e
        })?;
        Ok(self.install(catalogue, Some(path.to_path_buf())))
    }

    /// Swap in an already-validated catalogue.
    pub fn reload_from(&self, catalogue: Catalogue) -> u64 {
        self.install(catalogue, None)
    }

    /// The generation number is assigned under the write lock, so installs
    /// are numbered in swap order even when builds finish out of order.
    fn install(&self, catalogue: Catalogue, source: Option<PathBuf>) -> u64 {
        let mut snapshot = Snapshot::build(catalogue, &self.config, 0, source);
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            snapshot.generation = current.generation + 1;
            std::mem::replace(&mut *current, Arc::new(snapshot))
        };
        let generation = previous.generation + 1;
        tracing::info!(
            generation,
            previous_generation = previous.generation,
            "Catalogue generation swapped; result cache reset"
        );
        generation
    }

    fn effective_limit(&self, limit: Option<usize>) -> usize {
        let max = self.config.search.max_limit.max(1);
        limit.unwrap_or(self.config.search.default_limit).clamp(1, max)
    }

    /// Free-text / symptom search.
    ///
    /// Never fails: invalid filters, empty queries and internal index faults
    /// are reported through `status`.
    pub fn search(&self, query: &str, filters: &SearchFilters, limit: Option<usize>) -> SearchResponse {
        let start = Instant::now();
        let snapshot = self.snapshot();

        QueryStage::Normalizing.trace(0);
        let normalized = normalize(query);
        let filters = match filters.validate() {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected search filters");
                let field = match &e {
                    PharmaError::Query { field, .. } => Some(field.clone()),
                    _ => None,
                };
                let mut response = SearchResponse::empty(SearchStatus::InvalidFilter, normalized, snapshot.generation);
                response.message = Some(e.to_string());
                response.field = field;
                return response;
            }
        };
        if normalized.is_empty() {
            let mut response = SearchResponse::empty(SearchStatus::EmptyQuery, normalized, snapshot.generation);
            response.message = Some("Query is empty".to_string());
            return response;
        }

        let limit = self.effective_limit(limit);
        let key = CacheKey::new(&normalized, &filters, limit);

        QueryStage::CacheLookup.trace(0);
        if let Some(entry) = snapshot.cache.get(&key) {
            tracing::debug!(query = %normalized, cached_at = %entry.created_at, "Result cache hit");
            QueryStage::Done.trace(entry.results.len());
            return SearchResponse::with_results(entry.results.clone(), normalized, true, snapshot.generation);
        }

        let pipeline = SearchPipeline {
            catalogue: &snapshot.catalogue,
            index: &snapshot.index,
            symptoms: &snapshot.symptoms,
            groups: &snapshot.groups,
            boosts: &self.boosts,
            config: &self.config.search,
        };
        let results = match pipeline.run(&normalized, &filters, limit) {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(query = %normalized, error = %e, "Search degraded to empty result");
                let mut response = SearchResponse::empty(SearchStatus::NoMatches, normalized, snapshot.generation);
                response.message = Some(e.to_string());
                return response;
            }
        };

        QueryStage::Caching.trace(results.len());
        snapshot.cache.insert(key, results.clone());

        QueryStage::Done.trace(results.len());
        tracing::debug!(
            query = %normalized,
            results = results.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Search complete"
        );
        SearchResponse::with_results(results, normalized, false, snapshot.generation)
    }

    /// Records most similar to `id`, excluding its own duplicate group, one
    /// per group. Unknown ids have no recommendations.
    pub fn recommendations(&self, id: MedicineId, limit: Option<usize>) -> Vec<Recommendation> {
        let snapshot = self.snapshot();
        let Some(group) = snapshot.groups.group_of(id) else {
            return Vec::new();
        };
        let limit = limit
            .unwrap_or(self.config.search.recommendation_limit)
            .clamp(1, self.config.search.max_limit.max(1));
        let exclude: HashSet<MedicineId> = group.members.iter().copied().collect();
        let neighbours = snapshot.index.similar_to(
            id,
            self.config.search.candidate_pool.max(limit),
            self.config.search.recommendation_min_similarity,
            &exclude,
        );

        let mut seen = HashSet::new();
        let mut recommendations = Vec::with_capacity(limit);
        for (neighbour, similarity) in neighbours {
            let Some(representative) = snapshot.groups.representative_of(neighbour) else {
                continue;
            };
            if !seen.insert(representative) {
                continue;
            }
            if let Some(record) = snapshot.catalogue.get(representative) {
                recommendations.push(Recommendation::from_record(record, similarity));
            }
            if recommendations.len() == limit {
                break;
            }
        }
        recommendations
    }

    pub fn health(&self) -> Health {
        let snapshot = self.snapshot();
        Health {
            ok: !snapshot.catalogue.is_empty(),
            records_loaded: snapshot.catalogue.len(),
            generation: snapshot.generation,
            loaded_at: snapshot.loaded_at,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn analytics(&self) -> Analytics {
        let snapshot = self.snapshot();
        let duplicate_groups = snapshot.groups.multi_member_groups().count();
        let suppressed_duplicates = snapshot
            .groups
            .multi_member_groups()
            .map(|g| g.len() - 1)
            .sum();
        Analytics {
            total_medicines: snapshot.catalogue.len(),
            duplicate_groups,
            suppressed_duplicates,
            cached_queries: snapshot.cache.entry_count(),
            cache_hits: snapshot.cache.hits(),
            cache_misses: snapshot.cache.misses(),
            symptom_mappings: snapshot.symptoms.len(),
            feature_count: snapshot.index.feature_count(),
            generation: snapshot.generation,
            catalogue: snapshot.catalogue.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::MedicineRecord;
    use crate::query::ValidatedFilters;

    fn catalogue() -> Catalogue {
        Catalogue::from_records(vec![
            MedicineRecord::new(0, "Paracetamol 500mg Tablet 10 tablets", "Paracetamol (500mg)", "strip", "10 tablets", "Generic"),
            MedicineRecord::new(0, "Paracetamol Tablet 500 mg", "Paracetamol (500mg)", "strip", "", "Generic"),
            MedicineRecord::new(0, "Crocin 650mg Tablet", "Paracetamol (650mg)", "strip", "15 tablets", "GSK"),
            MedicineRecord::new(0, "Crocin Pain Relief Tablet", "Paracetamol (650mg) + Caffeine (50mg)", "strip", "15 tablets", "GSK"),
            MedicineRecord::new(0, "Brufen 400mg Tablet", "Ibuprofen (400mg)", "strip", "15 tablets", "Abbott"),
        ])
        .unwrap()
    }

    fn service() -> CatalogueService {
        CatalogueService::new(catalogue(), Config::default())
    }

    #[test]
    fn test_search_then_cache_hit() {
        let svc = service();
        let first = svc.search("paracetamol tablet", &SearchFilters::default(), None);
        assert!(first.is_ok());
        assert!(!first.cache_hit);
        let second = svc.search("Tablet Paracetamol", &SearchFilters::default(), None);
        assert!(second.cache_hit);
        assert_eq!(first.results, second.results);
        let snapshot = svc.snapshot();
        assert_eq!(snapshot.cache.hits(), 1);
        assert_eq!(snapshot.cache.misses(), 1);
    }

    #[test]
    fn test_empty_query_creates_no_entry() {
        let svc = service();
        let response = svc.search("  the tablets ", &SearchFilters::default(), None);
        assert_eq!(response.status, SearchStatus::EmptyQuery);
        assert!(response.results.is_empty());
        assert_eq!(svc.analytics().cached_queries, 0);
        assert_eq!(svc.snapshot().cache.misses(), 0);
        assert!(!svc.snapshot().cache.contains(&CacheKey::new("", &ValidatedFilters::default(), 20)));
    }

    #[test]
    fn test_invalid_filter_status() {
        let svc = service();
        let response = svc.search("dolo", &SearchFilters::default().sort_by("price"), None);
        assert_eq!(response.status, SearchStatus::InvalidFilter);
        assert_eq!(response.field.as_deref(), Some("sort_by"));
        assert!(response.results.is_empty());
        assert_eq!(svc.analytics().cached_queries, 0);
    }

    #[test]
    fn test_no_matches_status() {
        let response = service().search("zzzz", &SearchFilters::default(), None);
        assert_eq!(response.status, SearchStatus::NoMatches);
        assert!(response.message.is_some());
    }

    #[test]
    fn test_limit_is_clamped() {
        let svc = service();
        let response = svc.search("paracetamol", &SearchFilters::default(), Some(0));
        assert_eq!(response.results.len(), 1);
        let response = svc.search("paracetamol", &SearchFilters::default(), Some(10_000));
        assert!(response.results.len() <= 100);
    }

    #[test]
    fn test_recommendations_exclude_own_group() {
        let svc = service();
        assert!(svc.recommendations(0, None).iter().all(|r| r.id != 0 && r.id != 1));

        let recs = svc.recommendations(2, None);
        assert!(!recs.is_empty());
        assert!(recs.iter().any(|r| r.id == 3));
        assert!(recs.iter().all(|r| r.id != 2 && r.similarity >= 20));
        assert!(recs.len() <= 5);
        assert!(svc.recommendations(999, None).is_empty());
    }

    #[test]
    fn test_reload_resets_cache_and_bumps_generation() {
        let svc = service();
        svc.search("crocin", &SearchFilters::default(), None);
        let generation = svc.reload_from(
            Catalogue::from_records(vec![MedicineRecord::new(0, "Azee 500mg Tablet", "Azithromycin (500mg)", "strip", "3 tablets", "Cipla")])
                .unwrap(),
        );
        assert_eq!(generation, 2);
        let response = svc.search("crocin", &SearchFilters::default(), None);
        assert!(!response.cache_hit);
        assert_eq!(response.status, SearchStatus::NoMatches);
        assert_eq!(svc.health().records_loaded, 1);
        assert_eq!(svc.health().generation, 2);
    }

    #[test]
    fn test_concurrent_reloads_number_generations_in_swap_order() {
        let svc = service();
        let mut installed: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|_| scope.spawn(|| svc.reload_from(catalogue())))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        installed.sort_unstable();
        assert_eq!(installed, vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(svc.health().generation, 7);
        assert_eq!(svc.snapshot().generation, 7);
    }

    #[test]
    fn test_failed_reload_keeps_serving() {
        let svc = service();
        assert!(svc.reload("/no/such/catalogue.csv").is_err());
        assert_eq!(svc.health().generation, 1);
        assert!(svc.search("crocin", &SearchFilters::default(), None).is_ok());
    }

    #[test]
    fn test_analytics_counts() {
        let svc = service();
        svc.search("brufen", &SearchFilters::default(), None);
        let analytics = svc.analytics();
        assert_eq!(analytics.total_medicines, 5);
        assert_eq!(analytics.duplicate_groups, 1);
        assert_eq!(analytics.suppressed_duplicates, 1);
        assert_eq!(analytics.cached_queries, 1);
        assert!(analytics.symptom_mappings >= 20);
        assert!(analytics.feature_count > 0);
    }

    #[test]
    fn test_health_serializes_camel_case() {
        let json = serde_json::to_value(service().health()).unwrap();
        assert_eq!(json["recordsLoaded"], 5);
        assert_eq!(json["ok"], true);
        assert!(json.get("uptimeSeconds").is_some());
    }
}
