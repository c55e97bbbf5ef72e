/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: pharmsearch.toml (in working directory)
/// 3. Environment variables: prefixed PHARMSEARCH_, nested keys split on "__"
///    (e.g., PHARMSEARCH_CACHE__MAX_ENTRIES=50)

use std::collections::BTreeMap;

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use crate::errors::PharmaError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path of the catalogue CSV snapshot loaded at startup
    #[serde(default = "default_catalogue_path")]
    pub catalogue_path: String,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Extra symptom keywords merged over the built-in table.
    /// Each keyword maps to ingredient terms, strongest association first.
    #[serde(default)]
    pub symptoms: BTreeMap<String, Vec<String>>,
}

/// Retrieval depth, score floors, and result sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Hits retrieved per channel before dedup and filtering
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
    #[serde(default = "default_lexical_min_score")]
    pub lexical_min_score: f64,
    /// Floor applied to the symptom sub-query before the symptom boost
    #[serde(default = "default_symptom_min_score")]
    pub symptom_min_score: f64,
    #[serde(default = "default_recommendation_limit")]
    pub recommendation_limit: usize,
    #[serde(default = "default_recommendation_min_similarity")]
    pub recommendation_min_similarity: f64,
}

fn default_limit() -> usize { 20 }
fn default_max_limit() -> usize { 100 }
fn default_candidate_pool() -> usize { 100 }
fn default_lexical_min_score() -> f64 { 0.05 }
fn default_symptom_min_score() -> f64 { 0.05 }
fn default_recommendation_limit() -> usize { 5 }
fn default_recommendation_min_similarity() -> f64 { 0.2 }

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            candidate_pool: default_candidate_pool(),
            lexical_min_score: default_lexical_min_score(),
            symptom_min_score: default_symptom_min_score(),
            recommendation_limit: default_recommendation_limit(),
            recommendation_min_similarity: default_recommendation_min_similarity(),
        }
    }
}

/// Boost multipliers applied by the ranking pipeline.
///
/// The defaults are the historical constants; they have no derivation beyond
/// having worked acceptably, so they are exposed rather than hardcoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_full_match_boost")]
    pub full_match_boost: f64,
    #[serde(default = "default_ingredient_boost")]
    pub ingredient_boost: f64,
    /// Query tokens shorter than this never earn the ingredient boost
    #[serde(default = "default_ingredient_min_token_len")]
    pub ingredient_min_token_len: usize,
    #[serde(default = "default_brand_boost")]
    pub brand_boost: f64,
    #[serde(default = "default_brands")]
    pub brands: Vec<String>,
    /// Cap on the compounded multiplier; None disables the cap
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: Option<f64>,
    /// Multiplier over the equivalent lexical score for symptom hits (+20%)
    #[serde(default = "default_symptom_boost")]
    pub symptom_boost: f64,
    /// Attach a per-result score breakdown to search results
    #[serde(default)]
    pub debug_scoring: bool,
}

fn default_full_match_boost() -> f64 { 1.5 }
fn default_ingredient_boost() -> f64 { 1.2 }
fn default_ingredient_min_token_len() -> usize { 4 }
fn default_brand_boost() -> f64 { 1.3 }
fn default_brands() -> Vec<String> {
    ["crocin", "dolo", "combiflam", "augmentin", "azee", "pantocid"]
        .iter()
        .map(|b| b.to_string())
        .collect()
}
fn default_max_multiplier() -> Option<f64> { Some(1.8) }
fn default_symptom_boost() -> f64 { 1.2 }

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig {
            full_match_boost: default_full_match_boost(),
            ingredient_boost: default_ingredient_boost(),
            ingredient_min_token_len: default_ingredient_min_token_len(),
            brand_boost: default_brand_boost(),
            brands: default_brands(),
            max_multiplier: default_max_multiplier(),
            symptom_boost: default_symptom_boost(),
            debug_scoring: false,
        }
    }
}

/// TF-IDF vector space parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    /// Terms in fewer documents than this are dropped
    #[serde(default = "default_min_df")]
    pub min_df: usize,
    /// Terms in more than this fraction of documents are dropped
    #[serde(default = "default_max_df")]
    pub max_df: f64,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// Document-frequency bounds only apply from this catalogue size upward
    #[serde(default = "default_prune_min_docs")]
    pub prune_min_docs: usize,
}

fn default_ngram_max() -> usize { 3 }
fn default_min_df() -> usize { 2 }
fn default_max_df() -> f64 { 0.8 }
fn default_max_features() -> usize { 10_000 }
fn default_prune_min_docs() -> usize { 100 }

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            ngram_max: default_ngram_max(),
            min_df: default_min_df(),
            max_df: default_max_df(),
            max_features: default_max_features(),
            prune_min_docs: default_prune_min_docs(),
        }
    }
}

/// Duplicate grouping thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// When false every record is its own group (faster startup)
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_name_threshold")]
    pub name_threshold: f64,
    #[serde(default = "default_composition_threshold")]
    pub composition_threshold: f64,
    /// Normalized-name prefix length used to block name comparisons
    #[serde(default = "default_block_prefix_len")]
    pub block_prefix_len: usize,
}

fn default_true() -> bool { true }
fn default_name_threshold() -> f64 { 0.80 }
fn default_composition_threshold() -> f64 { 0.90 }
fn default_block_prefix_len() -> usize { 3 }

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            enabled: true,
            name_threshold: default_name_threshold(),
            composition_threshold: default_composition_threshold(),
            block_prefix_len: default_block_prefix_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_max_entries() -> u64 { 1000 }
fn default_ttl_secs() -> u64 { 3600 }

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_catalogue_path() -> String {
    "data/catalogue.csv".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            catalogue_path: default_catalogue_path(),
            search: SearchConfig::default(),
            ranking: RankingConfig::default(),
            index: IndexConfig::default(),
            dedup: DedupConfig::default(),
            cache: CacheConfig::default(),
            symptoms: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: PHARMSEARCH_DEDUP__NAME_THRESHOLD=0.85 overrides dedup.name_threshold
    pub fn load() -> Result<Config, PharmaError> {
        Self::figment()
            .extract()
            .map_err(|e| PharmaError::Config(format!("Failed to load config: {}", e)))
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("pharmsearch.toml"))
            .merge(Env::prefixed("PHARMSEARCH_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.catalogue_path, "data/catalogue.csv");
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.ranking.max_multiplier, Some(1.8));
        assert!((config.dedup.name_threshold - 0.80).abs() < f64::EPSILON);
        assert!((config.dedup.composition_threshold - 0.90).abs() < f64::EPSILON);
        assert!(config.cache.enabled);
        assert!(config.symptoms.is_empty());
    }

    #[test]
    fn test_toml_and_env_precedence() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "pharmsearch.toml",
                r#"
                    log_level = "debug"
                    [cache]
                    max_entries = 10

                    [symptoms]
                    sunburn = ["aloe vera", "calamine"]
                "#,
            )?;
            jail.set_env("PHARMSEARCH_CACHE__MAX_ENTRIES", "42");
            jail.set_env("PHARMSEARCH_RANKING__BRAND_BOOST", "1.1");

            let config = Config::load().expect("config should load");
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.cache.max_entries, 42);
            assert!((config.ranking.brand_boost - 1.1).abs() < 1e-9);
            // untouched sections keep their defaults
            assert_eq!(config.cache.ttl_secs, 3600);
            assert_eq!(config.symptoms["sunburn"], vec!["aloe vera", "calamine"]);
            Ok(())
        });
    }
}
