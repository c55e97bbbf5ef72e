/// Multi-factor re-ranking of merged retrieval hits.
///
/// A candidate's final score is its channel base score times the product of
/// the boost stages that fire for it:
///   1. full_query_match: every query token occurs in the record name
///   2. ingredient_match: once per distinct query token found among the
///      composition's ingredient words
///   3. brand_match: once per recognized brand named in both query and record
///
/// The compound multiplier is capped at `max_multiplier`. All functions here
/// are pure.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::{Channel, SearchHit};
use crate::catalogue::{MedicineId, MedicineRecord};
use crate::config::RankingConfig;
use crate::text;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One boost that fired for a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedBoost {
    pub stage: &'static str,
    pub multiplier: f64,
}

/// Per-result score breakdown (populated only when debug_scoring=true).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub base_score: f64,
    pub boosts: Vec<AppliedBoost>,
    /// Compound multiplier after the cap
    pub multiplier: f64,
    pub final_score: f64,
}

/// Query tokens in the form the boost stages compare against.
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    tokens: BTreeSet<String>,
}

impl QueryTerms {
    pub fn new(query: &str) -> Self {
        QueryTerms {
            tokens: text::raw_tokens(query).into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// A named, independently testable boost.
#[derive(Debug, Clone, PartialEq)]
pub enum BoostStage {
    FullQueryMatch {
        boost: f64,
    },
    IngredientMatch {
        boost: f64,
        min_token_len: usize,
    },
    BrandMatch {
        boost: f64,
        brands: Vec<String>,
    },
}

impl BoostStage {
    pub fn name(&self) -> &'static str {
        match self {
            BoostStage::FullQueryMatch { .. } => "full_query_match",
            BoostStage::IngredientMatch { .. } => "ingredient_match",
            BoostStage::BrandMatch { .. } => "brand_match",
        }
    }

    /// Multiplier this stage contributes for one record; 1.0 when it does not fire.
    pub fn multiplier(&self, query: &QueryTerms, record: &MedicineRecord) -> f64 {
        match self {
            BoostStage::FullQueryMatch { boost } => {
                if query.is_empty() {
                    return 1.0;
                }
                let name_tokens: BTreeSet<String> = text::raw_tokens(&record.name).into_iter().collect();
                if query.tokens().all(|t| name_tokens.contains(t)) {
                    *boost
                } else {
                    1.0
                }
            }
            BoostStage::IngredientMatch { boost, min_token_len } => {
                let ingredients = ingredient_words(&record.composition);
                let matches = query
                    .tokens()
                    .filter(|t| t.chars().count() >= *min_token_len)
                    .filter(|t| ingredients.contains(*t))
                    .count();
                boost.powi(matches as i32)
            }
            BoostStage::BrandMatch { boost, brands } => {
                let name_tokens: BTreeSet<String> = text::raw_tokens(&record.name).into_iter().collect();
                let matches = brands
                    .iter()
                    .filter(|b| query.contains(b) && name_tokens.contains(b.as_str()))
                    .count();
                boost.powi(matches as i32)
            }
        }
    }
}

/// Alphabetic words of a composition, i.e. the ingredient names without strengths.
pub fn ingredient_words(composition: &str) -> BTreeSet<String> {
    text::raw_tokens(composition)
        .into_iter()
        .filter(|t| t.chars().all(char::is_alphabetic))
        .collect()
}

/// Ordered boost stages plus the compound cap.
#[derive(Debug, Clone)]
pub struct BoostPipeline {
    stages: Vec<BoostStage>,
    max_multiplier: Option<f64>,
    debug_scoring: bool,
}

impl BoostPipeline {
    pub fn new(stages: Vec<BoostStage>, max_multiplier: Option<f64>) -> Self {
        BoostPipeline {
            stages,
            max_multiplier,
            debug_scoring: false,
        }
    }

    pub fn from_config(config: &RankingConfig) -> Self {
        let brands = config
            .brands
            .iter()
            .map(|b| b.trim().to_lowercase())
            .filter(|b| !b.is_empty())
            .collect();
        let stages = vec![
            BoostStage::FullQueryMatch {
                boost: config.full_match_boost,
            },
            BoostStage::IngredientMatch {
                boost: config.ingredient_boost,
                min_token_len: config.ingredient_min_token_len,
            },
            BoostStage::BrandMatch {
                boost: config.brand_boost,
                brands,
            },
        ];
        BoostPipeline {
            stages,
            max_multiplier: config.max_multiplier,
            debug_scoring: config.debug_scoring,
        }
    }

    pub fn stages(&self) -> &[BoostStage] {
        &self.stages
    }

    /// Score one record: base score times the capped product of all stages.
    pub fn apply(
        &self,
        query: &QueryTerms,
        record: &MedicineRecord,
        base_score: f64,
    ) -> (f64, Option<ScoreBreakdown>) {
        let mut boosts = Vec::new();
        let mut multiplier = 1.0;
        for stage in &self.stages {
            let m = stage.multiplier(query, record);
            if (m - 1.0).abs() > f64::EPSILON {
                boosts.push(AppliedBoost {
                    stage: stage.name(),
                    multiplier: m,
                });
            }
            multiplier *= m;
        }
        if let Some(cap) = self.max_multiplier {
            multiplier = multiplier.min(cap);
        }
        let score = base_score * multiplier;

        let breakdown = self.debug_scoring.then(|| ScoreBreakdown {
            base_score,
            boosts,
            multiplier,
            final_score: score,
        });
        (score, breakdown)
    }
}

// ---------------------------------------------------------------------------
// Pure scoring functions
// ---------------------------------------------------------------------------

/// Display confidence: round(min(score, 1) * 100), in [0, 100].
pub fn confidence(score: f64) -> u8 {
    if !score.is_finite() || score <= 0.0 {
        return 0;
    }
    (score.min(1.0) * 100.0).round() as u8
}

/// Merge both channels' hits by id.
///
/// A record found by both keeps the higher base score and is tagged with the
/// channel that produced it; equal scores go to the lexical channel. Output
/// is in ascending id order.
pub fn merge_hits(lexical: Vec<SearchHit>, symptom: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut merged: HashMap<MedicineId, SearchHit> = HashMap::new();
    for hit in lexical.into_iter().chain(symptom) {
        match merged.get_mut(&hit.medicine_id) {
            Some(existing) => {
                let better = hit.base_score > existing.base_score
                    || (hit.base_score == existing.base_score
                        && hit.channel == Channel::Lexical
                        && existing.channel != Channel::Lexical);
                if better {
                    *existing = hit;
                }
            }
            None => {
                merged.insert(hit.medicine_id, hit);
            }
        }
    }
    let mut hits: Vec<SearchHit> = merged.into_values().collect();
    hits.sort_by_key(|h| h.medicine_id);
    hits
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
