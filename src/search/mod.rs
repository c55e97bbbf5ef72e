pub mod lexical;
pub mod pipeline;
pub mod ranking;
pub mod symptom;

// Re-export key types for convenience
pub use lexical::TextIndex;
pub use pipeline::{QueryStage, SearchPipeline};
pub use ranking::{BoostPipeline, BoostStage, ScoreBreakdown};
pub use symptom::{SymptomEntry, SymptomIndex};

use serde::{Deserialize, Serialize};

use crate::catalogue::{MedicineId, MedicineRecord};

/// Retrieval channel a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Lexical,
    Symptom,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Lexical => write!(f, "lexical"),
            Channel::Symptom => write!(f, "symptom"),
        }
    }
}

/// A raw hit from one retrieval channel, before merging and boosts.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub medicine_id: MedicineId,
    /// Channel relevance in [0, 1]
    pub base_score: f64,
    pub channel: Channel,
}

impl SearchHit {
    pub fn new(medicine_id: MedicineId, base_score: f64, channel: Channel) -> Self {
        SearchHit {
            medicine_id,
            base_score: base_score.clamp(0.0, 1.0),
            channel,
        }
    }
}

/// A ranked, display-ready search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub id: MedicineId,
    pub name: String,
    pub composition: String,
    pub packaging_type: String,
    pub pack: String,
    pub manufacturer: String,
    /// round(min(score, 1) * 100)
    pub confidence: u8,
    pub dosage: Option<String>,
    pub ingredient_count: usize,
    pub search_type: Channel,
    /// Combined score after boosts; drives relevance ordering
    #[serde(skip)]
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

impl FinalResult {
    pub fn from_record(
        record: &MedicineRecord,
        score: f64,
        search_type: Channel,
        breakdown: Option<ScoreBreakdown>,
    ) -> Self {
        FinalResult {
            id: record.id,
            name: record.name.clone(),
            composition: record.composition.clone(),
            packaging_type: record.packaging_type.clone(),
            pack: record.pack.clone(),
            manufacturer: record.manufacturer.clone(),
            confidence: ranking::confidence(score),
            dosage: record.dosage().map(str::to_string),
            ingredient_count: record.ingredient_count,
            search_type,
            score,
            breakdown,
        }
    }
}

/// A related record returned by recommendations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: MedicineId,
    pub name: String,
    pub composition: String,
    pub packaging_type: String,
    pub manufacturer: String,
    /// Cosine similarity as 0-100
    pub similarity: u8,
}

impl Recommendation {
    pub fn from_record(record: &MedicineRecord, similarity: f64) -> Self {
        Recommendation {
            id: record.id,
            name: record.name.clone(),
            composition: record.composition.clone(),
            packaging_type: record.packaging_type.clone(),
            manufacturer: record.manufacturer.clone(),
            similarity: ranking::confidence(similarity),
        }
    }
}
