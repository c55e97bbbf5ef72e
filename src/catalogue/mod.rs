/// Catalogue store: the immutable, loaded-once collection of medicine records.
///
/// Records are addressed by their stable integer id, which is the 0-based row
/// position in the snapshot they were loaded from.

pub mod loader;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::PharmaError;
use crate::text;

pub type MedicineId = usize;

/// A single catalogue entry with fields derived at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineRecord {
    pub id: MedicineId,
    pub name: String,
    /// Raw ingredient text, e.g. "Paracetamol (500mg) + Caffeine (25mg)"
    pub composition: String,
    pub packaging_type: String,
    /// Pack size text, e.g. "10 tablets"
    pub pack: String,
    /// The marketing company (`marketed_by` column)
    pub manufacturer: String,
    pub manufactured_by: String,
    pub gst: String,
    /// Strength strings extracted from name and composition ("500mg")
    pub dosage_tokens: Vec<String>,
    pub ingredient_count: usize,
}

impl MedicineRecord {
    /// Build a record and derive dosage tokens and ingredient count.
    pub fn new(
        id: MedicineId,
        name: &str,
        composition: &str,
        packaging_type: &str,
        pack: &str,
        manufacturer: &str,
    ) -> Self {
        Self::with_details(id, name, composition, packaging_type, pack, manufacturer, "", "")
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_details(
        id: MedicineId,
        name: &str,
        composition: &str,
        packaging_type: &str,
        pack: &str,
        manufacturer: &str,
        manufactured_by: &str,
        gst: &str,
    ) -> Self {
        let name = name.trim();
        let composition = composition.trim();
        let mut dosage_tokens = text::extract_dosages(name);
        for token in text::extract_dosages(composition) {
            if !dosage_tokens.contains(&token) {
                dosage_tokens.push(token);
            }
        }
        MedicineRecord {
            id,
            name: name.to_string(),
            composition: composition.to_string(),
            packaging_type: packaging_type.trim().to_string(),
            pack: pack.trim().to_string(),
            manufacturer: manufacturer.trim().to_string(),
            manufactured_by: manufactured_by.trim().to_string(),
            gst: gst.trim().to_string(),
            ingredient_count: count_ingredients(composition),
            dosage_tokens,
        }
    }

    /// Primary display strength: first strength in the name, else in the composition.
    pub fn dosage(&self) -> Option<&str> {
        self.dosage_tokens.first().map(String::as_str)
    }

    /// Number of non-empty descriptive fields; used to pick group representatives.
    pub fn completeness(&self) -> usize {
        [
            &self.name,
            &self.composition,
            &self.packaging_type,
            &self.pack,
            &self.manufacturer,
            &self.manufactured_by,
            &self.gst,
        ]
        .iter()
        .filter(|f| !f.is_empty())
        .count()
    }
}

/// Count active ingredients: '+'-separated parts, 0 when unspecified.
pub fn count_ingredients(composition: &str) -> usize {
    let trimmed = composition.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("not specified") {
        return 0;
    }
    trimmed.split('+').filter(|part| !part.trim().is_empty()).count()
}

/// Aggregate catalogue statistics for analytics consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueStats {
    pub total_medicines: usize,
    pub unique_manufacturers: usize,
    pub packaging_types: usize,
    /// Ten most frequent manufacturers, most frequent first
    pub top_manufacturers: Vec<(String, usize)>,
    pub packaging_distribution: Vec<(String, usize)>,
}

/// Immutable, id-ordered record collection.
#[derive(Debug, Clone)]
pub struct Catalogue {
    records: Vec<MedicineRecord>,
}

impl Catalogue {
    /// Load and validate a CSV snapshot from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PharmaError> {
        loader::load_csv(path.as_ref())
    }

    /// Load and validate a CSV snapshot from any reader.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, PharmaError> {
        loader::read_csv(reader)
    }

    /// Build from prepared records. Ids are reassigned to positions so the
    /// id-equals-index invariant always holds.
    pub fn from_records(records: Vec<MedicineRecord>) -> Result<Self, PharmaError> {
        if records.is_empty() {
            return Err(PharmaError::load("catalogue contains no records"));
        }
        let mut records = records;
        for (idx, record) in records.iter_mut().enumerate() {
            if record.name.trim().is_empty() {
                return Err(PharmaError::Load {
                    message: "empty medicine_name".to_string(),
                    row: Some(idx + 1),
                });
            }
            record.id = idx;
        }
        Ok(Catalogue { records })
    }

    pub fn get(&self, id: MedicineId) -> Option<&MedicineRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MedicineRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[MedicineRecord] {
        &self.records
    }

    pub fn stats(&self) -> CatalogueStats {
        let mut manufacturers: HashMap<&str, usize> = HashMap::new();
        let mut packaging: HashMap<&str, usize> = HashMap::new();
        for record in &self.records {
            if !record.manufacturer.is_empty() {
                *manufacturers.entry(record.manufacturer.as_str()).or_default() += 1;
            }
            if !record.packaging_type.is_empty() {
                *packaging.entry(record.packaging_type.as_str()).or_default() += 1;
            }
        }
        CatalogueStats {
            total_medicines: self.records.len(),
            unique_manufacturers: manufacturers.len(),
            packaging_types: packaging.len(),
            top_manufacturers: top_counts(&manufacturers, 10),
            packaging_distribution: top_counts(&packaging, 10),
        }
    }
}

/// Most frequent keys first; ties ordered by key for stable output.
fn top_counts(counts: &HashMap<&str, usize>, n: usize) -> Vec<(String, usize)> {
    let ordered: BTreeMap<&str, usize> = counts.iter().map(|(k, v)| (*k, *v)).collect();
    let mut pairs: Vec<(String, usize)> = ordered
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.truncate(n);
    pairs
}
