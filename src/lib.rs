/// pharmsearch: duplicate-aware search and ranking over pharmaceutical catalogues.
///
/// The entry point is [`service::CatalogueService`], which owns the loaded
/// catalogue generation and answers search, recommendation, health and
/// analytics requests. Transport is left to the embedding application; the
/// `pharmsearch` binary is a thin CLI over the same API.

pub mod catalogue;
pub mod config;
pub mod consolidation;
pub mod errors;
pub mod logging;
pub mod query;
pub mod search;
pub mod service;
pub mod text;

pub use catalogue::{Catalogue, MedicineId, MedicineRecord};
pub use config::Config;
pub use errors::PharmaError;
pub use query::{SearchFilters, SortBy};
pub use search::{FinalResult, Recommendation};
pub use service::{CatalogueService, SearchResponse, SearchStatus};
