//! Listing scout: scrapes flat listings from several portals, normalizes
//! them into [`models::Offer`] records and keeps a deduplicated CSV history.
//!
//! ```text
//! config ─▶ query::build_url ─▶ orchestrator ─▶ SourceAdapter (per job)
//!                                   │
//!                                   ▼
//!             normalize ─▶ filters ─▶ store::OfferStore::save
//! ```

pub mod config;
pub mod filters;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod progress;
pub mod query;
pub mod scrapers;
pub mod store;

pub use config::AppConfig;
pub use models::{FilterCriteria, FlagField, Offer, ProgressState, ScrapeJob, Source};
pub use orchestrator::{plan_jobs, Orchestrator, RunSummary};
pub use progress::{ProgressSink, ProgressTracker, RunContext};
pub use store::{OfferStore, StoreError};
