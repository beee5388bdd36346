use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::serde_compat;

/// Source of the listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Olx,
    Otodom,
    Morizon,
    Trojmiasto,
    Gratka,
    Adresowo,
    Domiporta,
    Gethome,
    #[serde(alias = "nieruchomosci-online")]
    NieruchomosciOnline,
    Okolica,
    Szybko,
    Tabelaofert,
}

impl Source {
    pub const ALL: [Source; 12] = [
        Source::Olx,
        Source::Otodom,
        Source::Morizon,
        Source::Trojmiasto,
        Source::Gratka,
        Source::Adresowo,
        Source::Domiporta,
        Source::Gethome,
        Source::NieruchomosciOnline,
        Source::Okolica,
        Source::Szybko,
        Source::Tabelaofert,
    ];

    /// Name used in config files and in the store's `source` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Olx => "olx",
            Source::Otodom => "otodom",
            Source::Morizon => "morizon",
            Source::Trojmiasto => "trojmiasto",
            Source::Gratka => "gratka",
            Source::Adresowo => "adresowo",
            Source::Domiporta => "domiporta",
            Source::Gethome => "gethome",
            Source::NieruchomosciOnline => "nieruchomosci_online",
            Source::Okolica => "okolica",
            Source::Szybko => "szybko",
            Source::Tabelaofert => "tabelaofert",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase().replace('-', "_");
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == name)
            .ok_or_else(|| anyhow::anyhow!("unknown source: {}", s))
    }
}

/// Canonical listing record, one row of the store.
///
/// Field order is the store's column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    /// Display ordinal, recomputed on every store write
    #[serde(default)]
    pub no: u32,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "serde_compat::optional_number")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "serde_compat::optional_number")]
    pub area: Option<f64>,
    #[serde(default, deserialize_with = "serde_compat::optional_number")]
    pub price_per_m2: Option<f64>,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "serde_compat::optional_floor")]
    pub floor: Option<i32>,
    #[serde(default, deserialize_with = "serde_compat::flag")]
    pub garden: bool,
    pub source: Source,
    #[serde(
        default = "serde_compat::epoch",
        deserialize_with = "serde_compat::timestamp"
    )]
    pub scraped_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "serde_compat::flag")]
    pub is_favorite: bool,
    #[serde(default, deserialize_with = "serde_compat::flag")]
    pub is_hidden: bool,
}

/// User-settable flags on a stored offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagField {
    Favorite,
    Hidden,
}

impl FlagField {
    pub fn column(&self) -> &'static str {
        match self {
            FlagField::Favorite => "is_favorite",
            FlagField::Hidden => "is_hidden",
        }
    }
}

/// How the strict filters treat a value the normalizer could not determine
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// Unknown floor/garden fails the ground-floor/garden filter
    #[default]
    Strict,
    /// Unknown floor/garden passes
    Lenient,
}

/// User search criteria applied to every normalized offer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub min_area: Option<f64>,
    pub max_price: Option<f64>,
    pub ground_floor: bool,
    pub garden: bool,
    /// Empty means no district constraint
    pub districts: Vec<String>,
    pub unknown_policy: UnknownPolicy,
}

/// One unit of work for the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeJob {
    pub source_name: String,
    pub url: String,
    /// 0 = unlimited
    pub max_pages: u32,
    pub district_context: Vec<String>,
}

impl ScrapeJob {
    /// Short label shown in progress reports
    pub fn label(&self) -> String {
        if self.district_context.is_empty() {
            self.source_name.clone()
        } else {
            format!("{} ({})", self.source_name, self.district_context.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Done,
}

/// Snapshot of the current run's progress
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    pub processed: usize,
    pub total: usize,
    pub current_task: String,
    pub status: RunStatus,
    pub eta_seconds: Option<u64>,
}
