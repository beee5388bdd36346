//! CSV-backed offer store.
//!
//! The whole file is rewritten on every save: existing rows are indexed by
//! URL, incoming offers replace their scraped fields, user flags and the
//! first-seen timestamp are carried over, and offers missing from the batch
//! are kept as history. Writes go to a sibling temp file and are renamed into
//! place.
//!
//! There is no cross-process lock. Two concurrent writers race and the last
//! rename wins.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{FlagField, Offer};

/// Column order of the store file
pub const COLUMNS: [&str; 13] = [
    "no",
    "url",
    "title",
    "price",
    "area",
    "price_per_m2",
    "location",
    "floor",
    "garden",
    "source",
    "scraped_at",
    "is_favorite",
    "is_hidden",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read offer store {}", .path.display())]
    Read { path: PathBuf, source: csv::Error },

    /// The merge succeeded but the file could not be written; the merged
    /// offers are handed back so the caller can retry.
    #[error("failed to write offer store {}", .path.display())]
    Write {
        path: PathBuf,
        source: io::Error,
        merged: Vec<Offer>,
    },
}

/// Merge an incoming batch into the existing offers.
///
/// Output is sorted newest first by `scraped_at` with `no` renumbered from 1.
pub fn merge_offers(existing: Vec<Offer>, incoming: Vec<Offer>, now: DateTime<Utc>) -> Vec<Offer> {
    let existing_by_url: HashMap<&str, &Offer> =
        existing.iter().map(|offer| (offer.url.as_str(), offer)).collect();

    // Later duplicates inside one batch replace earlier ones in place
    let mut batch: Vec<Offer> = Vec::with_capacity(incoming.len());
    let mut batch_index: HashMap<String, usize> = HashMap::new();
    for mut offer in incoming {
        match existing_by_url.get(offer.url.as_str()) {
            Some(known) => {
                offer.is_favorite = known.is_favorite;
                offer.is_hidden = known.is_hidden;
                offer.scraped_at = known.scraped_at;
            }
            None => {
                offer.is_favorite = false;
                offer.is_hidden = false;
                offer.scraped_at = now;
            }
        }

        match batch_index.get(&offer.url) {
            Some(&idx) => batch[idx] = offer,
            None => {
                batch_index.insert(offer.url.clone(), batch.len());
                batch.push(offer);
            }
        }
    }

    let retained: Vec<Offer> = existing
        .iter()
        .filter(|offer| !batch_index.contains_key(&offer.url))
        .cloned()
        .collect();

    let mut merged = batch;
    merged.extend(retained);
    renumber(&mut merged);
    merged
}

/// Sort newest first (stable) and assign display ordinals
fn renumber(offers: &mut [Offer]) {
    offers.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
    for (i, offer) in offers.iter_mut().enumerate() {
        offer.no = i as u32 + 1;
    }
}

/// Handle to the on-disk offer table
#[derive(Debug, Clone)]
pub struct OfferStore {
    path: PathBuf,
}

impl OfferStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all offers. A missing file is an empty store.
    ///
    /// Rows repeating an earlier URL are dropped, as are rows that cannot be
    /// decoded. Only I/O failures fail the load.
    pub fn load(&self) -> Result<Vec<Offer>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let read_err = |source| StoreError::Read {
            path: self.path.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(read_err)?;

        let mut seen = HashSet::new();
        let mut offers = Vec::new();
        for row in reader.deserialize::<Offer>() {
            let offer = match row {
                Ok(offer) => offer,
                Err(e) if e.is_io_error() => return Err(read_err(e)),
                Err(e) => {
                    warn!("Skipping unreadable row in {}: {}", self.path.display(), e);
                    continue;
                }
            };
            if seen.insert(offer.url.clone()) {
                offers.push(offer);
            } else {
                debug!("Skipping duplicate store row for {}", offer.url);
            }
        }

        Ok(offers)
    }

    /// Merge `incoming` into the store and rewrite it. Returns the stored set.
    ///
    /// An empty batch leaves the file untouched.
    pub fn save(&self, incoming: Vec<Offer>) -> Result<Vec<Offer>, StoreError> {
        self.save_at(incoming, Utc::now())
    }

    /// [`save`](Self::save) with an explicit discovery timestamp for new offers
    pub fn save_at(&self, incoming: Vec<Offer>, now: DateTime<Utc>) -> Result<Vec<Offer>, StoreError> {
        let existing = self.load()?;
        if incoming.is_empty() {
            info!("No new offers to save.");
            return Ok(existing);
        }

        let incoming_count = incoming.len();
        let merged = merge_offers(existing, incoming, now);

        if let Err(source) = self.write(&merged) {
            return Err(StoreError::Write {
                path: self.path.clone(),
                source,
                merged,
            });
        }

        info!(
            "💾 Saved {} offers to {} ({} from this batch)",
            merged.len(),
            self.path.display(),
            incoming_count
        );
        Ok(merged)
    }

    /// Set a user flag on one offer. Returns `false` if the URL is unknown.
    pub fn update_flag(&self, url: &str, field: FlagField, value: bool) -> Result<bool, StoreError> {
        let mut offers = self.load()?;
        let Some(offer) = offers.iter_mut().find(|offer| offer.url == url) else {
            return Ok(false);
        };

        match field {
            FlagField::Favorite => offer.is_favorite = value,
            FlagField::Hidden => offer.is_hidden = value,
        }

        self.write(&offers).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
            merged: offers.clone(),
        })?;

        info!("Set {}={} for {}", field.column(), value, url);
        Ok(true)
    }

    fn write(&self, offers: &[Offer]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let result = Self::write_rows(&tmp_path, offers)
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        result
    }

    fn write_rows(path: &Path, offers: &[Offer]) -> io::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(COLUMNS)?;
        for offer in offers {
            writer.serialize(offer)?;
        }
        writer.flush()
    }
}

/// Lenient readers for store files written by older versions
pub(crate) mod serde_compat {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("nan")))
    }

    pub fn optional_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(text(d)?
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite()))
    }

    /// Accepts "3" as well as "3.0"
    pub fn optional_floor<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
        Ok(text(d)?
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i32))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(text(d)?
            .map(|s| matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false))
    }

    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::default()
    }

    /// RFC 3339, or a naive ISO timestamp read as UTC
    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let Some(s) = text(d)? else {
            return Ok(epoch());
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
            return Ok(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&s, fmt).ok())
            .map(|naive| naive.and_utc())
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", s)))
    }
}
