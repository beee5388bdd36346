use serde::{Deserialize, Serialize};

/// One listing as an adapter extracted it, before normalization.
///
/// Only `url` is required. Every other field is the raw text found on the
/// page; `text` carries the whole card so the normalizer can look for floor
/// and garden hints the dedicated fields missed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawListing {
    pub url: String,
    pub title: Option<String>,
    pub price: Option<String>,
    pub area: Option<String>,
    pub price_per_m2: Option<String>,
    pub location: Option<String>,
    pub floor: Option<String>,
    pub garden: Option<String>,
    pub text: Option<String>,
}
