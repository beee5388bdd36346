use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{FilterCriteria, UnknownPolicy};

/// Contents of `config.json`
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub filters: FilterConfig,
    /// In file order; jobs are planned in this order
    #[serde(default, deserialize_with = "ordered_portals")]
    pub portals: Vec<PortalConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub min_area: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub ground_floor: Option<bool>,
    #[serde(default)]
    pub garden: Option<bool>,
    #[serde(default)]
    pub district: Option<DistrictSpec>,
    #[serde(default)]
    pub unknown_policy: UnknownPolicy,
}

/// `"Wrzeszcz; Oliwa"` or `["Wrzeszcz", "Oliwa"]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DistrictSpec {
    List(Vec<Option<String>>),
    Delimited(String),
}

impl DistrictSpec {
    /// Trimmed, non-empty district names in configured order
    pub fn districts(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            DistrictSpec::List(items) => items.iter().flatten().map(String::as_str).collect(),
            DistrictSpec::Delimited(s) => s.split(';').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl FilterConfig {
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            // 0 means "no bound", same as the query builder
            min_area: self.min_area.filter(|v| *v > 0.0),
            max_price: self.max_price.filter(|v| *v > 0.0),
            ground_floor: self.ground_floor.unwrap_or(false),
            garden: self.garden.unwrap_or(false),
            districts: self
                .district
                .as_ref()
                .map(DistrictSpec::districts)
                .unwrap_or_default(),
            unknown_policy: self.unknown_policy,
        }
    }
}

/// One portal entry
#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    pub name: String,
    pub enabled: bool,
    pub base_url: Option<String>,
    /// 0 = unlimited
    pub max_pages: u32,
}

#[derive(Deserialize)]
struct PortalEntry {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    max_pages: u32,
}

fn default_enabled() -> bool {
    true
}

fn ordered_portals<'de, D>(deserializer: D) -> Result<Vec<PortalConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_json::Map::deserialize(deserializer)?;
    map.into_iter()
        .map(|(name, value)| {
            let entry: PortalEntry =
                serde_json::from_value(value).map_err(serde::de::Error::custom)?;
            Ok(PortalConfig {
                name,
                enabled: entry.enabled,
                base_url: entry.base_url.filter(|u| !u.trim().is_empty()),
                max_pages: entry.max_pages,
            })
        })
        .collect()
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse config")
    }

    /// Read and parse a config file. Missing or malformed files are errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_json(
            r#"{
                "filters": {"min_area": 45, "max_price": 650000.5, "ground_floor": true,
                            "district": "Wrzeszcz; ;Oliwa ", "unknown_policy": "lenient"},
                "portals": {
                    "trojmiasto": {"enabled": true, "base_url": "https://ogloszenia.trojmiasto.pl/", "max_pages": 2},
                    "olx": {"enabled": false, "base_url": "https://www.olx.pl/"},
                    "morizon": {"base_url": "https://www.morizon.pl/mieszkania/gdansk/"}
                }
            }"#,
        )
        .unwrap();

        let criteria = config.filters.criteria();
        assert_eq!(criteria.min_area, Some(45.0));
        assert!(criteria.ground_floor);
        assert!(!criteria.garden);
        assert_eq!(criteria.districts, vec!["Wrzeszcz", "Oliwa"]);
        assert_eq!(criteria.unknown_policy, UnknownPolicy::Lenient);

        let names: Vec<&str> = config.portals.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["trojmiasto", "olx", "morizon"]);
        assert_eq!(config.portals[0].max_pages, 2);
        assert!(!config.portals[1].enabled);
        assert!(config.portals[2].enabled);
        assert_eq!(config.portals[2].max_pages, 0);
    }

    #[test]
    fn test_zero_bounds_are_unset() {
        let config = AppConfig::from_json(r#"{"filters": {"min_area": 0, "max_price": 0}}"#).unwrap();
        let criteria = config.filters.criteria();
        assert_eq!(criteria.min_area, None);
        assert_eq!(criteria.max_price, None);

        let offer = crate::models::Offer {
            no: 0,
            url: "https://www.olx.pl/d/oferta/1".to_string(),
            title: "Mieszkanie".to_string(),
            price: Some(480000.0),
            area: Some(55.0),
            price_per_m2: None,
            location: "Gdańsk".to_string(),
            floor: None,
            garden: false,
            source: crate::models::Source::Olx,
            scraped_at: chrono::Utc::now(),
            is_favorite: false,
            is_hidden: false,
        };
        assert!(crate::filters::matches(&offer, &criteria));

        let url = crate::query::build_url("https://www.olx.pl/x", &criteria, None, "olx").unwrap();
        assert!(!url.contains("price"));
    }

    #[test]
    fn test_district_list() {
        let spec: DistrictSpec =
            serde_json::from_str(r#"[" Wrzeszcz ", "", null, "Strzyża"]"#).unwrap();
        assert_eq!(spec.districts(), vec!["Wrzeszcz", "Strzyża"]);
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert!(config.portals.is_empty());
        assert_eq!(config.filters.criteria(), FilterCriteria::default());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::load("/nonexistent/config.json").is_err());
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(AppConfig::from_json("{\"portals\": [").is_err());
    }
}
