//! Search URL construction.
//!
//! Each supported portal has a fixed table translating the abstract filters
//! into its own query vocabulary. Portals without a table get their base URL
//! back untouched. Building is deterministic and re-applying the builder to
//! its own output is a no-op.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::models::{FilterCriteria, Source};

/// Where a filter value goes in the query string
#[derive(Debug, Clone, Copy)]
enum Param {
    /// `key=value`
    Plain(&'static str),
    /// Lower bound of a `key=min_max` range
    RangeMin(&'static str),
    /// Upper bound of a `key=min_max` range
    RangeMax(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum DistrictParam {
    /// District text as a query parameter
    Query(&'static str),
    /// District slug appended as a trailing path segment
    PathSlug,
}

/// Filter vocabulary of one portal
#[derive(Debug)]
struct QueryMapping {
    min_area: Param,
    max_price: Param,
    ground_floor: &'static [(&'static str, &'static str)],
    garden: &'static [(&'static str, &'static str)],
    /// Always applied (secondary market only)
    forced: &'static [(&'static str, &'static str)],
    district: DistrictParam,
}

const OLX: QueryMapping = QueryMapping {
    min_area: Param::Plain("search[filter_float_m:from]"),
    max_price: Param::Plain("search[filter_float_price:to]"),
    ground_floor: &[("search[filter_enum_floor_select][0]", "floor_0")],
    garden: &[],
    forced: &[("search[filter_enum_market][0]", "secondary")],
    district: DistrictParam::Query("q"),
};

const OTODOM: QueryMapping = QueryMapping {
    min_area: Param::Plain("areaMin"),
    max_price: Param::Plain("priceMax"),
    ground_floor: &[("floorMin", "0"), ("floorMax", "0")],
    garden: &[("features", "[\"GARDEN\"]")],
    forced: &[("market", "SECONDARY")],
    district: DistrictParam::Query("q"),
};

const MORIZON: QueryMapping = QueryMapping {
    min_area: Param::Plain("ps[living_area_min]"),
    max_price: Param::Plain("ps[price_max]"),
    ground_floor: &[("ps[floor][0]", "1")],
    garden: &[("ps[has_garden]", "1")],
    forced: &[("ps[market_type][0]", "2")],
    district: DistrictParam::PathSlug,
};

const TROJMIASTO: QueryMapping = QueryMapping {
    min_area: Param::RangeMin("ri"),
    max_price: Param::RangeMax("rm"),
    ground_floor: &[("pi", "0_0")],
    garden: &[("kl", "2300")],
    forced: &[("rynek", "W")],
    district: DistrictParam::Query("slowa"),
};

/// Pre-built listing pages for districts trojmiasto.pl exposes as paths
const TROJMIASTO_DISTRICTS: [(&str, &str); 5] = [
    (
        "wrzeszcz",
        "https://ogloszenia.trojmiasto.pl/nieruchomosci-sprzedam-rynek-wtorny/mieszkanie/gdansk/wrzeszcz/",
    ),
    (
        "wrzeszcz górny",
        "https://ogloszenia.trojmiasto.pl/nieruchomosci-sprzedam-rynek-wtorny/mieszkanie/gdansk/wrzeszcz/",
    ),
    (
        "wrzeszcz dolny",
        "https://ogloszenia.trojmiasto.pl/nieruchomosci-sprzedam-rynek-wtorny/mieszkanie/gdansk/wrzeszcz-dolny/",
    ),
    (
        "strzyża",
        "https://ogloszenia.trojmiasto.pl/nieruchomosci-sprzedam-rynek-wtorny/mieszkanie/gdansk/strzyza/",
    ),
    (
        "aniołki",
        "https://ogloszenia.trojmiasto.pl/nieruchomosci-sprzedam-rynek-wtorny/mieszkanie/gdansk/aniolki/",
    ),
];

static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("slug regex"));

fn mapping(source: Source) -> Option<&'static QueryMapping> {
    match source {
        Source::Olx => Some(&OLX),
        Source::Otodom => Some(&OTODOM),
        Source::Morizon => Some(&MORIZON),
        Source::Trojmiasto => Some(&TROJMIASTO),
        _ => None,
    }
}

/// Canonical listing URL for a district, if the portal has one
pub fn district_url(source: Source, district: &str) -> Option<&'static str> {
    let key = district.trim().to_lowercase();
    let table: &[(&str, &str)] = match source {
        Source::Trojmiasto => &TROJMIASTO_DISTRICTS,
        _ => &[],
    };
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, url)| *url)
}

/// Lowercase ASCII slug: "Wrzeszcz Górny" -> "wrzeszcz-gorny"
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .replace('ł', "l")
        .replace('Ł', "L")
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect();
    SLUG_SEPARATORS
        .replace_all(&folded.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Build the search URL for one portal and an optional district.
///
/// A district with a canonical page replaces `base_url` entirely.
pub fn build_url(
    base_url: &str,
    filters: &FilterCriteria,
    district: Option<&str>,
    source_name: &str,
) -> Result<String, url::ParseError> {
    let Ok(source) = source_name.parse::<Source>() else {
        return Ok(base_url.to_string());
    };

    let base = district
        .and_then(|d| district_url(source, d))
        .unwrap_or(base_url);

    let Some(mapping) = mapping(source) else {
        return Ok(base.to_string());
    };

    let mut url = Url::parse(base)?;
    let mut query = QueryParams::from_url(&url);

    if let Some(min_area) = filters.min_area.filter(|v| *v > 0.0) {
        query.apply(mapping.min_area, &format_number(min_area));
    }
    if let Some(max_price) = filters.max_price.filter(|v| *v > 0.0) {
        query.apply(mapping.max_price, &format_number(max_price));
    }
    if filters.ground_floor {
        query.set_all(mapping.ground_floor);
    }
    if filters.garden {
        query.set_all(mapping.garden);
    }
    query.set_all(mapping.forced);

    if let Some(district) = district.map(str::trim).filter(|d| !d.is_empty()) {
        match mapping.district {
            DistrictParam::Query(key) => query.set(key, district),
            DistrictParam::PathSlug => {
                let slug = slugify(district);
                if !slug.is_empty() && !url.path().contains(&slug) {
                    let path = format!("{}/{}/", url.path().trim_end_matches('/'), slug);
                    url.set_path(&path);
                }
            }
        }
    }

    query.write_to(&mut url);
    Ok(url.to_string())
}

fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Ordered query parameters with replace-in-place semantics
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn from_url(url: &Url) -> Self {
        Self(url.query_pairs().into_owned().collect())
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value.to_string(),
            None => self.0.push((key.to_string(), value.to_string())),
        }
    }

    fn set_all(&mut self, pairs: &[(&str, &str)]) {
        for (key, value) in pairs {
            self.set(key, value);
        }
    }

    fn apply(&mut self, param: Param, value: &str) {
        match param {
            Param::Plain(key) => self.set(key, value),
            Param::RangeMin(key) => {
                let (_, max) = self.range(key);
                self.set(key, &format!("{}_{}", value, max));
            }
            Param::RangeMax(key) => {
                let (min, _) = self.range(key);
                self.set(key, &format!("{}_{}", min, value));
            }
        }
    }

    fn range(&self, key: &str) -> (String, String) {
        self.get(key)
            .and_then(|v| v.split_once('_'))
            .map(|(min, max)| (min.to_string(), max.to_string()))
            .unwrap_or_default()
    }

    fn write_to(&self, url: &mut Url) {
        if self.0.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(self.0.iter());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> FilterCriteria {
        FilterCriteria {
            min_area: Some(50.0),
            max_price: Some(600000.0),
            ground_floor: true,
            garden: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_olx_mapping() {
        let url = build_url(
            "https://www.olx.pl/nieruchomosci/mieszkania/sprzedaz/gdansk/",
            &filters(),
            Some("Wrzeszcz"),
            "olx",
        )
        .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("search[filter_float_m:from]".into(), "50".into())));
        assert!(pairs.contains(&("search[filter_float_price:to]".into(), "600000".into())));
        assert!(pairs.contains(&("search[filter_enum_floor_select][0]".into(), "floor_0".into())));
        assert!(pairs.contains(&("search[filter_enum_market][0]".into(), "secondary".into())));
        assert!(pairs.contains(&("q".into(), "Wrzeszcz".into())));
    }

    #[test]
    fn test_otodom_replaces_existing_params() {
        let url = build_url(
            "https://www.otodom.pl/pl/wyniki/sprzedaz/mieszkanie/pomorskie/gdansk?priceMax=100&limit=36",
            &filters(),
            None,
            "otodom",
        )
        .unwrap();
        assert!(url.contains("priceMax=600000"));
        assert!(!url.contains("priceMax=100"));
        assert!(url.contains("limit=36"));
        assert!(url.contains("floorMin=0&floorMax=0"));
        assert!(url.contains("market=SECONDARY"));
    }

    #[test]
    fn test_morizon_district_path_slug() {
        let url = build_url(
            "https://www.morizon.pl/mieszkania/gdansk/",
            &FilterCriteria::default(),
            Some("Wrzeszcz Górny"),
            "morizon",
        )
        .unwrap();
        assert!(url.starts_with("https://www.morizon.pl/mieszkania/gdansk/wrzeszcz-gorny/?"));
        assert!(url.contains("ps%5Bmarket_type%5D%5B0%5D=2"));
    }

    #[test]
    fn test_trojmiasto_district_table_overrides_base() {
        let url = build_url(
            "https://ogloszenia.trojmiasto.pl/nieruchomosci-sprzedam/",
            &FilterCriteria::default(),
            Some(" Strzyża "),
            "trojmiasto",
        )
        .unwrap();
        assert!(url.starts_with(
            "https://ogloszenia.trojmiasto.pl/nieruchomosci-sprzedam-rynek-wtorny/mieszkanie/gdansk/strzyza/?"
        ));
        assert!(url.contains("rynek=W"));
    }

    #[test]
    fn test_trojmiasto_ranges_keep_existing_bounds() {
        let url = build_url(
            "https://ogloszenia.trojmiasto.pl/nieruchomosci/?ri=_90&rm=200000_",
            &FilterCriteria {
                min_area: Some(45.0),
                max_price: Some(700000.0),
                ..Default::default()
            },
            None,
            "trojmiasto",
        )
        .unwrap();
        assert!(url.contains("ri=45_90"));
        assert!(url.contains("rm=200000_700000"));
    }

    #[test]
    fn test_unmapped_source_passes_through() {
        let base = "https://gratka.pl/nieruchomosci/mieszkania/gdansk?foo=bar";
        assert_eq!(build_url(base, &filters(), Some("Oliwa"), "gratka").unwrap(), base);
        assert_eq!(build_url(base, &filters(), None, "unknown").unwrap(), base);
    }

    #[test]
    fn test_build_is_idempotent() {
        for (base, source) in [
            ("https://www.olx.pl/nieruchomosci/mieszkania/", "olx"),
            ("https://www.morizon.pl/mieszkania/gdansk/", "morizon"),
            ("https://ogloszenia.trojmiasto.pl/nieruchomosci/", "trojmiasto"),
        ] {
            let once = build_url(base, &filters(), Some("Oliwa"), source).unwrap();
            assert_eq!(once, build_url(base, &filters(), Some("Oliwa"), source).unwrap());
            let twice = build_url(&once, &filters(), Some("Oliwa"), source).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Wrzeszcz Górny"), "wrzeszcz-gorny");
        assert_eq!(slugify(" Stare  Miasto - Śródmieście "), "stare-miasto-srodmiescie");
        assert_eq!(slugify("Łostowice"), "lostowice");
    }

    #[test]
    fn test_invalid_base_url_is_an_error() {
        assert!(build_url("not a url", &filters(), None, "olx").is_err());
    }
}
