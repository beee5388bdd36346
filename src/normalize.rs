//! Free-text to typed value conversion for scraped listing fields.
//!
//! Every function here is total: unparseable input degrades to `None` or
//! `false` so a single odd listing never aborts a batch.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::debug;

use crate::models::{Offer, Source};
use crate::scrapers::RawListing;

/// Keywords that mark a garden or a private plot
pub const GARDEN_KEYWORDS: [&str; 7] = [
    "ogród", "ogródek", "garden", "działka", "ogrod", "ogrodek", "dzialka",
];

/// Polish ordinal floor names, checked in this order
const FLOOR_WORDS: [(&str, i32); 17] = [
    ("parter", 0),
    ("pierwsze", 1),
    ("drugie", 2),
    ("trzecie", 3),
    ("czwarte", 4),
    ("piąte", 5),
    ("piate", 5),
    ("szóste", 6),
    ("szoste", 6),
    ("siódme", 7),
    ("siodme", 7),
    ("ósme", 8),
    ("osme", 8),
    ("dziewiąte", 9),
    ("dziewiate", 9),
    ("dziesiąte", 10),
    ("dziesiate", 10),
];

/// Fragments that must appear around an "N/M" to read it as a floor
const SLASH_CONTEXT_KEYWORDS: [&str; 4] = ["p.", "piętro", "p ", "poziom"];

static FLOOR_WORD_RES: LazyLock<Vec<(Regex, i32)>> = LazyLock::new(|| {
    FLOOR_WORDS
        .iter()
        .map(|(word, floor)| {
            let re = Regex::new(&format!(r"\b{}\b", word)).expect("floor word regex");
            (re, *floor)
        })
        .collect()
});

static SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})[ \t]*/[ \t]*(\d{1,2})").expect("slash regex"));

static NUMBER_BEFORE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s*(?:piętro|p\.|p\b|poziom)").expect("floor suffix regex")
});

static NUMBER_AFTER_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:piętro|p\.|p\b|poziom)\s*(\d{1,2})").expect("floor prefix regex")
});

static ROMAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(i{1,3}|iv|v|vi{1,3}|ix|x)\b[ \t]*(?:piętro|p\.|p\b)").expect("roman regex")
});

/// Collapse newlines, tabs and runs of spaces into single spaces
pub fn safe_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a price such as "550 000 zł" or "12 500 zł/m²".
///
/// Values in (0, 100) are read as truncated thousands ("55 tys.").
pub fn normalize_price(text: &str) -> Option<f64> {
    let without_units = text.to_lowercase().replace("m²", "").replace("m2", "");
    let cleaned: String = without_units
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let value = parse_decimal(&collapse_separators(&cleaned)?)?;
    if value > 0.0 && value < 100.0 {
        Some(value * 1000.0)
    } else {
        Some(value)
    }
}

/// Parse an area such as "65,5 m²"
pub fn normalize_area(text: &str) -> Option<f64> {
    let cleaned: String = text
        .to_lowercase()
        .replace("m²", "")
        .replace("m2", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    parse_decimal(&cleaned.replace(',', "."))
}

/// Whether the text mentions a garden or plot
pub fn check_garden(text: &str) -> bool {
    let lower = text.to_lowercase();
    GARDEN_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Extract a floor number from free text. Ground floor is 0.
///
/// Strategies run from most to least specific; the first hit wins.
pub fn parse_floor(text: &str) -> Option<i32> {
    if text.trim().is_empty() {
        return None;
    }
    let lower = text.to_lowercase();

    const STRATEGIES: [fn(&str) -> Option<i32>; 7] = [
        floor_from_ordinal_word,
        floor_from_level_zero,
        floor_from_slash,
        floor_from_number_before_keyword,
        floor_from_number_after_keyword,
        floor_from_roman_numeral,
        floor_from_garden,
    ];

    STRATEGIES.iter().find_map(|strategy| strategy(&lower))
}

fn floor_from_ordinal_word(text: &str) -> Option<i32> {
    FLOOR_WORD_RES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, floor)| *floor)
}

fn floor_from_level_zero(text: &str) -> Option<i32> {
    text.contains("poziom 0").then_some(0)
}

// "3/10" is only a floor when a floor keyword sits close by; otherwise it is
// usually a photo counter or a room split.
fn floor_from_slash(text: &str) -> Option<i32> {
    for caps in SLASH_RE.captures_iter(text) {
        let whole = caps.get(0)?;
        if text[whole.end()..].trim_start_matches([' ', '\t']).starts_with("pok") {
            continue;
        }

        let window = char_window(text, whole.start(), whole.end(), 5, 15);
        if SLASH_CONTEXT_KEYWORDS.iter().any(|kw| window.contains(kw)) {
            return caps[1].parse().ok();
        }
        return None;
    }
    None
}

fn floor_from_number_before_keyword(text: &str) -> Option<i32> {
    NUMBER_BEFORE_KEYWORD_RE
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

fn floor_from_number_after_keyword(text: &str) -> Option<i32> {
    NUMBER_AFTER_KEYWORD_RE
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

fn floor_from_roman_numeral(text: &str) -> Option<i32> {
    let caps = ROMAN_RE.captures(text)?;
    let floor = match &caps[1] {
        "i" => 1,
        "ii" => 2,
        "iii" => 3,
        "iv" => 4,
        "v" => 5,
        "vi" => 6,
        "vii" => 7,
        "viii" => 8,
        "ix" => 9,
        "x" => 10,
        _ => return None,
    };
    Some(floor)
}

// Gardens come with ground-floor flats in this market.
fn floor_from_garden(text: &str) -> Option<i32> {
    check_garden(text).then_some(0)
}

/// Turn one raw adapter listing into a canonical offer.
///
/// Returns `None` when the listing has no URL. Store bookkeeping fields
/// (`no`, flags) are left at their defaults; `scraped_at` is provisional and
/// replaced by the store for offers it already knows.
pub fn normalize_listing(raw: &RawListing, source: Source) -> Option<Offer> {
    let url = raw.url.trim();
    if url.is_empty() {
        debug!("Dropping {} listing without URL", source);
        return None;
    }

    let full_text = raw.text.as_deref().map(safe_text).unwrap_or_default();
    let title = raw.title.as_deref().map(safe_text).unwrap_or_default();

    let price = raw.price.as_deref().and_then(normalize_price);
    let area = raw.area.as_deref().and_then(normalize_area);
    let price_per_m2 = raw
        .price_per_m2
        .as_deref()
        .and_then(normalize_price)
        .or_else(|| match (price, area) {
            (Some(p), Some(a)) if a > 0.0 => Some((p / a * 100.0).round() / 100.0),
            _ => None,
        });

    let floor = raw
        .floor
        .as_deref()
        .and_then(parse_floor)
        .or_else(|| parse_floor(&full_text))
        .or_else(|| parse_floor(&title));

    let garden = raw.garden.as_deref().map(check_garden).unwrap_or(false)
        || check_garden(&title)
        || check_garden(&full_text);

    Some(Offer {
        no: 0,
        url: url.to_string(),
        title,
        price,
        area,
        price_per_m2,
        location: raw.location.as_deref().map(safe_text).unwrap_or_default(),
        floor,
        garden,
        source,
        scraped_at: Utc::now(),
        is_favorite: false,
        is_hidden: false,
    })
}

/// Remove thousands separators and leave at most one `.` decimal mark.
fn collapse_separators(digits: &str) -> Option<String> {
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let commas = digits.matches(',').count();
    let dots = digits.matches('.').count();

    let collapsed = match (commas, dots) {
        (0, 0) => digits.to_string(),
        (c, d) if c > 0 && d > 0 => {
            let decimal_at = digits.rfind([',', '.'])?;
            let (int_part, frac_part) = digits.split_at(decimal_at);
            let int_digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
            format!("{}.{}", int_digits, &frac_part[1..])
        }
        _ => {
            let sep = if commas > 0 { ',' } else { '.' };
            let groups: Vec<&str> = digits.split(sep).collect();
            let is_thousands =
                groups.len() > 2 || groups.last().map(|g| g.len() == 3).unwrap_or(false);
            if is_thousands {
                groups.concat()
            } else {
                groups.join(".")
            }
        }
    };

    Some(collapsed)
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Slice `text` from `before` chars ahead of `start` to `after` chars past `end`
fn char_window(text: &str, start: usize, end: usize, before: usize, after: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(before.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(after)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    &text[from..to]
}
