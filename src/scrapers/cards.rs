use crate::models::Source;
use crate::normalize::safe_text;
use crate::scrapers::traits::{Session, SourceAdapter};
use crate::scrapers::types::RawListing;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

/// Upper bound on pages followed when `max_pages` is 0
const PAGE_LIMIT: u32 = 50;

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d[\d\s]*)\s?zł").expect("price regex"));
static PRICE_PER_M2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d[\d\s]*)\s?zł\s?/\s?m(?:2|²)").expect("price/m2 regex"));
static AREA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+[.,]?\d*)\s*m(?:2|²)").expect("area regex"));

/// Where listing data sits in a portal's result page
#[derive(Debug, Clone)]
pub struct CardSelectors {
    pub card: &'static str,
    pub link: &'static str,
    pub title: &'static str,
    pub price: Option<&'static str>,
    pub area: Option<&'static str>,
    pub location: Option<&'static str>,
    pub floor: Option<&'static str>,
    pub next_page: Option<&'static str>,
    /// Prefix for relative listing links
    pub origin: &'static str,
}

impl CardSelectors {
    /// Selector table for portals with a known result-page layout
    pub fn for_source(source: Source) -> Option<Self> {
        let selectors = match source {
            Source::Olx => CardSelectors {
                card: "div[data-cy='l-card']",
                link: "a",
                title: "h6, h4",
                price: Some("p[data-testid='ad-price']"),
                area: None,
                location: Some("p[data-testid='location-date']"),
                floor: None,
                next_page: Some("a[data-testid='pagination-forward']"),
                origin: "https://www.olx.pl",
            },
            Source::Otodom => CardSelectors {
                card: "article",
                link: "a",
                title: "[data-cy='listing-item-title'], h3, h2",
                price: Some("[data-cy='listing-item-price']"),
                area: Some("[data-cy='listing-item-area']"),
                location: Some("[data-cy='listing-item-location']"),
                floor: Some("[data-cy='listing-item-floor']"),
                next_page: Some("a[data-cy='pagination.next-page']"),
                origin: "https://www.otodom.pl",
            },
            Source::Morizon => CardSelectors {
                card: "div[data-cy='listing-item']",
                link: "a",
                title: "h2, h3",
                price: None,
                area: None,
                location: Some("h2 span, h3 span"),
                floor: None,
                next_page: Some("a[aria-label*='Następna']"),
                origin: "https://www.morizon.pl",
            },
            Source::Trojmiasto => CardSelectors {
                card: "div.list__item",
                link: "a",
                title: "h2, h3",
                price: None,
                area: None,
                location: Some(".list__item__details__info"),
                floor: None,
                next_page: Some("a.pages__controls__next"),
                origin: "https://ogloszenia.trojmiasto.pl",
            },
            _ => return None,
        };
        Some(selectors)
    }
}

/// Compiled form of [`CardSelectors`]
struct CompiledSelectors {
    card: Selector,
    link: Selector,
    title: Selector,
    price: Option<Selector>,
    area: Option<Selector>,
    location: Option<Selector>,
    floor: Option<Selector>,
    next_page: Option<Selector>,
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector {:?}: {:?}", css, e))
}

fn compile_opt(css: Option<&str>) -> Result<Option<Selector>> {
    css.map(compile).transpose()
}

/// Result-page adapter driven by a CSS selector table
pub struct CardAdapter {
    source: Source,
    origin: String,
    selectors: CompiledSelectors,
}

impl CardAdapter {
    pub fn new(source: Source, selectors: CardSelectors) -> Result<Self> {
        let compiled = CompiledSelectors {
            card: compile(selectors.card)?,
            link: compile(selectors.link)?,
            title: compile(selectors.title)?,
            price: compile_opt(selectors.price)?,
            area: compile_opt(selectors.area)?,
            location: compile_opt(selectors.location)?,
            floor: compile_opt(selectors.floor)?,
            next_page: compile_opt(selectors.next_page)?,
        };

        Ok(Self {
            source,
            origin: selectors.origin.trim_end_matches('/').to_string(),
            selectors: compiled,
        })
    }

    /// Adapter for a source with a built-in selector table
    pub fn for_source(source: Source) -> Result<Option<Self>> {
        CardSelectors::for_source(source)
            .map(|selectors| Self::new(source, selectors))
            .transpose()
    }

    /// Extract listings and the next page link from one result page
    pub fn parse_page(&self, html: &str, page_url: &str) -> (Vec<RawListing>, Option<String>) {
        let document = Html::parse_document(html);
        let listings: Vec<RawListing> = document
            .select(&self.selectors.card)
            .filter_map(|card| self.parse_card(card))
            .collect();

        let next = self
            .selectors
            .next_page
            .as_ref()
            .and_then(|selector| document.select(selector).next())
            .and_then(|el| el.value().attr("href"))
            .filter(|href| !href.is_empty() && !href.starts_with("javascript"))
            .and_then(|href| Url::parse(page_url).ok()?.join(href).ok())
            .map(String::from);

        (listings, next)
    }

    fn parse_card(&self, card: ElementRef<'_>) -> Option<RawListing> {
        let href = card
            .select(&self.selectors.link)
            .find_map(|a| a.value().attr("href"))
            .or_else(|| card.value().attr("href"))?;
        let url = self.absolute(href);

        let text = element_text(card);
        let pick = |selector: &Option<Selector>| {
            selector
                .as_ref()
                .and_then(|s| card.select(s).next())
                .map(element_text)
                .filter(|t| !t.is_empty())
        };

        let title = card
            .select(&self.selectors.title)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .or_else(|| title_from_url(&url));

        let price = pick(&self.selectors.price).or_else(|| price_from_text(&text));
        let area = pick(&self.selectors.area).or_else(|| capture(&AREA_RE, &text));
        let location = pick(&self.selectors.location)
            .map(|loc| loc.split(" - ").next().unwrap_or_default().to_string());

        Some(RawListing {
            url,
            title,
            price,
            area,
            price_per_m2: capture(&PRICE_PER_M2_RE, &text),
            location,
            floor: pick(&self.selectors.floor),
            garden: None,
            text: Some(text),
        })
    }

    fn absolute(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{}", self.origin, href)
        } else {
            format!("{}/{}", self.origin, href)
        }
    }
}

#[async_trait]
impl SourceAdapter for CardAdapter {
    async fn scrape(
        &self,
        session: &mut dyn Session,
        url: &str,
        max_pages: u32,
    ) -> Result<Vec<RawListing>> {
        info!("Scraping {}: {}", self.source, url);

        let limit = if max_pages == 0 { PAGE_LIMIT } else { max_pages };
        let mut visited = HashSet::new();
        let mut current = url.to_string();
        let mut all = Vec::new();

        for page in 1..=limit {
            visited.insert(current.clone());
            let html = session
                .fetch(&current)
                .await
                .with_context(|| format!("{} page {} failed", self.source, page))?;

            let (listings, next) = self.parse_page(&html, &current);
            debug!("{} page {}: {} listings", self.source, page, listings.len());

            if listings.is_empty() {
                break;
            }
            all.extend(listings);

            match next {
                Some(next) if !visited.contains(&next) => current = next,
                _ => break,
            }
        }

        Ok(all)
    }

    fn source(&self) -> Source {
        self.source
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    safe_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].trim().to_string())
}

// First "N zł" that is not a per-square-metre figure
fn price_from_text(text: &str) -> Option<String> {
    PRICE_RE
        .captures_iter(text)
        .find(|caps| {
            let end = caps.get(0).map(|m| m.end()).unwrap_or(text.len());
            !text[end..].trim_start().starts_with('/')
        })
        .map(|caps| caps[1].trim().to_string())
}

/// "/d/oferta/mieszkanie-z-ogrodem-CID3-ID1abc.html" -> "Mieszkanie Z Ogrodem"
fn title_from_url(url: &str) -> Option<String> {
    let slug = url.trim_end_matches('/').rsplit('/').next()?;
    let slug = slug
        .split("-CID")
        .next()
        .and_then(|s| s.split("-ID").next())
        .unwrap_or(slug)
        .trim_end_matches(".html");

    let title = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PAGE_ONE: &str = r#"
        <html><body>
          <div class="list__item">
            <a href="/nieruchomosci/mieszkanie-wrzeszcz,ogl1.html">
              <h2>Mieszkanie 2 pokoje, parter z ogródkiem</h2>
            </a>
            <p class="list__item__details__info">Gdańsk, Wrzeszcz Górny</p>
            <p>52,5 m2</p><p>489 000 zł</p><p>9 314 zł/m2</p>
          </div>
          <div class="list__item">
            <a href="https://ogloszenia.trojmiasto.pl/nieruchomosci/ogl2.html"><h3>Kawalerka</h3></a>
            <p>12 400 zł/m2</p><p>310 000 zł</p>
          </div>
          <a class="pages__controls__next" href="?strona=2">dalej</a>
        </body></html>
    "#;

    const PAGE_TWO: &str = r#"
        <html><body>
          <div class="list__item">
            <a href="/nieruchomosci/ogl3.html"><h2>Mieszkanie 3 piętro</h2></a>
          </div>
        </body></html>
    "#;

    struct FixtureSession {
        pages: HashMap<String, String>,
        fetched: Vec<String>,
    }

    #[async_trait]
    impl Session for FixtureSession {
        async fn fetch(&mut self, url: &str) -> Result<String> {
            self.fetched.push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no fixture for {}", url))
        }
    }

    fn adapter() -> CardAdapter {
        CardAdapter::for_source(Source::Trojmiasto).unwrap().unwrap()
    }

    #[test]
    fn test_parse_page_extracts_cards() {
        let (listings, next) = adapter().parse_page(PAGE_ONE, "https://ogloszenia.trojmiasto.pl/nieruchomosci/");
        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(
            first.url,
            "https://ogloszenia.trojmiasto.pl/nieruchomosci/mieszkanie-wrzeszcz,ogl1.html"
        );
        assert_eq!(first.title.as_deref(), Some("Mieszkanie 2 pokoje, parter z ogródkiem"));
        assert_eq!(first.location.as_deref(), Some("Gdańsk, Wrzeszcz Górny"));
        assert_eq!(first.area.as_deref(), Some("52,5"));
        assert_eq!(first.price.as_deref(), Some("489 000"));
        assert_eq!(first.price_per_m2.as_deref(), Some("9 314"));

        // per-m2 figure listed first must not be taken as the price
        assert_eq!(listings[1].price.as_deref(), Some("310 000"));
        assert_eq!(
            next.as_deref(),
            Some("https://ogloszenia.trojmiasto.pl/nieruchomosci/?strona=2")
        );
    }

    #[tokio::test]
    async fn test_scrape_follows_pagination() {
        let mut session = FixtureSession {
            pages: HashMap::from([
                ("https://ogloszenia.trojmiasto.pl/nieruchomosci/".to_string(), PAGE_ONE.to_string()),
                (
                    "https://ogloszenia.trojmiasto.pl/nieruchomosci/?strona=2".to_string(),
                    PAGE_TWO.to_string(),
                ),
            ]),
            fetched: Vec::new(),
        };

        let listings = adapter()
            .scrape(&mut session, "https://ogloszenia.trojmiasto.pl/nieruchomosci/", 0)
            .await
            .unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(session.fetched.len(), 2);
    }

    #[tokio::test]
    async fn test_scrape_respects_max_pages() {
        let mut session = FixtureSession {
            pages: HashMap::from([(
                "https://ogloszenia.trojmiasto.pl/nieruchomosci/".to_string(),
                PAGE_ONE.to_string(),
            )]),
            fetched: Vec::new(),
        };

        let listings = adapter()
            .scrape(&mut session, "https://ogloszenia.trojmiasto.pl/nieruchomosci/", 1)
            .await
            .unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(session.fetched.len(), 1);
    }

    #[test]
    fn test_title_from_url() {
        assert_eq!(
            title_from_url("https://www.olx.pl/d/oferta/mieszkanie-z-ogrodem-CID3-ID1abc.html").as_deref(),
            Some("Mieszkanie Z Ogrodem")
        );
    }

    #[test]
    fn test_only_known_layouts_have_tables() {
        assert!(CardSelectors::for_source(Source::Olx).is_some());
        assert!(CardSelectors::for_source(Source::Gratka).is_none());
    }
}
