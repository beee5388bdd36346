//! Plans (source × district) jobs and runs them one after another.
//!
//! Each job is isolated: a failing adapter costs that job's listings and
//! nothing else. Matching offers are saved as soon as their job finishes.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::filters::{matches, matches_district};
use crate::models::{FilterCriteria, Offer, ScrapeJob, Source};
use crate::normalize::normalize_listing;
use crate::progress::{ProgressSink, RunContext};
use crate::query::build_url;
use crate::scrapers::{AdapterRegistry, RawListing, SessionFactory, SourceAdapter};
use crate::store::OfferStore;

/// Outcome of one run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunSummary {
    pub jobs_total: usize,
    /// Adapter or session errors
    pub jobs_failed: usize,
    /// No adapter registered for the portal
    pub jobs_skipped: usize,
    /// Jobs whose matching offers could not be persisted
    pub save_failures: usize,
    pub listings_found: usize,
    pub offers_saved: usize,
    /// Offers from jobs that hit a store error, for the caller to retry
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unsaved: Vec<Offer>,
}

/// Expand enabled portals × districts into jobs, in config order.
///
/// Portals without a base URL, or whose URL cannot be built, are skipped
/// with a warning.
pub fn plan_jobs(config: &AppConfig) -> Vec<ScrapeJob> {
    let criteria = config.filters.criteria();
    let mut jobs = Vec::new();

    for portal in config.portals.iter().filter(|p| p.enabled) {
        let Some(base_url) = portal.base_url.as_deref() else {
            warn!("Portal {} has no base_url, skipping", portal.name);
            continue;
        };

        let districts: Vec<Option<&str>> = if criteria.districts.is_empty() {
            vec![None]
        } else {
            criteria.districts.iter().map(|d| Some(d.as_str())).collect()
        };

        for district in districts {
            match build_url(base_url, &criteria, district, &portal.name) {
                Ok(url) => jobs.push(ScrapeJob {
                    source_name: portal.name.clone(),
                    url,
                    max_pages: portal.max_pages,
                    district_context: district.map(str::to_string).into_iter().collect(),
                }),
                Err(e) => warn!(
                    source = %portal.name,
                    base_url,
                    "Cannot build search URL: {}",
                    e
                ),
            }
        }
    }

    jobs
}

/// Normalize, district-check and filter one job's listings
pub fn select_offers(
    listings: Vec<RawListing>,
    source: Source,
    district_context: &[String],
    criteria: &FilterCriteria,
) -> Vec<Offer> {
    let found = listings.len();
    let offers: Vec<Offer> = listings
        .iter()
        .filter_map(|raw| normalize_listing(raw, source))
        .filter(|offer| matches_district(offer, district_context))
        .filter(|offer| matches(offer, criteria))
        .collect();

    if offers.len() < found {
        info!(
            "[{}] Filtered {} -> {} offers.",
            source.as_str().to_uppercase(),
            found,
            offers.len()
        );
    }
    offers
}

/// Runs jobs against adapters, sessions and the store
pub struct Orchestrator<'a> {
    registry: &'a AdapterRegistry,
    sessions: &'a dyn SessionFactory,
    store: &'a OfferStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a AdapterRegistry,
        sessions: &'a dyn SessionFactory,
        store: &'a OfferStore,
    ) -> Self {
        Self {
            registry,
            sessions,
            store,
        }
    }

    /// Start a run through `ctx`, refusing if one is already active
    pub async fn run_exclusive(&self, config: &AppConfig, ctx: &RunContext) -> Result<RunSummary> {
        let guard = ctx
            .try_start()
            .context("A scrape run is already in progress")?;
        self.run(config, guard.tracker()).await
    }

    /// Run every planned job in order.
    ///
    /// Adapter and store failures are logged and counted, and the run moves
    /// on to the next job. Offers that could not be saved come back in
    /// [`RunSummary::unsaved`].
    pub async fn run(&self, config: &AppConfig, progress: &dyn ProgressSink) -> Result<RunSummary> {
        let criteria = config.filters.criteria();
        let jobs = plan_jobs(config);
        let total = jobs.len();

        info!("🏠 Starting run: {} jobs", total);
        progress.update(0, total, "Starting");

        let mut summary = RunSummary {
            jobs_total: total,
            ..Default::default()
        };

        for (idx, job) in jobs.iter().enumerate() {
            let label = job.label();

            match self.registry.get(&job.source_name) {
                None => {
                    warn!(source = %job.source_name, "No adapter registered, skipping job");
                    summary.jobs_skipped += 1;
                }
                Some(adapter) => match self.scrape_job(adapter.clone(), job).await {
                    Ok(listings) => {
                        info!("[{}] Found {} offers.", job.source_name.to_uppercase(), listings.len());
                        summary.listings_found += listings.len();

                        let offers = select_offers(
                            listings,
                            adapter.source(),
                            &job.district_context,
                            &criteria,
                        );
                        if !offers.is_empty() {
                            let count = offers.len();
                            match self.store.save(offers.clone()) {
                                Ok(_) => summary.offers_saved += count,
                                Err(e) => {
                                    warn!(
                                        source = %job.source_name,
                                        url = %job.url,
                                        "Failed to save {} offers: {:#}",
                                        count,
                                        anyhow::Error::new(e)
                                    );
                                    summary.save_failures += 1;
                                    summary.unsaved.extend(offers);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            source = %job.source_name,
                            url = %job.url,
                            "Error scraping: {:#}",
                            e
                        );
                        summary.jobs_failed += 1;
                    }
                },
            }

            progress.update(idx + 1, total, &label);
        }

        progress.update(total, total, "Done");
        info!(
            "✅ Run finished: {} offers saved from {} listings ({} failed, {} skipped, {} unsaved jobs)",
            summary.offers_saved,
            summary.listings_found,
            summary.jobs_failed,
            summary.jobs_skipped,
            summary.save_failures
        );
        Ok(summary)
    }

    async fn scrape_job(
        &self,
        adapter: std::sync::Arc<dyn SourceAdapter>,
        job: &ScrapeJob,
    ) -> Result<Vec<RawListing>> {
        let mut session = self
            .sessions
            .open()
            .await
            .context("Failed to open scraping session")?;

        debug!("Job {} -> {}", job.label(), job.url);

        // A panicking adapter only takes down its own task
        let url = job.url.clone();
        let max_pages = job.max_pages;
        tokio::spawn(async move { adapter.scrape(session.as_mut(), &url, max_pages).await })
            .await
            .context("Adapter task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> AppConfig {
        AppConfig::from_json(json).unwrap()
    }

    #[test]
    fn test_one_job_per_source_without_districts() {
        let jobs = plan_jobs(&config(
            r#"{"filters": {}, "portals": {
                "olx": {"enabled": true, "base_url": "https://www.olx.pl/", "max_pages": 3},
                "otodom": {"enabled": false, "base_url": "https://www.otodom.pl/"},
                "gratka": {"enabled": true, "base_url": "https://gratka.pl/x"}
            }}"#,
        ));
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].source_name, "olx");
        assert_eq!(jobs[0].max_pages, 3);
        assert!(jobs[0].district_context.is_empty());
        assert_eq!(jobs[1].url, "https://gratka.pl/x");
    }

    #[test]
    fn test_cross_product_in_config_order() {
        let jobs = plan_jobs(&config(
            r#"{"filters": {"district": ["Wrzeszcz", "Oliwa"]}, "portals": {
                "trojmiasto": {"enabled": true, "base_url": "https://ogloszenia.trojmiasto.pl/"},
                "olx": {"enabled": true, "base_url": "https://www.olx.pl/"}
            }}"#,
        ));
        let plan: Vec<(&str, &str)> = jobs
            .iter()
            .map(|j| (j.source_name.as_str(), j.district_context[0].as_str()))
            .collect();
        assert_eq!(
            plan,
            [
                ("trojmiasto", "Wrzeszcz"),
                ("trojmiasto", "Oliwa"),
                ("olx", "Wrzeszcz"),
                ("olx", "Oliwa")
            ]
        );
        assert!(jobs[0].url.contains("/gdansk/wrzeszcz/"));
        assert!(jobs[2].url.contains("q=Wrzeszcz"));
    }

    #[test]
    fn test_portals_without_url_are_skipped() {
        let jobs = plan_jobs(&config(
            r#"{"portals": {
                "olx": {"enabled": true},
                "otodom": {"enabled": true, "base_url": "::bad::"}
            }}"#,
        ));
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_select_offers_applies_district_then_criteria() {
        let listings = vec![
            RawListing {
                url: "https://a".into(),
                title: Some("Parter z ogródkiem".into()),
                location: Some("Gdańsk, Wrzeszcz".into()),
                ..Default::default()
            },
            RawListing {
                url: "https://b".into(),
                title: Some("2 piętro".into()),
                location: Some("Gdańsk, Wrzeszcz".into()),
                ..Default::default()
            },
            RawListing {
                url: "https://c".into(),
                title: Some("Parter".into()),
                location: Some("Gdańsk, Oliwa".into()),
                ..Default::default()
            },
        ];
        let criteria = FilterCriteria {
            ground_floor: true,
            ..Default::default()
        };

        let offers = select_offers(listings, Source::Olx, &["wrzeszcz".to_string()], &criteria);
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].url, "https://a");
    }
}
