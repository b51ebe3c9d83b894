//! Scrape pipeline: search page → job cards → detail pages → job store.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobscout_adapters::{IndeedAdapter, SearchQuery, SourceAdapter};
use jobscout_core::JobRecord;
use jobscout_storage::{HttpClientConfig, HttpFetcher, JobStore, RetryPolicy, DEFAULT_USER_AGENT};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobscout-sync";

pub const DEFAULT_KEYWORD: &str = "Python Developer";
pub const DEFAULT_LOCATION: &str = "Paris";

/// Delay used when retries are configured as unbounded (`JOBSCOUT_RETRY_MAX_ATTEMPTS=0`).
pub const LEGACY_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub jobs_file: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub pages: usize,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.indeed.com".to_string(),
            jobs_file: PathBuf::from("./jobs_all.json"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 10,
            pages: 1,
            page_delay: Duration::from_millis(2000),
            retry: RetryPolicy::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("JOBSCOUT_BASE_URL").unwrap_or(defaults.base_url),
            jobs_file: std::env::var("JOBSCOUT_JOBS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.jobs_file),
            user_agent: std::env::var("JOBSCOUT_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parse("JOBSCOUT_HTTP_TIMEOUT_SECS").unwrap_or(defaults.http_timeout_secs),
            pages: env_parse::<usize>("JOBSCOUT_PAGES")
                .unwrap_or(defaults.pages)
                .max(1),
            page_delay: env_parse("JOBSCOUT_PAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_delay),
            retry: retry_policy_from_env(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn retry_policy_from_env() -> RetryPolicy {
    let defaults = RetryPolicy::default();
    let base_delay = env_parse("JOBSCOUT_RETRY_BASE_DELAY_MS").map(Duration::from_millis);
    let deadline = env_parse("JOBSCOUT_RETRY_DEADLINE_SECS").map(Duration::from_secs);

    match env_parse::<usize>("JOBSCOUT_RETRY_MAX_ATTEMPTS") {
        Some(0) => {
            let mut policy = RetryPolicy::fixed_forever(base_delay.unwrap_or(LEGACY_RETRY_DELAY));
            policy.deadline = deadline;
            policy
        }
        max_attempts => RetryPolicy {
            max_attempts: Some(max_attempts.unwrap_or(5)),
            base_delay: base_delay.unwrap_or(defaults.base_delay),
            max_delay: env_parse("JOBSCOUT_RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            exponential: true,
            deadline,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRunSummary {
    pub run_id: Uuid,
    pub keyword: String,
    pub location: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub listed: usize,
    pub scraped: usize,
    pub skipped: usize,
    pub jobs_file: String,
}

pub struct ScrapePipeline {
    config: ScrapeConfig,
    adapter: Box<dyn SourceAdapter>,
    http: HttpFetcher,
    store: JobStore,
}

impl ScrapePipeline {
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let adapter = IndeedAdapter::new(&config.base_url)
            .with_context(|| format!("configuring adapter for {}", config.base_url))?;
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: config.user_agent.clone(),
            retry: config.retry,
        })?;
        let store = JobStore::new(config.jobs_file.clone());
        Ok(Self {
            config,
            adapter: Box::new(adapter),
            http,
            store,
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Scrape one search and replace the job store with the result.
    ///
    /// A listing failure aborts the run; a failing detail page is skipped.
    /// An empty scrape leaves the previous store untouched.
    pub async fn run_once(&self, keyword: &str, location: &str) -> Result<ScrapeRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("scrape_run", %run_id, source = self.adapter.source_id(), keyword, location);
        self.run_inner(run_id, keyword, location).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, keyword: &str, location: &str) -> Result<ScrapeRunSummary> {
        let started_at = Utc::now();
        info!("starting scrape");

        let mut listed = 0usize;
        let mut skipped = 0usize;
        let mut jobs: Vec<JobRecord> = Vec::new();

        for page in 0..self.config.pages {
            if page > 0 {
                tokio::time::sleep(self.config.page_delay).await;
            }
            let query = SearchQuery {
                keyword: keyword.to_string(),
                location: location.to_string(),
                page,
            };
            let listing = self
                .adapter
                .fetch_listing(&self.http, &query)
                .await
                .with_context(|| format!("fetching search page {} for '{keyword}'", page + 1))?;
            let entries = self.adapter.parse_listing(&listing);
            info!(page = page + 1, cards = entries.len(), "parsed search page");
            listed += entries.len();

            for entry in &entries {
                match self.adapter.fetch_detail(&self.http, entry).await {
                    Ok(Some(detail)) => {
                        let record = self.adapter.parse_detail(&detail, entry, keyword);
                        info!(jk = %record.jk, title = %record.display_title(), company = %record.company, "scraped job");
                        jobs.push(record);
                    }
                    Ok(None) => skipped += 1,
                    Err(err) => {
                        warn!(jk = %entry.jk, error = %err, "skipping job detail");
                        skipped += 1;
                    }
                }
            }
        }

        if jobs.is_empty() {
            warn!("no jobs scraped; keeping previous job store");
        } else {
            self.store
                .save(&jobs)
                .await
                .with_context(|| format!("saving jobs to {}", self.store.path().display()))?;
        }

        let finished_at = Utc::now();
        info!(listed, scraped = jobs.len(), skipped, "scrape finished");
        Ok(ScrapeRunSummary {
            run_id,
            keyword: keyword.to_string(),
            location: location.to_string(),
            started_at,
            finished_at,
            listed,
            scraped: jobs.len(),
            skipped,
            jobs_file: self.store.path().display().to_string(),
        })
    }
}

pub async fn run_scrape_from_env(keyword: &str, location: &str) -> Result<ScrapeRunSummary> {
    let pipeline = ScrapePipeline::new(ScrapeConfig::from_env())?;
    pipeline.run_once(keyword, location).await
}
