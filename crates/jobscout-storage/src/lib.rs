//! HTTP fetch utilities and job persistence for JobScout.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use jobscout_core::JobRecord;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

mod db;

pub use db::{JobsDb, StoredJob};

pub const CRATE_NAME: &str = "jobscout-storage";

/// Browser identity sent with every board request.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Flat JSON document holding the latest scrape.
#[derive(Debug, Clone)]
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the document with `jobs` using an atomic temp-file rename,
    /// so a concurrent `load` sees either the old or the new array.
    pub async fn save(&self, jobs: &[JobRecord]) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(jobs).context("serializing job records")?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating job store directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp job file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp job file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp job file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }

        info!(path = %self.path.display(), jobs = jobs.len(), "saved job records");
        Ok(())
    }

    /// Stored records, or an empty list when the document is missing or unreadable.
    pub async fn load(&self) -> Vec<JobRecord> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "could not read job store");
                return Vec::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "job store is not a valid job array");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// How long and how often a failing fetch is retried.
///
/// `max_attempts: None` never gives up; combine it with `deadline` to keep an
/// upper bound on wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<usize>,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential: bool,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential: true,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay, no attempt cap, no deadline. Blocks forever on a host that never recovers.
    pub fn fixed_forever(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay: delay,
            max_delay: delay,
            exponential: false,
            deadline: None,
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }

    /// Whether attempt number `attempt` (1-based) may be made.
    pub fn allows_attempt(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: String,
}

impl FetchedResponse {
    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gave up on {url} after {attempts} attempts (last failure: {last_failure})")]
    RetriesExhausted {
        url: String,
        attempts: usize,
        last_failure: String,
    },
    #[error("retry deadline of {deadline:?} exceeded for {url} after {attempts} attempts")]
    DeadlineExceeded {
        url: String,
        attempts: usize,
        deadline: Duration,
    },
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// GET `url`, retrying every non-2xx status per the retry policy.
    ///
    /// With `allow_not_found` a 404 is returned to the caller on the first attempt.
    pub async fn fetch(&self, url: &str, allow_not_found: bool) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        self.fetch_with_retry(url, allow_not_found).instrument(span).await
    }

    async fn fetch_with_retry(&self, url: &str, allow_not_found: bool) -> Result<FetchedResponse, FetchError> {
        let started = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            info!(attempt, "fetching");

            let last_failure = match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() || (allow_not_found && status == StatusCode::NOT_FOUND) {
                        let final_url = resp.url().to_string();
                        let body = resp.text().await?;
                        info!(attempt, status = status.as_u16(), bytes = body.len(), "fetched");
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }
                    warn!(attempt, status = status.as_u16(), "unexpected status");
                    format!("http status {}", status.as_u16())
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::NonRetryable {
                        return Err(FetchError::Request(err));
                    }
                    warn!(attempt, error = %err, "request failed");
                    err.to_string()
                }
            };

            if !self.retry.allows_attempt(attempt + 1) {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last_failure,
                });
            }

            let delay = self.retry.delay_for_attempt(attempt - 1);
            if let Some(deadline) = self.retry.deadline {
                if started.elapsed() + delay > deadline {
                    return Err(FetchError::DeadlineExceeded {
                        url: url.to_string(),
                        attempts: attempt,
                        deadline,
                    });
                }
            }
            info!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
