//! Tool bridge: exposes the scraped job store to protocol clients and
//! delegates the AI-backed tools to a chat-completion API.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jobscout_core::UserProfile;
use jobscout_storage::JobsDb;
use jobscout_sync::{ScrapeConfig, ScrapePipeline};
use tracing::{info, warn};

pub mod llm;
pub mod prompts;
pub mod rpc;
pub mod stdio;
pub mod tools;

pub use llm::{ChatBackend, LlmConfig, LlmError, OpenRouterClient};
pub use rpc::{DispatchError, Incoming, RpcDispatcher, RpcError, RpcRequest, RpcResponse};
pub use tools::{JobScraper, JobSource, ToolBridge, ToolError, ToolName, ToolSettings};

pub const CRATE_NAME: &str = "jobscout-bridge";
pub const SERVER_NAME: &str = "jobscout";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub profile_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub profile_name: Option<String>,
    pub digest_limit: usize,
    pub scrape_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let settings = ToolSettings::default();
        Self {
            profile_path: None,
            db_path: None,
            profile_name: None,
            digest_limit: settings.digest_limit,
            scrape_timeout: settings.scrape_timeout,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            profile_path: non_empty_env("JOBSCOUT_PROFILE").map(PathBuf::from),
            db_path: non_empty_env("JOBSCOUT_DB").map(PathBuf::from),
            profile_name: non_empty_env("JOBSCOUT_PROFILE_NAME"),
            digest_limit: env_parse::<usize>("JOBSCOUT_DIGEST_LIMIT")
                .unwrap_or(defaults.digest_limit)
                .max(1),
            scrape_timeout: env_parse("JOBSCOUT_SCRAPE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.scrape_timeout),
        }
    }

    pub fn settings(&self) -> ToolSettings {
        ToolSettings {
            digest_limit: self.digest_limit,
            scrape_timeout: self.scrape_timeout,
            ..ToolSettings::default()
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub fn load_profile_yaml(path: &Path) -> anyhow::Result<UserProfile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing profile {}", path.display()))
}

/// Profile precedence: database row, then YAML file, then the built-in default.
pub async fn resolve_profile(config: &BridgeConfig, db: Option<&JobsDb>) -> anyhow::Result<UserProfile> {
    if let (Some(db), Some(name)) = (db, config.profile_name.as_deref()) {
        match db.user_profile(name).await? {
            Some(profile) => {
                info!(name, "loaded profile from database");
                return Ok(profile);
            }
            None => warn!(name, "profile not found in database"),
        }
    }
    if let Some(path) = &config.profile_path {
        let profile = load_profile_yaml(path)?;
        info!(path = %path.display(), name = %profile.name, "loaded profile file");
        return Ok(profile);
    }
    Ok(UserProfile::default())
}

/// Wire a `ToolBridge` from process environment: LLM settings, optional
/// database, profile source and the scrape pipeline.
pub async fn build_bridge_from_env() -> anyhow::Result<ToolBridge> {
    let config = BridgeConfig::from_env();
    let llm = OpenRouterClient::new(LlmConfig::from_env())?;

    let db = match &config.db_path {
        Some(path) => Some(JobsDb::open(path).await?),
        None => None,
    };
    let profile = resolve_profile(&config, db.as_ref()).await?;

    let source = match db {
        Some(db) => JobSource::Database(db),
        None => {
            let pipeline = ScrapePipeline::new(ScrapeConfig::from_env())?;
            let store = pipeline.store().clone();
            JobSource::Scraped {
                scraper: Arc::new(pipeline),
                store,
            }
        }
    };

    Ok(ToolBridge::new(source, Arc::new(llm), profile).with_settings(config.settings()))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use jobscout_core::{ContractType, JobRecord, UserProfile, NOT_AVAILABLE};
    use jobscout_storage::JobStore;

    use crate::llm::{ChatBackend, LlmError};
    use crate::tools::{JobScraper, JobSource, ToolBridge};

    /// Records every prompt and answers with a canned reply.
    #[derive(Default)]
    pub struct FakeLlm {
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<(String, String)>>,
        pub fail_with: Option<u16>,
    }

    impl FakeLlm {
        pub fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_prompt(&self) -> String {
            self.prompts
                .lock()
                .unwrap()
                .last()
                .map(|(prompt, _)| prompt.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatBackend for FakeLlm {
        async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), system.to_string()));
            match self.fail_with {
                Some(status) => Err(LlmError::Api {
                    status,
                    body: "quota exceeded".to_string(),
                }),
                None => Ok("model says hi".to_string()),
            }
        }
    }

    /// Writes a fixed set of jobs into the store, like a completed scrape.
    pub struct FakeScraper {
        pub store: JobStore,
        pub jobs: Vec<JobRecord>,
        pub runs: AtomicUsize,
    }

    #[async_trait]
    impl JobScraper for FakeScraper {
        async fn scrape(&self, _keyword: &str, _location: &str) -> anyhow::Result<usize> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.jobs.is_empty() {
                self.store.save(&self.jobs).await?;
            }
            Ok(self.jobs.len())
        }
    }

    pub fn job(jk: &str, title: &str, company: &str, location: &str, keyword: &str) -> JobRecord {
        JobRecord {
            title: title.to_string(),
            job_title: title.to_string(),
            jk: jk.to_string(),
            company: company.to_string(),
            location: location.to_string(),
            canonical: format!("https://fr.indeed.com/viewjob?jk={jk}"),
            contract: Some(ContractType::Permanent),
            description: NOT_AVAILABLE.to_string(),
            keyword: keyword.to_string(),
        }
    }

    pub fn sample_jobs() -> Vec<JobRecord> {
        vec![
            job("a1", "Python Developer", "Acme", "Paris (75)", "python"),
            job("b2", "Data Engineer", "Globex", "Paris 9e", "python"),
            job("c3", "Backend Python", "Initech", "Lyon", "python"),
        ]
    }

    pub struct Harness {
        pub bridge: Arc<ToolBridge>,
        pub llm: Arc<FakeLlm>,
        pub scraper: Arc<FakeScraper>,
        pub store: JobStore,
        _dir: tempfile::TempDir,
    }

    pub async fn harness(stored: Vec<JobRecord>, scraped: Vec<JobRecord>, llm: FakeLlm) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().join("jobs_all.json"));
        if !stored.is_empty() {
            store.save(&stored).await.unwrap();
        }
        let scraper = Arc::new(FakeScraper {
            store: store.clone(),
            jobs: scraped,
            runs: AtomicUsize::new(0),
        });
        let llm = Arc::new(llm);
        let bridge = ToolBridge::new(
            JobSource::Scraped {
                scraper: scraper.clone(),
                store: store.clone(),
            },
            llm.clone(),
            UserProfile::default(),
        );
        Harness {
            bridge: Arc::new(bridge),
            llm,
            scraper,
            store,
            _dir: dir,
        }
    }
}
