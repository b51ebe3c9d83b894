//! The fixed tool set exposed to protocol clients, plus the two read-only resources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobscout_core::{JobRecord, ToolCall, UserProfile};
use jobscout_storage::{JobStore, JobsDb};
use jobscout_sync::{ScrapePipeline, DEFAULT_LOCATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::llm::{ChatBackend, LlmError};
use crate::prompts::{self, CoverLetterTone};

pub const PROFILE_URI: &str = "profile://user";
pub const JOBS_URI: &str = "jobs://database";

const SUMMARY_SAMPLE: usize = 15;
const BEST_MATCHES_SAMPLE: usize = 20;
const MATCH_DESCRIPTION_LIMIT: usize = 800;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },

    #[error("Invalid index {index}. {available} jobs available.")]
    InvalidIndex { index: i64, available: usize },

    #[error("Scrape failed: {0:#}")]
    Scrape(anyhow::Error),

    #[error("Job database error: {0:#}")]
    Database(anyhow::Error),

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ToolError {
    /// Failures of the bridge itself rather than of the requested operation.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Encode(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    SearchJobs,
    GetJobsSummary,
    AnalyzeJobMatch,
    GetBestMatches,
    GenerateCoverLetter,
    GetUserProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::SearchJobs,
        ToolName::GetJobsSummary,
        ToolName::AnalyzeJobMatch,
        ToolName::GetBestMatches,
        ToolName::GenerateCoverLetter,
        ToolName::GetUserProfile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchJobs => "search_jobs",
            Self::GetJobsSummary => "get_jobs_summary",
            Self::AnalyzeJobMatch => "analyze_job_match",
            Self::GetBestMatches => "get_best_matches",
            Self::GenerateCoverLetter => "generate_cover_letter",
            Self::GetUserProfile => "get_user_profile",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn descriptor(self) -> ToolDescriptor {
        let (description, input_schema) = match self {
            Self::SearchJobs => (
                "Scrape fresh job offers for a keyword and location and list the best hits",
                json!({
                    "type": "object",
                    "properties": {
                        "keyword": {"type": "string", "description": "Search keyword, e.g. 'Python Developer'"},
                        "location": {"type": "string", "description": "City or region", "default": DEFAULT_LOCATION}
                    },
                    "required": ["keyword"]
                }),
            ),
            Self::GetJobsSummary => (
                "Summarise the stored job offers with the LLM",
                json!({"type": "object", "properties": {}}),
            ),
            Self::AnalyzeJobMatch => (
                "Score how well the candidate profile fits one stored job offer",
                json!({
                    "type": "object",
                    "properties": {
                        "job_index": {"type": "integer", "minimum": 0, "description": "Index in the stored job list"}
                    },
                    "required": ["job_index"]
                }),
            ),
            Self::GetBestMatches => (
                "Rank the stored job offers that best fit the candidate profile",
                json!({
                    "type": "object",
                    "properties": {
                        "top_n": {"type": "integer", "minimum": 1, "default": 5}
                    }
                }),
            ),
            Self::GenerateCoverLetter => (
                "Draft a cover letter for one stored job offer",
                json!({
                    "type": "object",
                    "properties": {
                        "job_index": {"type": "integer", "minimum": 0},
                        "tone": {"type": "string", "enum": CoverLetterTone::NAMES, "default": "professional"}
                    },
                    "required": ["job_index"]
                }),
            ),
            Self::GetUserProfile => (
                "Look up a user profile by name in the job database",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Profile name, matched case-insensitively"}
                    },
                    "required": ["name"]
                }),
            ),
        };
        ToolDescriptor {
            name: self.as_str(),
            description,
            input_schema,
        }
    }
}

pub fn resource_descriptors() -> Vec<ResourceDescriptor> {
    vec![
        ResourceDescriptor {
            uri: PROFILE_URI,
            name: "User profile",
            description: "Candidate profile used for matching and cover letters",
            mime_type: "application/json",
        },
        ResourceDescriptor {
            uri: JOBS_URI,
            name: "Job database",
            description: "Currently stored job offers",
            mime_type: "application/json",
        },
    ]
}

/// Anything that can refresh the job store for a search.
#[async_trait]
pub trait JobScraper: Send + Sync {
    /// Returns the number of jobs written to the store.
    async fn scrape(&self, keyword: &str, location: &str) -> anyhow::Result<usize>;
}

#[async_trait]
impl JobScraper for ScrapePipeline {
    async fn scrape(&self, keyword: &str, location: &str) -> anyhow::Result<usize> {
        Ok(self.run_once(keyword, location).await?.scraped)
    }
}

pub enum JobSource {
    /// Live scraping into the JSON job store.
    Scraped {
        scraper: Arc<dyn JobScraper>,
        store: JobStore,
    },
    /// Pre-populated relational store; no scraping.
    Database(JobsDb),
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSettings {
    pub digest_limit: usize,
    pub scrape_timeout: Duration,
    /// How many of the newest database rows the AI tools index into.
    pub db_sample: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            digest_limit: 5,
            scrape_timeout: Duration::from_secs(120),
            db_sample: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchJobsArgs {
    keyword: String,
    #[serde(default = "default_location")]
    location: String,
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

#[derive(Debug, Deserialize)]
struct JobIndexArgs {
    job_index: i64,
}

#[derive(Debug, Deserialize)]
struct UserProfileArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BestMatchesArgs {
    #[serde(default = "default_top_n")]
    top_n: i64,
}

fn default_top_n() -> i64 {
    5
}

#[derive(Debug, Deserialize)]
struct CoverLetterArgs {
    job_index: i64,
    #[serde(default)]
    tone: CoverLetterTone,
}

#[derive(Serialize)]
struct JobBrief<'a> {
    title: &'a str,
    company: &'a str,
    contract: &'a str,
    location: &'a str,
}

#[derive(Serialize)]
struct IndexedBrief<'a> {
    index: usize,
    title: &'a str,
    company: &'a str,
}

#[derive(Serialize)]
struct JobForPrompt<'a> {
    title: &'a str,
    company: &'a str,
    location: &'a str,
    contract: &'a str,
    description: String,
}

impl<'a> JobForPrompt<'a> {
    fn new(job: &'a JobRecord, description_limit: Option<usize>) -> Self {
        let description = match description_limit {
            Some(limit) => job.description.chars().take(limit).collect(),
            None => job.description.clone(),
        };
        Self {
            title: job.display_title(),
            company: &job.company,
            location: &job.location,
            contract: job.contract_label(),
            description,
        }
    }
}

pub struct ToolBridge {
    source: JobSource,
    llm: Arc<dyn ChatBackend>,
    profile: UserProfile,
    settings: ToolSettings,
}

impl ToolBridge {
    pub fn new(source: JobSource, llm: Arc<dyn ChatBackend>, profile: UserProfile) -> Self {
        Self {
            source,
            llm,
            profile,
            settings: ToolSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ToolSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Profile lookups need the relational store.
    pub fn offers(&self, tool: ToolName) -> bool {
        match tool {
            ToolName::GetUserProfile => matches!(self.source, JobSource::Database(_)),
            _ => true,
        }
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        ToolName::ALL
            .into_iter()
            .filter(|tool| self.offers(*tool))
            .map(ToolName::descriptor)
            .collect()
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        resource_descriptors()
    }

    pub async fn read_resource(&self, uri: &str) -> Result<String, ToolError> {
        match uri {
            PROFILE_URI => Ok(serde_json::to_string_pretty(&self.profile)?),
            JOBS_URI => {
                let jobs = self.load_jobs().await?;
                Ok(serde_json::to_string_pretty(&jobs)?)
            }
            other => Err(ToolError::UnknownResource(other.to_string())),
        }
    }

    pub async fn call(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = ToolName::parse(&call.name)
            .filter(|tool| self.offers(*tool))
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        let span = info_span!("tool_call", tool = tool.as_str());
        let result = self.run_tool(tool, &call.arguments).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.in_scope(|| warn!(error = %err, "tool failed"));
        }
        result
    }

    async fn run_tool(&self, tool: ToolName, arguments: &Map<String, JsonValue>) -> Result<String, ToolError> {
        info!("calling tool");
        match tool {
            ToolName::SearchJobs => {
                let args: SearchJobsArgs = parse_args(tool, arguments)?;
                self.search_jobs(&args.keyword, &args.location).await
            }
            ToolName::GetJobsSummary => self.jobs_summary().await,
            ToolName::AnalyzeJobMatch => {
                let args: JobIndexArgs = parse_args(tool, arguments)?;
                self.analyze_job_match(args.job_index).await
            }
            ToolName::GetBestMatches => {
                let args: BestMatchesArgs = parse_args(tool, arguments)?;
                self.best_matches(args.top_n).await
            }
            ToolName::GenerateCoverLetter => {
                let args: CoverLetterArgs = parse_args(tool, arguments)?;
                self.cover_letter(args.job_index, args.tone).await
            }
            ToolName::GetUserProfile => {
                let args: UserProfileArgs = parse_args(tool, arguments)?;
                self.user_profile(&args.name).await
            }
        }
    }

    async fn load_jobs(&self) -> Result<Vec<JobRecord>, ToolError> {
        match &self.source {
            JobSource::Scraped { store, .. } => Ok(store.load().await),
            JobSource::Database(db) => {
                let rows = db
                    .recent(self.settings.db_sample)
                    .await
                    .map_err(ToolError::Database)?;
                Ok(rows.into_iter().map(|row| row.record).collect())
            }
        }
    }

    async fn search_jobs(&self, keyword: &str, location: &str) -> Result<String, ToolError> {
        let keyword = keyword.trim();
        let location = location.trim();
        if keyword.is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: ToolName::SearchJobs.as_str(),
                message: "keyword must not be empty".to_string(),
            });
        }

        let hits: Vec<JobRecord> = match &self.source {
            JobSource::Scraped { scraper, store } => {
                let scraped = tokio::time::timeout(self.settings.scrape_timeout, scraper.scrape(keyword, location))
                    .await
                    .map_err(|_| {
                        ToolError::Scrape(anyhow::anyhow!(
                            "timed out after {}s",
                            self.settings.scrape_timeout.as_secs()
                        ))
                    })?
                    .map_err(ToolError::Scrape)?;
                info!(scraped, "scrape finished");
                let stored = store.load().await;
                if scraped > 0 {
                    // the store now holds exactly this run's results
                    stored
                } else {
                    stored
                        .into_iter()
                        .filter(|job| {
                            (job.keyword.eq_ignore_ascii_case(keyword) || job.matches_keyword(keyword))
                                && job.matches_location(location)
                        })
                        .collect()
                }
            }
            JobSource::Database(db) => db
                .search(keyword, location)
                .await
                .map_err(ToolError::Database)?
                .into_iter()
                .map(|row| row.record)
                .collect(),
        };

        if hits.is_empty() {
            return Ok(format!("No jobs found for keyword '{keyword}' in location '{location}'."));
        }
        Ok(render_digest(&hits, keyword, location, self.settings.digest_limit))
    }

    async fn user_profile(&self, name: &str) -> Result<String, ToolError> {
        let JobSource::Database(db) = &self.source else {
            return Err(ToolError::UnknownTool(ToolName::GetUserProfile.as_str().to_string()));
        };
        let name = name.trim();
        match db.user_profile(name).await.map_err(ToolError::Database)? {
            Some(profile) => Ok(render_profile(&profile)),
            None => {
                info!(name, "profile not found");
                Ok(format!("User '{name}' not found in the database."))
            }
        }
    }

    async fn jobs_summary(&self) -> Result<String, ToolError> {
        let jobs = self.load_jobs().await?;
        if jobs.is_empty() {
            return Ok("No jobs stored yet. Run search_jobs first.".to_string());
        }
        let briefs: Vec<JobBrief<'_>> = jobs
            .iter()
            .take(SUMMARY_SAMPLE)
            .map(|job| JobBrief {
                title: job.display_title(),
                company: &job.company,
                contract: job.contract_label(),
                location: &job.location,
            })
            .collect();
        let prompt = prompts::summary_prompt(jobs.len(), &serde_json::to_string_pretty(&briefs)?);
        Ok(self.llm.complete(&prompt, prompts::SUMMARY_SYSTEM).await?)
    }

    async fn analyze_job_match(&self, index: i64) -> Result<String, ToolError> {
        let jobs = self.load_jobs().await?;
        let job = job_at(&jobs, index)?;
        let prompt = prompts::match_prompt(
            &serde_json::to_string_pretty(&self.profile)?,
            &serde_json::to_string_pretty(&JobForPrompt::new(job, Some(MATCH_DESCRIPTION_LIMIT)))?,
        );
        Ok(self.llm.complete(&prompt, prompts::MATCH_SYSTEM).await?)
    }

    async fn best_matches(&self, top_n: i64) -> Result<String, ToolError> {
        let jobs = self.load_jobs().await?;
        if jobs.is_empty() {
            return Ok("No jobs available. Run search_jobs first.".to_string());
        }
        let top_n = usize::try_from(top_n).unwrap_or(0).max(1);
        let briefs: Vec<IndexedBrief<'_>> = jobs
            .iter()
            .take(BEST_MATCHES_SAMPLE)
            .enumerate()
            .map(|(index, job)| IndexedBrief {
                index,
                title: job.display_title(),
                company: &job.company,
            })
            .collect();
        let prompt = prompts::best_matches_prompt(
            top_n,
            &serde_json::to_string_pretty(&self.profile)?,
            &serde_json::to_string_pretty(&briefs)?,
        );
        Ok(self.llm.complete(&prompt, prompts::BEST_MATCHES_SYSTEM).await?)
    }

    async fn cover_letter(&self, index: i64, tone: CoverLetterTone) -> Result<String, ToolError> {
        let jobs = self.load_jobs().await?;
        let job = job_at(&jobs, index)?;
        let prompt = prompts::cover_letter_prompt(
            tone,
            &serde_json::to_string_pretty(&self.profile)?,
            &serde_json::to_string_pretty(&JobForPrompt::new(job, None))?,
        );
        let letter = self.llm.complete(&prompt, prompts::COVER_LETTER_SYSTEM).await?;
        Ok(format!("{}{letter}", prompts::cover_letter_banner()))
    }
}

fn parse_args<T: DeserializeOwned>(tool: ToolName, arguments: &Map<String, JsonValue>) -> Result<T, ToolError> {
    serde_json::from_value(JsonValue::Object(arguments.clone())).map_err(|err| ToolError::InvalidArguments {
        tool: tool.as_str(),
        message: err.to_string(),
    })
}

fn job_at(jobs: &[JobRecord], index: i64) -> Result<&JobRecord, ToolError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| jobs.get(i))
        .ok_or(ToolError::InvalidIndex {
            index,
            available: jobs.len(),
        })
}

fn render_profile(profile: &UserProfile) -> String {
    format!(
        "User Profile:\n  Name: {}\n  Experience: {}\n  Education: {}\n  Location: {}\n  Skills: {}\n  Languages: {}\n  Interests: {}",
        profile.name,
        profile.experience,
        profile.education,
        profile.location,
        profile.skills.join(", "),
        profile.languages.join(", "),
        profile.interests.join(", "),
    )
}

fn render_digest(hits: &[JobRecord], keyword: &str, location: &str, limit: usize) -> String {
    let mut out = format!("Found {} job(s) for '{keyword}' in '{location}'\n", hits.len());
    for (i, job) in hits.iter().take(limit).enumerate() {
        out.push_str(&format!(
            "\n{}. {}\n   Company: {}\n   Location: {}\n   Contract: {}\n   Link: {}\n",
            i + 1,
            job.display_title(),
            job.company,
            job.location,
            job.contract_label(),
            job.canonical,
        ));
    }
    if hits.len() > limit {
        out.push_str(&format!("\n... and {} more\n", hits.len() - limit));
    }
    out
}
