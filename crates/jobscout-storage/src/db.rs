//! Read-only access to the pre-existing `jobs.db` SQLite database.

use std::path::Path;

use anyhow::Context;
use jobscout_core::{ContractType, JobRecord, UserProfile, NOT_AVAILABLE};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

const JOB_COLUMNS: &str =
    "title, job_title, jk, company, location, canonical, contract, description, created_at";

/// A job row together with its insertion timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredJob {
    pub record: JobRecord,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobsDb {
    pool: SqlitePool,
}

impl JobsDb {
    /// Open an existing database; the file is never created or migrated here.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("opening jobs database {}", path.display()))?;
        info!(path = %path.display(), "opened jobs database");
        Ok(Self { pool })
    }

    /// Keyword over title/job_title/company/description AND location, newest first.
    pub async fn search(&self, keyword: &str, location: &str) -> anyhow::Result<Vec<StoredJob>> {
        let keyword_pattern = format!("%{}%", keyword.trim());
        let location_pattern = format!("%{}%", location.trim());
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
              FROM jobs
             WHERE (LOWER(title) LIKE LOWER(?)
                OR LOWER(job_title) LIKE LOWER(?)
                OR LOWER(company) LIKE LOWER(?)
                OR LOWER(description) LIKE LOWER(?))
               AND LOWER(location) LIKE LOWER(?)
             ORDER BY created_at DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&keyword_pattern)
            .bind(&keyword_pattern)
            .bind(&keyword_pattern)
            .bind(&keyword_pattern)
            .bind(&location_pattern)
            .fetch_all(&self.pool)
            .await
            .context("searching jobs table")?;
        rows.iter().map(row_to_stored_job).collect()
    }

    pub async fn recent(&self, limit: usize) -> anyhow::Result<Vec<StoredJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("listing recent jobs")?;
        rows.iter().map(row_to_stored_job).collect()
    }

    pub async fn user_profile(&self, name: &str) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
            SELECT name, experience, education, location,
                   skills_json, languages_json, interests_json
              FROM user_profile
             WHERE LOWER(name) = LOWER(?)
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await
        .context("reading user_profile table")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(UserProfile {
            name: row.try_get("name")?,
            experience: optional_text(&row, "experience"),
            education: optional_text(&row, "education"),
            location: optional_text(&row, "location"),
            skills: json_list(&row, "skills_json"),
            languages: json_list(&row, "languages_json"),
            interests: json_list(&row, "interests_json"),
        }))
    }
}

fn optional_text(row: &SqliteRow, column: &str) -> String {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .unwrap_or_default()
}

fn text_or_sentinel(row: &SqliteRow, column: &str) -> String {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn json_list(row: &SqliteRow, column: &str) -> Vec<String> {
    let raw = optional_text(row, column);
    serde_json::from_str(&raw).unwrap_or_default()
}

fn row_to_stored_job(row: &SqliteRow) -> anyhow::Result<StoredJob> {
    let jk: Option<String> = row.try_get("jk").context("reading jk column")?;
    let contract = row
        .try_get::<Option<String>, _>("contract")
        .ok()
        .flatten()
        .and_then(|raw| ContractType::from_label(&raw));
    Ok(StoredJob {
        record: JobRecord {
            title: optional_text(row, "title"),
            job_title: text_or_sentinel(row, "job_title"),
            jk: jk.unwrap_or_default(),
            company: text_or_sentinel(row, "company"),
            location: text_or_sentinel(row, "location"),
            canonical: text_or_sentinel(row, "canonical"),
            contract,
            description: text_or_sentinel(row, "description"),
            keyword: String::new(),
        },
        created_at: row.try_get::<Option<String>, _>("created_at").ok().flatten(),
    })
}
