//! Core job model shared by the scraper, the stores and the tool bridge.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const CRATE_NAME: &str = "jobscout-core";

/// Placeholder rendered for any text field the page did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder rendered for a job without a recognizable contract label.
pub const UNSPECIFIED: &str = "unspecified";

/// Contract categories recognized on job detail pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Permanent,
    FixedTerm,
    Freelance,
    Internship,
    Interim,
    Apprenticeship,
}

impl ContractType {
    /// Declaration order doubles as the tie-break order during detection.
    pub const ALL: [ContractType; 6] = [
        ContractType::Permanent,
        ContractType::FixedTerm,
        ContractType::Freelance,
        ContractType::Internship,
        ContractType::Interim,
        ContractType::Apprenticeship,
    ];

    /// Labels as they appear on the board, French first.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            ContractType::Permanent => &["CDI", "Permanent"],
            ContractType::FixedTerm => &["CDD", "Fixed-term", "Fixed term"],
            ContractType::Freelance => &["Freelance", "Indépendant"],
            ContractType::Internship => &["Stage", "Internship"],
            ContractType::Interim => &["Intérim", "Interim"],
            ContractType::Apprenticeship => &["Alternance", "Apprenticeship"],
        }
    }

    pub fn label(self) -> &'static str {
        self.labels()[0]
    }

    /// Maps a stored label (either language, any case) back to its category.
    pub fn from_label(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|kind| {
            kind.labels()
                .iter()
                .any(|label| label.to_lowercase() == needle)
        })
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One scraped job posting. `jk` is the board-assigned key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub title: String,
    pub job_title: String,
    pub jk: String,
    pub company: String,
    pub location: String,
    pub canonical: String,
    pub contract: Option<ContractType>,
    pub description: String,
    pub keyword: String,
}

impl JobRecord {
    /// Listing title when present, detail-page title otherwise.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() || self.title == NOT_AVAILABLE {
            &self.job_title
        } else {
            &self.title
        }
    }

    pub fn contract_label(&self) -> &'static str {
        self.contract.map(ContractType::label).unwrap_or(UNSPECIFIED)
    }

    /// Case-insensitive keyword match over the text fields a searcher cares about.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [&self.title, &self.job_title, &self.company, &self.description]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    pub fn matches_location(&self, location: &str) -> bool {
        let needle = location.trim().to_lowercase();
        needle.is_empty() || self.location.to_lowercase().contains(&needle)
    }
}

/// The candidate every compatibility analysis is run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "Alex Martin".to_string(),
            skills: ["Python", "Docker", "n8n", "Automation", "AI/ML", "Git"]
                .map(String::from)
                .to_vec(),
            experience: "Junior - 2 years".to_string(),
            education: "Bachelor in Computer Science".to_string(),
            languages: ["French", "English"].map(String::from).to_vec(),
            location: "Paris".to_string(),
            interests: ["DevOps", "Data Engineering", "AI Development"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// A single tool invocation received from a protocol client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, JsonValue>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: JsonValue) -> Self {
        let arguments = match arguments {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord {
            title: "Développeur Python".into(),
            job_title: "Développeur Python H/F".into(),
            jk: "abc123".into(),
            company: "Acme".into(),
            location: "Paris (75)".into(),
            canonical: "https://www.indeed.com/viewjob?jk=abc123".into(),
            contract: Some(ContractType::Permanent),
            description: "Build data pipelines with Docker.".into(),
            keyword: "python".into(),
        }
    }

    #[test]
    fn contract_serializes_as_snake_case_and_null() {
        let mut job = record();
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["contract"], "permanent");

        job.contract = None;
        let value = serde_json::to_value(&job).unwrap();
        assert!(value["contract"].is_null());
        assert_eq!(job.contract_label(), UNSPECIFIED);
    }

    #[test]
    fn contract_labels_map_back_in_both_languages() {
        assert_eq!(ContractType::from_label("CDD"), Some(ContractType::FixedTerm));
        assert_eq!(ContractType::from_label("internship"), Some(ContractType::Internship));
        assert_eq!(ContractType::from_label("intérim"), Some(ContractType::Interim));
        assert_eq!(ContractType::from_label("  "), None);
        assert_eq!(ContractType::from_label("Volunteer"), None);
    }

    #[test]
    fn keyword_and_location_matching_is_case_insensitive() {
        let job = record();
        assert!(job.matches_keyword("PYTHON"));
        assert!(job.matches_keyword("docker"));
        assert!(!job.matches_keyword("rust"));
        assert!(job.matches_location("paris"));
        assert!(!job.matches_location("Lyon"));
        assert!(job.matches_location(""));
    }

    #[test]
    fn tool_call_ignores_non_object_arguments() {
        let call = ToolCall::new("get_jobs_summary", JsonValue::Null);
        assert!(call.arguments.is_empty());
        let call = ToolCall::new("analyze_job_match", serde_json::json!({"job_index": 2}));
        assert_eq!(call.arguments["job_index"], 2);
    }
}
