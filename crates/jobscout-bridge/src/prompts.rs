//! Prompt text for the AI-backed tools. Builders take already-serialized JSON
//! so the wording stays independent of the record types.

use serde::{Deserialize, Serialize};

/// Banner placed above every generated cover letter.
pub fn cover_letter_banner() -> String {
    format!("COVER LETTER\n{}\n\n", "=".repeat(50))
}

pub const SUMMARY_SYSTEM: &str = "You are an HR analyst specialised in the tech job market. \
    Summarise job offers factually and concisely.";

pub const MATCH_SYSTEM: &str = "You are a career advisor. Assess how well a candidate fits \
    a job offer. Be honest about gaps.";

pub const BEST_MATCHES_SYSTEM: &str = "You are a recruiter ranking job offers for one candidate. \
    Only rank the offers you are given.";

pub const COVER_LETTER_SYSTEM: &str = "You are an expert career coach. Write tailored, \
    plain-text cover letters without placeholders the candidate would have to fill in.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoverLetterTone {
    #[default]
    #[serde(rename = "professional", alias = "professionnel", alias = "Professional")]
    Professional,
    #[serde(rename = "enthusiastic", alias = "enthousiaste", alias = "Enthusiastic")]
    Enthusiastic,
    #[serde(rename = "creative", alias = "creatif", alias = "créatif", alias = "Creative")]
    Creative,
}

impl CoverLetterTone {
    pub const NAMES: [&'static str; 3] = ["professional", "enthusiastic", "creative"];

    pub fn guidance(self) -> &'static str {
        match self {
            Self::Professional => "formal and precise, focused on concrete experience",
            Self::Enthusiastic => "warm and energetic, showing genuine motivation for the company",
            Self::Creative => "original and memorable while staying credible",
        }
    }
}

pub fn summary_prompt(total: usize, briefs_json: &str) -> String {
    format!(
        "Here are {total} scraped job offers (showing at most 15):\n{briefs_json}\n\n\
         Produce a summary with:\n\
         - the main job types and seniority levels\n\
         - the companies that recruit the most\n\
         - the contract types observed\n\
         - notable trends in the required skills"
    )
}

pub fn match_prompt(profile_json: &str, job_json: &str) -> String {
    format!(
        "CANDIDATE PROFILE:\n{profile_json}\n\nJOB OFFER:\n{job_json}\n\n\
         Give a compatibility score from 0 to 100, the matching skills, \
         the missing skills and a short recommendation on whether to apply."
    )
}

pub fn best_matches_prompt(top_n: usize, profile_json: &str, jobs_json: &str) -> String {
    format!(
        "CANDIDATE PROFILE:\n{profile_json}\n\nJOB OFFERS (with their index):\n{jobs_json}\n\n\
         Pick the {top_n} offers that best fit the candidate. For each one give the index, \
         the title, the company, a score out of 100 and a one-sentence reason."
    )
}

pub fn cover_letter_prompt(tone: CoverLetterTone, profile_json: &str, job_json: &str) -> String {
    format!(
        "CANDIDATE PROFILE:\n{profile_json}\n\nJOB OFFER:\n{job_json}\n\n\
         Write a one-page cover letter for this offer. Tone: {}.\n\
         Highlight three or four strengths from the profile that match the offer \
         and finish with a short call to action.",
        tone.guidance()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_has_fifty_rule_characters() {
        let banner = cover_letter_banner();
        assert!(banner.starts_with("COVER LETTER\n"));
        assert!(banner.contains(&"=".repeat(50)));
        assert!(!banner.contains(&"=".repeat(51)));
    }

    #[test]
    fn tone_accepts_french_aliases() {
        let tone: CoverLetterTone = serde_json::from_str("\"enthousiaste\"").unwrap();
        assert_eq!(tone, CoverLetterTone::Enthusiastic);
        let tone: CoverLetterTone = serde_json::from_str("\"créatif\"").unwrap();
        assert_eq!(tone, CoverLetterTone::Creative);
        assert!(serde_json::from_str::<CoverLetterTone>("\"sarcastic\"").is_err());
    }

    #[test]
    fn prompts_embed_their_inputs() {
        let prompt = best_matches_prompt(3, "{\"name\":\"Alex\"}", "[]");
        assert!(prompt.contains("Pick the 3 offers"));
        assert!(prompt.contains("\"name\":\"Alex\""));
        assert!(cover_letter_prompt(CoverLetterTone::Creative, "{}", "{}").contains("original"));
    }
}
