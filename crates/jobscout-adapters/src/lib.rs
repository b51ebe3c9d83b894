//! Job board adapter contract plus the Indeed listing/detail extractors.
//!
//! Extraction never fails on markup shape: every lookup is optional and an
//! absent value falls back to the next source or to a sentinel.

use async_trait::async_trait;
use jobscout_core::{ContractType, JobRecord, NOT_AVAILABLE};
use jobscout_storage::{FetchError, HttpFetcher};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "jobscout-adapters";

pub const INDEED_SOURCE_ID: &str = "indeed";

/// Results per search page; the board paginates with `start` in steps of this.
pub const RESULTS_PER_PAGE: usize = 10;

/// Description containers tried in order before falling back to paragraphs.
const DESCRIPTION_SELECTORS: &[&str] = &[
    "#jobDescriptionText",
    "[data-testid=\"jobDescriptionText\"]",
    "[id*=\"jobDescription\"]",
    "[class*=\"jobDescription\"]",
    "[id*=\"job-description\"]",
    "[class*=\"job-description\"]",
    "[itemprop=\"description\"]",
    "[role=\"main\"]",
    "main",
    "article",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "br", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "tr", "table",
];

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
    pub location: String,
    pub page: usize,
}

/// One job card from a search-results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub title: String,
    pub jk: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn listing_url(&self, query: &SearchQuery) -> Result<String, AdapterError>;

    fn detail_url(&self, jk: &str) -> Result<String, AdapterError>;

    fn parse_listing(&self, page: &FetchedPage) -> Vec<ListingEntry>;

    fn parse_detail(&self, page: &FetchedPage, entry: &ListingEntry, keyword: &str) -> JobRecord;

    async fn fetch_listing(
        &self,
        http: &HttpFetcher,
        query: &SearchQuery,
    ) -> Result<FetchedPage, AdapterError> {
        let url = self.listing_url(query)?;
        let resp = http.fetch(&url, false).await?;
        Ok(FetchedPage {
            url: resp.final_url,
            status: resp.status.as_u16(),
            body: resp.body,
        })
    }

    /// `None` when the board answers 404 for this job.
    async fn fetch_detail(
        &self,
        http: &HttpFetcher,
        entry: &ListingEntry,
    ) -> Result<Option<FetchedPage>, AdapterError> {
        let url = self.detail_url(&entry.jk)?;
        let resp = http.fetch(&url, true).await?;
        if resp.is_not_found() {
            warn!(jk = %entry.jk, url = %url, "job detail page not found");
            return Ok(None);
        }
        Ok(Some(FetchedPage {
            url: resp.final_url,
            status: resp.status.as_u16(),
            body: resp.body,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct IndeedAdapter {
    base_url: Url,
}

impl IndeedAdapter {
    pub fn new(base_url: &str) -> Result<Self, AdapterError> {
        let base_url =
            Url::parse(base_url).map_err(|e| AdapterError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, AdapterError> {
        self.base_url
            .join(path)
            .map_err(|e| AdapterError::InvalidUrl(format!("{path}: {e}")))
    }
}

#[async_trait]
impl SourceAdapter for IndeedAdapter {
    fn source_id(&self) -> &'static str {
        INDEED_SOURCE_ID
    }

    fn listing_url(&self, query: &SearchQuery) -> Result<String, AdapterError> {
        let mut url = self.endpoint("/jobs")?;
        url.query_pairs_mut()
            .append_pair("q", &query.keyword)
            .append_pair("l", &query.location)
            .append_pair("start", &(query.page * RESULTS_PER_PAGE).to_string());
        Ok(url.to_string())
    }

    fn detail_url(&self, jk: &str) -> Result<String, AdapterError> {
        let mut url = self.endpoint("/viewjob")?;
        url.query_pairs_mut().append_pair("jk", jk);
        Ok(url.to_string())
    }

    fn parse_listing(&self, page: &FetchedPage) -> Vec<ListingEntry> {
        parse_listing_html(&page.body)
    }

    fn parse_detail(&self, page: &FetchedPage, entry: &ListingEntry, keyword: &str) -> JobRecord {
        parse_detail_html(&page.body, entry, keyword, &self.base_url)
    }
}

/// Every element carrying `data-jk` becomes an entry; blank titles are dropped.
pub fn parse_listing_html(html: &str) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let Some(sel) = selector("[data-jk]") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|node| {
            let jk = node.value().attr("data-jk")?.trim().to_string();
            let title = normalize_inline(&visible_text(node));
            if title.is_empty() || jk.is_empty() {
                debug!(jk = %jk, "skipping job card without title");
                return None;
            }
            Some(ListingEntry { title, jk })
        })
        .collect()
}

pub fn parse_detail_html(html: &str, entry: &ListingEntry, keyword: &str, base_url: &Url) -> JobRecord {
    let document = Html::parse_document(html);

    let page_title = select_first(&document, "title")
        .map(|n| normalize_inline(&visible_text(n)))
        .unwrap_or_default();
    let mut title_parts = page_title.split(" - ").map(str::trim);
    let job_title = title_parts.next().and_then(non_empty);
    let location = title_parts.next().and_then(non_empty);

    let canonical_href = select_first_attr(&document, "link[rel=\"canonical\"]", "href")
        .and_then(|href| resolve_url(base_url, &href));
    let share_href = select_first_attr(&document, "meta[property=\"og:url\"]", "content")
        .and_then(|href| resolve_url(base_url, &href));

    let jk = canonical_href
        .as_ref()
        .and_then(jk_param)
        .or_else(|| share_href.as_ref().and_then(jk_param))
        .unwrap_or_else(|| entry.jk.clone());

    let canonical = canonical_href
        .or(share_href)
        .map(|u| u.to_string())
        .or_else(|| {
            let mut url = base_url.join("/viewjob").ok()?;
            url.query_pairs_mut().append_pair("jk", &jk);
            Some(url.to_string())
        })
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let company = select_first_attr(&document, "meta[property=\"og:description\"]", "content")
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let paragraphs = select_all_texts(&document, "p");
    let contract = detect_contract(&paragraphs.join(" "));
    let description = extract_description(&document, &paragraphs);

    JobRecord {
        title: entry.title.clone(),
        job_title: job_title.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        jk,
        company,
        location: location.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        canonical,
        contract,
        description,
        keyword: keyword.to_string(),
    }
}

/// Earliest whole-word contract label in `text`; ties go to declaration order.
pub fn detect_contract(text: &str) -> Option<ContractType> {
    let mut best: Option<(usize, ContractType)> = None;
    for kind in ContractType::ALL {
        for label in kind.labels() {
            let Some(pos) = find_whole_word(text, label) else {
                continue;
            };
            if best.map_or(true, |(best_pos, _)| pos < best_pos) {
                best = Some((pos, kind));
            }
        }
    }
    best.map(|(_, kind)| kind)
}

fn find_whole_word(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn extract_description(document: &Html, paragraphs: &[String]) -> String {
    if let Some(desc) = structured_data_description(document) {
        return desc;
    }

    for css in DESCRIPTION_SELECTORS {
        if let Some(text) = select_first(document, css)
            .map(|n| normalize_block(&visible_text(n)))
            .and_then(non_empty)
        {
            debug!(selector = css, "description from selector");
            return text;
        }
    }

    if !paragraphs.is_empty() {
        return paragraphs.join("\n");
    }

    select_first(document, "body")
        .map(|n| normalize_block(&visible_text(n)))
        .and_then(non_empty)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// `description` from the first JSON-LD block that has one (object, or first list item with one).
fn structured_data_description(document: &Html) -> Option<String> {
    let sel = selector("script[type=\"application/ld+json\"]")?;
    document.select(&sel).find_map(|node| {
        let raw = node.text().collect::<String>();
        let value: JsonValue = match serde_json::from_str(raw.trim()) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "skipping unparsable JSON-LD block");
                return None;
            }
        };
        match &value {
            JsonValue::Array(items) => items.iter().find_map(json_description),
            other => json_description(other),
        }
    })
}

fn json_description(value: &JsonValue) -> Option<String> {
    value
        .get("description")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .and_then(non_empty)
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(err) => {
            warn!(selector = css, error = %err, "invalid selector");
            None
        }
    }
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    document.select(&sel).next()
}

fn select_first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    select_first(document, css)
        .and_then(|n| n.value().attr(attr))
        .map(str::trim)
        .and_then(non_empty)
}

fn select_all_texts(document: &Html, css: &str) -> Vec<String> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|n| non_empty(normalize_inline(&visible_text(n))))
        .collect()
}

/// Text of `element` minus script/style content, with block boundaries as newlines.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        if let Some(el) = node.value().as_element() {
            if BLOCK_ELEMENTS.contains(&el.name()) {
                out.push('\n');
            }
            continue;
        }
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| HIDDEN_ELEMENTS.contains(&e.name())))
            .unwrap_or(false);
        if !hidden {
            out.push_str(text);
        }
    }
    out
}

fn normalize_inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_block(text: &str) -> String {
    text.lines()
        .map(normalize_inline)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn non_empty<S: AsRef<str>>(value: S) -> Option<String> {
    let trimmed = value.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    Url::parse(href).or_else(|_| base.join(href)).ok()
}

fn jk_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == "jk")
        .and_then(|(_, v)| non_empty(v))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::*;

    const BASE: &str = "https://fr.indeed.com";

    fn fixture(name: &str) -> String {
        let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/indeed")
            .join(name);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
    }

    fn adapter() -> IndeedAdapter {
        IndeedAdapter::new(BASE).unwrap()
    }

    fn page(body: String) -> FetchedPage {
        FetchedPage {
            url: format!("{BASE}/viewjob"),
            status: 200,
            body,
        }
    }

    fn entry(jk: &str) -> ListingEntry {
        ListingEntry {
            title: "Listing title".to_string(),
            jk: jk.to_string(),
        }
    }

    #[test]
    fn urls_carry_query_and_pagination_offset() {
        let adapter = adapter();
        let url = adapter
            .listing_url(&SearchQuery {
                keyword: "Python Developer".into(),
                location: "Paris".into(),
                page: 2,
            })
            .unwrap();
        assert_eq!(url, "https://fr.indeed.com/jobs?q=Python+Developer&l=Paris&start=20");
        assert_eq!(
            adapter.detail_url("4f1c2a9be0d3a711").unwrap(),
            "https://fr.indeed.com/viewjob?jk=4f1c2a9be0d3a711"
        );
        assert!(IndeedAdapter::new("not a url").is_err());
    }

    #[test]
    fn listing_extracts_titles_and_keys_in_order() {
        let entries = adapter().parse_listing(&page(fixture("listing.html")));
        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    title: "Développeur Python H/F".into(),
                    jk: "4f1c2a9be0d3a711".into()
                },
                ListingEntry {
                    title: "Data Engineer Python / Airflow".into(),
                    jk: "9a0e77c3d21b5f40".into()
                },
                ListingEntry {
                    title: "Stage - Développeur Backend Python".into(),
                    jk: "b7d5e3c1a9f80264".into()
                },
            ]
        );
    }

    #[test]
    fn listing_without_job_cards_is_empty() {
        assert!(parse_listing_html("<html><body><p>Aucun résultat</p></body></html>").is_empty());
    }

    #[test]
    fn structured_data_description_wins_over_selectors() {
        let record = adapter().parse_detail(&page(fixture("detail_jsonld.html")), &entry("listing-jk"), "python");
        assert_eq!(
            record.description,
            "Rejoignez notre équipe data pour construire des API en Python et Docker."
        );
        assert_eq!(record.job_title, "Développeur Python H/F");
        assert_eq!(record.location, "Paris (75)");
        assert_eq!(record.jk, "4f1c2a9be0d3a711");
        assert_eq!(
            record.canonical,
            "https://fr.indeed.com/viewjob?jk=4f1c2a9be0d3a711&from=serp"
        );
        assert_eq!(record.company, "Datalys");
        assert_eq!(record.contract, Some(ContractType::Permanent));
        assert_eq!(record.title, "Listing title");
        assert_eq!(record.keyword, "python");
    }

    #[test]
    fn description_selector_beats_paragraph_fallback() {
        let record = adapter().parse_detail(&page(fixture("detail_selector.html")), &entry("listing-jk"), "data");
        assert_eq!(record.description, "Vous concevez des pipelines Airflow.\nPython\nSQL");
        assert_eq!(record.jk, "9a0e77c3d21b5f40");
        assert_eq!(record.canonical, "https://fr.indeed.com/viewjob?jk=9a0e77c3d21b5f40");
        assert_eq!(record.company, "Globex Analytics");
        assert_eq!(record.location, "Paris 9e");
        assert_eq!(record.contract, Some(ContractType::Freelance));
    }

    #[test]
    fn paragraphs_are_used_when_no_container_matches() {
        let record = adapter().parse_detail(&page(fixture("detail_paragraphs.html")), &entry("listing-jk"), "django");
        assert_eq!(
            record.description,
            "We are looking for an Internship candidate who knows Django.\nApprenticeship also possible."
        );
        assert_eq!(record.job_title, "Backend Intern");
        assert_eq!(record.location, NOT_AVAILABLE);
        assert_eq!(record.jk, "b7d5e3c1a9f80264");
        assert_eq!(record.canonical, "https://fr.indeed.com/viewjob?jk=b7d5e3c1a9f80264");
        assert_eq!(record.company, NOT_AVAILABLE);
        assert_eq!(record.contract, Some(ContractType::Internship));
    }

    #[test]
    fn bare_page_yields_sentinels_instead_of_errors() {
        let record = adapter().parse_detail(&page(fixture("detail_bare.html")), &entry("0a1b2c3d"), "python");
        assert_eq!(record.job_title, NOT_AVAILABLE);
        assert_eq!(record.location, NOT_AVAILABLE);
        assert_eq!(record.company, NOT_AVAILABLE);
        assert_eq!(record.description, NOT_AVAILABLE);
        assert_eq!(record.contract, None);
        assert_eq!(record.jk, "0a1b2c3d");
        assert_eq!(record.canonical, "https://fr.indeed.com/viewjob?jk=0a1b2c3d");
    }

    #[test]
    fn share_url_stands_in_for_a_missing_canonical_link() {
        let html = r#"<html><head>
            <meta property="og:url" content="https://fr.indeed.com/viewjob?jk=5e6f7a8b&amp;tk=share">
            </head><body><p>Poste en CDI.</p></body></html>"#;
        let record = parse_detail_html(html, &entry("listing-jk"), "rust", adapter().base_url());
        assert_eq!(record.jk, "5e6f7a8b");
        assert_eq!(record.canonical, "https://fr.indeed.com/viewjob?jk=5e6f7a8b&tk=share");
    }

    #[test]
    fn garbage_input_never_panics() {
        for html in ["", "<script type=\"application/ld+json\">{broken</script>", "<p></p><p>   </p>"] {
            let record = parse_detail_html(html, &entry("x1"), "k", adapter().base_url());
            assert_eq!(record.jk, "x1");
            assert_eq!(record.description, NOT_AVAILABLE);
        }
    }

    #[test]
    fn body_text_is_last_resort_and_skips_scripts() {
        let html = "<html><body><span>Remote friendly</span><script>track()</script></body></html>";
        let record = parse_detail_html(html, &entry("x1"), "k", adapter().base_url());
        assert_eq!(record.description, "Remote friendly");
    }

    #[test]
    fn contract_detection_prefers_earliest_whole_word() {
        assert_eq!(detect_contract("Poste en CDD puis CDI"), Some(ContractType::FixedTerm));
        assert_eq!(detect_contract("Mission Intérim de 3 mois"), Some(ContractType::Interim));
        assert_eq!(detect_contract("Alternance"), Some(ContractType::Apprenticeship));
        assert_eq!(detect_contract("Stagecoach drivers wanted"), None);
        assert_eq!(detect_contract("CDIs et autres"), None);
        assert_eq!(detect_contract(""), None);
    }
}
