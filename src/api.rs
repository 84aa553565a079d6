//! Bibliographic metadata lookup through CrossRef and the DOI resolver.
//!
//! # Architecture
//!
//! - [`MetadataSource`]: the two lookups the enrichment pass needs, title to
//!   DOI and DOI to formatted citation
//! - [`CrossrefClient`]: the HTTP implementation
//! - [`enrich_issue`]: runs every publication of an issue through a source,
//!   one request at a time
//!
//! # Matching
//!
//! Search results are compared with the wanted title after lowercasing and
//! dropping whitespace, using the Ratcliff/Obershelp ratio of
//! [`sequence_ratio`]. The first candidate scoring strictly above the
//! configured threshold wins; the search gives up after the configured number
//! of candidates. There is no retry: transport errors abort the caller.

use crate::config::CrossrefConfig;
use crate::models::{Issue, Publication};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Results requested per search page.
const PAGE_SIZE: usize = 100;

/// Title to DOI and DOI to citation lookups.
pub trait MetadataSource {
    /// Best-effort DOI for a paper title, `None` when nothing matches.
    async fn find_doi(&self, title: &str) -> Result<Option<String>, Box<dyn Error>>;

    /// Citation text for `doi` in `format` (`bibtex`, `ris`, a CSL style, ...).
    async fn formatted_citation(&self, doi: &str, format: &str) -> Result<String, Box<dyn Error>>;
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<WorkItem>,
}

#[derive(Debug, Deserialize)]
struct WorkItem {
    #[serde(rename = "DOI")]
    doi: String,
    #[serde(default)]
    title: Vec<String>,
}

/// Lowercase and drop all whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Similarity of a candidate title to the wanted one, in `[0, 1]`, after
/// normalization.
pub fn title_similarity(candidate: &str, wanted: &str) -> f64 {
    sequence_ratio(&normalize_title(candidate), &normalize_title(wanted))
}

/// Ratcliff/Obershelp ratio `2 * M / T`.
///
/// `M` counts the characters of the matching blocks found by taking the
/// longest common run and recursing on both sides of it; `T` is the total
/// length. When `b` has 200 or more characters, characters making up more
/// than 1% of it cannot start a match.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }
    if b.len() >= 200 {
        let popular = b.len() / 100 + 1;
        b2j.retain(|_, positions| positions.len() <= popular);
    }

    let mut matched = 0;
    let mut ranges = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = ranges.pop() {
        let (i, j, k) = longest_match(a, b, &b2j, (alo, ahi), (blo, bhi));
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            ranges.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            ranges.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`,
/// earliest in `a` on ties.
fn longest_match(
    a: &[char],
    b: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    let mut run_ending_at: HashMap<usize, usize> = HashMap::new();

    for i in alo..ahi {
        let mut next: HashMap<usize, usize> = HashMap::new();
        for &j in b2j.get(&a[i]).map(Vec::as_slice).unwrap_or_default() {
            if j < blo {
                continue;
            }
            if j >= bhi {
                break;
            }
            let len = j
                .checked_sub(1)
                .and_then(|prev| run_ending_at.get(&prev))
                .copied()
                .unwrap_or(0)
                + 1;
            next.insert(j, len);
            if len > best_len {
                (best_i, best_j, best_len) = (i + 1 - len, j + 1 - len, len);
            }
        }
        run_ending_at = next;
    }

    // popular characters were skipped above; let the run grow over them
    while best_i > alo && best_j > blo && a[best_i - 1] == b[best_j - 1] {
        best_i -= 1;
        best_j -= 1;
        best_len += 1;
    }
    while best_i + best_len < ahi
        && best_j + best_len < bhi
        && a[best_i + best_len] == b[best_j + best_len]
    {
        best_len += 1;
    }
    (best_i, best_j, best_len)
}

/// `Accept` header asking the DOI resolver for `format`.
///
/// Names that are not a known media type are treated as CSL style names.
pub fn accept_header(format: &str) -> String {
    let media_type = match format {
        "bibtex" => "application/x-bibtex",
        "ris" => "application/x-research-info-systems",
        "citeproc-json" => "application/vnd.citationstyles.csl+json",
        "rdf-xml" => "application/rdf+xml",
        "turtle" => "text/turtle",
        "crossref-xml" => "application/vnd.crossref.unixref+xml",
        "datacite-xml" => "application/vnd.datacite.datacite+xml",
        "text" => "text/x-bibliography",
        style => return format!("text/x-bibliography; style={style}"),
    };
    media_type.to_string()
}

/// CrossRef REST API and DOI content negotiation over HTTP.
#[derive(Debug, Clone)]
pub struct CrossrefClient {
    client: Client,
    config: CrossrefConfig,
}

impl CrossrefClient {
    pub fn new(config: CrossrefConfig) -> Result<Self, Box<dyn Error>> {
        let user_agent = match &config.contact_email {
            Some(email) => format!("{}/{} (mailto:{})", config.app_name, config.app_version, email),
            None => format!("{}/{}", config.app_name, config.app_version),
        };
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client, config })
    }

    fn search_url(&self, title: &str, offset: usize, rows: usize) -> String {
        let mut url = format!(
            "{}/works?query.bibliographic={}&select=DOI,title&rows={}&offset={}",
            self.config.api_base.trim_end_matches('/'),
            urlencoding::encode(title),
            rows,
            offset
        );
        if let Some(email) = &self.config.contact_email {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url
    }

    async fn search_page(
        &self,
        title: &str,
        offset: usize,
        rows: usize,
    ) -> Result<Vec<WorkItem>, Box<dyn Error>> {
        let url = self.search_url(title, offset, rows);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = response.text().await?;
        let works: WorksResponse = serde_json::from_str(&body)?;
        Ok(works.message.items)
    }
}

impl MetadataSource for CrossrefClient {
    #[instrument(level = "info", skip(self))]
    async fn find_doi(&self, title: &str) -> Result<Option<String>, Box<dyn Error>> {
        let mut inspected = 0usize;

        while inspected < self.config.max_candidates {
            let rows = PAGE_SIZE.min(self.config.max_candidates - inspected);
            let items = self.search_page(title, inspected, rows).await?;
            if items.is_empty() {
                break;
            }

            for item in items.into_iter().take(rows) {
                inspected += 1;
                let Some(candidate) = item.title.first() else {
                    warn!(doi = %item.doi, "Candidate has no title");
                    continue;
                };
                let ratio = title_similarity(candidate, title);
                debug!(doi = %item.doi, ratio, "Candidate");
                if ratio > self.config.similarity_threshold {
                    info!(doi = %item.doi, ratio, "Found DOI");
                    return Ok(Some(item.doi));
                }
            }
        }

        info!(inspected, "DOI not found");
        Ok(None)
    }

    #[instrument(level = "info", skip(self))]
    async fn formatted_citation(&self, doi: &str, format: &str) -> Result<String, Box<dyn Error>> {
        let doi = doi.strip_prefix('/').unwrap_or(doi);
        let url = format!("{}/{}", self.config.doi_resolver.trim_end_matches('/'), doi);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, accept_header(format))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Look up the DOI and citation of every publication in `issue`.
///
/// Publications without a match keep `DOI` and the citation empty.
#[instrument(level = "info", skip(source, issue), fields(issue = issue.number))]
pub async fn enrich_issue<S: MetadataSource>(
    source: &S,
    issue: Issue,
    format: &str,
) -> Result<Issue, Box<dyn Error>> {
    let t0 = Instant::now();
    let number = issue.number;

    let publications: Vec<Publication> = stream::iter(issue.publications)
        .then(|mut publication| async move {
            info!(title = %publication.title, "Retrieving DOI");
            publication.doi = source.find_doi(&publication.title).await?;
            let citation = match &publication.doi {
                Some(doi) => Some(source.formatted_citation(doi, format).await?),
                None => None,
            };
            publication.set_citation(format, citation);
            Ok::<_, Box<dyn Error>>(publication)
        })
        .try_collect()
        .await?;

    let matched = publications.iter().filter(|p| p.doi.is_some()).count();
    info!(
        total = publications.len(),
        matched,
        elapsed_ms = t0.elapsed().as_millis() as u128,
        "Enriched issue"
    );
    Ok(Issue::new(number, publications))
}
