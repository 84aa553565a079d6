//! Newsletter scraping: finding issues and reading their publication lists.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Fetching** ([`issues`], [`feed`]): discover issue pages, either by
//!    requesting the next sequential issue URL until the site answers 404, or by
//!    reading the newsletter's RSS feed
//! 2. **Extraction** ([`sections`]): locate the publications section of an
//!    issue page and turn its links into [`crate::models::Publication`]s
//!
//! Issue numbers are read from page URLs and file names, which always end in
//! one of the slugs below followed by the number.

pub mod feed;
pub mod issues;
pub mod sections;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::info;

static ISSUE_SLUG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:issue-|this-week-in-mathonco-|this-week-in-math-onco-)(\d+)").unwrap()
});

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no issue number found in {0:?}")]
    UnrecognizedIssueName(String),
    #[error("no issue number follows {0}")]
    NoNextIssue(u32),
    #[error("GET {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Issue number in an issue URL or HTML file name.
///
/// When several slugs match, the last one wins.
pub fn issue_number_from_name(name: &str) -> Result<u32, FetchError> {
    let number = ISSUE_SLUG
        .captures_iter(name)
        .last()
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| FetchError::UnrecognizedIssueName(name.to_string()))?;
    info!(input = name, number, "Parsed issue number");
    Ok(number)
}
