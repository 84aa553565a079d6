//! Issue page fetching.
//!
//! New issues are discovered by guessing: issue pages live at sequential
//! URLs, so the next issue exists exactly when its URL does not answer 404.

use super::FetchError;
use crate::config::NewsletterConfig;
use reqwest::{Client, StatusCode};
use std::error::Error;
use tracing::{debug, info, instrument};

/// An issue page that was found online.
#[derive(Debug, Clone)]
pub struct FetchedIssue {
    pub number: u32,
    pub url: String,
    pub html: String,
}

/// HTTP client for newsletter pages.
#[derive(Debug, Clone)]
pub struct IssueFetcher {
    client: Client,
    newsletter: NewsletterConfig,
}

impl IssueFetcher {
    pub fn new(newsletter: NewsletterConfig) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder()
            .user_agent(newsletter.user_agent.clone())
            .build()?;
        Ok(Self { client, newsletter })
    }

    pub fn newsletter(&self) -> &NewsletterConfig {
        &self.newsletter
    }

    /// GET a page, failing on any non-success status.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_page(&self, url: &str) -> Result<String, Box<dyn Error>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            }
            .into());
        }
        let html = response.text().await?;
        debug!(bytes = html.len(), "Fetched page");
        Ok(html)
    }

    /// Fetch issue `number`, or `None` when it does not exist (yet).
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_issue(&self, number: u32) -> Result<Option<FetchedIssue>, Box<dyn Error>> {
        let url = self.newsletter.issue_url(number);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status { url, status }.into());
        }
        let html = response.text().await?;
        info!(number, %url, bytes = html.len(), "New issue found");
        Ok(Some(FetchedIssue { number, url, html }))
    }

    /// The issue right after `latest`, if it has been published.
    pub async fn next_issue(&self, latest: u32) -> Result<Option<FetchedIssue>, Box<dyn Error>> {
        let number = latest
            .checked_add(1)
            .ok_or(FetchError::NoNextIssue(latest))?;
        let next = self.fetch_issue(number).await?;
        if next.is_none() {
            info!(latest, "No new issue found");
        }
        Ok(next)
    }
}
