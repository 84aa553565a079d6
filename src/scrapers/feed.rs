//! RSS feed discovery of new issues.
//!
//! An alternative to requesting sequential URLs: the newsletter feed lists recent posts, and
//! every post whose link carries an issue slug is an issue.

use super::issue_number_from_name;
use super::issues::IssueFetcher;
use chrono::{DateTime, FixedOffset};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    title: Option<String>,
    link: String,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
}

/// A newsletter issue announced by the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedIssue {
    pub number: u32,
    pub url: String,
    pub title: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
}

/// Issues listed in an RSS document, ascending by number.
///
/// Posts whose link is not an issue page are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedIssue>, Box<dyn Error>> {
    let rss: Rss = from_str(xml)?;

    let mut issues: Vec<FeedIssue> = rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let Ok(number) = issue_number_from_name(&item.link) else {
                debug!(link = %item.link, "Feed item is not an issue");
                return None;
            };
            let published = item.pub_date.as_deref().and_then(|date| {
                DateTime::parse_from_rfc2822(date)
                    .inspect_err(|e| warn!(number, date, error = %e, "Unreadable pubDate"))
                    .ok()
            });
            Some(FeedIssue {
                number,
                url: item.link,
                title: item.title,
                published,
            })
        })
        .collect();

    issues.sort_by_key(|issue| issue.number);
    issues.dedup_by_key(|issue| issue.number);
    Ok(issues)
}

impl IssueFetcher {
    /// Issues in the feed newer than `after`.
    #[instrument(level = "info", skip(self))]
    pub async fn feed_issues(&self, after: u32) -> Result<Vec<FeedIssue>, Box<dyn Error>> {
        let xml = self.fetch_page(&self.newsletter().feed_url).await?;
        let issues: Vec<FeedIssue> = parse_feed(&xml)?
            .into_iter()
            .filter(|issue| issue.number > after)
            .collect();
        info!(count = issues.len(), "New issues in feed");
        Ok(issues)
    }
}
