//! Runtime configuration loaded from an optional YAML file.
//!
//! Every value has a default matching the "This Week in MathOnco" newsletter,
//! so the tool runs without a config file. A partial file only overrides the
//! keys it names:
//!
//! ```yaml
//! layout:
//!   modern_from_issue: 141
//! crossref:
//!   contact_email: someone@example.org
//!   similarity_threshold: 0.9
//! ```

use serde::Deserialize;
use std::error::Error;
use tracing::{info, instrument};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub newsletter: NewsletterConfig,
    pub layout: LayoutConfig,
    pub crossref: CrossrefConfig,
    /// Issue ranges per publication year, used by the per-year split.
    pub years: Vec<YearRange>,
}

/// Where issues live and how they are named.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsletterConfig {
    /// Name used in the `//<source> Issue <N>` marker lines.
    pub source_name: String,
    /// Issue page URL with a `{number}` placeholder.
    pub issue_url_template: String,
    /// RSS feed listing the most recent issues.
    pub feed_url: String,
    /// User-Agent sent when fetching issue pages.
    pub user_agent: String,
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            source_name: "MathOnco".to_string(),
            issue_url_template:
                "https://thisweekmathonco.substack.com/p/this-week-in-mathonco-{number}"
                    .to_string(),
            feed_url: "https://thisweekmathonco.substack.com/feed".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

impl NewsletterConfig {
    pub fn issue_url(&self, number: u32) -> String {
        self.issue_url_template
            .replace("{number}", &number.to_string())
    }
}

/// Markup heuristics for the two page layouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// First issue published with the banner-based layout.
    pub modern_from_issue: u32,
    /// Tag of the section headings in the legacy layout.
    pub heading_tag: String,
    /// Text identifying the publications heading in the legacy layout.
    pub publications_heading: String,
    /// Image name of the publications banner in the modern layout.
    pub publications_banner: String,
    /// Image names of banners that may follow the publications section.
    pub following_banners: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            modern_from_issue: 141,
            heading_tag: "h3".to_string(),
            publications_heading: "#MathOnco Publications".to_string(),
            publications_banner: "fabab95d-eefe-45a0-b47e-77fc63cde5de_1024x250.png".to_string(),
            following_banners: vec![
                // preprints
                "58c80455-f0b6-43db-830a-0f73b96ead1e_1024x250.png".to_string(),
                // in the news
                "2F104440ac-3cbf-4dd2-bf8b-a4f8b11035f5_1024x250.png".to_string(),
                // featured artwork
                "2F0feba771-e36d-4595-9841-f9ee8872be92_1024x250.jpeg".to_string(),
                // resources
                "2F1717140c-562f-4f59-8459-4c2c1a1caa48_1024x250.png".to_string(),
            ],
        }
    }
}

/// CrossRef search and DOI content negotiation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrossrefConfig {
    pub api_base: String,
    pub doi_resolver: String,
    /// Sent as `mailto` to join CrossRef's polite pool.
    pub contact_email: Option<String>,
    pub app_name: String,
    pub app_version: String,
    /// A candidate title must score strictly above this to be accepted.
    pub similarity_threshold: f64,
    /// Candidates inspected per title before giving up.
    pub max_candidates: usize,
    /// Citation format requested when none is given on the command line.
    pub citation_format: String,
}

impl Default for CrossrefConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.crossref.org".to_string(),
            doi_resolver: "https://doi.org".to_string(),
            contact_email: None,
            app_name: "Newsletter Bibliography Scraper".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            similarity_threshold: 0.90,
            max_candidates: 100,
            citation_format: "bibtex".to_string(),
        }
    }
}

/// Inclusive range of issues published in one year.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YearRange {
    pub year: i32,
    pub first_issue: u32,
    /// `None` leaves the range open to the latest issue.
    #[serde(default)]
    pub last_issue: Option<u32>,
}

impl YearRange {
    pub fn contains(&self, issue: u32) -> bool {
        issue >= self.first_issue && self.last_issue.is_none_or(|last| issue <= last)
    }
}

impl Config {
    /// Load configuration from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let mut config = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await?;
                let config: Config = serde_yaml::from_str(&text)?;
                info!(path, "Loaded configuration");
                config
            }
            None => Config::default(),
        };
        if config.years.is_empty() {
            config.years = default_years();
        }
        Ok(config)
    }
}

/// Issue ranges of the MathOnco newsletter by year.
pub fn default_years() -> Vec<YearRange> {
    [
        (2017, 1, Some(2)),
        (2018, 3, Some(47)),
        (2019, 48, Some(95)),
        (2020, 96, Some(143)),
        (2021, 144, Some(190)),
        (2022, 191, Some(237)),
        (2023, 238, Some(279)),
        (2024, 280, Some(315)),
        (2025, 316, None),
    ]
    .into_iter()
    .map(|(year, first_issue, last_issue)| YearRange {
        year,
        first_issue,
        last_issue,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.layout.modern_from_issue, 141);
        assert_eq!(config.crossref.max_candidates, 100);
        assert!((config.crossref.similarity_threshold - 0.90).abs() < f64::EPSILON);
        assert_eq!(config.crossref.citation_format, "bibtex");
        assert_eq!(config.layout.following_banners.len(), 4);
    }

    #[test]
    fn test_issue_url() {
        let newsletter = NewsletterConfig::default();
        assert_eq!(
            newsletter.issue_url(42),
            "https://thisweekmathonco.substack.com/p/this-week-in-mathonco-42"
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
layout:
  modern_from_issue: 150
crossref:
  contact_email: someone@example.org
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.layout.modern_from_issue, 150);
        assert_eq!(config.layout.heading_tag, "h3");
        assert_eq!(
            config.crossref.contact_email.as_deref(),
            Some("someone@example.org")
        );
        assert_eq!(config.crossref.api_base, "https://api.crossref.org");
        assert_eq!(config.newsletter.source_name, "MathOnco");
    }

    #[test]
    fn test_year_range_contains() {
        let closed = YearRange {
            year: 2018,
            first_issue: 3,
            last_issue: Some(47),
        };
        assert!(closed.contains(3));
        assert!(closed.contains(47));
        assert!(!closed.contains(2));
        assert!(!closed.contains(48));

        let open = YearRange {
            year: 2025,
            first_issue: 316,
            last_issue: None,
        };
        assert!(open.contains(316));
        assert!(open.contains(10_000));
        assert!(!open.contains(315));
    }

    #[tokio::test]
    async fn test_load_without_path_fills_years() {
        let config = Config::load(None).await.unwrap();
        assert_eq!(config.years, default_years());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "newsletter:\n  source_name: Other\nyears:\n  - year: 2030\n    first_issue: 1\n",
        )
        .unwrap();

        let config = Config::load(path.to_str()).await.unwrap();
        assert_eq!(config.newsletter.source_name, "Other");
        assert_eq!(config.years.len(), 1);
        assert_eq!(config.years[0].last_issue, None);
    }
}
