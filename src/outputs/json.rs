//! JSON catalog of scraped issues.
//!
//! ```text
//! {
//!   "251": [{"title": ..., "link": ..., "DOI": ..., "bibtex": ...}],
//!   "250": [...]
//! }
//! ```
//!
//! Issues are always written newest first.

use crate::models::IssueCatalog;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Read a catalog, or an empty one when the file does not exist yet.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_catalog(path: &Path) -> Result<IssueCatalog, Box<dyn Error>> {
    if !fs::try_exists(path).await? {
        info!("No catalog yet; starting empty");
        return Ok(IssueCatalog::new());
    }
    let text = fs::read_to_string(path).await?;
    let catalog: IssueCatalog = serde_json::from_str(&text)?;
    info!(issues = catalog.len(), "Loaded catalog");
    Ok(catalog)
}

/// Write a catalog with two-space indentation.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_catalog(catalog: &IssueCatalog, path: &Path) -> Result<(), Box<dyn Error>> {
    write_pretty(catalog, path).await?;
    info!(issues = catalog.len(), "Wrote catalog");
    Ok(())
}

/// A publication for which no DOI could be resolved.
#[derive(Debug, Serialize, PartialEq)]
pub struct UnresolvedPaper {
    pub title: String,
    pub link: Option<String>,
    pub issue: u32,
}

/// Papers without a DOI, newest issue first.
pub fn unresolved_papers(catalog: &IssueCatalog) -> Vec<UnresolvedPaper> {
    catalog
        .iter_desc()
        .flat_map(|(issue, publications)| {
            publications
                .iter()
                .filter(|p| p.doi.is_none())
                .map(move |p| UnresolvedPaper {
                    title: p.title.clone(),
                    link: p.link.clone(),
                    issue,
                })
        })
        .collect()
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_unresolved(catalog: &IssueCatalog, path: &Path) -> Result<(), Box<dyn Error>> {
    let papers = unresolved_papers(catalog);
    write_pretty(&papers, path).await?;
    info!(count = papers.len(), "Wrote papers without DOI");
    Ok(())
}

async fn write_pretty<T: Serialize>(value: &T, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create output dir");
            return Err(e.into());
        }
    }
    fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Issue, Publication};

    fn sample_catalog() -> IssueCatalog {
        let mut resolved = Publication::new("Resolved", Some("https://a".to_string()));
        resolved.doi = Some("10.1/a".to_string());
        vec![
            Issue::new(199, vec![Publication::new("Lost", None)]),
            Issue::new(200, vec![resolved, Publication::new("Missing", Some("https://b".to_string()))]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_unresolved_papers() {
        let papers = unresolved_papers(&sample_catalog());
        assert_eq!(
            papers,
            vec![
                UnresolvedPaper {
                    title: "Missing".to_string(),
                    link: Some("https://b".to_string()),
                    issue: 200,
                },
                UnresolvedPaper {
                    title: "Lost".to_string(),
                    link: None,
                    issue: 199,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_catalog_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("issues.json");

        assert!(read_catalog(&path).await.unwrap().is_empty());

        let catalog = sample_catalog();
        write_catalog(&catalog, &path).await.unwrap();
        let reread = read_catalog(&path).await.unwrap();
        assert_eq!(reread, catalog);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.find("\"200\"").unwrap() < text.find("\"199\"").unwrap());
    }
}
