//! Derived files: per-issue and per-year bibliographies, paper counts and
//! DOI lists.
//!
//! ```text
//! res/
//! ├── MathOncoBibliography.bib
//! ├── single_issues/
//! │   └── issue_251.bib
//! └── single_years/
//!     └── issues_in_year_2025.bib
//! ```

use crate::config::YearRange;
use crate::models::IssueCatalog;
use crate::outputs::bibliography::IssueBlock;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

pub fn issue_file_name(number: u32) -> String {
    format!("issue_{number}.bib")
}

pub fn year_file_name(year: i32) -> String {
    format!("issues_in_year_{year}.bib")
}

/// Write one file per issue block into `dir`.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn split_per_issue(
    source: &str,
    blocks: &[IssueBlock],
    dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    fs::create_dir_all(dir).await?;
    let mut written = Vec::with_capacity(blocks.len());
    for block in blocks {
        let path = dir.join(issue_file_name(block.number));
        fs::write(&path, block.render(source)).await?;
        written.push(path);
    }
    info!(count = written.len(), "Split bibliography per issue");
    Ok(written)
}

/// Group blocks by year, oldest issue first within each year.
///
/// Issues outside every configured range are left out and logged.
pub fn group_by_year<'a>(
    blocks: &'a [IssueBlock],
    years: &[YearRange],
) -> Vec<(i32, Vec<&'a IssueBlock>)> {
    let mut ascending: Vec<&IssueBlock> = blocks.iter().collect();
    ascending.sort_by_key(|b| b.number);

    for block in &ascending {
        if !years.iter().any(|range| range.contains(block.number)) {
            warn!(issue = block.number, "Issue is outside every configured year");
        }
    }

    years
        .iter()
        .map(|range| {
            let in_year = ascending
                .iter()
                .copied()
                .filter(|b| range.contains(b.number))
                .collect();
            (range.year, in_year)
        })
        .collect()
}

/// Write one file per configured year into `dir`. Years without issues get
/// no file.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn split_per_year(
    source: &str,
    blocks: &[IssueBlock],
    years: &[YearRange],
    dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    fs::create_dir_all(dir).await?;
    let mut written = Vec::new();
    for (year, in_year) in group_by_year(blocks, years) {
        if in_year.is_empty() {
            continue;
        }
        let text = in_year
            .iter()
            .map(|b| b.render(source))
            .collect::<Vec<_>>()
            .join("\n");
        let path = dir.join(year_file_name(year));
        fs::write(&path, text).await?;
        info!(year, issues = in_year.len(), "Wrote year bibliography");
        written.push(path);
    }
    Ok(written)
}

/// One row of the papers-per-year CSV.
#[derive(Debug, Serialize, PartialEq)]
pub struct YearCount {
    #[serde(rename = "Year")]
    pub year: String,
    pub n_papers: usize,
}

/// Number of `@article` entries in a bibliography text.
pub fn count_articles(text: &str) -> usize {
    text.to_lowercase().matches("@article").count()
}

/// Count papers in every `*.bib` file of a per-year directory.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn count_papers_per_year(dir: &Path) -> Result<Vec<YearCount>, Box<dyn Error>> {
    let mut counts = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bib") {
            continue;
        }
        let Some(year) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('_').next())
        else {
            continue;
        };
        let text = fs::read_to_string(&path).await?;
        counts.push(YearCount {
            year: year.to_string(),
            n_papers: count_articles(&text),
        });
    }
    counts.sort_by(|a, b| a.year.cmp(&b.year));
    info!(years = counts.len(), "Counted papers per year");
    Ok(counts)
}

pub fn write_counts_csv(counts: &[YearCount], path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for count in counts {
        writer.serialize(count)?;
    }
    writer.flush()?;
    Ok(())
}

/// DOI lists, newest issue first: one with bare DOIs, one annotated with
/// the issue number.
pub fn doi_lists(catalog: &IssueCatalog) -> (String, String) {
    let mut plain = String::new();
    let mut annotated = String::new();
    for (issue, publications) in catalog.iter_desc() {
        for doi in publications.iter().filter_map(|p| p.doi.as_deref()) {
            plain.push_str(doi);
            plain.push('\n');
            annotated.push_str(&format!("{doi} # Issue {issue}\n"));
        }
    }
    (plain, annotated)
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display(), prefix = %prefix))]
pub async fn write_doi_lists(
    catalog: &IssueCatalog,
    dir: &Path,
    prefix: &str,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(dir).await?;
    let (plain, annotated) = doi_lists(catalog);
    fs::write(dir.join(format!("{prefix}_DOIs.txt")), plain).await?;
    fs::write(dir.join(format!("{prefix}_DOIs_annotated.txt")), annotated).await?;
    info!("Wrote DOI lists");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_years;
    use crate::models::{Issue, Publication};

    fn blocks() -> Vec<IssueBlock> {
        vec![
            IssueBlock::new(317, "@article{c,\n}\n\n"),
            IssueBlock::new(316, "@article{b,\n}\n\n@article{bb,\n}\n\n"),
            IssueBlock::new(315, "@article{a,\n}\n\n"),
        ]
    }

    #[test]
    fn test_group_by_year_is_ascending() {
        let blocks = blocks();
        let groups = group_by_year(&blocks, &default_years());
        let y2025 = groups.iter().find(|(y, _)| *y == 2025).unwrap();
        let numbers: Vec<u32> = y2025.1.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![316, 317]);
        let y2024 = groups.iter().find(|(y, _)| *y == 2024).unwrap();
        assert_eq!(y2024.1.len(), 1);
    }

    #[test]
    fn test_count_articles() {
        assert_eq!(count_articles("@article{a,}\n@Article{b,}\n@book{c,}"), 2);
    }

    #[test]
    fn test_doi_lists() {
        let mut a = Publication::new("A", None);
        a.doi = Some("10.1/a".to_string());
        let mut b = Publication::new("B", None);
        b.doi = Some("10.1/b".to_string());
        let catalog: IssueCatalog = vec![
            Issue::new(1, vec![a]),
            Issue::new(2, vec![b, Publication::new("C", None)]),
        ]
        .into_iter()
        .collect();

        let (plain, annotated) = doi_lists(&catalog);
        assert_eq!(plain, "10.1/b\n10.1/a\n");
        assert_eq!(annotated, "10.1/b # Issue 2\n10.1/a # Issue 1\n");
    }

    #[tokio::test]
    async fn test_split_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let issues_dir = dir.path().join("single_issues");
        let years_dir = dir.path().join("single_years");

        let written = split_per_issue("MathOnco", &blocks(), &issues_dir)
            .await
            .unwrap();
        assert_eq!(written.len(), 3);
        let issue_316 = std::fs::read_to_string(issues_dir.join("issue_316.bib")).unwrap();
        assert!(issue_316.starts_with("//MathOnco Issue 316\n"));

        split_per_year("MathOnco", &blocks(), &default_years(), &years_dir)
            .await
            .unwrap();
        let y2025 = std::fs::read_to_string(years_dir.join("issues_in_year_2025.bib")).unwrap();
        assert!(y2025.find("Issue 316").unwrap() < y2025.find("Issue 317").unwrap());

        let counts = count_papers_per_year(&years_dir).await.unwrap();
        assert_eq!(
            counts,
            vec![
                YearCount {
                    year: "2024".to_string(),
                    n_papers: 1
                },
                YearCount {
                    year: "2025".to_string(),
                    n_papers: 3
                },
            ]
        );

        let csv_path = dir.path().join("out").join("n_papers_per_year.csv");
        write_counts_csv(&counts, &csv_path).unwrap();
        let csv_text = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv_text, "Year,n_papers\n2024,1\n2025,3\n");
    }
}
