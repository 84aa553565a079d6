//! DOI-based deduplication and catalog statistics.
//!
//! The same paper is regularly listed by more than one issue. Only the newest
//! listing is kept: issues are walked in descending order and the first
//! occurrence of each DOI wins. Publications without a DOI cannot be compared
//! and are always kept.

use crate::models::{Issue, IssueCatalog};
use itertools::Itertools;
use std::collections::HashSet;
use tracing::info;

/// DOIs listed more than once across the catalog, sorted.
pub fn duplicated_dois(catalog: &IssueCatalog) -> Vec<String> {
    catalog
        .iter_desc()
        .flat_map(|(_, publications)| publications.iter().filter_map(|p| p.doi.clone()))
        .counts()
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(doi, _)| doi)
        .sorted()
        .collect()
}

/// Remove repeated DOIs, keeping the occurrence in the newest issue.
///
/// Issues left without publications stay in the catalog.
pub fn remove_duplicates(catalog: &IssueCatalog) -> IssueCatalog {
    let duplicated = duplicated_dois(catalog);
    info!(count = duplicated.len(), "Duplicated DOIs");

    let mut seen: HashSet<&str> = HashSet::new();
    catalog
        .iter_desc()
        .map(|(number, publications)| {
            let kept = publications
                .iter()
                .filter(|p| match p.doi.as_deref() {
                    Some(doi) => seen.insert(doi),
                    None => true,
                })
                .cloned()
                .collect();
            Issue::new(number, kept)
        })
        .collect()
}

/// Summary numbers printed by the `info` command.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogStats {
    pub issues: usize,
    pub papers: usize,
    pub without_doi: usize,
    pub duplicated_dois: usize,
}

impl CatalogStats {
    pub fn from_catalog(catalog: &IssueCatalog) -> Self {
        let without_doi = catalog
            .iter_desc()
            .flat_map(|(_, publications)| publications.iter())
            .filter(|p| p.doi.is_none())
            .count();
        Self {
            issues: catalog.len(),
            papers: catalog.publication_count(),
            without_doi,
            duplicated_dois: duplicated_dois(catalog).len(),
        }
    }

    /// Share of papers without DOI, in percent.
    pub fn without_doi_percent(&self) -> f64 {
        if self.papers == 0 {
            0.0
        } else {
            self.without_doi as f64 / self.papers as f64 * 100.0
        }
    }

    pub fn log(&self) {
        info!(issues = self.issues, "Total number of issues");
        info!(papers = self.papers, "Total number of papers");
        info!(
            without_doi = self.without_doi,
            papers = self.papers,
            percent = %format!("{:.2}", self.without_doi_percent()),
            "Could not find DOI"
        );
        info!(duplicated = self.duplicated_dois, "Duplicates between papers with DOI");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Publication;

    fn with_doi(title: &str, doi: &str) -> Publication {
        let mut p = Publication::new(title, None);
        p.doi = Some(doi.to_string());
        p
    }

    fn catalog() -> IssueCatalog {
        vec![
            Issue::new(
                199,
                vec![
                    with_doi("Bar", "10.1/abc"),
                    Publication::new("No DOI", None),
                    with_doi("Baz", "10.1/def"),
                ],
            ),
            Issue::new(
                200,
                vec![
                    with_doi("Foo", "10.1/abc"),
                    Publication::new("No DOI", None),
                ],
            ),
            Issue::new(198, vec![with_doi("Qux", "10.1/def"), with_doi("Solo", "10.1/xyz")]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_newest_occurrence_is_kept() {
        let json = r#"{"200": [{"title": "Foo", "DOI": "10.1/abc"}], "199": [{"title": "Bar", "DOI": "10.1/abc"}]}"#;
        let catalog: IssueCatalog = serde_json::from_str(json).unwrap();

        let deduped = remove_duplicates(&catalog);
        assert_eq!(deduped.get(200).unwrap().len(), 1);
        assert_eq!(deduped.get(200).unwrap()[0].title, "Foo");
        assert!(deduped.get(199).unwrap().is_empty());
    }

    #[test]
    fn test_duplicated_dois() {
        assert_eq!(duplicated_dois(&catalog()), vec!["10.1/abc", "10.1/def"]);
    }

    #[test]
    fn test_each_doi_at_most_once_and_doiless_kept() {
        let deduped = remove_duplicates(&catalog());

        let dois: Vec<&str> = deduped
            .iter_desc()
            .flat_map(|(_, ps)| ps.iter().filter_map(|p| p.doi.as_deref()))
            .collect();
        assert_eq!(dois, vec!["10.1/abc", "10.1/def", "10.1/xyz"]);

        let doiless = deduped
            .iter_desc()
            .flat_map(|(_, ps)| ps.iter())
            .filter(|p| p.doi.is_none())
            .count();
        assert_eq!(doiless, 2);

        // 10.1/def first appears in 199 when walking newest first
        assert!(deduped.get(199).unwrap().iter().any(|p| p.title == "Baz"));
        assert!(deduped.get(198).unwrap().iter().all(|p| p.title != "Qux"));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let once = remove_duplicates(&catalog());
        let twice = remove_duplicates(&once);
        assert_eq!(once, twice);
        assert!(duplicated_dois(&once).is_empty());
    }

    #[test]
    fn test_stats() {
        let stats = CatalogStats::from_catalog(&catalog());
        assert_eq!(
            stats,
            CatalogStats {
                issues: 3,
                papers: 7,
                without_doi: 2,
                duplicated_dois: 2,
            }
        );
        assert!((stats.without_doi_percent() - 200.0 / 7.0).abs() < 1e-9);
        assert_eq!(CatalogStats::from_catalog(&IssueCatalog::new()).without_doi_percent(), 0.0);
    }
}
