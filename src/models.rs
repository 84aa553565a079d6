//! Data models for newsletter issues and the publications they list.
//!
//! - [`Publication`]: one paper extracted from an issue, later enriched with a
//!   DOI and a formatted citation
//! - [`Issue`]: one newsletter post and its publications, in extraction order
//! - [`IssueCatalog`]: every collected issue, keyed by issue number and always
//!   serialized newest issue first
//!
//! The JSON field names (`DOI`, and the citation format name such as `bibtex`)
//! match the catalog files written by earlier runs of the tool.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A publication record extracted from an issue.
///
/// Citations are keyed by the name of the format they were fetched in, so a
/// record enriched with the default format serializes as
/// `{"title": ..., "link": ..., "DOI": ..., "bibtex": ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Publication {
    /// Link text as it appears in the newsletter.
    pub title: String,
    /// Target of the link, when the anchor carried an `href`.
    #[serde(default)]
    pub link: Option<String>,
    /// DOI resolved through the bibliographic search, if any matched.
    #[serde(rename = "DOI", default)]
    pub doi: Option<String>,
    /// Formatted citations keyed by format name.
    #[serde(flatten)]
    pub citations: BTreeMap<String, Option<String>>,
}

impl Publication {
    pub fn new(title: impl Into<String>, link: Option<String>) -> Self {
        Self {
            title: title.into(),
            link,
            doi: None,
            citations: BTreeMap::new(),
        }
    }

    /// The citation stored under `format`, if one was fetched.
    pub fn citation(&self, format: &str) -> Option<&str> {
        self.citations.get(format).and_then(|c| c.as_deref())
    }

    pub fn set_citation(&mut self, format: &str, citation: Option<String>) {
        self.citations.insert(format.to_string(), citation);
    }
}

/// One newsletter issue.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub number: u32,
    pub publications: Vec<Publication>,
}

impl Issue {
    pub fn new(number: u32, publications: Vec<Publication>) -> Self {
        Self {
            number,
            publications,
        }
    }
}

/// All collected issues, keyed by issue number.
///
/// Iteration and serialization run in descending issue order; JSON keys are
/// the issue numbers as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueCatalog {
    issues: BTreeMap<u32, Vec<Publication>>,
}

impl IssueCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the publications of an issue.
    pub fn insert(&mut self, issue: Issue) {
        self.issues.insert(issue.number, issue.publications);
    }

    pub fn contains(&self, number: u32) -> bool {
        self.issues.contains_key(&number)
    }

    pub fn get(&self, number: u32) -> Option<&[Publication]> {
        self.issues.get(&number).map(|p| p.as_slice())
    }

    /// Number of issues in the catalog.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Total number of publications over all issues.
    pub fn publication_count(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }

    /// Issues newest first.
    pub fn iter_desc(&self) -> impl Iterator<Item = (u32, &[Publication])> {
        self.issues.iter().rev().map(|(n, p)| (*n, p.as_slice()))
    }
}

impl FromIterator<Issue> for IssueCatalog {
    fn from_iter<T: IntoIterator<Item = Issue>>(iter: T) -> Self {
        let mut catalog = IssueCatalog::new();
        for issue in iter {
            catalog.insert(issue);
        }
        catalog
    }
}

impl Serialize for IssueCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.issues.len()))?;
        for (number, publications) in self.issues.iter().rev() {
            map.serialize_entry(&number.to_string(), publications)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IssueCatalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let issues = BTreeMap::<u32, Vec<Publication>>::deserialize(deserializer)?;
        Ok(Self { issues })
    }
}
