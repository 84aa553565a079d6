//! Publication section extraction.
//!
//! Issue pages are flattened into a document-ordered sequence of the only
//! nodes the heuristics care about: section headings, banner images and
//! links. A [`Layout`] then finds the `(start, end)` span of the publications
//! section in that sequence, and every content link strictly inside the span
//! becomes a publication.
//!
//! # Layouts
//!
//! - **Legacy** (before the redesign): sections are `h3` headings. The
//!   publications section starts at the single heading containing the
//!   configured label and ends at the next heading.
//! - **Modern**: sections are introduced by banner images (`<source srcset>`).
//!   The publications section starts at the publications banner and ends at
//!   the first following banner of a known kind. Not every issue has every
//!   section, so any of them may close the span.
//!
//! Links carrying a `class` attribute are page chrome (buttons, share links),
//! not papers.

use crate::config::LayoutConfig;
use crate::models::{Issue, Publication};
use scraper::{ElementRef, Html};
use tracing::{debug, info};

/// A markup node relevant to section detection.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Heading { text: String },
    Banner { srcset: String },
    Link {
        title: String,
        href: Option<String>,
        chrome: bool,
    },
}

/// Page layout, selected by issue number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Legacy,
    Modern,
}

impl Layout {
    pub fn for_issue(number: u32, config: &LayoutConfig) -> Self {
        if number < config.modern_from_issue {
            Layout::Legacy
        } else {
            Layout::Modern
        }
    }

    /// Indices of the nodes opening and closing the publications section.
    pub fn find_publication_span(
        &self,
        nodes: &[MarkupNode],
        config: &LayoutConfig,
    ) -> Option<(usize, usize)> {
        match self {
            Layout::Legacy => legacy_span(nodes, config),
            Layout::Modern => modern_span(nodes, config),
        }
    }
}

fn legacy_span(nodes: &[MarkupNode], config: &LayoutConfig) -> Option<(usize, usize)> {
    let matches: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| {
            matches!(node, MarkupNode::Heading { text } if text.contains(&config.publications_heading))
        })
        .map(|(i, _)| i)
        .collect();

    // zero or several candidates: don't guess
    let &[start] = matches.as_slice() else {
        debug!(candidates = matches.len(), "Publications heading not unique");
        return None;
    };

    let end = nodes[start + 1..]
        .iter()
        .position(|node| matches!(node, MarkupNode::Heading { .. }))?
        + start
        + 1;
    Some((start, end))
}

fn modern_span(nodes: &[MarkupNode], config: &LayoutConfig) -> Option<(usize, usize)> {
    let start = nodes.iter().position(|node| {
        matches!(node, MarkupNode::Banner { srcset } if srcset.contains(&config.publications_banner))
    })?;

    let end = nodes[start + 1..].iter().position(|node| match node {
        MarkupNode::Banner { srcset } => config
            .following_banners
            .iter()
            .any(|banner| srcset.contains(banner.as_str())),
        _ => false,
    })? + start
        + 1;
    Some((start, end))
}

/// Flatten a parsed page into its headings, banners and links, in document
/// order.
pub fn flatten(document: &Html, config: &LayoutConfig) -> Vec<MarkupNode> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|element| {
            let value = element.value();
            let name = value.name();
            if name.eq_ignore_ascii_case(&config.heading_tag) {
                Some(MarkupNode::Heading {
                    text: element.text().collect(),
                })
            } else if name == "source" {
                value.attr("srcset").map(|srcset| MarkupNode::Banner {
                    srcset: srcset.to_string(),
                })
            } else if name == "a" {
                Some(MarkupNode::Link {
                    title: element.text().collect::<String>().trim().to_string(),
                    href: value.attr("href").map(str::to_string),
                    chrome: value.attr("class").is_some(),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Content links strictly inside `span`.
pub fn links_in_span(nodes: &[MarkupNode], (start, end): (usize, usize)) -> Vec<Publication> {
    nodes[start + 1..end]
        .iter()
        .filter_map(|node| match node {
            MarkupNode::Link {
                title,
                href,
                chrome: false,
            } => Some(Publication::new(title.clone(), href.clone())),
            _ => None,
        })
        .collect()
}

/// Extract the publications listed by one issue page.
///
/// A page without a recognizable publications section yields an issue with
/// no publications.
pub fn publications_from_document(document: &Html, number: u32, config: &LayoutConfig) -> Issue {
    let nodes = flatten(document, config);
    let layout = Layout::for_issue(number, config);

    let publications = match layout.find_publication_span(&nodes, config) {
        Some(span) => {
            let publications = links_in_span(&nodes, span);
            info!(issue = number, ?layout, count = publications.len(), "Found papers");
            publications
        }
        None => {
            info!(issue = number, ?layout, "Found no papers section");
            Vec::new()
        }
    };

    Issue::new(number, publications)
}

/// Parse an issue page and extract its publications.
pub fn publications_from_html(html: &str, number: u32, config: &LayoutConfig) -> Issue {
    let document = Html::parse_document(html);
    publications_from_document(&document, number, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"
<html><body>
  <h3><strong>#MathOnco Jobs</strong></h3>
  <a href="https://jobs.example/1">A job</a>
  <h3><strong>#MathOnco Publications</strong></h3>
  <p><a href="https://doi.org/10.1/one">Paper one</a> by Someone</p>
  <p><a class="button" href="https://share.example">Share</a></p>
  <p><a href="https://doi.org/10.1/two">Paper two</a></p>
  <h3><strong>#MathOnco Preprints</strong></h3>
  <a href="https://arxiv.example/3">A preprint</a>
</body></html>
"#;

    fn modern(with_preprints: bool) -> String {
        let config = LayoutConfig::default();
        let preprints = if with_preprints {
            format!(
                r#"<picture><source srcset="https://cdn.example/{}"></picture>
                   <a href="https://arxiv.example/9">A preprint</a>"#,
                config.following_banners[0]
            )
        } else {
            String::new()
        };
        format!(
            r#"<html><body>
  <a href="https://site.example/subscribe" class="button primary">Subscribe</a>
  <picture><source srcset="https://cdn.example/{pub_banner} 1024w"></picture>
  <p><a href="https://doi.org/10.1/m1">Modern one</a></p>
  <p><a href="https://doi.org/10.1/m2">Modern <em>two</em></a></p>
  {preprints}
  <picture><source srcset="https://cdn.example/{news}"></picture>
  <a href="https://news.example/1">News item</a>
</body></html>"#,
            pub_banner = config.publications_banner,
            news = config.following_banners[1],
        )
    }

    fn titles(issue: &Issue) -> Vec<&str> {
        issue.publications.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn test_layout_for_issue() {
        let config = LayoutConfig::default();
        assert_eq!(Layout::for_issue(140, &config), Layout::Legacy);
        assert_eq!(Layout::for_issue(141, &config), Layout::Modern);
    }

    #[test]
    fn test_legacy_extracts_between_headings() {
        let issue = publications_from_html(LEGACY, 100, &LayoutConfig::default());
        assert_eq!(titles(&issue), vec!["Paper one", "Paper two"]);
        assert_eq!(
            issue.publications[0].link.as_deref(),
            Some("https://doi.org/10.1/one")
        );
        assert_eq!(issue.number, 100);
    }

    #[test]
    fn test_legacy_duplicate_heading_is_not_found() {
        let html = LEGACY.replace("#MathOnco Jobs", "#MathOnco Publications");
        let issue = publications_from_html(&html, 100, &LayoutConfig::default());
        assert!(issue.publications.is_empty());
    }

    #[test]
    fn test_legacy_missing_heading_is_not_found() {
        let html = LEGACY.replace("#MathOnco Publications", "#MathOnco Papers");
        let issue = publications_from_html(&html, 100, &LayoutConfig::default());
        assert!(issue.publications.is_empty());
    }

    #[test]
    fn test_legacy_without_following_heading_is_not_found() {
        let html = r#"<h3>#MathOnco Publications</h3><a href="x">Paper</a>"#;
        let issue = publications_from_html(html, 100, &LayoutConfig::default());
        assert!(issue.publications.is_empty());
    }

    #[test]
    fn test_modern_stops_at_first_following_banner() {
        let issue = publications_from_html(&modern(true), 200, &LayoutConfig::default());
        assert_eq!(titles(&issue), vec!["Modern one", "Modern two"]);
    }

    #[test]
    fn test_modern_any_following_banner_closes_section() {
        let issue = publications_from_html(&modern(false), 200, &LayoutConfig::default());
        assert_eq!(titles(&issue), vec!["Modern one", "Modern two"]);
    }

    #[test]
    fn test_modern_without_publications_banner_is_empty() {
        let config = LayoutConfig::default();
        let html = modern(true).replace(&config.publications_banner, "something-else.png");
        let issue = publications_from_html(&html, 200, &config);
        assert!(issue.publications.is_empty());
    }

    #[test]
    fn test_layout_is_chosen_by_issue_number() {
        // a legacy page read as a modern issue has no banners
        let issue = publications_from_html(LEGACY, 141, &LayoutConfig::default());
        assert!(issue.publications.is_empty());
    }

    #[test]
    fn test_span_over_plain_nodes() {
        let config = LayoutConfig::default();
        let link = |t: &str| MarkupNode::Link {
            title: t.to_string(),
            href: None,
            chrome: false,
        };
        let nodes = vec![
            link("before"),
            MarkupNode::Heading {
                text: config.publications_heading.clone(),
            },
            link("inside"),
            MarkupNode::Heading {
                text: "Next".to_string(),
            },
            link("after"),
        ];
        let span = Layout::Legacy.find_publication_span(&nodes, &config).unwrap();
        assert_eq!(span, (1, 3));
        let publications = links_in_span(&nodes, span);
        assert_eq!(publications.len(), 1);
        assert_eq!(publications[0].title, "inside");
    }
}
