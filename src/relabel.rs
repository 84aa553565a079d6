//! Citation relabeling.
//!
//! Every entry written to the bibliography is keyed `surname + year +
//! firstword`, e.g. `smith2021anew` for "A New Model of Tumor Growth" by
//! Smith (2021). Short first words (three characters or fewer) are joined
//! with the second word so keys don't collapse onto "a", "the", "on".

use crate::bibtex::{self, BibEntry, BibtexError, to_plain_ascii};
use crate::models::Publication;
use crate::outputs::bibliography::IssueBlock;
use crate::utils::truncate_for_log;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RelabelError {
    #[error("citation could not be parsed: {0}")]
    Parse(#[from] BibtexError),
    #[error("citation {key} has no `{field}` field")]
    MissingField { key: String, field: &'static str },
}

/// Derive the citation label from its three components.
///
/// `surname` is lowercased and stripped of accents; the first word of the
/// title is taken as is unless it has at most three characters, in which case
/// the second word is appended to it.
pub fn derive_label(surname: &str, year: &str, title: &str) -> String {
    let surname = key_fragment(surname);
    let year = key_fragment(year);

    let plain_title = to_plain_ascii(title);
    let mut words = plain_title.split_whitespace();
    let first_word = match (words.next(), words.next()) {
        (Some(first), Some(second)) if first.chars().count() <= 3 => format!("{first}{second}"),
        (Some(first), _) => first.to_string(),
        (None, _) => String::new(),
    };

    format!("{surname}{year}{}", key_fragment(&first_word))
}

/// First last-name part of an author written either `Last, First` or
/// `First von Last`.
pub fn first_surname(author: &str) -> Option<String> {
    let last_names: Vec<&str> = match author.split_once(',') {
        Some((last, _)) => {
            let tokens: Vec<&str> = last.split_whitespace().collect();
            // "van der Berg, Jan": skip the lowercase von part
            let start = tokens
                .iter()
                .position(|t| !starts_lowercase(t))
                .unwrap_or(0);
            tokens[start..].to_vec()
        }
        None => {
            let tokens: Vec<&str> = author.split_whitespace().collect();
            if tokens.len() <= 1 {
                tokens
            } else {
                // "Jan van der Berg": last names follow the von part, or are
                // just the final token when there is none
                let von = tokens[1..tokens.len() - 1]
                    .iter()
                    .position(|t| starts_lowercase(t))
                    .map(|p| p + 1);
                match von {
                    Some(von_start) => {
                        let after = tokens[von_start..]
                            .iter()
                            .position(|t| !starts_lowercase(t))
                            .map(|p| p + von_start)
                            .unwrap_or(tokens.len() - 1);
                        tokens[after..].to_vec()
                    }
                    None => tokens[tokens.len() - 1..].to_vec(),
                }
            }
        }
    };

    last_names
        .first()
        .map(|s| s.trim_matches(|c| c == '{' || c == '}').to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a citation and re-key it.
///
/// Returns `Ok(None)` for entries without authors; they cannot be labeled
/// and are left out of the bibliography.
pub fn relabel_citation(citation: &str) -> Result<Option<BibEntry>, RelabelError> {
    let mut entry = match bibtex::parse_first(citation) {
        Ok(entry) => entry,
        Err(e) => {
            error!(entry = %truncate_for_log(citation, 300), error = %e, "Something wrong with the entry");
            return Err(e.into());
        }
    };

    let authors = entry.authors();
    let Some(surname) = authors.first().and_then(|a| first_surname(a)) else {
        warn!(key = %entry.key, "Entry lists no authors; skipping");
        return Ok(None);
    };

    let year = entry
        .field("year")
        .ok_or_else(|| RelabelError::MissingField {
            key: entry.key.clone(),
            field: "year",
        })?
        .to_string();
    let title = entry
        .field("title")
        .ok_or_else(|| RelabelError::MissingField {
            key: entry.key.clone(),
            field: "title",
        })?
        .to_string();

    let label = derive_label(&surname, &year, &title);
    debug!(old = %entry.key, new = %label, "Relabeled entry");
    entry.key = label;
    Ok(Some(entry))
}

/// Build the bibliography block for one issue from its enriched
/// publications. Publications without a citation in `format` are skipped.
pub fn build_issue_block(
    number: u32,
    publications: &[Publication],
    format: &str,
) -> Result<IssueBlock, RelabelError> {
    let mut body = String::new();
    let mut written = 0usize;

    for publication in publications {
        let Some(citation) = publication.citation(format) else {
            continue;
        };
        if let Some(entry) = relabel_citation(citation)? {
            body.push_str(&entry.to_bibtex());
            body.push('\n');
            written += 1;
        }
    }

    info!(issue = number, entries = written, "Built issue block");
    Ok(IssueBlock::new(number, body))
}

fn key_fragment(text: &str) -> String {
    to_plain_ascii(text)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn starts_lowercase(token: &str) -> bool {
    token
        .trim_start_matches('{')
        .chars()
        .next()
        .is_some_and(char::is_lowercase)
}
