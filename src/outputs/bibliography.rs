//! The flat bibliography file and the store abstraction over it.
//!
//! # Format
//!
//! ```text
//! //MathOnco Issue 251
//! @article{smith2021anew,
//!     ...
//! }
//!
//! //MathOnco Issue 250
//! ...
//! ```
//!
//! One marker line per issue, newest issue first. The first line therefore
//! carries the cursor: the latest issue already in the bibliography.
//!
//! # Store
//!
//! [`BibliographyStore`] exposes the three operations the pipelines need:
//! reading every block, adding a new issue on top, and rewriting the whole
//! sequence. [`FileStore`] persists to disk (rewrites go through a temporary
//! sibling file and a rename); [`MemoryStore`] keeps the blocks in memory.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument};

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^//(?P<source>.+?) Issue (?P<number>\d+)\s*$").unwrap());

/// The text of one issue in the bibliography.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueBlock {
    pub number: u32,
    /// Everything after the marker line, up to the next marker.
    pub body: String,
}

impl IssueBlock {
    pub fn new(number: u32, body: impl Into<String>) -> Self {
        Self {
            number,
            body: body.into(),
        }
    }

    /// Marker line plus body, as written to the bibliography.
    pub fn render(&self, source: &str) -> String {
        format!("{}\n{}", marker_line(source, self.number), self.body)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("issue {0} is already in the bibliography")]
    DuplicateIssue(u32),
    #[error("issue {number} is older than the latest issue {latest}")]
    OutOfOrder { number: u32, latest: u32 },
    #[error("issue blocks must be unique and in descending order (issue {0})")]
    Unordered(u32),
}

pub fn marker_line(source: &str, number: u32) -> String {
    format!("//{source} Issue {number}")
}

/// Split bibliography text into issue blocks. Text before the first marker
/// is ignored.
pub fn parse_blocks(text: &str) -> Vec<IssueBlock> {
    let mut blocks: Vec<IssueBlock> = Vec::new();
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if let Some(caps) = MARKER.captures(trimmed) {
            if let Ok(number) = caps["number"].parse() {
                blocks.push(IssueBlock::new(number, String::new()));
                continue;
            }
        }
        if let Some(current) = blocks.last_mut() {
            current.body.push_str(line);
        }
    }
    blocks
}

/// Serialize blocks in the order given.
pub fn render_blocks(source: &str, blocks: &[IssueBlock]) -> String {
    blocks.iter().map(|b| b.render(source)).collect()
}

/// Latest issue number, read from the first line of the bibliography.
pub fn read_cursor(text: &str) -> Option<u32> {
    let first = text.lines().next()?;
    MARKER
        .captures(first.trim_end())
        .and_then(|caps| caps["number"].parse().ok())
}

fn check_order(blocks: &[IssueBlock]) -> Result<(), StoreError> {
    for pair in blocks.windows(2) {
        if pair[1].number >= pair[0].number {
            return Err(StoreError::Unordered(pair[1].number));
        }
    }
    Ok(())
}

fn check_append(blocks: &[IssueBlock], block: &IssueBlock) -> Result<(), StoreError> {
    if blocks.iter().any(|b| b.number == block.number) {
        return Err(StoreError::DuplicateIssue(block.number));
    }
    if let Some(latest) = blocks.first() {
        if block.number < latest.number {
            return Err(StoreError::OutOfOrder {
                number: block.number,
                latest: latest.number,
            });
        }
    }
    Ok(())
}

/// Append-only log of issue blocks, newest first.
pub trait BibliographyStore {
    /// All blocks, newest first.
    async fn read_all(&self) -> Result<Vec<IssueBlock>, Box<dyn Error>>;

    /// Add a block for an issue newer than every stored one.
    async fn append_issue(&mut self, block: IssueBlock) -> Result<(), Box<dyn Error>>;

    /// Replace the whole content. Blocks must be unique and descending.
    async fn rewrite_all(&mut self, blocks: &[IssueBlock]) -> Result<(), Box<dyn Error>>;

    /// Latest stored issue number.
    async fn cursor(&self) -> Result<Option<u32>, Box<dyn Error>> {
        Ok(self.read_all().await?.first().map(|b| b.number))
    }
}

/// Bibliography persisted as a flat text file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    source: String,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_text(&self) -> Result<String, Box<dyn Error>> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, text: &str) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl BibliographyStore for FileStore {
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    async fn read_all(&self) -> Result<Vec<IssueBlock>, Box<dyn Error>> {
        let text = self.read_text().await?;
        Ok(parse_blocks(&text))
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), issue = block.number))]
    async fn append_issue(&mut self, block: IssueBlock) -> Result<(), Box<dyn Error>> {
        let existing = self.read_text().await?;
        check_append(&parse_blocks(&existing), &block)?;

        let mut text = block.render(&self.source);
        text.push_str(&existing);
        self.write_atomic(&text).await?;
        info!("Prepended issue to bibliography");
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), blocks = blocks.len()))]
    async fn rewrite_all(&mut self, blocks: &[IssueBlock]) -> Result<(), Box<dyn Error>> {
        check_order(blocks)?;
        self.write_atomic(&render_blocks(&self.source, blocks)).await?;
        info!("Rewrote bibliography");
        Ok(())
    }

    async fn cursor(&self) -> Result<Option<u32>, Box<dyn Error>> {
        Ok(read_cursor(&self.read_text().await?))
    }
}

/// In-memory store, used where no file should be touched.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blocks: Vec<IssueBlock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BibliographyStore for MemoryStore {
    async fn read_all(&self) -> Result<Vec<IssueBlock>, Box<dyn Error>> {
        Ok(self.blocks.clone())
    }

    async fn append_issue(&mut self, block: IssueBlock) -> Result<(), Box<dyn Error>> {
        check_append(&self.blocks, &block)?;
        self.blocks.insert(0, block);
        Ok(())
    }

    async fn rewrite_all(&mut self, blocks: &[IssueBlock]) -> Result<(), Box<dyn Error>> {
        check_order(blocks)?;
        self.blocks = blocks.to_vec();
        Ok(())
    }
}
