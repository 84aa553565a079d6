//! # Newsletter Bibliography
//!
//! Builds a BibTeX bibliography of the papers listed by the "This Week in
//! MathOnco" newsletter, and keeps it up to date.
//!
//! ## Features
//!
//! - Extracts the publications section of an issue page for both the legacy
//!   (heading-based) and the modern (banner-based) layout
//! - Resolves each paper title to a DOI through CrossRef, then fetches its
//!   citation from the DOI resolver
//! - Relabels citations as `surname + year + firstword` and prepends one block
//!   per issue to the bibliography file
//! - Offline maintenance: DOI deduplication, per-issue and per-year splits,
//!   paper counts, statistics and DOI lists
//!
//! ## Usage
//!
//! ```sh
//! newsletter_bibliography update
//! newsletter_bibliography scrape --url https://thisweekmathonco.substack.com/p/this-week-in-mathonco-251
//! ```
//!
//! ## Architecture
//!
//! The update pipeline runs one issue at a time:
//! 1. **Fetching**: find the next issue at its sequential URL or in the feed
//! 2. **Extraction**: locate the publications section and read its links
//! 3. **Enrichment**: look up DOIs and citations, one request at a time
//! 4. **Output**: write the issue block to its own file and on top of the
//!    bibliography

use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod api;
mod bibtex;
mod cli;
mod config;
mod dedup;
mod models;
mod outputs;
mod relabel;
mod scrapers;
mod utils;

use api::{CrossrefClient, MetadataSource, enrich_issue};
use cli::{
    Cli, Command, CountArgs, DedupArgs, DoisArgs, InfoArgs, ScrapeArgs, SplitArgs, UpdateArgs,
    WriteBibArgs,
};
use config::Config;
use dedup::{CatalogStats, remove_duplicates};
use outputs::bibliography::{BibliographyStore, FileStore, MemoryStore};
use outputs::{json, splits};
use relabel::build_issue_block;
use scrapers::issue_number_from_name;
use scrapers::issues::IssueFetcher;
use scrapers::sections::publications_from_html;
use utils::ensure_writable_dir;

/// Citation format stored in the bibliography; relabeling needs BibTeX.
const BIBTEX: &str = "bibtex";

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsletter_bibliography starting up");

    let args = Cli::parse();
    debug!(?args.command, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref()).await?;
    if let Some(mailto) = args.mailto {
        config.crossref.contact_email = Some(mailto);
    }

    let result = match args.command {
        Command::Scrape(args) => run_scrape(&config, args).await,
        Command::Update(args) => run_update(&config, args).await,
        Command::Dedup(args) => run_dedup(args).await,
        Command::WriteBib(args) => run_write_bib(&config, args).await,
        Command::Split(args) => run_split(&config, args).await,
        Command::Count(args) => run_count(args).await,
        Command::Info(args) => run_info(args).await,
        Command::Dois(args) => run_dois(args).await,
    };
    if let Err(e) = &result {
        error!(error = %e, "Run failed");
    }
    result?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// Where `scrape` reads an issue page from.
#[derive(Debug)]
enum PageSource {
    Url(Url),
    File(PathBuf),
}

impl PageSource {
    /// Text carrying the issue slug: the URL path or the file path.
    fn name(&self) -> String {
        match self {
            PageSource::Url(url) => url.path().to_string(),
            PageSource::File(path) => path.display().to_string(),
        }
    }

    async fn read(&self, fetcher: &IssueFetcher) -> Result<String, Box<dyn Error>> {
        match self {
            PageSource::Url(url) => fetcher.fetch_page(url.as_str()).await,
            PageSource::File(path) => Ok(fs::read_to_string(path).await?),
        }
    }
}

async fn html_files_in(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("html") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[instrument(level = "info", skip_all)]
async fn run_scrape(config: &Config, args: ScrapeArgs) -> Result<(), Box<dyn Error>> {
    let format = args
        .output_format
        .unwrap_or_else(|| config.crossref.citation_format.clone());

    let sources = if let Some(url) = args.url {
        vec![PageSource::Url(Url::parse(&url)?)]
    } else if let Some(dir) = args.directory {
        html_files_in(&dir)
            .await?
            .into_iter()
            .map(PageSource::File)
            .collect()
    } else if let Some(file) = args.file {
        vec![PageSource::File(file)]
    } else {
        return Err("no input given".into());
    };
    info!(count = sources.len(), %format, "Pages to scrape");

    let fetcher = IssueFetcher::new(config.newsletter.clone())?;
    let crossref = CrossrefClient::new(config.crossref.clone())?;
    let mut catalog = json::read_catalog(&args.issues_json).await?;

    for source in &sources {
        let number = issue_number_from_name(&source.name())?;
        if let Some(known) = catalog.get(number) {
            info!(issue = number, papers = known.len(), "Issue already in catalog; skipping");
            continue;
        }

        let html = source.read(&fetcher).await?;
        let issue = publications_from_html(&html, number, &config.layout);
        let issue = enrich_issue(&crossref, issue, &format).await?;

        if issue.publications.is_empty() {
            warn!(issue = number, "No papers found");
        } else {
            catalog.insert(issue);
        }
    }

    json::write_catalog(&catalog, &args.issues_json).await
}

#[instrument(level = "info", skip_all, fields(bibliography = %args.bibliography.display()))]
async fn run_update(config: &Config, args: UpdateArgs) -> Result<(), Box<dyn Error>> {
    let fetcher = IssueFetcher::new(config.newsletter.clone())?;
    let crossref = CrossrefClient::new(config.crossref.clone())?;
    let mut store = FileStore::new(&args.bibliography, config.newsletter.source_name.clone());

    if args.dry_run {
        let mut preview = MemoryStore::new();
        preview.rewrite_all(&store.read_all().await?).await?;
        let appended =
            append_new_issues(&fetcher, &crossref, &mut preview, config, None, args.feed).await?;
        log_preview(&preview, appended.len()).await?;
        return Ok(());
    }

    ensure_writable_dir(&args.single_issues_dir).await?;
    let appended = append_new_issues(
        &fetcher,
        &crossref,
        &mut store,
        config,
        Some(&args.single_issues_dir),
        args.feed,
    )
    .await?;
    info!(count = appended.len(), issues = ?appended, "Bibliography updated");
    Ok(())
}

/// Log the `count` newest blocks of a preview store, newest first.
async fn log_preview(preview: &MemoryStore, count: usize) -> Result<(), Box<dyn Error>> {
    let blocks = preview.read_all().await?;
    for block in blocks.iter().take(count) {
        info!(
            issue = block.number,
            entries = block.body.lines().filter(|l| l.starts_with('@')).count(),
            "Would prepend issue"
        );
    }
    info!(count, "Dry run; bibliography left untouched");
    Ok(())
}

/// Fetch every issue newer than the store's cursor and add it on top.
///
/// Returns the numbers of the appended issues, oldest first. Single-issue
/// files are only written when `single_issues_dir` is given.
async fn append_new_issues<M: MetadataSource, S: BibliographyStore>(
    fetcher: &IssueFetcher,
    metadata: &M,
    store: &mut S,
    config: &Config,
    single_issues_dir: Option<&Path>,
    use_feed: bool,
) -> Result<Vec<u32>, Box<dyn Error>> {
    let mut latest = store
        .cursor()
        .await?
        .ok_or("bibliography has no issue marker on its first line")?;
    info!(latest, "Latest issue in bibliography");

    let mut appended = Vec::new();
    if use_feed {
        for feed_issue in fetcher.feed_issues(latest).await? {
            let html = fetcher.fetch_page(&feed_issue.url).await?;
            append_issue(feed_issue.number, &html, metadata, store, config, single_issues_dir)
                .await?;
            appended.push(feed_issue.number);
        }
    } else {
        while let Some(fetched) = fetcher.next_issue(latest).await? {
            debug!(issue = fetched.number, url = %fetched.url, "Appending issue");
            append_issue(fetched.number, &fetched.html, metadata, store, config, single_issues_dir)
                .await?;
            appended.push(fetched.number);
            latest = fetched.number;
        }
    }
    Ok(appended)
}

#[instrument(level = "info", skip(html, metadata, store, config, single_issues_dir))]
async fn append_issue<M: MetadataSource, S: BibliographyStore>(
    number: u32,
    html: &str,
    metadata: &M,
    store: &mut S,
    config: &Config,
    single_issues_dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let issue = publications_from_html(html, number, &config.layout);
    let issue = enrich_issue(metadata, issue, BIBTEX).await?;
    let block = build_issue_block(number, &issue.publications, BIBTEX)?;

    if let Some(dir) = single_issues_dir {
        let path = dir.join(splits::issue_file_name(number));
        fs::write(&path, block.render(&config.newsletter.source_name)).await?;
        info!(path = %path.display(), "Wrote single issue");
    }

    store.append_issue(block).await
}

#[instrument(level = "info", skip_all, fields(input = %args.input.display()))]
async fn run_dedup(args: DedupArgs) -> Result<(), Box<dyn Error>> {
    let catalog = json::read_catalog(&args.input).await?;
    let deduped = remove_duplicates(&catalog);
    info!(
        before = catalog.publication_count(),
        after = deduped.publication_count(),
        "Removed duplicates"
    );
    let output = args.output.unwrap_or(args.input);
    json::write_catalog(&deduped, &output).await
}

#[instrument(level = "info", skip_all, fields(input = %args.input.display()))]
async fn run_write_bib(config: &Config, args: WriteBibArgs) -> Result<(), Box<dyn Error>> {
    let catalog = json::read_catalog(&args.input).await?;
    let blocks = catalog
        .iter_desc()
        .map(|(number, publications)| build_issue_block(number, publications, BIBTEX))
        .collect::<Result<Vec<_>, _>>()?;

    let mut store = FileStore::new(&args.output, config.newsletter.source_name.clone());
    store.rewrite_all(&blocks).await?;
    info!(issues = blocks.len(), path = %store.path().display(), "Wrote bibliography");
    Ok(())
}

#[instrument(level = "info", skip_all, fields(bibliography = %args.bibliography.display()))]
async fn run_split(config: &Config, args: SplitArgs) -> Result<(), Box<dyn Error>> {
    let store = FileStore::new(&args.bibliography, config.newsletter.source_name.clone());
    let blocks = store.read_all().await?;
    if blocks.is_empty() {
        warn!("Bibliography is empty; nothing to split");
        return Ok(());
    }

    let source = &config.newsletter.source_name;
    splits::split_per_issue(source, &blocks, &args.single_issues_dir).await?;
    splits::split_per_year(source, &blocks, &config.years, &args.single_years_dir).await?;
    Ok(())
}

async fn run_count(args: CountArgs) -> Result<(), Box<dyn Error>> {
    let counts = splits::count_papers_per_year(&args.years_dir).await?;
    for count in &counts {
        info!(year = %count.year, n_papers = count.n_papers, "Papers per year");
    }
    splits::write_counts_csv(&counts, &args.output)
}

async fn run_info(args: InfoArgs) -> Result<(), Box<dyn Error>> {
    let catalog = json::read_catalog(&args.input).await?;
    if catalog.is_empty() {
        warn!(input = %args.input.display(), "Catalog is empty");
    }
    CatalogStats::from_catalog(&catalog).log();
    json::write_unresolved(&catalog, &args.null_papers).await
}

async fn run_dois(args: DoisArgs) -> Result<(), Box<dyn Error>> {
    let catalog = json::read_catalog(&args.input).await?;
    splits::write_doi_lists(&catalog, &args.output_dir, &args.prefix).await
}
