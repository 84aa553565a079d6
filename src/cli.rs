//! Command-line interface definitions.
//!
//! Every subcommand works on files under `out/` and `res/` by default, so the
//! usual maintenance run is just `newsletter_bibliography update`.

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Build and maintain a BibTeX bibliography of the papers listed by a
/// newsletter.
///
/// # Examples
///
/// ```sh
/// # Append every issue published since the last run
/// newsletter_bibliography update
///
/// # Scrape a folder of saved issue pages into the JSON catalog
/// newsletter_bibliography scrape --directory ./html
///
/// # Drop repeated DOIs, then rebuild the bibliography from the catalog
/// newsletter_bibliography dedup --output out/issues_no_duplicates.json
/// newsletter_bibliography write-bib --input out/issues_no_duplicates.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Contact e-mail sent to CrossRef (overrides the config file)
    #[arg(long, global = true, env = "CROSSREF_MAILTO")]
    pub mailto: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract, enrich and store the papers of one or more issue pages
    Scrape(ScrapeArgs),
    /// Fetch issues newer than the bibliography and prepend them to it
    Update(UpdateArgs),
    /// Remove DOIs listed by more than one issue, keeping the newest
    Dedup(DedupArgs),
    /// Write a relabeled bibliography from a JSON catalog
    WriteBib(WriteBibArgs),
    /// Split the bibliography into per-issue and per-year files
    Split(SplitArgs),
    /// Count papers per year file and write them as CSV
    Count(CountArgs),
    /// Print catalog statistics and list the papers without DOI
    Info(InfoArgs),
    /// Write the catalog's DOIs, plain and annotated with their issue
    Dois(DoisArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).multiple(false)))]
pub struct ScrapeArgs {
    /// URL of an issue page
    #[arg(short, long, group = "input")]
    pub url: Option<String>,

    /// Directory of saved issue pages (`*.html`)
    #[arg(short, long, group = "input")]
    pub directory: Option<PathBuf>,

    /// A single saved issue page
    #[arg(short, long, group = "input")]
    pub file: Option<PathBuf>,

    /// Citation format requested from the DOI resolver (default from config)
    #[arg(short, long)]
    pub output_format: Option<String>,

    /// Catalog to extend
    #[arg(long, default_value = "out/issues.json")]
    pub issues_json: PathBuf,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Bibliography file whose first line names the latest issue
    #[arg(short, long, default_value = "res/MathOncoBibliography.bib")]
    pub bibliography: PathBuf,

    /// Directory receiving one `.bib` file per new issue
    #[arg(short, long, default_value = "res/single_issues")]
    pub single_issues_dir: PathBuf,

    /// Discover new issues through the RSS feed instead of sequential URLs
    #[arg(long)]
    pub feed: bool,

    /// Fetch and relabel new issues without writing any file
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct DedupArgs {
    #[arg(short, long, default_value = "out/issues.json")]
    pub input: PathBuf,

    /// Defaults to rewriting the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WriteBibArgs {
    #[arg(short, long, default_value = "out/issues.json")]
    pub input: PathBuf,

    #[arg(short, long, default_value = "res/MathOncoBibliography.bib")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    #[arg(short, long, default_value = "res/MathOncoBibliography.bib")]
    pub bibliography: PathBuf,

    #[arg(long, default_value = "res/single_issues")]
    pub single_issues_dir: PathBuf,

    #[arg(long, default_value = "res/single_years")]
    pub single_years_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct CountArgs {
    /// Directory of per-year bibliographies
    #[arg(short, long, default_value = "res/single_years")]
    pub years_dir: PathBuf,

    #[arg(short, long, default_value = "out/n_papers_per_year.csv")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[arg(short, long, default_value = "out/issues.json")]
    pub input: PathBuf,

    /// Where to list the papers without DOI
    #[arg(long, default_value = "out/null_papers.json")]
    pub null_papers: PathBuf,
}

#[derive(Args, Debug)]
pub struct DoisArgs {
    #[arg(short, long, default_value = "out/issues_no_duplicates.json")]
    pub input: PathBuf,

    #[arg(short, long, default_value = "out")]
    pub output_dir: PathBuf,

    /// File name prefix of the two lists
    #[arg(short, long, default_value = "MathOnco")]
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_defaults() {
        let cli = Cli::parse_from(["newsletter_bibliography", "update"]);
        let Command::Update(args) = cli.command else {
            panic!("expected update");
        };
        assert_eq!(args.bibliography, PathBuf::from("res/MathOncoBibliography.bib"));
        assert_eq!(args.single_issues_dir, PathBuf::from("res/single_issues"));
        assert!(!args.feed);
        assert!(!args.dry_run);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_update_dry_run() {
        let cli = Cli::parse_from(["newsletter_bibliography", "update", "--dry-run"]);
        assert!(matches!(cli.command, Command::Update(UpdateArgs { dry_run: true, .. })));
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from([
            "newsletter_bibliography",
            "update",
            "--feed",
            "--config",
            "conf.yaml",
            "--mailto",
            "someone@example.org",
        ]);
        assert_eq!(cli.config.as_deref(), Some("conf.yaml"));
        assert_eq!(cli.mailto.as_deref(), Some("someone@example.org"));
        assert!(matches!(cli.command, Command::Update(UpdateArgs { feed: true, .. })));
    }

    #[test]
    fn test_scrape_short_flags() {
        let cli = Cli::parse_from([
            "newsletter_bibliography",
            "scrape",
            "-d",
            "/tmp/html",
            "-o",
            "ris",
        ]);
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.directory, Some(PathBuf::from("/tmp/html")));
        assert_eq!(args.output_format.as_deref(), Some("ris"));
        assert_eq!(args.issues_json, PathBuf::from("out/issues.json"));
    }

    #[test]
    fn test_scrape_requires_exactly_one_input() {
        assert!(Cli::try_parse_from(["newsletter_bibliography", "scrape"]).is_err());
        assert!(
            Cli::try_parse_from([
                "newsletter_bibliography",
                "scrape",
                "--url",
                "https://example.com/p/issue-1",
                "--file",
                "issue-1.html",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_dedup_output_defaults_to_none() {
        let cli = Cli::parse_from(["newsletter_bibliography", "dedup", "-i", "a.json"]);
        let Command::Dedup(args) = cli.command else {
            panic!("expected dedup");
        };
        assert_eq!(args.input, PathBuf::from("a.json"));
        assert!(args.output.is_none());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
