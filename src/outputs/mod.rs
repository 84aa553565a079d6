//! Output generation: the bibliography store, the JSON catalog and derived
//! split/count/DOI files.
//!
//! # Submodules
//!
//! - [`bibliography`]: flat `.bib` file with per-issue markers and the
//!   [`bibliography::BibliographyStore`] abstraction over it
//! - [`json`]: issue catalog (`issues.json`) and the list of papers without DOI
//! - [`splits`]: per-issue and per-year files, paper counts, DOI lists
//!
//! # Output Structure
//!
//! ```text
//! out/
//! ├── issues.json
//! ├── issues_no_duplicates.json
//! ├── null_papers.json
//! └── n_papers_per_year.csv
//!
//! res/
//! ├── MathOncoBibliography.bib
//! ├── single_issues/issue_<N>.bib
//! └── single_years/issues_in_year_<YEAR>.bib
//! ```

pub mod bibliography;
pub mod json;
pub mod splits;
