//! Pubbatch PubMed - query-driven retrieval of PubMed articles
//!
//! Searches PubMed with a query, pages through the matching identifiers and
//! fetches full records, yielding [`pubbatch_core::ArticleRecord`]s in
//! search order.
//!
//! # Features
//!
//! - NCBI E-utilities client (ESearch JSON + EFetch XML)
//! - Streaming XML parsing with quick-xml
//! - Paced, retried remote calls with a lazily consumed record stream
//!
//! # Example
//!
//! ```ignore
//! use pubbatch_core::SystemClock;
//! use pubbatch_pubmed::{EutilsClient, EutilsConfig, RetrievalConfig, SearchQuery, retrieve};
//!
//! let client = EutilsClient::new(EutilsConfig::default());
//! let term = SearchQuery::new("crispr").reviews_only(true).to_term();
//! let (records, stats) = retrieve(&client, &client, &term, &RetrievalConfig::default(), SystemClock)?;
//! println!("{} records ({} unresolved)", records.len(), stats.fetch_failed);
//! ```

pub mod client;
pub mod config;
pub mod eutils;
pub mod parser;
pub mod query;
pub mod retrieval;

// Re-exports
pub use client::{FetchClient, FetchedPage, SearchClient, SearchPage};
pub use config::RetrievalConfig;
pub use eutils::{DEFAULT_BASE_URL, EutilsClient, EutilsConfig, parse_esearch_json};
pub use parser::{ParsedArticle, parse_efetch_xml};
pub use query::{DateRange, SearchQuery};
pub use retrieval::{Retrieval, RetrievalStats, SEARCH_WINDOW, retrieve};
