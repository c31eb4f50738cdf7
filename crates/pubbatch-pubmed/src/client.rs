//! Search and fetch client boundaries
//!
//! Id search is cheap and paged; full record fetch is expensive and keyed
//! by ids, so the two are separate traits. [`crate::eutils::EutilsClient`]
//! implements both against NCBI; tests substitute in-memory fakes.

use pubbatch_core::{ArticleRecord, RemoteError};
use rustc_hash::FxHashMap;

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Identifiers in service order
    pub ids: Vec<String>,
    /// Service's estimate of the full result count
    pub total_count: usize,
}

/// Result of fetching a set of identifiers.
#[derive(Debug, Default)]
pub struct FetchedPage {
    pub records: FxHashMap<String, ArticleRecord>,
    /// Requested ids the service could not resolve
    pub failed_ids: Vec<String>,
}

impl FetchedPage {
    /// Match fetched records against the request.
    ///
    /// Records for ids that were not requested are ignored; requested ids
    /// without a record become `failed_ids`, in request order.
    pub fn from_records(requested: &[String], records: impl IntoIterator<Item = ArticleRecord>) -> Self {
        let mut by_id: FxHashMap<String, ArticleRecord> = FxHashMap::default();
        for record in records {
            if requested.iter().any(|id| id == record.pmid()) {
                by_id.entry(record.pmid().to_string()).or_insert(record);
            } else {
                log::debug!("ignoring unrequested record {}", record.pmid());
            }
        }
        let failed_ids = requested
            .iter()
            .filter(|id| !by_id.contains_key(id.as_str()))
            .cloned()
            .collect();
        Self {
            records: by_id,
            failed_ids,
        }
    }
}

/// Paged identifier search.
pub trait SearchClient {
    fn search(&self, query: &str, offset: usize, page_size: usize) -> Result<SearchPage, RemoteError>;
}

/// Full-record fetch by identifier.
pub trait FetchClient {
    fn fetch(&self, ids: &[String]) -> Result<FetchedPage, RemoteError>;
}
