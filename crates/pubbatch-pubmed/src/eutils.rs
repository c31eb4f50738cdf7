//! NCBI E-utilities client (ESearch + EFetch)

use std::time::Duration;

use pubbatch_core::{RemoteError, get_text};
use serde::Deserialize;

use crate::client::{FetchClient, FetchedPage, SearchClient, SearchPage};
use crate::parser::parse_efetch_xml;

pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";

/// Connection settings for E-utilities.
///
/// NCBI asks every client to identify itself with `tool` and `email`;
/// an `api_key` raises the allowed rate from 3 to 10 requests/second.
#[derive(Debug, Clone)]
pub struct EutilsConfig {
    pub base_url: String,
    pub tool: String,
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for EutilsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            tool: "pubbatch".to_string(),
            email: None,
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Blocking E-utilities client implementing both client boundaries.
#[derive(Debug, Clone)]
pub struct EutilsClient {
    config: EutilsConfig,
}

impl EutilsClient {
    pub fn new(config: EutilsConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}", self.config.base_url.trim_end_matches('/'))
    }

    /// Parameters shared by every request
    fn identity_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string()), ("tool", self.config.tool.clone())];
        if let Some(email) = &self.config.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.config.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    fn search_params(&self, query: &str, offset: usize, page_size: usize) -> Vec<(&'static str, String)> {
        let mut params = self.identity_params();
        params.push(("term", query.to_string()));
        params.push(("retstart", offset.to_string()));
        params.push(("retmax", page_size.to_string()));
        params.push(("retmode", "json".to_string()));
        params
    }

    fn fetch_params(&self, ids: &[String]) -> Vec<(&'static str, String)> {
        let mut params = self.identity_params();
        params.push(("id", ids.join(",")));
        params.push(("rettype", "abstract".to_string()));
        params.push(("retmode", "xml".to_string()));
        params
    }
}

impl SearchClient for EutilsClient {
    fn search(&self, query: &str, offset: usize, page_size: usize) -> Result<SearchPage, RemoteError> {
        let params = self.search_params(query, offset, page_size);
        let body = get_text(&self.endpoint("esearch.fcgi"), &params, self.config.timeout)?;
        parse_esearch_json(&body)
    }
}

impl FetchClient for EutilsClient {
    fn fetch(&self, ids: &[String]) -> Result<FetchedPage, RemoteError> {
        if ids.is_empty() {
            return Ok(FetchedPage::default());
        }
        let params = self.fetch_params(ids);
        let body = get_text(&self.endpoint("efetch.fcgi"), &params, self.config.timeout)?;
        // NCBI occasionally answers 200 with a truncated or HTML body under load
        let parsed = parse_efetch_xml(&body)
            .map_err(|e| RemoteError::transient(format!("unreadable EFetch response: {e:#}")))?;
        Ok(FetchedPage::from_records(
            ids,
            parsed.into_iter().map(|a| a.into_record()),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: Option<ESearchResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

/// Parse an ESearch `retmode=json` body.
///
/// Query errors reported in the payload are fatal; rate-limit notices and
/// bodies that are not JSON at all are transient.
pub fn parse_esearch_json(body: &str) -> Result<SearchPage, RemoteError> {
    let response: ESearchResponse = serde_json::from_str(body)
        .map_err(|e| RemoteError::transient(format!("unreadable ESearch response: {e}")))?;

    if let Some(error) = response.error {
        if error.to_ascii_lowercase().contains("rate limit") {
            return Err(RemoteError::Transient {
                status: Some(429),
                message: error,
            });
        }
        return Err(RemoteError::fatal(format!("ESearch error: {error}")));
    }

    let result = response
        .esearchresult
        .ok_or_else(|| RemoteError::fatal("ESearch response without esearchresult"))?;

    if let Some(error) = result.error {
        return Err(RemoteError::fatal(format!("invalid query: {error}")));
    }

    let total_count = result
        .count
        .as_deref()
        .and_then(|c| c.trim().parse().ok())
        .ok_or_else(|| RemoteError::fatal("ESearch response without a numeric count"))?;

    Ok(SearchPage {
        ids: result.idlist,
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn parse_search_page() {
        let body = r#"{"header":{"type":"esearch","version":"0.3"},
            "esearchresult":{"count":"1234","retmax":"3","retstart":"0",
            "idlist":["39000001","39000002","39000003"],"translationset":[]}}"#;
        let page = parse_esearch_json(body).unwrap();
        assert_eq!(page.total_count, 1234);
        assert_eq!(page.ids, vec!["39000001", "39000002", "39000003"]);
    }

    #[test]
    fn parse_zero_results() {
        let body = r#"{"esearchresult":{"count":"0","retmax":"0","retstart":"0","idlist":[]}}"#;
        let page = parse_esearch_json(body).unwrap();
        assert_eq!(page.total_count, 0);
        assert!(page.ids.is_empty());
    }

    #[test]
    fn query_error_is_fatal() {
        let body = r#"{"esearchresult":{"ERROR":"Invalid query syntax"}}"#;
        let err = parse_esearch_json(body).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Invalid query syntax"));
    }

    #[test]
    fn rate_limit_error_is_transient() {
        let body = r#"{"error":"API rate limit exceeded","count":"11"}"#;
        let err = parse_esearch_json(body).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn other_top_level_error_is_fatal() {
        let body = r#"{"error":"Invalid API key"}"#;
        assert!(!parse_esearch_json(body).unwrap_err().is_retryable());
    }

    #[test]
    fn html_body_is_transient() {
        let err = parse_esearch_json("<html>Service Unavailable</html>").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_count_is_fatal() {
        let body = r#"{"esearchresult":{"idlist":["1"]}}"#;
        assert!(!parse_esearch_json(body).unwrap_err().is_retryable());
    }

    #[test]
    fn identity_params_include_key_and_email() {
        let client = EutilsClient::new(EutilsConfig {
            email: Some("me@example.org".into()),
            api_key: Some("secret".into()),
            ..Default::default()
        });
        let params = client.search_params("crispr", 200, 100);
        assert_eq!(param(&params, "db"), Some("pubmed"));
        assert_eq!(param(&params, "tool"), Some("pubbatch"));
        assert_eq!(param(&params, "email"), Some("me@example.org"));
        assert_eq!(param(&params, "api_key"), Some("secret"));
        assert_eq!(param(&params, "retstart"), Some("200"));
        assert_eq!(param(&params, "retmax"), Some("100"));
        assert_eq!(param(&params, "retmode"), Some("json"));
    }

    #[test]
    fn anonymous_params_omit_key() {
        let client = EutilsClient::new(EutilsConfig::default());
        let params = client.fetch_params(&["1".into(), "2".into()]);
        assert_eq!(param(&params, "api_key"), None);
        assert_eq!(param(&params, "email"), None);
        assert_eq!(param(&params, "id"), Some("1,2"));
        assert_eq!(param(&params, "retmode"), Some("xml"));
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let client = EutilsClient::new(EutilsConfig::default());
        assert_eq!(
            client.endpoint("esearch.fcgi"),
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"
        );
    }

    #[test]
    fn fetch_empty_ids_makes_no_request() {
        let client = EutilsClient::new(EutilsConfig {
            base_url: "http://127.0.0.1:1/".into(),
            ..Default::default()
        });
        let page = client.fetch(&[]).unwrap();
        assert!(page.records.is_empty() && page.failed_ids.is_empty());
    }
}
