//! Error taxonomy for remote calls and the retrieval pipeline

/// Which remote call of the pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    Fetch,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Fetch => "fetch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Error from a single search or fetch call.
///
/// `Transient` covers timeouts, connection resets, 429 and 5xx responses;
/// it is retried with backoff. `Fatal` covers malformed queries and
/// authentication rejections and is surfaced immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    Transient {
        status: Option<u16>,
        message: String,
    },
    Fatal {
        status: Option<u16>,
        message: String,
    },
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient {
                status: Some(s),
                message,
            }
            | Self::Fatal {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Transient {
                status: None,
                message,
            } => write!(f, "transient error: {message}"),
            Self::Fatal {
                status: None,
                message,
            } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || (500..=599).contains(&status) {
            Self::Transient {
                status: Some(status),
                message,
            }
        } else {
            Self::Fatal {
                status: Some(status),
                message,
            }
        }
    }

    /// Classify a reqwest error. The URL is stripped so API keys never reach logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            let status = status.as_u16();
            return Self::from_status(status, e.without_url().to_string());
        }
        let builder = e.is_builder();
        let message = e.without_url().to_string();
        if builder {
            Self::fatal(message)
        } else {
            // timeouts, connect failures, resets, truncated bodies
            Self::transient(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Fatal { status, .. } => *status,
        }
    }
}

/// Run-aborting failure of the retrieval pipeline.
///
/// Every variant carries the stage, the query and the number of articles
/// handed downstream before the failure, so a user can narrow the query
/// and try again.
#[derive(Debug)]
pub enum RetrievalError {
    /// A transient error persisted through every retry.
    Exhausted {
        stage: Stage,
        query: String,
        processed: usize,
        attempts: u32,
        source: RemoteError,
    },
    /// A non-retryable error on the first occurrence.
    Rejected {
        stage: Stage,
        query: String,
        processed: usize,
        source: RemoteError,
    },
    /// Shutdown was requested (SIGINT/SIGTERM) before the next remote call.
    Interrupted {
        stage: Stage,
        query: String,
        processed: usize,
    },
}

impl std::fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted {
                stage,
                query,
                processed,
                attempts,
                source,
            } => write!(
                f,
                "{stage} failed for query {query:?} after {attempts} attempts \
                 ({processed} articles processed before failure): {source}"
            ),
            Self::Rejected {
                stage,
                query,
                processed,
                source,
            } => write!(
                f,
                "{stage} rejected for query {query:?} \
                 ({processed} articles processed before failure): {source}"
            ),
            Self::Interrupted {
                stage,
                query,
                processed,
            } => write!(
                f,
                "interrupted before {stage} for query {query:?} \
                 ({processed} articles processed before interruption)"
            ),
        }
    }
}

impl std::error::Error for RetrievalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted { source, .. } | Self::Rejected { source, .. } => Some(source),
            Self::Interrupted { .. } => None,
        }
    }
}

impl RetrievalError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Exhausted { stage, .. }
            | Self::Rejected { stage, .. }
            | Self::Interrupted { stage, .. } => *stage,
        }
    }

    pub fn processed(&self) -> usize {
        match self {
            Self::Exhausted { processed, .. }
            | Self::Rejected { processed, .. }
            | Self::Interrupted { processed, .. } => *processed,
        }
    }

    pub fn query(&self) -> &str {
        match self {
            Self::Exhausted { query, .. }
            | Self::Rejected { query, .. }
            | Self::Interrupted { query, .. } => query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_500_retryable() {
        assert!(RemoteError::from_status(500, "boom").is_retryable());
        assert!(RemoteError::from_status(503, "busy").is_retryable());
    }

    #[test]
    fn status_429_retryable() {
        assert!(RemoteError::from_status(429, "slow down").is_retryable());
    }

    #[test]
    fn status_400_not_retryable() {
        assert!(!RemoteError::from_status(400, "bad term").is_retryable());
    }

    #[test]
    fn status_401_403_not_retryable() {
        assert!(!RemoteError::from_status(401, "auth").is_retryable());
        assert!(!RemoteError::from_status(403, "forbidden").is_retryable());
    }

    #[test]
    fn status_is_kept() {
        assert_eq!(RemoteError::from_status(502, "x").status(), Some(502));
        assert_eq!(RemoteError::transient("reset").status(), None);
    }

    #[test]
    fn display_with_status() {
        let err = RemoteError::from_status(404, "test");
        assert_eq!(format!("{err}"), "HTTP 404: test");
    }

    #[test]
    fn display_transient_without_status() {
        let err = RemoteError::transient("timeout");
        assert_eq!(format!("{err}"), "transient error: timeout");
    }

    #[test]
    fn retrieval_error_reports_stage_query_processed() {
        let err = RetrievalError::Exhausted {
            stage: Stage::Fetch,
            query: "crispr".to_string(),
            processed: 120,
            attempts: 4,
            source: RemoteError::from_status(503, "unavailable"),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("fetch failed"));
        assert!(msg.contains("\"crispr\""));
        assert!(msg.contains("120 articles"));
        assert!(msg.contains("4 attempts"));
        assert_eq!(err.stage(), Stage::Fetch);
        assert_eq!(err.processed(), 120);
        assert_eq!(err.query(), "crispr");
    }

    #[test]
    fn rejected_has_source() {
        use std::error::Error;
        let err = RetrievalError::Rejected {
            stage: Stage::Search,
            query: "q".to_string(),
            processed: 0,
            source: RemoteError::from_status(400, "bad"),
        };
        assert!(err.source().is_some());
        assert!(format!("{err}").starts_with("search rejected"));
    }

    #[test]
    fn interrupted_has_no_source() {
        use std::error::Error;
        let err = RetrievalError::Interrupted {
            stage: Stage::Search,
            query: "q".to_string(),
            processed: 3,
        };
        assert!(err.source().is_none());
        assert_eq!(err.processed(), 3);
    }
}
