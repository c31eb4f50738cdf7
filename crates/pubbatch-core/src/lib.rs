//! Pubbatch Core - Common infrastructure for literature retrieval and batching
//!
//! This crate provides the pieces shared by the PubMed retrieval pipeline
//! and the batch assembler: the article record, the remote error taxonomy,
//! retry/backoff, call pacing, HTTP plumbing, logging and progress.

pub mod article;
pub mod error;
pub mod http;
pub mod logging;
pub mod pacer;
pub mod progress;
pub mod retry;
pub mod shutdown;

// Re-exports for convenience
pub use article::{ArticleRecord, TEXT_SEPARATOR};
pub use error::{RemoteError, RetrievalError, Stage};
pub use http::get_text;
pub use logging::{RunLogger, init_logging};
pub use pacer::{Clock, Pacer, SystemClock};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{GaveUp, RetryPolicy, RetryState, backoff_delay};
pub use shutdown::{install_signal_handlers, shutdown_flag};
