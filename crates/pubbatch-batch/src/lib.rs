//! Pubbatch Batch - token-bounded batching of article records
//!
//! Packs an ordered stream of [`pubbatch_core::ArticleRecord`]s into
//! batches whose combined token count stays within a limit, and keeps the
//! run statistics alongside.
//!
//! Packing is greedy and online: order is preserved, abstract-less articles
//! are skipped, and an article larger than the limit on its own becomes a
//! one-article batch instead of being dropped.

pub mod assembler;
pub mod batch;
pub mod metrics;
pub mod token;

// Re-exports
pub use assembler::{Assembler, assemble, try_assemble};
pub use batch::Batch;
pub use metrics::{MetricsAggregator, RunSummary};
pub use token::{Cl100kCounter, TokenCounter, WhitespaceCounter};
