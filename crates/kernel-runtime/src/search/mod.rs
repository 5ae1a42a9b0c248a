//! Search module for hybrid retrieval
//!
//! Provides combined dense (vector) and sparse (BM25) search capabilities
//! with Reciprocal Rank Fusion, used by the ghost-tool index to score
//! unloaded skills against a user query.

#[cfg(feature = "hybrid-search")]
mod bm25;
#[cfg(feature = "hybrid-search")]
mod hybrid;
mod fusion;

pub use fusion::{FusionMethod, reciprocal_rank_fusion, weighted_sum_fusion, max_score_fusion};

#[cfg(feature = "hybrid-search")]
pub use bm25::{BM25Index, BM25Config, BM25SearchResult};
#[cfg(feature = "hybrid-search")]
pub use hybrid::{HybridRetriever, HybridConfig, HybridSearchResult};
