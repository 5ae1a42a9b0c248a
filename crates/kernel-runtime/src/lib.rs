//! Skill Kernel runtime: the hot-reloadable, permission-checked dispatch
//! substrate that turns a directory of user-defined skills into a single
//! `invoke(target, args)` surface for an LLM agent.
//!
//! # Architecture
//!
//! ```text
//!                      ┌────────────┐
//!                      │   Kernel   │  (owns everything below; no globals)
//!                      └─────┬──────┘
//!        ┌───────────┬───────┴───────┬────────────┬────────────┐
//!        ▼           ▼               ▼            ▼            ▼
//!  ┌──────────┐ ┌──────────┐  ┌─────────────┐ ┌─────────┐ ┌─────────┐
//!  │  Loader  │ │ Resident │  │ Gatekeeper  │ │  Ghost  │ │  Event  │
//!  │  (JIT)   │ │   Set    │  │             │ │  Index  │ │   Bus   │
//!  └──────────┘ └──────────┘  └─────────────┘ └─────────┘ └─────────┘
//!        └───────────┴───────────────┴────────────┴────────────┘
//!                             │
//!                      Dispatch Gateway
//! ```
//!
//! A background `ReloadController` keeps the Metadata Index and Ghost Index
//! fresh as skills are added or edited on disk; the Dispatch Gateway's own
//! freshness check reloads a resident skill's command table the next time
//! it's invoked after a change.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use kernel_runtime::{Kernel, KernelConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = KernelConfig::default();
//! let kernel = Kernel::bootstrap(config).await?;
//! let result = kernel.invoke("git.status", serde_json::json!({}), "session-1").await;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! - `fastembed` (default): local ONNX embedding provider for the Ghost Index.
//! - `qdrant`: a remote `VectorStore` backend, as an alternative to the
//!   in-memory default.
//! - `hybrid-search`: BM25 sparse retrieval fused with dense search via
//!   Reciprocal Rank Fusion.

#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod embeddings;
pub mod errors;
pub mod events;
pub mod gatekeeper;
pub mod ghost;
pub mod kernel;
pub mod loader;
pub mod manifest;
pub mod metadata_index;
pub mod metrics;
pub mod reload;
pub mod resident;
pub mod resources;
pub mod search;
pub mod session;
pub mod types;
pub mod vector_store;

pub use audit::{AuditEntry, AuditEventType, AuditLogger};
pub use config::KernelConfig;
pub use dispatch::Dispatch;
pub use errors::{KernelError, Result};
pub use events::{EventBus, StopFlag, Subscription};
pub use gatekeeper::{GateDecision, Gatekeeper};
pub use ghost::{GhostIndex, GhostIndexConfig, GhostMatch};
pub use kernel::{DefaultDispatch, Kernel, KernelBootstrapError};
pub use loader::Loader;
pub use metadata_index::MetadataIndex;
pub use metrics::{KernelMetrics, MetricsSnapshot};
pub use reload::ReloadController;
pub use resident::ResidentSet;
pub use resources::HeavyResourceRegistry;
pub use session::SessionManager;
pub use types::{
    Callable, Category, Command, DeclaredCommand, Event, InvokeTarget, MetadataRecord, Permission,
    RequiredPermission, SchemaParam, Session, Skill, SkillManifestInfo, Topic,
};

pub use vector_store::{
    cosine_similarity, euclidean_distance, DeleteStats, DistanceMetric, DocumentMetadata,
    EmbeddedDocument, Filter, HealthStatus, InMemoryVectorStore, SearchResult, UpsertStats,
    VectorStore,
};

#[cfg(feature = "qdrant")]
pub use vector_store::{QdrantConfig, QdrantVectorStore};

pub use embeddings::{
    create_provider, EmbeddingConfig, EmbeddingProvider, EmbeddingProviderFactory,
    EmbeddingProviderType, OllamaProvider, OpenAIEmbedProvider,
};

#[cfg(feature = "fastembed")]
pub use embeddings::{FastEmbedModel, FastEmbedProvider};

pub use search::{max_score_fusion, reciprocal_rank_fusion, weighted_sum_fusion, FusionMethod};

#[cfg(feature = "hybrid-search")]
pub use search::{
    BM25Config, BM25Index, BM25SearchResult, HybridConfig, HybridRetriever, HybridSearchResult,
};
