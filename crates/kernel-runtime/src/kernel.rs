//! `Kernel`: the explicit, process-owned value that replaces the ambient
//! globals a dynamic-language reference implementation would reach for.
//! Constructed once at the entry point and threaded through the dispatch
//! surface — no singleton statics anywhere in this crate.

use crate::audit::AuditLogger;
use crate::config::KernelConfig;
use crate::dispatch::Dispatch;
use crate::embeddings::FastEmbedProvider;
use crate::errors::KernelError;
use crate::events::EventBus;
use crate::ghost::{GhostIndex, GhostIndexConfig};
use crate::metadata_index::MetadataIndex;
use crate::metrics::KernelMetrics;
use crate::vector_store::InMemoryVectorStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Kernel wired with the default in-process backends: an in-memory
/// vector store and the local FastEmbed embedding provider. Swapping
/// either for a remote backend (Qdrant, an API-based embedder) only
/// requires a different type parameter — the rest of the kernel is
/// generic over `VectorStore`/`EmbeddingProvider`.
pub type DefaultDispatch = Dispatch<InMemoryVectorStore, FastEmbedProvider>;

pub struct Kernel {
    pub config: KernelConfig,
    pub dispatch: Arc<DefaultDispatch>,
    pub metadata_index: Arc<MetadataIndex>,
    pub events: Arc<EventBus>,
    pub metrics: Arc<KernelMetrics>,
    pub audit: Arc<AuditLogger>,
}

impl Kernel {
    /// Build a Kernel from config: scan the skills root, seed the
    /// Metadata Index and Ghost Index, and construct the dispatch
    /// gateway. Exit-code-relevant failures (missing skills root,
    /// unreadable metadata index) are surfaced distinctly so the CLI
    /// layer can map them to the documented exit codes.
    pub async fn bootstrap(config: KernelConfig) -> Result<Self> {
        if !config.skills_root_path.is_dir() {
            anyhow::bail!(KernelBootstrapError::SkillsRootNotFound(
                config.skills_root_path.display().to_string()
            ));
        }

        let cache_dir = config
            .skills_root_path
            .parent()
            .map(|p| p.join(".skill-kernel-cache"))
            .unwrap_or_else(|| std::path::PathBuf::from(".skill-kernel-cache"));
        let index_path = cache_dir.join("metadata_index.json");

        let metadata_index = Arc::new(
            MetadataIndex::load_or_empty(index_path)
                .map_err(|err| KernelBootstrapError::MetadataIndexUnreadable(err.to_string()))
                .context("failed to load metadata index")?,
        );

        let records = MetadataIndex::scan(&config.skills_root_path)
            .context("failed to scan skills root")?;
        metadata_index.replace_all(records.clone());
        metadata_index.persist().context("failed to persist metadata index")?;

        let embedder =
            Arc::new(FastEmbedProvider::new().context("failed to initialize embedding provider")?);
        let ghost_index = Arc::new(
            GhostIndex::new(
                Arc::new(InMemoryVectorStore::new()),
                embedder,
                GhostIndexConfig {
                    search_limit: config.ghost_search_limit,
                    similarity_threshold: config.ghost_similarity_threshold,
                    retrieval_multiplier: 3,
                },
            )
            .context("failed to construct ghost index")?,
        );
        ghost_index.rebuild(&records).await.context("failed to build ghost index")?;

        let events = Arc::new(EventBus::new());
        let metrics = Arc::new(KernelMetrics::new());
        let audit = Arc::new(AuditLogger::new(AuditLogger::default_path()).context("failed to open audit log")?);

        let dispatch = Arc::new(Dispatch::new(
            config.skills_root_path.clone(),
            config.max_resident_skills,
            config.pinned_skills.clone(),
            config.active_skill_cognitive_threshold,
            Duration::from_secs(config.per_command_timeout_s),
            metadata_index.clone(),
            ghost_index,
            events.clone(),
            metrics.clone(),
            audit.clone(),
        ));

        Ok(Self {
            config,
            dispatch,
            metadata_index,
            events,
            metrics,
            audit,
        })
    }

    pub async fn invoke(&self, target: &str, args: serde_json::Value, session_id: &str) -> Result<serde_json::Value, KernelError> {
        self.dispatch.invoke(target, args, session_id).await
    }
}

/// Distinguishes the two kernel-construction failures the CLI's exit-code
/// contract cares about from the generic `anyhow` chain.
#[derive(Debug, thiserror::Error)]
pub enum KernelBootstrapError {
    #[error("skills root not found: {0}")]
    SkillsRootNotFound(String),
    #[error("metadata index unreadable: {0}")]
    MetadataIndexUnreadable(String),
}
