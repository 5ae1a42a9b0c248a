//! The Ghost-Tool Index: semantic search over skills that are *not*
//! currently resident, so an agent can discover a tool it never asked for
//! by name.
//!
//! Every record in the Metadata Index is embedded once (its declared
//! commands' names/descriptions plus a protocol excerpt) and upserted into
//! a vector store. A query embeds the same way and is compared by cosine
//! similarity; with the `hybrid-search` feature on, a BM25 sparse index is
//! fused in via Reciprocal Rank Fusion for exact-keyword recall the dense
//! embedding alone would miss.

use crate::embeddings::EmbeddingProvider;
use crate::search::fusion::reciprocal_rank_fusion;
use crate::types::MetadataRecord;
use crate::vector_store::{EmbeddedDocument, Filter, VectorStore};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "hybrid-search")]
use crate::search::BM25Index;
#[cfg(feature = "hybrid-search")]
use std::sync::RwLock;

/// A single ghost search hit.
#[derive(Debug, Clone)]
pub struct GhostMatch {
    pub skill_id: String,
    pub score: f32,
}

/// Tunables for ghost search, mirroring the kernel config fields this
/// index is driven by.
#[derive(Debug, Clone)]
pub struct GhostIndexConfig {
    pub search_limit: usize,
    pub similarity_threshold: f32,
    /// How many results to pull from each retrieval source before fusion,
    /// as a multiplier of `search_limit`.
    pub retrieval_multiplier: usize,
}

impl Default for GhostIndexConfig {
    fn default() -> Self {
        Self {
            search_limit: 5,
            similarity_threshold: 0.5,
            retrieval_multiplier: 3,
        }
    }
}

pub struct GhostIndex<V: VectorStore, E: EmbeddingProvider> {
    vector_store: Arc<V>,
    embedder: Arc<E>,
    config: GhostIndexConfig,
    #[cfg(feature = "hybrid-search")]
    sparse_index: RwLock<BM25Index>,
}

impl<V: VectorStore, E: EmbeddingProvider> GhostIndex<V, E> {
    pub fn new(vector_store: Arc<V>, embedder: Arc<E>, config: GhostIndexConfig) -> Result<Self> {
        Ok(Self {
            vector_store,
            embedder,
            config,
            #[cfg(feature = "hybrid-search")]
            sparse_index: RwLock::new(
                BM25Index::new(crate::search::BM25Config::in_memory())
                    .context("failed to create ghost index BM25 store")?,
            ),
        })
    }

    /// Rebuild the index wholesale from the current Metadata Index
    /// contents. Called after a scan or a skill add/remove event.
    pub async fn rebuild(&self, records: &[MetadataRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(record_text).collect();
        let embeddings = self
            .embedder
            .embed_documents_batched(texts.clone())
            .await
            .context("failed to embed skill records for ghost index")?;

        let documents: Vec<EmbeddedDocument> = records
            .iter()
            .zip(embeddings)
            .map(|(record, embedding)| {
                EmbeddedDocument::new(record.id.clone(), embedding)
                    .with_skill_name(record.id.clone())
                    .with_content(record_text(record))
            })
            .collect();

        self.vector_store
            .upsert(documents)
            .await
            .context("failed to upsert ghost index documents")?;

        #[cfg(feature = "hybrid-search")]
        {
            let mut sparse = self.sparse_index.write().expect("ghost sparse index lock poisoned");
            sparse.clear()?;
            for (record, text) in records.iter().zip(&texts) {
                sparse.add_document(&record.id, &record.id, &record.id, &record.description_line(), text)?;
            }
            sparse.commit()?;
        }

        Ok(())
    }

    /// Semantic search over the not-currently-resident skills, excluding
    /// `exclude` (the active/resident set) from the results.
    pub async fn search(&self, query: &str, exclude: &HashSet<String>) -> Result<Vec<GhostMatch>> {
        let expanded_k = self.config.search_limit * self.config.retrieval_multiplier.max(1);

        let query_embedding = self
            .embedder
            .embed_query(query)
            .await
            .context("failed to embed ghost search query")?;

        let dense_hits = self
            .vector_store
            .search(query_embedding, None::<Filter>, expanded_k)
            .await
            .context("ghost dense search failed")?;

        let dense_ranked: Vec<(String, f32)> =
            dense_hits.iter().map(|r| (r.id.clone(), r.score)).collect();

        #[cfg(feature = "hybrid-search")]
        let fused: Vec<(String, f32)> = {
            let sparse_hits = {
                let sparse = self.sparse_index.read().expect("ghost sparse index lock poisoned");
                sparse.search(query, expanded_k)?
            };
            let sparse_ranked: Vec<(String, f32)> =
                sparse_hits.iter().map(|r| (r.id.clone(), r.score)).collect();
            reciprocal_rank_fusion(
                vec![("dense", dense_ranked), ("sparse", sparse_ranked)],
                60.0,
                expanded_k,
            )
            .into_iter()
            .map(|f| (f.id, f.score))
            .collect()
        };

        #[cfg(not(feature = "hybrid-search"))]
        let fused: Vec<(String, f32)> = dense_ranked;

        let matches = fused
            .into_iter()
            .filter(|(id, score)| !exclude.contains(id) && *score >= self.config.similarity_threshold)
            .take(self.config.search_limit)
            .map(|(skill_id, score)| GhostMatch { skill_id, score })
            .collect();

        Ok(matches)
    }

    pub fn config(&self) -> &GhostIndexConfig {
        &self.config
    }
}

fn record_text(record: &MetadataRecord) -> String {
    let command_names: Vec<&str> = record
        .declared_commands
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    let command_descriptions: Vec<&str> = record
        .declared_commands
        .iter()
        .map(|c| c.description.as_str())
        .collect();

    format!(
        "{} {} {} {}",
        record.id,
        command_names.join(" "),
        command_descriptions.join(" "),
        record.protocol_excerpt
    )
}

#[cfg(feature = "hybrid-search")]
trait DescriptionLine {
    fn description_line(&self) -> String;
}

#[cfg(feature = "hybrid-search")]
impl DescriptionLine for MetadataRecord {
    fn description_line(&self) -> String {
        self.protocol_excerpt.lines().next().unwrap_or_default().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::InMemoryVectorStore;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let has_git = t.contains("git") as i32 as f32;
                    let has_fs = t.contains("filesystem") as i32 as f32;
                    vec![has_git, has_fs]
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "stub"
        }

        fn provider_name(&self) -> &str {
            "stub"
        }
    }

    fn record(id: &str, keyword: &str) -> MetadataRecord {
        MetadataRecord {
            id: id.to_string(),
            path: "/skills".into(),
            content_hash: "abc".into(),
            declared_commands: vec![],
            declared_permissions: vec![],
            keywords: vec![keyword.to_string()],
            embedding: None,
            protocol_excerpt: format!("{keyword} protocol"),
        }
    }

    #[tokio::test]
    async fn rebuild_and_search_finds_matching_skill() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(StubEmbedder);
        let config = GhostIndexConfig {
            search_limit: 5,
            similarity_threshold: 0.0,
            retrieval_multiplier: 3,
        };
        let index = GhostIndex::new(store, embedder, config).unwrap();

        let records = vec![record("git", "git"), record("filesystem", "filesystem")];
        index.rebuild(&records).await.unwrap();

        let results = index.search("git", &HashSet::new()).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].skill_id, "git");
    }

    #[tokio::test]
    async fn resident_skills_are_shadowed_out() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(StubEmbedder);
        let index = GhostIndex::new(store, embedder, GhostIndexConfig::default()).unwrap();

        let records = vec![record("git", "git")];
        index.rebuild(&records).await.unwrap();

        let mut exclude = HashSet::new();
        exclude.insert("git".to_string());
        let results = index.search("git", &exclude).await.unwrap();
        assert!(results.is_empty());
    }
}
