//! Hot Reload Controller: a background task that periodically rescans the
//! skills root, refreshes the Metadata Index, rebuilds the Ghost Index,
//! and publishes `skill/loaded` events for anything new so the Dispatch
//! Gateway's next freshness check picks up the change.
//!
//! The dispatch gateway's own freshness check (compare mtimes on `get`)
//! is what actually reloads a *resident* skill's command table; this
//! controller's job is keeping the discovery-time data (Metadata Index,
//! Ghost Index) from going stale for skills that are not yet resident.

use crate::embeddings::EmbeddingProvider;
use crate::events::{EventBus, StopFlag};
use crate::ghost::GhostIndex;
use crate::metadata_index::MetadataIndex;
use crate::types::Topic;
use crate::vector_store::VectorStore;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct ReloadController<V: VectorStore, E: EmbeddingProvider> {
    skills_root: PathBuf,
    poll_interval: Duration,
    index: Arc<MetadataIndex>,
    ghost_index: Arc<GhostIndex<V, E>>,
    events: Arc<EventBus>,
    stop: StopFlag,
}

impl<V: VectorStore + 'static, E: EmbeddingProvider + 'static> ReloadController<V, E> {
    pub fn new(
        skills_root: PathBuf,
        poll_interval: Duration,
        index: Arc<MetadataIndex>,
        ghost_index: Arc<GhostIndex<V, E>>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            skills_root,
            poll_interval,
            index,
            ghost_index,
            events,
            stop: StopFlag::new(),
        }
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Run the poll loop until `stop()` is called on a cloned `StopFlag`.
    /// Each tick performs one rescan; scan failures are logged and do not
    /// stop the loop (a transiently-missing skills root must not kill a
    /// long-running kernel process).
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            if self.stop.is_stopped() {
                return;
            }
            if let Err(err) = self.tick().await {
                tracing::warn!(error = %err, "hot reload tick failed, skills root may be unreachable");
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let previous_ids: std::collections::HashSet<String> =
            self.index.records().into_iter().map(|r| r.id).collect();

        let records = MetadataIndex::scan(&self.skills_root)?;
        self.index.replace_all(records.clone());
        self.index.persist()?;

        self.ghost_index.rebuild(&records).await?;

        for record in &records {
            if !previous_ids.contains(&record.id) {
                self.events.publish(
                    "reload-controller",
                    Topic::SkillLoaded,
                    serde_json::json!({ "skill_id": record.id }),
                    now_secs(),
                );
            }
        }

        Ok(())
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ghost::GhostIndexConfig;
    use crate::vector_store::InMemoryVectorStore;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed_documents(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2]).collect())
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

    fn write_skill(root: &std::path::Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {id}\ndescription: test\n---\nprotocol"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn tick_publishes_skill_loaded_for_new_skills() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "git");

        let index = Arc::new(MetadataIndex::load_or_empty(root.path().join("index.json")).unwrap());
        let ghost = Arc::new(
            GhostIndex::new(
                Arc::new(InMemoryVectorStore::new()),
                Arc::new(StubEmbedder),
                GhostIndexConfig::default(),
            )
            .unwrap(),
        );
        let events = Arc::new(EventBus::new());
        let mut sub = events.subscribe();

        let controller = ReloadController::new(
            root.path().to_path_buf(),
            Duration::from_secs(60),
            index,
            ghost,
            events,
        );

        controller.tick().await.unwrap();

        let event = sub.recv_matching("skill/").await.unwrap();
        assert_eq!(event.topic, Topic::SkillLoaded);
    }
}
