//! The Dispatch Gateway: the kernel's one externally-visible operation,
//! `invoke(target, args) -> Result`. Parses the target grammar, resolves
//! the skill (resident lookup, JIT load, or ghost-promoted load), ensures
//! freshness, checks permissions, calls the command, and folds in
//! session/cognitive-load bookkeeping.

use crate::audit::AuditLogger;
use crate::embeddings::EmbeddingProvider;
use crate::errors::{KernelError, Result};
use crate::events::EventBus;
use crate::gatekeeper::{GateDecision, Gatekeeper};
use crate::ghost::GhostIndex;
use crate::loader::{self, Loader};
use crate::metadata_index::MetadataIndex;
use crate::metrics::KernelMetrics;
use crate::resident::ResidentSet;
use crate::resources::HeavyResourceRegistry;
use crate::session::SessionManager;
use crate::types::{InvokeTarget, Skill, Topic};
use crate::vector_store::VectorStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const COGNITIVE_LOAD_MARKER: &str = "[COGNITIVE LOAD WARNING]";

/// Everything the gateway needs, owned explicitly rather than reached for
/// through ambient globals.
pub struct Dispatch<V: VectorStore, E: EmbeddingProvider> {
    loader: Loader,
    resident: ResidentSet,
    metadata_index: Arc<MetadataIndex>,
    ghost_index: Arc<GhostIndex<V, E>>,
    sessions: SessionManager,
    events: Arc<EventBus>,
    metrics: Arc<KernelMetrics>,
    audit: Arc<AuditLogger>,
    pinned_skills: Vec<String>,
    per_command_timeout: Duration,
    reload_locks: Mutex<std::collections::HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    in_flight: Mutex<HashSet<String>>,
    resources: HeavyResourceRegistry,
}

impl<V: VectorStore, E: EmbeddingProvider> Dispatch<V, E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        skills_root: std::path::PathBuf,
        max_resident_skills: usize,
        pinned_skills: Vec<String>,
        cognitive_threshold: usize,
        per_command_timeout: Duration,
        metadata_index: Arc<MetadataIndex>,
        ghost_index: Arc<GhostIndex<V, E>>,
        events: Arc<EventBus>,
        metrics: Arc<KernelMetrics>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            loader: Loader::new(skills_root),
            resident: ResidentSet::new(max_resident_skills, &pinned_skills),
            metadata_index,
            ghost_index,
            sessions: SessionManager::new(cognitive_threshold),
            events,
            metrics,
            audit,
            pinned_skills,
            per_command_timeout,
            reload_locks: Mutex::new(std::collections::HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            resources: HeavyResourceRegistry::new(),
        }
    }

    /// The post-call eviction registry for transient heavy resources (e.g.
    /// a per-skill vector-store handle). Skills/backends register a
    /// disposer here; the gateway evicts it after every call into that
    /// skill. Empty by default — nothing is required to register.
    pub fn resources(&self) -> &HeavyResourceRegistry {
        &self.resources
    }

    /// The sole externally-visible operation.
    pub async fn invoke(&self, target: &str, args: serde_json::Value, session_id: &str) -> Result<serde_json::Value> {
        self.metrics.record_dispatch();

        let parsed = InvokeTarget::parse(target).map_err(|_| KernelError::MalformedTarget {
            target: target.to_string(),
        })?;

        match parsed {
            InvokeTarget::GlobalHelp => Ok(self.global_help()),
            InvokeTarget::SkillHelp { skill_id } => self.skill_help(&skill_id).await,
            InvokeTarget::Execute { skill_id, command } => {
                self.execute(&skill_id, &command, args, session_id).await
            }
        }
    }

    async fn execute(
        &self,
        skill_id: &str,
        command: &str,
        args: serde_json::Value,
        session_id: &str,
    ) -> Result<serde_json::Value> {
        let skill = self.get_or_load(skill_id).await?;

        let cmd = skill.get_command(command).ok_or_else(|| KernelError::UnknownCommand {
            skill_id: skill_id.to_string(),
            command: command.to_string(),
            candidates: closest_commands(command, &skill),
        })?;

        let tool_name = format!("{skill_id}.{command}");
        match Gatekeeper::check(&tool_name, &skill.manifest.permissions, &skill.manifest.protocol) {
            GateDecision::Allowed => {}
            GateDecision::Drift { protocol } => {
                self.metrics.record_permission_denied();
                let _ = self.audit.log_permission_denied(skill_id, &tool_name, now_secs());
                return Err(KernelError::PermissionDenied {
                    tool_name,
                    protocol,
                });
            }
        }

        self.in_flight.lock().expect("in-flight set lock poisoned").insert(skill_id.to_string());
        let call_result = tokio::time::timeout(self.per_command_timeout, (cmd.callable)(args)).await;
        self.in_flight.lock().expect("in-flight set lock poisoned").remove(skill_id);

        let mut result = match call_result {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                return Err(KernelError::CommandFailed {
                    skill_id: skill_id.to_string(),
                    command: command.to_string(),
                    message: err.to_string(),
                })
            }
            Err(_) => {
                return Err(KernelError::Cancelled {
                    reason: format!("timed out after {}s", self.per_command_timeout.as_secs()),
                })
            }
        };

        self.sessions.touch_skill(session_id, skill_id);
        let session = self.sessions.get_or_create(session_id);

        self.resources.evict(skill_id);

        if session.over_cognitive_threshold(session.cap) {
            inject_cognitive_warning(&mut result);
        }

        Ok(result)
    }

    /// Resolve a skill to its resident (possibly freshly loaded) form,
    /// inserting it into the Resident Set on first use.
    async fn get_or_load(&self, skill_id: &str) -> Result<Skill> {
        if let Some(skill) = self.resident.peek(skill_id) {
            self.metrics.record_cache_hit();
            let skill = self.freshness_check(skill).await?;
            self.resident.get(skill_id);
            return Ok(skill);
        }

        self.metrics.record_cache_miss();
        let dir = match self.loader.resolve_path(skill_id, &self.metadata_index) {
            Some(dir) => dir,
            None => self.resolve_via_ghost_index(skill_id).await?,
        };

        let resolved_id = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(skill_id)
            .to_string();

        let skill = self.loader.load(&resolved_id, &dir).await?;
        self.insert_loaded(skill.clone()).await;
        Ok(skill)
    }

    /// Strategy (c) from the loader procedure: a semantic query over the
    /// Ghost Index when neither a direct path nor a metadata-index entry
    /// resolves the requested id.
    async fn resolve_via_ghost_index(&self, skill_id: &str) -> Result<std::path::PathBuf> {
        let exclude: HashSet<String> = self.resident.resident_ids().into_iter().collect();
        let matches = self
            .ghost_index
            .search(skill_id, &exclude)
            .await
            .map_err(|_| KernelError::SkillNotFound {
                skill_id: skill_id.to_string(),
            })?;

        let best = matches.first().ok_or_else(|| KernelError::SkillNotFound {
            skill_id: skill_id.to_string(),
        })?;

        self.loader
            .resolve_path(&best.skill_id, &self.metadata_index)
            .ok_or_else(|| KernelError::SkillNotFound {
                skill_id: skill_id.to_string(),
            })
    }

    async fn insert_loaded(&self, skill: Skill) {
        let skill_id = skill.id.clone();
        let protected = self.in_flight.lock().expect("in-flight set lock poisoned").clone();
        let evicted = self.resident.insert_protecting(skill, &self.pinned_skills, &protected);

        let _ = self.audit.log_skill_loaded(&skill_id, now_secs());
        self.events.publish(
            "dispatch",
            Topic::SkillLoaded,
            serde_json::json!({ "skill_id": skill_id }),
            now_secs(),
        );

        if let Some(evicted_id) = evicted {
            self.metrics.record_eviction();
            let _ = self.audit.log_skill_evicted(&evicted_id, now_secs());
            self.events.publish(
                "dispatch",
                Topic::SkillEvicted,
                serde_json::json!({ "skill_id": evicted_id }),
                now_secs(),
            );
        }
    }

    /// Per-skill-serialized freshness check: compare on-disk mtime to the
    /// cached Skill's recorded mtime, reloading if stale. IO errors fail
    /// open — the existing Skill is returned unchanged.
    async fn freshness_check(&self, skill: Skill) -> Result<Skill> {
        let lock = self.reload_lock_for(&skill.id);
        let _guard = lock.lock().await;

        // Re-peek: another caller may have already reloaded while we
        // waited for the per-skill lock.
        let current = self.resident.peek(&skill.id).unwrap_or(skill);

        let on_disk_mtime = match loader::current_mtime(&current.root) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(skill = %current.id, error = %err, "freshness check failed, serving cached skill");
                return Ok(current);
            }
        };

        if on_disk_mtime <= current.mtime {
            return Ok(current);
        }

        let reloaded = self.loader.load(&current.id, &current.root).await?;
        self.resident.insert(reloaded.clone(), &self.pinned_skills);
        self.metrics.record_reload();
        self.events.publish(
            "dispatch",
            Topic::SkillLoaded,
            serde_json::json!({ "skill_id": reloaded.id }),
            now_secs(),
        );
        Ok(reloaded)
    }

    fn reload_lock_for(&self, skill_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.reload_locks.lock().expect("reload lock map poisoned");
        locks
            .entry(skill_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn skill_help(&self, skill_id: &str) -> Result<serde_json::Value> {
        let skill = self.get_or_load(skill_id).await?;
        Ok(serde_json::json!({
            "skill_id": skill.id,
            "description": skill.manifest.description,
            "protocol": skill.manifest.protocol,
            "commands": skill.commands.values().map(command_summary).collect::<Vec<_>>(),
        }))
    }

    fn global_help(&self) -> serde_json::Value {
        let resident_ids: HashSet<String> = self.resident.resident_ids().into_iter().collect();
        let skills: Vec<serde_json::Value> = self
            .metadata_index
            .records()
            .into_iter()
            .map(|record| {
                serde_json::json!({
                    "skill_id": record.id,
                    "ghost": !resident_ids.contains(&record.id),
                    "commands": record.declared_commands.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::json!({ "skills": skills })
    }

    pub fn resident(&self) -> &ResidentSet {
        &self.resident
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn metrics(&self) -> &KernelMetrics {
        &self.metrics
    }

    /// The Ghost Index backing semantic lookups, for callers that want to
    /// search it directly (e.g. a CLI `find` command) or rebuild it (e.g. a
    /// hot-reload loop) rather than through `invoke`'s implicit
    /// resolve-by-id fallback.
    pub fn ghost_index(&self) -> Arc<GhostIndex<V, E>> {
        self.ghost_index.clone()
    }

    pub fn metadata_index(&self) -> &Arc<MetadataIndex> {
        &self.metadata_index
    }
}

fn command_summary(cmd: &crate::types::Command) -> serde_json::Value {
    serde_json::json!({
        "name": cmd.name,
        "description": cmd.description,
        "category": cmd.category.to_string(),
        "schema": cmd.schema,
    })
}

fn inject_cognitive_warning(result: &mut serde_json::Value) {
    match result {
        serde_json::Value::String(s) => {
            s.push_str(&format!(" {COGNITIVE_LOAD_MARKER}"));
        }
        serde_json::Value::Object(map) => {
            map.insert("_cognition".to_string(), serde_json::json!(COGNITIVE_LOAD_MARKER));
        }
        other => {
            *other = serde_json::json!({ "result": other.clone(), "_cognition": COGNITIVE_LOAD_MARKER });
        }
    }
}

/// The five closest known command names by Levenshtein distance, for
/// `UnknownCommand`'s diagnostic hint.
fn closest_commands(attempted: &str, skill: &Skill) -> Vec<String> {
    let mut scored: Vec<(usize, &str)> = skill
        .command_names()
        .into_iter()
        .map(|name| (levenshtein(attempted, name), name))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(5).map(|(_, name)| name.to_string()).collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + row[j].min(row[j - 1]).min(prev_diag)
            };
            prev_diag = temp;
        }
    }
    row[b.len()]
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
    use std::path::Path;

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

    fn write_skill(root: &Path, id: &str, permissions: &[&str], exec: &[&str]) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        let perms = permissions
            .iter()
            .map(|p| format!("  - {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        let frontmatter = if perms.is_empty() {
            format!("---\nname: {id}\ndescription: test skill\n---\nUSE ONLY declared commands")
        } else {
            format!("---\nname: {id}\ndescription: test skill\npermissions:\n{perms}\n---\nUSE ONLY declared commands")
        };
        std::fs::write(dir.join("SKILL.md"), frontmatter).unwrap();

        let exec_toml = exec.iter().map(|e| format!("\"{e}\"")).collect::<Vec<_>>().join(", ");
        std::fs::write(
            dir.join("noop.command.toml"),
            format!("description = \"noop\"\ncategory = \"read\"\nexec = [{exec_toml}]\n"),
        )
        .unwrap();
    }

    fn build_dispatch(root: &Path, max_resident: usize, pinned: Vec<String>) -> Dispatch<InMemoryVectorStore, StubEmbedder> {
        build_dispatch_with_threshold(root, max_resident, pinned, 5)
    }

    fn build_dispatch_with_threshold(
        root: &Path,
        max_resident: usize,
        pinned: Vec<String>,
        cognitive_threshold: usize,
    ) -> Dispatch<InMemoryVectorStore, StubEmbedder> {
        let index = Arc::new(MetadataIndex::load_or_empty(root.join("index.json")).unwrap());
        let ghost = Arc::new(
            GhostIndex::new(Arc::new(InMemoryVectorStore::new()), Arc::new(StubEmbedder), GhostIndexConfig::default())
                .unwrap(),
        );
        Dispatch::new(
            root.to_path_buf(),
            max_resident,
            pinned,
            cognitive_threshold,
            Duration::from_secs(5),
            index,
            ghost,
            Arc::new(EventBus::new()),
            Arc::new(KernelMetrics::new()),
            Arc::new(AuditLogger::new(root.join("audit.log")).unwrap()),
        )
    }

    #[tokio::test]
    async fn cold_miss_jit_loads_and_executes() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "git", &["git:*"], &["cat"]);
        let dispatch = build_dispatch(root.path(), 15, vec![]);

        let result = dispatch
            .invoke("git.noop", serde_json::json!({"x": 1}), "s1")
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
        assert_eq!(dispatch.resident().resident_ids(), vec!["git".to_string()]);
    }

    #[tokio::test]
    async fn permission_denied_carries_protocol() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "calculator", &[], &["cat"]);
        let dispatch = build_dispatch(root.path(), 15, vec![]);

        let err = dispatch
            .invoke("calculator.noop", serde_json::json!({}), "s1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PermissionDenied");
        assert_eq!(err.extra()["protocol"], "USE ONLY declared commands");
    }

    #[tokio::test]
    async fn unknown_command_lists_candidates() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "git", &["git:*"], &["cat"]);
        let dispatch = build_dispatch(root.path(), 15, vec![]);

        let err = dispatch
            .invoke("git.nop", serde_json::json!({}), "s1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownCommand");
        assert_eq!(err.extra()["candidates"][0], "noop");
    }

    #[tokio::test]
    async fn post_call_hook_evicts_registered_heavy_resource() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "git", &["git:*"], &["cat"]);
        let dispatch = build_dispatch(root.path(), 15, vec![]);

        let disposed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = disposed.clone();
        dispatch.resources().register("git", move || {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        dispatch.invoke("git.noop", serde_json::json!({}), "s1").await.unwrap();

        assert!(disposed.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!dispatch.resources().is_registered("git"));
    }

    #[tokio::test]
    async fn eviction_under_pressure_keeps_most_recent_non_pinned() {
        let root = tempfile::tempdir().unwrap();
        for id in ["a", "b", "c", "d"] {
            write_skill(root.path(), id, &[&format!("{id}:*")], &["cat"]);
        }
        let dispatch = build_dispatch(root.path(), 3, vec![]);

        for id in ["a", "b", "c", "d"] {
            dispatch
                .invoke(&format!("{id}.noop"), serde_json::json!({}), "s1")
                .await
                .unwrap();
        }

        let mut resident = dispatch.resident().resident_ids();
        resident.sort();
        assert_eq!(resident, vec!["b".to_string(), "c".to_string(), "d".to_string()]);
    }

    #[tokio::test]
    async fn cognitive_load_warning_appears_after_threshold_and_clears_on_reset() {
        let root = tempfile::tempdir().unwrap();
        for id in ["a", "b", "c"] {
            write_skill(root.path(), id, &[&format!("{id}:*")], &["cat"]);
        }
        let dispatch = build_dispatch_with_threshold(root.path(), 15, vec![], 2);

        dispatch.invoke("a.noop", serde_json::json!({}), "s1").await.unwrap();
        dispatch.invoke("b.noop", serde_json::json!({}), "s1").await.unwrap();
        let third = dispatch.invoke("c.noop", serde_json::json!({}), "s1").await.unwrap();
        assert!(third.get("_cognition").is_some());

        dispatch.sessions().reset("s1");
        let after_reset = dispatch.invoke("a.noop", serde_json::json!({}), "s1").await.unwrap();
        assert!(after_reset.get("_cognition").is_none());
    }

    #[tokio::test]
    async fn malformed_target_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let dispatch = build_dispatch(root.path(), 15, vec![]);
        let err = dispatch.invoke("a.b.c", serde_json::json!({}), "s1").await.unwrap_err();
        assert_eq!(err.kind(), "MalformedTarget");
    }
}
