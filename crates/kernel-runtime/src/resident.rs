//! The Adaptive LRU Resident Set: the bounded collection of skills kept
//! loaded in memory, so repeat invocations skip the JIT load procedure.
//!
//! Eviction is strict LRU among non-pinned entries, lexicographic id as a
//! tie-break. Pinned skills (the configured default set plus any pinned at
//! runtime) are never evicted by capacity pressure; pinning past the cap is
//! a soft violation that only warns.

use crate::types::Skill;
use std::collections::HashMap;
use std::sync::RwLock;

struct Entry {
    skill: Skill,
    pinned: bool,
    /// Monotonically increasing touch counter; higher means more recent.
    last_used: u64,
}

/// Thread-safe adaptive LRU cache of resident skills.
pub struct ResidentSet {
    entries: RwLock<HashMap<String, Entry>>,
    clock: std::sync::atomic::AtomicU64,
    capacity: usize,
}

impl ResidentSet {
    pub fn new(capacity: usize, pinned_skills: &[String]) -> Self {
        let set = Self {
            entries: RwLock::new(HashMap::new()),
            clock: std::sync::atomic::AtomicU64::new(0),
            capacity,
        };
        if pinned_skills.len() > capacity {
            tracing::warn!(
                pinned = pinned_skills.len(),
                capacity,
                "pinned skill set exceeds max_resident_skills; capacity pressure will be ineffective"
            );
        }
        set
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    /// Look up a resident skill, marking it as recently used.
    pub fn get(&self, skill_id: &str) -> Option<Skill> {
        let tick = self.tick();
        let mut entries = self.entries.write().expect("resident set lock poisoned");
        let entry = entries.get_mut(skill_id)?;
        entry.last_used = tick;
        Some(entry.skill.clone())
    }

    /// Look up without bumping recency, for freshness checks that may
    /// decide not to use the cached copy.
    pub fn peek(&self, skill_id: &str) -> Option<Skill> {
        let entries = self.entries.read().expect("resident set lock poisoned");
        entries.get(skill_id).map(|e| e.skill.clone())
    }

    /// Insert or replace a skill, evicting the least-recently-used
    /// non-pinned entry if the set is at capacity. Pinned status carries
    /// over from any existing entry unless `pin_by_default` names it.
    pub fn insert(&self, skill: Skill, pin_by_default: &[String]) -> Option<String> {
        self.insert_protecting(skill, pin_by_default, &std::collections::HashSet::new())
    }

    /// As `insert`, but the eviction scan skips any id in `protected` (a
    /// skill with a command call in flight must not be evicted out from
    /// under it).
    pub fn insert_protecting(
        &self,
        skill: Skill,
        pin_by_default: &[String],
        protected: &std::collections::HashSet<String>,
    ) -> Option<String> {
        let tick = self.tick();
        let mut entries = self.entries.write().expect("resident set lock poisoned");

        let pinned = entries
            .get(&skill.id)
            .map(|e| e.pinned)
            .unwrap_or_else(|| pin_by_default.iter().any(|p| p == &skill.id));

        let mut evicted = None;
        if !entries.contains_key(&skill.id) && entries.len() >= self.capacity {
            evicted = evict_one(&mut entries, protected);
        }

        entries.insert(
            skill.id.clone(),
            Entry {
                skill,
                pinned,
                last_used: tick,
            },
        );
        evicted
    }

    pub fn unload(&self, skill_id: &str) -> bool {
        let mut entries = self.entries.write().expect("resident set lock poisoned");
        entries.remove(skill_id).is_some()
    }

    pub fn pin(&self, skill_id: &str) {
        let mut entries = self.entries.write().expect("resident set lock poisoned");
        if let Some(entry) = entries.get_mut(skill_id) {
            entry.pinned = true;
        }
    }

    pub fn unpin(&self, skill_id: &str) {
        let mut entries = self.entries.write().expect("resident set lock poisoned");
        if let Some(entry) = entries.get_mut(skill_id) {
            entry.pinned = false;
        }
    }

    pub fn is_pinned(&self, skill_id: &str) -> bool {
        let entries = self.entries.read().expect("resident set lock poisoned");
        entries.get(skill_id).map(|e| e.pinned).unwrap_or(false)
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        let entries = self.entries.read().expect("resident set lock poisoned");
        entries.contains_key(skill_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("resident set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_ids(&self) -> Vec<String> {
        let entries = self.entries.read().expect("resident set lock poisoned");
        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Evict the least-recently-used non-pinned, non-protected entry;
/// lexicographically smallest id wins ties. Returns the evicted id, or
/// `None` if every eligible candidate is pinned or protected (the set
/// then simply exceeds capacity until the protection lifts).
fn evict_one(
    entries: &mut HashMap<String, Entry>,
    protected: &std::collections::HashSet<String>,
) -> Option<String> {
    let victim = entries
        .iter()
        .filter(|(id, e)| !e.pinned && !protected.contains(id.as_str()))
        .min_by(|(id_a, e_a), (id_b, e_b)| {
            e_a.last_used.cmp(&e_b.last_used).then_with(|| id_a.cmp(id_b))
        })
        .map(|(id, _)| id.clone())?;

    entries.remove(&victim);
    Some(victim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::path::PathBuf;

    fn skill(id: &str) -> Skill {
        Skill {
            id: id.to_string(),
            root: PathBuf::from("/skills").join(id),
            manifest: crate::types::SkillManifestInfo {
                name: id.to_string(),
                ..Default::default()
            },
            commands: std::sync::Arc::new(StdHashMap::new()),
            mtime: 0.0,
            content_hash: "hash".into(),
        }
    }

    #[test]
    fn evicts_least_recently_used_when_at_capacity() {
        let set = ResidentSet::new(2, &[]);
        set.insert(skill("a"), &[]);
        set.insert(skill("b"), &[]);
        set.get("a"); // bump a's recency above b
        let evicted = set.insert(skill("c"), &[]);
        assert_eq!(evicted, Some("b".to_string()));
        assert!(set.contains("a"));
        assert!(set.contains("c"));
    }

    #[test]
    fn pinned_skills_are_never_evicted() {
        let set = ResidentSet::new(1, &["a".to_string()]);
        set.insert(skill("a"), &["a".to_string()]);
        let evicted = set.insert(skill("b"), &["a".to_string()]);
        assert_eq!(evicted, None);
        assert!(set.contains("a"));
        assert!(set.contains("b"));
    }

    #[test]
    fn protected_entries_are_skipped_during_eviction() {
        let set = ResidentSet::new(1, &[]);
        set.insert(skill("a"), &[]);
        let mut protected = std::collections::HashSet::new();
        protected.insert("a".to_string());
        let evicted = set.insert_protecting(skill("b"), &[], &protected);
        assert_eq!(evicted, None);
        assert!(set.contains("a"));
        assert!(set.contains("b"));
    }

    #[test]
    fn lexicographic_tie_break_on_equal_recency() {
        let set = ResidentSet::new(2, &[]);
        // Both inserted fresh with no subsequent get(), so recency ties;
        // "a" sorts before "b" and is evicted first.
        set.insert(skill("b"), &[]);
        set.insert(skill("a"), &[]);
        let evicted = set.insert(skill("c"), &[]);
        assert_eq!(evicted, Some("a".to_string()));
    }

    #[test]
    fn unpin_makes_entry_evictable_again() {
        let set = ResidentSet::new(1, &[]);
        set.insert(skill("a"), &[]);
        set.pin("a");
        assert!(set.is_pinned("a"));
        set.unpin("a");
        assert!(!set.is_pinned("a"));
        let evicted = set.insert(skill("b"), &[]);
        assert_eq!(evicted, Some("a".to_string()));
    }
}
