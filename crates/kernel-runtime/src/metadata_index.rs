//! On-disk JSON index of every discovered skill: the read-mostly source of
//! truth the Ghost Index and the loader's id-resolution path both query.
//!
//! Built by an offline scan of the skills root; invalidated per-record when
//! a skill's content hash changes; rebuilt wholesale and swapped atomically
//! (copy-on-write — readers never observe a partially-written index).

use crate::manifest::{self, CommandDescriptor};
use crate::types::{DeclaredCommand, MetadataRecord};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const PROTOCOL_EXCERPT_CHARS: usize = 512;

/// Read-mostly, copy-on-write metadata index.
pub struct MetadataIndex {
    path: PathBuf,
    records: RwLock<Vec<MetadataRecord>>,
}

impl MetadataIndex {
    /// Load the index from `path` if it exists, otherwise start empty.
    pub fn load_or_empty(path: PathBuf) -> Result<Self> {
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read metadata index: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("metadata index unreadable: {}", path.display()))?
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Persist the current record set atomically: write to a temp file in
    /// the same directory, then rename over the target.
    pub fn persist(&self) -> Result<()> {
        let records = self.records.read().expect("metadata index lock poisoned");
        let json = serde_json::to_string_pretty(&*records)?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn records(&self) -> Vec<MetadataRecord> {
        self.records.read().expect("metadata index lock poisoned").clone()
    }

    pub fn find_by_id(&self, skill_id: &str) -> Option<MetadataRecord> {
        self.records
            .read()
            .expect("metadata index lock poisoned")
            .iter()
            .find(|r| r.id == skill_id)
            .cloned()
    }

    /// Replace the whole record set (used by `rebuild`).
    pub fn replace_all(&self, new_records: Vec<MetadataRecord>) {
        *self.records.write().expect("metadata index lock poisoned") = new_records;
    }

    /// Scan `skills_root` for skill directories and build fresh records.
    /// Idempotent: running it twice with unchanged content produces an
    /// identical record set (content hash is recomputed, not carried over).
    pub fn scan(skills_root: &Path) -> Result<Vec<MetadataRecord>> {
        if !skills_root.is_dir() {
            anyhow::bail!("skills root not found: {}", skills_root.display());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(skills_root)? {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let definition_path = dir.join(manifest::DEFINITION_FILE);
            if !definition_path.is_file() {
                continue;
            }

            let skill_id = match dir.file_name().and_then(|n| n.to_str()) {
                Some(id) => id.to_string(),
                None => continue,
            };

            match scan_one(&skill_id, &dir, &definition_path) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(skill = %skill_id, error = %err, "failed to index skill, skipping");
                }
            }
        }

        Ok(records)
    }
}

fn scan_one(skill_id: &str, dir: &Path, definition_path: &Path) -> Result<MetadataRecord> {
    let manifest_info = manifest::parse_definition(definition_path)?;
    let command_files = manifest::discover_command_files(dir)?;

    let mut declared_commands = Vec::new();
    let mut hasher = blake3::Hasher::new();
    hasher.update(std::fs::read(definition_path)?.as_slice());

    for file in &command_files {
        let descriptor: CommandDescriptor = manifest::parse_command_file(file)?;
        hasher.update(std::fs::read(file)?.as_slice());
        declared_commands.push(DeclaredCommand {
            name: descriptor.name,
            description: descriptor.description,
            category: descriptor.category,
            schema: descriptor.schema,
        });
    }

    let content_hash = hasher.finalize().to_hex().to_string();

    let keywords = declared_commands
        .iter()
        .flat_map(|c| c.name.split(['_', '-']).map(str::to_string))
        .chain(manifest_info.description.split_whitespace().map(str::to_string))
        .collect();

    let protocol_excerpt: String = manifest_info
        .protocol
        .chars()
        .take(PROTOCOL_EXCERPT_CHARS)
        .collect();

    Ok(MetadataRecord {
        id: skill_id.to_string(),
        path: dir.to_path_buf(),
        content_hash,
        declared_commands,
        declared_permissions: manifest_info.permissions,
        keywords,
        embedding: None,
        protocol_excerpt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!(
                "---\nname: {id}\ndescription: test skill {id}\npermissions:\n  - {id}:*\n---\nprotocol for {id}"
            ),
        )
        .unwrap();
        std::fs::write(
            dir.join("noop.command.toml"),
            r#"
            description = "does nothing"
            category = "read"
            exec = ["true"]
            "#,
        )
        .unwrap();
    }

    #[test]
    fn scan_finds_skills_and_commands() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "git");
        write_skill(root.path(), "filesystem");

        let records = MetadataIndex::scan(root.path()).unwrap();
        assert_eq!(records.len(), 2);
        let git = records.iter().find(|r| r.id == "git").unwrap();
        assert_eq!(git.declared_commands.len(), 1);
        assert_eq!(git.declared_permissions, vec!["git:*"]);
    }

    #[test]
    fn persist_and_reload_round_trips() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "git");
        let records = MetadataIndex::scan(root.path()).unwrap();

        let index_path = root.path().join("index.json");
        let index = MetadataIndex::load_or_empty(index_path.clone()).unwrap();
        index.replace_all(records);
        index.persist().unwrap();

        let reloaded = MetadataIndex::load_or_empty(index_path).unwrap();
        assert_eq!(reloaded.records().len(), 1);
        assert!(reloaded.find_by_id("git").is_some());
    }

    #[test]
    fn missing_skills_root_is_an_error() {
        let result = MetadataIndex::scan(Path::new("/nonexistent-skills-root"));
        assert!(result.is_err());
    }
}
