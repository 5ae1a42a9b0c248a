//! Append-only audit log: one JSON line per security-relevant event
//! (permission drift, skill load, skill eviction), written to
//! `~/.skill-kernel/audit.log` unless overridden.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    PermissionDenied,
    SkillLoaded,
    SkillReloaded,
    SkillEvicted,
    ConfigLoaded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: f64,
    pub event_type: AuditEventType,
    pub skill_id: Option<String>,
    pub details: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create audit log directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".skill-kernel")
            .join("audit.log")
    }

    pub fn log(&self, entry: AuditEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)?;
        let mut file = self.file.lock().expect("audit log lock poisoned");
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    pub fn log_permission_denied(&self, skill_id: &str, tool_name: &str, timestamp: f64) -> Result<()> {
        self.log(AuditEntry {
            timestamp,
            event_type: AuditEventType::PermissionDenied,
            skill_id: Some(skill_id.to_string()),
            details: format!("permission denied for {tool_name}"),
            metadata: serde_json::json!({ "tool_name": tool_name }),
        })
    }

    pub fn log_skill_loaded(&self, skill_id: &str, timestamp: f64) -> Result<()> {
        self.log(AuditEntry {
            timestamp,
            event_type: AuditEventType::SkillLoaded,
            skill_id: Some(skill_id.to_string()),
            details: "skill loaded into resident set".to_string(),
            metadata: serde_json::Value::Null,
        })
    }

    pub fn log_skill_evicted(&self, skill_id: &str, timestamp: f64) -> Result<()> {
        self.log(AuditEntry {
            timestamp,
            event_type: AuditEventType::SkillEvicted,
            skill_id: Some(skill_id.to_string()),
            details: "skill evicted from resident set".to_string(),
            metadata: serde_json::Value::Null,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last `limit` entries, tolerating malformed lines by
    /// skipping them (the log is append-only but a truncated final line
    /// can occur after a crash mid-write).
    pub fn read_recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        read_recent_from(&self.path, limit)
    }
}

fn read_recent_from(path: &Path, limit: usize) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("failed to open audit log: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut entries: Vec<AuditEntry> = reader
        .lines()
        .map_while(std::result::Result::ok)
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect();

    if entries.len() > limit {
        entries = entries.split_off(entries.len() - limit);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_and_reads_back_entries() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path().join("audit.log")).unwrap();

        logger.log_permission_denied("calculator", "calculator.read_file", 1.0).unwrap();
        logger.log_skill_loaded("git", 2.0).unwrap();

        let entries = logger.read_recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_type, AuditEventType::PermissionDenied);
        assert_eq!(entries[1].event_type, AuditEventType::SkillLoaded);
    }

    #[test]
    fn read_recent_truncates_to_limit() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path().join("audit.log")).unwrap();
        for i in 0..5 {
            logger.log_skill_loaded(&format!("skill{i}"), i as f64).unwrap();
        }
        let entries = logger.read_recent(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].skill_id, Some("skill3".to_string()));
    }

    #[test]
    fn missing_log_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = read_recent_from(&dir.path().join("nonexistent.log"), 10).unwrap();
        assert!(entries.is_empty());
    }
}
