//! Kernel configuration: env-overridable, loadable from TOML, with the
//! defaults fixed by the external interface contract.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default = "default_max_resident_skills")]
    pub max_resident_skills: usize,

    #[serde(default = "default_pinned_skills")]
    pub pinned_skills: Vec<String>,

    #[serde(default = "default_ghost_search_limit")]
    pub ghost_search_limit: usize,

    #[serde(default = "default_ghost_similarity_threshold")]
    pub ghost_similarity_threshold: f32,

    #[serde(default = "default_active_skill_cognitive_threshold")]
    pub active_skill_cognitive_threshold: usize,

    #[serde(default = "default_per_command_timeout_s")]
    pub per_command_timeout_s: u64,

    #[serde(default = "default_reload_poll_interval_s")]
    pub reload_poll_interval_s: u64,

    pub skills_root_path: PathBuf,
}

fn default_max_resident_skills() -> usize {
    15
}

fn default_pinned_skills() -> Vec<String> {
    ["filesystem", "terminal", "writer", "git", "note_taker"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_ghost_search_limit() -> usize {
    5
}

fn default_ghost_similarity_threshold() -> f32 {
    0.5
}

fn default_active_skill_cognitive_threshold() -> usize {
    5
}

fn default_per_command_timeout_s() -> u64 {
    60
}

fn default_reload_poll_interval_s() -> u64 {
    2
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_resident_skills: default_max_resident_skills(),
            pinned_skills: default_pinned_skills(),
            ghost_search_limit: default_ghost_search_limit(),
            ghost_similarity_threshold: default_ghost_similarity_threshold(),
            active_skill_cognitive_threshold: default_active_skill_cognitive_threshold(),
            per_command_timeout_s: default_per_command_timeout_s(),
            reload_poll_interval_s: default_reload_poll_interval_s(),
            skills_root_path: PathBuf::from("./skills"),
        }
    }
}

impl KernelConfig {
    /// Load from a TOML file at `path`, then apply `SKILL_KERNEL_*`
    /// environment overrides.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: KernelConfig =
            toml::from_str(content).context("failed to parse kernel config TOML")?;
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("SKILL_KERNEL_MAX_RESIDENT_SKILLS") {
            if let Ok(n) = val.parse() {
                self.max_resident_skills = n;
            }
        }
        if let Ok(val) = std::env::var("SKILL_KERNEL_PINNED_SKILLS") {
            self.pinned_skills = val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(val) = std::env::var("SKILL_KERNEL_GHOST_SEARCH_LIMIT") {
            if let Ok(n) = val.parse() {
                self.ghost_search_limit = n;
            }
        }
        if let Ok(val) = std::env::var("SKILL_KERNEL_GHOST_SIMILARITY_THRESHOLD") {
            if let Ok(n) = val.parse() {
                self.ghost_similarity_threshold = n;
            }
        }
        if let Ok(val) = std::env::var("SKILL_KERNEL_ACTIVE_SKILL_COGNITIVE_THRESHOLD") {
            if let Ok(n) = val.parse() {
                self.active_skill_cognitive_threshold = n;
            }
        }
        if let Ok(val) = std::env::var("SKILL_KERNEL_PER_COMMAND_TIMEOUT_S") {
            if let Ok(n) = val.parse() {
                self.per_command_timeout_s = n;
            }
        }
        if let Ok(val) = std::env::var("SKILL_KERNEL_RELOAD_POLL_INTERVAL_S") {
            if let Ok(n) = val.parse() {
                self.reload_poll_interval_s = n;
            }
        }
        if let Ok(val) = std::env::var("SKILL_KERNEL_SKILLS_ROOT_PATH") {
            self.skills_root_path = PathBuf::from(val);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_contract() {
        let config = KernelConfig::default();
        assert_eq!(config.max_resident_skills, 15);
        assert_eq!(
            config.pinned_skills,
            vec!["filesystem", "terminal", "writer", "git", "note_taker"]
        );
        assert_eq!(config.ghost_search_limit, 5);
        assert!((config.ghost_similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.active_skill_cognitive_threshold, 5);
        assert_eq!(config.per_command_timeout_s, 60);
        assert_eq!(config.reload_poll_interval_s, 2);
    }

    #[test]
    fn parses_partial_toml_with_remaining_defaults() {
        let toml = r#"
            skills_root_path = "/opt/skills"
            max_resident_skills = 3
        "#;
        let config = KernelConfig::from_toml(toml).unwrap();
        assert_eq!(config.max_resident_skills, 3);
        assert_eq!(config.skills_root_path, PathBuf::from("/opt/skills"));
        assert_eq!(config.ghost_search_limit, 5);
    }

    #[test]
    fn env_override_wins_over_toml() {
        std::env::set_var("SKILL_KERNEL_MAX_RESIDENT_SKILLS", "7");
        let toml = r#"
            skills_root_path = "/opt/skills"
            max_resident_skills = 3
        "#;
        let config = KernelConfig::from_toml(toml).unwrap();
        assert_eq!(config.max_resident_skills, 7);
        std::env::remove_var("SKILL_KERNEL_MAX_RESIDENT_SKILLS");
    }
}
