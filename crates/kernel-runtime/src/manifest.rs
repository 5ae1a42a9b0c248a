//! Parses a skill's on-disk definition: `SKILL.md`'s metadata header +
//! protocol text, and the command descriptor files beside it.
//!
//! `SKILL.md` carries a YAML frontmatter header (`name`, `version`,
//! `description`, `permissions`) and a free-form markdown body — the
//! protocol text returned verbatim on permission drift. The two halves are
//! separated by a `---` fence, the format every skill definition in this
//! ecosystem uses.
//!
//! A compiled target has no duck-typed `EXPOSED_COMMANDS` dict to introspect,
//! so each exported command is declared by its own `<name>.command.toml`
//! sidecar file: a language-neutral record of `{description, category,
//! schema, exec}` where `exec` is the argv used to invoke the command as a
//! subprocess, fed `args` as a JSON object on stdin and expected to print a
//! JSON result (or `null`) on stdout.

use crate::types::{Category, SchemaParam, SkillManifestInfo};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFINITION_FILE: &str = "SKILL.md";
const COMMAND_SUFFIX: &str = ".command.toml";

#[derive(Debug, Clone, Deserialize)]
struct Frontmatter {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    permissions: Vec<String>,
}

/// Read and split `SKILL.md` into its parsed header and protocol body.
pub fn parse_definition(path: &Path) -> Result<SkillManifestInfo> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read definition file: {}", path.display()))?;
    parse_definition_content(&content)
        .with_context(|| format!("malformed definition file: {}", path.display()))
}

fn parse_definition_content(content: &str) -> Result<SkillManifestInfo> {
    let content = content.trim_start();
    if !content.starts_with("---") {
        bail!("missing frontmatter fence");
    }

    let after_first = &content[3..];
    let end_pos = after_first
        .find("\n---")
        .context("opening --- fence has no closing ---")?;

    let yaml = after_first[..end_pos].trim();
    let body_start = 3 + end_pos + 4;
    let body = content.get(body_start..).unwrap_or("").trim().to_string();

    let frontmatter: Frontmatter =
        serde_yaml::from_str(yaml).context("failed to parse frontmatter YAML")?;

    Ok(SkillManifestInfo {
        name: frontmatter.name,
        version: frontmatter.version,
        description: frontmatter.description,
        permissions: frontmatter.permissions,
        protocol: body,
    })
}

/// A single command descriptor parsed from a `<name>.command.toml` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDescriptor {
    #[serde(skip)]
    pub name: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub schema: Vec<SchemaParam>,
    /// argv used to invoke the command; `exec[0]` is the program.
    pub exec: Vec<String>,
}

/// Discover script files in a skill directory: files whose names do not
/// begin with `_` and whose content declares a command (i.e. end in
/// `.command.toml`). `__init__`-like files are implicitly skipped by the
/// `_` prefix rule.
pub fn discover_command_files(skill_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(skill_dir)
        .with_context(|| format!("failed to read skill directory: {}", skill_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if file_name.starts_with('_') {
            continue;
        }
        if file_name.ends_with(COMMAND_SUFFIX) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Parse a single `<name>.command.toml` sidecar into a `CommandDescriptor`,
/// with `name` taken from the file stem.
pub fn parse_command_file(path: &Path) -> Result<CommandDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read command file: {}", path.display()))?;
    let mut descriptor: CommandDescriptor = toml::from_str(&content)
        .with_context(|| format!("failed to parse command descriptor: {}", path.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("command file has no name")?;
    descriptor.name = file_name
        .strip_suffix(COMMAND_SUFFIX)
        .unwrap_or(file_name)
        .to_string();

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_and_protocol() {
        let content = r#"---
name: git
version: "1.0"
description: Version control operations
permissions:
  - git:*
---

USE commit/status/diff ONLY. Never force-push.
"#;
        let manifest = parse_definition_content(content).unwrap();
        assert_eq!(manifest.name, "git");
        assert_eq!(manifest.permissions, vec!["git:*"]);
        assert!(manifest.protocol.contains("Never force-push"));
    }

    #[test]
    fn missing_permissions_means_none_granted() {
        let content = r#"---
name: calculator
description: Arithmetic only
---
USE add/subtract ONLY
"#;
        let manifest = parse_definition_content(content).unwrap();
        assert!(manifest.permissions.is_empty());
    }

    #[test]
    fn missing_fence_is_malformed() {
        let content = "# Just a heading\n\nNo frontmatter here.\n";
        assert!(parse_definition_content(content).is_err());
    }

    #[test]
    fn discovers_command_files_skipping_underscore_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("commit.command.toml"), "").unwrap();
        std::fs::write(dir.path().join("status.command.toml"), "").unwrap();
        std::fs::write(dir.path().join("_helpers.command.toml"), "").unwrap();
        std::fs::write(dir.path().join("SKILL.md"), "").unwrap();

        let files = discover_command_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn parses_command_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.command.toml");
        std::fs::write(
            &path,
            r#"
            description = "Create a commit"
            category = "write"
            exec = ["git", "commit"]

            [[schema]]
            name = "message"
            type = "string"
            required = true
            description = "commit message"
            "#,
        )
        .unwrap();

        let descriptor = parse_command_file(&path).unwrap();
        assert_eq!(descriptor.name, "commit");
        assert_eq!(descriptor.category, Category::Write);
        assert_eq!(descriptor.schema.len(), 1);
        assert_eq!(descriptor.exec, vec!["git", "commit"]);
    }
}
