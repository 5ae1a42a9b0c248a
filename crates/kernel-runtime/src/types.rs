//! Core data model: `Skill`, `Command`, permission grammar, events, sessions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Category a command is declared under. Informational only — not an
/// authorization primitive; the gatekeeper checks permission strings, not
/// categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Read,
    Write,
    Workflow,
    Admin,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Read => "read",
            Category::Write => "write",
            Category::Workflow => "workflow",
            Category::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "read" => Ok(Category::Read),
            "write" => Ok(Category::Write),
            "workflow" => Ok(Category::Workflow),
            "admin" => Ok(Category::Admin),
            other => Err(format!("unknown command category: {other}")),
        }
    }
}

/// Parameter schema entry for LLM-visible command advertising.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// The callable behind a command. Skills execute out-of-process or via an
/// external executor (sandboxing is explicitly handed off); the kernel only
/// needs a stable handle it can invoke and await uniformly, whether the
/// underlying call is synchronous or deferred.
pub type Callable = Arc<
    dyn Fn(serde_json::Value) -> futures::future::BoxFuture<'static, anyhow::Result<serde_json::Value>>
        + Send
        + Sync,
>;

/// A single named callable exported by a skill.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub callable: Callable,
    pub schema: Vec<SchemaParam>,
    pub category: Category,
    pub description: String,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("category", &self.category)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A permission string parsed into a sum type so matching is pattern
/// comparison rather than string-prefix work. Both `:` and `.` delimiters
/// in source declarations normalise to this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// `*` — matches everything.
    Admin,
    /// `category:*` — wildcard over a category.
    Category(String),
    /// `category:action` — exact action.
    Action(String, String),
}

impl Permission {
    /// Parse a single declared permission string. Accepts both `:` and `.`
    /// as the category/action delimiter.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" {
            return Permission::Admin;
        }
        let normalized = raw.replace('.', ":");
        match normalized.split_once(':') {
            Some((category, "*")) => Permission::Category(category.to_string()),
            Some((category, action)) => Permission::Action(category.to_string(), action.to_string()),
            None => Permission::Category(normalized),
        }
    }

    /// Whether this declared permission grants the required `(category,
    /// action)` pair.
    pub fn grants(&self, category: &str, action: &str) -> bool {
        match self {
            Permission::Admin => true,
            Permission::Category(c) => c == category,
            Permission::Action(c, a) => c == category && a == action,
        }
    }
}

/// A required permission derived from a dispatch-time tool name `X.Y`,
/// normalised to `X:Y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredPermission {
    pub category: String,
    pub action: String,
}

impl RequiredPermission {
    pub fn from_tool_name(tool_name: &str) -> Option<Self> {
        let (category, action) = tool_name.split_once('.')?;
        Some(Self {
            category: category.to_string(),
            action: action.to_string(),
        })
    }

    pub fn normalised(&self) -> String {
        format!("{}:{}", self.category, self.action)
    }
}

/// A package identified by a stable string id, e.g. `"git"`.
///
/// The command table is append-only within a single load; reloads replace
/// the table atomically by swapping the `Arc` behind `commands`.
#[derive(Clone)]
pub struct Skill {
    pub id: String,
    pub root: PathBuf,
    pub manifest: SkillManifestInfo,
    pub commands: Arc<HashMap<String, Command>>,
    /// Max mtime over the definition file and all script files, as seconds
    /// since epoch.
    pub mtime: f64,
    pub content_hash: String,
}

impl Skill {
    pub fn get_command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skill")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("commands", &self.command_names())
            .field("mtime", &self.mtime)
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

/// Manifest fields parsed from a skill's definition file header.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillManifestInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Declared permission strings, pre-parse. Missing means no permissions
    /// granted.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// The free-form protocol text block, returned verbatim on permission
    /// drift.
    #[serde(skip)]
    pub protocol: String,
}

/// One record per discovered skill, persisted in the Metadata Index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub path: PathBuf,
    pub content_hash: String,
    pub declared_commands: Vec<DeclaredCommand>,
    pub declared_permissions: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Protocol text, truncated for indexing.
    pub protocol_excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredCommand {
    pub name: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub schema: Vec<SchemaParam>,
}

/// A bounded conversational context tracking which skills have been
/// invoked, for cognitive-load policy.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Insertion-ordered; oldest discarded first once `cap` is exceeded.
    pub active_skills: Vec<String>,
    pub cap: usize,
    pub checkpoint: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, cap: usize) -> Self {
        Self {
            id: id.into(),
            active_skills: Vec::new(),
            cap,
            checkpoint: None,
        }
    }

    /// Record a skill as active, discarding the oldest entry if the cap is
    /// exceeded. The cap is advisory, not an authorization primitive.
    pub fn touch_skill(&mut self, skill_id: &str) {
        if self.active_skills.iter().any(|s| s == skill_id) {
            return;
        }
        self.active_skills.push(skill_id.to_string());
        while self.active_skills.len() > self.cap {
            self.active_skills.remove(0);
        }
    }

    pub fn over_cognitive_threshold(&self, threshold: usize) -> bool {
        self.active_skills.len() > threshold
    }

    pub fn reset(&mut self) {
        self.active_skills.clear();
        self.checkpoint = None;
    }
}

/// Closed set of event topics the bus can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    FileChanged,
    FileCreated,
    SkillLoaded,
    SkillEvicted,
    AgentStepComplete,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::FileChanged => "file/changed",
            Topic::FileCreated => "file/created",
            Topic::SkillLoaded => "skill/loaded",
            Topic::SkillEvicted => "skill/evicted",
            Topic::AgentStepComplete => "agent/step_complete",
        }
    }
}

/// `(source, topic, payload_json, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub source: String,
    pub topic: Topic,
    pub payload: serde_json::Value,
    pub timestamp: f64,
}

/// A parsed `invoke` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeTarget {
    /// `"skill.command"`
    Execute { skill_id: String, command: String },
    /// `"skill"`
    SkillHelp { skill_id: String },
    /// `"help"`
    GlobalHelp,
}

impl InvokeTarget {
    /// Parse the dispatch target grammar from §4.3: `"skill.command"`
    /// executes, `"skill"` returns help, `"help"` is the global summary,
    /// anything else is malformed.
    pub fn parse(target: &str) -> std::result::Result<Self, String> {
        let target = target.trim();
        if target.is_empty() {
            return Err("empty target".to_string());
        }
        if target == "help" {
            return Ok(InvokeTarget::GlobalHelp);
        }
        match target.split_once('.') {
            Some((skill_id, command)) if !skill_id.is_empty() && !command.is_empty() => {
                if command.contains('.') {
                    return Err(format!("malformed target: {target}"));
                }
                Ok(InvokeTarget::Execute {
                    skill_id: skill_id.to_string(),
                    command: command.to_string(),
                })
            }
            Some(_) => Err(format!("malformed target: {target}")),
            None => Ok(InvokeTarget::SkillHelp {
                skill_id: target.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_grammar() {
        assert_eq!(Permission::parse("*"), Permission::Admin);
        assert_eq!(Permission::parse("git:*"), Permission::Category("git".into()));
        assert_eq!(
            Permission::parse("git.commit"),
            Permission::Action("git".into(), "commit".into())
        );
        assert_eq!(
            Permission::parse("git:commit"),
            Permission::Action("git".into(), "commit".into())
        );
    }

    #[test]
    fn permission_grants_algebra() {
        assert!(Permission::Admin.grants("git", "commit"));
        assert!(Permission::Category("git".into()).grants("git", "commit"));
        assert!(!Permission::Category("git".into()).grants("fs", "read"));
        assert!(Permission::Action("git".into(), "commit".into()).grants("git", "commit"));
        assert!(!Permission::Action("git".into(), "commit".into()).grants("git", "push"));
    }

    #[test]
    fn invoke_target_grammar() {
        assert_eq!(
            InvokeTarget::parse("git.commit").unwrap(),
            InvokeTarget::Execute { skill_id: "git".into(), command: "commit".into() }
        );
        assert_eq!(
            InvokeTarget::parse("git").unwrap(),
            InvokeTarget::SkillHelp { skill_id: "git".into() }
        );
        assert_eq!(InvokeTarget::parse("help").unwrap(), InvokeTarget::GlobalHelp);
        assert!(InvokeTarget::parse("git.commit.extra").is_err());
        assert!(InvokeTarget::parse("").is_err());
    }

    #[test]
    fn session_cap_discards_oldest() {
        let mut session = Session::new("s1", 2);
        session.touch_skill("a");
        session.touch_skill("b");
        session.touch_skill("c");
        assert_eq!(session.active_skills, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn session_cognitive_threshold() {
        let mut session = Session::new("s1", 10);
        session.touch_skill("a");
        session.touch_skill("b");
        session.touch_skill("c");
        assert!(session.over_cognitive_threshold(2));
        session.reset();
        assert!(!session.over_cognitive_threshold(2));
    }
}
