//! The closed error surface returned by the dispatch gateway.
//!
//! Every kind a caller can match on lives here. Errors that never reach a
//! caller across the `invoke` boundary (file scanning, index persistence,
//! config loading) use `anyhow::Result` instead; see `config.rs`/`loader.rs`
//! for that layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of error kinds a `Dispatch::invoke` call can resolve to.
///
/// Callers match on `kind()`; the `Display` impl is a terse one-liner except
/// for `PermissionDenied`, whose message is deliberately the full protocol
/// text of the active skill.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum KernelError {
    #[error("skill not found: {skill_id}")]
    SkillNotFound { skill_id: String },

    #[error("malformed skill at {path}: {reason}")]
    MalformedSkill { path: String, reason: String },

    #[error("duplicate command '{command}' declared in skill '{skill_id}'")]
    DuplicateCommand { skill_id: String, command: String },

    #[error("unknown command '{command}' for skill '{skill_id}'")]
    UnknownCommand {
        skill_id: String,
        command: String,
        /// The five closest known command names by Levenshtein distance.
        candidates: Vec<String>,
    },

    #[error("malformed dispatch target: {target}")]
    MalformedTarget { target: String },

    #[error("permission denied for '{tool_name}'")]
    PermissionDenied {
        tool_name: String,
        /// The active skill's full protocol text, returned verbatim as the
        /// re-anchoring payload.
        protocol: String,
    },

    #[error("command '{command}' on skill '{skill_id}' failed: {message}")]
    CommandFailed {
        skill_id: String,
        command: String,
        message: String,
    },

    #[error("call cancelled: {reason}")]
    Cancelled { reason: String },
}

impl KernelError {
    /// Machine-readable discriminant matching the `kind` field of the error
    /// kinds table: `SkillNotFound`, `MalformedSkill`, etc.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::SkillNotFound { .. } => "SkillNotFound",
            KernelError::MalformedSkill { .. } => "MalformedSkill",
            KernelError::DuplicateCommand { .. } => "DuplicateCommand",
            KernelError::UnknownCommand { .. } => "UnknownCommand",
            KernelError::MalformedTarget { .. } => "MalformedTarget",
            KernelError::PermissionDenied { .. } => "PermissionDenied",
            KernelError::CommandFailed { .. } => "CommandFailed",
            KernelError::Cancelled { .. } => "Cancelled",
        }
    }

    /// Structured `extra` payload attached alongside `message` in the
    /// external `{error, message, extra}` result shape.
    pub fn extra(&self) -> serde_json::Value {
        match self {
            KernelError::UnknownCommand { candidates, .. } => {
                serde_json::json!({ "candidates": candidates })
            }
            KernelError::PermissionDenied { protocol, .. } => {
                serde_json::json!({ "protocol": protocol })
            }
            _ => serde_json::Value::Null,
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_closed_set() {
        let err = KernelError::SkillNotFound { skill_id: "git".into() };
        assert_eq!(err.kind(), "SkillNotFound");
    }

    #[test]
    fn permission_denied_carries_protocol() {
        let err = KernelError::PermissionDenied {
            tool_name: "calculator.read_file".into(),
            protocol: "USE add/subtract ONLY".into(),
        };
        assert_eq!(err.extra()["protocol"], "USE add/subtract ONLY");
    }

    #[test]
    fn unknown_command_carries_candidates() {
        let err = KernelError::UnknownCommand {
            skill_id: "git".into(),
            command: "comit".into(),
            candidates: vec!["commit".into(), "checkout".into()],
        };
        assert_eq!(err.extra()["candidates"][0], "commit");
    }
}
