//! The Permission Gatekeeper: the single point where a tool call is
//! checked against the active skill's declared permission grants before
//! dispatch proceeds.
//!
//! The global `"help"` target and per-skill help lookups never reach
//! `check` at all — the dispatch gateway resolves those before a command
//! is located, so an agent can always ask what it's allowed to do without
//! already being allowed to do it.

use crate::types::{Permission, RequiredPermission};

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    /// The call falls outside the active skill's declared protocol. The
    /// caller re-anchors on `protocol` rather than receiving a bare denial.
    Drift { protocol: String },
}

pub struct Gatekeeper;

impl Gatekeeper {
    /// Check whether `tool_name` (`"skill.command"`) is permitted for a
    /// skill that declared `permissions` and whose full protocol text is
    /// `protocol` (returned verbatim on drift).
    pub fn check(tool_name: &str, permissions: &[String], protocol: &str) -> GateDecision {
        let Some(required) = RequiredPermission::from_tool_name(tool_name) else {
            return GateDecision::Drift {
                protocol: protocol.to_string(),
            };
        };

        let grants = permissions
            .iter()
            .map(|p| Permission::parse(p))
            .any(|perm| perm.grants(&required.category, &required.action));

        if grants {
            GateDecision::Allowed
        } else {
            GateDecision::Drift {
                protocol: protocol.to_string(),
            }
        }
    }
}
