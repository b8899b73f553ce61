//! Authoring data model for guided lab exercises.
//!
//! Scenarios arrive as data (serde-ready, typically authored as JSON); the
//! engine treats each rule as an opaque predicate evaluated by the
//! validator against the executed command, its output, and the isolated
//! cluster state.

use crate::cluster::{NodeHealth, SlurmState};
use serde::{Deserialize, Serialize};

/// One revealable hint attached to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hint {
    pub id: String,
    pub text: String,
}

/// One validation rule in a step's rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValidationRule {
    /// The executed command line matches a regex.
    CommandMatches { pattern: String },
    /// The executed command line contains a substring.
    CommandContains { needle: String },
    /// The command's (post-filter) output contains a substring.
    OutputContains { needle: String },
    /// The command's (post-filter) output matches a regex.
    OutputMatches { pattern: String },
    /// Some earlier command on this step contained a substring.
    PriorCommandContains { needle: String },
    /// A node in the scenario's cluster copy has the given health.
    NodeHealthIs { node: String, health: NodeHealth },
    /// A node's Slurm state equals the given state.
    SlurmStateIs { node: String, state: SlurmState },
    /// A GPU's MIG mode equals the given setting.
    MigModeIs { node: String, gpu: u32, enabled: bool },
    /// An XID error with the given code was recorded on a node.
    XidLogged { node: String, code: u32 },
}

/// One ordered step of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub instruction: String,
    pub rules: Vec<ValidationRule>,
    #[serde(default)]
    pub hints: Vec<Hint>,
}

/// A guided lab exercise: ordered steps with rules and optional hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Advance to the next step automatically (after a short delay) once a
    /// step's rules all pass.
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,
    pub steps: Vec<Step>,
}

fn default_auto_advance() -> bool {
    true
}
