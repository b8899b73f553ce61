use crate::context::ClusterWorld;
use crate::parser::ParsedCommand;
use anyhow::Result;
use std::collections::HashMap;

/// Conventional exit code type used by this crate.
///
/// 0 indicates success, 127 an unrecognized command, any other non-zero
/// value a tool-specific failure. This mirrors the convention used by
/// POSIX shells.
pub type ExitCode = i32;

/// Exit code for a command the router could not resolve.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// Result of executing one command line (or one nested-shell line).
///
/// `next_prompt` drives shell-mode transitions: a non-empty value after a
/// bare tool invocation enters (or stays in) that tool's interactive mode,
/// an empty or absent value returns to the top-level shell.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub output: String,
    pub exit_code: ExitCode,
    pub execution_time_ms: Option<u64>,
    pub next_prompt: Option<String>,
}

impl CommandResult {
    /// Successful result carrying `output`.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: 0,
            ..Self::default()
        }
    }

    /// Failed result with a tool-specific exit code.
    pub fn failure(output: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            output: output.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// Attach the prompt an interactive tool wants displayed next.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.next_prompt = Some(prompt.into());
        self
    }

    /// True when this result requests (or sustains) an interactive mode.
    pub fn wants_interactive(&self) -> bool {
        self.next_prompt.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Per-terminal session state, owned by the orchestrator and mutated in
/// place across calls for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Node the session is "logged into"; used as the default target for
    /// node-scoped emulators and for `$(hostname)` expansion.
    pub current_node: String,
    /// Simulated working directory (no real filesystem behind it).
    pub current_path: String,
    /// Session environment variables, set via `VAR=value` lines.
    pub environment: HashMap<String, String>,
    /// Ordered transcript of submitted raw lines.
    pub history: Vec<String>,
}

impl ExecutionContext {
    pub fn new(current_node: impl Into<String>) -> Self {
        Self {
            current_node: current_node.into(),
            current_path: "/home/labuser".to_string(),
            environment: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.environment.insert(key.into(), val.into());
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(|s| s.as_str())
    }
}

/// Capability contract every tool emulator implements.
///
/// Emulators are independent types selected through the router's map; they
/// read and mutate cluster state only through the [`ClusterWorld`] seam, so
/// a scenario's isolated copy and the global store can never be confused.
pub trait Simulator {
    /// Execute one parsed command and produce its textual result.
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult>;
}

/// Nested-shell contract for interactive tools.
///
/// While a tool owns the session (shell mode is non-bash), every raw line
/// is handed here instead of the router, together with the prompt
/// currently displayed (tools with sub-menus derive their position from
/// it). Returning a result without a `next_prompt` ends the interactive
/// mode.
pub trait InteractiveHandler {
    fn handle_line(
        &self,
        line: &str,
        current_prompt: &str,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wants_interactive_requires_nonempty_prompt() {
        assert!(CommandResult::success("x").with_prompt("tool> ").wants_interactive());
        assert!(!CommandResult::success("x").with_prompt("").wants_interactive());
        assert!(!CommandResult::success("x").wants_interactive());
    }
}
