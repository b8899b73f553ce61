use crate::command::CommandResult;

/// Which handler currently owns input lines.
///
/// An explicit tagged union rather than ad hoc booleans: either the
/// top-level router (`Bash`) or one interactive tool's nested handler
/// (`Tool`), which also carries the prompt to display. Nesting is
/// single-level; there is no stack of interactive shells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellMode {
    Bash,
    Tool { name: String, prompt: String },
}

impl ShellMode {
    /// Name of the tool owning the session, if any.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            ShellMode::Bash => None,
            ShellMode::Tool { name, .. } => Some(name),
        }
    }

    /// The interactive tool's prompt; `None` in bash mode (the orchestrator
    /// composes the bash prompt from session state).
    pub fn tool_prompt(&self) -> Option<&str> {
        match self {
            ShellMode::Bash => None,
            ShellMode::Tool { prompt, .. } => Some(prompt),
        }
    }

    /// Apply a tool result produced while already inside that tool's mode:
    /// a returned prompt sustains the mode, an empty or absent one exits it.
    pub fn apply_nested_result(&mut self, result: &CommandResult) {
        if let ShellMode::Tool { prompt, .. } = self {
            match result.next_prompt.as_deref() {
                Some(p) if !p.is_empty() => *prompt = p.to_string(),
                _ => *self = ShellMode::Bash,
            }
        }
    }

    /// Enter a tool's mode from bash when its result asks for one.
    ///
    /// Only a bare invocation (no subcommand) may enter interactive mode;
    /// `nvsm show health` runs one-shot and stays in bash.
    pub fn maybe_enter(&mut self, tool: &str, bare_invocation: bool, result: &CommandResult) {
        if *self == ShellMode::Bash && bare_invocation && result.wants_interactive() {
            *self = ShellMode::Tool {
                name: tool.to_string(),
                prompt: result.next_prompt.clone().unwrap_or_default(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_with_prompt_enters_tool_mode() {
        let mut mode = ShellMode::Bash;
        let result = CommandResult::success("welcome").with_prompt("nvsm-> ");
        mode.maybe_enter("nvsm", true, &result);
        assert_eq!(mode.tool_name(), Some("nvsm"));
        assert_eq!(mode.tool_prompt(), Some("nvsm-> "));
    }

    #[test]
    fn subcommand_invocation_stays_in_bash() {
        let mut mode = ShellMode::Bash;
        let result = CommandResult::success("ok").with_prompt("nvsm-> ");
        mode.maybe_enter("nvsm", false, &result);
        assert_eq!(mode, ShellMode::Bash);
    }

    #[test]
    fn nested_result_updates_prompt_or_exits() {
        let mut mode = ShellMode::Tool {
            name: "cmsh".into(),
            prompt: "[dclab]% ".into(),
        };
        mode.apply_nested_result(&CommandResult::success("x").with_prompt("[dclab->device]% "));
        assert_eq!(mode.tool_prompt(), Some("[dclab->device]% "));

        mode.apply_nested_result(&CommandResult::success("bye"));
        assert_eq!(mode, ShellMode::Bash);
    }

    #[test]
    fn no_stacking_from_inside_tool_mode() {
        let mut mode = ShellMode::Tool {
            name: "nvsm".into(),
            prompt: "nvsm-> ".into(),
        };
        let result = CommandResult::success("x").with_prompt("cmsh% ");
        mode.maybe_enter("cmsh", true, &result);
        assert_eq!(mode.tool_name(), Some("nvsm"));
    }
}
