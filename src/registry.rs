use crate::command::{CommandResult, EXIT_NOT_FOUND, InteractiveHandler, Simulator};
use std::collections::HashMap;
use std::rc::Rc;

/// Edit distance above which a candidate is not worth suggesting.
const SUGGESTION_DISTANCE: usize = 2;

/// Maps command names (and aliases) to tool emulators.
///
/// Resolution is exact-match only; prefix matching would make dispatch
/// ambiguous between tool families. A whole family can alias one emulator
/// via [`register_many`](Self::register_many). Interactive tools register a
/// second, nested handler that owns lines while the shell is in their mode.
#[derive(Default)]
pub struct CommandRouter {
    handlers: HashMap<String, Rc<dyn Simulator>>,
    interactive: HashMap<String, Rc<dyn InteractiveHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Rc<dyn Simulator>) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Register one emulator under several names (a tool-family alias set).
    pub fn register_many(&mut self, names: &[&str], handler: Rc<dyn Simulator>) {
        for name in names {
            self.handlers.insert((*name).to_string(), handler.clone());
        }
    }

    pub fn register_interactive(&mut self, name: &str, handler: Rc<dyn InteractiveHandler>) {
        self.interactive.insert(name.to_string(), handler);
    }

    /// Exact-match lookup.
    pub fn resolve(&self, name: &str) -> Option<Rc<dyn Simulator>> {
        self.handlers.get(name).cloned()
    }

    pub fn resolve_interactive(&self, name: &str) -> Option<Rc<dyn InteractiveHandler>> {
        self.interactive.get(name).cloned()
    }

    /// Registered names, sorted for deterministic iteration.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Closest registered name within the suggestion threshold.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for candidate in self.names() {
            let d = levenshtein(name, candidate);
            if d <= SUGGESTION_DISTANCE && best.is_none_or(|(_, bd)| d < bd) {
                best = Some((candidate, d));
            }
        }
        best.map(|(s, _)| s)
    }

    /// Synthetic result for an unresolved command: exit 127 plus either a
    /// did-you-mean suggestion or a pointer at `help`.
    pub fn not_found(&self, name: &str) -> CommandResult {
        let hint = match self.suggest(name) {
            Some(s) => format!("Did you mean '{s}'?"),
            None => "Type 'help' to list available commands.".to_string(),
        };
        CommandResult::failure(
            format!("bash: {name}: command not found\n{hint}\n"),
            EXIT_NOT_FOUND,
        )
    }
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(ca != cb);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
