use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Value of a parsed command-line flag.
///
/// Flags either stand alone (`-L`, `--json`) or carry a value
/// (`--format=csv`, or `-i 0` where the following token is numeric).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// Flag was present with no value.
    Bool,
    /// Flag carried an explicit value.
    Value(String),
}

impl FlagValue {
    /// The carried value, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            FlagValue::Bool => None,
            FlagValue::Value(v) => Some(v),
        }
    }
}

/// One parsed pipeline segment: command name, positional subcommands,
/// flags, and the raw segment text it was produced from.
///
/// Immutable once produced. Re-parsing `raw` yields an equal value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub name: String,
    pub subcommands: Vec<String>,
    pub flags: HashMap<String, FlagValue>,
    pub raw: String,
}

impl ParsedCommand {
    /// True when the named flag was present (with or without a value).
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// Value of the named flag, when it carried one.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(|f| f.value())
    }

    /// Positional subcommand at `idx`.
    pub fn subcommand(&self, idx: usize) -> Option<&str> {
        self.subcommands.get(idx).map(|s| s.as_str())
    }
}

fn assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").unwrap())
}

/// Detect a `VAR=value` environment assignment line.
///
/// Only matches when the whole line is the assignment, so
/// `scontrol update state=drain` is not mistaken for one.
pub fn parse_assignment(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.contains(char::is_whitespace) {
        return None;
    }
    let caps = assignment_regex().captures(trimmed)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Resolve `$(...)` command substitutions to deterministic simulated values.
///
/// The substitution table is fixed so that downstream tokenizing never sees
/// an unexpanded substitution and parses the same way on every run:
/// a `pgrep`-shaped inner command yields a fake PID, `hostname` yields the
/// session's current node, `nproc` a fixed core count, `date` a fixed epoch.
/// Unknown inner commands expand to the empty string. Unterminated `$(`
/// degrades to literal text.
pub fn expand_substitutions(line: &str, current_node: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'(' {
            // Find the matching close paren, tracking nesting.
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth == 0 {
                let inner = &line[i + 2..j - 1];
                out.push_str(&simulate_substitution(inner, current_node));
                i = j;
                continue;
            }
            // Unterminated: keep the rest as literal text.
            out.push_str(&line[i..]);
            break;
        }
        let ch = line[i..].chars().next().unwrap_or('\0');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn simulate_substitution(inner: &str, current_node: &str) -> String {
    let name = inner.trim().split_whitespace().next().unwrap_or("");
    match name {
        "pgrep" | "pidof" => "4721".to_string(),
        "hostname" => current_node.to_string(),
        "nproc" => "224".to_string(),
        "date" => "1700000000".to_string(),
        "whoami" => "labuser".to_string(),
        _ => String::new(),
    }
}

/// Split a line on unquoted `|` into pipeline segment strings.
pub fn split_pipeline(line: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '|' => {
                    segments.push(current.trim().to_string());
                    current = String::new();
                }
                _ => current.push(ch),
            },
        }
    }
    segments.push(current.trim().to_string());
    segments
}

/// Split a segment into whitespace-separated tokens, honoring quotes.
///
/// Quote characters are stripped from the produced tokens. An unbalanced
/// quote is treated as running to end of line (best-effort, never an error).
pub fn tokenize(segment: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    for ch in segment.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Parse one pipeline segment into a [`ParsedCommand`].
///
/// Returns `None` for an empty segment (the orchestrator turns that into a
/// no-op with exit code 0). Tokens beginning with `-` become flags; a flag
/// token immediately followed by a purely numeric token absorbs it as its
/// value (`-i 0`, `-n 5`), and `--key=value` splits on the first `=`.
/// Everything else after the command name is a positional subcommand.
pub fn parse_segment(segment: &str) -> Option<ParsedCommand> {
    let raw = segment.trim().to_string();
    let tokens = tokenize(&raw);
    let mut iter = tokens.into_iter().peekable();
    let name = iter.next()?;

    let mut subcommands = Vec::new();
    let mut flags = HashMap::new();
    while let Some(tok) = iter.next() {
        if let Some(rest) = tok.strip_prefix('-') {
            if rest.is_empty() {
                subcommands.push(tok);
                continue;
            }
            if let Some((key, value)) = tok.split_once('=') {
                flags.insert(key.to_string(), FlagValue::Value(value.to_string()));
                continue;
            }
            let takes_value = iter
                .peek()
                .is_some_and(|next| !next.is_empty() && next.chars().all(|c| c.is_ascii_digit()));
            if takes_value {
                let value = iter.next().unwrap_or_default();
                flags.insert(tok, FlagValue::Value(value));
            } else {
                flags.insert(tok, FlagValue::Bool);
            }
        } else {
            subcommands.push(tok);
        }
    }

    Some(ParsedCommand {
        name,
        subcommands,
        flags,
        raw,
    })
}

/// Parse a full (already substitution-expanded) line into pipeline segments.
///
/// The first element is the command to route; the rest drive the pipe
/// filter stage. An empty line yields an empty vector.
pub fn parse_line(line: &str) -> Vec<ParsedCommand> {
    if line.trim().is_empty() {
        return Vec::new();
    }
    split_pipeline(line)
        .iter()
        .filter_map(|seg| parse_segment(seg))
        .collect()
}
