//! Unix-like post-filters applied to emulator output when a line contains
//! pipe operators.
//!
//! Each filter is a pure text-to-text transform. Malformed filter
//! arguments and unknown filter names degrade to passing the text through
//! unchanged: a bad `grep` flag should never eat the output the learner is
//! trying to inspect.

use crate::parser::{ParsedCommand, tokenize};
use argh::FromArgs;
use regex::RegexBuilder;
use tracing::debug;

/// Apply the piped segments' filters to `text`, left to right.
pub fn apply_filters(text: String, segments: &[ParsedCommand]) -> String {
    segments
        .iter()
        .fold(text, |acc, seg| apply_one(&acc, seg))
}

fn apply_one(text: &str, seg: &ParsedCommand) -> String {
    // argh wants the original argument list, not the flag map; the raw
    // segment text is the contract for reproducing it.
    let tokens = tokenize(&seg.raw);
    let args: Vec<&str> = tokens.iter().skip(1).map(|s| s.as_str()).collect();
    let filtered = match seg.name.as_str() {
        "grep" => GrepFilter::parse(&args).map(|f| f.run(text)),
        "head" => HeadFilter::parse(&args).map(|f| f.run(text)),
        "tail" => TailFilter::parse(&args).map(|f| f.run(text)),
        "wc" => WcFilter::parse(&args).map(|f| f.run(text)),
        "sort" => SortFilter::parse(&args).map(|f| f.run(text)),
        "uniq" => Some(uniq(text)),
        other => {
            debug!(filter = other, "unknown pipe filter, passing through");
            None
        }
    };
    filtered.unwrap_or_else(|| text.to_string())
}

trait Filter: FromArgs {
    const NAME: &'static str;

    fn parse(args: &[&str]) -> Option<Self> {
        match Self::from_args(&[Self::NAME], args) {
            Ok(f) => Some(f),
            Err(_) => {
                debug!(filter = Self::NAME, "malformed filter arguments, passing through");
                None
            }
        }
    }
}

#[derive(FromArgs)]
/// print lines matching a pattern
struct GrepFilter {
    #[argh(positional)]
    /// the pattern to search for (a regular expression)
    pattern: String,

    #[argh(switch, short = 'i')]
    /// ignore case distinctions
    ignore_case: bool,

    #[argh(switch, short = 'v')]
    /// select non-matching lines
    invert: bool,

    #[argh(switch, short = 'c')]
    /// print only a count of matching lines
    count: bool,
}

impl Filter for GrepFilter {
    const NAME: &'static str = "grep";
}

impl GrepFilter {
    fn run(&self, text: &str) -> String {
        let re = match RegexBuilder::new(&self.pattern)
            .case_insensitive(self.ignore_case)
            .build()
        {
            Ok(re) => re,
            Err(_) => {
                debug!(pattern = %self.pattern, "invalid grep pattern, passing through");
                return text.to_string();
            }
        };
        let matched: Vec<&str> = text
            .lines()
            .filter(|line| re.is_match(line) != self.invert)
            .collect();
        if self.count {
            format!("{}\n", matched.len())
        } else {
            join_lines(&matched)
        }
    }
}

#[derive(FromArgs)]
/// output the first lines of the input
struct HeadFilter {
    #[argh(option, short = 'n', default = "10")]
    /// number of lines to keep
    lines: usize,
}

impl Filter for HeadFilter {
    const NAME: &'static str = "head";
}

impl HeadFilter {
    fn run(&self, text: &str) -> String {
        let kept: Vec<&str> = text.lines().take(self.lines).collect();
        join_lines(&kept)
    }
}

#[derive(FromArgs)]
/// output the last lines of the input
struct TailFilter {
    #[argh(option, short = 'n', default = "10")]
    /// number of lines to keep
    lines: usize,
}

impl Filter for TailFilter {
    const NAME: &'static str = "tail";
}

impl TailFilter {
    fn run(&self, text: &str) -> String {
        let all: Vec<&str> = text.lines().collect();
        let start = all.len().saturating_sub(self.lines);
        join_lines(&all[start..])
    }
}

#[derive(FromArgs)]
/// count lines, words and bytes
struct WcFilter {
    #[argh(switch, short = 'l')]
    /// count lines only
    lines_only: bool,

    #[argh(switch, short = 'w')]
    /// count words only
    words_only: bool,

    #[argh(switch, short = 'c')]
    /// count bytes only
    bytes_only: bool,
}

impl Filter for WcFilter {
    const NAME: &'static str = "wc";
}

impl WcFilter {
    fn run(&self, text: &str) -> String {
        let lines = text.lines().count();
        let words = text.split_whitespace().count();
        let bytes = text.len();
        if self.lines_only {
            format!("{lines}\n")
        } else if self.words_only {
            format!("{words}\n")
        } else if self.bytes_only {
            format!("{bytes}\n")
        } else {
            format!("{lines} {words} {bytes}\n")
        }
    }
}

#[derive(FromArgs)]
/// sort lines of the input
struct SortFilter {
    #[argh(switch, short = 'r')]
    /// reverse the result of comparisons
    reverse: bool,
}

impl Filter for SortFilter {
    const NAME: &'static str = "sort";
}

impl SortFilter {
    fn run(&self, text: &str) -> String {
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort_unstable();
        if self.reverse {
            lines.reverse();
        }
        join_lines(&lines)
    }
}

fn uniq(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines() {
        if out.last() != Some(&line) {
            out.push(line);
        }
    }
    join_lines(&out)
}

fn join_lines(lines: &[&str]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("{}\n", lines.join("\n"))
    }
}
