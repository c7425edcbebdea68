//! Dockerfile instruction tokenizer

use super::{BuildFileParser, ParseError};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;
use tracing::debug;

/// One Dockerfile instruction with its arguments
///
/// `name` is upper-cased. For `ENV`, `ARG` and `LABEL` the arguments are a
/// flat `[key, value, key, value, ...]` list; JSON-array (exec form)
/// instructions carry the array elements; everything else is split into
/// shell words with quotes removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub name: String,
    pub args: Vec<String>,
    pub line: usize,
}

impl Instruction {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Key/value pairs of an `ENV`-style instruction, in declaration order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DockerfileParser;

impl DockerfileParser {
    pub fn new() -> Self {
        Self
    }
}

fn keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]+$").expect("valid regex"))
}

/// `<<EOF`, `<<-EOF`, `<<"EOF"` and `<<'EOF'` heredoc openers, not `<<<` here-strings
fn heredoc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:^|[^<])<<-?(?:"([A-Za-z_][A-Za-z0-9_]*)"|'([A-Za-z_][A-Za-z0-9_]*)'|([A-Za-z_][A-Za-z0-9_]*))"#)
            .expect("valid regex")
    })
}

impl BuildFileParser for DockerfileParser {
    fn parse(&self, text: &str) -> Result<Vec<Instruction>, ParseError> {
        let mut instructions = Vec::new();

        for (line, logical) in logical_lines(text) {
            let (keyword, rest) = match logical.split_once(char::is_whitespace) {
                Some((keyword, rest)) => (keyword, rest.trim()),
                None => (logical.as_str(), ""),
            };

            if !keyword_re().is_match(keyword) {
                debug!(line, text = %logical, "Ignoring unrecognised Dockerfile line");
                continue;
            }

            let name = keyword.to_ascii_uppercase();
            let args = match name.as_str() {
                "ENV" | "ARG" | "LABEL" => key_value_args(rest),
                _ => exec_form(rest).unwrap_or_else(|| split_words(rest)),
            };

            instructions.push(Instruction { name, args, line });
        }

        Ok(instructions)
    }
}

/// Joins `\` continuations and drops comments and blank lines.
///
/// Heredoc bodies (`RUN <<EOF` ... `EOF`) are appended to the instruction
/// that opened them, newline-separated and verbatim. Yields the 1-based
/// line number where each logical line starts.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut heredocs: VecDeque<String> = VecDeque::new();

    for (idx, raw) in text.lines().enumerate() {
        if let Some(terminator) = heredocs.front() {
            let body_line = if raw.trim() == terminator.as_str() {
                heredocs.pop_front();
                raw.trim()
            } else {
                raw
            };
            if let Some((_, logical)) = lines.last_mut() {
                logical.push('\n');
                logical.push_str(body_line);
            }
            continue;
        }

        let trimmed = raw.trim();

        if trimmed.starts_with('#') || (trimmed.is_empty() && current.is_empty()) {
            continue;
        }

        if current.is_empty() {
            start = idx + 1;
        }

        match trimmed.strip_suffix('\\') {
            Some(continued) => {
                current.push_str(continued.trim_end());
                current.push(' ');
            }
            None => {
                current.push_str(trimmed);
                let logical = current.trim().to_string();
                if !logical.is_empty() {
                    heredocs.extend(heredoc_terminators(&logical));
                    lines.push((start, logical));
                }
                current.clear();
            }
        }
    }

    let trailing = current.trim();
    if !trailing.is_empty() {
        lines.push((start, trailing.to_string()));
    }

    lines
}

fn heredoc_terminators(line: &str) -> Vec<String> {
    heredoc_re()
        .captures_iter(line)
        .filter_map(|caps| caps.iter().skip(1).flatten().next())
        .map(|word| word.as_str().to_string())
        .collect()
}

fn exec_form(rest: &str) -> Option<Vec<String>> {
    if !rest.starts_with('[') {
        return None;
    }
    serde_json::from_str::<Vec<String>>(rest).ok()
}

fn key_value_args(rest: &str) -> Vec<String> {
    let words = split_words(rest);

    let Some(first) = words.first() else {
        return Vec::new();
    };

    // Legacy form: `ENV KEY value with spaces`
    if !first.contains('=') {
        let value = rest[rest.find(char::is_whitespace).unwrap_or(rest.len())..].trim();
        return vec![first.clone(), unquote(value)];
    }

    let mut args = Vec::with_capacity(words.len() * 2);
    for word in words {
        match word.split_once('=') {
            Some((key, value)) => {
                args.push(key.to_string());
                args.push(value.to_string());
            }
            None => {
                args.push(word);
                args.push(String::new());
            }
        }
    }
    args
}

fn unquote(value: &str) -> String {
    value.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

/// Splits on unquoted whitespace, removing quotes and resolving `\` escapes
fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (Some('\''), c) => current.push(c),
            (_, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (_, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }

    words
}
