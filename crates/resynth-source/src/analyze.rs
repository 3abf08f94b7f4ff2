//! Definition range detection by indentation.
//!
//! [`FileAnalysis`] maps every line that starts a function definition to the
//! exclusive end of its body. This is a line heuristic, not a parser: it
//! does not track strings or bracket continuations that span lines, so
//! unusual formatting can move a boundary. Trailing blank and comment-only
//! lines are never part of a body.

use std::collections::HashMap;

/// Per-file analysis result. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAnalysis {
    lines: Vec<String>,
    /// 0-based start line -> exclusive 0-based end line, or `None` when the
    /// definition is decorated.
    ends: HashMap<usize, Option<usize>>,
}

impl FileAnalysis {
    /// Analyzes the full text of a source file.
    pub fn from_text(text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let mut ends = HashMap::new();

        for (start, line) in lines.iter().enumerate() {
            let Some(indent) = definition_indent(line) else {
                continue;
            };
            if code_line_before(&lines, start).is_some_and(|prev| is_decoration(prev, indent)) {
                ends.insert(start, None);
                continue;
            }
            ends.insert(start, Some(body_end(&lines, start, indent)));
        }

        FileAnalysis { lines, ends }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Line at a 0-based index.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Nearest line above `index` that is neither blank nor a comment.
    /// Decorators may be separated from their `def` by such lines.
    pub fn code_line_before(&self, index: usize) -> Option<&str> {
        code_line_before(&self.lines, index)
    }

    /// End of the definition starting at 0-based line `start`.
    ///
    /// `None` if no definition starts there; `Some(None)` if the definition
    /// is decorated and cannot be extracted.
    pub fn definition_end(&self, start: usize) -> Option<Option<usize>> {
        self.ends.get(&start).copied()
    }

    /// Number of definition lines found.
    pub fn definition_count(&self) -> usize {
        self.ends.len()
    }
}

/// Blank or comment-only line.
pub fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn code_line_before(lines: &[String], index: usize) -> Option<&str> {
    lines
        .get(..index)?
        .iter()
        .rev()
        .map(String::as_str)
        .find(|line| !is_blank_or_comment(line))
}

/// Indentation prefix of a line beginning with `def` (or `async def`).
fn definition_indent(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches([' ', '\t']);
    let keyword = trimmed
        .strip_prefix("async")
        .filter(|rest| rest.starts_with([' ', '\t']))
        .map(|rest| rest.trim_start_matches([' ', '\t']))
        .unwrap_or(trimmed);
    let after = keyword.strip_prefix("def")?;
    if !after.starts_with([' ', '\t']) {
        return None;
    }
    Some(&line[..line.len() - trimmed.len()])
}

/// Line at the same indentation starting with `@`.
fn is_decoration(prev: &str, indent: &str) -> bool {
    prev.starts_with(indent)
        && prev.as_bytes().get(indent.len()) == Some(&b'@')
}

/// Line strictly deeper than `indent`.
fn is_body_line(line: &str, indent: &str) -> bool {
    line.starts_with(indent)
        && line
            .as_bytes()
            .get(indent.len())
            .is_some_and(|b| b.is_ascii_whitespace())
}

fn body_end(lines: &[String], start: usize, indent: &str) -> usize {
    // First blank/comment line of the current trailing run, if any.
    let mut candidate: Option<usize> = None;
    for (index, line) in lines.iter().enumerate().skip(start + 1) {
        if is_blank_or_comment(line) {
            candidate.get_or_insert(index);
            continue;
        }
        if is_body_line(line, indent) {
            candidate = None;
            continue;
        }
        return candidate.unwrap_or(index);
    }
    candidate.unwrap_or(lines.len())
}
