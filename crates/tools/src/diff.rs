//! Search/replace patching and unified diffs.
//!
//! An edit names literal text to find and the text to put in its place.
//! Matching is literal and first-occurrence: the trimmed `search` text is
//! located in the current content and swapped for the trimmed `replace`
//! text, keeping whatever whitespace surrounds the match in the file. When
//! the literal text is absent, a line-wise match that ignores indentation
//! and trailing whitespace is tried before the edit is reported as failed.

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::{debug, warn};

/// A localized edit: literal text to find and its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInstruction {
    pub search: String,
    pub replace: String,
}

impl EditInstruction {
    /// Build an edit. Returns `None` when `search` is blank.
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Option<Self> {
        let search = search.into();
        if search.trim().is_empty() {
            return None;
        }
        Some(Self {
            search,
            replace: replace.into(),
        })
    }
}

/// Outcome of applying a list of edits to one file's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Content after every matching edit was applied
    pub content: String,
    /// Whether `content` differs from the original
    pub changed: bool,
    /// `search` text of each edit that could not be located
    pub failed: Vec<String>,
    /// One unified diff (search → replace) per applied edit
    pub diffs: Vec<String>,
}

/// Where an edit matched.
enum Match {
    /// Byte range of the trimmed search text.
    Literal { start: usize, end: usize },
    /// Byte range of whole lines (without the final line break), plus the
    /// indentation of the first matched line and of the first search line.
    Lines {
        start: usize,
        end: usize,
        file_indent: String,
        search_indent: String,
    },
}

/// Apply `edits` in order to `original`.
///
/// Each edit is matched against the content produced by the edits before it.
/// Unmatched edits are skipped and listed in [`ApplyReport::failed`]; the
/// remaining edits still apply. An edit whose `search` equals its `replace`
/// counts as matched and changes nothing.
pub fn apply_edits(path: &str, edits: &[EditInstruction], original: &str) -> ApplyReport {
    let mut content = original.to_string();
    let mut failed = Vec::new();
    let mut diffs = Vec::new();

    for (index, edit) in edits.iter().enumerate() {
        let Some(found) = locate(&content, &edit.search) else {
            warn!(path, edit = index, "Search text not found, skipping edit");
            failed.push(edit.search.clone());
            continue;
        };
        if edit.search == edit.replace {
            debug!(path, edit = index, "Edit is a no-op");
            continue;
        }

        content = match found {
            Match::Literal { start, end } => {
                splice(&content, start, end, edit.replace.trim())
            }
            Match::Lines {
                start,
                end,
                file_indent,
                search_indent,
            } => {
                let replacement = reindent(&edit.replace, &search_indent, &file_indent);
                splice(&content, start, end, &replacement)
            }
        };
        diffs.push(snippet_diff(path, &edit.search, &edit.replace));
        debug!(path, edit = index, "Applied edit");
    }

    ApplyReport {
        changed: content != original,
        content,
        failed,
        diffs,
    }
}

fn locate(content: &str, search: &str) -> Option<Match> {
    let needle = search.trim();
    if needle.is_empty() {
        return None;
    }
    if let Some(start) = content.find(needle) {
        return Some(Match::Literal {
            start,
            end: start + needle.len(),
        });
    }
    locate_lines(content, search)
}

/// Find the first run of content lines equal to the search lines once both
/// sides are trimmed. Blank lines around the search block are ignored.
fn locate_lines(content: &str, search: &str) -> Option<Match> {
    let search_lines = strip_blank_edges(search);
    if search_lines.is_empty() {
        return None;
    }

    // (start offset, end offset without line break, line text)
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in content.split_inclusive('\n') {
        let body = raw.strip_suffix('\n').unwrap_or(raw);
        let body = body.strip_suffix('\r').unwrap_or(body);
        lines.push((offset, offset + body.len(), body));
        offset += raw.len();
    }
    if lines.len() < search_lines.len() {
        return None;
    }

    (0..=lines.len() - search_lines.len()).find_map(|i| {
        let window = &lines[i..i + search_lines.len()];
        let matches = window
            .iter()
            .zip(&search_lines)
            .all(|((_, _, line), wanted)| line.trim() == wanted.trim());
        matches.then(|| Match::Lines {
            start: window[0].0,
            end: window[window.len() - 1].1,
            file_indent: leading_whitespace(window[0].2).to_string(),
            search_indent: leading_whitespace(search_lines[0]).to_string(),
        })
    })
}

fn strip_blank_edges(text: &str) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Shift `replace` from the search block's indentation to the file's.
fn reindent(replace: &str, search_indent: &str, file_indent: &str) -> String {
    strip_blank_edges(replace)
        .into_iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else if let Some(rest) = line.strip_prefix(search_indent) {
                format!("{file_indent}{}", rest.trim_end())
            } else {
                format!("{file_indent}{}", line.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn splice(content: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(content.len() - (end - start) + replacement.len());
    out.push_str(&content[..start]);
    out.push_str(replacement);
    out.push_str(&content[end..]);
    out
}

/// Unified diff of a single edit, for logs and tool results.
fn snippet_diff(path: &str, search: &str, replace: &str) -> String {
    TextDiff::from_lines(search, replace)
        .unified_diff()
        .context_radius(3)
        .missing_newline_hint(false)
        .header(path, path)
        .to_string()
}

/// Minimal unified diff between two versions of a file.
///
/// Returns an empty string when the versions are identical.
pub fn generate_diff(original: &str, new: &str, path: &str) -> String {
    if original == new {
        return String::new();
    }
    TextDiff::from_lines(original, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

/// Count added and removed lines in a unified diff, skipping file headers.
pub fn diff_stats(unified: &str) -> (usize, usize) {
    unified
        .lines()
        .filter(|l| !l.starts_with("+++") && !l.starts_with("---"))
        .fold((0, 0), |(add, del), line| match line.as_bytes().first() {
            Some(b'+') => (add + 1, del),
            Some(b'-') => (add, del + 1),
            _ => (add, del),
        })
}

const SEARCH_OPEN: &str = "<SEARCH>";
const SEARCH_CLOSE: &str = "</SEARCH>";
const REPLACE_OPEN: &str = "<REPLACE>";
const REPLACE_CLOSE: &str = "</REPLACE>";

/// Parse `<SEARCH>…</SEARCH><REPLACE>…</REPLACE>` blocks out of a model reply.
///
/// Anything outside the blocks is ignored. Incomplete blocks end parsing;
/// blocks with a blank search are dropped.
pub fn parse_search_replace_blocks(text: &str) -> Vec<EditInstruction> {
    let mut edits = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(SEARCH_OPEN) {
        let after_open = &rest[open + SEARCH_OPEN.len()..];
        let Some(close) = after_open.find(SEARCH_CLOSE) else {
            break;
        };
        let search = &after_open[..close];
        let after_search = &after_open[close + SEARCH_CLOSE.len()..];

        let Some(replace_open) = after_search.find(REPLACE_OPEN) else {
            break;
        };
        if after_search[..replace_open].contains(SEARCH_OPEN) {
            // A new block started before this one got its REPLACE.
            rest = after_search;
            continue;
        }
        let after_replace_open = &after_search[replace_open + REPLACE_OPEN.len()..];
        let Some(replace_close) = after_replace_open.find(REPLACE_CLOSE) else {
            break;
        };
        let replace = &after_replace_open[..replace_close];

        match EditInstruction::new(strip_block(search), strip_block(replace)) {
            Some(edit) => edits.push(edit),
            None => debug!("Dropping search/replace block with empty search"),
        }
        rest = &after_replace_open[replace_close + REPLACE_CLOSE.len()..];
    }

    edits
}

/// Drop the line break that follows an opening tag and precedes a closing one.
fn strip_block(block: &str) -> &str {
    let block = block
        .strip_prefix("\r\n")
        .or_else(|| block.strip_prefix('\n'))
        .unwrap_or(block);
    block
        .strip_suffix("\r\n")
        .or_else(|| block.strip_suffix('\n'))
        .unwrap_or(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(search: &str, replace: &str) -> EditInstruction {
        EditInstruction::new(search, replace).unwrap()
    }

    #[test]
    fn single_line_replacement() {
        let report = apply_edits("f.txt", &[edit("b", "B")], "a\nb\nc\n");
        assert_eq!(report.content, "a\nB\nc\n");
        assert!(report.changed);
        assert!(report.failed.is_empty());
        assert_eq!(report.diffs.len(), 1);
        assert!(report.diffs[0].contains("-b"));
        assert!(report.diffs[0].contains("+B"));
    }

    #[test]
    fn identical_search_and_replace_is_idempotent() {
        let original = "fn main() {\n    println!(\"hi\");\n}\n";
        let edits = [edit("println!(\"hi\");", "println!(\"hi\");"), edit("fn main()", "fn main()")];

        let first = apply_edits("main.rs", &edits, original);
        assert!(!first.changed);
        assert!(first.failed.is_empty());
        assert_eq!(first.content, original);

        let second = apply_edits("main.rs", &edits, &first.content);
        assert!(!second.changed);
        assert_eq!(second.content, original);
    }

    #[test]
    fn unmatched_edit_is_reported_and_others_still_apply() {
        let report = apply_edits(
            "f.txt",
            &[edit("missing", "x"), edit("c", "C")],
            "a\nb\nc\n",
        );
        assert_eq!(report.content, "a\nb\nC\n");
        assert!(report.changed);
        assert_eq!(report.failed, vec!["missing".to_string()]);
    }

    #[test]
    fn edits_see_earlier_edits() {
        let report = apply_edits("f.txt", &[edit("one", "two"), edit("two", "three")], "one\n");
        assert_eq!(report.content, "three\n");
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let report = apply_edits("f.txt", &[edit("x", "y")], "x x x");
        assert_eq!(report.content, "y x x");
    }

    #[test]
    fn surrounding_whitespace_comes_from_the_file() {
        let original = "def f():\n    return 1\n";
        let report = apply_edits("f.py", &[edit("\n\n  return 1  \n", "  return 2\n\n")], original);
        assert_eq!(report.content, "def f():\n    return 2\n");
    }

    #[test]
    fn indentation_drift_falls_back_to_line_match() {
        let original = "fn f() {\n        let a = 1;\n        let b = 2;\n}\n";
        let search = "    let a = 1;\n    let b = 2;";
        let replace = "    let a = 10;\n    let b = 20;\n    let c = a + b;";
        let report = apply_edits("f.rs", &[edit(search, replace)], original);
        assert!(report.failed.is_empty());
        assert_eq!(
            report.content,
            "fn f() {\n        let a = 10;\n        let b = 20;\n        let c = a + b;\n}\n"
        );
    }

    #[test]
    fn trailing_whitespace_drift_matches() {
        let original = "alpha   \nbeta\t\ngamma\n";
        let report = apply_edits("f.txt", &[edit("alpha\nbeta", "ALPHA\nBETA")], original);
        assert!(report.failed.is_empty());
        assert_eq!(report.content, "ALPHA\nBETA\ngamma\n");
    }

    #[test]
    fn blank_search_is_rejected() {
        assert!(EditInstruction::new("   \n", "x").is_none());
    }

    #[test]
    fn generate_diff_for_identical_is_empty() {
        assert!(generate_diff("same\n", "same\n", "f.txt").is_empty());
    }

    #[test]
    fn generate_diff_has_headers_and_hunks() {
        let diff = generate_diff("a\nb\nc\n", "a\nB\nc\n", "f.txt");
        assert!(diff.contains("--- a/f.txt"));
        assert!(diff.contains("+++ b/f.txt"));
        assert!(diff.contains("@@"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));
    }

    #[test]
    fn stats_count_lines() {
        let diff = generate_diff("a\nb\n", "a\nc\nd\n", "f.txt");
        assert_eq!(diff_stats(&diff), (2, 1));
    }

    #[test]
    fn parse_blocks() {
        let reply = "Here are the edits:\n<SEARCH>\nold line\n</SEARCH>\n<REPLACE>\nnew line\n</REPLACE>\n\
                     <SEARCH>\nfoo()\n</SEARCH>\n<REPLACE>\n</REPLACE>\n";
        let edits = parse_search_replace_blocks(reply);
        assert_eq!(
            edits,
            vec![edit("old line", "new line"), edit("foo()", "")]
        );
    }

    #[test]
    fn parse_ignores_malformed_and_empty() {
        assert!(parse_search_replace_blocks("no blocks here").is_empty());
        assert!(parse_search_replace_blocks("<SEARCH>\nunterminated").is_empty());
        assert!(parse_search_replace_blocks("<SEARCH>\n\n</SEARCH><REPLACE>x</REPLACE>").is_empty());

        let reply = "<SEARCH>a</SEARCH><SEARCH>b</SEARCH><REPLACE>c</REPLACE>";
        assert_eq!(parse_search_replace_blocks(reply), vec![edit("b", "c")]);
    }
}
