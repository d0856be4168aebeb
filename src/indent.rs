//! Indentation suggestion: `suggestedIndentForBufferRow`,
//! `suggestedIndentForEditedBufferRow`, `indentLevelForLine`, driven by `@indent`/
//! `@indent_end`/`@branch` captures from a layer's indents query.
//!
//! Built using the same `QueryCursor`/`StreamingIterator` capture-walk idiom the
//! rest of this crate uses (`scope_resolver.rs`, `fold_resolver.rs`). Callers are expected to
//! have already force-parsed the layer whose tree/query they pass in here — this module only
//! scans captures, it never reparses.

use tree_sitter::{Point, Query, QueryCursor, StreamingIterator, Tree};

use crate::buffer::Buffer;

/// Counts leading whitespace columns on `row`, in indent units of `tab_length`: a run of spaces counts as `columns / tab_length` (fractional runs
/// round down to whole indent levels, matching how editors report "1.5 levels" as depth 1 for
/// comparison purposes), and a leading tab counts as one full level regardless of its column
/// width.
pub fn indent_level_for_line(buffer: &dyn Buffer, row: usize, tab_length: usize) -> f64 {
    let line = buffer.line_for_row(row);
    let mut levels = 0.0;
    let mut column_run = 0usize;
    for ch in line.chars() {
        match ch {
            ' ' => column_run += 1,
            '\t' => {
                levels += column_run as f64 / tab_length as f64 + 1.0;
                column_run = 0;
            }
            _ => break,
        }
    }
    levels += column_run as f64 / tab_length as f64;
    levels
}

/// A capture from the indents query, tagged by its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndentCaptureKind {
    Indent,
    IndentEnd,
    Branch,
}

struct IndentCapture {
    kind: IndentCaptureKind,
    start: Point,
    end: Point,
    start_byte: usize,
    end_byte: usize,
}

fn capture_kind(names: &[&str], index: u32) -> Option<IndentCaptureKind> {
    match names[index as usize] {
        "indent" => Some(IndentCaptureKind::Indent),
        "indent_end" => Some(IndentCaptureKind::IndentEnd),
        "branch" => Some(IndentCaptureKind::Branch),
        _ => None,
    }
}

/// Collects `@indent`/`@indent_end`/`@branch` captures overlapping `[from, to)`, in position
/// order, so the delta scans below see a consistent order regardless of the match order the
/// query engine itself produces.
fn collect_captures_in_point_range(
    tree: &Tree,
    query: &Query,
    source: &[u8],
    from: Point,
    to: Point,
) -> Vec<IndentCapture> {
    let names = query.capture_names();
    let mut cursor = QueryCursor::new();
    cursor.set_point_range(from..to);
    let mut matches = cursor.matches(query, tree.root_node(), source);
    let mut out = Vec::new();
    while let Some(m) = matches.next() {
        for capture in m.captures {
            let Some(kind) = capture_kind(names, capture.index) else {
                continue;
            };
            out.push(IndentCapture {
                kind,
                start: capture.node.start_position(),
                end: capture.node.end_position(),
                start_byte: capture.node.start_byte(),
                end_byte: capture.node.end_byte(),
            });
        }
    }
    out.sort_by_key(|c| (c.start, c.end));
    out
}

/// `indentDelta`: scans `@indent`/`@indent_end` captures over `[comparisonRow,0)-(row,0)`,
/// ignoring `@indent_end` until the first `@indent` has been seen and ignoring anything that
/// ends before `comparisonRow`. Clamped to `[0, 1]`.
fn indent_delta_for_range(
    tree: &Tree,
    query: &Query,
    source: &[u8],
    comparison_row: usize,
    row: usize,
) -> f64 {
    let from = Point::new(comparison_row, 0);
    let to = Point::new(row, 0);
    let captures = collect_captures_in_point_range(tree, query, source, from, to);

    let mut delta: i64 = 0;
    let mut seen_indent = false;
    for capture in &captures {
        if capture.end.row < comparison_row {
            continue;
        }
        let non_empty = capture.start != capture.end;
        match capture.kind {
            IndentCaptureKind::Indent if non_empty => {
                delta += 1;
                seen_indent = true;
            }
            IndentCaptureKind::IndentEnd if non_empty && seen_indent => {
                delta -= 1;
            }
            _ => {}
        }
    }
    delta.clamp(0, 1) as f64
}

/// `dedentDelta`: scans `@indent_end`/`@branch` captures over `[row, row+1)`, keeping only
/// those whose text is a prefix of the trimmed current line, deduplicated by byte range.
/// Clamped to `[-1, 0]`.
fn dedent_delta_for_row(
    tree: &Tree,
    query: &Query,
    source: &[u8],
    buffer: &dyn Buffer,
    row: usize,
) -> f64 {
    let from = Point::new(row, 0);
    let to = Point::new(row + 1, 0);
    let captures = collect_captures_in_point_range(tree, query, source, from, to);

    let line: String = buffer.line_for_row(row).chars().collect();
    let trimmed = line.trim();

    let mut delta: i64 = 0;
    let mut seen = std::collections::HashSet::new();
    for capture in &captures {
        if !matches!(capture.kind, IndentCaptureKind::IndentEnd | IndentCaptureKind::Branch) {
            continue;
        }
        let text = std::str::from_utf8(&source[capture.start_byte..capture.end_byte]).unwrap_or("");
        if text.is_empty() || !trimmed.starts_with(text) {
            continue;
        }
        if seen.insert((capture.start_byte, capture.end_byte)) {
            delta -= 1;
        }
    }
    delta.clamp(-1, 0) as f64
}

/// `suggestedIndentForBufferRow`: the indent level `row` should have. Row 0 is always 0.
/// Otherwise, starting from the first non-blank row at or above `row-1` (unless
/// `skip_blank_lines` is false), combine that row's own indent with two independently-clamped
/// deltas: an indent/indent_end scan over the rows between the comparison row and `row`, and
/// (unless `skip_dedent_check`) a dedent scan over `row` itself.
#[allow(clippy::too_many_arguments)]
pub fn suggested_indent_for_buffer_row(
    tree: &Tree,
    query: &Query,
    source: &[u8],
    buffer: &dyn Buffer,
    row: usize,
    tab_length: usize,
    skip_blank_lines: bool,
    skip_dedent_check: bool,
) -> f64 {
    if row == 0 {
        return 0.0;
    }

    let mut comparison_row = row - 1;
    if skip_blank_lines {
        while comparison_row > 0 && buffer.is_row_blank(comparison_row) {
            comparison_row -= 1;
        }
    }
    let last_line_indent = indent_level_for_line(buffer, comparison_row, tab_length);

    let indent_delta = indent_delta_for_range(tree, query, source, comparison_row, row);
    let dedent_delta = if skip_dedent_check {
        0.0
    } else {
        dedent_delta_for_row(tree, query, source, buffer, row)
    };

    last_line_indent + indent_delta + dedent_delta
}

/// `suggestedIndentForEditedBufferRow`: like `suggestedIndentForBufferRow`, but triggers an
/// immediate one-level dedent when `row` itself now starts with a node the indents query
/// captures as `@branch` whose text matches the row's trimmed content exactly (e.g. the user
/// just typed a closing keyword), rather than waiting for the next row to be suggested.
/// Otherwise returns the current line's own indent, not the baseline suggestion, so an
/// in-progress edit is never second-guessed.
pub fn suggested_indent_for_edited_buffer_row(
    tree: &Tree,
    query: &Query,
    source: &[u8],
    buffer: &dyn Buffer,
    row: usize,
    tab_length: usize,
) -> f64 {
    let baseline =
        suggested_indent_for_buffer_row(tree, query, source, buffer, row, tab_length, true, true);

    let from = Point::new(row, 0);
    let to = Point::new(row + 1, 0);
    let captures = collect_captures_in_point_range(tree, query, source, from, to);

    let line: String = buffer.line_for_row(row).chars().collect();
    let trimmed = line.trim();

    let dedents_now = captures.iter().any(|c| {
        c.kind == IndentCaptureKind::Branch
            && c.start.row == row
            && std::str::from_utf8(&source[c.start_byte..c.end_byte])
                .map(|text| text == trimmed)
                .unwrap_or(false)
    });

    if dedents_now {
        (baseline - 1.0).max(0.0)
    } else {
        indent_level_for_line(buffer, row, tab_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RopeBuffer;
    use tree_sitter::Parser;

    fn rust_tree(source: &str) -> (Tree, tree_sitter::Language) {
        let mut parser = Parser::new();
        let language: tree_sitter::Language = tree_sitter_rust::LANGUAGE.into();
        parser.set_language(&language).unwrap();
        let tree = parser.parse(source, None).unwrap();
        (tree, language)
    }

    #[test]
    fn indent_level_counts_spaces_in_tab_units() {
        let buffer = RopeBuffer::new("    x\n");
        assert_eq!(indent_level_for_line(&buffer, 0, 4), 1.0);
    }

    #[test]
    fn indent_level_counts_tabs_as_whole_levels() {
        let buffer = RopeBuffer::new("\t\tx\n");
        assert_eq!(indent_level_for_line(&buffer, 0, 4), 2.0);
    }

    #[test]
    fn row_zero_is_always_zero() {
        let source = "fn f() {\n}\n";
        let (tree, language) = rust_tree(source);
        let query = Query::new(&language, "(block \"{\" @indent)").unwrap();
        let buffer = RopeBuffer::new(source);
        assert_eq!(
            suggested_indent_for_buffer_row(&tree, &query, source.as_bytes(), &buffer, 0, 2, true, false),
            0.0
        );
    }

    #[test]
    fn suggests_increased_indent_after_an_open_brace() {
        // S4: `{` captured as `@indent`. Row 1 is blank, so indentDelta alone drives the result.
        let source = "fn f() {\n\n}\n";
        let (tree, language) = rust_tree(source);
        let query = Query::new(&language, "(block \"{\" @indent)").unwrap();
        let buffer = RopeBuffer::new(source);
        let suggestion = suggested_indent_for_buffer_row(
            &tree,
            &query,
            source.as_bytes(),
            &buffer,
            1,
            2,
            true,
            false,
        );
        assert_eq!(suggestion, 1.0);
    }

    #[test]
    fn dedents_when_the_row_itself_closes_the_block() {
        // S4: `{` as `@indent`, `}` as `@indent_end` -> the dedent pass on the closing row
        // cancels the indent pass, landing back at the opening row's own indent.
        let source = "fn f() {\n}\n";
        let (tree, language) = rust_tree(source);
        let query =
            Query::new(&language, "[(block \"{\" @indent) (block \"}\" @indent_end)]").unwrap();
        let buffer = RopeBuffer::new(source);
        let suggestion = suggested_indent_for_buffer_row(
            &tree,
            &query,
            source.as_bytes(),
            &buffer,
            1,
            2,
            true,
            false,
        );
        assert_eq!(suggestion, 0.0);
    }

    #[test]
    fn edited_row_falls_back_to_its_own_indent_without_a_matching_branch() {
        let source = "fn f() {\n  x\n}\n";
        let (tree, language) = rust_tree(source);
        let query =
            Query::new(&language, "[(block \"{\" @indent) (block \"}\" @indent_end)]").unwrap();
        let buffer = RopeBuffer::new(source);
        let suggestion =
            suggested_indent_for_edited_buffer_row(&tree, &query, source.as_bytes(), &buffer, 1, 2);
        assert_eq!(suggestion, indent_level_for_line(&buffer, 1, 2));
    }
}
