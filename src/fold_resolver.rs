//! `FoldResolver`: resolves `@fold`/`@fold.start`/`@fold.end` captures from a
//! layer's folds query into buffer-range folds, covering both simple folds (a single capture
//! whose end is optionally adjusted via `#set!` properties) and divided folds (matched
//! `@fold.start`/`@fold.end` pairs tracked by nesting depth).
//!
//! Built on the same query-match walking idiom used elsewhere in this crate
//! (`QueryCursor`/`StreamingIterator` over matches, `#set!` properties read per pattern via
//! `Query::property_settings`).

use tree_sitter::{Node, Point, Query, QueryCursor, StreamingIterator, Tree};

use crate::boundary_tree::{BoundaryKey, Edge};
use crate::query::properties::{resolve_point, Resolved};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldRange {
    pub start: Point,
    pub end: Point,
}

fn row_length(source: &[u8], row: usize) -> usize {
    source
        .split(|&b| b == b'\n')
        .nth(row)
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).len())
        .unwrap_or(0)
}

/// Walks a folds-query match's `#set!` properties for the simple-fold adjustments /// names: `fold.endAt` (a node-descriptor chain replacing the natural end, default
/// `lastChild.startPosition`), `fold.offsetEnd` (a `row,column` delta applied after `endAt`),
/// `fold.adjustEndColumn` (sets the end column to a fixed value, clipped to the row's length),
/// and `fold.adjustToEndOfPreviousRow` (pulls the end back onto the previous row's line end when
/// the resolved end sits at column 0).
fn simple_fold_range(
    query: &Query,
    pattern_index: usize,
    node: Node<'_>,
    source: &[u8],
) -> Option<FoldRange> {
    let start = Point::new(node.start_position().row, usize::MAX);
    let mut end = resolve_point(node, "lastChild.startPosition").unwrap_or_else(|| node.end_position());

    for setting in query.property_settings(pattern_index) {
        match (&*setting.key, setting.value.as_deref()) {
            ("fold.endAt", Some(path)) => {
                if let Some(resolved_point) = resolve_point(node, path) {
                    end = resolved_point;
                } else if let Some(Resolved::Node(n)) =
                    crate::query::properties::resolve(node, path)
                {
                    end = n.end_position();
                }
            }
            ("fold.offsetEnd", Some(delta)) => {
                if let Some((row, column)) = parse_offset(delta) {
                    end = offset_point(end, row, column);
                }
            }
            ("fold.adjustEndColumn", Some(column)) => {
                if let Ok(column) = column.trim().parse::<usize>() {
                    end = Point::new(end.row, column.min(row_length(source, end.row)));
                }
            }
            ("fold.adjustToEndOfPreviousRow", None) if end.column == 0 && end.row > 0 => {
                end = Point::new(end.row - 1, usize::MAX);
            }
            _ => {}
        }
    }

    if end.row <= start.row {
        return None;
    }
    Some(FoldRange { start, end })
}

fn parse_offset(raw: &str) -> Option<(i64, i64)> {
    let (row, column) = raw.split_once(',')?;
    Some((row.trim().parse().ok()?, column.trim().parse().ok()?))
}

fn offset_point(point: Point, row_delta: i64, column_delta: i64) -> Point {
    let row = (point.row as i64 + row_delta).max(0) as usize;
    let column = (point.column as i64 + column_delta).max(0) as usize;
    Point::new(row, column)
}

/// `getFoldRangeForRow`: resolves every fold whose range touches `row`, from
/// both simple and divided folds declared in `folds_query`.
pub struct FoldResolver<'a> {
    query: &'a Query,
    fold_capture: Option<u32>,
    fold_start_capture: Option<u32>,
    fold_end_capture: Option<u32>,
}

impl<'a> FoldResolver<'a> {
    pub fn new(query: &'a Query) -> Self {
        Self {
            query,
            fold_capture: query.capture_index_for_name("fold"),
            fold_start_capture: query.capture_index_for_name("fold.start"),
            fold_end_capture: query.capture_index_for_name("fold.end"),
        }
    }

    /// All folds resolvable anywhere in `tree`, simple folds first (in capture order) followed
    /// by divided folds (matched by nesting depth, innermost pairs first).
    pub fn folds(&self, tree: &Tree, source: &[u8]) -> Vec<FoldRange> {
        let mut folds = self.simple_folds(tree, source);
        folds.extend(self.divided_folds(tree, source));
        folds
    }

    fn simple_folds(&self, tree: &Tree, source: &[u8]) -> Vec<FoldRange> {
        let Some(fold_capture) = self.fold_capture else {
            return Vec::new();
        };
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(self.query, tree.root_node(), source);
        let mut out = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if capture.index == fold_capture {
                    if let Some(range) =
                        simple_fold_range(self.query, m.pattern_index, capture.node, source)
                    {
                        out.push(range);
                    }
                }
            }
        }
        out
    }

    /// Divided folds: every `@fold.start` is paired with the nearest
    /// unmatched following `@fold.end` at the same nesting depth, like balanced brackets, by
    /// walking the combined `@fold.start`/`@fold.end` boundary tree forward from each start.
    /// An end whose resolved column is 0 is pulled back to the end of the previous row so the
    /// closing marker's own line stays visible.
    fn divided_folds(&self, tree: &Tree, source: &[u8]) -> Vec<FoldRange> {
        let (Some(start_capture), Some(end_capture)) =
            (self.fold_start_capture, self.fold_end_capture)
        else {
            return Vec::new();
        };

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(self.query, tree.root_node(), source);
        // Ordered by the boundary tree's own key (position, then end-before-start at an equal
        // point); the node's own `start_position()` is carried alongside for reporting, since
        // `BoundaryKey` only orders, it doesn't remember which node produced it.
        let mut events: Vec<(BoundaryKey, Point)> = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let pos = capture.node.start_position();
                if capture.index == start_capture {
                    events.push((BoundaryKey::start(pos), pos));
                } else if capture.index == end_capture {
                    events.push((BoundaryKey::end(pos), pos));
                }
            }
        }
        events.sort_by_key(|(key, _)| *key);

        let mut out = Vec::new();
        for i in 0..events.len() {
            let (key, node_pos) = events[i];
            if key.edge != Edge::Start {
                continue;
            }
            let start = Point::new(node_pos.row, usize::MAX);
            let mut depth = 0usize;
            for &(other_key, other_pos) in &events[i + 1..] {
                match other_key.edge {
                    Edge::Start => depth += 1,
                    Edge::End => {
                        if depth > 0 {
                            depth -= 1;
                            continue;
                        }
                        let mut end = Point::new(other_pos.row, usize::MAX);
                        if other_pos.column == 0 && other_pos.row > 0 {
                            end = Point::new(other_pos.row - 1, usize::MAX);
                        }
                        if end.row > start.row {
                            out.push(FoldRange { start, end });
                        }
                        break;
                    }
                }
            }
        }
        out
    }

    /// Filters `folds` down to the ones touching `row`.
    pub fn folds_for_row(folds: &[FoldRange], row: usize) -> Vec<FoldRange> {
        folds
            .iter()
            .copied()
            .filter(|f| f.start.row <= row && row <= f.end.row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(source: &str, query_source: &str) -> (Tree, Query) {
        let mut parser = Parser::new();
        let language = tree_sitter_rust::LANGUAGE.into();
        parser.set_language(&language).unwrap();
        let tree = parser.parse(source, None).unwrap();
        let query = Query::new(&language, query_source).unwrap();
        (tree, query)
    }

    #[test]
    fn simple_fold_uses_last_child_start_position_as_endat() {
        let source = "fn f() {\n    1;\n}\n";
        let query_source = r#"
            (block) @fold
            (#set! fold.endAt lastNamedChild.endPosition)
        "#;
        let (tree, query) = parse(source, query_source);
        let resolver = FoldResolver::new(&query);
        let folds = resolver.folds(&tree, source.as_bytes());
        assert_eq!(folds.len(), 1);
        assert!(folds[0].end.row >= folds[0].start.row);
        // Start is reported as (row, ∞), never the node's own column.
        assert_eq!(folds[0].start, Point::new(0, usize::MAX));
    }

    #[test]
    fn simple_fold_defaults_end_to_last_childs_start_position_without_endat() {
        let source = "fn f() {\n    1;\n    2;\n}\n";
        let query_source = "(block) @fold";
        let (tree, query) = parse(source, query_source);
        let resolver = FoldResolver::new(&query);
        let folds = resolver.folds(&tree, source.as_bytes());
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].start, Point::new(0, usize::MAX));
        // No `fold.endAt` set: the default end is the block's last child's start position,
        // which is the closing `}` on row 3, not the block's own end position.
        assert_eq!(folds[0].end, Point::new(3, 0));
    }

    #[test]
    fn fold_adjust_end_column_clips_the_end_to_a_fixed_column() {
        let source = "fn f() {\n    1;\n}\n";
        let query_source = r#"
            (block) @fold
            (#set! fold.endAt lastNamedChild.endPosition)
            (#set! fold.adjustEndColumn 2)
        "#;
        let (tree, query) = parse(source, query_source);
        let resolver = FoldResolver::new(&query);
        let folds = resolver.folds(&tree, source.as_bytes());
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].end.column, 2);
    }

    #[test]
    fn divided_folds_pair_start_and_end_by_depth() {
        // `mod` items don't nest fold markers in this toy grammar use, so a function's opening
        // and closing braces stand in for distinct start/end marker kinds.
        let query_source = r#"
            (function_item "{" @fold.start)
            (function_item "}" @fold.end)
        "#;
        let source = "fn f() {\n    1;\n    2;\n}\n";
        let mut parser = Parser::new();
        let language: tree_sitter::Language = tree_sitter_rust::LANGUAGE.into();
        parser.set_language(&language).unwrap();
        let tree = parser.parse(source, None).unwrap();
        let query = Query::new(&language, query_source).unwrap();
        let resolver = FoldResolver::new(&query);
        let folds = resolver.divided_folds(&tree, source.as_bytes());
        assert_eq!(folds.len(), 1);
        // Start is reported as (row, ∞) — the `@fold.start` token's own end position (3 on row
        // 0, right after `{`) must never leak through.
        assert_eq!(folds[0].start, Point::new(0, usize::MAX));
        // The closing `}` sits at column 0 on row 3, so the adjust-to-previous-row rule pulls
        // the fold's effective end back onto row 2 (the last line of visible body content).
        assert_eq!(folds[0].end.row, 2);
    }
}
