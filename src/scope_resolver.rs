//! `ScopeResolver`: turns raw syntax-query captures into a boundary tree
//! of open/close scope-id events, rejecting captures whose predicates don't hold and
//! deduplicating repeated opens/closes at the same point. Builds the persistent boundary map
//! `LayerHighlightIterator` consumes, rather than feeding a streaming highlight event directly.

use std::collections::BTreeMap;

use tree_sitter::{Node, Point};

use crate::scope::ScopeId;

#[derive(Debug, Clone, Default)]
pub struct Boundary {
    pub open: Vec<ScopeId>,
    pub close: Vec<ScopeId>,
}

/// The accumulated open/close events for one layer's syntax captures, keyed by buffer
/// position` keying in `boundary_tree.rs` instead since a fold's start and end
/// are tracked independently of any enclosing scope).
#[derive(Debug, Default)]
pub struct ScopeResolver {
    boundaries: BTreeMap<Point, Boundary>,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.boundaries.clear();
    }

    /// Records a capture's effective range as a scope-id open/close pair. Returns `None`
    /// when predicates failed or the node's range is empty
    /// after adjustment, in which case no boundary is recorded.
    pub fn store(
        &mut self,
        node: Node<'_>,
        scope_id: ScopeId,
        predicates_hold: bool,
        range_override: Option<(Point, Point)>,
    ) -> Option<(Point, Point)> {
        if !predicates_hold {
            return None;
        }
        let (start, end) = range_override.unwrap_or((node.start_position(), node.end_position()));
        if start >= end {
            return None;
        }
        self.set_boundary(start, scope_id, true);
        self.set_boundary(end, scope_id, false);
        Some((start, end))
    }

    /// Directly records a single open (`opening = true`) or close boundary, e.g. for the
    /// synthetic layer-wide scope a `LanguageLayer` wraps its whole extent in.
    pub fn set_boundary(&mut self, point: Point, scope_id: ScopeId, opening: bool) {
        let bundle = self.boundaries.entry(point).or_default();
        let bucket = if opening {
            &mut bundle.open
        } else {
            &mut bundle.close
        };
        if !bucket.contains(&scope_id) {
            bucket.push(scope_id);
        }
    }

    pub fn boundaries(&self) -> &BTreeMap<Point, Boundary> {
        &self.boundaries
    }

    pub fn into_boundaries(self) -> BTreeMap<Point, Boundary> {
        self.boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(row: usize, column: usize) -> Point {
        Point::new(row, column)
    }

    #[test]
    fn rejects_capture_when_predicates_fail() {
        let mut resolver = ScopeResolver::new();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_json::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse("{}", None).unwrap();
        let node = tree.root_node();
        let result = resolver.store(node, ScopeId(10), false, None);
        assert!(result.is_none());
        assert!(resolver.boundaries().is_empty());
    }

    #[test]
    fn deduplicates_repeated_opens_at_same_point() {
        let mut resolver = ScopeResolver::new();
        resolver.set_boundary(p(0, 0), ScopeId(4), true);
        resolver.set_boundary(p(0, 0), ScopeId(4), true);
        assert_eq!(resolver.boundaries()[&p(0, 0)].open, vec![ScopeId(4)]);
    }

    #[test]
    fn store_records_open_and_close_at_distinct_points() {
        let mut resolver = ScopeResolver::new();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_json::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse("{}", None).unwrap();
        let node = tree.root_node();
        resolver.store(node, ScopeId(2), true, None).unwrap();
        assert_eq!(resolver.boundaries()[&p(0, 0)].open, vec![ScopeId(2)]);
        assert_eq!(resolver.boundaries()[&p(0, 2)].close, vec![ScopeId(2)]);
    }
}
