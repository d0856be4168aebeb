//! `LanguageLayer`: one parsed tree over one `NodeRangeSet`'s extent, plus the
//! injection layers nested inside it. `update` reparses, computes
//! `oldTree.changed_ranges(newTree)` to find what actually changed, unions that with the edits
//! accumulated since the last parse to get the "affected range" that scopes injection
//! rediscovery, and bubbles every changed range (plus the ranges of any injection layer that
//! gets destroyed along the way) back up as invalidations for `LanguageMode` to turn into
//! `did-change-highlighting` events.

use std::sync::Arc;

use tree_sitter::{InputEdit, Parser, Point, Query, QueryCursor, Range, StreamingIterator, Tree};

use crate::error::Error;
use crate::grammar::{Grammar, GrammarRegistry, InjectionLanguageMarker};
use crate::node_range_set::{IncludedChildren, NodeRangeSet};
use crate::scope::{ScopeId, ScopeRegistry};
use crate::scope_resolver::{Boundary, ScopeResolver};

/// A pending edit, reported by the host in buffer coordinates; translated to tree-sitter's byte/point `InputEdit` before being
/// applied to every layer's cached tree.
#[derive(Debug, Clone, Copy)]
pub struct TextChange {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_position: Point,
    pub old_end_position: Point,
    pub new_end_position: Point,
}

impl From<TextChange> for InputEdit {
    fn from(change: TextChange) -> Self {
        InputEdit {
            start_byte: change.start_byte,
            old_end_byte: change.old_end_byte,
            new_end_byte: change.new_end_byte,
            start_position: change.start_position,
            old_end_position: change.old_end_position,
            new_end_position: change.new_end_position,
        }
    }
}

/// Unions two ranges' byte spans and point spans, widest of each independently (matching the
/// point-wise union tree-sitter's own `InputEdit`/`Range` types use elsewhere in this crate).
fn union_range(a: Range, b: Range) -> Range {
    Range {
        start_byte: a.start_byte.min(b.start_byte),
        end_byte: a.end_byte.max(b.end_byte),
        start_point: a.start_point.min(b.start_point),
        end_point: a.end_point.max(b.end_point),
    }
}

/// Whether two byte ranges overlap at all.
fn ranges_intersect(a: Range, b: Range) -> bool {
    a.start_byte < b.end_byte && b.start_byte < a.end_byte
}

/// Collects `layer`'s own ranges and every descendant's, for when a layer is destroyed and
/// every marker under it needs its own invalidation.
fn collect_ranges(layer: &LanguageLayer, out: &mut Vec<Range>) {
    out.extend(layer.ranges.iter().copied());
    for child in &layer.children {
        collect_ranges(child, out);
    }
}

/// One layer of the syntax forest: a root layer covers
/// the whole buffer; an injection layer covers only the ranges its parent's injection point
/// carved out for it.
pub struct LanguageLayer {
    pub grammar: Arc<Grammar>,
    pub depth: usize,
    pub ranges: Vec<Range>,
    pub tree: Option<Tree>,
    pub children: Vec<LanguageLayer>,
    /// Union of every host-reported edit applied since the last successful `update`; folded
    /// into the tree's own `changed_ranges` to compute the affected range that scopes the next
    /// injection rediscovery pass.
    edited_range: Option<Range>,
}

impl LanguageLayer {
    pub fn new(grammar: Arc<Grammar>, depth: usize, ranges: Vec<Range>) -> Self {
        Self {
            grammar,
            depth,
            ranges,
            tree: None,
            children: Vec::new(),
            edited_range: None,
        }
    }

    fn make_parser(&self) -> Result<Parser, Error> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.grammar.language)
            .map_err(|_| Error::InvalidLanguage)?;
        if !self.ranges.is_empty() {
            parser
                .set_included_ranges(&self.ranges)
                .map_err(|_| Error::InvalidRanges)?;
        }
        Ok(parser)
    }

    /// Parses (or reparses) this layer's tree over its current `ranges`, then recursively
    /// discovers and updates injection layers. `registry` resolves an
    /// injection-language marker to the child grammar; layers whose resolved range set is now
    /// empty are dropped. Returns every invalidation range produced by this layer and its
    /// descendants: the tree's own `changed_ranges` against the previous parse, plus the ranges
    /// of any injection layer destroyed along the way.
    pub fn update(
        &mut self,
        source: &[u8],
        registry: &dyn GrammarRegistry,
    ) -> Result<Vec<Range>, Error> {
        if self.ranges.is_empty() && self.depth > 0 {
            let mut invalidations = Vec::new();
            if self.tree.is_some() {
                collect_ranges(self, &mut invalidations);
            }
            self.tree = None;
            self.children.clear();
            self.edited_range = None;
            return Ok(invalidations);
        }
        let mut parser = self.make_parser()?;
        let old_tree = self.tree.clone();
        let new_tree = parser.parse(source, old_tree.as_ref()).ok_or(Error::Timeout)?;

        let mut invalidations = Vec::new();
        let affected_range = if let Some(old_tree) = &old_tree {
            let mut affected = self.edited_range;
            for changed in old_tree.changed_ranges(&new_tree) {
                invalidations.push(changed);
                affected = Some(match affected {
                    Some(existing) => union_range(existing, changed),
                    None => changed,
                });
            }
            affected.unwrap_or_else(|| new_tree.root_node().range())
        } else {
            new_tree.root_node().range()
        };

        self.tree = Some(new_tree);
        self.edited_range = None;

        invalidations.extend(self.populate_injections(source, registry, affected_range)?);
        Ok(invalidations)
    }

    /// Synchronously reparses this layer's tree over its cached `ranges` without touching
    /// injections, for callers (the indent subsystem) that need a fresh tree for just-edited
    /// rows without waiting for the transaction-driven `update`.
    pub fn force_anonymous_parse(&mut self, source: &[u8]) -> Result<(), Error> {
        let mut parser = self.make_parser()?;
        let new_tree = parser.parse(source, self.tree.as_ref()).ok_or(Error::Timeout)?;
        self.tree = Some(new_tree);
        Ok(())
    }

    /// Applies a host-reported edit to this layer's cached tree and every descendant's, ahead
    /// of the next `update`. Editing the tree keeps existing
    /// node identity stable for the parts of the tree the edit didn't touch, which is what lets
    /// the subsequent `parse` be incremental. Also widens `edited_range` so the next `update`
    /// can fold it into the affected range it hands to injection discovery.
    pub fn handle_text_change(&mut self, change: TextChange) {
        if let Some(tree) = self.tree.as_mut() {
            tree.edit(&change.into());
        }
        let new_span = Range {
            start_byte: change.start_byte,
            end_byte: change.new_end_byte,
            start_point: change.start_position,
            end_point: change.new_end_position,
        };
        self.edited_range = Some(match self.edited_range {
            Some(existing) => union_range(existing, new_span),
            None => new_span,
        });
        for child in &mut self.children {
            child.handle_text_change(change);
        }
    }

    fn populate_injections(
        &mut self,
        source: &[u8],
        registry: &dyn GrammarRegistry,
        affected_range: Range,
    ) -> Result<Vec<Range>, Error> {
        let mut invalidations = Vec::new();
        let Some(tree) = &self.tree else {
            for leftover in self.children.drain(..) {
                collect_ranges(&leftover, &mut invalidations);
            }
            return Ok(invalidations);
        };
        let Some(injections) = &self.grammar.injections_query else {
            for leftover in self.children.drain(..) {
                collect_ranges(&leftover, &mut invalidations);
            }
            return Ok(invalidations);
        };

        // Only the children whose ranges actually fall inside the affected range are
        // candidates for re-discovery this pass; everything else is untouched by this edit and
        // is kept as-is without revisiting it.
        let (touched, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.children)
            .into_iter()
            .partition(|c| c.ranges.iter().any(|r| ranges_intersect(*r, affected_range)));
        let mut remaining = touched;

        let mut cursor = QueryCursor::new();
        cursor.set_byte_range(affected_range.start_byte..affected_range.end_byte);
        let mut matches = cursor.matches(&injections.query, tree.root_node(), source);
        let mut discovered: Vec<(InjectionLanguageMarker<'_>, Vec<tree_sitter::Node<'_>>)> =
            Vec::new();

        while let Some(m) = matches.next() {
            let properties = injections.properties_for_pattern(m.pattern_index);
            let mut content_nodes = Vec::new();
            let mut language_capture_text: Option<&str> = None;
            let mut shebang_language: Option<String> = None;
            for capture in m.captures {
                if Some(capture.index) == injections.content_capture() {
                    content_nodes.push(capture.node);
                } else if Some(capture.index) == injections.language_capture() {
                    language_capture_text = capture.node.utf8_text(source).ok();
                } else if Some(capture.index) == injections.shebang_capture() {
                    shebang_language = capture
                        .node
                        .utf8_text(source)
                        .ok()
                        .and_then(crate::grammar::shebang_language);
                }
            }
            if content_nodes.is_empty() {
                continue;
            }
            let marker = shebang_language
                .map(InjectionLanguageMarker::Shebang)
                .or_else(|| {
                    self.grammar.injection_marker_for_capture(
                        language_capture_text,
                        properties.language.as_deref(),
                    )
                });
            if let Some(marker) = marker {
                discovered.push((marker, content_nodes));
            }
        }

        let mut new_children = kept;
        for (marker, nodes) in discovered {
            let Some(child_grammar) = registry.grammar_for_injection(&marker) else {
                continue;
            };
            let node_range_set = NodeRangeSet::new(Some(self.ranges.clone()), true, IncludedChildren::None);
            let ranges = node_range_set.ranges(&nodes);
            if ranges.is_empty() {
                continue;
            }
            let mut child = remaining
                .iter()
                .position(|c| Arc::ptr_eq(&c.grammar, &child_grammar) && c.ranges == ranges)
                .map(|i| remaining.swap_remove(i))
                .unwrap_or_else(|| LanguageLayer::new(child_grammar, self.depth + 1, ranges));
            invalidations.extend(child.update(source, registry)?);
            new_children.push(child);
        }
        // Anything left in `remaining` wasn't re-discovered this pass: destroy it and its
        // descendants, emitting an invalidation for every range it covered.
        for leftover in remaining {
            collect_ranges(&leftover, &mut invalidations);
        }
        self.children = new_children;
        Ok(invalidations)
    }

    /// `getSyntaxBoundaries`: all scope open/close events this layer's syntax
    /// query produces inside `[from, to)`, plus the layer's own synthetic wrapping scope so the
    /// cross-layer merge can see where an injection layer begins and ends even if its grammar
    /// declares no captures there.
    pub fn syntax_boundaries(
        &self,
        source: &[u8],
        from: Point,
        to: Point,
        scopes: &mut ScopeRegistry,
    ) -> std::collections::BTreeMap<Point, Boundary> {
        let mut resolver = ScopeResolver::new();
        let (Some(tree), Some(query)) = (&self.tree, &self.grammar.syntax_query) else {
            return resolver.into_boundaries();
        };
        let mut cursor = QueryCursor::new();
        cursor.set_point_range(from..to);
        let names = query.capture_names();
        let mut matches = cursor.matches(query, tree.root_node(), source);
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let name = names[capture.index as usize];
                if name.starts_with('_') {
                    continue;
                }
                let id = scopes.get_or_create(name);
                resolver.store(capture.node, id, true, None);
            }
        }
        resolver.into_boundaries()
    }

    pub fn locals_query(&self) -> Option<&Query> {
        self.grammar.locals_query.as_ref()
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// Recursively finds the deepest layer whose own ranges contain `point`, for
    /// `getSyntaxNodeAtPosition` and friends. The root layer always matches.
    pub fn deepest_layer_at(&self, point: Point) -> &LanguageLayer {
        for child in &self.children {
            if child
                .ranges
                .iter()
                .any(|r| r.start_point <= point && point <= r.end_point)
            {
                return child.deepest_layer_at(point);
            }
        }
        self
    }

    pub fn scope_id(&self, scopes: &mut ScopeRegistry) -> ScopeId {
        scopes.get_or_create(&self.grammar.scope_name)
    }

    /// `scopeMapAtPosition`: the syntax-query captures whose (possibly
    /// predicate-adjusted) range strictly contains `point`, biggest span first.
    pub fn scope_map_at_position(
        &self,
        source: &[u8],
        point: Point,
        scopes: &mut ScopeRegistry,
    ) -> Vec<(ScopeId, Point, Point)> {
        let (Some(tree), Some(query)) = (&self.tree, &self.grammar.syntax_query) else {
            return Vec::new();
        };
        let mut cursor = QueryCursor::new();
        let end = Point::new(point.row, point.column + 1);
        cursor.set_point_range(point..end);
        let names = query.capture_names();
        let mut matches = cursor.matches(query, tree.root_node(), source);
        let mut out = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let name = names[capture.index as usize];
                if name.starts_with('_') {
                    continue;
                }
                let start = capture.node.start_position();
                let capture_end = capture.node.end_position();
                if start <= point && point < capture_end {
                    out.push((scopes.get_or_create(name), start, capture_end));
                }
            }
        }
        // Biggest span first: outer captures start no later and end no earlier than inner ones.
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| b.2.cmp(&a.2)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Language;

    struct NoInjections;
    impl GrammarRegistry for NoInjections {
        fn grammar_for_injection(&self, _marker: &InjectionLanguageMarker<'_>) -> Option<Arc<Grammar>> {
            None
        }
    }

    fn rust_language() -> Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    #[test]
    fn update_parses_root_layer() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut layer = LanguageLayer::new(grammar, 0, Vec::new());
        layer.update(b"fn main() {}", &NoInjections).unwrap();
        assert!(layer.tree().is_some());
        assert_eq!(layer.tree().unwrap().root_node().kind(), "source_file");
    }

    #[test]
    fn syntax_boundaries_emit_events_for_captures() {
        let grammar = Arc::new(
            Grammar::new("source.rust", rust_language())
                .with_syntax_query("(function_item name: (identifier) @function)"),
        );
        let mut layer = LanguageLayer::new(grammar, 0, Vec::new());
        let source = b"fn main() {}";
        layer.update(source, &NoInjections).unwrap();
        let mut scopes = ScopeRegistry::new();
        let boundaries = layer.syntax_boundaries(
            source,
            Point::new(0, 0),
            Point::new(0, source.len()),
            &mut scopes,
        );
        let opens: usize = boundaries.values().map(|b| b.open.len()).sum();
        assert_eq!(opens, 1);
    }

    #[test]
    fn first_parse_reports_no_invalidations() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut layer = LanguageLayer::new(grammar, 0, Vec::new());
        let invalidations = layer.update(b"fn main() {}", &NoInjections).unwrap();
        assert!(invalidations.is_empty());
    }

    #[test]
    fn reparse_after_edit_reports_changed_range() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut layer = LanguageLayer::new(grammar, 0, Vec::new());
        let source = b"fn main() {}";
        layer.update(source, &NoInjections).unwrap();

        let edited = b"fn main() { 1; }";
        layer.handle_text_change(TextChange {
            start_byte: 11,
            old_end_byte: 11,
            new_end_byte: 16,
            start_position: Point::new(0, 11),
            old_end_position: Point::new(0, 11),
            new_end_position: Point::new(0, 16),
        });
        let invalidations = layer.update(edited, &NoInjections).unwrap();
        assert!(!invalidations.is_empty());
    }

    #[test]
    fn force_anonymous_parse_refreshes_tree_without_touching_injections() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut layer = LanguageLayer::new(grammar, 0, Vec::new());
        layer.update(b"fn main() {}", &NoInjections).unwrap();
        let edited = b"fn main() { 1; }";
        layer.handle_text_change(TextChange {
            start_byte: 11,
            old_end_byte: 11,
            new_end_byte: 16,
            start_position: Point::new(0, 11),
            old_end_position: Point::new(0, 11),
            new_end_position: Point::new(0, 16),
        });
        layer.force_anonymous_parse(edited).unwrap();
        assert_eq!(
            layer.tree().unwrap().root_node().end_byte(),
            edited.len()
        );
    }
}
