//! `LanguageMode`: the façade a host editor talks to. Owns the root
//! `LanguageLayer`, the scope-id registry, and per-transaction caches; dispatches everything
//! else (highlighting, folding, indentation, locals) to the module that implements it.

use std::sync::Arc;

use tree_sitter::{Node, Point, Range};

use crate::buffer::{Buffer, PointRange};
use crate::error::Error;
use crate::fold_resolver::{FoldRange, FoldResolver};
use crate::grammar::{Grammar, GrammarRegistry};
use crate::highlight_iterator::{HighlightIterator, LayerHighlightIterator};
use crate::indent::{suggested_indent_for_buffer_row, suggested_indent_for_edited_buffer_row};
use crate::language_layer::{LanguageLayer, TextChange};
use crate::locals::{find_definition_for_local_reference, local_references_at_point};
use crate::scope::{ScopeId, ScopeRegistry};

/// `scopeDescriptorForPosition`/`syntaxTreeScopeDescriptorForPosition`: the
/// ordered chain of scope names enclosing a buffer position, shallowest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDescriptor {
    pub scopes: Vec<String>,
}

/// Events a host can subscribe to: `DidTokenize` fires exactly once, the first time the root
/// layer finishes its initial parse; `DidChangeHighlighting` fires once per invalidated range on
/// every later transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageModeEvent {
    DidTokenize,
    DidChangeHighlighting(Range),
}

pub struct LanguageMode {
    root: LanguageLayer,
    scopes: ScopeRegistry,
    tab_length: usize,
    foldable_cache: Vec<Option<bool>>,
    tokenized: bool,
    /// Scratch storage for the boundary maps the last `build_highlight_iterator` call
    /// produced. Owned here (rather than leaked) so the returned `HighlightIterator<'_>` can
    /// borrow from `self` for its whole lifetime; each call clears and repopulates it.
    highlight_scratch: Vec<(usize, bool, Range, std::collections::BTreeMap<Point, crate::scope_resolver::Boundary>)>,
}

impl LanguageMode {
    pub fn new(grammar: Arc<Grammar>, tab_length: usize) -> Self {
        Self {
            root: LanguageLayer::new(grammar, 0, Vec::new()),
            scopes: ScopeRegistry::new(),
            tab_length,
            foldable_cache: Vec::new(),
            tokenized: false,
            highlight_scratch: Vec::new(),
        }
    }

    /// `bufferDidChange`: applies the host's edit to every layer's cached tree
    /// ahead of the next `bufferDidFinishTransaction`.
    pub fn buffer_did_change(&mut self, change: TextChange) {
        self.root.handle_text_change(change);
        self.foldable_cache.clear();
    }

    /// `bufferDidFinishTransaction`: reparses every layer and rediscovers
    /// injections. Must run before any query method below is called after an edit. Returns the
    /// events a host should forward: a one-time `DidTokenize` on the first successful parse,
    /// then one `DidChangeHighlighting` per invalidated range on every transaction after that.
    pub fn buffer_did_finish_transaction(
        &mut self,
        source: &[u8],
        registry: &dyn GrammarRegistry,
    ) -> Result<Vec<LanguageModeEvent>, Error> {
        let invalidations = self.root.update(source, registry)?;
        self.foldable_cache.clear();

        let mut events = Vec::with_capacity(invalidations.len() + 1);
        if !self.tokenized {
            self.tokenized = true;
            events.push(LanguageModeEvent::DidTokenize);
        }
        events.extend(invalidations.into_iter().map(LanguageModeEvent::DidChangeHighlighting));
        Ok(events)
    }

    pub fn get_or_create_scope_id(&mut self, name: &str) -> ScopeId {
        self.scopes.get_or_create(name)
    }

    /// `updateForInjection`: re-evaluate injections now that `registry` might
    /// resolve a language string that previously came back empty. Reparsing is unnecessary — only injection
    /// discovery needs to run again, but the simplest correct way to trigger it is the same
    /// `update` every layer already drives after a real edit. Never emits `DidTokenize` — that
    /// only ever fires from the transaction that first parses the root layer.
    pub fn update_for_injection(
        &mut self,
        source: &[u8],
        registry: &dyn GrammarRegistry,
    ) -> Result<Vec<LanguageModeEvent>, Error> {
        let invalidations = self.root.update(source, registry)?;
        Ok(invalidations
            .into_iter()
            .map(LanguageModeEvent::DidChangeHighlighting)
            .collect())
    }

    pub fn class_name_for_scope_id(&self, id: ScopeId) -> Option<String> {
        self.scopes.class_name_for_id(id)
    }

    pub fn scope_name_for_scope_id(&self, id: ScopeId) -> Option<&str> {
        self.scopes.name_for_id(id)
    }

    /// `buildHighlightIterator`: the merged cross-layer highlight event
    /// stream for `[from, to)`.
    pub fn build_highlight_iterator(
        &mut self,
        source: &[u8],
        from: Point,
        to: Point,
    ) -> HighlightIterator<'_> {
        self.highlight_scratch.clear();
        collect_layer_boundaries(
            &self.root,
            source,
            from,
            to,
            &mut self.scopes,
            &mut self.highlight_scratch,
        );
        let iterators: Vec<LayerHighlightIterator<'_>> = self
            .highlight_scratch
            .iter()
            .map(|(depth, cover, range, boundaries)| {
                LayerHighlightIterator::new(boundaries, *depth)
                    .with_cover_shallower_scopes(*cover)
                    .with_layer_range(*range)
            })
            .collect();
        HighlightIterator::new(iterators)
    }

    /// `scopeDescriptorForPosition`: the ordered scope-name chain covering
    /// `position`, outermost (the root grammar's own scope name) to
    /// innermost, built by walking down the layer tree and, inside each covering layer,
    /// appending its syntax-query captures at `position` biggest span first.
    pub fn scope_descriptor_for_position(
        &mut self,
        source: &[u8],
        buffer: &dyn Buffer,
        position: Point,
    ) -> ScopeDescriptor {
        let position = buffer.normalize_point_for_position_query(position);
        let mut scopes = Vec::new();
        collect_scope_descriptor(&self.root, source, position, &mut self.scopes, &mut scopes);
        ScopeDescriptor { scopes }
    }

    /// `syntaxTreeScopeDescriptorForPosition`: the chain of node type names
    /// (anonymous nodes quoted) from the root grammar down to the smallest descendant at
    /// `position`, aggregated across every layer covering the point. Layers are already nested
    /// in buffer order by construction, so walking root to leaf and concatenating each layer's
    /// own chain already produces the right `(startIndex asc, endIndex desc, depth asc)`
    /// ordering without a separate sort pass.
    pub fn syntax_tree_scope_descriptor_for_position(&self, position: Point) -> Vec<String> {
        let mut out = Vec::new();
        collect_node_kind_chain(&self.root, position, &mut out);
        out
    }

    /// `bufferRangeForScopeAtPosition`: the range of the narrowest node at
    /// `position` whose kind matches `scope_name`, searched from the deepest node outward.
    pub fn buffer_range_for_scope_at_position(
        &self,
        buffer: &dyn Buffer,
        position: Point,
        scope_name: &str,
    ) -> Option<PointRange> {
        let position = buffer.normalize_point_for_position_query(position);
        let layer = self.root.deepest_layer_at(position);
        let tree = layer.tree()?;
        let mut node = tree
            .root_node()
            .descendant_for_point_range(position, position)?;
        loop {
            if node.kind() == scope_name {
                return Some(PointRange::new(node.start_position(), node.end_position()));
            }
            node = node.parent()?;
        }
    }

    /// `getSyntaxNodeAtPosition`: the smallest node across all covering layers
    /// that strictly contains `point` and passes `predicate`, deeper layers breaking ties.
    pub fn get_syntax_node_at_position<'a>(
        &'a self,
        point: Point,
        predicate: Option<&dyn Fn(Node<'a>) -> bool>,
    ) -> Option<Node<'a>> {
        self.get_syntax_node_containing_range(PointRange::new(point, point), predicate)
    }

    /// `getSyntaxNodeContainingRange`: the smallest node across all covering
    /// layers that strictly contains `range` and passes `predicate`.
    pub fn get_syntax_node_containing_range<'a>(
        &'a self,
        range: PointRange,
        predicate: Option<&dyn Fn(Node<'a>) -> bool>,
    ) -> Option<Node<'a>> {
        let mut best: Option<Node<'a>> = None;
        find_smallest_containing(&self.root, range, predicate, &mut best);
        best
    }

    /// Kept for callers that only need the narrowest node regardless of predicate (e.g.
    /// `bufferRangeForScopeAtPosition`'s node-predicate delegation path).
    pub fn syntax_node_containing_range<'a>(&'a self, range: PointRange) -> Option<Node<'a>> {
        self.get_syntax_node_containing_range(range, None)
    }

    pub fn get_local_references_at_point<'a>(
        &'a self,
        source: &[u8],
        point: Point,
    ) -> Vec<Node<'a>> {
        let layer = self.root.deepest_layer_at(point);
        let (Some(tree), Some(query)) = (layer.tree(), layer.locals_query()) else {
            return Vec::new();
        };
        local_references_at_point(tree, query, source, point)
    }

    pub fn find_definition_for_local_reference<'a>(
        &'a self,
        source: &[u8],
        reference: Node<'a>,
    ) -> Option<Node<'a>> {
        let layer = self.root.deepest_layer_at(reference.start_position());
        let (Some(tree), Some(query)) = (layer.tree(), layer.locals_query()) else {
            return None;
        };
        find_definition_for_local_reference(tree, query, source, reference)
    }

    fn folds(&self, source: &[u8]) -> Vec<FoldRange> {
        let Some(query) = &self.root.grammar.folds_query else {
            return Vec::new();
        };
        let Some(tree) = self.root.tree() else {
            return Vec::new();
        };
        FoldResolver::new(query).folds(tree, source)
    }

    /// `getFoldableRanges`: every fold resolvable from the root layer's folds query.
    pub fn get_foldable_ranges(&self, source: &[u8]) -> Vec<FoldRange> {
        self.folds(source)
    }

    /// `getFoldableRangeContainingPoint`: the innermost fold whose start row is
    /// at or above `point.row` and whose range contains it.
    pub fn get_foldable_range_containing_point(
        &self,
        source: &[u8],
        point: Point,
    ) -> Option<FoldRange> {
        self.folds(source)
            .into_iter()
            .filter(|f| f.start <= point && point <= f.end)
            .min_by_key(|f| f.end.row - f.start.row)
    }

    /// `getFoldableRangesAtIndentLevel`: every fold whose start row sits at
    /// exactly `indent_level`. Accumulates directly into one flat list.
    pub fn get_foldable_ranges_at_indent_level(
        &self,
        source: &[u8],
        buffer: &dyn Buffer,
        indent_level: usize,
    ) -> Vec<FoldRange> {
        self.folds(source)
            .into_iter()
            .filter(|f| {
                crate::indent::indent_level_for_line(buffer, f.start.row, self.tab_length).floor()
                    as usize
                    == indent_level
            })
            .collect()
    }

    /// `isFoldableAtRow`: cached per-row, invalidated on the next transaction.
    pub fn is_foldable_at_row(&mut self, source: &[u8], row: usize) -> bool {
        if row >= self.foldable_cache.len() {
            self.foldable_cache.resize(row + 1, None);
        }
        if let Some(cached) = self.foldable_cache[row] {
            return cached;
        }
        let result = self.folds(source).iter().any(|f| f.start.row == row);
        self.foldable_cache[row] = Some(result);
        result
    }

    /// `suggestedIndentForBufferRow`: force-parses the deepest layer covering `row` that carries
    /// its own indents query (injections without one fall through to their parent's), then scans
    /// its fresh tree for the suggestion.
    pub fn suggested_indent_for_buffer_row(
        &mut self,
        source: &[u8],
        buffer: &dyn Buffer,
        row: usize,
    ) -> f64 {
        let Some(layer) = self.indents_query_layer_mut(Point::new(row, 0), source) else {
            return 0.0;
        };
        let Some(query) = &layer.grammar.indents_query else {
            return 0.0;
        };
        let Some(tree) = layer.tree() else {
            return 0.0;
        };
        suggested_indent_for_buffer_row(tree, query, source, buffer, row, self.tab_length, true, false)
    }

    pub fn suggested_indent_for_edited_buffer_row(
        &mut self,
        source: &[u8],
        buffer: &dyn Buffer,
        row: usize,
    ) -> f64 {
        let Some(layer) = self.indents_query_layer_mut(Point::new(row, 0), source) else {
            return 0.0;
        };
        let Some(query) = &layer.grammar.indents_query else {
            return 0.0;
        };
        let Some(tree) = layer.tree() else {
            return 0.0;
        };
        suggested_indent_for_edited_buffer_row(tree, query, source, buffer, row, self.tab_length)
    }

    /// Finds the deepest layer covering `point` that carries an indents query, force-parses it
    /// so its tree reflects edits the host hasn't run a full transaction over yet, and returns
    /// it. Returns `None` if no layer covering `point` has an indents query at all.
    fn indents_query_layer_mut(&mut self, point: Point, source: &[u8]) -> Option<&mut LanguageLayer> {
        let path = indents_query_path(&self.root, point)?;
        let layer = layer_at_path_mut(&mut self.root, &path);
        layer.force_anonymous_parse(source).ok()?;
        Some(layer)
    }

    /// `commentStringsForPosition`: the innermost layer's line/block comment
    /// markers covering `position`.
    pub fn comment_strings_for_position(&self, position: Point) -> Option<&(String, Option<String>)> {
        self.root
            .deepest_layer_at(position)
            .grammar
            .comment_strings
            .as_ref()
    }
}

fn collect_layer_boundaries(
    layer: &LanguageLayer,
    source: &[u8],
    from: Point,
    to: Point,
    scopes: &mut ScopeRegistry,
    out: &mut Vec<(usize, bool, Range, std::collections::BTreeMap<Point, crate::scope_resolver::Boundary>)>,
) {
    let boundaries = layer.syntax_boundaries(source, from, to, scopes);
    let range = layer
        .ranges
        .first()
        .copied()
        .unwrap_or(Range {
            start_byte: 0,
            end_byte: usize::MAX,
            start_point: Point::new(0, 0),
            end_point: Point::new(usize::MAX, usize::MAX),
        });
    out.push((layer.depth, false, range, boundaries));
    for child in &layer.children {
        collect_layer_boundaries(child, source, from, to, scopes, out);
    }
}

/// Walks root-to-leaf down the single layer chain covering `point`, pushing each layer's own scope name followed by its
/// `scopeMapAtPosition` captures, outermost first.
fn collect_scope_descriptor(
    layer: &LanguageLayer,
    source: &[u8],
    point: Point,
    registry: &mut ScopeRegistry,
    out: &mut Vec<String>,
) {
    out.push(layer.grammar.scope_name.clone());
    for (id, _, _) in layer.scope_map_at_position(source, point, registry) {
        if let Some(name) = registry.name_for_id(id) {
            out.push(name.to_string());
        }
    }
    for child in &layer.children {
        if child
            .ranges
            .iter()
            .any(|r| r.start_point <= point && point <= r.end_point)
        {
            collect_scope_descriptor(child, source, point, registry, out);
            break;
        }
    }
}

/// Root-to-leaf walk collecting each covering layer's own node-kind ancestor chain at `point`.
fn collect_node_kind_chain(layer: &LanguageLayer, point: Point, out: &mut Vec<String>) {
    if let Some(tree) = layer.tree() {
        if let Some(node) = tree.root_node().descendant_for_point_range(point, point) {
            let mut chain = Vec::new();
            let mut current = Some(node);
            while let Some(n) = current {
                chain.push(if n.is_named() {
                    n.kind().to_string()
                } else {
                    format!("\"{}\"", n.kind())
                });
                current = n.parent();
            }
            chain.reverse();
            out.extend(chain);
        }
    }
    for child in &layer.children {
        if child
            .ranges
            .iter()
            .any(|r| r.start_point <= point && point <= r.end_point)
        {
            collect_node_kind_chain(child, point, out);
        }
    }
}

/// Root-to-leaf walk finding the smallest node across every covering layer that strictly
/// contains `range` and passes `predicate`.
/// Deeper layers are visited after shallower ones, so a later, equally-small match from a
/// deeper layer naturally overrides an earlier shallower one only when it is strictly smaller.
fn find_smallest_containing<'a>(
    layer: &'a LanguageLayer,
    range: PointRange,
    predicate: Option<&dyn Fn(Node<'a>) -> bool>,
    best: &mut Option<Node<'a>>,
) {
    if let Some(tree) = layer.tree() {
        if let Some(mut node) = tree
            .root_node()
            .descendant_for_point_range(range.start, range.end)
        {
            loop {
                let contains =
                    node.start_position() <= range.start && range.end <= node.end_position();
                if contains {
                    let passes = predicate.map(|p| p(node)).unwrap_or(true);
                    if passes {
                        let is_better = match best {
                            Some(current) => node_span(node) < node_span(*current),
                            None => true,
                        };
                        if is_better {
                            *best = Some(node);
                        }
                        break;
                    }
                }
                match node.parent() {
                    Some(parent) => node = parent,
                    None => break,
                }
            }
        }
    }
    for child in &layer.children {
        if child
            .ranges
            .iter()
            .any(|r| r.start_point <= range.start && range.end <= r.end_point)
        {
            find_smallest_containing(child, range, predicate, best);
        }
    }
}

fn node_span(node: Node<'_>) -> usize {
    node.end_byte() - node.start_byte()
}

/// Walks root-to-leaf down the single layer chain covering `point`, recording the child-index
/// path to the deepest layer that carries an indents query (a layer further down without one
/// doesn't overwrite a shallower match — the nearest query wins).
fn deepest_indents_query_path(
    layer: &LanguageLayer,
    point: Point,
    path: &mut Vec<usize>,
    best: &mut Option<Vec<usize>>,
) {
    if layer.grammar.indents_query.is_some() {
        *best = Some(path.clone());
    }
    for (index, child) in layer.children.iter().enumerate() {
        if child
            .ranges
            .iter()
            .any(|r| r.start_point <= point && point <= r.end_point)
        {
            path.push(index);
            deepest_indents_query_path(child, point, path, best);
            path.pop();
            break;
        }
    }
}

fn indents_query_path(root: &LanguageLayer, point: Point) -> Option<Vec<usize>> {
    let mut path = Vec::new();
    let mut best = None;
    deepest_indents_query_path(root, point, &mut path, &mut best);
    best
}

fn layer_at_path_mut<'a>(layer: &'a mut LanguageLayer, path: &[usize]) -> &'a mut LanguageLayer {
    match path.split_first() {
        Some((&index, rest)) => layer_at_path_mut(&mut layer.children[index], rest),
        None => layer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RopeBuffer;
    use crate::grammar::{Grammar, GrammarRegistry, InjectionLanguageMarker};
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
    fn syntax_tree_scope_descriptor_reports_node_kind_chain() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut mode = LanguageMode::new(grammar, 4);
        let source = "fn main() {}";
        mode.buffer_did_finish_transaction(source.as_bytes(), &NoInjections)
            .unwrap();
        let chain = mode.syntax_tree_scope_descriptor_for_position(Point::new(0, 3));
        assert!(chain.contains(&"identifier".to_string()));
    }

    #[test]
    fn scope_descriptor_starts_with_root_grammar_scope() {
        let grammar = Arc::new(
            Grammar::new("source.rust", rust_language())
                .with_syntax_query("(function_item name: (identifier) @function)"),
        );
        let mut mode = LanguageMode::new(grammar, 4);
        let source = "fn main() {}";
        mode.buffer_did_finish_transaction(source.as_bytes(), &NoInjections)
            .unwrap();
        let buffer = RopeBuffer::new(source);
        let descriptor =
            mode.scope_descriptor_for_position(source.as_bytes(), &buffer, Point::new(0, 3));
        assert_eq!(descriptor.scopes[0], "source.rust");
        assert!(descriptor.scopes.contains(&"function".to_string()));
    }

    #[test]
    fn indent_falls_back_to_zero_without_indents_query() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut mode = LanguageMode::new(grammar, 4);
        let source = "fn main() {\n}\n";
        mode.buffer_did_finish_transaction(source.as_bytes(), &NoInjections)
            .unwrap();
        let buffer = RopeBuffer::new(source);
        assert_eq!(mode.suggested_indent_for_buffer_row(source.as_bytes(), &buffer, 1), 0.0);
    }

    #[test]
    fn suggested_indent_uses_the_root_layers_indents_query() {
        let grammar = Arc::new(
            Grammar::new("source.rust", rust_language())
                .with_indents_query("(block \"{\" @indent)"),
        );
        let mut mode = LanguageMode::new(grammar, 2);
        let source = "fn f() {\n\n}\n";
        mode.buffer_did_finish_transaction(source.as_bytes(), &NoInjections)
            .unwrap();
        let buffer = RopeBuffer::new(source);
        assert_eq!(mode.suggested_indent_for_buffer_row(source.as_bytes(), &buffer, 1), 1.0);
    }

    #[test]
    fn first_transaction_emits_did_tokenize_only() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut mode = LanguageMode::new(grammar, 4);
        let source = "fn main() {}";
        let events = mode
            .buffer_did_finish_transaction(source.as_bytes(), &NoInjections)
            .unwrap();
        assert_eq!(events, vec![LanguageModeEvent::DidTokenize]);
    }

    #[test]
    fn later_transaction_emits_did_change_highlighting_and_not_did_tokenize_again() {
        let grammar = Arc::new(Grammar::new("source.rust", rust_language()));
        let mut mode = LanguageMode::new(grammar, 4);
        let source = "fn main() {}";
        mode.buffer_did_finish_transaction(source.as_bytes(), &NoInjections)
            .unwrap();

        let edited = "fn main() { 1; }";
        mode.buffer_did_change(TextChange {
            start_byte: 11,
            old_end_byte: 11,
            new_end_byte: 16,
            start_position: Point::new(0, 11),
            old_end_position: Point::new(0, 11),
            new_end_position: Point::new(0, 16),
        });
        let events = mode
            .buffer_did_finish_transaction(edited.as_bytes(), &NoInjections)
            .unwrap();
        assert!(!events.contains(&LanguageModeEvent::DidTokenize));
        assert!(events
            .iter()
            .any(|e| matches!(e, LanguageModeEvent::DidChangeHighlighting(_))));
    }
}
