//! Local reference/definition resolution, built on a scope-bucket model evaluated fresh per
//! query rather than cached across edits: locals queries are answered on demand only for
//! `getLocalReferencesAtPoint`/`findDefinitionForLocalReference`, which are not on the hot
//! highlighting path, so the simpler on-demand scan is preferred here over precomputing a
//! locals tree on every parse.

use tree_sitter::{Node, Point, Query, QueryCursor, StreamingIterator, Tree};

#[derive(Debug, Clone)]
pub struct LocalCapture<'tree> {
    pub node: Node<'tree>,
    pub capture_name: String,
}

fn captures_by_prefix<'tree>(
    tree: &'tree Tree,
    query: &Query,
    source: &[u8],
    prefix: &str,
) -> Vec<LocalCapture<'tree>> {
    let names = query.capture_names();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);
    let mut out = Vec::new();
    while let Some(m) = matches.next() {
        for capture in m.captures {
            let name = names[capture.index as usize];
            if name.starts_with(prefix) {
                out.push(LocalCapture {
                    node: capture.node,
                    capture_name: name.to_string(),
                });
            }
        }
    }
    out
}

/// `getLocalReferencesAtPoint`: `local.reference` captures whose range
/// contains `point`, sorted deepest (smallest span) first.
pub fn local_references_at_point<'tree>(
    tree: &'tree Tree,
    query: &Query,
    source: &[u8],
    point: Point,
) -> Vec<Node<'tree>> {
    let mut refs: Vec<Node<'tree>> = captures_by_prefix(tree, query, source, "local.reference")
        .into_iter()
        .map(|c| c.node)
        .filter(|n| n.start_position() <= point && point < n.end_position())
        .collect();
    refs.sort_by_key(|n| std::cmp::Reverse((n.end_byte() as i64) - (n.start_byte() as i64)));
    refs
}

/// `findDefinitionForLocalReference`: walks the reference's containing scopes
/// from smallest to largest (plus the implicit global scope, represented here by the root
/// node's range), picking the latest pre-reference definition in the nearest scope that has
/// one, falling back to the earliest post-reference definition seen along the way.
pub fn find_definition_for_local_reference<'tree>(
    tree: &'tree Tree,
    query: &Query,
    source: &[u8],
    reference: Node<'tree>,
) -> Option<Node<'tree>> {
    let reference_text = reference.utf8_text(source).ok()?;
    let reference_start = reference.start_byte();

    let mut scopes: Vec<Node<'tree>> = captures_by_prefix(tree, query, source, "local.scope")
        .into_iter()
        .map(|c| c.node)
        .filter(|n| {
            n.start_byte() <= reference.start_byte() && reference.end_byte() <= n.end_byte()
        })
        .collect();
    // Smallest (most specific) scope first; the root node acts as the implicit global scope.
    scopes.sort_by_key(|n| n.end_byte() - n.start_byte());
    if scopes.last().map(|n| n.id()) != Some(tree.root_node().id()) {
        scopes.push(tree.root_node());
    }

    let definitions: Vec<Node<'tree>> = captures_by_prefix(tree, query, source, "local.definition")
        .into_iter()
        .map(|c| c.node)
        .filter(|n| {
            n.utf8_text(source)
                .map(|t| t == reference_text)
                .unwrap_or(false)
        })
        .collect();

    let mut fallback: Option<Node<'tree>> = None;
    for scope in scopes {
        let bucket: Vec<_> = definitions
            .iter()
            .copied()
            .filter(|d| d.start_byte() >= scope.start_byte() && d.end_byte() <= scope.end_byte())
            .collect();
        if let Some(latest_before) = bucket
            .iter()
            .copied()
            .filter(|d| d.start_byte() < reference_start)
            .max_by_key(|d| d.start_byte())
        {
            return Some(latest_before);
        }
        if fallback.is_none() {
            fallback = bucket
                .iter()
                .copied()
                .filter(|d| d.start_byte() >= reference_start)
                .min_by_key(|d| d.start_byte());
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn rust_parser() -> Parser {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .unwrap();
        parser
    }

    const LOCALS_QUERY: &str = r#"
        (block) @local.scope
        (function_item) @local.scope
        (parameter (identifier) @local.definition)
        (let_declaration pattern: (identifier) @local.definition)
        (identifier) @local.reference
    "#;

    #[test]
    fn finds_inner_shadowed_definition() {
        let source = "let x=1;\nfn f(){ let x=2; return x; }\n";
        let mut parser = rust_parser();
        let tree = parser.parse(source, None).unwrap();
        let language = tree_sitter_rust::LANGUAGE.into();
        let query = Query::new(&language, LOCALS_QUERY).unwrap();

        let return_x = source.find("return x").unwrap();
        let reference = tree
            .root_node()
            .descendant_for_byte_range(return_x + 7, return_x + 8)
            .unwrap();
        let def = find_definition_for_local_reference(&tree, &query, source.as_bytes(), reference)
            .unwrap();
        // The inner `let x=2` definition should win, not the outer `let x=1`.
        assert!(def.start_byte() > source.find("fn f").unwrap());
    }
}
