//! The node-descriptor mini-language and capture-property bag reading.
//!
//! `endAt`, `offsetEnd`, `adjustEndColumn` and `adjustToEndOfPreviousRow` are
//! all carried as `#set!` properties on fold captures; this module turns the
//! `(#set! "fold.endAt" "firstChild.startPosition")`-shaped settings the real `tree-sitter`
//! query compiler already extracts (`Query::property_settings`) into typed values the fold
//! resolver can apply directly.

use tree_sitter::{Node, Point};

/// One step of a node-descriptor chain, e.g. `firstChild` in `firstChild.startPosition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    FirstChild,
    LastChild,
    FirstNamedChild,
    LastNamedChild,
    Parent,
    NextSibling,
    PrevSibling,
    StartPosition,
    EndPosition,
}

fn parse_step(name: &str) -> Option<Step> {
    Some(match name {
        "firstChild" => Step::FirstChild,
        "lastChild" => Step::LastChild,
        "firstNamedChild" => Step::FirstNamedChild,
        "lastNamedChild" => Step::LastNamedChild,
        "parent" => Step::Parent,
        "nextSibling" => Step::NextSibling,
        "prevSibling" => Step::PrevSibling,
        "startPosition" => Step::StartPosition,
        "endPosition" => Step::EndPosition,
        _ => return None,
    })
}

/// The result of resolving a node-descriptor chain: either we're still on a node (an
/// intermediate step resolved) or we've hit a `startPosition`/`endPosition` leaf.
#[derive(Debug, Clone)]
pub enum Resolved<'tree> {
    Node(Node<'tree>),
    Point(Point),
}

/// Resolves a dot-separated node-descriptor chain against `node`.
/// A missing intermediate step (e.g. `firstChild` on a childless node) breaks the chain and
/// returns `None` rather than panicking.
pub fn resolve<'tree>(node: Node<'tree>, path: &str) -> Option<Resolved<'tree>> {
    let mut current = node;
    let mut steps = path.split('.').peekable();
    while let Some(name) = steps.next() {
        let step = parse_step(name)?;
        match step {
            Step::StartPosition => return Some(Resolved::Point(current.start_position())),
            Step::EndPosition => return Some(Resolved::Point(current.end_position())),
            Step::FirstChild => current = current.child(0)?,
            Step::LastChild => current = current.child(current.child_count().checked_sub(1)?)?,
            Step::FirstNamedChild => current = current.named_child(0)?,
            Step::LastNamedChild => {
                current = current.named_child(current.named_child_count().checked_sub(1)?)?
            }
            Step::Parent => current = current.parent()?,
            Step::NextSibling => current = current.next_sibling()?,
            Step::PrevSibling => current = current.prev_sibling()?,
        }
    }
    Some(Resolved::Node(current))
}

/// Resolves a node-descriptor chain and requires the final step to be a position.
pub fn resolve_point(node: Node<'_>, path: &str) -> Option<Point> {
    match resolve(node, path)? {
        Resolved::Point(p) => Some(p),
        Resolved::Node(n) => Some(n.start_position()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercised indirectly through `fold_resolver` tests, which build real trees; this
    // module only owns the chain-walking logic, so it is covered there.
    #[test]
    fn parses_known_steps() {
        assert!(parse_step("firstChild").is_some());
        assert!(parse_step("bogus").is_none());
    }
}
