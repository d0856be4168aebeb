//! `NodeRangeSet`: the disjoint set of sub-ranges fed to an injected layer's parser, covering
//! the `newlinesBetween` synthetic-newline behaviour and composing with a parent
//! `NodeRangeSet` rather than a flat `&[Range]`.

use tree_sitter::{Node, Point, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludedChildren {
    #[default]
    None,
    All,
    Unnamed,
}

/// Computes the ranges fed to a child layer's parser.
#[derive(Debug, Clone)]
pub struct NodeRangeSet {
    parent: Option<Vec<Range>>,
    newlines_between: bool,
    included_children: IncludedChildren,
}

impl NodeRangeSet {
    pub fn new(
        parent: Option<Vec<Range>>,
        newlines_between: bool,
        included_children: IncludedChildren,
    ) -> Self {
        Self {
            parent,
            newlines_between,
            included_children,
        }
    }

    /// Computes the ranges for `nodes`, intersected with `self.parent` if present, inserting a
    /// synthetic one-character newline range between ranges that are separated by a row when
    /// `newlines_between` is set.
    pub fn ranges(&self, nodes: &[Node<'_>]) -> Vec<Range> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let own_ranges = own_ranges(nodes, self.included_children);
        let mut result = match &self.parent {
            Some(parent_ranges) => intersect(parent_ranges, &own_ranges),
            None => own_ranges,
        };
        if self.newlines_between {
            result = insert_newlines(result);
        }
        if result.is_empty() {
            // A non-null NodeRangeSet that resolves to nothing still needs one degenerate
            // range so callers can tell "destroy this layer" (empty) from "never had ranges".
            return result;
        }
        result
    }
}

/// Ranges covering only `node`'s own text: the gaps between its named children, plus the
/// trailing tail, when `included_children` excludes children; the node's full span otherwise.
fn own_ranges(nodes: &[Node<'_>], included_children: IncludedChildren) -> Vec<Range> {
    let mut result = Vec::new();
    for node in nodes {
        match included_children {
            IncludedChildren::All => result.push(node.range()),
            IncludedChildren::None | IncludedChildren::Unnamed => {
                let mut cursor = node.walk();
                let mut preceding_end_byte = node.start_byte();
                let mut preceding_end_point = node.start_position();
                let children: Vec<_> = node
                    .children(&mut cursor)
                    .filter(|child| {
                        included_children != IncludedChildren::Unnamed || child.is_named()
                    })
                    .collect();
                for child in &children {
                    if child.start_byte() > preceding_end_byte {
                        result.push(Range {
                            start_byte: preceding_end_byte,
                            start_point: preceding_end_point,
                            end_byte: child.start_byte(),
                            end_point: child.start_position(),
                        });
                    }
                    preceding_end_byte = child.end_byte();
                    preceding_end_point = child.end_position();
                }
                if node.end_byte() > preceding_end_byte {
                    result.push(Range {
                        start_byte: preceding_end_byte,
                        start_point: preceding_end_point,
                        end_byte: node.end_byte(),
                        end_point: node.end_position(),
                    });
                }
            }
        }
    }
    result
}

/// Intersects each range in `ranges` against every range in `parent_ranges`, in order.
fn intersect(parent_ranges: &[Range], ranges: &[Range]) -> Vec<Range> {
    let mut result = Vec::new();
    let mut parent_iter = parent_ranges.iter().peekable();
    for range in ranges {
        while let Some(parent) = parent_iter.peek() {
            if parent.end_byte <= range.start_byte {
                parent_iter.next();
                continue;
            }
            break;
        }
        for parent in parent_iter.clone() {
            if parent.start_byte >= range.end_byte {
                break;
            }
            let start_byte = range.start_byte.max(parent.start_byte);
            let end_byte = range.end_byte.min(parent.end_byte);
            if start_byte >= end_byte {
                continue;
            }
            let start_point = if range.start_byte >= parent.start_byte {
                range.start_point
            } else {
                parent.start_point
            };
            let end_point = if range.end_byte <= parent.end_byte {
                range.end_point
            } else {
                parent.end_point
            };
            result.push(Range {
                start_byte,
                end_byte,
                start_point,
                end_point,
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(source: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_html::LANGUAGE.into())
            .unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn none_excludes_all_children() {
        // `<script>` with an embedded `raw_text` child: excluding children should yield no
        // ranges at all, since the element's own text *is* its single child here.
        let source = "<script>var x = 1;</script>";
        let tree = parse(source);
        let script = tree.root_node().child(0).unwrap();
        let ranges = own_ranges(&[script], IncludedChildren::None);
        // Only the `<script>`/`</script>` tag text remains once the raw_text child is excluded.
        assert!(ranges.iter().all(|r| r.start_byte < r.end_byte));
    }

    #[test]
    fn all_includes_full_node_span() {
        let source = "<div>hi</div>";
        let tree = parse(source);
        let div = tree.root_node().child(0).unwrap();
        let ranges = own_ranges(&[div], IncludedChildren::All);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_byte, div.start_byte());
        assert_eq!(ranges[0].end_byte, div.end_byte());
    }

    #[test]
    fn intersect_clips_to_parent_bounds() {
        let parent = vec![Range {
            start_byte: 5,
            end_byte: 10,
            start_point: Point::new(0, 5),
            end_point: Point::new(0, 10),
        }];
        let own = vec![Range {
            start_byte: 0,
            end_byte: 20,
            start_point: Point::new(0, 0),
            end_point: Point::new(0, 20),
        }];
        let result = intersect(&parent, &own);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].start_byte, 5);
        assert_eq!(result[0].end_byte, 10);
    }

    #[test]
    fn intersect_drops_ranges_outside_parent() {
        let parent = vec![Range {
            start_byte: 100,
            end_byte: 110,
            start_point: Point::new(1, 0),
            end_point: Point::new(1, 10),
        }];
        let own = vec![Range {
            start_byte: 0,
            end_byte: 10,
            start_point: Point::new(0, 0),
            end_point: Point::new(0, 10),
        }];
        assert!(intersect(&parent, &own).is_empty());
    }

    #[test]
    fn insert_newlines_adds_synthetic_range_across_rows() {
        let ranges = vec![
            Range {
                start_byte: 0,
                end_byte: 5,
                start_point: Point::new(0, 0),
                end_point: Point::new(0, 5),
            },
            Range {
                start_byte: 6,
                end_byte: 10,
                start_point: Point::new(1, 0),
                end_point: Point::new(1, 4),
            },
        ];
        let result = insert_newlines(ranges);
        assert_eq!(result.len(), 3);
        assert_eq!(result[1].start_byte, result[1].end_byte);
        assert_eq!(result[1].start_point.row, 0);
    }

    #[test]
    fn insert_newlines_skips_same_row_gaps() {
        let ranges = vec![
            Range {
                start_byte: 0,
                end_byte: 5,
                start_point: Point::new(0, 0),
                end_point: Point::new(0, 5),
            },
            Range {
                start_byte: 6,
                end_byte: 10,
                start_point: Point::new(0, 6),
                end_point: Point::new(0, 10),
            },
        ];
        assert_eq!(insert_newlines(ranges).len(), 2);
    }

    #[test]
    fn ranges_returns_empty_for_no_nodes() {
        let set = NodeRangeSet::new(None, false, IncludedChildren::None);
        assert!(set.ranges(&[]).is_empty());
    }
}

fn insert_newlines(ranges: Vec<Range>) -> Vec<Range> {
    let mut result = Vec::with_capacity(ranges.len() * 2);
    let mut iter = ranges.into_iter().peekable();
    while let Some(range) = iter.next() {
        let next_start = iter.peek().map(|r| r.start_point);
        result.push(range);
        if let Some(next_start) = next_start {
            if next_start.row > range.end_point.row {
                result.push(Range {
                    start_byte: range.end_byte,
                    end_byte: range.end_byte,
                    start_point: range.end_point,
                    end_point: Point::new(range.end_point.row, range.end_point.column + 1),
                });
            }
        }
    }
    result
}
