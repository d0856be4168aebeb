//! `LayerHighlightIterator` + `HighlightIterator`: walks one layer's boundary
//! tree, and merges several layers' walks into a single deterministic event stream via a
//! min-heap-like scan of per-layer cursors advancing by buffer position, including the
//! deliberately-not-rebalanced `coverShallowerScopes` escape hatch.

use std::collections::BTreeMap;

use tree_sitter::{Point, Range};

use crate::scope::ScopeId;
use crate::scope_resolver::Boundary;

/// One emitted highlight event: everything that closes, then everything that opens, at
/// `point`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightEvent {
    pub point: Point,
    pub closes: Vec<ScopeId>,
    pub opens: Vec<ScopeId>,
}

/// Walks a single layer's precomputed boundary tree in position order.
pub struct LayerHighlightIterator<'a> {
    boundaries: std::collections::btree_map::Iter<'a, Point, Boundary>,
    pub depth: usize,
    pub cover_shallower_scopes: bool,
    pub layer_range: Option<Range>,
}

impl<'a> LayerHighlightIterator<'a> {
    pub fn new(boundaries: &'a BTreeMap<Point, Boundary>, depth: usize) -> Self {
        Self {
            boundaries: boundaries.iter(),
            depth,
            cover_shallower_scopes: false,
            layer_range: None,
        }
    }

    pub fn with_cover_shallower_scopes(mut self, cover: bool) -> Self {
        self.cover_shallower_scopes = cover;
        self
    }

    pub fn with_layer_range(mut self, range: Range) -> Self {
        self.layer_range = Some(range);
        self
    }
}

impl<'a> Iterator for LayerHighlightIterator<'a> {
    type Item = HighlightEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let (point, boundary) = self.boundaries.next()?;
        Some(HighlightEvent {
            point: *point,
            closes: boundary.close.clone(),
            opens: boundary.open.clone(),
        })
    }
}

struct Cursor<'a> {
    iter: std::iter::Peekable<LayerHighlightIterator<'a>>,
    depth: usize,
    cover_shallower_scopes: bool,
    layer_range: Option<Range>,
}

/// Merges several layers' highlight walks into one stream, in tie-break order: earlier buffer
/// position first; at an equal position, a cursor whose next event closes something wins over
/// one that only opens; still tied, the shallower layer (lower `depth`) wins. `coverShallowerScopes`
/// is per-layer: when a
/// deeper layer opts in, events from shallower layers that fall strictly inside that deeper
/// layer's range are suppressed rather than rebalanced — this can and does leave a shallower
/// layer's scope stack unbalanced across the suppressed region, which is intentional.
pub struct HighlightIterator<'a> {
    cursors: Vec<Cursor<'a>>,
}

impl<'a> HighlightIterator<'a> {
    pub fn new(layers: Vec<LayerHighlightIterator<'a>>) -> Self {
        let cursors = layers
            .into_iter()
            .map(|layer| Cursor {
                depth: layer.depth,
                cover_shallower_scopes: layer.cover_shallower_scopes,
                layer_range: layer.layer_range,
                iter: layer.peekable(),
            })
            .collect();
        Self { cursors }
    }

    fn covering_ranges_at(&self, point: Point, excluding_depth: usize) -> Vec<Range> {
        self.cursors
            .iter()
            .filter(|c| c.depth > excluding_depth && c.cover_shallower_scopes)
            .filter_map(|c| c.layer_range)
            .filter(|r| r.start_point < point && point < r.end_point)
            .collect()
    }
}

impl<'a> Iterator for HighlightIterator<'a> {
    type Item = HighlightEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next_point = self
                .cursors
                .iter_mut()
                .filter_map(|c| c.iter.peek().map(|e| e.point))
                .min()?;

            let winner_index = self
                .cursors
                .iter()
                .enumerate()
                .filter(|(_, c)| c.iter.peek().map(|e| e.point) == Some(next_point))
                .min_by(|(_, a), (_, b)| {
                    let a_closes = a.iter.peek().map(|e| !e.closes.is_empty()).unwrap_or(false);
                    let b_closes = b.iter.peek().map(|e| !e.closes.is_empty()).unwrap_or(false);
                    b_closes.cmp(&a_closes).then(a.depth.cmp(&b.depth))
                })
                .map(|(i, _)| i)?;

            let covered = self.covering_ranges_at(next_point, self.cursors[winner_index].depth);
            let event = self.cursors[winner_index].iter.next()?;
            if covered.is_empty() {
                return Some(event);
            }
            // Suppressed: this shallower event falls inside a `coverShallowerScopes` layer's
            // range, so it is dropped rather than emitted.
        }
    }
}
