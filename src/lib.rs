//! Incremental, injection-aware syntax layer for a text editor.
//!
//! A [`LanguageMode`] owns a tree of [`LanguageLayer`]s: one root layer parses the whole
//! buffer, and each layer may carve out sub-ranges of its own tree for nested grammars to
//! parse as injections (an HTML file's `<script>` body parsed as JavaScript, a Markdown code
//! fence parsed as whatever language its info string names, and so on). Layers nest
//! arbitrarily deep; a point in the buffer is covered by exactly one layer at each depth.
//!
//! ```text
//! root (html)       | <html> ... <script> ... </script> ... </html> |
//! child (javascript)               | ... |
//! ```
//!
//! On top of that layer tree, [`LanguageMode`] answers the queries a host editor needs:
//! merged cross-layer syntax highlighting ([`highlight_iterator`]), fold ranges
//! ([`fold_resolver`]), indentation suggestions ([`indent`]), and local reference/definition
//! lookups ([`locals`]). None of it owns the text buffer itself — callers implement the
//! [`buffer::Buffer`] trait over whatever rope or gap buffer their editor already uses.

pub mod boundary_tree;
pub mod buffer;
pub mod error;
pub mod fold_resolver;
pub mod grammar;
pub mod highlight_iterator;
pub mod indent;
pub mod language_layer;
pub mod language_mode;
pub mod locals;
pub mod node_range_set;
pub mod query;
pub mod scope;
pub mod scope_resolver;

pub use boundary_tree::{BoundaryKey, Edge};
pub use buffer::{Buffer, BufferChange, PointRange, RopeBuffer};
pub use error::Error;
pub use fold_resolver::{FoldRange, FoldResolver};
pub use grammar::{Grammar, GrammarRegistry, InjectionLanguageMarker, InjectionProperties};
pub use highlight_iterator::{HighlightEvent, HighlightIterator, LayerHighlightIterator};
pub use language_layer::{LanguageLayer, TextChange};
pub use language_mode::{LanguageMode, LanguageModeEvent, ScopeDescriptor};
pub use node_range_set::{IncludedChildren, NodeRangeSet};
pub use scope::{ScopeId, ScopeRegistry};
pub use scope_resolver::Boundary;

pub use tree_sitter;
