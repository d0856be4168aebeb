//! Grammar handles and the injection-point mechanism.
//!
//! Injection points are realized as a compiled `injections` query plus per-pattern `#set!`
//! properties: a node matched by the query can report its embedded language either through an
//! `@injection.language` capture, a static `injection.language` property, or a recovered
//! shebang line, and separately reports which node(s) hold the embedded content via
//! `@injection.content`.

use std::path::Path;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::{Language, Node, Query};

use crate::node_range_set::IncludedChildren;

/// Matches a `#!`-style shebang's interpreter name, e.g. `#!/usr/bin/env python3` → `python3`.
/// Runs over an already-decoded `&str` capture rather than a streaming rope cursor, since this
/// crate's query layer already hands callers a flattened buffer.
const SHEBANG: &str = r"#!\s*(?:\S*[/\\](?:env\s+(?:\-\S+\s+)*)?)?([^\s.\d]+)";
static SHEBANG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(SHEBANG).unwrap());

/// Extracts the interpreter name from a shebang line's captured text (the first one or two
/// lines of a file — some languages allow whitespace and newlines before the actual shebang
/// text).
pub fn shebang_language(capture_text: &str) -> Option<String> {
    let first_two_lines: String = capture_text.lines().take(2).collect::<Vec<_>>().join("\n");
    SHEBANG_REGEX
        .captures(&first_two_lines)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// A language tag reported by an injection point: an explicit name, a filename, or text
/// recovered from a `#!` shebang line.
#[derive(Debug, Clone)]
pub enum InjectionLanguageMarker<'a> {
    Name(std::borrow::Cow<'a, str>),
    Filename(std::borrow::Cow<'a, Path>),
    Shebang(String),
}

/// Per-pattern properties set on an injections-query pattern via `#set!`.
#[derive(Debug, Clone, Default)]
pub struct InjectionProperties {
    pub include_children: IncludedChildren,
    pub language: Option<Box<str>>,
    pub combined: bool,
    pub newlines_between: bool,
}

/// The compiled injections query for one grammar: which node(s) may introduce an embedded
/// language, and how to find out which one.
#[derive(Debug)]
pub struct InjectionsQuery {
    pub query: Query,
    properties: HashMap<Pattern, InjectionProperties>,
    language_capture: Option<u32>,
    content_capture: Option<u32>,
    filename_capture: Option<u32>,
    shebang_capture: Option<u32>,
}

impl InjectionsQuery {
    pub fn new(language: &Language, query_text: &str) -> Result<Self, tree_sitter::query::QueryError> {
        let query = Query::new(language, query_text)?;
        let mut properties: HashMap<Pattern, InjectionProperties> = HashMap::new();
        for pattern_index in 0..query.pattern_count() {
            for setting in query.property_settings(pattern_index) {
                let entry = properties.entry(Pattern(pattern_index)).or_default();
                match (&*setting.key, setting.value.as_deref()) {
                    ("injection.include-unnamed-children", None) => {
                        entry.include_children = IncludedChildren::Unnamed
                    }
                    ("injection.include-children", None) => {
                        entry.include_children = IncludedChildren::All
                    }
                    ("injection.language", Some(lang)) => entry.language = Some(lang.into()),
                    ("injection.combined", None) => entry.combined = true,
                    ("injection.newlines-between", None) => entry.newlines_between = true,
                    _ => {}
                }
            }
        }
        Ok(Self {
            language_capture: query.capture_index_for_name("injection.language"),
            content_capture: query.capture_index_for_name("injection.content"),
            filename_capture: query.capture_index_for_name("injection.filename"),
            shebang_capture: query.capture_index_for_name("injection.shebang"),
            properties,
            query,
        })
    }

    pub fn content_capture(&self) -> Option<u32> {
        self.content_capture
    }

    pub fn language_capture(&self) -> Option<u32> {
        self.language_capture
    }

    pub fn filename_capture(&self) -> Option<u32> {
        self.filename_capture
    }

    pub fn shebang_capture(&self) -> Option<u32> {
        self.shebang_capture
    }

    pub fn properties_for_pattern(&self, pattern: usize) -> InjectionProperties {
        self.properties.get(&Pattern(pattern)).cloned().unwrap_or_default()
    }
}

/// A lightweight wrapper so `Pattern` can key a `HashMap` without depending on a specific
/// tree-sitter pattern-index newtype (the real crate exposes plain `usize`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pattern(pub usize);

/// One grammar bundle: the language binary plus its compiled queries.
/// Any non-syntax query may be absent.
#[derive(Debug)]
pub struct Grammar {
    pub scope_name: String,
    pub language: Language,
    pub comment_strings: Option<(String, Option<String>)>,
    pub syntax_query: Option<Query>,
    pub folds_query: Option<Query>,
    pub indents_query: Option<Query>,
    pub locals_query: Option<Query>,
    pub injections_query: Option<InjectionsQuery>,
}

impl Grammar {
    pub fn new(scope_name: impl Into<String>, language: Language) -> Self {
        Self {
            scope_name: scope_name.into(),
            language,
            comment_strings: None,
            syntax_query: None,
            folds_query: None,
            indents_query: None,
            locals_query: None,
            injections_query: None,
        }
    }

    pub fn with_syntax_query(mut self, source: &str) -> Self {
        match Query::new(&self.language, source) {
            Ok(query) => self.syntax_query = Some(query),
            Err(err) => log::warn!("failed to load syntax query for {}: {err}", self.scope_name),
        }
        self
    }

    pub fn with_folds_query(mut self, source: &str) -> Self {
        match Query::new(&self.language, source) {
            Ok(query) => self.folds_query = Some(query),
            Err(err) => log::warn!("failed to load folds query for {}: {err}", self.scope_name),
        }
        self
    }

    pub fn with_indents_query(mut self, source: &str) -> Self {
        match Query::new(&self.language, source) {
            Ok(query) => self.indents_query = Some(query),
            Err(err) => log::warn!("failed to load indents query for {}: {err}", self.scope_name),
        }
        self
    }

    pub fn with_locals_query(mut self, source: &str) -> Self {
        match Query::new(&self.language, source) {
            Ok(query) => self.locals_query = Some(query),
            Err(err) => log::warn!("failed to load locals query for {}: {err}", self.scope_name),
        }
        self
    }

    pub fn with_injections_query(mut self, source: &str) -> Self {
        if source.trim().is_empty() {
            return self;
        }
        match InjectionsQuery::new(&self.language, source) {
            Ok(query) => self.injections_query = Some(query),
            Err(err) => {
                log::warn!("failed to load injections query for {}: {err}", self.scope_name)
            }
        }
        self
    }

    pub fn with_comment_strings(mut self, start: impl Into<String>, end: Option<String>) -> Self {
        self.comment_strings = Some((start.into(), end));
        self
    }

    /// Resolves an injection-language marker from either an `@injection.language` capture's
    /// text or a pattern's static `injection.language` property, preferring the capture.
    pub fn injection_marker_for_capture<'a>(
        &self,
        capture_text: Option<&'a str>,
        pattern_language_property: Option<&'a str>,
    ) -> Option<InjectionLanguageMarker<'a>> {
        if let Some(text) = capture_text {
            return Some(InjectionLanguageMarker::Name(text.into()));
        }
        pattern_language_property.map(|name| InjectionLanguageMarker::Name(name.into()))
    }
}

/// Maps a language tag reported by an injection point to a grammar bundle. Implemented by the
/// host; this crate never owns the set of available grammars.
pub trait GrammarRegistry {
    fn grammar_for_injection(&self, marker: &InjectionLanguageMarker<'_>) -> Option<std::sync::Arc<Grammar>>;
}

#[cfg(test)]
pub(crate) fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}
