pub mod properties;

use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;

static INHERITS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r";+\s*inherits\s*:?\s*([a-z_,()-]+)\s*").unwrap());

/// Reads query source for `language`/`filename` via `read_query_text`, resolving any
/// `; inherits <language>(,<language>)*` directives recursively. Drives folds/indents/locals
/// queries in addition to highlights.
pub fn read_query_text(
    language: &str,
    filename: &str,
    mut read: impl FnMut(&str, &str) -> String,
) -> String {
    fn go(language: &str, filename: &str, read: &mut impl FnMut(&str, &str) -> String) -> String {
        let query = read(language, filename);
        INHERITS_REGEX
            .replace_all(&query, |captures: &regex::Captures| {
                captures[1]
                    .split(',')
                    .fold(String::new(), |mut output, language| {
                        let _ = write!(output, "\n{}\n", go(language, filename, &mut *read));
                        output
                    })
            })
            .into_owned()
    }
    go(language, filename, &mut read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn resolves_single_inherits_directive() {
        let sources = RefCell::new(vec![
            ("child", "; inherits: base\n(identifier) @variable\n"),
            ("base", "(comment) @comment\n"),
        ]);
        let resolved = read_query_text("child", "highlights.scm", |language, _file| {
            sources
                .borrow()
                .iter()
                .find(|(name, _)| *name == language)
                .map(|(_, text)| text.to_string())
                .unwrap_or_default()
        });
        assert!(resolved.contains("@variable"));
        assert!(resolved.contains("@comment"));
    }
}
