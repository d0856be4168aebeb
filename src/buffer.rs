//! The text buffer is an external collaborator: this crate never owns
//! buffer storage, only consumes it through this trait. `RopeBuffer` is a reference
//! adapter over `ropey::Rope` kept for tests and for hosts that are happy to use ropey
//! directly.

use ropey::{Rope, RopeSlice};
use tree_sitter::Point;

/// A half-open `[start, end)` range expressed in buffer rows/columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointRange {
    pub start: Point,
    pub end: Point,
}

impl PointRange {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point >= self.start && point < self.end
    }
}

/// A single buffer change, in the shape the editor host reports it in.
#[derive(Debug, Clone)]
pub struct BufferChange {
    pub old_range: PointRange,
    pub new_range: PointRange,
    pub old_text: String,
    pub new_text: String,
}

/// The external buffer interface. Implementations must keep row/column
/// and character-index mappings stable between edits; this crate never caches them
/// across a `bufferDidChange` boundary.
pub trait Buffer {
    fn character_index_for_position(&self, point: Point) -> usize;
    fn position_for_character_index(&self, index: usize) -> Point;
    fn text(&self) -> RopeSlice<'_>;
    fn text_in_range(&self, range: PointRange) -> RopeSlice<'_>;
    fn line_for_row(&self, row: usize) -> RopeSlice<'_>;
    fn line_length_for_row(&self, row: usize) -> usize;
    fn line_ending_for_row(&self, row: usize) -> &'static str;
    fn is_row_blank(&self, row: usize) -> bool;
    fn clip_point(&self, point: Point) -> Point;
    fn max_point(&self) -> Point;

    /// Normalizes a point used for a *position query* (scope descriptor, syntax node lookup)
    /// the way a well-known text editor convention does: a point at end-of-line is treated as
    /// the character to its left. Idempotent by construction.
    fn normalize_point_for_position_query(&self, point: Point) -> Point {
        let clipped = self.clip_point(point);
        if clipped.column > 0 && clipped.column == self.line_length_for_row(clipped.row) {
            Point::new(clipped.row, clipped.column - 1)
        } else {
            clipped
        }
    }

    fn first_non_whitespace_range(&self, row: usize) -> PointRange {
        let line = self.line_for_row(row);
        let first = line
            .chars()
            .position(|c| !c.is_whitespace())
            .unwrap_or(0);
        PointRange::new(Point::new(row, first), Point::new(row, first + 1))
    }
}

/// Reference `Buffer` implementation over a `ropey::Rope`.
#[derive(Debug, Clone)]
pub struct RopeBuffer {
    pub rope: Rope,
}

impl RopeBuffer {
    pub fn new(text: impl AsRef<str>) -> Self {
        Self {
            rope: Rope::from_str(text.as_ref()),
        }
    }
}

impl Buffer for RopeBuffer {
    fn character_index_for_position(&self, point: Point) -> usize {
        let row_start = self.rope.line_to_char(point.row.min(self.rope.len_lines()));
        row_start + point.column
    }

    fn position_for_character_index(&self, index: usize) -> Point {
        let index = index.min(self.rope.len_chars());
        let row = self.rope.char_to_line(index);
        let col = index - self.rope.line_to_char(row);
        Point::new(row, col)
    }

    fn text(&self) -> RopeSlice<'_> {
        self.rope.slice(..)
    }

    fn text_in_range(&self, range: PointRange) -> RopeSlice<'_> {
        let start = self.character_index_for_position(range.start);
        let end = self.character_index_for_position(range.end);
        self.rope.slice(start..end)
    }

    fn line_for_row(&self, row: usize) -> RopeSlice<'_> {
        if row >= self.rope.len_lines() {
            self.rope.slice(self.rope.len_chars()..)
        } else {
            self.rope.line(row)
        }
    }

    fn line_length_for_row(&self, row: usize) -> usize {
        let line = self.line_for_row(row);
        let mut len = line.len_chars();
        // Strip the trailing line terminator from the reported length.
        for ending in ["\r\n", "\n", "\r"] {
            if line.len_chars() >= ending.chars().count() {
                let tail: String = line
                    .chars()
                    .skip(line.len_chars().saturating_sub(ending.chars().count()))
                    .collect();
                if tail == ending {
                    len -= ending.chars().count();
                    break;
                }
            }
        }
        len
    }

    fn line_ending_for_row(&self, row: usize) -> &'static str {
        let line = self.line_for_row(row);
        let s: String = line.chars().collect();
        if s.ends_with("\r\n") {
            "\r\n"
        } else if s.ends_with('\n') {
            "\n"
        } else {
            ""
        }
    }

    fn is_row_blank(&self, row: usize) -> bool {
        self.line_for_row(row).chars().all(|c| c.is_whitespace())
    }

    fn clip_point(&self, point: Point) -> Point {
        let row = point.row.min(self.rope.len_lines().saturating_sub(1));
        let col = point.column.min(self.line_length_for_row(row));
        Point::new(row, col)
    }

    fn max_point(&self) -> Point {
        let row = self.rope.len_lines().saturating_sub(1);
        Point::new(row, self.line_length_for_row(row))
    }
}
