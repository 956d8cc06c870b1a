//! Cursor positions inside a line buffer and search results.

use std::cmp::Ordering;
use std::fmt;

/// A 2D position in a buffer.
///
/// Both coordinates are 0-based; the column is a byte offset that always
/// lies on a char boundary. `line == line_count` is valid and denotes the
/// position just past the last line (column 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferPosition {
    pub line: usize,
    pub column: usize,
}

impl BufferPosition {
    pub const START: BufferPosition = BufferPosition { line: 0, column: 0 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Clamp to the buffer described by `lines`.
    ///
    /// The line index is limited to `[0, lines.len()]` and the column to the
    /// length of that line, snapped down to a char boundary. Never fails.
    pub fn clamped(self, lines: &[String]) -> Self {
        let line = self.line.min(lines.len());
        let column = match lines.get(line) {
            Some(text) => floor_char_boundary(text, self.column),
            None => 0,
        };
        Self { line, column }
    }

    /// Order two positions so the first is not after the second.
    pub fn ordered(a: Self, b: Self) -> (Self, Self) {
        if a <= b { (a, b) } else { (b, a) }
    }
}

impl PartialOrd for BufferPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BufferPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then(self.column.cmp(&other.column))
    }
}

impl fmt::Display for BufferPosition {
    /// Displayed 1-based, `line:column`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Largest char boundary of `text` not greater than `index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut index = index;
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary of `text` greater than `index`, or `text.len()`.
pub fn next_char_boundary(text: &str, index: usize) -> usize {
    text[index.min(text.len())..]
        .chars()
        .next()
        .map_or(text.len(), |c| index + c.len_utf8())
}

/// Outcome of one search. Rebuilt by every search call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub found: bool,
    pub position: BufferPosition,
    /// Length of the match in bytes.
    pub length: usize,
}

impl SearchResult {
    pub fn hit(position: BufferPosition, length: usize) -> Self {
        Self {
            found: true,
            position,
            length,
        }
    }

    pub fn miss() -> Self {
        Self::default()
    }

    /// Position just past the match (same line).
    pub fn end(&self) -> BufferPosition {
        BufferPosition::new(self.position.line, self.position.column + self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn clamps_line_and_column() {
        let buf = lines(&["abc", "de"]);
        assert_eq!(BufferPosition::new(1, 9).clamped(&buf), BufferPosition::new(1, 2));
        assert_eq!(BufferPosition::new(7, 3).clamped(&buf), BufferPosition::new(2, 0));
        assert_eq!(BufferPosition::new(0, 2).clamped(&buf), BufferPosition::new(0, 2));
    }

    #[test]
    fn clamps_to_char_boundary() {
        let buf = lines(&["aé"]);
        assert_eq!(BufferPosition::new(0, 2).clamped(&buf), BufferPosition::new(0, 1));
    }

    #[test]
    fn ordering_is_line_major() {
        assert!(BufferPosition::new(0, 9) < BufferPosition::new(1, 0));
        let (a, b) = BufferPosition::ordered(BufferPosition::new(2, 1), BufferPosition::new(1, 5));
        assert_eq!((a.line, b.line), (1, 2));
    }

    #[test]
    fn displays_one_based() {
        assert_eq!(BufferPosition::new(0, 4).to_string(), "1:5");
    }

    #[test]
    fn next_boundary_skips_multibyte() {
        assert_eq!(next_char_boundary("éa", 0), 2);
        assert_eq!(next_char_boundary("ab", 2), 2);
    }
}
