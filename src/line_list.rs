//! The editable line buffer: an ordered list of text lines with a cursor,
//! a mark and the result of the last search.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::file_io;
use crate::pattern::{SearchExpression, StartAnchor};
use crate::position::{BufferPosition, SearchResult, floor_char_boundary, next_char_boundary};

/// `$N` placeholders in replacement text.
pub static BACKREFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d)").expect("valid backreference pattern"));

/// What [`LineList::adapt`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// A line matched and already had the wanted content.
    Unchanged,
    /// A matching line was rewritten.
    Replaced,
    /// No line matched; inserted next to the anchor line.
    InsertedAtAnchor,
    /// Neither pattern nor anchor matched; appended at the end.
    Appended,
}

/// Optional arguments of [`LineList::replace`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceOptions<'a> {
    /// Stop after this many replacements.
    pub max_count: Option<usize>,
    /// Start of the range (inclusive). Defaults to the start of the buffer.
    pub start: Option<BufferPosition>,
    /// End of the range (exclusive). Defaults to the end of the buffer.
    pub end: Option<BufferPosition>,
    /// Only lines matching this expression are touched.
    pub filter: Option<&'a SearchExpression>,
    /// Recognizes `$N` placeholders in the replacement. `None` inserts the
    /// replacement literally.
    pub backrefs: Option<&'a Regex>,
}

#[derive(Debug, Clone, Default)]
pub struct LineList {
    lines: Vec<String>,
    cursor: BufferPosition,
    mark: BufferPosition,
    last_hit: String,
    last_search: SearchResult,
    changed: bool,
    filename: Option<PathBuf>,
}

impl LineList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// The line under the cursor, empty past the end.
    pub fn current_line(&self) -> &str {
        self.line(self.cursor.line).unwrap_or("")
    }

    /// All lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Replace the whole content. Cursor and mark go to the start.
    pub fn set_lines(&mut self, lines: Vec<String>) {
        self.lines = lines;
        self.cursor = BufferPosition::START;
        self.mark = BufferPosition::START;
        self.changed = true;
    }

    pub fn append_lines<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        self.lines.extend(lines);
        self.changed = true;
    }

    /// Remove and return the last line.
    pub fn pop_line(&mut self) -> Option<String> {
        let line = self.lines.pop()?;
        self.changed = true;
        self.normalize();
        Some(line)
    }

    /// Remove and return the first line.
    pub fn shift_line(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let line = self.lines.remove(0);
        self.changed = true;
        self.cursor.line = self.cursor.line.saturating_sub(1);
        self.mark.line = self.mark.line.saturating_sub(1);
        self.normalize();
        Some(line)
    }

    pub fn clear(&mut self) {
        self.set_lines(Vec::new());
    }

    pub fn cursor(&self) -> BufferPosition {
        self.cursor
    }

    /// Move the cursor. Out-of-range values are clamped.
    pub fn set_position(&mut self, line: usize, column: usize) {
        self.cursor = BufferPosition::new(line, column).clamped(&self.lines);
    }

    pub fn set_cursor(&mut self, position: BufferPosition) {
        self.cursor = position.clamped(&self.lines);
    }

    pub fn mark(&self) -> BufferPosition {
        self.mark
    }

    pub fn set_mark(&mut self, position: BufferPosition) {
        self.mark = position.clamped(&self.lines);
    }

    /// Text of the last successful hit, empty after a miss.
    pub fn last_hit(&self) -> &str {
        &self.last_hit
    }

    pub fn last_search(&self) -> SearchResult {
        self.last_search
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, filename: impl Into<PathBuf>) {
        self.filename = Some(filename.into());
    }

    /// Position just past the last character of the buffer.
    pub fn end_position(&self) -> BufferPosition {
        match self.lines.last() {
            Some(last) => BufferPosition::new(self.lines.len() - 1, last.len()),
            None => BufferPosition::START,
        }
    }

    /// Index of the first line at or after `start_line` matching `pattern`.
    pub fn find(&self, pattern: &SearchExpression, start_line: usize) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .skip(start_line)
            .find(|(_, line)| pattern.search(line))
            .map(|(index, _)| index)
    }

    /// Search from the cursor, honoring the expression's direction, line
    /// restriction and start anchors. Lines are never modified.
    ///
    /// With `advance_cursor` a forward hit moves the cursor just past the
    /// match and a backward hit to the start of the match.
    pub fn search(&mut self, expr: &SearchExpression, advance_cursor: bool) -> SearchResult {
        let start = self.search_start(expr);
        let result = if expr.backwards {
            self.search_backward(expr, start)
        } else {
            self.search_forward(expr, start)
        };
        self.last_search = result;
        if result.found {
            let line = &self.lines[result.position.line];
            self.last_hit = line[result.position.column..result.end().column].to_string();
            if advance_cursor {
                self.cursor = if expr.backwards {
                    result.position
                } else {
                    result.end()
                };
            }
        } else {
            self.last_hit.clear();
        }
        result
    }

    fn search_start(&self, expr: &SearchExpression) -> BufferPosition {
        let cursor = self.cursor.clamped(&self.lines);
        let line_end = BufferPosition::new(cursor.line, self.line(cursor.line).map_or(0, str::len));
        match (expr.start_anchor, expr.inline_only) {
            (Some(StartAnchor::BufferStart), false) => BufferPosition::START,
            (Some(StartAnchor::BufferEnd), false) => self.end_position(),
            (Some(StartAnchor::BufferStart), true) => BufferPosition::new(cursor.line, 0),
            (Some(StartAnchor::BufferEnd), true) => line_end,
            (None, _) if expr.begin_of_line && !expr.backwards => {
                BufferPosition::new(cursor.line, 0)
            }
            (None, _) if expr.end_of_line && expr.backwards => line_end,
            (None, _) => cursor,
        }
    }

    fn search_forward(&self, expr: &SearchExpression, start: BufferPosition) -> SearchResult {
        if start.line >= self.lines.len() {
            return SearchResult::miss();
        }
        let last = if expr.inline_only {
            start.line
        } else {
            self.lines.len() - 1
        };
        for index in start.line..=last {
            let text = &self.lines[index];
            let from = if index == start.line { start.column } else { 0 };
            if let Some(m) = expr.find_at(text, from) {
                return SearchResult::hit(BufferPosition::new(index, m.start()), m.len());
            }
        }
        SearchResult::miss()
    }

    fn search_backward(&self, expr: &SearchExpression, start: BufferPosition) -> SearchResult {
        if self.lines.is_empty() {
            return SearchResult::miss();
        }
        let (top, top_limit) = if start.line >= self.lines.len() {
            let last = self.lines.len() - 1;
            (last, self.lines[last].len())
        } else {
            (start.line, start.column)
        };
        let first = if expr.inline_only { top } else { 0 };
        for index in (first..=top).rev() {
            let text = &self.lines[index];
            let limit = if index == top { top_limit } else { text.len() };
            if let Some((begin, end)) = last_match_before(expr, text, limit) {
                return SearchResult::hit(BufferPosition::new(index, begin), end - begin);
            }
        }
        SearchResult::miss()
    }

    /// Replace matches of `expr` with `replacement`. Returns the number of
    /// replacements.
    ///
    /// Without an explicit range the whole buffer is used, or only the
    /// cursor line when the expression is restricted to it. Partial lines at
    /// the range boundaries keep their untouched prefix and suffix.
    pub fn replace(
        &mut self,
        expr: &SearchExpression,
        replacement: &str,
        options: &ReplaceOptions<'_>,
    ) -> usize {
        if self.lines.is_empty() {
            return 0;
        }
        let (start, end) = match (options.start, options.end) {
            (None, None) if expr.inline_only => {
                let line = self.cursor.line.min(self.lines.len() - 1);
                (
                    BufferPosition::new(line, 0),
                    BufferPosition::new(line, self.lines[line].len()),
                )
            }
            (start, end) => BufferPosition::ordered(
                start.unwrap_or(BufferPosition::START).clamped(&self.lines),
                end.unwrap_or_else(|| self.end_position()).clamped(&self.lines),
            ),
        };

        let mut count = 0;
        let last = end.line.min(self.lines.len() - 1);
        for index in start.line..=last {
            let remaining = options.max_count.map(|max| max.saturating_sub(count));
            if remaining == Some(0) {
                break;
            }
            let text = &self.lines[index];
            if options.filter.is_some_and(|filter| !filter.search(text)) {
                continue;
            }
            let from = if index == start.line { start.column } else { 0 };
            let to = if index == end.line { end.column } else { text.len() };
            if from > to {
                continue;
            }
            let (rewritten, replaced) =
                replace_in(expr, text, (from, to), replacement, remaining, options.backrefs);
            if replaced > 0 {
                self.lines[index] = rewritten;
                count += replaced;
            }
        }
        if count > 0 {
            self.changed = true;
            self.normalize();
        }
        count
    }

    /// Insert `lines` at `position`, splitting the line there.
    ///
    /// The first inserted line is joined to the text before the split; the
    /// text after the split follows the last inserted line, or starts a new
    /// line when `add_newline_after_tail` is set. Returns the position just
    /// past the inserted text.
    pub fn insert(
        &mut self,
        position: BufferPosition,
        lines: &[String],
        add_newline_after_tail: bool,
    ) -> BufferPosition {
        let pos = position.clamped(&self.lines);
        if lines.is_empty() && !add_newline_after_tail {
            return pos;
        }
        let at_end = pos.line == self.lines.len();
        if lines.len() == 1 && !add_newline_after_tail && !at_end {
            self.lines[pos.line].insert_str(pos.column, &lines[0]);
            self.changed = true;
            return BufferPosition::new(pos.line, pos.column + lines[0].len());
        }

        let (head, tail) = if at_end {
            (String::new(), String::new())
        } else {
            let line = &self.lines[pos.line];
            (line[..pos.column].to_string(), line[pos.column..].to_string())
        };
        let mut block = Vec::with_capacity(lines.len() + 1);
        let mut first = head;
        first.push_str(lines.first().map_or("", String::as_str));
        block.push(first);
        block.extend(lines.iter().skip(1).cloned());

        let end = if add_newline_after_tail {
            let end = BufferPosition::new(pos.line + block.len(), 0);
            if !at_end {
                block.push(tail);
            }
            end
        } else {
            let last_index = block.len() - 1;
            let last = &mut block[last_index];
            let end = BufferPosition::new(pos.line + last_index, last.len());
            last.push_str(&tail);
            end
        };

        let replaced = if at_end { pos.line..pos.line } else { pos.line..pos.line + 1 };
        self.lines.splice(replaced, block);
        self.changed = true;
        self.normalize();
        end
    }

    /// Delete the text between two positions (order does not matter).
    /// Returns false if the range is empty.
    pub fn delete_range(&mut self, start: BufferPosition, end: BufferPosition) -> bool {
        let (start, end) = BufferPosition::ordered(
            start.clamped(&self.lines),
            end.clamped(&self.lines),
        );
        if start == end {
            return false;
        }
        if end.line >= self.lines.len() {
            let head = self.lines[start.line][..start.column].to_string();
            self.lines.truncate(start.line);
            if start.column > 0 {
                self.lines.push(head);
            }
        } else if start.line == end.line {
            self.lines[start.line].replace_range(start.column..end.column, "");
        } else {
            let merged = format!(
                "{}{}",
                &self.lines[start.line][..start.column],
                &self.lines[end.line][end.column..]
            );
            self.lines.splice(start.line..=end.line, [merged]);
        }
        self.cursor = shift_after_delete(self.cursor, start, end);
        self.mark = shift_after_delete(self.mark, start, end);
        self.changed = true;
        self.normalize();
        true
    }

    /// Extract the text between two positions without modifying the buffer.
    ///
    /// With `excluding_end` the range is half-open; otherwise the character
    /// at the end position (or the line break, at the end of a line) is
    /// included. Joining the result with `\n` yields the covered text.
    pub fn copy_range(
        &self,
        start: BufferPosition,
        end: BufferPosition,
        excluding_end: bool,
    ) -> Vec<String> {
        let (start, mut end) = BufferPosition::ordered(
            start.clamped(&self.lines),
            end.clamped(&self.lines),
        );
        if !excluding_end {
            end = self.advance(end);
        }
        if start == end {
            return Vec::new();
        }
        if start.line == end.line {
            return vec![self.lines[start.line][start.column..end.column].to_string()];
        }
        let mut pieces = vec![self.lines[start.line][start.column..].to_string()];
        let middle_end = end.line.min(self.lines.len());
        pieces.extend(self.lines[start.line + 1..middle_end].iter().cloned());
        if end.line < self.lines.len() {
            pieces.push(self.lines[end.line][..end.column].to_string());
        }
        pieces
    }

    /// Text between two positions, half-open, joined with `\n`.
    pub fn text_between(&self, start: BufferPosition, end: BufferPosition) -> String {
        self.copy_range(start, end, true).join("\n")
    }

    /// Make sure a line matching `pattern` reads `replacement`.
    ///
    /// If a line matches it is rewritten (or left alone when already equal).
    /// Otherwise the replacement is inserted above or below the first line
    /// matching `anchor`, or appended. Idempotent as long as `replacement`
    /// itself matches `pattern`.
    pub fn adapt(
        &mut self,
        pattern: &SearchExpression,
        replacement: &str,
        anchor: Option<&SearchExpression>,
        above_anchor: bool,
    ) -> ChangeType {
        if let Some(index) = self.find(pattern, 0) {
            if self.lines[index] == replacement {
                return ChangeType::Unchanged;
            }
            self.lines[index] = replacement.to_string();
            self.changed = true;
            self.normalize();
            return ChangeType::Replaced;
        }
        if let Some(index) = anchor.and_then(|anchor| self.find(anchor, 0)) {
            let at = if above_anchor { index } else { index + 1 };
            self.lines.insert(at, replacement.to_string());
            for position in [&mut self.cursor, &mut self.mark] {
                if position.line >= at {
                    position.line += 1;
                }
            }
            self.changed = true;
            self.normalize();
            return ChangeType::InsertedAtAnchor;
        }
        self.lines.push(replacement.to_string());
        self.changed = true;
        ChangeType::Appended
    }

    /// Load the buffer from a file. The buffer counts as unchanged.
    pub fn read_from_file(&mut self, path: &Path) -> Result<()> {
        let lines = file_io::read_lines(path)?;
        self.set_lines(lines);
        self.changed = false;
        self.filename = Some(path.to_path_buf());
        Ok(())
    }

    /// Write the buffer to `path` (or the file it was loaded from).
    ///
    /// Nothing is written unless `force` or `append` is set or the buffer
    /// changed since loading. Returns whether the file was written.
    pub fn write_to_file(
        &mut self,
        path: Option<&Path>,
        append: bool,
        force: bool,
    ) -> Result<bool> {
        if !(force || append || self.changed) {
            return Ok(false);
        }
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self
                .filename
                .clone()
                .ok_or_else(|| Error::runtime("buffer has no file name"))?,
        };
        file_io::write_lines(&path, &self.lines, append)?;
        if !append {
            self.changed = false;
        }
        Ok(true)
    }

    /// Position one character after `pos`, crossing line breaks.
    fn advance(&self, pos: BufferPosition) -> BufferPosition {
        match self.lines.get(pos.line) {
            Some(line) if pos.column < line.len() => {
                BufferPosition::new(pos.line, next_char_boundary(line, pos.column))
            }
            Some(_) => BufferPosition::new(pos.line + 1, 0),
            None => pos,
        }
    }

    /// Re-establish the clamping invariant for cursor and mark.
    fn normalize(&mut self) {
        self.cursor = self.cursor.clamped(&self.lines);
        self.mark = self.mark.clamped(&self.lines);
    }
}

/// Rightmost match ending at or before `limit`.
///
/// Matching sees the whole line so anchors and word boundaries behave as in
/// a forward search. Candidates are scanned by advancing one character past
/// each match start, so overlapping and adjacent matches are all considered.
fn last_match_before(expr: &SearchExpression, text: &str, limit: usize) -> Option<(usize, usize)> {
    let limit = floor_char_boundary(text, limit);
    let mut best = None;
    let mut pos = 0;
    while pos <= limit {
        let Some(m) = expr.find_at(text, pos) else {
            break;
        };
        if m.start() > limit {
            break;
        }
        if m.end() <= limit {
            best = Some((m.start(), m.end()));
        }
        if m.start() >= text.len() {
            break;
        }
        pos = next_char_boundary(text, m.start());
    }
    best
}

/// Replace up to `limit` matches lying inside `text[from..to]`.
///
/// Matching runs on the whole line, so `^` only matches at column 0 even
/// when `from` is further right.
fn replace_in(
    expr: &SearchExpression,
    text: &str,
    (from, to): (usize, usize),
    replacement: &str,
    limit: Option<usize>,
    backrefs: Option<&Regex>,
) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut last = from;
    let mut previous_end = None;
    let mut count = 0;
    let mut pos = from;
    out.push_str(&text[..from]);
    while pos <= to {
        if limit.is_some_and(|limit| count >= limit) {
            break;
        }
        let Some(caps) = expr.captures_at(text, pos) else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        if whole.end() > to {
            break;
        }
        // An empty match right behind the previous one is skipped.
        if whole.is_empty() && previous_end == Some(whole.start()) {
            if whole.start() >= text.len() {
                break;
            }
            pos = next_char_boundary(text, whole.start());
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        match backrefs {
            Some(backrefs) => out.push_str(&expand_backrefs(backrefs, replacement, &caps)),
            None => out.push_str(replacement),
        }
        last = whole.end();
        previous_end = Some(whole.end());
        count += 1;
        pos = if whole.is_empty() {
            if whole.end() >= text.len() {
                break;
            }
            next_char_boundary(text, whole.end())
        } else {
            whole.end()
        };
    }
    out.push_str(&text[last..]);
    (out, count)
}

/// Substitute `$N` placeholders with capture group `N` (empty if absent).
fn expand_backrefs(backrefs: &Regex, replacement: &str, caps: &Captures<'_>) -> String {
    backrefs
        .replace_all(replacement, |placeholder: &Captures<'_>| {
            placeholder
                .get(1)
                .and_then(|group| group.as_str().parse::<usize>().ok())
                .and_then(|group| caps.get(group))
                .map_or(String::new(), |m| m.as_str().to_string())
        })
        .into_owned()
}

/// Where a position ends up after `[start, end)` was deleted.
fn shift_after_delete(
    pos: BufferPosition,
    start: BufferPosition,
    end: BufferPosition,
) -> BufferPosition {
    if pos <= start {
        pos
    } else if pos < end {
        start
    } else if pos.line == end.line {
        BufferPosition::new(start.line, start.column + pos.column - end.column)
    } else {
        BufferPosition::new(pos.line - (end.line - start.line), pos.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternKind;

    fn list(lines: &[&str]) -> LineList {
        LineList::from_lines(lines.iter().copied())
    }

    fn regex(pattern: &str) -> SearchExpression {
        SearchExpression::regex(pattern).unwrap()
    }

    fn flagged(pattern: &str, flags: &str) -> SearchExpression {
        SearchExpression::new(pattern, PatternKind::Regex, flags).unwrap()
    }

    fn pos(line: usize, column: usize) -> BufferPosition {
        BufferPosition::new(line, column)
    }

    #[test]
    fn find_returns_first_matching_line() {
        let buf = list(&["alpha", "beta", "alphabet"]);
        assert_eq!(buf.find(&regex("alpha"), 0), Some(0));
        assert_eq!(buf.find(&regex("alpha"), 1), Some(2));
        assert_eq!(buf.find(&regex("gamma"), 0), None);
    }

    #[test]
    fn forward_search_advances_past_match() {
        let mut buf = list(&["one two", "three two"]);
        let expr = regex("two");
        let first = buf.search(&expr, true);
        assert_eq!(first, SearchResult::hit(pos(0, 4), 3));
        assert_eq!(buf.cursor(), pos(0, 7));
        let second = buf.search(&expr, true);
        assert_eq!(second.position, pos(1, 6));
        assert_eq!(buf.last_hit(), "two");
        assert!(!buf.search(&expr, true).found);
        assert_eq!(buf.last_hit(), "");
    }

    #[test]
    fn search_without_advance_keeps_cursor() {
        let mut buf = list(&["abc"]);
        buf.search(&regex("c"), false);
        assert_eq!(buf.cursor(), pos(0, 0));
    }

    #[test]
    fn backward_search_finds_rightmost_before_cursor() {
        let mut buf = list(&["ab ab", "ab ab"]);
        buf.set_position(1, 4);
        let expr = flagged("ab", "B");
        let hit = buf.search(&expr, true);
        assert_eq!(hit.position, pos(1, 0));
        assert_eq!(buf.cursor(), pos(1, 0));
        let hit = buf.search(&expr, true);
        assert_eq!(hit.position, pos(0, 3));
    }

    #[test]
    fn backward_search_sees_overlapping_candidates() {
        let mut buf = list(&["aaaa"]);
        buf.set_position(0, 3);
        let hit = buf.search(&flagged("aa", "B"), false);
        assert_eq!(hit.position, pos(0, 1));
        assert_eq!(hit.end(), pos(0, 3));
    }

    #[test]
    fn backward_search_keeps_word_boundaries() {
        let mut buf = list(&["foo foobar"]);
        buf.set_position(0, 7);
        let hit = buf.search(&flagged(r"foo\b", "B"), false);
        assert_eq!(hit.position, pos(0, 0));

        let mut buf = list(&["abc"]);
        buf.set_position(0, 2);
        assert!(!buf.search(&flagged("b$", "B"), false).found);
    }

    #[test]
    fn anchor_in_pattern_body_does_not_rescan_line() {
        let mut buf = list(&["key=1 key"]);
        let expr = SearchExpression::new("^key", PatternKind::Literal, "").unwrap();
        assert!(buf.search(&expr, true).found);
        assert_eq!(buf.cursor(), pos(0, 3));
        assert!(!buf.search(&expr, true).found);
    }

    #[test]
    fn inline_search_stays_on_line() {
        let mut buf = list(&["x", "target"]);
        assert!(!buf.search(&flagged("target", "L"), true).found);
        assert!(buf.search(&regex("target"), true).found);
    }

    #[test]
    fn start_anchor_overrides_cursor() {
        let mut buf = list(&["needle", "hay"]);
        buf.set_position(1, 2);
        assert!(!buf.search(&regex("needle"), false).found);
        assert!(buf.search(&flagged("needle", "<"), false).found);
        let hit = buf.search(&flagged("e", "B>"), false);
        assert_eq!(hit.position, pos(0, 5));
    }

    #[test]
    fn begin_of_line_flag_scans_from_line_start() {
        let mut buf = list(&["key = 1"]);
        buf.set_position(0, 3);
        let hit = buf.search(&flagged("key", "^"), false);
        assert_eq!(hit.position, pos(0, 0));
    }

    #[test]
    fn replace_respects_count() {
        let mut buf = list(&["a1b a2b"]);
        let n = buf.replace(
            &regex("a.b"),
            "X",
            &ReplaceOptions {
                max_count: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(n, 1);
        assert_eq!(buf.lines(), ["X a2b"]);

        let mut buf = list(&["a1b a2b"]);
        assert_eq!(buf.replace(&regex("a.b"), "X", &ReplaceOptions::default()), 2);
        assert_eq!(buf.lines(), ["X X"]);
        assert!(buf.changed());
    }

    #[test]
    fn replace_with_backreferences() {
        let mut buf = list(&["john smith"]);
        let options = ReplaceOptions {
            backrefs: Some(&BACKREFERENCE),
            ..Default::default()
        };
        buf.replace(&regex(r"(\w+) (\w+)"), "$2, $1", &options);
        assert_eq!(buf.lines(), ["smith, john"]);
    }

    #[test]
    fn replace_without_backreferences_is_literal() {
        let mut buf = list(&["cost"]);
        buf.replace(&regex("cost"), "$1", &ReplaceOptions::default());
        assert_eq!(buf.lines(), ["$1"]);
    }

    #[test]
    fn replace_range_keeps_prefix_and_suffix() {
        let mut buf = list(&["aaaa", "aaaa", "aaaa"]);
        let options = ReplaceOptions {
            start: Some(pos(0, 2)),
            end: Some(pos(2, 1)),
            ..Default::default()
        };
        assert_eq!(buf.replace(&regex("a"), "b", &options), 7);
        assert_eq!(buf.lines(), ["aabb", "bbbb", "baaa"]);
    }

    #[test]
    fn replace_in_partial_range_sees_whole_line() {
        let mut buf = list(&["aaaa"]);
        let options = ReplaceOptions {
            start: Some(pos(0, 0)),
            end: Some(pos(0, 3)),
            ..Default::default()
        };
        assert_eq!(buf.replace(&regex("^a"), "X", &options), 1);
        assert_eq!(buf.lines(), ["Xaaa"]);

        let mut buf = list(&["aaaa"]);
        let options = ReplaceOptions {
            start: Some(pos(0, 1)),
            end: Some(pos(0, 4)),
            ..Default::default()
        };
        assert_eq!(buf.replace(&regex("^a"), "X", &options), 0);
        assert_eq!(buf.lines(), ["aaaa"]);
    }

    #[test]
    fn replace_range_end_cuts_matches() {
        let mut buf = list(&["foobar foo"]);
        let options = ReplaceOptions {
            end: Some(pos(0, 3)),
            ..Default::default()
        };
        assert_eq!(buf.replace(&regex(r"foo\b"), "X", &options), 0);
        let options = ReplaceOptions {
            end: Some(pos(0, 2)),
            ..Default::default()
        };
        assert_eq!(buf.replace(&regex("o+"), "0", &options), 0);
        assert_eq!(buf.replace(&regex("o"), "0", &options), 1);
        assert_eq!(buf.lines(), ["f0obar foo"]);
    }

    #[test]
    fn empty_matches_follow_regex_replace_all() {
        let mut buf = list(&["aab"]);
        assert_eq!(buf.replace(&regex("a*"), "X", &ReplaceOptions::default()), 2);
        assert_eq!(buf.lines(), ["XbX"]);
    }

    #[test]
    fn replace_filter_limits_lines() {
        let mut buf = list(&["# x", "x", "# x"]);
        let filter = regex("^#");
        let options = ReplaceOptions {
            filter: Some(&filter),
            ..Default::default()
        };
        assert_eq!(buf.replace(&regex("x"), "y", &options), 2);
        assert_eq!(buf.lines(), ["# y", "x", "# y"]);
    }

    #[test]
    fn replace_inline_only_touches_cursor_line() {
        let mut buf = list(&["x", "x"]);
        buf.set_position(1, 0);
        assert_eq!(buf.replace(&flagged("x", "L"), "y", &ReplaceOptions::default()), 1);
        assert_eq!(buf.lines(), ["x", "y"]);
    }

    #[test]
    fn insert_single_line_splices() {
        let mut buf = list(&["xy"]);
        let end = buf.insert(pos(0, 1), &["abc".to_string()], false);
        assert_eq!(buf.lines(), ["xabcy"]);
        assert_eq!(end, pos(0, 4));
    }

    #[test]
    fn insert_with_newline_splits_line() {
        let mut buf = list(&["xy"]);
        let end = buf.insert(pos(0, 1), &["abc".to_string()], true);
        assert_eq!(buf.lines(), ["xabc", "y"]);
        assert_eq!(end, pos(1, 0));
    }

    #[test]
    fn insert_block_ties_into_split() {
        let mut buf = list(&["head|tail"]);
        let block = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let end = buf.insert(pos(0, 5), &block, false);
        assert_eq!(buf.lines(), ["head|1", "2", "3tail"]);
        assert_eq!(end, pos(2, 1));
    }

    #[test]
    fn insert_whole_lines_before_line() {
        let mut buf = list(&["a", "c"]);
        buf.insert(pos(1, 0), &["b".to_string()], true);
        assert_eq!(buf.lines(), ["a", "b", "c"]);
    }

    #[test]
    fn insert_past_end_appends() {
        let mut buf = list(&["a"]);
        let end = buf.insert(pos(1, 0), &["b".to_string()], true);
        assert_eq!(buf.lines(), ["a", "b"]);
        assert_eq!(end, pos(2, 0));
    }

    #[test]
    fn delete_within_line() {
        let mut buf = list(&["abcdef"]);
        assert!(buf.delete_range(pos(0, 4), pos(0, 1)));
        assert_eq!(buf.lines(), ["aef"]);
    }

    #[test]
    fn delete_merges_boundary_lines() {
        let mut buf = list(&["abc", "def", "ghi"]);
        buf.set_position(2, 2);
        buf.delete_range(pos(0, 1), pos(2, 1));
        assert_eq!(buf.lines(), ["ahi"]);
        assert_eq!(buf.cursor(), pos(0, 2));
    }

    #[test]
    fn delete_to_end_of_buffer() {
        let mut buf = list(&["a", "b", "c"]);
        buf.delete_range(pos(1, 0), pos(3, 0));
        assert_eq!(buf.lines(), ["a"]);
        let mut buf = list(&["ab", "c"]);
        buf.delete_range(pos(0, 1), pos(2, 0));
        assert_eq!(buf.lines(), ["a"]);
    }

    #[test]
    fn empty_delete_is_noop() {
        let mut buf = list(&["a"]);
        assert!(!buf.delete_range(pos(0, 1), pos(0, 1)));
        assert!(!buf.changed());
    }

    #[test]
    fn copy_range_half_open_and_closed() {
        let buf = list(&["abc", "def"]);
        assert_eq!(buf.copy_range(pos(0, 1), pos(1, 1), true), ["bc", "d"]);
        assert_eq!(buf.copy_range(pos(0, 1), pos(1, 1), false), ["bc", "de"]);
        assert_eq!(buf.copy_range(pos(0, 3), pos(0, 3), false), ["", ""]);
        assert_eq!(buf.copy_range(pos(0, 0), pos(2, 0), true), ["abc", "def"]);
    }

    #[test]
    fn copy_delete_insert_round_trip() {
        let original = list(&["first line", "second line", "third"]);
        let (start, end) = (pos(0, 6), pos(2, 2));
        let piece = original.copy_range(start, end, true);
        let mut buf = original.clone();
        buf.delete_range(start, end);
        buf.insert(start, &piece, false);
        assert_eq!(buf.lines(), original.lines());
    }

    #[test]
    fn adapt_outcomes() {
        let mut buf = list(&["[core]", "name = old"]);
        let pattern = regex("^name =");
        assert_eq!(buf.adapt(&pattern, "name = new", None, false), ChangeType::Replaced);
        assert_eq!(buf.adapt(&pattern, "name = new", None, false), ChangeType::Unchanged);

        let anchor = regex(r"^\[core\]");
        let other = regex("^mode =");
        assert_eq!(
            buf.adapt(&other, "mode = 1", Some(&anchor), false),
            ChangeType::InsertedAtAnchor
        );
        assert_eq!(buf.lines(), ["[core]", "mode = 1", "name = new"]);

        let missing = regex("^x =");
        let no_anchor = regex("nothing");
        assert_eq!(
            buf.adapt(&missing, "x = 2", Some(&no_anchor), true),
            ChangeType::Appended
        );
        assert_eq!(buf.lines().last().map(String::as_str), Some("x = 2"));
    }

    #[test]
    fn adapt_insert_shifts_cursor_and_mark() {
        let mut buf = list(&["[core]", "name = value is long"]);
        buf.set_position(1, 15);
        buf.set_mark(pos(0, 2));
        let other = regex("^mode =");
        let anchor = regex(r"^\[core\]");
        assert_eq!(
            buf.adapt(&other, "mode = 1", Some(&anchor), false),
            ChangeType::InsertedAtAnchor
        );
        assert_eq!(buf.cursor(), pos(2, 15));
        assert_eq!(buf.mark(), pos(0, 2));

        assert_eq!(
            buf.adapt(&regex("^top"), "top", Some(&anchor), true),
            ChangeType::InsertedAtAnchor
        );
        assert_eq!(buf.lines()[0], "top");
        assert_eq!(buf.cursor(), pos(3, 15));
        assert_eq!(buf.mark(), pos(1, 2));
    }

    #[test]
    fn write_only_when_changed_or_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut buf = list(&["a"]);
        assert!(!buf.write_to_file(Some(&path), false, false).unwrap());
        assert!(buf.write_to_file(Some(&path), false, true).unwrap());

        let mut loaded = LineList::new();
        loaded.read_from_file(&path).unwrap();
        assert_eq!(loaded.lines(), ["a"]);
        assert!(!loaded.changed());
        assert!(!loaded.write_to_file(None, false, false).unwrap());
        loaded.append_lines(["b".to_string()]);
        assert!(loaded.write_to_file(None, false, false).unwrap());
        assert_eq!(file_io::read_lines(&path).unwrap(), ["a", "b"]);
    }

    #[test]
    fn set_position_clamps() {
        let mut buf = list(&["abc"]);
        buf.set_position(usize::MAX, usize::MAX);
        assert_eq!(buf.cursor(), pos(1, 0));
        buf.set_position(0, 99);
        assert_eq!(buf.cursor(), pos(0, 3));
    }

    #[test]
    fn pop_and_shift() {
        let mut buf = list(&["a", "b", "c"]);
        assert_eq!(buf.shift_line().as_deref(), Some("a"));
        assert_eq!(buf.pop_line().as_deref(), Some("c"));
        assert_eq!(buf.lines(), ["b"]);
    }
}
