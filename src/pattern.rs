//! Search patterns: a textual pattern plus a flag string compiled into a
//! regular expression.
//!
//! | Flag | Meaning |
//! |------|---------|
//! | `i`  | ignore case |
//! | `B`  | search backwards |
//! | `L`  | only search the current line |
//! | `M`  | the pattern text is already a regex (no escaping) |
//! | `^`  | anchor at the start of the line |
//! | `$`  | anchor at the end of the line |
//! | `<`  | start scanning at the start of the buffer |
//! | `>`  | start scanning at the end of the buffer |

use regex::{Captures, Match, Regex, RegexBuilder};

use crate::error::{Error, Result};

/// How the pattern text is turned into a regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `m`: glob syntax (`*`, `?`, `[...]`).
    Glob,
    /// `s`: literal text.
    Literal,
    /// `r`: a regular expression as written.
    Regex,
}

impl PatternKind {
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            'm' => Some(PatternKind::Glob),
            's' => Some(PatternKind::Literal),
            'r' => Some(PatternKind::Regex),
            _ => None,
        }
    }
}

/// Where a buffer search starts, overriding the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAnchor {
    BufferStart,
    BufferEnd,
}

/// A compiled search pattern with its search-control flags.
#[derive(Debug, Clone)]
pub struct SearchExpression {
    pattern: String,
    kind: PatternKind,
    regex: Regex,
    pub ignore_case: bool,
    pub begin_of_line: bool,
    pub end_of_line: bool,
    pub backwards: bool,
    pub inline_only: bool,
    pub start_anchor: Option<StartAnchor>,
}

impl SearchExpression {
    /// Compile `pattern` of the given kind with `flags`.
    pub fn new(pattern: &str, kind: PatternKind, flags: &str) -> Result<Self> {
        let mut expr = Self {
            pattern: String::new(),
            kind,
            regex: Regex::new("").map_err(|e| Error::internal(e.to_string()))?,
            ignore_case: false,
            begin_of_line: false,
            end_of_line: false,
            backwards: false,
            inline_only: false,
            start_anchor: None,
        };
        expr.set(pattern, kind, flags)?;
        Ok(expr)
    }

    /// Shorthand for a plain regex without flags.
    pub fn regex(pattern: &str) -> Result<Self> {
        Self::new(pattern, PatternKind::Regex, "")
    }

    /// Shorthand for literal text without flags.
    pub fn literal(text: &str) -> Result<Self> {
        Self::new(text, PatternKind::Literal, "")
    }

    /// Store a new pattern, derive the flags and recompile.
    pub fn set(&mut self, pattern: &str, kind: PatternKind, flags: &str) -> Result<()> {
        let mut already_escaped = false;
        self.ignore_case = false;
        self.begin_of_line = false;
        self.end_of_line = false;
        self.backwards = false;
        self.inline_only = false;
        self.start_anchor = None;
        for flag in flags.chars() {
            match flag {
                'i' => self.ignore_case = true,
                'B' => self.backwards = true,
                'L' => self.inline_only = true,
                'M' => already_escaped = true,
                '^' => self.begin_of_line = true,
                '$' => self.end_of_line = true,
                '<' => self.start_anchor = Some(StartAnchor::BufferStart),
                '>' => self.start_anchor = Some(StartAnchor::BufferEnd),
                other => {
                    return Err(Error::parse(format!("unknown pattern flag '{}'", other)));
                }
            }
        }

        // Anchors written in the pattern body only anchor the regex. The
        // flags additionally move the search start to the line boundary.
        let mut body = pattern;
        let mut anchor_start = self.begin_of_line;
        let mut anchor_end = self.end_of_line;
        if kind != PatternKind::Regex && !already_escaped {
            if let Some(rest) = body.strip_prefix('^') {
                anchor_start = true;
                body = rest;
            }
            if let Some(rest) = body.strip_suffix('$') {
                anchor_end = true;
                body = rest;
            }
        }

        let mut source = match (kind, already_escaped) {
            (PatternKind::Regex, _) | (_, true) => body.to_string(),
            (PatternKind::Literal, false) => regex::escape(body),
            (PatternKind::Glob, false) => glob_to_regex(body),
        };
        if anchor_start || anchor_end {
            source = format!(
                "{}(?:{}){}",
                if anchor_start { "^" } else { "" },
                source,
                if anchor_end { "$" } else { "" }
            );
        }

        self.regex = RegexBuilder::new(&source)
            .case_insensitive(self.ignore_case)
            .build()
            .map_err(|e| Error::parse(format!("invalid pattern '{}': {}", pattern, e)))?;
        self.pattern = pattern.to_string();
        self.kind = kind;
        Ok(())
    }

    /// The pattern text as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Whether replacements may refer to capture groups.
    pub fn has_groups(&self) -> bool {
        self.kind != PatternKind::Literal
    }

    /// Test whether `text` contains a match.
    pub fn search(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// First match starting at or after byte offset `start`.
    ///
    /// The whole `text` stays visible to the regex so anchors and word
    /// boundaries see the real context.
    pub fn find_at<'t>(&self, text: &'t str, start: usize) -> Option<Match<'t>> {
        if start > text.len() {
            return None;
        }
        self.regex.find_at(text, start)
    }

    pub fn captures_at<'t>(&self, text: &'t str, start: usize) -> Option<Captures<'t>> {
        if start > text.len() {
            return None;
        }
        self.regex.captures_at(text, start)
    }
}

/// Convert a glob into an unanchored regex source.
///
/// `*` matches any run, `?` one char, `[...]` a class (`[!...]` negated),
/// and `\x` the literal `x`.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(next) => out.push_str(&regex::escape(&next.to_string())),
                None => out.push_str(r"\\"),
            },
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    if matches!(inner, '[' | '\\' | '&' | '~') {
                        class.push('\\');
                    }
                    class.push(inner);
                }
                if closed && !class.is_empty() && class != "^" {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    // An unterminated class is literal text.
                    out.push_str(r"\[");
                    out.push_str(&regex::escape(&class));
                    if closed {
                        out.push_str(r"\]");
                    }
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}
