//! Generic statement tokenizer.
//!
//! The tokenizer classifies one token at a time from the unconsumed part of
//! a single statement line. It knows nothing about the script language
//! itself: callers supply a sorted keyword list and, optionally, "special"
//! token classes as regular expressions which are tried in registration
//! order before the generic rules (see [`Tokenizer::parse_special`]).

use regex::Regex;
use winnow::ModalResult;
use winnow::ascii::digit1;
use winnow::combinator::{cut_err, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{one_of, take_till, take_while};

use crate::error::{Error, Position, Result};

/// Operators recognized by the generic rules, longest first.
const OPERATORS: &[&str] = &[
    ":=", "==", "!=", "<=", ">=", "<", ">", "=", "+", "-", "*", "/", "(", ")", ",", "^", "$",
    ":",
];

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Identifier,
    Keyword,
    Operator,
    String,
    Comment,
    EndOfInput,
    /// A character no rule accepts. Consumed so callers can report it.
    Unknown,
    /// A caller-registered class, by registration index.
    Special(usize),
}

/// One classified token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The raw source text of the token (quotes included for strings).
    pub text: String,
    pub kind: TokenKind,
    /// Index into the keyword list when `kind` is [`TokenKind::Keyword`].
    pub keyword_index: Option<usize>,
    /// Decoded contents of a string literal.
    pub value: Option<String>,
    /// Byte offset of the token start within the statement line.
    pub column: usize,
}

impl Token {
    fn end_of_input(column: usize) -> Self {
        Self {
            text: String::new(),
            kind: TokenKind::EndOfInput,
            keyword_index: None,
            value: None,
            column,
        }
    }

    /// True for the end of the statement, including a trailing comment.
    pub fn is_end(&self) -> bool {
        matches!(self.kind, TokenKind::EndOfInput | TokenKind::Comment)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

/// The statement currently being tokenized.
#[derive(Debug, Clone, Default)]
pub struct InputData {
    /// Raw statement text.
    pub text: String,
    /// Byte offset of the unconsumed remainder.
    pub offset: usize,
    /// Originating line number (1-based).
    pub line: usize,
    /// Originating script name.
    pub script: String,
}

impl InputData {
    pub fn remainder(&self) -> &str {
        &self.text[self.offset..]
    }
}

#[derive(Debug, Clone)]
struct Pending {
    token: Token,
    offset: usize,
}

/// A reusable tokenizer over one statement at a time.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    keywords: Vec<&'static str>,
    specials: Vec<Regex>,
    input: InputData,
    token: Token,
    pending: Option<Pending>,
}

impl Tokenizer {
    /// Create a tokenizer. `keywords` is sorted here so the binary search
    /// in [`Tokenizer::parse`] holds regardless of the caller's order.
    pub fn new(keywords: &[&'static str]) -> Self {
        let mut keywords = keywords.to_vec();
        keywords.sort_unstable();
        keywords.dedup();
        Self {
            keywords,
            specials: Vec::new(),
            input: InputData::default(),
            token: Token::end_of_input(0),
            pending: None,
        }
    }

    /// Register a special token class. The expression is anchored at the
    /// current input position. Returns the class index used in
    /// [`TokenKind::Special`].
    pub fn add_special(&mut self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| Error::internal(format!("invalid special token class: {}", e)))?;
        self.specials.push(regex);
        Ok(self.specials.len() - 1)
    }

    /// Replace the input with a new statement.
    pub fn set_input(&mut self, script: &str, line: usize, text: &str) {
        self.input = InputData {
            text: text.to_string(),
            offset: 0,
            line,
            script: script.to_string(),
        };
        self.token = Token::end_of_input(0);
        self.pending = None;
    }

    pub fn input(&self) -> &InputData {
        &self.input
    }

    /// The most recently parsed token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn keyword(&self, index: usize) -> Option<&'static str> {
        self.keywords.get(index).copied()
    }

    /// Index of `word` in the sorted keyword list.
    pub fn keyword_index(&self, word: &str) -> Option<usize> {
        self.keywords.binary_search(&word).ok()
    }

    /// Consume and classify one token using only the generic rules.
    pub fn parse(&mut self) -> Result<TokenKind> {
        self.next_token(false)
    }

    /// Consume and classify one token, trying the special classes first.
    pub fn parse_special(&mut self) -> Result<TokenKind> {
        self.next_token(true)
    }

    /// Peek at the next token (special classes included) without changing
    /// the current token. The peeked token is handed out by the next
    /// `parse` call.
    pub fn look_ahead(&mut self) -> Result<&Token> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => {
                let (token, offset) = self.scan(true)?;
                Pending { token, offset }
            }
        };
        Ok(&self.pending.insert(pending).token)
    }

    /// Consume everything up to the end of the line, trimmed. A buffered
    /// look-ahead token is included.
    pub fn rest_of_line(&mut self) -> String {
        let start = match self.pending.take() {
            Some(pending) => pending.token.column,
            None => self.input.offset,
        };
        let rest = self.input.text[start..].trim().to_string();
        self.input.offset = self.input.text.len();
        self.token = Token::end_of_input(self.input.offset);
        rest
    }

    /// Position of the current token, 1-based.
    pub fn position(&self) -> Position {
        self.position_at(self.token.column)
    }

    /// Position of an arbitrary byte offset of the statement, 1-based.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.input.text.len());
        let column = self.input.text[..offset].chars().count() + 1;
        Position::new(&self.input.script, self.input.line, column)
    }

    /// A parse error located at the current token.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message).at(self.position())
    }

    fn next_token(&mut self, special: bool) -> Result<TokenKind> {
        let (token, offset) = match self.pending.take() {
            Some(pending) => (pending.token, pending.offset),
            None => self.scan(special)?,
        };
        self.input.offset = offset;
        self.token = token;
        Ok(self.token.kind)
    }

    /// Classify the token at the current offset without consuming it.
    /// Returns the token and the offset just past it.
    fn scan(&self, special: bool) -> Result<(Token, usize)> {
        let rest = self.input.remainder();
        let trimmed = rest.trim_start();
        let start = self.input.offset + (rest.len() - trimmed.len());
        if trimmed.is_empty() {
            return Ok((Token::end_of_input(start), start));
        }

        if special {
            for (index, regex) in self.specials.iter().enumerate() {
                if let Some(m) = regex.find(trimmed).filter(|m| !m.is_empty()) {
                    let token = Token {
                        text: m.as_str().to_string(),
                        kind: TokenKind::Special(index),
                        keyword_index: None,
                        value: None,
                        column: start,
                    };
                    return Ok((token, start + m.end()));
                }
            }
        }

        let mut input = trimmed;
        let mut value = None;
        let mut keyword_index = None;
        let first = trimmed.chars().next().unwrap_or_default();
        let kind = match first {
            '#' => {
                input = "";
                TokenKind::Comment
            }
            '"' | '\'' => {
                let decoded = quoted_string(&mut input, first)
                    .map_err(|e| Error::parse(describe(&e)).at(self.position_at(start)))?;
                value = Some(decoded);
                TokenKind::String
            }
            c if c.is_ascii_digit() => {
                number
                    .parse_next(&mut input)
                    .map_err(|e| Error::parse(describe(&e)).at(self.position_at(start)))?;
                TokenKind::Number
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word = identifier
                    .parse_next(&mut input)
                    .map_err(|e| Error::parse(describe(&e)).at(self.position_at(start)))?;
                keyword_index = self.keyword_index(word);
                if keyword_index.is_some() {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                }
            }
            c => match OPERATORS.iter().find(|op| trimmed.starts_with(**op)) {
                Some(op) => {
                    input = &trimmed[op.len()..];
                    TokenKind::Operator
                }
                None => {
                    input = &trimmed[c.len_utf8()..];
                    TokenKind::Unknown
                }
            },
        };

        let consumed = trimmed.len() - input.len();
        let token = Token {
            text: trimmed[..consumed].to_string(),
            kind,
            keyword_index,
            value,
            column: start,
        };
        Ok((token, start + consumed))
    }
}

/// Turn a winnow failure into a readable message.
pub(crate) fn describe(err: &ErrMode<ContextError>) -> String {
    let ctx = match err {
        ErrMode::Backtrack(e) | ErrMode::Cut(e) => e.context().next().cloned(),
        ErrMode::Incomplete(_) => None,
    };
    match ctx {
        Some(StrContext::Label(label)) => format!("expected {}", label),
        Some(StrContext::Expected(StrContextValue::Description(desc))) => {
            format!("expected {}", desc)
        }
        Some(StrContext::Expected(value)) => format!("expected {}", value),
        _ => "unexpected character".to_string(),
    }
}

fn number<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (digit1, opt(('.', digit1))).take().parse_next(input)
}

fn identifier<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse a quoted string with escape sequences, delimited by `quote`.
/// Supports: \\ \n \r \t \" \' \0 \$ \xNN \uNNNN
fn quoted_string(input: &mut &str, mut quote: char) -> ModalResult<String> {
    quote.parse_next(input)?;
    let mut result = String::new();
    loop {
        let chunk: &str = take_till(0.., |c: char| c == '\\' || c == quote).parse_next(input)?;
        result.push_str(chunk);

        if input.starts_with(quote) {
            quote.parse_next(input)?;
            return Ok(result);
        } else if input.starts_with('\\') {
            '\\'.parse_next(input)?;
            let escaped = cut_err(escape_char)
                .context(StrContext::Expected(StrContextValue::Description(
                    "escape sequence",
                )))
                .parse_next(input)?;
            result.push(escaped);
        } else {
            return cut_err(quote)
                .context(StrContext::Expected(StrContextValue::Description(
                    "closing quote",
                )))
                .parse_next(input)
                .map(|_| result);
        }
    }
}

/// Parse the character after a backslash in an escape sequence.
pub(crate) fn escape_char(input: &mut &str) -> ModalResult<char> {
    let c = winnow::token::any.parse_next(input)?;
    match c {
        '\\' => Ok('\\'),
        '"' => Ok('"'),
        '\'' => Ok('\''),
        '$' => Ok('$'),
        'n' => Ok('\n'),
        'r' => Ok('\r'),
        't' => Ok('\t'),
        '0' => Ok('\0'),
        'x' => hex_escape(input, 2),
        'u' => hex_escape(input, 4),
        _ => cut_err(winnow::combinator::fail)
            .context(StrContext::Expected(StrContextValue::Description(
                "valid escape sequence (\\n, \\r, \\t, \\0, \\\\, \\\", \\', \\$, \\xNN, \\uNNNN)",
            )))
            .parse_next(input),
    }
}

/// Parse exactly `width` hex digits into a char.
fn hex_escape(input: &mut &str, width: usize) -> ModalResult<char> {
    let digits: &str = cut_err(winnow::token::take(width))
        .context(StrContext::Expected(StrContextValue::Description(
            "hex digits",
        )))
        .parse_next(input)?;
    let code = u32::from_str_radix(digits, 16).ok();
    match code.and_then(char::from_u32) {
        Some(c) => Ok(c),
        None => cut_err(winnow::combinator::fail)
            .context(StrContext::Expected(StrContextValue::Description(
                "valid hex digits",
            )))
            .parse_next(input),
    }
}
