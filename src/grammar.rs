//! Script-language token grammar on top of the generic [`Tokenizer`].
//!
//! [`SearchParser`] registers the language's special token classes (pattern
//! literals, variable references, buffer references and built-in function
//! names) and assembles tokens into values, patterns, operands and function
//! calls. Statement structure lives in [`crate::parser`].

use std::mem;

use winnow::ModalResult;
use winnow::combinator::{cut_err, delimited, opt};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_while};

use crate::ast::{
    Arg, ArithOp, BufferRef, BufferSelector, Fragment, FunctionCall, NumExpr, Operand,
    PatternSpec, Template, TemplatePart, Term, Value,
};
use crate::error::{Error, Result};
use crate::functions::{FunctionEngine, ParamKind, ReturnType};
use crate::pattern::{PatternKind, SearchExpression};
use crate::tokenizer::{Token, TokenKind, Tokenizer, describe, escape_char};

/// Statement keywords.
pub const KEYWORDS: &[&str] = &[
    "adapt",
    "assert",
    "call",
    "copy",
    "delete",
    "else",
    "endif",
    "endscript",
    "endwhile",
    "exit",
    "if",
    "insert",
    "leave",
    "load",
    "log",
    "mark",
    "move",
    "replace",
    "script",
    "select",
    "stop",
    "store",
    "while",
];

const PATTERN_CLASS: &str =
    r"[msr](?:/(?:[^/\\]|\\.)*/|\|(?:[^|\\]|\\.)*\||%(?:[^%\\]|\\.)*%)[iLBM^$<>]*";
const VARIABLE_CLASS: &str = r"\$\(_{0,2}[A-Za-z][A-Za-z0-9_]*\)";
const BUFFER_CLASS: &str = r"~_?[A-Za-z][A-Za-z0-9_]*(?::(?:line|hit|mark|all)\b)?";

/// The language-specific token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    Pattern,
    Variable,
    Buffer,
    Function,
}

/// Tokenizer plus the script-language grammar.
#[derive(Debug, Clone)]
pub struct SearchParser {
    tokenizer: Tokenizer,
    classes: Vec<Special>,
}

impl SearchParser {
    pub fn new() -> Result<Self> {
        let mut tokenizer = Tokenizer::new(KEYWORDS);
        let mut classes = Vec::new();
        for (special, pattern) in [
            (Special::Pattern, PATTERN_CLASS.to_string()),
            (Special::Variable, VARIABLE_CLASS.to_string()),
            (Special::Buffer, BUFFER_CLASS.to_string()),
            (Special::Function, FunctionEngine::name_pattern()),
        ] {
            let index = tokenizer.add_special(&pattern)?;
            debug_assert_eq!(index, classes.len());
            classes.push(special);
        }
        Ok(Self { tokenizer, classes })
    }

    pub fn set_input(&mut self, script: &str, line: usize, text: &str) {
        self.tokenizer.set_input(script, line, text);
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// A parse error at the current token.
    pub fn error(&self, message: impl Into<String>) -> Error {
        self.tokenizer.error(message)
    }

    /// A parse error at `token`.
    pub fn error_at(&self, token: &Token, message: impl Into<String>) -> Error {
        Error::parse(message).at(self.tokenizer.position_at(token.column))
    }

    pub fn special(&self, token: &Token) -> Option<Special> {
        match token.kind {
            TokenKind::Special(index) => self.classes.get(index).copied(),
            _ => None,
        }
    }

    /// Consume the next token.
    pub fn next(&mut self) -> Result<Token> {
        self.tokenizer.parse_special()?;
        Ok(self.tokenizer.token().clone())
    }

    pub fn peek(&mut self) -> Result<Token> {
        self.tokenizer.look_ahead().cloned()
    }

    /// The unparsed remainder of the statement, trimmed.
    pub fn rest_of_line(&mut self) -> String {
        self.tokenizer.rest_of_line()
    }

    pub fn at_end(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_end())
    }

    /// Consume `word` (identifier or keyword) if it comes next.
    pub fn accept_word(&mut self, word: &str) -> Result<bool> {
        let token = self.peek()?;
        let matches = matches!(token.kind, TokenKind::Identifier | TokenKind::Keyword)
            && token.text == word;
        if matches {
            self.next()?;
        }
        Ok(matches)
    }

    pub fn accept_operator(&mut self, op: &str) -> Result<bool> {
        let matches = self.peek()?.is_operator(op);
        if matches {
            self.next()?;
        }
        Ok(matches)
    }

    pub fn expect_operator(&mut self, op: &str) -> Result<()> {
        let token = self.next()?;
        if token.is_operator(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found {}", op, found(&token))))
        }
    }

    /// The statement must be complete.
    pub fn expect_end(&mut self) -> Result<()> {
        let token = self.next()?;
        if token.is_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected {}", found(&token))))
        }
    }

    pub fn expect_identifier(&mut self, what: &str) -> Result<String> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Identifier => Ok(token.text),
            _ => Err(self.error(format!("expected {}, found {}", what, found(&token)))),
        }
    }

    pub fn expect_buffer(&mut self) -> Result<BufferRef> {
        let token = self.next()?;
        if self.special(&token) != Some(Special::Buffer) {
            return Err(self.error(format!("expected a buffer, found {}", found(&token))));
        }
        Ok(buffer_ref(&token.text))
    }

    /// Consume a buffer reference if one comes next.
    pub fn accept_buffer(&mut self) -> Result<Option<BufferRef>> {
        let token = self.peek()?;
        if self.special(&token) == Some(Special::Buffer) {
            self.next()?;
            return Ok(Some(buffer_ref(&token.text)));
        }
        Ok(None)
    }

    /// A plain buffer name: selectors are not allowed.
    pub fn expect_buffer_name(&mut self) -> Result<String> {
        let buffer = self.expect_buffer()?;
        if buffer.selector != BufferSelector::All {
            return Err(self.error("a buffer selector is not allowed here"));
        }
        Ok(buffer.name)
    }

    pub fn expect_pattern(&mut self) -> Result<PatternSpec> {
        let token = self.next()?;
        if self.special(&token) != Some(Special::Pattern) {
            return Err(self.error(format!("expected a pattern, found {}", found(&token))));
        }
        self.pattern_spec(&token)
    }

    pub fn accept_pattern(&mut self) -> Result<Option<PatternSpec>> {
        let token = self.peek()?;
        if self.special(&token) == Some(Special::Pattern) {
            self.next()?;
            return self.pattern_spec(&token).map(Some);
        }
        Ok(None)
    }

    /// Split a pattern literal into kind, body and flags and compile it
    /// when the body is constant.
    fn pattern_spec(&self, token: &Token) -> Result<PatternSpec> {
        let text = token.text.as_str();
        let mut chars = text.chars();
        let kind = chars
            .next()
            .and_then(PatternKind::from_prefix)
            .ok_or_else(|| Error::internal("malformed pattern token"))?;
        let delim = chars
            .next()
            .ok_or_else(|| Error::internal("malformed pattern token"))?;
        let body_start = 2;
        let mut body_end = body_start;
        let mut escaped = false;
        for (offset, c) in text[body_start..].char_indices() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == delim {
                body_end = body_start + offset;
                break;
            }
        }
        let raw = &text[body_start..body_end];
        let flags = text[body_end + delim.len_utf8()..].to_string();

        // `\|` stays escaped in a regex, where `|` is an operator
        let delimiter_escape = format!("\\{}", delim);
        let raw = if kind == PatternKind::Regex && delim == '|' {
            raw.to_string()
        } else {
            raw.replace(&delimiter_escape, &delim.to_string())
        };
        let body = parse_template(&raw, false).map_err(|e| self.error_at(token, e))?;

        let compiled = match body.as_literal() {
            Some(literal) => Some(
                SearchExpression::new(&literal, kind, &flags)
                    .map_err(|e| self.error_at(token, e.message))?,
            ),
            None => {
                SearchExpression::new("", kind, &flags)
                    .map_err(|e| self.error_at(token, e.message))?;
                None
            }
        };
        Ok(PatternSpec {
            kind,
            body,
            flags,
            compiled,
        })
    }

    /// Parse fragments up to the end of the statement or a word or operator
    /// listed in `stops`. Whitespace between fragments is kept.
    pub fn value(&mut self, stops: &[&str]) -> Result<Value> {
        let mut fragments = Vec::new();
        let mut end = None;
        loop {
            let token = self.peek()?;
            let stop = match token.kind {
                TokenKind::EndOfInput | TokenKind::Comment => true,
                TokenKind::Identifier | TokenKind::Keyword | TokenKind::Operator => {
                    stops.contains(&token.text.as_str())
                }
                _ => false,
            };
            if stop {
                break;
            }
            if let Some(end) = end {
                let gap = &self.tokenizer.input().text[end..token.column];
                if !gap.is_empty() {
                    fragments.push(Fragment::Text(Template::literal(gap)));
                }
            }
            self.next()?;
            fragments.push(self.fragment(&token)?);
            end = Some(self.tokenizer.input().offset);
        }
        Ok(Value { fragments })
    }

    /// Like [`SearchParser::value`], but at least one fragment is required.
    pub fn expect_value(&mut self, stops: &[&str], what: &str) -> Result<Value> {
        let value = self.value(stops)?;
        if value.is_empty() {
            let token = self.peek()?;
            return Err(self.error_at(
                &token,
                format!("expected {}, found {}", what, found(&token)),
            ));
        }
        Ok(value)
    }

    /// Exactly one fragment, as a value.
    pub fn expect_fragment(&mut self, what: &str) -> Result<Value> {
        let token = self.next()?;
        if token.is_end() {
            return Err(self.error(format!("expected {}, found {}", what, found(&token))));
        }
        let fragment = self.fragment(&token)?;
        Ok(Value {
            fragments: vec![fragment],
        })
    }

    /// Turn a consumed token into a value fragment.
    fn fragment(&mut self, token: &Token) -> Result<Fragment> {
        match self.special(token) {
            Some(Special::Variable) => Ok(Fragment::Variable(variable_name(&token.text))),
            Some(Special::Buffer) => Ok(Fragment::Buffer(buffer_ref(&token.text))),
            Some(Special::Function) => self.function_call(token).map(Fragment::Call),
            Some(Special::Pattern) => Err(self.error_at(token, "a pattern is not a value")),
            None => match token.kind {
                TokenKind::String if token.text.starts_with('"') => {
                    let inner = &token.text[1..token.text.len() - 1];
                    parse_template(inner, true)
                        .map(Fragment::Text)
                        .map_err(|e| self.error_at(token, e))
                }
                TokenKind::String => Ok(Fragment::Text(Template::literal(
                    token.value.clone().unwrap_or_default(),
                ))),
                _ => Ok(Fragment::Text(Template::literal(token.text.clone()))),
            },
        }
    }

    /// Parse the argument list of the function named by `name`, which has
    /// just been consumed.
    pub fn function_call(&mut self, name: &Token) -> Result<FunctionCall> {
        let signature = FunctionEngine::lookup(&name.text)?;
        self.expect_operator("(")?;
        let mut args = Vec::new();
        if !self.accept_operator(")")? {
            loop {
                let kind = signature.params.get(args.len()).copied().ok_or_else(|| {
                    self.error_at(
                        name,
                        format!(
                            "{} takes at most {} argument(s)",
                            signature.name,
                            signature.params.len()
                        ),
                    )
                })?;
                let arg = match kind {
                    ParamKind::Buffer => Arg::Buffer(self.expect_buffer_name()?),
                    ParamKind::Pattern => match self.accept_pattern()? {
                        Some(spec) => Arg::Pattern(spec),
                        None => Arg::Value(self.expect_value(&[",", ")"], "an argument")?),
                    },
                    ParamKind::Text => Arg::Value(self.expect_value(&[",", ")"], "an argument")?),
                };
                args.push(arg);
                if self.accept_operator(")")? {
                    break;
                }
                self.expect_operator(",")?;
            }
        }
        FunctionEngine::check_call(signature, &args).map_err(|e| self.error_at(name, e.message))?;
        Ok(FunctionCall { signature, args })
    }

    /// A numeric operand: a number (optionally negative), a variable name,
    /// `$(name)` or a numeric function call.
    pub fn operand(&mut self) -> Result<Operand> {
        let negative = self.accept_operator("-")?;
        let token = self.next()?;
        match (self.special(&token), token.kind) {
            (_, TokenKind::Number) => {
                let n: f64 = token
                    .text
                    .parse()
                    .map_err(|_| self.error(format!("invalid number '{}'", token.text)))?;
                Ok(Operand::Number(if negative { -n } else { n }))
            }
            _ if negative => Err(self.error("expected a number after '-'")),
            (Some(Special::Variable), _) => Ok(Operand::Variable(variable_name(&token.text))),
            (Some(Special::Function), _) => {
                let call = self.function_call(&token)?;
                if call.signature.returns != ReturnType::Numeric {
                    return Err(self.error_at(
                        &token,
                        format!("{} does not return a number", call.signature.name),
                    ));
                }
                Ok(Operand::Call(call))
            }
            (None, TokenKind::Identifier) => Ok(Operand::Variable(token.text)),
            _ => Err(self.error(format!("expected a number, found {}", found(&token)))),
        }
    }

    pub fn accept_operand(&mut self) -> Result<Option<Operand>> {
        if self.at_end()? {
            return Ok(None);
        }
        self.operand().map(Some)
    }

    /// `[-]operand (op [-]operand)*` with a single precedence level.
    pub fn num_expr(&mut self) -> Result<NumExpr> {
        let first = self.term()?;
        let mut rest: Vec<(ArithOp, Term)> = Vec::new();
        loop {
            let token = self.peek()?;
            let op = match token.text.as_str() {
                _ if token.kind != TokenKind::Operator => break,
                "+" => ArithOp::Add,
                "-" => ArithOp::Sub,
                "*" => ArithOp::Mul,
                "/" => ArithOp::Div,
                _ => break,
            };
            self.next()?;
            if rest
                .first()
                .is_some_and(|(previous, _)| previous.is_additive() != op.is_additive())
            {
                return Err(self.error("cannot mix '+'/'-' with '*'/'/' in one expression"));
            }
            rest.push((op, self.term()?));
        }
        Ok(NumExpr { first, rest })
    }

    fn term(&mut self) -> Result<Term> {
        let negative = self.accept_operator("-")?;
        let operand = self.operand()?;
        Ok(Term { negative, operand })
    }
}

fn found(token: &Token) -> String {
    match token.kind {
        TokenKind::EndOfInput | TokenKind::Comment => "end of statement".to_string(),
        _ => format!("'{}'", token.text),
    }
}

/// `$(name)` to `name`.
fn variable_name(text: &str) -> String {
    text[2..text.len() - 1].to_string()
}

/// `~name[:selector]` to a [`BufferRef`].
pub(crate) fn buffer_ref(text: &str) -> BufferRef {
    let text = &text[1..];
    let (name, selector) = match text.split_once(':') {
        Some((name, "line")) => (name, BufferSelector::Line),
        Some((name, "hit")) => (name, BufferSelector::Hit),
        Some((name, "mark")) => (name, BufferSelector::Mark),
        Some((name, _)) => (name, BufferSelector::All),
        None => (text, BufferSelector::All),
    };
    BufferRef {
        name: name.to_string(),
        selector,
    }
}

/// Split raw text into literal runs and `$(name)` references, decoding
/// backslash escapes when `escapes` is set.
pub fn parse_template(raw: &str, escapes: bool) -> std::result::Result<Template, String> {
    let mut input = raw;
    template(&mut input, escapes).map_err(|e| describe(&e))
}

fn template(input: &mut &str, escapes: bool) -> ModalResult<Template> {
    let mut parts = Vec::new();
    let mut text = String::new();
    while !input.is_empty() {
        if let Some(name) = opt(variable_reference).parse_next(input)? {
            if !text.is_empty() {
                parts.push(TemplatePart::Text(mem::take(&mut text)));
            }
            parts.push(TemplatePart::Variable(name.to_string()));
        } else if escapes && input.starts_with('\\') {
            '\\'.parse_next(input)?;
            let c = cut_err(escape_char)
                .context(StrContext::Expected(StrContextValue::Description(
                    "escape sequence",
                )))
                .parse_next(input)?;
            text.push(c);
        } else {
            text.push(any.parse_next(input)?);
            let chunk: &str =
                take_till(0.., |c: char| c == '$' || (escapes && c == '\\')).parse_next(input)?;
            text.push_str(chunk);
        }
    }
    if !text.is_empty() || parts.is_empty() {
        parts.push(TemplatePart::Text(text));
    }
    Ok(Template { parts })
}

fn variable_reference<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    delimited(
        "$(",
        (
            take_while(0..=2, '_'),
            one_of(|c: char| c.is_ascii_alphabetic()),
            take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
        )
            .take(),
        ')',
    )
    .parse_next(input)
}
