//! The check pass: every script line is parsed into a [`Statement`] and
//! block structure is resolved into a [`JumpTable`] before anything runs.

use std::collections::BTreeMap;

use crate::ast::{
    BufferSelector, CmpOp, Condition, Located, MoveTarget, Params, Range, Selection, Statement,
    Test,
};
use crate::buffer::is_intrinsic_name;
use crate::error::{Error, Position, Result};
use crate::grammar::{SearchParser, Special, buffer_ref, parse_template};
use crate::tokenizer::TokenKind;

const COMPARISONS: &[&str] = &["==", "!=", "<", "<=", ">", ">="];

/// Resolved jump targets, keyed by statement index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JumpTable {
    /// `if` to the statement after its `else` or `endif`.
    pub if_targets: BTreeMap<usize, usize>,
    /// Single-target boundaries: `else` to after `endif`, `while` to after
    /// `endwhile`, `endwhile` back to `while`, `leave` to after the last
    /// block it leaves, `script` to after `endscript`.
    pub block_targets: BTreeMap<usize, usize>,
}

/// A checked script. `statements[i]` is `None` for blank lines, comments and
/// the bodies of embedded scripts.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Option<Located>>,
    pub jumps: JumpTable,
}

impl Program {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// An embedded `script NAME` … `endscript` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedScript {
    pub name: String,
    /// Index of the first body line in the enclosing script.
    pub first_line: usize,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Else,
    While,
}

#[derive(Debug, Clone)]
struct Block {
    kind: BlockKind,
    /// Index of the `if` or `while` that opened the block.
    opener: usize,
    /// Index of the `else`, once seen.
    alternative: Option<usize>,
    position: Position,
}

/// Check `lines` of the script `name`. `line_offset` is added to reported
/// line numbers for scripts embedded in another file.
pub fn check(name: &str, lines: &[String], line_offset: usize) -> Result<Program> {
    Checker::new(name, line_offset)?.run(lines)
}

/// Locate the embedded scripts of a script source.
pub fn embedded_scripts(name: &str, lines: &[String]) -> Result<Vec<EmbeddedScript>> {
    let mut parser = SearchParser::new()?;
    let mut found = Vec::new();
    let mut open: Option<(String, usize)> = None;
    for (index, line) in lines.iter().enumerate() {
        parser.set_input(name, index + 1, line);
        let first = parser.next()?;
        if first.kind != TokenKind::Keyword {
            continue;
        }
        match (first.text.as_str(), &open) {
            ("script", None) => {
                let script = parser.expect_identifier("a script name")?;
                open = Some((script, index + 1));
            }
            ("script", Some(_)) => {
                return Err(parser.error("script blocks cannot be nested"));
            }
            ("endscript", Some(_)) => {
                if let Some((script, first_line)) = open.take() {
                    found.push(EmbeddedScript {
                        name: script,
                        first_line,
                        lines: lines[first_line..index].to_vec(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(found)
}

struct Checker {
    parser: SearchParser,
    name: String,
    line_offset: usize,
    blocks: Vec<Block>,
    /// `leave` statements waiting for the block at `depth` to close.
    leaves: Vec<(usize, usize)>,
    /// Index and position of an open `script` block.
    embedded: Option<(usize, Position)>,
    program: Program,
}

impl Checker {
    fn new(name: &str, line_offset: usize) -> Result<Self> {
        Ok(Self {
            parser: SearchParser::new()?,
            name: name.to_string(),
            line_offset,
            blocks: Vec::new(),
            leaves: Vec::new(),
            embedded: None,
            program: Program::default(),
        })
    }

    fn run(mut self, lines: &[String]) -> Result<Program> {
        for (index, line) in lines.iter().enumerate() {
            let line_number = self.line_offset + index + 1;
            self.parser.set_input(&self.name, line_number, line);
            let located = self.line(index, line_number)?;
            self.program.statements.push(located);
        }

        if let Some((_, position)) = self.embedded {
            return Err(Error::parse("script block is not closed by 'endscript'").at(position));
        }
        if let Some(block) = self.blocks.last() {
            let opener = match block.kind {
                BlockKind::If | BlockKind::Else => "if",
                BlockKind::While => "while",
            };
            return Err(
                Error::parse(format!("'{}' block is not closed", opener)).at(block.position.clone())
            );
        }
        log::debug!(
            "checked script '{}': {} statements",
            self.name,
            self.program.statements.iter().flatten().count()
        );
        Ok(self.program)
    }

    fn line(&mut self, index: usize, line_number: usize) -> Result<Option<Located>> {
        let first = self.parser.peek()?;
        if first.is_end() {
            return Ok(None);
        }
        let position = self.parser.tokenizer().position_at(first.column);

        // inside an embedded script only its end matters
        if self.embedded.is_some() {
            if first.kind == TokenKind::Keyword && first.text == "endscript" {
                self.parser.next()?;
                self.parser.expect_end()?;
                if let Some((opener, _)) = self.embedded.take() {
                    self.program.jumps.block_targets.insert(opener, index + 1);
                }
                return Ok(Some(self.located(line_number, position.column, Statement::EndScript)));
            }
            return Ok(None);
        }

        let statement = self
            .statement(index, &position)
            .map_err(|e| e.at(position.clone()))?;
        Ok(Some(self.located(line_number, position.column, statement)))
    }

    fn located(&self, line: usize, column: usize, statement: Statement) -> Located {
        Located {
            line,
            column,
            text: self.parser.tokenizer().input().text.trim().to_string(),
            statement,
        }
    }

    fn statement(&mut self, index: usize, position: &Position) -> Result<Statement> {
        let p = &mut self.parser;
        let first = p.next()?;

        match (p.special(&first), first.kind) {
            (Some(Special::Buffer), _) => {
                let target = buffer_ref(&first.text);
                if target.selector != BufferSelector::All {
                    return Err(p.error("a buffer selector cannot be assigned"));
                }
                let buffer = target.name;
                p.expect_operator("=")?;
                let append = p.accept_word("append")?;
                let value = p.value(&[])?;
                p.expect_end()?;
                return Ok(Statement::AssignBuffer {
                    buffer,
                    append,
                    value,
                });
            }
            (None, TokenKind::Identifier) => {
                let name = first.text;
                let numeric = p.accept_operator(":=")?;
                if !numeric && !p.accept_operator("=")? {
                    let next = p.peek()?;
                    return Err(p.error_at(&next, format!("unknown statement '{}'", name)));
                }
                if is_intrinsic_name(&name) {
                    return Err(Error::parse(format!("cannot assign to '{}'", name)));
                }
                if numeric {
                    let expr = p.num_expr()?;
                    p.expect_end()?;
                    return Ok(Statement::AssignNumeric { name, expr });
                }
                let append = p.accept_word("append")?;
                let value = p.value(&[])?;
                p.expect_end()?;
                return Ok(Statement::Assign {
                    name,
                    append,
                    value,
                });
            }
            (None, TokenKind::Keyword) => {}
            _ => {
                return Err(Error::parse(format!("unexpected '{}'", first.text)));
            }
        }

        let statement = match first.text.as_str() {
            "adapt" => {
                let pattern = p.expect_pattern()?;
                let replacement = p.value(&["anchor"])?;
                let (anchor, above) = if p.accept_word("anchor")? {
                    let anchor = p.expect_pattern()?;
                    (Some(anchor), p.accept_word("above")?)
                } else {
                    (None, false)
                };
                Statement::Adapt {
                    pattern,
                    replacement,
                    anchor,
                    above,
                }
            }
            "assert" => Statement::Assert(parse_test(p)?),
            "call" => {
                let script = p.expect_fragment("a script name")?;
                let params = match p.accept_buffer()? {
                    Some(buffer) => Params::Buffer(buffer.name),
                    None => {
                        let mut pairs = Vec::new();
                        while !p.at_end()? {
                            let name = p.expect_identifier("a parameter name")?;
                            p.expect_operator("=")?;
                            pairs.push((name, p.expect_fragment("a parameter value")?));
                        }
                        if pairs.is_empty() {
                            Params::None
                        } else {
                            Params::Pairs(pairs)
                        }
                    }
                };
                Statement::Call { script, params }
            }
            "copy" => {
                let range = range(p)?;
                let target = p.expect_buffer_name()?;
                let append = p.accept_word("append")?;
                Statement::Copy {
                    range,
                    target,
                    append,
                }
            }
            "delete" => Statement::Delete(range(p)?),
            "if" => {
                let test = parse_test(p)?;
                self.open(BlockKind::If, index, position);
                Statement::If(test)
            }
            "else" => {
                match self.blocks.last_mut() {
                    Some(block) if block.kind == BlockKind::If => {
                        block.kind = BlockKind::Else;
                        block.alternative = Some(index);
                        let opener = block.opener;
                        self.program.jumps.if_targets.insert(opener, index + 1);
                    }
                    _ => return Err(Error::parse("'else' without 'if'")),
                }
                Statement::Else
            }
            "endif" => {
                let block = self.close(&[BlockKind::If, BlockKind::Else], "endif", index)?;
                match block.alternative {
                    Some(alternative) => {
                        self.program.jumps.block_targets.insert(alternative, index + 1);
                    }
                    None => {
                        self.program.jumps.if_targets.insert(block.opener, index + 1);
                    }
                }
                Statement::EndIf
            }
            "while" => {
                let test = parse_test(p)?;
                self.open(BlockKind::While, index, position);
                Statement::While(test)
            }
            "endwhile" => {
                let block = self.close(&[BlockKind::While], "endwhile", index)?;
                self.program.jumps.block_targets.insert(block.opener, index + 1);
                self.program.jumps.block_targets.insert(index, block.opener);
                Statement::EndWhile
            }
            "leave" => {
                let levels = match p.peek()?.kind {
                    TokenKind::Number => {
                        let token = p.next()?;
                        token
                            .text
                            .parse::<usize>()
                            .map_err(|_| p.error("the number of levels must be a whole number"))?
                    }
                    _ => 1,
                };
                if levels == 0 || levels > self.blocks.len() {
                    return Err(Error::parse(format!(
                        "cannot leave {} block(s) from a depth of {}",
                        levels,
                        self.blocks.len()
                    )));
                }
                let condition = if p.accept_word("if")? {
                    Some(parse_test(p)?)
                } else {
                    None
                };
                self.leaves.push((index, self.blocks.len() - levels));
                Statement::Leave { levels, condition }
            }
            "script" => {
                let name = p.expect_identifier("a script name")?;
                if !self.blocks.is_empty() {
                    return Err(Error::parse("a script block must not be inside another block"));
                }
                self.embedded = Some((index, position.clone()));
                Statement::Script(name)
            }
            "endscript" => return Err(Error::parse("'endscript' without 'script'")),
            "exit" => {
                let global = p.accept_word("global")?;
                Statement::Exit {
                    global,
                    code: p.accept_operand()?,
                }
            }
            "stop" => Statement::Stop {
                code: p.accept_operand()?,
            },
            "insert" => {
                let whole_lines = p.accept_word("line")?;
                Statement::Insert {
                    whole_lines,
                    value: p.expect_value(&[], "text to insert")?,
                }
            }
            "load" => {
                let buffer = p.accept_buffer()?.map(|b| b.name);
                Statement::Load {
                    buffer,
                    file: p.expect_value(&[], "a file name")?,
                }
            }
            "store" => {
                let buffer = p.accept_buffer()?.map(|b| b.name);
                let file = p.value(&["append", "force"])?;
                let mut append = false;
                let mut force = false;
                loop {
                    if p.accept_word("append")? {
                        append = true;
                    } else if p.accept_word("force")? {
                        force = true;
                    } else {
                        break;
                    }
                }
                Statement::Store {
                    buffer,
                    file: (!file.is_empty()).then_some(file),
                    append,
                    force,
                }
            }
            "log" => {
                let raw = p.rest_of_line();
                Statement::Log(parse_template(strip_comment(&raw), false).map_err(Error::parse)?)
            }
            "mark" => Statement::Mark,
            "move" => Statement::Move(move_target(p)?),
            "replace" => {
                let pattern = p.expect_pattern()?;
                let replacement = p.value(&["count", "filter", "in"])?;
                let (mut count, mut filter, mut range_) = (None, None, None);
                loop {
                    if count.is_none() && p.accept_word("count")? {
                        count = Some(p.operand()?);
                    } else if filter.is_none() && p.accept_word("filter")? {
                        filter = Some(p.expect_pattern()?);
                    } else if range_.is_none() && p.accept_word("in")? {
                        range_ = Some(range(p)?);
                    } else {
                        break;
                    }
                }
                Statement::Replace {
                    pattern,
                    replacement,
                    count,
                    filter,
                    range: range_,
                }
            }
            "select" => {
                if p.accept_word("push")? {
                    Statement::Select(Selection::Push(p.expect_buffer_name()?))
                } else if p.accept_word("pop")? {
                    Statement::Select(Selection::Pop)
                } else {
                    Statement::Select(Selection::Set(p.expect_buffer_name()?))
                }
            }
            other => return Err(Error::internal(format!("no handler for keyword '{}'", other))),
        };
        self.parser.expect_end()?;
        Ok(statement)
    }

    fn open(&mut self, kind: BlockKind, index: usize, position: &Position) {
        self.blocks.push(Block {
            kind,
            opener: index,
            alternative: None,
            position: position.clone(),
        });
    }

    /// Pop the innermost block, which must be one of `kinds`, and resolve the
    /// `leave` statements that end at it.
    fn close(&mut self, kinds: &[BlockKind], closer: &str, index: usize) -> Result<Block> {
        match self.blocks.last() {
            Some(block) if kinds.contains(&block.kind) => {}
            _ => {
                let opener = if kinds.contains(&BlockKind::While) {
                    "while"
                } else {
                    "if"
                };
                return Err(Error::parse(format!("'{}' without '{}'", closer, opener)));
            }
        }
        let depth = self.blocks.len() - 1;
        let jumps = &mut self.program.jumps.block_targets;
        self.leaves.retain(|&(leave, target_depth)| {
            if target_depth == depth {
                jumps.insert(leave, index + 1);
                false
            } else {
                true
            }
        });
        self.blocks
            .pop()
            .ok_or_else(|| Error::internal("block stack is empty"))
    }
}

/// `[not] (found | search PATTERN | value [CMP value])`
fn parse_test(p: &mut SearchParser) -> Result<Test> {
    let negated = p.accept_word("not")?;
    let condition = if p.accept_word("found")? {
        Condition::Found
    } else if p.accept_word("search")? {
        Condition::Search(p.expect_pattern()?)
    } else {
        let left = p.expect_value(COMPARISONS, "a condition")?;
        let token = p.peek()?;
        match CmpOp::from_operator(&token.text).filter(|_| token.kind == TokenKind::Operator) {
            Some(op) => {
                p.next()?;
                let right = p.expect_value(&[], "a value to compare with")?;
                Condition::Compare { left, op, right }
            }
            None => Condition::Truthy(left),
        }
    };
    Ok(Test { negated, condition })
}

fn range(p: &mut SearchParser) -> Result<Range> {
    let token = p.next()?;
    let range = match (token.kind, token.text.as_str()) {
        (TokenKind::Identifier, "all") => Range::All,
        (TokenKind::Identifier, "line") => Range::Line,
        (TokenKind::Identifier, "lines") => Range::Lines(p.operand()?),
        (TokenKind::Keyword, "mark") => Range::Mark,
        (TokenKind::Identifier, "hit") => Range::Hit,
        _ => {
            return Err(p.error(format!(
                "expected a range (all, line, lines N, mark, hit), found '{}'",
                token.text
            )));
        }
    };
    Ok(range)
}

fn move_target(p: &mut SearchParser) -> Result<MoveTarget> {
    if let Some(pattern) = p.accept_pattern()? {
        return Ok(MoveTarget::Pattern(pattern));
    }
    if p.accept_word("line")? {
        let line = p.operand()?;
        let column = p.accept_operand()?;
        return Ok(MoveTarget::Line { line, column });
    }
    if p.accept_word("by")? {
        return Ok(MoveTarget::By(p.operand()?));
    }
    if p.accept_word("mark")? {
        return Ok(MoveTarget::Mark);
    }
    let token = p.next()?;
    match token.text.as_str() {
        "<" if token.kind == TokenKind::Operator => Ok(MoveTarget::BufferStart),
        ">" if token.kind == TokenKind::Operator => Ok(MoveTarget::BufferEnd),
        "^" if token.kind == TokenKind::Operator => Ok(MoveTarget::LineStart),
        "$" if token.kind == TokenKind::Operator => Ok(MoveTarget::LineEnd),
        _ => Err(p.error(format!(
            "expected a move target (pattern, line N, by N, <, >, ^, $, mark), found '{}'",
            token.text
        ))),
    }
}

/// `text` up to a trailing `# comment`.
///
/// Like a comment token, `#` only starts a comment at the beginning of a
/// word. Quoted text is skipped.
fn strip_comment(text: &str) -> &str {
    let mut quote = None;
    let mut escaped = false;
    let mut word_start = true;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if let Some(q) = quote {
            if c == q {
                quote = None;
            }
        } else if word_start && (c == '"' || c == '\'') {
            quote = Some(c);
        } else if word_start && c == '#' {
            return text[..i].trim_end();
        }
        word_start = c.is_whitespace();
    }
    text
}
