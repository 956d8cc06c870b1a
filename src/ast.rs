//! Checked statement representation.
//!
//! The check pass turns every script line into a [`Statement`]; the run pass
//! executes those without re-parsing. Anything that depends on variables
//! (interpolated text, patterns containing `$(name)`) stays symbolic here
//! and is resolved at run time.

use crate::functions::Signature;
use crate::pattern::{PatternKind, SearchExpression};

/// Text with `$(name)` references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Variable(String),
}

impl Template {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![TemplatePart::Text(text.into())],
        }
    }

    pub fn has_variables(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, TemplatePart::Variable(_)))
    }

    /// The text when no variables are referenced.
    pub fn as_literal(&self) -> Option<String> {
        if self.has_variables() {
            return None;
        }
        Some(
            self.parts
                .iter()
                .map(|part| match part {
                    TemplatePart::Text(text) => text.as_str(),
                    TemplatePart::Variable(_) => "",
                })
                .collect(),
        )
    }
}

/// Which part of a buffer a buffer fragment yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSelector {
    /// All lines joined with `\n`.
    All,
    /// The cursor line.
    Line,
    /// The last hit.
    Hit,
    /// Text between mark and cursor.
    Mark,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferRef {
    pub name: String,
    pub selector: BufferSelector,
}

/// A pattern literal `{m|s|r}<d>body<d>flags`.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub kind: PatternKind,
    pub body: Template,
    pub flags: String,
    /// Compiled during the check pass when the body has no variables.
    pub compiled: Option<SearchExpression>,
}

/// One piece of a value.
#[derive(Debug, Clone)]
pub enum Fragment {
    Text(Template),
    Variable(String),
    Buffer(BufferRef),
    Call(FunctionCall),
}

/// Concatenated fragments.
#[derive(Debug, Clone, Default)]
pub struct Value {
    pub fragments: Vec<Fragment>,
}

impl Value {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// A checked call of a built-in function.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub signature: &'static Signature,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Buffer(String),
    Pattern(PatternSpec),
}

/// Operand of a numeric expression.
#[derive(Debug, Clone)]
pub enum Operand {
    Number(f64),
    Variable(String),
    Call(FunctionCall),
}

#[derive(Debug, Clone)]
pub struct Term {
    pub negative: bool,
    pub operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn is_additive(self) -> bool {
        matches!(self, ArithOp::Add | ArithOp::Sub)
    }
}

/// `first (op term)*`, evaluated left to right.
#[derive(Debug, Clone)]
pub struct NumExpr {
    pub first: Term,
    pub rest: Vec<(ArithOp, Term)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Condition {
    Compare {
        left: Value,
        op: CmpOp,
        right: Value,
    },
    /// The last search in the selected buffer succeeded.
    Found,
    /// Search the selected buffer, moving the cursor on success.
    Search(PatternSpec),
    /// True unless empty or `0`.
    Truthy(Value),
}

#[derive(Debug, Clone)]
pub struct Test {
    pub negated: bool,
    pub condition: Condition,
}

/// A region of the selected buffer.
#[derive(Debug, Clone)]
pub enum Range {
    All,
    Line,
    Lines(Operand),
    Mark,
    Hit,
}

#[derive(Debug, Clone)]
pub enum MoveTarget {
    Pattern(PatternSpec),
    Line {
        line: Operand,
        column: Option<Operand>,
    },
    By(Operand),
    BufferStart,
    BufferEnd,
    LineStart,
    LineEnd,
    Mark,
}

#[derive(Debug, Clone)]
pub enum Params {
    None,
    Buffer(String),
    Pairs(Vec<(String, Value)>),
}

#[derive(Debug, Clone)]
pub enum Selection {
    Set(String),
    Push(String),
    Pop,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Assign {
        name: String,
        append: bool,
        value: Value,
    },
    AssignBuffer {
        buffer: String,
        append: bool,
        value: Value,
    },
    AssignNumeric { name: String, expr: NumExpr },
    Adapt {
        pattern: PatternSpec,
        replacement: Value,
        anchor: Option<PatternSpec>,
        above: bool,
    },
    Assert(Test),
    Call { script: Value, params: Params },
    Copy {
        range: Range,
        target: String,
        append: bool,
    },
    Delete(Range),
    If(Test),
    Else,
    EndIf,
    While(Test),
    EndWhile,
    Leave {
        levels: usize,
        condition: Option<Test>,
    },
    Script(String),
    EndScript,
    Exit { global: bool, code: Option<Operand> },
    Stop { code: Option<Operand> },
    Insert { whole_lines: bool, value: Value },
    Load { buffer: Option<String>, file: Value },
    Store {
        buffer: Option<String>,
        file: Option<Value>,
        append: bool,
        force: bool,
    },
    Log(Template),
    Mark,
    Move(MoveTarget),
    Replace {
        pattern: PatternSpec,
        replacement: Value,
        count: Option<Operand>,
        filter: Option<PatternSpec>,
        range: Option<Range>,
    },
    Select(Selection),
}

/// A statement with its source location.
#[derive(Debug, Clone)]
pub struct Located {
    /// 1-based line number in the script file.
    pub line: usize,
    /// 1-based column of the first token.
    pub column: usize,
    /// Source text, for traces and assertion messages.
    pub text: String,
    pub statement: Statement,
}
