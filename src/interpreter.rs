//! Scripts and the run pass.
//!
//! A [`Script`] is checked once into a [`Program`] and then executed
//! statement by statement. Everything the script cannot own itself (global
//! variables and buffers, other scripts, logging) is reached through the
//! [`ScriptHost`] it runs in.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::Level;

use crate::ast::{
    ArithOp, BufferSelector, CmpOp, Condition, Fragment, Located, MoveTarget, NumExpr, Operand,
    Params, PatternSpec, Range, Selection, Statement, Template, TemplatePart, Test, Value,
};
use crate::buffer::{BufferRegistry, Buffers, MAIN_BUFFER, is_global_name, is_intrinsic_name};
use crate::config::EngineConfig;
use crate::error::{Error, Position, Result};
use crate::functions::{FunctionContext, FunctionEngine, format_number};
use crate::line_list::{BACKREFERENCE, LineList, ReplaceOptions};
use crate::logger::TraceEvent;
use crate::parser::{self, Program};
use crate::pattern::SearchExpression;
use crate::position::BufferPosition;

/// How a script run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to the end or left through a local `exit`.
    Finished(i32),
    /// `exit global` or `stop`: the whole run ends.
    Aborted(i32),
}

impl Outcome {
    pub fn code(self) -> i32 {
        match self {
            Outcome::Finished(code) | Outcome::Aborted(code) => code,
        }
    }
}

/// Where a `call` statement was executed.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub script: &'a str,
    pub line: usize,
    /// Directory of the calling script's file, if it has one.
    pub dir: Option<&'a Path>,
}

/// Services a running script needs from its environment.
pub trait ScriptHost: BufferRegistry {
    fn global(&self, name: &str) -> Option<String>;

    fn set_global(&mut self, name: &str, value: String) -> Result<()>;

    /// Run another script to completion.
    fn call_script(
        &mut self,
        site: &CallSite<'_>,
        name: &str,
        params: Vec<(String, String)>,
    ) -> Result<Outcome>;

    fn log(&mut self, level: Level, message: &str);

    fn trace(&mut self, event: &TraceEvent);

    fn dir_stack(&mut self) -> &mut Vec<PathBuf>;

    fn config(&self) -> &EngineConfig;
}

/// Result of one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Jump(usize),
    Return(i32),
    Exit(i32),
}

/// Per-script mutable state.
#[derive(Debug, Clone)]
struct State {
    locals: HashMap<String, String>,
    buffers: Buffers,
    /// Selected buffer stack; the last entry is current.
    selected: Vec<String>,
    last_replaced: usize,
    pc: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            locals: HashMap::new(),
            buffers: Buffers::new(),
            selected: vec![MAIN_BUFFER.to_string()],
            last_replaced: 0,
            pc: 0,
        }
    }
}

/// A named script with its own variables and buffers.
#[derive(Debug, Clone)]
pub struct Script {
    name: String,
    lines: Vec<String>,
    line_offset: usize,
    path: Option<PathBuf>,
    program: Option<Program>,
    state: State,
}

impl Script {
    pub fn new(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            name: name.into(),
            lines,
            line_offset: 0,
            path: None,
            program: None,
            state: State::default(),
        }
    }

    /// Source lines start at `offset + 1` in the file they came from.
    pub fn with_line_offset(mut self, offset: usize) -> Self {
        self.line_offset = offset;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_checked(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Index of the statement being executed (or next to execute).
    pub fn pc(&self) -> usize {
        self.state.pc
    }

    /// Parse and validate every statement. Nothing is executed; running it
    /// again rebuilds the same program.
    pub fn check(&mut self) -> Result<&Program> {
        let program = parser::check(&self.name, &self.lines, self.line_offset)?;
        Ok(self.program.insert(program))
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.state.locals.insert(name.into(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.state.locals.get(name).map(String::as_str)
    }

    /// A local buffer, if it was referenced.
    pub fn buffer(&self, name: &str) -> Option<&LineList> {
        self.state.buffers.buffer(name).map(|b| b.list())
    }

    /// Run from the first statement. Checks first if that has not happened.
    pub fn run(&mut self, host: &mut dyn ScriptHost) -> Result<Outcome> {
        if self.program.is_none() {
            self.check()?;
        }
        let program = self
            .program
            .take()
            .ok_or_else(|| Error::internal("script has no program"))?;
        self.state.selected = vec![MAIN_BUFFER.to_string()];
        self.state.pc = 0;
        log::debug!("running script '{}'", self.name);
        let dir = self.path.as_deref().and_then(Path::parent);
        let mut exec = Exec {
            name: &self.name,
            dir,
            state: &mut self.state,
            host,
            loops: HashMap::new(),
        };
        let result = exec.run(&program);
        self.program = Some(program);
        result
    }
}

/// The run pass over one script.
struct Exec<'a> {
    name: &'a str,
    dir: Option<&'a Path>,
    state: &'a mut State,
    host: &'a mut dyn ScriptHost,
    /// Iterations of each active `while`, by statement index.
    loops: HashMap<usize, usize>,
}

impl Exec<'_> {
    fn run(&mut self, program: &Program) -> Result<Outcome> {
        while let Some(slot) = program.statements.get(self.state.pc) {
            let Some(located) = slot else {
                self.state.pc += 1;
                continue;
            };
            self.host.trace(&TraceEvent {
                script: self.name.to_string(),
                line: located.line,
                statement: located.text.clone(),
            });
            let flow = self
                .statement(program, located)
                .map_err(|e| e.at(Position::new(self.name, located.line, located.column)))?;
            match flow {
                Flow::Continue => self.state.pc += 1,
                Flow::Jump(target) => self.state.pc = target,
                Flow::Return(code) => return Ok(Outcome::Finished(code)),
                Flow::Exit(code) => return Ok(Outcome::Aborted(code)),
            }
        }
        Ok(Outcome::Finished(0))
    }

    fn statement(&mut self, program: &Program, located: &Located) -> Result<Flow> {
        let index = self.state.pc;
        let jumps = &program.jumps;
        match &located.statement {
            Statement::Assign {
                name,
                append,
                value,
            } => {
                let mut text = self.value(value)?;
                if *append {
                    let mut existing = self.lookup(name).unwrap_or_default();
                    existing.push_str(&text);
                    text = existing;
                }
                self.set_variable(name, text)?;
            }
            Statement::AssignBuffer {
                buffer,
                append,
                value,
            } => {
                let text = self.value(value)?;
                let lines: Vec<String> = text.split('\n').map(String::from).collect();
                let list = self.buffer(buffer);
                if *append {
                    list.append_lines(lines);
                } else {
                    list.set_lines(lines);
                }
            }
            Statement::AssignNumeric { name, expr } => {
                let n = self.num_expr(expr)?;
                self.set_variable(name, format_number(n))?;
            }
            Statement::Adapt {
                pattern,
                replacement,
                anchor,
                above,
            } => {
                let pattern = self.pattern(pattern)?;
                let anchor = anchor.as_ref().map(|a| self.pattern(a)).transpose()?;
                let replacement = self.value(replacement)?;
                let change = self
                    .selected()
                    .adapt(&pattern, &replacement, anchor.as_ref(), *above);
                log::debug!("adapt: {:?}", change);
            }
            Statement::Assert(test) => {
                if !self.test(test)? {
                    return Err(Error::runtime(format!("assertion failed: {}", located.text)));
                }
            }
            Statement::Call { script, params } => return self.call(located, script, params),
            Statement::Copy {
                range,
                target: destination,
                append,
            } => {
                let (start, end) = self.range(range)?;
                let source = self.selected();
                let mut lines = source.copy_range(start, end, true);
                if is_whole_lines(range) && end.column == 0 && end.line < source.len() {
                    lines.pop();
                }
                let destination = self.buffer(destination);
                if *append {
                    destination.append_lines(lines);
                } else {
                    destination.set_lines(lines);
                }
            }
            Statement::Delete(range) => {
                let (start, end) = self.range(range)?;
                let list = self.selected();
                list.delete_range(start, end);
                list.set_cursor(start);
            }
            Statement::If(test) => {
                if !self.test(test)? {
                    return target(&jumps.if_targets, index).map(Flow::Jump);
                }
            }
            Statement::Else => return target(&jumps.block_targets, index).map(Flow::Jump),
            Statement::EndIf | Statement::EndScript => {}
            Statement::While(test) => {
                if self.test(test)? {
                    let count = self.loops.entry(index).or_default();
                    *count += 1;
                    if let Some(max) = self.host.config().max_loop_iterations {
                        if *count > max {
                            return Err(Error::runtime(format!(
                                "loop exceeded {} iterations",
                                max
                            )));
                        }
                    }
                } else {
                    self.loops.remove(&index);
                    return target(&jumps.block_targets, index).map(Flow::Jump);
                }
            }
            Statement::EndWhile => return target(&jumps.block_targets, index).map(Flow::Jump),
            Statement::Leave { condition, .. } => {
                let leave = match condition {
                    Some(test) => self.test(test)?,
                    None => true,
                };
                if leave {
                    let to = target(&jumps.block_targets, index)?;
                    let ends = &jumps.block_targets;
                    self.loops.retain(|start, _| {
                        !(*start < index && ends.get(start).is_some_and(|&end| end <= to))
                    });
                    return Ok(Flow::Jump(to));
                }
            }
            Statement::Script(_) => return target(&jumps.block_targets, index).map(Flow::Jump),
            Statement::Exit { global, code } => {
                let code = self.exit_code(code.as_ref(), 0)?;
                return Ok(if *global {
                    Flow::Exit(code)
                } else {
                    Flow::Return(code)
                });
            }
            Statement::Stop { code } => return Ok(Flow::Exit(self.exit_code(code.as_ref(), 1)?)),
            Statement::Insert { whole_lines, value } => {
                let text = self.value(value)?;
                let lines: Vec<String> = text.split('\n').map(String::from).collect();
                let list = self.selected();
                let end = if *whole_lines {
                    let at = BufferPosition::new(list.cursor().line, 0);
                    list.insert(at, &lines, true)
                } else {
                    list.insert(list.cursor(), &lines, false)
                };
                list.set_cursor(end);
            }
            Statement::Load { buffer, file } => {
                let path = PathBuf::from(self.value(file)?);
                let list = self.target_buffer(buffer.as_deref());
                list.read_from_file(&path)?;
                log::info!("loaded {} lines from {}", list.len(), path.display());
            }
            Statement::Store {
                buffer,
                file,
                append,
                force,
            } => {
                let path = file
                    .as_ref()
                    .map(|f| self.value(f))
                    .transpose()?
                    .map(PathBuf::from);
                let list = self.target_buffer(buffer.as_deref());
                if list.write_to_file(path.as_deref(), *append, *force)? {
                    log::info!("stored {} lines", list.len());
                }
            }
            Statement::Log(template) => {
                let message = self.template(template)?;
                self.host.log(Level::Info, &message);
            }
            Statement::Mark => {
                let list = self.selected();
                let cursor = list.cursor();
                list.set_mark(cursor);
            }
            Statement::Move(target) => self.move_cursor(target)?,
            Statement::Replace {
                pattern,
                replacement,
                count,
                filter,
                range,
            } => {
                let expr = self.pattern(pattern)?;
                let filter = filter.as_ref().map(|f| self.pattern(f)).transpose()?;
                let replacement = self.value(replacement)?;
                let max_count = count
                    .as_ref()
                    .map(|c| self.operand(c).map(|n| n.max(0.0) as usize))
                    .transpose()?;
                let (start, end) = match range {
                    Some(range) => {
                        let (start, end) = self.range(range)?;
                        (Some(start), Some(end))
                    }
                    None => (None, None),
                };
                let options = ReplaceOptions {
                    max_count,
                    start,
                    end,
                    filter: filter.as_ref(),
                    backrefs: expr.has_groups().then_some(&*BACKREFERENCE),
                };
                let replaced = self.selected().replace(&expr, &replacement, &options);
                self.state.last_replaced = replaced;
            }
            Statement::Select(selection) => match selection {
                Selection::Set(name) => {
                    self.buffer(name);
                    if let Some(top) = self.state.selected.last_mut() {
                        *top = name.clone();
                    }
                }
                Selection::Push(name) => {
                    self.buffer(name);
                    self.state.selected.push(name.clone());
                }
                Selection::Pop => {
                    if self.state.selected.len() < 2 {
                        return Err(Error::runtime("'select pop' without 'select push'"));
                    }
                    self.state.selected.pop();
                }
            },
        }
        Ok(Flow::Continue)
    }

    fn call(&mut self, located: &Located, script: &Value, params: &Params) -> Result<Flow> {
        let name = self.value(script)?;
        let params = match params {
            Params::None => Vec::new(),
            Params::Pairs(pairs) => pairs
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.value(value)?)))
                .collect::<Result<Vec<_>>>()?,
            Params::Buffer(buffer) => {
                let lines = self.buffer(buffer).lines().to_vec();
                parameter_lines(&lines)?
            }
        };
        let site = CallSite {
            script: self.name,
            line: located.line,
            dir: self.dir,
        };
        match self.host.call_script(&site, &name, params)? {
            Outcome::Finished(_) => Ok(Flow::Continue),
            Outcome::Aborted(code) => Ok(Flow::Exit(code)),
        }
    }

    fn exit_code(&mut self, code: Option<&Operand>, default: i32) -> Result<i32> {
        match code {
            Some(code) => Ok(self.operand(code)? as i32),
            None => Ok(default),
        }
    }

    fn move_cursor(&mut self, target: &MoveTarget) -> Result<()> {
        let position = match target {
            MoveTarget::Pattern(spec) => {
                let expr = self.pattern(spec)?;
                self.selected().search(&expr, true);
                return Ok(());
            }
            MoveTarget::Line { line, column } => {
                let line = self.operand(line)?;
                let column = column.as_ref().map(|c| self.operand(c)).transpose()?;
                BufferPosition::new(one_based(line), column.map_or(0, one_based))
            }
            MoveTarget::By(delta) => {
                let delta = self.operand(delta)?;
                let cursor = self.selected().cursor();
                let line = (cursor.line as f64 + delta).max(0.0) as usize;
                BufferPosition::new(line, cursor.column)
            }
            MoveTarget::BufferStart => BufferPosition::START,
            MoveTarget::BufferEnd => self.selected().end_position(),
            MoveTarget::LineStart => BufferPosition::new(self.selected().cursor().line, 0),
            MoveTarget::LineEnd => {
                let list = self.selected();
                BufferPosition::new(list.cursor().line, list.current_line().len())
            }
            MoveTarget::Mark => self.selected().mark(),
        };
        self.selected().set_cursor(position);
        Ok(())
    }

    /// Half-open range of the selected buffer.
    fn range(&mut self, range: &Range) -> Result<(BufferPosition, BufferPosition)> {
        let count = match range {
            Range::Lines(count) => self.operand(count)?.max(0.0) as usize,
            _ => 1,
        };
        let list = self.selected();
        let cursor = list.cursor();
        Ok(match range {
            Range::All => (BufferPosition::START, BufferPosition::new(list.len(), 0)),
            Range::Lines(_) => (
                BufferPosition::new(cursor.line, 0),
                BufferPosition::new(cursor.line.saturating_add(count), 0),
            ),
            Range::Line => (
                BufferPosition::new(cursor.line, 0),
                BufferPosition::new(cursor.line + 1, 0),
            ),
            Range::Mark => BufferPosition::ordered(list.mark(), cursor),
            Range::Hit => {
                let hit = list.last_search();
                if !hit.found {
                    return Err(Error::runtime("no search hit"));
                }
                (hit.position, hit.end())
            }
        })
    }

    fn test(&mut self, test: &Test) -> Result<bool> {
        let result = match &test.condition {
            Condition::Found => self.selected().last_search().found,
            Condition::Search(spec) => {
                let expr = self.pattern(spec)?;
                self.selected().search(&expr, true).found
            }
            Condition::Truthy(value) => {
                let text = self.value(value)?;
                !(text.is_empty() || text == "0")
            }
            Condition::Compare { left, op, right } => {
                let left = self.value(left)?;
                let right = self.value(right)?;
                compare(&left, *op, &right)
            }
        };
        Ok(result != test.negated)
    }

    fn num_expr(&mut self, expr: &NumExpr) -> Result<f64> {
        let mut acc = self.term(expr.first.negative, &expr.first.operand)?;
        for (op, term) in &expr.rest {
            let n = self.term(term.negative, &term.operand)?;
            acc = match op {
                ArithOp::Add => acc + n,
                ArithOp::Sub => acc - n,
                ArithOp::Mul => acc * n,
                ArithOp::Div if n == 0.0 => return Err(Error::runtime("division by zero")),
                ArithOp::Div => acc / n,
            };
        }
        Ok(acc)
    }

    fn term(&mut self, negative: bool, operand: &Operand) -> Result<f64> {
        let n = self.operand(operand)?;
        Ok(if negative { -n } else { n })
    }

    fn operand(&mut self, operand: &Operand) -> Result<f64> {
        let n = match operand {
            Operand::Number(n) => *n,
            Operand::Variable(name) => {
                let text = self.variable(name)?;
                text.trim().parse().map_err(|_| {
                    Error::runtime(format!("'{}' is not a number: '{}'", name, text))
                })?
            }
            Operand::Call(call) => FunctionEngine::as_numeric(call, self)?,
        };
        if !n.is_finite() {
            return Err(Error::runtime(format!("not a finite number: {}", n)));
        }
        Ok(n)
    }

    fn value(&mut self, value: &Value) -> Result<String> {
        let mut out = String::new();
        for fragment in &value.fragments {
            match fragment {
                Fragment::Text(template) => out.push_str(&self.template(template)?),
                Fragment::Variable(name) => out.push_str(&self.variable(name)?),
                Fragment::Buffer(buffer) => {
                    let list = self.buffer(&buffer.name);
                    match buffer.selector {
                        BufferSelector::All => out.push_str(&list.text()),
                        BufferSelector::Line => out.push_str(list.current_line()),
                        BufferSelector::Hit => out.push_str(list.last_hit()),
                        BufferSelector::Mark => {
                            let (start, end) = BufferPosition::ordered(list.mark(), list.cursor());
                            out.push_str(&list.text_between(start, end));
                        }
                    }
                }
                Fragment::Call(call) => out.push_str(&FunctionEngine::as_string(call, self)?),
            }
        }
        Ok(out)
    }

    fn template(&mut self, template: &Template) -> Result<String> {
        let mut out = String::new();
        for part in &template.parts {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Variable(name) => out.push_str(&self.variable(name)?),
            }
        }
        Ok(out)
    }

    fn pattern(&mut self, spec: &PatternSpec) -> Result<SearchExpression> {
        if let Some(compiled) = &spec.compiled {
            return Ok(compiled.clone());
        }
        let body = self.template(&spec.body)?;
        SearchExpression::new(&body, spec.kind, &spec.flags).map_err(|e| Error::runtime(e.message))
    }

    fn variable(&mut self, name: &str) -> Result<String> {
        if is_intrinsic_name(name) {
            return self.intrinsic(name);
        }
        self.lookup(name)
            .ok_or_else(|| Error::runtime(format!("undefined variable '{}'", name)))
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if is_global_name(name) {
            self.host.global(name)
        } else {
            self.state.locals.get(name).cloned()
        }
    }

    fn set_variable(&mut self, name: &str, value: String) -> Result<()> {
        if is_global_name(name) {
            self.host.set_global(name, value)
        } else {
            self.state.locals.insert(name.to_string(), value);
            Ok(())
        }
    }

    fn intrinsic(&mut self, name: &str) -> Result<String> {
        let now = chrono::Local::now;
        let value = match name {
            "__line" => (self.selected().cursor().line + 1).to_string(),
            "__col" => (self.selected().cursor().column + 1).to_string(),
            "__lines" => self.selected().len().to_string(),
            "__hit" => self.selected().last_hit().to_string(),
            "__found" => u8::from(self.selected().last_search().found).to_string(),
            "__replaced" => self.state.last_replaced.to_string(),
            "__file" => self
                .selected()
                .filename()
                .map(|f| f.display().to_string())
                .unwrap_or_default(),
            "__script" => self.name.to_string(),
            "__date" => now().format("%Y-%m-%d").to_string(),
            "__time" => now().format("%H:%M:%S").to_string(),
            "__cwd" => std::env::current_dir()
                .map_err(|e| Error::io("current directory", e))?
                .display()
                .to_string(),
            _ => return Err(Error::runtime(format!("unknown intrinsic variable '{}'", name))),
        };
        Ok(value)
    }

    fn buffer(&mut self, name: &str) -> &mut LineList {
        if is_global_name(name) {
            self.host.buffer_mut(name).list_mut()
        } else {
            self.state.buffers.buffer_mut(name).list_mut()
        }
    }

    fn selected(&mut self) -> &mut LineList {
        let name = self
            .state
            .selected
            .last()
            .cloned()
            .unwrap_or_else(|| MAIN_BUFFER.to_string());
        self.buffer(&name)
    }

    fn target_buffer(&mut self, name: Option<&str>) -> &mut LineList {
        match name {
            Some(name) => self.buffer(name),
            None => self.selected(),
        }
    }
}

impl FunctionContext for Exec<'_> {
    fn value(&mut self, value: &Value) -> Result<String> {
        Exec::value(self, value)
    }

    fn pattern(&mut self, spec: &PatternSpec) -> Result<SearchExpression> {
        Exec::pattern(self, spec)
    }

    fn buffer(&mut self, name: &str) -> &mut LineList {
        Exec::buffer(self, name)
    }

    fn dir_stack(&mut self) -> &mut Vec<PathBuf> {
        self.host.dir_stack()
    }
}

fn target(table: &BTreeMap<usize, usize>, index: usize) -> Result<usize> {
    table
        .get(&index)
        .copied()
        .ok_or_else(|| Error::internal(format!("no jump target for statement {}", index + 1)))
}

fn is_whole_lines(range: &Range) -> bool {
    matches!(range, Range::All | Range::Line | Range::Lines(_))
}

/// A 1-based script number as a 0-based index.
fn one_based(n: f64) -> usize {
    (n as usize).saturating_sub(1)
}

/// Numeric comparison when both sides are numbers, text comparison
/// otherwise.
fn compare(left: &str, op: CmpOp, right: &str) -> bool {
    let ordering = match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(left.cmp(right)),
    };
    let Some(ordering) = ordering else {
        return op == CmpOp::Ne;
    };
    match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    }
}

/// `name=value` lines of a parameter buffer. Blank lines are skipped.
fn parameter_lines(lines: &[String]) -> Result<Vec<(String, String)>> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                .ok_or_else(|| Error::runtime(format!("parameter line without '=': '{}'", line)))
        })
        .collect()
}
