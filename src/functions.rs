//! Built-in functions, grouped by namespace (`buffer`, `math`, `os`,
//! `string`).
//!
//! Each function has a [`Signature`] that the check pass uses to validate
//! arity and argument kinds; the run pass only evaluates.

use std::path::PathBuf;

use crate::ast::{Arg, FunctionCall, PatternSpec, Value};
use crate::error::{Error, Result};
use crate::line_list::LineList;
use crate::pattern::SearchExpression;

mod buffer;
mod math;
mod os;
mod string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    BufferDifference,
    BufferJoin,
    BufferPop,
    BufferShift,
    BufferSort,
    BufferSplit,
    MathRandom,
    OsBasename,
    OsCd,
    OsChangeExtension,
    OsCopy,
    OsDirname,
    OsExists,
    OsIsDir,
    OsListFiles,
    OsMkdir,
    OsPopd,
    OsPushd,
    OsPwd,
    OsTempname,
    StringIndex,
    StringLength,
    StringPiece,
    StringReplace,
    StringSearch,
    StringSubstring,
}

/// Result contract of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Numeric,
    Text,
}

/// Accepted argument syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A buffer reference `~name`.
    Buffer,
    /// Any single value fragment.
    Text,
    /// A pattern literal or a value used as a regex.
    Pattern,
}

#[derive(Debug)]
pub struct Signature {
    pub name: &'static str,
    pub builtin: Builtin,
    pub returns: ReturnType,
    pub params: &'static [ParamKind],
    /// Number of leading parameters that must be given.
    pub required: usize,
}

use Builtin::*;
use ParamKind::{Buffer as B, Pattern as P, Text as T};
use ReturnType::{Numeric, Text};

macro_rules! sig {
    ($name:literal, $builtin:ident, $returns:ident, [$($param:ident),*], $required:literal) => {
        Signature {
            name: $name,
            builtin: $builtin,
            returns: $returns,
            params: &[$($param),*],
            required: $required,
        }
    };
}

/// All built-ins, sorted by name.
pub static SIGNATURES: &[Signature] = &[
    sig!("buffer.difference", BufferDifference, Numeric, [B, B, B], 2),
    sig!("buffer.join", BufferJoin, Text, [B, T], 1),
    sig!("buffer.pop", BufferPop, Text, [B], 1),
    sig!("buffer.shift", BufferShift, Text, [B], 1),
    sig!("buffer.sort", BufferSort, Numeric, [B, T], 1),
    sig!("buffer.split", BufferSplit, Numeric, [B, T, T], 2),
    sig!("math.random", MathRandom, Numeric, [T, T], 1),
    sig!("os.basename", OsBasename, Text, [T], 1),
    sig!("os.cd", OsCd, Numeric, [T], 0),
    sig!("os.changeextension", OsChangeExtension, Text, [T, T], 2),
    sig!("os.copy", OsCopy, Numeric, [T, T], 2),
    sig!("os.dirname", OsDirname, Text, [T], 1),
    sig!("os.exists", OsExists, Numeric, [T], 1),
    sig!("os.isdir", OsIsDir, Numeric, [T], 1),
    sig!("os.listfiles", OsListFiles, Numeric, [B, T, T], 2),
    sig!("os.mkdir", OsMkdir, Numeric, [T], 1),
    sig!("os.popd", OsPopd, Numeric, [], 0),
    sig!("os.pushd", OsPushd, Numeric, [T], 1),
    sig!("os.pwd", OsPwd, Text, [], 0),
    sig!("os.tempname", OsTempname, Text, [T], 0),
    sig!("string.index", StringIndex, Numeric, [T, T, T], 2),
    sig!("string.length", StringLength, Numeric, [T], 1),
    sig!("string.piece", StringPiece, Text, [T, T, T], 3),
    sig!("string.replace", StringReplace, Text, [T, T, T, T], 3),
    sig!("string.search", StringSearch, Numeric, [T, P], 2),
    sig!("string.substring", StringSubstring, Text, [T, T, T], 2),
];

/// What the run pass needs from its environment to evaluate a call.
pub trait FunctionContext {
    /// Evaluate a value argument.
    fn value(&mut self, value: &Value) -> Result<String>;

    /// Compile a pattern argument, interpolating variables.
    fn pattern(&mut self, spec: &PatternSpec) -> Result<SearchExpression>;

    /// Resolve a buffer by name, creating it on first reference.
    fn buffer(&mut self, name: &str) -> &mut LineList;

    /// Directory stack for `os.pushd` / `os.popd`.
    fn dir_stack(&mut self) -> &mut Vec<PathBuf>;
}

/// A function result.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Number(f64),
    Text(String),
}

impl Output {
    fn flag(ok: bool) -> Self {
        Output::Number(if ok { 1.0 } else { 0.0 })
    }

    fn count(n: usize) -> Self {
        Output::Number(n as f64)
    }
}

/// Dispatcher for the built-in functions.
pub struct FunctionEngine;

impl FunctionEngine {
    /// Look up a qualified name. The tokenizer only produces known names,
    /// so a miss is an internal error.
    pub fn lookup(name: &str) -> Result<&'static Signature> {
        SIGNATURES
            .binary_search_by(|sig| sig.name.cmp(name))
            .map(|index| &SIGNATURES[index])
            .map_err(|_| Error::internal(format!("unknown function '{}'", name)))
    }

    /// Regex source matching exactly the known function names.
    pub fn name_pattern() -> String {
        let names: Vec<String> = SIGNATURES
            .iter()
            .rev()
            .map(|sig| regex::escape(sig.name))
            .collect();
        format!(r"(?:{})\b", names.join("|"))
    }

    /// Validate the argument list of a call against its signature.
    pub fn check_call(signature: &Signature, args: &[Arg]) -> Result<()> {
        if args.len() < signature.required {
            return Err(Error::parse(format!(
                "{} needs at least {} argument(s)",
                signature.name, signature.required
            )));
        }
        if args.len() > signature.params.len() {
            return Err(Error::parse(format!(
                "{} takes at most {} argument(s)",
                signature.name,
                signature.params.len()
            )));
        }
        for (index, (arg, kind)) in args.iter().zip(signature.params).enumerate() {
            let accepted = match (kind, arg) {
                (ParamKind::Buffer, Arg::Buffer(_)) => true,
                (ParamKind::Buffer, _) => false,
                (ParamKind::Text, Arg::Pattern(_)) => false,
                _ => true,
            };
            if !accepted {
                return Err(Error::parse(format!(
                    "{}: argument {} has the wrong kind",
                    signature.name,
                    index + 1
                )));
            }
        }
        Ok(())
    }

    /// Evaluate a call for a numeric result.
    pub fn as_numeric(call: &FunctionCall, ctx: &mut dyn FunctionContext) -> Result<f64> {
        match Self::execute(call, ctx)? {
            Output::Number(n) => Ok(n),
            Output::Text(text) => text.trim().parse().map_err(|_| {
                Error::runtime(format!(
                    "{} returned '{}', which is not a number",
                    call.signature.name, text
                ))
            }),
        }
    }

    /// Evaluate a call for a text result; numbers are formatted.
    pub fn as_string(call: &FunctionCall, ctx: &mut dyn FunctionContext) -> Result<String> {
        Ok(match Self::execute(call, ctx)? {
            Output::Number(n) => format_number(n),
            Output::Text(text) => text,
        })
    }

    fn execute(call: &FunctionCall, ctx: &mut dyn FunctionContext) -> Result<Output> {
        let args = Args { call };
        log::trace!("calling {}", call.signature.name);
        match call.signature.builtin {
            BufferDifference | BufferJoin | BufferPop | BufferShift | BufferSort | BufferSplit => {
                buffer::call(call.signature.builtin, &args, ctx)
            }
            MathRandom => math::call(call.signature.builtin, &args, ctx),
            StringIndex | StringLength | StringPiece | StringReplace | StringSearch
            | StringSubstring => string::call(call.signature.builtin, &args, ctx),
            _ => os::call(call.signature.builtin, &args, ctx),
        }
    }
}

/// Format a number: integral values without a decimal point.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Typed access to the arguments of one call.
struct Args<'a> {
    call: &'a FunctionCall,
}

impl Args<'_> {
    fn name(&self) -> &'static str {
        self.call.signature.name
    }

    fn buffer(&self, index: usize) -> Result<&str> {
        self.optional_buffer(index).ok_or_else(|| {
            Error::internal(format!("{}: argument {} is not a buffer", self.name(), index + 1))
        })
    }

    fn optional_buffer(&self, index: usize) -> Option<&str> {
        match self.call.args.get(index) {
            Some(Arg::Buffer(name)) => Some(name),
            _ => None,
        }
    }

    fn optional_text(&self, index: usize, ctx: &mut dyn FunctionContext) -> Result<Option<String>> {
        match self.call.args.get(index) {
            None => Ok(None),
            Some(Arg::Value(value)) => ctx.value(value).map(Some),
            Some(Arg::Buffer(name)) => Ok(Some(ctx.buffer(name).text())),
            Some(Arg::Pattern(spec)) => Ok(Some(ctx.pattern(spec)?.pattern().to_string())),
        }
    }

    fn text(&self, index: usize, ctx: &mut dyn FunctionContext) -> Result<String> {
        self.optional_text(index, ctx)?.ok_or_else(|| {
            Error::internal(format!("{}: missing argument {}", self.name(), index + 1))
        })
    }

    fn optional_number(&self, index: usize, ctx: &mut dyn FunctionContext) -> Result<Option<f64>> {
        match self.optional_text(index, ctx)? {
            None => Ok(None),
            Some(text) => {
                let n: f64 = text.trim().parse().map_err(|_| {
                    Error::runtime(format!(
                        "{}: argument {} is not a number: '{}'",
                        self.name(),
                        index + 1,
                        text
                    ))
                })?;
                if !n.is_finite() {
                    return Err(Error::runtime(format!(
                        "{}: argument {} must be a finite number: '{}'",
                        self.name(),
                        index + 1,
                        text
                    )));
                }
                Ok(Some(n))
            }
        }
    }

    fn number(&self, index: usize, ctx: &mut dyn FunctionContext) -> Result<f64> {
        self.optional_number(index, ctx)?.ok_or_else(|| {
            Error::internal(format!("{}: missing argument {}", self.name(), index + 1))
        })
    }

    fn pattern(&self, index: usize, ctx: &mut dyn FunctionContext) -> Result<SearchExpression> {
        match self.call.args.get(index) {
            Some(Arg::Pattern(spec)) => ctx.pattern(spec),
            Some(_) => {
                let text = self.text(index, ctx)?;
                SearchExpression::regex(&text).map_err(|e| Error::runtime(e.message))
            }
            None => Err(Error::internal(format!(
                "{}: missing argument {}",
                self.name(),
                index + 1
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A minimal [`FunctionContext`] for exercising built-ins directly.

    use std::collections::HashMap;

    use super::*;
    use crate::ast::{Fragment, Template};

    #[derive(Default)]
    pub struct TestContext {
        pub buffers: HashMap<String, LineList>,
        pub dirs: Vec<PathBuf>,
    }

    impl FunctionContext for TestContext {
        fn value(&mut self, value: &Value) -> Result<String> {
            let mut out = String::new();
            for fragment in &value.fragments {
                match fragment {
                    Fragment::Text(template) => {
                        out.push_str(&template.as_literal().unwrap_or_default())
                    }
                    _ => return Err(Error::internal("unsupported fragment in test context")),
                }
            }
            Ok(out)
        }

        fn pattern(&mut self, spec: &PatternSpec) -> Result<SearchExpression> {
            let body = spec.body.as_literal().unwrap_or_default();
            SearchExpression::new(&body, spec.kind, &spec.flags)
        }

        fn buffer(&mut self, name: &str) -> &mut LineList {
            self.buffers.entry(name.to_string()).or_default()
        }

        fn dir_stack(&mut self) -> &mut Vec<PathBuf> {
            &mut self.dirs
        }
    }

    pub fn text(s: &str) -> Arg {
        Arg::Value(Value {
            fragments: vec![Fragment::Text(Template::literal(s))],
        })
    }

    pub fn buf(name: &str) -> Arg {
        Arg::Buffer(name.to_string())
    }

    pub fn call(name: &str, args: Vec<Arg>) -> FunctionCall {
        FunctionCall {
            signature: FunctionEngine::lookup(name).unwrap(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn signatures_are_sorted() {
        assert!(SIGNATURES.windows(2).all(|w| w[0].name < w[1].name));
    }

    #[test]
    fn lookup_known_and_unknown() {
        assert_eq!(
            FunctionEngine::lookup("string.length").unwrap().builtin,
            Builtin::StringLength
        );
        let err = FunctionEngine::lookup("string.nope").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Internal);
    }

    #[test]
    fn name_pattern_matches_whole_names() {
        let re = regex::Regex::new(&format!("^{}", FunctionEngine::name_pattern())).unwrap();
        assert!(re.is_match("os.copy("));
        assert!(!re.is_match("os.copyx("));
        assert_eq!(re.find("os.pushd(x)").unwrap().as_str(), "os.pushd");
    }

    #[test]
    fn numeric_result_through_string_path() {
        let mut ctx = TestContext::default();
        let c = call("string.length", vec![text("hello")]);
        assert_eq!(FunctionEngine::as_string(&c, &mut ctx).unwrap(), "5");
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 5.0);
    }

    #[test]
    fn text_result_through_numeric_path_must_parse() {
        let mut ctx = TestContext::default();
        let c = call("string.substring", vec![text("a12"), text("2")]);
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 12.0);
        let c = call("string.substring", vec![text("abc"), text("1")]);
        assert!(FunctionEngine::as_numeric(&c, &mut ctx).is_err());
    }

    #[test]
    fn format_number_drops_integral_fraction() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(2.5), "2.5");
    }
}
