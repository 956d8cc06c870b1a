use std::cmp::Ordering;
use std::collections::HashSet;

use super::{Args, Builtin, FunctionContext, Output};
use crate::error::{Error, Result};

pub(super) fn call(builtin: Builtin, args: &Args, ctx: &mut dyn FunctionContext) -> Result<Output> {
    match builtin {
        Builtin::BufferDifference => difference(args, ctx),
        Builtin::BufferJoin => {
            let separator = args.optional_text(1, ctx)?.unwrap_or_else(|| "\n".to_string());
            let lines = ctx.buffer(args.buffer(0)?).lines().join(&separator);
            Ok(Output::Text(lines))
        }
        Builtin::BufferPop => Ok(Output::Text(
            ctx.buffer(args.buffer(0)?).pop_line().unwrap_or_default(),
        )),
        Builtin::BufferShift => Ok(Output::Text(
            ctx.buffer(args.buffer(0)?).shift_line().unwrap_or_default(),
        )),
        Builtin::BufferSort => sort(args, ctx),
        Builtin::BufferSplit => {
            let text = args.text(1, ctx)?;
            let separator = args.optional_text(2, ctx)?.unwrap_or_else(|| ",".to_string());
            let pieces: Vec<String> = if text.is_empty() {
                Vec::new()
            } else if separator.is_empty() {
                text.chars().map(String::from).collect()
            } else {
                text.split(separator.as_str()).map(String::from).collect()
            };
            let count = pieces.len();
            ctx.buffer(args.buffer(0)?).set_lines(pieces);
            Ok(Output::count(count))
        }
        other => Err(Error::internal(format!("{:?} is not a buffer function", other))),
    }
}

/// Lines of the first buffer that do not occur in the second.
fn difference(args: &Args, ctx: &mut dyn FunctionContext) -> Result<Output> {
    let left = ctx.buffer(args.buffer(0)?).lines().to_vec();
    let right: HashSet<String> = ctx.buffer(args.buffer(1)?).lines().iter().cloned().collect();
    let missing: Vec<String> = left.into_iter().filter(|line| !right.contains(line)).collect();
    let count = missing.len();
    if let Some(out) = args.optional_buffer(2) {
        ctx.buffer(out).set_lines(missing);
    }
    Ok(Output::count(count))
}

/// Sort flags: `r` reverse, `n` numeric, `i` ignore case, `u` unique.
fn sort(args: &Args, ctx: &mut dyn FunctionContext) -> Result<Output> {
    let flags = args.optional_text(1, ctx)?.unwrap_or_default();
    let (mut reverse, mut numeric, mut ignore_case, mut unique) = (false, false, false, false);
    for flag in flags.chars() {
        match flag {
            'r' => reverse = true,
            'n' => numeric = true,
            'i' => ignore_case = true,
            'u' => unique = true,
            other => {
                return Err(Error::runtime(format!("buffer.sort: unknown flag '{}'", other)));
            }
        }
    }

    let compare = |a: &String, b: &String| -> Ordering {
        if numeric {
            let (x, y) = (leading_number(a), leading_number(b));
            let by_number = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if by_number != Ordering::Equal {
                return by_number;
            }
        }
        if ignore_case {
            a.to_lowercase().cmp(&b.to_lowercase())
        } else {
            a.cmp(b)
        }
    };

    let list = ctx.buffer(args.buffer(0)?);
    let mut lines = list.lines().to_vec();
    lines.sort_by(compare);
    if unique {
        lines.dedup_by(|a, b| compare(a, b) == Ordering::Equal);
    }
    if reverse {
        lines.reverse();
    }
    let count = lines.len();
    list.set_lines(lines);
    Ok(Output::count(count))
}

/// The numeric prefix of a line; lines without one sort as zero.
fn leading_number(line: &str) -> f64 {
    let trimmed = line.trim_start();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{FunctionEngine, FunctionContext};
    use crate::line_list::LineList;

    fn context(buffers: &[(&str, &[&str])]) -> TestContext {
        let mut ctx = TestContext::default();
        for (name, lines) in buffers {
            ctx.buffers.insert(name.to_string(), LineList::from_lines(lines.iter().copied()));
        }
        ctx
    }

    #[test]
    fn difference_counts_and_stores() {
        let mut ctx = context(&[("a", &["x", "y", "z"]), ("b", &["y"])]);
        let c = call("buffer.difference", vec![buf("a"), buf("b"), buf("out")]);
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 2.0);
        assert_eq!(ctx.buffer("out").lines(), ["x", "z"]);
    }

    #[test]
    fn join_with_default_and_custom_separator() {
        let mut ctx = context(&[("a", &["1", "2"])]);
        let c = call("buffer.join", vec![buf("a")]);
        assert_eq!(FunctionEngine::as_string(&c, &mut ctx).unwrap(), "1\n2");
        let c = call("buffer.join", vec![buf("a"), text("+")]);
        assert_eq!(FunctionEngine::as_string(&c, &mut ctx).unwrap(), "1+2");
    }

    #[test]
    fn pop_and_shift() {
        let mut ctx = context(&[("a", &["first", "mid", "last"])]);
        let c = call("buffer.pop", vec![buf("a")]);
        assert_eq!(FunctionEngine::as_string(&c, &mut ctx).unwrap(), "last");
        let c = call("buffer.shift", vec![buf("a")]);
        assert_eq!(FunctionEngine::as_string(&c, &mut ctx).unwrap(), "first");
        assert_eq!(ctx.buffer("a").lines(), ["mid"]);
    }

    #[test]
    fn sort_flags() {
        let mut ctx = context(&[("a", &["10", "9", "b", "B", "9"])]);
        let c = call("buffer.sort", vec![buf("a"), text("nu")]);
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 4.0);
        assert_eq!(ctx.buffer("a").lines(), ["B", "b", "9", "10"]);

        let mut ctx = context(&[("a", &["b", "A", "c"])]);
        let c = call("buffer.sort", vec![buf("a"), text("ir")]);
        FunctionEngine::as_numeric(&c, &mut ctx).unwrap();
        assert_eq!(ctx.buffer("a").lines(), ["c", "b", "A"]);
    }

    #[test]
    fn sort_rejects_unknown_flag() {
        let mut ctx = context(&[("a", &["x"])]);
        let c = call("buffer.sort", vec![buf("a"), text("z")]);
        assert!(FunctionEngine::as_numeric(&c, &mut ctx).is_err());
    }

    #[test]
    fn split_replaces_content() {
        let mut ctx = context(&[("a", &["old"])]);
        let c = call("buffer.split", vec![buf("a"), text("x,y,z")]);
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 3.0);
        assert_eq!(ctx.buffer("a").lines(), ["x", "y", "z"]);

        let c = call("buffer.split", vec![buf("a"), text("1;2"), text(";")]);
        FunctionEngine::as_numeric(&c, &mut ctx).unwrap();
        assert_eq!(ctx.buffer("a").lines(), ["1", "2"]);
    }
}
