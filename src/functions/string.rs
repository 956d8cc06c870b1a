use super::{Args, Builtin, FunctionContext, Output};
use crate::error::{Error, Result};

/// 1-based character position of a byte offset.
fn char_position(text: &str, byte: usize) -> usize {
    text[..byte].chars().count() + 1
}

/// Byte offset of a 1-based character position, clamped to the text.
fn byte_offset(text: &str, position: f64) -> usize {
    let skip = (position as usize).saturating_sub(1);
    text.char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

pub(super) fn call(builtin: Builtin, args: &Args, ctx: &mut dyn FunctionContext) -> Result<Output> {
    let output = match builtin {
        Builtin::StringIndex => {
            let text = args.text(0, ctx)?;
            let needle = args.text(1, ctx)?;
            let start = byte_offset(&text, args.optional_number(2, ctx)?.unwrap_or(1.0));
            match text[start..].find(&needle) {
                Some(found) => Output::count(char_position(&text, start + found)),
                None => Output::count(0),
            }
        }
        Builtin::StringLength => Output::count(args.text(0, ctx)?.chars().count()),
        Builtin::StringPiece => {
            let text = args.text(0, ctx)?;
            let separator = args.text(1, ctx)?;
            let n = args.number(2, ctx)?;
            if separator.is_empty() {
                return Err(Error::runtime("string.piece: empty separator"));
            }
            let piece = match n as usize {
                0 => None,
                n => text.split(separator.as_str()).nth(n - 1),
            };
            Output::Text(piece.unwrap_or_default().to_string())
        }
        Builtin::StringReplace => {
            let text = args.text(0, ctx)?;
            let what = args.text(1, ctx)?;
            let with = args.text(2, ctx)?;
            if what.is_empty() {
                Output::Text(text)
            } else {
                match args.optional_number(3, ctx)? {
                    Some(count) => {
                        Output::Text(text.replacen(&what, &with, count.max(0.0) as usize))
                    }
                    None => Output::Text(text.replace(&what, &with)),
                }
            }
        }
        Builtin::StringSearch => {
            let text = args.text(0, ctx)?;
            let pattern = args.pattern(1, ctx)?;
            match pattern.find_at(&text, 0) {
                Some(m) => Output::count(char_position(&text, m.start())),
                None => Output::count(0),
            }
        }
        Builtin::StringSubstring => {
            let text = args.text(0, ctx)?;
            let start = byte_offset(&text, args.number(1, ctx)?);
            let rest = &text[start..];
            let sub = match args.optional_number(2, ctx)? {
                Some(length) => {
                    let end = byte_offset(rest, length.max(0.0) + 1.0);
                    &rest[..end]
                }
                None => rest,
            };
            Output::Text(sub.to_string())
        }
        other => return Err(Error::internal(format!("{:?} is not a string function", other))),
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::super::FunctionEngine;
    use super::super::testing::*;
    use crate::ast::Arg;

    fn eval(name: &str, args: Vec<Arg>) -> String {
        let mut ctx = TestContext::default();
        FunctionEngine::as_string(&call(name, args), &mut ctx).unwrap()
    }

    #[test]
    fn index_is_one_based() {
        assert_eq!(eval("string.index", vec![text("hello"), text("l")]), "3");
        assert_eq!(eval("string.index", vec![text("hello"), text("l"), text("4")]), "4");
        assert_eq!(eval("string.index", vec![text("hello"), text("z")]), "0");
        assert_eq!(eval("string.index", vec![text("héllo"), text("l")]), "3");
    }

    #[test]
    fn length_counts_chars() {
        assert_eq!(eval("string.length", vec![text("añb")]), "3");
        assert_eq!(eval("string.length", vec![text("")]), "0");
    }

    #[test]
    fn piece_selects_field() {
        assert_eq!(eval("string.piece", vec![text("a;b;c"), text(";"), text("2")]), "b");
        assert_eq!(eval("string.piece", vec![text("a;b;c"), text(";"), text("9")]), "");
    }

    #[test]
    fn replace_all_or_limited() {
        assert_eq!(eval("string.replace", vec![text("aaa"), text("a"), text("b")]), "bbb");
        assert_eq!(
            eval("string.replace", vec![text("aaa"), text("a"), text("b"), text("2")]),
            "bba"
        );
    }

    #[test]
    fn search_with_regex_text() {
        assert_eq!(eval("string.search", vec![text("ab12"), text("[0-9]+")]), "3");
        assert_eq!(eval("string.search", vec![text("abc"), text("[0-9]")]), "0");
    }

    #[test]
    fn substring_clamps() {
        assert_eq!(eval("string.substring", vec![text("abcdef"), text("2"), text("3")]), "bcd");
        assert_eq!(eval("string.substring", vec![text("abcdef"), text("5")]), "ef");
        assert_eq!(eval("string.substring", vec![text("abc"), text("9")]), "");
        assert_eq!(eval("string.substring", vec![text("abc"), text("2"), text("99")]), "bc");
    }

    #[test]
    fn piece_below_one_is_empty() {
        assert_eq!(eval("string.piece", vec![text("a;b"), text(";"), text("0")]), "");
        assert_eq!(eval("string.piece", vec![text("a;b"), text(";"), text("-3")]), "");
        assert_eq!(eval("string.piece", vec![text("a;b"), text(";"), text("0.5")]), "");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let mut ctx = TestContext::default();
        for bad in ["nan", "NaN", "inf", "-inf", "1e999"] {
            let c = call("string.substring", vec![text("abc"), text(bad)]);
            let err = FunctionEngine::as_string(&c, &mut ctx).unwrap_err();
            assert!(err.message.contains("finite"), "{}", err.message);

            let c = call("string.piece", vec![text("a;b"), text(";"), text(bad)]);
            assert!(FunctionEngine::as_string(&c, &mut ctx).is_err());
        }
        let c = call("string.index", vec![text("abc"), text("c"), text("nan")]);
        assert!(FunctionEngine::as_string(&c, &mut ctx).is_err());
    }
}
