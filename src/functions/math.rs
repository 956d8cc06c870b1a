use rand::Rng;

use super::{Args, Builtin, FunctionContext, Output};
use crate::error::{Error, Result};

pub(super) fn call(builtin: Builtin, args: &Args, ctx: &mut dyn FunctionContext) -> Result<Output> {
    match builtin {
        Builtin::MathRandom => {
            let first = args.number(0, ctx)? as i64;
            let (low, high) = match args.optional_number(1, ctx)? {
                // random(min, max) includes max
                Some(second) => (first, second as i64),
                None => (0, first.saturating_sub(1)),
            };
            if low > high {
                return Err(Error::runtime(format!(
                    "math.random: empty range [{}, {}]",
                    low, high
                )));
            }
            let n = rand::thread_rng().gen_range(low..=high);
            Ok(Output::Number(n as f64))
        }
        other => Err(Error::internal(format!("{:?} is not a math function", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::FunctionEngine;
    use super::super::testing::*;

    #[test]
    fn random_upper_bound_is_exclusive() {
        let mut ctx = TestContext::default();
        let c = call("math.random", vec![text("3")]);
        for _ in 0..50 {
            let n = FunctionEngine::as_numeric(&c, &mut ctx).unwrap();
            assert!((0.0..3.0).contains(&n));
            assert_eq!(n.fract(), 0.0);
        }
    }

    #[test]
    fn random_range_is_inclusive() {
        let mut ctx = TestContext::default();
        let c = call("math.random", vec![text("5"), text("5")]);
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 5.0);
    }

    #[test]
    fn empty_range_is_an_error() {
        let mut ctx = TestContext::default();
        let c = call("math.random", vec![text("0")]);
        assert!(FunctionEngine::as_numeric(&c, &mut ctx).is_err());
        let c = call("math.random", vec![text("4"), text("2")]);
        assert!(FunctionEngine::as_numeric(&c, &mut ctx).is_err());
        let c = call("math.random", vec![text("many")]);
        assert!(FunctionEngine::as_numeric(&c, &mut ctx).is_err());
    }
}
