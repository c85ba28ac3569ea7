use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, opt, preceded};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{literal, one_of, take_while};

use crate::ast::{BinOp, Expr, UnaryFn};

/// Parse a complete numeric expression. Trailing input is an error.
pub fn parse_expr(input: &str) -> anyhow::Result<Expr> {
    full_expr
        .parse(input)
        .map_err(|e| anyhow::anyhow!("invalid expression {input:?}: {e}"))
}

fn full_expr(input: &mut &str) -> ModalResult<Expr> {
    ws_skip.parse_next(input)?;
    let expr = add_expr.parse_next(input)?;
    ws_skip.parse_next(input)?;
    Ok(expr)
}

fn ws_skip(input: &mut &str) -> ModalResult<()> {
    multispace0.parse_next(input)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Precedence levels (lowest to highest)
// ---------------------------------------------------------------------------

/// `add_expr = mul_expr { ("+" | "-") mul_expr }`
fn add_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = mul_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        let op = opt(alt((
            literal("+").value(BinOp::Add),
            literal("-").value(BinOp::Sub),
        )))
        .parse_next(input)?;
        let Some(op) = op else { break };
        ws_skip.parse_next(input)?;
        let right = cut_err(mul_expr).parse_next(input)?;
        left = Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

/// `mul_expr = unary_expr { ("*" | "/" | "%") unary_expr }`
fn mul_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = unary_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if input.starts_with("**") {
            break;
        }
        let op = opt(alt((
            literal("*").value(BinOp::Mul),
            literal("/").value(BinOp::Div),
            literal("%").value(BinOp::Mod),
        )))
        .parse_next(input)?;
        let Some(op) = op else { break };
        ws_skip.parse_next(input)?;
        let right = cut_err(unary_expr).parse_next(input)?;
        left = Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

/// `unary_expr = "-" unary_expr | "+" unary_expr | power_expr`
///
/// Unary minus binds looser than `**`, so `-2**2` is `-(2**2)`.
fn unary_expr(input: &mut &str) -> ModalResult<Expr> {
    if opt(literal("-")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = cut_err(unary_expr).parse_next(input)?;
        return Ok(Expr::Neg(Box::new(inner)));
    }
    if opt(literal("+")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        return cut_err(unary_expr).parse_next(input);
    }
    power_expr.parse_next(input)
}

/// `power_expr = primary [ ("**" | "^") unary_expr ]`, right-associative.
fn power_expr(input: &mut &str) -> ModalResult<Expr> {
    let base = primary.parse_next(input)?;
    let saved = *input;
    ws_skip.parse_next(input)?;
    if opt(alt((literal("**"), literal("^"))))
        .parse_next(input)?
        .is_some()
    {
        ws_skip.parse_next(input)?;
        let exponent = cut_err(unary_expr).parse_next(input)?;
        return Ok(Expr::BinOp {
            op: BinOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        });
    }
    *input = saved;
    Ok(base)
}

// ---------------------------------------------------------------------------
// Primary
// ---------------------------------------------------------------------------

fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((number.map(Expr::Number), paren_expr, ident_primary))
        .context(StrContext::Expected(StrContextValue::Description(
            "number, variable, function call or parenthesised expression",
        )))
        .parse_next(input)
}

fn paren_expr(input: &mut &str) -> ModalResult<Expr> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let inner = cut_err(add_expr).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")"))
        .context(StrContext::Expected(StrContextValue::CharLiteral(')')))
        .parse_next(input)?;
    Ok(inner)
}

/// Variable reference or single-argument function call.
fn ident_primary(input: &mut &str) -> ModalResult<Expr> {
    let name = ident.parse_next(input)?;
    let saved = *input;
    ws_skip.parse_next(input)?;

    if opt(literal("(")).parse_next(input)?.is_some() {
        let func = UnaryFn::from_name(name).ok_or_else(|| ErrMode::Cut(ContextError::new()))?;
        ws_skip.parse_next(input)?;
        let arg = cut_err(add_expr).parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal(")"))
            .context(StrContext::Expected(StrContextValue::CharLiteral(')')))
            .parse_next(input)?;
        return Ok(Expr::Call(func, Box::new(arg)));
    }

    *input = saved;
    Ok(Expr::Var(name.to_string()))
}

fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

/// Decimal literal with optional fraction and exponent: `12`, `0.85`, `.5`, `1e-3`.
fn number(input: &mut &str) -> ModalResult<f64> {
    let start = *input;
    let int_part = take_while(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let frac_part = opt(preceded(
        literal("."),
        take_while(0.., |c: char| c.is_ascii_digit()),
    ))
    .parse_next(input)?;

    let has_digits = !int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty());
    if !has_digits {
        *input = start;
        return Err(ErrMode::Backtrack(ContextError::new()));
    }

    let before_exp = *input;
    if opt(one_of(['e', 'E'])).parse_next(input)?.is_some() {
        let _ = opt(one_of(['+', '-'])).parse_next(input)?;
        let exp_digits = take_while(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
        if exp_digits.is_empty() {
            *input = before_exp;
        }
    }

    let text = &start[..start.len() - input.len()];
    text.parse::<f64>()
        .map_err(|_| ErrMode::Cut(ContextError::new()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.to_string()))
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn parse_scaled_temperature() {
        let expr = parse_expr("(T / 10000) - 10").unwrap();
        assert_eq!(
            expr,
            Expr::BinOp {
                op: BinOp::Sub,
                left: Box::new(Expr::BinOp {
                    op: BinOp::Div,
                    left: var("T"),
                    right: num(10000.0),
                }),
                right: num(10.0),
            }
        );
    }

    #[test]
    fn mul_binds_tighter_than_add() {
        let expr = parse_expr("a + b * c").unwrap();
        let Expr::BinOp { op, right, .. } = expr else {
            panic!("expected binop");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(*right, Expr::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn power_is_right_associative_and_binds_over_neg() {
        let expr = parse_expr("-2 ** 3 ** 2").unwrap();
        let Expr::Neg(inner) = expr else {
            panic!("expected negation at the root");
        };
        let Expr::BinOp { op, right, .. } = *inner else {
            panic!("expected pow");
        };
        assert_eq!(op, BinOp::Pow);
        assert!(matches!(*right, Expr::BinOp { op: BinOp::Pow, .. }));
    }

    #[test]
    fn caret_is_power() {
        assert_eq!(parse_expr("x^2").unwrap(), parse_expr("x ** 2").unwrap());
    }

    #[test]
    fn number_forms() {
        assert_eq!(parse_expr("0.85").unwrap(), Expr::Number(0.85));
        assert_eq!(parse_expr(".5").unwrap(), Expr::Number(0.5));
        assert_eq!(parse_expr("1e-3").unwrap(), Expr::Number(0.001));
        assert_eq!(parse_expr("2E2").unwrap(), Expr::Number(200.0));
    }

    #[test]
    fn function_call() {
        let expr = parse_expr("sqrt(x * x)").unwrap();
        assert!(matches!(expr, Expr::Call(UnaryFn::Sqrt, _)));
    }

    #[test]
    fn collects_variables() {
        let expr = parse_expr("(P * p_range / (0.85 * 65536)) - (0.05 * p_range)").unwrap();
        let vars: Vec<&str> = expr.variables().into_iter().collect();
        assert_eq!(vars, vec!["P", "p_range"]);
    }

    #[test]
    fn reject_unknown_function() {
        assert!(parse_expr("frobnicate(x)").is_err());
    }

    #[test]
    fn reject_trailing_input() {
        assert!(parse_expr("a + b )").is_err());
        assert!(parse_expr("a b").is_err());
    }

    #[test]
    fn reject_unbalanced_parens() {
        let err = parse_expr("(a + b").unwrap_err();
        assert!(err.to_string().contains("invalid expression"));
    }

    #[test]
    fn reject_empty() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("   ").is_err());
    }
}
