//! Nom parser for condition expressions
//!
//! Precedence, loosest first:
//!
//! ```text
//! or        := and (("||" | "or") and)*
//! and       := equality (("&&" | "and") equality)*
//! equality  := relational (("===" | "!==" | "==" | "!=") relational)*
//! relational:= unary (("<=" | ">=" | "<" | ">") unary)*
//! unary     := ("!" | "not" | "-") unary | postfix
//! postfix   := primary ("(" args ")" | "." ident | "[" or "]")*
//! primary   := number | string | true | false | null | undefined | ident | "(" or ")"
//! ```
//!
//! Numbers take an optional fraction and exponent (`12`, `.5`, `1.5e3`).
//! Strings are single or double quoted; `\\`, `\'`, `\"`, `\n`, `\t` and
//! `\r` are the recognised escapes.
//!
//! Sources longer than [`MAX_SOURCE_LEN`] bytes or nested deeper than
//! [`MAX_NESTING`] levels (brackets plus stacked prefix operators) are
//! rejected before parsing, which keeps both the parser and the evaluator's
//! recursion bounded.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value, verify},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::{BinaryOp, Expr, Literal, LogicalOp, UnaryOp};
use super::ConditionError;

const RESERVED: &[&str] = &["true", "false", "null", "undefined", "and", "or", "not"];

/// Deepest accepted nesting of brackets and prefix operators
pub const MAX_NESTING: usize = 32;

/// Longest accepted source, in bytes
pub const MAX_SOURCE_LEN: usize = 2048;

/// Parse a complete condition expression
pub fn parse_condition(source: &str) -> Result<Expr, ConditionError> {
    if source.len() > MAX_SOURCE_LEN {
        return Err(ConditionError::Parse {
            offset: MAX_SOURCE_LEN,
            message: format!("expression longer than {MAX_SOURCE_LEN} bytes"),
        });
    }
    check_nesting(source)?;

    match all_consuming(ws(or_expr))(source) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = source.len() - e.input.len();
            let message = if e.input.is_empty() {
                "unexpected end of expression".to_string()
            } else {
                let near: String = e.input.chars().take(16).collect();
                format!("unexpected input {near:?}")
            };
            Err(ConditionError::Parse { offset, message })
        }
        Err(nom::Err::Incomplete(_)) => Err(ConditionError::Parse {
            offset: source.len(),
            message: "unexpected end of expression".to_string(),
        }),
    }
}

/// Reject sources whose nesting would exceed [`MAX_NESTING`].
///
/// Tracks, per open bracket, how many prefix operators are pending on the
/// operand being read. The depth is the bracket count plus all pending
/// prefixes, which is what the recursive descent has to stack.
fn check_nesting(source: &str) -> Result<(), ConditionError> {
    let mut levels: Vec<usize> = vec![0];
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                while let Some((_, d)) = chars.next() {
                    if d == '\\' {
                        chars.next();
                    } else if d == c {
                        break;
                    }
                }
                set_last(&mut levels, 0);
            }
            '(' | '[' => levels.push(0),
            ')' | ']' => {
                if levels.len() > 1 {
                    levels.pop();
                }
                set_last(&mut levels, 0);
            }
            '!' if matches!(chars.peek(), Some((_, '='))) => {
                chars.next();
            }
            '!' | '-' => bump_last(&mut levels),
            c if is_ident_char(c) => {
                let mut word = String::from(c);
                while let Some(&(_, d)) = chars.peek() {
                    if !is_ident_char(d) {
                        break;
                    }
                    word.push(d);
                    chars.next();
                }
                if word == "not" {
                    bump_last(&mut levels);
                } else {
                    set_last(&mut levels, 0);
                }
            }
            _ => {}
        }

        let depth = levels.len() - 1 + levels.iter().sum::<usize>();
        if depth > MAX_NESTING {
            return Err(ConditionError::Parse {
                offset,
                message: format!("expression nested deeper than {MAX_NESTING} levels"),
            });
        }
    }
    Ok(())
}

fn set_last(levels: &mut [usize], pending: usize) {
    if let Some(last) = levels.last_mut() {
        *last = pending;
    }
}

fn bump_last(levels: &mut [usize]) {
    if let Some(last) = levels.last_mut() {
        *last += 1;
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// A reserved word not followed by an identifier character
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(satisfy(is_ident_char)))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char)))(input)
}

// =============================================================================
// PRIMARY
// =============================================================================

fn number(input: &str) -> IResult<&str, Expr> {
    let mantissa = alt((
        recognize(pair(digit1, opt(pair(char('.'), digit0)))),
        recognize(pair(char('.'), digit1)),
    ));
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    map(
        map_res(recognize(pair(mantissa, opt(exponent))), |s: &str| {
            s.parse::<f64>()
        }),
        |n| Expr::Literal(Literal::Number(n)),
    )(input)
}

fn escape_sequence(input: &str) -> IResult<&str, &str> {
    alt((
        value("\\", char('\\')),
        value("'", char('\'')),
        value("\"", char('"')),
        value("\n", char('n')),
        value("\t", char('t')),
        value("\r", char('r')),
    ))(input)
}

fn quoted<'a>(quote: char, stop: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    delimited(
        char(quote),
        map(
            opt(escaped_transform(is_not(stop), '\\', escape_sequence)),
            |s: Option<String>| s.unwrap_or_default(),
        ),
        char(quote),
    )
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    map(alt((quoted('\'', "'\\"), quoted('"', "\"\\"))), Expr::string)(input)
}

fn keyword_literal(input: &str) -> IResult<&str, Expr> {
    alt((
        value(Expr::Literal(Literal::Bool(true)), keyword("true")),
        value(Expr::Literal(Literal::Bool(false)), keyword("false")),
        value(Expr::Literal(Literal::Null), keyword("null")),
        value(Expr::Literal(Literal::Undefined), keyword("undefined")),
    ))(input)
}

fn variable(input: &str) -> IResult<&str, Expr> {
    map(
        verify(identifier, |name: &str| !RESERVED.contains(&name)),
        Expr::ident,
    )(input)
}

fn parenthesized(input: &str) -> IResult<&str, Expr> {
    delimited(char('('), ws(or_expr), char(')'))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        string_literal,
        parenthesized,
        keyword_literal,
        variable,
    )))(input)
}

// =============================================================================
// POSTFIX AND UNARY
// =============================================================================

enum Postfix {
    Call(Vec<Expr>),
    Member(Expr),
}

fn postfix_op(input: &str) -> IResult<&str, Postfix> {
    alt((
        map(
            delimited(
                ws(char('(')),
                separated_list0(char(','), ws(or_expr)),
                ws(char(')')),
            ),
            Postfix::Call,
        ),
        map(preceded(ws(char('.')), ws(identifier)), |name: &str| {
            Postfix::Member(Expr::string(name))
        }),
        map(
            delimited(ws(char('[')), ws(or_expr), ws(char(']'))),
            Postfix::Member,
        ),
    ))(input)
}

fn postfix(input: &str) -> IResult<&str, Expr> {
    let (input, base) = primary(input)?;
    let (input, ops) = many0(postfix_op)(input)?;
    let expr = ops.into_iter().fold(base, |acc, op| match op {
        Postfix::Call(args) => Expr::call(acc, args),
        Postfix::Member(property) => Expr::member(acc, property),
    });
    Ok((input, expr))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(ws(alt((tag("!"), keyword("not")))), unary),
            |operand| Expr::unary(UnaryOp::Not, operand),
        ),
        map(preceded(ws(char('-')), unary), |operand| {
            Expr::unary(UnaryOp::Neg, operand)
        }),
        postfix,
    ))(input)
}

// =============================================================================
// BINARY LEVELS
// =============================================================================

fn relational_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    ))(input)
}

fn equality_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::StrictEq, tag("===")),
        value(BinaryOp::StrictNe, tag("!==")),
        value(BinaryOp::LooseEq, tag("==")),
        value(BinaryOp::LooseNe, tag("!=")),
    ))(input)
}

fn relational(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(relational_op), unary))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs));
    Ok((input, expr))
}

fn equality(input: &str) -> IResult<&str, Expr> {
    let (input, first) = relational(input)?;
    let (input, rest) = many0(pair(ws(equality_op), relational))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs));
    Ok((input, expr))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = equality(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("&&"), keyword("and")))), equality))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, rhs| Expr::logical(LogicalOp::And, lhs, rhs));
    Ok((input, expr))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("||"), keyword("or")))), and_expr))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, rhs| Expr::logical(LogicalOp::Or, lhs, rhs));
    Ok((input, expr))
}
