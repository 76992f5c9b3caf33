//! Filter-expression parser
//!
//! Fixed grammar, lowest to highest precedence:
//!
//! ```text
//! expr    := and ( ("or" | "||") and )*
//! and     := unary ( ("and" | "&&") unary )*
//! unary   := ("not" | "!") unary | cmp
//! cmp     := primary ( ("==" | "!=" | "<=" | ">=" | "<" | ">") primary )?
//! primary := "(" expr ")" | literal | path
//! path    := ident ( "." ident )*        -- "parent" segments climb
//! literal := integer | 'string' | "string" | "true" | "false"
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, not, opt, recognize},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::{CmpOp, Expr, ExprError, ExprValue};

/// Parse a filter expression into its AST.
pub fn compile(input: &str) -> Result<Expr, ExprError> {
    match all_consuming(terminated(expr, multispace0))(input) {
        Ok((_, e)) => Ok(e),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExprError::Parse(format!(
            "unexpected input at '{}'",
            truncate(e.input)
        ))),
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Parse("incomplete input".to_string())),
    }
}

fn truncate(s: &str) -> &str {
    let end = s
        .char_indices()
        .nth(24)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(
        preceded(multispace0, alt((keyword("or"), tag("||")))),
        and_expr,
    ))(input)?;
    Ok((input, fold_binary(first, rest, false)))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(
        preceded(multispace0, alt((keyword("and"), tag("&&")))),
        unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest, true)))
}

fn fold_binary(first: Expr, rest: Vec<Expr>, is_and: bool) -> Expr {
    rest.into_iter().fold(first, |acc, next| {
        if is_and {
            Expr::And(Box::new(acc), Box::new(next))
        } else {
            Expr::Or(Box::new(acc), Box::new(next))
        }
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = alt((keyword("not"), tag("!")))(input) {
        let (rest, inner) = unary(rest)?;
        return Ok((rest, Expr::Not(Box::new(inner))));
    }
    comparison(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = primary(input)?;
    let (input, tail) = opt(pair(preceded(multispace0, cmp_op), primary))(input)?;
    Ok((
        input,
        match tail {
            Some((op, rhs)) => Expr::Cmp(op, Box::new(lhs), Box::new(rhs)),
            None => lhs,
        },
    ))
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    alt((
        map(tag("=="), |_| CmpOp::Eq),
        map(tag("!="), |_| CmpOp::Ne),
        map(tag("<="), |_| CmpOp::Le),
        map(tag(">="), |_| CmpOp::Ge),
        map(tag("<"), |_| CmpOp::Lt),
        map(tag(">"), |_| CmpOp::Gt),
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    alt((
        delimited(
            char('('),
            expr,
            preceded(multispace0, char(')')),
        ),
        literal,
        path,
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Expr> {
    alt((
        map(keyword("true"), |_| Expr::Literal(ExprValue::Bool(true))),
        map(keyword("false"), |_| Expr::Literal(ExprValue::Bool(false))),
        map(integer, |i| Expr::Literal(ExprValue::Int(i))),
        map(quoted('\''), |s| Expr::Literal(ExprValue::Str(s))),
        map(quoted('"'), |s| Expr::Literal(ExprValue::Str(s))),
    ))(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    let (rest, text) = recognize(pair(opt(char('-')), digit1))(input)?;
    match text.parse::<i64>() {
        Ok(i) => Ok((rest, i)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn quoted(q: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        map(
            delimited(char(q), take_till(move |c| c == q), char(q)),
            |s: &str| s.to_string(),
        )(input)
    }
}

fn path(input: &str) -> IResult<&str, Expr> {
    map(separated_list1(char('.'), ident), |segments| {
        Expr::Path(segments.into_iter().map(str::to_string).collect())
    })(input)
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Match a keyword without eating a longer identifier that starts with it.
fn keyword(word: &'static str) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input: &str| {
        terminated(
            tag(word),
            not(satisfy(|c| c.is_ascii_alphanumeric() || c == '_')),
        )(input)
    }
}
