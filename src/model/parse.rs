//! Textual model construction.
//!
//! A model text is a sum/product/power of numbers, constructor calls and
//! parenthesized sub-expressions:
//!
//! ```text
//! Gauss('p1', pos=(3, 0, None), ampl=overall(4), fwhm='p2_fwhm') + Background(bkgd=datapar('bg'))
//! ```
//!
//! Constructor names are looked up in a [`ModelRegistry`]; the model built from
//! the text remembers it verbatim as its description.

use super::registry::ModelRegistry;
use super::{CombinedModel, Constant, Model, Operator};
use crate::error::{FitError, Result};
use crate::parameters::expression::{float_literal, identifier, ws};
use crate::parameters::ParamInit;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, multispace0, one_of},
    combinator::{cut, map, not, opt, value},
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

type PResult<'a, T> = IResult<&'a str, T>;

/// Syntax tree of a model text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Number(f64),
    Call {
        class: String,
        name: String,
        args: Vec<(String, ParamInit)>,
    },
    Neg(Box<Node>),
    Binary(Operator, Box<Node>, Box<Node>),
}

/// Build a model from text using the built-in registry.
///
/// ```
/// use scanfit::model::{parse_model, Model};
///
/// let text = "Gauss('a', pos=0, ampl=1, fwhm=1) + Background()";
/// let model = parse_model(text).unwrap();
/// assert_eq!(model.description(), text);
/// assert_eq!(model.param_names(), vec!["a_pos", "a_ampl", "a_fwhm", "bkgd"]);
/// ```
pub fn parse_model(text: &str) -> Result<Box<dyn Model>> {
    ModelRegistry::default().parse(text)
}

pub(crate) fn parse_tree(text: &str) -> Result<Node> {
    match sum(text) {
        Ok((rest, node)) if rest.trim().is_empty() => Ok(node),
        Ok((rest, _)) => Err(syntax_error(text, rest)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(syntax_error(text, e.input)),
        Err(nom::Err::Incomplete(_)) => Err(syntax_error(text, "")),
    }
}

fn syntax_error(text: &str, rest: &str) -> FitError {
    let rest = rest.trim();
    if rest.is_empty() {
        FitError::ModelSyntax(format!("unexpected end of model '{}'", text))
    } else {
        FitError::ModelSyntax(format!("cannot parse model '{}' at '{}'", text, rest))
    }
}

pub(crate) fn build(node: &Node, registry: &ModelRegistry) -> Result<Box<dyn Model>> {
    match node {
        Node::Number(v) => Ok(Box::new(Constant::new(*v))),
        Node::Call { class, name, args } => registry.create(class, name, args),
        Node::Neg(inner) => match inner.as_ref() {
            Node::Number(v) => Ok(Box::new(Constant::new(-v))),
            other => Ok(Box::new(CombinedModel::new(
                -1.0,
                build(other, registry)?,
                Operator::Mul,
            )?)),
        },
        Node::Binary(op, a, b) => Ok(Box::new(CombinedModel::new(
            build(a, registry)?,
            build(b, registry)?,
            *op,
        )?)),
    }
}

fn signed_number(input: &str) -> PResult<'_, f64> {
    let (input, sign) = opt(ws(one_of("+-"))).parse(input)?;
    let (input, value) = ws(float_literal).parse(input)?;
    Ok((input, if sign == Some('-') { -value } else { value }))
}

fn quoted(input: &str) -> PResult<'_, &str> {
    ws(alt((
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
    )))
    .parse(input)
}

fn limit(input: &str) -> PResult<'_, Option<f64>> {
    alt((value(None, ws(tag("None"))), map(signed_number, Some))).parse(input)
}

fn bounded_init(input: &str) -> PResult<'_, ParamInit> {
    let (input, (_, value, _, min, _, max, _)) = (
        ws(char('(')),
        signed_number,
        ws(char(',')),
        limit,
        ws(char(',')),
        limit,
        ws(char(')')),
    )
        .parse(input)?;
    Ok((input, ParamInit::Bounded { value, min, max }))
}

fn wrapped_init(input: &str) -> PResult<'_, ParamInit> {
    alt((
        map(
            preceded(ws(tag("overall")), delimited(ws(char('(')), init, ws(char(')')))),
            |inner: ParamInit| ParamInit::overall(inner),
        ),
        map(
            preceded(ws(tag("datapar")), delimited(ws(char('(')), quoted, ws(char(')')))),
            |key: &str| ParamInit::datapar(key),
        ),
    ))
    .parse(input)
}

fn init(input: &str) -> PResult<'_, ParamInit> {
    alt((
        wrapped_init,
        bounded_init,
        map(quoted, |s: &str| ParamInit::Expr(s.to_string())),
        map(signed_number, ParamInit::Value),
    ))
    .parse(input)
}

fn keyword_arg(input: &str) -> PResult<'_, (String, ParamInit)> {
    let (input, (key, _, init)) = (ws(identifier), ws(char('=')), init).parse(input)?;
    Ok((input, (key.to_string(), init)))
}

/// Everything after the opening parenthesis of a call.
fn call_args(input: &str) -> PResult<'_, (String, Vec<(String, ParamInit)>)> {
    let (mut input, name) = opt(quoted).parse(input)?;
    let mut args = Vec::new();
    let mut need_comma = name.is_some();
    loop {
        if let Ok((rest, _)) = ws(char(')')).parse(input) {
            return Ok((rest, (name.unwrap_or_default().to_string(), args)));
        }
        if need_comma {
            let (rest, _) = ws(char(',')).parse(input)?;
            input = rest;
            if let Ok((rest, _)) = ws(char(')')).parse(input) {
                return Ok((rest, (name.unwrap_or_default().to_string(), args)));
            }
        }
        let (rest, arg) = keyword_arg(input)?;
        args.push(arg);
        input = rest;
        need_comma = true;
    }
}

fn call(input: &str) -> PResult<'_, Node> {
    let (input, class) = terminated(identifier, ws(char('('))).parse(input)?;
    let (input, (name, args)) = cut(call_args).parse(input)?;
    Ok((
        input,
        Node::Call {
            class: class.to_string(),
            name,
            args,
        },
    ))
}

fn atom(input: &str) -> PResult<'_, Node> {
    ws(alt((
        map(float_literal, Node::Number),
        call,
        delimited(char('('), sum, cut(ws(char(')')))),
    )))
    .parse(input)
}

/// `atom ('**' unary)?`, right associative
fn power(input: &str) -> PResult<'_, Node> {
    let (input, base) = atom(input)?;
    match ws(tag("**")).parse(input) {
        Ok((rest, _)) => {
            let (rest, exponent) = unary(rest)?;
            Ok((
                rest,
                Node::Binary(Operator::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

fn unary(input: &str) -> PResult<'_, Node> {
    let (input, _) = multispace0::<&str, nom::error::Error<&str>>(input)?;
    if let Ok((rest, sign)) = one_of::<_, _, nom::error::Error<&str>>("+-").parse(input) {
        let (rest, operand) = unary(rest)?;
        let node = if sign == '-' {
            Node::Neg(Box::new(operand))
        } else {
            operand
        };
        return Ok((rest, node));
    }
    power(input)
}

fn product(input: &str) -> PResult<'_, Node> {
    let (mut input, mut left) = unary(input)?;
    loop {
        match ws(alt((terminated(char('*'), not(char('*'))), char('/')))).parse(input) {
            Ok((rest, op)) => {
                let (rest, right) = unary(rest)?;
                let op = if op == '*' { Operator::Mul } else { Operator::Div };
                left = Node::Binary(op, Box::new(left), Box::new(right));
                input = rest;
            }
            Err(_) => return Ok((input, left)),
        }
    }
}

fn sum(input: &str) -> PResult<'_, Node> {
    let (mut input, mut left) = product(input)?;
    loop {
        match ws(one_of("+-")).parse(input) {
            Ok((rest, op)) => {
                let (rest, right) = product(rest)?;
                let op = if op == '+' { Operator::Add } else { Operator::Sub };
                left = Node::Binary(op, Box::new(left), Box::new(right));
                input = rest;
            }
            Err(_) => return Ok((input, left)),
        }
    }
}
