//! Expression parsing and evaluation for dependent parameters
//!
//! Dependent parameters carry a formula such as `2 * p1_width` or `data.T / 10`.
//! Formulas are parsed once into an [`Expression`] tree and evaluated against a
//! restricted namespace: parameter values, metadata paths below `data`, the
//! constants `pi` and `e`, and a fixed allow-list of math functions. Nothing
//! outside that namespace is reachable.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace0, one_of},
    combinator::{map_res, not, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, terminated},
    IResult, Parser,
};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Error that can occur during expression parsing or evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Failed to parse expression '{input}': {message}")]
    ParseError { input: String, message: String },

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Metadata entry not found: {path}")]
    UndefinedMetadata { path: String },

    #[error("Metadata entry '{path}' is not a number")]
    NotScalar { path: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },
}

/// Result type for expression evaluation
pub type ExprResult<T> = Result<T, ExpressionError>;

/// Root of the metadata namespace inside expressions.
pub const DATA_ROOT: &str = "data";

/// Functions callable from expressions, with their (min, max) arity.
const FUNCTIONS: &[(&str, usize, usize)] = &[
    ("sin", 1, 1),
    ("cos", 1, 1),
    ("tan", 1, 1),
    ("asin", 1, 1),
    ("acos", 1, 1),
    ("atan", 1, 1),
    ("atan2", 2, 2),
    ("sinh", 1, 1),
    ("cosh", 1, 1),
    ("tanh", 1, 1),
    ("exp", 1, 1),
    ("log", 1, 1),
    ("ln", 1, 1),
    ("log10", 1, 1),
    ("sqrt", 1, 1),
    ("abs", 1, 1),
    ("floor", 1, 1),
    ("ceil", 1, 1),
    ("min", 2, usize::MAX),
    ("max", 2, usize::MAX),
];

const CONSTANTS: &[(&str, f64)] = &[("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

/// Whether `name` belongs to the built-in expression namespace and therefore
/// cannot be used as a parameter name.
pub fn is_reserved_name(name: &str) -> bool {
    name == DATA_ROOT
        || FUNCTIONS.iter().any(|(f, _, _)| *f == name)
        || CONSTANTS.iter().any(|(c, _)| *c == name)
}

fn constant(name: &str) -> Option<f64> {
    CONSTANTS
        .iter()
        .find(|(c, _)| *c == name)
        .map(|(_, value)| *value)
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant number
    Number(f64),

    /// Variable reference; metadata paths are dotted (`data.T`)
    Variable(String),

    /// Unary operations
    Unary(UnaryOp, Box<Expression>),

    /// Binary operations
    Binary(BinaryOp, Box<Expression>, Box<Expression>),

    /// Function call
    Function(String, Vec<Expression>),
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// Negation (-)
    Neg,

    /// Identity (+)
    Plus,
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Power (`**` or `^`)
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => PREC_COMPARE,
            BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
            BinaryOp::Mul | BinaryOp::Div => PREC_MUL,
            BinaryOp::Pow => PREC_POW,
        }
    }
}

const PREC_COMPARE: u8 = 0;
const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;
const PREC_UNARY: u8 = 3;
const PREC_POW: u8 = 4;
const PREC_ATOM: u8 = 5;

/// Context for expression evaluation, providing variable values
pub trait EvaluationContext {
    /// Get the value of a variable (or dotted metadata path)
    fn get_variable(&self, name: &str) -> ExprResult<f64>;

    /// Check if a variable exists
    fn has_variable(&self, name: &str) -> bool {
        self.get_variable(name).is_ok()
    }
}

/// Simple implementation of EvaluationContext using a HashMap
#[derive(Debug, Clone, Default)]
pub struct SimpleContext {
    /// Map of variable names to values
    variables: HashMap<String, f64>,
}

impl SimpleContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }

    /// Set a variable value
    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.variables.insert(name.to_string(), value);
    }

    /// Create a new context with the given variables
    pub fn with_variables(variables: HashMap<String, f64>) -> Self {
        Self { variables }
    }
}

impl EvaluationContext for SimpleContext {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.variables.get_variable(name)
    }
}

impl EvaluationContext for HashMap<String, f64> {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.get(name)
            .copied()
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

impl Expression {
    /// Parse an expression from a string.
    ///
    /// Function names and argument counts are checked here, so a parsed
    /// expression can only fail at evaluation time on missing names or
    /// arithmetic problems.
    pub fn parse(input: &str) -> ExprResult<Self> {
        let parse_error = |message: String| ExpressionError::ParseError {
            input: input.to_string(),
            message,
        };

        let (remainder, expr) = expression(input).map_err(|e| parse_error(format!("{:?}", e)))?;
        if !remainder.trim().is_empty() {
            return Err(parse_error(format!(
                "unexpected trailing characters '{}'",
                remainder.trim()
            )));
        }

        expr.validate()?;
        Ok(expr)
    }

    fn validate(&self) -> ExprResult<()> {
        match self {
            Self::Number(_) | Self::Variable(_) => Ok(()),
            Self::Unary(_, inner) => inner.validate(),
            Self::Binary(_, left, right) => {
                left.validate()?;
                right.validate()
            }
            Self::Function(name, args) => {
                let (_, min, max) = FUNCTIONS
                    .iter()
                    .find(|(f, _, _)| f == name)
                    .ok_or_else(|| ExpressionError::UndefinedFunction { name: name.clone() })?;
                if args.len() < *min || args.len() > *max {
                    return Err(ExpressionError::InvalidOperation {
                        message: format!("{}() called with {} arguments", name, args.len()),
                    });
                }
                args.iter().try_for_each(|arg| arg.validate())
            }
        }
    }

    /// Evaluate the expression with the given context
    pub fn evaluate<C: EvaluationContext + ?Sized>(&self, context: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),

            Self::Variable(name) => match constant(name) {
                Some(value) => Ok(value),
                None => context.get_variable(name),
            },

            Self::Unary(op, expr) => {
                let value = expr.evaluate(context)?;
                match op {
                    UnaryOp::Neg => Ok(-value),
                    UnaryOp::Plus => Ok(value),
                }
            }

            Self::Binary(op, left, right) => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                let truth = |b: bool| if b { 1.0 } else { 0.0 };

                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            Err(ExpressionError::DivisionByZero)
                        } else {
                            Ok(lhs / rhs)
                        }
                    }
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                    BinaryOp::Lt => Ok(truth(lhs < rhs)),
                    BinaryOp::Le => Ok(truth(lhs <= rhs)),
                    BinaryOp::Gt => Ok(truth(lhs > rhs)),
                    BinaryOp::Ge => Ok(truth(lhs >= rhs)),
                    BinaryOp::Eq => Ok(truth(lhs == rhs)),
                    BinaryOp::Ne => Ok(truth(lhs != rhs)),
                }
            }

            Self::Function(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<ExprResult<Vec<f64>>>()?;
                apply_function(name, &values)
            }
        }
    }

    /// Find all variable names used in the expression (sorted, deduplicated)
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars.sort();
        vars.dedup();
        vars
    }

    fn collect_variables(&self, vars: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => {
                if constant(name).is_none() {
                    vars.push(name.clone());
                }
            }
            Self::Unary(_, expr) => expr.collect_variables(vars),
            Self::Binary(_, left, right) => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
            Self::Function(_, args) => {
                for arg in args {
                    arg.collect_variables(vars);
                }
            }
        }
    }

    /// Rename identifiers. `rename` receives every variable name and returns
    /// the replacement, or `None` to keep it.
    ///
    /// Whole identifiers are matched, so renaming `pos` never touches `pos2`.
    pub fn rename<F>(&self, rename: &F) -> Expression
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Self::Number(n) => Self::Number(*n),
            Self::Variable(name) => Self::Variable(rename(name).unwrap_or_else(|| name.clone())),
            Self::Unary(op, expr) => Self::Unary(*op, Box::new(expr.rename(rename))),
            Self::Binary(op, left, right) => Self::Binary(
                *op,
                Box::new(left.rename(rename)),
                Box::new(right.rename(rename)),
            ),
            Self::Function(name, args) => {
                Self::Function(name.clone(), args.iter().map(|a| a.rename(rename)).collect())
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Number(n) if *n < 0.0 => PREC_UNARY,
            Self::Number(_) | Self::Variable(_) | Self::Function(_, _) => PREC_ATOM,
            Self::Unary(_, _) => PREC_UNARY,
            Self::Binary(op, _, _) => op.precedence(),
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Variable(name) => write!(f, "{}", name),
            Self::Unary(op, expr) => {
                let sign = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                };
                write!(f, "{}", sign)?;
                expr.fmt_operand(f, PREC_UNARY)
            }
            Self::Binary(op, left, right) => {
                let (left_min, right_min) = match op {
                    BinaryOp::Pow => (PREC_ATOM, PREC_UNARY),
                    _ if op.precedence() == PREC_COMPARE => (PREC_ADD, PREC_ADD),
                    _ => (op.precedence(), op.precedence() + 1),
                };
                left.fmt_operand(f, left_min)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_operand(f, right_min)
            }
            Self::Function(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn apply_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let unary = |f: fn(f64) -> f64| -> ExprResult<f64> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(ExpressionError::InvalidOperation {
                message: format!("{}() requires 1 argument, got {}", name, args.len()),
            }),
        }
    };

    match name {
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "sinh" => unary(f64::sinh),
        "cosh" => unary(f64::cosh),
        "tanh" => unary(f64::tanh),
        "exp" => unary(f64::exp),
        "log" | "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sqrt" => unary(f64::sqrt),
        "abs" => unary(f64::abs),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "atan2" => match args {
            [y, x] => Ok(y.atan2(*x)),
            _ => Err(ExpressionError::InvalidOperation {
                message: format!("atan2() requires 2 arguments, got {}", args.len()),
            }),
        },
        "max" | "min" if args.len() < 2 => Err(ExpressionError::InvalidOperation {
            message: format!(
                "{}() requires at least 2 arguments, got {}",
                name,
                args.len()
            ),
        }),
        "max" => Ok(args.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))),
        "min" => Ok(args.iter().fold(f64::INFINITY, |a, &b| a.min(b))),
        _ => Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        }),
    }
}

// Parser functions using nom

type PResult<'a, T> = IResult<&'a str, T>;

/// Wrap a parser so that it skips surrounding whitespace
pub(crate) fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

/// Parse a bare identifier
pub(crate) fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

/// Parse a dotted identifier path (`data.d0.T`)
fn path(input: &str) -> PResult<'_, &str> {
    recognize(pair(identifier, many0(pair(char('.'), identifier)))).parse(input)
}

/// Parse an unsigned floating point literal
pub(crate) fn float_literal(input: &str) -> PResult<'_, f64> {
    map_res(
        alt((
            recognize((
                digit1,
                opt((char('.'), digit0)),
                opt((one_of("eE"), opt(one_of("+-")), digit1)),
            )),
            recognize((
                char('.'),
                digit1,
                opt((one_of("eE"), opt(one_of("+-")), digit1)),
            )),
        )),
        |s: &str| s.parse::<f64>(),
    )
    .parse(input)
}

fn number(input: &str) -> PResult<'_, Expression> {
    let (input, value) = float_literal(input)?;
    Ok((input, Expression::Number(value)))
}

fn function_call(input: &str) -> PResult<'_, Expression> {
    let (input, name) = identifier(input)?;
    let (mut input, _) = ws(char('(')).parse(input)?;

    let mut args = Vec::new();
    if let Ok((rest, _)) = ws(char(')')).parse(input) {
        return Ok((rest, Expression::Function(name.to_string(), args)));
    }

    loop {
        let (rest, arg) = expression(input)?;
        args.push(arg);
        if let Ok((rest, _)) = ws(char(',')).parse(rest) {
            input = rest;
            continue;
        }
        let (rest, _) = ws(char(')')).parse(rest)?;
        return Ok((rest, Expression::Function(name.to_string(), args)));
    }
}

fn variable(input: &str) -> PResult<'_, Expression> {
    let (input, name) = path(input)?;
    Ok((input, Expression::Variable(name.to_string())))
}

fn parens(input: &str) -> PResult<'_, Expression> {
    delimited(ws(char('(')), expression, ws(char(')'))).parse(input)
}

fn primary(input: &str) -> PResult<'_, Expression> {
    ws(alt((number, function_call, variable, parens))).parse(input)
}

/// `primary (('**' | '^') unary)?` with right associativity
fn power(input: &str) -> PResult<'_, Expression> {
    let (input, base) = primary(input)?;
    match ws(alt((tag("**"), tag("^")))).parse(input) {
        Ok((rest, _)) => {
            let (rest, exponent) = unary(rest)?;
            Ok((
                rest,
                Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

fn unary(input: &str) -> PResult<'_, Expression> {
    let (input, _) = multispace0::<&str, nom::error::Error<&str>>(input)?;
    if let Ok((rest, sign)) = one_of::<_, _, nom::error::Error<&str>>("+-").parse(input) {
        let (rest, operand) = unary(rest)?;
        let op = if sign == '-' { UnaryOp::Neg } else { UnaryOp::Plus };
        return Ok((rest, Expression::Unary(op, Box::new(operand))));
    }
    power(input)
}

fn term(input: &str) -> PResult<'_, Expression> {
    let (mut input, mut left) = unary(input)?;
    loop {
        let op = ws(alt((terminated(char('*'), not(char('*'))), char('/')))).parse(input);
        match op {
            Ok((rest, op)) => {
                let (rest, right) = unary(rest)?;
                let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
                left = Expression::Binary(op, Box::new(left), Box::new(right));
                input = rest;
            }
            Err(_) => return Ok((input, left)),
        }
    }
}

fn additive(input: &str) -> PResult<'_, Expression> {
    let (mut input, mut left) = term(input)?;
    loop {
        match ws(one_of("+-")).parse(input) {
            Ok((rest, op)) => {
                let (rest, right) = term(rest)?;
                let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
                left = Expression::Binary(op, Box::new(left), Box::new(right));
                input = rest;
            }
            Err(_) => return Ok((input, left)),
        }
    }
}

fn comparison_op(input: &str) -> PResult<'_, BinaryOp> {
    let (input, op) = ws(alt((
        tag("<="),
        tag(">="),
        tag("=="),
        tag("!="),
        tag("<"),
        tag(">"),
    )))
    .parse(input)?;
    let op = match op {
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        _ => BinaryOp::Gt,
    };
    Ok((input, op))
}

fn expression(input: &str) -> PResult<'_, Expression> {
    let (input, left) = additive(input)?;
    match comparison_op(input) {
        Ok((rest, op)) => {
            let (rest, right) = additive(rest)?;
            Ok((rest, Expression::Binary(op, Box::new(left), Box::new(right))))
        }
        Err(_) => Ok((input, left)),
    }
}
