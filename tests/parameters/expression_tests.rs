//! Tests for the Expression parsing and evaluation

use scanfit::dataset::{MetaValue, Metadata};
use scanfit::parameters::expression::{Expression, ExpressionError, SimpleContext};
use scanfit::parameters::{ParamValues, Scope};
use std::collections::HashMap;

fn eval(text: &str, vars: &[(&str, f64)]) -> Result<f64, ExpressionError> {
    let mut context = SimpleContext::new();
    for (name, value) in vars {
        context.set_variable(name, *value);
    }
    Expression::parse(text)?.evaluate(&context)
}

#[test]
fn test_expression_parsing() {
    let expr = Expression::parse("2 * (x + y) / z").unwrap();
    assert_eq!(expr.variables(), vec!["x", "y", "z"]);

    let expr = Expression::parse("  (  x  +  y  )  *  z  ").unwrap();
    assert_eq!(expr.variables().len(), 3);

    let expr = Expression::parse("sin(pi * x) + e").unwrap();
    assert_eq!(expr.variables(), vec!["x"]);

    let expr = Expression::parse("data.d0.T / 10").unwrap();
    assert_eq!(expr.variables(), vec!["data.d0.T"]);

    for text in ["", "x +", "x + (y", "@#$%", "2 x", "x = 1"] {
        assert!(
            matches!(Expression::parse(text), Err(ExpressionError::ParseError { .. })),
            "{:?} should not parse",
            text
        );
    }
}

#[test]
fn test_function_allow_list() {
    assert!(matches!(
        Expression::parse("system(1)"),
        Err(ExpressionError::UndefinedFunction { name }) if name == "system"
    ));
    assert!(Expression::parse("sqrt(1, 2)").is_err());
    assert!(Expression::parse("max(1)").is_err());
    assert_eq!(eval("max(x, 3, 2)", &[("x", 1.0)]).unwrap(), 3.0);
    assert_eq!(eval("min(x, 3, 2)", &[("x", 1.0)]).unwrap(), 1.0);
    assert!((eval("atan2(1, 1)", &[]).unwrap() - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
}

#[test]
fn test_operator_precedence() {
    let vars = [("x", 2.0), ("y", 3.0)];
    assert_eq!(eval("x + y * 2", &vars).unwrap(), 8.0);
    assert_eq!(eval("x - y - 1", &vars).unwrap(), -2.0);
    assert_eq!(eval("x ** y ** 2", &vars).unwrap(), 512.0);
    assert_eq!(eval("x ^ 2", &vars).unwrap(), 4.0);
    assert_eq!(eval("-x ** 2", &vars).unwrap(), -4.0);
    assert_eq!(eval("x ** -1", &vars).unwrap(), 0.5);
    assert_eq!(eval("(x < y) + (x >= y) * 10", &vars).unwrap(), 1.0);
    assert_eq!(eval("x == 2", &vars).unwrap(), 1.0);
    assert_eq!(eval("x != 2", &vars).unwrap(), 0.0);
}

#[test]
fn test_evaluation_errors() {
    assert!(matches!(
        eval("x / (y - 3)", &[("x", 1.0), ("y", 3.0)]),
        Err(ExpressionError::DivisionByZero)
    ));
    assert!(matches!(
        eval("x + q", &[("x", 1.0)]),
        Err(ExpressionError::UndefinedVariable { name }) if name == "q"
    ));
}

#[test]
fn test_metadata_scope() {
    let mut inner = Metadata::new();
    inner.insert("T".to_string(), MetaValue::Number(300.0));
    let mut meta = Metadata::new();
    meta.insert("T".to_string(), MetaValue::Number(10.0));
    meta.insert("d0".to_string(), MetaValue::Map(inner));
    meta.insert("label".to_string(), MetaValue::Text("scan".to_string()));

    let mut pool = ParamValues::new();
    pool.insert("a".to_string(), 2.0);
    let scope = Scope::new(&pool, &meta);

    let expr = Expression::parse("a * data.T + data.d0.T").unwrap();
    assert_eq!(expr.evaluate(&scope).unwrap(), 320.0);

    assert!(matches!(
        Expression::parse("data.missing").unwrap().evaluate(&scope),
        Err(ExpressionError::UndefinedMetadata { .. })
    ));
    assert!(matches!(
        Expression::parse("data.label").unwrap().evaluate(&scope),
        Err(ExpressionError::NotScalar { .. })
    ));
    assert!(Expression::parse("data").unwrap().evaluate(&scope).is_err());
}

#[test]
fn test_display_roundtrip() {
    let vars: HashMap<String, f64> = [("a", 1.5), ("b", -2.0), ("c", 4.0)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    for text in [
        "a - (b - c)",
        "(a + b) * c",
        "a / (b * c)",
        "-(a + b) ** 2",
        "(-a) ** 2",
        "a ** b ** c",
        "(a ** b) ** c",
        "max(a, -b, c / 2) + sqrt(abs(b))",
        "(a < b) == (c > 1)",
    ] {
        let expr = Expression::parse(text).unwrap();
        let reparsed = Expression::parse(&expr.to_string()).unwrap();
        assert_eq!(reparsed, expr, "{} -> {}", text, expr);
        assert_eq!(reparsed.evaluate(&vars).unwrap(), expr.evaluate(&vars).unwrap());
    }
}

#[test]
fn test_rename_whole_identifiers() {
    let expr = Expression::parse("pos + pos2 * data.pos").unwrap();
    let renamed = expr.rename(&|name: &str| (name == "pos").then(|| "pos__0".to_string()));
    assert_eq!(renamed.to_string(), "pos__0 + pos2 * data.pos");
}
