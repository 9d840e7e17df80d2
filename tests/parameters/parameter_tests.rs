//! Integration tests for the Parameter struct

use scanfit::parameters::{Bounds, BoundsTransform, Finalize, ParamInit, Parameter, ParameterError};

#[test]
fn test_parameter_lifecycle() {
    let mut param = Parameter::new("amplitude", 10.0).unwrap();
    assert!(param.is_free());
    assert!(!param.has_bounds());
    assert!(param.error.is_none());

    // A fit stores the starting value and overwrites the outputs
    param.snapshot();
    param.value = 15.0;
    param.error = Some(0.5);
    param.correl.insert("width".to_string(), 0.3);
    param.snapshot();
    assert_eq!(param.original(), Some(10.0));

    param.reset();
    assert_eq!(param.value, 10.0);
    assert!(param.error.is_none());
    assert!(param.correl.is_empty());

    param.set_expr(Some("other * 2")).unwrap();
    assert!(!param.is_free());
    param.set_expr(None).unwrap();
    assert!(param.is_free());
}

#[test]
fn test_parameter_names() {
    assert!(Parameter::new("p1_pos", 0.0).is_ok());
    assert!(Parameter::new("_hidden", 0.0).is_ok());
    for name in ["1abc", "a-b", "", "a.b"] {
        assert!(matches!(
            Parameter::new(name, 0.0),
            Err(ParameterError::InvalidName { .. })
        ));
    }
    for name in ["data", "pi", "e", "sqrt", "max"] {
        assert!(matches!(
            Parameter::new(name, 0.0),
            Err(ParameterError::ReservedName { .. })
        ));
    }
}

#[test]
fn test_initializer_forms() {
    let p = Parameter::from_init("a", (5.0, Some(0.0), Some(2.0))).unwrap();
    assert_eq!(p.value, 2.0);
    assert_eq!((p.pmin, p.pmax), (Some(0.0), Some(2.0)));

    let p = Parameter::from_init("a", ParamInit::bounded(1.0, None, Some(3.0))).unwrap();
    assert!(p.has_bounds());
    assert_eq!(p.bounds().unwrap().min, f64::NEG_INFINITY);

    let p = Parameter::from_init("a", "b + 1").unwrap();
    assert_eq!(p.expr.as_deref(), Some("b + 1"));

    let p = Parameter::from_init("a", ParamInit::datapar("T")).unwrap();
    assert_eq!(p.expr.as_deref(), Some("data.T"));
    assert_eq!(p.current_init(), ParamInit::datapar("T"));

    let p = Parameter::from_init("a", ParamInit::overall((1.0, 0.0, 4.0))).unwrap();
    assert!(p.overall);
    assert_eq!(p.current_init().to_string(), "overall((1, 0, 4))");

    assert!(Parameter::from_init("a", (1.0, 2.0, 0.0)).is_err());
    assert!(Parameter::from_init("a", f64::NAN).is_err());
    assert!(Parameter::from_init("a", "b +").is_err());
    assert!(Parameter::from_init("a", ParamInit::overall(ParamInit::overall(1.0))).is_err());
}

#[test]
fn test_finalize() {
    let p = Parameter::new("width", -2.0).unwrap().with_finalize(Finalize::Abs);
    assert_eq!(p.finalize.apply(p.value), 2.0);
    assert_eq!(Finalize::Identity.apply(-2.0), -2.0);
}

#[test]
fn test_serde_roundtrip() {
    let mut p = Parameter::from_init("a", (1.0, 0.0, 2.0)).unwrap();
    p.error = Some(0.1);
    let json = serde_json::to_string(&p).unwrap();
    let back: Parameter = serde_json::from_str(&json).unwrap();
    assert_eq!(back.value, 1.0);
    assert_eq!(back.pmax, Some(2.0));
    assert_eq!(back.error, Some(0.1));
}

#[test]
fn test_bounds_transform() {
    let transform = BoundsTransform::new(Bounds::new(0.0, 2.0).unwrap());
    for internal in [-10.0, -1.0, 0.0, 0.5, 3.0, 100.0] {
        let external = transform.to_external(internal);
        assert!((0.0..=2.0).contains(&external));
    }
    let internal = transform.to_internal(1.5).unwrap();
    assert!((transform.to_external(internal) - 1.5).abs() < 1e-12);
    assert!(transform.to_internal(f64::INFINITY).is_err());

    let lower = BoundsTransform::new(Bounds::from_limits(Some(1.0), None).unwrap());
    assert!(lower.to_external(-50.0) >= 1.0);
    let internal = lower.to_internal(4.0).unwrap();
    assert!((lower.to_external(internal) - 4.0).abs() < 1e-12);
}
