//! Tests for dependency resolution

use scanfit::dataset::{MetaValue, Metadata};
use scanfit::parameters::resolver::{prepare, resolve_values, update};
use scanfit::parameters::Parameter;
use scanfit::FitError;

fn param(name: &str, init: &str) -> Parameter {
    Parameter::from_init(name, init).unwrap()
}

#[test]
fn test_partition_is_complete_and_disjoint() {
    let params = vec![
        Parameter::new("a", 1.0).unwrap(),
        param("b", "a + c"),
        Parameter::new("c", 2.0).unwrap(),
        param("d", "b * 2"),
    ];
    let prepared = prepare(&params, &Metadata::new()).unwrap();

    let dependent: Vec<&str> = prepared
        .dependency_order
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(prepared.free_names, vec!["a", "c"]);
    assert_eq!(dependent, vec!["b", "d"]);
    assert_eq!(prepared.free_values, vec![1.0, 2.0]);
    assert_eq!(prepared.pool.len(), params.len());
    assert_eq!(prepared.pool["d"], 6.0);
}

#[test]
fn test_resolution_is_order_independent() {
    let forward = vec![param("a", "b + 1"), param("b", "2")];
    let backward = vec![param("b", "2"), param("a", "b + 1")];
    for params in [forward, backward] {
        let values = resolve_values(&params, &Metadata::new()).unwrap();
        assert_eq!(values["a"], 3.0);
        assert_eq!(values["b"], 2.0);
    }

    let chain = vec![
        param("w", "z * 2"),
        param("z", "y * 2"),
        param("y", "x * 2"),
        Parameter::new("x", 1.0).unwrap(),
    ];
    assert_eq!(resolve_values(&chain, &Metadata::new()).unwrap()["w"], 8.0);
}

#[test]
fn test_cycles_are_reported() {
    let params = vec![param("a", "b"), param("b", "a"), Parameter::new("c", 1.0).unwrap()];
    match prepare(&params, &Metadata::new()) {
        Err(FitError::DependencyResolution { unresolved }) => {
            assert_eq!(unresolved, vec!["a", "b"]);
        }
        other => panic!("expected a resolution error, got {:?}", other.map(|_| ())),
    }

    let params = vec![param("a", "undefined_thing * 2")];
    assert!(matches!(
        prepare(&params, &Metadata::new()),
        Err(FitError::DependencyResolution { .. })
    ));
}

#[test]
fn test_metadata_and_evaluation_failures() {
    let mut meta = Metadata::new();
    meta.insert("T".to_string(), MetaValue::Number(50.0));

    let params = vec![param("width", "data.T / 10")];
    assert_eq!(resolve_values(&params, &meta).unwrap()["width"], 5.0);

    let params = vec![param("width", "data.B")];
    assert!(matches!(
        prepare(&params, &meta),
        Err(FitError::FitExecution(_))
    ));

    let params = vec![Parameter::new("a", 0.0).unwrap(), param("b", "1 / a")];
    assert!(matches!(
        prepare(&params, &meta),
        Err(FitError::FitExecution(_))
    ));

    let params = vec![Parameter::new("a", 0.0).unwrap(), Parameter::new("a", 1.0).unwrap()];
    assert!(matches!(
        prepare(&params, &meta),
        Err(FitError::ParameterDefinition(_))
    ));
}

#[test]
fn test_update_replays_order() {
    let params = vec![Parameter::new("a", 1.0).unwrap(), param("b", "a * 10")];
    let prepared = prepare(&params, &Metadata::new()).unwrap();
    let mut pool = prepared.pool.clone();
    pool.insert("a".to_string(), 4.0);
    update(&prepared.dependency_order, &Metadata::new(), &mut pool).unwrap();
    assert_eq!(pool["b"], 40.0);
}
