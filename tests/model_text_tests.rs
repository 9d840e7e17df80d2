//! Tests for building models from text.

use scanfit::dataset::{MetaValue, Metadata};
use scanfit::error::Result;
use scanfit::model::{parse_model, Model, ModelRegistry};
use scanfit::models::{Background, Gauss, GaussShape};
use scanfit::parameters::ParamInit;
use scanfit::FitError;

#[test]
fn test_source_text_is_kept() -> Result<()> {
    let text = "Gauss('a', pos=0, ampl=1, fwhm=1) + Background()";
    let model = parse_model(text)?;
    assert_eq!(model.description(), text);
    assert_eq!(model.param_names(), vec!["a_pos", "a_ampl", "a_fwhm", "bkgd"]);
    assert_eq!(
        model.build_description(),
        "Gauss('a', pos=0, ampl=1, fwhm=1) + Background(bkgd=0)"
    );

    let mut copy = model.box_clone();
    copy.set_source(None);
    let rebuilt = parse_model(&copy.description())?;
    assert_eq!(rebuilt.param_names(), model.param_names());
    assert_eq!(rebuilt.get_components().len(), model.get_components().len());
    Ok(())
}

#[test]
fn test_initializers_from_text() -> Result<()> {
    let model = parse_model(
        "Gauss('p', pos=datapar('center'), ampl=(3, 0, None), fwhm=overall(0.4)) \
         + Background('b', bkgd='p_ampl / 10')",
    )?;
    let pos = model.param("p_pos").unwrap();
    assert_eq!(pos.expr.as_deref(), Some("data.center"));
    let ampl = model.param("p_ampl").unwrap();
    assert_eq!((ampl.pmin, ampl.pmax), (Some(0.0), None));
    assert!(model.param("p_fwhm").unwrap().overall);

    let mut meta = Metadata::new();
    meta.insert("center".to_string(), MetaValue::Number(1.5));
    let values = model.param_values(&meta)?;
    assert_eq!(values["p_pos"], 1.5);
    assert_eq!(values["b_bkgd"], 0.3);
    Ok(())
}

#[test]
fn test_text_errors() {
    assert!(matches!(
        parse_model("Gauss('p', pos=1"),
        Err(FitError::ModelSyntax(_))
    ));
    assert!(matches!(
        parse_model("Gauss('p', pos=1) +* 2"),
        Err(FitError::ModelSyntax(_))
    ));
    assert!(matches!(
        parse_model("Voigt('v', pos=1)"),
        Err(FitError::UnknownModel(name)) if name == "Voigt"
    ));
    assert!(matches!(
        parse_model("Gauss('p', height=1)"),
        Err(FitError::ParameterDefinition(_))
    ));
    assert!(matches!(
        parse_model("Gauss('1p')"),
        Err(FitError::ParameterDefinition(_))
    ));
    assert!(parse_model("Gauss('p', pos=1) + Gauss('p', pos=2)")
        .unwrap_err()
        .is_construction_error());
}

#[test]
fn test_constants_and_arithmetic() -> Result<()> {
    let model = parse_model("Constant(value=3) * (Background(bkgd=1) + 1) ** 2 / 4")?;
    let y = model.eval_current(&ndarray::array![0.0], &Metadata::new())?;
    assert_eq!(y[0], 3.0);
    assert!(model.is_modifier());
    assert!(parse_model("Constant(3)").is_err());
    Ok(())
}

fn narrow_gauss(name: &str, inits: &[(&str, ParamInit)]) -> Result<Box<dyn Model>> {
    let mut inits = inits.to_vec();
    if !inits.iter().any(|(key, _)| *key == "fwhm") {
        inits.push(("fwhm", ParamInit::Value(0.1)));
    }
    Ok(Box::new(Gauss::new(name, &inits)?))
}

#[test]
fn test_custom_registry() -> Result<()> {
    let mut registry = ModelRegistry::empty();
    registry.register_shape::<GaussShape>();
    registry.register("Narrow", narrow_gauss);
    assert!(registry.contains("Narrow"));
    assert!(!registry.contains("Background"));

    let model = registry.parse("Narrow('n', pos=2)")?;
    assert_eq!(model.param("n_fwhm").unwrap().value, 0.1);
    assert_eq!(model.description(), "Narrow('n', pos=2)");
    assert!(matches!(
        registry.parse("Background()"),
        Err(FitError::UnknownModel(_))
    ));

    let defaults = ModelRegistry::default();
    assert_eq!(defaults.names().count(), 11);
    assert!(defaults.create("Background", "b", &[])?.is_modifier());
    let _ = Background::with_defaults("b")?;
    Ok(())
}
