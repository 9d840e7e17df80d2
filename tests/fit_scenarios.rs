//! End-to-end fits of single datasets.

use crate::test_helpers::five_point_peak;
use approx::assert_abs_diff_eq;
use scanfit::config::FitOptions;
use scanfit::error::Result;
use scanfit::fit::{Fitter, CURVE_POINTS};
use scanfit::model::{parse_model, Model};

const PEAK: &str = "Gauss('p', pos=3, ampl=4, fwhm=2)";

#[test]
fn test_five_point_peak() -> Result<()> {
    let mut model = parse_model(PEAK)?;
    let result = scanfit::fit(model.as_mut(), &five_point_peak())?;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.backend, "bounded");
    assert_eq!((result.n_points, result.n_free), (5, 3));
    assert_abs_diff_eq!(result.get("p_pos").unwrap().value, 3.0, epsilon = 1e-4);
    assert_abs_diff_eq!(result.get("p_ampl").unwrap().value, 4.0, epsilon = 1e-2);
    assert_abs_diff_eq!(result.get("p_fwhm").unwrap().value, 2f64.sqrt(), epsilon = 1e-2);
    assert!(result.chisqr < 1e-3);

    assert_eq!(result.curve_x.len(), CURVE_POINTS);
    assert_eq!(result.curve_y.len(), CURVE_POINTS);
    assert_eq!(result.curve_x[0], 1.0);
    assert_abs_diff_eq!(result.curve_x[CURVE_POINTS - 1], 5.0, epsilon = 1e-12);

    // the model itself holds the fitted values
    assert_eq!(model.param("p_pos").unwrap().value, result.get("p_pos").unwrap().value);
    Ok(())
}

#[test]
fn test_reset_restores_starting_values() -> Result<()> {
    let mut model = parse_model(PEAK)?;
    scanfit::fit(model.as_mut(), &five_point_peak())?;
    assert_ne!(model.param("p_fwhm").unwrap().value, 2.0);

    model.reset();
    for (name, value) in [("p_pos", 3.0), ("p_ampl", 4.0), ("p_fwhm", 2.0)] {
        let param = model.param(name).unwrap();
        assert_eq!(param.value, value);
        assert!(param.error.is_none());
        assert!(param.correl.is_empty());
    }
    Ok(())
}

#[test]
fn test_repeated_fits_are_identical() -> Result<()> {
    let data = five_point_peak();
    for backend in ["bounded", "unifit"] {
        let fitter = Fitter::with_backend_name(backend)?;
        let mut first = parse_model(PEAK)?;
        let mut second = parse_model(PEAK)?;
        assert_eq!(
            fitter.fit(first.as_mut(), &data)?,
            fitter.fit(second.as_mut(), &data)?
        );
    }
    Ok(())
}

#[test]
fn test_report_and_json() -> Result<()> {
    let mut model = parse_model(PEAK)?;
    let result = scanfit::fit(model.as_mut(), &five_point_peak())?;

    let report = result.to_string();
    assert!(report.starts_with(&format!("Model: {}\n", PEAK)));
    assert!(report.contains("Backend: bounded (converged"));
    assert!(report.contains("  p_pos = "));
    assert!(report.contains(" +/- "));

    let json: serde_json::Value = serde_json::from_str(&result.to_json()?)?;
    assert_eq!(json["backend"], "bounded");
    assert_eq!(json["params"][0]["name"], "p_pos");
    assert_eq!(json["curve_x"].as_array().unwrap().len(), CURVE_POINTS);
    Ok(())
}

#[test]
fn test_fixed_and_metadata_parameters() -> Result<()> {
    let data = five_point_peak().with_meta("center", 3.0);
    let mut model = parse_model("Gauss('p', pos=datapar('center'), ampl=3, fwhm='1.5')")?;
    let result = scanfit::fit(model.as_mut(), &data)?;

    assert_eq!(result.n_free, 1);
    assert_eq!(result.get("p_pos").unwrap().value, 3.0);
    assert_eq!(result.get("p_fwhm").unwrap().value, 1.5);
    assert!(result.get("p_ampl").unwrap().value > 3.0);
    Ok(())
}

#[test]
fn test_iteration_cap_is_a_soft_failure() -> Result<()> {
    let mut model = parse_model("Gauss('p', pos=2.5, ampl=1, fwhm=3)")?;
    let fitter = Fitter::with_backend_name("unifit")?
        .with_options(FitOptions::new().with("max_iterations", 1));
    let result = fitter.fit(model.as_mut(), &five_point_peak())?;

    assert!(!result.success);
    assert_eq!(result.iterations, 1);
    assert!(result.to_string().contains("not converged"));
    Ok(())
}
