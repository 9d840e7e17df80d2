//! Global fits over several datasets.

use crate::test_helpers::{gaussian, noisy_scan};
use approx::assert_abs_diff_eq;
use scanfit::backends::{BoundedBackend, UnifitBackend};
use scanfit::config::FitOptions;
use scanfit::dataset::Dataset;
use scanfit::error::Result;
use scanfit::global::GlobalFit;
use scanfit::model::parse_model;

fn two_scans() -> Vec<Dataset> {
    vec![
        noisy_scan(|x| gaussian(x, 0.2, 3.0, 1.0), -3.0, 3.0, 81, 0.02, 1),
        noisy_scan(|x| gaussian(x, 0.2, 6.0, 1.5), -2.0, 4.0, 61, 0.02, 2),
    ]
}

#[test]
fn test_shared_position() -> Result<()> {
    let model = parse_model("Gauss('p', pos=overall(0), ampl=4, fwhm=1.2)")?;
    let mut global = GlobalFit::new(model.as_ref(), two_scans())?;

    for name in ["p_pos", "p_ampl__0", "p_ampl__1", "p_fwhm__0", "p_fwhm__1"] {
        assert!(global.param(name).is_some(), "{} missing", name);
    }
    assert_eq!(global.params().len(), 5);
    assert_eq!(global.residuals()?.len(), 81 + 61);

    let result = global.fit(&BoundedBackend, &FitOptions::new())?;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.len(), 2);

    let (first, second) = (&result.results[0], &result.results[1]);
    assert_eq!((first.n_points, second.n_points), (81, 61));
    assert_eq!(first.params.len(), 3);

    let (pos0, pos1) = (first.get("p_pos").unwrap(), second.get("p_pos").unwrap());
    assert_eq!(pos0.value, pos1.value);
    assert_eq!(pos0.error, pos1.error);
    assert!(pos0.error.unwrap() > 0.0);
    assert_abs_diff_eq!(pos0.value, 0.2, epsilon = 1e-2);
    assert_eq!(global.param("p_pos").unwrap().value, pos0.value);

    assert_abs_diff_eq!(first.get("p_ampl").unwrap().value, 3.0, epsilon = 0.05);
    assert_abs_diff_eq!(second.get("p_ampl").unwrap().value, 6.0, epsilon = 0.05);
    assert_abs_diff_eq!(first.get("p_fwhm").unwrap().value, 1.0, epsilon = 0.02);
    assert_abs_diff_eq!(second.get("p_fwhm").unwrap().value, 1.5, epsilon = 0.02);
    Ok(())
}

#[test]
fn test_metadata_per_dataset() -> Result<()> {
    let datasets: Vec<Dataset> = two_scans()
        .into_iter()
        .zip([1.0, 1.5])
        .map(|(data, width)| data.with_meta("width", width))
        .collect();
    let model = parse_model("Gauss('p', pos=overall(0), ampl=4, fwhm=datapar('width'))")?;
    let mut global = GlobalFit::new(model.as_ref(), datasets)?;
    assert_eq!(global.param("p_fwhm__1").unwrap().expr.as_deref(), Some("data.d1.width"));

    let result = global.fit(&UnifitBackend, &FitOptions::new())?;
    assert_eq!(result.results[0].get("p_fwhm").unwrap().value, 1.0);
    assert_eq!(result.results[1].get("p_fwhm").unwrap().value, 1.5);
    assert_eq!(result.results[0].n_free, 2);
    assert_abs_diff_eq!(result.results[1].get("p_ampl").unwrap().value, 6.0, epsilon = 0.05);
    Ok(())
}

#[test]
fn test_reset_after_global_fit() -> Result<()> {
    let model = parse_model("Gauss('p', pos=overall(0), ampl=4, fwhm=1.2)")?;
    let mut global = GlobalFit::new(model.as_ref(), two_scans())?;
    let before = global.residuals()?;
    global.fit(&BoundedBackend, &FitOptions::new())?;
    assert!(global.residuals()?.mapv(|r| r * r).sum() < before.mapv(|r| r * r).sum());

    global.reset();
    assert_eq!(global.param("p_ampl__1").unwrap().value, 4.0);
    assert_eq!(global.residuals()?, before);
    Ok(())
}
