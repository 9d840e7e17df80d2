//! Peak shapes.
//!
//! All peaks share the pick protocol `[background, peak, half maximum]`: the
//! position is the clicked peak x, the height is the peak y above the clicked
//! background, and the width follows from the half-maximum click.

use super::Shape;
use crate::parameters::Finalize;
use ndarray::Array1;
use std::f64::consts::{LN_2, PI};

const PEAK_PICKS: &[&str] = &["background", "peak", "half maximum"];

/// Position, height above background and half width at half maximum.
fn peak_guess(points: &[(f64, f64)]) -> (f64, f64, f64) {
    let (_, bg) = points[0];
    let (px, py) = points[1];
    let (hx, _) = points[2];
    (px, py - bg, (hx - px).abs())
}

fn gaussian(x: f64, pos: f64, fwhm: f64) -> f64 {
    (-(x - pos).powi(2) / fwhm.powi(2) * 4.0 * LN_2).exp()
}

fn lorentzian(x: f64, pos: f64, hwhm: f64) -> f64 {
    hwhm.powi(2) / ((x - pos).powi(2) + hwhm.powi(2))
}

fn abs_for(key: &str, keys: &[&str]) -> Finalize {
    if keys.contains(&key) {
        Finalize::Abs
    } else {
        Finalize::Identity
    }
}

/// Gaussian of peak height `ampl` and full width `fwhm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussShape;

impl Shape for GaussShape {
    const CLASS: &'static str = "Gauss";
    const PARAMS: &'static [(&'static str, f64)] = &[("pos", 0.0), ("ampl", 1.0), ("fwhm", 1.0)];
    const PICK_POINTS: &'static [&'static str] = PEAK_PICKS;

    fn finalizer(key: &str) -> Finalize {
        abs_for(key, &["ampl", "fwhm"])
    }

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| p[1].abs() * gaussian(x, p[0], p[2]))
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (pos, ampl, hwhm) = peak_guess(points);
        vec![("pos", pos), ("ampl", ampl), ("fwhm", 2.0 * hwhm)]
    }
}

/// Gaussian parametrized by its integrated area `int`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussIntShape;

impl GaussIntShape {
    fn area_factor() -> f64 {
        (PI / (4.0 * LN_2)).sqrt()
    }
}

impl Shape for GaussIntShape {
    const CLASS: &'static str = "GaussInt";
    const PARAMS: &'static [(&'static str, f64)] = &[("pos", 0.0), ("int", 1.0), ("fwhm", 1.0)];
    const PICK_POINTS: &'static [&'static str] = PEAK_PICKS;

    fn finalizer(key: &str) -> Finalize {
        abs_for(key, &["fwhm"])
    }

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        let height = p[1] / (p[2].abs() * Self::area_factor());
        x.mapv(|x| height * gaussian(x, p[0], p[2]))
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (pos, ampl, hwhm) = peak_guess(points);
        let fwhm = 2.0 * hwhm;
        vec![("pos", pos), ("int", ampl * fwhm * Self::area_factor()), ("fwhm", fwhm)]
    }
}

/// Lorentzian of peak height `ampl` and half width `width`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LorentzShape;

impl Shape for LorentzShape {
    const CLASS: &'static str = "Lorentz";
    const PARAMS: &'static [(&'static str, f64)] = &[("pos", 0.0), ("ampl", 1.0), ("width", 1.0)];
    const PICK_POINTS: &'static [&'static str] = PEAK_PICKS;

    fn finalizer(key: &str) -> Finalize {
        abs_for(key, &["ampl", "width"])
    }

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| p[1].abs() * lorentzian(x, p[0], p[2]))
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (pos, ampl, hwhm) = peak_guess(points);
        vec![("pos", pos), ("ampl", ampl), ("width", hwhm)]
    }
}

/// Normalized Lorentzian with area `int` and full width `fwhm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LorentzIntShape;

impl Shape for LorentzIntShape {
    const CLASS: &'static str = "LorentzInt";
    const PARAMS: &'static [(&'static str, f64)] = &[("pos", 0.0), ("int", 1.0), ("fwhm", 1.0)];
    const PICK_POINTS: &'static [&'static str] = PEAK_PICKS;

    fn finalizer(key: &str) -> Finalize {
        abs_for(key, &["fwhm"])
    }

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        let hwhm = p[2].abs() / 2.0;
        x.mapv(|x| p[1] / (PI * hwhm) * lorentzian(x, p[0], hwhm))
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (pos, ampl, hwhm) = peak_guess(points);
        vec![("pos", pos), ("int", ampl * PI * hwhm), ("fwhm", 2.0 * hwhm)]
    }
}

/// Mixture `ampl * (eta * L + (1 - eta) * G)` with a common `fwhm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PseudoVoigtShape;

impl Shape for PseudoVoigtShape {
    const CLASS: &'static str = "PseudoVoigt";
    const PARAMS: &'static [(&'static str, f64)] =
        &[("pos", 0.0), ("ampl", 1.0), ("fwhm", 1.0), ("eta", 0.5)];
    const PICK_POINTS: &'static [&'static str] = PEAK_PICKS;

    fn finalizer(key: &str) -> Finalize {
        abs_for(key, &["ampl", "fwhm"])
    }

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        let (pos, ampl, fwhm, eta) = (p[0], p[1].abs(), p[2], p[3]);
        x.mapv(|x| {
            ampl * (eta * lorentzian(x, pos, fwhm / 2.0) + (1.0 - eta) * gaussian(x, pos, fwhm))
        })
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (pos, ampl, hwhm) = peak_guess(points);
        vec![("pos", pos), ("ampl", ampl), ("fwhm", 2.0 * hwhm)]
    }
}
