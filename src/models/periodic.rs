use super::Shape;
use ndarray::Array1;
use std::f64::consts::PI;

/// Cosine `ampl * cos(2π freq (x - x0))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineShape;

impl Shape for CosineShape {
    const CLASS: &'static str = "Cosine";
    const PARAMS: &'static [(&'static str, f64)] = &[("ampl", 1.0), ("freq", 1.0), ("x0", 0.0)];
    const PICK_POINTS: &'static [&'static str] = &["maximum", "next minimum"];

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| p[0] * (2.0 * PI * p[1] * (x - p[2])).cos())
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (max_x, max_y) = points[0];
        let (min_x, min_y) = points[1];
        vec![
            ("ampl", (max_y - min_y) / 2.0),
            ("freq", 1.0 / (2.0 * (min_x - max_x).abs())),
            ("x0", max_x),
        ]
    }
}
