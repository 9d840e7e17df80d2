use super::Shape;
use ndarray::Array1;

/// Exponential decay `y0 + ampl * exp(-x / tau)`.
///
/// Picks: the baseline level, a point at the start of the decay and a point
/// further along it. The decay constant follows from the ratio of the two
/// heights above the baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpDecayShape;

impl Shape for ExpDecayShape {
    const CLASS: &'static str = "ExpDecay";
    const PARAMS: &'static [(&'static str, f64)] = &[("y0", 0.0), ("ampl", 1.0), ("tau", 1.0)];
    const PICK_POINTS: &'static [&'static str] = &["baseline", "start", "decay"];

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| p[0] + p[1] * (-x / p[2]).exp())
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let y0 = points[0].1;
        let (x1, y1) = points[1];
        let (x2, y2) = points[2];
        let ratio = (y2 - y0) / (y1 - y0);
        let mut guess = vec![("y0", y0)];
        if ratio > 0.0 && ratio != 1.0 {
            let tau = -(x2 - x1) / ratio.ln();
            guess.push(("ampl", (y1 - y0) * (x1 / tau).exp()));
            guess.push(("tau", tau));
        }
        guess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_exp_decay() {
        let y = ExpDecayShape::evaluate(&[1.0, 2.0, 0.5], &array![0.0, 0.5]);
        assert_relative_eq!(y[0], 3.0);
        assert_relative_eq!(y[1], 1.0 + 2.0 / std::f64::consts::E);
    }

    #[test]
    fn test_exp_decay_guess() {
        let p = [0.5, 3.0, 2.0];
        let x = array![1.0, 4.0];
        let y = ExpDecayShape::evaluate(&p, &x);
        let guess = ExpDecayShape::guess(&[(10.0, 0.5), (x[0], y[0]), (x[1], y[1])]);
        assert_eq!(guess.len(), 3);
        assert_relative_eq!(guess[1].1, 3.0, epsilon = 1e-10);
        assert_relative_eq!(guess[2].1, 2.0, epsilon = 1e-10);

        let flat = ExpDecayShape::guess(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)]);
        assert_eq!(flat.len(), 1);
    }
}
