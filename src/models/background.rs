use super::Shape;
use ndarray::Array1;

/// Slope and intercept of the line through two clicked points.
fn line_through(points: &[(f64, f64)]) -> (f64, f64) {
    let (x1, y1) = points[0];
    let (x2, y2) = points[1];
    let slope = if x2 != x1 { (y2 - y1) / (x2 - x1) } else { 0.0 };
    (slope, y1 - slope * x1)
}

/// Flat background `bkgd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackgroundShape;

impl Shape for BackgroundShape {
    const CLASS: &'static str = "Background";
    const PARAMS: &'static [(&'static str, f64)] = &[("bkgd", 0.0)];
    const MODIFIER: bool = true;
    const PICK_POINTS: &'static [&'static str] = &["background"];

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        Array1::from_elem(x.len(), p[0])
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        vec![("bkgd", points[0].1)]
    }
}

/// Linear background `bkgd + slope * x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlopingBackgroundShape;

impl Shape for SlopingBackgroundShape {
    const CLASS: &'static str = "SlopingBackground";
    const PARAMS: &'static [(&'static str, f64)] = &[("bkgd", 0.0), ("slope", 0.0)];
    const MODIFIER: bool = true;
    const PICK_POINTS: &'static [&'static str] = &["left", "right"];

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| p[0] + p[1] * x)
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (slope, intercept) = line_through(points);
        vec![("bkgd", intercept), ("slope", slope)]
    }
}

/// `y0 + slope * x`, reported as its own component.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineShape;

impl Shape for StraightLineShape {
    const CLASS: &'static str = "StraightLine";
    const PARAMS: &'static [(&'static str, f64)] = &[("slope", 1.0), ("y0", 0.0)];
    const PICK_POINTS: &'static [&'static str] = &["left", "right"];

    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| p[1] + p[0] * x)
    }

    fn guess(points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        let (slope, intercept) = line_through(points);
        vec![("slope", slope), ("y0", intercept)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_backgrounds() {
        assert_eq!(BackgroundShape::evaluate(&[2.0], &array![1.0, 5.0]), array![2.0, 2.0]);
        assert_eq!(
            SlopingBackgroundShape::evaluate(&[1.0, 2.0], &array![0.0, 1.0]),
            array![1.0, 3.0]
        );
        assert_eq!(StraightLineShape::evaluate(&[2.0, 1.0], &array![0.0, 1.0]), array![1.0, 3.0]);
    }

    #[test]
    fn test_line_guess() {
        let guess = SlopingBackgroundShape::guess(&[(1.0, 3.0), (3.0, 7.0)]);
        assert_eq!(guess, vec![("bkgd", 1.0), ("slope", 2.0)]);
        assert_eq!(line_through(&[(1.0, 3.0), (1.0, 5.0)]), (0.0, 3.0));
    }
}
