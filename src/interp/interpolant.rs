//! Piecewise-linear interpolation of one grid column.

use std::sync::Arc;

use rayon::prelude::*;

use crate::error::AppError;
use crate::interp::delaunay::{Corners, Triangulation};

/// One column interpolated over a shared triangulation of
/// `(mass, log_age, feh)`. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct Interpolant {
    name: String,
    tri: Arc<Triangulation>,
    values: Arc<[f64]>,
}

impl Interpolant {
    pub fn new(name: impl Into<String>, tri: Arc<Triangulation>, values: &[f64]) -> Result<Self, AppError> {
        let name = name.into();
        if values.len() != tri.n_input() {
            return Err(AppError::Interpolation(format!(
                "Column `{name}` has {} values for {} grid points.",
                values.len(),
                tri.n_input()
            )));
        }
        Ok(Self {
            name,
            tri,
            values: values.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triangulation(&self) -> &Arc<Triangulation> {
        &self.tri
    }

    /// Interpolated value, or `NaN` outside the grid.
    pub fn eval(&self, mass: f64, log_age: f64, feh: f64) -> f64 {
        match self.tri.locate([mass, log_age, feh]) {
            Some(corners) => self.eval_at(&corners),
            None => f64::NAN,
        }
    }

    /// Value at a point already located in this interpolant's triangulation,
    /// so several columns can share one [`Triangulation::locate`].
    pub fn eval_at(&self, corners: &Corners) -> f64 {
        corners.iter().map(|&(i, w)| self.values[i] * w).sum()
    }

    pub fn eval_many(&self, points: &[[f64; 3]]) -> Vec<f64> {
        points
            .par_iter()
            .map(|p| self.eval(p[0], p[1], p[2]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> (Vec<[f64; 3]>, Vec<f64>) {
        let mut pts = Vec::new();
        let mut vals = Vec::new();
        for m in [0.5, 0.7, 0.9, 1.1] {
            for a in [9.0, 9.3, 9.6] {
                for f in [-1.0, -0.5, 0.0] {
                    pts.push([m, a, f]);
                    vals.push(2.0 * m + a - 0.5 * f);
                }
            }
        }
        (pts, vals)
    }

    #[test]
    fn eval_is_exact_for_linear_columns_and_nan_outside() {
        let (pts, vals) = grid();
        let tri = Arc::new(Triangulation::build(&pts).unwrap());
        let interp = Interpolant::new("x", tri, &vals).unwrap();

        let v = interp.eval(0.8, 9.45, -0.25);
        assert!((v - (1.6 + 9.45 + 0.125)).abs() < 1e-6);
        assert!(interp.eval(1.5, 9.45, -0.25).is_nan());
        assert!(interp.eval(0.8, 9.45, f64::NAN).is_nan());

        let many = interp.eval_many(&[[0.6, 9.1, -0.9], [2.0, 9.1, -0.9]]);
        assert!((many[0] - (1.2 + 9.1 + 0.45)).abs() < 1e-6);
        assert!(many[1].is_nan());
    }

    #[test]
    fn columns_share_one_point_location() {
        let (pts, vals) = grid();
        let tri = Arc::new(Triangulation::build(&pts).unwrap());
        let twice: Vec<f64> = vals.iter().map(|v| 2.0 * v).collect();
        let a = Interpolant::new("a", tri.clone(), &vals).unwrap();
        let b = Interpolant::new("b", tri.clone(), &twice).unwrap();

        let corners = tri.locate([0.65, 9.2, -0.7]).unwrap();
        assert_eq!(a.eval_at(&corners), a.eval(0.65, 9.2, -0.7));
        assert!((b.eval_at(&corners) - 2.0 * a.eval_at(&corners)).abs() < 1e-12);
    }

    #[test]
    fn value_count_must_match_points() {
        let (pts, vals) = grid();
        let tri = Arc::new(Triangulation::build(&pts).unwrap());
        assert!(Interpolant::new("x", tri, &vals[1..]).is_err());
    }
}
