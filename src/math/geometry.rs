//! Small 3-D geometric helpers on `nalgebra` vectors.
//!
//! Conventions:
//! - `orient(a, b, c, d) = (b - a) · ((c - a) × (d - a))`, positive when
//!   `abcd` is a positively oriented tetrahedron.
//! - Barycentric coordinates are returned in vertex order.
//! - The `*_exact` predicates take integer points with coordinates in
//!   `[0, 2^22]` and are evaluated in `i128` without rounding.

use nalgebra::{Matrix3, Vector3};

pub type Point3 = Vector3<f64>;

pub fn point(p: [f64; 3]) -> Point3 {
    Vector3::new(p[0], p[1], p[2])
}

/// Six times the signed volume of `abcd`.
pub fn orient(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a)))
}

/// Integer point for the exact predicates.
pub type IPoint = [i64; 3];

/// Largest coordinate the exact predicates accept without overflow.
pub const EXACT_MAX: i64 = 1 << 22;

fn diff(a: &IPoint, b: &IPoint) -> [i128; 3] {
    std::array::from_fn(|k| (a[k] - b[k]) as i128)
}

fn det3(u: &[i128; 3], v: &[i128; 3], w: &[i128; 3]) -> i128 {
    u[0] * (v[1] * w[2] - v[2] * w[1]) - u[1] * (v[0] * w[2] - v[2] * w[0])
        + u[2] * (v[0] * w[1] - v[1] * w[0])
}

fn cross(u: &[i128; 3], v: &[i128; 3]) -> [i128; 3] {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

pub fn collinear_exact(a: &IPoint, b: &IPoint, c: &IPoint) -> bool {
    cross(&diff(b, a), &diff(c, a)) == [0; 3]
}

/// Exact `orient`.
pub fn orient_exact(a: &IPoint, b: &IPoint, c: &IPoint, d: &IPoint) -> i128 {
    det3(&diff(b, a), &diff(c, a), &diff(d, a))
}

/// Positive when `e` is strictly inside the circumsphere of the positively
/// oriented tetrahedron `abcd`, zero when on it.
pub fn insphere_exact(a: &IPoint, b: &IPoint, c: &IPoint, d: &IPoint, e: &IPoint) -> i128 {
    let [ra, rb, rc, rd] = [a, b, c, d].map(|v| diff(v, e));
    let lift = |r: &[i128; 3]| r[0] * r[0] + r[1] * r[1] + r[2] * r[2];
    lift(&ra) * det3(&rb, &rc, &rd) - lift(&rb) * det3(&ra, &rc, &rd) + lift(&rc) * det3(&ra, &rb, &rd)
        - lift(&rd) * det3(&ra, &rb, &rc)
}

/// Whether `e`, coplanar with the non-degenerate triangle `abc`, lies
/// strictly inside its circumcircle.
pub fn in_circumcircle_exact(a: &IPoint, b: &IPoint, c: &IPoint, e: &IPoint) -> bool {
    let n = cross(&diff(b, a), &diff(c, a));
    // Drop the axis the plane is least inclined to; (i, j, k) stays cyclic so
    // the projected orientation of abc is n[k].
    let k = (0..3).max_by_key(|&k| n[k].abs()).unwrap_or(2);
    let (i, j) = ((k + 1) % 3, (k + 2) % 3);
    let row = |v: &IPoint| {
        let r = diff(v, e);
        [r[i], r[j], r[0] * r[0] + r[1] * r[1] + r[2] * r[2]]
    };
    let det = det3(&row(a), &row(b), &row(c));
    det.signum() * n[k].signum() > 0
}

/// Barycentric coordinates of `p` in `abcd`, or `None` if degenerate.
pub fn barycentric(a: &Point3, b: &Point3, c: &Point3, d: &Point3, p: &Point3) -> Option<[f64; 4]> {
    let t = Matrix3::from_columns(&[b - a, c - a, d - a]);
    let l = t.lu().solve(&(p - a))?;
    if !l.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some([1.0 - l.x - l.y - l.z, l.x, l.y, l.z])
}
