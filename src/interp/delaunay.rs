//! 3-D Delaunay triangulation of scattered grid points.
//!
//! Construction is incremental Bowyer–Watson over the convex hull:
//!
//! - coordinates are normalized to the unit cube and snapped to a `2^22`
//!   integer lattice, so orientation and insphere tests are exact; input
//!   points landing on the same node are merged
//! - the outside of the hull is closed off by ghost tetrahedra sharing a
//!   vertex at infinity; a ghost conflicts with a point beyond its hull face,
//!   or coplanar with the face and strictly inside its circumcircle
//! - points are inserted in a biased randomized order (random rounds, each
//!   sorted along a Morton curve) so point location stays a short walk
//! - the cavity holds exactly the tetrahedra whose circumsphere strictly
//!   contains the new point, grown face by face from the one that contains
//!   it; every boundary face is then strictly visible and gets re-starred
//!
//! Queries walk from a bucketed start tetrahedron towards the query point.
//! Leaving through a hull face means the point is outside the grid.

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{
    EXACT_MAX, IPoint, Point3, barycentric, collinear_exact, in_circumcircle_exact, insphere_exact, orient,
    orient_exact, point,
};

const NO_TET: u32 = u32::MAX;
/// Vertex at infinity shared by the ghost tetrahedra.
const INFINITE: u32 = u32::MAX;
const SEED: u64 = 0x5eed_0de1_a0e7;
const SNAP: f64 = EXACT_MAX as f64;
/// Barycentric slack for points on (or numerically just outside) a face.
const BARY_TOL: f64 = 1e-7;
/// Normalized distance outside the hull still treated as on it.
const HULL_TOL: f64 = 4.0 / SNAP;
const BUCKETS: usize = 16;
const MAX_WALK: usize = 4096;

/// Input-point indices and barycentric weights of a located point.
pub type Corners = [(usize, f64); 4];

/// Triangulated point set in normalized coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangulation {
    /// Normalized vertices, each on the snapping lattice.
    points: Vec<[f64; 3]>,
    /// Index of the input point each vertex came from.
    source: Vec<u32>,
    lo: [f64; 3],
    scale: [f64; 3],
    tets: Vec<[u32; 4]>,
    /// `neighbors[t][i]` shares the face opposite vertex `i` of `t`.
    neighbors: Vec<[Option<u32>; 4]>,
    /// Start tetrahedron per bucket of the unit cube.
    buckets: Vec<u32>,
    n_input: usize,
    fingerprint: u64,
}

impl Triangulation {
    pub fn build(input: &[[f64; 3]]) -> Result<Self, AppError> {
        if input.len() < 4 {
            return Err(AppError::Interpolation(format!(
                "Need at least 4 points to triangulate, got {}.",
                input.len()
            )));
        }
        if let Some(i) = input.iter().position(|p| !p.iter().all(|x| x.is_finite())) {
            return Err(AppError::Interpolation(format!(
                "Point {i} has non-finite coordinates."
            )));
        }

        let (lo, scale) = normalization(input)?;

        let mut seen: HashSet<IPoint> = HashSet::with_capacity(input.len());
        let mut nodes: Vec<IPoint> = Vec::with_capacity(input.len());
        let mut source: Vec<u32> = Vec::with_capacity(input.len());
        for (i, p) in input.iter().enumerate() {
            let node = snap(&normalize(p, &lo, &scale));
            if seen.insert(node) {
                nodes.push(node);
                source.push(i as u32);
            }
        }
        let merged = input.len() - nodes.len();
        if merged > 0 {
            tracing::debug!(merged, "Merged coincident grid points");
        }
        if nodes.len() < 4 {
            return Err(AppError::Interpolation(
                "Fewer than 4 distinct points to triangulate.".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(SEED);
        let order = insertion_order(&nodes, &mut rng);
        let (first, rest) = initial_simplex(&nodes, &order)?;
        let mut builder = Builder::new(nodes, first);
        for v in rest {
            builder.insert(v)?;
        }
        let (tets, neighbors) = builder.finish();
        if tets.is_empty() {
            return Err(AppError::Interpolation(
                "Triangulation is empty; the points are degenerate.".into(),
            ));
        }

        let points: Vec<[f64; 3]> = builder.pts.iter().map(|n| n.map(|x| x as f64 / SNAP)).collect();
        let buckets = build_buckets(&points, &tets);
        tracing::debug!(vertices = points.len(), tets = tets.len(), "Built triangulation");

        Ok(Self {
            points,
            source,
            lo,
            scale,
            tets,
            neighbors,
            buckets,
            n_input: input.len(),
            fingerprint: fingerprint(input),
        })
    }

    pub fn n_tets(&self) -> usize {
        self.tets.len()
    }

    pub fn n_vertices(&self) -> usize {
        self.points.len()
    }

    /// Number of input points (duplicates included).
    pub fn n_input(&self) -> usize {
        self.n_input
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Input-point indices and barycentric weights of the tetrahedron
    /// containing `q`, or `None` outside the triangulated hull.
    pub fn locate(&self, q: [f64; 3]) -> Option<Corners> {
        if !q.iter().all(|x| x.is_finite()) {
            return None;
        }
        let p = normalize(&q, &self.lo, &self.scale);
        if p.iter().any(|&x| !(-HULL_TOL..=1.0 + HULL_TOL).contains(&x)) {
            return None;
        }
        let pv = point(p);

        let mut t = self.start_tet(&p);
        for _ in 0..MAX_WALK {
            let Some(w) = self.weights(t, &pv) else {
                return self.locate_exhaustive(&pv);
            };
            let (i, min) = argmin(&w);
            if min >= -BARY_TOL {
                return Some(self.corners(t, w));
            }
            match self.neighbors[t][i] {
                Some(n) => t = n as usize,
                None => return (self.outside_distance(t, &w) <= HULL_TOL).then(|| self.corners(t, w)),
            }
        }
        tracing::debug!("Point location walk did not converge; scanning");
        self.locate_exhaustive(&pv)
    }

    /// Scan every tetrahedron for the one `p` is deepest inside. `p` is
    /// outside if it lies beyond the plane of any hull face.
    fn locate_exhaustive(&self, p: &Point3) -> Option<Corners> {
        let mut best: Option<(usize, [f64; 4])> = None;
        for t in 0..self.tets.len() {
            let Some(w) = self.weights(t, p) else { continue };
            for k in 0..4 {
                if self.neighbors[t][k].is_none() && w[k] < 0.0 && self.plane_distance(t, k, w[k]) > HULL_TOL {
                    return None;
                }
            }
            if best.is_none_or(|(_, b)| argmin(&w).1 > argmin(&b).1) {
                best = Some((t, w));
            }
        }
        best.map(|(t, w)| self.corners(t, w))
    }

    fn weights(&self, t: usize, p: &Point3) -> Option<[f64; 4]> {
        let [a, b, c, d] = self.tets[t].map(|v| point(self.points[v as usize]));
        barycentric(&a, &b, &c, &d, p)
    }

    /// Normalized distance beyond the planes of `t` of the point with
    /// weights `w`; zero inside.
    fn outside_distance(&self, t: usize, w: &[f64; 4]) -> f64 {
        (0..4)
            .filter(|&k| w[k] < 0.0)
            .map(|k| self.plane_distance(t, k, w[k]))
            .fold(0.0, f64::max)
    }

    /// Distance beyond the plane of face `k` of `t` for a point whose
    /// weight on the opposite vertex is `wk`.
    fn plane_distance(&self, t: usize, k: usize, wk: f64) -> f64 {
        let v = self.tets[t].map(|i| point(self.points[i as usize]));
        let volume6 = orient(&v[0], &v[1], &v[2], &v[3]).abs();
        let [a, b, c] = face_slots(k).map(|s| v[s]);
        -wk * volume6 / (b - a).cross(&(c - a)).norm()
    }

    fn corners(&self, t: usize, w: [f64; 4]) -> Corners {
        let clipped = w.map(|x| x.max(0.0));
        let total: f64 = clipped.iter().sum();
        let v = self.tets[t];
        std::array::from_fn(|k| (self.source[v[k] as usize] as usize, clipped[k] / total))
    }

    fn start_tet(&self, p: &[f64; 3]) -> usize {
        self.buckets[bucket_of(p)] as usize
    }

    #[cfg(test)]
    fn node(&self, v: u32) -> IPoint {
        snap(&self.points[v as usize])
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        for (t, v) in self.tets.iter().enumerate() {
            let [a, b, c, d] = v.map(|i| self.node(i));
            assert!(orient_exact(&a, &b, &c, &d) > 0, "tet {t} not positively oriented");
            for (i, n) in self.neighbors[t].iter().enumerate() {
                let Some(n) = n else { continue };
                let back = self.neighbors[*n as usize].iter().filter(|x| **x == Some(t as u32)).count();
                assert_eq!(back, 1, "tet {t} face {i} not reciprocal");
            }
        }
    }

    /// No vertex strictly inside any circumsphere.
    #[cfg(test)]
    fn check_empty_spheres(&self) {
        for (t, v) in self.tets.iter().enumerate() {
            let [a, b, c, d] = v.map(|i| self.node(i));
            for e in 0..self.points.len() as u32 {
                assert!(
                    insphere_exact(&a, &b, &c, &d, &self.node(e)) <= 0,
                    "vertex {e} inside the circumsphere of tet {t}"
                );
            }
        }
    }

    #[cfg(test)]
    fn volume(&self) -> f64 {
        self.tets
            .iter()
            .map(|v| {
                let [a, b, c, d] = v.map(|i| point(self.points[i as usize]));
                orient(&a, &b, &c, &d) / 6.0
            })
            .sum()
    }
}

/// Hash of the exact input coordinates, used to match a cached
/// triangulation against a grid.
pub fn fingerprint(points: &[[f64; 3]]) -> u64 {
    let mut bytes = Vec::with_capacity(8 + points.len() * 24);
    bytes.extend_from_slice(&(points.len() as u64).to_le_bytes());
    for p in points {
        for x in p {
            bytes.extend_from_slice(&x.to_bits().to_le_bytes());
        }
    }
    crate::interp::cache::fnv1a64(&bytes)
}

fn normalization(points: &[[f64; 3]]) -> Result<([f64; 3], [f64; 3]), AppError> {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for p in points {
        for k in 0..3 {
            lo[k] = lo[k].min(p[k]);
            hi[k] = hi[k].max(p[k]);
        }
    }
    let mut scale = [0.0; 3];
    for k in 0..3 {
        scale[k] = hi[k] - lo[k];
        if scale[k] <= 0.0 {
            return Err(AppError::Interpolation(format!(
                "Points are degenerate along axis {k} (all equal to {}).",
                lo[k]
            )));
        }
    }
    Ok((lo, scale))
}

fn normalize(p: &[f64; 3], lo: &[f64; 3], scale: &[f64; 3]) -> [f64; 3] {
    std::array::from_fn(|k| (p[k] - lo[k]) / scale[k])
}

/// Nearest lattice node of a normalized point.
fn snap(p: &[f64; 3]) -> IPoint {
    p.map(|x| (x * SNAP).round().clamp(0.0, SNAP) as i64)
}

/// Slots of the face opposite slot `k`.
fn face_slots(k: usize) -> [usize; 3] {
    [(k + 1) % 4, (k + 2) % 4, (k + 3) % 4]
}

fn ghost_slot(v: &[u32; 4]) -> Option<usize> {
    v.iter().position(|&x| x == INFINITE)
}

fn argmin(w: &[f64; 4]) -> (usize, f64) {
    let mut best = (0, w[0]);
    for (i, &x) in w.iter().enumerate().skip(1) {
        if x < best.1 {
            best = (i, x);
        }
    }
    best
}

fn morton(p: &IPoint) -> u64 {
    fn spread(v: u32) -> u64 {
        let mut out = 0u64;
        for bit in 0..10 {
            out |= (((v >> bit) & 1) as u64) << (3 * bit);
        }
        out
    }
    let q = |x: i64| ((x >> 12) as u32).min(1023);
    spread(q(p[0])) | (spread(q(p[1])) << 1) | (spread(q(p[2])) << 2)
}

/// Random rounds of doubling size, each sorted along a Morton curve.
fn insertion_order(points: &[IPoint], rng: &mut StdRng) -> Vec<u32> {
    let mut idx: Vec<u32> = (0..points.len() as u32).collect();
    idx.shuffle(rng);

    let mut ends = Vec::new();
    let mut end = idx.len();
    while end > 0 {
        ends.push(end);
        if end <= 64 {
            break;
        }
        end /= 2;
    }
    ends.reverse();

    let mut start = 0;
    for end in ends {
        idx[start..end].sort_by_key(|&i| morton(&points[i as usize]));
        start = end;
    }
    idx
}

/// First four affinely independent points of `order`, positively oriented,
/// and the remaining order.
fn initial_simplex(nodes: &[IPoint], order: &[u32]) -> Result<([u32; 4], Vec<u32>), AppError> {
    let degenerate = || AppError::Interpolation("The points are coplanar; nothing to triangulate.".into());
    let at = |k: usize| &nodes[order[k] as usize];

    let c = (2..order.len())
        .find(|&k| !collinear_exact(at(0), at(1), at(k)))
        .ok_or_else(degenerate)?;
    let d = (c + 1..order.len())
        .find(|&k| orient_exact(at(0), at(1), at(c), at(k)) != 0)
        .ok_or_else(degenerate)?;

    let mut first = [order[0], order[1], order[c], order[d]];
    if orient_exact(at(0), at(1), at(c), at(d)) < 0 {
        first.swap(0, 1);
    }
    let rest = order
        .iter()
        .enumerate()
        .filter(|(k, _)| ![0, 1, c, d].contains(k))
        .map(|(_, &v)| v)
        .collect();
    Ok((first, rest))
}

fn bucket_of(p: &[f64; 3]) -> usize {
    let cell = |x: f64| ((x * BUCKETS as f64).max(0.0) as usize).min(BUCKETS - 1);
    (cell(p[0]) * BUCKETS + cell(p[1])) * BUCKETS + cell(p[2])
}

fn build_buckets(points: &[[f64; 3]], tets: &[[u32; 4]]) -> Vec<u32> {
    let mut buckets = vec![NO_TET; BUCKETS * BUCKETS * BUCKETS];
    for (t, v) in tets.iter().enumerate() {
        let centroid: [f64; 3] =
            std::array::from_fn(|k| v.iter().map(|&i| points[i as usize][k]).sum::<f64>() / 4.0);
        let b = bucket_of(&centroid);
        if buckets[b] == NO_TET {
            buckets[b] = t as u32;
        }
    }

    // Fill empty buckets from their face neighbours until none are left.
    while buckets.contains(&NO_TET) {
        let prev = buckets.clone();
        for x in 0..BUCKETS {
            for y in 0..BUCKETS {
                for z in 0..BUCKETS {
                    let b = (x * BUCKETS + y) * BUCKETS + z;
                    if prev[b] != NO_TET {
                        continue;
                    }
                    let around = [
                        (x.wrapping_sub(1), y, z),
                        (x + 1, y, z),
                        (x, y.wrapping_sub(1), z),
                        (x, y + 1, z),
                        (x, y, z.wrapping_sub(1)),
                        (x, y, z + 1),
                    ];
                    if let Some(t) = around
                        .iter()
                        .filter(|(a, b, c)| *a < BUCKETS && *b < BUCKETS && *c < BUCKETS)
                        .map(|(a, b, c)| prev[(a * BUCKETS + b) * BUCKETS + c])
                        .find(|&t| t != NO_TET)
                    {
                        buckets[b] = t;
                    }
                }
            }
        }
    }
    buckets
}

/// Mutable Bowyer–Watson state. Ghost tetrahedra carry [`INFINITE`] in one
/// slot and are oriented so that a point beyond their hull face, put in
/// that slot, gives a positive orientation.
struct Builder {
    pts: Vec<IPoint>,
    tets: Vec<[u32; 4]>,
    /// Always set for live tetrahedra: ghosts close the hull.
    nbrs: Vec<[u32; 4]>,
    alive: Vec<bool>,
    mark: Vec<u32>,
    free: Vec<u32>,
    epoch: u32,
    last: usize,
    cavity: Vec<usize>,
    stack: Vec<usize>,
    edges: HashMap<(u32, u32), (u32, usize)>,
}

/// Boundary face of a cavity: slot taken by the new point, outer tet and its
/// slot back, and the new tetrahedron's vertices.
type CavityFace = (usize, u32, usize, [u32; 4]);

impl Builder {
    fn new(pts: Vec<IPoint>, first: [u32; 4]) -> Self {
        let mut builder = Self {
            pts,
            tets: Vec::new(),
            nbrs: Vec::new(),
            alive: Vec::new(),
            mark: Vec::new(),
            free: Vec::new(),
            epoch: 0,
            last: 0,
            cavity: Vec::new(),
            stack: Vec::new(),
            edges: HashMap::new(),
        };
        let mut ids = vec![builder.alloc(first)];
        for i in 0..4 {
            let mut ghost = first;
            ghost[i] = INFINITE;
            match i {
                0 => ghost.swap(1, 2),
                1 => ghost.swap(0, 2),
                _ => ghost.swap(0, 1),
            }
            ids.push(builder.alloc(ghost));
        }
        builder.glue(&ids);
        builder
    }

    fn alloc(&mut self, v: [u32; 4]) -> u32 {
        if let Some(t) = self.free.pop() {
            let i = t as usize;
            self.tets[i] = v;
            self.nbrs[i] = [NO_TET; 4];
            self.alive[i] = true;
            return t;
        }
        self.tets.push(v);
        self.nbrs.push([NO_TET; 4]);
        self.alive.push(true);
        self.mark.push(0);
        (self.tets.len() - 1) as u32
    }

    /// Link the shared faces of `ids`.
    fn glue(&mut self, ids: &[u32]) {
        let mut open: HashMap<[u32; 3], (u32, usize)> = HashMap::new();
        for &t in ids {
            let v = self.tets[t as usize];
            for i in 0..4 {
                let mut face = face_slots(i).map(|s| v[s]);
                face.sort_unstable();
                match open.remove(&face) {
                    Some((u, j)) => {
                        self.nbrs[t as usize][i] = u;
                        self.nbrs[u as usize][j] = t;
                    }
                    None => {
                        open.insert(face, (t, i));
                    }
                }
            }
        }
    }

    /// Orientation of `v` with slot `i` replaced by `p`. The other slots
    /// must be finite.
    fn orient_with(&self, v: &[u32; 4], i: usize, p: &IPoint) -> i128 {
        let q = |k: usize| if k == i { *p } else { self.pts[v[k] as usize] };
        orient_exact(&q(0), &q(1), &q(2), &q(3))
    }

    fn conflicts(&self, t: usize, p: &IPoint) -> bool {
        let v = self.tets[t];
        let Some(j) = ghost_slot(&v) else {
            let [a, b, c, d] = v.map(|k| self.pts[k as usize]);
            return insphere_exact(&a, &b, &c, &d, p) > 0;
        };
        match self.orient_with(&v, j, p).signum() {
            1 => true,
            0 => {
                let [a, b, c] = face_slots(j).map(|s| self.pts[v[s] as usize]);
                in_circumcircle_exact(&a, &b, &c, p)
            }
            _ => false,
        }
    }

    /// A live tetrahedron, possibly a ghost, in conflict with `p`.
    fn locate(&self, p: &IPoint) -> Result<usize, AppError> {
        let mut t = if self.alive[self.last] {
            self.last
        } else {
            self.alive.iter().position(|&a| a).unwrap_or(0)
        };

        for step in 0..MAX_WALK * 4 {
            let v = self.tets[t];
            if let Some(j) = ghost_slot(&v) {
                if self.conflicts(t, p) {
                    return Ok(t);
                }
                t = self.nbrs[t][j] as usize;
                continue;
            }
            let next = (0..4)
                .map(|k| (k + step) % 4)
                .find(|&i| self.orient_with(&v, i, p) < 0);
            match next {
                Some(i) => t = self.nbrs[t][i] as usize,
                None if self.conflicts(t, p) => return Ok(t),
                None => break,
            }
        }

        tracing::debug!("Insertion walk did not converge; scanning");
        (0..self.tets.len())
            .filter(|&t| self.alive[t])
            .find(|&t| self.conflicts(t, p))
            .ok_or_else(|| AppError::Interpolation("Point location failed during triangulation.".into()))
    }

    fn insert(&mut self, pi: u32) -> Result<(), AppError> {
        let p = self.pts[pi as usize];
        let start = self.locate(&p)?;

        self.epoch += 2;
        let (inside, outside) = (self.epoch, self.epoch + 1);
        self.cavity.clear();
        self.stack.clear();
        self.cavity.push(start);
        self.stack.push(start);
        self.mark[start] = inside;

        while let Some(t) = self.stack.pop() {
            for n in self.nbrs[t] {
                let n = n as usize;
                if self.mark[n] == inside || self.mark[n] == outside {
                    continue;
                }
                if self.conflicts(n, &p) {
                    self.mark[n] = inside;
                    self.cavity.push(n);
                    self.stack.push(n);
                } else {
                    self.mark[n] = outside;
                }
            }
        }

        let faces = self.cavity_faces(pi, &p)?;

        for &c in &self.cavity {
            self.alive[c] = false;
            self.free.push(c as u32);
        }

        self.edges.clear();
        let mut newest = 0;
        for (i, n, nslot, v) in faces {
            let t = self.alloc(v);
            newest = t as usize;
            self.nbrs[newest][i] = n;
            self.nbrs[n as usize][nslot] = t;
            for j in (0..4).filter(|&j| j != i) {
                let mut rest = [0u32; 2];
                for (slot, k) in (0..4).filter(|&k| k != i && k != j).enumerate() {
                    rest[slot] = v[k];
                }
                let key = (rest[0].min(rest[1]), rest[0].max(rest[1]));
                match self.edges.remove(&key) {
                    Some((t2, j2)) => {
                        self.nbrs[newest][j] = t2;
                        self.nbrs[t2 as usize][j2] = t;
                    }
                    None => {
                        self.edges.insert(key, (t, j));
                    }
                }
            }
        }
        if !self.edges.is_empty() {
            return Err(AppError::Interpolation(format!(
                "Cavity for vertex {pi} is not closed ({} open faces).",
                self.edges.len()
            )));
        }
        self.last = newest;
        Ok(())
    }

    /// Boundary faces of the current cavity. Every finite new tetrahedron
    /// must come out positively oriented.
    fn cavity_faces(&self, pi: u32, p: &IPoint) -> Result<Vec<CavityFace>, AppError> {
        let inside = self.epoch;
        let mut faces = Vec::with_capacity(self.cavity.len() * 2);
        for &c in &self.cavity {
            for i in 0..4 {
                let n = self.nbrs[c][i];
                if self.mark[n as usize] == inside {
                    continue;
                }
                let mut v = self.tets[c];
                v[i] = pi;
                if ghost_slot(&v).is_none() && self.orient_with(&self.tets[c], i, p) <= 0 {
                    return Err(AppError::Interpolation(format!(
                        "Cavity for vertex {pi} is not star-shaped at tet {c}."
                    )));
                }
                let nslot = self.nbrs[n as usize]
                    .iter()
                    .position(|&x| x == c as u32)
                    .ok_or_else(|| AppError::Interpolation(format!("Broken adjacency at tet {c}.")))?;
                faces.push((i, n, nslot, v));
            }
        }
        Ok(faces)
    }

    /// Finite tetrahedra, compacted; faces against ghosts become hull faces.
    fn finish(&self) -> (Vec<[u32; 4]>, Vec<[Option<u32>; 4]>) {
        let keep: Vec<bool> = (0..self.tets.len())
            .map(|t| self.alive[t] && ghost_slot(&self.tets[t]).is_none())
            .collect();
        let mut remap = vec![NO_TET; self.tets.len()];
        let mut next = 0u32;
        for (t, &k) in keep.iter().enumerate() {
            if k {
                remap[t] = next;
                next += 1;
            }
        }

        let mut tets = Vec::with_capacity(next as usize);
        let mut neighbors = Vec::with_capacity(next as usize);
        for t in (0..self.tets.len()).filter(|&t| keep[t]) {
            tets.push(self.tets[t]);
            neighbors.push(self.nbrs[t].map(|n| Some(remap[n as usize]).filter(|&m| m != NO_TET)));
        }
        (tets, neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn lattice(nx: usize, ny: usize, nz: usize) -> Vec<[f64; 3]> {
        let mut out = Vec::new();
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    out.push([0.4 + 0.1 * i as f64, 9.0 + 0.25 * j as f64, -1.0 + 0.5 * k as f64]);
                }
            }
        }
        out
    }

    /// `(mass, log_age, feh)` tracks whose top mass falls with age, masses
    /// crowding towards the top of each track like a turnoff.
    fn isochrone_grid(n_feh: usize, n_age: usize, n_mass: usize) -> Vec<[f64; 3]> {
        let mut out = Vec::with_capacity(n_feh * n_age * n_mass);
        for f in 0..n_feh {
            let feh = -2.0 + 2.0 * f as f64 / (n_feh - 1) as f64;
            for a in 0..n_age {
                let log_age = 8.5 + 1.65 * a as f64 / (n_age - 1) as f64;
                let top = 0.1 + 3.5 * 10f64.powf(-0.8 * (log_age - 8.5)) + 0.02 * feh;
                for k in 0..n_mass {
                    let s = k as f64 / (n_mass - 1) as f64;
                    let mass = 0.1 + (top - 0.1) * (1.0 - (1.0 - s).powi(2));
                    out.push([mass, log_age, feh]);
                }
            }
        }
        out
    }

    fn linear(p: &[f64; 3]) -> f64 {
        1.5 * p[0] - 2.0 * p[1] + 0.75 * p[2] + 3.0
    }

    fn interpolate(tri: &Triangulation, values: &[f64], q: [f64; 3]) -> Option<f64> {
        tri.locate(q).map(|c| c.iter().map(|(i, w)| values[*i] * w).sum())
    }

    #[test]
    fn lattice_triangulation_fills_the_box() {
        let pts = lattice(4, 4, 3);
        let tri = Triangulation::build(&pts).unwrap();
        tri.check_invariants();
        tri.check_empty_spheres();
        assert_eq!(tri.n_vertices(), pts.len());
        assert!((tri.volume() - 1.0).abs() < 1e-6, "volume {}", tri.volume());
    }

    #[test]
    fn linear_functions_are_reproduced() {
        let pts = lattice(5, 4, 3);
        let values: Vec<f64> = pts.iter().map(linear).collect();
        let tri = Triangulation::build(&pts).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let q = [
                rng.gen_range(0.4..0.8),
                rng.gen_range(9.0..9.75),
                rng.gen_range(-1.0..0.0),
            ];
            let got = interpolate(&tri, &values, q).unwrap();
            assert!((got - linear(&q)).abs() < 1e-6, "at {q:?}: {got}");
        }
        let corner = pts[0];
        assert!((interpolate(&tri, &values, corner).unwrap() - linear(&corner)).abs() < 1e-6);
    }

    #[test]
    fn large_lattices_triangulate() {
        for (nx, ny, nz) in [(20, 10, 5), (60, 23, 2), (10, 10, 10)] {
            let pts = lattice(nx, ny, nz);
            let tri = Triangulation::build(&pts)
                .unwrap_or_else(|e| panic!("lattice {nx}x{ny}x{nz}: {e}"));
            tri.check_invariants();
            assert_eq!(tri.n_vertices(), pts.len());
            assert!((tri.volume() - 1.0).abs() < 1e-6, "{nx}x{ny}x{nz} volume {}", tri.volume());

            let values: Vec<f64> = pts.iter().map(linear).collect();
            let hi = pts[pts.len() - 1];
            let mut rng = StdRng::seed_from_u64(nx as u64);
            for _ in 0..100 {
                let q = [
                    rng.gen_range(0.4..hi[0]),
                    rng.gen_range(9.0..hi[1]),
                    rng.gen_range(-1.0..hi[2]),
                ];
                let got = interpolate(&tri, &values, q).unwrap();
                assert!((got - linear(&q)).abs() < 1e-5, "{nx}x{ny}x{nz} at {q:?}: {got}");
            }
        }
    }

    #[test]
    fn isochrone_shaped_grid_triangulates() {
        let pts = isochrone_grid(5, 23, 90);
        assert!(pts.len() > 10_000);
        let tri = Triangulation::build(&pts).unwrap();
        tri.check_invariants();
        assert_eq!(tri.n_vertices(), pts.len());

        // Midpoints between neighbouring masses of every track.
        let values: Vec<f64> = pts.iter().map(linear).collect();
        for (a, b) in pts.iter().zip(&pts[1..]).filter(|(a, b)| a[1] == b[1] && a[2] == b[2]) {
            let mid = [0.5 * (a[0] + b[0]), a[1], a[2]];
            let got = interpolate(&tri, &values, mid).unwrap_or_else(|| panic!("{mid:?} not located"));
            assert!((got - linear(&mid)).abs() < 1e-5, "at {mid:?}: {got}");
        }
    }

    #[test]
    fn points_inside_a_curved_hull_are_located() {
        let pts = isochrone_grid(4, 12, 40);
        let values: Vec<f64> = pts.iter().map(linear).collect();
        let tri = Triangulation::build(&pts).unwrap();
        tri.check_invariants();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let a = pts[rng.gen_range(0..pts.len())];
            let b = pts[rng.gen_range(0..pts.len())];
            let q: [f64; 3] = std::array::from_fn(|k| 0.5 * (a[k] + b[k]));
            let corners = tri.locate(q).unwrap_or_else(|| panic!("midpoint {q:?} not located"));
            let total: f64 = corners.iter().map(|(_, w)| w).sum();
            assert!((total - 1.0).abs() < 1e-12);
            let got: f64 = corners.iter().map(|(i, w)| values[*i] * w).sum();
            assert!((got - linear(&q)).abs() < 1e-5, "at {q:?}: {got}");
        }

        // Above the turnoff of old tracks but inside the bounding box.
        assert!(tri.locate([2.0, 10.0, -1.0]).is_none());
        assert!(tri.locate([3.0, 9.5, 0.0]).is_none());
    }

    #[test]
    fn walk_agrees_with_exhaustive_search() {
        let pts = isochrone_grid(3, 8, 20);
        let values: Vec<f64> = pts.iter().map(|p| (3.0 * p[0]).sin() + p[1] * p[1] - p[2]).collect();
        let tri = Triangulation::build(&pts).unwrap();
        let value = |c: Corners| c.iter().map(|(i, w)| values[*i] * w).sum::<f64>();

        let mut rng = StdRng::seed_from_u64(3);
        let (mut found, mut missed) = (0, 0);
        for _ in 0..400 {
            let q = [rng.gen_range(0.1..3.64), rng.gen_range(8.5..10.15), rng.gen_range(-2.0..0.0)];
            let walked = tri.locate(q);
            let scanned = tri.locate_exhaustive(&point(normalize(&q, &tri.lo, &tri.scale)));
            match (walked, scanned) {
                (Some(a), Some(b)) => {
                    assert!((value(a) - value(b)).abs() < 1e-6, "at {q:?}");
                    found += 1;
                }
                (None, None) => missed += 1,
                (a, b) => panic!("at {q:?}: walk {a:?}, scan {b:?}"),
            }
        }
        assert!(found > 50 && missed > 50, "found {found}, missed {missed}");
    }

    #[test]
    fn points_outside_the_hull_are_rejected() {
        let tri = Triangulation::build(&lattice(3, 3, 3)).unwrap();
        assert!(tri.locate([0.3, 9.2, -0.5]).is_none());
        assert!(tri.locate([0.5, 9.2, 0.1]).is_none());
        assert!(tri.locate([f64::NAN, 9.2, -0.5]).is_none());
        assert!(tri.locate([0.5, 9.2, -0.5]).is_some());
    }

    #[test]
    fn duplicate_points_map_to_first_occurrence() {
        let mut pts = lattice(3, 3, 2);
        pts.push(pts[4]);
        let tri = Triangulation::build(&pts).unwrap();
        assert_eq!(tri.n_input(), pts.len());
        assert_eq!(tri.n_vertices(), pts.len() - 1);
        let corners = tri.locate(pts[4]).unwrap();
        assert!(corners.iter().all(|(i, _)| *i != pts.len() - 1));
    }

    #[test]
    fn flat_point_sets_are_an_error() {
        let pts: Vec<[f64; 3]> = lattice(3, 3, 1);
        let err = Triangulation::build(&pts).unwrap_err();
        assert!(matches!(err, AppError::Interpolation(_)));
        assert!(Triangulation::build(&pts[..3]).is_err());

        let line: Vec<[f64; 3]> = (0..6).map(|i| [i as f64, 2.0 * i as f64, -(i as f64)]).collect();
        assert!(matches!(Triangulation::build(&line), Err(AppError::Interpolation(_))));
        let tilted: Vec<[f64; 3]> = (0..5)
            .flat_map(|i| (0..5).map(move |j| (i as f64 / 4.0, j as f64 / 4.0)))
            .map(|(x, y)| [x, y, 2.0 - x - y])
            .collect();
        assert!(matches!(Triangulation::build(&tilted), Err(AppError::Interpolation(_))));
    }

    #[test]
    fn fingerprint_tracks_coordinates() {
        let a = lattice(2, 2, 2);
        let mut b = a.clone();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        b[3][1] += 1e-12;
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
