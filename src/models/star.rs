//! A star described by observed constraints, fitted against the model grids.
//!
//! Parameters are `[mass, log_age, feh, distance, av]`. Each constraint is
//! compiled once into a [`Term`] holding the interpolants it needs, so the
//! likelihood does no lookups. Each distinct triangulation behind those
//! interpolants is searched once per evaluation.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;

use crate::config::GRID_NAME;
use crate::domain::{
    BandRef, GridBounds, N_PARAMS, ObservedConstraint, P_AV, P_DISTANCE, P_FEH, P_LOG_AGE, P_MASS, PARAM_NAMES,
    PhotSystem, PriorBounds, SamplerConfig, SamplerKind, try_resolve_band,
};
use crate::error::AppError;
use crate::fit::{Posterior, PosteriorSample, run_fit};
use crate::grid::{COL_LOG_L, COL_LOG_TEFF, COL_LOGG};
use crate::interp::{Corners, Interpolant, Triangulation};
use crate::io::{FitRecord, load_samples, save_samples};
use crate::models::extinction::extinction_ratio;
use crate::models::isochrone::{Isochrone, radius_from_logg};

/// Distance used for the grid scan when nothing constrains it.
const DEFAULT_GUESS_DISTANCE_PC: f64 = 100.0;

/// A compiled constraint.
#[derive(Debug, Clone)]
enum Term {
    Teff(Arc<Interpolant>),
    Logg(Arc<Interpolant>),
    LogL(Arc<Interpolant>),
    Radius(Arc<Interpolant>),
    Mass,
    Feh,
    /// Milliarcseconds.
    Parallax,
    /// Apparent magnitude; `ratio` is `A_band / A_V`.
    Band {
        band: BandRef,
        interp: Arc<Interpolant>,
        ratio: f64,
    },
}

impl Term {
    fn interpolant(&self) -> Option<&Arc<Interpolant>> {
        match self {
            Term::Teff(i) | Term::Logg(i) | Term::LogL(i) | Term::Radius(i) => Some(i),
            Term::Band { interp, .. } => Some(interp),
            Term::Mass | Term::Feh | Term::Parallax => None,
        }
    }

    fn predict(&self, p: &[f64]) -> f64 {
        let at = self
            .interpolant()
            .and_then(|i| i.triangulation().locate([p[P_MASS], p[P_LOG_AGE], p[P_FEH]]));
        self.predict_at(p, at.as_ref())
    }

    /// Model value at `p`, given where `p` falls in this term's
    /// triangulation (`None` outside it).
    fn predict_at(&self, p: &[f64], at: Option<&Corners>) -> f64 {
        let column = || match (self.interpolant(), at) {
            (Some(i), Some(c)) => i.eval_at(c),
            _ => f64::NAN,
        };
        match self {
            Term::Teff(_) => 10f64.powf(column()),
            Term::Logg(_) | Term::LogL(_) => column(),
            Term::Radius(_) => radius_from_logg(p[P_MASS], column()),
            Term::Mass => p[P_MASS],
            Term::Feh => p[P_FEH],
            Term::Parallax => 1000.0 / p[P_DISTANCE],
            Term::Band { ratio, .. } => column() + distance_modulus(p[P_DISTANCE]) + p[P_AV] * ratio,
        }
    }
}

pub fn distance_modulus(distance_pc: f64) -> f64 {
    5.0 * (distance_pc / 10.0).log10()
}

pub struct StarModel {
    isochrone: Isochrone,
    constraints: Vec<ObservedConstraint>,
    terms: Vec<Term>,
    /// Distinct triangulations behind `terms`. The first is the physical
    /// system's and doubles as the hull check.
    tris: Vec<Arc<Triangulation>>,
    /// Index into `tris` per term.
    term_tri: Vec<Option<usize>>,
    prior: PriorBounds,
    best: Option<Vec<f64>>,
    sample: Option<PosteriorSample>,
}

impl std::fmt::Debug for StarModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarModel")
            .field("constraints", &self.constraints)
            .field("prior", &self.prior)
            .field("best", &self.best)
            .finish_non_exhaustive()
    }
}

impl StarModel {
    /// Compile `constraints` against `isochrone`.
    ///
    /// Property names (`Teff`, `logg`, `logL`, `radius`, `mass`, `feh`,
    /// `parallax`) match case-insensitively; anything else must be a band
    /// alias. Physical quantities come from the first band's system.
    pub fn new(isochrone: Isochrone, constraints: Vec<ObservedConstraint>) -> Result<Self, AppError> {
        if constraints.is_empty() {
            return Err(AppError::Config("At least one observed constraint is required.".into()));
        }
        for c in &constraints {
            if !c.value.is_finite() || !c.uncertainty.is_finite() || c.uncertainty <= 0.0 {
                return Err(AppError::Config(format!(
                    "Constraint `{}` needs a finite value and a positive uncertainty (got {} ± {}).",
                    c.name, c.value, c.uncertainty
                )));
            }
        }

        let first_band = constraints
            .iter()
            .filter(|c| property_kind(&c.name).is_none())
            .find_map(|c| try_resolve_band(&c.name));
        let isochrone = match first_band {
            Some(b) => isochrone.with_physical_system(b.system),
            None => isochrone,
        };

        let terms = constraints
            .iter()
            .map(|c| compile(&isochrone, &c.name))
            .collect::<Result<Vec<_>, _>>()?;
        let hull = isochrone.physical(COL_LOGG)?;
        let mut tris = vec![Arc::clone(hull.triangulation())];
        let mut term_tri = Vec::with_capacity(terms.len());
        for t in &terms {
            term_tri.push(t.interpolant().map(|i| {
                let tri = i.triangulation();
                tris.iter().position(|x| Arc::ptr_eq(x, tri)).unwrap_or_else(|| {
                    tris.push(Arc::clone(tri));
                    tris.len() - 1
                })
            }));
        }

        let mut systems = vec![isochrone.physical_system()];
        for t in &terms {
            if let Term::Band { band, .. } = t {
                if !systems.contains(&band.system) {
                    systems.push(band.system);
                }
            }
        }
        let prior = PriorBounds::from_grid(&common_bounds(&isochrone, &systems)?);

        tracing::debug!(
            constraints = constraints.len(),
            physical = %isochrone.physical_system(),
            "Prepared star model"
        );
        Ok(Self {
            isochrone,
            constraints,
            terms,
            tris,
            term_tri,
            prior,
            best: None,
            sample: None,
        })
    }

    pub fn with_max_distance(mut self, max_pc: f64) -> Result<Self, AppError> {
        if !(max_pc.is_finite() && max_pc > 0.0) {
            return Err(AppError::Config(format!("Maximum distance must be positive (got {max_pc}).")));
        }
        self.prior.distance.1 = max_pc;
        Ok(self)
    }

    pub fn with_max_av(mut self, max_av: f64) -> Result<Self, AppError> {
        if !(max_av.is_finite() && max_av >= 0.0) {
            return Err(AppError::Config(format!("Maximum A_V must be non-negative (got {max_av}).")));
        }
        self.prior.av.1 = max_av;
        Ok(self)
    }

    pub fn isochrone(&self) -> &Isochrone {
        &self.isochrone
    }

    pub fn constraints(&self) -> &[ObservedConstraint] {
        &self.constraints
    }

    /// Names of the constraints that are magnitudes, as given.
    pub fn bands(&self) -> Vec<String> {
        self.constraints
            .iter()
            .zip(&self.terms)
            .filter(|(_, t)| matches!(t, Term::Band { .. }))
            .map(|(c, _)| c.name.clone())
            .collect()
    }

    pub fn prior_bounds(&self) -> &PriorBounds {
        &self.prior
    }

    pub fn sample(&self) -> Option<&PosteriorSample> {
        self.sample.as_ref()
    }

    pub fn best_fit(&self) -> Option<&[f64]> {
        self.best.as_deref()
    }

    pub fn log_prior(&self, p: &[f64]) -> f64 {
        if self.prior.contains(p) { 0.0 } else { f64::NEG_INFINITY }
    }

    pub fn log_likelihood(&self, p: &[f64]) -> f64 {
        if self.log_prior(p) == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let q = [p[P_MASS], p[P_LOG_AGE], p[P_FEH]];
        let mut located: Vec<Corners> = Vec::with_capacity(self.tris.len());
        for tri in &self.tris {
            match tri.locate(q) {
                Some(c) => located.push(c),
                None => return f64::NEG_INFINITY,
            }
        }
        let mut chi2 = 0.0;
        for ((c, t), k) in self.constraints.iter().zip(&self.terms).zip(&self.term_tri) {
            let model = t.predict_at(p, k.map(|k| &located[k]));
            if model.is_nan() {
                return f64::NEG_INFINITY;
            }
            chi2 += ((model - c.value) / c.uncertainty).powi(2);
        }
        -0.5 * chi2
    }

    pub fn log_posterior(&self, p: &[f64]) -> f64 {
        Posterior::log_posterior(self, p)
    }

    /// Model value of each constraint at `p`, in constraint order.
    pub fn predicted(&self, p: &[f64]) -> Result<Vec<f64>, AppError> {
        if p.len() != N_PARAMS {
            return Err(AppError::Config(format!(
                "Expected {N_PARAMS} parameters, got {}.",
                p.len()
            )));
        }
        Ok(self.terms.iter().map(|t| t.predict(p)).collect())
    }

    /// Best tabulated grid point, with distance from the photometry (or the
    /// parallax) and zero extinction.
    pub fn maximum_likelihood_guess(&self) -> Result<Vec<f64>, AppError> {
        let model = self.isochrone.system(self.isochrone.physical_system())?;
        let points = model.grid.points()?;

        let best = points
            .par_iter()
            .filter(|q| {
                let within = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
                within(q[0], self.prior.mass) && within(q[1], self.prior.log_age) && within(q[2], self.prior.feh)
            })
            .map(|q| {
                let mut p = vec![q[0], q[1], q[2], 0.0, self.prior.av.0];
                p[P_DISTANCE] = self.guess_distance(&p);
                let ll = self.log_likelihood(&p);
                (ll, p)
            })
            .filter(|(ll, _)| ll.is_finite())
            .max_by(|a, b| a.0.total_cmp(&b.0));

        best.map(|(_, p)| p).ok_or_else(|| {
            AppError::Sampler("No tabulated grid point has a finite likelihood.".into())
        })
    }

    /// Inverse-variance distance modulus over the bands at `p` (`av` applied).
    fn guess_distance(&self, p: &[f64]) -> f64 {
        let (mut num, mut den) = (0.0, 0.0);
        for (c, t) in self.constraints.iter().zip(&self.terms) {
            if let Term::Band { interp, ratio, .. } = t {
                let abs = interp.eval(p[P_MASS], p[P_LOG_AGE], p[P_FEH]);
                if abs.is_finite() {
                    let w = c.uncertainty.powi(-2);
                    num += w * (c.value - abs - p[P_AV] * ratio);
                    den += w;
                }
            }
        }
        let d = if den > 0.0 {
            10f64.powf(num / den / 5.0 + 1.0)
        } else if let Some(plx) = self
            .constraints
            .iter()
            .zip(&self.terms)
            .find(|(c, t)| matches!(t, Term::Parallax) && c.value > 0.0)
            .map(|(c, _)| c.value)
        {
            1000.0 / plx
        } else {
            DEFAULT_GUESS_DISTANCE_PC
        };
        // 1 pc floor.
        d.max(1.0).min(self.prior.distance.1)
    }

    /// Sample the posterior; the sample and its best row are kept.
    pub fn fit(&mut self, kind: SamplerKind, config: &SamplerConfig) -> Result<&PosteriorSample, AppError> {
        let sample = run_fit(&*self, kind, config)?;
        self.best = sample.best_row().map(<[f64]>::to_vec);
        tracing::info!(
            sampler = %sample.sampler,
            samples = sample.len(),
            best = ?self.best,
            "Fit finished"
        );
        Ok(&*self.sample.insert(sample))
    }

    pub fn fit_record(&self, sampler: &str) -> FitRecord {
        let variant = self.isochrone.variant();
        FitRecord {
            version: env!("CARGO_PKG_VERSION").to_string(),
            grid: GRID_NAME.to_string(),
            afe: variant.afe.clone(),
            y: variant.y.clone(),
            bands: self.bands(),
            constraints: self.constraints.clone(),
            prior: Some(self.prior),
            sampler: sampler.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let sample = self
            .sample
            .as_ref()
            .ok_or_else(|| AppError::Config("Nothing to save: the model has not been fitted.".into()))?;
        save_samples(path, sample, &self.fit_record(&sample.sampler))
    }

    /// Rebuild a fitted model from a saved sample, under the prior box it was
    /// drawn with. The file must come from the same grid variant as
    /// `isochrone`.
    pub fn load(isochrone: Isochrone, path: &Path) -> Result<Self, AppError> {
        let (sample, record) = load_samples(path)?;
        let variant = isochrone.variant();
        if record.grid != GRID_NAME || record.afe != variant.afe || record.y != variant.y {
            return Err(AppError::Config(format!(
                "'{}' was fitted on {} {}{}, not {GRID_NAME} {}.",
                path.display(),
                record.grid,
                record.afe,
                record.y,
                variant.suffix(),
            )));
        }
        if !sample.param_names.iter().map(String::as_str).eq(PARAM_NAMES) {
            return Err(AppError::Config(format!(
                "'{}' has parameters {:?}, expected {PARAM_NAMES:?}.",
                path.display(),
                sample.param_names
            )));
        }

        let mut model = Self::new(isochrone, record.constraints)?;
        if let Some(prior) = record.prior {
            model.prior = prior;
        }
        model.best = sample.best_row().map(<[f64]>::to_vec);
        model.sample = Some(sample);
        Ok(model)
    }
}

impl Posterior for StarModel {
    fn ndim(&self) -> usize {
        N_PARAMS
    }

    fn param_names(&self) -> Vec<String> {
        PARAM_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn log_prior(&self, params: &[f64]) -> f64 {
        StarModel::log_prior(self, params)
    }

    fn log_likelihood(&self, params: &[f64]) -> f64 {
        StarModel::log_likelihood(self, params)
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.prior.as_box().to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Property {
    Teff,
    Logg,
    LogL,
    Radius,
    Mass,
    Feh,
    Parallax,
}

fn property_kind(name: &str) -> Option<Property> {
    Some(match name.to_ascii_lowercase().as_str() {
        "teff" => Property::Teff,
        "logg" => Property::Logg,
        "logl" => Property::LogL,
        "radius" => Property::Radius,
        "mass" => Property::Mass,
        "feh" => Property::Feh,
        "parallax" => Property::Parallax,
        _ => return None,
    })
}

fn compile(iso: &Isochrone, name: &str) -> Result<Term, AppError> {
    let Some(kind) = property_kind(name) else {
        let band = try_resolve_band(name).ok_or_else(|| {
            AppError::Lookup(format!(
                "Unknown property `{name}`: not Teff, logg, logL, radius, mass, feh, parallax, or a band."
            ))
        })?;
        let interp = iso.interpolant(band.system, &band.band)?;
        let ratio = extinction_ratio(&band)?;
        return Ok(Term::Band { band, interp, ratio });
    };
    Ok(match kind {
        Property::Teff => Term::Teff(iso.physical(COL_LOG_TEFF)?),
        Property::Logg => Term::Logg(iso.physical(COL_LOGG)?),
        Property::LogL => Term::LogL(iso.physical(COL_LOG_L)?),
        Property::Radius => Term::Radius(iso.physical(COL_LOGG)?),
        Property::Mass => Term::Mass,
        Property::Feh => Term::Feh,
        Property::Parallax => Term::Parallax,
    })
}

/// Intersection of the grid bounds of `systems`.
fn common_bounds(iso: &Isochrone, systems: &[PhotSystem]) -> Result<GridBounds, AppError> {
    let mut acc: Option<GridBounds> = None;
    for &s in systems {
        let b = iso.bounds(s)?;
        acc = Some(match acc {
            None => b,
            Some(a) => {
                let meet = |x: (f64, f64), y: (f64, f64)| (x.0.max(y.0), x.1.min(y.1));
                GridBounds {
                    mass: meet(a.mass, b.mass),
                    log_age: meet(a.log_age, b.log_age),
                    feh: meet(a.feh, b.feh),
                }
            }
        });
    }
    let b = acc.ok_or_else(|| AppError::Config("No photometric system to bound the prior.".into()))?;
    if b.mass.0 > b.mass.1 || b.log_age.0 > b.log_age.1 || b.feh.0 > b.feh.1 {
        return Err(AppError::Config(format!("The grids of {systems:?} do not overlap.")));
    }
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::GridVariant;
    use crate::grid::fixtures;
    use crate::models::fixtures::{test_isochrone, turnoff_isochrone, turnoff_mass};

    const M: f64 = 0.8;
    const AGE_GYR: f64 = 2.0;
    const FEH: f64 = -0.5;
    const DIST: f64 = 250.0;

    fn truth() -> Vec<f64> {
        vec![M, (AGE_GYR * 1e9).log10(), FEH, DIST, 0.0]
    }

    /// g (5th SDSS column) and Ks (5th UBVRI column) at the true point, plus Teff.
    fn observed() -> Vec<ObservedConstraint> {
        let mu = distance_modulus(DIST);
        vec![
            ObservedConstraint::new("g", fixtures::mag(4, M, AGE_GYR, FEH) + mu, 0.02),
            ObservedConstraint::new("K", fixtures::mag(4, M, AGE_GYR, FEH) + mu, 0.03),
            ObservedConstraint::new("teff", 10f64.powf(fixtures::log_teff(M, AGE_GYR, FEH)), 80.0),
        ]
    }

    #[test]
    fn likelihood_peaks_at_the_generating_point() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(test_isochrone(dir.path()), observed()).unwrap();
        assert_eq!(star.isochrone().physical_system(), PhotSystem::SdssUgriz);
        assert_eq!(star.bands(), vec!["g".to_string(), "K".to_string()]);

        let p = truth();
        let ll = star.log_likelihood(&p);
        assert!(ll.is_finite() && ll > -1e-3, "ll = {ll}");

        let mut off = p.clone();
        off[P_DISTANCE] = 400.0;
        assert!(star.log_likelihood(&off) < ll);

        let pred = star.predicted(&p).unwrap();
        for (c, m) in star.constraints().iter().zip(&pred) {
            assert!((c.value - m).abs() < 1e-4, "{}: {} vs {m}", c.name, c.value);
        }
    }

    #[test]
    fn outside_the_prior_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(test_isochrone(dir.path()), observed()).unwrap();

        for (i, v) in [(P_MASS, 5.0), (P_FEH, 0.5), (P_DISTANCE, 0.0), (P_AV, -0.1), (P_LOG_AGE, f64::NAN)] {
            let mut p = truth();
            p[i] = v;
            assert_eq!(star.log_prior(&p), f64::NEG_INFINITY);
            assert_eq!(star.log_likelihood(&p), f64::NEG_INFINITY);
            assert_eq!(star.log_posterior(&p), f64::NEG_INFINITY);
        }
        assert_eq!(star.log_prior(&truth()), 0.0);
    }

    #[test]
    fn extinction_dims_the_bands() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(test_isochrone(dir.path()), observed()).unwrap();
        let clear = star.predicted(&truth()).unwrap();
        let mut p = truth();
        p[P_AV] = 0.5;
        let dusty = star.predicted(&p).unwrap();
        assert!(dusty[0] > clear[0] && dusty[1] > clear[1]);
        // Extinction is weaker in K than in g.
        assert!(dusty[1] - clear[1] < dusty[0] - clear[0]);
        assert_eq!(dusty[2], clear[2]);
    }

    #[test]
    fn bad_constraints_fail_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let iso = || test_isochrone(dir.path());
        assert!(matches!(StarModel::new(iso(), vec![]), Err(AppError::Config(_))));
        assert!(matches!(
            StarModel::new(iso(), vec![ObservedConstraint::new("g", 12.0, 0.0)]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            StarModel::new(iso(), vec![ObservedConstraint::new("color", 1.0, 0.1)]),
            Err(AppError::Lookup(_))
        ));
    }

    #[test]
    fn parallax_only_models_fall_back_to_the_default_physical_system() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(
            test_isochrone(dir.path()),
            vec![
                ObservedConstraint::new("Parallax", 4.0, 0.1),
                ObservedConstraint::new("LOGG", fixtures::logg(M, AGE_GYR, FEH), 0.05),
            ],
        )
        .unwrap();
        assert_eq!(star.isochrone().physical_system(), PhotSystem::SdssUgriz);
        assert!(star.bands().is_empty());
        let pred = star.predicted(&truth()).unwrap();
        assert!((pred[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn grid_scan_finds_the_generating_point() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(test_isochrone(dir.path()), observed()).unwrap();
        let guess = star.maximum_likelihood_guess().unwrap();
        let t = truth();
        assert!((guess[P_MASS] - t[P_MASS]).abs() < 1e-9);
        assert!((guess[P_LOG_AGE] - t[P_LOG_AGE]).abs() < 1e-9);
        assert_eq!(guess[P_FEH], FEH);
        assert!((guess[P_DISTANCE] - DIST).abs() / DIST < 1e-3);
    }

    #[test]
    fn fit_then_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut star = StarModel::new(test_isochrone(dir.path()), observed())
            .unwrap()
            .with_max_distance(1000.0)
            .unwrap()
            .with_max_av(0.5)
            .unwrap();
        let cfg = SamplerConfig {
            nwalkers: 20,
            nburn: 20,
            niter: 20,
            ..SamplerConfig::default()
        };
        let n = star.fit(SamplerKind::Ensemble, &cfg).unwrap().len();
        assert_eq!(n, 20 * 20);
        let best = star.best_fit().unwrap().to_vec();
        assert!(star.prior_bounds().contains(&best));

        let path = dir.path().join("fit.parquet");
        star.save(&path).unwrap();

        let back = StarModel::load(test_isochrone(dir.path()), &path).unwrap();
        assert_eq!(back.constraints(), star.constraints());
        assert_eq!(back.prior_bounds(), star.prior_bounds());
        assert_eq!(back.prior_bounds().distance.1, 1000.0);
        assert_eq!(back.prior_bounds().av.1, 0.5);
        assert_eq!(back.log_posterior(&best), star.log_posterior(&best));
        let mut far = truth();
        far[P_DISTANCE] = 2000.0;
        assert_eq!(back.log_prior(&far), f64::NEG_INFINITY);
        assert_eq!(back.sample().unwrap().rows, star.sample().unwrap().rows);
        assert_eq!(back.best_fit(), Some(best.as_slice()));

        let other = Isochrone::new(Settings::new(dir.path()), GridVariant::new("afem2", ""));
        assert!(matches!(StarModel::load(other, &path), Err(AppError::Config(_))));
    }

    #[test]
    fn inside_the_prior_but_past_the_turnoff_is_impossible() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(turnoff_isochrone(dir.path()), observed()).unwrap();
        assert_eq!(star.prior_bounds().mass, (0.5, 1.1));

        assert!(star.log_likelihood(&truth()).is_finite());

        // 6 Gyr tracks end near 0.84 Msun; 1.05 is only tabulated when young.
        let age: f64 = 6.0;
        assert!(turnoff_mass(age) < 1.05 && turnoff_mass(1.0) > 1.05);
        let p = vec![1.05, (age * 1e9).log10(), -0.25, DIST, 0.1];
        assert_eq!(star.log_prior(&p), 0.0);
        assert_eq!(star.log_likelihood(&p), f64::NEG_INFINITY);
        assert_eq!(star.log_posterior(&p), f64::NEG_INFINITY);
        assert!(star.predicted(&p).unwrap()[0].is_nan());

        let young = vec![1.05, (1.2e9f64).log10(), -0.25, DIST, 0.1];
        assert!(star.log_likelihood(&young).is_finite());
    }

    #[test]
    fn likelihood_agrees_with_predicted_values() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(test_isochrone(dir.path()), observed()).unwrap();
        // g and Teff share the SDSS triangulation; K needs the UBVRI one.
        assert_eq!(star.tris.len(), 2);
        assert_eq!(star.term_tri, vec![Some(0), Some(1), Some(0)]);

        let points = [
            truth(),
            vec![0.63, 9.42, -0.31, 180.0, 0.2],
            vec![1.02, 9.85, -0.02, 900.0, 0.7],
        ];
        for p in &points {
            let pred = star.predicted(p).unwrap();
            let chi2: f64 = star
                .constraints()
                .iter()
                .zip(&pred)
                .map(|(c, m)| ((m - c.value) / c.uncertainty).powi(2))
                .sum();
            let ll = star.log_likelihood(p);
            assert!((ll + 0.5 * chi2).abs() < 1e-9, "at {p:?}: {ll} vs {}", -0.5 * chi2);
        }

        let mut outside = truth();
        outside[P_MASS] = 1.2;
        assert_eq!(star.log_likelihood(&outside), f64::NEG_INFINITY);
    }

    #[test]
    fn unfitted_models_cannot_be_saved() {
        let dir = tempfile::tempdir().unwrap();
        let star = StarModel::new(test_isochrone(dir.path()), observed()).unwrap();
        assert!(matches!(
            star.save(&dir.path().join("x.parquet")),
            Err(AppError::Config(_))
        ));
    }
}
