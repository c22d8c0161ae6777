//! Model grid ingestion.
//!
//! - per-file parsing (`loader`)
//! - columnar table + (feh, age) index (`table`)
//! - per-system aggregation with cached results (`aggregate`, `cache`)

pub mod aggregate;
pub mod cache;
pub mod loader;
pub mod table;

pub use aggregate::*;
pub use loader::*;
pub use table::*;

/// Columns every Dartmouth file carries (after name sanitizing).
pub const COL_EEP: &str = "EEP";
pub const COL_MASS: &str = "MMo";
pub const COL_LOG_TEFF: &str = "LogTeff";
pub const COL_LOGG: &str = "LogG";
pub const COL_LOG_L: &str = "LogLLo";
/// Derived columns.
pub const COL_AGE: &str = "age";
pub const COL_FEH: &str = "feh";

/// Sort (and uniqueness) key of an aggregated grid.
pub const SORT_KEYS: [&str; 4] = [COL_FEH, COL_AGE, COL_MASS, COL_EEP];

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic Dartmouth-format files with linear column values.

    use std::path::{Path, PathBuf};

    use super::loader::HEADER_LINES;
    use crate::domain::PhotSystem;

    pub fn log_teff(m: f64, age_gyr: f64, feh: f64) -> f64 {
        3.55 + 0.25 * m - 0.02 * age_gyr + 0.03 * feh
    }

    pub fn logg(m: f64, age_gyr: f64, feh: f64) -> f64 {
        5.0 - 0.8 * m + 0.05 * age_gyr - 0.02 * feh
    }

    pub fn log_l(m: f64, age_gyr: f64, feh: f64) -> f64 {
        -2.5 + 2.0 * m + 0.1 * age_gyr + 0.1 * feh
    }

    pub fn mag(j: usize, m: f64, age_gyr: f64, feh: f64) -> f64 {
        10.0 + j as f64 - 5.0 * m + 0.3 * age_gyr + 0.2 * feh
    }

    /// Raw band column names as they appear in the files.
    pub fn raw_bands(system: PhotSystem) -> Vec<String> {
        system
            .bands()
            .iter()
            .map(|b| b.strip_prefix("WFPC2_").unwrap_or(b).to_string())
            .collect()
    }

    pub fn track_text_for(system: PhotSystem, ages: &[f64], masses: &[f64], feh: f64) -> String {
        track_text_with(system, ages, |_| masses.to_vec(), feh)
    }

    /// Like [`track_text_for`], with the tabulated masses chosen per age.
    pub fn track_text_with(
        system: PhotSystem,
        ages: &[f64],
        masses_at: impl Fn(f64) -> Vec<f64>,
        feh: f64,
    ) -> String {
        let bands = raw_bands(system);
        let mut out = String::new();
        out.push_str(&format!("#NUMBER OF AGES={:3} MIX LEN PARAM= 1.938\n", ages.len()));
        out.push_str("#----------------------------------------------------\n");
        out.push_str("#  [Fe/H]      [a/Fe]     Y        Z\n");
        out.push_str(&format!("#  {feh:.2}        0.00    0.2452   0.00581\n"));
        out.push_str(&format!("#PHOTOMETRIC SYSTEM: {}\n", system.name()));
        out.push_str("#\n");
        debug_assert_eq!(HEADER_LINES, 8);

        for (k, &age) in ages.iter().enumerate() {
            if k > 0 {
                out.push('\n');
            }
            let masses = masses_at(age);
            out.push_str(&format!("#AGE= {age:.3} EEPS={:4}\n", masses.len()));
            out.push_str("#EEP   M/Mo    LogTeff  LogG   LogL/Lo");
            for b in &bands {
                out.push_str(&format!(" {b}"));
            }
            out.push('\n');
            for (i, &m) in masses.iter().enumerate() {
                out.push_str(&format!(
                    "  {:3} {m:.6} {:.6} {:.6} {:.6}",
                    200 + i,
                    log_teff(m, age, feh),
                    logg(m, age, feh),
                    log_l(m, age, feh),
                ));
                for j in 0..bands.len() {
                    out.push_str(&format!(" {:.6}", mag(j, m, age, feh)));
                }
                out.push('\n');
            }
        }
        out
    }

    pub fn track_text(ages: &[f64], masses: &[f64], feh: f64) -> String {
        track_text_for(PhotSystem::SdssUgriz, ages, masses, feh)
    }

    pub fn feh_tag(feh: f64) -> String {
        let sign = if feh < 0.0 { 'm' } else { 'p' };
        format!("feh{sign}{:02}", (feh.abs() * 10.0).round() as i64)
    }

    /// Write one file per metallicity under `{root}/isochrones/{system}/`.
    pub fn write_system(
        root: &Path,
        system: PhotSystem,
        fehs: &[f64],
        ages: &[f64],
        masses: &[f64],
    ) -> Vec<PathBuf> {
        write_system_with(root, system, fehs, ages, |_| masses.to_vec())
    }

    /// Like [`write_system`], with the tabulated masses chosen per age.
    pub fn write_system_with(
        root: &Path,
        system: PhotSystem,
        fehs: &[f64],
        ages: &[f64],
        masses_at: impl Fn(f64) -> Vec<f64>,
    ) -> Vec<PathBuf> {
        let dir = root.join("isochrones").join(system.name());
        std::fs::create_dir_all(&dir).unwrap();
        fehs.iter()
            .map(|&feh| {
                let path = dir.join(format!("{}afep0.{}", feh_tag(feh), system.name()));
                std::fs::write(&path, track_text_with(system, ages, &masses_at, feh)).unwrap();
                path
            })
            .collect()
    }
}
