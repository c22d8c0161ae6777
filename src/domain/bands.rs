//! Band alias resolution.
//!
//! Users refer to bands with short names (`g`, `V`, `K`, `W1`, `F555W`). The
//! grids store them under system-specific column names, and the same filter
//! name can exist in more than one system. Resolution rules, in order:
//!
//! 1. fixed shortcuts (`g` -> SDSS, `K` -> `Ks`, `F555W` -> WFPC2, ...)
//! 2. `HST_{camera}_{filter}` -> (`HST_{camera}`, `{camera}_{filter}`)
//! 3. `{SYSTEM}_{band}` for a known system (and `UK_` / `UKIRT_` for UKIDSS)
//! 4. an exact canonical column name owned by exactly one system

use serde::{Deserialize, Serialize};

use crate::domain::PhotSystem;
use crate::error::AppError;

/// A resolved band: the photometric system plus the grid column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BandRef {
    pub system: PhotSystem,
    pub band: String,
}

impl BandRef {
    fn new(system: PhotSystem, band: impl Into<String>) -> Self {
        Self {
            system,
            band: band.into(),
        }
    }
}

/// Resolve a user-facing band name to `(system, column)`.
pub fn resolve_band(name: &str) -> Result<BandRef, AppError> {
    let b = name.trim();
    if let Some(found) = resolve_shortcut(b) {
        return Ok(found);
    }
    if let Some(found) = resolve_prefixed(b) {
        return Ok(found);
    }
    if let Some(found) = resolve_canonical(b) {
        return Ok(found);
    }
    Err(AppError::Lookup(format!(
        "Dartmouth models cannot resolve band '{name}'."
    )))
}

/// Like [`resolve_band`] but returns `None` instead of an error.
pub fn try_resolve_band(name: &str) -> Option<BandRef> {
    resolve_band(name).ok()
}

fn resolve_shortcut(b: &str) -> Option<BandRef> {
    let found = match b {
        "u" | "g" | "r" | "i" | "z" => BandRef::new(PhotSystem::SdssUgriz, format!("sdss_{b}")),
        "U" | "B" | "V" | "R" | "I" | "J" | "H" | "Ks" => BandRef::new(PhotSystem::Ubvrijhkskp, b),
        "K" => BandRef::new(PhotSystem::Ubvrijhkskp, "Ks"),
        "kep" | "Kepler" | "Kp" => BandRef::new(PhotSystem::Ubvrijhkskp, "Kp"),
        "W1" | "W2" | "W3" | "W4" => BandRef::new(PhotSystem::Wise, b),
        "F555W" | "F606W" | "F814W" => BandRef::new(PhotSystem::HstWfpc2, format!("WFPC2_{b}")),
        "WFPC2_F555W" | "WFPC2_F606W" | "WFPC2_F814W" => BandRef::new(PhotSystem::HstWfpc2, b),
        _ => return None,
    };
    Some(found)
}

fn resolve_prefixed(b: &str) -> Option<BandRef> {
    // HST_{camera}_{filter}
    if let Some(rest) = b.strip_prefix("HST_") {
        let (camera, filter) = rest.split_once('_')?;
        let system = PhotSystem::from_name(&format!("HST_{camera}"))?;
        let band = format!("{camera}_{filter}");
        return system.has_band(&band).then(|| BandRef::new(system, band));
    }

    let (prefix, rest) = b.split_once('_')?;
    if rest.is_empty() {
        return None;
    }
    let system = match prefix {
        "UK" | "UKIRT" => PhotSystem::Ukidss,
        other => PhotSystem::from_name(other)?,
    };
    // LSST columns keep the system prefix.
    let band = if system == PhotSystem::Lsst { b } else { rest };
    system
        .has_band(band)
        .then(|| BandRef::new(system, band))
}

fn resolve_canonical(b: &str) -> Option<BandRef> {
    let mut owners = PhotSystem::ALL.into_iter().filter(|s| s.has_band(b));
    let first = owners.next()?;
    if owners.next().is_some() {
        return None;
    }
    Some(BandRef::new(first, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(name: &str) -> (PhotSystem, String) {
        let r = resolve_band(name).unwrap();
        (r.system, r.band)
    }

    #[test]
    fn shortcuts_resolve_to_expected_systems() {
        assert_eq!(resolved("g"), (PhotSystem::SdssUgriz, "sdss_g".to_string()));
        assert_eq!(resolved("K"), (PhotSystem::Ubvrijhkskp, "Ks".to_string()));
        assert_eq!(resolved("F555W"), (PhotSystem::HstWfpc2, "WFPC2_F555W".to_string()));
        assert_eq!(resolved("V"), (PhotSystem::Ubvrijhkskp, "V".to_string()));
        assert_eq!(resolved("Kepler"), (PhotSystem::Ubvrijhkskp, "Kp".to_string()));
        assert_eq!(resolved("W1"), (PhotSystem::Wise, "W1".to_string()));
    }

    #[test]
    fn system_prefixed_names_resolve() {
        assert_eq!(resolved("LSST_r"), (PhotSystem::Lsst, "LSST_r".to_string()));
        assert_eq!(resolved("UKIDSS_K"), (PhotSystem::Ukidss, "K".to_string()));
        assert_eq!(resolved("UKIRT_J"), (PhotSystem::Ukidss, "J".to_string()));
        assert_eq!(resolved("WISE_W2"), (PhotSystem::Wise, "W2".to_string()));
        assert_eq!(
            resolved("HST_WFPC2_F814W"),
            (PhotSystem::HstWfpc2, "WFPC2_F814W".to_string())
        );
    }

    #[test]
    fn unique_canonical_columns_resolve() {
        assert_eq!(resolved("sdss_u"), (PhotSystem::SdssUgriz, "sdss_u".to_string()));
        assert_eq!(resolved("D51"), (PhotSystem::Ubvrijhkskp, "D51".to_string()));
        assert_eq!(resolved("Y"), (PhotSystem::Ukidss, "Y".to_string()));
    }

    #[test]
    fn unknown_names_fail_with_lookup_error() {
        for bad in ["Q", "SDSSugriz_q", "HST_ACS_F555W", "WISE_", "", "foo_bar"] {
            let err = resolve_band(bad).unwrap_err();
            assert!(matches!(err, AppError::Lookup(_)), "{bad}: {err}");
        }
    }
}
