//! Interstellar extinction ratios `A_band / A_V`.
//!
//! Approximate values for an R_V = 3.1 extinction law, evaluated at the
//! effective wavelength of each filter. Keyed by resolved band, since some
//! column names (`J`, `H`) exist in more than one system.

use crate::domain::{BandRef, PhotSystem};
use crate::error::AppError;

/// `A_band / A_V` for a resolved band.
pub fn extinction_ratio(band: &BandRef) -> Result<f64, AppError> {
    lookup(band.system, &band.band).ok_or_else(|| {
        AppError::Lookup(format!(
            "No extinction coefficient for {} band `{}`.",
            band.system, band.band
        ))
    })
}

fn lookup(system: PhotSystem, band: &str) -> Option<f64> {
    let r = match (system, band) {
        (PhotSystem::SdssUgriz, "sdss_u") => 1.579,
        (PhotSystem::SdssUgriz, "sdss_g") => 1.161,
        (PhotSystem::SdssUgriz, "sdss_r") => 0.843,
        (PhotSystem::SdssUgriz, "sdss_i") => 0.639,
        (PhotSystem::SdssUgriz, "sdss_z") => 0.453,

        (PhotSystem::Ubvrijhkskp, "U") => 1.569,
        (PhotSystem::Ubvrijhkskp, "B") => 1.337,
        (PhotSystem::Ubvrijhkskp, "V") => 1.0,
        (PhotSystem::Ubvrijhkskp, "R") => 0.751,
        (PhotSystem::Ubvrijhkskp, "I") => 0.479,
        (PhotSystem::Ubvrijhkskp, "J") => 0.282,
        (PhotSystem::Ubvrijhkskp, "H") => 0.190,
        (PhotSystem::Ubvrijhkskp, "Ks") => 0.114,
        (PhotSystem::Ubvrijhkskp, "Kp") => 0.85,
        (PhotSystem::Ubvrijhkskp, "D51") => 1.12,

        (PhotSystem::Wise, "W1") => 0.056,
        (PhotSystem::Wise, "W2") => 0.043,
        (PhotSystem::Wise, "W3") => 0.03,
        (PhotSystem::Wise, "W4") => 0.02,

        (PhotSystem::Lsst, "LSST_u") => 1.58,
        (PhotSystem::Lsst, "LSST_g") => 1.19,
        (PhotSystem::Lsst, "LSST_r") => 0.85,
        (PhotSystem::Lsst, "LSST_i") => 0.64,
        (PhotSystem::Lsst, "LSST_z") => 0.49,
        (PhotSystem::Lsst, "LSST_y") => 0.40,

        (PhotSystem::Ukidss, "Z") => 0.52,
        (PhotSystem::Ukidss, "Y") => 0.41,
        (PhotSystem::Ukidss, "J") => 0.28,
        (PhotSystem::Ukidss, "H") => 0.18,
        (PhotSystem::Ukidss, "K") => 0.11,

        (PhotSystem::HstWfpc2, "WFPC2_F555W") => 1.01,
        (PhotSystem::HstWfpc2, "WFPC2_F606W") => 0.91,
        (PhotSystem::HstWfpc2, "WFPC2_F814W") => 0.60,
        _ => return None,
    };
    Some(r)
}
