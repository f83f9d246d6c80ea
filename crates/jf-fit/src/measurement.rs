//! Photon-plus-jet balance measurement.
//!
//! Wraps per-bin balance ratios extracted from a photon+jet analysis. The
//! photon pt scale enters as a single nuisance parameter: a scale offset
//! shifts both the balance ratio and the photon pt of every bin coherently.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use jf_core::{Correction, Error, LossTerm, Measurement, NuisanceRegistry, NuisanceView, Result};
use jf_core::ResidualPoint;

/// Name of the photon pt-scale nuisance parameter.
pub const PHOTON_SCALE: &str = "photon_scale";

/// Balance computation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Direct pt-balance ratio.
    PtBal,
    /// Missing-pt projection fraction.
    Mpf,
}

impl Method {
    /// Label used in data files and artifacts.
    pub fn label(self) -> &'static str {
        match self {
            Method::PtBal => "PtBal",
            Method::Mpf => "MPF",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PtBal" => Ok(Method::PtBal),
            "MPF" => Ok(Method::Mpf),
            other => Err(Error::UnsupportedMethod(other.to_owned())),
        }
    }
}

/// One photon-pt bin of the balance measurement.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PtBin {
    /// Photon pt, in GeV.
    pub pt: f64,
    /// Measured data-to-simulation balance ratio.
    pub ratio: f64,
    /// Absolute uncertainty of the ratio.
    pub unc: f64,
}

/// Per-method bin arrays as stored in the measurement data file.
#[derive(Debug, Deserialize)]
struct DataFile {
    #[serde(rename = "PtBal", default)]
    ptbal: Vec<PtBin>,
    #[serde(rename = "MPF", default)]
    mpf: Vec<PtBin>,
}

/// Photon+jet balance measurement acting as a chi-square loss contributor.
pub struct PhotonJetMeasurement {
    bins: Vec<PtBin>,
    /// Slot of the photon-scale nuisance; absent when excluded.
    photon_scale: Option<usize>,
    pt_range: (f64, f64),
}

impl PhotonJetMeasurement {
    /// Load the measurement from a JSON data file.
    ///
    /// Registers the photon-scale nuisance against `registry` unless its name
    /// appears in `exclude_syst`.
    pub fn from_file(
        path: impl AsRef<Path>,
        method: Method,
        registry: &mut NuisanceRegistry,
        exclude_syst: &HashSet<String>,
    ) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let data: DataFile = serde_json::from_reader(reader)?;

        let bins = match method {
            Method::PtBal => data.ptbal,
            Method::Mpf => data.mpf,
        };
        Self::from_bins(bins, method, registry, exclude_syst)
    }

    /// Build the measurement from in-memory bins.
    pub fn from_bins(
        bins: Vec<PtBin>,
        method: Method,
        registry: &mut NuisanceRegistry,
        exclude_syst: &HashSet<String>,
    ) -> Result<Self> {
        if bins.is_empty() {
            return Err(Error::Validation(format!(
                "no {} bins in measurement input",
                method.label()
            )));
        }
        for (i, bin) in bins.iter().enumerate() {
            if !(bin.unc > 0.0) {
                return Err(Error::Validation(format!(
                    "bin {} has non-positive uncertainty {}",
                    i, bin.unc
                )));
            }
        }

        let photon_scale = if exclude_syst.contains(PHOTON_SCALE) {
            None
        } else {
            Some(registry.register(PHOTON_SCALE))
        };

        Ok(Self { bins, photon_scale, pt_range: (0.0, f64::INFINITY) })
    }

    /// Number of bins inside the current pt window.
    fn in_range(&self) -> impl Iterator<Item = &PtBin> {
        self.bins.iter().filter(move |b| b.pt >= self.pt_range.0 && b.pt <= self.pt_range.1)
    }

    fn scale_offset(&self, nuisances: &NuisanceView<'_>) -> f64 {
        self.photon_scale.map(|idx| nuisances.value(idx)).unwrap_or(0.0)
    }
}

impl LossTerm for PhotonJetMeasurement {
    fn chi2(&self, correction: &dyn Correction, nuisances: &NuisanceView<'_>) -> f64 {
        let nu = self.scale_offset(nuisances);
        let mut chi2 = 0.0;

        for bin in self.in_range() {
            // Correct the balance ratio and the photon pt for a potential
            // offset in the photon pt scale.
            let ratio_corr = bin.ratio / (1.0 + nu);
            let pt_photon = bin.pt * (1.0 + nu);

            // The jet pt is taken equal to the photon pt.
            let delta = ratio_corr - 1.0 / correction.eval(pt_photon);
            chi2 += delta * delta / (bin.unc * bin.unc);
        }

        chi2
    }

    fn ndf(&self) -> usize {
        self.in_range().count()
    }
}

impl Measurement for PhotonJetMeasurement {
    fn set_pt_range(&mut self, min_pt: f64, max_pt: f64) {
        self.pt_range = (min_pt, max_pt);
    }

    fn residuals(
        &self,
        correction: &dyn Correction,
        nuisances: &NuisanceView<'_>,
    ) -> Vec<ResidualPoint> {
        let nu = self.scale_offset(nuisances);

        self.in_range()
            .map(|bin| {
                let ratio_corr = bin.ratio / (1.0 + nu);
                let pt_photon = bin.pt * (1.0 + nu);
                let corr = correction.eval(pt_photon);
                ResidualPoint { x: bin.pt, y: ratio_corr * corr - 1.0, y_err: bin.unc * corr }
            })
            .collect()
    }
}
