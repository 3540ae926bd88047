//! Core data types shared by the solver, the orchestrator, the LX200 server
//! and the mount client.
//!
//! A [`SolveResult`] is an immutable snapshot: it is built once per cycle,
//! handed out by value, and superseded by the next cycle's result rather than
//! being updated in place.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::constants::CONFIDENCE_THRESHOLD;

/// A celestial pointing. Right ascension and declination always travel
/// together; a result either has both or neither.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Equatorial {
    /// Right ascension in degrees, normalized into [0, 360)
    pub ra_deg: f64,
    /// Declination in degrees, [-90, 90]
    pub dec_deg: f64,
}

impl Equatorial {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra_deg: ra_deg.rem_euclid(360.0),
            dec_deg: dec_deg.clamp(-90.0, 90.0),
        }
    }
}

impl fmt::Display for Equatorial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA {:.6}°, Dec {:+.6}°", self.ra_deg, self.dec_deg)
    }
}

/// Outcome of one solve attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub coords: Option<Equatorial>,
    /// Field rotation in degrees east of north
    pub roll_deg: Option<f64>,
    pub plate_scale_arcsec_px: Option<f64>,
    /// Solver-reported quality score. `None` means no score is available,
    /// which is distinct from a reported zero.
    pub confidence: Option<f64>,
    /// Whether the solver signalled a definitive solution
    pub solved: bool,
    pub solved_at: DateTime<Local>,
}

impl SolveResult {
    /// A result with nothing known, used while framing in align mode.
    pub fn unknown() -> Self {
        Self {
            coords: None,
            roll_deg: None,
            plate_scale_arcsec_px: None,
            confidence: None,
            solved: false,
            solved_at: Local::now(),
        }
    }

    /// A failed attempt: no coordinates and zero confidence.
    pub fn failed() -> Self {
        Self {
            confidence: Some(0.0),
            ..Self::unknown()
        }
    }

    /// A definitive solution.
    pub fn solved(
        coords: Equatorial,
        roll_deg: Option<f64>,
        plate_scale_arcsec_px: Option<f64>,
        confidence: Option<f64>,
    ) -> Self {
        Self {
            coords: Some(coords),
            roll_deg,
            plate_scale_arcsec_px,
            confidence,
            solved: true,
            solved_at: Local::now(),
        }
    }

    /// Whether this result may seed the next solve as a hint.
    ///
    /// A reported confidence must exceed the threshold; a solution with no
    /// reported score qualifies on the solver's own success signal.
    pub fn is_confident(&self) -> bool {
        self.solved
            && self.coords.is_some()
            && self.confidence.is_none_or(|c| c > CONFIDENCE_THRESHOLD)
    }

    /// Confidence for display, `-` when unavailable.
    pub fn confidence_display(&self) -> String {
        match self.confidence {
            Some(c) => format!("{c:.2}"),
            None => "-".to_string(),
        }
    }
}

impl fmt::Display for SolveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.coords {
            Some(coords) => write!(f, "{coords}")?,
            None => write!(f, "no coordinates")?,
        }
        write!(f, " (confidence {})", self.confidence_display())
    }
}

/// Operating mode, re-read from configuration every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Capture, solve, publish
    #[default]
    Solve,
    /// Capture previews for focusing and framing, publish nothing known
    Align,
    /// No capture at all, heartbeat only
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Solve => "solve",
            Mode::Align => "align",
            Mode::Test => "test",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solve" => Ok(Mode::Solve),
            "align" => Ok(Mode::Align),
            "test" => Ok(Mode::Test),
            other => anyhow::bail!("Invalid mode '{other}' (expected solve, align or test)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equatorial_normalizes_ra() {
        let coords = Equatorial::new(-15.0, 10.0);
        assert_eq!(coords.ra_deg, 345.0);
        assert_eq!(Equatorial::new(360.0, 0.0).ra_deg, 0.0);
    }

    #[test]
    fn test_failed_result_has_zero_confidence_not_unavailable() {
        let failed = SolveResult::failed();
        assert_eq!(failed.confidence, Some(0.0));
        assert!(failed.coords.is_none());
        assert!(!failed.is_confident());
        assert_eq!(failed.confidence_display(), "0.00");
    }

    #[test]
    fn test_unknown_result_displays_unavailable_confidence() {
        let unknown = SolveResult::unknown();
        assert_eq!(unknown.confidence, None);
        assert_eq!(unknown.confidence_display(), "-");
        assert!(!unknown.is_confident());
    }

    #[test]
    fn test_confidence_gate() {
        let coords = Equatorial::new(10.0, 20.0);
        assert!(SolveResult::solved(coords, None, None, Some(0.9)).is_confident());
        assert!(SolveResult::solved(coords, None, None, None).is_confident());
        assert!(!SolveResult::solved(coords, None, None, Some(0.5)).is_confident());
        assert!(!SolveResult::solved(coords, None, None, Some(0.2)).is_confident());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("solve".parse::<Mode>().unwrap(), Mode::Solve);
        assert_eq!(" ALIGN ".parse::<Mode>().unwrap(), Mode::Align);
        assert_eq!("test".parse::<Mode>().unwrap(), Mode::Test);
        let err = "demo".parse::<Mode>().unwrap_err();
        assert!(err.to_string().contains("Invalid mode"));
    }

    #[test]
    fn test_mode_serde_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: Mode,
        }
        let parsed: Wrapper = toml::from_str("mode = \"align\"").unwrap();
        assert_eq!(parsed.mode, Mode::Align);
    }
}
