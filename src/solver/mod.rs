//! Plate solving.
//!
//! [`SolverBackend`] is a closed set of implementations picked from the
//! `[solver]` config section on every cycle. All of them share one contract:
//! invalid input is an explicit [`SolveError`], and every other failure of the
//! solve itself comes back as a zero-confidence [`SolveResult`].
//!
//! Progress lines go to a caller-supplied [`SolveLog`] as well as to the
//! process logger, so a one-shot caller can show the full solver transcript.

pub mod astrometry;
pub mod demo;
pub mod output;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

pub use astrometry::AstrometrySolver;
pub use demo::DemoSolver;

use crate::config::{SolverConfig, SolverKind};
use crate::model::SolveResult;

/// Input the solver refuses to work with.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("image is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("image cannot be read: {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid search hint: {0}")]
    InvalidHint(String),
}

/// Append-only sink for solver transcript lines.
pub trait SolveLog {
    fn log_line(&mut self, line: &str);
}

impl SolveLog for Vec<String> {
    fn log_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

impl SolveLog for Sender<String> {
    fn log_line(&mut self, line: &str) {
        // A receiver that went away just stops listening
        let _ = self.send(line.to_string());
    }
}

/// Send a line to both the caller's sink and the debug log.
pub(crate) fn emit(log: &mut dyn SolveLog, line: &str) {
    log.log_line(line);
    log_debug!("{}", line);
}

/// Prior pointing estimate that narrows the solver's search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hint {
    pub ra_deg: f64,
    pub dec_deg: f64,
    /// Search radius in degrees; the configured default when `None`
    pub radius_deg: Option<f64>,
}

impl Hint {
    pub fn new(ra_deg: f64, dec_deg: f64, radius_deg: Option<f64>) -> Self {
        Self {
            ra_deg,
            dec_deg,
            radius_deg,
        }
    }

    fn validate(&self) -> Result<(), SolveError> {
        if !(self.ra_deg.is_finite() && (0.0..360.0).contains(&self.ra_deg)) {
            return Err(SolveError::InvalidHint(format!(
                "RA {} outside [0, 360)",
                self.ra_deg
            )));
        }
        if !(self.dec_deg.is_finite() && (-90.0..=90.0).contains(&self.dec_deg)) {
            return Err(SolveError::InvalidHint(format!(
                "Dec {} outside [-90, 90]",
                self.dec_deg
            )));
        }
        if let Some(radius) = self.radius_deg
            && !(radius > 0.0 && radius <= 180.0)
        {
            return Err(SolveError::InvalidHint(format!(
                "radius {radius} outside (0, 180]"
            )));
        }
        Ok(())
    }
}

/// Check that `image` names a readable regular file.
pub fn validate_image(image: &Path) -> Result<(), SolveError> {
    if !image.exists() {
        return Err(SolveError::ImageNotFound(image.to_path_buf()));
    }
    if !image.is_file() {
        return Err(SolveError::NotAFile(image.to_path_buf()));
    }
    File::open(image).map_err(|source| SolveError::Unreadable {
        path: image.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// The configured solver implementation.
#[derive(Debug, Clone)]
pub enum SolverBackend {
    Astrometry(AstrometrySolver),
    Demo(DemoSolver),
}

impl SolverBackend {
    pub fn from_config(config: &SolverConfig) -> Self {
        match config.kind {
            SolverKind::Astrometry => Self::Astrometry(AstrometrySolver::from_config(config)),
            SolverKind::Demo => Self::Demo(DemoSolver),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Astrometry(_) => SolverKind::Astrometry.as_str(),
            Self::Demo(_) => SolverKind::Demo.as_str(),
        }
    }

    /// Solve `image`, optionally around `hint`.
    ///
    /// Only invalid input is an error. A solver that crashes, times out or
    /// finds nothing yields [`SolveResult::failed`].
    pub fn solve(
        &self,
        image: &Path,
        hint: Option<Hint>,
        log: &mut dyn SolveLog,
    ) -> Result<SolveResult, SolveError> {
        validate_image(image)?;
        if let Some(hint) = &hint {
            hint.validate()?;
        }

        Ok(match self {
            Self::Astrometry(solver) => solver.solve(image, hint, log),
            Self::Demo(solver) => solver.solve(image, hint, log),
        })
    }
}
