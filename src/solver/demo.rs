//! Stand-in solver that needs no external binary.
//!
//! It always reports the same confident pointing, which lets the capture,
//! publish, status and mount paths run on a machine without astrometry.net
//! or index files.

use std::path::Path;

use super::{Hint, SolveLog, emit};
use crate::common::constants::*;
use crate::model::{Equatorial, SolveResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoSolver;

impl DemoSolver {
    pub fn solve(&self, image: &Path, hint: Option<Hint>, log: &mut dyn SolveLog) -> SolveResult {
        if hint.is_some() {
            emit(log, "Demo solver ignores search hints");
        }
        let result = SolveResult::solved(
            Equatorial::new(DEMO_RA_DEG, DEMO_DEC_DEG),
            Some(DEMO_ROLL_DEG),
            Some(DEMO_PLATE_SCALE),
            Some(DEMO_CONFIDENCE),
        );
        emit(
            log,
            &format!("Demo solve of {}: {result}", image.display()),
        );
        result
    }
}
