//! Pushing solved pointings to a motorized mount.

pub mod onstep;

use anyhow::Result;

use crate::config::SyncMode;
use crate::model::SolveResult;

pub use onstep::OnStepClient;

/// A mount that accepts solved coordinates.
#[cfg_attr(test, mockall::automock)]
pub trait MountLink {
    /// Tell the mount it is pointing at the result's coordinates.
    fn sync(&self, result: &SolveResult) -> Result<()>;

    /// Slew to the result's coordinates, wait for the slew to finish, then
    /// sync there.
    fn slew_then_sync(&self, result: &SolveResult) -> Result<()>;
}

/// Push `result` with the configured strategy.
///
/// Returns `Ok(false)` without touching the mount when the result carries
/// no coordinates.
pub fn push(link: &dyn MountLink, sync_mode: SyncMode, result: &SolveResult) -> Result<bool> {
    if result.coords.is_none() {
        log_debug!("No coordinates to push to the mount");
        return Ok(false);
    }

    match sync_mode {
        SyncMode::Sync => link.sync(result)?,
        SyncMode::SlewThenSync => link.slew_then_sync(result)?,
    }
    Ok(true)
}
