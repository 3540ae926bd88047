//! Command-line command handlers for skysolve.
//!
//! One-shot commands that run instead of the daemon. Each lives in its own
//! submodule.

pub mod mode;
pub mod solve;
pub mod status;
