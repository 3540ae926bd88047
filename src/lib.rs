//! # Skysolve Library
//!
//! Internal library for the skysolve daemon and CLI.
//!
//! ## Architecture
//!
//! - **Entry Point**: [`Skysolve`] acquires resources and runs the orchestrator
//! - **Core Logic**: `core` holds the mode state machine and the immortal loop
//! - **Solving**: `solver` wraps astrometry.net's `solve-field` (two-phase,
//!   hinted then unhinted) plus a demo backend; `pointing` caches the last
//!   confident fix as the next hint
//! - **Publishing**: `lx200` serves the latest result to planetarium apps
//!   over a read-only Meade LX200 socket; `mount` pushes fixes to an OnStep
//!   mount; `status` writes the JSON status artifact
//! - **Configuration**: `config` for TOML settings with hot reload
//! - **Infrastructure**: signal handling, logging, camera capture, CLI

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod camera;
pub mod commands;
pub mod common;
pub mod config;
pub mod core;
pub mod io;
pub mod lx200;
pub mod model;
pub mod mount;
pub mod pointing;
pub mod solver;
pub mod status;

mod skysolve;

pub use skysolve::Skysolve;
