//! Main application entry point.
//!
//! Parses the command line and dispatches to the daemon
//! ([`skysolve::Skysolve`]) or to a one-shot command.

use anyhow::Result;
use std::path::PathBuf;

use skysolve::args::{self, CliAction, ParsedArgs};
use skysolve::commands;
use skysolve::common::constants::{EXIT_FAILURE, EXIT_SUCCESS};
use skysolve::config;
use skysolve::solver::Hint;
use skysolve::{Skysolve, log_error_exit};

fn main() {
    let code = match run(ParsedArgs::from_env().action) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            log_error_exit!("{e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn use_config_path(config_path: Option<String>) -> Result<()> {
    config::set_config_path(config_path.map(PathBuf::from))
}

fn run(action: CliAction) -> Result<()> {
    match action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run {
            debug_enabled,
            config_path,
        } => {
            use_config_path(config_path)?;
            Skysolve::new(debug_enabled).run()
        }
        CliAction::SolveCommand {
            debug_enabled,
            config_path,
            image,
            ra,
            dec,
            radius,
            json,
        } => {
            use_config_path(config_path)?;
            skysolve::logger::Log::set_debug(debug_enabled);
            let hint = ra.zip(dec).map(|(ra, dec)| Hint::new(ra, dec, radius));
            commands::solve::handle_solve_command(&image, hint, json)
        }
        CliAction::StatusCommand { config_path, json } => {
            use_config_path(config_path)?;
            commands::status::handle_status_command(json)
        }
        CliAction::ModeCommand { config_path, mode } => {
            use_config_path(config_path)?;
            commands::mode::handle_mode_command(mode)
        }
    }
}
