//! Command-line argument parsing and processing.
//!
//! Arguments are parsed by hand into a [`CliAction`]. Flags may appear before
//! or after the subcommand; help and version take precedence over
//! everything else, and anything unrecognized shows the help text.

use crate::model::Mode;

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon
    Run {
        debug_enabled: bool,
        config_path: Option<String>,
    },
    /// Solve one image with the configured solver and exit
    SolveCommand {
        debug_enabled: bool,
        config_path: Option<String>,
        image: String,
        ra: Option<f64>,
        dec: Option<f64>,
        radius: Option<f64>,
        json: bool,
    },
    /// Print the status artifact
    StatusCommand {
        config_path: Option<String>,
        json: bool,
    },
    /// Persist a new mode for the running daemon to pick up
    ModeCommand {
        config_path: Option<String>,
        mode: Mode,
    },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown or malformed arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

/// Flags shared by every action.
#[derive(Default)]
struct Flags {
    debug_enabled: bool,
    help: bool,
    version: bool,
    json: bool,
    config_path: Option<String>,
    ra: Option<f64>,
    dec: Option<f64>,
    radius: Option<f64>,
}

fn error() -> ParsedArgs {
    ParsedArgs {
        action: CliAction::ShowHelpDueToError,
    }
}

fn parse_degrees(flag: &str, value: Option<&String>) -> Option<f64> {
    let Some(value) = value else {
        log_warning!("Missing value for {flag}");
        return None;
    };
    match value.parse::<f64>() {
        Ok(deg) if deg.is_finite() => Some(deg),
        _ => {
            log_warning!("Invalid value for {flag}: {value}");
            None
        }
    }
}

impl ParsedArgs {
    /// Parse command-line arguments (including the program name) into a
    /// structured result.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut flags = Flags::default();
        let mut positionals: Vec<String> = Vec::new();
        let mut unknown_arg_found = false;

        let mut iter = args_vec.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--debug" | "-d" => flags.debug_enabled = true,
                "--help" | "-h" => flags.help = true,
                "--version" | "-V" | "-v" => flags.version = true,
                "--json" => flags.json = true,
                "--config" | "-c" => match iter.next() {
                    Some(path) => flags.config_path = Some(path.clone()),
                    None => {
                        log_warning!("Missing value for {arg}");
                        unknown_arg_found = true;
                    }
                },
                "--ra" => match parse_degrees(arg, iter.next()) {
                    Some(deg) => flags.ra = Some(deg),
                    None => unknown_arg_found = true,
                },
                "--dec" => match parse_degrees(arg, iter.next()) {
                    Some(deg) => flags.dec = Some(deg),
                    None => unknown_arg_found = true,
                },
                "--radius" => match parse_degrees(arg, iter.next()) {
                    Some(deg) => flags.radius = Some(deg),
                    None => unknown_arg_found = true,
                },
                other if other.starts_with('-') && other.len() > 1 => {
                    log_warning!("Unknown argument: {other}");
                    unknown_arg_found = true;
                }
                _ => positionals.push(arg.clone()),
            }
        }

        // Help and version short-circuit everything else
        if flags.version {
            return ParsedArgs {
                action: CliAction::ShowVersion,
            };
        }
        if flags.help {
            return ParsedArgs {
                action: CliAction::ShowHelp,
            };
        }
        if unknown_arg_found {
            return error();
        }

        let hint_flags = flags.ra.is_some() || flags.dec.is_some() || flags.radius.is_some();
        let command = positionals.first().map(String::as_str);

        let action = match command {
            None => {
                if hint_flags || flags.json {
                    log_warning!("--ra, --dec, --radius and --json need a subcommand");
                    return error();
                }
                CliAction::Run {
                    debug_enabled: flags.debug_enabled,
                    config_path: flags.config_path,
                }
            }
            Some("solve") => {
                let [_, image] = positionals.as_slice() else {
                    log_warning!("Usage: skysolve solve <image> [--ra <deg> --dec <deg>]");
                    return error();
                };
                if flags.ra.is_some() != flags.dec.is_some() {
                    log_warning!("--ra and --dec must be given together");
                    return error();
                }
                if flags.radius.is_some() && flags.ra.is_none() {
                    log_warning!("--radius needs --ra and --dec");
                    return error();
                }
                CliAction::SolveCommand {
                    debug_enabled: flags.debug_enabled,
                    config_path: flags.config_path,
                    image: image.clone(),
                    ra: flags.ra,
                    dec: flags.dec,
                    radius: flags.radius,
                    json: flags.json,
                }
            }
            Some("status") => {
                if positionals.len() > 1 || hint_flags {
                    log_warning!("Usage: skysolve status [--json]");
                    return error();
                }
                CliAction::StatusCommand {
                    config_path: flags.config_path,
                    json: flags.json,
                }
            }
            Some("mode") => {
                let [_, mode] = positionals.as_slice() else {
                    log_warning!("Usage: skysolve mode <solve|align|test>");
                    return error();
                };
                if hint_flags || flags.json {
                    log_warning!("Usage: skysolve mode <solve|align|test>");
                    return error();
                }
                match mode.parse::<Mode>() {
                    Ok(mode) => CliAction::ModeCommand {
                        config_path: flags.config_path,
                        mode,
                    },
                    Err(e) => {
                        log_warning!("{e}");
                        return error();
                    }
                }
            }
            Some(other) => {
                log_warning!("Unknown command: {other}");
                return error();
            }
        };

        ParsedArgs { action }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("skysolve [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <path>    Use a custom configuration file");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("solve <image>          Solve one image with the configured solver");
    log_indented!("  --ra <deg> --dec <deg> [--radius <deg>]   Search around a hint");
    log_indented!("  --json               Print the result as JSON");
    log_indented!("status [--json]        Show the last recorded status");
    log_indented!("mode <solve|align|test> Switch the running daemon's mode");
    log_end!();
}
