//! Application coordinator for the daemon.
//!
//! Acquires every long-lived resource in order (configuration, logging
//! sink, signal thread, config watcher, LX200 server, status writer),
//! hands them to [`Core`], and tears the server down when the loop ends.

use anyhow::{Context, Result};

use crate::{
    common::utils::private_path,
    config::{self, ConfigStore},
    core::{Core, CoreParams},
    io::signals::setup_signal_handler,
    logger::Log,
    lx200::Lx200Server,
    status::StatusWriter,
};

/// Builder for running the skysolve daemon.
///
/// ```no_run
/// use skysolve::Skysolve;
///
/// # fn main() -> anyhow::Result<()> {
/// Skysolve::new(false).run()?;
/// # Ok(())
/// # }
/// ```
pub struct Skysolve {
    debug_enabled: bool,
    show_headers: bool,
}

impl Skysolve {
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            show_headers: true,
        }
    }

    /// Skip the version header
    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    /// Run the daemon until a termination signal arrives.
    pub fn run(self) -> Result<()> {
        if self.show_headers {
            log_version!();
        }
        Log::set_debug(self.debug_enabled);

        let config_path = config::get_config_path()?;
        let config_store = ConfigStore::open(config_path.clone())
            .context("Configuration failed")?;
        let config = config_store.snapshot();
        Log::set_debug(self.debug_enabled || config.logging.debug);

        // The guard flushes the file sink when the daemon exits
        let _log_guard = match &config.logging.file {
            Some(path) => {
                log_block_start!("Logging to {}", private_path(path));
                Some(Log::start_file_logging(path).with_context(|| {
                    format!("Failed to start file logging to {}", private_path(path))
                })?)
            }
            None => None,
        };

        let signal_state = setup_signal_handler()?;

        if let Err(e) =
            config::start_config_watcher(config_path.clone(), signal_state.signal_sender.clone())
        {
            log_pipe!();
            log_warning!("Config file watching unavailable: {e}");
            log_indented!("Changes are still picked up on the next cycle, or send SIGUSR2");
        }

        config.log_config(Some(&config_path));

        let mut server = Lx200Server::bind(config.lx200.bind_address()).with_context(|| {
            format!("Failed to start LX200 server on {}", config.lx200.bind_address())
        })?;
        server.start()?;

        let core = Core::new(CoreParams {
            config_store,
            signal_state,
            lx200: server.handle(),
            status: StatusWriter::open(config.status_file.clone()),
            debug_override: self.debug_enabled,
        });

        log_block_start!("Starting orchestrator");
        let outcome = core.execute();

        log_block_start!("Shutting down skysolve...");
        server.shutdown();
        log_end!();
        outcome
    }
}
