//! Unix signal handling for the daemon.
//!
//! A dedicated thread turns signals into [`SignalMessage`]s on the same
//! channel the config watcher writes to, so the orchestrator's inter-cycle
//! sleep wakes up on either.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR2},
    iterator::Signals,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

/// Messages delivered to the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    /// Re-check the configuration file now (SIGUSR2 or file watcher)
    Reload,
    /// Stop the daemon (SIGTERM, SIGINT, SIGHUP)
    Shutdown,
}

/// Signal handling state shared between threads
pub struct SignalState {
    /// Cleared when the process has been asked to terminate
    pub running: Arc<AtomicBool>,
    pub signal_receiver: Receiver<SignalMessage>,
    /// Cloned into the config watcher
    pub signal_sender: Sender<SignalMessage>,
}

impl SignalState {
    /// Channel and running flag with no OS handlers attached.
    pub fn detached() -> Self {
        let (signal_sender, signal_receiver) = channel();
        Self {
            running: Arc::new(AtomicBool::new(true)),
            signal_receiver,
            signal_sender,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Apply a message received by the main loop.
///
/// Returns `true` when the configuration should be re-checked immediately.
pub fn handle_signal_message(message: SignalMessage, signal_state: &SignalState) -> bool {
    match message {
        SignalMessage::Shutdown => {
            signal_state.running.store(false, Ordering::SeqCst);
            false
        }
        SignalMessage::Reload => {
            log_debug!("Reload requested, checking configuration");
            true
        }
    }
}

/// Register OS signal handlers and start the signal thread.
pub fn setup_signal_handler() -> Result<SignalState> {
    let state = SignalState::detached();

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR2])
        .context("failed to register signal handlers")?;

    let running = state.running.clone();
    let signal_sender = state.signal_sender.clone();

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                match sig {
                    SIGUSR2 => {
                        if signal_sender.send(SignalMessage::Reload).is_err() {
                            break;
                        }
                        log_pipe!();
                        log_info!("Received configuration reload signal");
                    }
                    SIGINT | SIGTERM | SIGHUP => {
                        log_pipe!();
                        match sig {
                            SIGINT => log_info!("Received interrupt signal, shutting down..."),
                            SIGHUP => log_info!("Received hangup signal, shutting down..."),
                            _ => log_info!("Received termination request, shutting down..."),
                        }

                        running.store(false, Ordering::SeqCst);
                        if let Err(e) = signal_sender.send(SignalMessage::Shutdown) {
                            log_warning!("Failed to send shutdown message: {e}");
                        }
                        break;
                    }
                    _ => {}
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(state)
}
