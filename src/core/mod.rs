//! The orchestrator: one sequential loop driving capture, solve, publish and
//! mount push.
//!
//! Every cycle starts by refreshing the configuration snapshot, so mode,
//! solver, camera and mount settings all change without a restart. The
//! loop never gives up on its own: a failed or panicking cycle is logged,
//! recorded in the status artifact, and followed by the error backoff.
//! Only a shutdown message ends it.

use anyhow::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use crate::camera::{self, Camera};
use crate::common::constants::SOLVER_TRANSCRIPT_TAIL;
use crate::config::{Config, ConfigStore};
use crate::io::signals::{SignalState, handle_signal_message};
use crate::logger::Log;
use crate::lx200::Lx200Handle;
use crate::model::{Mode, SolveResult};
use crate::mount::{self, MountLink, OnStepClient};
use crate::pointing::PointingCache;
use crate::solver::{Hint, SolverBackend};
use crate::status::StatusWriter;

/// Dependencies of a [`Core`].
pub struct CoreParams {
    pub config_store: ConfigStore,
    pub signal_state: SignalState,
    pub lx200: Lx200Handle,
    pub status: StatusWriter,
    /// Keep debug output on regardless of `[logging] debug`
    pub debug_override: bool,
}

pub struct Core {
    config_store: ConfigStore,
    signal_state: SignalState,
    lx200: Lx200Handle,
    status: StatusWriter,
    pointing: PointingCache,
    last_mode: Option<Mode>,
    debug_override: bool,
}

impl Core {
    pub fn new(params: CoreParams) -> Self {
        Self {
            config_store: params.config_store,
            signal_state: params.signal_state,
            lx200: params.lx200,
            status: params.status,
            pointing: PointingCache::new(),
            last_mode: None,
            debug_override: params.debug_override,
        }
    }

    pub fn pointing(&self) -> &PointingCache {
        &self.pointing
    }

    /// Run cycles until a shutdown is requested.
    pub fn execute(mut self) -> Result<()> {
        while self.signal_state.is_running() {
            self.config_store.refresh();
            let config = self.config_store.snapshot();
            self.apply_ambient_settings(&config);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.run_configured_cycle(&config)
            }));

            let pause = match outcome {
                Ok(Ok(_)) => config.cycle_sleep(),
                Ok(Err(e)) => {
                    log_pipe!();
                    log_error!("Cycle failed: {e:#}");
                    self.record_failure(config.mode, format!("{e:#}"));
                    log_indented!("Retrying in {}s", config.error_backoff);
                    config.backoff_sleep()
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log_pipe!();
                    log_critical!("Cycle panicked: {message}");
                    self.record_failure(config.mode, format!("panic: {message}"));
                    log_indented!("Retrying in {}s", config.error_backoff);
                    config.backoff_sleep()
                }
            };
            self.wait(pause);
        }

        log_block_start!("Orchestrator stopped");
        Ok(())
    }

    /// Apply the settings that take effect outside a single cycle.
    fn apply_ambient_settings(&mut self, config: &Config) {
        let debug = config.logging.debug || self.debug_override;
        if Log::set_debug(debug) != debug {
            log_decorated!("Debug logging {}", if debug { "enabled" } else { "disabled" });
        }

        if self.status.path() != config.status_file.as_path() {
            self.status.set_path(config.status_file.clone());
        }

        if self.last_mode != Some(config.mode) {
            log_block_start!("Mode: {}", config.mode);
            self.last_mode = Some(config.mode);
        }
    }

    fn run_configured_cycle(&mut self, config: &Config) -> Result<Option<SolveResult>> {
        let mut camera = camera::from_config(&config.camera);
        let mount = config
            .mount
            .enabled
            .then(|| OnStepClient::from_config(&config.mount));
        self.run_cycle(
            config,
            camera.as_mut(),
            mount.as_ref().map(|m| m as &dyn MountLink),
        )
    }

    /// One pass of the mode state machine.
    ///
    /// Returns the result published to LX200 clients, or `None` in test mode
    /// where nothing is captured.
    pub fn run_cycle(
        &mut self,
        config: &Config,
        camera: &mut dyn Camera,
        mount: Option<&dyn MountLink>,
    ) -> Result<Option<SolveResult>> {
        match config.mode {
            Mode::Test => {
                log_debug!("Test mode heartbeat");
                self.status.record(Mode::Test, None, None)?;
                Ok(None)
            }
            Mode::Align => {
                let frame = camera.capture(&config.camera, true)?;
                log_debug!("Preview captured: {}", frame.display());
                let result = SolveResult::unknown();
                self.finish_cycle(config, &result, None, mount)?;
                Ok(Some(result))
            }
            Mode::Solve => {
                let frame = camera.capture(&config.camera, false)?;
                let result = self.solve_frame(config, &frame)?;
                let error = (!result.solved).then(|| "No solution found".to_string());
                self.finish_cycle(config, &result, error, mount)?;
                Ok(Some(result))
            }
        }
    }

    fn solve_frame(&mut self, config: &Config, frame: &std::path::Path) -> Result<SolveResult> {
        let backend = SolverBackend::from_config(&config.solver);
        let hint = self
            .pointing
            .hint(Instant::now(), config.solver.hint_timeout())
            .map(|c| Hint::new(c.ra_deg, c.dec_deg, Some(config.solver.solve_radius)));

        match &hint {
            Some(h) => log_debug!(
                "Solving with {} around RA {:.3} Dec {:+.3}",
                backend.name(),
                h.ra_deg,
                h.dec_deg
            ),
            None => log_debug!("Solving with {} (no hint)", backend.name()),
        }

        let started = Instant::now();
        let mut transcript: Vec<String> = Vec::new();
        let result = backend.solve(frame, hint, &mut transcript)?;
        let elapsed = started.elapsed().as_secs_f64();

        if result.solved {
            log_decorated!("Solved in {elapsed:.1}s: {result}");
        } else {
            log_decorated!("No solution after {elapsed:.1}s");
            // Debug output already carried every line
            if !Log::is_debug() {
                for line in transcript_tail(&transcript) {
                    log_indented!("{}", line);
                }
            }
        }

        if result.is_confident()
            && let Some(coords) = result.coords
        {
            self.pointing
                .record(coords.ra_deg, coords.dec_deg, Instant::now());
        }
        Ok(result)
    }

    /// Publish, record status and push to the mount.
    fn finish_cycle(
        &mut self,
        config: &Config,
        result: &SolveResult,
        error: Option<String>,
        mount: Option<&dyn MountLink>,
    ) -> Result<()> {
        self.lx200.publish(result);
        self.status.record(config.mode, Some(result), error)?;

        if let Some(link) = mount
            && let Err(e) = mount::push(link, config.mount.sync_mode, result)
        {
            log_warning!("Mount update failed: {e:#}");
        }
        Ok(())
    }

    fn record_failure(&mut self, mode: Mode, error: String) {
        if let Err(e) = self.status.record(mode, None, Some(error)) {
            log_warning!("Failed to write status file: {e:#}");
        }
    }

    /// Sleep for `pause`, waking early on reload or shutdown messages.
    fn wait(&self, pause: Duration) {
        let deadline = Instant::now() + pause;
        while self.signal_state.is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.signal_state.signal_receiver.recv_timeout(remaining) {
                Ok(message) => {
                    if handle_signal_message(message, &self.signal_state) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return,
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(remaining);
                    return;
                }
            }
        }
    }
}

/// Last lines of a solver transcript, where the failure reason usually is.
fn transcript_tail(transcript: &[String]) -> &[String] {
    &transcript[transcript.len().saturating_sub(SOLVER_TRANSCRIPT_TAIL)..]
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::MockCamera;
    use crate::config::{SolverKind, SyncMode};
    use crate::lx200::Lx200Server;
    use crate::model::Equatorial;
    use crate::mount::MockMountLink;
    use crate::status;
    use std::path::PathBuf;
    use serial_test::serial;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Fixture {
        core: Core,
        server: Lx200Server,
        dir: TempDir,
        config: Config,
    }

    fn fixture(mode: Mode) -> Fixture {
        let dir = TempDir::new().unwrap();
        let frame = dir.path().join("frame.jpg");
        std::fs::write(&frame, b"jpeg").unwrap();

        let mut config = Config {
            mode,
            status_file: dir.path().join("status.json"),
            ..Config::default()
        };
        config.solver.kind = SolverKind::Demo;

        let server = Lx200Server::bind("127.0.0.1:0").unwrap();
        let core = Core::new(CoreParams {
            config_store: ConfigStore::detached(config.clone()),
            signal_state: SignalState::detached(),
            lx200: server.handle(),
            status: StatusWriter::open(config.status_file.clone()),
            debug_override: false,
        });

        Fixture {
            core,
            server,
            dir,
            config,
        }
    }

    fn camera_returning(path: PathBuf, preview: bool) -> MockCamera {
        let mut camera = MockCamera::new();
        camera
            .expect_capture()
            .withf(move |_, p| *p == preview)
            .times(1)
            .returning(move |_, _| Ok(path.clone()));
        camera
    }

    #[test]
    fn test_test_mode_never_captures() {
        let mut f = fixture(Mode::Test);
        let mut camera = MockCamera::new();
        camera.expect_capture().never();

        let published = f.core.run_cycle(&f.config, &mut camera, None).unwrap();
        assert!(published.is_none());
        assert!(f.server.latest().is_none());
        assert_eq!(
            status::read(&f.config.status_file).unwrap().mode,
            Some(Mode::Test)
        );
    }

    #[test]
    fn test_align_publishes_unknown_and_never_updates_cache() {
        let mut f = fixture(Mode::Align);
        let frame = f.dir.path().join("frame.jpg");

        for _ in 0..3 {
            let mut camera = camera_returning(frame.clone(), true);
            let mut link = MockMountLink::new();
            link.expect_sync().never();
            let published = f
                .core
                .run_cycle(&f.config, &mut camera, Some(&link))
                .unwrap()
                .unwrap();
            assert!(published.coords.is_none());
        }

        assert!(f.core.pointing().last().is_none());
        assert_eq!(f.server.latest().unwrap().coords, None);
    }

    #[test]
    fn test_solve_records_hint_publishes_and_syncs() {
        let mut f = fixture(Mode::Solve);
        f.config.mount.enabled = true;
        let mut camera = camera_returning(f.dir.path().join("frame.jpg"), false);

        let mut link = MockMountLink::new();
        link.expect_sync()
            .withf(|r| r.coords == Some(Equatorial::new(180.0, 45.0)))
            .times(1)
            .returning(|_| Ok(()));
        link.expect_slew_then_sync().never();

        let published = f
            .core
            .run_cycle(&f.config, &mut camera, Some(&link))
            .unwrap()
            .unwrap();

        assert!(published.solved);
        assert_eq!(f.core.pointing().last(), Some(Equatorial::new(180.0, 45.0)));
        assert_eq!(f.server.latest(), Some(published));

        let stored = status::read(&f.config.status_file).unwrap();
        assert_eq!(stored.ra, Some(180.0));
        assert_eq!(stored.dec, Some(45.0));
        assert!(stored.error.is_none());
    }

    #[test]
    fn test_mount_errors_are_swallowed() {
        let mut f = fixture(Mode::Solve);
        f.config.mount.sync_mode = SyncMode::SlewThenSync;
        let mut camera = camera_returning(f.dir.path().join("frame.jpg"), false);

        let mut link = MockMountLink::new();
        link.expect_slew_then_sync()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let published = f.core.run_cycle(&f.config, &mut camera, Some(&link));
        assert!(published.unwrap().is_some());
    }

    #[test]
    fn test_failed_solve_is_published_but_not_cached() {
        let mut f = fixture(Mode::Solve);
        f.config.solver.kind = SolverKind::Astrometry;
        f.config.solver.command = f.dir.path().join("missing-solver").display().to_string();
        let mut camera = camera_returning(f.dir.path().join("frame.jpg"), false);

        let mut link = MockMountLink::new();
        link.expect_sync().never();

        let published = f
            .core
            .run_cycle(&f.config, &mut camera, Some(&link))
            .unwrap()
            .unwrap();

        assert!(!published.solved);
        assert_eq!(published.confidence, Some(0.0));
        assert!(f.core.pointing().last().is_none());
        assert_eq!(f.server.latest(), Some(published));
        assert_eq!(
            status::read(&f.config.status_file).unwrap().error.as_deref(),
            Some("No solution found")
        );
    }

    #[cfg(unix)]
    fn script_solver(dir: &std::path::Path, output: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("solve-field");
        let script = format!(
            "#!/bin/sh\n\
             while [ $# -gt 0 ]; do\n\
               case \"$1\" in --solved) : > \"$2\"; shift ;; esac\n\
               shift\n\
             done\n\
             {output}\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    #[cfg(unix)]
    fn test_low_confidence_solve_is_published_but_not_cached() {
        let mut f = fixture(Mode::Solve);
        f.config.solver.kind = SolverKind::Astrometry;
        f.config.solver.command = script_solver(
            f.dir.path(),
            "echo 'Field center: (RA,Dec) = (296.944646, 42.688983) deg.'\n\
             echo 'Confidence: 0.3'",
        );
        let mut camera = camera_returning(f.dir.path().join("frame.jpg"), false);

        let published = f
            .core
            .run_cycle(&f.config, &mut camera, None)
            .unwrap()
            .unwrap();

        assert!(published.solved);
        assert_eq!(published.confidence, Some(0.3));
        assert!(!published.is_confident());
        assert!(f.core.pointing().last().is_none());
        assert_eq!(f.server.latest(), Some(published));
    }

    #[test]
    #[cfg(unix)]
    fn test_confident_script_solve_feeds_next_hint() {
        let mut f = fixture(Mode::Solve);
        f.config.solver.kind = SolverKind::Astrometry;
        f.config.solver.command = script_solver(
            f.dir.path(),
            "echo 'Field center: (RA,Dec) = (296.944646, 42.688983) deg.'\n\
             echo 'Confidence: 0.8'",
        );
        let mut camera = camera_returning(f.dir.path().join("frame.jpg"), false);

        f.core.run_cycle(&f.config, &mut camera, None).unwrap();
        assert_eq!(
            f.core.pointing().last(),
            Some(Equatorial::new(296.944646, 42.688983))
        );
    }

    #[test]
    fn test_transcript_tail() {
        let lines: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        assert_eq!(transcript_tail(&lines), &lines[3..]);
        assert_eq!(transcript_tail(&lines[..2]), &lines[..2]);
        assert!(transcript_tail(&[]).is_empty());
    }

    #[test]
    fn test_capture_failure_is_an_error() {
        let mut f = fixture(Mode::Solve);
        let mut camera = MockCamera::new();
        camera
            .expect_capture()
            .returning(|_, _| Err(anyhow::anyhow!("camera busy")));

        let err = f.core.run_cycle(&f.config, &mut camera, None).unwrap_err();
        assert!(err.to_string().contains("camera busy"));
        assert!(f.server.latest().is_none());
    }

    #[test]
    fn test_wait_returns_on_reload_and_stops_on_shutdown() {
        let f = fixture(Mode::Test);
        let sender = f.core.signal_state.signal_sender.clone();

        sender
            .send(crate::io::signals::SignalMessage::Reload)
            .unwrap();
        let started = Instant::now();
        f.core.wait(Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(f.core.signal_state.is_running());

        sender
            .send(crate::io::signals::SignalMessage::Shutdown)
            .unwrap();
        f.core.wait(Duration::from_secs(30));
        assert!(!f.core.signal_state.running.load(Ordering::SeqCst));
    }

    #[test]
    #[serial]
    fn test_execute_survives_failing_cycles_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut config = Config {
            mode: Mode::Solve,
            cycle_interval: 0.01,
            error_backoff: 0.01,
            status_file: dir.path().join("status.json"),
            ..Config::default()
        };
        config.camera.source = crate::config::CameraSource::File;
        config.camera.image = Some(dir.path().join("missing.jpg"));

        let signal_state = SignalState::detached();
        let running = signal_state.running.clone();
        let server = Lx200Server::bind("127.0.0.1:0").unwrap();
        let core = Core::new(CoreParams {
            config_store: ConfigStore::detached(config.clone()),
            signal_state,
            lx200: server.handle(),
            status: StatusWriter::open(config.status_file.clone()),
            debug_override: false,
        });

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            running.store(false, Ordering::SeqCst);
        });
        core.execute().unwrap();
        stopper.join().unwrap();

        let stored = status::read(&config.status_file).unwrap();
        assert!(stored.error.unwrap().contains("does not exist"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
