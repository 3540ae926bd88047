//! Wrapper around astrometry.net's `solve-field`.
//!
//! A solve runs in up to two phases:
//!
//! 1. The raw frame, with the search hint when one is available. The
//!    extracted star list is kept next to the frame as `<base>.xy`.
//! 2. When phase 1 fails, fallback is enabled and the star list exists, the
//!    star list alone without any hint. A stale hint can steer phase 1 away
//!    from the real field; phase 2 searches the whole sky on the stars
//!    already found.
//!
//! A phase succeeds only if the process exits cleanly, writes the
//! `<base>.solved` marker, and reports non-zero coordinates.

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

use super::output::parse_lines;
use super::{Hint, SolveLog, emit};
use crate::common::constants::*;
use crate::common::utils::sibling_with_extension;
use crate::config::SolverConfig;
use crate::model::{Equatorial, SolveResult};

/// `solve-field` invocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AstrometrySolver {
    pub(crate) command: String,
    pub(crate) timeout: Duration,
    pub(crate) fallback: bool,
    pub(crate) default_radius: f64,
    sigma: f64,
    depth: String,
    uniformize: u32,
    scale_low: Option<f64>,
    scale_high: Option<f64>,
}

/// What came back from one external process run.
struct ProcessOutput {
    /// `None` when the process was killed at the deadline
    status: Option<ExitStatus>,
    lines: Vec<String>,
}

impl AstrometrySolver {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: config.timeout(),
            fallback: config.fallback,
            default_radius: config.solve_radius,
            sigma: config.sigma,
            depth: config.depth.clone(),
            uniformize: config.uniformize,
            scale_low: config.scale_low,
            scale_high: config.scale_high,
        }
    }

    /// Run the two-phase solve. Never fails; see the module docs.
    pub fn solve(&self, image: &Path, hint: Option<Hint>, log: &mut dyn SolveLog) -> SolveResult {
        let started = Instant::now();
        let (marker, xylist) = artifact_paths(image);

        remove_stale(&marker);
        if xylist != image {
            remove_stale(&xylist);
        }

        match &hint {
            Some(hint) => emit(
                log,
                &format!(
                    "Phase 1: solving {} near RA {:.4}, Dec {:.4} (radius {}°)",
                    image.display(),
                    hint.ra_deg,
                    hint.dec_deg,
                    hint.radius_deg.unwrap_or(self.default_radius)
                ),
            ),
            None => emit(log, &format!("Phase 1: solving {} unhinted", image.display())),
        }

        let phase_one_args = self.phase_one_args(image, &marker, &xylist, hint);
        let phase_one = self.run_phase(1, phase_one_args, &marker, log);
        if phase_one.solved {
            emit(
                log,
                &format!("Solved in {:.2}s", started.elapsed().as_secs_f64()),
            );
            return phase_one;
        }

        if !self.fallback {
            emit(log, "Phase 1 failed, fallback disabled");
            return phase_one;
        }

        if !xylist.is_file() {
            emit(log, "Phase 1 failed and left no star list, skipping fallback");
            return phase_one;
        }

        emit(
            log,
            &format!("Phase 2: retrying unhinted on {}", xylist.display()),
        );
        remove_stale(&marker);
        let phase_two_args = self.phase_two_args(&xylist, &marker);
        let phase_two = self.run_phase(2, phase_two_args, &marker, log);

        emit(
            log,
            &format!(
                "{} after {:.2}s",
                if phase_two.solved { "Solved" } else { "Not solved" },
                started.elapsed().as_secs_f64()
            ),
        );
        phase_two
    }

    /// Flags shared by both phases.
    fn tuning_args(&self, marker: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--overwrite",
            "--no-plots",
            "--no-remove-lines",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push("--sigma".into());
        args.push(self.sigma.to_string().into());
        args.push("--depth".into());
        args.push(self.depth.clone().into());
        args.push("--uniformize".into());
        args.push(self.uniformize.to_string().into());
        args.push("--cpulimit".into());
        args.push(self.timeout.as_secs().to_string().into());

        // Artifacts nobody reads
        for artifact in ["--new-fits", "--index-xyls", "--rdls", "--match", "--corr", "--wcs"] {
            args.push(artifact.into());
            args.push("none".into());
        }

        args.push("--solved".into());
        args.push(marker.as_os_str().to_owned());

        if self.scale_low.is_some() || self.scale_high.is_some() {
            args.push("--scale-units".into());
            args.push("arcsecperpix".into());
        }
        if let Some(low) = self.scale_low {
            args.push("--scale-low".into());
            args.push(low.to_string().into());
        }
        if let Some(high) = self.scale_high {
            args.push("--scale-high".into());
            args.push(high.to_string().into());
        }

        args
    }

    pub(crate) fn phase_one_args(
        &self,
        image: &Path,
        marker: &Path,
        xylist: &Path,
        hint: Option<Hint>,
    ) -> Vec<OsString> {
        let mut args = vec![image.as_os_str().to_owned()];
        args.extend(self.tuning_args(marker));
        args.push("--keep-xylist".into());
        args.push(xylist.as_os_str().to_owned());

        if let Some(hint) = hint {
            args.push("--ra".into());
            args.push(hint.ra_deg.to_string().into());
            args.push("--dec".into());
            args.push(hint.dec_deg.to_string().into());
            args.push("--radius".into());
            args.push(hint.radius_deg.unwrap_or(self.default_radius).to_string().into());
        }

        args
    }

    pub(crate) fn phase_two_args(&self, xylist: &Path, marker: &Path) -> Vec<OsString> {
        let mut args = vec![xylist.as_os_str().to_owned()];
        args.extend(self.tuning_args(marker));
        args
    }

    fn run_phase(
        &self,
        phase: u8,
        args: Vec<OsString>,
        marker: &Path,
        log: &mut dyn SolveLog,
    ) -> SolveResult {
        let command_line = std::iter::once(self.command.clone())
            .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ");
        emit(log, &format!("solve-field command: {command_line}"));

        let mut command = Command::new(&self.command);
        command.args(&args);

        let output = match run_with_timeout(command, self.timeout) {
            Ok(output) => output,
            Err(e) => {
                emit(log, &format!("Failed to run {}: {e}", self.command));
                return SolveResult::failed();
            }
        };

        for line in &output.lines {
            emit(log, line);
        }

        let Some(status) = output.status else {
            emit(
                log,
                &format!(
                    "Phase {phase} timed out after {}s",
                    self.timeout.as_secs_f64()
                ),
            );
            return SolveResult::failed();
        };

        if !status.success() {
            emit(log, &format!("Phase {phase} failed: solver exited with {status}"));
            return SolveResult::failed();
        }

        if !marker.exists() {
            emit(log, &format!("Phase {phase} failed: no solution marker written"));
            return SolveResult::failed();
        }

        let parsed = parse_lines(output.lines.iter().map(String::as_str));
        match parsed.coordinates() {
            Some((ra, dec)) => {
                let result = SolveResult::solved(
                    Equatorial::new(ra, dec),
                    parsed.roll_deg,
                    parsed.plate_scale_arcsec_px,
                    parsed.confidence,
                );
                emit(log, &format!("Phase {phase} solved: {result}"));
                result
            }
            None => {
                emit(
                    log,
                    &format!("Phase {phase} failed: no usable coordinates in solver output"),
                );
                SolveResult::failed()
            }
        }
    }
}

fn remove_stale(path: &Path) {
    if path.exists()
        && let Err(e) = fs::remove_file(path)
    {
        log_warning!("Failed to remove stale {}: {e}", path.display());
    }
}

fn forward_lines(reader: impl Read, tx: Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if tx.send(line.to_string()).is_err() {
                    break;
                }
            }
        }
    }
}

/// Run `command` to completion or until `timeout`, collecting stdout and
/// stderr lines in arrival order.
///
/// The solver runs in its own process group. On timeout the whole group is
/// killed, since `solve-field` leaves helper processes holding the pipes.
/// Output is drained on detached threads, and reading stops after a short
/// grace period once the solver is gone.
fn run_with_timeout(mut command: Command, timeout: Duration) -> io::Result<ProcessOutput> {
    let started = Instant::now();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()?;
    let group = Pid::from_raw(child.id() as i32);

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        thread::Builder::new()
            .name("solver-stdout".to_string())
            .spawn(move || forward_lines(stdout, tx))?;
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        thread::Builder::new()
            .name("solver-stderr".to_string())
            .spawn(move || forward_lines(stderr, tx))?;
    }
    drop(tx);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if started.elapsed() >= timeout => {
                kill_group(group);
                let _ = child.wait();
                break None;
            }
            Ok(None) => thread::sleep(Duration::from_millis(SOLVER_POLL_INTERVAL_MS)),
            Err(e) => {
                kill_group(group);
                let _ = child.wait();
                return Err(e);
            }
        }
    };

    let drain_until = Instant::now() + Duration::from_millis(SOLVER_OUTPUT_GRACE_MS);
    let mut lines = Vec::new();
    loop {
        let remaining = drain_until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) => lines.push(line),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                log_debug!("Solver helpers still hold its output open, not waiting for them");
                break;
            }
        }
    }

    Ok(ProcessOutput { status, lines })
}

/// SIGKILL every process in the solver's group. The leader must not have been
/// reaped yet, so the group id cannot have been reused.
fn kill_group(group: Pid) {
    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log_warning!("Failed to kill solver process group {group}: {e}"),
    }
}

/// Paths the solver reads and writes for `image`.
pub fn artifact_paths(image: &Path) -> (PathBuf, PathBuf) {
    (
        sibling_with_extension(image, SOLVED_MARKER_EXTENSION),
        sibling_with_extension(image, XYLIST_EXTENSION),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;

    fn solver_with(command: &str) -> AstrometrySolver {
        AstrometrySolver::from_config(&SolverConfig {
            command: command.to_string(),
            timeout: 5,
            ..SolverConfig::default()
        })
    }

    #[test]
    fn test_phase_one_args_with_hint() {
        let solver = solver_with("solve-field");
        let image = Path::new("/tmp/sky/frame.jpg");
        let (marker, xylist) = artifact_paths(image);
        let args: Vec<String> = solver
            .phase_one_args(image, &marker, &xylist, Some(Hint::new(296.5, 42.25, None)))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "/tmp/sky/frame.jpg");
        let joined = args.join(" ");
        assert!(joined.contains("--overwrite --no-plots --no-remove-lines"));
        assert!(joined.contains("--sigma 6 --depth 20,30,40 --uniformize 0 --cpulimit 5"));
        assert!(joined.contains("--wcs none"));
        assert!(joined.contains("--solved /tmp/sky/frame.solved"));
        assert!(joined.contains("--keep-xylist /tmp/sky/frame.xy"));
        assert!(joined.ends_with("--ra 296.5 --dec 42.25 --radius 20"));
        assert!(!joined.contains("--scale-units"));
    }

    #[test]
    fn test_phase_two_args_have_no_hint_or_keep() {
        let mut solver = solver_with("solve-field");
        solver.scale_low = Some(10.0);
        solver.scale_high = Some(120.0);
        let xylist = Path::new("/tmp/sky/frame.xy");
        let joined = solver
            .phase_two_args(xylist, Path::new("/tmp/sky/frame.solved"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        assert!(joined.starts_with("/tmp/sky/frame.xy --overwrite"));
        assert!(joined.contains("--scale-units arcsecperpix --scale-low 10 --scale-high 120"));
        assert!(!joined.contains("--ra"));
        assert!(!joined.contains("--keep-xylist"));
    }

    #[test]
    fn test_missing_binary_is_a_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("frame.jpg");
        fs::write(&image, b"jpeg").unwrap();

        let solver = solver_with("/nonexistent/solve-field");
        let mut log = Vec::new();
        let result = solver.solve(&image, None, &mut log);

        assert!(!result.solved);
        assert_eq!(result.confidence, Some(0.0));
        assert!(log.iter().any(|l| l.starts_with("Failed to run")));
    }

    #[cfg(unix)]
    mod fake_solver {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        const SAMPLE_OUTPUT: &str = "\
echo '[10:42:02] RA,Dec = (296.964,42.7365), pixel scale 80.7537 arcsec/pix.'
echo '[10:42:02] Field center: (RA,Dec) = (296.944646, 42.688983) deg.'
echo '[10:42:02] Field rotation angle: up is -165.998 degrees E of N'";

        /// Write an executable `solve-field` stand-in. It records every
        /// invocation to `calls.log`, then runs `body` with `$input`,
        /// `$solved`, `$keep` and `$hinted` set from its arguments.
        fn fake_solver(dir: &Path, body: &str) -> PathBuf {
            let calls = dir.join("calls.log");
            let script = format!(
                "#!/bin/sh\n\
                 echo \"$@\" >> '{calls}'\n\
                 input=\"$1\"; solved=''; keep=''; hinted=0\n\
                 while [ $# -gt 0 ]; do\n\
                   case \"$1\" in\n\
                     --solved) solved=\"$2\"; shift ;;\n\
                     --keep-xylist) keep=\"$2\"; shift ;;\n\
                     --ra) hinted=1 ;;\n\
                   esac\n\
                   shift\n\
                 done\n\
                 {body}\n",
                calls = calls.display(),
            );
            let path = dir.join("solve-field");
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn calls(dir: &Path) -> Vec<String> {
            fs::read_to_string(dir.join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn frame(dir: &Path) -> PathBuf {
            let image = dir.join("frame.jpg");
            fs::write(&image, b"jpeg").unwrap();
            image
        }

        #[test]
        fn test_phase_one_success_with_hint() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_solver(
                dir.path(),
                &format!("{SAMPLE_OUTPUT}\n: > \"$solved\"\nexit 0"),
            );
            let image = frame(dir.path());

            let solver = solver_with(script.to_str().unwrap());
            let mut log = Vec::new();
            let result = solver.solve(&image, Some(Hint::new(296.0, 42.0, Some(5.0))), &mut log);

            assert!(result.solved);
            let coords = result.coords.unwrap();
            assert_eq!(coords.ra_deg, 296.944646);
            assert_eq!(coords.dec_deg, 42.688983);
            assert_eq!(result.plate_scale_arcsec_px, Some(80.7537));
            assert_eq!(result.roll_deg, Some(-165.998));
            assert_eq!(result.confidence, None);
            assert!(result.is_confident());

            let calls = calls(dir.path());
            assert_eq!(calls.len(), 1);
            assert!(calls[0].contains("--ra 296 --dec 42 --radius 5"));

            // Solver output reaches the sink alongside the phase lines
            assert!(log.iter().any(|l| l.starts_with("Phase 1: solving")));
            assert!(log.iter().any(|l| l.contains("Field center")));
            assert!(log.iter().any(|l| l.starts_with("Solved in")));
        }

        #[test]
        fn test_fallback_runs_unhinted_on_star_list() {
            let dir = tempfile::tempdir().unwrap();
            // Hinted runs fail but keep the star list, unhinted runs solve
            let script = fake_solver(
                dir.path(),
                &format!(
                    "if [ -n \"$keep\" ]; then echo stars > \"$keep\"; fi\n\
                     if [ \"$hinted\" = 1 ]; then echo 'Did not solve'; exit 0; fi\n\
                     {SAMPLE_OUTPUT}\n: > \"$solved\"\nexit 0"
                ),
            );
            let image = frame(dir.path());

            let solver = solver_with(script.to_str().unwrap());
            let mut log = Vec::new();
            let result = solver.solve(&image, Some(Hint::new(10.0, 10.0, None)), &mut log);

            assert!(result.solved);
            let calls = calls(dir.path());
            assert_eq!(calls.len(), 2);
            assert!(calls[0].contains("--ra"));
            assert!(calls[1].starts_with(&dir.path().join("frame.xy").display().to_string()));
            assert!(!calls[1].contains("--ra"));
            assert!(!calls[1].contains("--keep-xylist"));
        }

        #[test]
        fn test_failed_phase_two_result_is_returned() {
            let dir = tempfile::tempdir().unwrap();
            // Phase 1 keeps the star list and fails; phase 2 prints
            // coordinates but never writes the marker
            let script = fake_solver(
                dir.path(),
                &format!(
                    "if [ -n \"$keep\" ]; then echo stars > \"$keep\"; exit 1; fi\n\
                     {SAMPLE_OUTPUT}\nexit 0"
                ),
            );
            let image = frame(dir.path());

            let solver = solver_with(script.to_str().unwrap());
            let mut log = Vec::new();
            let result = solver.solve(&image, Some(Hint::new(10.0, 10.0, None)), &mut log);

            assert!(!result.solved);
            assert!(result.coords.is_none());
            assert_eq!(result.confidence, Some(0.0));
            assert_eq!(calls(dir.path()).len(), 2);
            assert!(log.iter().any(|l| l.starts_with("Phase 1 failed: solver exited")));
            assert!(log.iter().any(|l| l == "Phase 2 failed: no solution marker written"));
            assert!(log.last().unwrap().starts_with("Not solved after"));
        }

        #[test]
        fn test_no_star_list_skips_fallback() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_solver(dir.path(), "echo 'Did not solve'\nexit 1");
            let image = frame(dir.path());

            let solver = solver_with(script.to_str().unwrap());
            let result = solver.solve(&image, None, &mut Vec::new());

            assert!(!result.solved);
            assert_eq!(result.confidence, Some(0.0));
            assert_eq!(calls(dir.path()).len(), 1);
        }

        #[test]
        fn test_fallback_disabled() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_solver(dir.path(), "echo stars > \"$keep\"\nexit 1");
            let image = frame(dir.path());

            let mut solver = solver_with(script.to_str().unwrap());
            solver.fallback = false;
            let result = solver.solve(&image, None, &mut Vec::new());

            assert!(!result.solved);
            assert_eq!(calls(dir.path()).len(), 1);
        }

        #[test]
        fn test_zero_coordinates_with_marker_fail() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_solver(
                dir.path(),
                "echo 'RA,Dec = (0.0,0.0), pixel scale 10 arcsec/pix.'\n: > \"$solved\"\nexit 0",
            );
            let image = frame(dir.path());

            let mut solver = solver_with(script.to_str().unwrap());
            solver.fallback = false;
            let result = solver.solve(&image, None, &mut Vec::new());

            assert!(!result.solved);
            assert!(result.coords.is_none());
        }

        #[test]
        fn test_stale_marker_is_not_trusted() {
            let dir = tempfile::tempdir().unwrap();
            // Prints coordinates but never writes the marker
            let script = fake_solver(dir.path(), &format!("{SAMPLE_OUTPUT}\nexit 0"));
            let image = frame(dir.path());
            let (marker, _) = artifact_paths(&image);
            fs::write(&marker, b"").unwrap();

            let solver = solver_with(script.to_str().unwrap());
            let mut log = Vec::new();
            let result = solver.solve(&image, None, &mut log);

            assert!(!result.solved);
            assert!(log.iter().any(|l| l.contains("no solution marker")));
        }

        #[test]
        fn test_timeout_kills_whole_process_group() {
            let dir = tempfile::tempdir().unwrap();
            // The shell stays the parent, so its sleep holds the pipes
            let script = fake_solver(dir.path(), "sleep 6\nexit 0");
            let image = frame(dir.path());

            let mut solver = solver_with(script.to_str().unwrap());
            solver.fallback = false;
            solver.timeout = Duration::from_millis(300);
            let started = Instant::now();
            let mut log = Vec::new();
            let result = solver.solve(&image, None, &mut log);

            assert!(started.elapsed() < Duration::from_secs(3));
            assert!(!result.solved);
            assert!(log.iter().any(|l| l.contains("timed out")));
        }

        #[test]
        fn test_lingering_helper_does_not_delay_result() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_solver(
                dir.path(),
                &format!("sleep 6 &\n{SAMPLE_OUTPUT}\n: > \"$solved\"\nexit 0"),
            );
            let image = frame(dir.path());

            let solver = solver_with(script.to_str().unwrap());
            let started = Instant::now();
            let result = solver.solve(&image, None, &mut Vec::new());

            assert!(started.elapsed() < Duration::from_secs(4));
            assert!(result.solved);
            assert_eq!(result.coords.unwrap().ra_deg, 296.944646);
        }

        #[test]
        fn test_timeout_kills_solver() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_solver(dir.path(), "exec sleep 10");
            let image = frame(dir.path());

            let mut solver = solver_with(script.to_str().unwrap());
            solver.timeout = Duration::from_millis(300);
            let started = Instant::now();
            let mut log = Vec::new();
            let result = solver.solve(&image, None, &mut log);

            assert!(started.elapsed() < Duration::from_secs(5));
            assert!(!result.solved);
            assert!(log.iter().any(|l| l.contains("timed out")));
        }
    }
}
