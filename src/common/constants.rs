//! Application-wide defaults and protocol constants.

// # Orchestrator cadence

/// Seconds between orchestrator cycles.
pub const DEFAULT_CYCLE_INTERVAL: f64 = 2.0;
/// Seconds to back off after a cycle fails.
pub const DEFAULT_ERROR_BACKOFF: f64 = 10.0;
pub const DEFAULT_STATUS_FILE: &str = "/tmp/skysolve/status.json";

// # Solve acceptance

/// Reported confidence must exceed this for a result to feed the hint cache.
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

// # Solver defaults

pub const DEFAULT_SOLVER_COMMAND: &str = "solve-field";
/// Hard wall-clock limit for one solver phase, in seconds.
pub const DEFAULT_SOLVER_TIMEOUT: u64 = 60;
/// Seconds a cached pointing remains usable as a search hint.
pub const DEFAULT_HINT_TIMEOUT: f64 = 10.0;
/// Search radius in degrees passed alongside a hint.
pub const DEFAULT_SOLVE_RADIUS: f64 = 20.0;
pub const DEFAULT_SOLVER_FALLBACK: bool = true;
pub const DEFAULT_SIGMA: f64 = 6.0;
pub const DEFAULT_DEPTH: &str = "20,30,40";
pub const DEFAULT_UNIFORMIZE: u32 = 0;
/// Interval at which a running solver process is polled for exit.
pub const SOLVER_POLL_INTERVAL_MS: u64 = 100;
/// How long to keep reading output after the solver exits. Helpers it left
/// behind may hold the pipes open.
pub const SOLVER_OUTPUT_GRACE_MS: u64 = 1000;

/// Transcript lines shown after a failed solve when debug output is off.
pub const SOLVER_TRANSCRIPT_TAIL: usize = 5;

/// Marker written by the solver on definitive success.
pub const SOLVED_MARKER_EXTENSION: &str = "solved";
/// Extracted star list kept from phase 1 for the unhinted retry.
pub const XYLIST_EXTENSION: &str = "xy";

// Synthetic pointing produced by the demo backend
pub const DEMO_RA_DEG: f64 = 180.0;
pub const DEMO_DEC_DEG: f64 = 45.0;
pub const DEMO_ROLL_DEG: f64 = 0.0;
pub const DEMO_PLATE_SCALE: f64 = 12.3;
pub const DEMO_CONFIDENCE: f64 = 0.95;

// # Camera defaults

pub const DEFAULT_CAMERA_COMMAND: &str = "rpicam-still";
/// Exposure in seconds.
pub const DEFAULT_SHUTTER_SPEED: f64 = 1.0;
pub const DEFAULT_ISO_SPEED: u32 = 800;
pub const DEFAULT_IMAGE_SIZE: &str = "1280x960";
pub const DEFAULT_CAPTURE_OUTPUT: &str = "/tmp/skysolve/capture.jpg";

// # LX200 server

pub const DEFAULT_LX200_HOST: &str = "0.0.0.0";
pub const DEFAULT_LX200_PORT: u16 = 5002;
pub const LX200_PRODUCT_NAME: &str = "Skysolve Next";
pub const LX200_FIRMWARE_VERSION: &str = "0.1";
pub const LX200_TERMINATOR: char = '#';
/// Read timeout on client sockets; a timeout only re-checks the running flag.
pub const LX200_CLIENT_READ_TIMEOUT_MS: u64 = 1000;
pub const LX200_ACCEPT_POLL_MS: u64 = 20;
pub const LX200_ACCEPT_BACKOFF_MS: u64 = 500;
pub const LX200_READ_BUFFER_SIZE: usize = 4096;
/// Entries kept in the in-memory protocol traffic journal.
pub const LX200_TRAFFIC_CAPACITY: usize = 200;

// # Mount client

pub const DEFAULT_MOUNT_HOST: &str = "192.168.0.1";
pub const DEFAULT_MOUNT_PORT: u16 = 9998;
/// Connect/read/write timeout in seconds.
pub const DEFAULT_MOUNT_TIMEOUT: f64 = 3.0;
pub const DEFAULT_SLEW_TIMEOUT: f64 = 120.0;
pub const DEFAULT_SLEW_POLL_INTERVAL: f64 = 1.0;
pub const MOUNT_REPLY_BUFFER_SIZE: usize = 64;

/// Upper bound for any configured interval or timeout, in seconds.
pub const MAX_CONFIG_SECONDS: f64 = 86_400.0;

// # Config file watching

/// Debounce for file change events, editors often write in several steps.
pub const CONFIG_WATCH_DEBOUNCE_MS: u64 = 500;
pub const CONFIG_FILE_NAME: &str = "skysolve.toml";
pub const CONFIG_DIR_NAME: &str = "skysolve";

// # Exit codes

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
