//! Parsing of `solve-field` console output.
//!
//! Lines look like
//!
//! ```text
//! [10:42:02] RA,Dec = (296.964,42.7365), pixel scale 80.7537 arcsec/pix.
//! [10:42:02] Field center: (RA,Dec) = (296.944646, 42.688983) deg.
//! [10:42:02] Field rotation angle: up is -165.998 degrees E of N
//! ```
//!
//! Lines are scanned in order and each later match overwrites an earlier
//! one, so the refined field center reported after the first estimate wins.

use once_cell::sync::Lazy;
use regex::Regex;

const NUMBER: &str = r"[-+]?\d+(?:\.\d*)?(?:[eE][-+]?\d+)?";

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| pattern(r"^\[\d{2}:\d{2}:\d{2}\]\s*"));

static RA_DEC: Lazy<Regex> = Lazy::new(|| pattern(r"RA,Dec\s*=\s*\(\s*(N)\s*,\s*(N)\s*\)"));

static FIELD_CENTER: Lazy<Regex> =
    Lazy::new(|| pattern(r"Field center: \(RA,Dec\) = \(\s*(N)\s*,\s*(N)\s*\)"));

static PIXEL_SCALE: Lazy<Regex> = Lazy::new(|| pattern(r"pixel scale\s+(N)\s*arcsec/pix"));

static ROTATION: Lazy<Regex> =
    Lazy::new(|| pattern(r"Field rotation angle: up is\s+(N)\s*degrees"));

static CONFIDENCE: Lazy<Regex> = Lazy::new(|| pattern(r"Confidence:\s*(N)"));

/// Build a regex with every `(N)` placeholder standing for a decimal number.
fn pattern(template: &str) -> Regex {
    let expanded = template.replace("(N)", &format!("({NUMBER})"));
    // Templates are fixed at compile time and covered by tests
    Regex::new(&expanded).unwrap_or_else(|e| panic!("invalid solver output pattern: {e}"))
}

/// Values recovered from a solver transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub ra_deg: Option<f64>,
    pub dec_deg: Option<f64>,
    pub plate_scale_arcsec_px: Option<f64>,
    pub roll_deg: Option<f64>,
    /// `None` when no score was reported or the reported score was zero
    pub confidence: Option<f64>,
}

impl ParsedOutput {
    /// RA/Dec when both were parsed and neither is exactly zero.
    ///
    /// A zero coordinate cannot be told apart from an unset one in the
    /// transcript, so it never counts as a solution.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.ra_deg, self.dec_deg) {
            (Some(ra), Some(dec)) if ra != 0.0 && dec != 0.0 => Some((ra, dec)),
            _ => None,
        }
    }
}

fn capture_f64(re: &Regex, line: &str, group: usize) -> Option<f64> {
    re.captures(line)
        .and_then(|caps| caps.get(group))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a transcript line by line.
pub fn parse_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();

    for raw in lines {
        let line = TIMESTAMP.replace(raw, "");
        let line = line.as_ref();

        if let (Some(ra), Some(dec)) = (
            capture_f64(&RA_DEC, line, 1),
            capture_f64(&RA_DEC, line, 2),
        ) {
            parsed.ra_deg = Some(ra);
            parsed.dec_deg = Some(dec);
        } else if let (Some(ra), Some(dec)) = (
            capture_f64(&FIELD_CENTER, line, 1),
            capture_f64(&FIELD_CENTER, line, 2),
        ) {
            parsed.ra_deg = Some(ra);
            parsed.dec_deg = Some(dec);
        }

        if let Some(scale) = capture_f64(&PIXEL_SCALE, line, 1) {
            parsed.plate_scale_arcsec_px = Some(scale);
        }
        if let Some(roll) = capture_f64(&ROTATION, line, 1) {
            parsed.roll_deg = Some(roll);
        }
        if let Some(confidence) = capture_f64(&CONFIDENCE, line, 1) {
            parsed.confidence = (confidence != 0.0).then_some(confidence);
        }
    }

    parsed
}

/// Parse a whole transcript.
pub fn parse_output(text: &str) -> ParsedOutput {
    parse_lines(text.lines())
}
