//! Meade LX200 command framing and replies.
//!
//! Commands are `#`-terminated and usually start with `:`. The server only
//! answers queries. Setters are acknowledged and discarded, and motion
//! commands are refused with `0`, so no client can ever move a mount through
//! this port.

use chrono::{DateTime, Local};

use super::format::{format_dec, format_ra};
use crate::common::constants::{LX200_FIRMWARE_VERSION, LX200_PRODUCT_NAME, LX200_TERMINATOR};
use crate::model::SolveResult;

/// Accumulates bytes from one connection and yields complete commands.
///
/// Partial commands split across reads stay buffered until their
/// terminator arrives.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    pending: String,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and drain every complete command.
    ///
    /// Each returned command keeps its terminator and is normalized to start
    /// with `:`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut commands = Vec::new();
        while let Some(index) = self.pending.find(LX200_TERMINATOR) {
            let raw: String = self.pending.drain(..=index).collect();
            let command = raw.trim_matches(|c: char| c.is_whitespace() || c.is_control());
            if command.is_empty() {
                continue;
            }
            commands.push(if command.starts_with(':') {
                command.to_string()
            } else {
                format!(":{command}")
            });
        }
        commands
    }

    /// Bytes received after the last terminator.
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

const MOTION_COMMANDS: [&str; 5] = [":MS#", ":Mn#", ":Me#", ":Ms#", ":Mw#"];
const SETTER_PREFIXES: [&str; 4] = [":SC", ":SL", ":St", ":Sg"];

/// Reply to one normalized command.
///
/// `latest` is the most recently published result; a missing result or one
/// without coordinates reads as RA 0 / Dec 0 rather than an empty reply.
pub fn respond(command: &str, latest: Option<&SolveResult>, now: DateTime<Local>) -> String {
    let upper = command.to_ascii_uppercase();
    let coords = latest.and_then(|result| result.coords);

    if upper.starts_with(":GR#") || upper.starts_with(":RS#") {
        let ra = coords.map_or(0.0, |c| c.ra_deg);
        return format!("{}#", format_ra(ra));
    }
    if upper.starts_with(":GD#") {
        let dec = coords.map_or(0.0, |c| c.dec_deg);
        return format!("{}#", format_dec(dec));
    }
    if command.starts_with(":GVP#") {
        return format!("{LX200_PRODUCT_NAME}#");
    }
    if command.starts_with(":GVN#") {
        return format!("{LX200_FIRMWARE_VERSION}#");
    }
    if command.starts_with(":GVD#") || command.starts_with(":GC#") {
        return format!("{}#", now.format("%m/%d/%y"));
    }
    if command.starts_with(":GVT#") || command.starts_with(":GL#") {
        return format!("{}#", now.format("%H:%M:%S"));
    }
    if command.starts_with(":U#") {
        return "1".to_string();
    }
    if SETTER_PREFIXES.iter().any(|p| command.starts_with(p)) {
        return "1".to_string();
    }
    if MOTION_COMMANDS.iter().any(|m| command.starts_with(m)) {
        return "0".to_string();
    }
    "#".to_string()
}
