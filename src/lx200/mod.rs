//! Read-only Meade LX200 endpoint exposing the latest solve.

pub mod format;
pub mod protocol;
pub mod server;

pub use format::{format_dec, format_ra, parse_dec, parse_ra};
pub use protocol::{CommandBuffer, respond};
pub use server::{Lx200Handle, Lx200Server, TrafficLog};
