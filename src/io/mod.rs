//! Process-level I/O: Unix signal handling.

pub mod signals;
