//! # Format Module
//!
//! Pure formatting helpers consumed by the Internal Handler: wall-clock
//! timestamp rendering, the fixed sink line schema, and signal-description
//! strings. None of these functions touch global state or do I/O.

pub mod line;
pub mod signal;
pub mod time;

pub use line::render_line;
pub use time::format_timestamp_ns;
