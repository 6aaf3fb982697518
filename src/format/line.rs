//! The fixed sink line schema.
//!
//! ```text
//! L|YYYYMMDDTHHMMSS.NNNNNNNNN|PPPPP.TTTTT=RRRRR:PROG|FILE:LINE@FUNC|LOGGER|MESSAGE\n
//! ```
//!
//! When the kernel thread id is unavailable the `.TTTTT=` segment collapses
//! to a single `:`, giving `PPPPP:RRRRR:PROG`.

use crate::format::time::format_timestamp_ns;
use crate::levels::Level;

/// Extracts the basename (final `/`-delimited path segment) of `path`.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Renders one sink output line for a single newline-delimited message
/// segment, sharing the header fields of the record it was split from.
#[allow(clippy::too_many_arguments)]
pub fn render_line(
    level: Level,
    timestamp_ns: i64,
    pid: u32,
    kernel_tid: Option<u32>,
    thread_rank: u16,
    program: &str,
    file: &str,
    line: u32,
    func: &str,
    logger_name: &str,
    message_segment: &str,
) -> Vec<u8> {
    let time_str = format_timestamp_ns(timestamp_ns);
    let origin = match kernel_tid {
        Some(tid) => format!("{:05}.{:05}={:05}:{}", pid, tid, thread_rank, program),
        None => format!("{:05}:{:05}:{}", pid, thread_rank, program),
    };

    let mut out = String::with_capacity(time_str.len() + origin.len() + message_segment.len() + 32);
    out.push(level.letter() as char);
    out.push('|');
    out.push_str(&time_str);
    out.push('|');
    out.push_str(&origin);
    out.push('|');
    out.push_str(basename(file));
    out.push(':');
    out.push_str(&line.to_string());
    out.push('@');
    out.push_str(func);
    out.push('|');
    out.push_str(logger_name);
    out.push('|');
    out.push_str(message_segment);
    out.push('\n');
    out.into_bytes()
}

/// Splits a record's message on `\n`, one entry per output line, preserving
/// source order. An empty message yields a single empty segment.
pub fn split_message_lines(message: &str) -> Vec<&str> {
    message.split('\n').collect()
}
