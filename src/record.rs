//! # Record Module
//!
//! The wire format for a single log record: a fixed-size header followed
//! by a variable tail (`filename || funcname || logger-name || message`,
//! no separators, lengths taken from the header). Records are built once
//! as a single `Vec<u8>` allocation (the frame) and transferred by
//! ownership through the data channel; the writer slices the tail back
//! out without copying.

use crate::levels::Level;

/// Number of bytes occupied by the fixed header at the front of every frame.
const HEADER_LEN: usize = 1 + 8 + 4 + 2 + 4 + 2 + 2 + 2 + 4;

/// Header fields decoded from a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub level: Level,
    /// Wall-clock timestamp, nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
    /// Kernel thread id, platform-dependent; `None` when unavailable.
    pub kernel_tid: Option<u32>,
    /// Caller-assigned 16-bit tag identifying the producer.
    pub thread_rank: u16,
    pub line: u32,
}

/// An owned, encoded log record frame: header bytes followed by the tail.
pub type Frame = Vec<u8>;

/// Encodes a record into a single heap-allocated frame.
///
/// `kernel_tid` of `None` is encoded as `u32::MAX`, which is reserved and
/// never a real thread id.
#[allow(clippy::too_many_arguments)]
pub fn encode(
    level: Level,
    timestamp_ns: i64,
    kernel_tid: Option<u32>,
    thread_rank: u16,
    line: u32,
    file: &str,
    func: &str,
    logger_name: &str,
    message: &str,
) -> Frame {
    let tail_len = file.len() + func.len() + logger_name.len() + message.len();
    let mut frame = Vec::with_capacity(HEADER_LEN + tail_len);

    frame.push(level as u8);
    frame.extend_from_slice(&timestamp_ns.to_le_bytes());
    frame.extend_from_slice(&kernel_tid.unwrap_or(u32::MAX).to_le_bytes());
    frame.extend_from_slice(&thread_rank.to_le_bytes());
    frame.extend_from_slice(&line.to_le_bytes());
    frame.extend_from_slice(&(file.len() as u16).to_le_bytes());
    frame.extend_from_slice(&(func.len() as u16).to_le_bytes());
    frame.extend_from_slice(&(logger_name.len() as u16).to_le_bytes());
    frame.extend_from_slice(&(message.len() as u32).to_le_bytes());

    frame.extend_from_slice(file.as_bytes());
    frame.extend_from_slice(func.as_bytes());
    frame.extend_from_slice(logger_name.as_bytes());
    frame.extend_from_slice(message.as_bytes());

    debug_assert_eq!(frame.len(), HEADER_LEN + tail_len);
    frame
}

/// A record decoded from a frame: the fixed header plus borrowed slices
/// into the frame's tail. No copy of the tail is made.
pub struct DecodedRecord<'a> {
    pub header: RecordHeader,
    pub file: &'a str,
    pub func: &'a str,
    pub logger_name: &'a str,
    pub message: &'a str,
}

/// Decodes a frame produced by `encode`, zero-copy.
///
/// Panics only on a frame shorter than the fixed header, which would
/// indicate the codec itself is broken (never a reachable state via the
/// public submission path) rather than a recoverable data error.
pub fn decode(frame: &Frame) -> DecodedRecord<'_> {
    assert!(frame.len() >= HEADER_LEN, "frame shorter than fixed header");

    let level = Level::from_u8(frame[0]);
    let timestamp_ns = i64::from_le_bytes(frame[1..9].try_into().unwrap());
    let raw_tid = u32::from_le_bytes(frame[9..13].try_into().unwrap());
    let kernel_tid = if raw_tid == u32::MAX { None } else { Some(raw_tid) };
    let thread_rank = u16::from_le_bytes(frame[13..15].try_into().unwrap());
    let line = u32::from_le_bytes(frame[15..19].try_into().unwrap());
    let filename_len = u16::from_le_bytes(frame[19..21].try_into().unwrap()) as usize;
    let funcname_len = u16::from_le_bytes(frame[21..23].try_into().unwrap()) as usize;
    let logger_name_len = u16::from_le_bytes(frame[23..25].try_into().unwrap()) as usize;
    let message_len = u32::from_le_bytes(frame[25..29].try_into().unwrap()) as usize;

    let mut off = HEADER_LEN;
    let file = &frame[off..off + filename_len];
    off += filename_len;
    let func = &frame[off..off + funcname_len];
    off += funcname_len;
    let logger_name = &frame[off..off + logger_name_len];
    off += logger_name_len;
    let message = &frame[off..off + message_len];

    DecodedRecord {
        header: RecordHeader {
            level,
            timestamp_ns,
            kernel_tid,
            thread_rank,
            line,
        },
        file: std::str::from_utf8(file).unwrap_or(""),
        func: std::str::from_utf8(func).unwrap_or(""),
        logger_name: std::str::from_utf8(logger_name).unwrap_or(""),
        message: std::str::from_utf8(message).unwrap_or(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_basic() {
        let frame = encode(
            Level::Info,
            1_700_000_000_123_456_789,
            Some(4242),
            7,
            10,
            "f.c",
            "fn",
            "logger",
            "hello",
        );
        let rec = decode(&frame);
        assert_eq!(rec.header.level, Level::Info);
        assert_eq!(rec.header.timestamp_ns, 1_700_000_000_123_456_789);
        assert_eq!(rec.header.kernel_tid, Some(4242));
        assert_eq!(rec.header.thread_rank, 7);
        assert_eq!(rec.header.line, 10);
        assert_eq!(rec.file, "f.c");
        assert_eq!(rec.func, "fn");
        assert_eq!(rec.logger_name, "logger");
        assert_eq!(rec.message, "hello");
    }

    #[test]
    fn test_missing_kernel_tid() {
        let frame = encode(Level::Debug, 0, None, 0, 0, "a", "b", "c", "d");
        let rec = decode(&frame);
        assert_eq!(rec.header.kernel_tid, None);
    }

    #[test]
    fn test_empty_message() {
        let frame = encode(Level::Trace, 1, Some(1), 1, 1, "f", "g", "l", "");
        let rec = decode(&frame);
        assert_eq!(rec.message, "");
    }

    #[test]
    fn test_multiline_message_preserved_whole() {
        let frame = encode(Level::Warning, 1, Some(1), 1, 1, "f", "g", "l", "a\nb\nc");
        let rec = decode(&frame);
        assert_eq!(rec.message, "a\nb\nc");
    }

    #[test]
    fn test_tail_ordering_no_separators() {
        let frame = encode(Level::Error, 1, Some(1), 1, 1, "ab", "cd", "ef", "gh");
        // tail is "abcdefgh" with no separators; lengths alone disambiguate it
        let tail = &frame[frame.len() - 8..];
        assert_eq!(tail, b"abcdefgh");
    }
}
