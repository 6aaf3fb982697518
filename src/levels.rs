//! # Level Module
//!
//! The 12-step severity taxonomy used throughout the logging core, plus
//! name parsing (with documented aliases) and the single-byte letter code
//! used in the sink line format.

use crate::error::{LogCoreError, Result};

/// Severity level, ordered most-to-least severe.
///
/// A record is emitted only if its level is numerically `<=` the logger's
/// configured level (`Level::Panic` is the most restrictive/loudest,
/// `Level::Lowest` lets everything through).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Panic = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Output = 6,
    Info = 7,
    Debug = 8,
    Fine = 9,
    Trace = 10,
    Lowest = 11,
}

/// All levels in most-to-least severe order, for iteration.
pub const ALL_LEVELS: [Level; 12] = [
    Level::Panic,
    Level::Alert,
    Level::Critical,
    Level::Error,
    Level::Warning,
    Level::Notice,
    Level::Output,
    Level::Info,
    Level::Debug,
    Level::Fine,
    Level::Trace,
    Level::Lowest,
];

impl Level {
    /// Parses a level name, accepting the documented aliases.
    ///
    /// Aliases: `emergency` -> panic, `crit` -> critical, `err` -> error,
    /// `warn` -> warning, `out` -> output. Comparison is case-insensitive.
    pub fn from_name(name: &str) -> Option<Level> {
        match name.to_ascii_lowercase().as_str() {
            "panic" | "emergency" => Some(Level::Panic),
            "alert" => Some(Level::Alert),
            "critical" | "crit" => Some(Level::Critical),
            "error" | "err" => Some(Level::Error),
            "warning" | "warn" => Some(Level::Warning),
            "notice" => Some(Level::Notice),
            "output" | "out" => Some(Level::Output),
            "info" => Some(Level::Info),
            "debug" => Some(Level::Debug),
            "fine" => Some(Level::Fine),
            "trace" => Some(Level::Trace),
            "lowest" => Some(Level::Lowest),
            _ => None,
        }
    }

    /// Like `from_name`, but returns a `Config` error for unknown names.
    pub fn parse(name: &str) -> Result<Level> {
        Level::from_name(name).ok_or_else(|| LogCoreError::Config(format!("unknown level name: '{name}'")))
    }

    /// The single-byte letter code used as the first field of a sink line.
    pub fn letter(self) -> u8 {
        match self {
            Level::Panic => b'P',
            Level::Alert => b'A',
            Level::Critical => b'C',
            Level::Error => b'E',
            Level::Warning => b'W',
            Level::Notice => b'N',
            Level::Output => b'O',
            Level::Info => b'I',
            Level::Debug => b'D',
            Level::Fine => b'F',
            Level::Trace => b'T',
            Level::Lowest => b'L',
        }
    }

    /// Converts a raw discriminant back into a `Level`, clamping to `Lowest`
    /// on out-of-range values (used when decoding a record header so a
    /// corrupt frame cannot panic the handler).
    pub fn from_u8(v: u8) -> Level {
        ALL_LEVELS.get(v as usize).copied().unwrap_or(Level::Lowest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_most_to_least_severe() {
        assert!(Level::Panic < Level::Alert);
        assert!(Level::Error < Level::Warning);
        assert!(Level::Trace < Level::Lowest);
    }

    #[test]
    fn test_from_name_canonical() {
        assert_eq!(Level::from_name("panic"), Some(Level::Panic));
        assert_eq!(Level::from_name("OUTPUT"), Some(Level::Output));
        assert_eq!(Level::from_name("lowest"), Some(Level::Lowest));
    }

    #[test]
    fn test_from_name_aliases() {
        assert_eq!(Level::from_name("emergency"), Some(Level::Panic));
        assert_eq!(Level::from_name("crit"), Some(Level::Critical));
        assert_eq!(Level::from_name("err"), Some(Level::Error));
        assert_eq!(Level::from_name("warn"), Some(Level::Warning));
        assert_eq!(Level::from_name("out"), Some(Level::Output));
    }

    #[test]
    fn test_from_name_unknown() {
        assert_eq!(Level::from_name("bogus"), None);
        assert!(Level::parse("bogus").is_err());
    }

    #[test]
    fn test_letter_codes() {
        assert_eq!(Level::Panic.letter(), b'P');
        assert_eq!(Level::Critical.letter(), b'C');
        assert_eq!(Level::Info.letter(), b'I');
        assert_eq!(Level::Lowest.letter(), b'L');
    }

    #[test]
    fn test_from_u8_roundtrip() {
        for (i, lvl) in ALL_LEVELS.iter().enumerate() {
            assert_eq!(Level::from_u8(i as u8), *lvl);
        }
        assert_eq!(Level::from_u8(255), Level::Lowest);
    }

    #[test]
    fn test_is_enabled_semantics() {
        let logger_level = Level::Output;
        assert!(Level::Error <= logger_level);
        assert!(!(Level::Debug <= logger_level));
    }
}
