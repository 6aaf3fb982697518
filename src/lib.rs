//! # logcore
//!
//! A high-throughput, low-contention logging core built around a single
//! dedicated writer thread. Producers never touch the sink: they encode a
//! record into one heap-allocated frame and hand it off to the **Internal
//! Handler** through a bounded, lossy data channel, falling back to a
//! blocking send only after a short burst of non-blocking retries. A
//! separate control channel carries the rare readiness/flush/exit
//! requests, and a third input -- a bridge fed by both a `signalfd` and a
//! self-pipe written from a process-wide `sigaction` handler -- lets the
//! handler log a structured record for a fatal signal (`SIGSEGV`,
//! `SIGBUS`, `SIGFPE`, `SIGILL`, or, outside the handler thread, `SIGINT`/
//! `SIGTERM`) before the process goes down.
//!
//! The library is organized into focused modules:
//! - [`levels`]: the 12-step severity taxonomy and its name/letter encodings.
//! - [`record`]: the wire format for one submitted log record (a fixed
//!   header plus a variable, separator-free tail).
//! - [`registry`]: the process-wide set of named [`Logger`] handles,
//!   lock-free on the read path, prefix-matched on reconfiguration.
//! - [`channels`]: the data and control channels between producers and the
//!   Internal Handler.
//! - [`thread_state`]: the lazily-built per-thread bundle (scratch buffer,
//!   cached kernel thread id, caller-assigned rank) and the retry-then-block
//!   submission path.
//! - [`sink`]: the append-only byte stream the handler writes rendered
//!   lines into, plus its durable-flush semantics.
//! - [`format`]: timestamp, sink-line, and signal-description rendering.
//! - [`handler`]: the Internal Handler's poll loop.
//! - [`signal`]: the inside-handler and outside-handler fault regimes.
//! - [`fork`]: `pthread_atfork` hooks keeping the subsystem consistent
//!   across `fork(2)`.
//! - [`lifecycle`]: the `init`/`finalize`/`flush` state machine tying it
//!   all together.
//! - [`error`]: the chained error type shared across every module.

pub mod channels;
pub mod error;
pub mod fork;
pub mod format;
pub mod handler;
pub mod levels;
pub mod lifecycle;
pub mod record;
pub mod registry;
pub mod signal;
pub mod sink;
pub mod thread_state;

pub use error::{LogCoreError, Result};
pub use levels::{Level, ALL_LEVELS};
pub use lifecycle::State;
pub use registry::{configure, register, snapshot, unregister, Logger};

/// Starts the subsystem: spawns the Internal Handler, opens `sink_selector`
/// from it (`"-"` stdout, `"+"` stderr, else an append-mode file path), and
/// blocks until the handler acknowledges readiness. `program_name` is
/// rendered into every sink line's `PROG` field.
///
/// Legal only when the subsystem is unset, finalized, or freshly forked.
pub fn init(program_name: &str, sink_selector: &str) -> Result<()> {
    lifecycle::init(program_name, sink_selector)
}

/// Stops the subsystem: requests the handler's exit, joins its thread, and
/// unpublishes the channels. Legal only when initialized.
pub fn finalize() -> Result<()> {
    lifecycle::finalize()
}

/// Requests a synchronous durable flush from the handler. A no-op when the
/// subsystem is not currently initialized.
pub fn flush() -> Result<()> {
    lifecycle::flush()
}

/// `true` exactly when the subsystem is in the `Initialized` state and
/// producers may submit records.
pub fn is_initialized() -> bool {
    lifecycle::current_state() == lifecycle::State::Initialized
}

/// Submits one already-formatted message. Discards silently (returns `Ok`)
/// if `logger` filters `level` out or the subsystem is not initialized --
/// neither is an error, both are the normal way most calls end.
pub fn submit_record(
    logger: &Logger,
    level: Level,
    file: &str,
    line: u32,
    func: &str,
    message: &str,
) -> Result<()> {
    if !logger.is_enabled_for(level) || !is_initialized() {
        return Ok(());
    }
    let timestamp_ns = format::time::now_ns().unwrap_or(0);
    let frame = record::encode(
        level,
        timestamp_ns,
        thread_state::kernel_tid(),
        thread_state::thread_rank(),
        line,
        file,
        func,
        logger.name(),
        message,
    );
    thread_state::submit(frame)
}

/// Best-effort enclosing-function name, for the macros below. Mirrors the
/// `__func__` a C caller would pass; Rust has no stable equivalent, so this
/// leans on the generic-`type_name` trick rather than pulling in a crate.
#[doc(hidden)]
#[macro_export]
macro_rules! __logcore_current_function {
    () => {{
        fn marker() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(marker);
        name.strip_suffix("::marker").unwrap_or(name)
    }};
}

/// Logs a formatted message through `logger` at `level`, reusing the
/// calling thread's scratch buffer. Expands to nothing observable (an
/// `Ok(())`) when the logger filters `level` out or the subsystem is not
/// initialized.
///
/// ```ignore
/// let logger = logcore::Logger::new("app.db", logcore::Level::Info);
/// logcore::log!(logger, logcore::Level::Error, "connection failed: {}", err);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {{
        let level = $level;
        if $logger.is_enabled_for(level) {
            $crate::thread_state::with_formatted_message(format_args!($($arg)+), |message| {
                $crate::submit_record(
                    &$logger,
                    level,
                    file!(),
                    line!(),
                    $crate::__logcore_current_function!(),
                    message,
                )
            })
        } else {
            Ok(())
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_record_noop_when_level_filtered() {
        let logger = Logger::new("t.lib.filtered", Level::Error);
        let result = submit_record(&logger, Level::Debug, "f.rs", 1, "f", "hidden");
        assert!(result.is_ok());
    }

    #[test]
    fn test_submit_record_noop_when_not_initialized() {
        let logger = Logger::new("t.lib.uninit", Level::Lowest);
        if !is_initialized() {
            let result = submit_record(&logger, Level::Error, "f.rs", 1, "f", "unreachable sink");
            assert!(result.is_ok());
        }
    }
}
