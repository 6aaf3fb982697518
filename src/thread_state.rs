//! # Per-Thread State
//!
//! Every producer thread lazily builds a small bundle of state the first
//! time it logs: a reusable scratch buffer for formatting a message
//! without allocating on every call, its kernel thread id (cached, since
//! `gettid(2)` is itself a syscall), and a caller-assigned rank that
//! defaults to 0 until `set_thread_rank` is called. The bundle is dropped
//! automatically at thread exit; nothing here outlives its owning thread.
//!
//! `submit` also lives here: it is the producer-side half of the data
//! channel contract described in `channels` -- a bounded number of
//! non-blocking retries, then a blocking send so a record is never
//! silently dropped once the producer commits to waiting for it.

use std::cell::RefCell;
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::channels;
use crate::error::{LogCoreError, Result};
use crate::lifecycle;
use crate::record::Frame;

/// Non-blocking send attempts before falling back to a blocking send.
const RETRIES_MAX: u32 = 3;
/// Delay between non-blocking retry attempts.
const RETRY_DELAY: Duration = Duration::from_micros(500);

struct ThreadState {
    scratch: String,
    kernel_tid: Option<u32>,
    rank: u16,
}

impl ThreadState {
    fn new() -> ThreadState {
        ThreadState {
            scratch: String::new(),
            kernel_tid: current_kernel_tid(),
            rank: 0,
        }
    }
}

/// The kernel's own thread id, distinct from any userspace thread handle.
/// Linux has no libc wrapper for `gettid(2)`, so this goes through the raw
/// syscall directly -- the standard idiom until a wrapper lands in `libc`.
fn current_kernel_tid() -> Option<u32> {
    let raw = unsafe { libc::syscall(libc::SYS_gettid) };
    u32::try_from(raw).ok()
}

thread_local! {
    static STATE: RefCell<ThreadState> = RefCell::new(ThreadState::new());
}

/// This thread's cached kernel thread id, `None` only if `gettid(2)`
/// somehow returned a negative value.
pub fn kernel_tid() -> Option<u32> {
    STATE.with(|s| s.borrow().kernel_tid)
}

/// This thread's caller-assigned rank, `0` until `set_thread_rank` is called.
pub fn thread_rank() -> u16 {
    STATE.with(|s| s.borrow().rank)
}

/// Assigns this thread's rank, used as the `RRRRR` field of every record
/// it subsequently submits.
pub fn set_thread_rank(rank: u16) {
    STATE.with(|s| s.borrow_mut().rank = rank);
}

/// Formats `args` into this thread's reused scratch buffer and hands the
/// resulting borrowed `&str` to `f`, avoiding a fresh allocation per call
/// for the common case of a simple formatted message.
pub fn with_formatted_message<R>(args: fmt::Arguments<'_>, f: impl FnOnce(&str) -> R) -> R {
    STATE.with(|s| {
        let mut state = s.borrow_mut();
        state.scratch.clear();
        fmt::Write::write_fmt(&mut state.scratch, args).ok();
        f(&state.scratch)
    })
}

/// Enqueues `frame` onto the current data channel epoch: up to
/// `RETRIES_MAX` non-blocking attempts spaced `RETRY_DELAY` apart, then one
/// blocking send. Returns `IllegalState` if the subsystem is not currently
/// initialized, `RetriesExhausted` only if even the blocking send fails
/// (the handler has gone away).
pub fn submit(mut frame: Frame) -> Result<()> {
    let epoch = lifecycle::channels_snapshot()
        .ok_or_else(|| LogCoreError::IllegalState("submit with no active data channel".to_string()))?;

    for _ in 0..RETRIES_MAX {
        match channels::try_send_frame(&epoch.data_tx, frame) {
            Ok(()) => return Ok(()),
            Err(returned) => {
                frame = returned;
                thread::sleep(RETRY_DELAY);
            }
        }
    }

    epoch
        .data_tx
        .send(frame)
        .map_err(|_| LogCoreError::RetriesExhausted("data channel disconnected".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_defaults_to_zero_and_is_settable() {
        assert_eq!(thread_rank(), 0);
        set_thread_rank(42);
        assert_eq!(thread_rank(), 42);
        set_thread_rank(0);
    }

    #[test]
    fn test_kernel_tid_is_cached_and_present_on_linux() {
        assert!(kernel_tid().is_some());
    }

    #[test]
    fn test_with_formatted_message_reuses_buffer() {
        let first = with_formatted_message(format_args!("a={}", 1), |s| s.to_string());
        assert_eq!(first, "a=1");
        let second = with_formatted_message(format_args!("b={}", 2), |s| s.to_string());
        assert_eq!(second, "b=2");
    }

}
