//! # Lifecycle Module
//!
//! The process-wide state machine (`UNSET -> INITIALIZING -> INITIALIZED
//! -> FINALIZING -> FINALIZED`, with `FORKED` and `ILLEGAL` as the fork and
//! error sinks) and the two entry points that drive it: `init` spawns the
//! Internal Handler and waits for its readiness reply; `finalize` requests
//! its exit and joins the thread. A single mutex serializes transitions;
//! a lock-free atomic mirror lets the hot submission path check
//! "are we initialized?" without ever touching that mutex.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::channels::{self, ControlSender, DataSender};
use crate::error::{LogCoreError, Result};
use crate::fork;
use crate::handler;
use crate::signal;

/// A lifecycle state. Numeric values match the transition table; producers
/// only ever need to compare against `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Unset = 0,
    Initializing = 1,
    Initialized = 2,
    Finalizing = 3,
    Finalized = 4,
    Forked = 5,
    Illegal = 6,
}

impl State {
    fn from_u8(v: u8) -> State {
        match v {
            0 => State::Unset,
            1 => State::Initializing,
            2 => State::Initialized,
            3 => State::Finalizing,
            4 => State::Finalized,
            5 => State::Forked,
            _ => State::Illegal,
        }
    }
}

static STATE_HINT: AtomicU8 = AtomicU8::new(State::Unset as u8);

/// Lock-free read of the current state. Producers use this to decide,
/// without contending on any mutex, whether a record is worth building.
pub fn current_state() -> State {
    State::from_u8(STATE_HINT.load(Ordering::Acquire))
}

/// The data and control channel producer ends published for the lifetime
/// of one `init`/`finalize` cycle. Producers snapshot this lock-free via
/// `CHANNELS.load()`; it is replaced wholesale on every transition, so a
/// cached `Arc` clone a thread happened to be holding during a fork or a
/// finalize/init cycle stays perfectly usable for its own lifetime.
pub struct ChannelsEpoch {
    pub data_tx: DataSender,
    pub control_tx: ControlSender,
}

static CHANNELS: Lazy<ArcSwapOption<ChannelsEpoch>> = Lazy::new(|| ArcSwapOption::from(None));

/// Lock-free snapshot of the currently published channels, `None` unless
/// the state is `Initialized`.
pub fn channels_snapshot() -> Option<Arc<ChannelsEpoch>> {
    CHANNELS.load_full()
}

struct Inner {
    handler: Option<JoinHandle<Result<()>>>,
    control_tx: Option<ControlSender>,
    program_name: Option<String>,
}

static INNER: Lazy<Mutex<Inner>> = Lazy::new(|| {
    Mutex::new(Inner {
        handler: None,
        control_tx: None,
        program_name: None,
    })
});

fn set_state(new: State) {
    STATE_HINT.store(new as u8, Ordering::Release);
}

/// Starts the subsystem: spawns the Internal Handler thread, opens `sink`
/// from it, and blocks until the handler replies to the readiness
/// handshake. Legal only from `Unset`, `Finalized`, or `Forked`.
static PROCESS_WIDE_SETUP: Once = Once::new();

pub fn init(program_name: &str, sink_selector: &str) -> Result<()> {
    let mut inner = INNER.lock();
    match current_state() {
        State::Unset | State::Finalized | State::Forked => {}
        other => {
            return Err(LogCoreError::IllegalState(format!(
                "init is not legal from {other:?}"
            )))
        }
    }
    set_state(State::Initializing);

    let mut setup_err = None;
    PROCESS_WIDE_SETUP.call_once(|| {
        if let Err(e) = signal::install_process_wide_handlers() {
            setup_err = Some(e);
        } else if let Err(e) = fork::register_atfork_hooks() {
            setup_err = Some(e);
        }
    });
    if let Some(e) = setup_err {
        set_state(State::Illegal);
        return Err(e.chain("one-time process-wide signal/fork setup"));
    }
    fork::remember_sink_selector(sink_selector);

    let (data_tx, data_rx) = channels::data_channel(channels::DATA_CHANNEL_CAPACITY);
    let (control_tx, control_rx) = channels::control_channel();
    let program = program_name.to_string();
    let sink_selector = sink_selector.to_string();

    let spawned = thread::Builder::new()
        .name("internal-handler".to_string())
        .spawn(move || handler::run(data_rx, control_rx, sink_selector, program));

    let join = match spawned {
        Ok(j) => j,
        Err(e) => {
            set_state(State::Illegal);
            return Err(LogCoreError::from(e).chain("spawn internal handler thread"));
        }
    };

    if let Err(e) = channels::request_ready(&control_tx) {
        set_state(State::Illegal);
        inner.handler = Some(join);
        return Err(e.chain("readiness handshake"));
    }

    CHANNELS.store(Some(Arc::new(ChannelsEpoch {
        data_tx,
        control_tx: control_tx.clone(),
    })));
    inner.handler = Some(join);
    inner.control_tx = Some(control_tx);
    inner.program_name = Some(program_name.to_string());
    set_state(State::Initialized);
    Ok(())
}

/// Stops the subsystem: requests the handler's exit, joins its thread, and
/// unpublishes the channels. Legal only from `Initialized`.
pub fn finalize() -> Result<()> {
    let mut inner = INNER.lock();
    if current_state() != State::Initialized {
        return Err(LogCoreError::IllegalState(format!(
            "finalize is not legal from {:?}",
            current_state()
        )));
    }
    set_state(State::Finalizing);
    CHANNELS.store(None);

    let control_tx = inner.control_tx.take();
    let handler = inner.handler.take();
    inner.program_name = None;
    drop(inner);

    let mut exit_err = None;
    if let Some(tx) = control_tx {
        if let Err(e) = channels::request_exit(&tx) {
            exit_err = Some(e);
        }
    }

    let join_result = match handler {
        Some(h) => match h.join() {
            Ok(r) => r,
            Err(_) => Err(LogCoreError::AssertionFailed(
                "internal handler thread panicked".to_string(),
            )),
        },
        None => Ok(()),
    };

    set_state(State::Finalized);

    match (exit_err, join_result) {
        (Some(e), Ok(())) => Err(e),
        (Some(e), Err(j)) => Err(j.chain(e.to_string())),
        (None, r) => r,
    }
}

/// Requests a synchronous flush from the handler. A no-op (not an error)
/// when the subsystem is not currently initialized.
pub fn flush() -> Result<()> {
    let control_tx = {
        let inner = INNER.lock();
        if current_state() != State::Initialized {
            return Ok(());
        }
        inner.control_tx.clone()
    };
    match control_tx {
        Some(tx) => channels::request_flush(&tx),
        None => Ok(()),
    }
}

/// Pre-fork hook. Aborts if called mid-transition; otherwise finalizes the
/// subsystem in the forking thread (the handler thread is not copied into
/// the child by `fork(2)`) and publishes `Forked`.
pub fn pre_fork() -> Result<()> {
    match current_state() {
        State::Initializing | State::Finalizing => Err(LogCoreError::IllegalState(
            "fork during an in-flight lifecycle transition".to_string(),
        )),
        State::Initialized => {
            finalize()?;
            set_state(State::Forked);
            Ok(())
        }
        _ => {
            set_state(State::Forked);
            Ok(())
        }
    }
}

/// Parent-post-fork hook: re-initializes the subsystem with the same
/// program name and sink it had before the fork.
pub fn parent_post_fork(sink_selector: &str) -> Result<()> {
    let program_name = {
        let inner = INNER.lock();
        inner.program_name.clone()
    };
    set_state(State::Finalized);
    match program_name {
        Some(name) => init(&name, sink_selector),
        None => Ok(()),
    }
}

/// Child-post-fork hook: the handler thread and its channels do not exist
/// in the child, so there is nothing to join. Frees per-process registered
/// loggers (their names were heap-allocated in the parent) and publishes
/// `Finalized`, ready for the child to call `init` itself if it wants to log.
pub fn child_post_fork() {
    crate::registry::clear();
    let mut inner = INNER.lock();
    inner.handler = None;
    inner.control_tx = None;
    inner.program_name = None;
    CHANNELS.store(None);
    set_state(State::Finalized);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests mutate process-wide state directly, so they need to be
    // serialized against each other even though `cargo test` runs unit
    // tests from the same binary concurrently by default.
    static TEST_SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn test_finalize_illegal_when_not_initialized() {
        let _guard = TEST_SERIAL.lock();
        set_state(State::Unset);
        assert!(finalize().is_err());
    }

    #[test]
    fn test_flush_is_noop_when_not_initialized() {
        let _guard = TEST_SERIAL.lock();
        set_state(State::Unset);
        assert!(flush().is_ok());
    }

    #[test]
    fn test_pre_fork_illegal_mid_transition() {
        let _guard = TEST_SERIAL.lock();
        set_state(State::Initializing);
        assert!(pre_fork().is_err());
        set_state(State::Unset);
    }

    #[test]
    fn test_pre_fork_from_unset_publishes_forked() {
        let _guard = TEST_SERIAL.lock();
        set_state(State::Unset);
        pre_fork().unwrap();
        assert_eq!(current_state(), State::Forked);
        set_state(State::Unset);
    }

    #[test]
    fn test_child_post_fork_publishes_finalized() {
        let _guard = TEST_SERIAL.lock();
        set_state(State::Forked);
        child_post_fork();
        assert_eq!(current_state(), State::Finalized);
        set_state(State::Unset);
    }
}
