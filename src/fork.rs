//! # Fork Integration
//!
//! `fork(2)` copies exactly the calling thread into the child; the
//! Internal Handler thread -- and the channel endpoints it owns -- simply
//! does not exist there. `register_atfork_hooks` wires the three
//! `pthread_atfork(3)` callbacks to `lifecycle`'s fork hooks so a process
//! that forks with the subsystem initialized comes out the other side
//! either fully re-initialized (parent) or cleanly quiescent (child),
//! never half-alive with a writer thread that isn't there.

use crate::error::{LogCoreError, Result};
use crate::lifecycle;

/// The sink selector used to re-initialize the parent after a fork. Forking
/// while initialized is rare enough that a global set once at `init` time
/// is simpler than threading it through the libc callback signature, which
/// takes no arguments.
static PARENT_SINK_SELECTOR: parking_lot::Mutex<Option<String>> = parking_lot::Mutex::new(None);

pub(crate) fn remember_sink_selector(selector: &str) {
    *PARENT_SINK_SELECTOR.lock() = Some(selector.to_string());
}

extern "C" fn prefork() {
    if let Err(e) = lifecycle::pre_fork() {
        eprintln!("logcore: pre-fork hook failed: {e}");
    }
}

extern "C" fn parent_after_fork() {
    let selector = PARENT_SINK_SELECTOR.lock().clone();
    if let Some(selector) = selector {
        if let Err(e) = lifecycle::parent_post_fork(&selector) {
            eprintln!("logcore: parent post-fork hook failed: {e}");
        }
    }
}

extern "C" fn child_after_fork() {
    lifecycle::child_post_fork();
}

/// Registers the three `pthread_atfork` callbacks. Idempotent at the libc
/// level is not guaranteed (each call appends another registration), so
/// `init` calls this only the first time the process initializes.
pub fn register_atfork_hooks() -> Result<()> {
    let rc = unsafe { libc::pthread_atfork(Some(prefork), Some(parent_after_fork), Some(child_after_fork)) };
    if rc != 0 {
        return Err(LogCoreError::PlatformCallFailed(
            format!("pthread_atfork returned {rc}"),
            None,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_sink_selector_round_trips() {
        remember_sink_selector("-");
        assert_eq!(PARENT_SINK_SELECTOR.lock().as_deref(), Some("-"));
    }
}
