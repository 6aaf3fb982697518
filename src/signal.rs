//! # Signal Integration
//!
//! Two distinct regimes, per where the fault lands:
//!
//! - **Inside the Internal Handler thread**: the fault set plus
//!   `SIGQUIT`/`SIGTERM`/`SIGINT` are blocked with `pthread_sigmask` so they
//!   land only on other threads; the fault subset (`SIGSEGV`, `SIGBUS`,
//!   `SIGFPE`, `SIGILL`) is read back through a `signalfd`, which a small
//!   bridge thread turns into ordinary channel messages the handler's poll
//!   loop can select on alongside the data and control channels.
//! - **Everywhere else**: a process-wide `sigaction` covers the same four
//!   faults plus `SIGINT`/`SIGTERM`. This handler runs in strict
//!   async-signal-safe code -- a raw `write(2)` of the signal number and
//!   code to a self-pipe, then a fixed stderr notice, no allocation, no
//!   formatting -- then restores the default disposition and re-raises, so
//!   the process still dies the way it would have without us installed.
//!   The bridge thread also drains that self-pipe, so a fault on any
//!   thread still reaches the handler's poll loop as the same `FaultSignal`
//!   the signalfd path produces, and gets the same critical record,
//!   drain, and durable flush before the process goes down.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::SignalFd;

use crate::error::{LogCoreError, Result};

/// Poll granularity for the bridge thread's stop-flag check.
const BRIDGE_POLL_MS: i32 = 200;

/// The synchronous faults read back through the signalfd inside the
/// handler thread.
const FAULT_SIGNALS: [Signal; 4] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
];

/// Everything blocked on the Internal Handler thread itself: the fault set
/// plus the signals meant to land on producer threads instead.
/// Only `FAULT_SIGNALS` is ever registered on the signalfd -- `SIGQUIT`,
/// `SIGTERM`, and `SIGINT` are blocked here purely so the kernel routes
/// them to an unblocked thread rather than to the handler.
const HANDLER_BLOCK_SIGNALS: [Signal; 7] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGINT,
];

/// A fault signal handed to the Internal Handler's poll loop, either
/// decoded off the signalfd (a thread-synchronous fault reaching the
/// handler thread itself) or forwarded from the process-wide `sigaction`
/// handler via the self-pipe (a fault on any other thread). `sender` is
/// only ever populated by the signalfd path, since the self-pipe carries
/// just the signal number and code.
pub struct FaultSignal {
    pub signum: i32,
    pub code: i32,
    pub sender: Option<(i32, u32)>,
}

/// Fixed-size payload `fatal_handler` writes to the self-pipe: just the
/// signal number and code, everything `write(2)` can carry without
/// allocating inside a signal handler.
#[repr(C)]
struct RawFaultMsg {
    signum: i32,
    code: i32,
}
const RAW_FAULT_MSG_LEN: usize = std::mem::size_of::<RawFaultMsg>();

/// The self-pipe `fatal_handler` writes to and the bridge thread reads
/// from. Created once by `install_process_wide_handlers`, before any
/// sigaction referencing `fatal_handler` is installed.
static FAULT_PIPE_READ_FD: AtomicI32 = AtomicI32::new(-1);
static FAULT_PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// Blocks `HANDLER_BLOCK_SIGNALS` on the *calling* thread, registers only
/// `FAULT_SIGNALS` on a `signalfd`, and spawns a bridge thread that polls
/// both that `signalfd` and the self-pipe `fatal_handler` writes to,
/// decoding each delivery into a `FaultSignal` sent down the returned
/// channel. Call this from the Internal Handler thread itself, before
/// entering its main loop.
///
/// Returns the receiver and a stop flag; set the flag and the bridge
/// thread exits within one `BRIDGE_POLL_MS` tick rather than being joined,
/// since it may be blocked in `poll` when shutdown is requested.
pub fn spawn_fault_bridge() -> Result<(Receiver<FaultSignal>, Arc<AtomicBool>)> {
    let mut block_mask = SigSet::empty();
    for sig in HANDLER_BLOCK_SIGNALS {
        block_mask.add(sig);
    }
    block_mask
        .thread_block()
        .map_err(|e| LogCoreError::PlatformCallFailed(format!("pthread_sigmask: {e}"), None))?;

    let mut fault_mask = SigSet::empty();
    for sig in FAULT_SIGNALS {
        fault_mask.add(sig);
    }
    let sfd = SignalFd::with_flags(&fault_mask, nix::sys::signalfd::SfdFlags::SFD_NONBLOCK)
        .map_err(|e| LogCoreError::PlatformCallFailed(format!("signalfd: {e}"), None))?;

    let self_pipe_fd = FAULT_PIPE_READ_FD.load(Ordering::Acquire);

    let (tx, rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_bridge = stop.clone();

    std::thread::Builder::new()
        .name("internal-handler-signal-bridge".to_string())
        .spawn(move || bridge_loop(sfd, self_pipe_fd, stop_for_bridge, tx))
        .map_err(|e| LogCoreError::from(e).chain("spawn signal bridge thread"))?;

    Ok((rx, stop))
}

fn bridge_loop(sfd: SignalFd, self_pipe_fd: RawFd, stop: Arc<AtomicBool>, tx: Sender<FaultSignal>) {
    let sfd_raw = sfd.as_raw_fd();
    while !stop.load(Ordering::Acquire) {
        let mut fds = [
            PollFd::new(sfd_raw, PollFlags::POLLIN),
            PollFd::new(self_pipe_fd, PollFlags::POLLIN),
        ];
        if !matches!(poll(&mut fds, BRIDGE_POLL_MS), Ok(n) if n > 0) {
            continue;
        }

        if let Ok(Some(info)) = sfd.read_signal() {
            let sender = if info.ssi_pid != 0 {
                Some((info.ssi_pid as i32, info.ssi_uid))
            } else {
                None
            };
            let fault = FaultSignal {
                signum: info.ssi_signo as i32,
                code: info.ssi_code,
                sender,
            };
            if tx.send(fault).is_err() {
                break;
            }
        }

        if let Some(fault) = read_self_pipe(self_pipe_fd) {
            if tx.send(fault).is_err() {
                break;
            }
        }
    }
}

/// Non-blocking read of one `RawFaultMsg` off the self-pipe. `fd < 0`
/// (no process-wide handlers installed, e.g. in a unit test that calls
/// `spawn_fault_bridge` directly) and a short or empty read both yield
/// `None`.
fn read_self_pipe(fd: RawFd) -> Option<FaultSignal> {
    if fd < 0 {
        return None;
    }
    let mut buf = [0u8; RAW_FAULT_MSG_LEN];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n != buf.len() as isize {
        return None;
    }
    let signum = i32::from_ne_bytes(buf[0..4].try_into().unwrap());
    let code = i32::from_ne_bytes(buf[4..8].try_into().unwrap());
    Some(FaultSignal {
        signum,
        code,
        sender: None,
    })
}

static REENTRY_GUARD: AtomicBool = AtomicBool::new(false);

/// Installed for `SIGSEGV`/`SIGBUS`/`SIGFPE`/`SIGILL`/`SIGINT`/`SIGTERM` on
/// every thread that hasn't blocked them (i.e. every thread but the
/// Internal Handler). Writes `(signum, si_code)` to the self-pipe so the
/// bridge thread can turn this into the same critical record, drain, and
/// durable flush a fault inside the handler gets, then gives the handler
/// up to a second to do that before restoring the default disposition and
/// re-raising so the process still dies the way it would have without us
/// installed.
extern "C" fn fatal_handler(signum: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    if REENTRY_GUARD.swap(true, Ordering::SeqCst) {
        unsafe { libc::_exit(128 + signum) };
    }

    let code = if info.is_null() { 0 } else { unsafe { (*info).si_code } };
    let write_fd = FAULT_PIPE_WRITE_FD.load(Ordering::Acquire);
    if write_fd >= 0 {
        let msg = RawFaultMsg { signum, code };
        unsafe {
            libc::write(
                write_fd,
                &msg as *const RawFaultMsg as *const libc::c_void,
                RAW_FAULT_MSG_LEN,
            );
        }
    }

    let stderr_msg = b"logcore: fatal signal received outside the internal handler thread\n";
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            stderr_msg.as_ptr() as *const libc::c_void,
            stderr_msg.len(),
        );
        libc::sleep(1);
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = libc::SIG_DFL;
        libc::sigaction(signum, &sa, std::ptr::null_mut());
        libc::raise(signum);
    }
}

/// Creates the self-pipe `fatal_handler` reports through and installs the
/// process-wide fallback handler for `SIGSEGV`, `SIGBUS`, `SIGFPE`,
/// `SIGILL`, `SIGINT`, and `SIGTERM`. Intended to run once, early in
/// `init`, so a fault on any thread other than the Internal Handler still
/// produces a critical sink record and a stderr notice before the process
/// dies.
pub fn install_process_wide_handlers() -> Result<()> {
    let (read_fd, write_fd) =
        nix::unistd::pipe().map_err(|e| LogCoreError::PlatformCallFailed(format!("pipe: {e}"), None))?;
    set_nonblocking(read_fd)?;
    FAULT_PIPE_READ_FD.store(read_fd, Ordering::Release);
    FAULT_PIPE_WRITE_FD.store(write_fd, Ordering::Release);

    for &signum in &[
        libc::SIGSEGV,
        libc::SIGBUS,
        libc::SIGFPE,
        libc::SIGILL,
        libc::SIGINT,
        libc::SIGTERM,
    ] {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = fatal_handler as usize;
            sa.sa_flags = libc::SA_RESTART | libc::SA_SIGINFO;
            libc::sigemptyset(&mut sa.sa_mask);
            if libc::sigaction(signum, &sa, std::ptr::null_mut()) != 0 {
                return Err(LogCoreError::PlatformCallFailed(
                    format!("sigaction({signum})"),
                    None,
                ));
            }
        }
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|e| LogCoreError::PlatformCallFailed(format!("fcntl(F_GETFL): {e}"), None))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags))
        .map_err(|e| LogCoreError::PlatformCallFailed(format!("fcntl(F_SETFL): {e}"), None))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_fault_bridge_starts_and_stops() {
        let (rx, stop) = spawn_fault_bridge().unwrap();
        assert!(rx.try_recv().is_err());
        stop.store(true, Ordering::Release);
        std::thread::sleep(std::time::Duration::from_millis(BRIDGE_POLL_MS as u64 * 2));
    }

    #[test]
    fn test_fault_signals_cover_documented_set() {
        assert_eq!(FAULT_SIGNALS.len(), 4);
        assert!(FAULT_SIGNALS.contains(&Signal::SIGSEGV));
        assert!(FAULT_SIGNALS.contains(&Signal::SIGILL));
    }

    #[test]
    fn test_handler_block_signals_cover_fault_set_plus_routed_signals() {
        assert_eq!(HANDLER_BLOCK_SIGNALS.len(), 7);
        for sig in FAULT_SIGNALS {
            assert!(HANDLER_BLOCK_SIGNALS.contains(&sig));
        }
        assert!(HANDLER_BLOCK_SIGNALS.contains(&Signal::SIGQUIT));
        assert!(HANDLER_BLOCK_SIGNALS.contains(&Signal::SIGTERM));
        assert!(HANDLER_BLOCK_SIGNALS.contains(&Signal::SIGINT));
    }

    #[test]
    fn test_read_self_pipe_negative_fd_is_none() {
        assert!(read_self_pipe(-1).is_none());
    }

    #[test]
    fn test_read_self_pipe_roundtrips_a_written_message() {
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        let msg = RawFaultMsg {
            signum: libc::SIGSEGV,
            code: 42,
        };
        unsafe {
            libc::write(
                write_fd,
                &msg as *const RawFaultMsg as *const libc::c_void,
                RAW_FAULT_MSG_LEN,
            );
        }
        let fault = read_self_pipe(read_fd).expect("message should be readable");
        assert_eq!(fault.signum, libc::SIGSEGV);
        assert_eq!(fault.code, 42);
        assert!(fault.sender.is_none());
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
