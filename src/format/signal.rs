//! Signal-description formatting.
//!
//! Pure string rendering only; installing handlers and re-raising live in
//! the `signal` module.

use nix::sys::signal::Signal;

/// Human-readable name for a signal, falling back to the raw number for
/// anything this build doesn't recognize.
pub fn signal_name(signum: i32) -> String {
    match Signal::try_from(signum) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("UNKNOWN({signum})"),
    }
}

/// Renders a one-line description of a delivered signal, suitable as the
/// message of the *critical* record the handler logs for it.
///
/// `sender` is `(pid, uid)` when the signal was user-delivered (e.g. via
/// `kill(2)`), `None` for kernel-delivered synchronous faults.
pub fn describe(signum: i32, code: i32, sender: Option<(i32, u32)>) -> String {
    let name = signal_name(signum);
    match sender {
        Some((pid, uid)) => format!(
            "received signal {name} ({signum}), code={code}, sent by pid={pid} uid={uid}"
        ),
        None => format!("received signal {name} ({signum}), code={code}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_name_known() {
        assert_eq!(signal_name(libc::SIGSEGV), "SIGSEGV");
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
    }

    #[test]
    fn test_signal_name_unknown() {
        assert!(signal_name(9999).starts_with("UNKNOWN"));
    }

    #[test]
    fn test_describe_kernel_fault() {
        let d = describe(libc::SIGSEGV, 1, None);
        assert!(d.contains("SIGSEGV"));
        assert!(d.contains("code=1"));
        assert!(!d.contains("sent by"));
    }

    #[test]
    fn test_describe_user_signal() {
        let d = describe(libc::SIGTERM, 0, Some((4242, 1000)));
        assert!(d.contains("SIGTERM"));
        assert!(d.contains("pid=4242"));
        assert!(d.contains("uid=1000"));
    }
}
