//! # Sink Module
//!
//! The opaque byte-stream the Internal Handler appends rendered lines to.
//! Selection is by filename: `"-"` is standard output, `"+"` is standard
//! error, anything else is opened `O_WRONLY|O_CREAT|O_APPEND` at mode
//! `0644`. The handler is the sole owner of the sink; no producer ever
//! touches it.

use std::fs::{File, OpenOptions};
use std::io::{self, Stderr, Stdout, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

use nix::errno::Errno;
use nix::unistd::fdatasync;

use crate::error::{LogCoreError, Result};

const APPEND_MODE: u32 = 0o644;

enum Inner {
    Stdout(Stdout),
    Stderr(Stderr),
    File(File),
}

/// The durable sink a running Internal Handler writes lines into.
pub struct Sink {
    inner: Inner,
}

impl Sink {
    /// Opens the sink named by `selector`: `"-"` -> stdout, `"+"` -> stderr,
    /// any other string -> an append-mode file at that path.
    pub fn open(selector: &str) -> Result<Sink> {
        let inner = match selector {
            "-" => Inner::Stdout(io::stdout()),
            "+" => Inner::Stderr(io::stderr()),
            path => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .mode(APPEND_MODE)
                    .open(path)
                    .map_err(|e| LogCoreError::from(e).chain(format!("open sink '{path}'")))?;
                Inner::File(file)
            }
        };
        Ok(Sink { inner })
    }

    fn raw_fd(&self) -> RawFd {
        match &self.inner {
            Inner::Stdout(s) => s.as_raw_fd(),
            Inner::Stderr(s) => s.as_raw_fd(),
            Inner::File(f) => f.as_raw_fd(),
        }
    }

    /// A single underlying write call, returning the number of bytes
    /// actually written so the caller can detect a short write.
    pub fn write_once(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Stdout(s) => s.write(bytes),
            Inner::Stderr(s) => s.write(bytes),
            Inner::File(f) => f.write(bytes),
        }
    }

    /// A flush is complete when the sink's durable-write primitive returns
    /// success or a documented "not supported" code. `fdatasync` on a
    /// non-regular-file descriptor (stdout/stderr, a pipe) typically
    /// returns `EINVAL`; a read-only filesystem returns `EROFS`. Both are
    /// benign here and treated as success.
    pub fn durable_flush(&mut self) -> Result<()> {
        match &mut self.inner {
            Inner::Stdout(s) => s.flush().map_err(LogCoreError::from)?,
            Inner::Stderr(s) => s.flush().map_err(LogCoreError::from)?,
            Inner::File(f) => f.flush().map_err(LogCoreError::from)?,
        }
        match fdatasync(self.raw_fd()) {
            Ok(()) => Ok(()),
            Err(Errno::EINVAL) | Err(Errno::EROFS) | Err(Errno::ENOTSUP) => Ok(()),
            Err(errno) => Err(LogCoreError::PlatformCallFailed(
                format!("fdatasync: {errno}"),
                None,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_open_stdout_and_stderr_selectors() {
        assert!(Sink::open("-").is_ok());
        assert!(Sink::open("+").is_ok());
    }

    #[test]
    fn test_open_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let path_str = path.to_str().unwrap();

        {
            let mut sink = Sink::open(path_str).unwrap();
            sink.write_once(b"first\n").unwrap();
        }
        {
            let mut sink = Sink::open(path_str).unwrap();
            sink.write_once(b"second\n").unwrap();
        }

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_durable_flush_on_file_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = Sink::open(path.to_str().unwrap()).unwrap();
        sink.write_once(b"hello\n").unwrap();
        assert!(sink.durable_flush().is_ok());
    }

    #[test]
    fn test_durable_flush_on_stdout_is_benign() {
        let mut sink = Sink::open("-").unwrap();
        assert!(sink.durable_flush().is_ok());
    }
}
