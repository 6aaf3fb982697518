//! # Channels Module
//!
//! The two in-process conduits between producers and the Internal
//! Handler: the many-producer/one-consumer **data channel** (bounded,
//! non-blocking `try_send`, lossy-on-overrun) and the request/reply
//! **control channel** (one outstanding request per producer, answered by
//! a fresh rendezvous reply channel per call).
//!
//! The third input, the signal descriptor, is not a channel in this sense
//! and lives in the `signal` module.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::{LogCoreError, Result};
use crate::record::Frame;

/// Default capacity of the data channel. Sized generously so ordinary
/// bursts never hit back-pressure; producers that outrun this for longer
/// than `RETRIES_MAX * RETRY_DELAY` fall back per `submit::send_frame`.
pub const DATA_CHANNEL_CAPACITY: usize = 8192;

pub type DataSender = Sender<Frame>;
pub type DataReceiver = Receiver<Frame>;

/// Creates the data channel's producer and consumer ends.
pub fn data_channel(capacity: usize) -> (DataSender, DataReceiver) {
    bounded(capacity)
}

/// Attempts a non-blocking enqueue. Returns `Err` only when the channel is
/// momentarily full (`Full`) or the handler has gone away (`Disconnected`,
/// surfaced the same way since the caller's retry loop treats both as
/// transient until it gives up).
pub fn try_send_frame(tx: &DataSender, frame: Frame) -> std::result::Result<(), Frame> {
    match tx.try_send(frame) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(f)) => Err(f),
        Err(TrySendError::Disconnected(f)) => Err(f),
    }
}

/// The exact control-channel tag strings: case-sensitive, fixed constants
/// rather than an enum, since both ends agree on them as plain text.
pub mod tags {
    pub const READY_REQUEST: &str = "BC->IH: ready?";
    pub const READY_REPLY: &str = "IH->BC: ready!";
    pub const EXIT_REQUEST: &str = "BC->IH: exit?";
    pub const FLUSH_REQUEST: &str = "BC->IH: flush?";
    pub const FLUSHED_REPLY: &str = "IH->BC: flushed!";
}

/// A single control-channel request. `reply_tx` is `Some` for requests that
/// expect exactly one reply (`ready?`, `flush?`) and `None` for `exit?`,
/// which the caller does not wait on (it waits for the handler thread to
/// join instead).
pub struct ControlRequest {
    pub tag: &'static str,
    pub reply_tx: Option<Sender<String>>,
}

pub type ControlSender = Sender<ControlRequest>;
pub type ControlReceiver = Receiver<ControlRequest>;

/// Creates the control channel. Unbounded: requests are rare (readiness
/// handshake, explicit flushes, shutdown) and must never themselves be
/// subject to the data channel's lossy back-pressure discipline.
pub fn control_channel() -> (ControlSender, ControlReceiver) {
    crossbeam_channel::unbounded()
}

fn request_and_wait(control_tx: &ControlSender, tag: &'static str, expect: &str) -> Result<()> {
    let (reply_tx, reply_rx) = bounded(0);
    control_tx
        .send(ControlRequest {
            tag,
            reply_tx: Some(reply_tx),
        })
        .map_err(|_| LogCoreError::ProtocolMismatch("control channel closed".to_string()))?;
    let reply = reply_rx
        .recv()
        .map_err(|_| LogCoreError::ProtocolMismatch("handler dropped reply sender".to_string()))?;
    if reply == expect {
        Ok(())
    } else {
        Err(LogCoreError::ProtocolMismatch(format!(
            "expected '{expect}', got '{reply}'"
        )))
    }
}

/// Sends `ready?` and blocks until `ready!` arrives.
pub fn request_ready(control_tx: &ControlSender) -> Result<()> {
    request_and_wait(control_tx, tags::READY_REQUEST, tags::READY_REPLY)
}

/// Sends `flush?` and blocks until `flushed!` arrives.
pub fn request_flush(control_tx: &ControlSender) -> Result<()> {
    request_and_wait(control_tx, tags::FLUSH_REQUEST, tags::FLUSHED_REPLY)
}

/// Sends `exit?` without waiting for a reply; the caller joins the handler
/// thread instead.
pub fn request_exit(control_tx: &ControlSender) -> Result<()> {
    control_tx
        .send(ControlRequest {
            tag: tags::EXIT_REQUEST,
            reply_tx: None,
        })
        .map_err(|_| LogCoreError::ProtocolMismatch("control channel closed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_channel_fifo() {
        let (tx, rx) = data_channel(4);
        for i in 0..4u8 {
            try_send_frame(&tx, vec![i]).unwrap();
        }
        for i in 0..4u8 {
            assert_eq!(rx.recv().unwrap(), vec![i]);
        }
    }

    #[test]
    fn test_data_channel_full_is_transient() {
        let (tx, _rx) = data_channel(1);
        try_send_frame(&tx, vec![1]).unwrap();
        let err = try_send_frame(&tx, vec![2]);
        assert!(err.is_err());
    }

    #[test]
    fn test_control_ready_roundtrip() {
        let (ctx, crx) = control_channel();
        let handle = std::thread::spawn(move || {
            let req = crx.recv().unwrap();
            assert_eq!(req.tag, tags::READY_REQUEST);
            req.reply_tx.unwrap().send(tags::READY_REPLY.to_string()).unwrap();
        });
        request_ready(&ctx).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_control_flush_roundtrip() {
        let (ctx, crx) = control_channel();
        let handle = std::thread::spawn(move || {
            let req = crx.recv().unwrap();
            assert_eq!(req.tag, tags::FLUSH_REQUEST);
            req.reply_tx.unwrap().send(tags::FLUSHED_REPLY.to_string()).unwrap();
        });
        request_flush(&ctx).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_control_exit_no_reply_expected() {
        let (ctx, crx) = control_channel();
        request_exit(&ctx).unwrap();
        let req = crx.recv().unwrap();
        assert_eq!(req.tag, tags::EXIT_REQUEST);
        assert!(req.reply_tx.is_none());
    }

    #[test]
    fn test_protocol_mismatch_surfaces() {
        let (ctx, crx) = control_channel();
        let handle = std::thread::spawn(move || {
            let req = crx.recv().unwrap();
            req.reply_tx.unwrap().send("unexpected".to_string()).unwrap();
        });
        let result = request_ready(&ctx);
        assert!(result.is_err());
        handle.join().unwrap();
    }
}
