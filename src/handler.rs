//! # Internal Handler
//!
//! The single dedicated consumer thread every submitted record eventually
//! reaches. It multiplexes three inputs with a 500ms poll: the data
//! channel (bulk record traffic), the control channel (readiness, flush,
//! exit requests), and the fault-signal bridge (`signal::spawn_fault_bridge`).
//! No producer thread ever touches the sink directly.

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::Select;

use crate::channels::{tags, ControlReceiver, DataReceiver};
use crate::error::{LogCoreError, Result};
use crate::format::line::{render_line, split_message_lines};
use crate::format::signal::describe;
use crate::format::time::now_ns;
use crate::levels::Level;
use crate::record::{decode, DecodedRecord};
use crate::signal::{self, FaultSignal};
use crate::sink::Sink;

const POLL_TIMEOUT: Duration = Duration::from_millis(500);
/// Chained-error depth at which the handler gives up rather than keep
/// limping along with a sink or channel that is clearly broken.
const MAX_DEPTH_ERR: usize = 5;

const FAULT_FILE: &str = "<signal>";
const FAULT_FUNC: &str = "handler";
const FAULT_LOGGER: &str = "signal";

/// Entry point run on the Internal Handler's dedicated thread. Blocks until
/// `exit?` is received on the control channel, a fatal signal terminates
/// the process, or the error chain exceeds `MAX_DEPTH_ERR`.
pub fn run(
    data_rx: DataReceiver,
    control_rx: ControlReceiver,
    sink_selector: String,
    program_name: String,
) -> Result<()> {
    let pid = std::process::id();
    let mut sink = Sink::open(&sink_selector)?;
    let (signal_rx, bridge_stop) = signal::spawn_fault_bridge()?;

    if let Err(e) = complete_handshake(&control_rx) {
        bridge_stop.store(true, Ordering::Release);
        return Err(e);
    }

    let mut acc_error: Option<LogCoreError> = None;
    let mut err_count: usize = 0;
    let mut terminal_error: Option<LogCoreError> = None;

    let mut sel = Select::new();
    let data_idx = sel.recv(&data_rx);
    let control_idx = sel.recv(&control_rx);
    let signal_idx = sel.recv(&signal_rx);

    'main: loop {
        match sel.ready_timeout(POLL_TIMEOUT) {
            Ok(i) if i == data_idx => {
                if let Err(e) = drain_data(&data_rx, &mut sink, pid, &program_name) {
                    if record_error(&mut acc_error, &mut err_count, e).is_err() {
                        terminal_error = acc_error.take();
                        break 'main;
                    }
                }
            }
            Ok(i) if i == control_idx => match control_rx.try_recv() {
                Ok(req) => {
                    let tag = req.tag;
                    if let Err(e) = drain_data(&data_rx, &mut sink, pid, &program_name) {
                        if record_error(&mut acc_error, &mut err_count, e).is_err() {
                            terminal_error = acc_error.take();
                            break 'main;
                        }
                    }
                    match tag {
                        tags::FLUSH_REQUEST => {
                            let flushed = sink.durable_flush();
                            if let Err(e) = flushed {
                                if record_error(&mut acc_error, &mut err_count, e).is_err() {
                                    terminal_error = acc_error.take();
                                    break 'main;
                                }
                            }
                            if let Some(tx) = req.reply_tx {
                                let _ = tx.send(tags::FLUSHED_REPLY.to_string());
                            }
                        }
                        tags::EXIT_REQUEST => break 'main,
                        tags::READY_REQUEST => {
                            if let Some(tx) = req.reply_tx {
                                let _ = tx.send(tags::READY_REPLY.to_string());
                            }
                        }
                        _ => {}
                    }
                }
                Err(_) => {}
            },
            Ok(i) if i == signal_idx => {
                if let Ok(fault) = signal_rx.try_recv() {
                    let _ = drain_data(&data_rx, &mut sink, pid, &program_name);
                    let _ = handle_fault(&mut sink, pid, &program_name, &fault);
                    let _ = sink.durable_flush();
                    bridge_stop.store(true, Ordering::Release);
                    reraise_default(fault.signum);
                    break 'main;
                }
            }
            Ok(_) => unreachable!("Select reported an index not registered"),
            Err(_) => {
                // Timeout: nothing ready in 500ms. Durability beats latency here.
                if let Err(e) = sink.durable_flush() {
                    if record_error(&mut acc_error, &mut err_count, e).is_err() {
                        terminal_error = acc_error.take();
                        break 'main;
                    }
                }
            }
        }
    }

    let _ = drain_data(&data_rx, &mut sink, pid, &program_name);
    let _ = sink.durable_flush();
    bridge_stop.store(true, Ordering::Release);

    match terminal_error.or(acc_error) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn complete_handshake(control_rx: &ControlReceiver) -> Result<()> {
    let req = control_rx
        .recv()
        .map_err(|_| LogCoreError::ProtocolMismatch("control channel closed before handshake".to_string()))?;
    if req.tag != tags::READY_REQUEST {
        return Err(LogCoreError::ProtocolMismatch(format!(
            "expected '{}' as the first control message, got '{}'",
            tags::READY_REQUEST,
            req.tag
        )));
    }
    match req.reply_tx {
        Some(tx) => tx
            .send(tags::READY_REPLY.to_string())
            .map_err(|_| LogCoreError::ProtocolMismatch("producer dropped readiness reply channel".to_string())),
        None => Err(LogCoreError::ProtocolMismatch(
            "ready? request carried no reply channel".to_string(),
        )),
    }
}

/// Drains every frame currently available without blocking, writing each
/// to the sink. Bounded by what is already enqueued so the poll loop can't
/// be starved by a producer that keeps the data channel endlessly full.
fn drain_data(data_rx: &DataReceiver, sink: &mut Sink, pid: u32, program: &str) -> Result<()> {
    while let Ok(frame) = data_rx.try_recv() {
        let rec = decode(&frame);
        write_decoded(sink, &rec, pid, program).map_err(|e| LogCoreError::from(e).chain("write sink line"))?;
    }
    Ok(())
}

fn write_decoded(sink: &mut Sink, rec: &DecodedRecord<'_>, pid: u32, program: &str) -> io::Result<()> {
    for segment in split_message_lines(rec.message) {
        let line = render_line(
            rec.header.level,
            rec.header.timestamp_ns,
            pid,
            rec.header.kernel_tid,
            rec.header.thread_rank,
            program,
            rec.file,
            rec.header.line,
            rec.func,
            rec.logger_name,
            segment,
        );
        write_line(sink, &line)?;
    }
    Ok(())
}

fn write_line(sink: &mut Sink, line: &[u8]) -> io::Result<()> {
    let n = sink.write_once(line)?;
    if n < line.len() {
        eprintln!(
            "internal-handler: short write to sink ({n} of {} bytes)",
            line.len()
        );
    }
    Ok(())
}

fn handle_fault(sink: &mut Sink, pid: u32, program: &str, fault: &FaultSignal) -> io::Result<()> {
    let message = describe(fault.signum, fault.code, fault.sender);
    let timestamp_ns = now_ns().unwrap_or(0);
    let line = render_line(
        Level::Critical,
        timestamp_ns,
        pid,
        crate::thread_state::kernel_tid(),
        crate::thread_state::thread_rank(),
        program,
        FAULT_FILE,
        0,
        FAULT_FUNC,
        FAULT_LOGGER,
        &message,
    );
    write_line(sink, &line)
}

/// Restores the default disposition for `signum`, unblocks it on this
/// thread, and re-raises it. The handler thread blocked the fault set in
/// `signal::spawn_fault_bridge` so it could read deliveries off the
/// signalfd instead of taking them as a signal; a `raise()` while still
/// blocked only marks the signal pending, which is silently dropped when
/// this thread exits right after -- the process never dies. Unblocking
/// first is what makes the re-raise actually deliver.
fn reraise_default(signum: i32) {
    use nix::sys::signal::{raise, signal, SigHandler, SigSet, Signal};
    if let Ok(sig) = Signal::try_from(signum) {
        unsafe {
            let _ = signal(sig, SigHandler::SigDfl);
        }
        let mut mask = SigSet::empty();
        mask.add(sig);
        let _ = mask.thread_unblock();
        let _ = raise(sig);
    }
}

/// Wraps `new_err` as the cause chained onto whatever has already
/// accumulated, returning `Err` once the chain exceeds `MAX_DEPTH_ERR` --
/// the signal for the main loop to give up rather than keep looping
/// against a sink or channel that keeps failing.
fn record_error(
    acc: &mut Option<LogCoreError>,
    err_count: &mut usize,
    new_err: LogCoreError,
) -> std::result::Result<(), ()> {
    eprintln!("internal-handler: {new_err}");
    *err_count += 1;
    let combined = match acc.take() {
        Some(prev) => prev.chain(new_err.to_string()),
        None => new_err,
    };
    if *err_count > MAX_DEPTH_ERR {
        *acc = Some(LogCoreError::TooManyErrors(
            format!("exceeded {MAX_DEPTH_ERR} chained handler errors"),
            Some(Box::new(combined)),
        ));
        return Err(());
    }
    *acc = Some(combined);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_accumulates_until_threshold() {
        let mut acc = None;
        let mut count = 0;
        for _ in 0..MAX_DEPTH_ERR {
            assert!(record_error(&mut acc, &mut count, LogCoreError::Config("x".to_string())).is_ok());
        }
        let result = record_error(&mut acc, &mut count, LogCoreError::Config("x".to_string()));
        assert!(result.is_err());
        assert!(matches!(acc, Some(LogCoreError::TooManyErrors(_, _))));
    }

    #[test]
    fn test_handshake_rejects_wrong_first_tag() {
        let (ctx, crx) = crate::channels::control_channel();
        std::thread::spawn(move || {
            let _ = crate::channels::request_flush(&ctx);
        });
        assert!(complete_handshake(&crx).is_err());
    }
}
