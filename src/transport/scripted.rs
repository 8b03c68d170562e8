//! In-memory transport driven by a script, for tests.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Transport;
use crate::lock_or_recover;

#[derive(Debug, Clone)]
pub(crate) enum ReadStep {
    Data(Vec<u8>),
    Quiet,
    Fail(ErrorKind),
}

#[derive(Debug, Default)]
pub(crate) struct ScriptLog {
    pub reads: VecDeque<ReadStep>,
    pub read_calls: usize,
    pub written: Vec<u8>,
    pub flushes: usize,
    pub reset_line: Vec<bool>,
    pub clears: usize,
    pub fail_writes: bool,
}

/// Shared view of what the transport saw; stays valid after the transport moves.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptHandle {
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptHandle {
    pub fn push_text(&self, text: &str) {
        self.push(ReadStep::Data(text.as_bytes().to_vec()));
    }

    pub fn push(&self, step: ReadStep) {
        lock_or_recover(&self.log, "script push").reads.push_back(step);
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&lock_or_recover(&self.log, "script written").written).into_owned()
    }

    pub fn read_calls(&self) -> usize {
        lock_or_recover(&self.log, "script reads").read_calls
    }

    pub fn reset_line(&self) -> Vec<bool> {
        lock_or_recover(&self.log, "script reset").reset_line.clone()
    }

    pub fn clears(&self) -> usize {
        lock_or_recover(&self.log, "script clears").clears
    }

    pub fn flushes(&self) -> usize {
        lock_or_recover(&self.log, "script flushes").flushes
    }

    pub fn fail_writes(&self) {
        lock_or_recover(&self.log, "script fail").fail_writes = true;
    }
}

pub(crate) struct ScriptedTransport {
    handle: ScriptHandle,
}

impl ScriptedTransport {
    pub fn new() -> (Self, ScriptHandle) {
        let handle = ScriptHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl Transport for ScriptedTransport {
    fn set_reset_line(&mut self, asserted: bool) -> io::Result<()> {
        lock_or_recover(&self.handle.log, "script reset")
            .reset_line
            .push(asserted);
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        lock_or_recover(&self.handle.log, "script clear").clears += 1;
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let mut log = lock_or_recover(&self.handle.log, "script read");
        log.read_calls += 1;
        match log.reads.pop_front() {
            None | Some(ReadStep::Quiet) => Ok(0),
            Some(ReadStep::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(ReadStep::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    log.reads.push_front(ReadStep::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut log = lock_or_recover(&self.handle.log, "script write");
        if log.fail_writes {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "scripted write failure"));
        }
        log.written.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock_or_recover(&self.handle.log, "script flush").flushes += 1;
        Ok(())
    }

    fn label(&self) -> String {
        "scripted".to_string()
    }
}
