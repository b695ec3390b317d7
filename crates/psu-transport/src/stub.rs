//! Deterministic in-memory transport
//!
//! The stub records every line written to it and answers reads from a
//! scripted queue, falling back to a fixed reply once the queue is empty.
//! Failures can be injected per read, for all writes, or for all reads, and a
//! stub can be told to treat any read as a protocol violation.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::TransportError;
use crate::{Transport, TransportKind};

/// Reply returned by a fresh stub when nothing is scripted
pub const DEFAULT_REPLY: &[u8] = b"READ DEBUG\n";

/// One scripted reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubReply {
    /// Return these bytes from `read`
    Line(Vec<u8>),
    /// Fail this `read`
    Fail,
}

/// In-memory transport with fixed or scripted replies
#[derive(Debug)]
pub struct StubTransport {
    /// Scripted replies consumed in order
    script: VecDeque<StubReply>,
    /// Reply used when the script is empty
    fallback: Option<Vec<u8>>,
    /// Lines written, in order
    written: Vec<Vec<u8>>,
    /// Number of `read` calls made
    reads: usize,
    fail_writes: bool,
    fail_reads: bool,
    forbid_reads: bool,
    connected: bool,
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StubTransport {
    /// Create a stub that answers every read with [`DEFAULT_REPLY`]
    pub fn new() -> Self {
        Self::with_fallback(Some(DEFAULT_REPLY.to_vec()))
    }

    /// Create a stub that answers every read with `reply`
    pub fn with_reply(reply: impl Into<Vec<u8>>) -> Self {
        Self::with_fallback(Some(reply.into()))
    }

    /// Create a stub with no fallback; reads fail once the script runs dry
    pub fn scripted<I, R>(replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Vec<u8>>,
    {
        let mut stub = Self::with_fallback(None);
        for reply in replies {
            stub.push_reply(reply);
        }
        stub
    }

    /// A stub standing in for a transport that failed to open
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::with_fallback(None)
        }
    }

    fn with_fallback(fallback: Option<Vec<u8>>) -> Self {
        Self {
            script: VecDeque::new(),
            fallback,
            written: Vec::new(),
            reads: 0,
            fail_writes: false,
            fail_reads: false,
            forbid_reads: false,
            connected: true,
        }
    }

    /// Queue a reply for the next unanswered read
    pub fn push_reply(&mut self, reply: impl Into<Vec<u8>>) {
        self.script.push_back(StubReply::Line(reply.into()));
    }

    /// Queue a failure for the next unanswered read
    pub fn push_failure(&mut self) {
        self.script.push_back(StubReply::Fail);
    }

    /// Configure whether write operations should fail
    pub fn set_write_error(&mut self, should_error: bool) {
        self.fail_writes = should_error;
    }

    /// Configure whether read operations should fail
    pub fn set_read_error(&mut self, should_error: bool) {
        self.fail_reads = should_error;
    }

    /// Treat any read as a violation (for verifying write-only exchanges)
    pub fn forbid_reads(&mut self, forbid: bool) {
        self.forbid_reads = forbid;
    }

    /// Raw lines written so far
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Lines written so far, decoded lossily
    pub fn written_lines(&self) -> Vec<String> {
        self.written
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Clear the record of written lines
    pub fn clear_written(&mut self) {
        self.written.clear();
    }

    /// Number of `read` calls made so far, including failed ones
    pub fn read_count(&self) -> usize {
        self.reads
    }

    /// Number of scripted replies not yet consumed
    pub fn pending_replies(&self) -> usize {
        self.script.len()
    }
}

impl Transport for StubTransport {
    fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_writes {
            return Err(TransportError::Injected("write failure".into()));
        }
        trace!("stub <- {:?}", String::from_utf8_lossy(payload));
        self.written.push(payload.to_vec());
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        self.reads += 1;
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.forbid_reads {
            return Err(TransportError::Injected("read on a write-only exchange".into()));
        }
        if self.fail_reads {
            return Err(TransportError::Injected("read failure".into()));
        }

        match self.script.pop_front() {
            Some(StubReply::Line(line)) => Ok(line),
            Some(StubReply::Fail) => Err(TransportError::Injected("scripted read failure".into())),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| TransportError::Injected("no scripted reply left".into())),
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stub
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }
}
