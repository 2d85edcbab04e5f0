//! Message tracing decorator.
//!
//! [`TracedTransport`] forwards every call to an inner transport and appends
//! one JSON object per line for each message sent or consumed:
//!
//! ```text
//! {"dir":"out","time":1500,"kind":{"type":"ReadRequest","addr":256,"req_id":"Instr","len":4}}
//! {"dir":"in","time":2500,"kind":{"type":"ReadCompletion","req_id":"Instr","data":{...}}}
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::message::{Message, MessageKind};
use crate::transport::{OutSlot, Transport, TransportResult};
use crate::types::SimTime;

/// Direction of a traced message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Bridge to memory
    Out,
    /// Memory to bridge
    In,
}

#[derive(Serialize)]
struct TraceRecord<'a> {
    dir: Direction,
    time: SimTime,
    kind: &'a MessageKind,
}

/// Wraps a transport and records its traffic as JSON lines.
pub struct TracedTransport<T, W: Write = BufWriter<File>> {
    inner: T,
    writer: W,
    polled: Option<Message>,
    records: u64,
}

impl<T: Transport> TracedTransport<T> {
    /// Traces `inner` into a newly created file at `path`.
    pub fn create<P: AsRef<Path>>(inner: T, path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(inner, BufWriter::new(file)))
    }
}

impl<T: Transport, W: Write> TracedTransport<T, W> {
    /// Traces `inner` into `writer`.
    pub fn new(inner: T, writer: W) -> Self {
        Self {
            inner,
            writer,
            polled: None,
            records: 0,
        }
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// The wrapped transport, mutably.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Number of records written.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Consumes the decorator, returning the transport and the writer.
    pub fn into_parts(self) -> (T, W) {
        (self.inner, self.writer)
    }

    fn record(&mut self, dir: Direction, time: SimTime, kind: &MessageKind) -> TransportResult<()> {
        serde_json::to_writer(&mut self.writer, &TraceRecord { dir, time, kind })?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }
}

impl<T: Transport, W: Write> Transport for TracedTransport<T, W> {
    fn out_alloc(&mut self, time: SimTime) -> Option<OutSlot> {
        self.inner.out_alloc(time)
    }

    fn out_send(&mut self, slot: OutSlot, kind: MessageKind) -> TransportResult<()> {
        self.record(Direction::Out, slot.time, &kind)?;
        self.inner.out_send(slot, kind)
    }

    fn out_sync(&mut self, time: SimTime) -> TransportResult<()> {
        self.inner.out_sync(time)
    }

    fn in_poll(&mut self, time: SimTime) -> TransportResult<Option<Message>> {
        let msg = self.inner.in_poll(time)?;
        self.polled.clone_from(&msg);
        Ok(msg)
    }

    fn in_done(&mut self) {
        if let Some(msg) = self.polled.take() {
            if let Err(e) = self.record(Direction::In, msg.time, &msg.kind) {
                warn!(error = %e, "failed to write trace record");
            }
        }
        self.inner.in_done();
    }

    fn in_timestamp(&mut self) -> TransportResult<Option<SimTime>> {
        self.inner.in_timestamp()
    }

    fn close(&mut self) -> TransportResult<()> {
        self.writer.flush()?;
        self.inner.close()
    }
}
