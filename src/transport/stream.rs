//! Transport over a byte stream to a memory simulator in another process.
//!
//! Messages travel as fixed-size frames (see [`wire`](super::wire)). The
//! stream is expected to be non-blocking: reads that would block simply leave
//! the inbound queue as it is, and writes that would block keep the unsent
//! bytes for the next flush.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;

use tracing::{debug, info, trace};

use crate::message::{Message, MessageKind};
use crate::transport::loopback::{DEFAULT_CAPACITY, DEFAULT_LATENCY, DEFAULT_SYNC_INTERVAL};
use crate::transport::wire::{self, FRAME_LEN};
use crate::transport::{OutSlot, Transport, TransportError, TransportResult};
use crate::types::SimTime;

const READ_CHUNK: usize = 4096;

/// Frame transport over any `Read + Write` stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    latency: SimTime,
    capacity: usize,
    synchronized: bool,
    sync_interval: SimTime,
    next_sync: SimTime,
    tx: Vec<u8>,
    rx: Vec<u8>,
    inbound: VecDeque<Message>,
    peer_closed: bool,
}

#[cfg(unix)]
impl StreamTransport<UnixStream> {
    /// Connects to a memory simulator listening on a Unix socket.
    pub fn connect_unix<P: AsRef<Path>>(path: P) -> TransportResult<Self> {
        let stream = UnixStream::connect(path.as_ref())?;
        stream.set_nonblocking(true)?;
        info!(path = %path.as_ref().display(), "connected to memory side");
        Ok(Self::new(stream))
    }
}

impl StreamTransport<TcpStream> {
    /// Connects to a memory simulator listening on a TCP address.
    pub fn connect_tcp<A: ToSocketAddrs + std::fmt::Debug>(addr: A) -> TransportResult<Self> {
        let stream = TcpStream::connect(&addr)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        info!(addr = ?addr, "connected to memory side");
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wraps an already connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            latency: DEFAULT_LATENCY,
            capacity: DEFAULT_CAPACITY,
            synchronized: true,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            next_sync: 0,
            tx: Vec::new(),
            rx: Vec::new(),
            inbound: VecDeque::new(),
            peer_closed: false,
        }
    }

    /// Sets the one-way link latency.
    pub fn with_latency(mut self, latency: SimTime) -> Self {
        self.latency = latency;
        self
    }

    /// Sets how many unflushed frames may be queued before allocation fails.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the maximum time between two outgoing sync markers.
    pub fn with_sync_interval(mut self, interval: SimTime) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Enables or disables outgoing sync markers.
    pub fn synchronized(mut self, enabled: bool) -> Self {
        self.synchronized = enabled;
        self
    }

    /// Frames queued but not yet written to the stream.
    pub fn pending_frames(&self) -> usize {
        self.tx.len() / FRAME_LEN
    }

    fn queue(&mut self, msg: &Message) {
        trace!(time = msg.time, kind = msg.kind.name(), "frame queued");
        self.tx.extend_from_slice(&wire::encode(msg));
    }

    fn fill(&mut self) -> TransportResult<()> {
        if self.peer_closed {
            return Ok(());
        }
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("memory side closed its end of the stream");
                    self.peer_closed = true;
                    break;
                }
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let complete = self.rx.len() / FRAME_LEN * FRAME_LEN;
        for raw in self.rx[..complete].chunks_exact(FRAME_LEN) {
            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(raw);
            self.inbound.push_back(wire::decode(&frame));
        }
        self.rx.drain(..complete);
        Ok(())
    }

    fn flush_tx(&mut self) -> TransportResult<()> {
        while !self.tx.is_empty() {
            match self.stream.write(&self.tx) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => {
                    self.tx.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Err(TransportError::WouldBlock {
                        pending: self.tx.len(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.stream.flush()?;
        Ok(())
    }

    fn check_open(&self) -> TransportResult<()> {
        if self.peer_closed && self.inbound.is_empty() {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn out_alloc(&mut self, time: SimTime) -> Option<OutSlot> {
        if self.pending_frames() >= self.capacity {
            return None;
        }
        Some(OutSlot {
            time: time + self.latency,
        })
    }

    fn out_send(&mut self, slot: OutSlot, kind: MessageKind) -> TransportResult<()> {
        self.queue(&Message::new(slot.time, kind));
        // Any message doubles as a heartbeat.
        self.next_sync = slot.time.saturating_sub(self.latency) + self.sync_interval;
        Ok(())
    }

    fn out_sync(&mut self, time: SimTime) -> TransportResult<()> {
        if self.synchronized && time >= self.next_sync {
            self.queue(&Message::sync(time + self.latency));
            self.next_sync = time + self.sync_interval;
        }
        self.flush_tx()
    }

    fn in_poll(&mut self, time: SimTime) -> TransportResult<Option<Message>> {
        self.fill()?;
        self.check_open()?;
        Ok(self.inbound.front().filter(|m| m.time <= time).cloned())
    }

    fn in_done(&mut self) {
        self.inbound.pop_front();
    }

    fn in_timestamp(&mut self) -> TransportResult<Option<SimTime>> {
        self.fill()?;
        self.check_open()?;
        Ok(self.inbound.front().map(|m| m.time))
    }

    fn close(&mut self) -> TransportResult<()> {
        match self.flush_tx() {
            Ok(()) | Err(TransportError::Disconnected) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
