//! Datagram stream the OpenSSL handshake runs over.
//!
//! The demultiplexer feeds inbound DTLS records through a channel and writes
//! go out through the shared write handle. The channel also buffers the
//! current outgoing flight: when a read times out, the whole flight is
//! re-sent with exponential backoff before giving up.

use core::fmt;
use std::io::{self, Cursor, Read, Write};
use std::net::SocketAddr;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::log::log_sink::LogSink;
use crate::transport::writer::WriteHandle;
use crate::{sink_debug, sink_trace, sink_warn};

pub struct DatagramChannel {
    rx: Receiver<Vec<u8>>,
    writer: WriteHandle,
    peer: SocketAddr,
    reader: Cursor<Vec<u8>>,
    /// Records written since the last successful read.
    flight: Vec<Vec<u8>>,
    /// Set once a read succeeds; the next write starts a new flight.
    flight_done: bool,
    retransmit_base: Duration,
    max_retransmits: u32,
    logger: Arc<dyn LogSink>,
}

impl fmt::Debug for DatagramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramChannel")
            .field("peer", &self.peer)
            .field("flight_records", &self.flight.len())
            .finish()
    }
}

impl DatagramChannel {
    #[must_use]
    pub fn new(
        rx: Receiver<Vec<u8>>,
        writer: WriteHandle,
        peer: SocketAddr,
        retransmit_base: Duration,
        max_retransmits: u32,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            rx,
            writer,
            peer,
            reader: Cursor::new(Vec::new()),
            flight: Vec::new(),
            flight_done: false,
            retransmit_base,
            max_retransmits,
            logger,
        }
    }

    fn resend_flight(&self) -> io::Result<()> {
        sink_debug!(
            self.logger,
            "[DTLS IO] Retransmitting flight ({} records) to {}",
            self.flight.len(),
            self.peer
        );
        for record in &self.flight {
            self.writer
                .send_to(record.clone(), self.peer)
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        }
        Ok(())
    }
}

impl Read for DatagramChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Consume leftovers from the previous datagram first.
        let pos = self.reader.position();
        if pos < self.reader.get_ref().len() as u64 {
            return self.reader.read(buf);
        }

        let mut rto = self.retransmit_base;
        let mut attempts: u32 = 0;
        loop {
            match self.rx.recv_timeout(rto) {
                Ok(data) => {
                    sink_trace!(self.logger, "[DTLS IO] Read {} bytes", data.len());
                    self.flight_done = true;
                    self.reader = Cursor::new(data);
                    return self.reader.read(buf);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if attempts >= self.max_retransmits {
                        sink_warn!(
                            self.logger,
                            "[DTLS IO] No answer after {} retransmissions",
                            attempts
                        );
                        return Err(io::Error::from(io::ErrorKind::TimedOut));
                    }
                    if !self.flight.is_empty() {
                        self.resend_flight()?;
                    }
                    attempts += 1;
                    rto *= 2;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::from(io::ErrorKind::BrokenPipe));
                }
            }
        }
    }
}

impl Write for DatagramChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.flight_done {
            self.flight.clear();
            self.flight_done = false;
        }
        sink_trace!(
            self.logger,
            "[DTLS IO] Sending {} bytes to {}",
            buf.len(),
            self.peer
        );
        self.flight.push(buf.to_vec());
        self.writer
            .send_to(buf.to_vec(), self.peer)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
