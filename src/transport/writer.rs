//! Single writer thread for the bundle socket.
//!
//! Every component that sends (ICE checks, DTLS records, SRTP packets) goes
//! through a cloned `WriteHandle`, so outbound datagrams are serialized
//! without sharing the socket across modules.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use crate::log::log_sink::LogSink;
use crate::{sink_trace, sink_warn};

/// Cloneable sender for outbound datagrams.
#[derive(Clone)]
pub struct WriteHandle {
    tx: Sender<(Vec<u8>, SocketAddr)>,
}

/// The writer thread went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterClosed;

impl WriteHandle {
    #[must_use]
    pub fn new(tx: Sender<(Vec<u8>, SocketAddr)>) -> Self {
        Self { tx }
    }

    /// Queues one datagram for the writer thread.
    ///
    /// # Errors
    /// `WriterClosed` once the writer thread has exited.
    pub fn send_to(&self, data: Vec<u8>, dest: SocketAddr) -> Result<(), WriterClosed> {
        self.tx.send((data, dest)).map_err(|_| WriterClosed)
    }
}

/// Spawns the writer thread for `socket`.
///
/// The thread exits when every `WriteHandle` clone is dropped.
#[must_use]
pub fn spawn_writer(
    socket: Arc<UdpSocket>,
    logger: Arc<dyn LogSink>,
) -> (WriteHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<(Vec<u8>, SocketAddr)>();
    let handle = std::thread::spawn(move || {
        while let Ok((data, dest)) = rx.recv() {
            match socket.send_to(&data, dest) {
                Ok(n) => {
                    sink_trace!(logger, "[NET] Sent {} bytes to {}", n, dest);
                }
                Err(e) => {
                    sink_warn!(logger, "[NET] Send to {} failed: {}", dest, e);
                }
            }
        }
    });
    (WriteHandle::new(tx), handle)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::noop_log_sink::NoopLogSink;

    #[test]
    fn test_writer_delivers_datagram_ok() {
        let send_sock = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let recv_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = recv_sock.local_addr().unwrap();

        let (handle, join) = spawn_writer(send_sock, Arc::new(NoopLogSink));
        handle.send_to(b"ping".to_vec(), dest).unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = recv_sock.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");

        drop(handle);
        join.join().unwrap();
    }

    #[test]
    fn test_send_after_writer_exit_error() {
        let sock = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let (handle, join) = spawn_writer(sock, Arc::new(NoopLogSink));
        let clone = handle.clone();
        drop(handle);
        drop(clone);
        join.join().unwrap();

        let sock2 = UdpSocket::bind("127.0.0.1:0").unwrap();
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let dead = WriteHandle::new(tx);
        assert_eq!(
            dead.send_to(b"x".to_vec(), sock2.local_addr().unwrap()),
            Err(WriterClosed)
        );
    }
}
