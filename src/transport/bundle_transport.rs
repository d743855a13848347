//! Demultiplexer for the bundle socket.
//!
//! One thread owns the read side of the socket and classifies every datagram:
//! STUN first, then DTLS records, then RTCP, then RTP. RTP and RTCP are only
//! admitted once SRTP has been activated; before that they are dropped.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::log::log_sink::LogSink;
use crate::rtcp::{self, RtcpPacket};
use crate::rtp::rtp_packet::RtpPacket;
use crate::srtp::context::SrtpContext;
use crate::stun::is_stun_datagram;
use crate::transport::writer::{self, WriteHandle};
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

const READ_TICK: Duration = Duration::from_millis(50);
const MAX_DATAGRAM: usize = 2048;

/// First-byte range reserved for DTLS record content types.
const DTLS_FIRST_BYTE: std::ops::RangeInclusive<u8> = 20..=63;
/// Payload-type range that marks a packet as RTCP rather than RTP.
const RTCP_PT_RANGE: std::ops::RangeInclusive<u8> = 192..=223;

/// What the demultiplexer decided a datagram is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DatagramKind {
    Stun,
    Dtls,
    Rtcp,
    Rtp,
    Unknown,
}

pub(crate) fn classify(buf: &[u8]) -> DatagramKind {
    if is_stun_datagram(buf) {
        return DatagramKind::Stun;
    }
    let Some(&first) = buf.first() else {
        return DatagramKind::Unknown;
    };
    if DTLS_FIRST_BYTE.contains(&first) {
        return DatagramKind::Dtls;
    }
    // RTP and RTCP share version bits; the payload-type octet separates them.
    if first >> 6 == 2 && buf.len() >= 2 {
        if RTCP_PT_RANGE.contains(&buf[1]) {
            return DatagramKind::Rtcp;
        }
        return DatagramKind::Rtp;
    }
    DatagramKind::Unknown
}

/// Notifications the demux thread pushes up to the connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded compound RTCP packet from the peer.
    Rtcp(Vec<RtcpPacket>),
    /// Media arrived for an SSRC nothing is routed to yet.
    PendingSsrc(u32),
    /// Sustained SRTP authentication failures crossed the configured
    /// threshold; carries the failure count.
    SrtpAuthEscalation(u64),
    /// The socket died under the demux thread; no more inbound traffic.
    Closed,
}

enum DemuxControl {
    ActivateSrtp(Box<SrtpContext>),
    Route { ssrc: u32, sink: Sender<RtpPacket> },
}

/// Receivers handed to the connection when the transport starts.
pub struct TransportReceivers {
    pub stun_rx: Receiver<(Vec<u8>, SocketAddr)>,
    pub dtls_rx: Receiver<Vec<u8>>,
    pub events_rx: Receiver<TransportEvent>,
}

/// Owns the bundle socket plus its reader and writer threads.
pub struct BundleTransport {
    socket: Arc<UdpSocket>,
    write_handle: WriteHandle,
    ctrl: Sender<DemuxControl>,
    run: Arc<AtomicBool>,
    demux_thread: Option<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<()>>,
}

impl BundleTransport {
    /// Spawns the writer and demux threads over an already-bound socket.
    ///
    /// # Errors
    /// Fails if the read timeout cannot be set on the socket.
    pub fn start(
        socket: UdpSocket,
        auth_failure_threshold: u64,
        logger: Arc<dyn LogSink>,
    ) -> io::Result<(Self, TransportReceivers)> {
        socket.set_read_timeout(Some(READ_TICK))?;
        let socket = Arc::new(socket);

        let (write_handle, writer_thread) = writer::spawn_writer(socket.clone(), logger.clone());

        let (stun_tx, stun_rx) = mpsc::channel();
        let (dtls_tx, dtls_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();
        let (ctrl_tx, ctrl_rx) = mpsc::channel();

        let run = Arc::new(AtomicBool::new(true));
        let demux_thread = {
            let socket = socket.clone();
            let run = run.clone();
            std::thread::spawn(move || {
                demux_loop(
                    &socket,
                    &run,
                    &ctrl_rx,
                    &stun_tx,
                    &dtls_tx,
                    &events_tx,
                    auth_failure_threshold,
                    &logger,
                );
            })
        };

        Ok((
            Self {
                socket,
                write_handle,
                ctrl: ctrl_tx,
                run,
                demux_thread: Some(demux_thread),
                writer_thread: Some(writer_thread),
            },
            TransportReceivers {
                stun_rx,
                dtls_rx,
                events_rx,
            },
        ))
    }

    #[must_use]
    pub fn writer(&self) -> WriteHandle {
        self.write_handle.clone()
    }

    /// # Errors
    /// Propagates the socket's `local_addr` failure.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Installs the inbound SRTP context; from here on RTP/RTCP is admitted.
    pub fn activate_srtp(&self, inbound: SrtpContext) -> bool {
        self.ctrl
            .send(DemuxControl::ActivateSrtp(Box::new(inbound)))
            .is_ok()
    }

    /// Routes decrypted RTP with `ssrc` to `sink`.
    pub fn route_ssrc(&self, ssrc: u32, sink: Sender<RtpPacket>) -> bool {
        self.ctrl.send(DemuxControl::Route { ssrc, sink }).is_ok()
    }

    /// Stops both threads and joins them.
    pub fn shutdown(&mut self) {
        self.run.store(false, Ordering::Relaxed);
        if let Some(h) = self.demux_thread.take() {
            let _ = h.join();
        }
        // Writer exits once the last WriteHandle clone is gone; ours is the
        // one held here.
        drop(std::mem::replace(&mut self.write_handle, {
            let (tx, _rx) = mpsc::channel();
            WriteHandle::new(tx)
        }));
        if let Some(h) = self.writer_thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for BundleTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::too_many_arguments)]
fn demux_loop(
    socket: &UdpSocket,
    run: &AtomicBool,
    ctrl_rx: &Receiver<DemuxControl>,
    stun_tx: &Sender<(Vec<u8>, SocketAddr)>,
    dtls_tx: &Sender<Vec<u8>>,
    events_tx: &Sender<TransportEvent>,
    auth_failure_threshold: u64,
    logger: &Arc<dyn LogSink>,
) {
    let mut srtp: Option<SrtpContext> = None;
    let mut routes: HashMap<u32, Sender<RtpPacket>> = HashMap::new();
    let mut announced_ssrcs: HashSet<u32> = HashSet::new();
    let mut escalated = false;
    let mut buf = [0u8; MAX_DATAGRAM];

    while run.load(Ordering::Relaxed) {
        while let Ok(ctrl) = ctrl_rx.try_recv() {
            match ctrl {
                DemuxControl::ActivateSrtp(ctx) => {
                    sink_info!(logger, "[NET] Inbound SRTP activated");
                    srtp = Some(*ctx);
                }
                DemuxControl::Route { ssrc, sink } => {
                    sink_debug!(logger, "[NET] Routing SSRC {:#010x}", ssrc);
                    announced_ssrcs.remove(&ssrc);
                    routes.insert(ssrc, sink);
                }
            }
        }

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                sink_warn!(logger, "[NET] Socket read failed: {}", e);
                let _ = events_tx.send(TransportEvent::Closed);
                break;
            }
        };
        let data = &buf[..n];

        match classify(data) {
            DatagramKind::Stun => {
                if stun_tx.send((data.to_vec(), from)).is_err() {
                    sink_trace!(logger, "[NET] STUN consumer gone, dropping");
                }
            }
            DatagramKind::Dtls => {
                if dtls_tx.send(data.to_vec()).is_err() {
                    sink_trace!(logger, "[NET] DTLS consumer gone, dropping");
                }
            }
            DatagramKind::Rtcp => {
                let Some(ctx) = srtp.as_mut() else {
                    sink_trace!(logger, "[NET] RTCP before SRTP activation, dropping");
                    continue;
                };
                match ctx.unprotect_rtcp(data) {
                    Ok(plain) => match rtcp::parse_compound(&plain) {
                        Ok(packets) => {
                            let _ = events_tx.send(TransportEvent::Rtcp(packets));
                        }
                        Err(e) => {
                            sink_debug!(logger, "[NET] Bad RTCP compound: {}", e);
                        }
                    },
                    Err(e) => {
                        sink_debug!(logger, "[NET] SRTCP unprotect failed: {}", e);
                        escalated = check_escalation(
                            ctx,
                            auth_failure_threshold,
                            escalated,
                            events_tx,
                            logger,
                        );
                    }
                }
            }
            DatagramKind::Rtp => {
                let Some(ctx) = srtp.as_mut() else {
                    sink_trace!(logger, "[NET] RTP before SRTP activation, dropping");
                    continue;
                };
                match ctx.unprotect(data) {
                    Ok(plain) => match RtpPacket::decode(&plain) {
                        Ok(packet) => {
                            let ssrc = packet.header.ssrc;
                            if let Some(sink) = routes.get(&ssrc) {
                                if sink.send(packet).is_err() {
                                    routes.remove(&ssrc);
                                }
                            } else if announced_ssrcs.insert(ssrc) {
                                let _ = events_tx.send(TransportEvent::PendingSsrc(ssrc));
                            }
                        }
                        Err(e) => {
                            sink_debug!(logger, "[NET] Bad RTP after unprotect: {}", e);
                        }
                    },
                    Err(e) => {
                        sink_debug!(logger, "[NET] SRTP unprotect failed: {}", e);
                        escalated = check_escalation(
                            ctx,
                            auth_failure_threshold,
                            escalated,
                            events_tx,
                            logger,
                        );
                    }
                }
            }
            DatagramKind::Unknown => {
                sink_trace!(logger, "[NET] Unclassifiable datagram from {}", from);
            }
        }
    }
}

fn check_escalation(
    ctx: &SrtpContext,
    threshold: u64,
    already: bool,
    events_tx: &Sender<TransportEvent>,
    logger: &Arc<dyn LogSink>,
) -> bool {
    if already {
        return true;
    }
    let failures = ctx.auth_failures();
    if failures >= threshold {
        sink_warn!(
            logger,
            "[NET] {} SRTP auth failures, escalating",
            failures
        );
        let _ = events_tx.send(TransportEvent::SrtpAuthEscalation(failures));
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::noop_log_sink::NoopLogSink;
    use crate::stun::StunMessage;
    use std::time::Duration;

    #[test]
    fn test_classify_order_ok() {
        let stun = StunMessage::binding_request().encode(None);
        assert_eq!(classify(&stun), DatagramKind::Stun);

        // DTLS handshake record starts with content type 22.
        assert_eq!(classify(&[22, 0xfe, 0xfd, 0, 0]), DatagramKind::Dtls);
        assert_eq!(classify(&[63, 0, 0]), DatagramKind::Dtls);

        // Version-2 packet with RTCP payload type 200 (SR).
        assert_eq!(classify(&[0x80, 200, 0, 0]), DatagramKind::Rtcp);
        assert_eq!(classify(&[0x80, 223, 0, 0]), DatagramKind::Rtcp);

        // Same version bits, media payload type.
        assert_eq!(classify(&[0x80, 96, 0, 0]), DatagramKind::Rtp);
        assert_eq!(classify(&[0x80, 0xE0, 0, 0]), DatagramKind::Rtp);

        assert_eq!(classify(&[0x05, 1, 2]), DatagramKind::Unknown);
        assert_eq!(classify(&[]), DatagramKind::Unknown);
    }

    #[test]
    fn test_demux_delivers_stun_and_dtls_ok() {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = sock.local_addr().unwrap();
        let (mut transport, rx) =
            BundleTransport::start(sock, 100, Arc::new(NoopLogSink)).unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let stun = StunMessage::binding_request().encode(None);
        sender.send_to(&stun, addr).unwrap();
        sender.send_to(&[22u8, 0xfe, 0xfd, 0, 1, 2, 3], addr).unwrap();

        let (got, from) = rx.stun_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, stun);
        assert_eq!(from, sender.local_addr().unwrap());

        let dtls = rx.dtls_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(dtls[0], 22);

        transport.shutdown();
    }

    #[test]
    fn test_writer_reachable_through_transport_ok() {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let (mut transport, _rx) =
            BundleTransport::start(sock, 100, Arc::new(NoopLogSink)).unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        transport
            .writer()
            .send_to(b"hello".to_vec(), peer.local_addr().unwrap())
            .unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        transport.shutdown();
    }
}
