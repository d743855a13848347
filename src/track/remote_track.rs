//! Remotely originated track: the demultiplexer routes decrypted RTP for one
//! SSRC into this handle's queue.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::time::Duration;

use crate::error::RtcError;
use crate::rtp::RtpPacket;
use crate::sdp::MediaKind;
use crate::track::MediaTrack;

/// A track the application reads from, created when an inbound SSRC binds to
/// a negotiated media section.
pub struct RemoteTrack {
    kind: MediaKind,
    mid: String,
    ssrc: u32,
    rx: Receiver<RtpPacket>,
}

impl RemoteTrack {
    pub(crate) fn new(kind: MediaKind, mid: String, ssrc: u32) -> (Self, Sender<RtpPacket>) {
        let (tx, rx) = channel();
        (Self { kind, mid, ssrc, rx }, tx)
    }

    #[must_use]
    pub fn mid(&self) -> &str {
        &self.mid
    }

    /// Blocks until the next RTP packet for this track arrives.
    ///
    /// # Errors
    /// `TransportClosed` once the connection is torn down.
    pub fn recv(&self) -> Result<RtpPacket, RtcError> {
        self.rx.recv().map_err(|_| RtcError::TransportClosed)
    }

    /// Like [`recv`](Self::recv) with an upper bound on the wait.
    ///
    /// # Errors
    /// `TransportClosed` on teardown or when `timeout` elapses first.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<RtpPacket, RtcError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected => {
                RtcError::TransportClosed
            }
        })
    }

    /// Non-blocking variant; `None` when no packet is queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<RtpPacket> {
        self.rx.try_recv().ok()
    }
}

impl MediaTrack for RemoteTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn ssrc(&self) -> Option<u32> {
        Some(self.ssrc)
    }
}
