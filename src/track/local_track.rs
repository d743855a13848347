//! Locally originated track: the application pushes RTP packets, the engine
//! stamps SSRC and sequence numbers, protects and sends them.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::error::RtcError;
use crate::rtp::RtpPacket;
use crate::sdp::MediaKind;
use crate::srtp::SrtpContext;
use crate::track::MediaTrack;
use crate::transport::WriteHandle;

/// Send path installed once the bundle transport is active.
pub(crate) struct TrackSender {
    pub(crate) ssrc: u32,
    pub(crate) payload_type: u8,
    pub(crate) next_seq: u16,
    pub(crate) srtp: Arc<Mutex<SrtpContext>>,
    pub(crate) writer: WriteHandle,
    pub(crate) dest: SocketAddr,
}

impl TrackSender {
    fn send(&mut self, mut packet: RtpPacket) -> Result<(), RtcError> {
        packet.header.ssrc = self.ssrc;
        packet.header.payload_type = self.payload_type;
        packet.header.sequence_number = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let plain = packet.encode();
        let protected = {
            let mut srtp = self
                .srtp
                .lock()
                .map_err(|_| RtcError::TransportClosed)?;
            srtp.protect(&plain)?
        };
        self.writer
            .send_to(protected, self.dest)
            .map_err(|_| RtcError::TransportClosed)
    }
}

/// A track the application writes to. Created by the application, handed to
/// [`PeerConnection::add_transceiver`], and usable for sending once the
/// connection is established.
///
/// [`PeerConnection::add_transceiver`]: crate::peer::PeerConnection::add_transceiver
pub struct LocalTrack {
    kind: MediaKind,
    inner: Mutex<Option<TrackSender>>,
}

impl LocalTrack {
    #[must_use]
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            inner: Mutex::new(None),
        })
    }

    /// Sends one RTP packet. Timestamp, marker and payload are taken from
    /// `packet`; SSRC, payload type and sequence number are owned by the
    /// engine and overwritten.
    ///
    /// # Errors
    /// `InvalidState` before the connection is established, `TransportClosed`
    /// once it is torn down, `Srtp` on protection failure.
    pub fn send(&self, packet: RtpPacket) -> Result<(), RtcError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| RtcError::TransportClosed)?;
        match guard.as_mut() {
            Some(sender) => sender.send(packet),
            None => Err(RtcError::InvalidState(
                "track is not bound to an active connection".into(),
            )),
        }
    }

    pub(crate) fn bind(&self, sender: TrackSender) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(sender);
        }
    }

    pub(crate) fn unbind(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
    }
}

impl MediaTrack for LocalTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn ssrc(&self) -> Option<u32> {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.ssrc))
    }
}
