use crate::peer::states::PeerConnectionState;
use crate::rtcp::RtcpPacket;
use crate::track::RemoteTrack;

/// Notifications delivered through the receiver returned by
/// [`PeerConnection::take_events`](crate::peer::PeerConnection::take_events).
pub enum PeerEvent {
    /// An inbound SSRC bound to a media section; the track reads its packets.
    Track(RemoteTrack),
    /// The aggregate connection state changed.
    ConnectionStateChange(PeerConnectionState),
    /// A decoded compound RTCP packet from the peer.
    Rtcp(Vec<RtcpPacket>),
    /// Sustained SRTP authentication failures crossed the configured
    /// threshold; the connection is marked failed.
    SrtpAuthEscalation(u64),
}
