//! rtcmux is a transport-only WebRTC engine.
//!
//! It negotiates a session via SDP offer/answer, traverses NATs with ICE,
//! secures the selected path with DTLS-SRTP and then carries RTP/RTCP over a
//! single multiplexed UDP socket per bundle. Media encoding, jitter buffering
//! and congestion control are out of scope: the application sends and
//! receives whole [`rtp::RtpPacket`]s through tracks bound to a
//! [`peer::PeerConnection`].

/// Configuration loading and the typed engine configuration.
pub mod config;
/// DTLS handshake over the ICE-selected pair and SRTP key export.
pub mod dtls;
/// Aggregate error type for the public API.
pub mod error;
/// ICE candidate gathering, connectivity checks and pair selection.
pub mod ice;
/// Logging utilities.
pub mod log;
/// PeerConnection orchestrator and transceivers.
pub mod peer;
/// RTCP packet parsing and building.
pub mod rtcp;
/// RTP packet parsing and building.
pub mod rtp;
/// SDP parsing, generation and offer/answer negotiation.
pub mod sdp;
/// SRTP packet protection with replay defense.
pub mod srtp;
/// STUN message codec used by the ICE agent.
pub mod stun;
/// Track handles exposed to the media layer.
pub mod track;
/// Demultiplexed bundle transport over one UDP socket.
pub mod transport;
