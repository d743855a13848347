//! Minimal RTP packet model + encode/decode per RFC 3550.
//! No session logic lives here (no jitter calc, no RTX, etc.); the module
//! focuses on immutable packet structs and safe serialization.

pub mod rtp_error;
pub mod rtp_header;
pub mod rtp_header_extension;
pub mod rtp_packet;

pub use rtp_error::RtpError;
pub use rtp_header::RtpHeader;
pub use rtp_header_extension::RtpHeaderExtension;
pub use rtp_packet::RtpPacket;

/// Only version ever emitted or accepted.
pub const RTP_VERSION: u8 = 2;
