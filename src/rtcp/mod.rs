//! RTCP packet model + encode/decode (RFC 3550 reports, RFC 4585 feedback).

pub mod bye;
pub mod common_header;
pub mod generic_nack;
pub mod packet_type;
pub mod picture_loss;
pub mod receiver_report;
pub mod report_block;
pub mod rtcp;
pub mod rtcp_error;
pub mod sdes;
pub mod sender_info;
pub mod sender_report;

pub use bye::Bye;
pub use generic_nack::GenericNack;
pub use picture_loss::PictureLossIndication;
pub use receiver_report::ReceiverReport;
pub use report_block::ReportBlock;
pub use rtcp::RtcpPacket;
pub use rtcp_error::RtcpError;
pub use sdes::{Sdes, SdesChunk, SdesItem};
pub use sender_info::SenderInfo;
pub use sender_report::SenderReport;

pub const RTCP_VERSION: u8 = 2;

/// Decodes a compound RTCP buffer into individual packets.
///
/// # Errors
/// Propagates the first per-packet decode failure.
pub fn parse_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>, RtcpError> {
    RtcpPacket::decode_compound(buf)
}

/// Encodes packets back to back into one compound buffer.
///
/// # Errors
/// Propagates per-packet encode failures (oversized fields).
pub fn encode_compound(pkts: &[RtcpPacket]) -> Result<Vec<u8>, RtcpError> {
    RtcpPacket::encode_compound(pkts)
}
