use crate::rtcp::{
    common_header::{CommonHeader, finalize_length},
    packet_type::{PT_PSFB, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

use super::report_block::read_u32;

// Feedback: PLI (PSFB, FMT=1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureLossIndication {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
}

impl RtcpPacketType for PictureLossIndication {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        let hdr = CommonHeader::new(1, PT_PSFB, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        // no FCI for PLI
        finalize_length(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        // Payload-specific feedback (206); support FMT=1 (PLI) only.
        if payload.len() < 8 {
            return Err(RtcpError::TooShort);
        }
        let sender_ssrc = read_u32(payload, 0)?;
        let media_ssrc = read_u32(payload, 4)?;
        match hdr.rc_or_fmt() {
            1 => Ok(RtcpPacket::Pli(PictureLossIndication {
                sender_ssrc,
                media_ssrc,
            })),
            _ => Err(RtcpError::Invalid),
        }
    }
}

impl PictureLossIndication {
    #[must_use]
    pub fn new(sender_ssrc: u32, media_ssrc: u32) -> Self {
        Self {
            sender_ssrc,
            media_ssrc,
        }
    }
}
