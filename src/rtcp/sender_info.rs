use super::report_block::read_u32;
use super::rtcp_error::RtcpError;

/// Sender info in SR (20 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderInfo {
    pub ntp_msw: u32,
    pub ntp_lsw: u32,
    pub rtp_ts: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderInfo {
    /// # Errors
    /// `TooShort` if the buffer holds fewer than 20 bytes.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RtcpError> {
        if buf.len() < 20 {
            return Err(RtcpError::TooShort);
        }
        Ok((
            Self {
                ntp_msw: read_u32(buf, 0)?,
                ntp_lsw: read_u32(buf, 4)?,
                rtp_ts: read_u32(buf, 8)?,
                packet_count: read_u32(buf, 12)?,
                octet_count: read_u32(buf, 16)?,
            },
            20,
        ))
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ntp_msw.to_be_bytes());
        out.extend_from_slice(&self.ntp_lsw.to_be_bytes());
        out.extend_from_slice(&self.rtp_ts.to_be_bytes());
        out.extend_from_slice(&self.packet_count.to_be_bytes());
        out.extend_from_slice(&self.octet_count.to_be_bytes());
    }
}
