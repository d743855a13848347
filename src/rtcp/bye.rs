use crate::rtcp::{
    common_header::{CommonHeader, finalize_length},
    packet_type::{PT_BYE, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

use super::report_block::read_u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bye {
    pub sources: Vec<u32>,
    pub reason: Option<String>,
}

impl RtcpPacketType for Bye {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.sources.len() >= 31 {
            return Err(RtcpError::TooManyByeSources(self.sources.len()));
        }
        let start = out.len();
        let hdr = CommonHeader::new(self.sources.len() as u8, PT_BYE, false);
        hdr.encode_into(out);
        for ssrc in &self.sources {
            out.extend_from_slice(&ssrc.to_be_bytes());
        }
        if let Some(reason) = &self.reason {
            let rbytes = reason.as_bytes();
            if rbytes.len() > u8::MAX as usize {
                return Err(RtcpError::SdesItemTooLong);
            }
            out.push(rbytes.len() as u8);
            out.extend_from_slice(rbytes);
        }
        finalize_length(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        // First rc_or_fmt 5 bits indicate SSRC/CSRC count
        let sc = hdr.rc_or_fmt() as usize;
        if payload.len() < sc * 4 {
            return Err(RtcpError::Truncated);
        }
        let mut sources = Vec::with_capacity(sc);
        let mut idx = 0usize;
        for _ in 0..sc {
            sources.push(read_u32(payload, idx)?);
            idx += 4;
        }
        let reason = if payload.len() > idx {
            let len = payload[idx] as usize;
            idx += 1;
            if payload.len() < idx + len {
                return Err(RtcpError::Truncated);
            }
            Some(String::from_utf8_lossy(&payload[idx..idx + len]).into_owned())
        } else {
            None
        };
        Ok(RtcpPacket::Bye(Bye { sources, reason }))
    }
}

impl Bye {
    #[must_use]
    pub fn single(ssrc: u32, reason: Option<String>) -> Self {
        Self {
            sources: vec![ssrc],
            reason,
        }
    }
}
