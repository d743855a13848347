use crate::rtp::rtp_error::RtpError;
use crate::rtp::rtp_header::RtpHeader;

/// Complete RTP packet (header + payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    /// Payload without any trailing padding bytes. If padding was present,
    /// `padding_bytes` records how much was removed during decode.
    pub payload: Vec<u8>,
    /// Count of padding bytes (from the last byte) if the P bit was set.
    pub padding_bytes: u8,
}

impl RtpPacket {
    #[must_use]
    pub fn new(header: RtpHeader, payload: Vec<u8>) -> Self {
        Self {
            header,
            payload,
            padding_bytes: 0,
        }
    }

    /// Convenience constructor.
    #[must_use]
    pub fn simple(
        payload_type: u8,
        marker: bool,
        seq: u16,
        ts: u32,
        ssrc: u32,
        payload: Vec<u8>,
    ) -> Self {
        let header = RtpHeader::new(payload_type, seq, ts, ssrc).with_marker(marker);
        Self::new(header, payload)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.wire_len() + self.payload.len());
        self.header.encode_into(&mut out);
        out.extend_from_slice(&self.payload);
        out
    }

    /// # Errors
    /// Propagates header decode errors; `PaddingTooShort` when the P bit
    /// claims more padding than the payload holds.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpError> {
        let (header, header_len) = RtpHeader::decode(buf)?;
        let mut payload = buf[header_len..].to_vec();

        let padding_bytes = if header.padding {
            let Some(&count) = payload.last() else {
                return Err(RtpError::PaddingTooShort);
            };
            if count as usize > payload.len() {
                return Err(RtpError::PaddingTooShort);
            }
            payload.truncate(payload.len() - count as usize);
            count
        } else {
            0
        };

        Ok(Self {
            header,
            payload,
            padding_bytes,
        })
    }
}
