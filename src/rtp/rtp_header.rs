use byteorder::{BigEndian, ByteOrder};

use crate::rtp::RTP_VERSION;
use crate::rtp::rtp_error::RtpError;
use crate::rtp::rtp_header_extension::RtpHeaderExtension;

/// RTP fixed header plus CSRC list and optional extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,      // must be 2
    pub padding: bool,    // P bit
    pub extension: bool,  // X bit
    pub marker: bool,     // M bit
    pub payload_type: u8, // 7 bits
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub header_extension: Option<RtpHeaderExtension>,
}

impl RtpHeader {
    #[must_use]
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs: Vec::new(),
            header_extension: None,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    #[must_use]
    pub fn with_csrcs(mut self, csrcs: Vec<u32>) -> Self {
        self.csrcs = csrcs;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, ext: Option<RtpHeaderExtension>) -> Self {
        self.extension = ext.is_some();
        self.header_extension = ext;
        self
    }

    /// Serialized header length in bytes.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        let mut len = 12 + self.csrcs.len() * 4;
        if let Some(ext) = &self.header_extension {
            len += 4 + ext.data.len().div_ceil(4) * 4;
        }
        len
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        let mut b0 = (self.version & 0x03) << 6;
        if self.padding {
            b0 |= 0x20;
        }
        if self.header_extension.is_some() {
            b0 |= 0x10;
        }
        b0 |= (self.csrcs.len() as u8) & 0x0F;
        out.push(b0);

        let mut b1 = self.payload_type & 0x7F;
        if self.marker {
            b1 |= 0x80;
        }
        out.push(b1);

        let mut tmp = [0u8; 4];
        BigEndian::write_u16(&mut tmp[..2], self.sequence_number);
        out.extend_from_slice(&tmp[..2]);
        BigEndian::write_u32(&mut tmp, self.timestamp);
        out.extend_from_slice(&tmp);
        BigEndian::write_u32(&mut tmp, self.ssrc);
        out.extend_from_slice(&tmp);

        for csrc in &self.csrcs {
            BigEndian::write_u32(&mut tmp, *csrc);
            out.extend_from_slice(&tmp);
        }

        if let Some(ext) = &self.header_extension {
            let words = ext.data.len().div_ceil(4);
            BigEndian::write_u16(&mut tmp[..2], ext.profile);
            out.extend_from_slice(&tmp[..2]);
            BigEndian::write_u16(&mut tmp[..2], words as u16);
            out.extend_from_slice(&tmp[..2]);
            out.extend_from_slice(&ext.data);
            out.extend(std::iter::repeat_n(0u8, words * 4 - ext.data.len()));
        }
    }

    /// Decodes the header, returning it plus the number of bytes consumed.
    ///
    /// # Errors
    /// Propagates malformed-header conditions.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RtpError> {
        if buf.len() < 12 {
            return Err(RtpError::TooShort);
        }
        let version = buf[0] >> 6;
        if version != RTP_VERSION {
            return Err(RtpError::BadVersion(version));
        }
        let padding = buf[0] & 0x20 != 0;
        let extension = buf[0] & 0x10 != 0;
        let cc = (buf[0] & 0x0F) as usize;
        let marker = buf[1] & 0x80 != 0;
        let payload_type = buf[1] & 0x7F;
        let sequence_number = BigEndian::read_u16(&buf[2..4]);
        let timestamp = BigEndian::read_u32(&buf[4..8]);
        let ssrc = BigEndian::read_u32(&buf[8..12]);

        let mut offset = 12;
        if buf.len() < offset + cc * 4 {
            return Err(RtpError::CsrcCountMismatch {
                expected: cc,
                buf_left: buf.len() - offset,
            });
        }
        let mut csrcs = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrcs.push(BigEndian::read_u32(&buf[offset..offset + 4]));
            offset += 4;
        }

        let header_extension = if extension {
            if buf.len() < offset + 4 {
                return Err(RtpError::HeaderExtensionTooShort);
            }
            let profile = BigEndian::read_u16(&buf[offset..offset + 2]);
            let words = BigEndian::read_u16(&buf[offset + 2..offset + 4]) as usize;
            offset += 4;
            if buf.len() < offset + words * 4 {
                return Err(RtpError::HeaderExtensionTooShort);
            }
            let data = buf[offset..offset + words * 4].to_vec();
            offset += words * 4;
            Some(RtpHeaderExtension {
                profile,
                data,
            })
        } else {
            None
        };

        Ok((
            Self {
                version,
                padding,
                extension,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
                csrcs,
                header_extension,
            },
            offset,
        ))
    }
}
