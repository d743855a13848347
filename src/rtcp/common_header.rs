use super::{RTCP_VERSION, rtcp_error::RtcpError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonHeader {
    version: u8,       // 2
    padding: bool,     // P
    rc_or_fmt: u8,     // 5 bits (report count or FMT)
    pt: u8,            // packet type
    length_words: u16, // number of 32-bit words minus one
}

impl CommonHeader {
    #[must_use]
    pub fn new(rc_or_fmt: u8, pt: u8, padding: bool) -> Self {
        Self {
            version: RTCP_VERSION,
            padding,
            rc_or_fmt,
            pt,
            length_words: 0,
        }
    }

    /// Decodes the header; returns it plus the packet's total byte length.
    ///
    /// # Errors
    /// `TooShort` when the buffer cannot hold the declared length.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RtcpError> {
        if buf.len() < 4 {
            return Err(RtcpError::TooShort);
        }
        let vprc = buf[0];
        let version = vprc >> 6;
        if version != RTCP_VERSION {
            return Err(RtcpError::BadVersion(version));
        }
        let padding = ((vprc >> 5) & 1) != 0;
        let rc_or_fmt = vprc & 0x1F;
        let pt = buf[1];
        let length_words =
            u16::from_be_bytes(buf[2..4].try_into().map_err(|_| RtcpError::TooShort)?);

        let total_bytes = ((length_words as usize) + 1) * 4;
        if buf.len() < total_bytes {
            return Err(RtcpError::TooShort);
        }

        Ok((
            Self {
                version,
                padding,
                rc_or_fmt,
                pt,
                length_words,
            },
            total_bytes,
        ))
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let vprc = (self.version & 0b11) << 6 | (self.padding as u8) << 5 | (self.rc_or_fmt & 0x1F);
        out.push(vprc);
        out.push(self.pt);
        out.extend_from_slice(&self.length_words.to_be_bytes());
    }

    #[must_use]
    pub fn padding(&self) -> bool {
        self.padding
    }

    #[must_use]
    pub fn rc_or_fmt(&self) -> u8 {
        self.rc_or_fmt
    }

    #[must_use]
    pub fn pt(&self) -> u8 {
        self.pt
    }

    #[must_use]
    pub fn length_words(&self) -> u16 {
        self.length_words
    }
}

/// Pads `out` to a 32-bit boundary and patches the length field of the
/// packet that started at `start`.
pub(crate) fn finalize_length(out: &mut Vec<u8>, start: usize) {
    let pad = (4 - (out.len() - start) % 4) % 4;
    if pad != 0 {
        out.extend(std::iter::repeat_n(0u8, pad));
    }
    let len_words = (out.len() - start) / 4 - 1;
    out[start + 2] = ((len_words >> 8) & 0xFF) as u8;
    out[start + 3] = (len_words & 0xFF) as u8;
}
