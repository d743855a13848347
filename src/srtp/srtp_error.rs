use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SrtpError {
    /// Packet shorter than the minimum for its kind.
    PacketTooShort,
    /// Header extension length points past the packet end.
    BadExtensionHeader,
    /// Index already seen or older than the replay window.
    Replay { ssrc: u32, index: u64 },
    /// Truncated HMAC did not match.
    AuthTagMismatch,
    /// Master key material had the wrong length.
    BadKeyLength,
}

impl fmt::Display for SrtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrtpError::PacketTooShort => write!(f, "packet too short"),
            SrtpError::BadExtensionHeader => write!(f, "bad RTP extension header"),
            SrtpError::Replay { ssrc, index } => {
                write!(f, "replayed packet: ssrc={ssrc:#x} index={index}")
            }
            SrtpError::AuthTagMismatch => write!(f, "auth tag mismatch"),
            SrtpError::BadKeyLength => write!(f, "bad master key length"),
        }
    }
}

impl std::error::Error for SrtpError {}
