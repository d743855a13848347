use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunError {
    TooShort,
    InvalidMagicCookie,
    UnknownClass(u16),
    AttributeTruncated,
    BadAddressFamily(u8),
    IntegrityMissing,
    IntegrityMismatch,
    FingerprintMismatch,
}

impl fmt::Display for StunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StunError::*;
        match self {
            TooShort => write!(f, "STUN message too short"),
            InvalidMagicCookie => write!(f, "invalid STUN magic cookie"),
            UnknownClass(t) => write!(f, "unknown STUN message type: {t:#06x}"),
            AttributeTruncated => write!(f, "truncated STUN attribute"),
            BadAddressFamily(fam) => write!(f, "bad address family: {fam}"),
            IntegrityMissing => write!(f, "MESSAGE-INTEGRITY attribute missing"),
            IntegrityMismatch => write!(f, "MESSAGE-INTEGRITY verification failed"),
            FingerprintMismatch => write!(f, "FINGERPRINT verification failed"),
        }
    }
}

impl std::error::Error for StunError {}
