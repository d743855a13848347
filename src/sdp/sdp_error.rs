use std::fmt;
use std::num::ParseIntError;

#[derive(Debug, PartialEq, Eq)]
pub enum SdpError {
    Missing(&'static str),
    Invalid(&'static str),
    ParseInt(ParseIntError),
    /// The answer does not line up with the offer's media sections.
    AnswerMismatch(&'static str),
    /// Offer and answer share no SRTP protection suite.
    NoCommonCryptoSuite,
    /// `a=group:BUNDLE` lists a mid no media section declares.
    UnknownBundleMid(String),
}

impl From<ParseIntError> for SdpError {
    fn from(e: ParseIntError) -> Self {
        Self::ParseInt(e)
    }
}

impl fmt::Display for SdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpError::Missing(msg) => write!(f, "Missing field: {}", msg),
            SdpError::Invalid(msg) => write!(f, "Invalid field: {}", msg),
            SdpError::ParseInt(e) => write!(f, "Parse int error: {}", e),
            SdpError::AnswerMismatch(msg) => write!(f, "Answer mismatch: {}", msg),
            SdpError::NoCommonCryptoSuite => write!(f, "No common SRTP crypto suite"),
            SdpError::UnknownBundleMid(mid) => {
                write!(f, "Bundle group references unknown mid: {}", mid)
            }
        }
    }
}

impl std::error::Error for SdpError {}
