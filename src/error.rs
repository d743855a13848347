use core::fmt;

use crate::{
    dtls::dtls_error::DtlsError, ice::ice_error::IceError, rtcp::RtcpError,
    sdp::sdp_error::SdpError, srtp::srtp_error::SrtpError,
};

/// Aggregate error for the public PeerConnection API.
#[derive(Debug)]
pub enum RtcError {
    Sdp(SdpError),
    /// An API call arrived in a signaling state that does not allow it.
    InvalidState(String),
    Ice(IceError),
    Dtls(DtlsError),
    Srtp(SrtpError),
    Rtcp(RtcpError),
    /// The underlying socket failed or the connection was closed.
    TransportClosed,
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtcError::Sdp(e) => write!(f, "SDP error: {}", e),
            RtcError::InvalidState(s) => write!(f, "invalid state: {}", s),
            RtcError::Ice(e) => write!(f, "ICE error: {}", e),
            RtcError::Dtls(e) => write!(f, "DTLS error: {}", e),
            RtcError::Srtp(e) => write!(f, "SRTP error: {}", e),
            RtcError::Rtcp(e) => write!(f, "RTCP error: {}", e),
            RtcError::TransportClosed => write!(f, "transport closed"),
        }
    }
}

impl std::error::Error for RtcError {}

impl From<SdpError> for RtcError {
    fn from(e: SdpError) -> Self {
        RtcError::Sdp(e)
    }
}
impl From<IceError> for RtcError {
    fn from(e: IceError) -> Self {
        RtcError::Ice(e)
    }
}
impl From<DtlsError> for RtcError {
    fn from(e: DtlsError) -> Self {
        RtcError::Dtls(e)
    }
}
impl From<SrtpError> for RtcError {
    fn from(e: SrtpError) -> Self {
        RtcError::Srtp(e)
    }
}
impl From<RtcpError> for RtcError {
    fn from(e: RtcpError) -> Self {
        RtcError::Rtcp(e)
    }
}
