use crate::srtp::SrtpEndpointKeys;

/// Protection profile negotiated in SDP and via the DTLS use_srtp extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpProfile {
    Aes128CmSha1_80,
}

impl SrtpProfile {
    /// Name used in `a=crypto` SDP attributes.
    #[must_use]
    pub const fn sdp_name(self) -> &'static str {
        match self {
            SrtpProfile::Aes128CmSha1_80 => "AES_CM_128_HMAC_SHA1_80",
        }
    }

    /// Name used in the DTLS use_srtp extension.
    #[must_use]
    pub const fn dtls_name(self) -> &'static str {
        match self {
            SrtpProfile::Aes128CmSha1_80 => "SRTP_AES128_CM_SHA1_80",
        }
    }

    #[must_use]
    pub fn from_sdp_name(name: &str) -> Option<Self> {
        match name {
            "AES_CM_128_HMAC_SHA1_80" => Some(SrtpProfile::Aes128CmSha1_80),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SrtpSessionConfig {
    pub profile: SrtpProfile,
    pub outbound: SrtpEndpointKeys,
    pub inbound: SrtpEndpointKeys,
}
