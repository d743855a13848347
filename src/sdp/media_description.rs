use std::fmt;
use std::str::FromStr;

use crate::ice::Candidate;
use crate::sdp::sdp_error::SdpError;
use crate::srtp::SrtpProfile;

/// Media type of an `m=` section. Only audio and video carry RTP here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = SdpError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            _ => Err(SdpError::Invalid("media kind")),
        }
    }
}

/// Direction attribute of a media section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    #[must_use]
    pub const fn attr_name(self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    #[must_use]
    pub fn from_attr_name(s: &str) -> Option<Self> {
        match s {
            "sendrecv" => Some(Self::SendRecv),
            "sendonly" => Some(Self::SendOnly),
            "recvonly" => Some(Self::RecvOnly),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    /// The direction as seen from the other peer.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            other => other,
        }
    }
}

/// `a=setup` value controlling which side becomes the DTLS client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setup {
    ActPass,
    Active,
    Passive,
}

impl Setup {
    #[must_use]
    pub const fn attr_value(self) -> &'static str {
        match self {
            Setup::ActPass => "actpass",
            Setup::Active => "active",
            Setup::Passive => "passive",
        }
    }

    #[must_use]
    pub fn from_attr_value(s: &str) -> Option<Self> {
        match s {
            "actpass" => Some(Self::ActPass),
            "active" => Some(Self::Active),
            "passive" => Some(Self::Passive),
            _ => None,
        }
    }
}

/// One `a=rtpmap` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

impl RtpMap {
    /// Parses the value of an `a=rtpmap:` attribute
    /// (`<pt> <encoding>/<clock>[/<channels>]`).
    ///
    /// # Errors
    /// `Invalid("rtpmap")` on any malformed part.
    pub fn parse(value: &str) -> Result<Self, SdpError> {
        let (pt, rest) = value
            .split_once(' ')
            .ok_or(SdpError::Invalid("rtpmap"))?;
        let payload_type = pt.parse::<u8>()?;
        let mut parts = rest.split('/');
        let encoding = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(SdpError::Invalid("rtpmap"))?
            .to_string();
        let clock_rate = parts
            .next()
            .ok_or(SdpError::Invalid("rtpmap"))?
            .parse::<u32>()?;
        let channels = match parts.next() {
            Some(c) => Some(c.parse::<u8>()?),
            None => None,
        };
        Ok(Self {
            payload_type,
            encoding,
            clock_rate,
            channels,
        })
    }
}

impl fmt::Display for RtpMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}",
            self.payload_type, self.encoding, self.clock_rate
        )?;
        if let Some(ch) = self.channels {
            write!(f, "/{}", ch)?;
        }
        Ok(())
    }
}

/// One `m=` section with its transport and media attributes.
#[derive(Debug, Clone)]
pub struct MediaDescription {
    pub kind: MediaKind,
    pub mid: String,
    pub direction: Direction,
    pub ice_ufrag: String,
    pub ice_pwd: String,
    pub fingerprint: Option<String>,
    pub setup: Option<Setup>,
    pub ssrc: Option<u32>,
    pub cname: Option<String>,
    pub rtp_maps: Vec<RtpMap>,
    pub crypto_suites: Vec<SrtpProfile>,
    pub candidates: Vec<Candidate>,
    pub rtcp_mux: bool,
}

impl MediaDescription {
    #[must_use]
    pub fn new(kind: MediaKind, mid: impl Into<String>) -> Self {
        Self {
            kind,
            mid: mid.into(),
            direction: Direction::SendRecv,
            ice_ufrag: String::new(),
            ice_pwd: String::new(),
            fingerprint: None,
            setup: None,
            ssrc: None,
            cname: None,
            rtp_maps: Vec::new(),
            crypto_suites: vec![SrtpProfile::Aes128CmSha1_80],
            candidates: Vec::new(),
            rtcp_mux: true,
        }
    }
}
