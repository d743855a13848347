use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::rngs::OsRng;

use crate::ice::Candidate;
use crate::sdp::media_description::{Direction, MediaDescription, MediaKind, RtpMap, Setup};
use crate::sdp::sdp_error::SdpError;
use crate::srtp::SrtpProfile;

pub(crate) fn push_crlf(out: &mut String, args: fmt::Arguments) {
    use std::fmt::Write as _;
    let _ = out.write_fmt(args);
    let _ = out.write_str("\r\n");
}

macro_rules! pushln {
    ($out:expr, $($arg:tt)*) => {
        push_crlf($out, format_args!($($arg)*))
    };
}

/// Whether a description plays the offer or answer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl FromStr for SdpType {
    type Err = SdpError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer" => Ok(Self::Offer),
            "answer" => Ok(Self::Answer),
            _ => Err(SdpError::Invalid("sdp type")),
        }
    }
}

/// A complete session description: the parsed form of one SDP blob.
#[derive(Debug, Clone)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub session_id: u64,
    pub session_version: u64,
    /// mids listed in `a=group:BUNDLE`.
    pub bundle: Vec<String>,
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    #[must_use]
    pub fn new(sdp_type: SdpType) -> Self {
        Self {
            sdp_type,
            // o= line wants a 62-bit-safe integer.
            session_id: OsRng.r#gen::<u64>() >> 2,
            session_version: 1,
            bundle: Vec::new(),
            media: Vec::new(),
        }
    }

    pub fn add_media(&mut self, media: MediaDescription) {
        self.bundle.push(media.mid.clone());
        self.media.push(media);
    }

    /// Renders the description with CRLF line endings.
    #[must_use]
    pub fn to_sdp_string(&self) -> String {
        let mut out = String::new();
        pushln!(&mut out, "v=0");
        pushln!(
            &mut out,
            "o=- {} {} IN IP4 0.0.0.0",
            self.session_id,
            self.session_version
        );
        pushln!(&mut out, "s=-");
        pushln!(&mut out, "t=0 0");
        if !self.bundle.is_empty() {
            pushln!(&mut out, "a=group:BUNDLE {}", self.bundle.join(" "));
        }
        pushln!(&mut out, "a=msid-semantic: WMS");

        for media in &self.media {
            let fmts = if media.rtp_maps.is_empty() {
                "96".to_string()
            } else {
                media
                    .rtp_maps
                    .iter()
                    .map(|m| m.payload_type.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            pushln!(&mut out, "m={} 9 UDP/TLS/RTP/SAVPF {}", media.kind, fmts);
            pushln!(&mut out, "c=IN IP4 0.0.0.0");
            pushln!(&mut out, "a=mid:{}", media.mid);
            pushln!(&mut out, "a=ice-ufrag:{}", media.ice_ufrag);
            pushln!(&mut out, "a=ice-pwd:{}", media.ice_pwd);
            if let Some(fp) = &media.fingerprint {
                pushln!(&mut out, "a=fingerprint:sha-256 {}", fp);
            }
            if let Some(setup) = media.setup {
                pushln!(&mut out, "a=setup:{}", setup.attr_value());
            }
            pushln!(&mut out, "a={}", media.direction.attr_name());
            if media.rtcp_mux {
                pushln!(&mut out, "a=rtcp-mux");
            }
            for (i, suite) in media.crypto_suites.iter().enumerate() {
                pushln!(&mut out, "a=crypto:{} {}", i + 1, suite.sdp_name());
            }
            for map in &media.rtp_maps {
                pushln!(&mut out, "a=rtpmap:{}", map);
            }
            if let Some(ssrc) = media.ssrc {
                let cname = media.cname.as_deref().unwrap_or("-");
                pushln!(&mut out, "a=ssrc:{} cname:{}", ssrc, cname);
            }
            for cand in &media.candidates {
                pushln!(&mut out, "a={}", cand.to_sdp_value());
            }
            if !media.candidates.is_empty() {
                pushln!(&mut out, "a=end-of-candidates");
            }
        }
        out
    }

    /// Parses one SDP blob.
    ///
    /// Session-level `ice-ufrag`, `ice-pwd` and `fingerprint` attributes are
    /// applied as defaults to media sections that lack their own.
    ///
    /// # Errors
    /// Fails on malformed lines, media sections without ICE credentials, or
    /// a BUNDLE group naming a mid no media section declares.
    pub fn parse(sdp_type: SdpType, text: &str) -> Result<Self, SdpError> {
        let mut desc = Self {
            sdp_type,
            session_id: 0,
            session_version: 0,
            bundle: Vec::new(),
            media: Vec::new(),
        };
        let mut session_ufrag = String::new();
        let mut session_pwd = String::new();
        let mut session_fingerprint: Option<String> = None;
        let mut current: Option<MediaDescription> = None;

        for raw in text.lines() {
            let line = raw.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or(SdpError::Invalid("line"))?;

            match key {
                "o" => {
                    let mut parts = value.split_whitespace();
                    let _username = parts.next();
                    if let Some(sid) = parts.next() {
                        desc.session_id = sid.parse().unwrap_or(0);
                    }
                    if let Some(ver) = parts.next() {
                        desc.session_version = ver.parse().unwrap_or(0);
                    }
                }
                "m" => {
                    if let Some(done) = current.take() {
                        desc.media.push(done);
                    }
                    let kind_tok = value
                        .split_whitespace()
                        .next()
                        .ok_or(SdpError::Invalid("m line"))?;
                    let kind = MediaKind::from_str(kind_tok)?;
                    let mut media = MediaDescription::new(kind, "");
                    media.crypto_suites.clear();
                    media.rtcp_mux = false;
                    current = Some(media);
                }
                "a" => {
                    let (name, attr_value) = match value.split_once(':') {
                        Some((n, v)) => (n, v),
                        None => (value, ""),
                    };
                    match current.as_mut() {
                        None => Self::apply_session_attr(
                            name,
                            attr_value,
                            &mut desc,
                            &mut session_ufrag,
                            &mut session_pwd,
                            &mut session_fingerprint,
                        ),
                        Some(media) => Self::apply_media_attr(name, attr_value, media)?,
                    }
                }
                // v=, s=, t=, c=, b= carry nothing we model.
                _ => {}
            }
        }
        if let Some(done) = current.take() {
            desc.media.push(done);
        }

        for media in &mut desc.media {
            if media.ice_ufrag.is_empty() {
                media.ice_ufrag = session_ufrag.clone();
            }
            if media.ice_pwd.is_empty() {
                media.ice_pwd = session_pwd.clone();
            }
            if media.fingerprint.is_none() {
                media.fingerprint = session_fingerprint.clone();
            }
            if media.ice_ufrag.is_empty() || media.ice_pwd.is_empty() {
                return Err(SdpError::Missing("ice credentials"));
            }
        }
        for tag in &desc.bundle {
            if !desc.media.iter().any(|m| &m.mid == tag) {
                return Err(SdpError::UnknownBundleMid(tag.clone()));
            }
        }
        Ok(desc)
    }

    fn apply_session_attr(
        name: &str,
        value: &str,
        desc: &mut SessionDescription,
        ufrag: &mut String,
        pwd: &mut String,
        fingerprint: &mut Option<String>,
    ) {
        match name {
            "group" => {
                let mut parts = value.split_whitespace();
                if parts.next() == Some("BUNDLE") {
                    desc.bundle = parts.map(str::to_string).collect();
                }
            }
            "ice-ufrag" => *ufrag = value.to_string(),
            "ice-pwd" => *pwd = value.to_string(),
            "fingerprint" => {
                if let Some(("sha-256", fp)) = value.split_once(' ') {
                    *fingerprint = Some(fp.to_string());
                }
            }
            _ => {}
        }
    }

    fn apply_media_attr(
        name: &str,
        value: &str,
        media: &mut MediaDescription,
    ) -> Result<(), SdpError> {
        match name {
            "mid" => media.mid = value.to_string(),
            "ice-ufrag" => media.ice_ufrag = value.to_string(),
            "ice-pwd" => media.ice_pwd = value.to_string(),
            "fingerprint" => {
                if let Some(("sha-256", fp)) = value.split_once(' ') {
                    media.fingerprint = Some(fp.to_string());
                }
            }
            "setup" => {
                media.setup =
                    Some(Setup::from_attr_value(value).ok_or(SdpError::Invalid("setup"))?);
            }
            "rtcp-mux" => media.rtcp_mux = true,
            "rtpmap" => media.rtp_maps.push(RtpMap::parse(value)?),
            "crypto" => {
                if let Some((_tag, suite)) = value.split_once(' ') {
                    if let Some(profile) = SrtpProfile::from_sdp_name(suite.trim()) {
                        media.crypto_suites.push(profile);
                    }
                }
            }
            "ssrc" => {
                let mut parts = value.split_whitespace();
                if let Some(ssrc_tok) = parts.next() {
                    media.ssrc = Some(ssrc_tok.parse()?);
                }
                if let Some(cname) = parts.next().and_then(|p| p.strip_prefix("cname:")) {
                    media.cname = Some(cname.to_string());
                }
            }
            "candidate" => {
                if let Some(cand) = Candidate::from_sdp_value(value) {
                    media.candidates.push(cand);
                }
            }
            name => {
                if let Some(dir) = Direction::from_attr_name(name) {
                    media.direction = dir;
                }
            }
        }
        Ok(())
    }
}

/// Checks that an answer lines up with the offer it responds to: same number
/// of media sections, in the same order, with matching kind and mid, and no
/// crypto suite the offer did not carry.
///
/// # Errors
/// `AnswerMismatch` naming the first divergence.
pub fn validate_answer(
    offer: &SessionDescription,
    answer: &SessionDescription,
) -> Result<(), SdpError> {
    if offer.media.len() != answer.media.len() {
        return Err(SdpError::AnswerMismatch("media section count"));
    }
    for (o, a) in offer.media.iter().zip(answer.media.iter()) {
        if o.kind != a.kind {
            return Err(SdpError::AnswerMismatch("media kind"));
        }
        if o.mid != a.mid {
            return Err(SdpError::AnswerMismatch("mid"));
        }
        if a.crypto_suites
            .iter()
            .any(|suite| !o.crypto_suites.contains(suite))
        {
            return Err(SdpError::AnswerMismatch("crypto suite"));
        }
    }
    Ok(())
}

/// Picks the first local suite the remote also offers.
///
/// # Errors
/// `NoCommonCryptoSuite` when the intersection is empty.
pub fn negotiate_crypto(
    local: &[SrtpProfile],
    remote: &[SrtpProfile],
) -> Result<SrtpProfile, SdpError> {
    local
        .iter()
        .find(|suite| remote.contains(suite))
        .copied()
        .ok_or(SdpError::NoCommonCryptoSuite)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn mock_media(kind: MediaKind, mid: &str) -> MediaDescription {
        let mut media = MediaDescription::new(kind, mid);
        media.ice_ufrag = "ufrag".into();
        media.ice_pwd = "averylongpasswordvalue01".into();
        media.fingerprint = Some("AA:BB".into());
        media.setup = Some(Setup::ActPass);
        media.ssrc = Some(0x1234);
        media.cname = Some("cname-x".into());
        media.rtp_maps.push(RtpMap {
            payload_type: 111,
            encoding: "opus".into(),
            clock_rate: 48000,
            channels: Some(2),
        });
        media
            .candidates
            .push(Candidate::host("10.0.0.1:5000".parse().unwrap(), 1));
        media
    }

    #[test]
    fn test_render_parse_roundtrip_ok() {
        let mut desc = SessionDescription::new(SdpType::Offer);
        desc.add_media(mock_media(MediaKind::Audio, "0"));
        desc.add_media(mock_media(MediaKind::Video, "1"));

        let text = desc.to_sdp_string();
        assert!(text.contains("a=group:BUNDLE 0 1\r\n"));
        assert!(text.contains("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"));
        assert!(text.contains("a=crypto:1 AES_CM_128_HMAC_SHA1_80\r\n"));

        let back = SessionDescription::parse(SdpType::Offer, &text).unwrap();
        assert_eq!(back.bundle, vec!["0", "1"]);
        assert_eq!(back.media.len(), 2);
        let audio = &back.media[0];
        assert_eq!(audio.kind, MediaKind::Audio);
        assert_eq!(audio.mid, "0");
        assert_eq!(audio.ice_ufrag, "ufrag");
        assert_eq!(audio.fingerprint.as_deref(), Some("AA:BB"));
        assert_eq!(audio.setup, Some(Setup::ActPass));
        assert_eq!(audio.ssrc, Some(0x1234));
        assert_eq!(audio.cname.as_deref(), Some("cname-x"));
        assert_eq!(audio.crypto_suites, vec![SrtpProfile::Aes128CmSha1_80]);
        assert_eq!(audio.candidates.len(), 1);
        assert!(audio.rtcp_mux);
    }

    #[test]
    fn test_parse_session_level_credentials_apply_ok() {
        let text = concat!(
            "v=0\r\n",
            "o=- 42 2 IN IP4 0.0.0.0\r\n",
            "s=-\r\n",
            "t=0 0\r\n",
            "a=ice-ufrag:sess\r\n",
            "a=ice-pwd:sesspwd\r\n",
            "a=fingerprint:sha-256 CC:DD\r\n",
            "m=audio 9 UDP/TLS/RTP/SAVPF 0\r\n",
            "a=mid:0\r\n",
            "a=sendrecv\r\n",
        );
        let desc = SessionDescription::parse(SdpType::Offer, text).unwrap();
        assert_eq!(desc.session_id, 42);
        assert_eq!(desc.media[0].ice_ufrag, "sess");
        assert_eq!(desc.media[0].ice_pwd, "sesspwd");
        assert_eq!(desc.media[0].fingerprint.as_deref(), Some("CC:DD"));
    }

    #[test]
    fn test_parse_missing_credentials_error() {
        let text = concat!(
            "v=0\r\n",
            "m=audio 9 UDP/TLS/RTP/SAVPF 0\r\n",
            "a=mid:0\r\n",
        );
        assert_eq!(
            SessionDescription::parse(SdpType::Offer, text).unwrap_err(),
            SdpError::Missing("ice credentials")
        );
    }

    #[test]
    fn test_parse_bundle_with_unknown_mid_error() {
        let text = concat!(
            "v=0\r\n",
            "o=- 7 1 IN IP4 0.0.0.0\r\n",
            "s=-\r\n",
            "t=0 0\r\n",
            "a=group:BUNDLE 0 notamid\r\n",
            "m=audio 9 UDP/TLS/RTP/SAVPF 0\r\n",
            "a=mid:0\r\n",
            "a=ice-ufrag:ufrag\r\n",
            "a=ice-pwd:averylongpasswordvalue01\r\n",
            "a=sendrecv\r\n",
        );
        assert_eq!(
            SessionDescription::parse(SdpType::Offer, text).unwrap_err(),
            SdpError::UnknownBundleMid("notamid".into())
        );
    }

    #[test]
    fn test_validate_answer_unoffered_crypto_suite_error() {
        let mut offer = SessionDescription::new(SdpType::Offer);
        let mut offered = mock_media(MediaKind::Audio, "0");
        offered.crypto_suites.clear();
        offer.add_media(offered);

        let mut answer = SessionDescription::new(SdpType::Answer);
        answer.add_media(mock_media(MediaKind::Audio, "0"));
        assert_eq!(
            validate_answer(&offer, &answer).unwrap_err(),
            SdpError::AnswerMismatch("crypto suite")
        );
    }

    #[test]
    fn test_validate_answer_positional_mismatch_error() {
        let mut offer = SessionDescription::new(SdpType::Offer);
        offer.add_media(mock_media(MediaKind::Audio, "0"));
        offer.add_media(mock_media(MediaKind::Video, "1"));

        let mut swapped = SessionDescription::new(SdpType::Answer);
        swapped.add_media(mock_media(MediaKind::Video, "1"));
        swapped.add_media(mock_media(MediaKind::Audio, "0"));
        assert_eq!(
            validate_answer(&offer, &swapped).unwrap_err(),
            SdpError::AnswerMismatch("media kind")
        );

        let mut short = SessionDescription::new(SdpType::Answer);
        short.add_media(mock_media(MediaKind::Audio, "0"));
        assert_eq!(
            validate_answer(&offer, &short).unwrap_err(),
            SdpError::AnswerMismatch("media section count")
        );

        let mut good = SessionDescription::new(SdpType::Answer);
        good.add_media(mock_media(MediaKind::Audio, "0"));
        good.add_media(mock_media(MediaKind::Video, "1"));
        assert!(validate_answer(&offer, &good).is_ok());
    }

    #[test]
    fn test_negotiate_crypto_ok_and_error() {
        let both = [SrtpProfile::Aes128CmSha1_80];
        assert_eq!(
            negotiate_crypto(&both, &both).unwrap(),
            SrtpProfile::Aes128CmSha1_80
        );
        assert_eq!(
            negotiate_crypto(&both, &[]).unwrap_err(),
            SdpError::NoCommonCryptoSuite
        );
    }
}
