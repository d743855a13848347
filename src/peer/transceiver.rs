use std::sync::Arc;

use rand::Rng;
use rand::rngs::OsRng;

use crate::sdp::{Direction, MediaKind, RtpMap};
use crate::track::LocalTrack;

/// Pairs one media section with its local send state. The connection owns its
/// transceivers; the track stays owned by the application.
pub struct Transceiver {
    pub mid: String,
    pub kind: MediaKind,
    pub direction: Direction,
    /// SSRC this side sends with. Stable across renegotiation.
    pub ssrc: u32,
    pub cname: String,
    pub payload_type: u8,
    pub track: Option<Arc<LocalTrack>>,
    /// SSRC the peer announced for this section, once known.
    pub remote_ssrc: Option<u32>,
}

impl Transceiver {
    #[must_use]
    pub fn new(mid: String, kind: MediaKind, track: Option<Arc<LocalTrack>>) -> Self {
        let direction = if track.is_some() {
            Direction::SendRecv
        } else {
            Direction::RecvOnly
        };
        Self {
            mid,
            kind,
            direction,
            ssrc: OsRng.r#gen(),
            cname: format!("rtcmux-{:08x}", OsRng.r#gen::<u32>()),
            payload_type: default_rtp_map(kind).payload_type,
            track,
            remote_ssrc: None,
        }
    }
}

/// Payload mapping offered when the application did not specify one.
#[must_use]
pub fn default_rtp_map(kind: MediaKind) -> RtpMap {
    match kind {
        MediaKind::Audio => RtpMap {
            payload_type: 111,
            encoding: "opus".to_string(),
            clock_rate: 48000,
            channels: Some(2),
        },
        MediaKind::Video => RtpMap {
            payload_type: 96,
            encoding: "VP8".to_string(),
            clock_rate: 90000,
            channels: None,
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_direction_follows_track_presence_ok() {
        let with_track = Transceiver::new("0".into(), MediaKind::Audio, Some(LocalTrack::new(MediaKind::Audio)));
        assert_eq!(with_track.direction, Direction::SendRecv);
        assert_eq!(with_track.payload_type, 111);

        let recv_only = Transceiver::new("1".into(), MediaKind::Video, None);
        assert_eq!(recv_only.direction, Direction::RecvOnly);
        assert_eq!(recv_only.payload_type, 96);
    }
}
