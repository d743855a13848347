//! Two peer connections negotiating and exchanging media fully in-process
//! over the loopback interface. SDP travels as text, everything else over
//! real UDP sockets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use rtcmux::config::RtcConfig;
use rtcmux::error::RtcError;
use rtcmux::log::noop_log_sink::NoopLogSink;
use rtcmux::peer::{PeerConnection, PeerConnectionState, PeerEvent};
use rtcmux::rtcp::{PictureLossIndication, ReceiverReport, RtcpPacket};
use rtcmux::rtp::RtpPacket;
use rtcmux::sdp::{MediaKind, SdpType, SessionDescription};
use rtcmux::track::{LocalTrack, MediaTrack, RemoteTrack};

fn test_config() -> RtcConfig {
    RtcConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ice_check_pacing: Duration::from_millis(10),
        ice_initial_rto: Duration::from_millis(100),
        ice_connect_timeout: Duration::from_secs(8),
        dtls_retransmit_base: Duration::from_millis(150),
        ..RtcConfig::default()
    }
}

fn new_peer() -> (PeerConnection, Receiver<PeerEvent>) {
    let mut pc = PeerConnection::new(test_config(), Arc::new(NoopLogSink)).unwrap();
    let events = pc.take_events().unwrap();
    (pc, events)
}

/// Drains events until the connection is up, collecting remote tracks.
fn pump_until_connected(rx: &Receiver<PeerEvent>, want_tracks: usize) -> Vec<RemoteTrack> {
    let mut tracks = Vec::new();
    let mut connected = false;
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline && !(connected && tracks.len() >= want_tracks) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(PeerEvent::Track(track)) => tracks.push(track),
            Ok(PeerEvent::ConnectionStateChange(PeerConnectionState::Connected)) => {
                connected = true;
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    assert!(connected, "connection never reached Connected");
    assert!(
        tracks.len() >= want_tracks,
        "expected {} remote tracks, got {}",
        want_tracks,
        tracks.len()
    );
    tracks
}

#[test]
fn test_loopback_media_round_trip_ok() {
    let (mut offerer, offerer_events) = new_peer();
    let (mut answerer, answerer_events) = new_peer();

    let audio = LocalTrack::new(MediaKind::Audio);
    offerer
        .add_transceiver(MediaKind::Audio, Some(audio.clone()))
        .unwrap();
    offerer.add_transceiver(MediaKind::Video, None).unwrap();

    // Offer/answer exchanged as SDP text, exercising the full codec path.
    let offer = offerer.create_offer().unwrap();
    let offer_text = offer.to_sdp_string();
    offerer.set_local_description(offer).unwrap();
    answerer
        .set_remote_description(SessionDescription::parse(SdpType::Offer, &offer_text).unwrap())
        .unwrap();

    let answer = answerer.create_answer().unwrap();
    let answer_text = answer.to_sdp_string();
    answerer.set_local_description(answer).unwrap();
    offerer
        .set_remote_description(SessionDescription::parse(SdpType::Answer, &answer_text).unwrap())
        .unwrap();

    let answerer_tracks = pump_until_connected(&answerer_events, 2);
    pump_until_connected(&offerer_events, 0);

    let audio_rx = answerer_tracks
        .iter()
        .find(|t| t.kind() == MediaKind::Audio)
        .expect("audio track on the answerer");
    let video_rx = answerer_tracks
        .iter()
        .find(|t| t.kind() == MediaKind::Video)
        .expect("video track on the answerer");

    let packet = RtpPacket::simple(0, false, 0, 100, 0, b"this is a packet".to_vec());
    let mut received = None;
    for _ in 0..5 {
        audio.send(packet.clone()).unwrap();
        if let Ok(got) = audio_rx.recv_timeout(Duration::from_millis(500)) {
            received = Some(got);
            break;
        }
    }
    let got = received.expect("no RTP packet arrived on the audio track");
    assert_eq!(got.header.timestamp, 100);
    assert_eq!(got.payload, b"this is a packet");
    assert_eq!(Some(got.header.ssrc), audio_rx.ssrc());

    // Nothing may leak onto the other section's track.
    assert!(video_rx.try_recv().is_none());

    // Locally built RTCP travels the same encrypted bundle and surfaces as
    // an event on the far side.
    let compound = vec![
        RtcpPacket::Rr(ReceiverReport::new(got.header.ssrc, Vec::new())),
        RtcpPacket::Pli(PictureLossIndication::new(got.header.ssrc, got.header.ssrc)),
    ];
    offerer.send_rtcp(&compound).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut rtcp = None;
    while Instant::now() < deadline && rtcp.is_none() {
        match answerer_events.recv_timeout(Duration::from_millis(200)) {
            Ok(PeerEvent::Rtcp(packets)) => rtcp = Some(packets),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                offerer.send_rtcp(&compound).unwrap();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    assert_eq!(rtcp.expect("no RTCP arrived at the answerer"), compound);

    offerer.close();
    answerer.close();
    assert_eq!(offerer.connection_state(), PeerConnectionState::Closed);
    assert!(matches!(
        audio.send(packet),
        Err(RtcError::InvalidState(_))
    ));
}

#[test]
fn test_loopback_signaling_round_trip_preserves_semantics_ok() {
    let (mut offerer, _events) = new_peer();
    offerer.add_transceiver(MediaKind::Audio, None).unwrap();
    offerer.add_transceiver(MediaKind::Video, None).unwrap();

    let offer = offerer.create_offer().unwrap();
    let reparsed =
        SessionDescription::parse(SdpType::Offer, &offer.to_sdp_string()).unwrap();

    assert_eq!(reparsed.bundle, offer.bundle);
    assert_eq!(reparsed.media.len(), offer.media.len());
    for (a, b) in offer.media.iter().zip(reparsed.media.iter()) {
        assert_eq!(a.mid, b.mid);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.ice_ufrag, b.ice_ufrag);
        assert_eq!(a.ice_pwd, b.ice_pwd);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.ssrc, b.ssrc);
    }
    offerer.close();
}
