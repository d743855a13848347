use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use hmac::Mac;
use std::collections::HashMap;
use std::sync::Arc;

use crate::log::log_sink::LogSink;
use crate::srtp::SrtpEndpointKeys;
use crate::srtp::constants::{
    AUTH_TAG_LEN, SRTCP_E_FLAG, SRTCP_INDEX_LEN, SRTCP_LABEL_AUTH, SRTCP_LABEL_ENCRYPTION,
    SRTCP_LABEL_SALT, SRTP_LABEL_AUTH, SRTP_LABEL_ENCRYPTION, SRTP_LABEL_SALT,
};
use crate::srtp::replay_window::ReplayWindow;
use crate::srtp::session_keys::SessionKeys;
use crate::srtp::srtp_error::SrtpError;
use crate::srtp::utils::{
    Aes128Ctr, HmacSha1, compute_iv, constant_time_eq, derive_session_keys, get_rtp_header_len,
};
use crate::{sink_debug, sink_trace, sink_warn};

const SRTCP_HEADER_LEN: usize = 8;
const SRTCP_INDEX_MASK: u32 = 0x7FFF_FFFF;

/// One direction of SRTP/SRTCP protection.
///
/// A connection holds two contexts built from the DTLS-exported keys: one for
/// packets it sends and one for packets it receives.
pub struct SrtpContext {
    logger: Arc<dyn LogSink>,
    rtp_keys: SessionKeys,
    rtcp_keys: SessionKeys,
    rocs: HashMap<u32, u32>,
    last_seqs: HashMap<u32, u16>,
    replay_windows: HashMap<u32, ReplayWindow>,
    rtcp_replay_windows: HashMap<u32, ReplayWindow>,
    rtcp_index: u32,
    auth_failures: u64,
}

impl SrtpContext {
    /// Derives RTP and RTCP session keys from one endpoint's master keys.
    ///
    /// # Errors
    /// `BadKeyLength` if the master key or salt has the wrong size.
    pub fn new(logger: Arc<dyn LogSink>, master_keys: &SrtpEndpointKeys) -> Result<Self, SrtpError> {
        let rtp_keys = derive_session_keys(
            master_keys,
            (SRTP_LABEL_ENCRYPTION, SRTP_LABEL_AUTH, SRTP_LABEL_SALT),
        )?;
        let rtcp_keys = derive_session_keys(
            master_keys,
            (SRTCP_LABEL_ENCRYPTION, SRTCP_LABEL_AUTH, SRTCP_LABEL_SALT),
        )?;

        sink_debug!(logger, "[SRTP] Session keys derived");

        Ok(Self {
            logger,
            rtp_keys,
            rtcp_keys,
            rocs: HashMap::new(),
            last_seqs: HashMap::new(),
            replay_windows: HashMap::new(),
            rtcp_replay_windows: HashMap::new(),
            rtcp_index: 0,
            auth_failures: 0,
        })
    }

    /// Total SRTP/SRTCP authentication failures seen by this context.
    #[must_use]
    pub fn auth_failures(&self) -> u64 {
        self.auth_failures
    }

    /// Encrypts and authenticates one RTP packet.
    ///
    /// # Errors
    /// `PacketTooShort` / `BadExtensionHeader` on malformed input.
    pub fn protect(&mut self, packet: &[u8]) -> Result<Vec<u8>, SrtpError> {
        if packet.len() < 12 {
            return Err(SrtpError::PacketTooShort);
        }

        let seq = BigEndian::read_u16(&packet[2..4]);
        let ssrc = BigEndian::read_u32(&packet[8..12]);
        let roc = self.get_or_create_roc(ssrc, seq);
        let index = (u64::from(roc) << 16) | u64::from(seq);

        let header_len = get_rtp_header_len(packet)?;
        let mut out = packet.to_vec();

        let iv = compute_iv(&self.rtp_keys.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&self.rtp_keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut out[header_len..]);

        let tag = self.rtp_tag(&out, roc)?;
        out.extend_from_slice(&tag);

        sink_trace!(
            self.logger,
            "[SRTP] Protected: ssrc={:#x} seq={} roc={} len={}",
            ssrc,
            seq,
            roc,
            out.len()
        );
        Ok(out)
    }

    /// Verifies, replay-checks and decrypts one SRTP packet.
    ///
    /// # Errors
    /// `AuthTagMismatch` (counted), `Replay`, or a malformed-packet error.
    pub fn unprotect(&mut self, packet: &[u8]) -> Result<Vec<u8>, SrtpError> {
        if packet.len() < 12 + AUTH_TAG_LEN {
            return Err(SrtpError::PacketTooShort);
        }

        let tag_start = packet.len() - AUTH_TAG_LEN;
        let (content, received_tag) = packet.split_at(tag_start);

        let seq = BigEndian::read_u16(&content[2..4]);
        let ssrc = BigEndian::read_u32(&content[8..12]);

        let roc = self.estimate_roc(ssrc, seq);
        let index = (u64::from(roc) << 16) | u64::from(seq);

        if self
            .replay_windows
            .entry(ssrc)
            .or_insert_with(ReplayWindow::new)
            .is_replay(index)
        {
            sink_warn!(
                self.logger,
                "[SRTP] Replay: ssrc={:#x} seq={} index={}",
                ssrc,
                seq,
                index
            );
            return Err(SrtpError::Replay { ssrc, index });
        }

        let computed_tag = self.rtp_tag(content, roc)?;
        if !constant_time_eq(&computed_tag, received_tag) {
            self.auth_failures += 1;
            sink_warn!(
                self.logger,
                "[SRTP] Auth tag mismatch: ssrc={:#x} seq={} (failure #{})",
                ssrc,
                seq,
                self.auth_failures
            );
            return Err(SrtpError::AuthTagMismatch);
        }

        let mut out = content.to_vec();
        let header_len = get_rtp_header_len(&out)?;
        let iv = compute_iv(&self.rtp_keys.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&self.rtp_keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut out[header_len..]);

        self.rocs.insert(ssrc, roc);
        self.last_seqs.insert(ssrc, seq);
        if let Some(window) = self.replay_windows.get_mut(&ssrc) {
            window.record(index);
        }

        Ok(out)
    }

    /// Encrypts and authenticates one compound RTCP packet.
    ///
    /// # Errors
    /// `PacketTooShort` on malformed input.
    pub fn protect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>, SrtpError> {
        if packet.len() < SRTCP_HEADER_LEN {
            return Err(SrtpError::PacketTooShort);
        }

        let ssrc = BigEndian::read_u32(&packet[4..8]);
        let index = self.rtcp_index;
        self.rtcp_index = (self.rtcp_index + 1) & SRTCP_INDEX_MASK;

        let mut out = packet.to_vec();
        let iv = compute_iv(&self.rtcp_keys.salt, ssrc, u64::from(index));
        let mut cipher = Aes128Ctr::new(&self.rtcp_keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut out[SRTCP_HEADER_LEN..]);

        let mut trailer = [0u8; SRTCP_INDEX_LEN];
        BigEndian::write_u32(&mut trailer, index | SRTCP_E_FLAG);
        out.extend_from_slice(&trailer);

        let tag = self.rtcp_tag(&out)?;
        out.extend_from_slice(&tag);
        Ok(out)
    }

    /// Verifies, replay-checks and decrypts one SRTCP packet.
    ///
    /// # Errors
    /// `AuthTagMismatch` (counted), `Replay`, or `PacketTooShort`.
    pub fn unprotect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>, SrtpError> {
        if packet.len() < SRTCP_HEADER_LEN + SRTCP_INDEX_LEN + AUTH_TAG_LEN {
            return Err(SrtpError::PacketTooShort);
        }

        let tag_start = packet.len() - AUTH_TAG_LEN;
        let (content, received_tag) = packet.split_at(tag_start);

        let trailer = BigEndian::read_u32(&content[content.len() - SRTCP_INDEX_LEN..]);
        let encrypted = trailer & SRTCP_E_FLAG != 0;
        let index = trailer & SRTCP_INDEX_MASK;
        let ssrc = BigEndian::read_u32(&content[4..8]);

        if self
            .rtcp_replay_windows
            .entry(ssrc)
            .or_insert_with(ReplayWindow::new)
            .is_replay(u64::from(index))
        {
            return Err(SrtpError::Replay {
                ssrc,
                index: u64::from(index),
            });
        }

        let computed_tag = self.rtcp_tag(content)?;
        if !constant_time_eq(&computed_tag, received_tag) {
            self.auth_failures += 1;
            sink_warn!(
                self.logger,
                "[SRTP] SRTCP auth tag mismatch: ssrc={:#x} (failure #{})",
                ssrc,
                self.auth_failures
            );
            return Err(SrtpError::AuthTagMismatch);
        }

        let mut out = content[..content.len() - SRTCP_INDEX_LEN].to_vec();
        if encrypted {
            let iv = compute_iv(&self.rtcp_keys.salt, ssrc, u64::from(index));
            let mut cipher = Aes128Ctr::new(&self.rtcp_keys.enc_key.into(), &iv.into());
            cipher.apply_keystream(&mut out[SRTCP_HEADER_LEN..]);
        }

        if let Some(window) = self.rtcp_replay_windows.get_mut(&ssrc) {
            window.record(u64::from(index));
        }
        Ok(out)
    }

    fn rtp_tag(&self, content: &[u8], roc: u32) -> Result<[u8; AUTH_TAG_LEN], SrtpError> {
        let mut mac = HmacSha1::new_from_slice(&self.rtp_keys.auth_key)
            .map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(content);
        let mut roc_bytes = [0u8; 4];
        BigEndian::write_u32(&mut roc_bytes, roc);
        mac.update(&roc_bytes);

        let full = mac.finalize().into_bytes();
        let mut tag = [0u8; AUTH_TAG_LEN];
        tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
        Ok(tag)
    }

    fn rtcp_tag(&self, content: &[u8]) -> Result<[u8; AUTH_TAG_LEN], SrtpError> {
        let mut mac = HmacSha1::new_from_slice(&self.rtcp_keys.auth_key)
            .map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(content);
        let full = mac.finalize().into_bytes();
        let mut tag = [0u8; AUTH_TAG_LEN];
        tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
        Ok(tag)
    }

    fn get_or_create_roc(&mut self, ssrc: u32, seq: u16) -> u32 {
        if !self.last_seqs.contains_key(&ssrc) {
            self.last_seqs.insert(ssrc, seq);
            self.rocs.insert(ssrc, 0);
            return 0;
        }

        let last_seq = self.last_seqs[&ssrc];
        let mut roc = *self.rocs.get(&ssrc).unwrap_or(&0);

        if seq < last_seq {
            let diff = u32::from(last_seq).wrapping_sub(u32::from(seq));
            if diff > 1000 {
                roc = roc.wrapping_add(1);
            }
        }

        self.last_seqs.insert(ssrc, seq);
        self.rocs.insert(ssrc, roc);
        roc
    }

    fn estimate_roc(&self, ssrc: u32, seq: u16) -> u32 {
        let last_seq = match self.last_seqs.get(&ssrc) {
            Some(&s) => s,
            None => return 0,
        };
        let last_roc = *self.rocs.get(&ssrc).unwrap_or(&0);

        let delta = i32::from(seq) - i32::from(last_seq);

        if delta <= -32768 {
            return last_roc.wrapping_add(1);
        }
        if delta >= 32768 {
            return last_roc.wrapping_sub(1);
        }
        last_roc
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::noop_log_sink::NoopLogSink;

    fn mock_keys() -> SrtpEndpointKeys {
        SrtpEndpointKeys {
            master_key: (0..16u8).collect(),
            master_salt: (100..114u8).collect(),
        }
    }

    fn mock_context() -> SrtpContext {
        SrtpContext::new(Arc::new(NoopLogSink), &mock_keys()).unwrap()
    }

    fn mock_rtp(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
        let mut pkt = vec![0x80, 96, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0];
        BigEndian::write_u16(&mut pkt[2..4], seq);
        BigEndian::write_u32(&mut pkt[8..12], ssrc);
        pkt.extend_from_slice(payload);
        pkt
    }

    #[test]
    fn test_protect_unprotect_roundtrip_ok() {
        let mut sender = mock_context();
        let mut receiver = mock_context();

        let plain = mock_rtp(1, 0xDEAD_BEEF, b"hello media");
        let protected = sender.protect(&plain).unwrap();
        assert_ne!(&protected[12..12 + 11], b"hello media");
        assert_eq!(protected.len(), plain.len() + AUTH_TAG_LEN);

        let recovered = receiver.unprotect(&protected).unwrap();
        assert_eq!(recovered, plain);
    }

    #[test]
    fn test_unprotect_replayed_packet_error() {
        let mut sender = mock_context();
        let mut receiver = mock_context();

        let protected = sender.protect(&mock_rtp(7, 42, b"x")).unwrap();
        receiver.unprotect(&protected).unwrap();
        let err = receiver.unprotect(&protected).unwrap_err();
        assert!(matches!(err, SrtpError::Replay { ssrc: 42, .. }));
    }

    #[test]
    fn test_unprotect_tampered_packet_counts_failure_error() {
        let mut sender = mock_context();
        let mut receiver = mock_context();

        let mut protected = sender.protect(&mock_rtp(3, 9, b"payload")).unwrap();
        let last = protected.len() - 1;
        protected[last] ^= 0xFF;

        assert_eq!(
            receiver.unprotect(&protected).unwrap_err(),
            SrtpError::AuthTagMismatch
        );
        assert_eq!(receiver.auth_failures(), 1);
    }

    #[test]
    fn test_seq_wraparound_keeps_decrypting_ok() {
        let mut sender = mock_context();
        let mut receiver = mock_context();

        for seq in [65534u16, 65535, 0, 1] {
            let plain = mock_rtp(seq, 5, b"wrap");
            let protected = sender.protect(&plain).unwrap();
            let recovered = receiver.unprotect(&protected).unwrap();
            assert_eq!(recovered, plain, "seq {seq}");
        }
    }

    #[test]
    fn test_randomized_stream_roundtrip_across_wrap_ok() {
        use rand::Rng;
        use rand::rngs::OsRng;

        let mut sender = mock_context();
        let mut receiver = mock_context();

        // 1200 consecutive packets starting just below the sequence wrap,
        // so the stream crosses 65535 -> 0 while payloads, timestamps and
        // marker bits vary randomly.
        let mut seq = 65000u16;
        for i in 0..1200u32 {
            let len = OsRng.gen_range(0..=64usize);
            let mut payload = vec![0u8; len];
            OsRng.fill(payload.as_mut_slice());

            let mut plain = mock_rtp(seq, 0xCAFE, &payload);
            BigEndian::write_u32(&mut plain[4..8], OsRng.r#gen());
            if OsRng.r#gen::<bool>() {
                plain[1] |= 0x80;
            }

            let protected = sender.protect(&plain).unwrap();
            let recovered = receiver.unprotect(&protected).unwrap();
            assert_eq!(recovered, plain, "packet {i} seq {seq}");
            seq = seq.wrapping_add(1);
        }
    }

    #[test]
    fn test_rtcp_roundtrip_ok() {
        let mut sender = mock_context();
        let mut receiver = mock_context();

        // Minimal receiver report: header + sender SSRC, no blocks.
        let plain = vec![0x80, 201, 0, 1, 0, 0, 0, 9];
        let protected = sender.protect_rtcp(&plain).unwrap();
        assert_eq!(
            protected.len(),
            plain.len() + SRTCP_INDEX_LEN + AUTH_TAG_LEN
        );

        let recovered = receiver.unprotect_rtcp(&protected).unwrap();
        assert_eq!(recovered, plain);
    }

    #[test]
    fn test_rtcp_replay_rejected_error() {
        let mut sender = mock_context();
        let mut receiver = mock_context();

        let plain = vec![0x80, 201, 0, 1, 0, 0, 0, 9];
        let protected = sender.protect_rtcp(&plain).unwrap();
        receiver.unprotect_rtcp(&protected).unwrap();
        assert!(matches!(
            receiver.unprotect_rtcp(&protected).unwrap_err(),
            SrtpError::Replay { .. }
        ));
    }

    #[test]
    fn test_short_packet_error() {
        let mut ctx = mock_context();
        assert_eq!(ctx.unprotect(&[0u8; 5]).unwrap_err(), SrtpError::PacketTooShort);
        assert_eq!(ctx.protect(&[0u8; 5]).unwrap_err(), SrtpError::PacketTooShort);
    }

    #[test]
    fn test_bad_master_key_length_error() {
        let keys = SrtpEndpointKeys {
            master_key: vec![0u8; 10],
            master_salt: vec![0u8; 14],
        };
        assert!(matches!(
            SrtpContext::new(Arc::new(NoopLogSink), &keys),
            Err(SrtpError::BadKeyLength)
        ));
    }
}
