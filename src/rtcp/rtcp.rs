use crate::rtcp::packet_type;

use super::{
    bye::Bye, common_header::CommonHeader, generic_nack::GenericNack,
    packet_type::RtcpPacketType, picture_loss::PictureLossIndication,
    receiver_report::ReceiverReport, rtcp_error::RtcpError, sdes::Sdes,
    sender_report::SenderReport,
};

/// The union of supported RTCP packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    Sr(SenderReport),
    Rr(ReceiverReport),
    Sdes(Sdes),
    Bye(Bye),
    Nack(GenericNack),          // Transport FB (205/FMT=1)
    Pli(PictureLossIndication), // Payload FB (206/FMT=1)
}

impl RtcpPacket {
    /// Decodes a *compound* RTCP buffer into individual packets.
    ///
    /// # Errors
    /// Fails on trailing garbage or any per-packet decode error.
    pub fn decode_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>, RtcpError> {
        let mut out = Vec::new();
        let mut idx = 0usize;
        while idx + 4 <= buf.len() {
            let (hdr, total) = CommonHeader::decode(&buf[idx..])?;
            let payload = &buf[idx + 4..idx + total];

            let pkt = match hdr.pt() {
                packet_type::PT_SR => SenderReport::decode(&hdr, payload)?,
                packet_type::PT_RR => ReceiverReport::decode(&hdr, payload)?,
                packet_type::PT_SDES => Sdes::decode(&hdr, payload)?,
                packet_type::PT_BYE => Bye::decode(&hdr, payload)?,
                packet_type::PT_RTPFB => GenericNack::decode(&hdr, payload)?,
                packet_type::PT_PSFB => PictureLossIndication::decode(&hdr, payload)?,
                other => return Err(RtcpError::UnknownPacketType(other)),
            };
            out.push(pkt);
            idx += total;
        }
        if idx != buf.len() {
            // trailing garbage / partial packet
            return Err(RtcpError::TooShort);
        }
        Ok(out)
    }

    /// Encodes a compound RTCP packet (concatenation of packets).
    ///
    /// # Errors
    /// Propagates per-packet encode failures.
    pub fn encode_compound(pkts: &[RtcpPacket]) -> Result<Vec<u8>, RtcpError> {
        let mut out = Vec::new();
        for pkt in pkts {
            pkt.encode_one(&mut out)?;
        }
        Ok(out)
    }

    fn encode_one(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        match self {
            RtcpPacket::Sr(sr) => sr.encode_into(out),
            RtcpPacket::Rr(rr) => rr.encode_into(out),
            RtcpPacket::Sdes(sdes) => sdes.encode_into(out),
            RtcpPacket::Bye(bye) => bye.encode_into(out),
            RtcpPacket::Nack(nack) => nack.encode_into(out),
            RtcpPacket::Pli(pli) => pli.encode_into(out),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::rtcp::report_block::ReportBlock;
    use crate::rtcp::sender_info::SenderInfo;

    #[test]
    fn test_compound_roundtrip_ok() {
        let sr = SenderReport::new(
            0x1111,
            SenderInfo {
                ntp_msw: 1,
                ntp_lsw: 2,
                rtp_ts: 3,
                packet_count: 4,
                octet_count: 5,
            },
            vec![ReportBlock {
                ssrc: 0x2222,
                fraction_lost: 12,
                cumulative_lost: -3,
                highest_seq_no_received: 999,
                interarrival_jitter: 7,
                lsr: 8,
                dlsr: 9,
            }],
        );
        let sdes = Sdes::cname(0x1111, "user@host");
        let pkts = vec![RtcpPacket::Sr(sr), RtcpPacket::Sdes(sdes)];

        let wire = RtcpPacket::encode_compound(&pkts).unwrap();
        assert_eq!(wire.len() % 4, 0);
        let back = RtcpPacket::decode_compound(&wire).unwrap();
        assert_eq!(back, pkts);
    }

    #[test]
    fn test_feedback_roundtrip_ok() {
        let pkts = vec![
            RtcpPacket::Pli(PictureLossIndication::new(1, 2)),
            RtcpPacket::Nack(GenericNack::new(1, 2, vec![(100, 0b101)])),
            RtcpPacket::Bye(Bye::single(1, Some("shutting down".into()))),
        ];
        let wire = RtcpPacket::encode_compound(&pkts).unwrap();
        let back = RtcpPacket::decode_compound(&wire).unwrap();
        assert_eq!(back, pkts);
    }

    #[test]
    fn test_unknown_packet_type_error() {
        // Header claiming PT 199, length 0.
        let wire = [0x80u8, 199, 0, 0];
        assert_eq!(
            RtcpPacket::decode_compound(&wire).unwrap_err(),
            RtcpError::UnknownPacketType(199)
        );
    }

    #[test]
    fn test_trailing_garbage_error() {
        let wire = RtcpPacket::encode_compound(&[RtcpPacket::Pli(PictureLossIndication::new(
            1, 2,
        ))])
        .unwrap();
        let mut with_garbage = wire.clone();
        with_garbage.extend_from_slice(&[0xAA, 0xBB]);
        assert!(RtcpPacket::decode_compound(&with_garbage).is_err());
    }
}
