//! STUN message codec per RFC 5389, restricted to the Binding method.
//!
//! A message is a fixed 20-byte header (type, length, magic cookie, 96-bit
//! transaction id) followed by type-length-value attributes padded to 4-byte
//! boundaries. MESSAGE-INTEGRITY and FINGERPRINT are appended last, in that
//! order, and cover the message with an adjusted length field.

use byteorder::{BigEndian, ByteOrder};
use crc::{CRC_32_ISO_HDLC, Crc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha1::Sha1;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::stun::stun_error::StunError;

type HmacSha1 = Hmac<Sha1>;

/// Magic cookie value defined in RFC 5389.
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// Size of the STUN message header in bytes.
pub const HEADER_SIZE: usize = 20;

/// XOR value applied to the CRC32 in the FINGERPRINT attribute.
const FINGERPRINT_XOR: u32 = 0x5354_554E;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const METHOD_BINDING: u16 = 0x0001;

pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_PRIORITY: u16 = 0x0024;
pub const ATTR_USE_CANDIDATE: u16 = 0x0025;
pub const ATTR_FINGERPRINT: u16 = 0x8028;
pub const ATTR_ICE_CONTROLLED: u16 = 0x8029;
pub const ATTR_ICE_CONTROLLING: u16 = 0x802A;

const INTEGRITY_ATTR_LEN: usize = 24; // type(2) + len(2) + hmac(20)
const FINGERPRINT_ATTR_LEN: usize = 8; // type(2) + len(2) + crc(4)

/// The class bits of the STUN message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    const fn bits(self) -> u16 {
        match self {
            MessageClass::Request => 0x0000,
            MessageClass::Indication => 0x0010,
            MessageClass::SuccessResponse => 0x0100,
            MessageClass::ErrorResponse => 0x0110,
        }
    }

    const fn from_type(typ: u16) -> Self {
        match typ & 0x0110 {
            0x0000 => MessageClass::Request,
            0x0010 => MessageClass::Indication,
            0x0100 => MessageClass::SuccessResponse,
            _ => MessageClass::ErrorResponse,
        }
    }
}

/// Returns true if the datagram plausibly is a STUN message.
///
/// Used by the transport demultiplexer: the two most significant bits of the
/// first byte are zero and the magic cookie is present at offset 4.
#[must_use]
pub fn is_stun_datagram(buf: &[u8]) -> bool {
    buf.len() >= HEADER_SIZE
        && buf[0] & 0xC0 == 0
        && BigEndian::read_u32(&buf[4..8]) == MAGIC_COOKIE
}

/// A decoded or under-construction STUN Binding message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub class: MessageClass,
    pub method: u16,
    pub transaction_id: [u8; 12],
    /// Attributes in wire order, unpadded values.
    pub attributes: Vec<(u16, Vec<u8>)>,
}

impl StunMessage {
    #[must_use]
    pub fn new(class: MessageClass, transaction_id: [u8; 12]) -> Self {
        Self {
            class,
            method: METHOD_BINDING,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// New Binding request with a random transaction id.
    #[must_use]
    pub fn binding_request() -> Self {
        let mut tid = [0u8; 12];
        OsRng.fill_bytes(&mut tid);
        Self::new(MessageClass::Request, tid)
    }

    /// Success response echoing the request's transaction id.
    #[must_use]
    pub fn binding_response(transaction_id: [u8; 12]) -> Self {
        Self::new(MessageClass::SuccessResponse, transaction_id)
    }

    pub fn add_attribute(&mut self, typ: u16, value: &[u8]) {
        self.attributes.push((typ, value.to_vec()));
    }

    pub fn add_username(&mut self, username: &str) {
        self.add_attribute(ATTR_USERNAME, username.as_bytes());
    }

    pub fn add_priority(&mut self, priority: u32) {
        self.add_attribute(ATTR_PRIORITY, &priority.to_be_bytes());
    }

    pub fn add_use_candidate(&mut self) {
        self.add_attribute(ATTR_USE_CANDIDATE, &[]);
    }

    pub fn add_ice_controlling(&mut self, tie_breaker: u64) {
        self.add_attribute(ATTR_ICE_CONTROLLING, &tie_breaker.to_be_bytes());
    }

    pub fn add_ice_controlled(&mut self, tie_breaker: u64) {
        self.add_attribute(ATTR_ICE_CONTROLLED, &tie_breaker.to_be_bytes());
    }

    pub fn add_error_code(&mut self, code: u16, reason: &str) {
        let mut value = vec![0u8, 0u8, (code / 100) as u8, (code % 100) as u8];
        value.extend_from_slice(reason.as_bytes());
        self.add_attribute(ATTR_ERROR_CODE, &value);
    }

    /// Adds an XOR-MAPPED-ADDRESS attribute for `addr`.
    pub fn add_xor_mapped_address(&mut self, addr: &SocketAddr) {
        let xport = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
        let mut value = Vec::with_capacity(20);
        match addr.ip() {
            IpAddr::V4(ip) => {
                value.extend_from_slice(&[0, 0x01]);
                value.extend_from_slice(&xport.to_be_bytes());
                let xored = u32::from(ip) ^ MAGIC_COOKIE;
                value.extend_from_slice(&xored.to_be_bytes());
            }
            IpAddr::V6(ip) => {
                value.extend_from_slice(&[0, 0x02]);
                value.extend_from_slice(&xport.to_be_bytes());
                let mut xor_mask = [0u8; 16];
                xor_mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                xor_mask[4..].copy_from_slice(&self.transaction_id);
                let octets = ip.octets();
                for (i, b) in octets.iter().enumerate() {
                    value.push(b ^ xor_mask[i]);
                }
            }
        }
        self.add_attribute(ATTR_XOR_MAPPED_ADDRESS, &value);
    }

    #[must_use]
    pub fn attribute(&self, typ: u16) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|(t, _)| *t == typ)
            .map(|(_, v)| v.as_slice())
    }

    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.attribute(ATTR_USERNAME)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    #[must_use]
    pub fn priority(&self) -> Option<u32> {
        self.attribute(ATTR_PRIORITY)
            .filter(|v| v.len() == 4)
            .map(|v| BigEndian::read_u32(v))
    }

    #[must_use]
    pub fn use_candidate(&self) -> bool {
        self.attribute(ATTR_USE_CANDIDATE).is_some()
    }

    /// Decodes the XOR-MAPPED-ADDRESS attribute, if present.
    pub fn xor_mapped_address(&self) -> Result<Option<SocketAddr>, StunError> {
        let Some(value) = self.attribute(ATTR_XOR_MAPPED_ADDRESS) else {
            return Ok(None);
        };
        if value.len() < 8 {
            return Err(StunError::AttributeTruncated);
        }
        let family = value[1];
        let port = BigEndian::read_u16(&value[2..4]) ^ (MAGIC_COOKIE >> 16) as u16;
        match family {
            0x01 => {
                let ip = Ipv4Addr::from(BigEndian::read_u32(&value[4..8]) ^ MAGIC_COOKIE);
                Ok(Some(SocketAddr::new(IpAddr::V4(ip), port)))
            }
            0x02 => {
                if value.len() < 20 {
                    return Err(StunError::AttributeTruncated);
                }
                let mut xor_mask = [0u8; 16];
                xor_mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                xor_mask[4..].copy_from_slice(&self.transaction_id);
                let mut octets = [0u8; 16];
                for i in 0..16 {
                    octets[i] = value[4 + i] ^ xor_mask[i];
                }
                Ok(Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port)))
            }
            other => Err(StunError::BadAddressFamily(other)),
        }
    }

    /// Encodes the message, appending MESSAGE-INTEGRITY (when a key is given)
    /// and FINGERPRINT.
    #[must_use]
    pub fn encode(&self, integrity_key: Option<&[u8]>) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + 64);
        let typ = self.method | self.class.bits();
        out.extend_from_slice(&typ.to_be_bytes());
        out.extend_from_slice(&[0, 0]); // length fixed up below
        out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        out.extend_from_slice(&self.transaction_id);

        for (typ, value) in &self.attributes {
            push_attribute(&mut out, *typ, value);
        }

        if let Some(key) = integrity_key {
            // Length covers everything up to and including the integrity attr.
            let claimed = out.len() - HEADER_SIZE + INTEGRITY_ATTR_LEN;
            BigEndian::write_u16(&mut out[2..4], claimed as u16);
            let tag = hmac_sha1(key, &out);
            push_attribute(&mut out, ATTR_MESSAGE_INTEGRITY, &tag);
        }

        // FINGERPRINT covers everything before it, length includes it.
        let claimed = out.len() - HEADER_SIZE + FINGERPRINT_ATTR_LEN;
        BigEndian::write_u16(&mut out[2..4], claimed as u16);
        let crc = CRC32.checksum(&out) ^ FINGERPRINT_XOR;
        push_attribute(&mut out, ATTR_FINGERPRINT, &crc.to_be_bytes());

        out
    }

    /// Decodes a STUN message, checking the FINGERPRINT when present.
    pub fn decode(buf: &[u8]) -> Result<Self, StunError> {
        if buf.len() < HEADER_SIZE {
            return Err(StunError::TooShort);
        }
        let typ = BigEndian::read_u16(&buf[0..2]);
        if typ & 0xC000 != 0 {
            return Err(StunError::UnknownClass(typ));
        }
        let length = BigEndian::read_u16(&buf[2..4]) as usize;
        if BigEndian::read_u32(&buf[4..8]) != MAGIC_COOKIE {
            return Err(StunError::InvalidMagicCookie);
        }
        if buf.len() < HEADER_SIZE + length {
            return Err(StunError::TooShort);
        }
        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&buf[8..20]);

        let mut attributes = Vec::new();
        let mut idx = HEADER_SIZE;
        let end = HEADER_SIZE + length;
        while idx + 4 <= end {
            let attr_type = BigEndian::read_u16(&buf[idx..idx + 2]);
            let attr_len = BigEndian::read_u16(&buf[idx + 2..idx + 4]) as usize;
            idx += 4;
            if idx + attr_len > end {
                return Err(StunError::AttributeTruncated);
            }
            let value = buf[idx..idx + attr_len].to_vec();
            idx += attr_len + (4 - attr_len % 4) % 4;

            if attr_type == ATTR_FINGERPRINT {
                if attr_len != 4 {
                    return Err(StunError::AttributeTruncated);
                }
                let claimed = BigEndian::read_u32(&value);
                let covered = idx - FINGERPRINT_ATTR_LEN;
                let computed = CRC32.checksum(&buf[..covered]) ^ FINGERPRINT_XOR;
                if claimed != computed {
                    return Err(StunError::FingerprintMismatch);
                }
            }
            attributes.push((attr_type, value));
        }

        Ok(Self {
            class: MessageClass::from_type(typ),
            method: typ & 0x3EEF,
            transaction_id,
            attributes,
        })
    }

    /// Verifies MESSAGE-INTEGRITY against `key` using the original datagram.
    ///
    /// The HMAC covers the message up to the integrity attribute with the
    /// length field rewritten to end right after it, so the raw bytes are
    /// required.
    pub fn verify_integrity(&self, raw: &[u8], key: &[u8]) -> Result<(), StunError> {
        let Some(claimed) = self.attribute(ATTR_MESSAGE_INTEGRITY) else {
            return Err(StunError::IntegrityMissing);
        };

        // Locate the integrity attribute in the raw bytes.
        let mut idx = HEADER_SIZE;
        while idx + 4 <= raw.len() {
            let attr_type = BigEndian::read_u16(&raw[idx..idx + 2]);
            let attr_len = BigEndian::read_u16(&raw[idx + 2..idx + 4]) as usize;
            if attr_type == ATTR_MESSAGE_INTEGRITY {
                let mut covered = raw[..idx].to_vec();
                let claimed_len = idx - HEADER_SIZE + INTEGRITY_ATTR_LEN;
                BigEndian::write_u16(&mut covered[2..4], claimed_len as u16);
                let computed = hmac_sha1(key, &covered);
                if constant_time_eq(claimed, &computed) {
                    return Ok(());
                }
                return Err(StunError::IntegrityMismatch);
            }
            idx += 4 + attr_len + (4 - attr_len % 4) % 4;
        }
        Err(StunError::IntegrityMissing)
    }
}

fn push_attribute(out: &mut Vec<u8>, typ: u16, value: &[u8]) {
    out.extend_from_slice(&typ.to_be_bytes());
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    let pad = (4 - value.len() % 4) % 4;
    out.extend(std::iter::repeat_n(0u8, pad));
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    // HMAC accepts keys of any length; new_from_slice only fails on zero-sized
    // output, which cannot happen for SHA1.
    if let Ok(mut mac) = HmacSha1::new_from_slice(key) {
        mac.update(data);
        out.copy_from_slice(&mac.finalize().into_bytes());
    }
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
