//! In-memory self-signed certificate for DTLS-SRTP.
//!
//! WebRTC authenticates the handshake against the fingerprint signaled in
//! SDP, so the certificate itself only needs to exist, not chain to a CA.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509NameBuilder};

use crate::dtls::dtls_error::DtlsError;

const CERT_DAYS: u32 = 30;
const COMMON_NAME: &str = "rtcmux";

#[derive(Clone)]
pub struct DtlsCertificate {
    pub(crate) cert: X509,
    pub(crate) pkey: PKey<Private>,
}

impl DtlsCertificate {
    /// Generates a fresh EC P-256 self-signed certificate.
    ///
    /// # Errors
    /// Propagates OpenSSL failures.
    pub fn generate() -> Result<Self, DtlsError> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let ec_key = EcKey::generate(&group)?;
        let pkey = PKey::from_ec_key(ec_key)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("CN", COMMON_NAME)?;
        let name = name.build();

        let mut serial_bn = BigNum::new()?;
        serial_bn.rand(64, MsbOption::MAYBE_ZERO, false)?;
        let serial = serial_bn.to_asn1_integer()?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&pkey)?;
        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(CERT_DAYS)?.as_ref())?;
        builder.sign(&pkey, MessageDigest::sha256())?;

        Ok(Self {
            cert: builder.build(),
            pkey,
        })
    }

    /// SHA-256 fingerprint as colon-separated uppercase hex, the format used
    /// in `a=fingerprint` SDP lines.
    ///
    /// # Errors
    /// Propagates OpenSSL digest failures.
    pub fn fingerprint(&self) -> Result<String, DtlsError> {
        let digest = self.cert.digest(MessageDigest::sha256())?;
        Ok(format_fingerprint(&digest))
    }
}

pub(crate) fn format_fingerprint(digest: &[u8]) -> String {
    digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<String>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_generate_and_fingerprint_ok() {
        let cert = DtlsCertificate::generate().unwrap();
        let fp = cert.fingerprint().unwrap();
        // 32 bytes -> 64 hex chars + 31 colons.
        assert_eq!(fp.len(), 95);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() || c == ':'));
        assert_eq!(fp, fp.to_uppercase());
    }

    #[test]
    fn test_distinct_certificates_distinct_fingerprints_ok() {
        let a = DtlsCertificate::generate().unwrap();
        let b = DtlsCertificate::generate().unwrap();
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }
}
