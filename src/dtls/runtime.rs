use std::io;
use std::sync::Arc;

use openssl::hash::MessageDigest;
use openssl::ssl::{
    HandshakeError, Ssl, SslContextBuilder, SslMethod, SslStream, SslVerifyMode,
};

use crate::dtls::certificate::{DtlsCertificate, format_fingerprint};
use crate::dtls::channel::DatagramChannel;
use crate::dtls::dtls_error::DtlsError;
use crate::dtls::dtls_role::DtlsRole;
use crate::log::log_sink::LogSink;
use crate::srtp::{SrtpEndpointKeys, SrtpProfile, SrtpSessionConfig};
use crate::{sink_debug, sink_error, sink_info, sink_trace, sink_warn};

const KEYING_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// Runs the DTLS handshake over `channel` and exports the SRTP keys.
///
/// The peer certificate is self-signed; authentication happens by comparing
/// its SHA-256 digest against the fingerprint signaled in SDP after the
/// handshake completes.
///
/// # Errors
/// `HandshakeTimeout` when the retransmission budget runs out,
/// `FingerprintMismatch` on a pinning failure, other `DtlsError` variants on
/// OpenSSL or key-export failures.
pub fn run_dtls_handshake(
    channel: DatagramChannel,
    role: DtlsRole,
    identity: &DtlsCertificate,
    expected_fingerprint: Option<&str>,
    logger: Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    sink_info!(&logger, "[DTLS] Starting handshake as {:?}", role);

    if expected_fingerprint.is_none() {
        sink_warn!(
            &logger,
            "[DTLS] No remote fingerprint provided. Peer will not be authenticated."
        );
    }

    let builder = create_base_context(identity)?;
    let ssl = Ssl::new(&builder.build())
        .map_err(|e| DtlsError::Ssl(format!("Ssl::new failed: {}", e)))?;

    let result = match role {
        DtlsRole::Client => {
            sink_debug!(&logger, "[DTLS] Client: Starting connect()...");
            ssl.connect(channel)
        }
        DtlsRole::Server => {
            sink_debug!(&logger, "[DTLS] Server: Starting accept()...");
            ssl.accept(channel)
        }
    };
    let dtls_stream = result.map_err(handshake_error_to_dtlserr).map_err(|e| {
        sink_error!(&logger, "[DTLS] Handshake FAILED: {}", e);
        e
    })?;

    if let Some(expected) = expected_fingerprint {
        verify_peer_fingerprint(&dtls_stream, expected, &logger)?;
    }

    let cfg = derive_srtp_keys(&dtls_stream, role, &logger).map_err(|e| {
        sink_error!(&logger, "[DTLS] Key derivation failed: {}", e);
        e
    })?;

    sink_info!(&logger, "[DTLS] Handshake Success! SRTP keys derived.");
    Ok(cfg)
}

fn create_base_context(identity: &DtlsCertificate) -> Result<SslContextBuilder, DtlsError> {
    let mut builder = SslContextBuilder::new(SslMethod::dtls())
        .map_err(|e| DtlsError::Ssl(format!("OpenSSL init failed: {}", e)))?;

    builder
        .set_tlsext_use_srtp(SrtpProfile::Aes128CmSha1_80.dtls_name())
        .map_err(|e| DtlsError::Ssl(format!("set_tlsext_use_srtp failed: {}", e)))?;

    builder
        .set_cipher_list("DEFAULT:@SECLEVEL=0")
        .map_err(|e| DtlsError::Ssl(format!("set_cipher_list failed: {}", e)))?;

    builder.set_certificate(&identity.cert)?;
    builder.set_private_key(&identity.pkey)?;
    builder
        .check_private_key()
        .map_err(|e| DtlsError::Ssl(format!("Private key does not match certificate: {}", e)))?;

    // Demand a certificate but accept any: WebRTC peers are self-signed, the
    // SDP fingerprint comparison after the handshake is the real check.
    builder.set_verify_callback(
        SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
        |_preverify_ok, _ctx| true,
    );

    Ok(builder)
}

fn verify_peer_fingerprint(
    stream: &SslStream<DatagramChannel>,
    expected: &str,
    logger: &Arc<dyn LogSink>,
) -> Result<(), DtlsError> {
    let cert = stream
        .ssl()
        .peer_certificate()
        .ok_or_else(|| DtlsError::Handshake("peer presented no certificate".into()))?;
    let digest = cert.digest(MessageDigest::sha256())?;
    let got = format_fingerprint(&digest);

    if got.eq_ignore_ascii_case(expected) {
        sink_debug!(logger, "[DTLS] Verify: Fingerprint MATCHED ({})", got);
        Ok(())
    } else {
        sink_warn!(
            logger,
            "[DTLS] Verify: Fingerprint MISMATCH! Expected: {} Got: {}",
            expected,
            got
        );
        Err(DtlsError::FingerprintMismatch {
            expected: expected.to_string(),
            got,
        })
    }
}

fn derive_srtp_keys(
    stream: &SslStream<DatagramChannel>,
    role: DtlsRole,
    logger: &Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    let selected_profile = stream
        .ssl()
        .selected_srtp_profile()
        .ok_or(DtlsError::NoSrtpProfile)?;

    let profile_name = selected_profile.name();
    sink_debug!(logger, "[DTLS] Negotiated SRTP Profile: {}", profile_name);

    let profile = match profile_name {
        "SRTP_AES128_CM_SHA1_80" => SrtpProfile::Aes128CmSha1_80,
        _ => {
            sink_warn!(
                logger,
                "[DTLS] Unknown SRTP Profile selected: {}",
                profile_name
            );
            return Err(DtlsError::NoSrtpProfile);
        }
    };

    let key_len = 16usize;
    let salt_len = 14usize;
    let total_len = 2 * (key_len + salt_len);

    let mut key_mat = vec![0u8; total_len];
    stream
        .ssl()
        .export_keying_material(&mut key_mat, KEYING_LABEL, None)
        .map_err(|e| DtlsError::KeyExport(format!("{}", e)))?;

    sink_trace!(
        logger,
        "[DTLS] Key material exported successfully ({} bytes)",
        total_len
    );

    let (client_key, rest) = key_mat.split_at(key_len);
    let (server_key, rest) = rest.split_at(key_len);
    let (client_salt, rest) = rest.split_at(salt_len);
    let (server_salt, _) = rest.split_at(salt_len);

    let client_keys = SrtpEndpointKeys {
        master_key: client_key.to_vec(),
        master_salt: client_salt.to_vec(),
    };
    let server_keys = SrtpEndpointKeys {
        master_key: server_key.to_vec(),
        master_salt: server_salt.to_vec(),
    };

    let (outbound, inbound) = match role {
        DtlsRole::Client => (client_keys, server_keys),
        DtlsRole::Server => (server_keys, client_keys),
    };

    Ok(SrtpSessionConfig {
        profile,
        outbound,
        inbound,
    })
}

fn handshake_error_to_dtlserr(he: HandshakeError<DatagramChannel>) -> DtlsError {
    match he {
        HandshakeError::WouldBlock(_) => DtlsError::Handshake("Handshake would block".into()),
        HandshakeError::Failure(s) => {
            let err = s.into_error();
            if err
                .io_error()
                .is_some_and(|e| e.kind() == io::ErrorKind::TimedOut)
            {
                DtlsError::HandshakeTimeout
            } else {
                DtlsError::Handshake(format!("{:?}", err))
            }
        }
        HandshakeError::SetupFailure(e) => DtlsError::Ssl(format!("{:?}", e)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::noop_log_sink::NoopLogSink;
    use crate::transport::writer::WriteHandle;
    use std::net::SocketAddr;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    struct Endpoint {
        channel: DatagramChannel,
        identity: DtlsCertificate,
        fingerprint: String,
    }

    /// Two channels wired back to back via a forwarding thread per side.
    fn mock_pair(base: Duration, max_retransmits: u32, drop_every: Option<usize>) -> (Endpoint, Endpoint) {
        let a_addr: SocketAddr = "127.0.0.1:11111".parse().unwrap();
        let b_addr: SocketAddr = "127.0.0.1:22222".parse().unwrap();

        let (a_in_tx, a_in_rx) = mpsc::channel::<Vec<u8>>();
        let (b_in_tx, b_in_rx) = mpsc::channel::<Vec<u8>>();
        let (a_out_tx, a_out_rx) = mpsc::channel::<(Vec<u8>, SocketAddr)>();
        let (b_out_tx, b_out_rx) = mpsc::channel::<(Vec<u8>, SocketAddr)>();

        // a -> b forwarder, with optional deterministic loss.
        {
            let b_in_tx = b_in_tx.clone();
            thread::spawn(move || {
                let mut count = 0usize;
                while let Ok((data, _)) = a_out_rx.recv() {
                    count += 1;
                    if drop_every.is_some_and(|n| count % n == 0) {
                        continue;
                    }
                    if b_in_tx.send(data).is_err() {
                        break;
                    }
                }
            });
        }
        {
            let a_in_tx = a_in_tx.clone();
            thread::spawn(move || {
                let mut count = 0usize;
                while let Ok((data, _)) = b_out_rx.recv() {
                    count += 1;
                    if drop_every.is_some_and(|n| count % n == 0) {
                        continue;
                    }
                    if a_in_tx.send(data).is_err() {
                        break;
                    }
                }
            });
        }

        let logger: Arc<dyn crate::log::log_sink::LogSink> = Arc::new(NoopLogSink);
        let a_chan = DatagramChannel::new(
            a_in_rx,
            WriteHandle::new(a_out_tx),
            b_addr,
            base,
            max_retransmits,
            logger.clone(),
        );
        let b_chan = DatagramChannel::new(
            b_in_rx,
            WriteHandle::new(b_out_tx),
            a_addr,
            base,
            max_retransmits,
            logger,
        );

        let a_id = DtlsCertificate::generate().unwrap();
        let b_id = DtlsCertificate::generate().unwrap();
        let a_fp = a_id.fingerprint().unwrap();
        let b_fp = b_id.fingerprint().unwrap();

        (
            Endpoint {
                channel: a_chan,
                identity: a_id,
                fingerprint: a_fp,
            },
            Endpoint {
                channel: b_chan,
                identity: b_id,
                fingerprint: b_fp,
            },
        )
    }

    fn run_pair(
        a: Endpoint,
        b: Endpoint,
        a_expects: Option<String>,
        b_expects: Option<String>,
    ) -> (
        Result<SrtpSessionConfig, DtlsError>,
        Result<SrtpSessionConfig, DtlsError>,
    ) {
        let server = thread::spawn(move || {
            run_dtls_handshake(
                b.channel,
                DtlsRole::Server,
                &b.identity,
                b_expects.as_deref(),
                Arc::new(NoopLogSink),
            )
        });
        let client = run_dtls_handshake(
            a.channel,
            DtlsRole::Client,
            &a.identity,
            a_expects.as_deref(),
            Arc::new(NoopLogSink),
        );
        (client, server.join().unwrap())
    }

    #[test]
    fn test_handshake_exports_mirrored_keys_ok() {
        let (a, b) = mock_pair(Duration::from_millis(400), 6, None);
        let a_fp = b.fingerprint.clone();
        let b_fp = a.fingerprint.clone();
        let (client, server) = run_pair(a, b, Some(a_fp), Some(b_fp));
        let client = client.unwrap();
        let server = server.unwrap();

        assert_eq!(client.outbound.master_key, server.inbound.master_key);
        assert_eq!(client.inbound.master_key, server.outbound.master_key);
        assert_eq!(client.outbound.master_salt, server.inbound.master_salt);
        assert_eq!(client.profile, SrtpProfile::Aes128CmSha1_80);
    }

    #[test]
    fn test_handshake_with_packet_loss_retransmits_ok() {
        // Drop every 5th datagram in both directions (20% loss).
        let (a, b) = mock_pair(Duration::from_millis(50), 6, Some(5));
        let a_fp = b.fingerprint.clone();
        let b_fp = a.fingerprint.clone();
        let (client, server) = run_pair(a, b, Some(a_fp), Some(b_fp));
        assert!(client.is_ok(), "client failed: {:?}", client.err());
        assert!(server.is_ok(), "server failed: {:?}", server.err());
    }

    #[test]
    fn test_handshake_wrong_fingerprint_error() {
        let (a, b) = mock_pair(Duration::from_millis(100), 3, None);
        let bogus = "AA:".repeat(31) + "AA";
        let (client, _server) = run_pair(a, b, Some(bogus), None);
        assert!(matches!(
            client,
            Err(DtlsError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn test_handshake_timeout_without_peer_error() {
        let (a, _b) = mock_pair(Duration::from_millis(10), 2, None);
        // Server never started; client flight goes unanswered.
        let got = run_dtls_handshake(
            a.channel,
            DtlsRole::Client,
            &a.identity,
            None,
            Arc::new(NoopLogSink),
        );
        assert!(matches!(
            got,
            Err(DtlsError::HandshakeTimeout) | Err(DtlsError::Handshake(_))
        ));
    }
}
