//! Local candidate gathering.
//!
//! Host gathering resolves the primary egress interface with a probe socket
//! (no packets are actually sent). Server-reflexive gathering runs before the
//! transport demultiplexer starts, so it may read from the bundle socket
//! directly.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::ice::candidate::Candidate;
use crate::ice::ice_error::IceError;
use crate::stun::{MessageClass, StunMessage};

const DISCOVERY_TARGET: &str = "8.8.8.8:80";
const STUN_QUERY_TIMEOUT: Duration = Duration::from_secs(2);
const COMPONENT_RTP: u8 = 1;

/// Returns the host candidate for the bundle socket.
///
/// A socket bound to a wildcard address reports `0.0.0.0`, so the candidate
/// address is rewritten with the primary egress IP discovered via a probe.
///
/// # Errors
/// Fails if the socket's local address cannot be read.
pub fn host_candidate(socket: &UdpSocket) -> Result<Candidate, IceError> {
    let local = socket.local_addr()?;
    let ip = if local.ip().is_unspecified() {
        discover_local_ip().unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
    } else {
        local.ip()
    };
    Ok(Candidate::host(
        SocketAddr::new(ip, local.port()),
        COMPONENT_RTP,
    ))
}

/// Queries a STUN server for the socket's server-reflexive address.
///
/// Blocking; only used during gathering, before the demux thread owns the
/// socket's read side. Unrelated datagrams received meanwhile are skipped.
///
/// # Errors
/// Fails on socket errors; a timeout yields `Ok(None)` (srflx is optional).
pub fn server_reflexive_candidate(
    socket: &UdpSocket,
    stun_server: SocketAddr,
    base: SocketAddr,
) -> Result<Option<Candidate>, IceError> {
    let request = StunMessage::binding_request();
    let raw = request.encode(None);
    socket.send_to(&raw, stun_server)?;

    let prev_timeout = socket.read_timeout()?;
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;
    let deadline = Instant::now() + STUN_QUERY_TIMEOUT;

    let mut buf = [0u8; 1500];
    let result = loop {
        if Instant::now() >= deadline {
            break None;
        }
        match socket.recv_from(&mut buf) {
            Ok((n, from)) if from == stun_server => {
                let Ok(msg) = StunMessage::decode(&buf[..n]) else {
                    continue;
                };
                if msg.class != MessageClass::SuccessResponse
                    || msg.transaction_id != request.transaction_id
                {
                    continue;
                }
                break msg.xor_mapped_address().ok().flatten();
            }
            Ok(_) => continue,
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                socket.set_read_timeout(prev_timeout)?;
                return Err(IceError::Io(e));
            }
        }
    };
    socket.set_read_timeout(prev_timeout)?;

    Ok(result.and_then(|mapped| {
        if mapped == base {
            // No NAT in the path; the host candidate already covers it.
            None
        } else {
            Some(Candidate::server_reflexive(mapped, base, COMPONENT_RTP))
        }
    }))
}

/// Discovers the primary local IP using a probe socket.
fn discover_local_ip() -> Option<IpAddr> {
    let probe = UdpSocket::bind("0.0.0.0:0").ok()?;
    probe.connect(DISCOVERY_TARGET).ok()?;
    let ip = probe.local_addr().ok()?.ip();
    if ip.is_unspecified() { None } else { Some(ip) }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::thread;

    #[test]
    fn test_host_candidate_for_loopback_socket_ok() {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let cand = host_candidate(&sock).unwrap();
        assert_eq!(cand.address, sock.local_addr().unwrap());
        assert_eq!(cand.component, 1);
    }

    #[test]
    fn test_server_reflexive_against_mock_server_ok() {
        // Minimal STUN server on loopback answering one Binding request.
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();
        let mapped: SocketAddr = "203.0.113.7:50000".parse().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 1500];
            let (n, from) = server.recv_from(&mut buf).unwrap();
            let req = StunMessage::decode(&buf[..n]).unwrap();
            let mut resp = StunMessage::binding_response(req.transaction_id);
            resp.add_xor_mapped_address(&mapped);
            server.send_to(&resp.encode(None), from).unwrap();
        });

        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let base = sock.local_addr().unwrap();
        let cand = server_reflexive_candidate(&sock, server_addr, base)
            .unwrap()
            .unwrap();
        assert_eq!(cand.address, mapped);
        assert_eq!(cand.related_address, Some(base));
        handle.join().unwrap();
    }

    #[test]
    fn test_server_reflexive_timeout_yields_none_ok() {
        // Nobody listening on the far side.
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let base = sock.local_addr().unwrap();
        let silent: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let got = server_reflexive_candidate(&sock, silent, base).unwrap();
        assert!(got.is_none());
    }
}
