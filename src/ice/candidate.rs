use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

/// Preference by candidate type (according to WebRTC conventions)
const HOST_TYPE_PREF: u32 = 126;
const PEER_REFLEXIVE_TYPE_PREF: u32 = 110;
const SERVER_REFLEXIVE_TYPE_PREF: u32 = 100;
const RELAYED_TYPE_PREF: u32 = 0;

/// Maximum local preference (interface-insensitive)
const MAX_LOCAL_PREF: u16 = u16::MAX;

/// Offsets used in the priority calculation -> RFC 8445 §5.1.2.1
const TYPE_PREF_SHIFT: u32 = 24;
const LOCAL_PREF_SHIFT: u32 = 8;
const COMPONENT_OFFSET: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relayed,
}

impl CandidateType {
    const fn sdp_token(self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relayed => "relay",
        }
    }

    fn from_sdp_token(tok: &str) -> Option<Self> {
        match tok {
            "host" => Some(CandidateType::Host),
            "srflx" => Some(CandidateType::ServerReflexive),
            "prflx" => Some(CandidateType::PeerReflexive),
            "relay" => Some(CandidateType::Relayed),
            _ => None,
        }
    }
}

/// Represents a network address that a peer can offer to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Unique identifier that groups similar candidates
    pub foundation: String,
    /// 1 = RTP; with rtcp-mux there is never a second component
    pub component: u8,
    /// Transport protocol, always "udp" here.
    pub transport: String,
    /// 32-bit priority used for pair ordering.
    pub priority: u32,
    /// IP + port.
    pub address: SocketAddr,
    /// Candidate type.
    pub cand_type: CandidateType,
    /// Base address for reflexive candidates.
    pub related_address: Option<SocketAddr>,
}

impl Candidate {
    #[must_use]
    pub fn new(
        foundation: String,
        component: u8,
        transport: &str,
        priority: u32,
        address: SocketAddr,
        cand_type: CandidateType,
        related_address: Option<SocketAddr>,
    ) -> Self {
        let t = transport.to_ascii_lowercase();

        let foundation = if foundation.is_empty() {
            Self::calculate_foundation(cand_type, &t, &address.ip().to_string())
        } else {
            foundation
        };

        let priority = if priority == 0 {
            Self::calculate_priority(cand_type, MAX_LOCAL_PREF, component)
        } else {
            priority
        };

        Self {
            foundation,
            component,
            transport: t,
            priority,
            address,
            cand_type,
            related_address,
        }
    }

    /// Convenience for host candidates
    #[must_use]
    pub fn host(address: SocketAddr, component: u8) -> Self {
        Self::new(
            String::new(),
            component,
            "udp",
            0, // let ctor compute
            address,
            CandidateType::Host,
            None,
        )
    }

    /// Convenience for server-reflexive candidates learned from a STUN server.
    #[must_use]
    pub fn server_reflexive(address: SocketAddr, base: SocketAddr, component: u8) -> Self {
        Self::new(
            String::new(),
            component,
            "udp",
            0,
            address,
            CandidateType::ServerReflexive,
            Some(base),
        )
    }

    /// Convenience for peer-reflexive candidates learned from inbound checks.
    #[must_use]
    pub fn peer_reflexive(address: SocketAddr, priority: u32, component: u8) -> Self {
        Self::new(
            String::new(),
            component,
            "udp",
            priority,
            address,
            CandidateType::PeerReflexive,
            None,
        )
    }

    // RFC 8445 §5.1.1.3: foundation (any stable identifier OK)
    fn calculate_foundation(cand_type: CandidateType, transport_lc: &str, base_ip: &str) -> String {
        let mut hasher = DefaultHasher::new();
        format!("{cand_type:?}-{transport_lc}-{base_ip}").hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    // RFC 8445 §5.1.2.1: 32-bit candidate priority
    #[must_use]
    pub const fn calculate_priority(
        cand_type: CandidateType,
        local_pref: u16,
        component_id: u8,
    ) -> u32 {
        let type_pref = match cand_type {
            CandidateType::Host => HOST_TYPE_PREF,
            CandidateType::ServerReflexive => SERVER_REFLEXIVE_TYPE_PREF,
            CandidateType::PeerReflexive => PEER_REFLEXIVE_TYPE_PREF,
            CandidateType::Relayed => RELAYED_TYPE_PREF,
        };

        (type_pref << TYPE_PREF_SHIFT)
            | ((local_pref as u32) << LOCAL_PREF_SHIFT)
            | (COMPONENT_OFFSET - component_id as u32)
    }

    /// Renders the value of an `a=candidate:` SDP attribute.
    #[must_use]
    pub fn to_sdp_value(&self) -> String {
        let mut out = format!(
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.transport,
            self.priority,
            self.address.ip(),
            self.address.port(),
            self.cand_type.sdp_token()
        );
        if let Some(rel) = &self.related_address {
            out.push_str(&format!(" raddr {} rport {}", rel.ip(), rel.port()));
        }
        out
    }

    /// Parses the value of an `a=candidate:` SDP attribute.
    #[must_use]
    pub fn from_sdp_value(value: &str) -> Option<Self> {
        let value = value.strip_prefix("candidate:").unwrap_or(value);
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 8 || parts[6] != "typ" {
            return None;
        }
        let foundation = parts[0].to_string();
        let component = parts[1].parse::<u8>().ok()?;
        let transport = parts[2];
        let priority = parts[3].parse::<u32>().ok()?;
        let ip = parts[4].parse::<std::net::IpAddr>().ok()?;
        let port = parts[5].parse::<u16>().ok()?;
        let cand_type = CandidateType::from_sdp_token(parts[7])?;

        let related_address = if parts.len() >= 12 && parts[8] == "raddr" && parts[10] == "rport" {
            let rip = parts[9].parse::<std::net::IpAddr>().ok()?;
            let rport = parts[11].parse::<u16>().ok()?;
            Some(SocketAddr::new(rip, rport))
        } else {
            None
        };

        Some(Self::new(
            foundation,
            component,
            transport,
            priority,
            SocketAddr::new(ip, port),
            cand_type,
            related_address,
        ))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.transport,
            self.priority,
            self.address,
            self.cand_type.sdp_token()
        )
    }
}
