use crate::ice::agent::IceRole;
use crate::ice::candidate::Candidate;

/// Check state of a candidate pair -> RFC 8445 §6.1.2.6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePairState {
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub local: Candidate,
    pub remote: Candidate,
    pub priority: u64,
    pub state: CandidatePairState,
    pub nominated: bool,
}

impl CandidatePair {
    #[must_use]
    pub fn new(local: Candidate, remote: Candidate, priority: u64) -> Self {
        CandidatePair {
            local,
            remote,
            priority,
            state: CandidatePairState::Waiting,
            nominated: false,
        }
    }

    /// Pair priority -> RFC 8445 §6.1.2.3.
    ///
    /// `g` is the controlling agent's candidate priority and `d` the
    /// controlled agent's, which makes the result identical on both sides.
    #[must_use]
    pub fn calculate_pair_priority(local: &Candidate, remote: &Candidate, role: &IceRole) -> u64 {
        let (g, d) = match role {
            IceRole::Controlling => (u64::from(local.priority), u64::from(remote.priority)),
            IceRole::Controlled => (u64::from(remote.priority), u64::from(local.priority)),
        };
        (1u64 << 32) * g.min(d) + 2 * g.max(d) + u64::from(g > d)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::ice::candidate::CandidateType;

    fn mock_candidate(priority: u32, addr: &str) -> Candidate {
        Candidate::new(
            "f".into(),
            1,
            "udp",
            priority,
            addr.parse().unwrap(),
            CandidateType::Host,
            None,
        )
    }

    #[test]
    fn test_pair_priority_symmetric_across_roles_ok() {
        let a = mock_candidate(200, "10.0.0.1:1000");
        let b = mock_candidate(100, "10.0.0.2:2000");

        // Controlling side sees (local=a, remote=b); controlled sees the mirror.
        let controlling = CandidatePair::calculate_pair_priority(&a, &b, &IceRole::Controlling);
        let controlled = CandidatePair::calculate_pair_priority(&b, &a, &IceRole::Controlled);
        assert_eq!(controlling, controlled);
    }

    #[test]
    fn test_pair_priority_formula_ok() {
        let a = mock_candidate(200, "10.0.0.1:1000");
        let b = mock_candidate(100, "10.0.0.2:2000");
        let p = CandidatePair::calculate_pair_priority(&a, &b, &IceRole::Controlling);
        assert_eq!(p, (1u64 << 32) * 100 + 2 * 200 + 1);
    }

    #[test]
    fn test_new_pair_starts_waiting_ok() {
        let a = mock_candidate(200, "10.0.0.1:1000");
        let b = mock_candidate(100, "10.0.0.2:2000");
        let pair = CandidatePair::new(a, b, 42);
        assert_eq!(pair.state, CandidatePairState::Waiting);
        assert!(!pair.nominated);
    }
}
