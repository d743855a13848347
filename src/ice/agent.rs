//! ICE agent: candidate bookkeeping, connectivity checks, nomination and
//! keepalives over the bundle socket.
//!
//! The agent never reads the socket itself. The transport demultiplexer feeds
//! it inbound STUN datagrams through a channel and all outgoing datagrams go
//! through the shared write handle, so the single-reader/single-writer rule
//! holds for the whole bundle.

use rand::Rng;
use rand::rngs::OsRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::config::RtcConfig;
use crate::ice::candidate::{Candidate, CandidateType};
use crate::ice::candidate_pair::{CandidatePair, CandidatePairState};
use crate::ice::ice_error::IceError;
use crate::log::log_sink::LogSink;
use crate::stun::{MessageClass, StunMessage};
use crate::transport::writer::WriteHandle;
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

/// Upper bound to avoid combinatorial explosion when forming pairs.
const MAX_PAIR_LIMIT: usize = 100;

/// Tick for draining the inbound channel inside the check loop.
const RECV_TICK: Duration = Duration::from_millis(20);

const COMPONENT_RTP: u8 = 1;

/// Role for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceRole {
    /// Decides which candidate pair is used for the connection (the offerer).
    Controlling,
    /// Accepts the nominated pair (the answerer).
    Controlled,
}

/// Agent states -> RFC 8445 §6.1.3, collapsed to what one bundle needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Gathering,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Liveness transitions reported by the keepalive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceEvent {
    Connected,
    Disconnected,
    /// The pair stayed dead past twice the keepalive budget.
    Failed,
}

/// Local or remote ufrag/pwd pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

impl IceCredentials {
    /// Fresh random credentials (ufrag 8 chars, pwd 24 chars).
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            ufrag: gen_token(8),
            pwd: gen_token(24),
        }
    }
}

fn gen_token(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = OsRng;
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// A connectivity check in flight.
struct Transaction {
    tid: [u8; 12],
    pair_index: usize,
    nominating: bool,
    rto: Duration,
    next_retransmit: Instant,
    attempts: u32,
}

/// Orchestrates gathering bookkeeping, checks, nomination and keepalives for
/// one bundle.
pub struct IceAgent {
    logger: Arc<dyn LogSink>,
    pub role: IceRole,
    tie_breaker: u64,
    local: IceCredentials,
    remote: Option<IceCredentials>,
    local_candidates: Vec<Candidate>,
    remote_candidates: Vec<Candidate>,
    pairs: Vec<CandidatePair>,
    state: IceConnectionState,
    check_pacing: Duration,
    initial_rto: Duration,
    max_retransmits: u32,
}

impl IceAgent {
    #[must_use]
    pub fn new(role: IceRole, config: &RtcConfig, logger: Arc<dyn LogSink>) -> Self {
        Self {
            logger,
            role,
            tie_breaker: OsRng.r#gen(),
            local: IceCredentials::fresh(),
            remote: None,
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            pairs: Vec::new(),
            state: IceConnectionState::New,
            check_pacing: config.ice_check_pacing,
            initial_rto: config.ice_initial_rto,
            max_retransmits: config.ice_max_retransmits,
        }
    }

    #[must_use]
    pub fn local_credentials(&self) -> &IceCredentials {
        &self.local
    }

    #[must_use]
    pub fn local_candidates(&self) -> &[Candidate] {
        &self.local_candidates
    }

    #[must_use]
    pub fn state(&self) -> IceConnectionState {
        self.state
    }

    /// Replaces local credentials and clears candidate state (ICE restart).
    pub fn restart(&mut self) {
        self.local = IceCredentials::fresh();
        self.remote = None;
        self.remote_candidates.clear();
        self.pairs.clear();
        self.state = IceConnectionState::New;
    }

    pub fn set_remote_credentials(&mut self, creds: IceCredentials) {
        self.remote = Some(creds);
    }

    pub fn add_local_candidate(&mut self, candidate: Candidate) {
        self.state = IceConnectionState::Gathering;
        if !self
            .local_candidates
            .iter()
            .any(|c| c.address == candidate.address)
        {
            self.local_candidates.push(candidate);
        }
    }

    pub fn add_remote_candidate(&mut self, candidate: Candidate) {
        if !self
            .remote_candidates
            .iter()
            .any(|c| c.address == candidate.address)
        {
            self.remote_candidates.push(candidate);
        }
    }

    /// Builds all candidate pairs between local and remote candidates.
    /// According to RFC 8445 §6.1.2.3:
    /// - Each local candidate is paired with each remote candidate.
    /// - Pair priority depends on the agent's role.
    /// - Mixed address families and transports are skipped.
    /// - The resulting list is sorted by descending priority.
    ///
    /// # Returns
    /// The number of pairs formed.
    pub fn form_candidate_pairs(&mut self) -> usize {
        let mut pairs: Vec<CandidatePair> = Vec::new();

        for local in &self.local_candidates {
            if pairs.len() >= MAX_PAIR_LIMIT {
                break;
            }
            for remote in &self.remote_candidates {
                if local.address.is_ipv4() != remote.address.is_ipv4() {
                    continue;
                }
                if local.transport != remote.transport {
                    continue;
                }
                if pairs
                    .iter()
                    .any(|p| p.local.address == local.address && p.remote.address == remote.address)
                {
                    continue;
                }

                let priority = CandidatePair::calculate_pair_priority(local, remote, &self.role);
                pairs.push(CandidatePair::new(local.clone(), remote.clone(), priority));

                if pairs.len() >= MAX_PAIR_LIMIT {
                    sink_warn!(
                        self.logger,
                        "[ICE] Candidate pair limit reached ({}), truncating",
                        MAX_PAIR_LIMIT
                    );
                    break;
                }
            }
        }

        pairs.sort_by(|a, b| b.priority.cmp(&a.priority));

        let count = pairs.len();
        self.pairs = pairs;
        count
    }

    /// Runs connectivity checks until one pair is nominated and succeeded.
    ///
    /// Checks are paced, retransmitted with a doubling RTO, and answered
    /// inline (triggered checks). The controlling agent nominates
    /// aggressively: every check carries USE-CANDIDATE and the
    /// highest-priority succeeded pair wins.
    ///
    /// # Errors
    /// `Timeout` when the deadline passes, `AllPairsFailed` when every pair
    /// exhausted its budget, `ChannelClosed` if the demux went away,
    /// `Cancelled` when `run` clears.
    pub fn run_checks(
        &mut self,
        stun_rx: &Receiver<(Vec<u8>, SocketAddr)>,
        writer: &WriteHandle,
        deadline: Instant,
        run: &AtomicBool,
    ) -> Result<CandidatePair, IceError> {
        if self.remote.is_none() {
            return Err(IceError::MissingRemoteCredentials);
        }
        if self.local_candidates.is_empty() {
            return Err(IceError::NoCandidates);
        }
        if self.pairs.is_empty() {
            self.form_candidate_pairs();
        }

        self.state = IceConnectionState::Checking;
        sink_info!(
            self.logger,
            "[ICE] Starting checks as {:?}: {} pairs",
            self.role,
            self.pairs.len()
        );

        let mut transactions: Vec<Transaction> = Vec::new();
        let mut next_scheduled = Instant::now();

        loop {
            if !run.load(Ordering::Relaxed) {
                self.state = IceConnectionState::Closed;
                return Err(IceError::Cancelled);
            }
            if Instant::now() >= deadline {
                self.state = IceConnectionState::Failed;
                return Err(IceError::Timeout);
            }

            match stun_rx.recv_timeout(RECV_TICK) {
                Ok((data, from)) => {
                    self.handle_datagram(&data, from, writer, &mut transactions)?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.state = IceConnectionState::Failed;
                    return Err(IceError::ChannelClosed);
                }
            }

            self.retransmit_due(writer, &mut transactions)?;

            if Instant::now() >= next_scheduled {
                if let Some(idx) = self.next_waiting_pair() {
                    self.send_check(idx, writer, &mut transactions)?;
                    next_scheduled = Instant::now() + self.check_pacing;
                }
            }

            if let Some(pair) = self.selected_pair() {
                self.state = IceConnectionState::Connected;
                sink_info!(
                    self.logger,
                    "[ICE] Pair nominated: local={} remote={}",
                    pair.local.address,
                    pair.remote.address
                );
                return Ok(pair);
            }

            let all_failed = self
                .pairs
                .iter()
                .all(|p| p.state == CandidatePairState::Failed);
            if all_failed && transactions.is_empty() {
                self.state = IceConnectionState::Failed;
                return Err(IceError::AllPairsFailed);
            }
        }
    }

    /// Keeps the selected pair alive until `run` clears.
    ///
    /// Sends one check per interval; a response within the next interval
    /// resets the miss counter. `budget` consecutive unanswered intervals
    /// report `Disconnected`; a later response reports `Connected` again.
    /// At twice the budget the pair is given up on: the agent reports
    /// `Failed` and returns. Inbound requests (the peer's keepalives) keep
    /// being answered.
    pub fn run_keepalive(
        &mut self,
        pair: &CandidatePair,
        stun_rx: &Receiver<(Vec<u8>, SocketAddr)>,
        writer: &WriteHandle,
        interval: Duration,
        budget: u32,
        run: &AtomicBool,
        events: &Sender<IceEvent>,
    ) {
        let mut misses: u32 = 0;
        let mut outstanding: Vec<[u8; 12]> = Vec::new();
        let mut next_send = Instant::now();

        while run.load(Ordering::Relaxed) {
            if Instant::now() >= next_send {
                if !outstanding.is_empty() {
                    misses = misses.saturating_add(1);
                    if misses == budget {
                        sink_warn!(
                            self.logger,
                            "[ICE] {} keepalives unanswered, reporting disconnected",
                            budget
                        );
                        self.state = IceConnectionState::Disconnected;
                        let _ = events.send(IceEvent::Disconnected);
                    }
                    if misses >= budget.saturating_mul(2) {
                        sink_warn!(
                            self.logger,
                            "[ICE] {} keepalives unanswered, giving up on the pair",
                            misses
                        );
                        self.state = IceConnectionState::Failed;
                        let _ = events.send(IceEvent::Failed);
                        return;
                    }
                    outstanding.clear();
                }
                if let Ok((msg, raw)) = self.build_check(pair, self.role == IceRole::Controlling) {
                    outstanding.push(msg.transaction_id);
                    if writer.send_to(raw, pair.remote.address).is_err() {
                        return;
                    }
                }
                next_send = Instant::now() + interval;
            }

            match stun_rx.recv_timeout(RECV_TICK) {
                Ok((data, from)) => {
                    let Ok(msg) = StunMessage::decode(&data) else {
                        continue;
                    };
                    match msg.class {
                        MessageClass::Request => {
                            self.answer_request(&msg, &data, from, writer);
                        }
                        MessageClass::SuccessResponse => {
                            if outstanding.contains(&msg.transaction_id) {
                                outstanding.clear();
                                if misses >= budget {
                                    sink_info!(self.logger, "[ICE] Keepalive recovered");
                                    self.state = IceConnectionState::Connected;
                                    let _ = events.send(IceEvent::Connected);
                                }
                                misses = 0;
                            }
                        }
                        _ => {}
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        self.state = IceConnectionState::Closed;
    }

    // ------------------------------------------------------------------
    // check plumbing
    // ------------------------------------------------------------------

    fn handle_datagram(
        &mut self,
        data: &[u8],
        from: SocketAddr,
        writer: &WriteHandle,
        transactions: &mut Vec<Transaction>,
    ) -> Result<(), IceError> {
        let Ok(msg) = StunMessage::decode(data) else {
            sink_trace!(self.logger, "[ICE] Dropping undecodable STUN from {}", from);
            return Ok(());
        };

        match msg.class {
            MessageClass::Request => self.handle_request(&msg, data, from, writer, transactions),
            MessageClass::SuccessResponse => {
                self.handle_response(&msg, transactions);
                Ok(())
            }
            MessageClass::ErrorResponse => {
                if let Some(pos) = transactions
                    .iter()
                    .position(|t| t.tid == msg.transaction_id)
                {
                    let txn = transactions.remove(pos);
                    self.set_pair_state(txn.pair_index, CandidatePairState::Failed);
                }
                Ok(())
            }
            MessageClass::Indication => Ok(()),
        }
    }

    fn handle_request(
        &mut self,
        msg: &StunMessage,
        raw: &[u8],
        from: SocketAddr,
        writer: &WriteHandle,
        transactions: &mut Vec<Transaction>,
    ) -> Result<(), IceError> {
        if !self.answer_request(msg, raw, from, writer) {
            return Ok(());
        }

        // Unknown source: learn a peer-reflexive candidate.
        if !self.remote_candidates.iter().any(|c| c.address == from) {
            let priority = msg.priority().unwrap_or(0);
            sink_debug!(
                self.logger,
                "[ICE] Learned peer-reflexive candidate {} (priority {})",
                from,
                priority
            );
            self.add_remote_candidate(Candidate::peer_reflexive(from, priority, COMPONENT_RTP));
            self.form_candidate_pairs();
        }

        let use_candidate = msg.use_candidate();
        if let Some(idx) = self.pairs.iter().position(|p| p.remote.address == from) {
            if use_candidate && self.role == IceRole::Controlled {
                self.pairs[idx].nominated = true;
            }
            // Triggered check for pairs we have not proven yet.
            let state = self.pairs[idx].state;
            if state == CandidatePairState::Waiting || state == CandidatePairState::Failed {
                self.send_check(idx, writer, transactions)?;
            }
        }
        Ok(())
    }

    /// Validates an inbound Binding request and sends the success response.
    /// Returns false when the request was dropped.
    fn answer_request(
        &self,
        msg: &StunMessage,
        raw: &[u8],
        from: SocketAddr,
        writer: &WriteHandle,
    ) -> bool {
        let expected_prefix = format!("{}:", self.local.ufrag);
        if !msg
            .username()
            .is_some_and(|u| u.starts_with(&expected_prefix))
        {
            sink_warn!(self.logger, "[ICE] Request from {} with bad username", from);
            return false;
        }
        if msg
            .verify_integrity(raw, self.local.pwd.as_bytes())
            .is_err()
        {
            sink_warn!(
                self.logger,
                "[ICE] Request from {} failed integrity check",
                from
            );
            return false;
        }

        let mut resp = StunMessage::binding_response(msg.transaction_id);
        resp.add_xor_mapped_address(&from);
        let raw = resp.encode(Some(self.local.pwd.as_bytes()));
        writer.send_to(raw, from).is_ok()
    }

    fn handle_response(&mut self, msg: &StunMessage, transactions: &mut Vec<Transaction>) {
        let Some(pos) = transactions
            .iter()
            .position(|t| t.tid == msg.transaction_id)
        else {
            return;
        };
        let txn = transactions.remove(pos);
        self.set_pair_state(txn.pair_index, CandidatePairState::Succeeded);
        if txn.nominating {
            if let Some(pair) = self.pairs.get_mut(txn.pair_index) {
                pair.nominated = true;
            }
        }
    }

    fn send_check(
        &mut self,
        pair_index: usize,
        writer: &WriteHandle,
        transactions: &mut Vec<Transaction>,
    ) -> Result<(), IceError> {
        let nominate = self.role == IceRole::Controlling;
        let (msg, raw) = {
            let Some(pair) = self.pairs.get(pair_index) else {
                return Ok(());
            };
            self.build_check(pair, nominate)?
        };
        let remote_addr = self.pairs[pair_index].remote.address;

        self.set_pair_state(pair_index, CandidatePairState::InProgress);
        transactions.push(Transaction {
            tid: msg.transaction_id,
            pair_index,
            nominating: nominate,
            rto: self.initial_rto,
            next_retransmit: Instant::now() + self.initial_rto,
            attempts: 0,
        });

        writer
            .send_to(raw, remote_addr)
            .map_err(|_| IceError::ChannelClosed)
    }

    fn build_check(
        &self,
        pair: &CandidatePair,
        nominate: bool,
    ) -> Result<(StunMessage, Vec<u8>), IceError> {
        let remote = self
            .remote
            .as_ref()
            .ok_or(IceError::MissingRemoteCredentials)?;

        let mut msg = StunMessage::binding_request();
        msg.add_username(&format!("{}:{}", remote.ufrag, self.local.ufrag));
        // PRIORITY carries the prflx preference the peer should use for us.
        msg.add_priority(Candidate::calculate_priority(
            CandidateType::PeerReflexive,
            u16::MAX,
            pair.local.component,
        ));
        match self.role {
            IceRole::Controlling => {
                msg.add_ice_controlling(self.tie_breaker);
                if nominate {
                    msg.add_use_candidate();
                }
            }
            IceRole::Controlled => msg.add_ice_controlled(self.tie_breaker),
        }
        let raw = msg.encode(Some(remote.pwd.as_bytes()));
        Ok((msg, raw))
    }

    fn retransmit_due(
        &mut self,
        writer: &WriteHandle,
        transactions: &mut Vec<Transaction>,
    ) -> Result<(), IceError> {
        let now = Instant::now();
        let mut failed_pairs = Vec::new();

        let mut i = 0;
        while i < transactions.len() {
            if now < transactions[i].next_retransmit {
                i += 1;
                continue;
            }
            if transactions[i].attempts >= self.max_retransmits {
                let txn = transactions.remove(i);
                failed_pairs.push(txn.pair_index);
                continue;
            }

            let (raw, remote_addr) = {
                let txn = &transactions[i];
                let Some(pair) = self.pairs.get(txn.pair_index) else {
                    transactions.remove(i);
                    continue;
                };
                let (_, raw) = self.rebuild_check(txn, pair)?;
                (raw, pair.remote.address)
            };

            let txn = &mut transactions[i];
            txn.attempts += 1;
            txn.rto *= 2;
            txn.next_retransmit = now + txn.rto;
            writer
                .send_to(raw, remote_addr)
                .map_err(|_| IceError::ChannelClosed)?;
            i += 1;
        }

        for idx in failed_pairs {
            sink_debug!(self.logger, "[ICE] Pair {} exhausted retransmits", idx);
            self.set_pair_state(idx, CandidatePairState::Failed);
        }
        Ok(())
    }

    /// Re-encodes a retransmission, keeping the original transaction id.
    fn rebuild_check(
        &self,
        txn: &Transaction,
        pair: &CandidatePair,
    ) -> Result<(StunMessage, Vec<u8>), IceError> {
        let remote = self
            .remote
            .as_ref()
            .ok_or(IceError::MissingRemoteCredentials)?;

        let mut msg = StunMessage::new(MessageClass::Request, txn.tid);
        msg.add_username(&format!("{}:{}", remote.ufrag, self.local.ufrag));
        msg.add_priority(Candidate::calculate_priority(
            CandidateType::PeerReflexive,
            u16::MAX,
            pair.local.component,
        ));
        match self.role {
            IceRole::Controlling => {
                msg.add_ice_controlling(self.tie_breaker);
                if txn.nominating {
                    msg.add_use_candidate();
                }
            }
            IceRole::Controlled => msg.add_ice_controlled(self.tie_breaker),
        }
        let raw = msg.encode(Some(remote.pwd.as_bytes()));
        Ok((msg, raw))
    }

    fn next_waiting_pair(&self) -> Option<usize> {
        self.pairs
            .iter()
            .position(|p| p.state == CandidatePairState::Waiting)
    }

    /// The highest-priority succeeded and nominated pair, if any.
    fn selected_pair(&self) -> Option<CandidatePair> {
        self.pairs
            .iter()
            .filter(|p| p.state == CandidatePairState::Succeeded && p.nominated)
            .max_by_key(|p| p.priority)
            .cloned()
    }

    fn set_pair_state(&mut self, index: usize, state: CandidatePairState) {
        if let Some(pair) = self.pairs.get_mut(index) {
            pair.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::noop_log_sink::NoopLogSink;
    use std::sync::mpsc;
    use std::thread;

    fn mock_config() -> RtcConfig {
        RtcConfig {
            ice_check_pacing: Duration::from_millis(10),
            ice_initial_rto: Duration::from_millis(50),
            ice_max_retransmits: 3,
            ..RtcConfig::default()
        }
    }

    fn mock_agent(role: IceRole) -> IceAgent {
        IceAgent::new(role, &mock_config(), Arc::new(NoopLogSink))
    }

    /// Wires an agent's outbound datagrams into the peer's inbound channel,
    /// stamping them with `from` as the source address.
    fn mock_forwarder(
        out_rx: Receiver<(Vec<u8>, SocketAddr)>,
        peer_in: Sender<(Vec<u8>, SocketAddr)>,
        from: SocketAddr,
    ) {
        thread::spawn(move || {
            for (data, _dest) in out_rx {
                if peer_in.send((data, from)).is_err() {
                    break;
                }
            }
        });
    }

    #[test]
    fn test_form_pairs_filters_and_sorts_ok() {
        let mut agent = mock_agent(IceRole::Controlling);
        agent.add_local_candidate(Candidate::host("10.0.0.1:4000".parse().unwrap(), 1));
        agent.add_local_candidate(Candidate::host("[::1]:4000".parse().unwrap(), 1));
        agent.add_remote_candidate(Candidate::host("10.0.0.2:5000".parse().unwrap(), 1));
        agent.add_remote_candidate(Candidate::peer_reflexive(
            "10.0.0.3:5001".parse().unwrap(),
            100,
            1,
        ));

        // The v6 local pairs with nothing; the v4 one pairs with both remotes.
        let count = agent.form_candidate_pairs();
        assert_eq!(count, 2);
        assert!(agent.pairs[0].priority >= agent.pairs[1].priority);

        // Re-forming with the same candidates changes nothing.
        assert_eq!(agent.form_candidate_pairs(), 2);
    }

    #[test]
    fn test_duplicate_candidates_ignored_ok() {
        let mut agent = mock_agent(IceRole::Controlled);
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        agent.add_local_candidate(Candidate::host(addr, 1));
        agent.add_local_candidate(Candidate::host(addr, 1));
        assert_eq!(agent.local_candidates().len(), 1);
    }

    #[test]
    fn test_run_checks_missing_remote_credentials_error() {
        let mut agent = mock_agent(IceRole::Controlling);
        let (_tx, rx) = mpsc::channel();
        let (out_tx, _out_rx) = mpsc::channel();
        let err = agent
            .run_checks(
                &rx,
                &WriteHandle::new(out_tx),
                Instant::now() + Duration::from_millis(100),
                &AtomicBool::new(true),
            )
            .unwrap_err();
        assert!(matches!(err, IceError::MissingRemoteCredentials));
    }

    #[test]
    fn test_run_checks_deadline_without_peer_error() {
        let mut agent = mock_agent(IceRole::Controlling);
        agent.set_remote_credentials(IceCredentials::fresh());
        agent.add_local_candidate(Candidate::host("127.0.0.1:4000".parse().unwrap(), 1));
        agent.add_remote_candidate(Candidate::host("127.0.0.1:5000".parse().unwrap(), 1));

        let (_tx, rx) = mpsc::channel();
        let (out_tx, _out_rx) = mpsc::channel();
        let err = agent
            .run_checks(
                &rx,
                &WriteHandle::new(out_tx),
                Instant::now() + Duration::from_millis(120),
                &AtomicBool::new(true),
            )
            .unwrap_err();
        assert!(matches!(err, IceError::Timeout));
        assert_eq!(agent.state(), IceConnectionState::Failed);
    }

    #[test]
    fn test_run_checks_two_agents_converge_ok() {
        let a_addr: SocketAddr = "127.0.0.1:41000".parse().unwrap();
        let b_addr: SocketAddr = "127.0.0.1:42000".parse().unwrap();

        let mut a = mock_agent(IceRole::Controlling);
        let mut b = mock_agent(IceRole::Controlled);
        a.set_remote_credentials(b.local_credentials().clone());
        b.set_remote_credentials(a.local_credentials().clone());
        a.add_local_candidate(Candidate::host(a_addr, 1));
        a.add_remote_candidate(Candidate::host(b_addr, 1));
        b.add_local_candidate(Candidate::host(b_addr, 1));
        b.add_remote_candidate(Candidate::host(a_addr, 1));

        let (a_in_tx, a_in_rx) = mpsc::channel();
        let (b_in_tx, b_in_rx) = mpsc::channel();
        let (a_out_tx, a_out_rx) = mpsc::channel();
        let (b_out_tx, b_out_rx) = mpsc::channel();
        mock_forwarder(a_out_rx, b_in_tx, a_addr);
        mock_forwarder(b_out_rx, a_in_tx, b_addr);

        let deadline = Instant::now() + Duration::from_secs(3);
        let a_handle = thread::spawn(move || {
            let run = AtomicBool::new(true);
            let pair = a.run_checks(&a_in_rx, &WriteHandle::new(a_out_tx), deadline, &run);
            (a, pair)
        });
        let b_handle = thread::spawn(move || {
            let run = AtomicBool::new(true);
            let pair = b.run_checks(&b_in_rx, &WriteHandle::new(b_out_tx), deadline, &run);
            (b, pair)
        });

        let (a, a_pair) = a_handle.join().unwrap();
        let (b, b_pair) = b_handle.join().unwrap();
        let a_pair = a_pair.unwrap();
        let b_pair = b_pair.unwrap();

        assert_eq!(a.state(), IceConnectionState::Connected);
        assert_eq!(b.state(), IceConnectionState::Connected);
        assert_eq!(a_pair.remote.address, b_pair.local.address);
        assert_eq!(b_pair.remote.address, a_pair.local.address);
        assert!(a_pair.nominated);
        assert!(b_pair.nominated);
    }

    #[test]
    fn test_keepalive_reports_disconnected_error() {
        let mut agent = mock_agent(IceRole::Controlling);
        agent.set_remote_credentials(IceCredentials::fresh());
        let local = Candidate::host("127.0.0.1:4000".parse().unwrap(), 1);
        let remote = Candidate::host("127.0.0.1:5000".parse().unwrap(), 1);
        let priority = CandidatePair::calculate_pair_priority(&local, &remote, &IceRole::Controlling);
        let pair = CandidatePair::new(local, remote, priority);

        let (_in_tx, in_rx) = mpsc::channel();
        let (out_tx, _out_rx) = mpsc::channel();
        let (ev_tx, ev_rx) = mpsc::channel();
        let run = AtomicBool::new(true);

        thread::scope(|s| {
            let agent = &mut agent;
            let pair = &pair;
            let run = &run;
            let ev_tx = &ev_tx;
            s.spawn(move || {
                agent.run_keepalive(
                    pair,
                    &in_rx,
                    &WriteHandle::new(out_tx),
                    Duration::from_millis(30),
                    2,
                    run,
                    ev_tx,
                );
            });
            let event = ev_rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(event, IceEvent::Disconnected);
            run.store(false, Ordering::Relaxed);
        });
        assert_eq!(agent.state(), IceConnectionState::Closed);
    }

    #[test]
    fn test_keepalive_exhaustion_reports_failed_error() {
        let mut agent = mock_agent(IceRole::Controlling);
        agent.set_remote_credentials(IceCredentials::fresh());
        let local = Candidate::host("127.0.0.1:4002".parse().unwrap(), 1);
        let remote = Candidate::host("127.0.0.1:5002".parse().unwrap(), 1);
        let priority = CandidatePair::calculate_pair_priority(&local, &remote, &IceRole::Controlling);
        let pair = CandidatePair::new(local, remote, priority);

        let (_in_tx, in_rx) = mpsc::channel();
        let (out_tx, _out_rx) = mpsc::channel();
        let (ev_tx, ev_rx) = mpsc::channel();
        let run = AtomicBool::new(true);

        // Nothing ever answers, so the loop must walk Disconnected into
        // Failed and exit on its own.
        thread::scope(|s| {
            let agent = &mut agent;
            let pair = &pair;
            let run = &run;
            let ev_tx = &ev_tx;
            s.spawn(move || {
                agent.run_keepalive(
                    pair,
                    &in_rx,
                    &WriteHandle::new(out_tx),
                    Duration::from_millis(20),
                    1,
                    run,
                    ev_tx,
                );
            });
            assert_eq!(
                ev_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
                IceEvent::Disconnected
            );
            assert_eq!(
                ev_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
                IceEvent::Failed
            );
        });
        assert_eq!(agent.state(), IceConnectionState::Failed);
    }

    #[test]
    fn test_restart_clears_remote_state_ok() {
        let mut agent = mock_agent(IceRole::Controlling);
        let before = agent.local_credentials().clone();
        agent.set_remote_credentials(IceCredentials::fresh());
        agent.add_local_candidate(Candidate::host("10.0.0.1:4000".parse().unwrap(), 1));
        agent.add_remote_candidate(Candidate::host("10.0.0.2:5000".parse().unwrap(), 1));
        agent.form_candidate_pairs();

        agent.restart();
        assert_ne!(agent.local_credentials(), &before);
        assert!(agent.pairs.is_empty());
        assert_eq!(agent.state(), IceConnectionState::New);
    }
}
