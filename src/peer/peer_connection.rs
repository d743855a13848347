//! The public connection object. Composes SDP negotiation, ICE, DTLS and
//! SRTP for one bundle and runs the connect flow on a background thread.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use rand::rngs::OsRng;

use crate::config::RtcConfig;
use crate::dtls::{DatagramChannel, DtlsCertificate, DtlsRole, run_dtls_handshake};
use crate::error::RtcError;
use crate::ice::{
    IceAgent, IceConnectionState, IceCredentials, IceEvent, IceRole, gathering,
};
use crate::log::log_sink::LogSink;
use crate::peer::events::PeerEvent;
use crate::peer::states::{
    DtlsState, PeerConnectionState, SignalingState, derive_connection_state,
};
use crate::peer::transceiver::{Transceiver, default_rtp_map};
use crate::rtcp::{self, RtcpPacket};
use crate::sdp::sdp_error::SdpError;
use crate::sdp::session_description::{negotiate_crypto, validate_answer};
use crate::sdp::{
    Direction, MediaDescription, MediaKind, SdpType, SessionDescription, Setup,
};
use crate::srtp::{SrtpContext, SrtpProfile};
use crate::track::local_track::TrackSender;
use crate::track::{LocalTrack, RemoteTrack};
use crate::transport::{BundleTransport, TransportEvent, TransportReceivers, WriteHandle};
use crate::{sink_debug, sink_error, sink_info, sink_warn};

const EVENT_TICK: Duration = Duration::from_millis(50);

/// State the background worker and the API surface both observe.
struct SharedState {
    ice: Mutex<IceConnectionState>,
    dtls: Mutex<DtlsState>,
    closed: AtomicBool,
    derived: Mutex<PeerConnectionState>,
    events: Sender<PeerEvent>,
}

impl SharedState {
    fn new(events: Sender<PeerEvent>) -> Self {
        Self {
            ice: Mutex::new(IceConnectionState::New),
            dtls: Mutex::new(DtlsState::New),
            closed: AtomicBool::new(false),
            derived: Mutex::new(PeerConnectionState::New),
            events,
        }
    }

    fn set_ice(&self, state: IceConnectionState) {
        if let Ok(mut guard) = self.ice.lock() {
            *guard = state;
        }
        self.refresh();
    }

    fn set_dtls(&self, state: DtlsState) {
        if let Ok(mut guard) = self.dtls.lock() {
            *guard = state;
        }
        self.refresh();
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.refresh();
    }

    fn refresh(&self) {
        let ice = self
            .ice
            .lock()
            .map_or(IceConnectionState::Failed, |g| *g);
        let dtls = self.dtls.lock().map_or(DtlsState::Failed, |g| *g);
        let next = derive_connection_state(self.closed.load(Ordering::Relaxed), ice, dtls);
        let changed = self
            .derived
            .lock()
            .map_or(false, |mut g| {
                if *g == next {
                    false
                } else {
                    *g = next;
                    true
                }
            });
        if changed {
            let _ = self.events.send(PeerEvent::ConnectionStateChange(next));
        }
    }

    fn connection_state(&self) -> PeerConnectionState {
        self.derived
            .lock()
            .map_or(PeerConnectionState::Failed, |g| *g)
    }
}

/// Outbound RTCP path, installed by the worker once SRTP keys exist.
struct RtcpSender {
    srtp: Arc<Mutex<SrtpContext>>,
    writer: WriteHandle,
    dest: SocketAddr,
}

/// Everything the connect worker needs, moved onto its thread.
struct ConnectArgs {
    agent: IceAgent,
    receivers: TransportReceivers,
    transport: Arc<BundleTransport>,
    writer: WriteHandle,
    certificate: DtlsCertificate,
    dtls_role: DtlsRole,
    remote_fingerprint: String,
    /// (track, ssrc, payload type) for every sending transceiver.
    local_binds: Vec<(Arc<LocalTrack>, u32, u8)>,
    /// (kind, mid, announced ssrc) for every remote media section.
    remote_sections: Vec<(MediaKind, String, Option<u32>)>,
    config: RtcConfig,
    shared: Arc<SharedState>,
    rtcp: Arc<Mutex<Option<RtcpSender>>>,
    run: Arc<AtomicBool>,
    logger: Arc<dyn LogSink>,
}

/// One WebRTC-style peer connection carrying a single bundle.
pub struct PeerConnection {
    logger: Arc<dyn LogSink>,
    config: RtcConfig,
    certificate: DtlsCertificate,
    fingerprint: String,
    signaling: SignalingState,
    closed: bool,
    transceivers: Vec<Transceiver>,
    next_mid: u32,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    ice: Option<IceAgent>,
    transport: Option<Arc<BundleTransport>>,
    receivers: Option<TransportReceivers>,
    shared: Arc<SharedState>,
    rtcp: Arc<Mutex<Option<RtcpSender>>>,
    events_rx: Option<Receiver<PeerEvent>>,
    run: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PeerConnection {
    /// Creates a connection with a fresh DTLS identity.
    ///
    /// # Errors
    /// Fails if certificate generation fails.
    pub fn new(config: RtcConfig, logger: Arc<dyn LogSink>) -> Result<Self, RtcError> {
        let certificate = DtlsCertificate::generate()?;
        let fingerprint = certificate.fingerprint()?;
        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            logger,
            config,
            certificate,
            fingerprint,
            signaling: SignalingState::Stable,
            closed: false,
            transceivers: Vec::new(),
            next_mid: 0,
            local_description: None,
            remote_description: None,
            ice: None,
            transport: None,
            receivers: None,
            shared: Arc::new(SharedState::new(events_tx)),
            rtcp: Arc::new(Mutex::new(None)),
            events_rx: Some(events_rx),
            run: Arc::new(AtomicBool::new(true)),
            worker: None,
        })
    }

    #[must_use]
    pub fn signaling_state(&self) -> SignalingState {
        self.signaling
    }

    #[must_use]
    pub fn connection_state(&self) -> PeerConnectionState {
        self.shared.connection_state()
    }

    #[must_use]
    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    #[must_use]
    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    /// Hands out the event receiver. Can be taken once.
    pub fn take_events(&mut self) -> Option<Receiver<PeerEvent>> {
        self.events_rx.take()
    }

    /// Adds a media section. With a track the section sends and receives,
    /// without one it only receives. Returns the assigned mid.
    ///
    /// # Errors
    /// `InvalidState` after `close`.
    pub fn add_transceiver(
        &mut self,
        kind: MediaKind,
        track: Option<Arc<LocalTrack>>,
    ) -> Result<String, RtcError> {
        self.ensure_open()?;
        let mid = self.next_mid.to_string();
        self.next_mid += 1;
        self.transceivers
            .push(Transceiver::new(mid.clone(), kind, track));
        Ok(mid)
    }

    /// Builds an offer covering every transceiver, gathering candidates and
    /// starting the bundle transport on first use.
    ///
    /// # Errors
    /// `InvalidState` when signaling is not stable, a negotiation is already
    /// running, or no transceiver was added.
    pub fn create_offer(&mut self) -> Result<SessionDescription, RtcError> {
        self.ensure_open()?;
        if self.signaling != SignalingState::Stable {
            return Err(RtcError::InvalidState(
                "create_offer requires stable signaling".into(),
            ));
        }
        if self.worker.is_some() {
            return Err(RtcError::InvalidState(
                "negotiation already in progress".into(),
            ));
        }
        if self.transceivers.is_empty() {
            return Err(RtcError::InvalidState(
                "create_offer requires at least one transceiver".into(),
            ));
        }
        self.ensure_transport(IceRole::Controlling)?;

        let mut desc = SessionDescription::new(SdpType::Offer);
        for i in 0..self.transceivers.len() {
            let direction = self.transceivers[i].direction;
            let rtp_maps = vec![default_rtp_map(self.transceivers[i].kind)];
            let media = self.build_media(i, Setup::ActPass, direction, rtp_maps)?;
            desc.add_media(media);
        }
        Ok(desc)
    }

    /// Builds the answer to the pending remote offer.
    ///
    /// # Errors
    /// `InvalidState` without a remote offer; `Sdp(NoCommonCryptoSuite)` when
    /// the offer shares no SRTP suite with us.
    pub fn create_answer(&mut self) -> Result<SessionDescription, RtcError> {
        self.ensure_open()?;
        if self.signaling != SignalingState::HaveRemoteOffer {
            return Err(RtcError::InvalidState(
                "create_answer requires a remote offer".into(),
            ));
        }
        self.ensure_transport(IceRole::Controlled)?;
        let remote = self
            .remote_description
            .clone()
            .ok_or_else(|| RtcError::InvalidState("remote offer missing".into()))?;

        let mut desc = SessionDescription::new(SdpType::Answer);
        for remote_media in &remote.media {
            let idx = self
                .transceivers
                .iter()
                .position(|t| t.mid == remote_media.mid)
                .ok_or(RtcError::Sdp(SdpError::AnswerMismatch("mid")))?;
            let suite = negotiate_crypto(
                &[SrtpProfile::Aes128CmSha1_80],
                &remote_media.crypto_suites,
            )?;
            let direction =
                answer_direction(remote_media.direction, self.transceivers[idx].direction);
            let rtp_maps = if remote_media.rtp_maps.is_empty() {
                vec![default_rtp_map(self.transceivers[idx].kind)]
            } else {
                remote_media.rtp_maps.clone()
            };
            if let Some(map) = rtp_maps.first() {
                self.transceivers[idx].payload_type = map.payload_type;
            }
            let mut media = self.build_media(idx, Setup::Active, direction, rtp_maps)?;
            media.crypto_suites = vec![suite];
            desc.add_media(media);
        }
        Ok(desc)
    }

    /// Applies a locally produced description and advances the signaling
    /// state; applying the final answer starts the connect flow.
    ///
    /// # Errors
    /// `InvalidState` on out-of-order application, `Sdp` on answer mismatch.
    pub fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), RtcError> {
        self.ensure_open()?;
        let next = self.signaling.apply_local(desc.sdp_type)?;
        if desc.sdp_type == SdpType::Answer {
            if let Some(offer) = &self.remote_description {
                validate_answer(offer, &desc)?;
            }
        }
        self.local_description = Some(desc);
        self.signaling = next;
        self.maybe_connect()
    }

    /// Applies the peer's description. A remote offer materializes missing
    /// transceivers; the final answer starts the connect flow.
    ///
    /// # Errors
    /// `InvalidState` on out-of-order application, `Sdp` on answer mismatch.
    pub fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), RtcError> {
        self.ensure_open()?;
        let next = self.signaling.apply_remote(desc.sdp_type)?;
        if desc.sdp_type == SdpType::Answer {
            if let Some(offer) = &self.local_description {
                validate_answer(offer, &desc)?;
            }
        }

        for media in &desc.media {
            let idx = match self.transceivers.iter().position(|t| t.mid == media.mid) {
                Some(i) => i,
                None => {
                    self.transceivers.push(Transceiver::new(
                        media.mid.clone(),
                        media.kind,
                        None,
                    ));
                    self.transceivers.len() - 1
                }
            };
            if media.ssrc.is_some() {
                self.transceivers[idx].remote_ssrc = media.ssrc;
            }
        }

        self.remote_description = Some(desc);
        self.signaling = next;
        self.maybe_connect()
    }

    /// Builds, encrypts and sends one compound RTCP packet to the peer.
    ///
    /// # Errors
    /// `InvalidState` before the connection is established or after `close`,
    /// `Rtcp` on encode failure, `Srtp` on protection failure,
    /// `TransportClosed` once the writer is gone.
    pub fn send_rtcp(&self, packets: &[RtcpPacket]) -> Result<(), RtcError> {
        self.ensure_open()?;
        let guard = self
            .rtcp
            .lock()
            .map_err(|_| RtcError::TransportClosed)?;
        let sender = guard.as_ref().ok_or_else(|| {
            RtcError::InvalidState("connection is not established".into())
        })?;
        let plain = rtcp::encode_compound(packets)?;
        let protected = {
            let mut srtp = sender
                .srtp
                .lock()
                .map_err(|_| RtcError::TransportClosed)?;
            srtp.protect_rtcp(&plain)?
        };
        sender
            .writer
            .send_to(protected, sender.dest)
            .map_err(|_| RtcError::TransportClosed)
    }

    /// Replaces the local ICE credentials ahead of a renegotiation. Only
    /// valid before the connect flow has started.
    ///
    /// # Errors
    /// `InvalidState` once connecting or connected.
    pub fn restart_ice(&mut self) -> Result<(), RtcError> {
        self.ensure_open()?;
        if self.worker.is_some() {
            return Err(RtcError::InvalidState(
                "ice restart requires a fresh connection".into(),
            ));
        }
        if let Some(agent) = self.ice.as_mut() {
            agent.restart();
        }
        Ok(())
    }

    /// Tears everything down: stops the worker threads, unbinds local
    /// tracks and closes the socket.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        sink_info!(self.logger, "[PEER] Closing connection");
        self.run.store(false, Ordering::Relaxed);
        for t in &self.transceivers {
            if let Some(track) = &t.track {
                track.unbind();
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Ok(mut slot) = self.rtcp.lock() {
            *slot = None;
        }
        self.receivers = None;
        self.transport = None;
        self.ice = None;
        self.shared.mark_closed();
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), RtcError> {
        if self.closed {
            return Err(RtcError::InvalidState("connection is closed".into()));
        }
        Ok(())
    }

    /// Binds the bundle socket, gathers candidates and starts the demux and
    /// writer threads. Idempotent.
    fn ensure_transport(&mut self, role: IceRole) -> Result<(), RtcError> {
        if self.transport.is_some() {
            return Ok(());
        }
        let socket =
            UdpSocket::bind(&self.config.bind_addr).map_err(|_| RtcError::TransportClosed)?;
        let mut agent = IceAgent::new(role, &self.config, self.logger.clone());

        let host = gathering::host_candidate(&socket)?;
        agent.add_local_candidate(host.clone());
        if let Some(server) = self.config.stun_server {
            match gathering::server_reflexive_candidate(&socket, server, host.address) {
                Ok(Some(srflx)) => agent.add_local_candidate(srflx),
                Ok(None) => {}
                Err(e) => {
                    sink_warn!(self.logger, "[PEER] Srflx gathering failed: {}", e);
                }
            }
        }

        let (transport, receivers) = BundleTransport::start(
            socket,
            u64::from(self.config.srtp_auth_failure_threshold),
            self.logger.clone(),
        )
        .map_err(|_| RtcError::TransportClosed)?;

        self.transport = Some(Arc::new(transport));
        self.receivers = Some(receivers);
        self.ice = Some(agent);
        Ok(())
    }

    /// Renders one media section for the transceiver at `idx`.
    fn build_media(
        &self,
        idx: usize,
        setup: Setup,
        direction: Direction,
        rtp_maps: Vec<crate::sdp::RtpMap>,
    ) -> Result<MediaDescription, RtcError> {
        let agent = self
            .ice
            .as_ref()
            .ok_or_else(|| RtcError::InvalidState("transport not started".into()))?;
        let t = &self.transceivers[idx];

        let mut media = MediaDescription::new(t.kind, t.mid.clone());
        media.direction = direction;
        media.ice_ufrag = agent.local_credentials().ufrag.clone();
        media.ice_pwd = agent.local_credentials().pwd.clone();
        media.fingerprint = Some(self.fingerprint.clone());
        media.setup = Some(setup);
        media.ssrc = Some(t.ssrc);
        media.cname = Some(t.cname.clone());
        media.rtp_maps = rtp_maps;
        media.candidates = agent.local_candidates().to_vec();
        Ok(media)
    }

    /// Starts the connect worker once both descriptions are applied.
    fn maybe_connect(&mut self) -> Result<(), RtcError> {
        if self.signaling != SignalingState::Stable
            || self.worker.is_some()
            || self.local_description.is_none()
            || self.remote_description.is_none()
        {
            return Ok(());
        }

        let local = self
            .local_description
            .as_ref()
            .ok_or_else(|| RtcError::InvalidState("local description missing".into()))?;
        let remote = self
            .remote_description
            .as_ref()
            .ok_or_else(|| RtcError::InvalidState("remote description missing".into()))?;
        let remote_first = remote
            .media
            .first()
            .ok_or(RtcError::Sdp(SdpError::Missing("media section")))?;

        let remote_fingerprint = remote_first
            .fingerprint
            .clone()
            .ok_or(RtcError::Sdp(SdpError::Missing("fingerprint")))?;
        let dtls_role = match local.media.first().and_then(|m| m.setup) {
            Some(Setup::Active) => DtlsRole::Client,
            _ => DtlsRole::Server,
        };

        let mut agent = self
            .ice
            .take()
            .ok_or_else(|| RtcError::InvalidState("transport not started".into()))?;
        agent.set_remote_credentials(IceCredentials {
            ufrag: remote_first.ice_ufrag.clone(),
            pwd: remote_first.ice_pwd.clone(),
        });
        for media in &remote.media {
            for candidate in &media.candidates {
                agent.add_remote_candidate(candidate.clone());
            }
        }

        let receivers = self
            .receivers
            .take()
            .ok_or_else(|| RtcError::InvalidState("transport not started".into()))?;
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| RtcError::InvalidState("transport not started".into()))?;

        let local_binds = self
            .transceivers
            .iter()
            .filter(|t| {
                t.track.is_some()
                    && matches!(t.direction, Direction::SendRecv | Direction::SendOnly)
            })
            .filter_map(|t| {
                t.track
                    .clone()
                    .map(|track| (track, t.ssrc, t.payload_type))
            })
            .collect();
        let remote_sections = remote
            .media
            .iter()
            .map(|m| (m.kind, m.mid.clone(), m.ssrc))
            .collect();

        self.shared.set_ice(IceConnectionState::Checking);
        let args = ConnectArgs {
            agent,
            receivers,
            writer: transport.writer(),
            transport,
            certificate: self.certificate.clone(),
            dtls_role,
            remote_fingerprint,
            local_binds,
            remote_sections,
            config: self.config.clone(),
            shared: self.shared.clone(),
            rtcp: self.rtcp.clone(),
            run: self.run.clone(),
            logger: self.logger.clone(),
        };
        self.worker = Some(thread::spawn(move || connect_worker(args)));
        Ok(())
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Direction we answer with, honoring both what the peer offered and what
/// our transceiver wants.
fn answer_direction(offered: Direction, ours: Direction) -> Direction {
    let want_send = matches!(ours, Direction::SendRecv | Direction::SendOnly);
    let want_recv = matches!(ours, Direction::SendRecv | Direction::RecvOnly);
    let peer_sends = matches!(offered, Direction::SendRecv | Direction::SendOnly);
    let peer_recvs = matches!(offered, Direction::SendRecv | Direction::RecvOnly);
    match (want_send && peer_recvs, want_recv && peer_sends) {
        (true, true) => Direction::SendRecv,
        (true, false) => Direction::SendOnly,
        (false, true) => Direction::RecvOnly,
        (false, false) => Direction::Inactive,
    }
}

/// ICE checks, DTLS handshake, SRTP activation and the event pump, in order.
fn connect_worker(args: ConnectArgs) {
    let ConnectArgs {
        mut agent,
        receivers,
        transport,
        writer,
        certificate,
        dtls_role,
        remote_fingerprint,
        local_binds,
        remote_sections,
        config,
        shared,
        rtcp,
        run,
        logger,
    } = args;
    let TransportReceivers {
        stun_rx,
        dtls_rx,
        events_rx,
    } = receivers;

    let deadline = Instant::now() + config.ice_connect_timeout;
    let pair = match agent.run_checks(&stun_rx, &writer, deadline, &run) {
        Ok(pair) => pair,
        Err(e) => {
            sink_error!(logger, "[PEER] Connectivity checks failed: {}", e);
            shared.set_ice(IceConnectionState::Failed);
            return;
        }
    };
    shared.set_ice(IceConnectionState::Connected);
    shared.set_dtls(DtlsState::Connecting);

    let channel = DatagramChannel::new(
        dtls_rx,
        writer.clone(),
        pair.remote.address,
        config.dtls_retransmit_base,
        config.dtls_max_retransmits,
        logger.clone(),
    );
    let keys = match run_dtls_handshake(
        channel,
        dtls_role,
        &certificate,
        Some(&remote_fingerprint),
        logger.clone(),
    ) {
        Ok(keys) => keys,
        Err(e) => {
            sink_error!(logger, "[PEER] DTLS handshake failed: {}", e);
            shared.set_dtls(DtlsState::Failed);
            return;
        }
    };

    let contexts = SrtpContext::new(logger.clone(), &keys.inbound)
        .and_then(|inbound| Ok((inbound, SrtpContext::new(logger.clone(), &keys.outbound)?)));
    let (inbound, outbound) = match contexts {
        Ok(pair) => pair,
        Err(e) => {
            sink_error!(logger, "[PEER] SRTP key derivation failed: {}", e);
            shared.set_dtls(DtlsState::Failed);
            return;
        }
    };
    if !transport.activate_srtp(inbound) {
        shared.set_dtls(DtlsState::Failed);
        return;
    }
    let outbound = Arc::new(Mutex::new(outbound));

    if let Ok(mut slot) = rtcp.lock() {
        *slot = Some(RtcpSender {
            srtp: outbound.clone(),
            writer: writer.clone(),
            dest: pair.remote.address,
        });
    }

    for (track, ssrc, payload_type) in &local_binds {
        track.bind(TrackSender {
            ssrc: *ssrc,
            payload_type: *payload_type,
            next_seq: OsRng.r#gen(),
            srtp: outbound.clone(),
            writer: writer.clone(),
            dest: pair.remote.address,
        });
    }

    // Media sections whose SSRC the peer announced get their track up front;
    // the rest bind lazily when media arrives.
    let mut unbound: Vec<(MediaKind, String)> = Vec::new();
    for (kind, mid, ssrc) in remote_sections {
        match ssrc {
            Some(ssrc) => {
                let (track, sink) = RemoteTrack::new(kind, mid, ssrc);
                if transport.route_ssrc(ssrc, sink) {
                    let _ = shared.events.send(PeerEvent::Track(track));
                }
            }
            None => unbound.push((kind, mid)),
        }
    }

    shared.set_dtls(DtlsState::Connected);
    sink_info!(logger, "[PEER] Connection established");

    let (ice_tx, ice_rx) = mpsc::channel();
    let keepalive = {
        let writer = writer.clone();
        let run = run.clone();
        let pair = pair.clone();
        let interval = config.ice_keepalive_interval;
        let budget = config.ice_keepalive_budget;
        thread::spawn(move || {
            agent.run_keepalive(&pair, &stun_rx, &writer, interval, budget, &run, &ice_tx);
        })
    };

    run_event_pump(&events_rx, &ice_rx, &transport, unbound, &shared, &run, &logger);
    let _ = keepalive.join();
}

/// Forwards transport and keepalive notifications into the public event
/// stream until the run flag clears or the transport dies.
fn run_event_pump(
    events_rx: &Receiver<TransportEvent>,
    ice_rx: &Receiver<IceEvent>,
    transport: &BundleTransport,
    mut unbound: Vec<(MediaKind, String)>,
    shared: &SharedState,
    run: &AtomicBool,
    logger: &Arc<dyn LogSink>,
) {
    while run.load(Ordering::Relaxed) {
        match events_rx.recv_timeout(EVENT_TICK) {
            Ok(TransportEvent::Rtcp(packets)) => {
                let _ = shared.events.send(PeerEvent::Rtcp(packets));
            }
            Ok(TransportEvent::PendingSsrc(ssrc)) => {
                if unbound.is_empty() {
                    sink_debug!(logger, "[PEER] No media section accepts SSRC {:#010x}", ssrc);
                } else {
                    let (kind, mid) = unbound.remove(0);
                    let (track, sink) = RemoteTrack::new(kind, mid, ssrc);
                    if transport.route_ssrc(ssrc, sink) {
                        let _ = shared.events.send(PeerEvent::Track(track));
                    }
                }
            }
            Ok(TransportEvent::SrtpAuthEscalation(failures)) => {
                sink_error!(
                    logger,
                    "[PEER] {} SRTP auth failures, failing the connection",
                    failures
                );
                let _ = shared.events.send(PeerEvent::SrtpAuthEscalation(failures));
                shared.set_dtls(DtlsState::Failed);
            }
            Ok(TransportEvent::Closed) | Err(RecvTimeoutError::Disconnected) => {
                sink_error!(logger, "[PEER] Transport died, failing the connection");
                shared.set_dtls(DtlsState::Failed);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        while let Ok(event) = ice_rx.try_recv() {
            match event {
                IceEvent::Disconnected => shared.set_ice(IceConnectionState::Disconnected),
                IceEvent::Connected => shared.set_ice(IceConnectionState::Connected),
                IceEvent::Failed => shared.set_ice(IceConnectionState::Failed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::noop_log_sink::NoopLogSink;

    fn mock_peer() -> PeerConnection {
        let config = RtcConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..RtcConfig::default()
        };
        PeerConnection::new(config, Arc::new(NoopLogSink)).unwrap()
    }

    #[test]
    fn test_create_offer_without_transceiver_error() {
        let mut pc = mock_peer();
        assert!(matches!(
            pc.create_offer(),
            Err(RtcError::InvalidState(_))
        ));
    }

    #[test]
    fn test_offer_carries_negotiation_surface_ok() {
        let mut pc = mock_peer();
        let track = LocalTrack::new(MediaKind::Audio);
        let mid = pc.add_transceiver(MediaKind::Audio, Some(track)).unwrap();
        let offer = pc.create_offer().unwrap();

        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert_eq!(offer.bundle, vec![mid.clone()]);
        let media = &offer.media[0];
        assert_eq!(media.mid, mid);
        assert_eq!(media.setup, Some(Setup::ActPass));
        assert!(!media.ice_ufrag.is_empty());
        assert!(!media.ice_pwd.is_empty());
        assert!(media.fingerprint.is_some());
        assert!(media.ssrc.is_some());
        assert!(!media.candidates.is_empty());
        assert_eq!(media.crypto_suites, vec![SrtpProfile::Aes128CmSha1_80]);
    }

    #[test]
    fn test_set_local_answer_without_offer_error() {
        let mut pc = mock_peer();
        let answer = SessionDescription::new(SdpType::Answer);
        assert!(matches!(
            pc.set_local_description(answer),
            Err(RtcError::InvalidState(_))
        ));
    }

    #[test]
    fn test_create_answer_without_remote_offer_error() {
        let mut pc = mock_peer();
        assert!(matches!(
            pc.create_answer(),
            Err(RtcError::InvalidState(_))
        ));
    }

    #[test]
    fn test_remote_offer_materializes_transceivers_ok() {
        let mut offerer = mock_peer();
        offerer.add_transceiver(MediaKind::Audio, None).unwrap();
        offerer.add_transceiver(MediaKind::Video, None).unwrap();
        let offer = offerer.create_offer().unwrap();

        let mut answerer = mock_peer();
        answerer.set_remote_description(offer).unwrap();
        assert_eq!(answerer.signaling_state(), SignalingState::HaveRemoteOffer);
        assert_eq!(answerer.transceivers.len(), 2);

        let answer = answerer.create_answer().unwrap();
        assert_eq!(answer.media.len(), 2);
        assert_eq!(answer.media[0].setup, Some(Setup::Active));
        // Neither side has a track, so nothing flows on this section.
        assert_eq!(answer.media[0].direction, Direction::Inactive);
    }

    #[test]
    fn test_send_rtcp_before_connect_error() {
        let pc = mock_peer();
        let packets = [RtcpPacket::Pli(crate::rtcp::PictureLossIndication::new(1, 2))];
        assert!(matches!(
            pc.send_rtcp(&packets),
            Err(RtcError::InvalidState(_))
        ));
    }

    #[test]
    fn test_event_pump_fails_connection_on_transport_death_ok() {
        let (events_tx, peer_rx) = mpsc::channel();
        let shared = SharedState::new(events_tx);
        shared.set_ice(IceConnectionState::Connected);
        shared.set_dtls(DtlsState::Connected);
        assert_eq!(shared.connection_state(), PeerConnectionState::Connected);

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let (transport, _receivers) =
            BundleTransport::start(socket, 100, Arc::new(NoopLogSink)).unwrap();

        let (transport_tx, transport_rx) = mpsc::channel();
        let (_ice_tx, ice_rx) = mpsc::channel();
        let run = AtomicBool::new(true);
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);

        // A dying demux thread reports Closed; the pump must mark the
        // connection Failed and return instead of spinning forever.
        transport_tx.send(TransportEvent::Closed).unwrap();
        run_event_pump(
            &transport_rx,
            &ice_rx,
            &transport,
            Vec::new(),
            &shared,
            &run,
            &logger,
        );

        assert_eq!(shared.connection_state(), PeerConnectionState::Failed);
        let mut saw_failed = false;
        while let Ok(event) = peer_rx.try_recv() {
            if matches!(
                event,
                PeerEvent::ConnectionStateChange(PeerConnectionState::Failed)
            ) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_api_ok() {
        let mut pc = mock_peer();
        pc.close();
        pc.close();
        assert_eq!(pc.connection_state(), PeerConnectionState::Closed);
        assert!(matches!(
            pc.add_transceiver(MediaKind::Audio, None),
            Err(RtcError::InvalidState(_))
        ));
    }
}
