//! Connection orchestration: signaling state machine, transceivers and the
//! background flow that takes a negotiated bundle from checks to media.

pub mod events;
pub mod peer_connection;
pub mod states;
pub mod transceiver;

pub use events::PeerEvent;
pub use peer_connection::PeerConnection;
pub use states::{DtlsState, PeerConnectionState, SignalingState};
pub use transceiver::Transceiver;
