//! Signaling and connection state machines.

use crate::error::RtcError;
use crate::ice::IceConnectionState;
use crate::sdp::SdpType;

/// Signaling states -> W3C webrtc-pc, minus the terminal closed flag which
/// lives on the connection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalingState {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
}

impl SignalingState {
    /// Transition for `set_local_description`.
    ///
    /// # Errors
    /// `InvalidState` when `sdp_type` is not applicable in `self`.
    pub fn apply_local(self, sdp_type: SdpType) -> Result<Self, RtcError> {
        match (self, sdp_type) {
            (Self::Stable | Self::HaveLocalOffer, SdpType::Offer) => Ok(Self::HaveLocalOffer),
            (Self::HaveRemoteOffer | Self::HaveLocalPranswer, SdpType::Answer) => Ok(Self::Stable),
            (state, sdp_type) => Err(RtcError::InvalidState(format!(
                "cannot set local {} in signaling state {:?}",
                sdp_type.as_str(),
                state
            ))),
        }
    }

    /// Transition for `set_remote_description`.
    ///
    /// # Errors
    /// `InvalidState` when `sdp_type` is not applicable in `self`.
    pub fn apply_remote(self, sdp_type: SdpType) -> Result<Self, RtcError> {
        match (self, sdp_type) {
            (Self::Stable | Self::HaveRemoteOffer, SdpType::Offer) => Ok(Self::HaveRemoteOffer),
            (Self::HaveLocalOffer | Self::HaveRemotePranswer, SdpType::Answer) => Ok(Self::Stable),
            (state, sdp_type) => Err(RtcError::InvalidState(format!(
                "cannot set remote {} in signaling state {:?}",
                sdp_type.as_str(),
                state
            ))),
        }
    }
}

/// DTLS transport lifecycle as the connection sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DtlsState {
    #[default]
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// Aggregate connection state exposed by the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Combines the ICE and DTLS states, worst first.
#[must_use]
pub fn derive_connection_state(
    closed: bool,
    ice: IceConnectionState,
    dtls: DtlsState,
) -> PeerConnectionState {
    if closed || ice == IceConnectionState::Closed || dtls == DtlsState::Closed {
        return PeerConnectionState::Closed;
    }
    if ice == IceConnectionState::Failed || dtls == DtlsState::Failed {
        return PeerConnectionState::Failed;
    }
    if ice == IceConnectionState::Disconnected {
        return PeerConnectionState::Disconnected;
    }
    let ice_up = matches!(
        ice,
        IceConnectionState::Connected | IceConnectionState::Completed
    );
    if ice_up && dtls == DtlsState::Connected {
        return PeerConnectionState::Connected;
    }
    if ice == IceConnectionState::New && dtls == DtlsState::New {
        return PeerConnectionState::New;
    }
    PeerConnectionState::Connecting
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_offer_answer_walk_ok() {
        // Offerer side.
        let s = SignalingState::Stable;
        let s = s.apply_local(SdpType::Offer).unwrap();
        assert_eq!(s, SignalingState::HaveLocalOffer);
        let s = s.apply_remote(SdpType::Answer).unwrap();
        assert_eq!(s, SignalingState::Stable);

        // Answerer side.
        let s = SignalingState::Stable;
        let s = s.apply_remote(SdpType::Offer).unwrap();
        assert_eq!(s, SignalingState::HaveRemoteOffer);
        let s = s.apply_local(SdpType::Answer).unwrap();
        assert_eq!(s, SignalingState::Stable);
    }

    #[test]
    fn test_out_of_order_transitions_error() {
        assert!(SignalingState::Stable.apply_local(SdpType::Answer).is_err());
        assert!(SignalingState::Stable.apply_remote(SdpType::Answer).is_err());
        assert!(
            SignalingState::HaveLocalOffer
                .apply_remote(SdpType::Offer)
                .is_err()
        );
        assert!(
            SignalingState::HaveRemoteOffer
                .apply_local(SdpType::Offer)
                .is_err()
        );
    }

    #[test]
    fn test_repeated_offer_is_allowed_ok() {
        let s = SignalingState::HaveLocalOffer;
        assert_eq!(
            s.apply_local(SdpType::Offer).unwrap(),
            SignalingState::HaveLocalOffer
        );
    }

    #[test]
    fn test_derive_connection_state_worst_of_ok() {
        use IceConnectionState as I;
        assert_eq!(
            derive_connection_state(false, I::New, DtlsState::New),
            PeerConnectionState::New
        );
        assert_eq!(
            derive_connection_state(false, I::Checking, DtlsState::New),
            PeerConnectionState::Connecting
        );
        assert_eq!(
            derive_connection_state(false, I::Connected, DtlsState::Connecting),
            PeerConnectionState::Connecting
        );
        assert_eq!(
            derive_connection_state(false, I::Connected, DtlsState::Connected),
            PeerConnectionState::Connected
        );
        assert_eq!(
            derive_connection_state(false, I::Disconnected, DtlsState::Connected),
            PeerConnectionState::Disconnected
        );
        assert_eq!(
            derive_connection_state(false, I::Connected, DtlsState::Failed),
            PeerConnectionState::Failed
        );
        assert_eq!(
            derive_connection_state(true, I::Connected, DtlsState::Connected),
            PeerConnectionState::Closed
        );
    }
}
