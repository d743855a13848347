//! Application-facing track handles. The engine moves packets; what the
//! payload bytes mean is the caller's business.

pub mod local_track;
pub mod remote_track;

pub use local_track::LocalTrack;
pub use remote_track::RemoteTrack;

use crate::sdp::MediaKind;

/// Capability surface shared by both track variants.
pub trait MediaTrack: Send {
    /// Audio or video, as negotiated for the owning media section.
    fn kind(&self) -> MediaKind;

    /// The SSRC the track is bound to, once known.
    fn ssrc(&self) -> Option<u32>;
}
