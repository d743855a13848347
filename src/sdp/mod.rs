//! Session descriptions: a WebRTC-shaped SDP model with offer/answer helpers.

pub mod media_description;
pub mod sdp_error;
pub mod session_description;

pub use media_description::{Direction, MediaDescription, MediaKind, RtpMap, Setup};
pub use sdp_error::SdpError;
pub use session_description::{SdpType, SessionDescription};
