//! SRTP/SRTCP packet protection (AES-128-CM with HMAC-SHA1-80).

pub mod constants;
pub mod context;
pub mod replay_window;
pub mod session_keys;
pub mod srtp_endpoint_keys;
pub mod srtp_error;
pub mod srtp_session_config;
mod utils;

pub use context::SrtpContext;
pub use srtp_endpoint_keys::SrtpEndpointKeys;
pub use srtp_error::SrtpError;
pub use srtp_session_config::{SrtpProfile, SrtpSessionConfig};
