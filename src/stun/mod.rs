pub mod message;
pub mod stun_error;
pub use message::{MessageClass, StunMessage, is_stun_datagram};
pub use stun_error::StunError;
