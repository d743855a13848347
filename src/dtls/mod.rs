//! DTLS handshake over the bundle socket, with DTLS-SRTP key export.

pub mod certificate;
pub mod channel;
pub mod dtls_error;
pub mod dtls_role;
pub mod runtime;

pub use certificate::DtlsCertificate;
pub use channel::DatagramChannel;
pub use dtls_error::DtlsError;
pub use dtls_role::DtlsRole;
pub use runtime::run_dtls_handshake;
