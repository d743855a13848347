/// Represents the DTLS role in a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    /// The DTLS client role (active side).
    Client,
    /// The DTLS server role (passive side).
    Server,
}
