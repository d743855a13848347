use core::fmt;

#[derive(Debug)]
pub enum IceError {
    /// No local candidates could be gathered.
    NoCandidates,
    /// Remote credentials were never supplied.
    MissingRemoteCredentials,
    /// Every candidate pair exhausted its retransmission budget.
    AllPairsFailed,
    /// The overall connectivity deadline expired with no nominated pair.
    Timeout,
    /// The selected pair stopped answering keepalive checks.
    KeepaliveTimeout,
    /// The demultiplexer channel feeding the agent closed.
    ChannelClosed,
    /// The connection was closed while checks were still running.
    Cancelled,
    Io(std::io::Error),
}

impl fmt::Display for IceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IceError::NoCandidates => write!(f, "no local candidates gathered"),
            IceError::MissingRemoteCredentials => write!(f, "remote ICE credentials not set"),
            IceError::AllPairsFailed => write!(f, "all candidate pairs failed"),
            IceError::Timeout => write!(f, "connectivity checks timed out"),
            IceError::KeepaliveTimeout => write!(f, "keepalive budget exhausted"),
            IceError::ChannelClosed => write!(f, "inbound STUN channel closed"),
            IceError::Cancelled => write!(f, "connectivity checks cancelled"),
            IceError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for IceError {}

impl From<std::io::Error> for IceError {
    fn from(e: std::io::Error) -> Self {
        IceError::Io(e)
    }
}
