//! Packet transport for one bundle: a single UDP socket with a writer thread
//! and a demultiplexer thread that classifies inbound datagrams.

pub mod bundle_transport;
pub mod writer;

pub use bundle_transport::{BundleTransport, TransportEvent, TransportReceivers};
pub use writer::WriteHandle;
