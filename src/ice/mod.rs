pub mod agent;
pub mod candidate;
pub mod candidate_pair;
pub mod gathering;
pub mod ice_error;
pub use agent::{IceAgent, IceConnectionState, IceCredentials, IceEvent, IceRole};
pub use candidate::{Candidate, CandidateType};
pub use candidate_pair::{CandidatePair, CandidatePairState};
pub use ice_error::IceError;
