//! Services that talk to the marketplace on behalf of the aggregates
pub mod network;
pub mod search;

pub use network::NetworkRepository;
pub use search::CandidateSearch;
