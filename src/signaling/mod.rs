//! Signaling relay protocol: wire codec, candidate parsing and the transport.

pub mod candidate;
pub mod codec;
pub mod transport;
pub mod websocket;

pub use candidate::{Candidate, CandidateType};
pub use codec::{call_request, decode, encode, CallOptions, IceCandidate, SdpType, SessionDescription, SignalingMessage};
pub use transport::{Connector, Received, SignalingSocket, Transport};
pub use websocket::{WsConnector, WsSocket};
