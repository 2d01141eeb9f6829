//! Testing utilities for spinny-link
//!
//! In-process stand-ins for the signaling relay and the peer engine, plus
//! synthetic video, so the whole link can be driven offline.

pub mod peer;
pub mod relay;
pub mod synthetic_data;

pub use peer::{MockDataChannel, MockPeer, MockPeerFactory, PeerCall, MOCK_ANSWER_SDP};
pub use relay::{MockConnector, MockRelay, MockSocket};
pub use synthetic_data::{synthetic_frame, synthetic_image};
