//! spinny-link: signaling and peer-session orchestration for a remote
//! turntable robot that streams video and takes motor step commands.
//!
//! The robot sits behind a UV4L-style signaling relay. This crate speaks the
//! relay's JSON envelope protocol, drives the peer session to the point where
//! both the video track and the control data channel are open, and exposes
//! two small caller surfaces on top:
//!
//! - [`FrameSource::get_next_frame`] returns the freshest decoded frame,
//!   discarding whatever backlog built up in between;
//! - [`ControlSink::send_command`] sends a signed step count to the motor.
//!
//! # Features
//! - `webrtc`: a real peer engine on webrtc-rs with H.264 decode via openh264.
//!   Without it, bring your own [`peer::PeerFactory`].
//!
//! # Usage
//! ```rust,ignore
//! use spinny_link::{LinkConfig, Orchestrator, RtcPeerFactory, WsConnector};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut link = Orchestrator::new(LinkConfig::load_or_default(), WsConnector, Arc::new(RtcPeerFactory));
//! let handle = link.handle();
//! tokio::spawn(async move { link.run().await });
//!
//! handle.wait_for_session(Duration::from_secs(10)).await?;
//! handle.wait_for_connection().await?;
//! handle.controls().send_command(30).await?;
//! let frame = handle.frames().get_next_frame().await?;
//! ```

pub mod config;
pub mod control;
pub mod errors;
pub mod link;
pub mod media;
pub mod peer;
pub mod signaling;

// Testing utilities - scripted relay and peer engine for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::LinkConfig;
pub use control::ControlSink;
pub use errors::LinkError;
pub use link::{ConnectionState, LinkHandle, LinkSnapshot, Orchestrator, RunExit};
pub use media::{Frame, FrameSource, VideoTrack};
pub use signaling::{SignalingMessage, WsConnector};

#[cfg(feature = "webrtc")]
pub use peer::RtcPeerFactory;

/// Initialize logging for the link
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "spinny_link=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        peer_engine: cfg!(feature = "webrtc"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Built with the bundled peer engine
    pub peer_engine: bool,
}
