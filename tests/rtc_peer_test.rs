//! Peer engine tests against a local webrtc-rs offerer
//!
//! Run with: cargo test --features webrtc --test rtc_peer_test

#![cfg(feature = "webrtc")]

use spinny_link::config::PeerConfig;
use spinny_link::peer::{PeerFactory, PeerSession};
use spinny_link::signaling::{SdpType, SessionDescription};
use spinny_link::RtcPeerFactory;
use tokio::sync::mpsc;
use webrtc::api::APIBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

fn local_only() -> PeerConfig {
    PeerConfig { ice_servers: vec![] }
}

async fn offerer() -> RTCPeerConnection {
    let api = APIBuilder::new().build();
    api.new_peer_connection(RTCConfiguration::default())
        .await
        .expect("offerer peer connection")
}

async fn session() -> Box<dyn PeerSession> {
    let (events, _rx) = mpsc::unbounded_channel();
    RtcPeerFactory
        .create(&local_only(), 4, events)
        .await
        .expect("peer session")
}

#[tokio::test]
async fn test_answers_data_channel_offer() {
    let remote = offerer().await;
    remote.create_data_channel("control", None).await.unwrap();
    let offer = remote.create_offer(None).await.unwrap();
    remote.set_local_description(offer.clone()).await.unwrap();

    let peer = session().await;
    peer.set_remote_description(SessionDescription::offer(offer.sdp)).await.unwrap();
    peer.watch_data_channels().await;
    peer.watch_data_channels().await;

    let answer = peer.create_answer().await.unwrap();
    assert_eq!(answer.kind, SdpType::Answer);
    peer.set_local_description(answer).await.unwrap();

    let local = peer.local_description().await.expect("local description");
    assert_eq!(local.kind, SdpType::Answer);
    assert!(local.sdp.contains("m=application"));

    peer.close().await.unwrap();
    remote.close().await.unwrap();
}

#[tokio::test]
async fn test_rejects_garbage_description() {
    let peer = session().await;
    let result = peer.set_remote_description(SessionDescription::offer("not sdp")).await;
    assert!(result.is_err());
    peer.close().await.unwrap();
}

#[tokio::test]
async fn test_no_local_description_before_negotiation() {
    let peer = session().await;
    assert!(peer.local_description().await.is_none());
    peer.close().await.unwrap();
}
