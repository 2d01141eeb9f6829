//! Peer engine on webrtc-rs.
//!
//! Receive-only: the remote offers one H.264 video track and opens the
//! control data channel. RTP is depacketized on the track task and decoded to
//! RGB by openh264 on a blocking thread, then pushed into the track's
//! [`FrameQueue`](crate::media::FrameQueue).

use super::{DataChannel, PeerEvent, PeerEventSender, PeerFactory, PeerSession};
use crate::config::PeerConfig;
use crate::errors::LinkError;
use crate::media::VideoTrack;
use crate::signaling::{IceCandidate, SdpType, SessionDescription};
use async_trait::async_trait;
use bytes::Bytes;
use image::RgbImage;
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::track::track_remote::TrackRemote;

const H264_PAYLOAD_TYPE: u8 = 102;
const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

fn peer_error(context: &str, e: impl std::fmt::Display) -> LinkError {
    LinkError::Peer(format!("{}: {}", context, e))
}

/// Builds [`RtcPeerSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcPeerFactory;

#[async_trait]
impl PeerFactory for RtcPeerFactory {
    async fn create(
        &self,
        config: &PeerConfig,
        video_queue_capacity: usize,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerSession>, LinkError> {
        let session = RtcPeerSession::new(config, video_queue_capacity, events).await?;
        Ok(Box::new(session))
    }
}

pub struct RtcPeerSession {
    connection: Arc<RTCPeerConnection>,
    events: PeerEventSender,
    watching: AtomicBool,
}

impl RtcPeerSession {
    pub async fn new(
        config: &PeerConfig,
        video_queue_capacity: usize,
        events: PeerEventSender,
    ) -> Result<Self, LinkError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_H264.to_owned(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line: H264_FMTP.to_owned(),
                        rtcp_feedback: vec![],
                    },
                    payload_type: H264_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .map_err(|e| peer_error("Failed to register H.264", e))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| peer_error("Failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| peer_error("Failed to create peer connection", e))?,
        );

        connection.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
            log::info!("Peer connection state is {}", state);
            Box::pin(async {})
        }));

        let track_events = events.clone();
        connection.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Video {
                    log::info!("Ignoring remote {:?} track", track.kind());
                    return;
                }
                log::info!("Receiving video track {}", track.id());
                let video = VideoTrack::new(track.id(), video_queue_capacity);
                if events.send(PeerEvent::VideoTrack(video.clone())).is_err() {
                    return;
                }
                tokio::spawn(receive_video(track, video, events));
            })
        }));

        Ok(Self {
            connection,
            events,
            watching: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PeerSession for RtcPeerSession {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        let remote = match desc.kind {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        }
        .map_err(|e| peer_error("Invalid remote description", e))?;

        self.connection
            .set_remote_description(remote)
            .await
            .map_err(|e| peer_error("Failed to set remote description", e))
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        let answer = self
            .connection
            .create_answer(None)
            .await
            .map_err(|e| peer_error("Failed to create answer", e))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    /// Sets the local description and waits for ICE gathering, so the
    /// description read back afterwards carries every local candidate.
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        let local = match desc.kind {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        }
        .map_err(|e| peer_error("Invalid local description", e))?;

        let mut gathered = self.connection.gathering_complete_promise().await;
        self.connection
            .set_local_description(local)
            .await
            .map_err(|e| peer_error("Failed to set local description", e))?;
        let _ = gathered.recv().await;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let local = self.connection.local_description().await?;
        let kind = match local.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            _ => SdpType::Answer,
        };
        Some(SessionDescription { kind, sdp: local.sdp })
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate_line(),
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };
        self.connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| peer_error("Failed to add ICE candidate", e))
    }

    async fn watch_data_channels(&self) {
        if self.watching.swap(true, Ordering::SeqCst) {
            return;
        }

        let events = self.events.clone();
        self.connection
            .on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                let events = events.clone();
                Box::pin(async move {
                    let label = channel.label().to_owned();
                    log::info!("Remote created data channel {}", label);

                    let open_events = events.clone();
                    let open_channel = Arc::clone(&channel);
                    channel.on_open(Box::new(move || {
                        let handle: Arc<dyn DataChannel> = Arc::new(RtcDataChannel {
                            label: open_channel.label().to_owned(),
                            channel: open_channel,
                        });
                        let _ = open_events.send(PeerEvent::DataChannel(handle));
                        Box::pin(async {})
                    }));

                    let close_events = events.clone();
                    channel.on_close(Box::new(move || {
                        let _ = close_events.send(PeerEvent::DataChannelClosed(label.clone()));
                        Box::pin(async {})
                    }));

                    channel.on_message(Box::new(move |msg: DataChannelMessage| {
                        let _ = events.send(PeerEvent::ChannelMessage(msg.data));
                        Box::pin(async {})
                    }));
                })
            }));
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.connection
            .close()
            .await
            .map_err(|e| peer_error("Failed to close peer connection", e))
    }
}

struct RtcDataChannel {
    label: String,
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for RtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, data: Bytes) -> Result<(), LinkError> {
        self.channel
            .send(&data)
            .await
            .map(|_| ())
            .map_err(|e| LinkError::Send(e.to_string()))
    }
}

/// Read RTP until the track ends, handing complete access units to the decoder.
async fn receive_video(track: Arc<TrackRemote>, video: VideoTrack, events: PeerEventSender) {
    let (units_tx, units_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let decoder_video = video.clone();
    let decoder = tokio::task::spawn_blocking(move || decode_units(units_rx, decoder_video));

    let mut depacketizer = H264Packet::default();
    let mut access_unit = Vec::new();
    loop {
        let (packet, _) = match track.read_rtp().await {
            Ok(read) => read,
            Err(e) => {
                log::debug!("Video track {} stopped: {}", track.id(), e);
                break;
            }
        };
        match depacketizer.depacketize(&packet.payload) {
            Ok(nalus) => access_unit.extend_from_slice(&nalus),
            Err(e) => {
                log::debug!("Dropping undecodable RTP payload: {}", e);
                continue;
            }
        }
        if packet.header.marker && !access_unit.is_empty() {
            if units_tx.send(std::mem::take(&mut access_unit)).is_err() || video.is_closed() {
                break;
            }
        }
    }

    drop(units_tx);
    let _ = decoder.await;
    let _ = events.send(PeerEvent::TrackEnded(video));
}

fn decode_units(mut units: mpsc::UnboundedReceiver<Vec<u8>>, video: VideoTrack) {
    let mut decoder = match Decoder::new() {
        Ok(decoder) => decoder,
        Err(e) => {
            log::error!("Failed to create H.264 decoder: {}", e);
            return;
        }
    };

    while let Some(unit) = units.blocking_recv() {
        match decoder.decode(&unit) {
            Ok(Some(yuv)) => {
                let (width, height) = yuv.dimensions();
                let mut rgb = vec![0u8; width * height * 3];
                yuv.write_rgb8(&mut rgb);
                match RgbImage::from_raw(width as u32, height as u32, rgb) {
                    Some(image) => {
                        if !video.push_image(image) {
                            break;
                        }
                    }
                    None => log::warn!("Decoded frame has unexpected size {}x{}", width, height),
                }
            }
            Ok(None) => {}
            Err(e) => log::debug!("H.264 decode error: {}", e),
        }
    }
}
