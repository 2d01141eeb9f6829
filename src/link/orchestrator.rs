//! Connection orchestrator.
//!
//! One task owns the transport, the peer session and the published
//! [`LinkSnapshot`]. It multiplexes three queues: relay messages, peer-engine
//! events, and close requests from [`LinkHandle`]s. Every exit path from
//! [`Orchestrator::run`] tears the session down and publishes `NotConnected`.

use super::handle::{Command, LinkHandle};
use super::state::{LinkSnapshot, LinkStats};
use crate::config::LinkConfig;
use crate::errors::LinkError;
use crate::peer::{PeerEvent, PeerEventReceiver, PeerEventSender, PeerFactory, PeerSession};
use crate::signaling::{
    CallOptions, Connector, IceCandidate, Received, SdpType, SignalingMessage, SignalingSocket, Transport,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Why the receive loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The relay sent `hangup`.
    RemoteHangup,
    /// The relay closed the socket.
    TransportClosed,
    /// A [`LinkHandle::close`] request.
    CloseRequested,
}

pub struct Orchestrator<C: Connector> {
    config: LinkConfig,
    connector: C,
    peers: Arc<dyn PeerFactory>,
    snapshot: Arc<watch::Sender<LinkSnapshot>>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    stats: Arc<LinkStats>,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(config: LinkConfig, connector: C, peers: Arc<dyn PeerFactory>) -> Self {
        let (snapshot, _) = watch::channel(LinkSnapshot::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            config,
            connector,
            peers,
            snapshot: Arc::new(snapshot),
            commands_tx,
            commands_rx,
            stats: Arc::new(LinkStats::default()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// A read-only handle for callers on other tasks.
    pub fn handle(&self) -> LinkHandle {
        LinkHandle::new(
            self.snapshot.subscribe(),
            self.commands_tx.clone(),
            self.config.connection.clone(),
            self.config.control.clone(),
            Arc::clone(&self.stats),
        )
    }

    /// Negotiate and serve one peer session until it ends.
    ///
    /// Returns `Ok` when the remote hangs up, the relay closes, or a handle
    /// requests close; `Err` for connect failures, protocol violations and
    /// peer-engine failures. The link is `NotConnected` again on return, and
    /// `run` may be called again.
    pub async fn run(&mut self) -> Result<RunExit, LinkError> {
        // Close requests made while idle do not apply to the new session.
        while self.commands_rx.try_recv().is_ok() {}

        let session_id = Uuid::new_v4();
        log::info!("Starting link session {}", session_id);
        self.stats.session_started();
        self.snapshot.send_modify(|s| s.begin(session_id));

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut session = Session::<C::Socket>::new(session_id, Arc::clone(&self.snapshot));

        let result = self.negotiate(&mut session, events_tx, &mut events_rx).await;

        match &result {
            Ok(exit) => log::info!("Link session {} ended: {:?}", session_id, exit),
            Err(e) => log::error!("Link session {} failed: {}", session_id, e),
        }
        session.teardown().await;
        result
    }

    async fn negotiate(
        &mut self,
        session: &mut Session<C::Socket>,
        events_tx: PeerEventSender,
        events_rx: &mut PeerEventReceiver,
    ) -> Result<RunExit, LinkError> {
        let peer = self
            .peers
            .create(&self.config.peer, self.config.video.queue_capacity, events_tx)
            .await?;
        session.peer = Some(peer);

        let options = CallOptions::from(&self.config.signaling);
        let transport = Transport::connect(&self.connector, &self.config.signaling.url, &options).await?;
        session.transport = Some(transport);

        self.serve(session, events_rx).await
    }

    async fn serve(
        &mut self,
        session: &mut Session<C::Socket>,
        events_rx: &mut PeerEventReceiver,
    ) -> Result<RunExit, LinkError> {
        loop {
            let Some(transport) = session.transport.as_mut() else {
                return Ok(RunExit::TransportClosed);
            };

            tokio::select! {
                received = transport.receive() => match received? {
                    Received::Message(msg) => {
                        self.stats.message_received();
                        if let Some(exit) = self.handle_message(session, msg).await? {
                            session.remote_ended = true;
                            return Ok(exit);
                        }
                    }
                    Received::Closed => {
                        session.remote_ended = true;
                        return Ok(RunExit::TransportClosed);
                    }
                },
                Some(event) = events_rx.recv() => self.handle_peer_event(event),
                command = self.commands_rx.recv() => match command {
                    Some(Command::Close) | None => return Ok(RunExit::CloseRequested),
                },
            }
        }
    }

    async fn handle_message(
        &self,
        session: &mut Session<C::Socket>,
        msg: SignalingMessage,
    ) -> Result<Option<RunExit>, LinkError> {
        log::debug!("Handling {} message", msg.kind());
        match msg {
            SignalingMessage::SessionDescription(desc) => {
                let kind = desc.kind;
                let peer = session.peer.as_deref().ok_or_else(peer_closed)?;
                peer.set_remote_description(desc).await?;
                peer.watch_data_channels().await;
                session.remote_description_set = true;

                if kind == SdpType::Offer {
                    let answer = peer.create_answer().await?;
                    peer.set_local_description(answer.clone()).await?;
                    let local = peer.local_description().await.unwrap_or(answer);
                    let transport = session
                        .transport
                        .as_mut()
                        .ok_or_else(|| LinkError::Send("signaling transport already closed".to_string()))?;
                    transport.send(&SignalingMessage::SessionDescription(local)).await?;
                    self.stats.answer_sent();
                    log::info!("Answered remote offer");
                }

                for candidate in std::mem::take(&mut session.pending_candidates) {
                    self.apply_candidate(peer, candidate).await;
                }
            }
            SignalingMessage::IceCandidate(candidate) => {
                if session.remote_description_set {
                    let peer = session.peer.as_deref().ok_or_else(peer_closed)?;
                    self.apply_candidate(peer, candidate).await;
                } else {
                    log::debug!("Deferring ICE candidate until the remote description arrives");
                    self.stats.candidate_deferred();
                    session.pending_candidates.push(candidate);
                }
            }
            SignalingMessage::IceDone => log::info!("Remote ICE gathering complete"),
            SignalingMessage::Hangup => {
                log::info!("Remote hung up");
                return Ok(Some(RunExit::RemoteHangup));
            }
        }
        Ok(None)
    }

    async fn apply_candidate(&self, peer: &dyn PeerSession, candidate: IceCandidate) {
        let line = candidate.candidate_line();
        match peer.add_ice_candidate(candidate).await {
            Ok(()) => {
                self.stats.candidate_applied();
                log::debug!("Applied remote candidate {}", line);
            }
            Err(e) => log::warn!("Remote candidate rejected ({}): {}", line, e),
        }
    }

    fn handle_peer_event(&self, event: PeerEvent) {
        let before = self.snapshot.borrow().state();
        match event {
            PeerEvent::VideoTrack(track) => {
                log::info!("Receiving video track {}", track.id());
                self.snapshot.send_modify(|s| s.attach_track(track));
            }
            PeerEvent::DataChannel(channel) => {
                log::info!("Data channel {} created by remote party", channel.label());
                self.snapshot.send_modify(|s| s.attach_channel(channel));
            }
            PeerEvent::DataChannelClosed(label) => {
                let dropped = self.snapshot.send_if_modified(|s| s.detach_channel(&label));
                if dropped {
                    log::warn!("Data channel {} closed", label);
                }
            }
            PeerEvent::TrackEnded(track) => {
                if self.snapshot.send_if_modified(|s| s.detach_track(&track)) {
                    log::warn!("Video track {} ended", track.id());
                } else {
                    log::debug!("Ignoring end of replaced video track {}", track.id());
                }
            }
            PeerEvent::ChannelMessage(data) => {
                log::info!("Data channel: got message of {} bytes", data.len());
            }
        }

        let after = self.snapshot.borrow().state();
        if before != after {
            log::info!("Link state {} -> {}", before, after);
        }
    }
}

fn peer_closed() -> LinkError {
    LinkError::Peer("peer session already closed".to_string())
}

/// Resources of one `run`. Dropping it without [`Session::teardown`] (the
/// run future was cancelled) still publishes `NotConnected` and closes the
/// transport and peer in the background.
struct Session<S: SignalingSocket + 'static> {
    id: Uuid,
    snapshot: Arc<watch::Sender<LinkSnapshot>>,
    peer: Option<Box<dyn PeerSession>>,
    transport: Option<Transport<S>>,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    /// The relay ended the session, so no hangup is sent back.
    remote_ended: bool,
}

impl<S: SignalingSocket + 'static> Session<S> {
    fn new(id: Uuid, snapshot: Arc<watch::Sender<LinkSnapshot>>) -> Self {
        Self {
            id,
            snapshot,
            peer: None,
            transport: None,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            remote_ended: false,
        }
    }

    async fn teardown(mut self) {
        if let Some(mut transport) = self.transport.take() {
            if self.remote_ended {
                transport.shutdown().await;
            } else {
                transport.close().await;
            }
        }
        log::info!("Signaling closed for session {}", self.id);

        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                log::warn!("Ignoring error while closing peer session: {}", e);
            }
        }
        log::info!("Peer connection closed for session {}", self.id);
        // Drop publishes NotConnected.
    }
}

impl<S: SignalingSocket + 'static> Drop for Session<S> {
    fn drop(&mut self) {
        let transport = self.transport.take();
        let peer = self.peer.take();
        if transport.is_some() || peer.is_some() {
            log::warn!("Link session {} cancelled; closing in background", self.id);
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let remote_ended = self.remote_ended;
                    runtime.spawn(async move {
                        if let Some(mut transport) = transport {
                            if remote_ended {
                                transport.shutdown().await;
                            } else {
                                transport.close().await;
                            }
                        }
                        if let Some(peer) = peer {
                            let _ = peer.close().await;
                        }
                    });
                }
                Err(_) => log::warn!("No runtime available to close link session {}", self.id),
            }
        }
        self.snapshot.send_modify(|s| s.reset());
    }
}
