use super::state::{ConnectionState, LinkSnapshot, LinkStats, LinkStatsSnapshot};
use crate::config::{ConnectionConfig, ControlConfig};
use crate::control::ControlSink;
use crate::errors::LinkError;
use crate::media::FrameSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Close,
}

/// Cheap, cloneable view of a running [`Orchestrator`](super::Orchestrator).
///
/// Reads the published snapshot; never mutates link state itself.
#[derive(Clone)]
pub struct LinkHandle {
    link: watch::Receiver<LinkSnapshot>,
    commands: mpsc::UnboundedSender<Command>,
    connection: ConnectionConfig,
    control: ControlConfig,
    stats: Arc<LinkStats>,
}

impl LinkHandle {
    pub(crate) fn new(
        link: watch::Receiver<LinkSnapshot>,
        commands: mpsc::UnboundedSender<Command>,
        connection: ConnectionConfig,
        control: ControlConfig,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            link,
            commands,
            connection,
            control,
            stats,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.borrow().state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.link.borrow().clone()
    }

    /// Receiver notified on every published transition.
    pub fn subscribe(&self) -> watch::Receiver<LinkSnapshot> {
        self.link.clone()
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn frames(&self) -> FrameSource {
        FrameSource::new(self.link.clone())
    }

    pub fn controls(&self) -> ControlSink {
        ControlSink::new(self.link.clone(), self.control.clone())
    }

    /// Ask the orchestrator to hang up and end the current run.
    pub fn close(&self) {
        if self.commands.send(Command::Close).is_err() {
            log::debug!("Close requested but the orchestrator is gone");
        }
    }

    /// Wait until a `run` has started a session.
    ///
    /// A freshly spawned orchestrator task may not have published
    /// `Connecting` yet; call this before [`wait_for_connection`](Self::wait_for_connection).
    /// Fails with [`LinkError::NotConnecting`] if no session starts within `timeout`.
    pub async fn wait_for_session(&self, timeout: Duration) -> Result<(), LinkError> {
        let mut link = self.link.clone();
        let started = tokio::time::timeout(
            timeout,
            link.wait_for(|s| s.state() != ConnectionState::NotConnected),
        )
        .await
        .map(|seen| seen.is_ok())
        .unwrap_or(false);

        if started {
            Ok(())
        } else {
            log::warn!("No link session started within {:?}", timeout);
            Err(LinkError::NotConnecting)
        }
    }

    /// Poll until the link is `Connected`, using the configured attempt
    /// count and interval.
    pub async fn wait_for_connection(&self) -> Result<(), LinkError> {
        self.wait_for_connection_with(self.connection.max_attempts, self.connection.poll_interval())
            .await
    }

    /// Poll the link state up to `attempts` times, sleeping `interval`
    /// between polls.
    ///
    /// Fails immediately with [`LinkError::NotConnecting`] if no session is
    /// active, and with [`LinkError::ConnectionTimeout`] once the attempts
    /// are used up.
    pub async fn wait_for_connection_with(&self, attempts: u32, interval: Duration) -> Result<(), LinkError> {
        for attempt in 1..=attempts {
            match self.state() {
                ConnectionState::Connected => {
                    log::info!("Link connected after {} poll(s)", attempt);
                    return Ok(());
                }
                ConnectionState::NotConnected => return Err(LinkError::NotConnecting),
                ConnectionState::Connecting => {
                    log::debug!("Waiting for connection ({}/{})", attempt, attempts);
                    tokio::time::sleep(interval).await;
                }
            }
        }
        log::warn!("Link still not connected after {} attempts", attempts);
        Err(LinkError::ConnectionTimeout { attempts })
    }
}

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle").field("state", &self.state()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn handle() -> (watch::Sender<LinkSnapshot>, LinkHandle) {
        let (tx, rx) = watch::channel(LinkSnapshot::default());
        let (commands, _) = mpsc::unbounded_channel();
        let handle = LinkHandle::new(
            rx,
            commands,
            ConnectionConfig::default(),
            ControlConfig::default(),
            Arc::new(LinkStats::default()),
        );
        (tx, handle)
    }

    #[tokio::test]
    async fn test_not_connecting_fails_fast() {
        let (_tx, handle) = handle();
        let result = handle.wait_for_connection_with(5, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(LinkError::NotConnecting)));
    }

    #[tokio::test]
    async fn test_wait_for_session_sees_late_begin() {
        let (tx, handle) = handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send_modify(|s| s.begin(Uuid::new_v4()));
            // Keep the sender alive until the waiter has seen the change.
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        assert!(matches!(handle.wait_for_connection().await, Err(LinkError::NotConnecting)));
        handle.wait_for_session(Duration::from_secs(5)).await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_session_times_out() {
        let (_tx, handle) = handle();
        let result = handle.wait_for_session(Duration::from_secs(2)).await;
        assert!(matches!(result, Err(LinkError::NotConnecting)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_while_connecting() {
        let (tx, handle) = handle();
        tx.send_modify(|s| s.begin(Uuid::new_v4()));

        let started = tokio::time::Instant::now();
        let result = handle.wait_for_connection_with(3, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(LinkError::ConnectionTimeout { attempts: 3 })));
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn test_close_without_orchestrator_is_quiet() {
        let (_tx, handle) = handle();
        handle.close();
        assert_eq!(handle.state(), ConnectionState::NotConnected);
    }
}
