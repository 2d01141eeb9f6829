//! Motor step commands over the data channel.
//!
//! A command is one signed 16-bit step count, big-endian two's complement.
//! Sending is fire-and-forget: the remote never acknowledges.

use crate::config::ControlConfig;
use crate::errors::LinkError;
use crate::link::LinkSnapshot;
use crate::peer::DataChannel;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Encoded size of one command.
pub const COMMAND_LEN: usize = 2;

pub fn encode_steps(steps: i16) -> [u8; COMMAND_LEN] {
    steps.to_be_bytes()
}

/// Parse a command payload. `None` unless it is exactly two bytes.
pub fn decode_steps(data: &[u8]) -> Option<i16> {
    let bytes: [u8; COMMAND_LEN] = data.try_into().ok()?;
    Some(i16::from_be_bytes(bytes))
}

/// Sends step commands on the link's current data channel.
///
/// Commands only go out while the link is `Connected`; a channel that is
/// open while the video track is still missing does not count.
#[derive(Clone)]
pub struct ControlSink {
    link: watch::Receiver<LinkSnapshot>,
    timing: ControlConfig,
    /// Bound to a fixed channel with no link state behind it
    detached: bool,
}

impl ControlSink {
    pub(crate) fn new(link: watch::Receiver<LinkSnapshot>, timing: ControlConfig) -> Self {
        Self {
            link,
            timing,
            detached: false,
        }
    }

    /// A sink bound to one fixed channel, detached from any orchestrator.
    pub fn for_channel(channel: Arc<dyn DataChannel>, timing: ControlConfig) -> Self {
        let (_tx, rx) = watch::channel(LinkSnapshot::detached_channel(channel));
        Self {
            link: rx,
            timing,
            detached: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.current_channel().is_some()
    }

    fn current_channel(&self) -> Option<Arc<dyn DataChannel>> {
        let snapshot = self.link.borrow();
        if !self.detached && !snapshot.is_connected() {
            return None;
        }
        snapshot.data_channel().cloned()
    }

    /// Send `steps` on the data channel.
    ///
    /// Fails with [`LinkError::ChannelUnavailable`] unless the link is
    /// `Connected`.
    pub async fn send_command(&self, steps: i16) -> Result<(), LinkError> {
        let channel = self.current_channel().ok_or(LinkError::ChannelUnavailable)?;

        let payload = Bytes::copy_from_slice(&encode_steps(steps));
        channel.send(payload).await.map_err(|e| match e {
            LinkError::Send(_) => e,
            other => LinkError::Send(other.to_string()),
        })?;
        log::debug!("Sent {} steps on {}", steps, channel.label());
        Ok(())
    }

    /// How long the remote needs to finish moving `steps` and settle.
    pub fn actuation_delay(&self, steps: i16) -> Duration {
        actuation_delay(&self.timing, steps)
    }
}

/// `|steps| * phases_per_step * step_delay + settle`.
pub fn actuation_delay(timing: &ControlConfig, steps: i16) -> Duration {
    let phases = u64::from(steps.unsigned_abs()) * u64::from(timing.phases_per_step);
    Duration::from_millis(phases * timing.step_delay_ms + timing.settle_ms)
}

impl std::fmt::Debug for ControlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSink")
            .field("available", &self.is_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDataChannel;

    #[test]
    fn test_encode_steps() {
        assert_eq!(encode_steps(-5), [0xFF, 0xFB]);
        assert_eq!(encode_steps(300), [0x01, 0x2C]);
        assert_eq!(encode_steps(0), [0x00, 0x00]);
        assert_eq!(encode_steps(i16::MIN), [0x80, 0x00]);
    }

    #[test]
    fn test_decode_steps() {
        assert_eq!(decode_steps(&[0xFF, 0xFB]), Some(-5));
        assert_eq!(decode_steps(&[0x01]), None);
        assert_eq!(decode_steps(&[0x01, 0x02, 0x03]), None);
    }

    #[test]
    fn test_actuation_delay() {
        let timing = ControlConfig::default();
        assert_eq!(actuation_delay(&timing, 0), Duration::from_millis(500));
        assert_eq!(actuation_delay(&timing, 30), Duration::from_millis(1100));
        assert_eq!(actuation_delay(&timing, -30), Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_send_command_writes_two_bytes() {
        let channel = Arc::new(MockDataChannel::new("control"));
        let sink = ControlSink::for_channel(channel.clone(), ControlConfig::default());

        sink.send_command(-5).await.unwrap();
        sink.send_command(300).await.unwrap();

        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(&sent[0][..], &[0xFF, 0xFB]);
        assert_eq!(&sent[1][..], &[0x01, 0x2C]);
    }

    #[tokio::test]
    async fn test_send_failure_is_send_error() {
        let channel = Arc::new(MockDataChannel::new("control"));
        channel.fail_sends(true);
        let sink = ControlSink::for_channel(channel, ControlConfig::default());

        assert!(matches!(sink.send_command(1).await, Err(LinkError::Send(_))));
    }

    #[tokio::test]
    async fn test_channel_without_track_is_unavailable() {
        let channel = Arc::new(MockDataChannel::new("control"));
        let mut snapshot = LinkSnapshot::default();
        snapshot.begin(uuid::Uuid::new_v4());
        snapshot.attach_channel(channel.clone());
        let (_tx, rx) = watch::channel(snapshot);
        let sink = ControlSink::new(rx, ControlConfig::default());

        assert!(!sink.is_available());
        assert!(matches!(sink.send_command(-5).await, Err(LinkError::ChannelUnavailable)));
        assert!(channel.sent().is_empty());
    }
}
