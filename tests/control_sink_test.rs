//! Control sink tests

use spinny_link::config::ControlConfig;
use spinny_link::control::{decode_steps, ControlSink, COMMAND_LEN};
use spinny_link::errors::LinkError;
use spinny_link::testing::MockDataChannel;
use std::sync::Arc;
use std::time::Duration;

fn sink() -> (ControlSink, Arc<MockDataChannel>) {
    let channel = Arc::new(MockDataChannel::new("control"));
    (ControlSink::for_channel(channel.clone(), ControlConfig::default()), channel)
}

#[tokio::test]
async fn test_commands_are_two_big_endian_bytes() {
    let (sink, channel) = sink();
    assert!(sink.is_available());

    for steps in [30, -30, 0, i16::MAX, i16::MIN] {
        sink.send_command(steps).await.unwrap();
    }

    let sent = channel.sent();
    assert_eq!(sent.len(), 5);
    assert!(sent.iter().all(|payload| payload.len() == COMMAND_LEN));
    assert_eq!(&sent[0][..], &[0x00, 0x1E]);
    assert_eq!(&sent[1][..], &[0xFF, 0xE2]);
    assert_eq!(&sent[3][..], &[0x7F, 0xFF]);
    assert_eq!(&sent[4][..], &[0x80, 0x00]);

    let decoded: Vec<_> = sent.iter().filter_map(|payload| decode_steps(payload)).collect();
    assert_eq!(decoded, vec![30, -30, 0, i16::MAX, i16::MIN]);
}

#[tokio::test]
async fn test_rejected_send_is_send_error() {
    let (sink, channel) = sink();
    channel.fail_sends(true);

    assert!(matches!(sink.send_command(5).await, Err(LinkError::Send(_))));
    assert!(channel.sent().is_empty());

    channel.fail_sends(false);
    sink.send_command(5).await.unwrap();
    assert_eq!(channel.sent().len(), 1);
}

#[tokio::test]
async fn test_clones_share_the_channel() {
    let (sink, channel) = sink();
    let other = sink.clone();

    sink.send_command(1).await.unwrap();
    other.send_command(2).await.unwrap();
    assert_eq!(channel.sent().len(), 2);
}

#[test]
fn test_actuation_delay_uses_timing() {
    let (sink, _) = sink();
    assert_eq!(sink.actuation_delay(30), Duration::from_millis(1100));
    assert_eq!(sink.actuation_delay(-30), Duration::from_millis(1100));
    assert_eq!(sink.actuation_delay(0), Duration::from_millis(500));

    let fast = ControlSink::for_channel(
        Arc::new(MockDataChannel::new("control")),
        ControlConfig {
            step_delay_ms: 1,
            phases_per_step: 8,
            settle_ms: 0,
        },
    );
    assert_eq!(fast.actuation_delay(10), Duration::from_millis(80));
}
