// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Settings sync — picks up runtime settings published by other instances
// and announces our own at startup.  Best effort in both directions: a bad
// message or a failed send is logged and never stops the worker.

use std::time::Duration;

use smartscan_core::error::Result;
use smartscan_core::{InstanceId, QueueMessage, ServiceSettings};
use smartscan_queue::MessageTransport;
use tracing::{debug, info, warn};

/// Result of one settings poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing arrived within the wait.
    NoMessage,
    /// A valid message replaced the local settings.
    Applied,
    /// A message arrived but could not be decoded; it was discarded.
    Rejected,
    /// This instance's own startup broadcast; acknowledged and ignored.
    OwnBroadcast,
    /// The transport itself failed.
    TransportError,
}

/// Receives from and publishes to the settings channel on behalf of one
/// service instance.
#[derive(Debug, Clone)]
pub struct SettingsSync {
    channel: String,
    wait: Duration,
    instance: InstanceId,
}

impl SettingsSync {
    pub fn new(channel: impl Into<String>, wait: Duration, instance: InstanceId) -> Self {
        Self {
            channel: channel.into(),
            wait,
            instance,
        }
    }

    /// Receive at most one settings message and apply it to `current`.
    ///
    /// The message is acknowledged whether or not it decodes, so a malformed
    /// payload is not redelivered forever.  Settings tagged with this
    /// instance's id are its own broadcast and leave `current` untouched.
    pub async fn poll(
        &self,
        transport: &dyn MessageTransport,
        current: &mut ServiceSettings,
    ) -> SyncOutcome {
        let delivery = match transport.receive(&self.channel, self.wait).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return SyncOutcome::NoMessage,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "settings receive failed");
                return SyncOutcome::TransportError;
            }
        };

        let decoded = delivery
            .verified_message()
            .and_then(|msg| ServiceSettings::decode(&msg.payload));

        let outcome = match decoded {
            Ok(settings) if settings.is_from(&self.instance) => {
                debug!(id = delivery.id, "skipping own settings broadcast");
                SyncOutcome::OwnBroadcast
            }
            Ok(settings) => {
                info!(
                    idle_timeout_ms = settings.idle_timeout_millis,
                    break_marker = %settings.break_marker,
                    "settings updated from queue"
                );
                *current = settings;
                SyncOutcome::Applied
            }
            Err(e) => {
                warn!(id = delivery.id, error = %e, "discarding malformed settings message");
                SyncOutcome::Rejected
            }
        };

        if let Err(e) = transport.complete(&delivery).await {
            warn!(id = delivery.id, error = %e, "failed to acknowledge settings message");
        }
        outcome
    }

    /// Announce `current` to other instances: timeout bumped by the
    /// broadcast offset, marker tagged with this instance.
    pub async fn broadcast(
        &self,
        transport: &dyn MessageTransport,
        current: &ServiceSettings,
    ) -> Result<ServiceSettings> {
        let announced = current.for_broadcast(&self.instance);
        transport
            .send(&self.channel, QueueMessage::new(announced.encode()?))
            .await?;
        debug!(
            idle_timeout_ms = announced.idle_timeout_millis,
            break_marker = %announced.break_marker,
            "settings broadcast"
        );
        Ok(announced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartscan_queue::MemoryTransport;

    const CHANNEL: &str = "settingsQueue";

    async fn transport() -> MemoryTransport {
        let t = MemoryTransport::new();
        t.ensure_channel(CHANNEL).await.expect("channel");
        t
    }

    fn sync() -> SettingsSync {
        SettingsSync::new(CHANNEL, Duration::ZERO, InstanceId::new())
    }

    #[tokio::test]
    async fn valid_message_overwrites_settings() {
        let t = transport().await;
        let incoming = ServiceSettings::new(2000, "sheet");
        t.send(CHANNEL, QueueMessage::new(incoming.encode().expect("encode")))
            .await
            .expect("send");

        let mut current = ServiceSettings::default();
        assert_eq!(sync().poll(&t, &mut current).await, SyncOutcome::Applied);
        assert_eq!(current, incoming);
        assert_eq!(t.in_flight(), 0, "message must be acknowledged");
    }

    #[tokio::test]
    async fn malformed_message_is_discarded_and_acknowledged() {
        let t = transport().await;
        t.send(CHANNEL, QueueMessage::new(b"{\"idle_timeout_millis\":".to_vec()))
            .await
            .expect("send");

        let mut current = ServiceSettings::new(1234, "keep");
        assert_eq!(sync().poll(&t, &mut current).await, SyncOutcome::Rejected);
        assert_eq!(current, ServiceSettings::new(1234, "keep"));
        assert_eq!(t.in_flight(), 0);
        assert_eq!(t.pending(CHANNEL), 0);
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let t = transport().await;
        t.send(
            CHANNEL,
            QueueMessage::new(br#"{"idle_timeout_millis":0,"break_marker":"x"}"#.to_vec()),
        )
        .await
        .expect("send");

        let mut current = ServiceSettings::default();
        assert_eq!(sync().poll(&t, &mut current).await, SyncOutcome::Rejected);
        assert_eq!(current, ServiceSettings::default());
    }

    #[tokio::test]
    async fn empty_channel_leaves_settings_alone() {
        let t = transport().await;
        let mut current = ServiceSettings::default();
        assert_eq!(sync().poll(&t, &mut current).await, SyncOutcome::NoMessage);
    }

    #[tokio::test]
    async fn transport_failure_is_reported_not_raised() {
        let t = MemoryTransport::new();
        let mut current = ServiceSettings::default();
        assert_eq!(sync().poll(&t, &mut current).await, SyncOutcome::TransportError);
    }

    #[tokio::test]
    async fn broadcast_reaches_other_instances() {
        let t = transport().await;
        let current = ServiceSettings::new(5000, "break");

        let announced = sync().broadcast(&t, &current).await.expect("broadcast");
        assert_eq!(announced.idle_timeout_millis, 6000);

        let mut received = ServiceSettings::default();
        assert_eq!(sync().poll(&t, &mut received).await, SyncOutcome::Applied);
        assert_eq!(received, announced);
    }

    #[tokio::test]
    async fn own_broadcast_is_acknowledged_and_ignored() {
        let t = transport().await;
        let own = sync();
        let current = ServiceSettings::new(300, "break");
        own.broadcast(&t, &current).await.expect("broadcast");

        let mut working = current.clone();
        assert_eq!(own.poll(&t, &mut working).await, SyncOutcome::OwnBroadcast);
        assert_eq!(working, current);
        assert_eq!(t.pending(CHANNEL), 0);
        assert_eq!(t.in_flight(), 0);
    }
}
